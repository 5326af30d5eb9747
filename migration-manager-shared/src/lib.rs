//! # Migration Manager Shared
//!
//! This crate defines the entity model shared across the migration manager:
//! sources, targets, instances, per-instance overrides and batches, together
//! with the migration status enums, the pure validation layer and the
//! include-expression language used to match instances to batches.

pub mod errors;
pub mod expression;
pub mod types;
pub mod validation;

pub use errors::{ErrorClass, ValidationError};
pub use expression::{Expression, ExpressionError, InstanceAttributes};
pub use types::{
    Batch, BatchStatus, IncusProperties, Instance, InstanceCpuInfo, InstanceDeviceInfo,
    InstanceDiskInfo, InstanceMemoryInfo, InstanceNicInfo, InstanceSnapshotInfo, MigrationStatus,
    Overrides, Source, SourceProperties, SourceType, Target, TargetProperties, TargetType,
    VMwareProperties,
};
