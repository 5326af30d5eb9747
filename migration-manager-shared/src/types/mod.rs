mod batch;
mod instance;
mod overrides;
mod properties;
mod source;
mod status;
mod target;

pub use batch::Batch;
pub use instance::{
    Instance, InstanceCpuInfo, InstanceDeviceInfo, InstanceDiskInfo, InstanceMemoryInfo,
    InstanceNicInfo, InstanceSnapshotInfo,
};
pub use overrides::Overrides;
pub use properties::{
    IncusProperties, SourceProperties, SourceType, TargetProperties, TargetType, VMwareProperties,
};
pub use source::Source;
pub use status::{BatchStatus, MigrationStatus};
pub use target::Target;
