//! # Migration Manager Pipeline
//! This crate holds the long-lived workers of the migration manager.
//! The state machine guards every instance transition, the scheduler assigns
//! instances to batches and drives batch status, the inventory sync pulls
//! instances from sources and the migration worker pushes them to targets.
//! The orchestrator runs them side by side until shutdown.
//!
//! Workers share no in-memory state; they communicate only through the
//! repository traits.
pub mod errors;
pub mod executor;
pub mod inventory;
pub mod orchestrator;
pub mod scheduler;
pub mod state_machine;

pub use errors::{ExecutionError, OrchestratorError};
pub use executor::{ImportMode, MigrationPlan, MigrationWorker, TargetExecutor, WorkerReport};
pub use inventory::{InstanceSnapshot, InventorySource, InventorySync, KeepAliveSession, SyncReport};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerReport};
pub use state_machine::{StateMachine, Step, TransitionOutcome};
