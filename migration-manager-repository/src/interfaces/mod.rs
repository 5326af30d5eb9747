//! This module defines and re-exports the repository interfaces, one per aggregate.
//! Backends (SQLite, in-memory) implement all of them; services and workers
//! only ever see the traits.
mod batch;
mod instance;
mod source;
mod target;

pub use batch::BatchRepository;
pub use instance::InstanceRepository;
pub use source::SourceRepository;
pub use target::TargetRepository;
