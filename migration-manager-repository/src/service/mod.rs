//! Domain services, one per aggregate.
//!
//! Services validate input, resolve references that must exist, and apply the
//! business rules spanning more than one repository call (the cascading
//! instance delete, batch start / stop). Every operation returns
//! [`RepositoryError`](crate::errors::RepositoryError), whose `class()` tells
//! presentation layers how to report it.
mod batch;
mod instance;
mod source;
mod target;

pub use batch::BatchService;
pub use instance::InstanceService;
pub use source::SourceService;
pub use target::TargetService;
