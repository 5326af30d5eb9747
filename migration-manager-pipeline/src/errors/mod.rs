mod execution;
mod orchestrator;

pub use execution::ExecutionError;
pub use orchestrator::OrchestratorError;
