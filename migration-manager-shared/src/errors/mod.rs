//! Error types shared by every layer of the migration manager.
//!
//! `ValidationError` is raised by the pure validation layer before any
//! mutation is attempted. `ErrorClass` is the coarse taxonomy every
//! service-level error maps onto, so presentation layers can pick exit codes
//! or HTTP statuses without inspecting message text.
use std::fmt;

use thiserror::Error;

/// An entity failed one of its invariants.
///
/// Always recoverable by the caller correcting its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation error: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    /// Create a validation error from any message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// The bare message, without the `Validation error:` prefix.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// The class an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Input failed an entity invariant.
    Validation,
    /// The referenced aggregate is absent.
    NotFound,
    /// Uniqueness or reference conflict.
    ConstraintViolation,
    /// Structurally valid request forbidden by a business rule.
    OperationNotPermitted,
    /// An external call failed but may be retried.
    TransientExecution,
    /// An external call failed in a way that needs operator intervention.
    FatalExecution,
    /// Anything else (driver failures, corrupt rows, timeouts).
    Internal,
}

impl ErrorClass {
    /// Whether the orchestration loop may retry an operation failing with this class.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::TransientExecution | ErrorClass::Internal)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Validation => "validation",
            ErrorClass::NotFound => "not_found",
            ErrorClass::ConstraintViolation => "constraint_violation",
            ErrorClass::OperationNotPermitted => "operation_not_permitted",
            ErrorClass::TransientExecution => "transient_execution",
            ErrorClass::FatalExecution => "fatal_execution",
            ErrorClass::Internal => "internal",
        };
        f.write_str(s)
    }
}
