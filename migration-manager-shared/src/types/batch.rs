use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::expression::Expression;
use crate::types::BatchStatus;
use crate::validation;

/// A named, windowed grouping of instances migrated together.
///
/// Members are the instances whose `batch_id` equals `id`; the batch never
/// stores them itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub name: String,
    pub target_id: i64,
    pub status: BatchStatus,
    pub status_string: String,
    pub storage_pool: String,
    pub include_expression: String,
    pub migration_window_start: Option<DateTime<Utc>>,
    pub migration_window_end: Option<DateTime<Utc>>,
    pub default_network: String,
}

impl Batch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::non_negative_id("batch", "id", self.id)?;
        validation::non_empty("batch", "name", &self.name)?;
        validation::non_negative_id("batch", "target id", self.target_id)?;
        validation::non_empty("batch", "include expression", &self.include_expression)?;

        Expression::parse(&self.include_expression).map_err(|e| {
            ValidationError::new(format!(
                "Invalid batch, include expression {:?} is invalid: {e}",
                self.include_expression
            ))
        })?;

        if let (Some(start), Some(end)) = (self.migration_window_start, self.migration_window_end) {
            if end < start {
                return Err(ValidationError::new(
                    "Invalid batch, migration window end is before its start",
                ));
            }
        }

        Ok(())
    }

    /// Whether `now` falls inside the migration window.
    ///
    /// Both bounds are inclusive; a missing bound is unrestricted.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.migration_window_start.map_or(true, |start| now >= start)
            && self.migration_window_end.map_or(true, |end| now <= end)
    }

    /// Whether the window has closed for good.
    pub fn window_has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.migration_window_end.is_some_and(|end| now > end)
    }
}
