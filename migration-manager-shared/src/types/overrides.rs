use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::validation;

/// Operator corrections to an instance's effective configuration.
///
/// One-to-one with the instance sharing its `uuid`. Zero in `number_cpus`
/// or `memory_in_bytes` means "no override".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub uuid: Uuid,
    pub last_update: DateTime<Utc>,
    pub comment: String,
    pub number_cpus: i64,
    pub memory_in_bytes: i64,
    pub disable_migration: bool,
}

impl Overrides {
    /// Empty overrides for `uuid`, stamped now.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            last_update: Utc::now(),
            comment: String::new(),
            number_cpus: 0,
            memory_in_bytes: 0,
            disable_migration: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uuid.is_nil() {
            return Err(ValidationError::new("Invalid overrides, uuid can not be nil"));
        }
        validation::non_negative("overrides", "number of cpus", self.number_cpus)?;
        validation::non_negative("overrides", "memory", self.memory_in_bytes)?;
        Ok(())
    }
}
