use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;
use crate::types::{TargetProperties, TargetType};
use crate::validation;

/// A destination virtualization platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub target_type: TargetType,
    pub properties: Value,
}

impl Target {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::non_negative_id("target", "id", self.id)?;
        validation::non_empty("target", "name", &self.name)?;
        self.typed_properties()?;
        Ok(())
    }

    pub fn typed_properties(&self) -> Result<TargetProperties, ValidationError> {
        self.target_type.decode_properties(&self.properties)
    }
}
