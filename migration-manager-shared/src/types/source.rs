use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;
use crate::types::{SourceProperties, SourceType};
use crate::validation;

/// An inventory origin describing virtual machines to migrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Database id; zero until the source is created.
    pub id: i64,
    pub name: String,
    pub source_type: SourceType,
    pub properties: Value,
}

impl Source {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::non_negative_id("source", "id", self.id)?;
        validation::non_empty("source", "name", &self.name)?;
        self.typed_properties()?;
        Ok(())
    }

    /// Decodes the properties into the shape selected by `source_type`.
    pub fn typed_properties(&self) -> Result<SourceProperties, ValidationError> {
        self.source_type.decode_properties(&self.properties)
    }
}
