//! Type-tagged property payloads for sources and targets.
//!
//! Properties are persisted verbatim as JSON. They are validated by decoding
//! them into the struct that belongs to the entity's type discriminant; the
//! `decode_properties` matches below are the dispatch tables.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Generic source; any JSON object is accepted.
    Common,
    /// vCenter / ESXi style source.
    VMware,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Common => "common",
            SourceType::VMware => "vmware",
        }
    }

    pub fn decode_properties(&self, properties: &Value) -> Result<SourceProperties, ValidationError> {
        validation::json_object("source", properties)?;

        match self {
            SourceType::Common => match properties {
                Value::Object(map) => Ok(SourceProperties::Common(map.clone())),
                _ => Err(ValidationError::new("Invalid properties for common type")),
            },
            SourceType::VMware => {
                let props: VMwareProperties = serde_json::from_value(properties.clone())
                    .map_err(|e| {
                        ValidationError::new(format!("Invalid properties for VMware type: {e}"))
                    })?;
                props.validate()?;
                Ok(SourceProperties::VMware(props))
            }
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(SourceType::Common),
            "vmware" => Ok(SourceType::VMware),
            other => Err(ValidationError::new(format!(
                "Invalid source, {other:?} is not a valid source type"
            ))),
        }
    }
}

/// Connection settings of a VMware source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VMwareProperties {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub insecure: bool,
}

impl VMwareProperties {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::endpoint_url("source", &self.endpoint)?;
        if self.username.is_empty() {
            return Err(ValidationError::new(
                "Invalid source, username can not be empty for source type VMware",
            ));
        }
        if self.password.is_empty() {
            return Err(ValidationError::new(
                "Invalid source, password can not be empty for source type VMware",
            ));
        }
        Ok(())
    }
}

/// Decoded source properties.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceProperties {
    Common(Map<String, Value>),
    VMware(VMwareProperties),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Incus,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Incus => "incus",
        }
    }

    pub fn decode_properties(&self, properties: &Value) -> Result<TargetProperties, ValidationError> {
        validation::json_object("target", properties)?;

        match self {
            TargetType::Incus => {
                let props: IncusProperties = serde_json::from_value(properties.clone())
                    .map_err(|e| {
                        ValidationError::new(format!("Invalid properties for Incus type: {e}"))
                    })?;
                validation::endpoint_url("target", &props.endpoint)?;
                Ok(TargetProperties::Incus(props))
            }
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incus" => Ok(TargetType::Incus),
            other => Err(ValidationError::new(format!(
                "Invalid target, {other:?} is not a valid target type"
            ))),
        }
    }
}

/// Connection settings of an Incus target.
///
/// Authentication is either a TLS client key pair or OIDC tokens obtained
/// out of band; both are optional because a freshly created target may not
/// have completed its trust handshake yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncusProperties {
    pub endpoint: String,
    #[serde(default)]
    pub tls_client_key: Option<String>,
    #[serde(default)]
    pub tls_client_cert: Option<String>,
    #[serde(default)]
    pub oidc_tokens: Option<Value>,
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetProperties {
    Incus(IncusProperties),
}
