//! Pure invariant checks used by the entity `validate()` methods.
//!
//! Every function takes the entity kind (`"source"`, `"instance"`, ...) so the
//! resulting message names the offending entity.
use url::Url;

use crate::errors::ValidationError;

pub fn non_negative_id(kind: &str, field: &str, id: i64) -> Result<(), ValidationError> {
    if id < 0 {
        return Err(ValidationError::new(format!(
            "Invalid {kind}, {field} can not be negative"
        )));
    }
    Ok(())
}

pub fn optional_non_negative_id(
    kind: &str,
    field: &str,
    id: Option<i64>,
) -> Result<(), ValidationError> {
    match id {
        Some(id) => non_negative_id(kind, field, id),
        None => Ok(()),
    }
}

pub fn non_empty(kind: &str, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(format!(
            "Invalid {kind}, {field} can not be empty"
        )));
    }
    Ok(())
}

pub fn non_negative(kind: &str, field: &str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(format!(
            "Invalid {kind}, {field} can not be negative"
        )));
    }
    Ok(())
}

/// Checks that `endpoint` is a usable URL.
///
/// Scheme-less endpoints such as `vcenter.local` or `endpoint.url` are
/// accepted by resolving them as `https://` URLs; anything that still fails
/// to parse (or has no host) is rejected.
pub fn endpoint_url(kind: &str, endpoint: &str) -> Result<Url, ValidationError> {
    non_empty(kind, "endpoint", endpoint)?;

    let parsed = match Url::parse(endpoint) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{endpoint}")),
        Err(e) => Err(e),
    };

    match parsed {
        Ok(url) if url.has_host() => Ok(url),
        Ok(_) => Err(ValidationError::new(format!(
            "Invalid {kind}, endpoint {endpoint:?} has no host"
        ))),
        Err(e) => Err(ValidationError::new(format!(
            "Invalid {kind}, endpoint {endpoint:?} is not a valid URL: {e}"
        ))),
    }
}

pub fn json_object(kind: &str, value: &serde_json::Value) -> Result<(), ValidationError> {
    match value {
        serde_json::Value::Null => Err(ValidationError::new(format!(
            "Invalid {kind}, properties can not be null"
        ))),
        serde_json::Value::Object(_) => Ok(()),
        other => Err(ValidationError::new(format!(
            "Invalid {kind}, properties must be an object, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_accepts_absolute_and_bare_hosts() {
        assert!(endpoint_url("target", "https://localhost:6443").is_ok());
        assert!(endpoint_url("target", "endpoint.url").is_ok());
        assert!(endpoint_url("target", "10.10.10.10:6443").is_ok());
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        assert!(endpoint_url("target", ":|\\").is_err());
        assert!(endpoint_url("target", "").is_err());
        assert!(endpoint_url("target", "   ").is_err());
    }

    #[test]
    fn test_json_object() {
        assert!(json_object("source", &serde_json::json!({})).is_ok());
        assert!(json_object("source", &serde_json::Value::Null).is_err());

        let err = json_object("source", &serde_json::json!([1, 2])).unwrap_err();
        assert!(err.message().contains("array"));
    }

    #[test]
    fn test_ids() {
        assert!(non_negative_id("batch", "id", 0).is_ok());
        assert!(non_negative_id("batch", "id", -1).is_err());
        assert!(optional_non_negative_id("batch", "target id", None).is_ok());
        assert!(optional_non_negative_id("batch", "target id", Some(-3)).is_err());
    }
}
