//! The capability surface.
//!
//! Every external collaborator the workflow engine drives (filesystem, HTTP,
//! spreadsheets, mail, ...) implements [`Capability`].  A capability declares
//! the operation tags it serves via [`Capability::operations`] and handles
//! them in [`Capability::invoke`].  Parameters are a JSON object and results
//! are arbitrary JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CapabilityError;

/// Parameter mapping passed to every operation.
pub type Params = Map<String, Value>;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Description of a single operation a capability serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation tag used by steps and the dispatch table (e.g. `read_file`).
    pub name: String,
    /// Human-readable description of what the operation does.
    pub description: String,
    /// Names of the parameters the operation requires.
    #[serde(default)]
    pub required: Vec<String>,
}

impl OperationSpec {
    /// Create a spec with no required parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: Vec::new(),
        }
    }

    /// Declare the parameters this operation requires.
    pub fn with_required(mut self, required: &[&str]) -> Self {
        self.required = required.iter().map(|s| (*s).to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// A provider of named operations.
///
/// Invocations are synchronous; a blocking call blocks the caller.
pub trait Capability: Send + Sync {
    /// Return the unique identifier for this capability.
    fn id(&self) -> &str;

    /// Return the operations this capability serves.
    fn operations(&self) -> Vec<OperationSpec>;

    /// Execute the named operation with the given parameters.
    fn invoke(&self, operation: &str, params: &Params) -> Result<Value, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

/// Extract a required string parameter.
pub fn require_str<'a>(
    params: &'a Params,
    key: &str,
    operation: &str,
) -> Result<&'a str, CapabilityError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::invalid(operation, format!("missing required string field `{key}`")))
}

/// Extract an optional string parameter.
pub fn optional_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Render a value the way templates and previews show it: strings verbatim,
/// everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_str_reports_missing_field() {
        let params = Params::new();
        let err = require_str(&params, "path", "read_file").unwrap_err();
        assert!(err.to_string().contains("`path`"));
    }

    #[test]
    fn require_str_rejects_non_string() {
        let mut params = Params::new();
        params.insert("path".into(), json!(42));
        assert!(require_str(&params, "path", "read_file").is_err());
    }

    #[test]
    fn display_value_keeps_strings_raw() {
        assert_eq!(display_value(&json!("hi")), "hi");
        assert_eq!(display_value(&json!({"status": 200})), r#"{"status":200}"#);
        assert_eq!(display_value(&json!(1.5)), "1.5");
    }
}
