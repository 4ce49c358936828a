//! Control capability -- `log_message` and `wait`.

use std::time::Duration;

use autho_kernel::{Capability, CapabilityError, OperationSpec, Params, display_value};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{AdapterError, Result};

/// Upper bound for a single `wait`, in seconds.
const MAX_WAIT_SECS: f64 = 3600.0;

/// Logging and pacing operations.
pub struct ControlAdapter {
    id: String,
}

impl ControlAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Log the message and return its string form.
    fn log_message(&self, params: &Params) -> Result<Value> {
        let message = params
            .get("message")
            .map(display_value)
            .ok_or_else(|| AdapterError::InvalidParams {
                operation: "log_message".into(),
                reason: "missing required field `message`".into(),
            })?;
        let step = params.get("step").and_then(Value::as_str).unwrap_or("-");
        info!(step = %step, "{message}");
        Ok(Value::String(message))
    }

    fn wait(&self, params: &Params) -> Result<Value> {
        let seconds = params
            .get("seconds")
            .and_then(Value::as_f64)
            .ok_or_else(|| AdapterError::InvalidParams {
                operation: "wait".into(),
                reason: "missing numeric field `seconds`".into(),
            })?;
        if !(0.0..=MAX_WAIT_SECS).contains(&seconds) {
            return Err(AdapterError::InvalidParams {
                operation: "wait".into(),
                reason: format!("`seconds` must be between 0 and {MAX_WAIT_SECS}, got {seconds}"),
            });
        }
        std::thread::sleep(Duration::from_secs_f64(seconds));
        Ok(json!(seconds))
    }
}

impl Capability for ControlAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::new("log_message", "Log a message and return it").with_required(&["message"]),
            OperationSpec::new("wait", "Sleep for a number of seconds").with_required(&["seconds"]),
        ]
    }

    fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, CapabilityError> {
        let result = match operation {
            "log_message" => self.log_message(params),
            "wait" => self.wait(params),
            _ => Err(AdapterError::OperationNotFound {
                adapter_id: self.id.clone(),
                operation: operation.to_string(),
            }),
        };
        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn log_message_returns_string_form() {
        let control = ControlAdapter::new("control");
        let out = control
            .invoke("log_message", &params(json!({"message": {"status": 200}})))
            .unwrap();
        assert_eq!(out, json!(r#"{"status":200}"#));
    }

    #[test]
    fn wait_zero_returns_seconds() {
        let control = ControlAdapter::new("control");
        let out = control.invoke("wait", &params(json!({"seconds": 0}))).unwrap();
        assert_eq!(out, json!(0.0));
    }

    #[test]
    fn wait_rejects_negative_and_missing() {
        let control = ControlAdapter::new("control");
        assert!(control.invoke("wait", &params(json!({"seconds": -1}))).is_err());
        assert!(control.invoke("wait", &Params::new()).is_err());
    }
}
