//! Adapter error types.
//!
//! Adapter internals surface failures through [`AdapterError`].  At the
//! capability boundary every variant converts into a
//! [`CapabilityError`], which is all the workflow executor sees.

use autho_kernel::CapabilityError;

/// Unified error type for built-in adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The requested operation does not exist on this adapter.
    #[error("operation not found: `{operation}` on adapter `{adapter_id}`")]
    OperationNotFound {
        adapter_id: String,
        operation: String,
    },

    /// The parameters supplied to an operation are invalid.
    #[error("invalid parameters for `{operation}`: {reason}")]
    InvalidParams { operation: String, reason: String },

    /// An operation ran and failed.
    #[error("execution failed for `{operation}`: {reason}")]
    ExecutionFailed { operation: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An operation exceeded its time limit.
    #[error("`{operation}` timed out after {seconds}s: {reason}")]
    Timeout {
        operation: String,
        seconds: u64,
        reason: String,
    },
}

impl From<AdapterError> for CapabilityError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::IoError(e) => CapabilityError::Io(e),
            AdapterError::SerializationError(e) => CapabilityError::Json(e),
            AdapterError::OperationNotFound { operation, .. } => {
                CapabilityError::UnknownOperation { operation }
            }
            AdapterError::InvalidParams { operation, reason } => {
                CapabilityError::InvalidParams { operation, reason }
            }
            AdapterError::ExecutionFailed { operation, reason } => {
                CapabilityError::ExecutionFailed { operation, reason }
            }
            AdapterError::Timeout {
                operation,
                seconds,
                reason,
            } => CapabilityError::ExecutionFailed {
                operation,
                reason: format!("timed out after {seconds}s: {reason}"),
            },
        }
    }
}

impl From<CapabilityError> for AdapterError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Io(e) => AdapterError::IoError(e),
            CapabilityError::Json(e) => AdapterError::SerializationError(e),
            CapabilityError::InvalidParams { operation, reason } => {
                AdapterError::InvalidParams { operation, reason }
            }
            CapabilityError::ExecutionFailed { operation, reason } => {
                AdapterError::ExecutionFailed { operation, reason }
            }
            CapabilityError::UnknownOperation { operation } => AdapterError::OperationNotFound {
                adapter_id: String::new(),
                operation,
            },
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
