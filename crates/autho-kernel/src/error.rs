//! Kernel error types.
//!
//! Two error families live here.  [`KernelError`] covers failures of the
//! kernel's own construction-time APIs (pattern compilation, registry
//! lookups).  [`CapabilityError`] is the single typed failure every
//! capability invocation signals; the workflow executor treats any of its
//! variants as a step failure without inspecting the cause.

/// Error type for kernel construction and lookup APIs.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Router errors ------------------------------------------------------
    /// A regex pattern supplied to the router is invalid.
    #[error("invalid regex pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // -- Registry errors ----------------------------------------------------
    /// The requested operation tag is not registered.
    #[error("operation not registered: {operation}")]
    OperationNotFound { operation: String },
}

/// Failure signalled by a capability operation.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// No capability handles the requested operation tag.
    #[error("unknown operation: {operation}")]
    UnknownOperation { operation: String },

    /// The parameters supplied to an operation are invalid.
    #[error("invalid parameters for `{operation}`: {reason}")]
    InvalidParams { operation: String, reason: String },

    /// The operation ran and failed.
    #[error("`{operation}` failed: {reason}")]
    ExecutionFailed { operation: String, reason: String },

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CapabilityError {
    /// Shorthand for [`CapabilityError::ExecutionFailed`].
    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CapabilityError::InvalidParams`].
    pub fn invalid(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
