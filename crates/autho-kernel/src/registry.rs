//! Operation registry.
//!
//! The registry is the dispatch table between operation tags (`read_file`,
//! `http_get`, ...) and the [`Capability`] that serves them.  Adding an
//! operation means registering a capability or a closure; nothing that
//! dispatches through the registry changes.
//!
//! Internally the registry is backed by [`DashMap`] so it can be shared
//! between the executor, the natural-language interface and scheduler
//! threads without a global lock.  Per-operation bookkeeping (invocation
//! count, last error, last invocation time) is kept alongside each handler.
//!
//! # Example
//!
//! ```rust
//! # use autho_kernel::registry::CapabilityRegistry;
//! # use autho_kernel::capability::Params;
//! let registry = CapabilityRegistry::new();
//! registry.register_fn("echo", "Return the parameters", |params: &Params| {
//!     Ok(serde_json::Value::Object(params.clone()))
//! });
//!
//! assert!(registry.contains("echo"));
//! let out = registry.invoke("echo", &Params::new()).unwrap();
//! assert!(out.is_object());
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{Capability, OperationSpec, Params};
use crate::error::{CapabilityError, KernelError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Snapshot of a registered operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationInfo {
    /// Operation tag.
    pub operation: String,
    /// Identifier of the capability serving this operation.
    pub provider: String,
    /// Human-readable description.
    pub description: String,
    /// When the operation was registered.
    pub registered_at: DateTime<Utc>,
    /// Number of invocations so far (successful or not).
    pub invocations: u64,
    /// Timestamp of the most recent invocation.
    pub last_invoked: Option<DateTime<Utc>>,
    /// Error message of the most recent failed invocation, cleared on success.
    pub last_error: Option<String>,
}

struct Entry {
    capability: Arc<dyn Capability>,
    info: OperationInfo,
}

/// Signature of closures accepted by [`CapabilityRegistry::register_fn`].
pub type OperationFn = dyn Fn(&Params) -> std::result::Result<Value, CapabilityError> + Send + Sync;

/// A capability wrapping a single closure.
pub struct FnCapability {
    spec: OperationSpec,
    func: Box<OperationFn>,
}

impl FnCapability {
    pub fn new<F>(operation: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Params) -> std::result::Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            spec: OperationSpec::new(operation, description),
            func: Box::new(func),
        }
    }
}

impl Capability for FnCapability {
    fn id(&self) -> &str {
        &self.spec.name
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![self.spec.clone()]
    }

    fn invoke(&self, _operation: &str, params: &Params) -> std::result::Result<Value, CapabilityError> {
        (self.func)(params)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent operation registry backed by [`DashMap`].
///
/// The registry is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone)]
pub struct CapabilityRegistry {
    inner: Arc<DashMap<String, Entry>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Register every operation a capability declares.
    ///
    /// An operation tag that is already registered is overwritten.
    pub fn register(&self, capability: Arc<dyn Capability>) {
        let provider = capability.id().to_string();
        for spec in capability.operations() {
            if self.inner.contains_key(&spec.name) {
                tracing::warn!(operation = %spec.name, provider = %provider, "operation re-registered");
            }
            tracing::debug!(operation = %spec.name, provider = %provider, "operation registered");
            self.inner.insert(
                spec.name.clone(),
                Entry {
                    capability: Arc::clone(&capability),
                    info: OperationInfo {
                        operation: spec.name,
                        provider: provider.clone(),
                        description: spec.description,
                        registered_at: Utc::now(),
                        invocations: 0,
                        last_invoked: None,
                        last_error: None,
                    },
                },
            );
        }
        tracing::info!(provider = %provider, "capability registered");
    }

    /// Register a single operation served by a closure.
    pub fn register_fn<F>(&self, operation: impl Into<String>, description: impl Into<String>, func: F)
    where
        F: Fn(&Params) -> std::result::Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnCapability::new(operation, description, func)));
    }

    /// Remove an operation from the registry.
    pub fn unregister(&self, operation: &str) -> Option<OperationInfo> {
        let removed = self.inner.remove(operation).map(|(_, entry)| entry.info);
        if removed.is_some() {
            tracing::info!(operation = %operation, "operation unregistered");
        }
        removed
    }

    /// Invoke an operation by tag.
    ///
    /// The handler is cloned out of the map before the call so long-running
    /// operations never hold a shard lock.
    pub fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, CapabilityError> {
        let capability = self
            .inner
            .get(operation)
            .map(|entry| Arc::clone(&entry.capability))
            .ok_or_else(|| CapabilityError::UnknownOperation {
                operation: operation.to_string(),
            })?;

        let outcome = capability.invoke(operation, params);

        if let Some(mut entry) = self.inner.get_mut(operation) {
            entry.info.invocations += 1;
            entry.info.last_invoked = Some(Utc::now());
            entry.info.last_error = outcome.as_ref().err().map(ToString::to_string);
        }

        outcome
    }

    /// Check whether an operation tag is registered.
    pub fn contains(&self, operation: &str) -> bool {
        self.inner.contains_key(operation)
    }

    /// Retrieve a snapshot of an operation's bookkeeping.
    pub fn info(&self, operation: &str) -> Result<OperationInfo> {
        self.inner
            .get(operation)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| KernelError::OperationNotFound {
                operation: operation.to_string(),
            })
    }

    /// Return all registered operation tags, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Return the number of registered operations.
    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Math;

    impl Capability for Math {
        fn id(&self) -> &str {
            "math"
        }

        fn operations(&self) -> Vec<OperationSpec> {
            vec![
                OperationSpec::new("add", "Add a and b").with_required(&["a", "b"]),
                OperationSpec::new("negate", "Negate a").with_required(&["a"]),
            ]
        }

        fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, CapabilityError> {
            let a = params.get("a").and_then(Value::as_i64).unwrap_or(0);
            match operation {
                "add" => {
                    let b = params.get("b").and_then(Value::as_i64).unwrap_or(0);
                    Ok(json!(a + b))
                }
                "negate" => Ok(json!(-a)),
                other => Err(CapabilityError::UnknownOperation {
                    operation: other.to_string(),
                }),
            }
        }
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn register_indexes_every_operation() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(Math));

        assert_eq!(registry.operations(), vec!["add", "negate"]);
        assert_eq!(registry.info("add").unwrap().provider, "math");
    }

    #[test]
    fn invoke_dispatches_by_tag() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(Math));

        let sum = registry.invoke("add", &params(json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(sum, json!(5));
        let neg = registry.invoke("negate", &params(json!({"a": 2}))).unwrap();
        assert_eq!(neg, json!(-2));
    }

    #[test]
    fn unknown_operation_is_typed_failure() {
        let registry = CapabilityRegistry::new();
        let err = registry.invoke("nope", &Params::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownOperation { .. }));
    }

    #[test]
    fn bookkeeping_tracks_errors() {
        let registry = CapabilityRegistry::new();
        registry.register_fn("flaky", "Always fails", |_| {
            Err(CapabilityError::failed("flaky", "boom"))
        });

        assert!(registry.invoke("flaky", &Params::new()).is_err());
        let info = registry.info("flaky").unwrap();
        assert_eq!(info.invocations, 1);
        assert!(info.last_invoked.is_some());
        assert!(info.last_error.as_deref().unwrap().contains("boom"));
    }

    #[test]
    fn register_fn_overwrites() {
        let registry = CapabilityRegistry::new();
        registry.register_fn("op", "first", |_| Ok(json!(1)));
        registry.register_fn("op", "second", |_| Ok(json!(2)));

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.invoke("op", &Params::new()).unwrap(), json!(2));
    }

    #[test]
    fn unregister_and_not_found() {
        let registry = CapabilityRegistry::new();
        registry.register_fn("tmp", "temporary", |_| Ok(Value::Null));
        assert!(registry.unregister("tmp").is_some());
        assert!(matches!(
            registry.info("tmp"),
            Err(KernelError::OperationNotFound { .. })
        ));
    }
}
