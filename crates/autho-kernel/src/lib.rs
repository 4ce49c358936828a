//! Autho kernel.
//!
//! Foundational abstractions shared by every Autho crate:
//!
//! - **[`capability`]** -- the [`Capability`] trait every external
//!   collaborator implements, plus parameter helpers.
//! - **[`registry`]** -- [`CapabilityRegistry`], the dispatch table from
//!   operation tag to capability, backed by [`dashmap::DashMap`].
//! - **[`router`]** -- [`PatternRouter`], ordered case-insensitive regex
//!   rules scored by how much of the input they cover.
//! - **[`error`]** -- kernel and capability error types via [`thiserror`].

pub mod capability;
pub mod error;
pub mod registry;
pub mod router;

pub use capability::{Capability, OperationSpec, Params, display_value, optional_str, require_str};
pub use error::{CapabilityError, KernelError, Result};
pub use registry::{CapabilityRegistry, FnCapability, OperationInfo};
pub use router::{PatternRouter, RouteMatch};
