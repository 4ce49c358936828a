//! Built-in capabilities for Autho.
//!
//! Each adapter implements [`autho_kernel::Capability`] and serves a group of
//! operation tags:
//!
//! - **[`filesystem`]** -- `read_file`, `write_file`, `copy_file`,
//!   `move_file`, `delete_file`, `list_files`, `create_directory`.
//! - **[`http`]** -- `http_get`, `http_post`, `api_call`, `download_file`.
//! - **[`control`]** -- `log_message`, `wait`.
//!
//! [`register_defaults`] wires all of them into a registry.

pub mod control;
pub mod error;
pub mod filesystem;
pub mod http;

use std::path::PathBuf;
use std::sync::Arc;

use autho_kernel::CapabilityRegistry;

pub use control::ControlAdapter;
pub use error::{AdapterError, Result};
pub use filesystem::FilesystemAdapter;
pub use http::HttpAdapter;

/// Settings for the built-in adapters.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Root directory for filesystem operations and downloads.
    pub root_dir: PathBuf,
    /// `User-Agent` header sent by the HTTP adapter.
    pub user_agent: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            user_agent: http::DEFAULT_USER_AGENT.to_string(),
            timeout_secs: http::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Register the filesystem, HTTP and control adapters.
pub fn register_defaults(registry: &CapabilityRegistry, settings: &AdapterSettings) {
    registry.register(Arc::new(FilesystemAdapter::new("filesystem", settings.root_dir.clone())));
    registry.register(Arc::new(HttpAdapter::with_settings(
        "http",
        &settings.user_agent,
        settings.timeout_secs,
        settings.root_dir.clone(),
    )));
    registry.register(Arc::new(ControlAdapter::new("control")));
}
