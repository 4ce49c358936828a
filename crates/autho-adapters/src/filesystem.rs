//! Filesystem capability -- read, write, copy, move, delete, and list files.
//!
//! All paths are resolved relative to a `root_dir` and validated against path
//! traversal (e.g. `../../etc/passwd`).  Operations are synchronous and use
//! `std::fs`; results echo the caller's path so they read naturally when
//! substituted into later step templates.

use std::path::{Component, Path, PathBuf};

use autho_kernel::{Capability, CapabilityError, OperationSpec, Params, display_value, optional_str, require_str};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{AdapterError, Result};

/// Filesystem capability rooted at a directory.
pub struct FilesystemAdapter {
    /// Unique identifier for this adapter instance.
    id: String,
    /// Root directory for all file operations.  Paths supplied by steps are
    /// resolved relative to this directory and must not escape it.
    root_dir: PathBuf,
}

impl FilesystemAdapter {
    /// Create a new filesystem adapter rooted at `root_dir`.
    pub fn new(id: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root_dir: root_dir.into(),
        }
    }

    /// Return the root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn resolve(&self, raw_path: &str, operation: &str) -> Result<PathBuf> {
        safe_resolve(&self.root_dir, raw_path, operation)
    }

    // -- Operations -----------------------------------------------------------

    fn read_file(&self, params: &Params) -> Result<Value> {
        let path_str = require_str(params, "path", "read_file")?;
        let full_path = self.resolve(path_str, "read_file")?;
        debug!(path = %full_path.display(), "reading file");

        let content = std::fs::read_to_string(&full_path)?;
        Ok(Value::String(content))
    }

    fn write_file(&self, params: &Params) -> Result<Value> {
        let path_str = require_str(params, "path", "write_file")?;
        let content = params
            .get("content")
            .map(display_value)
            .ok_or_else(|| AdapterError::InvalidParams {
                operation: "write_file".into(),
                reason: "missing required field `content`".into(),
            })?;
        let full_path = self.resolve(path_str, "write_file")?;

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, &content)?;

        info!(path = %path_str, chars = content.chars().count(), "wrote file");
        Ok(Value::String(path_str.to_string()))
    }

    fn copy_file(&self, params: &Params) -> Result<Value> {
        let source = require_str(params, "source", "copy_file")?;
        let destination = require_str(params, "destination", "copy_file")?;
        let overwrite = params.get("overwrite").and_then(Value::as_bool).unwrap_or(false);

        let src = self.resolve(source, "copy_file")?;
        let dst = self.resolve(destination, "copy_file")?;

        if dst.exists() && !overwrite {
            return Err(AdapterError::ExecutionFailed {
                operation: "copy_file".into(),
                reason: format!("destination already exists: {destination}"),
            });
        }

        if src.is_dir() {
            copy_dir_all(&src, &dst)?;
        } else {
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dst)?;
        }

        info!(source = %source, destination = %destination, "copied");
        Ok(Value::String(destination.to_string()))
    }

    fn move_file(&self, params: &Params) -> Result<Value> {
        let source = require_str(params, "source", "move_file")?;
        let destination = require_str(params, "destination", "move_file")?;

        let src = self.resolve(source, "move_file")?;
        let dst = self.resolve(destination, "move_file")?;

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&src, &dst)?;

        info!(source = %source, destination = %destination, "moved");
        Ok(Value::String(destination.to_string()))
    }

    fn delete_file(&self, params: &Params) -> Result<Value> {
        let path_str = require_str(params, "path", "delete_file")?;
        let force = params.get("force").and_then(Value::as_bool).unwrap_or(false);
        let full_path = self.resolve(path_str, "delete_file")?;

        if full_path.is_dir() {
            if force {
                std::fs::remove_dir_all(&full_path)?;
            } else {
                std::fs::remove_dir(&full_path)?;
            }
        } else {
            std::fs::remove_file(&full_path)?;
        }

        info!(path = %path_str, "deleted");
        Ok(Value::Bool(true))
    }

    fn list_files(&self, params: &Params) -> Result<Value> {
        let path_str = optional_str(params, "path").unwrap_or(".");
        let pattern = optional_str(params, "pattern").unwrap_or("*");
        let full_path = self.resolve(path_str, "list_files")?;
        let matcher = glob::Pattern::new(pattern).map_err(|e| AdapterError::InvalidParams {
            operation: "list_files".into(),
            reason: format!("invalid pattern `{pattern}`: {e}"),
        })?;

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&full_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if matcher.matches(&name) {
                names.push(name);
            }
        }
        names.sort();

        let listed: Vec<Value> = names
            .into_iter()
            .map(|name| Value::String(Path::new(path_str).join(name).display().to_string()))
            .collect();

        info!(path = %path_str, pattern = %pattern, count = listed.len(), "listed files");
        Ok(Value::Array(listed))
    }

    fn create_directory(&self, params: &Params) -> Result<Value> {
        let path_str = require_str(params, "path", "create_directory")?;
        let full_path = self.resolve(path_str, "create_directory")?;
        debug!(path = %full_path.display(), "creating directory");

        std::fs::create_dir_all(&full_path)?;
        Ok(Value::String(path_str.to_string()))
    }
}

impl Capability for FilesystemAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::new("read_file", "Read a text file").with_required(&["path"]),
            OperationSpec::new("write_file", "Write text to a file, creating parent directories")
                .with_required(&["path", "content"]),
            OperationSpec::new("copy_file", "Copy a file or directory")
                .with_required(&["source", "destination"]),
            OperationSpec::new("move_file", "Move or rename a file or directory")
                .with_required(&["source", "destination"]),
            OperationSpec::new("delete_file", "Delete a file or directory").with_required(&["path"]),
            OperationSpec::new("list_files", "List directory entries matching a glob pattern"),
            OperationSpec::new("create_directory", "Create a directory and its parents")
                .with_required(&["path"]),
        ]
    }

    fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, CapabilityError> {
        let result = match operation {
            "read_file" => self.read_file(params),
            "write_file" => self.write_file(params),
            "copy_file" => self.copy_file(params),
            "move_file" => self.move_file(params),
            "delete_file" => self.delete_file(params),
            "list_files" => self.list_files(params),
            "create_directory" => self.create_directory(params),
            _ => Err(AdapterError::OperationNotFound {
                adapter_id: self.id.clone(),
                operation: operation.to_string(),
            }),
        };
        result.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve a user-supplied path against `root` and reject results that would
/// leave it.
pub(crate) fn safe_resolve(root: &Path, raw_path: &str, operation: &str) -> Result<PathBuf> {
    let canon_root = root.canonicalize().unwrap_or_else(|_| normalize_path(root));

    let candidate = if Path::new(raw_path).is_absolute() {
        PathBuf::from(raw_path)
    } else {
        canon_root.join(raw_path)
    };

    // The target may not exist yet, so normalize lexically.
    let normalized = normalize_path(&candidate);

    if !normalized.starts_with(&canon_root) {
        return Err(AdapterError::InvalidParams {
            operation: operation.to_string(),
            reason: format!(
                "path `{raw_path}` resolves to `{}` which is outside the root directory `{}`",
                normalized.display(),
                canon_root.display(),
            ),
        });
    }

    Ok(normalized)
}

/// Normalize a path by resolving `.` and `..` components without touching
/// the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn adapter() -> (tempfile::TempDir, FilesystemAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FilesystemAdapter::new("fs-test", dir.path());
        (dir, adapter)
    }

    #[test]
    fn declares_seven_operations() {
        let (_dir, adapter) = adapter();
        assert_eq!(adapter.operations().len(), 7);
    }

    #[test]
    fn write_then_read() {
        let (_dir, adapter) = adapter();
        let written = adapter
            .invoke("write_file", &params(json!({"path": "out/hello.txt", "content": "hi there"})))
            .unwrap();
        assert_eq!(written, json!("out/hello.txt"));

        let read = adapter
            .invoke("read_file", &params(json!({"path": "out/hello.txt"})))
            .unwrap();
        assert_eq!(read, json!("hi there"));
    }

    #[test]
    fn write_file_stringifies_structured_content() {
        let (dir, adapter) = adapter();
        adapter
            .invoke("write_file", &params(json!({"path": "data.json", "content": {"a": 1}})))
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("data.json")).unwrap();
        assert_eq!(raw, r#"{"a":1}"#);
    }

    #[test]
    fn copy_refuses_to_overwrite_by_default() {
        let (dir, adapter) = adapter();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();
        std::fs::write(dir.path().join("b.txt"), "B").unwrap();

        let err = adapter
            .invoke("copy_file", &params(json!({"source": "a.txt", "destination": "b.txt"})))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        adapter
            .invoke(
                "copy_file",
                &params(json!({"source": "a.txt", "destination": "b.txt", "overwrite": true})),
            )
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "A");
    }

    #[test]
    fn copy_creates_destination_parents() {
        let (dir, adapter) = adapter();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();

        let out = adapter
            .invoke("copy_file", &params(json!({"source": "a.txt", "destination": "backup/a.txt"})))
            .unwrap();
        assert_eq!(out, json!("backup/a.txt"));
        assert!(dir.path().join("backup/a.txt").exists());
    }

    #[test]
    fn move_and_delete() {
        let (dir, adapter) = adapter();
        std::fs::write(dir.path().join("old.txt"), "x").unwrap();

        adapter
            .invoke("move_file", &params(json!({"source": "old.txt", "destination": "archive/new.txt"})))
            .unwrap();
        assert!(!dir.path().join("old.txt").exists());
        assert!(dir.path().join("archive/new.txt").exists());

        let deleted = adapter
            .invoke("delete_file", &params(json!({"path": "archive/new.txt"})))
            .unwrap();
        assert_eq!(deleted, json!(true));
        assert!(!dir.path().join("archive/new.txt").exists());
    }

    #[test]
    fn delete_non_empty_directory_requires_force() {
        let (dir, adapter) = adapter();
        std::fs::create_dir_all(dir.path().join("d")).unwrap();
        std::fs::write(dir.path().join("d/f.txt"), "x").unwrap();

        assert!(adapter.invoke("delete_file", &params(json!({"path": "d"}))).is_err());
        adapter
            .invoke("delete_file", &params(json!({"path": "d", "force": true})))
            .unwrap();
        assert!(!dir.path().join("d").exists());
    }

    #[test]
    fn list_files_filters_by_glob_and_sorts() {
        let (dir, adapter) = adapter();
        for name in ["b.csv", "a.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let all = adapter.invoke("list_files", &Params::new()).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);

        let csv = adapter
            .invoke("list_files", &params(json!({"path": ".", "pattern": "*.csv"})))
            .unwrap();
        assert_eq!(csv, json!(["./a.csv", "./b.csv"]));
    }

    #[test]
    fn create_directory_is_idempotent() {
        let (dir, adapter) = adapter();
        for _ in 0..2 {
            adapter
                .invoke("create_directory", &params(json!({"path": "x/y"})))
                .unwrap();
        }
        assert!(dir.path().join("x/y").is_dir());
    }

    #[test]
    fn missing_path_is_invalid_params() {
        let (_dir, adapter) = adapter();
        let err = adapter.invoke("read_file", &Params::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidParams { .. }));
    }

    #[test]
    fn unknown_operation() {
        let (_dir, adapter) = adapter();
        let err = adapter.invoke("fs_nope", &Params::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownOperation { .. }));
    }

    #[test]
    fn path_traversal_is_blocked() {
        let result = safe_resolve(Path::new("/tmp/sandbox"), "../../etc/passwd", "read_file");
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("outside the root directory"));
    }

    #[test]
    fn normalize_path_resolves_parent_components() {
        let norm = normalize_path(Path::new("/tmp/sandbox/sub/../other"));
        assert_eq!(norm, PathBuf::from("/tmp/sandbox/other"));
    }

    #[test]
    fn list_files_supports_wildcards_and_classes() {
        let (dir, adapter) = adapter();
        for name in ["a.txt", "b.txt", "c.txt", "report-1.txt", "report-10.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let class = adapter
            .invoke("list_files", &params(json!({"pattern": "[ab].txt"})))
            .unwrap();
        assert_eq!(class, json!(["./a.txt", "./b.txt"]));

        let single = adapter
            .invoke("list_files", &params(json!({"pattern": "report-?.txt"})))
            .unwrap();
        assert_eq!(single, json!(["./report-1.txt"]));
    }

    #[test]
    fn list_files_rejects_malformed_pattern() {
        let (_dir, adapter) = adapter();
        let err = adapter
            .invoke("list_files", &params(json!({"pattern": "[a"})))
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidParams { .. }));
    }
}
