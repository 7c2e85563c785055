//! Path sandboxing for the file tools.
//!
//! Relative paths resolve against the workspace root. Resolved paths must
//! stay inside that root (when one is configured) and must not fall under a
//! forbidden prefix such as `~/.ssh` or `/etc`.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Path '{path}' is outside the workspace root")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    Forbidden { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    Traversal { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

/// Where the file tools are allowed to look.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    root: Option<PathBuf>,
    forbidden: Vec<String>,
}

impl Sandbox {
    pub fn new(root: Option<PathBuf>, forbidden: Vec<String>) -> Self {
        Self { root, forbidden }
    }

    /// Resolve a model-supplied path to the absolute path to touch.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let raw = Path::new(path);
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SandboxError::Traversal { path: path.into() });
        }

        let root = match &self.root {
            Some(root) => Some(canonical_or_raw(root)),
            None => None,
        };
        let joined = match (&root, raw.is_absolute()) {
            (Some(root), false) => root.join(raw),
            _ => raw.to_path_buf(),
        };
        let resolved = canonicalize_lenient(&joined).map_err(|reason| {
            SandboxError::Unresolvable {
                path: path.into(),
                reason,
            }
        })?;

        for pattern in &self.forbidden {
            let prefix = canonical_or_raw(&expand_tilde(pattern));
            if resolved.starts_with(&prefix) {
                return Err(SandboxError::Forbidden {
                    path: path.into(),
                    pattern: pattern.clone(),
                });
            }
        }

        if let Some(root) = root
            && !resolved.starts_with(&root)
        {
            return Err(SandboxError::OutsideWorkspace { path: path.into() });
        }

        Ok(resolved)
    }
}

/// Canonicalize the path, or its parent when the file does not exist yet.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, String> {
    if path.exists() {
        return path.canonicalize().map_err(|e| e.to_string());
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if parent.exists() => parent
            .canonicalize()
            .map(|p| p.join(name))
            .map_err(|e| format!("parent dir: {e}")),
        _ => Ok(path.to_path_buf()),
    }
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn expand_tilde(pattern: &str) -> PathBuf {
    if let Some(rest) = pattern.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(pattern)
}
