//! # Workspace
//!
//! The file resolver the engine reads documents, pipeline sources and command
//! targets through. All paths are relative to the workspace root and use `/`
//! separators, whatever the host platform.
//!
//! - **`local`**: a real directory on disk, enumerated with `walkdir`.
//! - **`memory`**: an in-memory tree, used by tests and by hosts that hold
//!   unsaved buffers.

pub mod local;
pub mod memory;

pub use local::LocalWorkspace;
pub use memory::MemoryWorkspace;

use crate::models::EditorState;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Path '{0}' escapes the workspace root")]
    OutsideRoot(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait Workspace: Send + Sync {
    /// Absolute root of the workspace.
    fn root(&self) -> &Path;

    fn read(&self, path: &str) -> Result<String, WorkspaceError>;

    /// Writes a file, creating parent directories as needed.
    fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError>;

    fn exists(&self, path: &str) -> bool;

    /// Every file in the workspace as a sorted list of relative paths.
    fn files(&self) -> Vec<String>;

    /// The editor position the host was at, if it has one.
    fn default_editor(&self) -> Option<EditorState> {
        None
    }
}

/// Normalises a user-supplied path to the workspace-relative `a/b/c` form.
/// Leading `/` and `./` are dropped; `..` may not climb above the root.
pub fn normalize(path: &str) -> Result<String, WorkspaceError> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path.trim()).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(WorkspaceError::OutsideRoot(path.to_string()));
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok(parts.join("/"))
}

/// Converts an on-disk path below `root` to its relative `/` form.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// The file name part of a relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/src/./main.rs").unwrap(), "src/main.rs");
        assert_eq!(normalize("src/a/../b.rs").unwrap(), "src/b.rs");
        assert!(normalize("../etc/passwd").is_err());
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("c.txt"), "c.txt");
    }
}
