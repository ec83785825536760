// src/workspace/memory.rs

use super::{Workspace, WorkspaceError, normalize};
use crate::models::EditorState;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// In-memory workspace. Thread-safe via an internal `RwLock`; nothing touches disk.
#[derive(Debug)]
pub struct MemoryWorkspace {
    root: PathBuf,
    files: RwLock<BTreeMap<String, String>>,
    editor: Option<EditorState>,
}

impl Default for MemoryWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/workspace"),
            files: RwLock::new(BTreeMap::new()),
            editor: None,
        }
    }

    /// Builder-style insert, for fixtures.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        if let Err(e) = self.write(path, content) {
            log::warn!("Ignoring fixture '{}': {}", path, e);
        }
        self
    }

    pub fn with_editor(mut self, editor: EditorState) -> Self {
        self.editor = Some(editor);
        self
    }
}

impl Workspace for MemoryWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> Result<String, WorkspaceError> {
        let key = normalize(path)?;
        let files = self.files.read().map_err(|_| poisoned(path))?;
        files
            .get(&key)
            .cloned()
            .ok_or_else(|| WorkspaceError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let key = normalize(path)?;
        let mut files = self.files.write().map_err(|_| poisoned(path))?;
        files.insert(key, content.to_string());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let Ok(key) = normalize(path) else {
            return false;
        };
        self.files
            .read()
            .map(|files| {
                files.contains_key(&key)
                    || files.keys().any(|k| k.starts_with(&format!("{}/", key)))
            })
            .unwrap_or(false)
    }

    fn files(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn default_editor(&self) -> Option<EditorState> {
        self.editor.clone()
    }
}

fn poisoned(path: &str) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.to_string(),
        source: std::io::Error::other("workspace lock poisoned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_workspace() {
        let ws = MemoryWorkspace::new()
            .with_file("b.txt", "B")
            .with_file("/a/x.txt", "X");
        assert_eq!(ws.files(), vec!["a/x.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(ws.read("a/x.txt").unwrap(), "X");
        assert!(ws.exists("a"));
        assert!(!ws.exists("c.txt"));
        assert!(ws.read("c.txt").is_err());
    }
}
