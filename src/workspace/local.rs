// src/workspace/local.rs

use super::{Workspace, WorkspaceError, normalize, relative_to};
use crate::models::EditorState;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never enumerated by [`LocalWorkspace::files`].
const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules", ".idea", ".gradle", "build"];

/// A workspace backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    editor: Option<EditorState>,
}

impl LocalWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = fs::canonicalize(root)
            .map(|p| dunce::simplified(&p).to_path_buf())
            .unwrap_or_else(|_| root.to_path_buf());
        Self { root, editor: None }
    }

    /// Attaches the editor state reported by [`Workspace::default_editor`].
    pub fn with_editor(mut self, editor: EditorState) -> Self {
        self.editor = Some(editor);
        self
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let relative = normalize(path)?;
        Ok(self.root.join(relative))
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> Result<String, WorkspaceError> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        fs::read_to_string(&full).map_err(|source| WorkspaceError::Io {
            path: path.to_string(),
            source,
        })
    }

    fn write(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve(path)?;
        let io_err = |source| WorkspaceError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&full, content).map_err(io_err)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !IGNORED_DIRS.iter().any(|dir| *dir == name)
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable workspace entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| relative_to(&self.root, entry.path()))
            .collect();
        files.sort();
        files
    }

    fn default_editor(&self) -> Option<EditorState> {
        self.editor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_write_and_enumerate() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        let ws = LocalWorkspace::new(dir.path());

        // --- Act ---
        ws.write("src/lib.rs", "pub fn a() {}").unwrap();
        ws.write("README.md", "# hi").unwrap();

        // --- Assert ---
        assert_eq!(ws.read("./src/lib.rs").unwrap(), "pub fn a() {}");
        assert_eq!(ws.files(), vec!["README.md".to_string(), "src/lib.rs".to_string()]);
        assert!(ws.exists("README.md"));
        assert!(matches!(ws.read("missing.txt"), Err(WorkspaceError::NotFound(_))));
        assert!(matches!(ws.read("../x"), Err(WorkspaceError::OutsideRoot(_))));
        assert!(ws.default_editor().is_none());
    }
}
