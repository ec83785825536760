// src/core/settings.rs

//! # Settings
//!
//! Project settings live in `.shire/shire.toml`; user-wide defaults in
//! `~/.config/shire/shire.toml`. The project layer is merged over the global one:
//! scalars override, `env` maps extend, and agents are replaced by name.
//!
//! ```toml
//! shell = "bash"
//! commands_dir = ".shire/commands"
//!
//! [env]
//! RUST_BACKTRACE = "1"
//!
//! [[agents]]
//! name = "reviewer"
//! description = "Reviews diffs"
//! url = "http://localhost:8080/review"
//! ```

use crate::{
    constants::DEFAULT_COMMANDS_DIR,
    core::paths::{self, PathError},
    models::AgentConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub agents: Vec<AgentConfig>,
    /// Program used by `/shell`; defaults to `sh` (or `cmd` on Windows).
    pub shell: Option<String>,
    /// Extra environment for every spawned process.
    pub env: HashMap<String, String>,
    /// Where custom command documents are looked up, relative to the project root.
    pub commands_dir: Option<String>,
}

/// Lookup of `@agent` references.
pub trait AgentRegistry: Send + Sync {
    fn find_agent(&self, name: &str) -> Option<AgentConfig>;
}

impl AgentRegistry for Settings {
    fn find_agent(&self, name: &str) -> Option<AgentConfig> {
        self.agents.iter().find(|a| a.name == name).cloned()
    }
}

impl Settings {
    /// Loads the global layer, then the project layer on top.
    pub fn load(project_root: &Path) -> Result<Self, SettingsError> {
        let global = match paths::get_global_settings_path() {
            Ok(path) => Self::load_file(&path)?.unwrap_or_default(),
            Err(e) => {
                log::debug!("No global settings: {}", e);
                Self::default()
            }
        };
        let project = Self::load_file(&paths::project_settings_path(project_root))?;
        Ok(match project {
            Some(project) => global.merge(project),
            None => global,
        })
    }

    /// Reads one settings file; a missing file is `Ok(None)`.
    pub fn load_file(path: &Path) -> Result<Option<Self>, SettingsError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(Some(settings))
    }

    /// Layers `over` on top of `self`.
    pub fn merge(mut self, over: Self) -> Self {
        for agent in over.agents {
            match self.agents.iter_mut().find(|a| a.name == agent.name) {
                Some(slot) => *slot = agent,
                None => self.agents.push(agent),
            }
        }
        self.env.extend(over.env);
        if over.shell.is_some() {
            self.shell = over.shell;
        }
        if over.commands_dir.is_some() {
            self.commands_dir = over.commands_dir;
        }
        self
    }

    /// The custom-command directory, relative to the workspace root.
    pub fn commands_dir(&self) -> &str {
        self.commands_dir.as_deref().unwrap_or(DEFAULT_COMMANDS_DIR)
    }

    /// The shell program and the flag that makes it run a script file.
    pub fn shell_program(&self) -> (String, Vec<String>) {
        match self.shell.as_deref() {
            Some(shell) if shell.ends_with("cmd") || shell.ends_with("cmd.exe") => {
                (shell.to_string(), vec!["/C".to_string()])
            }
            Some(shell) if shell.contains("powershell") || shell.contains("pwsh") => {
                (shell.to_string(), vec!["-File".to_string()])
            }
            Some(shell) => (shell.to_string(), Vec::new()),
            None if cfg!(target_os = "windows") => ("cmd".to_string(), vec!["/C".to_string()]),
            None => ("sh".to_string(), Vec::new()),
        }
    }

    /// Resolves `commands_dir` to an absolute path below `root`.
    pub fn commands_path(&self, root: &Path) -> Result<PathBuf, SettingsError> {
        Ok(paths::expand_path(self.commands_dir(), root)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn agent(name: &str, url: &str) -> AgentConfig {
        AgentConfig {
            name: name.to_string(),
            description: None,
            url: Some(url.to_string()),
        }
    }

    #[test]
    fn test_load_file_parses_agents_and_env() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("shire.toml");
        fs::write(
            &path,
            r#"
shell = "bash"

[env]
MODE = "test"

[[agents]]
name = "reviewer"
url = "http://localhost/review"
"#,
        )
        .unwrap();

        // --- Act ---
        let settings = Settings::load_file(&path).unwrap().unwrap();

        // --- Assert ---
        assert_eq!(settings.shell.as_deref(), Some("bash"));
        assert_eq!(settings.env.get("MODE").map(String::as_str), Some("test"));
        assert_eq!(
            settings.find_agent("reviewer"),
            Some(agent("reviewer", "http://localhost/review"))
        );
        assert_eq!(settings.commands_dir(), DEFAULT_COMMANDS_DIR);
        assert!(Settings::load_file(&dir.path().join("missing.toml")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shire.toml");
        fs::write(&path, "colour = \"red\"").unwrap();
        assert!(matches!(
            Settings::load_file(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_merge_project_over_global() {
        let global = Settings {
            agents: vec![agent("a", "g"), agent("b", "g")],
            shell: Some("zsh".into()),
            env: HashMap::from([("X".to_string(), "1".to_string())]),
            commands_dir: None,
        };
        let project = Settings {
            agents: vec![agent("b", "p")],
            shell: None,
            env: HashMap::from([("Y".to_string(), "2".to_string())]),
            commands_dir: Some("prompts".into()),
        };
        let merged = global.merge(project);
        assert_eq!(merged.agents, vec![agent("a", "g"), agent("b", "p")]);
        assert_eq!(merged.shell.as_deref(), Some("zsh"));
        assert_eq!(merged.env.len(), 2);
        assert_eq!(merged.commands_dir(), "prompts");
    }
}
