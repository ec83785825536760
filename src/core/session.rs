// src/core/session.rs

use crate::{
    CancellationToken,
    commands::{
        host::{IdeHost, NoHost},
        registry::{CommandRegistry, DefaultCommandRegistry},
    },
    core::settings::{AgentRegistry, Settings},
    models::EditorState,
    state::ContextStore,
    workspace::Workspace,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything one interpretation session talks to: the workspace, the host,
/// the registries, the shared context store and the cancellation token.
///
/// Cloning is cheap; nested walks share the same collaborators.
#[derive(Clone)]
pub struct Session {
    pub workspace: Arc<dyn Workspace>,
    pub host: Arc<dyn IdeHost>,
    pub commands: Arc<dyn CommandRegistry>,
    pub agents: Arc<dyn AgentRegistry>,
    pub settings: Arc<Settings>,
    pub context: Arc<ContextStore>,
    /// Overrides the workspace's editor state when set.
    pub editor: Option<EditorState>,
    pub cancellation_token: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.workspace.root())
            .field("editor", &self.editor)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session with no host, default settings and a fresh context store.
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        let settings = Arc::new(Settings::default());
        Self {
            workspace,
            host: Arc::new(NoHost),
            commands: Arc::new(DefaultCommandRegistry::new(settings.commands_dir())),
            agents: settings.clone(),
            settings,
            context: Arc::new(ContextStore::new()),
            editor: None,
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Installs settings, rebuilding the registries that derive from them.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        self.commands = Arc::new(DefaultCommandRegistry::new(settings.commands_dir()));
        self.agents = settings.clone();
        self.settings = settings;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn IdeHost>) -> Self {
        self.host = host;
        self
    }

    pub fn with_context(mut self, context: Arc<ContextStore>) -> Self {
        self.context = context;
        self
    }

    pub fn with_editor(mut self, editor: EditorState) -> Self {
        self.editor = Some(editor);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// The current edit position: the session override, else the workspace's.
    pub fn editor(&self) -> Option<EditorState> {
        self.editor
            .clone()
            .or_else(|| self.workspace.default_editor())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::SeqCst);
    }

    /// Environment for spawned processes.
    pub fn env(&self) -> HashMap<String, String> {
        self.settings.env.clone()
    }
}
