// src/commands/host.rs

use super::{CommandError, CommandInput, ShireCommand};
use crate::core::session::Session;
use async_trait::async_trait;

/// The editor the engine runs inside. Commands that need language analysis,
/// navigation, a browser or a database are forwarded here; the default
/// implementation of every method reports the command as unsupported.
#[async_trait]
pub trait IdeHost: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "none"
    }

    /// Serves a host-only command.
    async fn execute(
        &self,
        command: &str,
        _props: &str,
        _code_block: Option<&str>,
    ) -> Result<String, CommandError> {
        Err(CommandError::Unsupported(command.to_string()))
    }

    /// Opens a file in the editor.
    async fn open_file(&self, _path: &str) -> Result<(), CommandError> {
        Err(CommandError::Unsupported("open".to_string()))
    }
}

/// The host used when the engine runs headless.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHost;

impl IdeHost for NoHost {}

/// A builtin whose whole behaviour belongs to the host.
#[derive(Debug, Clone)]
pub struct HostCommand {
    name: &'static str,
    input: CommandInput,
}

impl HostCommand {
    pub fn new(name: &'static str, input: CommandInput) -> Self {
        Self { name, input }
    }
}

#[async_trait]
impl ShireCommand for HostCommand {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        log::debug!(
            "Forwarding /{} to host '{}'",
            self.name,
            session.host.name()
        );
        session
            .host
            .execute(self.name, &self.input.props, self.input.code_block.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SHIRE_ERROR;
    use crate::workspace::MemoryWorkspace;
    use std::sync::Arc;

    struct EchoHost;

    #[async_trait]
    impl IdeHost for EchoHost {
        async fn execute(
            &self,
            command: &str,
            props: &str,
            _code_block: Option<&str>,
        ) -> Result<String, CommandError> {
            Ok(format!("{}:{}", command, props))
        }
    }

    fn input(props: &str) -> CommandInput {
        CommandInput {
            props: props.to_string(),
            code_block: None,
        }
    }

    #[tokio::test]
    async fn test_headless_host_reports_unsupported() {
        let session = Session::new(Arc::new(MemoryWorkspace::new()));
        let out = HostCommand::new("symbol", input("Foo")).do_execute(&session).await;
        assert!(out.starts_with(SHIRE_ERROR));
        assert!(out.contains("not supported"));
    }

    #[tokio::test]
    async fn test_custom_host_serves_command() {
        let session =
            Session::new(Arc::new(MemoryWorkspace::new())).with_host(Arc::new(EchoHost));
        let out = HostCommand::new("goto", input("Foo#bar")).do_execute(&session).await;
        assert_eq!(out, "goto:Foo#bar");
    }
}
