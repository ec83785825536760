// src/commands/vcs.rs

use super::{CommandError, CommandInput, ShireCommand};
use crate::{core::session::Session, system::executor};
use async_trait::async_trait;

/// `/rev:<revision>`: the output of `git show` for a revision.
#[derive(Debug, Clone)]
pub struct RevCommand {
    input: CommandInput,
}

impl RevCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for RevCommand {
    fn name(&self) -> &str {
        "rev"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let revision = self.input.props.trim();
        if revision.is_empty() || revision.starts_with('-') {
            return Err(CommandError::InvalidProps {
                props: revision.to_string(),
                message: "expected a git revision".to_string(),
            });
        }
        let args = vec![
            "show".to_string(),
            "--no-color".to_string(),
            revision.to_string(),
        ];
        let output = executor::run_program(
            "git",
            &args,
            session.workspace.root(),
            &session.env(),
            None,
            &session.cancellation_token,
        )
        .await?;
        if !output.success() {
            return Err(executor::ExecutionError::NonZeroExitStatus {
                command: format!("git show {}", revision),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(output.stdout.trim_end().to_string())
    }
}

/// `/commit` followed by a code block: commits staged changes with the block as message.
#[derive(Debug, Clone)]
pub struct CommitCommand {
    input: CommandInput,
}

impl CommitCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for CommitCommand {
    fn name(&self) -> &str {
        "commit"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let message = self
            .input
            .code_block
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CommandError::MissingCodeBlock("commit".to_string()))?;

        let args = vec!["commit".to_string(), "-m".to_string(), message.to_string()];
        let output = executor::run_program(
            "git",
            &args,
            session.workspace.root(),
            &session.env(),
            None,
            &session.cancellation_token,
        )
        .await?;
        if !output.success() {
            return Err(executor::ExecutionError::NonZeroExitStatus {
                command: "git commit".to_string(),
                code: output.code,
                stderr: output.combined().trim().to_string(),
            }
            .into());
        }
        log::info!("Committed: {}", message.lines().next().unwrap_or_default());
        Ok(format!("Committing...\n{}", output.stdout.trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemoryWorkspace;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(Arc::new(MemoryWorkspace::new()))
    }

    #[tokio::test]
    async fn test_commit_requires_message_block() {
        let cmd = CommitCommand::new(CommandInput {
            props: String::new(),
            code_block: Some("   ".to_string()),
        });
        let err = cmd.execute(&session()).await.unwrap_err();
        assert!(matches!(err, CommandError::MissingCodeBlock(_)));
    }

    #[tokio::test]
    async fn test_rev_rejects_option_like_revisions() {
        let cmd = RevCommand::new(CommandInput {
            props: "--output=/tmp/x".to_string(),
            code_block: None,
        });
        let err = cmd.execute(&session()).await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidProps { .. }));
    }
}
