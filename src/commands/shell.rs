// src/commands/shell.rs

use super::{CommandError, CommandInput, ShireCommand};
use crate::{core::session::Session, system::executor};
use async_trait::async_trait;
use std::io::Write;

/// `/shell:script.sh`: runs a workspace script with the configured shell.
///
/// The script is copied to a temporary file first, so scripts held only by the
/// host (unsaved buffers, in-memory workspaces) run the same as files on disk.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    input: CommandInput,
}

impl ShellCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for ShellCommand {
    fn name(&self) -> &str {
        "shell"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let path = self.input.props.trim();
        let script = session.workspace.read(path)?;
        run_script(session, path, &script).await
    }
}

/// Runs script text with the configured shell; `path` only names it in logs.
pub(crate) async fn run_script(
    session: &Session,
    path: &str,
    script: &str,
) -> Result<String, CommandError> {
    let io_err = |e: std::io::Error| executor::ExecutionError::CommandFailed(path.to_string(), e);
    let mut file = tempfile::Builder::new()
        .prefix("shire-")
        .suffix(".sh")
        .tempfile()
        .map_err(io_err)?;
    file.write_all(script.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;

    let (program, mut args) = session.settings.shell_program();
    args.push(file.path().to_string_lossy().into_owned());
    log::debug!("Running {} with {}", path, program);

    let output = executor::run_program(
        &program,
        &args,
        session.workspace.root(),
        &session.env(),
        None,
        &session.cancellation_token,
    )
    .await?;
    if !output.success() {
        log::warn!("{} exited with {:?}", path, output.code);
    }
    Ok(output.combined().trim_end().to_string())
}

/// `/run:target`: asks the host to run a file or run configuration. Shell
/// scripts are run locally when the host cannot.
#[derive(Debug, Clone)]
pub struct RunCommand {
    input: CommandInput,
}

impl RunCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for RunCommand {
    fn name(&self) -> &str {
        "run"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let target = self.input.props.trim();
        match session.host.execute("run", target, None).await {
            Err(CommandError::Unsupported(_)) if target.ends_with(".sh") => {
                let script = session.workspace.read(target)?;
                run_script(session, target, &script).await
            }
            other => other,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::workspace::{LocalWorkspace, MemoryWorkspace};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn input(props: &str) -> CommandInput {
        CommandInput {
            props: props.to_string(),
            code_block: None,
        }
    }

    #[tokio::test]
    async fn test_shell_runs_script_in_workspace_root() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        std::fs::write(dir.path().join("hello.sh"), "echo hello\nls marker.txt\n").unwrap();
        let session = Session::new(Arc::new(LocalWorkspace::new(dir.path())));

        let out = ShellCommand::new(input("hello.sh")).execute(&session).await.unwrap();
        assert_eq!(out, "hello\nmarker.txt");
    }

    #[tokio::test]
    async fn test_run_falls_back_to_shell_for_scripts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("build.sh"), "echo built").unwrap();
        let session = Session::new(Arc::new(LocalWorkspace::new(dir.path())));

        let out = RunCommand::new(input("build.sh")).execute(&session).await.unwrap();
        assert_eq!(out, "built");

        let err = RunCommand::new(input("Main.kt")).execute(&session).await.unwrap_err();
        assert!(matches!(err, CommandError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_shell_missing_script() {
        let session = Session::new(Arc::new(MemoryWorkspace::new()));
        let err = ShellCommand::new(input("nope.sh")).execute(&session).await.unwrap_err();
        assert!(matches!(err, CommandError::Workspace(_)));
    }
}
