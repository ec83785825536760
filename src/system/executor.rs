// src/system/executor.rs

use crate::CancellationToken;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{command}' exited with code {code:?}: {stderr}")]
    NonZeroExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// What a finished process wrote, plus its exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, the way a terminal would interleave them at the end.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Returns `Err(Cancelled)` once the token has been set.
pub fn check_for_cancellation(cancellation_token: &CancellationToken) -> Result<(), ExecutionError> {
    if cancellation_token.load(Ordering::SeqCst) {
        Err(ExecutionError::Cancelled)
    } else {
        Ok(())
    }
}

/// Splits a command line with shell quoting rules and runs it, returning stdout.
/// A non-zero exit is an error.
pub async fn execute_and_capture_output(
    command_line: &str,
    cwd: &Path,
    env_vars: &HashMap<String, String>,
    cancellation_token: &CancellationToken,
) -> Result<String, ExecutionError> {
    let trimmed_command = command_line.trim();
    if trimmed_command.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let parts = shlex::split(trimmed_command)
        .ok_or_else(|| ExecutionError::CommandParse(trimmed_command.to_string()))?;
    let Some((program, args)) = parts.split_first() else {
        return Err(ExecutionError::EmptyCommand);
    };

    let output = run_program(program, args, cwd, env_vars, None, cancellation_token).await?;
    if !output.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: trimmed_command.to_string(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Spawns a program and captures both output streams, optionally feeding `stdin`.
///
/// The wait loop polls the cancellation token; when it is set the child is
/// killed and `ExecutionError::Cancelled` is returned.
pub async fn run_program(
    program: &str,
    args: &[String],
    cwd: &Path,
    env_vars: &HashMap<String, String>,
    stdin: Option<&str>,
    cancellation_token: &CancellationToken,
) -> Result<CapturedOutput, ExecutionError> {
    check_for_cancellation(cancellation_token)?;

    let clean_cwd = dunce::simplified(cwd);
    let display = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    let build = |program: &str, args: &[String]| {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(clean_cwd)
            .envs(env_vars)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    };

    // Built-ins like `echo` only exist inside cmd.exe on Windows.
    let mut child = match build(program, args).spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
            let wrapped = vec!["/C".to_string(), display.clone()];
            build("cmd", &wrapped)
                .spawn()
                .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?
        }
        Err(e) => return Err(ExecutionError::CommandFailed(display, e)),
    };

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;
        drop(pipe);
    }

    let code = wait_with_cancellation(&mut child, &display, cancellation_token).await?;

    let stdout = collect(stdout_reader, &display).await?;
    let stderr = collect(stderr_reader, &display).await?;
    log::trace!("'{}' exited with {:?}", display, code);
    Ok(CapturedOutput {
        stdout,
        stderr,
        code,
    })
}

async fn wait_with_cancellation(
    child: &mut Child,
    display: &str,
    cancellation_token: &CancellationToken,
) -> Result<Option<i32>, ExecutionError> {
    loop {
        tokio::select! {
            status = child.wait() => {
                return status
                    .map(|s| s.code())
                    .map_err(|e| ExecutionError::CommandFailed(display.to_string(), e));
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if check_for_cancellation(cancellation_token).is_err() {
                    log::debug!("Cancellation requested, killing child process ({})...", display);
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill child process '{}': {}", display, e);
                    }
                    return Err(ExecutionError::Cancelled);
                }
            }
        }
    }
}

type Reader = Option<tokio::task::JoinHandle<std::io::Result<Vec<u8>>>>;

fn spawn_reader<R>(pipe: Option<R>) -> Reader
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer).await?;
            Ok(buffer)
        })
    })
}

async fn collect(reader: Reader, display: &str) -> Result<String, ExecutionError> {
    let Some(handle) = reader else {
        return Ok(String::new());
    };
    let bytes = handle
        .await
        .map_err(|e| ExecutionError::CommandFailed(display.to_string(), std::io::Error::other(e)))?
        .map_err(|e| ExecutionError::CommandFailed(display.to_string(), e))?;
    String::from_utf8(bytes).map_err(|source| ExecutionError::InvalidUtf8Output {
        command: display.to_string(),
        source,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let dir = tempdir().unwrap();
        let out = execute_and_capture_output("echo 'hello world'", dir.path(), &HashMap::new(), &token())
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let dir = tempdir().unwrap();
        let out = run_program("cat", &[], dir.path(), &HashMap::new(), Some("piped"), &token())
            .await
            .unwrap();
        assert_eq!(out.stdout, "piped");
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let dir = tempdir().unwrap();
        let err = execute_and_capture_output("false", dir.path(), &HashMap::new(), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NonZeroExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let dir = tempdir().unwrap();
        let cancel = token();
        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let started = std::time::Instant::now();
        let err = execute_and_capture_output("sleep 10", dir.path(), &HashMap::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempdir().unwrap();
        let err = execute_and_capture_output("definitely-not-a-program-xyz", dir.path(), &HashMap::new(), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::CommandFailed(..)));
    }
}
