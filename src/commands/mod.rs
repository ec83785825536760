//! # Commands
//!
//! Every `/name:props` directive resolves to a [`ShireCommand`]. Commands share
//! one async contract: `execute` returns the text to splice into the output, or
//! a [`CommandError`]. The walker only ever calls [`ShireCommand::do_execute`],
//! which folds errors into the in-band `<SHIRE_ERROR>` marker so a failed command
//! degrades to its own source text instead of aborting the walk.
//!
//! - **`registry`**: the builtin table and custom-command lookup.
//! - **`host`**: the `IdeHost` trait for commands only an editor can serve.
//! - **`file`**, **`vcs`**, **`write`**, **`patch`**, **`shell`**, **`search`**:
//!   the commands implemented locally.

pub mod file;
pub mod host;
pub mod patch;
pub mod registry;
pub mod search;
pub mod shell;
pub mod vcs;
pub mod write;

use crate::{
    constants::{SHIRE_CANCELLED, SHIRE_ERROR},
    core::session::Session,
    system::executor::ExecutionError,
    workspace::WorkspaceError,
};
use async_trait::async_trait;
use registry::BuiltinCommand;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("/{0} requires a property, e.g. /{0}:value")]
    MissingProps(String),
    #[error("/{0} expects a fenced code block right after it")]
    MissingCodeBlock(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Invalid property '{props}': {message}")]
    InvalidProps { props: String, message: String },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Patch failed: {0}")]
    Patch(String),
    #[error("/{0} is not supported by this host")]
    Unsupported(String),
    #[error("Cancelled")]
    Cancelled,
}

impl CommandError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Execution(ExecutionError::Cancelled)
        )
    }
}

/// The execution contract shared by every command kind.
#[async_trait]
pub trait ShireCommand: Send + Sync {
    /// The directive name this command answers to.
    fn name(&self) -> &str;

    async fn execute(&self, session: &Session) -> Result<String, CommandError>;

    /// Runs the command and maps failures to the in-band markers.
    async fn do_execute(&self, session: &Session) -> String {
        match self.execute(session).await {
            Ok(output) => output,
            Err(e) if e.is_cancelled() => SHIRE_CANCELLED.to_string(),
            Err(e) => {
                log::warn!("/{} failed: {}", self.name(), e);
                format!("{} {}", SHIRE_ERROR, e)
            }
        }
    }
}

/// The inputs a builtin is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInput {
    pub props: String,
    /// The fenced code block following the directive, for commands that read one.
    pub code_block: Option<String>,
}

/// Instantiates the command for a builtin table entry.
pub fn create(builtin: &'static BuiltinCommand, input: CommandInput) -> Box<dyn ShireCommand> {
    (builtin.factory)(input)
}

/// Returns true if a command result carries the failure marker.
pub fn is_failure(output: &str) -> bool {
    output.contains(SHIRE_ERROR)
}

/// Splits `path#L3-L7` into the path and an optional 1-based inclusive line range.
pub fn split_line_range(props: &str) -> Result<(&str, Option<(usize, usize)>), CommandError> {
    let Some((path, range)) = props.split_once('#') else {
        return Ok((props, None));
    };
    let invalid = || CommandError::InvalidProps {
        props: props.to_string(),
        message: "expected #L<start>-L<end>".to_string(),
    };
    let parse = |s: &str| {
        s.trim_start_matches('L')
            .parse::<usize>()
            .map_err(|_| invalid())
    };
    let (start, end) = match range.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let line = parse(range)?;
            (line, line)
        }
    };
    if start == 0 || end < start {
        return Err(invalid());
    }
    Ok((path, Some((start, end))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_line_range() {
        assert_eq!(split_line_range("a.rs").unwrap(), ("a.rs", None));
        assert_eq!(split_line_range("a.rs#L2-L4").unwrap(), ("a.rs", Some((2, 4))));
        assert_eq!(split_line_range("a.rs#L3").unwrap(), ("a.rs", Some((3, 3))));
        assert!(split_line_range("a.rs#L4-L2").is_err());
        assert!(split_line_range("a.rs#x").is_err());
    }

    #[test]
    fn test_cancellation_is_recognised() {
        assert!(CommandError::Cancelled.is_cancelled());
        assert!(CommandError::Execution(ExecutionError::Cancelled).is_cancelled());
        assert!(!CommandError::Unsupported("x".into()).is_cancelled());
        assert!(is_failure("<SHIRE_ERROR> nope"));
    }
}
