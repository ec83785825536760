// src/commands/search.rs

use super::{CommandError, CommandInput, ShireCommand};
use crate::core::session::Session;
use async_trait::async_trait;
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};

/// Results past this many matching lines are dropped.
const MAX_MATCHES: usize = 200;

/// Scans every workspace file in parallel and renders matches as
/// `path:line: text`, in file order.
fn scan(session: &Session, matcher: &Regex) -> Result<String, CommandError> {
    let files = session.workspace.files();
    let per_file: Vec<Vec<String>> = files
        .par_iter()
        .map(|path| {
            if session.is_cancelled() {
                return Vec::new();
            }
            // Binary and unreadable files are skipped.
            let Ok(content) = session.workspace.read(path) else {
                return Vec::new();
            };
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| matcher.is_match(line))
                .take(MAX_MATCHES)
                .map(|(idx, line)| format!("{}:{}: {}", path, idx + 1, line.trim()))
                .collect()
        })
        .collect();
    if session.is_cancelled() {
        return Err(CommandError::Cancelled);
    }

    let mut hits: Vec<String> = per_file.into_iter().flatten().collect();
    if hits.len() > MAX_MATCHES {
        log::debug!("Search truncated at {} matches", MAX_MATCHES);
        hits.truncate(MAX_MATCHES);
    }
    Ok(hits.join("\n"))
}

/// `/localSearch:keyword`: case-insensitive literal search.
#[derive(Debug, Clone)]
pub struct LocalSearchCommand {
    input: CommandInput,
}

impl LocalSearchCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for LocalSearchCommand {
    fn name(&self) -> &str {
        "localSearch"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let keyword = self.input.props.trim();
        if keyword.chars().count() < 2 {
            return Err(CommandError::InvalidProps {
                props: keyword.to_string(),
                message: "keyword must be at least 2 characters".to_string(),
            });
        }
        let matcher = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build()?;
        scan(session, &matcher)
    }
}

/// `/ripgrepSearch:pattern`: regular-expression search.
#[derive(Debug, Clone)]
pub struct RipgrepSearchCommand {
    input: CommandInput,
}

impl RipgrepSearchCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for RipgrepSearchCommand {
    fn name(&self) -> &str {
        "ripgrepSearch"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let matcher = Regex::new(self.input.props.trim())?;
        scan(session, &matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemoryWorkspace;
    use std::sync::Arc;

    fn session() -> Session {
        let ws = MemoryWorkspace::new()
            .with_file("a.rs", "fn Parse() {}\nfn other() {}\n")
            .with_file("b/c.rs", "// parse later\nlet x = 42;\n");
        Session::new(Arc::new(ws))
    }

    fn input(props: &str) -> CommandInput {
        CommandInput {
            props: props.to_string(),
            code_block: None,
        }
    }

    #[tokio::test]
    async fn test_local_search_ignores_case() {
        let out = LocalSearchCommand::new(input("parse"))
            .execute(&session())
            .await
            .unwrap();
        assert_eq!(out, "a.rs:1: fn Parse() {}\nb/c.rs:1: // parse later");
    }

    #[tokio::test]
    async fn test_local_search_rejects_short_keyword() {
        let err = LocalSearchCommand::new(input("p"))
            .execute(&session())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidProps { .. }));
    }

    #[tokio::test]
    async fn test_ripgrep_search_uses_regex() {
        let s = session();
        let out = RipgrepSearchCommand::new(input(r"\d+"))
            .execute(&s)
            .await
            .unwrap();
        assert_eq!(out, "b/c.rs:2: let x = 42;");

        let out = RipgrepSearchCommand::new(input("(")).do_execute(&s).await;
        assert!(super::super::is_failure(&out));
    }
}
