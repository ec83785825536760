// src/commands/file.rs

use super::{CommandError, CommandInput, ShireCommand, split_line_range};
use crate::{core::session::Session, workspace};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Maps a file extension to the language tag used on code fences.
pub fn language_for(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "kt" | "kts" => "kotlin",
        "java" => "java",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "tsx" => "tsx",
        "jsx" => "jsx",
        "go" => "go",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "sh" | "bash" => "bash",
        "md" => "markdown",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        "shire" => "shire",
        _ => "",
    }
}

/// `/file:path` or `/file:path#L3-L9`: the file (or range) as a fenced block.
#[derive(Debug, Clone)]
pub struct FileCommand {
    input: CommandInput,
}

impl FileCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for FileCommand {
    fn name(&self) -> &str {
        "file"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let (path, range) = split_line_range(self.input.props.trim())?;
        if !session.workspace.exists(path) {
            return Err(CommandError::FileNotFound(path.to_string()));
        }
        let content = session.workspace.read(path)?;
        let content = match range {
            Some((start, end)) => content
                .lines()
                .skip(start - 1)
                .take(end - start + 1)
                .collect::<Vec<_>>()
                .join("\n"),
            None => content.trim_end_matches('\n').to_string(),
        };
        Ok(format!("```{}\n{}\n```", language_for(path), content))
    }
}

/// `/dir:path`: the files below a directory, rendered as an indented tree.
#[derive(Debug, Clone)]
pub struct DirCommand {
    input: CommandInput,
}

impl DirCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for DirCommand {
    fn name(&self) -> &str {
        "dir"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let dir = workspace::normalize(&self.input.props)?;
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let entries: Vec<String> = session
            .workspace
            .files()
            .into_iter()
            .filter_map(|f| f.strip_prefix(&prefix).map(str::to_string))
            .collect();
        if entries.is_empty() {
            return Err(CommandError::FileNotFound(self.input.props.clone()));
        }

        // Every directory and file, each listed once under its parent.
        let mut nodes = BTreeSet::new();
        for entry in &entries {
            let parts: Vec<&str> = entry.split('/').collect();
            for depth in 1..=parts.len() {
                let is_dir = depth < parts.len();
                let prefix = parts.get(..depth).unwrap_or_default();
                nodes.insert((prefix.join("/"), is_dir));
            }
        }
        let root = if dir.is_empty() { "." } else { dir.as_str() };
        let mut out = format!("{}/", root);
        for (path, is_dir) in nodes {
            let depth = path.matches('/').count();
            out.push('\n');
            out.push_str(&"  ".repeat(depth + 1));
            out.push_str(workspace::file_name(&path));
            if is_dir {
                out.push('/');
            }
        }
        Ok(out)
    }
}

/// `/related:path`: the host's answer, or files sharing the same stem.
#[derive(Debug, Clone)]
pub struct RelatedCommand {
    input: CommandInput,
}

impl RelatedCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for RelatedCommand {
    fn name(&self) -> &str {
        "related"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        match session.host.execute("related", &self.input.props, None).await {
            Err(CommandError::Unsupported(_)) => {}
            other => return other,
        }

        let target = workspace::normalize(&self.input.props)?;
        let stem = |path: &str| {
            let name = workspace::file_name(path);
            name.split('.').next().unwrap_or(name).to_lowercase()
        };
        let wanted = stem(&target);
        let related: Vec<String> = session
            .workspace
            .files()
            .into_iter()
            .filter(|f| *f != target && stem(f).contains(&wanted))
            .collect();
        Ok(related.join("\n"))
    }
}

/// `/open:path`: asks the host to open the file.
#[derive(Debug, Clone)]
pub struct OpenCommand {
    input: CommandInput,
}

impl OpenCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for OpenCommand {
    fn name(&self) -> &str {
        "open"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let path = self.input.props.trim();
        if !session.workspace.exists(path) {
            return Err(CommandError::FileNotFound(path.to_string()));
        }
        match session.host.open_file(path).await {
            Ok(()) | Err(CommandError::Unsupported(_)) => Ok(format!("Opening file: {}", path)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemoryWorkspace;
    use std::sync::Arc;

    fn session() -> Session {
        let ws = MemoryWorkspace::new()
            .with_file("src/main.rs", "fn main() {\n    println!(\"hi\");\n}\n")
            .with_file("src/util/mod.rs", "pub mod io;")
            .with_file("tests/main_test.rs", "#[test] fn t() {}");
        Session::new(Arc::new(ws))
    }

    fn input(props: &str) -> CommandInput {
        CommandInput {
            props: props.to_string(),
            code_block: None,
        }
    }

    #[tokio::test]
    async fn test_file_reads_whole_file_and_ranges() {
        let s = session();
        let out = FileCommand::new(input("src/main.rs")).execute(&s).await.unwrap();
        assert_eq!(out, "```rust\nfn main() {\n    println!(\"hi\");\n}\n```");

        let out = FileCommand::new(input("src/main.rs#L2-L2"))
            .execute(&s)
            .await
            .unwrap();
        assert_eq!(out, "```rust\n    println!(\"hi\");\n```");

        let err = FileCommand::new(input("nope.rs")).execute(&s).await.unwrap_err();
        assert!(matches!(err, CommandError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_dir_renders_tree() {
        let out = DirCommand::new(input("src")).execute(&session()).await.unwrap();
        assert_eq!(out, "src/\n  main.rs\n  util/\n    mod.rs");
    }

    #[tokio::test]
    async fn test_related_falls_back_to_stem_matching() {
        let out = RelatedCommand::new(input("src/main.rs"))
            .execute(&session())
            .await
            .unwrap();
        assert_eq!(out, "tests/main_test.rs");
    }

    #[tokio::test]
    async fn test_open_requires_existing_file() {
        let s = session();
        assert!(OpenCommand::new(input("src/main.rs")).execute(&s).await.is_ok());
        assert!(OpenCommand::new(input("missing")).execute(&s).await.is_err());
    }
}
