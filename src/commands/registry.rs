// src/commands/registry.rs

use super::{
    CommandInput, ShireCommand, file, host::HostCommand, patch::PatchCommand, search, shell,
    vcs, write::WriteCommand,
};
use crate::{
    constants::DOCUMENT_EXTENSION,
    core::syntax,
    models::Document,
    workspace::Workspace,
};

/// A builtin command: its name, its syntactic requirements and how to build it.
#[derive(Debug)]
pub struct BuiltinCommand {
    pub name: &'static str,
    pub description: &'static str,
    /// A directive without `:props` is an error.
    pub require_props: bool,
    /// The command consumes the next fenced code block as its payload.
    pub reads_code_block: bool,
    /// Execution stays on this machine; no model call is involved.
    pub local: bool,
    pub factory: fn(CommandInput) -> Box<dyn ShireCommand>,
}

/// The single source of truth for all builtin commands.
static BUILTIN_COMMANDS: &[BuiltinCommand] = &[
    BuiltinCommand {
        name: "file",
        description: "Read a file, optionally a line range (path#L1-L9)",
        require_props: true,
        reads_code_block: false,
        local: false,
        factory: |input| Box::new(file::FileCommand::new(input)),
    },
    BuiltinCommand {
        name: "rev",
        description: "Show a git revision",
        require_props: true,
        reads_code_block: false,
        local: false,
        factory: |input| Box::new(vcs::RevCommand::new(input)),
    },
    BuiltinCommand {
        name: "symbol",
        description: "Look up a symbol",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(HostCommand::new("symbol", input)),
    },
    BuiltinCommand {
        name: "write",
        description: "Write the following code block to a file",
        require_props: true,
        reads_code_block: true,
        local: true,
        factory: |input| Box::new(WriteCommand::new(input)),
    },
    BuiltinCommand {
        name: "patch",
        description: "Apply the following unified diff",
        require_props: false,
        reads_code_block: true,
        local: true,
        factory: |input| Box::new(PatchCommand::new(input)),
    },
    BuiltinCommand {
        name: "run",
        description: "Run a file or run configuration",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(shell::RunCommand::new(input)),
    },
    BuiltinCommand {
        name: "commit",
        description: "Commit staged changes with the following code block as message",
        require_props: false,
        reads_code_block: true,
        local: true,
        factory: |input| Box::new(vcs::CommitCommand::new(input)),
    },
    BuiltinCommand {
        name: "file-func",
        description: "Run a function over a file (file#func(args))",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(HostCommand::new("file-func", input)),
    },
    BuiltinCommand {
        name: "shell",
        description: "Run a shell script",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(shell::ShellCommand::new(input)),
    },
    BuiltinCommand {
        name: "browse",
        description: "Fetch and summarise a web page",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(HostCommand::new("browse", input)),
    },
    BuiltinCommand {
        name: "refactor",
        description: "Refactor the current selection",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(HostCommand::new("refactor", input)),
    },
    BuiltinCommand {
        name: "goto",
        description: "Navigate to a reference",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(HostCommand::new("goto", input)),
    },
    BuiltinCommand {
        name: "structure",
        description: "Show the structure of a file",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(HostCommand::new("structure", input)),
    },
    BuiltinCommand {
        name: "database",
        description: "Run the following SQL against the host's data source",
        require_props: true,
        reads_code_block: true,
        local: true,
        factory: |input| Box::new(HostCommand::new("database", input)),
    },
    BuiltinCommand {
        name: "dir",
        description: "List a directory as a tree",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(file::DirCommand::new(input)),
    },
    BuiltinCommand {
        name: "localSearch",
        description: "Search the workspace for a keyword",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(search::LocalSearchCommand::new(input)),
    },
    BuiltinCommand {
        name: "related",
        description: "List files related to a file",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(file::RelatedCommand::new(input)),
    },
    BuiltinCommand {
        name: "open",
        description: "Open a file in the host editor",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(file::OpenCommand::new(input)),
    },
    BuiltinCommand {
        name: "ripgrepSearch",
        description: "Search the workspace with a regular expression",
        require_props: true,
        reads_code_block: false,
        local: true,
        factory: |input| Box::new(search::RipgrepSearchCommand::new(input)),
    },
];

/// Finds a builtin by name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinCommand> {
    BUILTIN_COMMANDS.iter().find(|cmd| cmd.name == name)
}

/// Every builtin, in table order.
pub fn builtins() -> &'static [BuiltinCommand] {
    BUILTIN_COMMANDS
}

/// Resolves directive names to builtins or project-defined custom commands.
pub trait CommandRegistry: Send + Sync {
    fn builtin(&self, name: &str) -> Option<&'static BuiltinCommand> {
        find_builtin(name)
    }

    /// Loads a custom command as a standalone document.
    fn custom(&self, name: &str, workspace: &dyn Workspace) -> Option<Document>;
}

/// Looks custom commands up as `<commands_dir>/<name>.shire` in the workspace.
#[derive(Debug, Clone)]
pub struct DefaultCommandRegistry {
    commands_dir: String,
}

impl DefaultCommandRegistry {
    pub fn new(commands_dir: impl Into<String>) -> Self {
        Self {
            commands_dir: commands_dir.into(),
        }
    }

    fn path_for(&self, name: &str) -> String {
        format!(
            "{}/{}.{}",
            self.commands_dir.trim_end_matches('/'),
            name,
            DOCUMENT_EXTENSION
        )
    }

    /// Names of every custom command present in the workspace.
    pub fn list(&self, workspace: &dyn Workspace) -> Vec<String> {
        let prefix = format!("{}/", self.commands_dir.trim_end_matches('/'));
        let suffix = format!(".{}", DOCUMENT_EXTENSION);
        workspace
            .files()
            .into_iter()
            .filter_map(|path| {
                path.strip_prefix(&prefix)?
                    .strip_suffix(&suffix)
                    .filter(|name| !name.contains('/'))
                    .map(str::to_string)
            })
            .collect()
    }
}

impl CommandRegistry for DefaultCommandRegistry {
    fn custom(&self, name: &str, workspace: &dyn Workspace) -> Option<Document> {
        let path = self.path_for(name);
        let text = workspace.read(&path).ok()?;
        log::debug!("Resolved custom command '/{}' from {}", name, path);
        Some(syntax::parse_document(&path, &text))
    }
}
