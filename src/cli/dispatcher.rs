// src/cli/dispatcher.rs

use anyhow::{Result, bail};

use crate::{CancellationToken, cli::handlers, constants::DOCUMENT_EXTENSION};

// --- Command Definition and Registry ---

/// A CLI action, its aliases and its handler.
#[derive(Debug)]
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &CancellationToken) -> Result<()>,
}

/// Every action the binary knows. `cache` is for debugging and stays out of the help.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "compile",
        aliases: &["c"],
        handler: handlers::compile::handle,
    },
    CommandDefinition {
        name: "vars",
        aliases: &["variables"],
        handler: handlers::vars::handle,
    },
    CommandDefinition {
        name: "post",
        aliases: &[],
        handler: handlers::post::handle,
    },
    CommandDefinition {
        name: "cache",
        aliases: &["_cache"],
        handler: handlers::cache::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Splits the raw arguments into an action and its arguments.
/// A first argument that is not an action but names a document is a shortcut for `run`.
fn route(mut args: Vec<String>) -> Result<(&'static CommandDefinition, Vec<String>)> {
    let Some(first) = args.first() else {
        bail!("No action given. Run `shire --help` for usage.");
    };
    if let Some(command) = find_command(first) {
        args.remove(0);
        return Ok((command, args));
    }
    let path = std::path::Path::new(first);
    let is_document = path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION);
    if (is_document || path.is_file())
        && let Some(run) = find_command("run")
    {
        return Ok((run, args));
    }
    bail!("Unknown action '{}'. Run `shire --help` for usage.", first)
}

/// Routes the arguments to their handler and runs it.
pub fn dispatch(args: Vec<String>, token: &CancellationToken) -> Result<()> {
    log::debug!("Dispatching: {:?}", args);
    let (command, handler_args) = route(args)?;
    log::debug!("Action '{}' with {:?}", command.name, handler_args);
    (command.handler)(handler_args, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_route_by_name_and_alias() {
        let (cmd, rest) = route(strings(&["compile", "a.shire", "-v"])).unwrap();
        assert_eq!(cmd.name, "compile");
        assert_eq!(rest, strings(&["a.shire", "-v"]));

        let (cmd, _) = route(strings(&["variables", "a.shire"])).unwrap();
        assert_eq!(cmd.name, "vars");
    }

    #[test]
    fn test_document_path_is_implicit_run() {
        let (cmd, rest) = route(strings(&["prompts/summary.shire", "--selection", "x"])).unwrap();
        assert_eq!(cmd.name, "run");
        assert_eq!(rest, strings(&["prompts/summary.shire", "--selection", "x"]));
    }

    #[test]
    fn test_unknown_and_empty_are_errors() {
        assert!(route(Vec::new()).is_err());
        let err = route(strings(&["frobnicate"])).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }
}
