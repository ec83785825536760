// src/cli/handlers/commons.rs

// Shared plumbing for the handlers: locating the project, building a session
// and driving the async engine from the synchronous CLI.

use crate::{
    CancellationToken,
    core::{
        analyzer::SyntaxAnalyzer,
        interpolator,
        paths,
        session::Session,
        settings::Settings,
        syntax,
        variables,
    },
    models::{Document, EditorState, HobbitHole, ParsedResult},
    state,
    workspace::{self, LocalWorkspace},
};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use thiserror::Error;

/// Returned when Ctrl+C stopped a walk; the binary exits with 130 on it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Interrupted")]
pub struct Interrupted;

/// Options every document-reading action accepts.
#[derive(Args, Debug, Clone, Default)]
pub struct DocumentArgs {
    /// Path of the .shire document.
    pub document: String,

    /// Project root. Defaults to the nearest ancestor holding `.shire/` or `.git`.
    #[arg(long)]
    pub root: Option<String>,

    /// The file the editor is on, relative to the project root.
    #[arg(long = "file")]
    pub current_file: Option<String>,

    /// The selected text.
    #[arg(long)]
    pub selection: Option<String>,
}

/// Builds a tokio runtime and drives `future` to completion. Ctrl+C sets
/// `token` instead of killing the process, so running commands are stopped
/// by the executor and the walk winds down.
pub fn block_on<F: Future>(token: &CancellationToken, future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let watcher = token.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::debug!("Ctrl+C received, cancelling");
            watcher.store(true, Ordering::SeqCst);
        }
    });
    Ok(runtime.block_on(future))
}

/// A document loaded from disk together with the session it runs in.
#[derive(Debug)]
pub struct Loaded {
    pub session: Session,
    pub document: Document,
}

/// Resolves the project root, loads its settings and reads the document.
pub fn load(args: &DocumentArgs, token: &CancellationToken) -> Result<Loaded> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let doc_path = paths::expand_path(&args.document, &cwd)?;
    let root = match &args.root {
        Some(raw) => paths::expand_path(raw, &cwd)?,
        None => paths::find_project_root(doc_path.parent().unwrap_or(cwd.as_path())),
    };
    log::debug!("Project root: {}", root.display());

    let settings = Settings::load(&root)
        .with_context(|| format!("Failed to load settings for '{}'", root.display()))?;
    let text = std::fs::read_to_string(&doc_path)
        .with_context(|| format!("Failed to read document '{}'", doc_path.display()))?;

    let ws = Arc::new(LocalWorkspace::new(&root));
    let mut session = Session::new(ws.clone())
        .with_settings(settings)
        .with_context(state::global_context())
        .with_cancellation_token(token.clone());
    if let Some(editor) = editor_state(args, &ws)? {
        session = session.with_editor(editor);
    }

    let name = display_name(&doc_path, &root);
    Ok(Loaded {
        session,
        document: syntax::parse_document(&name, &text),
    })
}

/// The editor position given on the command line, if any part of it was.
fn editor_state(args: &DocumentArgs, ws: &LocalWorkspace) -> Result<Option<EditorState>> {
    if args.current_file.is_none() && args.selection.is_none() {
        return Ok(None);
    }
    let file_content = match &args.current_file {
        Some(path) => Some(
            workspace::Workspace::read(ws, path)
                .with_context(|| format!("Failed to read current file '{}'", path))?,
        ),
        None => None,
    };
    Ok(Some(EditorState {
        file_path: args.current_file.clone(),
        file_content,
        selection: args.selection.clone(),
        language: None,
    }))
}

/// The document's path relative to the root when it lives inside it.
fn display_name(doc_path: &Path, root: &Path) -> String {
    doc_path
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(doc_path))
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walks a document, failing with [`Interrupted`] if the walk was cancelled.
pub async fn walk(session: &Session, document: &Document) -> Result<ParsedResult> {
    let result = SyntaxAnalyzer::new(session, document).parse().await;
    if result.cancelled {
        return Err(Interrupted.into());
    }
    Ok(result)
}

/// Prints what went wrong during a walk to stderr. Returns true if anything did.
pub fn report(result: &ParsedResult) -> bool {
    if let Some(e) = &result.config_error {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }
    for e in &result.errors {
        eprintln!("{} {}", "error:".red().bold(), e);
    }
    result.has_error || result.config_error.is_some()
}

/// The outcome of running one document end to end.
#[derive(Debug)]
pub struct Rendered {
    pub name: String,
    pub result: ParsedResult,
    pub bindings: HashMap<String, String>,
    /// `None` when the document's `when` condition does not hold.
    pub prompt: Option<String>,
}

/// Walks, resolves variables, checks `when` and renders, then follows the
/// `[flow]:` chain. A document is never run twice in one chain.
pub async fn run_chain(session: &Session, first: Document) -> Result<Vec<Rendered>> {
    let mut rendered = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(first);
    while let Some(document) = next.take() {
        if !visited.insert(document.name.clone()) {
            log::warn!("Flow returns to '{}', stopping the chain", document.name);
            break;
        }
        let result = walk(session, &document).await?;
        let bindings = variables::resolve(session, result.config.as_ref()).await;
        let enabled = match result.config.as_ref().and_then(|c| c.when.as_ref()) {
            Some(when) => when
                .evaluate(&bindings)
                .with_context(|| format!("Invalid 'when' condition in '{}'", document.name))?,
            None => true,
        };
        let prompt = if enabled {
            if let Some(config) = &result.config {
                carry_variables(session, config, &bindings);
            }
            Some(
                interpolator::render(&result.shire_output, &bindings)
                    .with_context(|| format!("Failed to render '{}'", document.name))?,
            )
        } else {
            None
        };
        next = result.next_job.clone().map(|job| *job);
        rendered.push(Rendered {
            name: document.name,
            result,
            bindings,
            prompt,
        });
    }
    Ok(rendered)
}

/// Hands a document's own variables to the rest of the chain through the
/// context store. A value of `$` unsets the name for later documents.
fn carry_variables(session: &Session, config: &HobbitHole, bindings: &HashMap<String, String>) {
    let updates = config
        .variables
        .iter()
        .filter_map(|(name, _)| bindings.get(name).map(|value| (name.clone(), value.clone())));
    session.context.merge(updates);
}
