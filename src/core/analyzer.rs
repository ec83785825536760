// src/core/analyzer.rs

//! # Syntax Analyzer
//!
//! First phase of a run: one depth-first pass over a document's node tree.
//! Text is copied through, the header is compiled, directives are dispatched
//! one at a time in document order and every `$variable` the document touches
//! is recorded with its line. The output still holds `$var` references and
//! `#if` chains; [`super::interpolator`] resolves those afterwards.
//!
//! A failing directive never aborts the walk. It is recorded in the result,
//! its source text stands in for its output and any further clause text of the
//! enclosing conditional is suppressed.

use super::{front_matter, logical::LogicalExpression, session::Session, syntax, variables};
use crate::{
    commands::{self, CommandInput, registry::BuiltinCommand},
    constants::{
        FLOW_FLAG, HEADING_CLOSE, HEADING_OPEN, MAX_RECURSION_DEPTH, SHIRE_CANCELLED, SHIRE_ERROR,
    },
    dev_utils::BlockTimer,
    models::{
        Clause, ConditionalExpr, Directive, Document, NodeKind, ParsedResult, VariableType,
    },
    state,
};
use log::{debug, trace, warn};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// A directive that could not be resolved. Recorded in [`ParsedResult::errors`]
/// and raises [`ParsedResult::has_error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("Unknown command: /{0}")]
    UnknownCommand(String),
    #[error("No property found for /{0}")]
    MissingProps(String),
    #[error("No element found for variable: ${0}")]
    NoEditorContext(String),
    #[error("Custom command /{0} includes itself")]
    Cycle(String),
    #[error("Maximum nesting depth ({0}) exceeded. Check for documents that include each other.")]
    TooDeep(u32),
}

type Walk<'a> = Pin<Box<dyn Future<Output = ParsedResult> + Send + 'a>>;

/// Interprets one document against a session.
pub struct SyntaxAnalyzer<'a> {
    session: &'a Session,
    document: &'a Document,
    depth: u32,
    /// Custom commands currently being expanded, outermost first.
    expanding: Vec<String>,
    walk_id: Uuid,
    result: ParsedResult,
    output: String,
    skip_next_code: bool,
}

impl std::fmt::Debug for SyntaxAnalyzer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxAnalyzer")
            .field("document", &self.document.name)
            .field("depth", &self.depth)
            .field("walk_id", &self.walk_id)
            .finish_non_exhaustive()
    }
}

impl<'a> SyntaxAnalyzer<'a> {
    pub fn new(session: &'a Session, document: &'a Document) -> Self {
        Self {
            session,
            document,
            depth: 0,
            expanding: Vec::new(),
            walk_id: Uuid::new_v4(),
            result: ParsedResult::default(),
            output: String::new(),
            skip_next_code: false,
        }
    }

    /// An analyzer for a sub-document, one level deeper than this one.
    fn nested<'b>(&self, document: &'b Document, expanding: Vec<String>) -> SyntaxAnalyzer<'b>
    where
        'a: 'b,
    {
        SyntaxAnalyzer {
            session: self.session,
            document,
            depth: self.depth + 1,
            expanding,
            walk_id: self.walk_id,
            result: ParsedResult::default(),
            output: String::new(),
            skip_next_code: false,
        }
    }

    /// Walks the whole document. Always completes; failures are reported in
    /// the result.
    pub async fn parse(self) -> ParsedResult {
        self.walk().await
    }

    fn walk(mut self) -> Walk<'a> {
        Box::pin(async move {
            let document = self.document;
            let _timer = BlockTimer::new(format!("walk {} ({})", document.name, self.walk_id));
            trace!(
                "[{}] Walking '{}' at depth {} ({} nodes)",
                self.walk_id,
                document.name,
                self.depth,
                document.nodes.len()
            );
            self.result.source_code = document.text.clone();

            // Comment lines leave no blank line behind.
            let mut eat_newline = false;
            for (index, node) in document.nodes.iter().enumerate() {
                if self.session.is_cancelled() {
                    self.result.cancelled = true;
                }
                if self.result.cancelled {
                    debug!("[{}] Walk of '{}' cancelled", self.walk_id, document.name);
                    break;
                }
                if std::mem::take(&mut eat_newline) && node.kind == NodeKind::Newline {
                    continue;
                }

                match &node.kind {
                    NodeKind::TextSegment | NodeKind::Newline => self.output.push_str(&node.text),
                    NodeKind::CodeBlock(_) => {
                        if std::mem::take(&mut self.skip_next_code) {
                            trace!("Code block at offset {} consumed by a command", node.offset);
                            continue;
                        }
                        self.output.push_str(&node.text);
                    }
                    NodeKind::Comment => {
                        self.comment(&node.text);
                        eat_newline = true;
                    }
                    NodeKind::HeaderBlock(header) => self.header(header),
                    NodeKind::HeaderMarker => {
                        warn!("'{}' opens a header that never closes", document.name);
                        self.output.push_str(&node.text);
                    }
                    NodeKind::Conditional(expr) => self.conditional(expr).await,
                    NodeKind::Directive(Directive::Command { name, props }) => {
                        self.command(index, &node.text, name, props.as_deref()).await;
                    }
                    NodeKind::Directive(Directive::Agent { name, .. }) => self.agent(name),
                    NodeKind::Directive(Directive::Variable { name }) => {
                        match self.register_variable(name, node.offset) {
                            Ok(()) => self.emit_unless_failed(&node.text),
                            Err(e) => {
                                let marker = format!("{} {}", SHIRE_ERROR, e);
                                self.fail(e, &marker);
                            }
                        }
                    }
                    NodeKind::SectionHeading => {
                        self.output.push_str(HEADING_OPEN);
                        self.output.push_str(&node.text);
                        self.output.push_str(HEADING_CLOSE);
                    }
                    // Clauses only appear inside a conditional.
                    NodeKind::Clause(_) => {
                        warn!("Stray clause at offset {} in '{}'", node.offset, document.name);
                        self.output.push_str(&node.text);
                    }
                }
            }

            self.result.shire_output = std::mem::take(&mut self.output);
            if self.depth == 0 && !self.result.has_error && !self.result.cancelled {
                state::cache_compiled(&document.name, &self.result);
            }
            self.result
        })
    }

    // --- ERROR DISCIPLINE ---

    /// Records a resolution failure and emits `fallback` in place of the directive.
    fn fail(&mut self, error: DirectiveError, fallback: &str) {
        warn!("[{}] {}: {}", self.walk_id, self.document.name, error);
        self.result.has_error = true;
        self.result.errors.push(error.to_string());
        self.output.push_str(fallback);
    }

    /// Appends clause or reference text, unless an earlier directive failed.
    fn emit_unless_failed(&mut self, text: &str) {
        if !self.result.has_error {
            self.output.push_str(text);
        }
    }

    /// Folds a sub-document's result into this one.
    fn merge(&mut self, child: ParsedResult) {
        self.output.push_str(&child.shire_output);
        self.result.variable_table.extend(&child.variable_table);
        self.result.has_error |= child.has_error;
        self.result.errors.extend(child.errors);
        self.result.cancelled |= child.cancelled;
        self.result.is_local_command |= child.is_local_command;
        if child.execute_agent.is_some() {
            self.result.execute_agent = child.execute_agent;
        }
        if child.next_job.is_some() {
            self.result.next_job = child.next_job;
        }
    }

    fn check_depth(&self) -> Result<(), DirectiveError> {
        if self.depth + 1 >= MAX_RECURSION_DEPTH {
            return Err(DirectiveError::TooDeep(MAX_RECURSION_DEPTH));
        }
        Ok(())
    }

    // --- NODE HANDLERS ---

    fn header(&mut self, header: &crate::models::HeaderBlock) {
        if self.result.config.is_some() {
            return;
        }
        match front_matter::parse(header) {
            Ok(mut hole) => {
                if hole.name.is_empty() {
                    hole.name = self.document.name.clone();
                }
                debug!("Compiled header of '{}' ({} variables)", hole.name, hole.variables.len());
                self.result.config = Some(hole);
                self.result.config_error = None;
            }
            Err(e) => {
                warn!("{}: {}", self.document.name, e);
                self.result.config_error = Some(e);
            }
        }
    }

    /// `[flow]:path` stages another document as the next job. Other comments
    /// are dropped.
    fn comment(&mut self, text: &str) {
        let Some(path) = text.strip_prefix(FLOW_FLAG).map(str::trim) else {
            return;
        };
        match self.session.workspace.read(path) {
            Ok(content) => {
                debug!("Staged '{}' as the next job", path);
                self.result.next_job = Some(Box::new(syntax::parse_document(path, &content)));
            }
            Err(e) => warn!("Cannot stage flow '{}': {}", path, e),
        }
    }

    fn agent(&mut self, name: &str) {
        match self.session.agents.find_agent(name) {
            Some(agent) => {
                debug!("Document hands off to agent '{}'", agent.name);
                self.result.execute_agent = Some(agent);
            }
            None => warn!("Unknown agent: @{}", name),
        }
    }

    /// Adds a reference to the variable table. Editor variables need an edit
    /// position to exist.
    fn register_variable(&mut self, name: &str, offset: usize) -> Result<(), DirectiveError> {
        if variables::needs_editor(name) && self.session.editor().is_none() {
            return Err(DirectiveError::NoEditorContext(name.to_string()));
        }
        let var_type = self
            .result
            .config
            .as_ref()
            .and_then(|hole| hole.variable(name))
            .filter(|pipeline| pipeline.is_literal())
            .map_or(VariableType::String, |pipeline| {
                variables::infer_type(&pipeline.pattern)
            });
        let line = self.document.line_of(offset);
        trace!("Variable ${} referenced on line {}", name, line);
        self.result.variable_table.add_variable(name, var_type, line);
        Ok(())
    }

    async fn conditional(&mut self, expr: &ConditionalExpr) {
        for node in &expr.clauses {
            if self.result.has_error || self.result.cancelled {
                break;
            }
            let NodeKind::Clause(clause) = &node.kind else {
                self.emit_unless_failed(&node.text);
                continue;
            };
            self.clause(clause).await;
        }
        if !expr.end.is_empty() {
            self.emit_unless_failed(&expr.end);
        }
    }

    async fn clause(&mut self, clause: &Clause) {
        self.emit_unless_failed(&clause.keyword);
        if let Some(condition) = &clause.condition {
            let names: Vec<String> = match LogicalExpression::parse(&condition.text) {
                Ok(parsed) => parsed.variables().into_iter().map(str::to_string).collect(),
                Err(e) => {
                    warn!("Condition '{}' does not parse: {}", condition.text, e);
                    Vec::new()
                }
            };
            for name in names {
                if let Err(e) = self.register_variable(&name, condition.offset) {
                    let marker = format!("{} {}", SHIRE_ERROR, e);
                    self.fail(e, &marker);
                    return;
                }
            }
            self.emit_unless_failed(&format!("({})", condition.text));
        }

        let Some(block) = &clause.block else {
            return;
        };
        if let Err(e) = self.check_depth() {
            self.fail(e, &block.text);
            return;
        }
        let sub = syntax::parse_fragment(self.document, block);
        let child = self.nested(&sub, self.expanding.clone()).walk().await;
        self.merge(child);
    }

    async fn command(&mut self, index: usize, source: &str, name: &str, props: Option<&str>) {
        let Some(builtin) = self.session.commands.builtin(name) else {
            self.custom_command(source, name).await;
            return;
        };
        if builtin.require_props && props.is_none() {
            self.fail(DirectiveError::MissingProps(name.to_string()), source);
            return;
        }
        if builtin.local {
            self.result.is_local_command = true;
        }

        let input = CommandInput {
            props: props.unwrap_or_default().to_string(),
            code_block: self.payload_for(builtin, index),
        };
        debug!("[{}] Executing /{} {:?}", self.walk_id, name, input.props);
        let output = commands::create(builtin, input).do_execute(self.session).await;

        if output.contains(SHIRE_CANCELLED) || self.session.is_cancelled() {
            self.result.cancelled = true;
            return;
        }
        if commands::is_failure(&output) {
            debug!("/{} failed, keeping its source text", name);
            self.output.push_str(source);
            return;
        }
        if builtin.reads_code_block {
            self.skip_next_code = true;
        }
        self.session.context.set_output(output.as_str());
        self.output.push_str(&output);
    }

    /// The text a builtin reads besides its props: the next fenced block for
    /// commands that consume one, the next text segment for `/refactor`.
    fn payload_for(&self, builtin: &BuiltinCommand, index: usize) -> Option<String> {
        let mut following = self.document.nodes.iter().skip(index + 1);
        if builtin.reads_code_block {
            return following.find_map(|node| match &node.kind {
                NodeKind::CodeBlock(block) => Some(block.code.clone()),
                _ => None,
            });
        }
        if builtin.name == "refactor" {
            return following
                .find(|node| node.kind == NodeKind::TextSegment)
                .map(|node| node.text.clone());
        }
        None
    }

    /// Expands a project-defined command in place, or fails as unknown.
    async fn custom_command(&mut self, source: &str, name: &str) {
        let Some(document) = self
            .session
            .commands
            .custom(name, self.session.workspace.as_ref())
        else {
            self.fail(DirectiveError::UnknownCommand(name.to_string()), source);
            return;
        };
        if self.expanding.iter().any(|n| n == name) {
            self.fail(DirectiveError::Cycle(name.to_string()), source);
            return;
        }
        if let Err(e) = self.check_depth() {
            self.fail(e, source);
            return;
        }

        debug!("[{}] Expanding custom command /{}", self.walk_id, name);
        let mut expanding = self.expanding.clone();
        expanding.push(name.to_string());
        let child = self.nested(&document, expanding).walk().await;
        self.output.push_str(&child.shire_output);
        self.result.has_error |= child.has_error;
        self.result.errors.extend(child.errors);
        self.result.cancelled |= child.cancelled;
    }
}

/// Scans and walks a document in one go.
pub async fn analyze(session: &Session, name: &str, text: &str) -> ParsedResult {
    let document = syntax::parse_document(name, text);
    SyntaxAnalyzer::new(session, &document).parse().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EditorState;
    use crate::workspace::{MemoryWorkspace, Workspace};
    use std::sync::Arc;

    // --- Setup ---

    fn session(ws: MemoryWorkspace) -> Session {
        Session::new(Arc::new(ws))
    }

    fn with_editor(ws: MemoryWorkspace) -> Session {
        session(ws).with_editor(EditorState {
            file_path: Some("src/main.rs".to_string()),
            file_content: Some("fn main() {}".to_string()),
            selection: Some("pick".to_string()),
            language: None,
        })
    }

    #[tokio::test]
    async fn test_plain_text_is_unchanged() {
        let s = session(MemoryWorkspace::new());
        let text = "Normal String /";
        let result = analyze(&s, "plain.shire", text).await;
        assert_eq!(result.shire_output, text);
        assert!(!result.has_error);
        assert_eq!(result.source_code, text);

        let text = "Line one\n\nLine two with 3 @ signs, a/b and 5$.";
        let result = analyze(&s, "plain.shire", text).await;
        assert_eq!(result.shire_output, text);
    }

    #[tokio::test]
    async fn test_header_is_compiled_and_not_emitted() {
        let s = session(MemoryWorkspace::new());
        let text = "---\nname: Summary\ndescription: \"Generate Summary\"\nvariables:\n  \"var1\": \"demo\"\n---\n\nSummary webpage:\n";
        let result = analyze(&s, "summary.shire", text).await;
        let config = result.config.expect("config");
        assert_eq!(config.name, "Summary");
        assert_eq!(config.description, "Generate Summary");
        assert_eq!(config.variable("var1").map(|p| p.pattern.as_str()), Some("demo"));
        assert_eq!(result.shire_output, "\n\nSummary webpage:\n");
        assert!(result.config_error.is_none());
    }

    #[tokio::test]
    async fn test_broken_header_is_reported() {
        let s = session(MemoryWorkspace::new());
        let text = "---\ninteraction: Nope\n---\nbody";
        let result = analyze(&s, "broken.shire", text).await;
        assert!(result.config.is_none());
        assert!(result.config_error.is_some());
        assert_eq!(result.shire_output, "\nbody");
    }

    #[tokio::test]
    async fn test_unknown_command_is_kept_verbatim() {
        let s = session(MemoryWorkspace::new());
        let result = analyze(&s, "bogus.shire", "Explain /bogus:x please").await;
        assert_eq!(result.shire_output, "Explain /bogus:x please");
        assert!(result.has_error);
        assert_eq!(result.errors, vec!["Unknown command: /bogus".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_props_is_an_error() {
        let s = session(MemoryWorkspace::new());
        let result = analyze(&s, "t.shire", "Read /file now").await;
        assert_eq!(result.shire_output, "Read /file now");
        assert!(result.has_error);
    }

    #[tokio::test]
    async fn test_file_command_output_is_spliced() {
        let s = session(MemoryWorkspace::new().with_file("src/lib.rs", "pub fn x() {}\n"));
        let result = analyze(&s, "t.shire", "Explain:\n/file:src/lib.rs\n").await;
        assert_eq!(result.shire_output, "Explain:\n```rust\npub fn x() {}\n```\n");
        assert!(!result.is_local_command);
        assert_eq!(
            s.context.snapshot().output.as_deref(),
            Some("```rust\npub fn x() {}\n```")
        );
    }

    #[tokio::test]
    async fn test_failed_command_falls_back_to_source() {
        let s = session(MemoryWorkspace::new());
        let result = analyze(&s, "t.shire", "See /file:missing.rs here").await;
        assert_eq!(result.shire_output, "See /file:missing.rs here");
        assert!(!result.has_error);
    }

    #[tokio::test]
    async fn test_write_consumes_the_next_code_block() {
        let ws = Arc::new(MemoryWorkspace::new());
        let s = Session::new(ws.clone());
        let text = "/write:out.txt\n```\nhello\n```\ndone";
        let result = analyze(&s, "t.shire", text).await;
        assert_eq!(ws.read("out.txt").unwrap(), "hello\n");
        assert_eq!(result.shire_output, "Writing to file: out.txt\n\ndone");
        assert!(result.is_local_command);
    }

    #[tokio::test]
    async fn test_write_without_block_keeps_everything() {
        let s = session(MemoryWorkspace::new());
        let result = analyze(&s, "t.shire", "/write:out.txt\nno code").await;
        assert_eq!(result.shire_output, "/write:out.txt\nno code");
    }

    #[tokio::test]
    async fn test_variables_are_recorded_with_lines() {
        let s = with_editor(MemoryWorkspace::new());
        let text = "---\nvariables:\n  \"count\": \"42\"\n---\nfirst\n$selection and ${count}\n";
        let result = analyze(&s, "t.shire", text).await;
        assert_eq!(result.shire_output, "\nfirst\n$selection and ${count}\n");
        let table = &result.variable_table;
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["selection", "count"]);
        assert_eq!(table.get_variable("selection").unwrap().line_declared, 5);
        assert_eq!(table.get_variable("count").unwrap().var_type, VariableType::Number);
    }

    #[tokio::test]
    async fn test_editor_variable_without_editor_fails_inline() {
        let s = session(MemoryWorkspace::new());
        let result = analyze(&s, "t.shire", "Use $selection, $custom").await;
        assert!(result.has_error);
        assert!(result.shire_output.starts_with("Use <SHIRE_ERROR> No element found for variable: $selection"));
        assert!(!result.shire_output.contains("$custom"));
        assert!(result.variable_table.get_variable("selection").is_none());
    }

    #[tokio::test]
    async fn test_conditionals_are_kept_for_rendering() {
        let s = with_editor(MemoryWorkspace::new().with_file("a.txt", "A"));
        let text = "#if($selection.length > 1)\n/file:a.txt\n#else\nnone\n#end\ntail";
        let result = analyze(&s, "t.shire", text).await;
        assert_eq!(
            result.shire_output,
            "#if($selection.length > 1)\n```\nA\n```\n#else\nnone\n#end\ntail"
        );
        assert_eq!(result.variable_table.get_variable("selection").unwrap().line_declared, 0);
    }

    #[tokio::test]
    async fn test_error_suppresses_later_clauses() {
        let s = with_editor(MemoryWorkspace::new());
        let text = "#if($a)\n/bogus:1\n#else\nB\n#end\nafter";
        let result = analyze(&s, "t.shire", text).await;
        assert!(result.has_error);
        assert_eq!(result.shire_output, "#if($a)\n/bogus:1\n\nafter");
    }

    #[tokio::test]
    async fn test_custom_commands_expand_and_cycles_stop() {
        let ws = MemoryWorkspace::new()
            .with_file(".shire/commands/greet.shire", "Hello from greet")
            .with_file(".shire/commands/loop.shire", "again /loop");
        let s = session(ws);
        let result = analyze(&s, "t.shire", "/greet\n/loop").await;
        assert_eq!(result.shire_output, "Hello from greet\nagain /loop");
        assert!(result.has_error);
        assert_eq!(result.errors, vec!["Custom command /loop includes itself".to_string()]);
    }

    #[tokio::test]
    async fn test_flow_agent_and_headings() {
        let ws = MemoryWorkspace::new().with_file("next.shire", "second step");
        let s = session(ws);
        let text = "[flow]:next.shire\n# Title\n@reviewer text";
        let result = analyze(&s, "t.shire", text).await;
        let next = result.next_job.expect("next job");
        assert_eq!(next.name, "next.shire");
        assert_eq!(next.text, "second step");
        assert_eq!(result.shire_output, "#[[# Title]]#\n text");
        assert!(result.execute_agent.is_none());
    }

    #[tokio::test]
    async fn test_successful_walks_are_cached() {
        let s = session(MemoryWorkspace::new());
        analyze(&s, "cached-walk.shire", "just text").await;
        let cached = state::compiled("cached-walk.shire").expect("cached");
        assert_eq!(cached.shire_output, "just text");
    }

    #[tokio::test]
    async fn test_cancelled_session_stops_the_walk() {
        let s = session(MemoryWorkspace::new());
        s.cancel();
        let result = analyze(&s, "cancelled.shire", "never emitted").await;
        assert!(result.cancelled);
        assert_eq!(result.shire_output, "");
    }
}
