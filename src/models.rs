// src/models.rs

use crate::core::{front_matter::ConfigParseError, logical::LogicalExpression};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- CONCRETE SYNTAX TREE ---
// The walker only needs a stable discriminant and child navigation. The tree is
// produced by `core::syntax` (or by a host parser) and never mutated afterwards.

/// A single node of the concrete syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// The exact source text covered by this node.
    pub text: String,
    /// Byte offset of the node inside its document's text.
    pub offset: usize,
}

/// The closed set of node kinds understood by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    TextSegment,
    Newline,
    CodeBlock(CodeBlock),
    Comment,
    Directive(Directive),
    Conditional(ConditionalExpr),
    Clause(Clause),
    HeaderMarker,
    HeaderBlock(HeaderBlock),
    SectionHeading,
}

/// A fenced code block. `code` excludes the fences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

/// An inline reference in the body: `/command:props`, `@agent` or `$variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Command { name: String, props: Option<String> },
    Agent { name: String, quoted: bool },
    Variable { name: String },
}

/// `#if(...) ... #elseif(...) ... #else ... #end`. Each entry of `clauses` is a
/// node of kind [`NodeKind::Clause`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalExpr {
    pub clauses: Vec<Node>,
    /// The closing keyword, empty when the source never closed the block.
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub kind: ClauseKind,
    /// The keyword as written (`#if`, `#elseif`, `#else`).
    pub keyword: String,
    /// The text between the parentheses, if the clause has a condition.
    pub condition: Option<Fragment>,
    /// The body of the clause, re-interpreted as an independent sub-document.
    pub block: Option<Fragment>,
}

/// A slice of the parent document, kept with its offset for line provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub offset: usize,
}

/// The front-matter between the two `---` markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub body: String,
    pub body_offset: usize,
}

/// One source unit: optional header plus template body, already scanned into nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub text: String,
    pub nodes: Vec<Node>,
    /// Line of the parent document this text starts at (0 for whole files).
    pub line_base: usize,
}

impl Document {
    /// Returns the zero-based line number of a byte offset, relative to the
    /// outermost document this one was carved from.
    pub fn line_of(&self, offset: usize) -> usize {
        let end = offset.min(self.text.len());
        let newlines = self
            .text
            .get(..end)
            .map(|prefix| prefix.matches('\n').count())
            .unwrap_or(0);
        self.line_base + newlines
    }

    /// Finds the header block node, wherever it sits at the top level.
    pub fn header(&self) -> Option<&HeaderBlock> {
        self.nodes.iter().find_map(|node| match &node.kind {
            NodeKind::HeaderBlock(header) => Some(header),
            _ => None,
        })
    }
}

// --- COMPILED CONFIGURATION (the "hobbit hole") ---

/// How the rendered result is delivered to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InteractionType {
    #[default]
    AppendCursor,
    AppendCursorStream,
    ReplaceSelection,
    ReplaceCurrentFile,
    InsertBeforeSelection,
    OutputFile,
    RunPanel,
    RightPanel,
    External,
}

impl InteractionType {
    const ALL: [Self; 9] = [
        Self::AppendCursor,
        Self::AppendCursorStream,
        Self::ReplaceSelection,
        Self::ReplaceCurrentFile,
        Self::InsertBeforeSelection,
        Self::OutputFile,
        Self::RunPanel,
        Self::RightPanel,
        Self::External,
    ];
}

/// Where the document may be invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionLocation {
    #[default]
    Default,
    ContextMenu,
    IntentionMenu,
    TerminalMenu,
    CommitMenu,
    RunPanel,
    InputBox,
    DatabaseMenu,
    ConsoleMenu,
    VcsLogMenu,
    ChatBox,
    InlineChat,
}

impl ActionLocation {
    const ALL: [Self; 12] = [
        Self::Default,
        Self::ContextMenu,
        Self::IntentionMenu,
        Self::TerminalMenu,
        Self::CommitMenu,
        Self::RunPanel,
        Self::InputBox,
        Self::DatabaseMenu,
        Self::ConsoleMenu,
        Self::VcsLogMenu,
        Self::ChatBox,
        Self::InlineChat,
    ];
}

/// Normalises `ContextMenu`, `CONTEXT_MENU` and `context-menu` to one key.
fn enum_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for InteractionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = enum_key(s);
        Self::ALL
            .into_iter()
            .find(|v| enum_key(&format!("{:?}", v)) == key)
            .ok_or_else(|| format!("unknown interaction type '{}'", s))
    }
}

impl FromStr for ActionLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = enum_key(s);
        Self::ALL
            .into_iter()
            .find(|v| enum_key(&format!("{:?}", v)) == key)
            .ok_or_else(|| format!("unknown action location '{}'", s))
    }
}

/// A named function with literal arguments, e.g. `grep("ERROR")` or `sort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.name);
        }
        let args = self
            .args
            .iter()
            .map(|a| format!("{:?}", a))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.name, args)
    }
}

/// The key of a `case` arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseKey {
    Literal(String),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArm {
    pub key: CaseKey,
    pub funcs: Vec<FunctionCall>,
}

/// `case "$N" { "key" { ... } default { ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseBlock {
    /// The selector as written, usually `$0`, `$1`, ...
    pub selector: String,
    pub arms: Vec<CaseArm>,
}

impl CaseBlock {
    /// The capture group the selector refers to, if it has the `$N` form.
    pub fn group_index(&self) -> Option<usize> {
        self.selector.strip_prefix('$')?.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStep {
    Call(FunctionCall),
    Case(CaseBlock),
}

/// A file-matching pattern plus the chain of functions folded over what it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPipeline {
    pub pattern: String,
    pub steps: Vec<PipelineStep>,
}

impl PatternPipeline {
    /// A pipeline without functions, evaluating to `value` itself.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            pattern: value.into(),
            steps: Vec::new(),
        }
    }

    pub fn is_literal(&self) -> bool {
        self.steps.is_empty()
    }

    /// Flat list of the top-level function calls, skipping `case` blocks.
    pub fn calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.steps.iter().filter_map(|step| match step {
            PipelineStep::Call(call) => Some(call),
            PipelineStep::Case(_) => None,
        })
    }
}

impl fmt::Display for PatternPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "{:?}", self.pattern);
        }
        let steps = self
            .steps
            .iter()
            .map(|step| match step {
                PipelineStep::Call(call) => call.to_string(),
                PipelineStep::Case(case) => {
                    let arms = case
                        .arms
                        .iter()
                        .map(|arm| {
                            let key = match &arm.key {
                                CaseKey::Literal(k) => format!("{:?}", k),
                                CaseKey::Default => "default".to_string(),
                            };
                            let funcs = arm
                                .funcs
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(" | ");
                            format!("{} {{ {} }}", key, funcs)
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    format!("case {:?} {{ {} }}", case.selector, arms)
                }
            })
            .collect::<Vec<_>>()
            .join(" | ");
        write!(f, "{} {{ {} }}", self.pattern, steps)
    }
}

/// What an `afterStreaming` condition checks.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionCheck {
    Expression(LogicalExpression),
    Functions(Vec<FunctionCall>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionArm {
    pub key: String,
    pub check: ConditionCheck,
}

/// The condition -> case dispatch table run after generation completes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AfterStreaming {
    pub conditions: Vec<ConditionArm>,
    pub cases: Vec<CaseArm>,
}

/// The compiled header of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct HobbitHole {
    pub name: String,
    pub description: String,
    pub interaction: InteractionType,
    pub action_location: ActionLocation,
    pub model: Option<String>,
    pub enabled: bool,
    /// Declaration order is preserved; names are unique.
    pub variables: Vec<(String, PatternPipeline)>,
    pub when: Option<LogicalExpression>,
    pub on_streaming_end: Vec<FunctionCall>,
    pub after_streaming: Option<AfterStreaming>,
}

impl Default for HobbitHole {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            interaction: InteractionType::default(),
            action_location: ActionLocation::default(),
            model: None,
            enabled: true,
            variables: Vec::new(),
            when: None,
            on_streaming_end: Vec::new(),
            after_streaming: None,
        }
    }
}

impl HobbitHole {
    pub fn variable(&self, name: &str) -> Option<&PatternPipeline> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Inserts a variable, replacing an earlier declaration in place.
    pub fn set_variable(&mut self, name: String, pipeline: PatternPipeline) {
        match self.variables.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = pipeline,
            None => self.variables.push((name, pipeline)),
        }
    }
}

// --- VARIABLE TABLE ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum VariableType {
    #[default]
    String,
    Boolean,
    Number,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub var_type: VariableType,
    pub line_declared: usize,
}

/// Ordered record of every variable a document references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableTable {
    entries: Vec<(String, VariableInfo)>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a variable. Re-adding a known name only updates its line.
    pub fn add_variable(&mut self, name: &str, var_type: VariableType, line_declared: usize) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, info)) => info.line_declared = line_declared,
            None => self.entries.push((
                name.to_string(),
                VariableInfo {
                    var_type,
                    line_declared,
                },
            )),
        }
    }

    /// Merges another table in, in its order.
    pub fn extend(&mut self, other: &Self) {
        for (name, info) in &other.entries {
            self.add_variable(name, info.var_type, info.line_declared);
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&VariableInfo> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, i)| i)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableInfo)> {
        self.entries.iter().map(|(n, i)| (n.as_str(), i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// --- AGENTS & EDITOR STATE ---

/// An external agent a document can hand its output to (`@name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// The edit position the host was at when the document was triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    /// Path of the file open in the editor, relative to the workspace root.
    pub file_path: Option<String>,
    pub file_content: Option<String>,
    pub selection: Option<String>,
    pub language: Option<String>,
}

// --- RESULT ---

/// Everything one walk over a document produced.
#[derive(Debug, Clone, Default)]
pub struct ParsedResult {
    pub source_code: String,
    pub shire_output: String,
    pub config: Option<HobbitHole>,
    pub config_error: Option<ConfigParseError>,
    pub variable_table: VariableTable,
    pub has_error: bool,
    /// Directive-resolution failures, in the order they happened.
    pub errors: Vec<String>,
    pub next_job: Option<Box<Document>>,
    pub execute_agent: Option<AgentConfig>,
    pub is_local_command: bool,
    pub cancelled: bool,
}
