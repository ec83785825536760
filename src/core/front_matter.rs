// src/core/front_matter.rs

//! # Front-matter
//!
//! Compiles the header between the two `---` markers into a [`HobbitHole`].
//! The format is a restricted YAML: `key: value` lines, nested maps by
//! indentation, `[...]` arrays, and three forms YAML does not have:
//!
//! - `"pattern" { f1 | f2 }` and `/regex/ { ... }`: a pattern pipeline,
//! - `{ ... }`: a raw brace block (function chains, `when`, `afterStreaming`),
//! - `$expr ...`: an expression running to the end of the line.
//!
//! Unknown keys are parsed and then ignored.

use crate::{
    core::logical::LogicalExpression,
    models::{
        AfterStreaming, CaseArm, CaseBlock, CaseKey, ConditionArm, ConditionCheck, Document,
        FunctionCall, HeaderBlock, HobbitHole, PatternPipeline, PipelineStep,
    },
};
use chumsky::{input::ValueInput, prelude::*};
use log::trace;
use logos::Logos;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid front-matter at line {line}: {message}")]
pub struct ConfigParseError {
    /// 1-based line in the document.
    pub line: usize,
    pub message: String,
}

/// Returns true if the document carries a closed header block.
pub fn has_front_matter(document: &Document) -> bool {
    document.header().is_some()
}

/// Compiles a header block. The opening marker sits on line 1, so the body
/// starts on line 2.
pub fn parse(header: &HeaderBlock) -> Result<HobbitHole, ConfigParseError> {
    parse_str(&header.body, 2)
}

/// Compiles raw header text whose first line is `first_line` (1-based).
pub fn parse_str(body: &str, first_line: usize) -> Result<HobbitHole, ConfigParseError> {
    let mut cursor = Cursor::new(body, first_line);
    let entries = cursor.entries(0)?;
    let mut hole = HobbitHole::default();
    for entry in entries {
        apply_entry(&mut hole, entry)?;
    }
    trace!(
        "Compiled front-matter '{}' with {} variable(s)",
        hole.name,
        hole.variables.len()
    );
    Ok(hole)
}

// --- VALUES ---

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Scalar(String),
    Quoted(String),
    Array(Vec<Value>),
    Block(String),
    Pattern {
        pattern: String,
        block: Option<String>,
    },
    Expr(String),
    Map(Vec<Entry>),
}

impl Value {
    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) | Self::Quoted(s) | Self::Expr(s) | Self::Block(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    value: Value,
    line: usize,
}

fn apply_entry(hole: &mut HobbitHole, entry: Entry) -> Result<(), ConfigParseError> {
    let line = entry.line;
    let fail = |message: String| ConfigParseError { line, message };
    let text = |value: &Value| {
        value
            .as_text()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| fail(format!("'{}' expects a string value", entry.key)))
    };

    match entry.key.as_str() {
        "name" => hole.name = text(&entry.value)?,
        "description" => hole.description = text(&entry.value)?,
        "model" => hole.model = Some(text(&entry.value)?),
        "interaction" => {
            hole.interaction = text(&entry.value)?.parse().map_err(fail)?;
        }
        "actionLocation" => {
            hole.action_location = text(&entry.value)?.parse().map_err(fail)?;
        }
        "enabled" => {
            hole.enabled = match text(&entry.value)?.as_str() {
                "true" => true,
                "false" => false,
                other => return Err(fail(format!("'enabled' expects true or false, got '{}'", other))),
            }
        }
        "when" => {
            let source = text(&entry.value)?;
            let expr = LogicalExpression::parse(&source).map_err(|e| fail(e.to_string()))?;
            hole.when = Some(expr);
        }
        "variables" => {
            let Value::Map(vars) = entry.value else {
                return Err(fail("'variables' expects an indented map".to_string()));
            };
            for var in vars {
                let pipeline = variable_pipeline(&var.value).map_err(|message| ConfigParseError {
                    line: var.line,
                    message: format!("variable '{}': {}", var.key, message),
                })?;
                hole.set_variable(var.key, pipeline);
            }
        }
        "onStreamingEnd" => {
            hole.on_streaming_end = match &entry.value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_text)
                    .map(parse_call)
                    .collect::<Result<Vec<_>, String>>(),
                other => match other.as_text() {
                    Some(src) => parse_calls(src),
                    None => Err("expects a function chain".to_string()),
                },
            }
            .map_err(fail)?;
        }
        "afterStreaming" => {
            let source = text(&entry.value)?;
            hole.after_streaming = Some(parse_after_streaming(&source).map_err(fail)?);
        }
        other => trace!("Ignoring unknown front-matter key '{}'", other),
    }
    Ok(())
}

fn variable_pipeline(value: &Value) -> Result<PatternPipeline, String> {
    match value {
        Value::Quoted(s) | Value::Scalar(s) | Value::Expr(s) => Ok(PatternPipeline::literal(s.clone())),
        Value::Pattern { pattern, block } => Ok(PatternPipeline {
            pattern: pattern.clone(),
            steps: match block {
                Some(block) => parse_chain(block)?,
                None => Vec::new(),
            },
        }),
        Value::Block(block) => Ok(PatternPipeline {
            pattern: String::new(),
            steps: parse_chain(block)?,
        }),
        Value::Array(_) | Value::Map(_) => Err("expects a string or a pattern pipeline".to_string()),
    }
}

// --- FUNCTION CHAIN LEXER ---

/// Tokens of function chains, `case` tables and `afterStreaming` blocks.
/// Quoted strings arrive unquoted with `\x` escapes resolved.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum ChainToken {
    #[regex(r#""([^"\\]|\\.)*""#, lex_quoted)]
    #[regex(r"'([^'\\]|\\.)*'", lex_quoted)]
    Quoted(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_-]*", lex_word)]
    Word(String),

    /// Anything else an argument or a condition may hold: `$0`, `10`, `/re/`, `>=`.
    #[regex(r#"[^ \t\r\n"'(){}|,A-Za-z_][^ \t\r\n"'(){}|,]*"#, lex_word)]
    Bare(String),

    #[token("|")]
    Pipe,

    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,
}

fn lex_word(lex: &mut logos::Lexer<'_, ChainToken>) -> String {
    lex.slice().to_string()
}

fn lex_quoted(lex: &mut logos::Lexer<'_, ChainToken>) -> String {
    let raw = lex.slice();
    let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or("");
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for ChainToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quoted(s) => write!(f, "{:?}", s),
            Self::Word(s) | Self::Bare(s) => f.write_str(s),
            Self::Pipe => f.write_str("|"),
            Self::Comma => f.write_str(","),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBrace => f.write_str("{"),
            Self::RBrace => f.write_str("}"),
        }
    }
}

type Span = SimpleSpan;
type ChainExtra<'tokens> = extra::Err<Rich<'tokens, ChainToken, Span>>;

fn lex_chain(source: &str) -> Result<Vec<(ChainToken, Span)>, String> {
    ChainToken::lexer(source)
        .spanned()
        .map(|(result, span)| match result {
            Ok(token) => Ok((token, Span::from(span))),
            Err(()) => match source.get(span.clone()) {
                Some(text) if text.starts_with(is_quote) => {
                    Err(format!("unterminated string at {}", span.start))
                }
                text => Err(format!("unexpected '{}' at {}", text.unwrap_or(""), span.start)),
            },
        })
        .collect()
}

fn join_errors(errors: Vec<Rich<'_, ChainToken, Span>>) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn source_text(source: &str, span: Span) -> &str {
    source.get(span.start..span.end).unwrap_or("").trim()
}

// --- FUNCTION CHAIN PARSER ---

/// Any run of tokens with balanced `( )` and `{ }`.
fn balanced_parser<'tokens, I>() -> impl Parser<'tokens, I, (), ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
{
    recursive(|tree| {
        let plain = any()
            .filter(|token: &ChainToken| {
                !matches!(
                    token,
                    ChainToken::LParen | ChainToken::RParen | ChainToken::LBrace | ChainToken::RBrace
                )
            })
            .ignored();
        choice((
            plain,
            tree.clone()
                .delimited_by(just(ChainToken::LParen), just(ChainToken::RParen)),
            tree.delimited_by(just(ChainToken::LBrace), just(ChainToken::RBrace)),
        ))
        .repeated()
    })
}

/// One argument, running to the next top-level `,` or `)`. A lone quoted
/// string yields its value; anything else yields its source text.
fn argument_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, String, ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
{
    let group = balanced_parser()
        .delimited_by(just(ChainToken::LParen), just(ChainToken::RParen))
        .or(balanced_parser().delimited_by(just(ChainToken::LBrace), just(ChainToken::RBrace)))
        .to(None::<String>);
    let piece = choice((
        select! { ChainToken::Quoted(s) => Some(s) },
        select! {
            ChainToken::Word(_) => None::<String>,
            ChainToken::Bare(_) => None::<String>,
            ChainToken::Pipe => None::<String>,
        },
        group,
    ));
    piece
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .map_with(move |pieces, e| match pieces.as_slice() {
            [Some(value)] => value.clone(),
            _ => source_text(source, e.span()).to_string(),
        })
}

/// `name` or `name(arg, "arg", ...)`. Empty arguments are dropped.
fn call_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, FunctionCall, ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
{
    let args = argument_parser(source)
        .or_not()
        .separated_by(just(ChainToken::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(ChainToken::LParen), just(ChainToken::RParen))
        .map(|args| args.into_iter().flatten().collect::<Vec<_>>());
    select! { ChainToken::Word(name) => name }
        .labelled("function name")
        .then(args.or_not())
        .map(|(name, args)| FunctionCall::new(name, args.unwrap_or_default()))
}

fn case_key(word: String) -> CaseKey {
    if word == "default" {
        CaseKey::Default
    } else {
        CaseKey::Literal(word)
    }
}

fn case_key_parser<'tokens, I>() -> impl Parser<'tokens, I, CaseKey, ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
{
    select! {
        ChainToken::Quoted(s) => CaseKey::Literal(s),
        ChainToken::Word(w) => case_key(w),
        ChainToken::Bare(s) => CaseKey::Literal(s),
    }
    .labelled("case key")
}

/// `{ "key" { f1 | f2 } default { ... } }`, each arm holding plain calls.
fn case_arms_parser<'tokens, I, P>(
    chain: P,
) -> impl Parser<'tokens, I, Vec<CaseArm>, ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
    P: Parser<'tokens, I, Vec<PipelineStep>, ChainExtra<'tokens>> + Clone,
{
    case_key_parser()
        .then(
            chain
                .delimited_by(just(ChainToken::LBrace), just(ChainToken::RBrace))
                .try_map(|steps, span| only_calls(steps).map_err(|message| Rich::custom(span, message))),
        )
        .map(|(key, funcs)| CaseArm { key, funcs })
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(ChainToken::LBrace), just(ChainToken::RBrace))
}

/// `f1 | f2("a") | case "$0" { ... }`
fn chain_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Vec<PipelineStep>, ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
{
    recursive(move |chain| {
        let selector = select! {
            ChainToken::Quoted(s) => s,
            ChainToken::Word(s) => s,
            ChainToken::Bare(s) => s,
        }
        .labelled("case selector");
        let case = just(ChainToken::Word("case".to_string()))
            .ignore_then(selector)
            .then(case_arms_parser(chain))
            .map(|(selector, arms)| PipelineStep::Case(CaseBlock { selector, arms }));
        let step = case.or(call_parser(source).map(PipelineStep::Call));
        step.or_not()
            .separated_by(just(ChainToken::Pipe))
            .collect::<Vec<_>>()
            .map(|steps| steps.into_iter().flatten().collect())
    })
}

enum Section {
    Conditions(Vec<ConditionArm>),
    Cases(Vec<CaseArm>),
}

/// `condition { "name" { check } ... } case condition { "name" { calls } ... }`
fn after_streaming_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, AfterStreaming, ChainExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = ChainToken, Span = Span>,
{
    let check = balanced_parser()
        .map_with(move |(), e| source_text(source, e.span()).to_string())
        .delimited_by(just(ChainToken::LBrace), just(ChainToken::RBrace));
    let condition_arm = case_key_parser()
        .then(check)
        .try_map(|(key, body), span| {
            let CaseKey::Literal(key) = key else {
                return Err(Rich::custom(span, "'default' is not a valid condition name"));
            };
            let check = if body.starts_with('$') {
                LogicalExpression::parse(&body).map(ConditionCheck::Expression).map_err(|e| e.to_string())
            } else {
                parse_calls(&body).map(ConditionCheck::Functions)
            };
            match check {
                Ok(check) => Ok(ConditionArm { key, check }),
                Err(message) => Err(Rich::custom(span, message)),
            }
        });
    let conditions = just(ChainToken::Word("condition".to_string()))
        .ignore_then(
            condition_arm
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(ChainToken::LBrace), just(ChainToken::RBrace)),
        )
        .map(Section::Conditions);
    let cases = just(ChainToken::Word("case".to_string()))
        .ignore_then(just(ChainToken::Word("condition".to_string())))
        .ignore_then(case_arms_parser(chain_parser(source)))
        .map(Section::Cases);

    empty().to(AfterStreaming::default()).foldl(
        conditions.or(cases).repeated(),
        |mut after, section| {
            match section {
                Section::Conditions(arms) => after.conditions.extend(arms),
                Section::Cases(arms) => after.cases.extend(arms),
            }
            after
        },
    )
}

fn only_calls(steps: Vec<PipelineStep>) -> Result<Vec<FunctionCall>, String> {
    steps
        .into_iter()
        .map(|step| match step {
            PipelineStep::Call(call) => Ok(call),
            PipelineStep::Case(_) => Err("'case' is not allowed here".to_string()),
        })
        .collect()
}

/// Parses `f1 | f2("a") | case "$0" { ... }`.
pub fn parse_chain(source: &str) -> Result<Vec<PipelineStep>, String> {
    let tokens = lex_chain(source)?;
    let end_span: Span = (source.len()..source.len()).into();
    chain_parser(source)
        .then_ignore(end())
        .parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)))
        .into_result()
        .map_err(join_errors)
}

/// Parses a chain that may only contain plain calls.
pub fn parse_calls(source: &str) -> Result<Vec<FunctionCall>, String> {
    only_calls(parse_chain(source)?)
}

/// Parses `name` or `name(arg, "arg", ...)`.
pub fn parse_call(source: &str) -> Result<FunctionCall, String> {
    let tokens = lex_chain(source)?;
    let end_span: Span = (source.len()..source.len()).into();
    call_parser(source)
        .then_ignore(end())
        .parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)))
        .into_result()
        .map_err(join_errors)
}

fn parse_after_streaming(source: &str) -> Result<AfterStreaming, String> {
    let tokens = lex_chain(source)?;
    let end_span: Span = (source.len()..source.len()).into();
    after_streaming_parser(source)
        .then_ignore(end())
        .parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)))
        .into_result()
        .map_err(join_errors)
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

// --- CURSOR ---

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    first_line: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, first_line: usize) -> Self {
        Self {
            src,
            pos: 0,
            first_line,
        }
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or("")
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn line(&self) -> usize {
        let prefix = self.src.get(..self.pos).unwrap_or("");
        self.first_line + prefix.matches('\n').count()
    }

    fn error(&self, message: impl Into<String>) -> ConfigParseError {
        ConfigParseError {
            line: self.line(),
            message: message.into(),
        }
    }

    /// Skips spaces and tabs, and newlines too when `newlines` is set.
    fn skip_space(&mut self, newlines: bool) {
        while let Some(c) = self.peek() {
            let skip = c == ' ' || c == '\t' || c == '\r' || (newlines && c == '\n');
            if !skip {
                break;
            }
            self.pos += 1;
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some('\n'))
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '$')
        {
            self.bump();
        }
        self.src.get(start..self.pos).unwrap_or("").to_string()
    }

    fn quoted(&mut self) -> Result<String, ConfigParseError> {
        let mut lexer = ChainToken::lexer(self.rest());
        match lexer.next() {
            Some(Ok(ChainToken::Quoted(text))) if !lexer.slice().contains('\n') => {
                self.pos += lexer.span().end;
                Ok(text)
            }
            Some(Ok(ChainToken::Quoted(_)) | Err(())) => Err(self.error("unterminated string")),
            _ => Err(self.error("expected a quoted string")),
        }
    }

    /// Reads a balanced `{ ... }` and returns its inner text.
    fn block(&mut self) -> Result<String, ConfigParseError> {
        if self.peek() != Some('{') {
            return Err(self.error("expected '{'"));
        }
        let open_line = self.line();
        let start = self.pos;
        let mut depth = 0usize;
        for (token, span) in ChainToken::lexer(self.rest()).spanned() {
            match token {
                Ok(ChainToken::LBrace) => depth += 1,
                Ok(ChainToken::RBrace) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let inner = self.src.get(start + 1..start + span.start).unwrap_or("");
                        self.pos = start + span.end;
                        return Ok(inner.to_string());
                    }
                }
                Ok(_) => {}
                Err(()) => break,
            }
        }
        Err(ConfigParseError {
            line: open_line,
            message: "unclosed '{' block".to_string(),
        })
    }

    /// Reads `/regex/`, closing at the first `/` followed by the end of the
    /// value (a block, a separator or the end of the line).
    fn regex(&mut self) -> Result<String, ConfigParseError> {
        let start = self.pos;
        self.bump();
        let mut escaped = false;
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '/' => {
                    let after = self.rest().trim_start_matches([' ', '\t', '\r']);
                    if after.is_empty() || after.starts_with(['{', '\n', ',', ']']) {
                        return Ok(self.src.get(start..self.pos).unwrap_or("").to_string());
                    }
                }
                _ => {}
            }
        }
        self.pos = start;
        Err(self.error("unterminated /regex/ pattern"))
    }

    /// Reads an optional `{ ... }` following a pattern on the same line.
    fn optional_block(&mut self) -> Result<Option<String>, ConfigParseError> {
        let save = self.pos;
        self.skip_space(false);
        if self.peek() == Some('{') {
            return self.block().map(Some);
        }
        self.pos = save;
        Ok(None)
    }

    fn value(&mut self, in_array: bool) -> Result<Value, ConfigParseError> {
        match self.peek() {
            Some(c) if is_quote(c) => {
                let text = self.quoted()?;
                if in_array {
                    return Ok(Value::Quoted(text));
                }
                Ok(match self.optional_block()? {
                    Some(block) => Value::Pattern {
                        pattern: text,
                        block: Some(block),
                    },
                    None => Value::Quoted(text),
                })
            }
            Some('[') => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    self.skip_space(true);
                    match self.peek() {
                        Some(']') => {
                            self.bump();
                            break;
                        }
                        Some(',') => {
                            self.bump();
                        }
                        Some(_) => items.push(self.value(true)?),
                        None => return Err(self.error("unclosed '[' array")),
                    }
                }
                Ok(Value::Array(items))
            }
            Some('{') => self.block().map(Value::Block),
            Some('/') => {
                let pattern = self.regex()?;
                let block = self.optional_block()?;
                Ok(Value::Pattern { pattern, block })
            }
            Some('$') => {
                let save = self.pos;
                let binding = self.word();
                if let Some(block) = self.optional_block()? {
                    return Ok(Value::Pattern {
                        pattern: binding,
                        block: Some(block),
                    });
                }
                self.pos = save;
                Ok(Value::Expr(self.until(in_array)))
            }
            _ => Ok(Value::Scalar(self.until(in_array))),
        }
    }

    /// Reads the remainder of the line (or of the array item) as a trimmed scalar.
    fn until(&mut self, in_array: bool) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' || (in_array && (c == ',' || c == ']')) {
                break;
            }
            self.bump();
        }
        self.src.get(start..self.pos).unwrap_or("").trim().to_string()
    }

    /// Skips blank lines and `#` comment lines, stopping at the start of the
    /// next meaningful line. Returns its indentation.
    fn next_line_indent(&mut self) -> Option<usize> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }
            let line = rest.split('\n').next().unwrap_or("");
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.pos += line.len();
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
                continue;
            }
            return Some(line.len() - line.trim_start_matches([' ', '\t']).len());
        }
    }

    fn entries(&mut self, indent: usize) -> Result<Vec<Entry>, ConfigParseError> {
        let mut entries = Vec::new();
        while let Some(line_indent) = self.next_line_indent() {
            if line_indent < indent {
                break;
            }
            if line_indent > indent {
                return Err(self.error("unexpected indentation"));
            }
            self.pos += line_indent;
            let line = self.line();

            let key = match self.peek() {
                Some(c) if is_quote(c) => self.quoted()?,
                _ => {
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c != ':' && c != '\n') {
                        self.bump();
                    }
                    self.src.get(start..self.pos).unwrap_or("").trim().to_string()
                }
            };
            self.skip_space(false);
            if key.is_empty() || self.bump() != Some(':') {
                return Err(ConfigParseError {
                    line,
                    message: "expected 'key: value'".to_string(),
                });
            }
            self.skip_space(false);

            let value = if self.at_line_end() {
                self.bump();
                let save = self.pos;
                match self.next_line_indent() {
                    Some(child) if child > indent => Value::Map(self.entries(child)?),
                    _ => {
                        self.pos = save;
                        Value::Scalar(String::new())
                    }
                }
            } else {
                let value = self.value(false)?;
                self.skip_space(false);
                if !self.at_line_end() {
                    return Err(self.error(format!(
                        "unexpected text after value of '{}'",
                        key
                    )));
                }
                self.bump();
                value
            };
            entries.push(Entry { key, value, line });
        }
        Ok(entries)
    }
}
