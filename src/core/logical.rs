// src/core/logical.rs

//! The `when` condition language.
//!
//! ```text
//! expr  := unit (('&&' | '||') unit)*
//! unit  := '(' expr ')' | term (op literal)?
//! term  := '$' ident ('.' method ('(' args ')')?)*
//! ```
//!
//! `&&` and `||` share one precedence level and fold strictly left to right,
//! short-circuiting as they go.

use chumsky::{input::ValueInput, prelude::*};
use logos::Logos;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpressionError {
    #[error("Invalid expression '{expr}': {message}")]
    Parse { expr: String, message: String },

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Invalid regex '{pattern}' in matches(): {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Ge => ordering != Less,
            Self::Le => ordering != Greater,
            Self::Gt => ordering == Greater,
            Self::Lt => ordering == Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// A literal operand. Numbers keep their source text so display is lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
}

impl Literal {
    fn as_text(&self) -> String {
        match self {
            Self::Str(s) | Self::Number(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Length,
    First,
    Contains,
    Matches,
    StartsWith,
    EndsWith,
    Lowercase,
    Uppercase,
    Trim,
    IsEmpty,
}

impl Method {
    const ALL: [(&'static str, Self, usize); 10] = [
        ("length", Self::Length, 0),
        ("first", Self::First, 0),
        ("contains", Self::Contains, 1),
        ("matches", Self::Matches, 1),
        ("startsWith", Self::StartsWith, 1),
        ("endsWith", Self::EndsWith, 1),
        ("lowercase", Self::Lowercase, 0),
        ("uppercase", Self::Uppercase, 0),
        ("trim", Self::Trim, 0),
        ("isEmpty", Self::IsEmpty, 0),
    ];

    fn lookup(name: &str) -> Option<(Self, usize)> {
        Self::ALL
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, m, arity)| (*m, *arity))
    }

    fn name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, m, _)| *m == self)
            .map_or("", |(n, _, _)| n)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: Method,
    pub args: Vec<Literal>,
}

/// `$variable.method(args)...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub variable: String,
    pub calls: Vec<MethodCall>,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.variable)?;
        for call in &self.calls {
            write!(f, ".{}", call.method.name())?;
            if !call.args.is_empty() {
                let args: Vec<String> = call.args.iter().map(ToString::to_string).collect();
                write!(f, "({})", args.join(", "))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalExpression {
    /// A term used on its own: truthy when it yields `true`, a non-empty string
    /// or a non-zero number.
    Truthy(Term),
    Compare {
        term: Term,
        op: CompareOp,
        literal: Literal,
    },
    Logic {
        op: LogicOp,
        left: Box<LogicalExpression>,
        right: Box<LogicalExpression>,
    },
    Group(Box<LogicalExpression>),
}

impl LogicalExpression {
    /// Parses an expression, accepting an optional `{ ... }` wrapper.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let trimmed = source.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);
        let fail = |message: String| ExpressionError::Parse {
            expr: source.to_string(),
            message,
        };
        let tokens = lex(inner).map_err(fail)?;
        let end_span: Span = (inner.len()..inner.len()).into();
        expression_parser()
            .then_ignore(end())
            .parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)))
            .into_result()
            .map_err(|errors| {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                fail(messages.join("; "))
            })
    }

    /// Evaluates against name -> value bindings. Unknown names bind to "".
    pub fn evaluate(&self, bindings: &HashMap<String, String>) -> Result<bool, ExpressionError> {
        match self {
            Self::Truthy(term) => Ok(term.evaluate(bindings)?.truthy()),
            Self::Compare { term, op, literal } => {
                let value = term.evaluate(bindings)?;
                Ok(op.holds(value.compare(literal)))
            }
            Self::Logic { op, left, right } => {
                let lhs = left.evaluate(bindings)?;
                match (op, lhs) {
                    (LogicOp::And, false) => Ok(false),
                    (LogicOp::Or, true) => Ok(true),
                    _ => right.evaluate(bindings),
                }
            }
            Self::Group(inner) => inner.evaluate(bindings),
        }
    }

    /// The canonical, whitespace-normalised form.
    pub fn display(&self) -> String {
        self.to_string()
    }

    /// Names of every variable the expression reads, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Truthy(term) | Self::Compare { term, .. } => {
                if !names.contains(&term.variable.as_str()) {
                    names.push(&term.variable);
                }
            }
            Self::Logic { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Self::Group(inner) => inner.collect_variables(names),
        }
    }
}

impl FromStr for LogicalExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LogicalExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truthy(term) => write!(f, "{}", term),
            Self::Compare { term, op, literal } => {
                write!(f, "{} {} {}", term, op.symbol(), literal)
            }
            Self::Logic { op, left, right } => {
                let symbol = match op {
                    LogicOp::And => "&&",
                    LogicOp::Or => "||",
                };
                write!(f, "{} {} {}", left, symbol, right)
            }
            Self::Group(inner) => write!(f, "({})", inner),
        }
    }
}

// --- EVALUATION ---

enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Self::Text(s) => !s.is_empty(),
            Self::Number(n) => *n != 0.0,
            Self::Bool(b) => *b,
        }
    }

    fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    /// Numeric comparison when both sides are numbers, string comparison otherwise.
    fn compare(&self, literal: &Literal) -> std::cmp::Ordering {
        let rhs = literal.as_text();
        let lhs_number = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Bool(_) => None,
        };
        if let (Some(l), Ok(r)) = (lhs_number, rhs.trim().parse::<f64>())
            && let Some(ordering) = l.partial_cmp(&r)
        {
            return ordering;
        }
        self.text().as_str().cmp(rhs.as_str())
    }
}

impl Term {
    fn evaluate(&self, bindings: &HashMap<String, String>) -> Result<Value, ExpressionError> {
        let mut value = Value::Text(bindings.get(&self.variable).cloned().unwrap_or_default());
        for call in &self.calls {
            let input = value.text();
            let arg = call.args.first().map(Literal::as_text).unwrap_or_default();
            value = match call.method {
                Method::Length => Value::Number(input.chars().count() as f64),
                Method::First => Value::Text(
                    input
                        .lines()
                        .next()
                        .and_then(|line| line.chars().next())
                        .map(String::from)
                        .unwrap_or_default(),
                ),
                Method::Contains => Value::Bool(input.contains(&arg)),
                Method::Matches => Value::Bool(full_match(&arg, &input)?),
                Method::StartsWith => Value::Bool(input.starts_with(&arg)),
                Method::EndsWith => Value::Bool(input.ends_with(&arg)),
                Method::Lowercase => Value::Text(input.to_lowercase()),
                Method::Uppercase => Value::Text(input.to_uppercase()),
                Method::Trim => Value::Text(input.trim().to_string()),
                Method::IsEmpty => Value::Bool(input.is_empty()),
            };
        }
        Ok(value)
    }
}

/// Matches the whole input against a regex, optionally written as `/.../`.
pub fn full_match(pattern: &str, input: &str) -> Result<bool, ExpressionError> {
    let body = strip_regex_delimiters(pattern);
    let re = Regex::new(&format!("^(?:{})$", body)).map_err(|source| {
        ExpressionError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        }
    })?;
    Ok(re.is_match(input))
}

/// `/abc/` -> `abc`; anything else is returned unchanged.
pub fn strip_regex_delimiters(pattern: &str) -> &str {
    pattern
        .strip_prefix('/')
        .and_then(|s| s.strip_suffix('/'))
        .filter(|s| !s.is_empty())
        .unwrap_or(pattern)
}

// --- LEXER ---

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*", lex_variable)]
    Var(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", lex_text)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    #[regex(r"'([^'\\]|\\.)*'", lex_string)]
    Str(String),

    #[regex(r"-?[0-9][0-9.]*", lex_text)]
    Number(String),

    #[token(".")]
    Dot,

    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("==", |_| CompareOp::Eq)]
    #[token("!=", |_| CompareOp::Ne)]
    #[token(">=", |_| CompareOp::Ge)]
    #[token("<=", |_| CompareOp::Le)]
    #[token(">", |_| CompareOp::Gt)]
    #[token("<", |_| CompareOp::Lt)]
    Cmp(CompareOp),

    #[token("&&", |_| LogicOp::And)]
    #[token("||", |_| LogicOp::Or)]
    Logic(LogicOp),
}

/// `$name` -> `name`
fn lex_variable(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    lex.slice().get(1..).map(str::to_string)
}

fn lex_text(lex: &mut logos::Lexer<'_, Token>) -> String {
    lex.slice().to_string()
}

/// Strips the quotes and resolves `\x` to `x`.
fn lex_string(lex: &mut logos::Lexer<'_, Token>) -> String {
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

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "${}", name),
            Self::Ident(text) | Self::Number(text) => f.write_str(text),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Dot => f.write_str("."),
            Self::Comma => f.write_str(","),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::Cmp(op) => f.write_str(op.symbol()),
            Self::Logic(LogicOp::And) => f.write_str("&&"),
            Self::Logic(LogicOp::Or) => f.write_str("||"),
        }
    }
}

type Span = SimpleSpan;

fn lex(source: &str) -> Result<Vec<(Token, Span)>, String> {
    Token::lexer(source)
        .spanned()
        .map(|(result, span)| match result {
            Ok(token) => Ok((token, Span::from(span))),
            Err(()) => Err(format!(
                "unexpected '{}' at {}",
                source.get(span.clone()).unwrap_or(""),
                span.start
            )),
        })
        .collect()
}

// --- PARSER ---

/// `true` and `false` are booleans; any other bare word is a string.
fn word_literal(word: String) -> Literal {
    if word == "true" {
        Literal::Bool(true)
    } else if word == "false" {
        Literal::Bool(false)
    } else {
        Literal::Str(word)
    }
}

fn literal_parser<'tokens, I>()
-> impl Parser<'tokens, I, Literal, extra::Err<Rich<'tokens, Token, Span>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    select! {
        Token::Str(s) => Literal::Str(s),
        Token::Number(n) => Literal::Number(n),
        Token::Ident(word) => word_literal(word),
    }
    .labelled("literal")
}

/// `$name.method(args)...`, checking each method name and its arity.
fn term_parser<'tokens, I>()
-> impl Parser<'tokens, I, Term, extra::Err<Rich<'tokens, Token, Span>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let args = literal_parser()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let call = just(Token::Dot)
        .ignore_then(select! { Token::Ident(name) => name }.labelled("method name"))
        .then(args.or_not())
        .try_map(|(name, args): (String, Option<Vec<Literal>>), span| {
            let Some((method, arity)) = Method::lookup(&name) else {
                return Err(Rich::custom(span, format!("unknown method '{}'", name)));
            };
            let args = args.unwrap_or_default();
            if args.len() != arity {
                return Err(Rich::custom(
                    span,
                    format!(
                        "method '{}' takes {} argument(s), got {}",
                        name,
                        arity,
                        args.len()
                    ),
                ));
            }
            Ok(MethodCall { method, args })
        });

    select! { Token::Var(name) => name }
        .labelled("$variable")
        .then(call.repeated().collect::<Vec<_>>())
        .map(|(variable, calls)| Term { variable, calls })
}

fn expression_parser<'tokens, I>()
-> impl Parser<'tokens, I, LogicalExpression, extra::Err<Rich<'tokens, Token, Span>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|expr| {
        let comparison = term_parser()
            .then(
                select! { Token::Cmp(op) => op }
                    .then(literal_parser())
                    .or_not(),
            )
            .map(|(term, comparison)| match comparison {
                Some((op, literal)) => LogicalExpression::Compare { term, op, literal },
                None => LogicalExpression::Truthy(term),
            });

        let group = expr
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|inner| LogicalExpression::Group(Box::new(inner)));

        let unit = group.or(comparison).boxed();

        // && and || share one level: fold strictly left to right.
        unit.clone().foldl(
            select! { Token::Logic(op) => op }.then(unit).repeated(),
            |left, (op, right)| LogicalExpression::Logic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const HELLO: &str = "public class HelloWorld {\n    public static void main(String[] args) {}\n}";

    #[test]
    fn test_selection_condition_evaluates_and_displays() {
        let expr =
            LogicalExpression::parse("$selection.length >= 1 && $selection.first() == 'p'").unwrap();
        assert_eq!(
            expr.display(),
            "$selection.length >= 1 && $selection.first == \"p\""
        );
        assert!(expr.evaluate(&bindings(&[("selection", HELLO)])).unwrap());
        assert!(!expr.evaluate(&bindings(&[("selection", "x")])).unwrap());
    }

    #[test]
    fn test_braced_form_is_accepted() {
        let expr =
            LogicalExpression::parse("{ $selection.length >= 1 && $selection.first() == 'p' }")
                .unwrap();
        assert_eq!(
            expr.display(),
            "$selection.length >= 1 && $selection.first == \"p\""
        );
    }

    #[test]
    fn test_contains_and_matches_display() {
        let expr = LogicalExpression::parse(
            "$fileName.contains(\".java\") && $filePath.contains(\"src/main/java\")",
        )
        .unwrap();
        assert_eq!(
            expr.display(),
            "$fileName.contains(\".java\") && $filePath.contains(\"src/main/java\")"
        );

        let expr = LogicalExpression::parse("$fileName.matches(\"/.*.java/\")").unwrap();
        assert_eq!(expr.display(), "$fileName.matches(\"/.*.java/\")");
        assert!(expr.evaluate(&bindings(&[("fileName", "Main.java")])).unwrap());
        assert!(!expr.evaluate(&bindings(&[("fileName", "Main.java.bak")])).unwrap());
    }

    #[test]
    fn test_missing_binding_is_empty_string() {
        let expr = LogicalExpression::parse("$nothing.length == 0").unwrap();
        assert!(expr.evaluate(&HashMap::new()).unwrap());
        let expr = LogicalExpression::parse("$nothing").unwrap();
        assert!(!expr.evaluate(&HashMap::new()).unwrap());
    }

    #[test]
    fn test_equal_precedence_folds_left_to_right() {
        // ((true || false) && false) == false, whereas precedence climbing would give true.
        let expr = LogicalExpression::parse("$a == 1 || $b == 1 && $c == 1").unwrap();
        let vars = bindings(&[("a", "1"), ("b", "0"), ("c", "0")]);
        assert!(!expr.evaluate(&vars).unwrap());

        let grouped = LogicalExpression::parse("$a == 1 || ($b == 1 && $c == 1)").unwrap();
        assert!(grouped.evaluate(&vars).unwrap());
        assert_eq!(grouped.display(), "$a == 1 || ($b == 1 && $c == 1)");
    }

    #[test]
    fn test_short_circuit_skips_bad_regex() {
        let expr = LogicalExpression::parse("$a.isEmpty && $a.matches(\"(\")").unwrap();
        assert!(!expr.evaluate(&bindings(&[("a", "x")])).unwrap());
        let err = expr.evaluate(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidRegex { .. }));
    }

    #[test]
    fn test_numeric_comparison() {
        let expr = LogicalExpression::parse("$count > 9").unwrap();
        assert!(expr.evaluate(&bindings(&[("count", "10")])).unwrap());
        assert!(!expr.evaluate(&bindings(&[("count", "8")])).unwrap());
    }

    #[test]
    fn test_string_methods_chain() {
        let expr = LogicalExpression::parse("$lang.trim.lowercase.startsWith(\"ru\")").unwrap();
        assert!(expr.evaluate(&bindings(&[("lang", "  Rust ")])).unwrap());
        assert_eq!(expr.variables(), vec!["lang"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(LogicalExpression::parse("$a.bogus").is_err());
        assert!(LogicalExpression::parse("$a.contains()").is_err());
        assert!(LogicalExpression::parse("$a ==").is_err());
        assert!(LogicalExpression::parse("selection").is_err());

        let err = LogicalExpression::parse("$a.bogus").unwrap_err();
        assert!(err.to_string().contains("unknown method 'bogus'"));
    }

    #[test]
    fn test_lexer_tokens_and_errors() {
        let tokens: Vec<Token> = lex("$a.contains('it\\'s') != -1.5")
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Var("a".to_string()),
                Token::Dot,
                Token::Ident("contains".to_string()),
                Token::LParen,
                Token::Str("it's".to_string()),
                Token::RParen,
                Token::Cmp(CompareOp::Ne),
                Token::Number("-1.5".to_string()),
            ]
        );
        assert!(lex("$a == \"open").is_err());
        assert!(lex("$a # b").is_err());
        assert!(LogicalExpression::parse("a b c").is_err());
    }
}
