// src/core/interpolator.rs

//! Second phase of a run: renders the walker's output into the final prompt.
//! `$name` and `${name}` are substituted from the bindings, `#if` chains are
//! decided with the `when` evaluator and `#[[...]]#` spans are emitted as-is.

use super::logical::LogicalExpression;
use super::syntax;
use crate::{
    constants::{HEADING_CLOSE, HEADING_OPEN, MAX_RECURSION_DEPTH},
    models::{ClauseKind, Directive, NodeKind},
};
use log::warn;
use std::collections::HashMap;
use thiserror::Error;

/// Stand-ins for unparsed spans while the rest of the text is rendered.
const SHIELD_OPEN: char = '\u{E000}';
const SHIELD_CLOSE: char = '\u{E001}';

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Maximum nesting depth ({0}) exceeded while rendering. Check for runaway #if blocks.")]
    TooDeep(u32),
}

#[derive(Clone)]
pub struct Interpolator<'a> {
    bindings: &'a HashMap<String, String>,
    // For runaway nesting protection (#if inside #if inside ...)
    recursion_depth: u32,
}

impl<'a> Interpolator<'a> {
    pub fn new(bindings: &'a HashMap<String, String>) -> Self {
        Self {
            bindings,
            recursion_depth: 0,
        }
    }

    /// Creates a new interpolator for a deeper nesting level.
    fn new_for_recursion(&self) -> Self {
        Self {
            bindings: self.bindings,
            recursion_depth: self.recursion_depth + 1,
        }
    }

    /// Renders a whole template.
    pub fn render(&self, template: &str) -> Result<String, RenderError> {
        let (shielded, spans) = shield_unparsed(template);
        let rendered = self.expand(&shielded)?;
        Ok(restore_unparsed(&rendered, &spans))
    }

    fn expand(&self, text: &str) -> Result<String, RenderError> {
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(RenderError::TooDeep(MAX_RECURSION_DEPTH));
        }

        let doc = syntax::parse_body("template", text);
        let mut out = String::with_capacity(text.len());
        let mut skip_newline = false;
        for node in &doc.nodes {
            if skip_newline {
                skip_newline = false;
                if node.kind == NodeKind::Newline {
                    continue;
                }
            }
            match &node.kind {
                NodeKind::Directive(Directive::Variable { name }) => match self.bindings.get(name) {
                    Some(value) => out.push_str(value),
                    // Unknown references render as written.
                    None => out.push_str(&node.text),
                },
                NodeKind::Conditional(expr) => {
                    for clause in &expr.clauses {
                        let NodeKind::Clause(clause) = &clause.kind else {
                            continue;
                        };
                        let taken = match (&clause.kind, &clause.condition) {
                            (ClauseKind::Else, _) | (_, None) => true,
                            (_, Some(condition)) => self.condition_holds(&condition.text),
                        };
                        if taken {
                            if let Some(block) = &clause.block {
                                let body = strip_leading_newline(&block.text);
                                out.push_str(&self.new_for_recursion().expand(body)?);
                            }
                            break;
                        }
                    }
                    // A directive line leaves no blank line behind.
                    let at_line_start = node.offset == 0
                        || doc.text.as_bytes().get(node.offset - 1) == Some(&b'\n');
                    skip_newline = at_line_start && !expr.end.is_empty();
                }
                _ => out.push_str(&node.text),
            }
        }
        Ok(out)
    }

    /// A condition that fails to parse or evaluate counts as false.
    fn condition_holds(&self, source: &str) -> bool {
        let outcome = LogicalExpression::parse(source).and_then(|expr| expr.evaluate(self.bindings));
        outcome.unwrap_or_else(|e| {
            warn!("Treating #if({}) as false: {}", source, e);
            false
        })
    }
}

/// Renders a template against a set of bindings.
pub fn render(template: &str, bindings: &HashMap<String, String>) -> Result<String, RenderError> {
    Interpolator::new(bindings).render(template)
}

fn strip_leading_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

/// Pulls `#[[...]]#` spans out, leaving numbered placeholders behind.
fn shield_unparsed(template: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut spans = Vec::new();
    let mut rest = template;
    while let Some((before, after)) = rest.split_once(HEADING_OPEN) {
        let Some((inner, tail)) = after.split_once(HEADING_CLOSE) else {
            break;
        };
        out.push_str(before);
        out.push(SHIELD_OPEN);
        out.push_str(&spans.len().to_string());
        out.push(SHIELD_CLOSE);
        spans.push(inner.to_string());
        rest = tail;
    }
    out.push_str(rest);
    (out, spans)
}

fn restore_unparsed(rendered: &str, spans: &[String]) -> String {
    if spans.is_empty() {
        return rendered.to_string();
    }
    let mut out = String::with_capacity(rendered.len());
    let mut rest = rendered;
    while let Some((before, after)) = rest.split_once(SHIELD_OPEN) {
        let Some((index, tail)) = after.split_once(SHIELD_CLOSE) else {
            break;
        };
        out.push_str(before);
        match index.parse::<usize>().ok().and_then(|i| spans.get(i)) {
            Some(span) => out.push_str(span),
            None => {
                out.push(SHIELD_OPEN);
                out.push_str(index);
                out.push(SHIELD_CLOSE);
            }
        }
        rest = tail;
    }
    out.push_str(rest);
    out
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

    #[test]
    fn test_variables_are_substituted() {
        let b = bindings(&[("name", "World"), ("lang", "Rust")]);
        assert_eq!(
            render("Hello $name, ${lang}! $missing stays", &b).unwrap(),
            "Hello World, Rust! $missing stays"
        );
    }

    #[test]
    fn test_conditionals_pick_one_branch() {
        let template = "start\n#if($a.length > 1)\nA\n#elseif($b == \"yes\")\nB\n#else\nC\n#end\nafter";
        let long = bindings(&[("a", "xyz")]);
        let yes = bindings(&[("a", ""), ("b", "yes")]);
        let none = bindings(&[]);
        assert_eq!(render(template, &long).unwrap(), "start\nA\nafter");
        assert_eq!(render(template, &yes).unwrap(), "start\nB\nafter");
        assert_eq!(render(template, &none).unwrap(), "start\nC\nafter");
    }

    #[test]
    fn test_nested_conditionals() {
        let template = "#if($a)\n#if($b)\nboth\n#end\nonly a\n#end\n";
        let b = bindings(&[("a", "1"), ("b", "1")]);
        assert_eq!(render(template, &b).unwrap(), "both\nonly a\n");
    }

    #[test]
    fn test_unparsed_spans_keep_their_text() {
        let b = bindings(&[("x", "1")]);
        assert_eq!(
            render("#[[## Cost in $x]]#\n$x", &b).unwrap(),
            "## Cost in $x\n1"
        );
    }

    #[test]
    fn test_failing_condition_is_false() {
        let b = bindings(&[("a", "x")]);
        let template = "head\n#if($a.matches(\"(\"))\nX\n#else\nY\n#end\nrest";
        assert_eq!(render(template, &b).unwrap(), "head\nY\nrest");

        let template = "#if(a b c)\nX\n#end\nrest";
        assert_eq!(render(template, &b).unwrap(), "rest");
    }
}
