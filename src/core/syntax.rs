//! # Syntax
//!
//! A reference scanner that turns raw document text into the concrete node tree the
//! walker consumes. It recognises the front-matter header, fenced code, `[comment]`
//! lines, markdown headings, `#if/#elseif/#else/#end` blocks and the three inline
//! directive forms (`/command:props`, `@agent`, `$variable`). Everything else is
//! kept as text, so the concatenated node texts always equal the scanned source.

use crate::{
    constants::FRONT_MATTER_MARKER,
    models::{
        Clause, ClauseKind, CodeBlock, ConditionalExpr, Directive, Document, Fragment,
        HeaderBlock, Node, NodeKind,
    },
};
use logos::Logos;

/// Scans a whole document.
pub fn parse_document(name: &str, text: &str) -> Document {
    Document {
        name: name.to_string(),
        text: text.to_string(),
        nodes: scan(text),
        line_base: 0,
    }
}

/// Scans a fragment of `parent` as an independent document, keeping line numbers
/// relative to the parent.
pub fn parse_fragment(parent: &Document, fragment: &Fragment) -> Document {
    Document {
        name: parent.name.clone(),
        text: fragment.text.clone(),
        nodes: scan_body(&fragment.text),
        line_base: parent.line_of(fragment.offset),
    }
}

/// Scans text that never carries a header, such as rendered output.
pub fn parse_body(name: &str, text: &str) -> Document {
    Document {
        name: name.to_string(),
        text: text.to_string(),
        nodes: scan_body(text),
        line_base: 0,
    }
}

/// Returns true if the text opens with a front-matter marker line.
pub fn starts_with_front_matter(text: &str) -> bool {
    text.lines()
        .next()
        .is_some_and(|line| line.trim_end() == FRONT_MATTER_MARKER)
}

fn scan(text: &str) -> Vec<Node> {
    let mut scanner = Scanner::new(text);
    scanner.header();
    scanner.body();
    scanner.nodes
}

fn scan_body(text: &str) -> Vec<Node> {
    let mut scanner = Scanner::new(text);
    scanner.body();
    scanner.nodes
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    pending_text: Option<usize>,
    nodes: Vec<Node>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            pending_text: None,
            nodes: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or("")
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.src.get(start..end).unwrap_or("")
    }

    fn push(&mut self, kind: NodeKind, start: usize, end: usize) {
        self.nodes.push(Node {
            kind,
            text: self.slice(start, end).to_string(),
            offset: start,
        });
    }

    fn flush_text(&mut self) {
        if let Some(start) = self.pending_text.take()
            && start < self.pos
        {
            self.push(NodeKind::TextSegment, start, self.pos);
        }
    }

    // --- HEADER ---

    fn header(&mut self) {
        if !starts_with_front_matter(self.src) {
            return;
        }
        let first_line_end = line_end(self.src, 0);
        let body_start = (first_line_end + 1).min(self.src.len());

        // Look for the closing marker on its own line.
        let mut cursor = body_start;
        while cursor < self.src.len() {
            let end = line_end(self.src, cursor);
            if self.slice(cursor, end).trim_end() == FRONT_MATTER_MARKER {
                let body_end = cursor.saturating_sub(1).max(body_start);
                let header = HeaderBlock {
                    body: self.slice(body_start, body_end).to_string(),
                    body_offset: body_start,
                };
                self.push(NodeKind::HeaderBlock(header), 0, end);
                self.pos = end;
                return;
            }
            cursor = end + 1;
        }

        // An opening marker that is never closed.
        self.push(NodeKind::HeaderMarker, 0, first_line_end);
        self.pos = first_line_end;
    }

    // --- BODY ---

    fn body(&mut self) {
        while self.pos < self.src.len() {
            if self.at_line_start() {
                match line_lead(self.rest()) {
                    Some(LineLead::Fence) => {
                        self.flush_text();
                        self.code_block();
                        continue;
                    }
                    Some(LineLead::Conditional) => {
                        self.flush_text();
                        self.conditional();
                        continue;
                    }
                    Some(LineLead::Heading) => {
                        self.whole_line(NodeKind::SectionHeading);
                        continue;
                    }
                    Some(LineLead::Comment) => {
                        self.whole_line(NodeKind::Comment);
                        continue;
                    }
                    Some(LineLead::Link) | None => {}
                }
            }
            self.line();
        }
        self.flush_text();
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src.as_bytes().get(self.pos - 1) == Some(&b'\n')
    }

    fn prev_char(&self) -> Option<char> {
        self.slice(0, self.pos).chars().next_back()
    }

    /// Emits the rest of the line, up to the `\n`, as one node.
    fn whole_line(&mut self, kind: NodeKind) {
        self.flush_text();
        let end = line_end(self.src, self.pos);
        self.push(kind, self.pos, end);
        self.pos = end;
    }

    /// Lexes the rest of the current line, newline included. Directive
    /// lexemes that do not sit on a word boundary fall back to text.
    fn line(&mut self) {
        let start = self.pos;
        let stop = (line_end(self.src, start) + 1).min(self.src.len());
        for (lexeme, span) in Lexeme::lexer(self.slice(start, stop)).spanned() {
            let (from, to) = (start + span.start, start + span.end);
            self.pos = from;
            let directive = match lexeme {
                Ok(kind) if self.at_boundary(kind) => directive(kind, self.slice(from, to)),
                _ => None,
            };
            if let Some(directive) = directive {
                self.flush_text();
                self.push(NodeKind::Directive(directive), from, to);
            } else if lexeme == Ok(Lexeme::Newline) {
                self.flush_text();
                self.push(NodeKind::Newline, from, to);
            } else if self.pending_text.is_none() {
                self.pending_text = Some(from);
            }
            self.pos = to;
        }
        self.pos = stop;
    }

    /// Commands and agents need whitespace (or the start of input) before the
    /// sigil; a variable only needs to not follow a word or a backslash.
    fn at_boundary(&self, lexeme: Lexeme) -> bool {
        let prev = self.prev_char();
        match lexeme {
            Lexeme::Command | Lexeme::Agent => prev.is_none_or(char::is_whitespace),
            Lexeme::Variable => !prev.is_some_and(|p| p.is_alphanumeric() || p == '\\'),
            Lexeme::Newline | Lexeme::Text => false,
        }
    }

    fn code_block(&mut self) {
        let start = self.pos;
        let open_end = line_end(self.src, start);
        let language = self
            .slice(start + 3, open_end)
            .trim()
            .to_string();

        let mut cursor = open_end + 1;
        let mut end = self.src.len();
        let mut code_end = self.src.len();
        while cursor < self.src.len() {
            let line_stop = line_end(self.src, cursor);
            if self.slice(cursor, line_stop).trim_start().starts_with("```") {
                end = line_stop;
                code_end = cursor.saturating_sub(1);
                break;
            }
            cursor = line_stop + 1;
        }
        let code_start = (open_end + 1).min(code_end);
        let code = self
            .slice(code_start, code_end.max(code_start))
            .trim_end_matches('\r')
            .to_string();

        let block = CodeBlock {
            language: (!language.is_empty()).then_some(language),
            code,
        };
        self.push(NodeKind::CodeBlock(block), start, end);
        self.pos = end;
    }

    fn conditional(&mut self) {
        let start = self.pos;
        let mut clauses = Vec::new();
        let mut clause_start = start;
        let mut kind = ClauseKind::If;
        let mut end_keyword = String::new();

        let finish = loop {
            let keyword_len = match kind {
                ClauseKind::If => 3,
                ClauseKind::ElseIf => 7,
                ClauseKind::Else => 5,
            };
            let keyword = self.slice(clause_start, clause_start + keyword_len).to_string();
            let (condition, block_start) = match kind {
                ClauseKind::Else => (None, clause_start + keyword_len),
                _ => {
                    let open = clause_start + keyword_len;
                    let (fragment, after) = self.paren_group(open);
                    (Some(fragment), after)
                }
            };

            let (boundary, block_end) = self.find_clause_boundary(block_start);
            let block = Fragment {
                text: self.slice(block_start, block_end).to_string(),
                offset: block_start,
            };
            clauses.push(Node {
                kind: NodeKind::Clause(Clause {
                    kind,
                    keyword,
                    condition,
                    block: (!block.text.is_empty()).then_some(block),
                }),
                text: self.slice(clause_start, block_end).to_string(),
                offset: clause_start,
            });

            match boundary {
                Boundary::ElseIf => kind = ClauseKind::ElseIf,
                Boundary::Else => kind = ClauseKind::Else,
                Boundary::End => {
                    end_keyword = "#end".to_string();
                    break block_end + 4;
                }
                Boundary::Eof => break block_end,
            }
            clause_start = block_end;
        };

        let expr = ConditionalExpr {
            clauses,
            end: end_keyword,
        };
        self.push(NodeKind::Conditional(expr), start, finish);
        self.pos = finish;
    }

    /// Reads `( ... )` starting at `open`, honouring nesting and quotes. Returns the
    /// inner fragment and the offset right after the closing parenthesis. A group
    /// that never closes runs to the end of the line.
    fn paren_group(&self, open: usize) -> (Fragment, usize) {
        let inner_start = open + 1;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        for (i, c) in self.slice(open, self.src.len()).char_indices() {
            let at = open + i;
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let fragment = Fragment {
                            text: self.slice(inner_start, at).to_string(),
                            offset: inner_start,
                        };
                        return (fragment, at + 1);
                    }
                }
                (None, '\n') => break,
                _ => {}
            }
        }
        let stop = line_end(self.src, open);
        let fragment = Fragment {
            text: self.slice(inner_start.min(stop), stop).to_string(),
            offset: inner_start,
        };
        (fragment, stop)
    }

    fn find_clause_boundary(&self, from: usize) -> (Boundary, usize) {
        let mut depth = 0usize;
        let mut i = from;
        while i < self.src.len() {
            let rest = self.slice(i, self.src.len());
            if rest.starts_with("#if(") {
                depth += 1;
                i += 4;
                continue;
            }
            if is_keyword(rest, "#end") {
                if depth == 0 {
                    return (Boundary::End, i);
                }
                depth -= 1;
                i += 4;
                continue;
            }
            if depth == 0 && rest.starts_with("#elseif(") {
                return (Boundary::ElseIf, i);
            }
            if depth == 0 && is_keyword(rest, "#else") {
                return (Boundary::Else, i);
            }
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
        (Boundary::Eof, self.src.len())
    }
}

enum Boundary {
    ElseIf,
    Else,
    End,
    Eof,
}

// --- LEXICAL HELPERS ---

/// Offset of the end of the line containing `from` (the `\n` itself, or EOF).
fn line_end(src: &str, from: usize) -> usize {
    src.get(from..)
        .and_then(|rest| rest.find('\n'))
        .map_or(src.len(), |i| from + i)
}

fn is_keyword(rest: &str, keyword: &str) -> bool {
    rest.starts_with(keyword)
        && !rest
            .get(keyword.len()..)
            .and_then(|s| s.chars().next())
            .is_some_and(|c| c.is_alphanumeric() || c == '(')
}

/// Constructs recognised only at the start of a line.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum LineLead {
    #[token("```")]
    Fence,

    #[token("#if(")]
    Conditional,

    #[regex(r"#{1,6} ")]
    Heading,

    #[regex(r"\[[^\]\n]*\]")]
    Comment,

    /// A markdown link opening the line is text, not a comment.
    #[regex(r"\[[^\]\n]*\]\([^)\n]*\)")]
    Link,
}

fn line_lead(rest: &str) -> Option<LineLead> {
    LineLead::lexer(rest).next()?.ok()
}

/// Inline lexemes. Every input lexes: anything that is not a newline or a
/// directive is text.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    #[token("\n")]
    #[token("\r\n")]
    Newline,

    /// `/name` or `/name:props`, props running to the next whitespace.
    #[regex(r"/[A-Za-z][A-Za-z0-9_-]*(:[^ \t\r\n]*)?")]
    Command,

    #[regex(r"@[A-Za-z][A-Za-z0-9_-]*")]
    #[regex(r#"@"[^"\n]+""#)]
    #[regex(r"@'[^'\n]+'")]
    Agent,

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*")]
    #[regex(r"\$\{[A-Za-z_][A-Za-z0-9_]*\}")]
    Variable,

    #[regex(r"[^\r\n/@$]+")]
    #[regex(r"[\r/@$]")]
    Text,
}

/// Builds the directive for a lexeme's text, sigil included.
fn directive(lexeme: Lexeme, text: &str) -> Option<Directive> {
    let body = text.get(1..)?;
    match lexeme {
        Lexeme::Command => {
            let (name, props) = match body.split_once(':') {
                Some((name, props)) => (name, (!props.is_empty()).then(|| props.to_string())),
                None => (body, None),
            };
            Some(Directive::Command {
                name: name.to_string(),
                props,
            })
        }
        Lexeme::Agent => {
            let unquoted = body
                .strip_prefix(['"', '\''])
                .and_then(|s| s.strip_suffix(['"', '\'']));
            Some(Directive::Agent {
                name: unquoted.unwrap_or(body).to_string(),
                quoted: unquoted.is_some(),
            })
        }
        Lexeme::Variable => Some(Directive::Variable {
            name: body.trim_start_matches('{').trim_end_matches('}').to_string(),
        }),
        Lexeme::Newline | Lexeme::Text => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(doc: &Document) -> Vec<&NodeKind> {
        doc.nodes.iter().map(|n| &n.kind).collect()
    }

    fn concat(doc: &Document) -> String {
        doc.nodes.iter().map(|n| n.text.as_str()).collect()
    }

    #[test]
    fn test_plain_text_is_preserved() {
        let doc = parse_document("t", "Normal String /");
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.nodes[0].kind, NodeKind::TextSegment);
        assert_eq!(concat(&doc), "Normal String /");
    }

    #[test]
    fn test_front_matter_becomes_header_block() {
        let text = "---\nname: Summary\n---\n\nSummary webpage:\n";
        let doc = parse_document("t", text);
        let header = doc.header().expect("header");
        assert_eq!(header.body, "name: Summary");
        assert!(matches!(doc.nodes[0].kind, NodeKind::HeaderBlock(_)));
        assert_eq!(concat(&doc), text);
    }

    #[test]
    fn test_unclosed_front_matter_is_a_marker() {
        let doc = parse_document("t", "---\nname: x\n");
        assert_eq!(doc.nodes[0].kind, NodeKind::HeaderMarker);
        assert!(doc.header().is_none());
    }

    #[test]
    fn test_directives_are_recognised_at_word_boundaries() {
        let doc = parse_document("t", "read /file:src/main.rs and @reviewer for $name, a/b x@y.z");
        let directives: Vec<_> = doc
            .nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Directive(d) => Some(d.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            directives,
            vec![
                Directive::Command {
                    name: "file".into(),
                    props: Some("src/main.rs".into())
                },
                Directive::Agent {
                    name: "reviewer".into(),
                    quoted: false
                },
                Directive::Variable { name: "name".into() },
            ]
        );
    }

    #[test]
    fn test_command_without_props() {
        let doc = parse_document("t", "/commit\n/file: x");
        assert!(matches!(
            &doc.nodes[0].kind,
            NodeKind::Directive(Directive::Command { name, props: None }) if name == "commit"
        ));
        assert_eq!(doc.nodes[2].text, "/file:");
    }

    #[test]
    fn test_quoted_agent_and_braced_variable() {
        let doc = parse_document("t", "@\"code reviewer\" ${input}");
        assert!(matches!(
            &doc.nodes[0].kind,
            NodeKind::Directive(Directive::Agent { name, quoted: true }) if name == "code reviewer"
        ));
        assert_eq!(doc.nodes[2].text, "${input}");
    }

    #[test]
    fn test_code_block_comment_and_heading() {
        let text = "[flow]:next.shire\n# Title\n```rust\nfn main() {}\n```\ntail";
        let doc = parse_document("t", text);
        let k = kinds(&doc);
        assert_eq!(k[0], &NodeKind::Comment);
        assert_eq!(k[2], &NodeKind::SectionHeading);
        match k[4] {
            NodeKind::CodeBlock(block) => {
                assert_eq!(block.language.as_deref(), Some("rust"));
                assert_eq!(block.code, "fn main() {}");
            }
            other => panic!("expected code block, got {:?}", other),
        }
        assert_eq!(concat(&doc), text);
    }

    #[test]
    fn test_markdown_link_line_is_text() {
        let text = "[link](http://a) text $name\n[todo] later\n";
        let doc = parse_document("t", text);
        let k = kinds(&doc);
        assert_eq!(k[0], &NodeKind::TextSegment);
        assert_eq!(doc.nodes[0].text, "[link](http://a) text ");
        assert!(matches!(k[1], NodeKind::Directive(Directive::Variable { name }) if name == "name"));
        assert_eq!(k[3], &NodeKind::Comment);
        assert_eq!(concat(&doc), text);
    }

    #[test]
    fn test_crlf_and_escaped_sigils() {
        let text = "a\r\n\\$skip #x@y /\r\n";
        let doc = parse_document("t", text);
        let k = kinds(&doc);
        assert_eq!(
            k,
            vec![
                &NodeKind::TextSegment,
                &NodeKind::Newline,
                &NodeKind::TextSegment,
                &NodeKind::Newline,
            ]
        );
        assert_eq!(doc.nodes[1].text, "\r\n");
        assert_eq!(concat(&doc), text);
    }

    #[test]
    fn test_conditional_clauses() {
        let text = "#if($a.length > 1)\nA\n#elseif($b)\nB\n#else\nC\n#end\nafter";
        let doc = parse_document("t", text);
        let NodeKind::Conditional(expr) = &doc.nodes[0].kind else {
            panic!("expected conditional");
        };
        assert_eq!(expr.clauses.len(), 3);
        assert_eq!(expr.end, "#end");
        let NodeKind::Clause(first) = &expr.clauses[0].kind else {
            panic!("expected clause");
        };
        assert_eq!(first.condition.as_ref().unwrap().text, "$a.length > 1");
        assert_eq!(first.block.as_ref().unwrap().text, "\nA\n");
        let NodeKind::Clause(last) = &expr.clauses[2].kind else {
            panic!("expected clause");
        };
        assert_eq!(last.kind, ClauseKind::Else);
        assert!(last.condition.is_none());
        assert_eq!(concat(&doc), text);
    }

    #[test]
    fn test_nested_conditional_stays_in_block() {
        let text = "#if($a)\n#if($b)\nx\n#end\n#end";
        let doc = parse_document("t", text);
        let NodeKind::Conditional(expr) = &doc.nodes[0].kind else {
            panic!("expected conditional");
        };
        assert_eq!(expr.clauses.len(), 1);
        assert_eq!(doc.nodes.len(), 1);
    }

    #[test]
    fn test_fragment_line_numbers_follow_parent() {
        let parent = parse_document("t", "a\nb\n#if($x)\n$y\n#end");
        let NodeKind::Conditional(expr) = &parent.nodes[4].kind else {
            panic!("expected conditional, got {:?}", parent.nodes[4].kind);
        };
        let NodeKind::Clause(clause) = &expr.clauses[0].kind else {
            panic!("expected clause");
        };
        let fragment = parse_fragment(&parent, clause.block.as_ref().unwrap());
        let var = fragment
            .nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Directive(_)))
            .unwrap();
        assert_eq!(fragment.line_of(var.offset), 3);
    }
}
