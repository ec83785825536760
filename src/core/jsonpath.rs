// src/core/jsonpath.rs

//! A JSONPath subset: `$`, `.key`, `['key']`, `[n]`, `[-n]`, `[*]`, `.*`,
//! recursive descent `..key` and filters `[?(@.key)]`, `[?(@.key op literal)]`.

use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JsonPathError {
    #[error("Input is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Invalid JSONPath '{path}' at position {position}: {message}")]
    InvalidPath {
        path: String,
        position: usize,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(i64),
    Wildcard,
    Descend(String),
    Filter(Filter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl FilterOp {
    /// Two-character symbols first, so `<=` is never read as `<`.
    const SYMBOLS: [(&'static str, Self); 6] = [
        ("==", Self::Eq),
        ("!=", Self::Ne),
        ("<=", Self::Le),
        (">=", Self::Ge),
        ("<", Self::Lt),
        (">", Self::Gt),
    ];

    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Ne, ordering) => ordering != Some(Ordering::Equal),
            (_, None) => false,
            (Self::Eq, Some(o)) => o == Ordering::Equal,
            (Self::Le, Some(o)) => o != Ordering::Greater,
            (Self::Ge, Some(o)) => o != Ordering::Less,
            (Self::Lt, Some(o)) => o == Ordering::Less,
            (Self::Gt, Some(o)) => o == Ordering::Greater,
        }
    }
}

/// `[?(@.key)]` keeps children that have `key`; `[?(@.key op literal)]`
/// also compares it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Filter {
    key: String,
    test: Option<(FilterOp, Value)>,
}

impl Filter {
    fn parse(expr: &str) -> Option<Self> {
        let body = expr.strip_prefix("@.")?;
        let found = FilterOp::SYMBOLS
            .iter()
            .filter_map(|(symbol, op)| body.find(symbol).map(|at| (at, *symbol, *op)))
            .min_by_key(|(at, _, _)| *at);
        let Some((at, symbol, op)) = found else {
            return Some(Self {
                key: body.trim().to_string(),
                test: None,
            });
        };
        let key = body.get(..at)?.trim().to_string();
        let literal = body.get(at + symbol.len()..)?.trim();
        let expected = match unquote(literal) {
            Some(text) => Value::String(text.to_string()),
            None => serde_json::from_str(literal).ok()?,
        };
        Some(Self {
            key,
            test: Some((op, expected)),
        })
    }

    fn accepts(&self, item: &Value) -> bool {
        let Some(field) = item.get(&self.key) else {
            return false;
        };
        let Some((op, expected)) = &self.test else {
            return true;
        };
        let ordering = match (field, expected) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (a, b) => (a == b).then_some(Ordering::Equal),
        };
        op.holds(ordering)
    }
}

fn unquote(text: &str) -> Option<&str> {
    text.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// Splits a bare key off the front of `text`, up to the next `.` or `[`.
fn split_key(text: &str) -> (&str, &str) {
    text.split_at(text.find(['.', '[']).unwrap_or(text.len()))
}

fn bracket(inner: &str) -> Option<Segment> {
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    if let Some(expr) = inner.strip_prefix("?(").and_then(|s| s.strip_suffix(')')) {
        return Filter::parse(expr.trim()).map(Segment::Filter);
    }
    if let Some(key) = unquote(inner) {
        return Some(Segment::Key(key.to_string()));
    }
    inner.parse::<i64>().ok().map(Segment::Index)
}

fn parse_path(path: &str) -> Result<Vec<Segment>, JsonPathError> {
    let source = path.trim();
    let err = |rest: &str, message: &str| JsonPathError::InvalidPath {
        path: path.to_string(),
        position: source.len() - rest.len(),
        message: message.to_string(),
    };

    let mut rest = source.strip_prefix('$').unwrap_or(source);
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("..") {
            let (key, tail) = split_key(after);
            if key.is_empty() {
                return Err(err(tail, "expected a key after '..'"));
            }
            segments.push(Segment::Descend(key.to_string()));
            rest = tail;
        } else if let Some(after) = rest.strip_prefix('.') {
            let (key, tail) = split_key(after);
            match key {
                "" => return Err(err(tail, "expected a key after '.'")),
                "*" => segments.push(Segment::Wildcard),
                _ => segments.push(Segment::Key(key.to_string())),
            }
            rest = tail;
        } else if let Some(after) = rest.strip_prefix('[') {
            let (inner, tail) = after
                .split_once(']')
                .ok_or_else(|| err(rest, "unclosed '['"))?;
            let segment = bracket(inner.trim())
                .ok_or_else(|| err(rest, "expected an index, '*', a quoted key or a filter"))?;
            segments.push(segment);
            rest = tail;
        } else {
            // `$store.book` without a leading dot after `$` is accepted as a key.
            let (key, tail) = split_key(rest);
            segments.push(Segment::Key(key.to_string()));
            rest = tail;
        }
    }
    Ok(segments)
}

fn descend<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                out.push(found);
            }
            for child in map.values() {
                descend(child, key, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                descend(child, key, out);
            }
        }
        _ => {}
    }
}

/// Every value the path selects, in document order.
pub fn select<'a>(root: &'a Value, path: &str) -> Result<Vec<&'a Value>, JsonPathError> {
    let mut current = vec![root];
    for segment in parse_path(path)? {
        let mut next = Vec::new();
        for value in current {
            match (&segment, value) {
                (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                (Segment::Index(i), Value::Array(items)) => {
                    let idx = if *i < 0 {
                        i64::try_from(items.len()).ok().map(|len| len + i)
                    } else {
                        Some(*i)
                    };
                    next.extend(
                        idx.and_then(|idx| usize::try_from(idx).ok())
                            .and_then(|idx| items.get(idx)),
                    );
                }
                (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                (Segment::Descend(key), v) => descend(v, key, &mut next),
                (Segment::Filter(filter), Value::Array(items)) => {
                    next.extend(items.iter().filter(|item| filter.accepts(item)));
                }
                (Segment::Filter(filter), Value::Object(map)) => {
                    next.extend(map.values().filter(|item| filter.accepts(item)));
                }
                _ => {}
            }
        }
        current = next;
    }
    Ok(current)
}

/// Renders a selected value: strings bare, everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs `path` over JSON text. One match renders as itself, several as a JSON
/// array, none as an empty string.
pub fn query(input: &str, path: &str) -> Result<String, JsonPathError> {
    let root: Value =
        serde_json::from_str(input).map_err(|e| JsonPathError::InvalidJson(e.to_string()))?;
    let selected = select(&root, path)?;
    Ok(match selected.as_slice() {
        [] => String::new(),
        [single] => render(single),
        many => Value::Array(many.iter().map(|v| (*v).clone()).collect()).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"{
        "store": {
            "book": [
                { "title": "Sayings of the Century", "price": 8.95 },
                { "title": "Sword of Honour", "price": 12.99 }
            ],
            "bicycle": { "color": "red", "price": 19.95 }
        }
    }"#;

    #[test]
    fn test_bracket_and_dot_notation() {
        assert_eq!(
            query(STORE, "$['store']['book'][0]['title']").unwrap(),
            "Sayings of the Century"
        );
        assert_eq!(query(STORE, "$.store.bicycle.color").unwrap(), "red");
        assert_eq!(query(STORE, "$.store.book[-1].price").unwrap(), "12.99");
        assert_eq!(query(STORE, "$.store.missing").unwrap(), "");
    }

    #[test]
    fn test_wildcards_and_descent() {
        assert_eq!(
            query(STORE, "$.store.book[*].title").unwrap(),
            r#"["Sayings of the Century","Sword of Honour"]"#
        );
        // Object keys iterate in sorted order.
        assert_eq!(query(STORE, "$..price").unwrap(), "[19.95,8.95,12.99]");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            query("not json", "$.a"),
            Err(JsonPathError::InvalidJson(_))
        ));
        assert!(matches!(
            query(STORE, "$.store[abc]"),
            Err(JsonPathError::InvalidPath { .. })
        ));
        assert!(query(STORE, "$.store[0").is_err());
        assert!(query(STORE, "$.store.book[?(price < 10)]").is_err());
    }

    #[test]
    fn test_filters() {
        assert_eq!(
            query(STORE, "$.store.book[?(@.price < 10)].title").unwrap(),
            "Sayings of the Century"
        );
        assert_eq!(
            query(STORE, "$.store.book[?(@.title == 'Sword of Honour')].price").unwrap(),
            "12.99"
        );
        assert_eq!(
            query(STORE, "$.store.book[?(@.title != \"Sword of Honour\")].price").unwrap(),
            "8.95"
        );
        assert_eq!(query(STORE, "$.store[?(@.color)].price").unwrap(), "19.95");
        assert_eq!(query(STORE, "$.store.book[?(@.price >= 100)]").unwrap(), "");
    }
}
