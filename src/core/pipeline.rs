// src/core/pipeline.rs

use super::cache;
use super::jsonpath::JsonPathError;
use super::logical::strip_regex_delimiters;
use super::pipeline_funcs::{self, CallContext};
use crate::{
    core::session::Session,
    models::{CaseBlock, CaseKey, FunctionCall, HobbitHole, PatternPipeline, PipelineStep},
    workspace::{self, WorkspaceError},
};
use glob::{MatchOptions, Pattern};
use log::{debug, trace, warn};
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown pipeline function '{0}'")]
    UnknownFunction(String),
    #[error("{function}: {message}")]
    InvalidArguments { function: String, message: String },
    #[error("Invalid regular expression: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error(transparent)]
    JsonPath(#[from] JsonPathError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("Pipeline was cancelled")]
    Cancelled,
}

/// A workspace file a pattern matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    pub path: String,
    pub content: String,
}

/// How a pipeline's pattern selects its input.
#[derive(Debug)]
enum Source {
    /// No pattern: the pipeline starts from the context's `output`.
    Output,
    Binding(String),
    /// `/regex/`, tested against each file's relative path and file name.
    Regex { anchored: Regex, search: Regex },
    Glob(Pattern),
    Literal(String),
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiles a glob, reading a `**` that is not a whole path component as `*`.
fn compile_glob(raw: &str) -> Option<Pattern> {
    Pattern::new(raw)
        .or_else(|_| Pattern::new(&raw.replace("**", "*")))
        .ok()
}

/// `$name` -> `name`
fn binding_name(pattern: &str) -> Option<&str> {
    pattern
        .strip_prefix('$')
        .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

fn classify(pattern: &str) -> Source {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Source::Output;
    }
    if let Some(name) = binding_name(pattern) {
        return Source::Binding(name.to_string());
    }
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        let inner = strip_regex_delimiters(pattern);
        let compiled = Regex::new(&format!("^(?:{})$", inner)).and_then(|anchored| {
            Regex::new(inner).map(|search| Source::Regex { anchored, search })
        });
        return match compiled {
            Ok(source) => source,
            Err(e) => {
                trace!("'{}' is not a regex ({}); trying it as a glob", pattern, e);
                compile_glob(inner)
                    .map(Source::Glob)
                    .unwrap_or_else(|| Source::Literal(pattern.to_string()))
            }
        };
    }
    if pattern.contains(['*', '?', '['])
        && let Some(glob) = compile_glob(pattern)
    {
        return Source::Glob(glob);
    }
    Source::Literal(pattern.to_string())
}

/// The resolved input of one pipeline.
struct Input {
    value: String,
    files: Vec<MatchedFile>,
}

/// Evaluates pattern pipelines for one document.
///
/// Results are cached per processor, keyed by the pipeline and the content it
/// read, so evaluating the same variable twice in one pass reads files once.
pub struct PatternActionProcessor<'a> {
    session: &'a Session,
    bindings: HashMap<String, String>,
    cache: HashMap<String, String>,
}

impl<'a> PatternActionProcessor<'a> {
    pub fn new(session: &'a Session, bindings: HashMap<String, String>) -> Self {
        Self {
            session,
            bindings,
            cache: HashMap::new(),
        }
    }

    pub fn bindings(&self) -> &HashMap<String, String> {
        &self.bindings
    }

    /// Evaluates one pipeline.
    pub async fn execute(&mut self, pipeline: &PatternPipeline) -> Result<String, PipelineError> {
        let source = classify(&pipeline.pattern);
        if pipeline.steps.is_empty() {
            return Ok(match source {
                Source::Literal(_) => pipeline.pattern.clone(),
                _ => {
                    let input = self.resolve(&source, false)?;
                    if input.files.is_empty() {
                        input.value
                    } else {
                        concat(&input.files)
                    }
                }
            });
        }

        let input = self.resolve(&source, true)?;
        let key = cache::pipeline_identity(
            &pipeline.to_string(),
            std::iter::once(input.value.as_str()).chain(input.files.iter().map(|f| f.content.as_str())),
        );
        if let Some(hit) = self.cache.get(&key) {
            trace!("Pipeline cache hit for {}", pipeline);
            return Ok(hit.clone());
        }

        let search = match &source {
            Source::Regex { search, .. } => Some(search),
            _ => None,
        };
        let mut value = input.value;
        for step in &pipeline.steps {
            if self.session.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            value = match step {
                PipelineStep::Call(call) => self.apply(call, &value, &input.files).await?,
                PipelineStep::Case(case) => {
                    let selected = self.select(case, search, &value);
                    match pick_arm(case, &selected) {
                        Some(funcs) => self.fold(funcs, value, &input.files).await?,
                        None => String::new(),
                    }
                }
            };
        }

        self.cache.insert(key, value.clone());
        Ok(value)
    }

    /// Evaluates every declared variable in order. Every pipeline reads the
    /// processor's bindings only, never a sibling's result. A failing pipeline
    /// yields an empty value and the rest still run.
    pub async fn resolve_all(&mut self, hole: &HobbitHole) -> Vec<(String, String)> {
        let mut resolved = Vec::with_capacity(hole.variables.len());
        for (name, pipeline) in &hole.variables {
            let value = match self.execute(pipeline).await {
                Ok(value) => value,
                Err(PipelineError::Cancelled) => {
                    debug!("Variable resolution cancelled at '{}'", name);
                    break;
                }
                Err(e) => {
                    warn!("Variable '{}' could not be resolved: {}", name, e);
                    String::new()
                }
            };
            resolved.push((name.clone(), value));
        }
        resolved
    }

    /// Folds a bare function chain over `input`, as `onStreamingEnd` does.
    pub async fn fold(
        &self,
        funcs: &[FunctionCall],
        input: String,
        files: &[MatchedFile],
    ) -> Result<String, PipelineError> {
        let mut value = input;
        for call in funcs {
            value = self.apply(call, &value, files).await?;
        }
        Ok(value)
    }

    async fn apply(
        &self,
        call: &FunctionCall,
        input: &str,
        files: &[MatchedFile],
    ) -> Result<String, PipelineError> {
        let ctx = CallContext {
            session: self.session,
            matched: files,
        };
        pipeline_funcs::apply(call, input, &ctx).await
    }

    fn resolve(&self, source: &Source, with_steps: bool) -> Result<Input, PipelineError> {
        let input = match source {
            Source::Output => Input {
                value: self.bindings.get("output").cloned().unwrap_or_default(),
                files: Vec::new(),
            },
            Source::Binding(name) => Input {
                value: self.bindings.get(name).cloned().unwrap_or_else(|| {
                    debug!("Binding '${}' is not set", name);
                    String::new()
                }),
                files: Vec::new(),
            },
            Source::Regex { anchored, .. } => self.matching(|path| {
                anchored.is_match(path) || anchored.is_match(workspace::file_name(path))
            }),
            Source::Glob(glob) => self.matching(|path| {
                glob.matches_with(path, GLOB_OPTIONS)
                    || glob.matches_with(workspace::file_name(path), GLOB_OPTIONS)
            }),
            Source::Literal(text) => {
                let workspace = &self.session.workspace;
                match workspace.read(text) {
                    Ok(content) if with_steps => Input {
                        value: text.clone(),
                        files: vec![MatchedFile {
                            path: text.clone(),
                            content,
                        }],
                    },
                    _ => Input {
                        value: text.clone(),
                        files: Vec::new(),
                    },
                }
            }
        };
        Ok(input)
    }

    /// Matched files start the fold as their paths, one per line.
    fn matching(&self, accept: impl Fn(&str) -> bool) -> Input {
        let workspace = &self.session.workspace;
        let files: Vec<MatchedFile> = workspace
            .files()
            .into_iter()
            .filter(|path| accept(path))
            .filter_map(|path| match workspace.read(&path) {
                Ok(content) => Some(MatchedFile { path, content }),
                Err(e) => {
                    warn!("Skipping unreadable match: {}", e);
                    None
                }
            })
            .collect();
        debug!("Pattern matched {} file(s)", files.len());
        Input {
            value: files
                .iter()
                .map(|f| f.path.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            files,
        }
    }

    /// The value a `case` compares: a capture group of the pattern's regex, a
    /// binding, or the selector text itself.
    fn select(&self, case: &CaseBlock, search: Option<&Regex>, input: &str) -> String {
        if let Some(group) = case.group_index() {
            return search
                .and_then(|re| re.captures(input))
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| input.to_string());
        }
        match case.selector.strip_prefix('$') {
            Some(name) => self.bindings.get(name).cloned().unwrap_or_default(),
            None => case.selector.clone(),
        }
    }
}

fn concat(files: &[MatchedFile]) -> String {
    files
        .iter()
        .map(|f| f.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The first arm whose key equals the selected value, else `default`.
fn pick_arm<'c>(case: &'c CaseBlock, selected: &str) -> Option<&'c [FunctionCall]> {
    let selected = selected.trim();
    case.arms
        .iter()
        .find(|arm| matches!(&arm.key, CaseKey::Literal(key) if key.trim() == selected))
        .or_else(|| case.arms.iter().find(|arm| arm.key == CaseKey::Default))
        .map(|arm| arm.funcs.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::front_matter;
    use crate::workspace::{MemoryWorkspace, Workspace};
    use std::sync::Arc;

    const SAMPLE: &str = "---\nname: Summary\n---\nfileName: a\nother\nfileName: c\nfileName: b\n";

    fn session() -> Session {
        Session::new(Arc::new(
            MemoryWorkspace::new()
                .with_file("sample.shire", SAMPLE)
                .with_file("src/Main.java", "class Main {}")
                .with_file("src/Util.java", "class Util {}")
                .with_file("logs/error.log", "ERROR b\nINFO x\nERROR a\n"),
        ))
    }

    fn pipeline(source: &str) -> PatternPipeline {
        let hole = front_matter::parse_str(&format!("variables:\n  \"v\": {}", source), 2).unwrap();
        hole.variable("v").unwrap().clone()
    }

    async fn eval(session: &Session, source: &str) -> Result<String, PipelineError> {
        let mut processor = PatternActionProcessor::new(session, HashMap::new());
        processor.execute(&pipeline(source)).await
    }

    #[tokio::test]
    async fn test_literal_variable() {
        let s = session();
        assert_eq!(eval(&s, "\"demo\"").await.unwrap(), "demo");
    }

    #[tokio::test]
    async fn test_regex_pattern_with_cat_find_sort() {
        let s = session();
        let out = eval(&s, r#"/.*ple.shire/ { cat | find("fileName") | sort }"#)
            .await
            .unwrap();
        assert_eq!(out, "fileName: a\nfileName: b\nfileName: c");
    }

    #[tokio::test]
    async fn test_pattern_without_steps_concatenates_content() {
        let s = session();
        assert_eq!(eval(&s, "/.*java/").await.unwrap(), "class Main {}\nclass Util {}");
    }

    #[tokio::test]
    async fn test_invalid_regex_falls_back_to_glob() {
        let s = session();
        let out = eval(&s, "/**.java/ { sort }").await.unwrap();
        assert_eq!(out, "src/Main.java\nsrc/Util.java");
    }

    #[tokio::test]
    async fn test_fold_order_matters() {
        let s = session();
        let grep_then_sort = eval(&s, r#""logs/error.log" { cat | grep("ERROR.*") | sort }"#)
            .await
            .unwrap();
        let sort_then_head = eval(&s, r#""logs/error.log" { cat | sort | head(1) }"#)
            .await
            .unwrap();
        let head_then_sort = eval(&s, r#""logs/error.log" { cat | head(1) | sort }"#)
            .await
            .unwrap();
        assert_eq!(grep_then_sort, "ERROR a\nERROR b");
        assert_eq!(sort_then_head, "ERROR a");
        assert_eq!(head_then_sort, "ERROR b");
    }

    #[tokio::test]
    async fn test_grep_on_matched_paths() {
        let s = session();
        let out = eval(&s, r#"/.*.shire/ { grep("(.*).shire") | sort }"#).await.unwrap();
        assert_eq!(out, "sample");
    }

    #[tokio::test]
    async fn test_case_dispatch_on_binding() {
        let s = session();
        let source = r#"$level { case "$0" { "error" { print("E") } "warn" { print("W") } default { print("D") } } }"#;
        let p = pipeline(source);
        for (level, expected) in [("error", "E"), ("warn", "W"), ("info", "D")] {
            let bindings = HashMap::from([("level".to_string(), level.to_string())]);
            let mut processor = PatternActionProcessor::new(&s, bindings);
            assert_eq!(processor.execute(&p).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_case_on_capture_group_without_default() {
        let s = session();
        let source = r#"/logs.(.*)\.log/ { case "$1" { "error" { print("has errors") } } }"#;
        assert_eq!(eval(&s, source).await.unwrap(), "has errors");

        let source = r#"/logs.(.*)\.log/ { case "$1" { "warn" { print("w") } } }"#;
        assert_eq!(eval(&s, source).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unknown_function_only_fails_its_pipeline() {
        let s = session();
        let body = "variables:\n  \"bad\": \"x\" { bogus }\n  \"good\": \"demo\"\n  \"after\": \"y\" { print(\"after\") }";
        let hole = front_matter::parse_str(body, 2).unwrap();
        let mut processor = PatternActionProcessor::new(&s, HashMap::new());
        let values = processor.resolve_all(&hole).await;
        assert_eq!(
            values,
            vec![
                ("bad".to_string(), String::new()),
                ("good".to_string(), "demo".to_string()),
                ("after".to_string(), "after".to_string()),
            ]
        );
        assert!(matches!(
            processor.execute(hole.variable("bad").unwrap()).await,
            Err(PipelineError::UnknownFunction(_))
        ));
    }

    #[tokio::test]
    async fn test_variables_cannot_read_each_other() {
        let s = session();
        let body = "variables:\n  \"a\": \"secret\"\n  \"b\": $a { sort }\n  \"c\": $selection { sort }";
        let hole = front_matter::parse_str(body, 2).unwrap();
        let bindings = HashMap::from([("selection".to_string(), "zeta\nalpha".to_string())]);
        let mut processor = PatternActionProcessor::new(&s, bindings);
        let values = processor.resolve_all(&hole).await;
        assert_eq!(
            values,
            vec![
                ("a".to_string(), "secret".to_string()),
                ("b".to_string(), String::new()),
                ("c".to_string(), "alpha\nzeta".to_string()),
            ]
        );
        assert!(!processor.bindings().contains_key("a"));
    }

    #[tokio::test]
    async fn test_results_are_cached_per_processor() {
        let ws = Arc::new(MemoryWorkspace::new().with_file("a.txt", "one"));
        let s = Session::new(ws.clone());
        let p = pipeline(r#""a.txt" { cat }"#);
        let mut processor = PatternActionProcessor::new(&s, HashMap::new());
        assert_eq!(processor.execute(&p).await.unwrap(), "one");
        assert_eq!(processor.cache.len(), 1);

        // Changed content means a new identity.
        ws.write("a.txt", "two").unwrap();
        assert_eq!(processor.execute(&p).await.unwrap(), "two");
        assert_eq!(processor.cache.len(), 2);
    }
}
