// src/core/pipeline_funcs.rs

//! The functions a pattern pipeline folds over its input. Each one takes the
//! previous step's result plus its own literal arguments and returns the next
//! result.

use super::pipeline::{MatchedFile, PipelineError};
use super::{jsonpath, redact};
use crate::{
    core::session::Session, models::FunctionCall, system::executor, workspace::Workspace,
};
use regex::Regex;

/// Every function name the pipeline engine knows.
pub const FUNCTION_NAMES: &[&str] = &[
    "cat", "grep", "sort", "uniq", "head", "tail", "xargs", "print", "find", "redact",
    "jsonpath", "sed", "notify",
];

const DEFAULT_LINE_COUNT: usize = 10;

pub fn is_known(name: &str) -> bool {
    FUNCTION_NAMES.contains(&name)
}

/// What one function call sees besides its input.
pub struct CallContext<'a> {
    pub session: &'a Session,
    /// Files the pipeline's pattern matched, with their contents.
    pub matched: &'a [MatchedFile],
}

/// Applies one function call to `input`.
pub async fn apply(
    call: &FunctionCall,
    input: &str,
    ctx: &CallContext<'_>,
) -> Result<String, PipelineError> {
    log::trace!("Applying {} to {} bytes", call, input.len());
    match call.name.as_str() {
        "cat" => Ok(cat(call, input, ctx)),
        "grep" => grep(call, input),
        "sort" => {
            let mut lines: Vec<&str> = input.lines().collect();
            lines.sort_unstable();
            Ok(lines.join("\n"))
        }
        "uniq" => {
            let mut lines: Vec<&str> = input.lines().collect();
            lines.dedup();
            Ok(lines.join("\n"))
        }
        "head" => {
            let n = count_arg(call)?;
            Ok(input.lines().take(n).collect::<Vec<_>>().join("\n"))
        }
        "tail" => {
            let n = count_arg(call)?;
            let lines: Vec<&str> = input.lines().collect();
            let last = lines.get(lines.len().saturating_sub(n)..).unwrap_or_default();
            Ok(last.join("\n"))
        }
        "xargs" => xargs(call, input, ctx).await,
        "print" => Ok(if call.args.is_empty() {
            input.to_string()
        } else {
            call.args.join(" ")
        }),
        "find" => find(call, input),
        "redact" => Ok(redact::redact(input)),
        "jsonpath" => {
            let path = single_arg(call)?;
            Ok(jsonpath::query(input, path)?)
        }
        "sed" => {
            let [pattern, replacement] = call.args.as_slice() else {
                return Err(invalid(call, "expects a pattern and a replacement"));
            };
            let re = Regex::new(pattern)?;
            Ok(re.replace_all(input, replacement.as_str()).into_owned())
        }
        "notify" => {
            let message = call.args.first().map(String::as_str).unwrap_or(input);
            log::info!("{}", message);
            Ok(input.to_string())
        }
        other => Err(PipelineError::UnknownFunction(other.to_string())),
    }
}

fn invalid(call: &FunctionCall, message: &str) -> PipelineError {
    PipelineError::InvalidArguments {
        function: call.name.clone(),
        message: message.to_string(),
    }
}

fn single_arg(call: &FunctionCall) -> Result<&str, PipelineError> {
    match call.args.as_slice() {
        [arg] => Ok(arg),
        _ => Err(invalid(call, "expects exactly one argument")),
    }
}

fn count_arg(call: &FunctionCall) -> Result<usize, PipelineError> {
    match call.args.first() {
        None => Ok(DEFAULT_LINE_COUNT),
        Some(n) => n
            .trim()
            .parse()
            .map_err(|_| invalid(call, "expects a line count")),
    }
}

/// Reads files named by the arguments, else by the input lines, else the
/// pattern's matched files. Input that names no readable file passes through.
fn cat(call: &FunctionCall, input: &str, ctx: &CallContext<'_>) -> String {
    let workspace = ctx.session.workspace.as_ref();
    if !call.args.is_empty() {
        return read_paths(workspace, call.args.iter().map(String::as_str)).join("\n");
    }
    let from_input = read_paths(workspace, input.lines().filter(|l| !l.trim().is_empty()));
    if !from_input.is_empty() {
        return from_input.join("\n");
    }
    if !ctx.matched.is_empty() {
        return ctx
            .matched
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
    input.to_string()
}

fn read_paths<'p>(workspace: &dyn Workspace, paths: impl Iterator<Item = &'p str>) -> Vec<String> {
    paths.filter_map(|p| workspace.read(p.trim()).ok()).collect()
}

/// Every match of every pattern; capture group 1 when the pattern has one.
fn grep(call: &FunctionCall, input: &str) -> Result<String, PipelineError> {
    if call.args.is_empty() {
        return Err(invalid(call, "expects at least one pattern"));
    }
    let mut found = Vec::new();
    for pattern in &call.args {
        let re = Regex::new(pattern)?;
        for caps in re.captures_iter(input) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                found.push(m.as_str().to_string());
            }
        }
    }
    Ok(found.join("\n"))
}

/// A key lookup for JSON input, a line filter for everything else.
fn find(call: &FunctionCall, input: &str) -> Result<String, PipelineError> {
    let key = single_arg(call)?;
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(input)
        && (json.is_object() || json.is_array())
    {
        let found = jsonpath::select(&json, &format!("$..{}", key))?;
        return Ok(found.first().map(|v| jsonpath::render(v)).unwrap_or_default());
    }
    Ok(input
        .lines()
        .filter(|line| line.contains(key))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Runs the command once per input line, with the line as its last argument.
/// A failing invocation contributes nothing.
async fn xargs(
    call: &FunctionCall,
    input: &str,
    ctx: &CallContext<'_>,
) -> Result<String, PipelineError> {
    let command = call.args.join(" ");
    let parts = shlex::split(&command).unwrap_or_default();
    let Some((program, base_args)) = parts.split_first() else {
        return Err(invalid(call, "expects a command"));
    };

    let session = ctx.session;
    let env = session.env();
    let mut outputs = Vec::new();
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut args = base_args.to_vec();
        args.push(line.to_string());
        let result = executor::run_program(
            program,
            &args,
            session.workspace.root(),
            &env,
            None,
            &session.cancellation_token,
        )
        .await;
        match result {
            Ok(output) if output.success() => outputs.push(output.stdout.trim_end().to_string()),
            Ok(output) => log::warn!(
                "xargs: '{} {}' exited with {:?}: {}",
                program,
                line,
                output.code,
                output.stderr.trim()
            ),
            Err(executor::ExecutionError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => log::warn!("xargs: '{} {}' failed: {}", program, line, e),
        }
    }
    Ok(outputs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemoryWorkspace;
    use std::sync::Arc;

    fn call(name: &str, args: &[&str]) -> FunctionCall {
        FunctionCall::new(name, args.iter().map(|a| a.to_string()).collect())
    }

    async fn run(session: &Session, f: FunctionCall, input: &str) -> Result<String, PipelineError> {
        let ctx = CallContext {
            session,
            matched: &[],
        };
        apply(&f, input, &ctx).await
    }

    fn session() -> Session {
        Session::new(Arc::new(
            MemoryWorkspace::new()
                .with_file("a.txt", "alpha")
                .with_file("b.txt", "beta"),
        ))
    }

    #[tokio::test]
    async fn test_line_functions() {
        let s = session();
        let input = "c\na\nb\nb";
        assert_eq!(run(&s, call("sort", &[]), input).await.unwrap(), "a\nb\nb\nc");
        assert_eq!(run(&s, call("uniq", &[]), input).await.unwrap(), "c\na\nb");
        assert_eq!(run(&s, call("head", &["2"]), input).await.unwrap(), "c\na");
        assert_eq!(run(&s, call("tail", &["1"]), input).await.unwrap(), "b");
        assert_eq!(run(&s, call("tail", &["9"]), input).await.unwrap(), input);
        assert_eq!(run(&s, call("tail", &["0"]), input).await.unwrap(), "");
        assert!(run(&s, call("head", &["x"]), input).await.is_err());
    }

    #[tokio::test]
    async fn test_grep_prefers_first_group() {
        let s = session();
        let input = "phone 086-1234567890\nfax 088-1234567890\nnone";
        let out = run(&s, call("grep", &[r"([0-9]{3}-[0-9]{10})"]), input)
            .await
            .unwrap();
        assert_eq!(out, "086-1234567890\n088-1234567890");
        let out = run(&s, call("grep", &["fax"]), input).await.unwrap();
        assert_eq!(out, "fax");
        assert!(matches!(
            run(&s, call("grep", &["("]), input).await,
            Err(PipelineError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn test_cat_reads_paths_from_input_or_args() {
        let s = session();
        assert_eq!(run(&s, call("cat", &[]), "a.txt\nb.txt").await.unwrap(), "alpha\nbeta");
        assert_eq!(run(&s, call("cat", &["b.txt"]), "").await.unwrap(), "beta");
        assert_eq!(run(&s, call("cat", &[]), "just text").await.unwrap(), "just text");
    }

    #[tokio::test]
    async fn test_find_json_and_lines() {
        let s = session();
        let json = r#"{"a": {"fileName": "x.rs"}}"#;
        assert_eq!(run(&s, call("find", &["fileName"]), json).await.unwrap(), "x.rs");
        let text = "fileName: a\nother\nfileName: b";
        assert_eq!(
            run(&s, call("find", &["fileName"]), text).await.unwrap(),
            "fileName: a\nfileName: b"
        );
    }

    #[tokio::test]
    async fn test_print_sed_and_unknown() {
        let s = session();
        assert_eq!(run(&s, call("print", &["hi"]), "x").await.unwrap(), "hi");
        assert_eq!(
            run(&s, call("sed", &["o+", "0"]), "foo boo").await.unwrap(),
            "f0 b0"
        );
        assert!(matches!(
            run(&s, call("bogus", &[]), "x").await,
            Err(PipelineError::UnknownFunction(name)) if name == "bogus"
        ));
        assert!(is_known("jsonpath"));
        assert!(!is_known("bogus"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_xargs_runs_per_line_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let s = Session::new(Arc::new(crate::workspace::LocalWorkspace::new(dir.path())));
        let out = run(&s, call("xargs", &["echo", "item"]), "one\n\ntwo").await.unwrap();
        assert_eq!(out, "item one\nitem two");

        let out = run(&s, call("xargs", &["false"]), "one").await.unwrap();
        assert_eq!(out, "");
    }
}
