// src/core/post_processor.rs

//! What happens to generated text once a model has finished with it:
//! the `onStreamingEnd` chain and the `afterStreaming` dispatch table.

use super::logical::ExpressionError;
use super::pipeline::{PatternActionProcessor, PipelineError};
use crate::{
    commands::{CommandError, shell},
    core::session::Session,
    models::{AfterStreaming, CaseKey, ConditionCheck, FunctionCall},
    workspace::WorkspaceError,
};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("{0}: the generated text holds no code block")]
    NoCode(String),
}

/// Handlers that only exist after generation. Every other name is run as a
/// pipeline function over the current text.
pub const POST_HANDLERS: &[(&str, &str)] = &[
    ("parseCode", "Keep only the first fenced code block"),
    ("verifyCode", "Fail unless the text holds non-empty code (JSON is parsed)"),
    ("runCode", "Run shell code with the configured shell"),
    ("saveFile", "Write the current text to a workspace file"),
    ("logging", "Log the current text"),
    ("done", "Stop the chain"),
    ("task", "Placeholder for a host task; passes the text through"),
];

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```([\w+#.-]*)[^\n]*\n(.*?)\n?```").expect("code fence regex is valid");
}

/// The text being post-processed plus what the handlers learned about it.
#[derive(Debug, Clone, Default)]
pub struct PostContext {
    pub gen_text: String,
    /// Language of the last parsed code block.
    pub language: Option<String>,
    /// Variables the document compiled with, visible to `afterStreaming` conditions.
    pub compiled_variables: HashMap<String, String>,
}

impl PostContext {
    pub fn new(gen_text: impl Into<String>, compiled_variables: HashMap<String, String>) -> Self {
        Self {
            gen_text: gen_text.into(),
            language: None,
            compiled_variables,
        }
    }
}

/// First fenced block of the text: its language tag and code.
pub fn parse_code(text: &str) -> Option<(Option<String>, String)> {
    let caps = CODE_FENCE.captures(text)?;
    let language = caps
        .get(1)
        .map(|m| m.as_str().to_string())
        .filter(|l| !l.is_empty());
    let code = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
    Some((language, code))
}

/// Runs the `onStreamingEnd` chain, each handler seeing the previous one's text.
pub async fn on_streaming_end(
    session: &Session,
    funcs: &[FunctionCall],
    ctx: &mut PostContext,
) -> Result<String, PostError> {
    let processor = PatternActionProcessor::new(session, ctx.compiled_variables.clone());
    let mut text = ctx.gen_text.clone();
    for call in funcs {
        debug!("Post-processing with {}", call);
        text = match call.name.as_str() {
            "done" => break,
            "parseCode" => {
                let (language, code) = parse_code(&text).ok_or_else(|| PostError::NoCode(call.name.clone()))?;
                ctx.language = language;
                code
            }
            "verifyCode" => {
                let (language, code) = match parse_code(&text) {
                    Some(found) => found,
                    None => (ctx.language.clone(), text.clone()),
                };
                if code.trim().is_empty() {
                    return Err(PostError::NoCode(call.name.clone()));
                }
                if language.as_deref() == Some("json") {
                    serde_json::from_str::<serde_json::Value>(&code).map_err(|e| {
                        CommandError::InvalidProps {
                            props: "json".to_string(),
                            message: e.to_string(),
                        }
                    })?;
                }
                text
            }
            "runCode" => {
                let (language, code) = match parse_code(&text) {
                    Some(found) => found,
                    None => (ctx.language.clone(), text.clone()),
                };
                match language.as_deref() {
                    None | Some("sh" | "bash" | "shell" | "zsh") => {
                        shell::run_script(session, "generated code", &code).await?
                    }
                    Some(other) => {
                        return Err(CommandError::Unsupported(format!("runCode for {}", other)).into());
                    }
                }
            }
            "saveFile" => {
                let path = call.args.first().ok_or_else(|| {
                    PipelineError::InvalidArguments {
                        function: call.name.clone(),
                        message: "expects a file path".to_string(),
                    }
                })?;
                session.workspace.write(path, &text)?;
                info!("Saved generated text to {}", path);
                text
            }
            "logging" => {
                info!("{}", text);
                text
            }
            "task" => text,
            _ => processor.fold(std::slice::from_ref(call), text, &[]).await?,
        };
    }
    ctx.gen_text = text.clone();
    Ok(text)
}

/// Evaluates the `afterStreaming` conditions in order and runs the case arm of
/// the first one that holds, or `default`. Returns `None` when nothing ran.
pub async fn after_streaming(
    session: &Session,
    after: &AfterStreaming,
    ctx: &mut PostContext,
) -> Result<Option<String>, PostError> {
    let mut bindings = ctx.compiled_variables.clone();
    bindings.insert("output".to_string(), ctx.gen_text.clone());

    let mut matched: Option<&str> = None;
    for arm in &after.conditions {
        let holds = match &arm.check {
            ConditionCheck::Expression(expr) => expr.evaluate(&bindings)?,
            ConditionCheck::Functions(funcs) => {
                // Checks run on a scratch copy; only the chosen case changes `ctx`.
                let mut scratch = ctx.clone();
                match on_streaming_end(session, funcs, &mut scratch).await {
                    Ok(value) => !value.trim().is_empty(),
                    Err(e) => {
                        warn!("Condition '{}' failed: {}", arm.key, e);
                        false
                    }
                }
            }
        };
        debug!("afterStreaming condition '{}' -> {}", arm.key, holds);
        if holds {
            matched = Some(arm.key.as_str());
            break;
        }
    }

    let chosen = after
        .cases
        .iter()
        .find(|case| matches!((&case.key, matched), (CaseKey::Literal(k), Some(m)) if k == m))
        .or_else(|| after.cases.iter().find(|case| case.key == CaseKey::Default));
    match chosen {
        Some(case) => on_streaming_end(session, &case.funcs, ctx).await.map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::front_matter;
    use crate::workspace::{MemoryWorkspace, Workspace};
    use std::sync::Arc;

    const GENERATED: &str = "Here you go:\n```json\n{\"store\": {\"book\": [{\"title\": \"Dune\"}]}}\n```\nEnjoy.";

    fn session() -> (Arc<MemoryWorkspace>, Session) {
        let ws = Arc::new(MemoryWorkspace::new());
        (ws.clone(), Session::new(ws))
    }

    #[test]
    fn test_parse_code() {
        let (lang, code) = parse_code(GENERATED).unwrap();
        assert_eq!(lang.as_deref(), Some("json"));
        assert_eq!(code, "{\"store\": {\"book\": [{\"title\": \"Dune\"}]}}");
        assert!(parse_code("no code here").is_none());
    }

    #[tokio::test]
    async fn test_chain_mixes_handlers_and_pipeline_functions() {
        let (ws, s) = session();
        let hole = front_matter::parse_str(
            "onStreamingEnd: { parseCode | verifyCode | jsonpath(\"$.store.book[0].title\") | saveFile(\"out.txt\") | done | logging }",
            2,
        )
        .unwrap();
        let mut ctx = PostContext::new(GENERATED, HashMap::new());
        let out = on_streaming_end(&s, &hole.on_streaming_end, &mut ctx).await.unwrap();
        assert_eq!(out, "Dune");
        assert_eq!(ctx.language.as_deref(), Some("json"));
        assert_eq!(ws.read("out.txt").unwrap(), "Dune");
    }

    #[tokio::test]
    async fn test_verify_code_rejects_broken_json() {
        let (_, s) = session();
        let funcs = vec![FunctionCall::new("verifyCode", Vec::new())];
        let mut ctx = PostContext::new("```json\n{oops\n```", HashMap::new());
        assert!(on_streaming_end(&s, &funcs, &mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_after_streaming_picks_first_true_condition() {
        let (_, s) = session();
        let body = r#"afterStreaming: {
  condition {
    "variable-success" { $selection.length > 1 }
    "jsonpath-success" { parseCode | jsonpath("$.store.book[0].title") }
  }
  case condition {
    "variable-success" { print("variable") }
    "jsonpath-success" { print("jsonpath") }
    default { print("fallback") }
  }
}"#;
        let hole = front_matter::parse_str(body, 2).unwrap();
        let after = hole.after_streaming.unwrap();

        let vars = HashMap::from([("selection".to_string(), "ab".to_string())]);
        let mut ctx = PostContext::new(GENERATED, vars);
        let out = after_streaming(&s, &after, &mut ctx).await.unwrap();
        assert_eq!(out.as_deref(), Some("variable"));

        let mut ctx = PostContext::new(GENERATED, HashMap::new());
        let out = after_streaming(&s, &after, &mut ctx).await.unwrap();
        assert_eq!(out.as_deref(), Some("jsonpath"));

        let mut ctx = PostContext::new("plain text", HashMap::new());
        let out = after_streaming(&s, &after, &mut ctx).await.unwrap();
        assert_eq!(out.as_deref(), Some("fallback"));
    }
}
