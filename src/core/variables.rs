// src/core/variables.rs

//! Where `$name` values come from. Layers, lowest precedence first:
//!
//! 1. system variables (`os`, `arch`, `workspaceRoot`, ...),
//! 2. editor variables (`selection`, `fileName`, ...),
//! 3. the pipeline context (`output` plus overrides from earlier commands),
//! 4. the document's own `variables:` pipelines.

use super::pipeline::PatternActionProcessor;
use crate::{
    commands::file::language_for,
    core::session::Session,
    models::{EditorState, HobbitHole, VariableType},
    workspace,
};
use std::collections::HashMap;

/// Variables derived from the host editor.
pub const EDITOR_VARIABLES: &[(&str, &str)] = &[
    ("selection", "The selected text"),
    ("fileName", "Name of the current file"),
    ("filePath", "Path of the current file, relative to the workspace"),
    ("language", "Language of the current file"),
    ("all", "Content of the current file"),
    ("input", "The selection if there is one, else the whole file"),
];

/// Variables describing the machine the engine runs on.
pub const SYSTEM_VARIABLES: &[(&str, &str)] = &[
    ("os", "Operating system"),
    ("arch", "CPU architecture"),
    ("workspaceRoot", "Absolute path of the workspace"),
    ("user", "Name of the current user"),
];

/// True for names that need an editor position to resolve.
pub fn needs_editor(name: &str) -> bool {
    EDITOR_VARIABLES.iter().any(|(n, _)| *n == name)
}

pub fn is_system(name: &str) -> bool {
    SYSTEM_VARIABLES.iter().any(|(n, _)| *n == name)
}

/// A best guess at the type of a resolved value.
pub fn infer_type(value: &str) -> VariableType {
    let trimmed = value.trim();
    if matches!(trimmed, "true" | "false") {
        VariableType::Boolean
    } else if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok() {
        VariableType::Number
    } else if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        VariableType::Json
    } else {
        VariableType::String
    }
}

pub fn system_bindings(session: &Session) -> HashMap<String, String> {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    HashMap::from([
        ("os".to_string(), std::env::consts::OS.to_string()),
        ("arch".to_string(), std::env::consts::ARCH.to_string()),
        (
            "workspaceRoot".to_string(),
            session.workspace.root().to_string_lossy().into_owned(),
        ),
        ("user".to_string(), user),
    ])
}

pub fn editor_bindings(editor: &EditorState) -> HashMap<String, String> {
    let mut bindings = HashMap::new();
    let path = editor.file_path.clone().unwrap_or_default();
    let selection = editor.selection.clone().unwrap_or_default();
    let content = editor.file_content.clone().unwrap_or_default();
    let language = editor
        .language
        .clone()
        .unwrap_or_else(|| language_for(&path).to_string());

    bindings.insert("fileName".to_string(), workspace::file_name(&path).to_string());
    bindings.insert("filePath".to_string(), path);
    bindings.insert("language".to_string(), language);
    bindings.insert(
        "input".to_string(),
        if selection.is_empty() {
            content.clone()
        } else {
            selection.clone()
        },
    );
    bindings.insert("selection".to_string(), selection);
    bindings.insert("all".to_string(), content);
    bindings
}

/// Everything below the document's own pipelines.
pub fn base_bindings(session: &Session) -> HashMap<String, String> {
    let mut bindings = system_bindings(session);
    if let Some(editor) = session.editor() {
        bindings.extend(editor_bindings(&editor));
    }
    bindings.extend(session.context.snapshot().bindings());
    bindings
}

/// Every binding a document sees, its `variables:` pipelines evaluated last.
pub async fn resolve(session: &Session, hole: Option<&HobbitHole>) -> HashMap<String, String> {
    let base = base_bindings(session);
    let Some(hole) = hole.filter(|h| !h.variables.is_empty()) else {
        return base;
    };
    let mut processor = PatternActionProcessor::new(session, base);
    processor.resolve_all(hole).await;
    processor.bindings().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::front_matter;
    use crate::workspace::MemoryWorkspace;
    use std::sync::Arc;

    fn editor() -> EditorState {
        EditorState {
            file_path: Some("src/App.kt".to_string()),
            file_content: Some("fun main() {}".to_string()),
            selection: Some(String::new()),
            language: None,
        }
    }

    #[test]
    fn test_editor_bindings() {
        let b = editor_bindings(&editor());
        assert_eq!(b["fileName"], "App.kt");
        assert_eq!(b["filePath"], "src/App.kt");
        assert_eq!(b["language"], "kotlin");
        assert_eq!(b["input"], "fun main() {}");
        assert!(needs_editor("selection"));
        assert!(!needs_editor("os"));
        assert!(is_system("arch"));
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(infer_type("true"), VariableType::Boolean);
        assert_eq!(infer_type("4.5"), VariableType::Number);
        assert_eq!(infer_type("{\"a\": 1}"), VariableType::Json);
        assert_eq!(infer_type("{oops"), VariableType::String);
        assert_eq!(infer_type(""), VariableType::String);
    }

    #[tokio::test]
    async fn test_layers_and_precedence() {
        let session = Session::new(Arc::new(MemoryWorkspace::new())).with_editor(editor());
        session.context.merge([("fileName", "Override.kt")]);
        session.context.set_output("previous");

        let hole = front_matter::parse_str(
            "variables:\n  \"greeting\": \"hello\"\n  \"echo\": $output { print(\"seen\") }",
            2,
        )
        .unwrap();
        let bindings = resolve(&session, Some(&hole)).await;

        assert_eq!(bindings["os"], std::env::consts::OS);
        assert_eq!(bindings["fileName"], "Override.kt");
        assert_eq!(bindings["output"], "previous");
        assert_eq!(bindings["greeting"], "hello");
        assert_eq!(bindings["echo"], "seen");
    }
}
