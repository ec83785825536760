// src/commands/patch.rs

use super::{CommandError, CommandInput, ShireCommand};
use crate::core::session::Session;
use async_trait::async_trait;

/// `/patch[:path]` followed by a unified diff: applies the diff to the workspace.
///
/// Without props every file named by a `+++` header is patched; with props the
/// single file in the diff is applied to that path instead.
#[derive(Debug, Clone)]
pub struct PatchCommand {
    input: CommandInput,
}

impl PatchCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for PatchCommand {
    fn name(&self) -> &str {
        "patch"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let diff = self
            .input
            .code_block
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| CommandError::MissingCodeBlock("patch".to_string()))?;

        let files = parse_unified_diff(diff).map_err(CommandError::Patch)?;
        if files.is_empty() {
            return Err(CommandError::Patch("no valid hunks found".to_string()));
        }
        let explicit = Some(self.input.props.trim()).filter(|p| !p.is_empty());
        if explicit.is_some() && files.len() > 1 {
            return Err(CommandError::Patch(
                "an explicit target only works with a single-file diff".to_string(),
            ));
        }

        // Everything is checked before anything is written.
        let mut patched = Vec::with_capacity(files.len());
        for file in &files {
            let target = explicit.unwrap_or(&file.target);
            let current = if file.is_new {
                String::new()
            } else {
                session.workspace.read(target)?
            };
            let content = apply_hunks(&current, &file.hunks)
                .map_err(|e| CommandError::Patch(format!("{}: {}", target, e)))?;
            patched.push((target.to_string(), content));
        }

        let mut report = Vec::with_capacity(patched.len());
        for (target, content) in patched {
            session.workspace.write(&target, &content)?;
            log::info!("Patched {}", target);
            report.push(format!("patching file {}", target));
        }
        Ok(report.join("\n"))
    }
}

// --- DIFF PARSING ---

#[derive(Debug, Clone, PartialEq, Eq)]
enum DiffLine {
    Context(String),
    Delete(String),
    Insert(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffHunk {
    /// 1-based first line of the hunk in the original file.
    old_start: usize,
    lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilePatch {
    target: String,
    is_new: bool,
    hunks: Vec<DiffHunk>,
}

fn parse_unified_diff(content: &str) -> Result<Vec<FilePatch>, String> {
    let mut files: Vec<FilePatch> = Vec::new();
    let mut source_is_null = false;
    let mut current: Option<FilePatch> = None;
    let mut hunk: Option<DiffHunk> = None;

    let flush = |current: &mut Option<FilePatch>,
                 hunk: &mut Option<DiffHunk>,
                 files: &mut Vec<FilePatch>| {
        if let Some(file) = current.as_mut()
            && let Some(h) = hunk.take()
        {
            file.hunks.push(h);
        }
        if let Some(file) = current.take()
            && !file.hunks.is_empty()
        {
            files.push(file);
        }
    };

    for line in content.lines() {
        if let Some(source) = line.strip_prefix("--- ") {
            flush(&mut current, &mut hunk, &mut files);
            source_is_null = header_path(source) == "/dev/null";
        } else if let Some(target) = line.strip_prefix("+++ ") {
            current = Some(FilePatch {
                target: strip_side_prefix(header_path(target)).to_string(),
                is_new: source_is_null,
                hunks: Vec::new(),
            });
        } else if line.starts_with("@@") {
            let Some(file) = current.as_mut() else {
                return Err(format!("hunk without a file header: {}", line));
            };
            if let Some(h) = hunk.take() {
                file.hunks.push(h);
            }
            hunk = Some(parse_hunk_header(line)?);
        } else if let Some(h) = hunk.as_mut() {
            if let Some(rest) = line.strip_prefix('-') {
                h.lines.push(DiffLine::Delete(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('+') {
                h.lines.push(DiffLine::Insert(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix(' ') {
                h.lines.push(DiffLine::Context(rest.to_string()));
            } else if line.is_empty() {
                h.lines.push(DiffLine::Context(String::new()));
            }
            // `\ No newline at end of file` and git noise are skipped.
        }
    }
    flush(&mut current, &mut hunk, &mut files);
    Ok(files)
}

/// The path part of a `---`/`+++` header, without any trailing timestamp.
fn header_path(rest: &str) -> &str {
    rest.split('\t').next().unwrap_or(rest).trim()
}

fn strip_side_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

/// Parses `@@ -1,3 +1,4 @@` (counts optional).
fn parse_hunk_header(line: &str) -> Result<DiffHunk, String> {
    let content = line
        .strip_prefix("@@ ")
        .and_then(|s| s.split(" @@").next())
        .ok_or_else(|| format!("invalid hunk header: {}", line))?;
    let old = content
        .split_whitespace()
        .next()
        .and_then(|part| part.strip_prefix('-'))
        .ok_or_else(|| format!("invalid hunk header: {}", line))?;
    let start = old.split(',').next().unwrap_or(old);
    let old_start = start
        .parse::<usize>()
        .map_err(|_| format!("invalid number in hunk header: {}", line))?;
    Ok(DiffHunk {
        old_start,
        lines: Vec::new(),
    })
}

// --- APPLICATION ---

/// Applies hunks in order, verifying every context and deleted line.
fn apply_hunks(content: &str, hunks: &[DiffHunk]) -> Result<String, String> {
    let original: Vec<&str> = content.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(original.len());
    // Index of the next original line not yet copied.
    let mut cursor = 0usize;

    for hunk in hunks {
        // A hunk for an empty range (`-0,0`) starts before line 1.
        let start = hunk.old_start.saturating_sub(1);
        if start < cursor || start > original.len() {
            return Err(format!("hunk at line {} is out of order", hunk.old_start));
        }
        let unchanged = original.get(cursor..start).unwrap_or_default();
        out.extend(unchanged.iter().map(|l| l.to_string()));
        cursor = start;

        for line in &hunk.lines {
            match line {
                DiffLine::Context(expected) | DiffLine::Delete(expected) => {
                    let actual = original.get(cursor).copied().unwrap_or_default();
                    if original.get(cursor).is_none() || actual != expected {
                        return Err(format!(
                            "mismatch at line {}: expected '{}', found '{}'",
                            cursor + 1,
                            expected,
                            actual
                        ));
                    }
                    if matches!(line, DiffLine::Context(_)) {
                        out.push(actual.to_string());
                    }
                    cursor += 1;
                }
                DiffLine::Insert(added) => out.push(added.clone()),
            }
        }
    }
    let tail = original.get(cursor..).unwrap_or_default();
    out.extend(tail.iter().map(|l| l.to_string()));

    let mut result = out.join("\n");
    if !result.is_empty() && (content.ends_with('\n') || content.is_empty()) {
        result.push('\n');
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{MemoryWorkspace, Workspace};
    use std::sync::Arc;

    const DIFF: &str = "\
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 fn a() {}
-fn b() {}
+fn b() { todo() }
 fn c() {}
";

    #[test]
    fn test_parse_strips_side_prefixes() {
        let files = parse_unified_diff(DIFF).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].target, "src/lib.rs");
        assert!(!files[0].is_new);
        assert_eq!(files[0].hunks[0].old_start, 1);
        assert_eq!(files[0].hunks[0].lines.len(), 4);
    }

    #[test]
    fn test_apply_hunks_verifies_context() {
        let files = parse_unified_diff(DIFF).unwrap();
        let patched = apply_hunks("fn a() {}\nfn b() {}\nfn c() {}\n", &files[0].hunks).unwrap();
        assert_eq!(patched, "fn a() {}\nfn b() { todo() }\nfn c() {}\n");

        let err = apply_hunks("fn a() {}\nfn x() {}\nfn c() {}\n", &files[0].hunks).unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_hunk_header_without_counts() {
        assert_eq!(parse_hunk_header("@@ -7 +7,2 @@ fn x").unwrap().old_start, 7);
        assert!(parse_hunk_header("@@ nonsense").is_err());
    }

    #[tokio::test]
    async fn test_patch_command_writes_files() {
        let ws = Arc::new(
            MemoryWorkspace::new().with_file("src/lib.rs", "fn a() {}\nfn b() {}\nfn c() {}\n"),
        );
        let session = Session::new(ws.clone());
        let new_file = "--- /dev/null\n+++ b/NOTES.md\n@@ -0,0 +1,1 @@\n+hello\n";
        let diff = format!("{}{}", DIFF, new_file);

        let out = PatchCommand::new(CommandInput {
            props: String::new(),
            code_block: Some(diff),
        })
        .execute(&session)
        .await
        .unwrap();

        assert_eq!(out, "patching file src/lib.rs\npatching file NOTES.md");
        assert_eq!(
            ws.read("src/lib.rs").unwrap(),
            "fn a() {}\nfn b() { todo() }\nfn c() {}\n"
        );
        assert_eq!(ws.read("NOTES.md").unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_failed_patch_leaves_files_untouched() {
        let ws = Arc::new(MemoryWorkspace::new().with_file("src/lib.rs", "other\n"));
        let session = Session::new(ws.clone());
        let result = PatchCommand::new(CommandInput {
            props: String::new(),
            code_block: Some(DIFF.to_string()),
        })
        .execute(&session)
        .await;
        assert!(matches!(result, Err(CommandError::Patch(_))));
        assert_eq!(ws.read("src/lib.rs").unwrap(), "other\n");
    }
}
