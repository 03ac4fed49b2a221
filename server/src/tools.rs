//! Tool descriptors and dispatch.
//!
//! Each workspace operation is exposed as one MCP tool with a JSON schema;
//! dispatch deserializes the arguments, runs the operation, and renders a
//! text result. Mutating tools include a change preview so the caller can
//! audit what actually changed without re-reading the file.

use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use anvil_types::WorkspaceError;
use anvil_utils::{compute_diff_stats, render_change_preview};
use anvil_workspace::Workspace;

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, WorkspaceError> {
    serde_json::from_value(args.clone()).map_err(|e| WorkspaceError::InvalidArgument {
        message: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
    #[serde(default)]
    max_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
    #[serde(default)]
    allow_create: bool,
}

#[derive(Debug, Deserialize)]
struct InspectArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    max_depth: i64,
}

#[derive(Debug, Deserialize)]
struct FragmentArgs {
    path: String,
    start_line: u32,
    end_line: u32,
}

#[derive(Debug, Deserialize)]
struct DiffArgs {
    diff: String,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct ReplaceArgs {
    path: String,
    old: String,
    new: String,
    #[serde(default)]
    expected_occurrences: i64,
}

#[derive(Debug, Deserialize)]
struct ExecArgs {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    timeout_secs: i64,
}

#[derive(Debug, Deserialize)]
struct FileSizeArgs {
    path: String,
}

/// MCP descriptors for every registered tool, sorted by name.
#[must_use]
pub fn tool_descriptors() -> Vec<Value> {
    let mut tools = vec![
        json!({
            "name": "workspace.read_file",
            "description": "Read a file from the workspace, bounded by a byte cap",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path, absolute or workspace-relative" },
                    "max_bytes": { "type": "integer", "minimum": 0, "description": "Read cap in bytes (0 = configured default)" }
                },
                "required": ["path"]
            }
        }),
        json!({
            "name": "workspace.write_file",
            "description": "Atomically write content to a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path to write" },
                    "content": { "type": "string", "description": "Full file content" },
                    "allow_create": { "type": "boolean", "default": false, "description": "Allow creating a new file" }
                },
                "required": ["path", "content"]
            }
        }),
        json!({
            "name": "workspace.inspect_workspace",
            "description": "List the workspace directory tree, depth-limited",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative directory to inspect (default: root)" },
                    "max_depth": { "type": "integer", "description": "Maximum depth (<= 0 selects the default)" }
                }
            }
        }),
        json!({
            "name": "workspace.read_code_fragment",
            "description": "Read an inclusive 1-indexed line range from a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path to read" },
                    "start_line": { "type": "integer", "minimum": 1, "description": "First line, 1-indexed" },
                    "end_line": { "type": "integer", "minimum": 1, "description": "Last line, inclusive" }
                },
                "required": ["path", "start_line", "end_line"]
            }
        }),
        json!({
            "name": "workspace.apply_unified_diff",
            "description": "Apply a unified diff to workspace files",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "diff": { "type": "string", "description": "Unified diff text" },
                    "dry_run": { "type": "boolean", "default": false, "description": "Validate without writing" }
                },
                "required": ["diff"]
            }
        }),
        json!({
            "name": "workspace.search_and_replace",
            "description": "Exact-match string replacement with an occurrence-count safety check",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path to modify" },
                    "old": { "type": "string", "description": "Exact string to search for" },
                    "new": { "type": "string", "description": "Replacement string" },
                    "expected_occurrences": { "type": "integer", "minimum": 0, "description": "Expected match count (0 = dry run, count only)" }
                },
                "required": ["path", "old", "new"]
            }
        }),
        json!({
            "name": "workspace.secure_exec",
            "description": "Execute a whitelisted command in the workspace root with timeout and output truncation",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command to execute" },
                    "args": { "type": "array", "items": { "type": "string" }, "description": "Command arguments" },
                    "timeout_secs": { "type": "integer", "description": "Timeout in seconds (<= 0 selects the default)" }
                },
                "required": ["command"]
            }
        }),
        json!({
            "name": "workspace.file_size",
            "description": "Physical (disk-block-rounded) size of a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path to stat" }
                },
                "required": ["path"]
            }
        }),
        json!({
            "name": "workspace.health",
            "description": "Health check with the registered tool list",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ];
    tools.sort_by_key(|t| t["name"].as_str().unwrap_or_default().to_string());
    tools
}

/// Names of all registered tools.
#[must_use]
pub fn tool_names() -> Vec<String> {
    tool_descriptors()
        .iter()
        .filter_map(|t| t["name"].as_str().map(ToString::to_string))
        .collect()
}

/// Run one tool call against the workspace, rendering a text result.
pub async fn dispatch(
    workspace: &dyn Workspace,
    cancel: &CancellationToken,
    name: &str,
    args: &Value,
) -> Result<String, WorkspaceError> {
    match name {
        "workspace.read_file" => {
            let typed: ReadFileArgs = parse_args(args)?;
            let bytes = workspace
                .read_file(cancel, &typed.path, typed.max_bytes)
                .await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        "workspace.write_file" => {
            let typed: WriteFileArgs = parse_args(args)?;
            // Snapshot the old content first so the result can carry a
            // change preview; missing file means an empty "before".
            let old = match workspace.read_file(cancel, &typed.path, 0).await {
                Ok(bytes) => bytes,
                Err(WorkspaceError::NotFound { .. }) => Vec::new(),
                Err(WorkspaceError::SizeExceeded { partial, .. }) => partial,
                Err(other) => return Err(other),
            };
            workspace
                .write_file(cancel, &typed.path, typed.content.as_bytes(), typed.allow_create)
                .await?;
            let (added, removed) = compute_diff_stats(&old, typed.content.as_bytes());
            let mut out = format!(
                "Wrote {} ({} bytes, +{added} -{removed})",
                typed.path,
                typed.content.len()
            );
            let preview = render_change_preview(&old, typed.content.as_bytes());
            if !preview.is_empty() {
                out.push('\n');
                out.push_str(&preview);
            }
            Ok(out)
        }
        "workspace.inspect_workspace" => {
            let typed: InspectArgs = parse_args(args)?;
            let nodes = workspace
                .inspect_workspace(cancel, &typed.path, typed.max_depth)
                .await?;
            serde_json::to_string_pretty(&nodes).map_err(|e| WorkspaceError::ExecutionFailed {
                message: format!("failed to encode listing: {e}"),
            })
        }
        "workspace.read_code_fragment" => {
            let typed: FragmentArgs = parse_args(args)?;
            let fragment = workspace
                .read_code_fragment(cancel, &typed.path, typed.start_line, typed.end_line)
                .await?;
            let mut out = fragment.lines.join("\n");
            if fragment.truncated {
                out.push_str("\n[truncated: file ended before the requested range]");
            }
            Ok(out)
        }
        "workspace.apply_unified_diff" => {
            let typed: DiffArgs = parse_args(args)?;
            let applied = workspace
                .apply_unified_diff(cancel, &typed.diff, typed.dry_run)
                .await?;
            let verb = if typed.dry_run { "Would apply" } else { "Applied" };
            Ok(format!(
                "{verb} {} file(s): {}",
                applied.len(),
                applied.join(", ")
            ))
        }
        "workspace.search_and_replace" => {
            let typed: ReplaceArgs = parse_args(args)?;
            let count = workspace
                .search_and_replace(
                    cancel,
                    &typed.path,
                    &typed.old,
                    &typed.new,
                    typed.expected_occurrences,
                )
                .await?;
            if typed.expected_occurrences == 0 {
                Ok(format!("Found {count} occurrence(s) in {} (dry run)", typed.path))
            } else {
                Ok(format!("Replaced {count} occurrence(s) in {}", typed.path))
            }
        }
        "workspace.secure_exec" => {
            let typed: ExecArgs = parse_args(args)?;
            let out = workspace
                .secure_exec(cancel, &typed.command, &typed.args, typed.timeout_secs)
                .await?;
            let mut text = out.stdout.clone();
            if !out.stderr.trim().is_empty() {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str("[stderr]\n");
                text.push_str(&out.stderr);
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("exit code: {}", out.exit_code));
            Ok(text)
        }
        "workspace.file_size" => {
            let typed: FileSizeArgs = parse_args(args)?;
            let size = workspace.physical_file_size(&typed.path)?;
            Ok(format!("{size}"))
        }
        "workspace.health" => {
            let health = json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "tools": tool_names(),
            });
            serde_json::to_string_pretty(&health).map_err(|e| WorkspaceError::ExecutionFailed {
                message: format!("failed to encode health: {e}"),
            })
        }
        other => Err(WorkspaceError::InvalidArgument {
            message: format!("unknown tool: {other}"),
        }),
    }
}
