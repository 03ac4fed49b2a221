//! Directory tree inspection.
//!
//! Flat, depth-limited listing of a confined subtree. A fixed built-in
//! ignore set (version-control metadata, dependency and build output,
//! editor state) and all dot-prefixed entries are skipped entirely;
//! unreadable subtrees are skipped, not fatal.

use std::path::Path;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;

use anvil_types::{TreeNode, WorkspaceError};

/// Directories never descended into, regardless of depth.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    ".next",
    "vendor",
    "target",
    ".cache",
    ".venv",
    "__pycache__",
    ".idea",
    ".vscode",
    "coverage",
    ".nyc_output",
];

/// Depth used when the caller passes a non-positive maximum.
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// Walk `start` (which must be a directory under `root`), returning entries
/// up to `max_depth` levels below the workspace root.
///
/// Depth of an entry is the number of separators in its root-relative path
/// plus one, so `max_depth = 2` includes `a` and `a/b` but not `a/b/c`.
/// Directories sort before files, case-insensitive lexical order within
/// each group. Cancellation is checked per visited entry.
pub fn scan_tree(
    cancel: &CancellationToken,
    root: &Path,
    start: &Path,
    max_depth: i64,
) -> Result<Vec<TreeNode>, WorkspaceError> {
    let meta = std::fs::metadata(start).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorkspaceError::NotFound {
                path: start.to_path_buf(),
            }
        } else {
            WorkspaceError::io(start, e)
        }
    })?;
    if !meta.is_dir() {
        return Err(WorkspaceError::invalid_argument(format!(
            "path is not a directory: {}",
            start.display()
        )));
    }

    let max_depth = if max_depth <= 0 {
        DEFAULT_MAX_DEPTH
    } else {
        max_depth as usize
    };

    // Depth of the start directory itself, measured from the workspace root.
    let start_depth = match start.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => 0,
        Ok(rel) => rel.components().count(),
        Err(_) => 0,
    };
    // The walker measures depth from `start`; cap it so entries past the
    // budget are neither yielded nor descended into.
    let walk_budget = max_depth.saturating_sub(start_depth);

    let mut nodes = Vec::new();
    let walker = WalkBuilder::new(start)
        .standard_filters(false)
        .hidden(true)
        .max_depth(Some(walk_budget))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if is_dir
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| IGNORED_DIRS.contains(&name))
            {
                return false;
            }
            true
        })
        .build();

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(WorkspaceError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Unreadable subtree: skip, don't fail the whole scan.
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue; // the start directory itself
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        let (size, mod_time) = match entry.metadata() {
            Ok(meta) => {
                let size = if is_dir { 0 } else { meta.len() };
                let mod_time = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(DateTime::UNIX_EPOCH);
                (size, mod_time)
            }
            Err(_) => (0, DateTime::UNIX_EPOCH),
        };

        nodes.push(TreeNode {
            path: rel,
            is_dir,
            size,
            mod_time,
        });
    }

    nodes.sort_by(|a, b| {
        if a.is_dir == b.is_dir {
            a.path.to_lowercase().cmp(&b.path.to_lowercase())
        } else {
            b.is_dir.cmp(&a.is_dir)
        }
    });

    Ok(nodes)
}
