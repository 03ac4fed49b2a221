//! Unified diff parsing and application.
//!
//! The parser is a three-state machine (idle, in a patch, in a hunk) over
//! standard unified diff text: `--- `/`+++ ` file headers with optional
//! `a/`/`b/` prefixes, `@@ -old[,count] +new[,count] @@` hunk headers, and
//! body lines prefixed `+`, `-`, or a space. Malformed hunk headers are the
//! only hard parse failure; unrecognized lines inside a hunk are ignored.
//!
//! Application walks an old-line cursor through the original content hunk by
//! hunk. A delete line advances the cursor only when the original line
//! matches; on mismatch the cursor stays put and the remainder of the hunk
//! desynchronizes silently (observed legacy behavior, kept; a warning is
//! logged so it shows up in traces).

use anvil_types::WorkspaceError;

pub const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Add,
    Delete,
}

#[derive(Debug, Clone)]
pub struct PatchLine {
    pub kind: LineKind,
    pub text: String,
}

/// One contiguous block of changes with old/new position headers.
#[derive(Debug, Clone, Default)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<PatchLine>,
}

/// All hunks targeting a single file.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    /// Target path as given in the diff, `a/`/`b/` prefixes stripped.
    pub path: String,
    /// True when this patch introduces the file.
    pub is_new_file: bool,
    pub hunks: Vec<Hunk>,
    from_dev_null: bool,
}

impl FilePatch {
    fn finalize(mut self, open_hunk: Option<Hunk>) -> Self {
        if let Some(hunk) = open_hunk {
            self.hunks.push(hunk);
        }
        // Hunks must apply in ascending old-line order regardless of the
        // order they appeared in the text.
        self.hunks.sort_by_key(|h| h.old_start);
        // An explicit /dev/null old side is authoritative; without one, a
        // patch with no deletions anywhere is taken as file creation.
        self.is_new_file = self.from_dev_null
            || self
                .hunks
                .iter()
                .flat_map(|h| &h.lines)
                .all(|l| l.kind != LineKind::Delete);
        self
    }
}

/// Parse unified diff text into per-file patches.
pub fn parse_unified_diff(diff_text: &str) -> Result<Vec<FilePatch>, WorkspaceError> {
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut current_patch: Option<FilePatch> = None;
    let mut current_hunk: Option<Hunk> = None;

    for (idx, line) in diff_text.lines().enumerate() {
        if let Some(old_path) = line.strip_prefix("--- ") {
            if let Some(patch) = current_patch.take() {
                patches.push(patch.finalize(current_hunk.take()));
            }
            let old_path = old_path.trim();
            let mut patch = FilePatch::default();
            if old_path == DEV_NULL {
                patch.from_dev_null = true;
            } else {
                patch.path = strip_path_prefix(old_path).to_string();
            }
            current_patch = Some(patch);
            continue;
        }

        if let Some(new_path) = line.strip_prefix("+++ ") {
            if let Some(patch) = current_patch.as_mut() {
                let new_path = new_path.trim();
                if new_path != DEV_NULL {
                    patch.path = strip_path_prefix(new_path).to_string();
                }
            }
            continue;
        }

        if line.starts_with("@@ ") {
            if current_patch.is_none() {
                // A hunk header with no preceding file header has nowhere to
                // go; tolerate it the way unrecognized lines are tolerated.
                continue;
            }
            let hunk = parse_hunk_header(line, idx + 1)?;
            if let Some(done) = current_hunk.replace(hunk)
                && let Some(patch) = current_patch.as_mut()
            {
                patch.hunks.push(done);
            }
            continue;
        }

        if let Some(hunk) = current_hunk.as_mut()
            && !line.is_empty()
        {
            let (kind, text) = match line.as_bytes()[0] {
                b'+' => (LineKind::Add, &line[1..]),
                b'-' => (LineKind::Delete, &line[1..]),
                b' ' => (LineKind::Context, &line[1..]),
                _ => continue, // ignored inside a hunk
            };
            hunk.lines.push(PatchLine {
                kind,
                text: text.to_string(),
            });
        }
    }

    if let Some(patch) = current_patch.take() {
        patches.push(patch.finalize(current_hunk.take()));
    }

    Ok(patches)
}

fn strip_path_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

/// Parse `@@ -oldStart[,oldCount] +newStart[,newCount] @@`.
fn parse_hunk_header(line: &str, line_no: usize) -> Result<Hunk, WorkspaceError> {
    let malformed = |message: &str| WorkspaceError::DiffParse {
        line: line_no,
        message: message.to_string(),
    };

    let rest = &line[3..];
    let body = rest.split("@@").next().unwrap_or(rest).trim();
    let (old_part, new_part) = body
        .split_once(" +")
        .ok_or_else(|| malformed("expected '-old +new' ranges"))?;

    let old_part = old_part
        .strip_prefix('-')
        .ok_or_else(|| malformed("old range must start with '-'"))?;
    let (old_start, old_count) =
        parse_range(old_part).ok_or_else(|| malformed("invalid old range"))?;
    let (new_start, new_count) =
        parse_range(new_part).ok_or_else(|| malformed("invalid new range"))?;

    Ok(Hunk {
        old_start,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    })
}

/// Parse `start[,count]`; the count defaults to 1 when omitted.
fn parse_range(s: &str) -> Option<(usize, usize)> {
    match s.split_once(',') {
        Some((start, count)) => Some((start.trim().parse().ok()?, count.trim().parse().ok()?)),
        None => Some((s.trim().parse().ok()?, 1)),
    }
}

/// Apply one parsed patch to the original content.
///
/// Untouched lines before each hunk and after the last hunk are copied
/// through unchanged; the final trailing-newline presence matches the
/// original file's.
#[must_use]
pub fn apply_patch(original: &str, patch: &FilePatch) -> String {
    let had_trailing_newline = original.is_empty() || original.ends_with('\n');

    let mut original_lines: Vec<&str> = original.split('\n').collect();
    if original_lines.last() == Some(&"") && original.ends_with('\n') {
        original_lines.pop();
    }
    if original.is_empty() {
        original_lines.clear();
    }

    let mut result: Vec<&str> = Vec::with_capacity(original_lines.len());
    let mut cursor: usize = 1; // 1-indexed old-line cursor

    for hunk in &patch.hunks {
        while cursor < hunk.old_start {
            if cursor - 1 < original_lines.len() {
                result.push(original_lines[cursor - 1]);
            }
            cursor += 1;
        }

        for line in &hunk.lines {
            match line.kind {
                LineKind::Delete => {
                    if cursor - 1 < original_lines.len()
                        && original_lines[cursor - 1] == line.text
                    {
                        cursor += 1;
                    } else {
                        // Legacy behavior: the cursor stays put, so the rest
                        // of this hunk applies against shifted content.
                        tracing::warn!(
                            old_start = hunk.old_start,
                            cursor,
                            "delete line does not match original; hunk may desynchronize"
                        );
                    }
                }
                LineKind::Add => result.push(&line.text),
                LineKind::Context => {
                    if cursor - 1 < original_lines.len() {
                        result.push(original_lines[cursor - 1]);
                        cursor += 1;
                    } else {
                        // Original exhausted: synthesize from the hunk.
                        result.push(&line.text);
                    }
                }
            }
        }
    }

    while cursor - 1 < original_lines.len() {
        result.push(original_lines[cursor - 1]);
        cursor += 1;
    }

    if result.is_empty() {
        return String::new();
    }
    let mut out = result.join("\n");
    if had_trailing_newline {
        out.push('\n');
    }
    out
}
