//! Change previews and stats for tool result summaries.

use std::fmt::Write as _;
use std::str;

use similar::{ChangeTag, TextDiff};

/// Render a compact line-numbered preview of the change from `old` to `new`.
///
/// Changed lines are prefixed `-`/`+`; one line of surrounding context is
/// kept and longer unchanged stretches collapse to `...`. Used in tool
/// results so the caller can audit what a mutation did without re-reading
/// the file.
#[must_use]
pub fn render_change_preview(old_bytes: &[u8], new_bytes: &[u8]) -> String {
    let old_text = str::from_utf8(old_bytes).unwrap_or("");
    let new_text = str::from_utf8(new_bytes).unwrap_or("");

    let diff = TextDiff::from_lines(old_text, new_text);
    let changes: Vec<_> = diff.iter_all_changes().collect();
    if changes.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut last_output_idx: Option<usize> = None;

    for (i, change) in changes.iter().enumerate() {
        let keep = match change.tag() {
            ChangeTag::Delete | ChangeTag::Insert => true,
            ChangeTag::Equal => {
                // Context: only the lines touching a change.
                let near_prev = i > 0 && changes[i - 1].tag() != ChangeTag::Equal;
                let near_next = changes
                    .get(i + 1)
                    .is_some_and(|c| c.tag() != ChangeTag::Equal);
                near_prev || near_next
            }
        };
        if !keep {
            continue;
        }

        if let Some(last_idx) = last_output_idx
            && i - last_idx - 1 > 3
        {
            out.push_str("...\n");
        }

        let (line_no, sign) = match change.tag() {
            ChangeTag::Equal => (change.old_index().unwrap_or(0) + 1, ' '),
            ChangeTag::Delete => (change.old_index().unwrap_or(0) + 1, '-'),
            ChangeTag::Insert => (change.new_index().unwrap_or(0) + 1, '+'),
        };
        write!(out, "{line_no:>4} {sign}").unwrap();
        out.push_str(change.value().trim_end_matches('\n'));
        out.push('\n');
        last_output_idx = Some(i);
    }

    out
}

/// Compute diff stats (additions and deletions) between old and new content.
#[must_use]
pub fn compute_diff_stats(old_bytes: &[u8], new_bytes: &[u8]) -> (u32, u32) {
    let old_text = str::from_utf8(old_bytes).unwrap_or("");
    let new_text = str::from_utf8(new_bytes).unwrap_or("");

    let diff = TextDiff::from_lines(old_text, new_text);

    let mut additions: u32 = 0;
    let mut deletions: u32 = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    (additions, deletions)
}
