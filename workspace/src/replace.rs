//! Exact-match search and replace.
//!
//! The occurrence count is a safety check: the caller states how many
//! matches it expects, and a disagreement aborts with no change rather than
//! silently over- or under-replacing. An expectation of zero is a dry run.

use std::path::Path;

use anvil_types::WorkspaceError;
use anvil_utils::atomic_write;

/// Count non-overlapping literal occurrences of `old` and, when the count
/// matches `expected_occurrences`, replace them all and commit atomically.
pub fn search_and_replace(
    path: &Path,
    old: &str,
    new: &str,
    expected_occurrences: i64,
) -> Result<usize, WorkspaceError> {
    if old.is_empty() {
        return Err(WorkspaceError::invalid_argument(
            "search string cannot be empty",
        ));
    }
    if expected_occurrences < 0 {
        return Err(WorkspaceError::invalid_argument(
            "expected_occurrences cannot be negative",
        ));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorkspaceError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            WorkspaceError::io(path, e)
        }
    })?;

    let actual = content.matches(old).count();

    if expected_occurrences == 0 {
        // Dry run: report the count, write nothing.
        return Ok(actual);
    }
    if actual != expected_occurrences as usize {
        return Err(WorkspaceError::OccurrenceMismatch {
            path: path.to_path_buf(),
            expected: expected_occurrences as usize,
            actual,
        });
    }

    let replaced = content.replace(old, new);
    atomic_write(path, replaced.as_bytes()).map_err(|e| WorkspaceError::io(path, e))?;

    Ok(actual)
}
