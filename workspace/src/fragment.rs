//! Line-range reads with pagination enforcement.
//!
//! Big files must be read in pages: past a fixed size threshold, a request
//! wider than the per-read line cap fails with `RangeTooLarge` instead of
//! being silently clipped, which forces the caller to paginate.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use anvil_types::{Fragment, WorkspaceError};

/// Files larger than this require paginated range reads.
pub const LARGE_FILE_THRESHOLD_BYTES: u64 = 20 * 1024;

/// Widest allowed range for a single read of a large file.
pub const MAX_FRAGMENT_LINES: u32 = 200;

/// Read the inclusive 1-indexed line range `[start_line, end_line]`.
///
/// Streams the file line by line, stopping as soon as `end_line` is
/// reached; `truncated` is set when the file ran out before `end_line`.
/// Cancellation is checked per line.
pub fn read_fragment(
    cancel: &CancellationToken,
    path: &Path,
    start_line: u32,
    end_line: u32,
) -> Result<Fragment, WorkspaceError> {
    if start_line < 1 || end_line < start_line {
        return Err(WorkspaceError::invalid_argument(format!(
            "invalid line range: {start_line}-{end_line}"
        )));
    }

    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorkspaceError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            WorkspaceError::io(path, e)
        }
    })?;
    let size = file
        .metadata()
        .map_err(|e| WorkspaceError::io(path, e))?
        .len();

    if size > LARGE_FILE_THRESHOLD_BYTES {
        let requested = end_line - start_line + 1;
        if requested > MAX_FRAGMENT_LINES {
            return Err(WorkspaceError::RangeTooLarge {
                path: path.to_path_buf(),
                requested,
                limit: MAX_FRAGMENT_LINES,
            });
        }
    }

    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut current: u32 = 1;

    for line in reader.lines() {
        if cancel.is_cancelled() {
            return Err(WorkspaceError::Cancelled);
        }
        let line = line.map_err(|e| WorkspaceError::io(path, e))?;

        if current >= start_line && current <= end_line {
            lines.push(line);
        }
        if current >= end_line {
            break;
        }
        current += 1;
    }

    Ok(Fragment {
        truncated: current < end_line,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use anvil_types::WorkspaceError;

    use super::{MAX_FRAGMENT_LINES, read_fragment};

    fn hundred_line_file(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("hundred.txt");
        let content: String = (1..=100).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, content).expect("seed");
        path
    }

    #[test]
    fn reads_the_requested_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = hundred_line_file(dir.path());
        let cancel = CancellationToken::new();

        let fragment = read_fragment(&cancel, &path, 10, 12).expect("read");
        assert_eq!(fragment.lines, vec!["line 10", "line 11", "line 12"]);
        assert!(!fragment.truncated);
    }

    #[test]
    fn range_past_eof_is_truncated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = hundred_line_file(dir.path());
        let cancel = CancellationToken::new();

        let fragment = read_fragment(&cancel, &path, 90, 200).expect("read");
        assert_eq!(fragment.lines.len(), 11); // lines 90..=100
        assert_eq!(fragment.lines[0], "line 90");
        assert_eq!(fragment.lines[10], "line 100");
        assert!(fragment.truncated);
    }

    #[test]
    fn zero_start_line_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = hundred_line_file(dir.path());
        let cancel = CancellationToken::new();

        let err = read_fragment(&cancel, &path, 0, 5).expect_err("zero start");
        assert!(matches!(err, WorkspaceError::InvalidArgument { .. }));

        let err = read_fragment(&cancel, &path, 10, 5).expect_err("end < start");
        assert!(matches!(err, WorkspaceError::InvalidArgument { .. }));
    }

    #[test]
    fn large_file_rejects_wide_ranges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.txt");
        // Over the 20 KiB threshold.
        let content: String = (1..=2000).map(|i| format!("padding line {i}\n")).collect();
        fs::write(&path, content).expect("seed");
        let cancel = CancellationToken::new();

        let err = read_fragment(&cancel, &path, 1, 500).expect_err("too wide");
        match err {
            WorkspaceError::RangeTooLarge {
                requested, limit, ..
            } => {
                assert_eq!(requested, 500);
                assert_eq!(limit, MAX_FRAGMENT_LINES);
            }
            other => unreachable!("unexpected error: {other}"),
        }

        // A range inside the cap pages through the same file fine.
        let fragment = read_fragment(&cancel, &path, 1, 200).expect("paged read");
        assert_eq!(fragment.lines.len(), 200);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cancel = CancellationToken::new();

        let err =
            read_fragment(&cancel, &dir.path().join("nope.txt"), 1, 5).expect_err("missing");
        assert!(matches!(err, WorkspaceError::NotFound { .. }));
    }

    #[test]
    fn cancellation_stops_the_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = hundred_line_file(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = read_fragment(&cancel, &path, 1, 10).expect_err("cancelled");
        assert!(matches!(err, WorkspaceError::Cancelled));
    }
}
