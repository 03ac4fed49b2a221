use std::path::PathBuf;
use std::time::Duration;

/// Error types for workspace operations.
///
/// Every failure is returned as a value with enough context for the caller
/// to correct and retry; no operation terminates the host process. Non-zero
/// command exits are deliberately *not* an error - they ride in
/// [`crate::ExecOutput::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("path violation: {0}")]
    PathViolation(PathDenial),

    #[error("blocked extension '{extension}' for {path}")]
    BlockedExtension { path: PathBuf, extension: String },

    #[error("not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The real file is larger than the read cap. Carries the bytes read up
    /// to the cap so the caller can still use the prefix.
    #[error("file {path} is {size} bytes, exceeds the {limit} byte read limit")]
    SizeExceeded {
        path: PathBuf,
        size: u64,
        limit: u64,
        partial: Vec<u8>,
    },

    /// Large files must be paginated: the requested line range is wider than
    /// the per-request cap.
    #[error(
        "file {path} requires pagination: requested {requested} lines, limit is {limit} per read"
    )]
    RangeTooLarge {
        path: PathBuf,
        requested: u32,
        limit: u32,
    },

    #[error("command not allowed: {command}")]
    CommandNotAllowed { command: String },

    /// Deadline exceeded. Output captured before the kill is preserved.
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("diff parse error at line {line}: {message}")]
    DiffParse { line: usize, message: String },

    /// The exact-replace safety check tripped: the file does not contain the
    /// search string the expected number of times. Nothing was written.
    #[error("occurrence count mismatch for {path}: expected {expected}, found {actual}")]
    OccurrenceMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    /// Helper for wrapping an io error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        WorkspaceError::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Why a path was rejected by the sandbox.
#[derive(Debug, Clone)]
pub enum PathDenial {
    /// Empty or whitespace-only input.
    Empty,
    /// The resolved path is not a descendant of the sandbox root.
    Escape {
        attempted: PathBuf,
        resolved: PathBuf,
    },
    /// An allow-list is configured and no entry prefixes the resolved path.
    NotAllowed { attempted: PathBuf },
}

impl std::fmt::Display for PathDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathDenial::Empty => write!(f, "empty path"),
            PathDenial::Escape {
                attempted,
                resolved,
            } => write!(
                f,
                "path escapes workspace root (attempted: {}, resolved: {})",
                attempted.display(),
                resolved.display()
            ),
            PathDenial::NotAllowed { attempted } => write!(
                f,
                "path '{}' is not under any allowed prefix",
                attempted.display()
            ),
        }
    }
}
