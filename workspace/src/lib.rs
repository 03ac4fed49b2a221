//! Sandboxed workspace engine.
//!
//! Everything an agent may do to the local tree goes through the
//! [`Workspace`] trait: bounded reads, atomic writes, directory inspection,
//! line-range reads, unified-diff application, exact-match replacement, and
//! whitelisted command execution. Every file operation passes through the
//! path sandbox first; every mutation commits through an atomic rename.
//!
//! The trait stays explicit (single implementation: [`LocalWorkspace`]) so
//! an in-memory backend can substitute in tests without touching callers.

pub mod backup;
pub mod exec;
pub mod fragment;
pub mod local;
pub mod patch;
pub mod replace;
pub mod sandbox;
pub mod scan;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use anvil_types::{ExecOutput, Fragment, TreeNode, WorkspaceError};

pub use local::LocalWorkspace;
pub use sandbox::PathGuard;

/// Core capability surface of a confined local workspace.
///
/// All operations are synchronous with respect to their caller (no internal
/// background work besides the command subprocess) and check `cancel` at
/// coarse granularity: per directory entry, per line, per hunk, per IO
/// chunk. Cancellation returns [`WorkspaceError::Cancelled`] with no partial
/// commit beyond the atomic rename boundary.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Read a file, bounded by `max_bytes` (0 = configured default).
    ///
    /// If the real file is larger than the bound, fails with
    /// [`WorkspaceError::SizeExceeded`] carrying the bytes read so far.
    async fn read_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        max_bytes: u64,
    ) -> Result<Vec<u8>, WorkspaceError>;

    /// Atomically replace (or, with `allow_create`, create) a file.
    ///
    /// Fails if the parent directory does not exist, or if `allow_create` is
    /// false and the target is missing.
    async fn write_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: &[u8],
        allow_create: bool,
    ) -> Result<(), WorkspaceError>;

    /// Flat, depth-limited listing of a directory subtree.
    ///
    /// `max_depth <= 0` selects the default depth. Directories sort before
    /// files, case-insensitive lexical order within each group.
    async fn inspect_workspace(
        &self,
        cancel: &CancellationToken,
        rel_path: &str,
        max_depth: i64,
    ) -> Result<Vec<TreeNode>, WorkspaceError>;

    /// Read an inclusive 1-indexed line range. Large files must paginate.
    async fn read_code_fragment(
        &self,
        cancel: &CancellationToken,
        path: &str,
        start_line: u32,
        end_line: u32,
    ) -> Result<Fragment, WorkspaceError>;

    /// Parse and apply a unified diff. Returns the touched file paths as
    /// given in the diff. `dry_run` validates without writing.
    async fn apply_unified_diff(
        &self,
        cancel: &CancellationToken,
        diff_text: &str,
        dry_run: bool,
    ) -> Result<Vec<String>, WorkspaceError>;

    /// Exact-match, occurrence-counted substitution.
    ///
    /// `expected_occurrences == 0` is a dry run (count only); a positive
    /// value that disagrees with the actual count fails with
    /// [`WorkspaceError::OccurrenceMismatch`] and writes nothing.
    async fn search_and_replace(
        &self,
        cancel: &CancellationToken,
        path: &str,
        old: &str,
        new: &str,
        expected_occurrences: i64,
    ) -> Result<usize, WorkspaceError>;

    /// Execute a whitelisted command with the sandbox root as its working
    /// directory. `timeout_secs <= 0` selects the configured default.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        command: &str,
        args: &[String],
        timeout_secs: i64,
    ) -> Result<ExecOutput, WorkspaceError>;

    /// [`Workspace::execute`] plus output truncation to the configured bound.
    async fn secure_exec(
        &self,
        cancel: &CancellationToken,
        command: &str,
        args: &[String],
        timeout_secs: i64,
    ) -> Result<ExecOutput, WorkspaceError>;

    /// Disk-block-rounded file size, falling back to the logical size where
    /// block accounting is unavailable.
    fn physical_file_size(&self, path: &str) -> Result<u64, WorkspaceError>;
}
