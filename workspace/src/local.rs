//! The local-filesystem workspace implementation.
//!
//! [`LocalWorkspace`] composes the sandbox, scanners, and engines over a
//! live configuration snapshot. The config travels in a
//! `tokio::sync::watch` channel: each operation takes one snapshot up
//! front and never re-reads mid-call, so a hot reload between calls swaps
//! cleanly and a reload during a call has no effect on it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use anvil_config::AnvilConfig;
use anvil_types::{ExecOutput, Fragment, TreeNode, WorkspaceError};
use anvil_utils::{atomic_write, recover_bak_file, truncate_middle};

use crate::Workspace;
use crate::backup::BackupGuard;
use crate::exec::run_command;
use crate::fragment::read_fragment;
use crate::patch::parse_unified_diff;
use crate::replace;
use crate::sandbox::PathGuard;
use crate::scan::scan_tree;

const READ_CHUNK_BYTES: usize = 32 * 1024;

pub struct LocalWorkspace {
    config: watch::Receiver<AnvilConfig>,
    // Keeps the channel alive for workspaces built from a fixed config.
    _retained: Option<watch::Sender<AnvilConfig>>,
}

impl LocalWorkspace {
    /// Build over a live config channel (hot reload flows through it).
    #[must_use]
    pub fn new(config: watch::Receiver<AnvilConfig>) -> Self {
        Self {
            config,
            _retained: None,
        }
    }

    /// Build over a fixed config (tests, one-shot tools).
    #[must_use]
    pub fn with_config(config: AnvilConfig) -> Self {
        let (tx, rx) = watch::channel(config);
        Self {
            config: rx,
            _retained: Some(tx),
        }
    }

    fn snapshot(&self) -> AnvilConfig {
        self.config.borrow().clone()
    }

    fn guard(config: &AnvilConfig) -> Result<PathGuard, WorkspaceError> {
        PathGuard::new(&config.workspace)
    }
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> WorkspaceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        WorkspaceError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        WorkspaceError::io(path, e)
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn read_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        max_bytes: u64,
    ) -> Result<Vec<u8>, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;
        let resolved = guard.resolve(path)?;
        guard.check_extension(&resolved)?;

        let limit = if max_bytes == 0 {
            config.workspace.max_file_bytes
        } else {
            max_bytes
        };

        let file = tokio::fs::File::open(&resolved)
            .await
            .map_err(|e| not_found_or_io(&resolved, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| WorkspaceError::io(&resolved, e))?
            .len();

        let mut reader = file.take(limit);
        let mut content = Vec::with_capacity(limit.min(size) as usize);
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if cancel.is_cancelled() {
                return Err(WorkspaceError::Cancelled);
            }
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| WorkspaceError::io(&resolved, e))?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
        }

        if size > limit {
            return Err(WorkspaceError::SizeExceeded {
                path: resolved,
                size,
                limit,
                partial: content,
            });
        }
        Ok(content)
    }

    async fn write_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: &[u8],
        allow_create: bool,
    ) -> Result<(), WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;
        let resolved = guard.resolve(path)?;
        guard.check_extension(&resolved)?;

        // A crash in an earlier run may have left the target as a .bak.
        recover_bak_file(&resolved);

        // Parent directories are not created implicitly; the agent must do
        // that explicitly through the command gate.
        if let Some(parent) = resolved.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(WorkspaceError::NotFound {
                path: parent.to_path_buf(),
            });
        }
        if !allow_create && !resolved.exists() {
            return Err(WorkspaceError::NotFound { path: resolved });
        }
        if cancel.is_cancelled() {
            return Err(WorkspaceError::Cancelled);
        }

        let bytes = data.to_vec();
        let target = resolved.clone();
        tokio::task::spawn_blocking(move || atomic_write(&target, &bytes))
            .await
            .map_err(|e| WorkspaceError::ExecutionFailed {
                message: format!("write task failed: {e}"),
            })?
            .map_err(|e| WorkspaceError::io(&resolved, e))?;
        Ok(())
    }

    async fn inspect_workspace(
        &self,
        cancel: &CancellationToken,
        rel_path: &str,
        max_depth: i64,
    ) -> Result<Vec<TreeNode>, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;
        let rel = if rel_path.trim().is_empty() {
            "."
        } else {
            rel_path
        };
        let start = guard.resolve(rel)?;
        scan_tree(cancel, guard.root(), &start, max_depth)
    }

    async fn read_code_fragment(
        &self,
        cancel: &CancellationToken,
        path: &str,
        start_line: u32,
        end_line: u32,
    ) -> Result<Fragment, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;
        let resolved = guard.resolve(path)?;
        guard.check_extension(&resolved)?;
        read_fragment(cancel, &resolved, start_line, end_line)
    }

    async fn apply_unified_diff(
        &self,
        cancel: &CancellationToken,
        diff_text: &str,
        dry_run: bool,
    ) -> Result<Vec<String>, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;

        let patches = parse_unified_diff(diff_text)?;
        let mut applied = Vec::with_capacity(patches.len());

        for patch in &patches {
            if cancel.is_cancelled() {
                return Err(WorkspaceError::Cancelled);
            }
            if patch.path.is_empty() {
                return Err(WorkspaceError::invalid_argument(
                    "diff patch has no target path",
                ));
            }

            let resolved = guard.resolve(&patch.path)?;
            guard.check_extension(&resolved)?;
            recover_bak_file(&resolved);

            let exists = resolved.exists();
            if !patch.is_new_file && !exists {
                return Err(WorkspaceError::NotFound { path: resolved });
            }

            let original = if exists {
                let bytes =
                    std::fs::read(&resolved).map_err(|e| not_found_or_io(&resolved, e))?;
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                String::new()
            };

            let patched = crate::patch::apply_patch(&original, patch);

            if dry_run {
                applied.push(patch.path.clone());
                continue;
            }

            let backup =
                BackupGuard::create(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))?;
            atomic_write(&resolved, patched.as_bytes())
                .map_err(|e| WorkspaceError::io(&resolved, e))?;
            backup.commit();

            applied.push(patch.path.clone());
        }

        Ok(applied)
    }

    async fn search_and_replace(
        &self,
        cancel: &CancellationToken,
        path: &str,
        old: &str,
        new: &str,
        expected_occurrences: i64,
    ) -> Result<usize, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;
        let resolved = guard.resolve(path)?;
        guard.check_extension(&resolved)?;
        if cancel.is_cancelled() {
            return Err(WorkspaceError::Cancelled);
        }
        replace::search_and_replace(&resolved, old, new, expected_occurrences)
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        command: &str,
        args: &[String],
        timeout_secs: i64,
    ) -> Result<ExecOutput, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;

        let timeout = if timeout_secs > 0 {
            Duration::from_secs(timeout_secs as u64)
        } else {
            Duration::from_secs(config.exec.timeout_secs)
        };
        run_command(
            cancel,
            guard.root(),
            &config.exec.allowed_commands,
            command,
            args,
            timeout,
        )
        .await
    }

    async fn secure_exec(
        &self,
        cancel: &CancellationToken,
        command: &str,
        args: &[String],
        timeout_secs: i64,
    ) -> Result<ExecOutput, WorkspaceError> {
        let max = self.snapshot().exec.max_output_bytes;
        match self.execute(cancel, command, args, timeout_secs).await {
            Ok(mut out) => {
                out.stdout = truncate_middle(&out.stdout, max);
                out.stderr = truncate_middle(&out.stderr, max);
                Ok(out)
            }
            Err(WorkspaceError::Timeout {
                command,
                timeout,
                stdout,
                stderr,
            }) => Err(WorkspaceError::Timeout {
                command,
                timeout,
                stdout: truncate_middle(&stdout, max),
                stderr: truncate_middle(&stderr, max),
            }),
            Err(other) => Err(other),
        }
    }

    fn physical_file_size(&self, path: &str) -> Result<u64, WorkspaceError> {
        let config = self.snapshot();
        let guard = Self::guard(&config)?;
        let resolved = guard.resolve(path)?;

        let meta = std::fs::metadata(&resolved).map_err(|e| not_found_or_io(&resolved, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(meta.blocks() * 512)
        }
        #[cfg(not(unix))]
        {
            Ok(meta.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use anvil_config::AnvilConfig;
    use anvil_types::WorkspaceError;

    use super::LocalWorkspace;
    use crate::Workspace;

    fn workspace_at(root: &Path) -> LocalWorkspace {
        let mut config = AnvilConfig::default();
        config.workspace.root_dir = root.to_string_lossy().into_owned();
        LocalWorkspace::with_config(config)
    }

    #[tokio::test]
    async fn write_then_read_roundtrips_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let content = b"fn main() {\n    println!(\"hi\");\n}\n";
        ws.write_file(&cancel, "main.rs", content, true)
            .await
            .expect("write");
        let read = ws
            .read_file(&cancel, "main.rs", content.len() as u64 + 1)
            .await
            .expect("read");
        assert_eq!(read, content);
    }

    #[tokio::test]
    async fn write_without_allow_create_needs_an_existing_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let err = ws
            .write_file(&cancel, "absent.txt", b"x", false)
            .await
            .expect_err("missing target");
        assert!(matches!(err, WorkspaceError::NotFound { .. }));

        ws.write_file(&cancel, "absent.txt", b"x", true)
            .await
            .expect("create");
        ws.write_file(&cancel, "absent.txt", b"y", false)
            .await
            .expect("overwrite now that it exists");
    }

    #[tokio::test]
    async fn write_requires_an_existing_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let err = ws
            .write_file(&cancel, "no/such/dir/file.txt", b"x", true)
            .await
            .expect_err("missing parent");
        assert!(matches!(err, WorkspaceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn oversized_read_reports_size_exceeded_with_partial_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        ws.write_file(&cancel, "big.txt", &[b'x'; 100], true)
            .await
            .expect("write");
        let err = ws
            .read_file(&cancel, "big.txt", 10)
            .await
            .expect_err("over the cap");
        match err {
            WorkspaceError::SizeExceeded {
                size,
                limit,
                partial,
                ..
            } => {
                assert_eq!(size, 100);
                assert_eq!(limit, 10);
                assert_eq!(partial.len(), 10);
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn blocked_extensions_are_rejected_for_read_and_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("prod.env"), "SECRET=x").expect("seed");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let err = ws
            .read_file(&cancel, "prod.env", 0)
            .await
            .expect_err("blocked read");
        assert!(matches!(err, WorkspaceError::BlockedExtension { .. }));

        let err = ws
            .write_file(&cancel, "new.key", b"k", true)
            .await
            .expect_err("blocked write");
        assert!(matches!(err, WorkspaceError::BlockedExtension { .. }));
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected_for_every_operation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let err = ws
            .read_file(&cancel, "../../etc/passwd", 0)
            .await
            .expect_err("read escape");
        assert!(matches!(err, WorkspaceError::PathViolation(_)));

        let err = ws
            .write_file(&cancel, "../evil.txt", b"x", true)
            .await
            .expect_err("write escape");
        assert!(matches!(err, WorkspaceError::PathViolation(_)));

        let err = ws.physical_file_size("../../etc/passwd").expect_err("size escape");
        assert!(matches!(err, WorkspaceError::PathViolation(_)));
    }

    #[tokio::test]
    async fn apply_unified_diff_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        ws.write_file(&cancel, "file.txt", b"line1\nline2\nline3\n", true)
            .await
            .expect("seed");

        let diff = "\
--- a/file.txt
+++ b/file.txt
@@ -1,3 +1,3 @@
 line1
-line2
+new line2
 line3
";
        // Dry run validates but writes nothing.
        let applied = ws
            .apply_unified_diff(&cancel, diff, true)
            .await
            .expect("dry run");
        assert_eq!(applied, vec!["file.txt"]);
        let content = ws.read_file(&cancel, "file.txt", 0).await.expect("read");
        assert_eq!(content, b"line1\nline2\nline3\n");

        let applied = ws
            .apply_unified_diff(&cancel, diff, false)
            .await
            .expect("apply");
        assert_eq!(applied, vec!["file.txt"]);
        let content = ws.read_file(&cancel, "file.txt", 0).await.expect("read");
        assert_eq!(content, b"line1\nnew line2\nline3\n");
        assert!(!dir.path().join("file.bak").exists());
    }

    #[tokio::test]
    async fn diff_creating_a_new_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let diff = "\
--- /dev/null
+++ b/fresh.txt
@@ -0,0 +1,2 @@
+alpha
+beta
";
        let applied = ws
            .apply_unified_diff(&cancel, diff, false)
            .await
            .expect("apply");
        assert_eq!(applied, vec!["fresh.txt"]);
        let content = ws.read_file(&cancel, "fresh.txt", 0).await.expect("read");
        assert_eq!(content, b"alpha\nbeta\n");
    }

    #[tokio::test]
    async fn diff_against_a_missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let diff = "\
--- a/ghost.txt
+++ b/ghost.txt
@@ -1,1 +1,1 @@
-x
+y
";
        let err = ws
            .apply_unified_diff(&cancel, diff, false)
            .await
            .expect_err("missing target");
        assert!(matches!(err, WorkspaceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn search_and_replace_through_the_trait() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        ws.write_file(&cancel, "f.txt", b"foo bar foo baz foo", true)
            .await
            .expect("seed");

        let count = ws
            .search_and_replace(&cancel, "f.txt", "foo", "qux", 3)
            .await
            .expect("replace");
        assert_eq!(count, 3);
        let content = ws.read_file(&cancel, "f.txt", 0).await.expect("read");
        assert_eq!(content, b"qux bar qux baz qux");
    }

    #[tokio::test]
    async fn physical_size_is_block_rounded_but_never_under_logical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        ws.write_file(&cancel, "f.txt", b"hello", true)
            .await
            .expect("seed");
        let size = ws.physical_file_size("f.txt").expect("size");
        assert!(size >= 5, "physical size {size} under logical size");
    }

    #[tokio::test]
    async fn config_swap_between_calls_takes_effect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AnvilConfig::default();
        config.workspace.root_dir = dir.path().to_string_lossy().into_owned();

        let (tx, rx) = tokio::sync::watch::channel(config.clone());
        let ws = LocalWorkspace::new(rx);
        let cancel = CancellationToken::new();

        ws.write_file(&cancel, "f.txt", &[b'x'; 64], true)
            .await
            .expect("seed");
        ws.read_file(&cancel, "f.txt", 0).await.expect("fits default cap");

        // Shrink the read cap via hot reload; the next call sees it.
        config.workspace.max_file_bytes = 16;
        tx.send(config).expect("send");

        let err = ws
            .read_file(&cancel, "f.txt", 0)
            .await
            .expect_err("over the new cap");
        assert!(matches!(err, WorkspaceError::SizeExceeded { .. }));
    }

    #[tokio::test]
    async fn inspect_and_fragment_compose_with_the_sandbox() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/lib.rs"), "a\nb\nc\n").expect("seed");
        let ws = workspace_at(dir.path());
        let cancel = CancellationToken::new();

        let nodes = ws
            .inspect_workspace(&cancel, "", 2)
            .await
            .expect("inspect");
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert!(paths.contains(&"src"));
        assert!(paths.contains(&"src/lib.rs"));
        assert!(!paths.iter().any(|p| p.contains(".git")));

        let fragment = ws
            .read_code_fragment(&cancel, "src/lib.rs", 2, 3)
            .await
            .expect("fragment");
        assert_eq!(fragment.lines, vec!["b", "c"]);
    }
}
