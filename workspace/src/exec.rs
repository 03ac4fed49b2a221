//! Gated command execution.
//!
//! Commands run with the sandbox root as their working directory, bounded by
//! a timeout, with stdout/stderr captured. The whitelist check runs twice:
//! once on the bare command name and once on the fully joined
//! "name + args" string, each matched against whitelist entries exactly or
//! as a prefix at a word boundary - a single entry like `cargo` authorizes
//! all cargo subcommands while rejecting lookalikes like `cargofmt`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use anvil_types::{ExecOutput, WorkspaceError};

/// Whether `command` (a bare name or a full command line) is authorized.
///
/// An entry matches when it equals the command's base name, or when the
/// command starts with the entry followed by a space, a tab, or nothing.
#[must_use]
pub fn is_allowed_command(allowed: &[String], command: &str) -> bool {
    let command = command.trim();
    let Some(base) = command.split_whitespace().next() else {
        return false;
    };

    for entry in allowed {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if entry == base {
            return true;
        }
        if let Some(rest) = command.strip_prefix(entry)
            && (rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t'))
        {
            return true;
        }
    }
    false
}

/// RAII guard that kills the child process (and its process group on Unix)
/// on drop. Call `disarm()` after the process exits normally.
pub struct ChildGuard {
    child: Option<tokio::process::Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> &mut tokio::process::Child {
        self.child.as_mut().expect("child present")
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            } else {
                let _ = child.start_kill();
            }
            let _ = child.try_wait();
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

/// Put the child in its own session (Unix only) so the whole process group
/// can be killed via `killpg` in `ChildGuard::drop`.
#[cfg(unix)]
fn set_new_session(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

async fn collect_stream<R: tokio::io::AsyncRead + Unpin>(mut stream: R) -> String {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Execute a whitelisted command, capturing output, bounded by `timeout`.
///
/// Non-zero exits are returned as data in [`ExecOutput`]. On timeout the
/// child is killed and output captured up to that point rides inside the
/// [`WorkspaceError::Timeout`] error.
pub async fn run_command(
    cancel: &CancellationToken,
    working_dir: &Path,
    allowed: &[String],
    command: &str,
    args: &[String],
    timeout: Duration,
) -> Result<ExecOutput, WorkspaceError> {
    if !is_allowed_command(allowed, command) {
        return Err(WorkspaceError::CommandNotAllowed {
            command: command.to_string(),
        });
    }
    let full_command = if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", args.join(" "))
    };
    if !is_allowed_command(allowed, &full_command) {
        return Err(WorkspaceError::CommandNotAllowed {
            command: full_command,
        });
    }

    let mut cmd = Command::new(command);
    cmd.args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    set_new_session(&mut cmd);

    let child = cmd.spawn().map_err(|e| WorkspaceError::ExecutionFailed {
        message: format!("failed to start '{command}': {e}"),
    })?;
    let mut guard = ChildGuard::new(child);

    let stdout = guard.child_mut().stdout.take().ok_or_else(|| {
        WorkspaceError::ExecutionFailed {
            message: "failed to capture stdout".to_string(),
        }
    })?;
    let stderr = guard.child_mut().stderr.take().ok_or_else(|| {
        WorkspaceError::ExecutionFailed {
            message: "failed to capture stderr".to_string(),
        }
    })?;
    let stdout_task = tokio::spawn(collect_stream(stdout));
    let stderr_task = tokio::spawn(collect_stream(stderr));

    let waited = cancel
        .run_until_cancelled(tokio::time::timeout(timeout, guard.child_mut().wait()))
        .await;

    let status = match waited {
        None => {
            drop(guard); // kills the process group
            return Err(WorkspaceError::Cancelled);
        }
        Some(Err(_elapsed)) => {
            drop(guard); // kills the process group; pipes hit EOF
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(WorkspaceError::Timeout {
                command: full_command,
                timeout,
                stdout,
                stderr,
            });
        }
        Some(Ok(status)) => status.map_err(|e| WorkspaceError::ExecutionFailed {
            message: format!("wait failed for '{command}': {e}"),
        })?,
    };
    guard.disarm();

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(ExecOutput {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
    })
}
