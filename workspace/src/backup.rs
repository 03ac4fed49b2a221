//! Scoped backup/rollback for multi-step mutations.
//!
//! [`BackupGuard`] guarantees exactly one of {commit, rollback} on every
//! exit path: create it before mutating a file, call [`BackupGuard::commit`]
//! after the mutation lands, and any early return or panic in between rolls
//! the file back on drop. This is an additional safety net around the
//! temp-then-rename atomic write, never the sole atomicity mechanism.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// RAII backup of a single file.
pub struct BackupGuard {
    target: PathBuf,
    backup: Option<PathBuf>,
    committed: bool,
}

impl BackupGuard {
    /// Snapshot `target` to a `.bak` sibling. A missing target needs no
    /// backup; rollback then simply removes whatever was created.
    pub fn create(target: &Path) -> io::Result<Self> {
        let backup = if target.exists() {
            let backup_path = target.with_extension("bak");
            fs::copy(target, &backup_path)?;
            Some(backup_path)
        } else {
            None
        };
        Ok(Self {
            target: target.to_path_buf(),
            backup,
            committed: false,
        })
    }

    /// The mutation succeeded: discard the backup.
    pub fn commit(mut self) {
        self.committed = true;
        if let Some(backup) = self.backup.take()
            && let Err(e) = fs::remove_file(&backup)
        {
            tracing::warn!(path = %backup.display(), "failed to remove backup: {e}");
        }
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match self.backup.take() {
            Some(backup) => {
                // Rename is atomic on the same filesystem, and the backup is
                // already a full copy.
                if let Err(e) = fs::rename(&backup, &self.target) {
                    tracing::warn!(
                        path = %self.target.display(),
                        "rollback failed, backup left at {}: {e}",
                        backup.display()
                    );
                }
            }
            None => {
                // The target didn't exist before the operation; undo any
                // partial creation.
                if self.target.exists()
                    && let Err(e) = fs::remove_file(&self.target)
                {
                    tracing::warn!(
                        path = %self.target.display(),
                        "rollback failed to remove created file: {e}"
                    );
                }
            }
        }
    }
}
