use serde::{Deserialize, Serialize};

/// Captured output of a gated command execution.
///
/// A non-zero exit code is data, not a failure: the caller decides what a
/// failing build means. Only spawn failures and timeouts surface as
/// [`crate::WorkspaceError`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
