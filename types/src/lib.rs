//! Core domain types for Anvil - no IO, no async.
//!
//! Everything the other crates exchange lives here: the error taxonomy
//! ([`WorkspaceError`]), directory listing nodes ([`TreeNode`]), line-range
//! read results ([`Fragment`]), and command execution output
//! ([`ExecOutput`]).

pub mod errors;
pub mod exec;
pub mod tree;

pub use errors::{PathDenial, WorkspaceError};
pub use exec::ExecOutput;
pub use tree::{Fragment, TreeNode};
