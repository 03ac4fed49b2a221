//! Shared infrastructure utilities for Anvil.
//!
//! Cross-cutting pieces that several crates need but that don't belong in
//! the domain-pure `anvil-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`truncate`**: Bounded head/tail output truncation
//! - **`diff`**: Change previews and stats for tool result summaries

pub mod atomic_write;
pub mod diff;
pub mod truncate;

pub use atomic_write::{atomic_write, atomic_write_new, recover_bak_file};
pub use diff::{compute_diff_stats, render_change_preview};
pub use truncate::truncate_middle;
