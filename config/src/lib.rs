//! Configuration model, loading, and hot reload for Anvil.
//!
//! Configuration is TOML read from `./anvil.toml` or `~/.anvil/config.toml`,
//! with `ANVIL_*` environment overrides applied on top and validation last.
//! The live value travels through a `tokio::sync::watch` channel so the
//! workspace can take a fresh snapshot per operation; [`reload::ConfigWatcher`]
//! re-parses the file on change and swaps validated snapshots in.

mod model;
pub mod reload;

pub use model::{
    AnvilConfig, ConfigError, ExecConfig, LogConfig, ServerConfig, WorkspaceConfig,
};
pub use reload::ConfigWatcher;
