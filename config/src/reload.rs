//! Config hot reload.
//!
//! Watches the directory containing the config file (the directory, not the
//! file, so editors that write-then-rename still trigger events), re-parses
//! on change, and swaps validated snapshots into a `tokio::sync::watch`
//! channel. Invalid or unreadable replacements are logged and dropped; the
//! previous snapshot stays live.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::model::{AnvilConfig, ConfigError};

/// Keeps the file watcher alive and owns the sending half of the config
/// channel. Dropping the watcher stops hot reload; receivers keep the last
/// snapshot.
pub struct ConfigWatcher {
    config_path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path`, seeding the channel with `initial`.
    ///
    /// Returns the watcher handle and a receiver for config snapshots.
    pub fn spawn(
        initial: AnvilConfig,
        config_path: &Path,
    ) -> Result<(Self, watch::Receiver<AnvilConfig>), ConfigError> {
        let config_path = config_path
            .canonicalize()
            .map_err(|e| ConfigError::Watch(format!("config path: {e}")))?;
        let (tx, rx) = watch::channel(initial);

        let watched = config_path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_)
                    ) {
                        return;
                    }
                    if !event.paths.iter().any(|p| p == &watched) {
                        return;
                    }
                    match reload_from(&watched) {
                        Ok(config) => {
                            if tx.send(config).is_ok() {
                                tracing::info!(path = %watched.display(), "config reloaded");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(path = %watched.display(), "config reload rejected: {e}");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("config watcher error: {e}");
                }
            })
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        let dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::Watch("config path has no parent".to_string()))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        tracing::info!(path = %config_path.display(), "watching config for changes");
        Ok((
            Self {
                config_path,
                _watcher: watcher,
            },
            rx,
        ))
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Re-read, re-override, and re-validate a config file.
///
/// This is the whole reload pipeline minus the watcher, split out so it can
/// be exercised directly.
pub fn reload_from(path: &Path) -> Result<AnvilConfig, ConfigError> {
    let mut config = AnvilConfig::parse_file(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
