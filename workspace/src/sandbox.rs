//! Path confinement.
//!
//! [`PathGuard`] turns untrusted path strings into canonical absolute paths
//! that are guaranteed to live under the sandbox root (post symlink
//! resolution), optionally narrowed by an allow-list of prefixes. Extension
//! blocking is a sibling check applied by callers after resolution.

use std::path::{Component, Path, PathBuf};

use anvil_config::WorkspaceConfig;
use anvil_types::{PathDenial, WorkspaceError};

/// Resolves untrusted paths into the sandbox.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    allowed_prefixes: Vec<PathBuf>,
    blocked_extensions: Vec<String>,
}

impl PathGuard {
    /// Build a guard from a config snapshot. The root (config value, or the
    /// process working directory when unset) must exist; it is canonicalized
    /// once here so that all membership checks compare canonical paths.
    pub fn new(config: &WorkspaceConfig) -> Result<Self, WorkspaceError> {
        let root = if config.root_dir.is_empty() {
            std::env::current_dir().map_err(|e| WorkspaceError::io(".", e))?
        } else {
            PathBuf::from(&config.root_dir)
        };
        let root = root
            .canonicalize()
            .map_err(|e| WorkspaceError::io(&root, e))?;

        let allowed_prefixes = config
            .allowed_paths
            .iter()
            .map(|prefix| {
                let p = Path::new(prefix);
                if p.is_absolute() {
                    lexical_clean(p)
                } else {
                    lexical_clean(&root.join(p))
                }
            })
            .collect();

        let blocked_extensions = config
            .blocked_extensions
            .iter()
            .map(|ext| ext.to_lowercase())
            .collect();

        Ok(Self {
            root,
            allowed_prefixes,
            blocked_extensions,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an untrusted path (absolute or sandbox-relative) to a
    /// confined canonical path.
    ///
    /// The target does not have to exist: the nearest existing ancestor is
    /// canonicalized and the remaining suffix re-joined, since a
    /// not-yet-created file cannot be a symlink.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(WorkspaceError::PathViolation(PathDenial::Empty));
        }

        let input = lexical_clean(Path::new(trimmed));
        let absolute = if input.is_absolute() {
            input.clone()
        } else {
            lexical_clean(&self.root.join(&input))
        };

        let resolved = canonicalize_existing_prefix(&absolute).map_err(|_| {
            WorkspaceError::PathViolation(PathDenial::Escape {
                attempted: input.clone(),
                resolved: absolute.clone(),
            })
        })?;

        if resolved.strip_prefix(&self.root).is_err() {
            return Err(WorkspaceError::PathViolation(PathDenial::Escape {
                attempted: input,
                resolved,
            }));
        }

        if !self.allowed_prefixes.is_empty()
            && !self
                .allowed_prefixes
                .iter()
                .any(|prefix| resolved.starts_with(prefix))
        {
            return Err(WorkspaceError::PathViolation(PathDenial::NotAllowed {
                attempted: resolved,
            }));
        }

        Ok(resolved)
    }

    /// Reject paths whose extension is on the block list, case-insensitive.
    pub fn check_extension(&self, path: &Path) -> Result<(), WorkspaceError> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Ok(());
        };
        let dotted = format!(".{}", ext.to_lowercase());
        if self.blocked_extensions.contains(&dotted) {
            return Err(WorkspaceError::BlockedExtension {
                path: path.to_path_buf(),
                extension: dotted,
            });
        }
        Ok(())
    }

    /// Root-relative display form of a resolved path.
    #[must_use]
    pub fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// Lexical normalization: drop `.` components and fold `..` into the
/// preceding component where one exists. Leading `..` components on a
/// relative path are kept (they will fail the membership check later).
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !matches!(out.components().next_back(), Some(Component::RootDir)) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `path` and re-join the
/// non-existent remainder (collected bottom-up).
fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return path.canonicalize();
    }

    let mut suffix: Vec<&std::ffi::OsStr> = Vec::new();
    let mut ancestor = path;
    loop {
        match ancestor.parent() {
            Some(parent) => {
                if let Some(name) = ancestor.file_name() {
                    suffix.push(name);
                }
                if parent.exists() {
                    ancestor = parent;
                    break;
                }
                ancestor = parent;
            }
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no existing ancestor",
                ));
            }
        }
    }

    let mut resolved = ancestor.canonicalize()?;
    for part in suffix.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use anvil_config::WorkspaceConfig;
    use anvil_types::{PathDenial, WorkspaceError};
    use tempfile::tempdir;

    use super::{PathGuard, lexical_clean};

    fn guard_for(root: &Path) -> PathGuard {
        let config = WorkspaceConfig {
            root_dir: root.to_string_lossy().into_owned(),
            ..WorkspaceConfig::default()
        };
        PathGuard::new(&config).expect("guard")
    }

    #[test]
    fn lexical_clean_folds_dot_and_dotdot() {
        assert_eq!(lexical_clean(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(lexical_clean(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(lexical_clean(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn relative_path_resolves_inside_root() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("file.txt"), "x").expect("seed");
        let guard = guard_for(dir.path());

        let resolved = guard.resolve("file.txt").expect("resolve");
        assert!(resolved.starts_with(guard.root()));
        assert!(resolved.ends_with("file.txt"));
    }

    #[test]
    fn not_yet_created_file_resolves() {
        let dir = tempdir().expect("tempdir");
        let guard = guard_for(dir.path());

        let resolved = guard.resolve("new/sub/file.txt").expect("resolve");
        assert!(resolved.starts_with(guard.root()));
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let guard = guard_for(dir.path());

        for attempt in ["../escape", "../../etc/passwd", "sub/../../etc/passwd"] {
            let err = guard.resolve(attempt).expect_err(attempt);
            assert!(matches!(
                err,
                WorkspaceError::PathViolation(PathDenial::Escape { .. })
            ));
        }
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let guard = guard_for(dir.path());

        let err = guard.resolve("/etc/passwd").expect_err("must escape");
        assert!(matches!(err, WorkspaceError::PathViolation(_)));
    }

    #[test]
    fn absolute_path_inside_root_is_accepted() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("ok.txt"), "x").expect("seed");
        let guard = guard_for(dir.path());

        let abs = guard.root().join("ok.txt");
        let resolved = guard
            .resolve(abs.to_str().expect("utf8"))
            .expect("resolve absolute");
        assert_eq!(resolved, abs);
    }

    #[test]
    fn empty_path_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let guard = guard_for(dir.path());

        for attempt in ["", "   "] {
            let err = guard.resolve(attempt).expect_err("empty");
            assert!(matches!(
                err,
                WorkspaceError::PathViolation(PathDenial::Empty)
            ));
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_pointing_outside_root_is_rejected() {
        let outside = tempdir().expect("outside");
        std::fs::write(outside.path().join("secret"), "x").expect("seed");
        let dir = tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path().join("secret"), dir.path().join("link"))
            .expect("symlink");
        let guard = guard_for(dir.path());

        let err = guard.resolve("link").expect_err("symlink escape");
        assert!(matches!(
            err,
            WorkspaceError::PathViolation(PathDenial::Escape { .. })
        ));
    }

    #[test]
    fn allow_list_narrows_the_sandbox() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/ok.rs"), "x").expect("seed");
        std::fs::write(dir.path().join("top.txt"), "x").expect("seed");

        let config = WorkspaceConfig {
            root_dir: dir.path().to_string_lossy().into_owned(),
            allowed_paths: vec!["src".to_string()],
            ..WorkspaceConfig::default()
        };
        let guard = PathGuard::new(&config).expect("guard");

        guard.resolve("src/ok.rs").expect("allowed");
        let err = guard.resolve("top.txt").expect_err("outside allow-list");
        assert!(matches!(
            err,
            WorkspaceError::PathViolation(PathDenial::NotAllowed { .. })
        ));
    }

    #[test]
    fn blocked_extension_is_case_insensitive() {
        let dir = tempdir().expect("tempdir");
        let guard = guard_for(dir.path());

        guard
            .check_extension(Path::new("notes.txt"))
            .expect("txt allowed");
        for name in ["secrets.env", "SECRETS.ENV", "cert.Pem"] {
            let err = guard.check_extension(Path::new(name)).expect_err(name);
            assert!(matches!(err, WorkspaceError::BlockedExtension { .. }));
        }
        // No extension at all is never blocked.
        guard.check_extension(Path::new("Makefile")).expect("ok");
    }
}
