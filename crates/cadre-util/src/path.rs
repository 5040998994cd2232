//! Path utilities.

use std::path::{Component, Path, PathBuf};

/// The cadre configuration directory (`~/.config/cadre` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("cadre"))
}

/// The cadre data directory (`~/.local/share/cadre` on Linux).
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("cadre"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist. A `..`
/// that would climb above the root is kept so callers can detect it.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                let popped = matches!(result.components().next_back(), Some(Component::Normal(_)))
                    && result.pop();
                if !popped && !result.has_root() {
                    result.push("..");
                }
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }

    result
}

/// Join `path` onto `base` and return the normalized result only if it
/// stays inside `base`. Absolute `path`s are accepted when they fall under
/// `base`.
pub fn confined_join(base: &Path, path: &Path) -> Option<PathBuf> {
    let base = normalize(base);
    let joined = normalize(&base.join(path));
    joined.starts_with(&base).then_some(joined)
}
