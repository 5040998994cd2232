//! Working-directory confinement.

use crate::error::{SandboxError, SandboxResult};
use cadre_util::path::confined_join;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve a caller-supplied working directory against `base`.
///
/// `base` must already be canonical. A blank argument resolves to `base`.
/// Targets outside `base` are rejected; a missing target is created only
/// after the lexical check passes, and its canonical form is checked again
/// so a symlink cannot lead outside `base`.
pub async fn resolve_working_dir(base: &Path, arg: Option<&str>) -> SandboxResult<PathBuf> {
    let Some(arg) = arg.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(base.to_path_buf());
    };

    let target =
        confined_join(base, Path::new(arg)).ok_or_else(|| SandboxError::path_escape(arg, base))?;

    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(SandboxError::NotADirectory(target)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %target.display(), "Creating working directory");
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| SandboxError::working_dir(&target, e))?;
        }
        Err(e) => return Err(SandboxError::working_dir(&target, e)),
    }

    let canonical = tokio::fs::canonicalize(&target)
        .await
        .map_err(|e| SandboxError::working_dir(&target, e))?;
    if !canonical.starts_with(base) {
        return Err(SandboxError::path_escape(arg, base));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        (dir, base)
    }

    #[tokio::test]
    async fn test_blank_resolves_to_base() {
        let (_dir, base) = canonical_tempdir();
        assert_eq!(resolve_working_dir(&base, None).await.unwrap(), base);
        assert_eq!(resolve_working_dir(&base, Some("  ")).await.unwrap(), base);
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_dir, base) = canonical_tempdir();
        let err = resolve_working_dir(&base, Some("../../etc")).await.unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape { .. }));
        let err = resolve_working_dir(&base, Some("/etc")).await.unwrap_err();
        assert!(err.is_confinement());
    }

    #[tokio::test]
    async fn test_missing_dir_created() {
        let (_dir, base) = canonical_tempdir();
        let resolved = resolve_working_dir(&base, Some("a/b")).await.unwrap();
        assert_eq!(resolved, base.join("a/b"));
        assert!(resolved.is_dir());
    }

    #[tokio::test]
    async fn test_escape_does_not_create() {
        let (_dir, base) = canonical_tempdir();
        let outside = base.parent().unwrap().join("cadre-should-not-exist");
        let _ = resolve_working_dir(&base, Some("../cadre-should-not-exist")).await;
        assert!(!outside.exists());
    }

    #[tokio::test]
    async fn test_file_rejected() {
        let (_dir, base) = canonical_tempdir();
        std::fs::write(base.join("file.txt"), "x").unwrap();
        let err = resolve_working_dir(&base, Some("file.txt")).await.unwrap_err();
        assert!(matches!(err, SandboxError::NotADirectory(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let (_dir, base) = canonical_tempdir();
        let (_outside_dir, outside) = canonical_tempdir();
        std::os::unix::fs::symlink(&outside, base.join("link")).unwrap();
        let err = resolve_working_dir(&base, Some("link")).await.unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape { .. }));
    }
}
