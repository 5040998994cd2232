//! Test fixtures for reproducible project directories.

use cadre_sandbox::{Sandbox, SandboxConfig};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary project with a configurable file layout.
///
/// The directory is removed when the built project is dropped.
///
/// ```rust
/// use cadre_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_file("src/main.rs", "fn main() {}")
///     .with_dir("data")
///     .build();
///
/// assert!(project.path().join("src/main.rs").exists());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    files: HashMap<PathBuf, String>,
    dirs: Vec<PathBuf>,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: HashMap::new(),
            dirs: Vec::new(),
        }
    }

    /// Add a file. Parent directories are created on build.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a `cadre.jsonc` config file.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("cadre.jsonc", config)
    }

    /// Add a tool manifest under `tools/`.
    pub fn with_manifest(self, file_name: &str, manifest: &str) -> Self {
        self.with_file(Path::new("tools").join(file_name), manifest)
    }

    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path();

        for dir in &self.dirs {
            let full_path = root.join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!(
                        "Failed to create parent directory for {}: {}",
                        full_path.display(),
                        e
                    )
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        BuiltTestProject {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A project whose files exist on disk.
pub struct BuiltTestProject {
    temp_dir: TempDir,
}

impl BuiltTestProject {
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory holding manifests added with [`TestProject::with_manifest`].
    pub fn tools_dir(&self) -> PathBuf {
        self.path().join("tools")
    }

    /// Data directory for stateful tools, created on first use.
    pub fn data_dir(&self) -> PathBuf {
        let dir = self.path().join(".cadre");
        fs::create_dir_all(&dir).expect("Failed to create data directory");
        dir
    }

    /// A sandbox rooted at the project with default limits.
    pub fn sandbox(&self) -> Arc<Sandbox> {
        Arc::new(
            Sandbox::new(SandboxConfig::with_base(self.path())).expect("Failed to create sandbox"),
        )
    }

    pub fn read(&self, path: impl AsRef<Path>) -> String {
        fs::read_to_string(self.path().join(path)).expect("Failed to read file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_creates_layout() {
        let project = TestProject::new()
            .with_file("a/b.txt", "hello")
            .with_dir("empty")
            .with_manifest("echo.yaml", "name: echo\ncommand: echo\n")
            .build();

        assert_eq!(project.read("a/b.txt"), "hello");
        assert!(project.path().join("empty").is_dir());
        assert!(project.tools_dir().join("echo.yaml").exists());
    }
}
