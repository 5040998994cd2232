//! External tools - declarative wrappers around installed binaries.

mod args;
mod manifest;

pub use args::{build_args, is_empty_value, stringify, validate};
pub use manifest::{ManifestError, ParamKind, ParamSpec, ToolManifest, WorkingDirPolicy};

use crate::{BoxedTool, Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use cadre_sandbox::{ExecRequest, Invocation, Sandbox};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A tool backed by a manifest.
pub struct ExternalTool {
    manifest: ToolManifest,
    sandbox: Arc<Sandbox>,
    schema: Value,
}

impl ExternalTool {
    pub fn new(manifest: ToolManifest, sandbox: Arc<Sandbox>) -> Self {
        let schema = manifest.parameters_schema();
        Self {
            manifest,
            sandbox,
            schema,
        }
    }

    /// Build tools for every manifest in a directory.
    pub fn load_dir(dir: &Path, sandbox: Arc<Sandbox>) -> Result<Vec<BoxedTool>, ManifestError> {
        Ok(ToolManifest::load_dir(dir)?
            .into_iter()
            .map(|m| Arc::new(Self::new(m, sandbox.clone())) as BoxedTool)
            .collect())
    }

    pub fn manifest(&self) -> &ToolManifest {
        &self.manifest
    }

    fn check_dependencies(&self) -> ToolResult<()> {
        for dep in &self.manifest.dependencies {
            if which::which(dep).is_err() {
                return Err(ToolError::Dependency(format!(
                    "'{}' requires '{}' but it was not found on PATH",
                    self.manifest.name, dep
                )));
            }
        }
        Ok(())
    }

    async fn working_dir(&self, args: &Map<String, Value>) -> ToolResult<PathBuf> {
        let base = self.sandbox.base_dir();
        Ok(match self.manifest.working_dir {
            WorkingDirPolicy::Inherit => base.to_path_buf(),
            WorkingDirPolicy::Plugin => self
                .manifest
                .dir
                .clone()
                .unwrap_or_else(|| base.to_path_buf()),
            WorkingDirPolicy::Param => {
                let arg = args.get("working_dir").and_then(Value::as_str);
                self.sandbox.resolve_working_dir(arg).await?
            }
        })
    }

    fn program(&self) -> String {
        let command = &self.manifest.command;
        let path = Path::new(command);
        match &self.manifest.dir {
            Some(dir) if path.is_relative() && path.components().count() > 1 => {
                dir.join(path).to_string_lossy().into_owned()
            }
            _ => command.clone(),
        }
    }
}

#[async_trait]
impl Tool for ExternalTool {
    fn id(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn quiet(&self) -> bool {
        self.manifest.quiet
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ToolError::validation(format!(
                    "Invalid arguments: expected an object, got {other}"
                )))
            }
        };

        validate(&self.manifest, &args)?;
        self.check_dependencies()?;
        let cwd = self.working_dir(&args).await?;
        let argv = build_args(&self.manifest, &args);
        let program = self.program();

        debug!(tool = %self.manifest.name, program = %program, args = ?argv, "Running external tool");

        let request = ExecRequest {
            invocation: Invocation::Program {
                program,
                args: argv.clone(),
            },
            cwd,
            env: self.manifest.env.clone(),
            timeout: self
                .manifest
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.sandbox.default_timeout()),
        };
        let result = self.sandbox.execute(request, &ctx.abort).await;

        info!(
            tool = %self.manifest.name,
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            "External tool finished"
        );

        Ok(ToolOutput::new(self.manifest.name.clone(), result.render())
            .with_metadata(json!({
                "args": argv,
                "quiet": self.manifest.quiet,
                "result": result.to_json(),
            }))
            .failed(!result.is_clean_success()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_sandbox::SandboxConfig;
    use tempfile::TempDir;

    fn setup(yaml: &str) -> (TempDir, ExternalTool, ToolContext) {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(SandboxConfig::with_base(dir.path())).unwrap();
        let ctx = ToolContext::new("coder", sandbox.base_dir());
        let manifest = ToolManifest::from_yaml(yaml).unwrap();
        (dir, ExternalTool::new(manifest, Arc::new(sandbox)), ctx)
    }

    #[tokio::test]
    async fn test_runs_program_with_built_args() {
        let (_dir, tool, ctx) = setup(
            r#"
name: say
description: Echo words
command: echo
quiet: true
parameters:
  - {name: word, required: true, position: 0}
  - {name: newline, type: boolean, flag: "-n"}
"#,
        );
        assert!(tool.quiet());
        let out = tool
            .execute(json!({"word": "hi", "newline": true}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "hi");
        assert_eq!(out.metadata["args"], json!(["-n", "hi"]));
        assert_eq!(out.metadata["quiet"], true);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_soft_error() {
        let (_dir, tool, ctx) = setup(
            "name: t\ncommand: echo\ndependencies: [cadre-no-such-binary-xyz]\n",
        );
        let err = tool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Dependency(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_envelope() {
        let (_dir, tool, ctx) = setup("name: f\ncommand: \"false\"\n");
        let out = tool.execute(json!({}), &ctx).await.unwrap();
        assert!(out.is_error);
        let envelope: Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(envelope["exit_code"], 1);
    }

    #[tokio::test]
    async fn test_param_working_dir_is_confined() {
        let (dir, tool, ctx) = setup("name: where\ncommand: pwd\nworking_dir: param\n");

        let out = tool
            .execute(json!({"working_dir": "nested"}), &ctx)
            .await
            .unwrap();
        assert!(out.output.trim_end().ends_with("nested"));
        assert!(dir.path().join("nested").is_dir());

        let err = tool
            .execute(json!({"working_dir": "../outside"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(_)));
    }

    #[tokio::test]
    async fn test_validation_runs_before_spawn() {
        let (_dir, tool, ctx) = setup(
            "name: t\ncommand: echo\nparameters:\n  - {name: q, required: true}\n",
        );
        let err = tool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
