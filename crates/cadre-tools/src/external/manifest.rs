//! Tool manifests.
//!
//! A manifest describes an installed binary as a tool: its parameters, how
//! they become command-line arguments, required binaries and execution
//! policy. Manifests are YAML or JSON files.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid manifest {name}: {message}")]
    Invalid { name: String, message: String },
}

impl ManifestError {
    fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Bool,
    Number,
    Integer,
    Array,
    Object,
}

impl ParamKind {
    /// Parse a JSON Schema style type name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "boolean" | "bool" => Some(Self::Bool),
            "number" | "float" => Some(Self::Number),
            "integer" | "int" => Some(Self::Integer),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// JSON Schema type name.
    pub fn schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "boolean",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` has this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Where an external tool runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingDirPolicy {
    /// The sandbox base directory.
    #[default]
    Inherit,
    /// The directory the manifest was loaded from.
    Plugin,
    /// The `working_dir` argument, confined to the sandbox.
    Param,
}

/// One declared parameter, resolved at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    /// Positional index; positional parameters never become flags.
    pub position: Option<usize>,
    /// Flag template, e.g. `--max-count={{value}}` or `-i`.
    pub flag: Option<String>,
    /// Skip the parameter when its value is empty.
    pub omit_empty: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type", default = "default_type")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    position: Option<usize>,
    #[serde(default)]
    flag: Option<String>,
    #[serde(default)]
    omit_empty: bool,
    #[serde(default)]
    default: Option<Value>,
}

fn default_type() -> String {
    "string".to_string()
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    description: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    parameters: Vec<RawParam>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    working_dir: WorkingDirPolicy,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    quiet: bool,
}

/// A validated tool manifest.
#[derive(Debug, Clone)]
pub struct ToolManifest {
    pub name: String,
    pub description: String,
    /// Program to run. Relative paths with a separator resolve against
    /// the manifest directory.
    pub command: String,
    /// Static argument templates with `{{param}}` placeholders.
    pub args: Vec<String>,
    /// Parameters in declaration order.
    pub parameters: Vec<ParamSpec>,
    /// Binaries that must be on the search path.
    pub dependencies: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: WorkingDirPolicy,
    pub timeout_seconds: Option<u64>,
    /// Presenters should not show progress for this tool.
    pub quiet: bool,
    /// Directory the manifest was loaded from.
    pub dir: Option<PathBuf>,
}

impl ToolManifest {
    /// Parse a YAML manifest. JSON is valid YAML, so this reads both.
    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_yaml::from_str(text).map_err(|e| ManifestError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        Self::resolve(raw)
    }

    /// Parse a JSON manifest.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(text).map_err(|e| ManifestError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        Self::resolve(raw)
    }

    /// Load a manifest file, choosing the parser by extension.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        };
        let mut manifest = parsed.map_err(|e| match e {
            ManifestError::Parse { message, .. } => ManifestError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        manifest.dir = path.parent().map(Path::to_path_buf);
        Ok(manifest)
    }

    /// Load every `*.yaml`, `*.yml` and `*.json` manifest in a directory.
    ///
    /// Invalid manifests are skipped with a warning. Results are sorted by
    /// tool name.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, ManifestError> {
        let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Read {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut manifests = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_manifest = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            );
            if !is_manifest || !path.is_file() {
                continue;
            }
            match Self::load(&path) {
                Ok(manifest) => {
                    debug!(name = %manifest.name, path = %path.display(), "Loaded tool manifest");
                    manifests.push(manifest);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid tool manifest"),
            }
        }
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(manifests)
    }

    fn resolve(raw: RawManifest) -> Result<Self, ManifestError> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(ManifestError::invalid("<unnamed>", "name must not be empty"));
        }
        if raw.command.trim().is_empty() {
            return Err(ManifestError::invalid(&name, "command must not be empty"));
        }

        let mut seen_names = HashSet::new();
        let mut seen_positions = HashSet::new();
        let mut parameters = Vec::with_capacity(raw.parameters.len());

        for param in raw.parameters {
            if !seen_names.insert(param.name.clone()) {
                return Err(ManifestError::invalid(
                    &name,
                    format!("duplicate parameter '{}'", param.name),
                ));
            }
            let kind = ParamKind::parse(&param.kind).ok_or_else(|| {
                ManifestError::invalid(
                    &name,
                    format!("parameter '{}' has unknown type '{}'", param.name, param.kind),
                )
            })?;
            if let Some(position) = param.position {
                if !seen_positions.insert(position) {
                    return Err(ManifestError::invalid(
                        &name,
                        format!("duplicate position {position} on parameter '{}'", param.name),
                    ));
                }
            }
            parameters.push(ParamSpec {
                name: param.name,
                kind,
                description: param.description,
                required: param.required,
                position: param.position,
                flag: param.flag,
                omit_empty: param.omit_empty,
                default: param.default,
            });
        }

        if raw.working_dir == WorkingDirPolicy::Param
            && parameters.iter().any(|p| p.name == "working_dir")
        {
            return Err(ManifestError::invalid(
                &name,
                "'working_dir' is reserved when the working_dir policy is 'param'",
            ));
        }

        Ok(Self {
            name,
            description: raw.description,
            command: raw.command,
            args: raw.args,
            parameters,
            dependencies: raw.dependencies,
            env: raw.env,
            working_dir: raw.working_dir,
            timeout_seconds: raw.timeout_seconds,
            quiet: raw.quiet,
            dir: None,
        })
    }

    /// JSON Schema for the declared parameters.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = serde_json::json!({
                "type": param.kind.schema_type(),
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        if self.working_dir == WorkingDirPolicy::Param {
            properties.insert(
                "working_dir".to_string(),
                serde_json::json!({
                    "type": "string",
                    "description": "Working directory relative to the project root",
                }),
            );
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SEARCH: &str = r#"
name: search
description: Search files
command: rg
args: ["--color=never"]
dependencies: [rg]
quiet: true
parameters:
  - name: pattern
    type: string
    required: true
    position: 0
  - name: ignore_case
    type: boolean
    flag: "-i"
  - name: max_count
    type: integer
"#;

    #[test]
    fn test_parse_yaml() {
        let manifest = ToolManifest::from_yaml(SEARCH).unwrap();
        assert_eq!(manifest.name, "search");
        assert!(manifest.quiet);
        assert_eq!(manifest.working_dir, WorkingDirPolicy::Inherit);
        assert_eq!(manifest.parameters.len(), 3);
        assert_eq!(manifest.parameters[0].position, Some(0));
        assert_eq!(manifest.parameters[1].kind, ParamKind::Bool);
        assert_eq!(manifest.parameters[2].kind, ParamKind::Integer);
    }

    #[test]
    fn test_parse_json() {
        let manifest = ToolManifest::from_json(
            r#"{"name": "fmt", "command": "fmt", "working_dir": "param",
                "parameters": [{"name": "width", "type": "number"}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.working_dir, WorkingDirPolicy::Param);
        let schema = manifest.parameters_schema();
        assert_eq!(schema["properties"]["width"]["type"], "number");
        assert_eq!(schema["properties"]["working_dir"]["type"], "string");
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let err = ToolManifest::from_yaml(
            r#"
name: dup
command: cp
parameters:
  - {name: src, position: 0}
  - {name: dst, position: 0}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate position 0"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = ToolManifest::from_yaml(
            "name: t\ncommand: t\nparameters:\n  - {name: x, type: tensor}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(ToolManifest::from_yaml("name: t\ncommand: ''\n").is_err());
    }

    #[test]
    fn test_load_dir_skips_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("search.yaml"), SEARCH).unwrap();
        std::fs::write(dir.path().join("broken.yml"), "name: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manifests = ToolManifest::load_dir(dir.path()).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].dir.as_deref(), Some(dir.path()));
    }
}
