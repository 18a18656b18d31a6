// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Pipeline definition structures
//!
//! Defines the schema of `.drover.yml` manifests. A manifest may hold
//! several YAML documents; only `kind: pipeline` documents of type `exec`
//! are considered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::conditions::Conditions;
use crate::errors::{DroverError, DroverResult};

/// A parsed manifest: every exec pipeline found in the source, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub pipelines: Vec<PipelineDefinition>,
}

impl Manifest {
    /// Load a manifest from a YAML file
    pub fn from_file(path: &Path) -> DroverResult<Self> {
        Self::from_yaml(&Self::read(path)?)
    }

    /// Raw manifest text, for callers that preprocess it
    pub fn read(path: &Path) -> DroverResult<String> {
        if !path.exists() {
            return Err(DroverError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }

        std::fs::read_to_string(path).map_err(|e| DroverError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse a (possibly multi-document) YAML manifest
    pub fn from_yaml(yaml: &str) -> DroverResult<Self> {
        let mut pipelines = Vec::new();

        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or(DEFAULT_KIND);
            if kind != DEFAULT_KIND {
                tracing::debug!(kind, "skipping non-pipeline document");
                continue;
            }

            let pipeline: PipelineDefinition = serde_yaml::from_value(value)?;
            if pipeline.pipeline_type != DEFAULT_TYPE {
                tracing::debug!(
                    name = %pipeline.name,
                    pipeline_type = %pipeline.pipeline_type,
                    "skipping pipeline of foreign type"
                );
                continue;
            }
            pipelines.push(pipeline);
        }

        Ok(Self { pipelines })
    }

    /// Get a pipeline by name.
    ///
    /// An empty name selects the only pipeline of a single-pipeline
    /// manifest.
    pub fn lookup(&self, name: &str) -> DroverResult<&PipelineDefinition> {
        if name.is_empty() && self.pipelines.len() == 1 {
            return Ok(&self.pipelines[0]);
        }

        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DroverError::pipeline_not_found(name, &self.pipeline_names()))
    }

    /// Get all pipeline names
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }
}

const DEFAULT_KIND: &str = "pipeline";
const DEFAULT_TYPE: &str = "exec";

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

/// One pipeline: the immutable input of a compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(rename = "type", default = "default_type")]
    pub pipeline_type: String,

    /// Pipeline name
    pub name: String,

    /// Target platform of the generated scripts
    #[serde(default)]
    pub platform: Platform,

    /// Bootstrap clone settings
    #[serde(default)]
    pub clone: CloneSettings,

    /// Steps in declaration order
    #[serde(default)]
    pub steps: Vec<DeclaredStep>,

    /// Pipelines this one depends on. Carried for callers that schedule
    /// several pipelines; the compiler does not interpret it.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PipelineDefinition {
    /// Create an empty exec pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            kind: default_kind(),
            pipeline_type: default_type(),
            name: name.into(),
            platform: Platform::default(),
            clone: CloneSettings::default(),
            steps: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&DeclaredStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get all step names
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether any step declares an explicit dependency
    pub fn declares_dependencies(&self) -> bool {
        self.steps.iter().any(|s| !s.depends_on.is_empty())
    }
}

/// Platform descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default = "host_os")]
    pub os: String,

    #[serde(default = "host_arch")]
    pub arch: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            os: host_os(),
            arch: host_arch(),
            variant: String::new(),
            version: String::new(),
        }
    }
}

impl Platform {
    /// Whether scripts for this platform are PowerShell scripts
    pub fn is_windows(&self) -> bool {
        self.os.eq_ignore_ascii_case("windows")
    }
}

fn host_os() -> String {
    go_os(std::env::consts::OS).to_string()
}

fn host_arch() -> String {
    go_arch(std::env::consts::ARCH).to_string()
}

/// Platform names as pipeline manifests spell them
fn go_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Bootstrap clone settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSettings {
    /// Skip the clone step entirely
    #[serde(default)]
    pub disable: bool,

    /// Shallow clone depth (0 = full history)
    #[serde(default)]
    pub depth: u32,

    /// Disable TLS verification for git
    #[serde(default)]
    pub skip_verify: bool,

    /// Enable git tracing
    #[serde(default)]
    pub trace: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// A single step as written in the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaredStep {
    /// Step name (must be unique within the pipeline)
    pub name: String,

    /// Shell commands, run in order
    #[serde(default)]
    pub commands: Vec<String>,

    /// Names of steps that must finish first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Explicit run policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<StepRun>,

    /// Failure mode; `ignore` lets the pipeline continue
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure: String,

    /// Start the step without waiting for it to finish
    #[serde(default)]
    pub detach: bool,

    /// Environment variables for this step
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,

    /// Conditional clause
    #[serde(default)]
    pub when: Conditions,
}

impl DeclaredStep {
    /// Create a step running the given commands
    pub fn new(name: impl Into<String>, commands: &[&str]) -> Self {
        Self {
            name: name.into(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Whether failures of this step are ignored
    pub fn ignores_failure(&self) -> bool {
        self.failure.eq_ignore_ascii_case("ignore")
    }
}

/// Explicit run policy annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRun {
    OnSuccess,
    OnFailure,
    Always,
}

/// An environment value: a literal or a reference to a named secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "RawEnvValue")]
pub enum EnvValue {
    Secret { from_secret: String },
    Literal(String),
}

impl EnvValue {
    /// Literal value, if this is not a secret reference
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Secret { .. } => None,
        }
    }

    /// Secret name, if this is a secret reference
    pub fn secret_name(&self) -> Option<&str> {
        match self {
            Self::Secret { from_secret } => Some(from_secret),
            Self::Literal(_) => None,
        }
    }
}

impl From<&str> for EnvValue {
    fn from(v: &str) -> Self {
        Self::Literal(v.to_string())
    }
}

/// YAML scalars are accepted for literals and rendered as strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEnvValue {
    Secret { from_secret: String },
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawEnvValue> for EnvValue {
    fn from(raw: RawEnvValue) -> Self {
        match raw {
            RawEnvValue::Secret { from_secret } => Self::Secret { from_secret },
            RawEnvValue::Bool(b) => Self::Literal(b.to_string()),
            RawEnvValue::Int(i) => Self::Literal(i.to_string()),
            RawEnvValue::Float(f) => Self::Literal(f.to_string()),
            RawEnvValue::Text(s) => Self::Literal(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pipeline() {
        let yaml = r#"
kind: pipeline
type: exec
name: default

steps:
  - name: build
    commands:
      - cargo build
  - name: test
    commands:
      - cargo test
    depends_on: [build]
"#;

        let manifest = Manifest::from_yaml(yaml).unwrap();
        let pipeline = manifest.lookup("default").unwrap();
        assert_eq!(pipeline.steps.len(), 2);
        assert_eq!(pipeline.step_names(), vec!["build", "test"]);
        assert!(pipeline.declares_dependencies());
        assert!(!pipeline.clone.disable);
    }

    #[test]
    fn test_multi_document_manifest() {
        let yaml = r#"
kind: pipeline
type: exec
name: backend
steps:
  - name: test
    commands: [go test ./...]
---
kind: secret
name: token
---
kind: pipeline
type: docker
name: containers
---
kind: pipeline
type: exec
name: frontend
steps:
  - name: test
    commands: [npm test]
"#;

        let manifest = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.pipeline_names(), vec!["backend", "frontend"]);
        assert!(manifest.lookup("containers").is_err());
        assert!(manifest.lookup("").is_err());
    }

    #[test]
    fn test_lookup_single_pipeline_without_name() {
        let yaml = "name: only\nsteps: []\n";
        let manifest = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.lookup("").unwrap().name, "only");
    }

    #[test]
    fn test_environment_values() {
        let yaml = r#"
name: default
steps:
  - name: publish
    commands: [./publish.sh]
    environment:
      RETRIES: 3
      VERBOSE: true
      TARGET: staging
      TOKEN:
        from_secret: token
"#;

        let manifest = Manifest::from_yaml(yaml).unwrap();
        let env = &manifest.pipelines[0].steps[0].environment;
        assert_eq!(env["RETRIES"], EnvValue::Literal("3".into()));
        assert_eq!(env["VERBOSE"].as_literal(), Some("true"));
        assert_eq!(env["TARGET"].as_literal(), Some("staging"));
        assert_eq!(env["TOKEN"].secret_name(), Some("token"));
    }

    #[test]
    fn test_run_policy_and_failure() {
        let yaml = r#"
name: default
clone:
  disable: true
steps:
  - name: notify
    commands: [./notify.sh]
    run: on_failure
    failure: IGNORE
"#;

        let manifest = Manifest::from_yaml(yaml).unwrap();
        let pipeline = &manifest.pipelines[0];
        assert!(pipeline.clone.disable);
        assert_eq!(pipeline.steps[0].run, Some(StepRun::OnFailure));
        assert!(pipeline.steps[0].ignores_failure());
    }

    #[test]
    fn test_platform_defaults_to_host() {
        let pipeline = PipelineDefinition::new("p");
        assert_eq!(pipeline.platform.os, go_os(std::env::consts::OS));
        assert_eq!(pipeline.platform.arch, go_arch(std::env::consts::ARCH));

        assert_eq!(go_os("macos"), "darwin");
        assert_eq!(go_arch("x86_64"), "amd64");
        assert_eq!(go_arch("aarch64"), "arm64");
        assert_eq!(go_arch("riscv64"), "riscv64");

        let windows = Platform {
            os: "Windows".into(),
            ..Platform::default()
        };
        assert!(windows.is_windows());
    }
}
