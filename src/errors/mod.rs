// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Error types
//!
//! Configuration problems fail compilation before anything runs, so they
//! carry enough context (step, dependency, pattern) to fix the manifest
//! without re-running with extra logging.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for drover operations
pub type DroverResult<T> = Result<T, DroverError>;

/// Main error type for drover
#[derive(Error, Debug, Diagnostic)]
pub enum DroverError {
    // ─────────────────────────────────────────────────────────────────────────
    // Manifest Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Manifest file not found: {path}")]
    #[diagnostic(
        code(drover::manifest_not_found),
        help("Pass the manifest path explicitly or create .drover.yml")
    )]
    ManifestNotFound { path: PathBuf },

    #[error("Pipeline '{name}' not found in manifest")]
    #[diagnostic(
        code(drover::pipeline_not_found),
        help("Available pipelines: {available}")
    )]
    PipelineNotFound { name: String, available: String },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(drover::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Compilation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    #[diagnostic(
        code(drover::unknown_dependency),
        help("Check that '{dependency}' is defined in the same pipeline")
    )]
    UnknownDependency { step: String, dependency: String },

    #[error("Circular dependency detected: {}", steps.join(" -> "))]
    #[diagnostic(
        code(drover::circular_dependency),
        help("Review the depends_on lists of these steps to remove the cycle")
    )]
    CircularDependency { steps: Vec<String> },

    #[error("Step '{step}' has an invalid '{condition}' condition pattern '{pattern}': {reason}")]
    #[diagnostic(
        code(drover::invalid_condition),
        help("Conditions accept glob patterns such as 'release/*' or 'v1.*'")
    )]
    InvalidCondition {
        step: String,
        condition: String,
        pattern: String,
        reason: String,
    },

    #[error("Failed to resolve workspace root: {message}")]
    #[diagnostic(code(drover::workspace_root))]
    WorkspaceRoot { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to prepare workspace '{path}': {error}")]
    #[diagnostic(
        code(drover::setup_failed),
        help("Check that the build root is writable")
    )]
    SetupFailed { path: PathBuf, error: String },

    #[error("Shell '{shell}' not found")]
    #[diagnostic(
        code(drover::shell_not_found),
        help("Install '{shell}' or run the pipeline on a matching platform")
    )]
    ShellNotFound { shell: String },

    #[error("Step '{step}' could not be started: {error}")]
    #[diagnostic(code(drover::step_start_failed))]
    StepStartFailed { step: String, error: String },

    #[error("Execution failed: {message}")]
    #[diagnostic(code(drover::execution_failed))]
    ExecutionFailed {
        message: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid runner configuration: {message}")]
    #[diagnostic(code(drover::config_error))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(drover::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(drover::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(drover::yaml_error))]
    Yaml { message: String },

    #[error("JSON encoding error: {message}")]
    #[diagnostic(code(drover::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(drover::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(drover::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for DroverError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for DroverError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for DroverError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for DroverError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for DroverError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl DroverError {
    /// Whether this error is a problem with the pipeline itself rather
    /// than with the machine running it.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::PipelineNotFound { .. }
                | Self::InvalidPipeline { .. }
                | Self::UnknownDependency { .. }
                | Self::CircularDependency { .. }
                | Self::InvalidCondition { .. }
                | Self::Yaml { .. }
        )
    }

    /// Create a pipeline not found error listing the pipelines that exist
    pub fn pipeline_not_found(name: &str, available: &[&str]) -> Self {
        let available = if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        };

        Self::PipelineNotFound {
            name: name.to_string(),
            available,
        }
    }
}
