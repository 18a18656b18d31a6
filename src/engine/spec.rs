// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::pipeline::Platform;

/// Name of the implicit bootstrap step
pub const CLONE_STEP: &str = "clone";

/// The compiled, fully resolved plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledSpec {
    /// Absolute workspace root
    pub root: PathBuf,

    pub platform: Platform,

    /// Directories and files to create, in order
    #[serde(default)]
    pub files: Vec<File>,

    /// Symlinks to create after the files
    #[serde(default)]
    pub links: Vec<Link>,

    #[serde(default)]
    pub steps: Vec<CompiledStep>,
}

impl CompiledSpec {
    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&CompiledStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get all step names in plan order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether the plan contains the bootstrap clone step
    pub fn has_clone(&self) -> bool {
        self.step(CLONE_STEP).is_some()
    }

    /// Indented JSON for inspection. Secret values are never included.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A step ready to be executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledStep {
    pub name: String,

    /// Program to run
    pub command: String,

    /// Arguments, ending with the script path
    #[serde(default)]
    pub args: Vec<String>,

    pub working_dir: PathBuf,

    /// Literal environment; secrets are carried separately
    #[serde(default)]
    pub envs: BTreeMap<String, String>,

    #[serde(default)]
    pub secrets: Vec<Secret>,

    /// Files written before the step runs
    #[serde(default)]
    pub files: Vec<File>,

    /// Steps that must reach a terminal state first
    #[serde(default)]
    pub depends_on: Vec<String>,

    pub run_policy: RunPolicy,

    #[serde(default)]
    pub detach: bool,

    #[serde(default)]
    pub ignore_stdout: bool,

    #[serde(default)]
    pub ignore_stderr: bool,

    #[serde(default)]
    pub ignore_err: bool,
}

/// When a step is allowed to run, given the outcome of its dependencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    #[default]
    OnSuccess,
    OnFailure,
    Always,
    Never,
}

impl fmt::Display for RunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnSuccess => write!(f, "on-success"),
            Self::OnFailure => write!(f, "on-failure"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// A secret reference. `data` is filled by the resolver and is never
/// serialized or printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Name the provider knows the secret by
    pub name: String,

    /// Environment variable the value is exposed as
    pub env: String,

    #[serde(skip)]
    pub data: Vec<u8>,

    /// Replace the value in step output
    #[serde(default)]
    pub mask: bool,
}

impl Secret {
    /// Unresolved reference
    pub fn new(name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: env.into(),
            data: Vec::new(),
            mask: true,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.data.is_empty()
    }

    /// Value as text; an unresolved secret is the empty string
    pub fn value(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("env", &self.env)
            .field("resolved", &self.is_resolved())
            .field("mask", &self.mask)
            .finish()
    }
}

/// A directory or file to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub path: PathBuf,

    /// Unix permission bits
    pub mode: u32,

    #[serde(default)]
    pub is_dir: bool,

    /// File content; always `None` for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl File {
    pub fn dir(path: PathBuf, mode: u32) -> Self {
        Self {
            path,
            mode,
            is_dir: true,
            data: None,
        }
    }

    pub fn file(path: PathBuf, mode: u32, data: impl Into<String>) -> Self {
        Self {
            path,
            mode,
            is_dir: false,
            data: Some(data.into()),
        }
    }
}

/// A symlink to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: PathBuf,
    pub target: PathBuf,
}
