// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Build context
//!
//! Metadata about the build being compiled: who triggered it, which
//! revision, which repository and which machine. Supplied once per
//! compilation and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything the compiler knows about the build besides the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildContext {
    pub build: Build,
    pub repo: Repo,
    pub stage: Stage,
    pub system: System,

    /// Credentials written to the workspace netrc file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netrc: Option<Netrc>,

    /// Default environment added to every step
    #[serde(default)]
    pub environ: BTreeMap<String, String>,

    /// Snapshot of the host environment, lowest precedence
    #[serde(default)]
    pub host_environ: BTreeMap<String, String>,

    /// Directory the workspace root is created in (defaults to the
    /// system temp directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Symlinks into the workspace: source path -> path relative to root
    #[serde(default)]
    pub symlinks: BTreeMap<PathBuf, PathBuf>,
}

impl BuildContext {
    /// Capture the current process environment as the host environment
    pub fn with_host_environ(mut self) -> Self {
        self.host_environ = std::env::vars().collect();
        self
    }
}

/// Build metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    pub number: u64,
    pub event: String,
    pub action: String,
    pub cron: String,

    /// Git reference, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Source branch of the change
    pub source: String,

    /// Target branch; the branch condition matches against this
    pub target: String,

    /// Deployment target environment
    pub deploy_to: String,

    pub before: String,
    pub after: String,
    pub message: String,
    pub author_login: String,
    pub author_name: String,
    pub author_email: String,
    pub author_avatar: String,
    pub link: String,

    /// Unix timestamps
    pub created: i64,
    pub started: i64,

    /// User supplied build parameters, exported as environment
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Repository metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Repo {
    /// `namespace/name`
    pub slug: String,
    pub namespace: String,
    pub name: String,
    pub scm: String,
    pub http_url: String,
    pub ssh_url: String,
    pub link: String,
    pub branch: String,
    pub visibility: String,
    pub private: bool,

    /// Build timeout in minutes
    pub timeout: u64,
}

impl Default for Repo {
    fn default() -> Self {
        Self {
            slug: String::new(),
            namespace: String::new(),
            name: String::new(),
            scm: "git".into(),
            http_url: String::new(),
            ssh_url: String::new(),
            link: String::new(),
            branch: "main".into(),
            visibility: "public".into(),
            private: false,
            timeout: 60,
        }
    }
}

impl Repo {
    /// Clone URL, preferring HTTP over SSH
    pub fn remote_url(&self) -> &str {
        if self.http_url.is_empty() {
            &self.ssh_url
        } else {
            &self.http_url
        }
    }
}

/// Stage identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    pub name: String,
    pub number: u32,
    pub kind: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    pub machine: String,
    pub os: String,
    pub arch: String,
    pub variant: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Default for Stage {
    fn default() -> Self {
        Self {
            name: "default".into(),
            number: 1,
            kind: "pipeline".into(),
            stage_type: "exec".into(),
            machine: String::new(),
            os: String::new(),
            arch: String::new(),
            variant: String::new(),
            depends_on: Vec::new(),
        }
    }
}

/// Identity of the CI system the build belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    pub proto: String,
    pub host: String,
    pub version: String,
}

impl Default for System {
    fn default() -> Self {
        Self {
            proto: "http".into(),
            host: "localhost".into(),
            version: crate::VERSION.into(),
        }
    }
}

impl System {
    /// Base URL of the system, e.g. `https://ci.example.com`
    pub fn link(&self) -> String {
        format!("{}://{}", self.proto, self.host)
    }
}

/// Machine/login/password triple for the netrc file
#[derive(Clone, Serialize, Deserialize)]
pub struct Netrc {
    pub machine: String,
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Netrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Netrc")
            .field("machine", &self.machine)
            .field("login", &self.login)
            .field("password", &"********")
            .finish()
    }
}
