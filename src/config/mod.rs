// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Runner configuration
//!
//! Optional TOML file with defaults for the command line. Flags given on
//! the command line always win over the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DroverError, DroverResult};

/// File name inside the platform config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Runner configuration from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Directory build roots are created in
    pub root: Option<PathBuf>,

    /// Maximum number of concurrently running steps
    pub procs: Option<usize>,

    /// Colored, decorated output
    pub pretty: Option<bool>,

    /// Run timeout in minutes
    pub timeout: Option<u64>,

    /// Environment added to every step
    pub environ: BTreeMap<String, String>,

    /// Secrets available to `from_secret`
    pub secrets: BTreeMap<String, String>,

    pub system: SystemConfig,
}

/// `[system]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub proto: Option<String>,
    pub host: Option<String>,
    pub version: Option<String>,
}

impl RunnerConfig {
    /// Load an explicit config file; it must exist
    pub fn load(path: &Path) -> DroverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DroverError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| DroverError::Config {
            message: format!("{}: {}", path.display(), e),
            help: Some("See `drover --help` for the supported keys".into()),
        })
    }

    /// Parse config text
    pub fn from_toml(content: &str) -> DroverResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `--config` if given, otherwise the default file if it exists
    pub fn discover(explicit: Option<&Path>) -> DroverResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading runner config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> DroverResult<()> {
        if self.procs == Some(0) {
            return Err(DroverError::Config {
                message: "procs must be at least 1".into(),
                help: None,
            });
        }
        if self.timeout == Some(0) {
            return Err(DroverError::Config {
                message: "timeout must be at least 1 minute".into(),
                help: Some("Omit `timeout` to use the repository timeout".into()),
            });
        }
        Ok(())
    }
}

/// `<platform config dir>/drover/config.toml`
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "drover").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
