// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Workspace planning
//!
//! Decides where the build root lives and which directories, files and
//! links must exist before the first step runs. Nothing here touches the
//! filesystem; the executor materializes the plan.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::Netrc;
use crate::engine::{File, Link};
use crate::errors::{DroverError, DroverResult};

/// Owner-only directory permissions
pub const DIR_MODE: u32 = 0o700;
/// Owner-only executable script permissions
pub const SCRIPT_MODE: u32 = 0o700;
/// Owner read/write for credential files
pub const NETRC_MODE: u32 = 0o600;

const ROOT_PREFIX: &str = "drover-";
const SUFFIX_LEN: usize = 16;

/// Sources of the non-deterministic parts of the root path
#[derive(Clone)]
pub struct RootStrategy {
    suffix: Arc<dyn Fn() -> String + Send + Sync>,
    tempdir: Arc<dyn Fn() -> PathBuf + Send + Sync>,
}

impl Default for RootStrategy {
    fn default() -> Self {
        Self {
            suffix: Arc::new(random_suffix),
            tempdir: Arc::new(std::env::temp_dir),
        }
    }
}

impl std::fmt::Debug for RootStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootStrategy").finish_non_exhaustive()
    }
}

impl RootStrategy {
    /// Custom suffix and tempdir sources
    pub fn new(
        suffix: impl Fn() -> String + Send + Sync + 'static,
        tempdir: impl Fn() -> PathBuf + Send + Sync + 'static,
    ) -> Self {
        Self {
            suffix: Arc::new(suffix),
            tempdir: Arc::new(tempdir),
        }
    }

    /// Always the same suffix and tempdir, for reproducible plans
    pub fn fixed(suffix: &str, tempdir: impl Into<PathBuf>) -> Self {
        let suffix = suffix.to_string();
        let tempdir = tempdir.into();
        Self::new(move || suffix.clone(), move || tempdir.clone())
    }

    /// `<base>/drover-<suffix>` made absolute, where base is the override
    /// or the temp directory.
    pub fn resolve(&self, base: Option<&Path>) -> DroverResult<PathBuf> {
        let base = match base {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => (self.tempdir)(),
        };
        let root = base.join(format!("{ROOT_PREFIX}{}", (self.suffix)()));

        std::path::absolute(&root).map_err(|e| DroverError::WorkspaceRoot {
            message: format!("{}: {}", root.display(), e),
        })
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

/// The standard directories under the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
    pub home: PathBuf,
    pub src: PathBuf,
    pub opt: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: PathBuf) -> Self {
        Self {
            home: root.join("home"),
            src: root.join("src"),
            opt: root.join("opt"),
            root,
        }
    }

    /// Path of a generated script in `opt`
    pub fn script(&self, slug: &str, suffix: &str) -> PathBuf {
        self.opt.join(format!("{slug}{suffix}"))
    }

    /// Directories to create, in creation order
    pub fn directories(&self) -> Vec<File> {
        vec![
            File::dir(self.home.clone(), DIR_MODE),
            File::dir(self.src.clone(), DIR_MODE),
            File::dir(self.opt.clone(), DIR_MODE),
        ]
    }

    /// Credential file in the home directory, if credentials were given
    pub fn netrc(&self, netrc: Option<&Netrc>, windows: bool) -> Option<File> {
        let netrc = netrc?;
        let name = if windows { "_netrc" } else { ".netrc" };
        let data = format!(
            "machine {} login {} password {}",
            netrc.machine, netrc.login, netrc.password
        );
        Some(File::file(self.home.join(name), NETRC_MODE, data))
    }

    /// Links from each source to a target rooted under the workspace
    pub fn links(&self, symlinks: &BTreeMap<PathBuf, PathBuf>) -> Vec<Link> {
        symlinks
            .iter()
            .map(|(source, target)| Link {
                source: source.clone(),
                target: self.root.join(target.strip_prefix("/").unwrap_or(target)),
            })
            .collect()
    }
}
