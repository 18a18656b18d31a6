// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Step engines
//!
//! An [`Engine`] materialises the workspace of a plan and runs single
//! steps. The scheduler decides when; the engine only decides how.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::output::LogSink;
use crate::engine::{CompiledSpec, CompiledStep, File};
use crate::errors::{DroverError, DroverResult};

/// Runs the steps of a compiled plan
#[async_trait]
pub trait Engine: Send + Sync {
    /// Create the files, directories and links of the plan
    async fn setup(&self, spec: &CompiledSpec) -> DroverResult<()>;

    /// Run one step to completion and return its exit code. Dropping the
    /// returned future stops the step.
    async fn run(
        &self,
        spec: &CompiledSpec,
        step: &CompiledStep,
        output: Arc<dyn LogSink>,
    ) -> DroverResult<i32>;

    /// Remove everything `setup` created
    async fn destroy(&self, spec: &CompiledSpec) -> DroverResult<()>;
}

/// Runs steps as host processes
#[derive(Debug, Clone, Default)]
pub struct LocalEngine;

impl LocalEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Engine for LocalEngine {
    async fn setup(&self, spec: &CompiledSpec) -> DroverResult<()> {
        tracing::debug!(root = %spec.root.display(), "creating workspace");

        create_dir(&spec.root, 0o700).await?;
        for file in &spec.files {
            write_file(file).await?;
        }
        for link in &spec.links {
            symlink(&link.source, &link.target).await.map_err(|e| DroverError::SetupFailed {
                path: link.target.clone(),
                error: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn run(
        &self,
        _spec: &CompiledSpec,
        step: &CompiledStep,
        output: Arc<dyn LogSink>,
    ) -> DroverResult<i32> {
        for file in &step.files {
            write_file(file).await?;
        }

        let program = which::which(&step.command).map_err(|_| DroverError::ShellNotFound {
            shell: step.command.clone(),
        })?;

        let secrets = step
            .secrets
            .iter()
            .filter(|s| s.is_resolved())
            .map(|s| (s.env.clone(), s.value()));

        let mut cmd = Command::new(program);
        cmd.args(&step.args)
            .current_dir(&step.working_dir)
            .env_clear()
            .envs(&step.envs)
            .envs(secrets)
            .stdin(Stdio::null())
            .stdout(if step.ignore_stdout { Stdio::null() } else { Stdio::piped() })
            .stderr(if step.ignore_stderr { Stdio::null() } else { Stdio::piped() })
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| DroverError::StepStartFailed {
            step: step.name.clone(),
            error: e.to_string(),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, _) = tokio::join!(
            child.wait(),
            forward(stdout, &step.name, output.as_ref()),
            forward(stderr, &step.name, output.as_ref()),
        );

        let status = status.map_err(|e| DroverError::ExecutionFailed {
            message: format!("waiting for step '{}': {}", step.name, e),
            help: None,
        })?;

        // terminated by a signal
        Ok(status.code().unwrap_or(-1))
    }

    async fn destroy(&self, spec: &CompiledSpec) -> DroverResult<()> {
        tracing::debug!(root = %spec.root.display(), "removing workspace");
        match tokio::fs::remove_dir_all(&spec.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn forward<R>(reader: Option<R>, step: &str, output: &dyn LogSink)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => output.line(step, &line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(step, error = %e, "stopped reading step output");
                break;
            }
        }
    }
}

async fn create_dir(path: &Path, mode: u32) -> DroverResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| setup_error(path, e))?;
    set_mode(path, mode).await
}

async fn write_file(file: &File) -> DroverResult<()> {
    if file.is_dir {
        return create_dir(&file.path, file.mode).await;
    }
    if let Some(parent) = file.path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| setup_error(parent, e))?;
    }
    tokio::fs::write(&file.path, file.data.as_deref().unwrap_or_default())
        .await
        .map_err(|e| setup_error(&file.path, e))?;
    set_mode(&file.path, file.mode).await
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> DroverResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| setup_error(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> DroverResult<()> {
    Ok(())
}

#[cfg(unix)]
async fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::symlink(source, target).await
}

#[cfg(windows)]
async fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::metadata(source).await.map(|m| m.is_dir()).unwrap_or(false) {
        tokio::fs::symlink_dir(source, target).await
    } else {
        tokio::fs::symlink_file(source, target).await
    }
}

fn setup_error(path: &Path, e: std::io::Error) -> DroverError {
    DroverError::SetupFailed {
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}
