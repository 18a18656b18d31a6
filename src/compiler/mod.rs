// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Pipeline compiler
//!
//! Turns a [`PipelineDefinition`] and a [`BuildContext`] into a
//! [`CompiledSpec`]: workspace layout, environment, one scripted step per
//! declared step (plus the clone step), run policies, dependency edges and
//! resolved secrets. Compilation touches no files.

pub mod clone;
pub mod environ;
pub mod graph;
pub mod policy;
pub mod secrets;
pub mod shell;
pub mod step;
pub mod workspace;

pub use environ::Environ;
pub use graph::GraphMode;
pub use shell::Shell;
pub use workspace::{RootStrategy, WorkspaceLayout};

use std::collections::HashSet;

use crate::context::BuildContext;
use crate::engine::{CompiledSpec, CLONE_STEP};
use crate::errors::{DroverError, DroverResult};
use crate::pipeline::{MatchInput, PipelineDefinition};
use crate::secret::SecretProvider;
use step::StepTranslator;

/// Compiles one pipeline for one build
pub struct Compiler<'a> {
    pipeline: &'a PipelineDefinition,
    context: &'a BuildContext,
    secrets: &'a dyn SecretProvider,
    root: RootStrategy,
}

impl<'a> Compiler<'a> {
    pub fn new(
        pipeline: &'a PipelineDefinition,
        context: &'a BuildContext,
        secrets: &'a dyn SecretProvider,
    ) -> Self {
        Self {
            pipeline,
            context,
            secrets,
            root: RootStrategy::default(),
        }
    }

    /// Replace the random suffix and tempdir sources
    pub fn with_root_strategy(mut self, root: RootStrategy) -> Self {
        self.root = root;
        self
    }

    /// Compile the pipeline. Configuration errors abort with no partial
    /// plan; secret lookup failures only leave secrets unresolved.
    pub async fn compile(&self) -> DroverResult<CompiledSpec> {
        let pipeline = self.pipeline;
        let ctx = self.context;

        let clone_enabled = !pipeline.clone.disable;
        check_step_names(pipeline, clone_enabled)?;
        check_secret_references(pipeline)?;

        let layout = WorkspaceLayout::new(self.root.resolve(ctx.root.as_deref())?);
        tracing::debug!(
            root = %layout.root.display(),
            pipeline = %pipeline.name,
            "compiling pipeline"
        );

        let shell = Shell::for_platform(&pipeline.platform);
        let base = self.base_environ(&layout);

        let mut files = layout.directories();
        files.extend(layout.netrc(ctx.netrc.as_ref(), pipeline.platform.is_windows()));
        let links = layout.links(&ctx.symlinks);

        let mut translator = StepTranslator::new(&layout, shell, &base);
        let mut steps = Vec::with_capacity(pipeline.steps.len() + 1);

        if clone_enabled {
            let args = clone::CloneArgs::resolve(&pipeline.clone, &ctx.build, &ctx.repo);
            steps.push(translator.clone_step(&clone::commands(&args, shell)));
        }

        let input = self.match_input();
        for (index, declared) in pipeline.steps.iter().enumerate() {
            let mut compiled = translator.translate(index, declared);
            compiled.run_policy = policy::resolve(declared, &input)?;
            steps.push(compiled);
        }

        let mode = graph::configure(&mut steps, clone_enabled)?;
        tracing::debug!(?mode, steps = steps.len(), "dependencies configured");

        secrets::resolve(&mut steps, self.secrets, &ctx.build, &ctx.repo, pipeline).await;

        Ok(CompiledSpec {
            root: layout.root.clone(),
            platform: pipeline.platform.clone(),
            files,
            links,
            steps,
        })
    }

    /// Base environment shared by every step, lowest precedence first
    pub fn base_environ(&self, layout: &WorkspaceLayout) -> Environ {
        let ctx = self.context;
        environ::combine([
            &ctx.host_environ,
            &ctx.environ,
            &ctx.build.params,
            &environ::proxy(&ctx.host_environ),
            &environ::system(&ctx.system),
            &environ::repo(&ctx.repo),
            &environ::build(&ctx.build),
            &environ::stage(&ctx.stage),
            &environ::link(&ctx.repo, &ctx.build, &ctx.system),
            &environ::clone(&self.pipeline.clone, &ctx.build),
            &environ::netrc(ctx.netrc.as_ref()),
            &environ::workspace(layout),
        ])
    }

    /// Values `when` clauses are matched against
    pub fn match_input(&self) -> MatchInput<'a> {
        let ctx = self.context;
        MatchInput {
            action: &ctx.build.action,
            branch: &ctx.build.target,
            cron: &ctx.build.cron,
            event: &ctx.build.event,
            instance: &ctx.system.host,
            git_ref: &ctx.build.git_ref,
            repo: &ctx.repo.slug,
            target: &ctx.build.deploy_to,
        }
    }
}

/// Step names must be unique, and cannot shadow the clone step
fn check_step_names(pipeline: &PipelineDefinition, clone_enabled: bool) -> DroverResult<()> {
    let mut seen = HashSet::new();
    for step in &pipeline.steps {
        if step.name.is_empty() {
            return Err(DroverError::InvalidPipeline {
                reason: "a step has no name".into(),
                help: Some("give every step a unique `name`".into()),
            });
        }
        if clone_enabled && step.name == CLONE_STEP {
            return Err(DroverError::InvalidPipeline {
                reason: format!("step name '{CLONE_STEP}' is reserved for the clone step"),
                help: Some("rename the step, or set `clone: {disable: true}`".into()),
            });
        }
        if !seen.insert(step.name.as_str()) {
            return Err(DroverError::InvalidPipeline {
                reason: format!("duplicate step name '{}'", step.name),
                help: Some("step names are used as dependency targets and must be unique".into()),
            });
        }
    }
    Ok(())
}

/// `from_secret` must name a secret
fn check_secret_references(pipeline: &PipelineDefinition) -> DroverResult<()> {
    for step in &pipeline.steps {
        for (env, value) in &step.environment {
            if value.secret_name().is_some_and(|name| name.trim().is_empty()) {
                return Err(DroverError::InvalidPipeline {
                    reason: format!("step '{}': `{env}` has an empty `from_secret`", step.name),
                    help: Some("set `from_secret` to the name of a secret".into()),
                });
            }
        }
    }
    Ok(())
}
