// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Flags shared by `compile` and `exec`
//!
//! They describe the build being simulated: repository, commit, stage
//! and the CI system. Anything not given keeps the defaults of
//! [`BuildContext`].

use clap::Args;
use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::compiler::environ;
use crate::config::RunnerConfig;
use crate::context::{Build, BuildContext, Netrc, Repo, Stage, System};
use crate::pipeline::{Manifest, PipelineDefinition};
use crate::secret::{CombinedSecrets, StaticSecrets};

/// Manifest location and build description
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Directory the build root is created in (default: temp directory)
    #[clap(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Manifest file
    #[clap(value_name = "SOURCE", default_value = ".drover.yml")]
    pub source: PathBuf,

    /// Pipeline to run (may be omitted when the manifest has only one)
    #[clap(long, value_name = "NAME", default_value = "")]
    pub stage_name: String,

    #[clap(long, default_value_t = 1)]
    pub stage_number: u32,

    /// Environment for every step, also used for ${NAME} substitution
    #[clap(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub environ: Vec<(String, String)>,

    /// Secret available to `from_secret`
    #[clap(long = "secret", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub secrets: Vec<(String, String)>,

    #[clap(flatten)]
    pub netrc: NetrcArgs,

    #[clap(flatten)]
    pub repo: RepoArgs,

    #[clap(flatten)]
    pub build: BuildArgs,

    /// Hostname of the CI system
    #[clap(long, value_name = "HOST")]
    pub system_host: Option<String>,

    #[clap(long, value_name = "PROTO")]
    pub system_proto: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NetrcArgs {
    #[clap(long, value_name = "MACHINE")]
    pub netrc_machine: Option<String>,

    #[clap(long, value_name = "LOGIN")]
    pub netrc_username: Option<String>,

    #[clap(long, value_name = "PASSWORD")]
    pub netrc_password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RepoArgs {
    /// Repository slug, `namespace/name`
    #[clap(long, value_name = "SLUG")]
    pub repo_slug: Option<String>,

    #[clap(long, value_name = "URL")]
    pub repo_http: Option<String>,

    #[clap(long, value_name = "URL")]
    pub repo_ssh: Option<String>,

    #[clap(long, value_name = "URL")]
    pub repo_link: Option<String>,

    /// Default branch
    #[clap(long, value_name = "BRANCH")]
    pub repo_branch: Option<String>,

    #[clap(long, value_name = "VISIBILITY")]
    pub repo_visibility: Option<String>,

    #[clap(long)]
    pub repo_private: bool,

    /// Run timeout in minutes
    #[clap(long, value_name = "MINUTES")]
    pub repo_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[clap(long, value_name = "N")]
    pub build_number: Option<u64>,

    #[clap(long, value_name = "EVENT", default_value = "push")]
    pub build_event: String,

    #[clap(long, value_name = "ACTION")]
    pub build_action: Option<String>,

    #[clap(long, value_name = "JOB")]
    pub build_cron: Option<String>,

    /// Git reference, e.g. refs/heads/main
    #[clap(long, value_name = "REF")]
    pub build_ref: Option<String>,

    #[clap(long, value_name = "BRANCH")]
    pub build_source: Option<String>,

    /// Target branch; `when.branch` matches against it
    #[clap(long, value_name = "BRANCH")]
    pub build_target: Option<String>,

    /// Deployment target; `when.target` matches against it
    #[clap(long, value_name = "ENV")]
    pub build_deploy_to: Option<String>,

    #[clap(long, value_name = "SHA")]
    pub build_before: Option<String>,

    #[clap(long, value_name = "SHA")]
    pub build_after: Option<String>,

    #[clap(long, value_name = "TEXT")]
    pub build_message: Option<String>,

    #[clap(long, value_name = "NAME")]
    pub build_author_name: Option<String>,

    #[clap(long, value_name = "EMAIL")]
    pub build_author_email: Option<String>,

    /// Build parameter exported to every step
    #[clap(long = "build-param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub build_params: Vec<(String, String)>,
}

impl PipelineArgs {
    /// Step environment from the config file overlaid with `--env`
    pub fn environ(&self, config: &RunnerConfig) -> BTreeMap<String, String> {
        let mut env = config.environ.clone();
        env.extend(self.environ.iter().cloned());
        env
    }

    /// Run timeout: `--repo-timeout`, then the config file, then the
    /// repository default
    pub fn timeout_minutes(&self, config: &RunnerConfig) -> u64 {
        self.repo
            .repo_timeout
            .or(config.timeout)
            .unwrap_or_else(|| Repo::default().timeout)
    }

    /// `--secret` values, then the config file's secrets
    pub fn secret_provider(&self, config: &RunnerConfig) -> CombinedSecrets {
        CombinedSecrets::new()
            .with(StaticSecrets::new(self.secrets.iter().cloned().collect()))
            .with(StaticSecrets::new(config.secrets.clone()))
    }

    /// Read the manifest, substitute `${NAME}` from the environment and
    /// select the pipeline
    pub fn load_pipeline(&self, config: &RunnerConfig) -> Result<PipelineDefinition> {
        let raw = Manifest::read(&self.source)?;
        let env = self.environ(config);
        let source = environ::substitute(&raw, |name| env.get(name).cloned());
        let manifest = Manifest::from_yaml(&source)?;
        Ok(manifest.lookup(&self.stage_name)?.clone())
    }

    /// Build context for compiling `pipeline`
    pub fn context(&self, config: &RunnerConfig, pipeline: &PipelineDefinition) -> BuildContext {
        let netrc = match (&self.netrc.netrc_machine, &self.netrc.netrc_username) {
            (Some(machine), Some(login)) => Some(Netrc {
                machine: machine.clone(),
                login: login.clone(),
                password: self.netrc.netrc_password.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        BuildContext {
            build: self.build.to_build(),
            repo: self.repo.to_repo(),
            stage: Stage {
                name: pipeline.name.clone(),
                number: self.stage_number,
                os: pipeline.platform.os.clone(),
                arch: pipeline.platform.arch.clone(),
                variant: pipeline.platform.variant.clone(),
                depends_on: pipeline.depends_on.clone(),
                ..Stage::default()
            },
            system: self.system(config),
            netrc,
            environ: self.environ(config),
            root: self.root.clone().or_else(|| config.root.clone()),
            ..BuildContext::default()
        }
        .with_host_environ()
    }

    fn system(&self, config: &RunnerConfig) -> System {
        let defaults = System::default();
        System {
            proto: self
                .system_proto
                .clone()
                .or_else(|| config.system.proto.clone())
                .unwrap_or(defaults.proto),
            host: self
                .system_host
                .clone()
                .or_else(|| config.system.host.clone())
                .unwrap_or(defaults.host),
            version: config.system.version.clone().unwrap_or(defaults.version),
        }
    }
}

impl RepoArgs {
    fn to_repo(&self) -> Repo {
        let defaults = Repo::default();
        let slug = self.repo_slug.clone().unwrap_or_default();
        let (namespace, name) = slug
            .split_once('/')
            .map(|(ns, n)| (ns.to_string(), n.to_string()))
            .unwrap_or_else(|| (String::new(), slug.clone()));

        Repo {
            slug,
            namespace,
            name,
            http_url: self.repo_http.clone().unwrap_or_default(),
            ssh_url: self.repo_ssh.clone().unwrap_or_default(),
            link: self.repo_link.clone().unwrap_or_default(),
            branch: self.repo_branch.clone().unwrap_or(defaults.branch),
            visibility: self.repo_visibility.clone().unwrap_or(defaults.visibility),
            private: self.repo_private,
            timeout: self.repo_timeout.unwrap_or(defaults.timeout),
            ..defaults
        }
    }
}

impl BuildArgs {
    fn to_build(&self) -> Build {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let target = self.build_target.clone().unwrap_or_default();
        let git_ref = match (&self.build_ref, target.is_empty()) {
            (Some(git_ref), _) => git_ref.clone(),
            (None, true) => String::new(),
            (None, false) => format!("refs/heads/{target}"),
        };

        Build {
            number: self.build_number.unwrap_or(1),
            event: self.build_event.clone(),
            action: self.build_action.clone().unwrap_or_default(),
            cron: self.build_cron.clone().unwrap_or_default(),
            git_ref,
            source: self.build_source.clone().unwrap_or_else(|| target.clone()),
            target,
            deploy_to: self.build_deploy_to.clone().unwrap_or_default(),
            before: self.build_before.clone().unwrap_or_default(),
            after: self.build_after.clone().unwrap_or_default(),
            message: self.build_message.clone().unwrap_or_default(),
            author_name: self.build_author_name.clone().unwrap_or_default(),
            author_email: self.build_author_email.clone().unwrap_or_default(),
            created: now,
            started: now,
            params: self.build_params.iter().cloned().collect(),
            ..Build::default()
        }
    }
}

/// `KEY=VALUE`; the value may be empty or contain `=`
pub fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
