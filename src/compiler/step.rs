// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Step translation
//!
//! Turns declared steps into executable ones: a generated script under
//! `opt`, a shell invocation of that script, and the step environment.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::environ::{self, Environ};
use super::shell::Shell;
use super::workspace::{WorkspaceLayout, SCRIPT_MODE};
use crate::engine::{CompiledStep, File, RunPolicy, Secret, CLONE_STEP};
use crate::pipeline::DeclaredStep;

/// Translates steps of one pipeline. Tracks script names so two steps
/// never share a script file.
pub struct StepTranslator<'a> {
    layout: &'a WorkspaceLayout,
    shell: Shell,
    base: &'a Environ,
    used_slugs: HashSet<String>,
}

impl<'a> StepTranslator<'a> {
    pub fn new(layout: &'a WorkspaceLayout, shell: Shell, base: &'a Environ) -> Self {
        Self {
            layout,
            shell,
            base,
            used_slugs: HashSet::new(),
        }
    }

    /// The bootstrap clone step: always runs, no secrets
    pub fn clone_step(&mut self, commands: &[String]) -> CompiledStep {
        let slug = self.claim_slug(CLONE_STEP.to_string());
        let mut step = self.scripted(CLONE_STEP, &slug, commands);
        step.envs = self.base.clone();
        step.run_policy = RunPolicy::Always;
        step
    }

    /// A declared step with the default `OnSuccess` policy; the policy
    /// resolver corrects it afterwards.
    pub fn translate(&mut self, index: usize, src: &DeclaredStep) -> CompiledStep {
        let mut slug = slugify(&src.name);
        if slug.is_empty() {
            slug = format!("step-{index}");
        }
        let slug = self.claim_slug(slug);

        let mut step = self.scripted(&src.name, &slug, &src.commands);

        let (mut literals, secret_refs) = environ::split_step_environment(&src.environment);
        environ::expand_path(&mut literals, self.base);
        step.envs = environ::combine([self.base, &literals]);

        // a secret-backed variable must not leak an inherited literal
        for (env, _) in &secret_refs {
            step.envs.remove(env);
        }
        step.secrets = secret_refs
            .into_iter()
            .map(|(env, name)| Secret::new(name, env))
            .collect();

        step.detach = src.detach;
        step.depends_on = src.depends_on.clone();
        step.ignore_err = src.ignores_failure();
        step.run_policy = RunPolicy::OnSuccess;
        step
    }

    fn scripted<S: AsRef<str>>(&self, name: &str, slug: &str, commands: &[S]) -> CompiledStep {
        let script_path = self.layout.script(slug, self.shell.suffix());
        let (command, mut args) = self.shell.command();
        args.push(script_path.to_string_lossy().into_owned());

        CompiledStep {
            name: name.to_string(),
            command,
            args,
            working_dir: self.layout.src.clone(),
            files: vec![File::file(
                script_path,
                SCRIPT_MODE,
                self.shell.script(commands),
            )],
            ..CompiledStep::default()
        }
    }

    fn claim_slug(&mut self, slug: String) -> String {
        if self.used_slugs.insert(slug.clone()) {
            return slug;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{slug}-{n}");
            if self.used_slugs.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Lower-case, with runs of anything but letters and digits collapsed
/// into a single `-`.
pub fn slugify(name: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));
    re.replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EnvValue;
    use std::path::PathBuf;

    fn layout() -> WorkspaceLayout {
        WorkspaceLayout::new(PathBuf::from("/tmp/drover-x"))
    }

    fn base() -> Environ {
        Environ::from([
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("TOKEN".to_string(), "inherited".to_string()),
        ])
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Build & Test"), "build-test");
        assert_eq!(slugify("  deploy:prod  "), "deploy-prod");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_translate_step() {
        let layout = layout();
        let base = base();
        let mut translator = StepTranslator::new(&layout, Shell::Posix, &base);

        let mut src = DeclaredStep::new("Unit Tests", &["cargo test"]);
        src.failure = "Ignore".into();
        src.detach = true;
        src.depends_on = vec!["build".into()];
        src.environment.insert("PATH".into(), EnvValue::from("/opt/bin:$PATH"));

        let step = translator.translate(0, &src);
        assert_eq!(step.name, "Unit Tests");
        assert_eq!(step.command, "/bin/sh");
        assert_eq!(step.args, vec!["-e", "/tmp/drover-x/opt/unit-tests"]);
        assert_eq!(step.working_dir, PathBuf::from("/tmp/drover-x/src"));
        assert_eq!(step.files.len(), 1);
        assert_eq!(step.files[0].mode, 0o700);
        assert!(step.files[0].data.as_deref().unwrap().contains("cargo test"));
        assert!(step.ignore_err);
        assert!(step.detach);
        assert_eq!(step.depends_on, vec!["build"]);
        assert_eq!(step.run_policy, RunPolicy::OnSuccess);
        assert_eq!(step.envs["PATH"], "/opt/bin:/usr/bin");
    }

    #[test]
    fn test_secret_reference_is_not_a_literal() {
        let layout = layout();
        let base = base();
        let mut translator = StepTranslator::new(&layout, Shell::Posix, &base);

        let mut src = DeclaredStep::new("publish", &["./publish.sh"]);
        src.environment.insert(
            "TOKEN".into(),
            EnvValue::Secret {
                from_secret: "token".into(),
            },
        );

        let step = translator.translate(0, &src);
        assert!(!step.envs.contains_key("TOKEN"));
        assert!(!step.envs.contains_key("token"));
        assert_eq!(step.secrets.len(), 1);
        assert_eq!(step.secrets[0].name, "token");
        assert_eq!(step.secrets[0].env, "TOKEN");
        assert!(!step.secrets[0].is_resolved());
    }

    #[test]
    fn test_script_names_do_not_collide() {
        let layout = layout();
        let base = base();
        let mut translator = StepTranslator::new(&layout, Shell::Posix, &base);

        let clone = translator.clone_step(&["git init".to_string()]);
        let a = translator.translate(0, &DeclaredStep::new("Clone", &["true"]));
        let b = translator.translate(1, &DeclaredStep::new("!!!", &["true"]));

        assert_eq!(clone.args[1], "/tmp/drover-x/opt/clone");
        assert_eq!(clone.run_policy, RunPolicy::Always);
        assert_eq!(a.args[1], "/tmp/drover-x/opt/clone-2");
        assert_eq!(b.args[1], "/tmp/drover-x/opt/step-1");
    }

    #[test]
    fn test_powershell_script_path() {
        let layout = layout();
        let base = base();
        let mut translator = StepTranslator::new(&layout, Shell::PowerShell, &base);

        let step = translator.translate(0, &DeclaredStep::new("build", &["dotnet build"]));
        assert_eq!(step.command, "powershell");
        assert!(step.args.last().unwrap().ends_with("build.ps1"));
    }
}
