// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Environment composition
//!
//! Each generator returns one layer; [`combine`] merges layers so that
//! later layers override earlier ones.

use regex::{Captures, NoExpand, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::workspace::WorkspaceLayout;
use crate::context::{Build, Netrc, Repo, Stage, System};
use crate::pipeline::{CloneSettings, EnvValue};

pub type Environ = BTreeMap<String, String>;

/// Workspace variable names exported to every step
pub const ENV_ROOT: &str = "DROVER_ROOT";
pub const ENV_HOME: &str = "DROVER_HOME";
pub const ENV_OPT: &str = "DROVER_OPT";
pub const ENV_WORKSPACE: &str = "DROVER_WORKSPACE";

/// Merge layers, later layers win
pub fn combine<'a>(layers: impl IntoIterator<Item = &'a Environ>) -> Environ {
    let mut merged = Environ::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Proxy settings from the host, exported in both cases
pub fn proxy(host: &Environ) -> Environ {
    let mut env = Environ::new();
    for name in ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"] {
        let value = host
            .get(name)
            .or_else(|| host.get(&name.to_lowercase()))
            .filter(|v| !v.is_empty());
        if let Some(value) = value {
            env.insert(name.to_string(), value.clone());
            env.insert(name.to_lowercase(), value.clone());
        }
    }
    env
}

pub fn system(system: &System) -> Environ {
    layer([
        ("CI", "true".to_string()),
        ("DROVER", "true".to_string()),
        ("DROVER_SYSTEM_PROTO", system.proto.clone()),
        ("DROVER_SYSTEM_HOST", system.host.clone()),
        ("DROVER_SYSTEM_HOSTNAME", system.host.clone()),
        ("DROVER_SYSTEM_VERSION", system.version.clone()),
    ])
}

pub fn repo(repo: &Repo) -> Environ {
    layer([
        ("DROVER_REPO", repo.slug.clone()),
        ("DROVER_REPO_SCM", repo.scm.clone()),
        ("DROVER_REPO_OWNER", repo.namespace.clone()),
        ("DROVER_REPO_NAMESPACE", repo.namespace.clone()),
        ("DROVER_REPO_NAME", repo.name.clone()),
        ("DROVER_REPO_LINK", repo.link.clone()),
        ("DROVER_REPO_BRANCH", repo.branch.clone()),
        ("DROVER_REPO_PRIVATE", repo.private.to_string()),
        ("DROVER_REPO_VISIBILITY", repo.visibility.clone()),
        ("DROVER_REMOTE_URL", repo.remote_url().to_string()),
        ("DROVER_GIT_HTTP_URL", repo.http_url.clone()),
        ("DROVER_GIT_SSH_URL", repo.ssh_url.clone()),
    ])
}

pub fn build(build: &Build) -> Environ {
    let mut env = layer([
        ("DROVER_BRANCH", build.target.clone()),
        ("DROVER_SOURCE_BRANCH", build.source.clone()),
        ("DROVER_TARGET_BRANCH", build.target.clone()),
        ("DROVER_COMMIT", build.after.clone()),
        ("DROVER_COMMIT_SHA", build.after.clone()),
        ("DROVER_COMMIT_BEFORE", build.before.clone()),
        ("DROVER_COMMIT_AFTER", build.after.clone()),
        ("DROVER_COMMIT_REF", build.git_ref.clone()),
        ("DROVER_COMMIT_BRANCH", build.target.clone()),
        ("DROVER_COMMIT_MESSAGE", build.message.clone()),
        ("DROVER_COMMIT_AUTHOR", build.author_login.clone()),
        ("DROVER_COMMIT_AUTHOR_NAME", build.author_name.clone()),
        ("DROVER_COMMIT_AUTHOR_EMAIL", build.author_email.clone()),
        ("DROVER_COMMIT_AUTHOR_AVATAR", build.author_avatar.clone()),
        ("DROVER_BUILD_NUMBER", build.number.to_string()),
        ("DROVER_BUILD_EVENT", build.event.clone()),
        ("DROVER_BUILD_ACTION", build.action.clone()),
        ("DROVER_BUILD_CREATED", build.created.to_string()),
        ("DROVER_BUILD_STARTED", build.started.to_string()),
        ("DROVER_DEPLOY_TO", build.deploy_to.clone()),
    ]);

    if let Some(tag) = build.git_ref.strip_prefix("refs/tags/") {
        env.insert("DROVER_TAG".into(), tag.to_string());
    }
    if let Some(number) = pull_request_number(&build.git_ref) {
        env.insert("DROVER_PULL_REQUEST".into(), number.to_string());
    }
    if !build.cron.is_empty() {
        env.insert("DROVER_CRON".into(), build.cron.clone());
    }

    env
}

pub fn stage(stage: &Stage) -> Environ {
    layer([
        ("DROVER_STAGE_KIND", stage.kind.clone()),
        ("DROVER_STAGE_TYPE", stage.stage_type.clone()),
        ("DROVER_STAGE_NAME", stage.name.clone()),
        ("DROVER_STAGE_NUMBER", stage.number.to_string()),
        ("DROVER_STAGE_MACHINE", stage.machine.clone()),
        ("DROVER_STAGE_OS", stage.os.clone()),
        ("DROVER_STAGE_ARCH", stage.arch.clone()),
        ("DROVER_STAGE_VARIANT", stage.variant.clone()),
        ("DROVER_STAGE_DEPENDS_ON", stage.depends_on.join(",")),
    ])
}

/// Links back to the CI system. An explicit build link wins.
pub fn link(repo: &Repo, build: &Build, system: &System) -> Environ {
    let build_link = if build.link.is_empty() {
        format!("{}/{}/{}", system.link(), repo.slug, build.number)
    } else {
        build.link.clone()
    };

    let commit_link = if repo.link.is_empty() || build.after.is_empty() {
        String::new()
    } else {
        format!("{}/commit/{}", repo.link, build.after)
    };

    layer([
        ("DROVER_BUILD_LINK", build_link),
        ("DROVER_COMMIT_LINK", commit_link),
    ])
}

/// Git identity and transport settings for the clone step
pub fn clone(settings: &CloneSettings, build: &Build) -> Environ {
    let name = non_empty(&build.author_name, "drover");
    let email = non_empty(&build.author_email, "drover@localhost");

    let mut env = layer([
        ("GIT_AUTHOR_NAME", name.to_string()),
        ("GIT_AUTHOR_EMAIL", email.to_string()),
        ("GIT_COMMITTER_NAME", name.to_string()),
        ("GIT_COMMITTER_EMAIL", email.to_string()),
        ("GIT_TERMINAL_PROMPT", "0".to_string()),
    ]);

    if settings.trace {
        env.insert("GIT_TRACE".into(), "true".into());
    }
    if settings.skip_verify {
        env.insert("GIT_SSL_NO_VERIFY".into(), "true".into());
    }

    env
}

/// Netrc machine and login for tools that do not read the netrc file.
/// The password is only ever written to the file.
pub fn netrc(netrc: Option<&Netrc>) -> Environ {
    match netrc {
        Some(n) => layer([
            ("DROVER_NETRC_MACHINE", n.machine.clone()),
            ("DROVER_NETRC_USERNAME", n.login.clone()),
        ]),
        None => Environ::new(),
    }
}

/// Workspace locations, highest precedence of the base layers
pub fn workspace(layout: &WorkspaceLayout) -> Environ {
    let path = |p: &std::path::Path| p.to_string_lossy().into_owned();
    layer([
        (ENV_WORKSPACE, path(&layout.src)),
        (ENV_HOME, path(&layout.home)),
        (ENV_OPT, path(&layout.opt)),
        (ENV_ROOT, path(&layout.root)),
    ])
}

/// Split a step environment into literal values and secret references
/// (env name -> secret name).
pub fn split_step_environment(
    environment: &BTreeMap<String, EnvValue>,
) -> (Environ, Vec<(String, String)>) {
    let mut literals = Environ::new();
    let mut secrets = Vec::new();

    for (key, value) in environment {
        match value {
            EnvValue::Literal(v) => {
                literals.insert(key.clone(), v.clone());
            }
            EnvValue::Secret { from_secret } => {
                secrets.push((key.clone(), from_secret.clone()));
            }
        }
    }

    (literals, secrets)
}

/// Expand `$PATH` and `${PATH}` inside a step's `PATH` value against the
/// base environment, so steps can prepend to the inherited search path.
pub fn expand_path(step: &mut Environ, base: &Environ) {
    let Some(path) = step.get("PATH") else {
        return;
    };
    let inherited = base.get("PATH").map(String::as_str).unwrap_or_default();
    let expanded = path_reference().replace_all(path, NoExpand(inherited)).into_owned();
    step.insert("PATH".into(), expanded);
}

/// Quote a value containing a newline so it stays one token when
/// substituted into a script or manifest.
pub fn quote(value: &str) -> String {
    if !value.contains('\n') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Replace `${NAME}` references using `lookup`; `$${` escapes a literal
/// `${`. Unknown names are left untouched. Substituted values are quoted
/// with [`quote`].
pub fn substitute(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    variable_reference()
        .replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return "${".to_string();
            }
            let name = &caps[2];
            match lookup(name) {
                Some(value) => quote(&value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn path_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{PATH\}|\$PATH\b").expect("valid PATH pattern"))
}

fn variable_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\$\$\{)|\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid variable pattern")
    })
}

fn pull_request_number(git_ref: &str) -> Option<&str> {
    ["refs/pull/", "refs/pull-requests/", "refs/merge-requests/"]
        .iter()
        .find_map(|prefix| git_ref.strip_prefix(prefix))
        .and_then(|rest| rest.split('/').next())
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn layer<const N: usize>(pairs: [(&str, String); N]) -> Environ {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environ {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_later_layer_wins() {
        let host = env(&[("FOO", "a"), ("HOST_ONLY", "1")]);
        let defaults = env(&[("FOO", "b")]);

        let merged = combine([&host, &defaults]);
        assert_eq!(merged["FOO"], "b");
        assert_eq!(merged["HOST_ONLY"], "1");
    }

    #[test]
    fn test_proxy_exports_both_cases() {
        let host = env(&[("https_proxy", "http://proxy:3128"), ("NO_PROXY", "")]);
        let proxy = proxy(&host);
        assert_eq!(proxy["HTTPS_PROXY"], "http://proxy:3128");
        assert_eq!(proxy["https_proxy"], "http://proxy:3128");
        assert!(!proxy.contains_key("NO_PROXY"));
    }

    #[test]
    fn test_build_tag_and_pull_request() {
        let tag = Build {
            git_ref: "refs/tags/v1.2.0".into(),
            ..Build::default()
        };
        assert_eq!(build(&tag)["DROVER_TAG"], "v1.2.0");

        let pr = Build {
            git_ref: "refs/pull/42/head".into(),
            ..Build::default()
        };
        let env = build(&pr);
        assert_eq!(env["DROVER_PULL_REQUEST"], "42");
        assert!(!env.contains_key("DROVER_TAG"));
    }

    #[test]
    fn test_link_defaults_to_system_url() {
        let repo = Repo {
            slug: "acme/app".into(),
            ..Repo::default()
        };
        let build = Build {
            number: 7,
            ..Build::default()
        };
        let env = link(&repo, &build, &System::default());
        assert_eq!(env["DROVER_BUILD_LINK"], "http://localhost/acme/app/7");
    }

    #[test]
    fn test_clone_identity_defaults() {
        let env = clone(&CloneSettings::default(), &Build::default());
        assert_eq!(env["GIT_AUTHOR_NAME"], "drover");
        assert!(!env.contains_key("GIT_SSL_NO_VERIFY"));

        let settings = CloneSettings {
            skip_verify: true,
            trace: true,
            ..CloneSettings::default()
        };
        let env = clone(&settings, &Build::default());
        assert_eq!(env["GIT_SSL_NO_VERIFY"], "true");
        assert_eq!(env["GIT_TRACE"], "true");
    }

    #[test]
    fn test_split_step_environment() {
        let environment = BTreeMap::from([
            ("TARGET".to_string(), EnvValue::from("prod")),
            (
                "TOKEN".to_string(),
                EnvValue::Secret {
                    from_secret: "token".into(),
                },
            ),
        ]);

        let (literals, secrets) = split_step_environment(&environment);
        assert_eq!(literals, env(&[("TARGET", "prod")]));
        assert_eq!(secrets, vec![("TOKEN".to_string(), "token".to_string())]);
    }

    #[test]
    fn test_expand_path() {
        let base = env(&[("PATH", "/usr/bin")]);
        let mut step = env(&[("PATH", "/opt/tools/bin:$PATH:${PATH}")]);
        expand_path(&mut step, &base);
        assert_eq!(step["PATH"], "/opt/tools/bin:/usr/bin:/usr/bin");

        let mut no_path = env(&[("FOO", "$PATH")]);
        expand_path(&mut no_path, &base);
        assert_eq!(no_path["FOO"], "$PATH");
    }

    #[test]
    fn test_quote_multiline_values() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("line1\nline2"), "\"line1\\nline2\"");
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn test_substitute() {
        let vars = env(&[("NAME", "world"), ("CERT", "a\nb")]);
        let lookup = |k: &str| vars.get(k).cloned();

        assert_eq!(substitute("hello ${NAME}", lookup), "hello world");
        assert_eq!(substitute("cert: ${CERT}", lookup), "cert: \"a\\nb\"");
        assert_eq!(substitute("keep ${UNKNOWN}", lookup), "keep ${UNKNOWN}");
        assert_eq!(substitute("escaped $${NAME}", lookup), "escaped ${NAME}");
        assert_eq!(substitute("plain $NAME", lookup), "plain $NAME");
    }
}
