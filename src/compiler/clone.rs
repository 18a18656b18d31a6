// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Bootstrap clone commands
//!
//! Fetch only what the build needs: a branch head, a tag, or a pull
//! request merged onto its target branch.

use super::Shell;
use crate::context::{Build, Repo};
use crate::pipeline::CloneSettings;

/// Resolved clone arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneArgs {
    pub branch: String,
    pub commit: String,
    pub git_ref: String,
    pub remote: String,
    pub depth: u32,
}

impl CloneArgs {
    /// Pipeline overrides first, then build and repo metadata
    pub fn resolve(settings: &CloneSettings, build: &Build, repo: &Repo) -> Self {
        let pick = |over: &Option<String>, fallback: &str| {
            over.clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            branch: pick(&settings.branch, &build.target),
            commit: pick(&settings.commit, &build.after),
            git_ref: pick(&settings.git_ref, &build.git_ref),
            remote: pick(&settings.remote, repo.remote_url()),
            depth: settings.depth,
        }
    }
}

/// Git commands for the clone script. Every interpolated value is quoted
/// for `shell`.
pub fn commands(args: &CloneArgs, shell: Shell) -> Vec<String> {
    let q = |value: &str| shell.quote_arg(value);
    let depth = depth_flag(args.depth);

    let mut cmds = vec![
        "git init".to_string(),
        format!("git remote add origin {}", q(&args.remote)),
    ];

    if args.git_ref.starts_with("refs/tags/") {
        cmds.push(format!("git fetch{depth} origin {}", q(&format!("+{}:", args.git_ref))));
        cmds.push("git checkout -qf FETCH_HEAD".to_string());
        return cmds;
    }

    let branch = q(&args.branch);
    let heads = q(&format!("+refs/heads/{}:", args.branch));
    cmds.push(format!("git fetch{depth} origin {heads}"));

    if is_pull_request(&args.git_ref) {
        cmds.push(format!("git checkout {branch}"));
        cmds.push(format!("git fetch origin {}", q(&format!("{}:", args.git_ref))));
        cmds.push(format!("git merge {}", q(&args.commit)));
    } else if args.commit.is_empty() {
        cmds.push(format!("git checkout -b {branch} FETCH_HEAD"));
    } else {
        cmds.push(format!("git checkout {} -b {branch}", q(&args.commit)));
    }
    cmds
}

fn depth_flag(depth: u32) -> String {
    if depth > 0 {
        format!(" --depth={depth}")
    } else {
        String::new()
    }
}

fn is_pull_request(git_ref: &str) -> bool {
    ["refs/pull/", "refs/pull-requests/", "refs/merge-requests/"]
        .iter()
        .any(|prefix| git_ref.starts_with(prefix))
}
