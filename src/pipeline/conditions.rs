// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Step conditions (`when` clauses)
//!
//! Every condition is an include/exclude list of glob patterns. An empty
//! condition always matches.

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// The `when` clause of a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub action: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub branch: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub cron: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub event: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub instance: Condition,

    #[serde(rename = "ref", default, skip_serializing_if = "Condition::is_empty")]
    pub git_ref: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub repo: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub status: Condition,

    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub target: Condition,
}

/// Build metadata a `when` clause is evaluated against
#[derive(Debug, Clone, Default)]
pub struct MatchInput<'a> {
    pub action: &'a str,
    pub branch: &'a str,
    pub cron: &'a str,
    pub event: &'a str,
    pub instance: &'a str,
    pub git_ref: &'a str,
    pub repo: &'a str,
    pub target: &'a str,
}

impl Conditions {
    /// Named conditions, excluding `status` which drives the run policy
    /// instead of eligibility.
    pub fn named(&self) -> [(&'static str, &Condition); 8] {
        [
            ("action", &self.action),
            ("branch", &self.branch),
            ("cron", &self.cron),
            ("event", &self.event),
            ("instance", &self.instance),
            ("ref", &self.git_ref),
            ("repo", &self.repo),
            ("target", &self.target),
        ]
    }

    /// Evaluate every condition except `status`.
    pub fn matches(&self, input: &MatchInput<'_>) -> Result<bool, glob::PatternError> {
        let branch = input.branch.strip_prefix("refs/heads/").unwrap_or(input.branch);

        Ok(self.action.matches(input.action)?
            && self.branch.matches(branch)?
            && self.cron.matches(input.cron)?
            && self.event.matches(input.event)?
            && self.instance.matches(input.instance)?
            && self.git_ref.matches(input.git_ref)?
            && self.repo.matches(input.repo)?
            && self.target.matches(input.target)?)
    }
}

/// A single include/exclude condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCondition")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl Condition {
    /// Condition that matches any of the given patterns
    pub fn include(patterns: &[&str]) -> Self {
        Self {
            include: patterns.iter().map(|p| p.to_string()).collect(),
            exclude: Vec::new(),
        }
    }

    /// Condition that matches anything but the given patterns
    pub fn exclude(patterns: &[&str]) -> Self {
        Self {
            include: Vec::new(),
            exclude: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Excludes win over includes; an empty include list admits anything
    /// that is not excluded.
    pub fn matches(&self, value: &str) -> Result<bool, glob::PatternError> {
        if any_match(&self.exclude, value)? {
            return Ok(false);
        }
        if self.include.is_empty() {
            return Ok(true);
        }
        any_match(&self.include, value)
    }

    /// Check every pattern compiles, returning the first that does not
    pub fn validate(&self) -> Result<(), (String, glob::PatternError)> {
        for pattern in self.include.iter().chain(&self.exclude) {
            Pattern::new(pattern).map_err(|e| (pattern.clone(), e))?;
        }
        Ok(())
    }
}

fn any_match(patterns: &[String], value: &str) -> Result<bool, glob::PatternError> {
    for pattern in patterns {
        if Pattern::new(pattern)?.matches(value) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Conditions may be written as a single pattern, a list of patterns or
/// an explicit include/exclude mapping.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Single(String),
    List(Vec<String>),
    Map {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl From<RawCondition> for Condition {
    fn from(raw: RawCondition) -> Self {
        match raw {
            RawCondition::Single(p) => Self {
                include: vec![p],
                exclude: Vec::new(),
            },
            RawCondition::List(include) => Self {
                include,
                exclude: Vec::new(),
            },
            RawCondition::Map { include, exclude } => Self { include, exclude },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_condition_matches() {
        assert!(Condition::default().matches("anything").unwrap());
        assert!(Condition::default().matches("").unwrap());
    }

    #[test]
    fn test_include_and_exclude() {
        let cond = Condition {
            include: vec!["release/*".into(), "main".into()],
            exclude: vec!["release/old*".into()],
        };
        assert!(cond.matches("main").unwrap());
        assert!(cond.matches("release/1.0").unwrap());
        assert!(!cond.matches("release/old-1").unwrap());
        assert!(!cond.matches("feature/x").unwrap());

        let only_exclude = Condition::exclude(&["pull_request"]);
        assert!(only_exclude.matches("push").unwrap());
        assert!(!only_exclude.matches("pull_request").unwrap());
    }

    #[test]
    fn test_condition_shapes() {
        let yaml = r#"
branch: main
event: [push, tag]
ref:
  include: ["refs/tags/*"]
  exclude: ["refs/tags/*-rc*"]
"#;
        let when: Conditions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(when.branch, Condition::include(&["main"]));
        assert_eq!(when.event.include, vec!["push", "tag"]);
        assert_eq!(when.git_ref.exclude, vec!["refs/tags/*-rc*"]);
        assert!(when.status.is_empty());
    }

    #[test]
    fn test_branch_prefix_is_trimmed() {
        let when = Conditions {
            branch: Condition::include(&["main"]),
            ..Conditions::default()
        };
        let input = MatchInput {
            branch: "refs/heads/main",
            ..MatchInput::default()
        };
        assert!(when.matches(&input).unwrap());
    }

    #[test]
    fn test_status_is_not_an_eligibility_condition() {
        let when = Conditions {
            status: Condition::include(&["failure"]),
            ..Conditions::default()
        };
        assert!(when.matches(&MatchInput::default()).unwrap());
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let cond = Condition::include(&["[unterminated"]);
        assert!(cond.matches("x").is_err());
        let (pattern, _) = cond.validate().unwrap_err();
        assert_eq!(pattern, "[unterminated");
    }
}
