// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle of one step. `Pending` and `Running` are transient; a step
/// ends in exactly one of the other states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
    Killed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
            Self::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// Final record of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepState {
    pub name: String,
    pub status: StepStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Failure was tolerated by `failure: ignore`
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignored: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip)]
    pub duration: Duration,
}

impl StepState {
    pub fn new(name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            name: name.into(),
            status,
            exit_code: None,
            ignored: false,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Failed, and the failure counts against the stage
    pub fn failed(&self) -> bool {
        self.status == StepStatus::Failure && !self.ignored
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
    /// Cancelled by timeout or interrupt
    Killed,
    /// The workspace could not be prepared
    Error,
}

impl StageStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Killed => "killed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of a whole stage, steps in plan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageState {
    pub status: StageStatus,
    pub steps: Vec<StepState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip)]
    pub duration: Duration,
}

impl StageState {
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self.status {
            StageStatus::Success => 0,
            StageStatus::Failure => 1,
            StageStatus::Killed => 130,
            StageStatus::Error => 2,
        }
    }

    /// `Failure` if any step failed without `failure: ignore`
    pub(crate) fn status_from_steps(steps: &[StepState]) -> StageStatus {
        if steps.iter().any(StepState::failed) {
            StageStatus::Failure
        } else {
            StageStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_failure_does_not_fail_stage() {
        let mut ignored = StepState::new("lint", StepStatus::Failure);
        ignored.ignored = true;
        let ok = StepState::new("build", StepStatus::Success);

        assert_eq!(
            StageState::status_from_steps(&[ok.clone(), ignored]),
            StageStatus::Success
        );
        assert_eq!(
            StageState::status_from_steps(&[ok, StepState::new("test", StepStatus::Failure)]),
            StageStatus::Failure
        );
    }

    #[test]
    fn test_exit_codes() {
        let state = |status| StageState {
            status,
            steps: vec![],
            error: None,
            duration: Duration::ZERO,
        };
        assert_eq!(state(StageStatus::Success).exit_code(), 0);
        assert_ne!(state(StageStatus::Failure).exit_code(), 0);
        assert_ne!(state(StageStatus::Killed).exit_code(), 0);
        assert_ne!(state(StageStatus::Error).exit_code(), 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Killed.is_terminal());
    }
}
