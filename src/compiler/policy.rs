// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Run policy resolution
//!
//! A step's policy comes from its explicit `run` annotation (or a `status`
//! condition), and is forced to `Never` when its `when` clause does not
//! match the build.

use crate::engine::RunPolicy;
use crate::errors::{DroverError, DroverResult};
use crate::pipeline::{Condition, DeclaredStep, MatchInput, StepRun};

const STATUS_FAILURE: &str = "failure";
const STATUS_SUCCESS: &str = "success";

/// Resolve the final policy of a declared step
pub fn resolve(step: &DeclaredStep, input: &MatchInput<'_>) -> DroverResult<RunPolicy> {
    validate(step)?;

    let policy = explicit(step);

    let eligible = step
        .when
        .matches(input)
        .map_err(|e| DroverError::InvalidCondition {
            step: step.name.clone(),
            condition: "when".into(),
            pattern: String::new(),
            reason: e.to_string(),
        })?;

    if eligible {
        Ok(policy)
    } else {
        tracing::debug!(step = %step.name, "conditions not met, step will be skipped");
        Ok(RunPolicy::Never)
    }
}

/// Policy from the `run` annotation, falling back to the `status`
/// condition. Patterns are validated before this is called.
fn explicit(step: &DeclaredStep) -> RunPolicy {
    match step.run {
        Some(StepRun::Always) => RunPolicy::Always,
        Some(StepRun::OnFailure) => RunPolicy::OnFailure,
        Some(StepRun::OnSuccess) => RunPolicy::OnSuccess,
        None => from_status(&step.when.status),
    }
}

fn from_status(status: &Condition) -> RunPolicy {
    if status.is_empty() {
        return RunPolicy::OnSuccess;
    }
    let on_failure = status.matches(STATUS_FAILURE).unwrap_or(false);
    let on_success = status.matches(STATUS_SUCCESS).unwrap_or(false);

    match (on_failure, on_success) {
        (true, true) => RunPolicy::Always,
        (true, false) => RunPolicy::OnFailure,
        _ => RunPolicy::OnSuccess,
    }
}

/// Reject malformed patterns in any condition of the step
pub fn validate(step: &DeclaredStep) -> DroverResult<()> {
    let conditions = step
        .when
        .named()
        .into_iter()
        .chain(std::iter::once(("status", &step.when.status)));

    for (name, condition) in conditions {
        condition
            .validate()
            .map_err(|(pattern, e)| DroverError::InvalidCondition {
                step: step.name.clone(),
                condition: name.to_string(),
                pattern,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Conditions;

    fn step_with(run: Option<StepRun>, when: Conditions) -> DeclaredStep {
        DeclaredStep {
            run,
            when,
            ..DeclaredStep::new("step", &["true"])
        }
    }

    fn on_branch(branch: &str) -> MatchInput<'_> {
        MatchInput {
            branch,
            event: "push",
            ..MatchInput::default()
        }
    }

    #[test]
    fn test_default_is_on_success() {
        let step = step_with(None, Conditions::default());
        assert_eq!(resolve(&step, &on_branch("dev")).unwrap(), RunPolicy::OnSuccess);
    }

    #[test]
    fn test_explicit_policies() {
        let always = step_with(Some(StepRun::Always), Conditions::default());
        let failure = step_with(Some(StepRun::OnFailure), Conditions::default());
        assert_eq!(resolve(&always, &on_branch("dev")).unwrap(), RunPolicy::Always);
        assert_eq!(resolve(&failure, &on_branch("dev")).unwrap(), RunPolicy::OnFailure);
    }

    #[test]
    fn test_condition_mismatch_overrides_explicit_policy() {
        let when = Conditions {
            branch: Condition::include(&["main"]),
            ..Conditions::default()
        };
        for run in [Some(StepRun::Always), Some(StepRun::OnFailure), None] {
            let step = step_with(run, when.clone());
            assert_eq!(resolve(&step, &on_branch("dev")).unwrap(), RunPolicy::Never);
        }

        let step = step_with(Some(StepRun::Always), when);
        assert_eq!(resolve(&step, &on_branch("main")).unwrap(), RunPolicy::Always);
    }

    #[test]
    fn test_status_condition() {
        let both = Conditions {
            status: Condition::include(&["success", "failure"]),
            ..Conditions::default()
        };
        let failure = Conditions {
            status: Condition::include(&["failure"]),
            ..Conditions::default()
        };
        let success = Conditions {
            status: Condition::include(&["success"]),
            ..Conditions::default()
        };

        let input = on_branch("main");
        assert_eq!(resolve(&step_with(None, both), &input).unwrap(), RunPolicy::Always);
        assert_eq!(
            resolve(&step_with(None, failure.clone()), &input).unwrap(),
            RunPolicy::OnFailure
        );
        assert_eq!(resolve(&step_with(None, success), &input).unwrap(), RunPolicy::OnSuccess);

        // an explicit annotation wins over status
        let annotated = step_with(Some(StepRun::Always), failure);
        assert_eq!(resolve(&annotated, &input).unwrap(), RunPolicy::Always);
    }

    #[test]
    fn test_malformed_pattern_is_a_configuration_error() {
        let when = Conditions {
            event: Condition::include(&["[push"]),
            ..Conditions::default()
        };
        let err = resolve(&step_with(None, when), &on_branch("main")).unwrap_err();
        match err {
            DroverError::InvalidCondition {
                condition, pattern, ..
            } => {
                assert_eq!(condition, "event");
                assert_eq!(pattern, "[push");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
