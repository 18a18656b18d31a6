// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Dependency wiring
//!
//! A pipeline where no step names a dependency runs serially, in
//! declaration order. As soon as one step names a dependency the pipeline
//! is a graph, and steps without dependencies only wait for the clone.
//! This module is the only place that rewrites `depends_on` after
//! translation.

use std::collections::HashSet;

use crate::engine::{CompiledStep, CLONE_STEP};
use crate::errors::{DroverError, DroverResult};

/// How dependencies were resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    Serial,
    Graph,
}

impl GraphMode {
    pub fn detect(steps: &[CompiledStep]) -> Self {
        if steps.iter().any(|s| !s.depends_on.is_empty()) {
            Self::Graph
        } else {
            Self::Serial
        }
    }
}

/// Wire implicit edges, then check every dependency resolves
pub fn configure(steps: &mut [CompiledStep], clone_enabled: bool) -> DroverResult<GraphMode> {
    let mode = GraphMode::detect(steps);

    match mode {
        GraphMode::Serial => chain_serially(steps),
        GraphMode::Graph if clone_enabled => anchor_to_clone(steps),
        GraphMode::Graph => strip_clone(steps),
    }

    check_references(steps)?;
    Ok(mode)
}

/// Each step depends on exactly the one before it
fn chain_serially(steps: &mut [CompiledStep]) {
    let mut previous: Option<String> = None;
    for step in steps.iter_mut() {
        step.depends_on = previous.iter().cloned().collect();
        previous = Some(step.name.clone());
    }
}

/// Steps without dependencies wait for the clone step
fn anchor_to_clone(steps: &mut [CompiledStep]) {
    for step in steps.iter_mut() {
        if step.name != CLONE_STEP && step.depends_on.is_empty() {
            step.depends_on = vec![CLONE_STEP.to_string()];
        }
    }
}

/// Drop references to a clone step that does not exist. A user step
/// named `clone` keeps its dependents.
fn strip_clone(steps: &mut [CompiledStep]) {
    if steps.iter().any(|s| s.name == CLONE_STEP) {
        return;
    }
    for step in steps.iter_mut() {
        step.depends_on.retain(|dep| dep != CLONE_STEP);
    }
}

/// Every dependency must name a step of the plan
pub fn check_references(steps: &[CompiledStep]) -> DroverResult<()> {
    let names: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();

    for step in steps {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(DroverError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}
