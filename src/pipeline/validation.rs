// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Pipeline validation
//!
//! Lints a pipeline definition without compiling it. Collects every
//! problem instead of stopping at the first one.

use std::collections::HashSet;

use crate::compiler::policy;
use crate::engine::{CompiledStep, CLONE_STEP};
use crate::errors::DroverError;
use crate::pipeline::{DagBuilder, PipelineDefinition, StepRun};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline definition
    pub fn validate(pipeline: &PipelineDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.steps.is_empty() {
            result.add_error(&format!("Pipeline '{}' has no steps defined", pipeline.name));
        }

        let clone_enabled = !pipeline.clone.disable;
        let mut seen_names = HashSet::new();
        for step in &pipeline.steps {
            if step.name.is_empty() {
                result.add_error("A step has no name");
                continue;
            }
            if !seen_names.insert(step.name.as_str()) {
                result.add_error(&format!("Duplicate step name: '{}'", step.name));
            }
            if clone_enabled && step.name == CLONE_STEP {
                result.add_error(&format!(
                    "Step name '{CLONE_STEP}' is reserved while cloning is enabled"
                ));
            }
        }

        Self::validate_graph(pipeline, &mut result);

        for (index, step) in pipeline.steps.iter().enumerate() {
            if step.commands.is_empty() {
                result.add_warning(&format!("Step '{}' has no commands", step.name));
            }
            if step.depends_on.iter().any(|d| d == &step.name) {
                result.add_error(&format!("Step '{}' depends on itself", step.name));
            }
            for (env, value) in &step.environment {
                if value.secret_name().is_some_and(|name| name.trim().is_empty()) {
                    result.add_error(&format!(
                        "Step '{}': `{}` has an empty `from_secret`",
                        step.name, env
                    ));
                }
            }
            if let Err(e) = policy::validate(step) {
                result.add_error(&e.to_string());
            }
            let first_serial = index == 0 && !pipeline.declares_dependencies();
            if first_serial && step.run == Some(StepRun::OnFailure) {
                result.add_warning(&format!(
                    "Step '{}' runs on failure but is the first step; \
                     it can only run if the clone fails",
                    step.name
                ));
            }
        }

        result
    }

    /// Check dependency names and cycles on the declared graph. The clone
    /// step takes part when enabled; references to it are dropped when not.
    fn validate_graph(pipeline: &PipelineDefinition, result: &mut ValidationResult) {
        let clone_enabled = !pipeline.clone.disable;
        let user_clone = pipeline.get_step(CLONE_STEP).is_some();

        let mut nodes: Vec<CompiledStep> = Vec::with_capacity(pipeline.steps.len() + 1);
        if clone_enabled && !user_clone {
            nodes.push(CompiledStep {
                name: CLONE_STEP.into(),
                ..CompiledStep::default()
            });
        }

        let mut seen = HashSet::new();
        for step in &pipeline.steps {
            if !seen.insert(step.name.as_str()) {
                continue;
            }
            let depends_on = step
                .depends_on
                .iter()
                .filter(|d| clone_enabled || user_clone || d.as_str() != CLONE_STEP)
                .filter(|d| *d != &step.name)
                .cloned()
                .collect();
            nodes.push(CompiledStep {
                name: step.name.clone(),
                depends_on,
                ..CompiledStep::default()
            });
        }

        for node in &nodes {
            for dep in &node.depends_on {
                if !seen.contains(dep.as_str()) && !(clone_enabled && dep == CLONE_STEP) {
                    result.add_error(&format!(
                        "Step '{}' depends on unknown step '{}'",
                        node.name, dep
                    ));
                }
            }
        }
        if !result.is_valid() {
            return;
        }

        match DagBuilder::build(&nodes) {
            Ok(_) => {}
            Err(DroverError::CircularDependency { steps }) => {
                result.add_error(&format!("Circular dependency: {}", steps.join(" → ")));
            }
            Err(e) => {
                result.add_error(&format!("Dependency graph error: {}", e));
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
