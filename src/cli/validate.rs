// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Validate command - check every pipeline of a manifest

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{Manifest, PipelineValidator};

/// Run the validate command
pub async fn run(source: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating manifest...".bold());
    println!();

    let manifest = match Manifest::from_file(&source) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("  {} Failed to parse {}", "✗".red(), source.display());
            eprintln!();
            return Err(e.into());
        }
    };

    println!("  {} Manifest is valid YAML", "✓".green());

    if manifest.pipelines.is_empty() {
        return Err(miette::miette!(
            "No exec pipelines found in {}",
            source.display()
        ));
    }

    let mut invalid = 0;
    for pipeline in &manifest.pipelines {
        let validation = PipelineValidator::validate(pipeline);

        println!();
        let title = format!("Pipeline '{}'", pipeline.name);
        if validation.is_valid() {
            println!("  {} {}", "✓".green(), title.bold());
        } else {
            invalid += 1;
            println!("  {} {}", "✗".red(), title.bold());
        }

        for error in &validation.errors {
            println!("    {} {}", "✗".red(), error);
        }
        for warning in &validation.warnings {
            println!("    {} {}", "⚠".yellow(), warning);
        }

        if verbose {
            for step in &pipeline.steps {
                let deps = if step.depends_on.is_empty() {
                    String::new()
                } else {
                    format!(" [depends: {}]", step.depends_on.join(", "))
                };
                println!("      - {}{}", step.name, deps.dimmed());
            }
        }
    }

    println!();

    if invalid > 0 {
        Err(miette::miette!(
            "{} of {} pipelines failed validation",
            invalid,
            manifest.pipelines.len()
        ))
    } else {
        println!("{}", "Manifest is valid!".green().bold());
        Ok(())
    }
}
