// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Exec command - compile and run a pipeline on this machine

use colored::Colorize;
use miette::Result;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use super::PipelineArgs;
use crate::config::RunnerConfig;
use crate::runtime::{ConsoleSink, ExecutionOptions, Executor, LocalEngine, StageState, StepStatus};

/// Run the exec command. Exits the process with the stage exit code when
/// the stage did not succeed.
pub async fn run(
    args: PipelineArgs,
    config: RunnerConfig,
    pretty: Option<bool>,
    procs: Option<usize>,
    verbose: bool,
) -> Result<()> {
    let spec = super::compile::plan(&args, &config).await?;

    let pretty = pretty
        .or(config.pretty)
        .unwrap_or_else(|| std::io::stdout().is_terminal());
    let minutes = args.timeout_minutes(&config);
    let options = ExecutionOptions {
        procs: procs.or(config.procs).unwrap_or(1).max(1),
        timeout: Some(Duration::from_secs(minutes * 60)),
        interrupt: true,
        destroy: true,
    };
    tracing::debug!(procs = options.procs, timeout_minutes = minutes, "executing plan");

    let executor = Executor::new(
        Arc::new(LocalEngine::new()),
        Arc::new(ConsoleSink::new(pretty)),
        options,
    );
    let state = executor.execute(spec).await?;

    if pretty || verbose {
        print_summary(&state);
    }

    if !state.status.is_success() {
        std::process::exit(state.exit_code());
    }
    Ok(())
}

fn print_summary(state: &StageState) {
    let count = |status: StepStatus| state.steps.iter().filter(|s| s.status == status).count();

    println!();
    let headline = format!(
        "Pipeline {} in {:.2}s",
        state.status,
        state.duration.as_secs_f64()
    );
    if state.status.is_success() {
        println!("{}", headline.green().bold());
    } else {
        println!("{}", headline.red().bold());
    }
    println!(
        "  {} passed, {} failed, {} skipped, {} killed",
        count(StepStatus::Success),
        count(StepStatus::Failure),
        count(StepStatus::Skipped),
        count(StepStatus::Killed)
    );
    if let Some(error) = &state.error {
        println!("  {}", error.dimmed());
    }
}
