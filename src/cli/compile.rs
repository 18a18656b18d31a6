// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Compile command - print the execution plan

use miette::{IntoDiagnostic, Result};

use super::PipelineArgs;
use crate::compiler::Compiler;
use crate::config::RunnerConfig;
use crate::engine::CompiledSpec;

/// Load, substitute and compile the selected pipeline
pub async fn plan(args: &PipelineArgs, config: &RunnerConfig) -> Result<CompiledSpec> {
    let pipeline = args.load_pipeline(config)?;
    let context = args.context(config, &pipeline);
    let secrets = args.secret_provider(config);

    let spec = Compiler::new(&pipeline, &context, &secrets).compile().await?;
    Ok(spec)
}

/// Run the compile command
pub async fn run(args: PipelineArgs, config: RunnerConfig, _verbose: bool) -> Result<()> {
    let spec = plan(&args, &config).await?;
    println!("{}", spec.to_json_pretty().into_diagnostic()?);
    Ok(())
}
