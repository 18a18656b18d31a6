// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Graph command - visualize step dependencies of the compiled plan

use miette::Result;

use super::{GraphFormat, PipelineArgs};
use crate::config::RunnerConfig;
use crate::pipeline::DagBuilder;

/// Run the graph command
pub async fn run(
    args: PipelineArgs,
    format: GraphFormat,
    config: RunnerConfig,
    _verbose: bool,
) -> Result<()> {
    let spec = super::compile::plan(&args, &config).await?;
    let dag = DagBuilder::build(&spec.steps)?;

    let output = match format {
        GraphFormat::Text => dag.to_text(),
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    print!("{}", output);
    if !output.ends_with('\n') {
        println!();
    }

    Ok(())
}
