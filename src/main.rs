// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! drover - local pipeline compiler and runner

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover::cli::{Cli, Commands};
use drover::config::RunnerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "drover=debug" } else { "drover=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let config = || RunnerConfig::discover(cli.config.as_deref());

    match cli.command {
        Commands::Compile { pipeline } => {
            drover::cli::compile::run(pipeline, config()?, cli.verbose).await
        }
        Commands::Exec {
            pipeline,
            pretty,
            procs,
        } => drover::cli::exec::run(pipeline, config()?, pretty, procs, cli.verbose).await,
        Commands::Graph { pipeline, format } => {
            drover::cli::graph::run(pipeline, format, config()?, cli.verbose).await
        }
        Commands::Validate { source } => drover::cli::validate::run(source, cli.verbose).await,
    }
}
