// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! CLI command definitions and handlers

pub mod compile;
pub mod exec;
pub mod flags;
pub mod graph;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use flags::PipelineArgs;

/// Local pipeline compiler and runner
#[derive(Parser, Debug)]
#[clap(
    name = "drover",
    version,
    about = "Compile and run exec pipelines on the local machine",
    long_about = None,
    after_help = "Examples:\n\
        drover compile                        Print the execution plan of .drover.yml\n\
        drover exec --stage-name build        Run the 'build' pipeline\n\
        drover graph --format mermaid         Show step dependencies\n\
        drover validate ci/pipeline.yml       Check a manifest for errors\n\n\
        See 'drover <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Runner config file (default: platform config directory)
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a pipeline and print the execution plan as JSON
    Compile {
        #[clap(flatten)]
        pipeline: PipelineArgs,
    },

    /// Compile a pipeline and run it
    Exec {
        #[clap(flatten)]
        pipeline: PipelineArgs,

        /// Colored output (default: when stdout is a terminal)
        #[clap(long)]
        pretty: Option<bool>,

        /// Maximum number of steps running at once
        #[clap(long, value_name = "N")]
        procs: Option<usize>,
    },

    /// Show the step dependency graph
    Graph {
        #[clap(flatten)]
        pipeline: PipelineArgs,

        /// Output format (text, dot, mermaid)
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Validate a manifest without compiling it
    Validate {
        /// Manifest file
        #[clap(default_value = ".drover.yml")]
        source: PathBuf,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}
