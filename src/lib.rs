// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! # drover - local pipeline compiler and runner
//!
//! `drover` reads a declarative pipeline manifest, compiles one pipeline
//! into an execution plan, and runs the plan's steps as host processes.
//!
//! ## Features
//!
//! - **Compilation** - Steps become shell scripts with a fully resolved environment
//! - **Dependency graphs** - Serial or `depends_on` ordering, with cycle detection
//! - **Run policies** - `when` conditions and `on-success`/`on-failure`/`always`
//! - **Secrets** - Resolved once at compile time and masked in all output
//!
//! ## Quick Start
//!
//! ```bash
//! # Print the execution plan
//! drover compile --stage-name build
//!
//! # Run it
//! drover exec --stage-name build --secret token=abc
//! ```

pub mod cli;
pub mod compiler;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod runtime;
pub mod secret;

// Re-export commonly used types
pub use compiler::Compiler;
pub use context::BuildContext;
pub use engine::{CompiledSpec, CompiledStep, RunPolicy};
pub use errors::{DroverError, DroverResult};
pub use pipeline::{Manifest, PipelineDefinition};
pub use runtime::{ExecutionOptions, Executor, StageState, StageStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
