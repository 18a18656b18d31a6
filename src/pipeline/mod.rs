// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Pipeline definitions and types
//!
//! The declarative side of drover: manifest loading, pipeline and step
//! definitions, `when` conditions, validation, and the dependency graph
//! of a compiled plan.

mod conditions;
mod dag;
mod definition;
mod validation;

pub use conditions::{Condition, Conditions, MatchInput};
pub use dag::DagBuilder;
pub use definition::*;
pub use validation::{PipelineValidator, ValidationResult};
