// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Compiled pipeline representation
//!
//! The types in this module are the only thing handed from the compiler to
//! an executor. A [`CompiledSpec`] is self-contained and order-sensitive:
//! files are listed before the steps that use them.

mod spec;

pub use spec::*;
