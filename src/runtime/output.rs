// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Step output
//!
//! Steps stream their output line by line into a [`LogSink`]. Every line
//! passes through a [`Masker`] first, so secret values never reach a sink.

use colored::Colorize;
use std::io::Write;
use std::sync::{Arc, Mutex};

use super::state::{StepState, StepStatus};

/// Replacement for secret values in output
pub const MASK: &str = "********";

/// Destination of step output and lifecycle events
pub trait LogSink: Send + Sync {
    /// One line of output, already masked
    fn line(&self, step: &str, line: &str);

    fn step_started(&self, _step: &str) {}

    fn step_finished(&self, _state: &StepState) {}
}

/// Replaces secret values with [`MASK`]. Multi-line secrets are masked
/// line by line since output is streamed by line.
#[derive(Clone, Default)]
pub struct Masker {
    needles: Vec<String>,
}

impl Masker {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut needles: Vec<String> = secrets
            .into_iter()
            .flat_map(|s| {
                s.as_ref()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .collect();
        // longest first, so a secret containing another is masked whole
        needles.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        needles.dedup();
        Self { needles }
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    pub fn mask(&self, line: &str) -> String {
        let mut out = line.to_string();
        for needle in &self.needles {
            if out.contains(needle.as_str()) {
                out = out.replace(needle.as_str(), MASK);
            }
        }
        out
    }
}

impl std::fmt::Debug for Masker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Masker")
            .field("secrets", &self.needles.len())
            .finish()
    }
}

/// Wraps a sink and masks every line before forwarding it
pub struct MaskingSink {
    inner: Arc<dyn LogSink>,
    masker: Masker,
}

impl MaskingSink {
    pub fn new(inner: Arc<dyn LogSink>, masker: Masker) -> Self {
        Self { inner, masker }
    }
}

impl LogSink for MaskingSink {
    fn line(&self, step: &str, line: &str) {
        self.inner.line(step, &self.masker.mask(line));
    }

    fn step_started(&self, step: &str) {
        self.inner.step_started(step);
    }

    fn step_finished(&self, state: &StepState) {
        let mut state = state.clone();
        state.error = state.error.map(|e| self.masker.mask(&e));
        self.inner.step_finished(&state);
    }
}

/// Prints step output to stdout, prefixed with the step name
pub struct ConsoleSink {
    pretty: bool,
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new(pretty: bool) -> Self {
        Self {
            pretty,
            lock: Mutex::new(()),
        }
    }
}

impl LogSink for ConsoleSink {
    fn line(&self, step: &str, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = std::io::stdout().lock();
        let _ = if self.pretty {
            writeln!(out, "{} {}", format!("[{step}]").dimmed(), line)
        } else {
            writeln!(out, "[{step}] {line}")
        };
    }

    fn step_started(&self, step: &str) {
        if self.pretty {
            println!("{} {}", "→".blue(), step.bold());
        }
    }

    fn step_finished(&self, state: &StepState) {
        if !self.pretty {
            return;
        }
        let secs = state.duration.as_secs_f64();
        match state.status {
            StepStatus::Success => {
                println!("{} {} ({:.2}s)", "✓".green(), state.name.bold(), secs)
            }
            StepStatus::Failure if state.ignored => println!(
                "{} {} failed, ignored (exit {})",
                "⚠".yellow(),
                state.name.bold(),
                state.exit_code.unwrap_or(-1)
            ),
            StepStatus::Failure => {
                println!("{} {} failed ({:.2}s)", "✗".red(), state.name.bold(), secs);
                if let Some(error) = &state.error {
                    println!("    {}", error.dimmed());
                }
            }
            StepStatus::Skipped => println!(
                "{} {} {}",
                "-".dimmed(),
                state.name.dimmed(),
                "(skipped)".dimmed()
            ),
            StepStatus::Killed => {
                println!("{} {} {}", "✗".red(), state.name.bold(), "(killed)".red())
            }
            StepStatus::Pending | StepStatus::Running => {}
        }
    }
}

/// Keeps output in memory
#[derive(Default, Clone)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<(String, String)>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(step, line)` pairs in arrival order
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Lines of one step
    pub fn lines_of(&self, step: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| s == step)
            .map(|(_, l)| l)
            .collect()
    }
}

impl LogSink for BufferSink {
    fn line(&self, step: &str, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((step.to_string(), line.to_string()));
    }
}
