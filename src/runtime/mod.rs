// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Plan execution
//!
//! Runs a [`CompiledSpec`] through an [`Engine`]. Every step gets its own
//! task that waits for its dependencies to reach a terminal state, checks
//! its run policy, and then competes for one of `procs` slots.
//!
//! Propagation: a step is *tainted* when it failed (without
//! `failure: ignore`) or when any of its dependencies is tainted.
//! `OnSuccess` steps run only with untainted dependencies, `OnFailure`
//! steps only with tainted ones, and `Always` steps regardless.

mod engine;
mod output;
mod state;

pub use engine::{Engine, LocalEngine};
pub use output::{BufferSink, ConsoleSink, LogSink, Masker, MaskingSink, MASK};
pub use state::{StageState, StageStatus, StepState, StepStatus};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::engine::{CompiledSpec, CompiledStep, RunPolicy};
use crate::errors::DroverResult;
use crate::pipeline::DagBuilder;

/// Execution options
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum number of steps running at once
    pub procs: usize,
    /// Cancel the run after this long
    pub timeout: Option<Duration>,
    /// Cancel the run on Ctrl-C
    pub interrupt: bool,
    /// Remove the workspace afterwards
    pub destroy: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            procs: 1,
            timeout: None,
            interrupt: false,
            destroy: true,
        }
    }
}

/// Terminal outcome of a step as seen by its dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outcome {
    tainted: bool,
}

type Background = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Runs compiled plans
pub struct Executor {
    engine: Arc<dyn Engine>,
    sink: Arc<dyn LogSink>,
    options: ExecutionOptions,
}

impl Executor {
    pub fn new(engine: Arc<dyn Engine>, sink: Arc<dyn LogSink>, options: ExecutionOptions) -> Self {
        Self {
            engine,
            sink,
            options,
        }
    }

    /// Run the plan. Only structural problems (cycles, unknown
    /// dependencies) are errors; everything that happens while running is
    /// reported in the returned [`StageState`].
    pub async fn execute(&self, spec: CompiledSpec) -> DroverResult<StageState> {
        DagBuilder::build(&spec.steps)?;

        let start = Instant::now();
        let spec = Arc::new(spec);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let watchers = self.spawn_cancellation(&cancel_tx);

        tracing::info!(root = %spec.root.display(), steps = spec.steps.len(), "starting run");

        let state = match self.engine.setup(&spec).await {
            Ok(()) => self.schedule(&spec, cancel_rx).await,
            Err(e) => {
                tracing::error!(error = %e, "workspace setup failed");
                StageState {
                    status: StageStatus::Error,
                    steps: spec
                        .steps
                        .iter()
                        .map(|s| StepState::new(&s.name, StepStatus::Skipped))
                        .collect(),
                    error: Some(e.to_string()),
                    duration: Duration::ZERO,
                }
            }
        };

        for watcher in watchers {
            watcher.abort();
        }

        if self.options.destroy {
            if let Err(e) = self.engine.destroy(&spec).await {
                tracing::warn!(error = %e, "failed to remove workspace");
            }
        }

        let state = StageState {
            duration: start.elapsed(),
            ..state
        };
        tracing::info!(status = %state.status, duration = ?state.duration, "run finished");
        Ok(state)
    }

    /// Tasks that flip the cancel flag on timeout or interrupt
    fn spawn_cancellation(&self, cancel: &Arc<watch::Sender<bool>>) -> Vec<JoinHandle<()>> {
        let mut watchers = Vec::new();

        if let Some(timeout) = self.options.timeout {
            let cancel = Arc::clone(cancel);
            watchers.push(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracing::warn!(?timeout, "run timed out, cancelling");
                let _ = cancel.send(true);
            }));
        }

        if self.options.interrupt {
            let cancel = Arc::clone(cancel);
            watchers.push(tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, cancelling");
                    let _ = cancel.send(true);
                }
            }));
        }

        watchers
    }

    async fn schedule(
        &self,
        spec: &Arc<CompiledSpec>,
        cancel: watch::Receiver<bool>,
    ) -> StageState {
        let masker = Masker::new(
            spec.steps
                .iter()
                .flat_map(|s| &s.secrets)
                .filter(|s| s.mask && s.is_resolved())
                .map(|s| s.value()),
        );
        let sink: Arc<dyn LogSink> = Arc::new(MaskingSink::new(Arc::clone(&self.sink), masker));
        let permits = Arc::new(Semaphore::new(self.options.procs.max(1)));
        let background: Background = Arc::default();

        let mut senders = Vec::with_capacity(spec.steps.len());
        let mut receivers = Vec::with_capacity(spec.steps.len());
        for _ in &spec.steps {
            let (tx, rx) = watch::channel(None::<Outcome>);
            senders.push(tx);
            receivers.push(rx);
        }

        let mut handles = Vec::with_capacity(spec.steps.len());
        for (index, tx) in senders.into_iter().enumerate() {
            let step = &spec.steps[index];
            let deps: Vec<watch::Receiver<Option<Outcome>>> = step
                .depends_on
                .iter()
                .filter_map(|d| spec.steps.iter().position(|s| &s.name == d))
                .map(|i| receivers[i].clone())
                .collect();

            let task = StepTask {
                spec: Arc::clone(spec),
                index,
                engine: Arc::clone(&self.engine),
                sink: Arc::clone(&sink),
                permits: Arc::clone(&permits),
                cancel: cancel.clone(),
                background: Arc::clone(&background),
            };
            handles.push(tokio::spawn(task.run(deps, tx)));
        }

        let mut steps = Vec::with_capacity(handles.len());
        let results = futures::future::join_all(handles).await;
        for (handle, step) in results.into_iter().zip(&spec.steps) {
            steps.push(handle.unwrap_or_else(|e| {
                let mut state = StepState::new(&step.name, StepStatus::Failure);
                state.error = Some(format!("step task failed: {e}"));
                state
            }));
        }

        // detached steps do not outlive the run
        let detached: Vec<JoinHandle<()>> = match background.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in detached {
            handle.abort();
        }

        let status = if *cancel.borrow() {
            StageStatus::Killed
        } else {
            StageState::status_from_steps(&steps)
        };

        StageState {
            status,
            steps,
            error: None,
            duration: Duration::ZERO,
        }
    }
}

/// Everything one step task needs
struct StepTask {
    spec: Arc<CompiledSpec>,
    index: usize,
    engine: Arc<dyn Engine>,
    sink: Arc<dyn LogSink>,
    permits: Arc<Semaphore>,
    cancel: watch::Receiver<bool>,
    background: Background,
}

impl StepTask {
    fn step(&self) -> &CompiledStep {
        &self.spec.steps[self.index]
    }

    async fn run(
        self,
        deps: Vec<watch::Receiver<Option<Outcome>>>,
        done: watch::Sender<Option<Outcome>>,
    ) -> StepState {
        let upstream_tainted = wait_for_dependencies(deps).await;
        let (state, tainted) = self.decide_and_run(upstream_tainted, &done).await;

        // detached steps have already published their outcome
        done.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(Outcome { tainted });
                true
            } else {
                false
            }
        });
        self.sink.step_finished(&state);
        state
    }

    async fn decide_and_run(
        &self,
        upstream_tainted: bool,
        done: &watch::Sender<Option<Outcome>>,
    ) -> (StepState, bool) {
        let step = self.step();
        let skipped = || (StepState::new(&step.name, StepStatus::Skipped), upstream_tainted);

        let already_cancelled = *self.cancel.borrow();
        if already_cancelled {
            return skipped();
        }
        let eligible = match step.run_policy {
            RunPolicy::Never => false,
            RunPolicy::OnSuccess => !upstream_tainted,
            RunPolicy::OnFailure => upstream_tainted,
            RunPolicy::Always => true,
        };
        if !eligible {
            tracing::debug!(
                step = %step.name,
                policy = %step.run_policy,
                upstream_tainted,
                "skipping step"
            );
            return skipped();
        }

        let mut cancel = self.cancel.clone();
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return skipped(),
            },
            _ = cancelled(&mut cancel) => return skipped(),
        };

        if step.detach {
            drop(permit);
            return (self.start_detached(upstream_tainted, done), upstream_tainted);
        }

        tracing::info!(step = %step.name, "starting step");
        self.sink.step_started(&step.name);
        let started = Instant::now();

        let result = tokio::select! {
            result = self.engine.run(&self.spec, step, Arc::clone(&self.sink)) => Some(result),
            _ = cancelled(&mut cancel) => None,
        };
        drop(permit);

        let mut state = StepState::new(&step.name, StepStatus::Running);
        state.duration = started.elapsed();

        match result {
            None => {
                tracing::warn!(step = %step.name, "step killed");
                state.status = StepStatus::Killed;
                (state, true)
            }
            Some(Ok(0)) => {
                state.status = StepStatus::Success;
                state.exit_code = Some(0);
                (state, upstream_tainted)
            }
            Some(Ok(code)) => {
                tracing::info!(step = %step.name, exit_code = code, "step failed");
                state.status = StepStatus::Failure;
                state.exit_code = Some(code);
                state.ignored = step.ignore_err;
                (state, upstream_tainted || !step.ignore_err)
            }
            Some(Err(e)) => {
                tracing::warn!(step = %step.name, error = %e, "step could not run");
                state.status = StepStatus::Failure;
                state.error = Some(e.to_string());
                state.ignored = step.ignore_err;
                (state, upstream_tainted || !step.ignore_err)
            }
        }
    }

    /// Start the step in the background and report it done right away.
    /// Dependents still see the taint of everything upstream of it.
    fn start_detached(
        &self,
        upstream_tainted: bool,
        done: &watch::Sender<Option<Outcome>>,
    ) -> StepState {
        let step = self.step();
        tracing::info!(step = %step.name, "starting detached step");
        self.sink.step_started(&step.name);

        let spec = Arc::clone(&self.spec);
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let index = self.index;
        let handle = tokio::spawn(async move {
            let step = &spec.steps[index];
            match engine.run(&spec, step, sink).await {
                Ok(code) => {
                    tracing::debug!(step = %step.name, exit_code = code, "detached step exited")
                }
                Err(e) => {
                    tracing::warn!(step = %step.name, error = %e, "detached step could not run")
                }
            }
        });

        match self.background.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }

        let _ = done.send(Some(Outcome {
            tainted: upstream_tainted,
        }));
        StepState::new(&step.name, StepStatus::Success)
    }
}

/// True when any dependency ended tainted. A dependency whose task went
/// away without reporting counts as tainted.
async fn wait_for_dependencies(deps: Vec<watch::Receiver<Option<Outcome>>>) -> bool {
    let waits = deps.into_iter().map(|mut rx| async move {
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => {
                let outcome: Option<Outcome> = *outcome;
                outcome.map_or(true, |o| o.tainted)
            }
            Err(_) => true,
        }
    });
    futures::future::join_all(waits).await.into_iter().any(|t| t)
}

/// Resolves once the cancel flag is set. Never resolves if the sender
/// is gone without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let fired = cancel.wait_for(|c| *c).await.is_ok();
    if !fired {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Secret;
    use crate::errors::DroverError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Scripted engine: exit codes and delays per step, records starts
    #[derive(Default)]
    struct FakeEngine {
        exit_codes: HashMap<String, i32>,
        delays: HashMap<String, Duration>,
        output: HashMap<String, String>,
        fail_setup: bool,
        started: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn exit(mut self, step: &str, code: i32) -> Self {
            self.exit_codes.insert(step.into(), code);
            self
        }

        fn delay(mut self, step: &str, delay: Duration) -> Self {
            self.delays.insert(step.into(), delay);
            self
        }

        fn print(mut self, step: &str, line: &str) -> Self {
            self.output.insert(step.into(), line.into());
            self
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Engine for FakeEngine {
        async fn setup(&self, spec: &CompiledSpec) -> DroverResult<()> {
            if self.fail_setup {
                return Err(DroverError::SetupFailed {
                    path: spec.root.clone(),
                    error: "read-only file system".into(),
                });
            }
            Ok(())
        }

        async fn run(
            &self,
            _spec: &CompiledSpec,
            step: &CompiledStep,
            output: Arc<dyn LogSink>,
        ) -> DroverResult<i32> {
            self.started.lock().unwrap().push(step.name.clone());
            if let Some(line) = self.output.get(&step.name) {
                output.line(&step.name, line);
            }
            if let Some(delay) = self.delays.get(&step.name) {
                tokio::time::sleep(*delay).await;
            }
            Ok(self.exit_codes.get(&step.name).copied().unwrap_or(0))
        }

        async fn destroy(&self, _spec: &CompiledSpec) -> DroverResult<()> {
            Ok(())
        }
    }

    fn step(name: &str, deps: &[&str], policy: RunPolicy) -> CompiledStep {
        CompiledStep {
            name: name.into(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            run_policy: policy,
            ..CompiledStep::default()
        }
    }

    fn plan(steps: Vec<CompiledStep>) -> CompiledSpec {
        CompiledSpec {
            root: "/tmp/drover-test".into(),
            platform: Default::default(),
            files: vec![],
            links: vec![],
            steps,
        }
    }

    async fn run_with(
        engine: Arc<FakeEngine>,
        spec: CompiledSpec,
        options: ExecutionOptions,
    ) -> (StageState, BufferSink) {
        let buffer = BufferSink::new();
        let executor = Executor::new(engine, Arc::new(buffer.clone()), options);
        (executor.execute(spec).await.unwrap(), buffer)
    }

    fn status(state: &StageState, name: &str) -> StepStatus {
        state.step(name).unwrap().status
    }

    #[tokio::test]
    async fn test_serial_success() {
        let engine = Arc::new(FakeEngine::default());
        let spec = plan(vec![
            step("a", &[], RunPolicy::OnSuccess),
            step("b", &["a"], RunPolicy::OnSuccess),
            step("c", &["b"], RunPolicy::OnSuccess),
        ]);
        let (state, _) = run_with(engine.clone(), spec, ExecutionOptions::default()).await;

        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(engine.started(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_on_failure_runs_only_after_failure() {
        let engine = Arc::new(FakeEngine::default().exit("build", 1));
        let spec = plan(vec![
            step("build", &[], RunPolicy::OnSuccess),
            step("test", &["build"], RunPolicy::OnSuccess),
            step("notify", &["test"], RunPolicy::OnFailure),
            step("cleanup", &["build"], RunPolicy::Always),
        ]);
        let (state, _) = run_with(engine.clone(), spec, ExecutionOptions::default()).await;

        assert_eq!(state.status, StageStatus::Failure);
        assert_eq!(status(&state, "build"), StepStatus::Failure);
        assert_eq!(status(&state, "test"), StepStatus::Skipped);
        assert_eq!(status(&state, "notify"), StepStatus::Success);
        assert_eq!(status(&state, "cleanup"), StepStatus::Success);
        assert_eq!(state.step("build").unwrap().exit_code, Some(1));

        let clean = Arc::new(FakeEngine::default());
        let spec = plan(vec![
            step("build", &[], RunPolicy::OnSuccess),
            step("notify", &["build"], RunPolicy::OnFailure),
        ]);
        let (state, _) = run_with(clean.clone(), spec, ExecutionOptions::default()).await;
        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(status(&state, "notify"), StepStatus::Skipped);
        assert_eq!(clean.started(), vec!["build"]);
    }

    #[tokio::test]
    async fn test_never_steps_do_not_start() {
        let engine = Arc::new(FakeEngine::default());
        let spec = plan(vec![
            step("a", &[], RunPolicy::OnSuccess),
            step("deploy", &["a"], RunPolicy::Never),
            step("after", &["deploy"], RunPolicy::OnSuccess),
        ]);
        let (state, _) = run_with(engine.clone(), spec, ExecutionOptions::default()).await;

        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(status(&state, "deploy"), StepStatus::Skipped);
        assert_eq!(status(&state, "after"), StepStatus::Success);
        assert_eq!(engine.started(), vec!["a", "after"]);
    }

    #[tokio::test]
    async fn test_ignored_failure_does_not_propagate() {
        let engine = Arc::new(FakeEngine::default().exit("lint", 2));
        let mut lint = step("lint", &[], RunPolicy::OnSuccess);
        lint.ignore_err = true;
        let spec = plan(vec![lint, step("build", &["lint"], RunPolicy::OnSuccess)]);
        let (state, _) = run_with(engine, spec, ExecutionOptions::default()).await;

        assert_eq!(state.status, StageStatus::Success);
        let lint = state.step("lint").unwrap();
        assert_eq!(lint.status, StepStatus::Failure);
        assert!(lint.ignored);
        assert_eq!(status(&state, "build"), StepStatus::Success);
    }

    #[tokio::test]
    async fn test_transitive_failure_skips_descendants() {
        let engine = Arc::new(FakeEngine::default().exit("a", 1));
        let spec = plan(vec![
            step("a", &[], RunPolicy::OnSuccess),
            step("b", &["a"], RunPolicy::Never),
            step("c", &["b"], RunPolicy::OnSuccess),
            step("d", &["c"], RunPolicy::OnFailure),
        ]);
        let (state, _) = run_with(engine, spec, ExecutionOptions::default()).await;

        assert_eq!(status(&state, "c"), StepStatus::Skipped);
        assert_eq!(status(&state, "d"), StepStatus::Success);
    }

    #[tokio::test]
    async fn test_parallel_branches_respect_procs() {
        let engine = Arc::new(
            FakeEngine::default()
                .delay("x", Duration::from_millis(50))
                .delay("y", Duration::from_millis(50)),
        );
        let spec = plan(vec![
            step("x", &[], RunPolicy::OnSuccess),
            step("y", &[], RunPolicy::OnSuccess),
            step("join", &["x", "y"], RunPolicy::OnSuccess),
        ]);
        let options = ExecutionOptions {
            procs: 2,
            ..ExecutionOptions::default()
        };
        let (state, _) = run_with(engine.clone(), spec, options).await;

        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(engine.started().last().map(String::as_str), Some("join"));
    }

    #[tokio::test]
    async fn test_timeout_kills_running_steps() {
        let engine = Arc::new(FakeEngine::default().delay("slow", Duration::from_secs(30)));
        let spec = plan(vec![
            step("slow", &[], RunPolicy::OnSuccess),
            step("next", &["slow"], RunPolicy::OnSuccess),
        ]);
        let options = ExecutionOptions {
            timeout: Some(Duration::from_millis(50)),
            ..ExecutionOptions::default()
        };
        let (state, _) = run_with(engine, spec, options).await;

        assert_eq!(state.status, StageStatus::Killed);
        assert_ne!(state.exit_code(), 0);
        assert_eq!(status(&state, "slow"), StepStatus::Killed);
        assert_eq!(status(&state, "next"), StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_detached_step_does_not_block() {
        let engine = Arc::new(FakeEngine::default().delay("service", Duration::from_secs(30)));
        let mut service = step("service", &[], RunPolicy::OnSuccess);
        service.detach = true;
        let spec = plan(vec![service, step("tests", &["service"], RunPolicy::OnSuccess)]);

        let run = run_with(engine, spec, ExecutionOptions::default());
        let (state, _) = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap();

        assert_eq!(state.status, StageStatus::Success);
        assert_eq!(status(&state, "service"), StepStatus::Success);
        assert_eq!(status(&state, "tests"), StepStatus::Success);
    }

    #[tokio::test]
    async fn test_detached_step_passes_upstream_failure_on() {
        let engine = Arc::new(
            FakeEngine::default()
                .exit("a", 1)
                .delay("svc", Duration::from_secs(30)),
        );
        let mut svc = step("svc", &["a"], RunPolicy::Always);
        svc.detach = true;
        let spec = plan(vec![
            step("a", &[], RunPolicy::OnSuccess),
            svc,
            step("b", &["svc"], RunPolicy::OnSuccess),
            step("notify", &["svc"], RunPolicy::OnFailure),
        ]);

        let run = run_with(engine, spec, ExecutionOptions::default());
        let (state, _) = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap();

        assert_eq!(state.status, StageStatus::Failure);
        assert_eq!(status(&state, "svc"), StepStatus::Success);
        assert_eq!(status(&state, "b"), StepStatus::Skipped);
        assert_eq!(status(&state, "notify"), StepStatus::Success);
    }

    #[tokio::test]
    async fn test_setup_failure_is_an_error() {
        let engine = Arc::new(FakeEngine {
            fail_setup: true,
            ..FakeEngine::default()
        });
        let spec = plan(vec![step("a", &[], RunPolicy::Always)]);
        let (state, _) = run_with(engine.clone(), spec, ExecutionOptions::default()).await;

        assert_eq!(state.status, StageStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("read-only"));
        assert!(engine.started().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_running() {
        let engine = Arc::new(FakeEngine::default());
        let spec = plan(vec![
            step("a", &["b"], RunPolicy::OnSuccess),
            step("b", &["a"], RunPolicy::OnSuccess),
        ]);
        let executor = Executor::new(
            engine.clone(),
            Arc::new(BufferSink::new()),
            ExecutionOptions::default(),
        );

        let err = executor.execute(spec).await.unwrap_err();
        assert!(matches!(err, DroverError::CircularDependency { .. }));
        assert!(engine.started().is_empty());
    }

    #[tokio::test]
    async fn test_secret_values_are_masked() {
        let engine = Arc::new(FakeEngine::default().print("deploy", "using token t0ps3cret"));
        let mut deploy = step("deploy", &[], RunPolicy::OnSuccess);
        let mut secret = Secret::new("token", "TOKEN");
        secret.data = b"t0ps3cret".to_vec();
        deploy.secrets = vec![secret];

        let (_, buffer) = run_with(engine, plan(vec![deploy]), ExecutionOptions::default()).await;
        assert_eq!(buffer.lines_of("deploy"), vec![format!("using token {MASK}")]);
    }
}
