// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Pipeline executor
//!
//! Walks the compiled step graph. A single scheduler loop owns the state
//! and dispatches a step once every dependency is done; step tasks run
//! the backend calls and report back through their join handles.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::context::ExecContext;
use super::state::PipelineState;
use crate::engine::{Engine, RunPolicy, Spec, Step, StepExit};
use crate::errors::PodrunError;

/// Driver settings
#[derive(Debug, Clone, Copy)]
pub struct ExecerConfig {
    /// Maximum concurrently running steps; 0 means unlimited
    pub procs: usize,
    /// Bound on the backend's start acknowledgment; `None` waits forever
    pub start_timeout: Option<Duration>,
    /// How long an abandoned step may take to stop
    pub kill_grace: Duration,
}

impl Default for ExecerConfig {
    fn default() -> Self {
        Self {
            procs: 0,
            start_timeout: Some(Duration::from_secs(480)),
            kill_grace: Duration::from_secs(30),
        }
    }
}

/// How a dispatched step ended
#[derive(Debug)]
enum Outcome {
    Exited(StepExit),
    Detached,
    Failed(String),
    Killed,
}

/// Pipeline executor
pub struct Execer {
    engine: Arc<dyn Engine>,
    config: ExecerConfig,
}

impl Execer {
    /// Create a new executor over a backend
    pub fn new(engine: Arc<dyn Engine>, config: ExecerConfig) -> Self {
        Self { engine, config }
    }

    /// Execute the compiled graph.
    ///
    /// A stage that ran and failed is reported through `state`, not as an
    /// error. Errors are reserved for a cancelled context on entry, backend
    /// setup failures and driver faults.
    pub async fn exec(
        &self,
        ctx: &ExecContext,
        spec: Arc<Spec>,
        state: &mut PipelineState,
    ) -> Result<(), PodrunError> {
        if ctx.is_cancelled() {
            state.cancel();
            state.finalize();
            return Err(PodrunError::Cancelled);
        }

        state.begin();
        info!(pod = %spec.pod.name, steps = spec.steps.len(), "stage started");

        if let Err(e) = self.engine.setup(&spec).await {
            warn!(error = %e, "stage setup failed");
            state.fail_all(&e);
            self.teardown(&spec).await;
            return Err(e);
        }

        let result = self.walk(ctx, &spec, state).await;
        let interrupted = match &result {
            Ok(interrupted) => *interrupted,
            Err(_) => ctx.is_cancelled(),
        };

        if interrupted {
            state.cancel();
        }
        state.finalize();
        self.teardown(&spec).await;

        info!(status = %state.stage.status, "stage finished");
        result.map(|_| ())
    }

    async fn teardown(&self, spec: &Spec) {
        if let Err(e) = self.engine.destroy(spec).await {
            warn!(error = %e, "failed to tear down stage");
        }
    }

    /// Walk the graph. Returns true when the walk was cut short by
    /// cancellation, i.e. at least one step was killed.
    async fn walk(
        &self,
        ctx: &ExecContext,
        spec: &Arc<Spec>,
        state: &mut PipelineState,
    ) -> Result<bool, PodrunError> {
        let total = spec.steps.len();
        let index: HashMap<&str, usize> = spec
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut waiting_on = vec![0usize; total];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); total];
        for (i, step) in spec.steps.iter().enumerate() {
            for dep in &step.depends_on {
                if let Some(&d) = index.get(dep.as_str()) {
                    waiting_on[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: VecDeque<usize> = (0..total).filter(|&i| waiting_on[i] == 0).collect();
        let permits = match self.config.procs {
            0 => total.max(1),
            n => n,
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks: JoinSet<(usize, Outcome)> = JoinSet::new();
        let mut done = 0;
        let mut interrupted = false;

        loop {
            while let Some(&i) = ready.front() {
                let step = &spec.steps[i];
                let resolved = if step.run_policy == RunPolicy::Never {
                    true
                } else if ctx.is_cancelled() {
                    state.kill(&step.name);
                    interrupted = true;
                    true
                } else {
                    // the run policy is judged only once a slot is free
                    let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                        break;
                    };
                    self.dispatch(ctx, spec, i, state, permit, &mut tasks)
                };
                ready.pop_front();
                if resolved {
                    done += 1;
                    release(i, &dependents, &mut waiting_on, &mut ready);
                }
            }

            if done == total {
                return Ok(interrupted);
            }
            if tasks.is_empty() {
                return Err(PodrunError::ExecutionFailed {
                    message: format!(
                        "dependency graph stalled with {} step(s) unresolved",
                        total - done
                    ),
                });
            }

            match tasks.join_next().await {
                Some(Ok((i, outcome))) => {
                    if matches!(outcome, Outcome::Killed) {
                        interrupted = true;
                    }
                    record(state, &spec.steps[i], outcome);
                    done += 1;
                    release(i, &dependents, &mut waiting_on, &mut ready);
                }
                Some(Err(e)) => {
                    return Err(PodrunError::ExecutionFailed {
                        message: format!("step task aborted: {}", e),
                    });
                }
                None => {}
            }
        }
    }

    /// Gate a step holding a free slot against the current aggregate
    /// status. Returns true when it was skipped instead of spawned.
    fn dispatch(
        &self,
        ctx: &ExecContext,
        spec: &Arc<Spec>,
        i: usize,
        state: &mut PipelineState,
        permit: OwnedSemaphorePermit,
        tasks: &mut JoinSet<(usize, Outcome)>,
    ) -> bool {
        let step = &spec.steps[i];

        let runnable = match step.run_policy {
            RunPolicy::Always => true,
            RunPolicy::OnFailure => state.failed(),
            RunPolicy::OnSuccess => !state.failed(),
            RunPolicy::Never => false,
        };
        if !runnable {
            debug!(step = %step.name, policy = %step.run_policy, "step skipped");
            state.skip(&step.name);
            return true;
        }

        debug!(step = %step.name, "step running");
        state.start(&step.name);

        let engine = Arc::clone(&self.engine);
        let spec = Arc::clone(spec);
        let ctx = ctx.clone();
        let config = self.config;

        tasks.spawn(async move {
            let _permit = permit;
            let step = &spec.steps[i];
            let outcome = run_step(engine.as_ref(), &spec, step, &ctx, config).await;
            (i, outcome)
        });
        false
    }
}

fn release(
    i: usize,
    dependents: &[Vec<usize>],
    waiting_on: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    for &d in &dependents[i] {
        waiting_on[d] -= 1;
        if waiting_on[d] == 0 {
            ready.push_back(d);
        }
    }
}

fn record(state: &mut PipelineState, step: &Step, outcome: Outcome) {
    match outcome {
        Outcome::Exited(exit) => {
            let code = if exit.oom_killed { 137 } else { exit.exit_code };
            if exit.success() {
                info!(step = %step.name, "step passed");
            } else {
                warn!(
                    step = %step.name,
                    exit_code = code,
                    oom_killed = exit.oom_killed,
                    "step failed"
                );
            }
            state.finish(&step.name, code);
        }
        Outcome::Detached => {
            info!(step = %step.name, "detached step running");
            state.finish(&step.name, 0);
        }
        Outcome::Failed(message) => {
            warn!(step = %step.name, error = %message, "step errored");
            state.fail(&step.name, message);
        }
        Outcome::Killed => {
            info!(step = %step.name, "step killed");
            state.kill(&step.name);
        }
    }
}

async fn start_step(
    engine: &dyn Engine,
    spec: &Spec,
    step: &Step,
    start_timeout: Option<Duration>,
) -> Result<(), PodrunError> {
    match start_timeout {
        Some(limit) => tokio::time::timeout(limit, engine.start(spec, step))
            .await
            .map_err(|_| PodrunError::StepStartTimeout {
                step: step.name.clone(),
                seconds: limit.as_secs(),
            })?,
        None => engine.start(spec, step).await,
    }
}

async fn abandon(engine: &dyn Engine, spec: &Spec, step: &Step, grace: Duration) {
    match tokio::time::timeout(grace, engine.kill(spec, step)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(step = %step.name, error = %e, "failed to kill step"),
        Err(_) => warn!(step = %step.name, "step did not stop within the grace period"),
    }
}

async fn run_step(
    engine: &dyn Engine,
    spec: &Spec,
    step: &Step,
    ctx: &ExecContext,
    config: ExecerConfig,
) -> Outcome {
    let started = tokio::select! {
        res = start_step(engine, spec, step, config.start_timeout) => res,
        _ = ctx.cancelled() => {
            abandon(engine, spec, step, config.kill_grace).await;
            return Outcome::Killed;
        }
    };

    if let Err(e) = started {
        if matches!(e, PodrunError::StepStartTimeout { .. }) {
            abandon(engine, spec, step, config.kill_grace).await;
        }
        return Outcome::Failed(e.to_string());
    }

    if step.detach {
        return Outcome::Detached;
    }

    tokio::select! {
        res = engine.wait(spec, step) => match res {
            Ok(exit) => Outcome::Exited(exit),
            Err(e) => Outcome::Failed(e.to_string()),
        },
        _ = ctx.cancelled() => {
            abandon(engine, spec, step, config.kill_grace).await;
            Outcome::Killed
        }
    }
}
