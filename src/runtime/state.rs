// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Build, stage and step status tracking
//!
//! Process-local and serialisable for the `--dump` output. Only the
//! driver mutates these records once execution starts.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::{RunPolicy, Spec};
use crate::metadata::RunMetadata;

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Running,
    #[serde(rename = "success")]
    Passing,
    #[serde(rename = "failure")]
    Failing,
    Error,
    Killed,
    Skipped,
}

impl Status {
    /// No further transitions happen from a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Failing or error
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failing | Self::Error)
    }

    /// The status string used in `when.status` conditions and the dump
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passing => "success",
            Self::Failing => "failure",
            Self::Error => "error",
            Self::Killed => "killed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Status record of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub number: usize,
    pub name: String,
    pub status: Status,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub err_ignore: bool,
    #[serde(default)]
    pub started: u64,
    #[serde(default)]
    pub stopped: u64,
}

/// Status record of the stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub number: i64,
    pub name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub started: u64,
    #[serde(default)]
    pub stopped: u64,
    pub steps: Vec<StepState>,
}

/// Status record of the build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    pub number: i64,
    pub status: Status,
    #[serde(default)]
    pub started: u64,
    #[serde(default)]
    pub finished: u64,
}

/// Aggregate state of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub repo: String,
    pub build: BuildState,
    pub stage: StageState,
}

impl PipelineState {
    /// Create pending records for every step that can run
    pub fn new(meta: &RunMetadata, spec: &Spec) -> Self {
        let steps = spec
            .steps
            .iter()
            .filter(|s| s.run_policy != RunPolicy::Never)
            .enumerate()
            .map(|(i, s)| StepState {
                number: i + 1,
                name: s.name.clone(),
                status: Status::Pending,
                exit_code: 0,
                error: None,
                err_ignore: s.ignores_error(),
                started: 0,
                stopped: 0,
            })
            .collect();

        Self {
            repo: meta.repo.slug.clone(),
            build: BuildState {
                number: meta.build.number,
                status: Status::Pending,
                started: 0,
                finished: 0,
            },
            stage: StageState {
                number: meta.stage.number,
                name: meta.stage.name.clone(),
                status: Status::Pending,
                error: None,
                started: 0,
                stopped: 0,
                steps,
            },
        }
    }

    /// Get a step record by name
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.stage.steps.iter().find(|s| s.name == name)
    }

    fn step_mut(&mut self, name: &str) -> Option<&mut StepState> {
        self.stage.steps.iter_mut().find(|s| s.name == name)
    }

    /// Mark the build and stage running
    pub fn begin(&mut self) {
        let t = now();
        self.build.status = Status::Running;
        self.build.started = t;
        self.stage.status = Status::Running;
        self.stage.started = t;
    }

    /// Whether the aggregate has moved towards a failing outcome
    pub fn failed(&self) -> bool {
        self.stage.status.is_failed()
    }

    fn set_aggregate(&mut self, status: Status) {
        // error outranks failure
        if self.stage.status == Status::Error {
            return;
        }
        self.stage.status = status;
        self.build.status = status;
    }

    /// Mark a step running
    pub fn start(&mut self, name: &str) {
        if let Some(step) = self.step_mut(name) {
            if !step.status.is_terminal() {
                step.status = Status::Running;
                step.started = now();
            }
        }
    }

    /// Record a step exit
    pub fn finish(&mut self, name: &str, exit_code: i32) {
        let Some(step) = self.step_mut(name) else {
            return;
        };
        if step.status.is_terminal() {
            return;
        }
        step.exit_code = exit_code;
        step.stopped = now();
        if step.started == 0 {
            step.started = step.stopped;
        }
        step.status = if exit_code == 0 {
            Status::Passing
        } else {
            Status::Failing
        };
        let flips = exit_code != 0 && !step.err_ignore;
        if flips {
            self.set_aggregate(Status::Failing);
        }
    }

    /// Record a step that could not be executed
    pub fn fail(&mut self, name: &str, error: impl ToString) {
        let Some(step) = self.step_mut(name) else {
            return;
        };
        if step.status.is_terminal() {
            return;
        }
        step.status = Status::Error;
        step.exit_code = 255;
        step.error = Some(error.to_string());
        step.stopped = now();
        if step.started == 0 {
            step.started = step.stopped;
        }
        let flips = !step.err_ignore;
        if flips {
            self.set_aggregate(Status::Error);
        }
    }

    /// Record a step whose run policy did not allow it to run
    pub fn skip(&mut self, name: &str) {
        if let Some(step) = self.step_mut(name) {
            if !step.status.is_terminal() {
                step.status = Status::Skipped;
            }
        }
    }

    /// Record a step abandoned by cancellation
    pub fn kill(&mut self, name: &str) {
        if let Some(step) = self.step_mut(name) {
            if !step.status.is_terminal() {
                step.status = Status::Killed;
                step.exit_code = 137;
                step.stopped = now();
            }
        }
    }

    /// Fail the whole stage before any step ran
    pub fn fail_all(&mut self, error: impl ToString) {
        let message = error.to_string();
        for step in &mut self.stage.steps {
            if !step.status.is_terminal() {
                step.status = Status::Skipped;
            }
        }
        self.stage.error = Some(message);
        self.stage.status = Status::Error;
        self.build.status = Status::Error;
        self.close();
    }

    /// Kill every non-terminal step and the stage
    pub fn cancel(&mut self) {
        let names: Vec<String> = self
            .stage
            .steps
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.name.clone())
            .collect();
        for name in names {
            self.kill(&name);
        }
        self.stage.status = Status::Killed;
        self.build.status = Status::Killed;
    }

    /// Resolve the terminal stage status after the graph is exhausted
    pub fn finalize(&mut self) {
        if self.stage.status == Status::Running {
            self.stage.status = Status::Passing;
            self.build.status = Status::Passing;
        }
        for step in &mut self.stage.steps {
            if !step.status.is_terminal() {
                step.status = Status::Skipped;
            }
        }
        self.close();
    }

    fn close(&mut self) {
        let t = now();
        self.stage.stopped = t;
        self.build.finished = t;
    }

    /// Whether the process should exit non-zero
    pub fn is_unsuccessful(&self) -> bool {
        matches!(
            self.stage.status,
            Status::Error | Status::Failing | Status::Killed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ErrPolicy, Step};

    fn state(steps: &[(&str, RunPolicy, ErrPolicy)]) -> PipelineState {
        let spec = Spec {
            steps: steps
                .iter()
                .map(|(name, run, err)| Step {
                    name: name.to_string(),
                    run_policy: *run,
                    err_policy: *err,
                    ..Step::default()
                })
                .collect(),
            ..Spec::default()
        };
        let mut state = PipelineState::new(&RunMetadata::default(), &spec);
        state.begin();
        state
    }

    #[test]
    fn test_never_steps_have_no_record() {
        let s = state(&[
            ("a", RunPolicy::OnSuccess, ErrPolicy::Fail),
            ("b", RunPolicy::Never, ErrPolicy::Fail),
            ("c", RunPolicy::Always, ErrPolicy::Fail),
        ]);
        assert_eq!(s.stage.steps.len(), 2);
        assert_eq!(s.stage.steps[1].name, "c");
        assert_eq!(s.stage.steps[1].number, 2);
    }

    #[test]
    fn test_ignored_failure_keeps_aggregate() {
        let mut s = state(&[("lint", RunPolicy::OnSuccess, ErrPolicy::Ignore)]);
        s.start("lint");
        s.finish("lint", 1);
        assert_eq!(s.step("lint").unwrap().status, Status::Failing);
        assert!(!s.failed());
        s.finalize();
        assert_eq!(s.stage.status, Status::Passing);
    }

    #[test]
    fn test_error_outranks_failure() {
        let mut s = state(&[
            ("a", RunPolicy::Always, ErrPolicy::Fail),
            ("b", RunPolicy::Always, ErrPolicy::Fail),
        ]);
        s.fail("a", "backend gone");
        s.finish("b", 2);
        s.finalize();
        assert_eq!(s.stage.status, Status::Error);
        assert!(s.is_unsuccessful());
    }

    #[test]
    fn test_cancel_kills_non_terminal_steps() {
        let mut s = state(&[
            ("a", RunPolicy::OnSuccess, ErrPolicy::Fail),
            ("b", RunPolicy::OnSuccess, ErrPolicy::Fail),
            ("c", RunPolicy::OnSuccess, ErrPolicy::Fail),
        ]);
        s.start("a");
        s.finish("a", 0);
        s.start("b");
        s.cancel();
        assert_eq!(s.step("a").unwrap().status, Status::Passing);
        assert_eq!(s.step("b").unwrap().status, Status::Killed);
        assert_eq!(s.step("c").unwrap().status, Status::Killed);
        assert_eq!(s.stage.status, Status::Killed);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut s = state(&[("a", RunPolicy::OnSuccess, ErrPolicy::Fail)]);
        s.finish("a", 0);
        s.fail("a", "late error");
        assert_eq!(s.step("a").unwrap().status, Status::Passing);
    }

    #[test]
    fn test_dump_uses_status_strings() {
        let s = state(&[("a", RunPolicy::OnSuccess, ErrPolicy::Fail)]);
        let json = serde_json::to_string_pretty(&s).unwrap();
        assert!(json.contains("\"status\": \"running\""));
        assert!(json.contains("\"status\": \"pending\""));
    }
}
