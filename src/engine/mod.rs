// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Orchestration backends
//!
//! This module provides the backend trait the driver runs steps
//! through, the compiled specification it consumes, and a local
//! process-based implementation.

mod process;
pub mod spec;

pub use process::ProcessEngine;
pub use spec::*;

use async_trait::async_trait;

use crate::errors::PodrunError;

/// Terminal condition of a step workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepExit {
    pub exit_code: i32,
    pub oom_killed: bool,
}

impl StepExit {
    /// Create a normal exit
    pub fn code(exit_code: i32) -> Self {
        Self {
            exit_code,
            oom_killed: false,
        }
    }

    /// Whether the workload exited cleanly
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.oom_killed
    }
}

/// Trait for orchestration backends
///
/// Calls for one stage are keyed by `spec.pod`; calls for one step by
/// `step.id`. Implementations must tolerate concurrent `start`/`wait`
/// calls for different steps.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Prepare the stage workload (pod, volumes, secrets)
    async fn setup(&self, spec: &Spec) -> Result<(), PodrunError>;

    /// Create and start the step workload, returning once it is running
    async fn start(&self, spec: &Spec, step: &Step) -> Result<(), PodrunError>;

    /// Stream output until the step workload exits
    async fn wait(&self, spec: &Spec, step: &Step) -> Result<StepExit, PodrunError>;

    /// Abandon a running step
    async fn kill(&self, spec: &Spec, step: &Step) -> Result<(), PodrunError>;

    /// Tear down everything created by `setup`, including detached steps
    async fn destroy(&self, spec: &Spec) -> Result<(), PodrunError>;
}
