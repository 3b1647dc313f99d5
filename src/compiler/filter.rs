// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Include/exclude step selection
//!
//! Forces unselected steps to never run. Dependency edges are left
//! alone and the checkout step is always kept.

use tracing::{debug, warn};

use super::graph::CLONE_STEP;
use crate::engine::{RunPolicy, Spec};

/// Step selection from `--include` / `--exclude`
#[derive(Debug, Clone, Default)]
pub struct StepFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl StepFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Apply the selection to a compiled spec. Include takes precedence.
    pub fn apply(&self, spec: &mut Spec) {
        if !self.include.is_empty() {
            if !self.exclude.is_empty() {
                warn!(
                    exclude = ?self.exclude,
                    "both include and exclude given, exclude list is ignored"
                );
            }
            for step in spec.steps.iter_mut() {
                if step.name == CLONE_STEP || self.include.contains(&step.name) {
                    continue;
                }
                debug!(step = %step.name, "step not included");
                step.run_policy = RunPolicy::Never;
            }
        } else if !self.exclude.is_empty() {
            for step in spec.steps.iter_mut() {
                if step.name != CLONE_STEP && self.exclude.contains(&step.name) {
                    debug!(step = %step.name, "step excluded");
                    step.run_policy = RunPolicy::Never;
                }
            }
        }
    }
}
