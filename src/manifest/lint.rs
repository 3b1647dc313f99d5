// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Pipeline linting
//!
//! Structural checks run before compilation. Errors block execution,
//! warnings are informational.

use std::collections::HashSet;

use crate::compiler::CLONE_STEP;
use crate::errors::PodrunError;
use crate::manifest::{Pipeline, Step};
use crate::metadata::Repo;

/// Pipeline linter
pub struct Linter;

impl Linter {
    /// Lint a pipeline in the context of the repository being built
    pub fn lint(pipeline: &Pipeline, repo: &Repo) -> LintReport {
        let mut report = LintReport::default();

        if pipeline.steps.is_empty() {
            report.add_error("Pipeline has no steps defined");
        }

        let mut seen_names = HashSet::new();
        for step in pipeline.services.iter().chain(&pipeline.steps) {
            if step.name.trim().is_empty() {
                report.add_error("Step name cannot be empty");
                continue;
            }
            if !seen_names.insert(step.name.as_str()) {
                report.add_error(&format!("Duplicate step name: '{}'", step.name));
            }
        }

        let mut known: HashSet<&str> = seen_names.clone();
        if !pipeline.clone.disable {
            known.insert(CLONE_STEP);
        }

        for step in &pipeline.steps {
            Self::lint_step(step, pipeline, &known, repo, &mut report);
        }
        for service in &pipeline.services {
            Self::lint_step(service, pipeline, &known, repo, &mut report);
        }

        if !repo.trusted {
            for volume in &pipeline.volumes {
                if volume.host.is_some() {
                    report.add_error(&format!(
                        "Untrusted repositories cannot mount host volumes (volume '{}')",
                        volume.name
                    ));
                }
            }
        }

        report
    }

    fn lint_step(
        step: &Step,
        pipeline: &Pipeline,
        known: &HashSet<&str>,
        repo: &Repo,
        report: &mut LintReport,
    ) {
        if step.image.trim().is_empty() {
            report.add_error(&format!("Step '{}': Invalid or missing image", step.name));
        }

        if step.name == CLONE_STEP && !pipeline.clone.disable {
            report.add_error(&format!(
                "Step name '{}' is reserved while cloning is enabled",
                CLONE_STEP
            ));
        }

        for dep in &step.depends_on {
            if dep == &step.name {
                report.add_error(&format!("Step '{}' depends on itself", step.name));
            } else if !known.contains(dep.as_str()) {
                report.add_error(&format!(
                    "Step '{}' depends on unknown step '{}'",
                    step.name, dep
                ));
            }
        }

        if step.privileged && !repo.trusted {
            report.add_error(&format!(
                "Step '{}': Untrusted repositories cannot enable privileged mode",
                step.name
            ));
        }

        for mount in &step.volumes {
            if !pipeline.volumes.iter().any(|v| v.name == mount.name) {
                report.add_error(&format!(
                    "Step '{}' mounts unknown volume '{}'",
                    step.name, mount.name
                ));
            }
        }

        if step.detach && !step.depends_on.is_empty() {
            report.add_warning(&format!(
                "Step '{}' is detached; steps depending on it start as soon as it is running",
                step.name
            ));
        }

        if !step.commands.is_empty() && !step.settings.is_empty() {
            report.add_warning(&format!(
                "Step '{}' declares both commands and plugin settings",
                step.name
            ));
        }
    }
}

/// Result of linting a pipeline
#[derive(Debug, Default)]
pub struct LintReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LintReport {
    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Convert to an error when any rule is broken
    pub fn into_result(self, pipeline: &str) -> Result<Vec<String>, PodrunError> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(PodrunError::Lint {
                pipeline: pipeline.to_string(),
                errors: self.errors,
            })
        }
    }
}
