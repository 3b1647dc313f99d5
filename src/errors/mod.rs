// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Error types
//!
//! Errors are grouped the way a run fails: bad input stops everything
//! before the backend is touched, compile errors reject the whole
//! pipeline, and execution errors are usually absorbed into step status.
//! Only driver-level conditions surface from [`crate::runtime::Execer`].

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for podrun operations
pub type PodrunResult<T> = Result<T, PodrunError>;

/// Main error type for podrun
#[derive(Error, Debug, Diagnostic)]
pub enum PodrunError {
    // ─────────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read '{path}': {error}")]
    #[diagnostic(code(podrun::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Variable substitution failed: {message}")]
    #[diagnostic(
        code(podrun::substitution_error),
        help("Escape a literal dollar sign as '$$'")
    )]
    Substitution { message: String },

    #[error("Manifest parsing error: {message}")]
    #[diagnostic(code(podrun::parse_error))]
    Parse { message: String },

    #[error("No kubernetes pipeline named '{name}' in manifest")]
    #[diagnostic(
        code(podrun::pipeline_not_found),
        help("Pipelines must declare 'kind: pipeline' and 'type: kubernetes'")
    )]
    PipelineNotFound { name: String },

    #[error("Pipeline '{pipeline}' failed linting: {}", errors.join("; "))]
    #[diagnostic(code(podrun::lint_error))]
    Lint {
        pipeline: String,
        errors: Vec<String>,
    },

    #[error("Invalid policy file '{path}': {message}")]
    #[diagnostic(code(podrun::policy_error))]
    Policy { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(podrun::config_error))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Compile Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step '{step}' sets restricted environment variable '{variable}'")]
    #[diagnostic(
        code(podrun::restricted_variable),
        help("'{variable}' is reserved for the runner and cannot be overridden")
    )]
    RestrictedVariable { step: String, variable: String },

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    #[diagnostic(
        code(podrun::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { step: String, dependency: String },

    #[error("Circular dependency detected: {}", steps.join(" -> "))]
    #[diagnostic(
        code(podrun::circular_dependency),
        help("Review your step dependencies to remove the cycle")
    )]
    CircularDependency { steps: Vec<String> },

    #[error("Step '{step}' is invalid: {reason}")]
    #[diagnostic(code(podrun::invalid_step))]
    InvalidStep { step: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Orchestration backend unavailable: {message}")]
    #[diagnostic(code(podrun::backend_unavailable))]
    BackendUnavailable {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Step '{step}' did not start within {seconds}s")]
    #[diagnostic(
        code(podrun::step_start_timeout),
        help("Raise --engine-container-start-timeout if images are slow to pull")
    )]
    StepStartTimeout { step: String, seconds: u64 },

    #[error("Step '{step}' failed: {message}")]
    #[diagnostic(code(podrun::step_failed))]
    StepFailed { step: String, message: String },

    #[error("Execution cancelled before it started")]
    #[diagnostic(code(podrun::cancelled))]
    Cancelled,

    #[error("Execution failed: {message}")]
    #[diagnostic(code(podrun::execution_failed))]
    ExecutionFailed { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(podrun::io_error))]
    Io { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(podrun::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for PodrunError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for PodrunError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PodrunError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl PodrunError {
    /// Create a file read error for the given path
    pub fn file_read(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::FileReadError {
            path: path.into(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_steps() {
        let err = PodrunError::CircularDependency {
            steps: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }
}
