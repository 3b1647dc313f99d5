// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! # podrun - local CI pipeline runner
//!
//! `podrun` compiles drone-style kubernetes pipelines into executable step
//! graphs and drives them against an orchestration backend.
//!
//! ## Features
//!
//! - **Compilation** - environment layering, secrets, resources and policies
//! - **Step graphs** - serial or explicit `depends_on` graphs with a clone root
//! - **Execution** - bounded concurrency, run policies, cancellation and timeouts
//! - **Local backend** - runs step commands as host processes
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the pipeline
//! podrun lint
//!
//! # Show the step graph
//! podrun graph --format mermaid
//!
//! # Run it
//! podrun exec --trusted --secrets token=abc
//! ```

pub mod cli;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod errors;
pub mod manifest;
pub mod metadata;
pub mod resource;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use compiler::{Compiler, CompilerArgs, StepFilter};
pub use engine::{Engine, Spec};
pub use errors::{PodrunError, PodrunResult};
pub use manifest::{Manifest, Pipeline};
pub use metadata::RunMetadata;
pub use runtime::{ExecContext, Execer, PipelineState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
