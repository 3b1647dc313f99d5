// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Pipeline execution
//!
//! The executor walks a compiled [`Spec`](crate::engine::Spec) through an
//! [`Engine`](crate::engine::Engine), recording every transition in
//! [`PipelineState`].

pub mod context;
mod execer;
pub mod state;

pub use context::{CancelReason, ExecContext};
pub use execer::{Execer, ExecerConfig};
pub use state::{PipelineState, Status};
