// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Utility modules
//!
//! Common utilities for the podrun CLI.

pub mod colors;

pub use colors::*;
