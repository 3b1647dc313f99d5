// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};
use std::io::IsTerminal;

use crate::runtime::Status;

/// Style for success messages
pub fn success(msg: &str) -> ColoredString {
    msg.green()
}

/// Style for error messages
pub fn error(msg: &str) -> ColoredString {
    msg.red()
}

/// Style for warning messages
pub fn warning(msg: &str) -> ColoredString {
    msg.yellow()
}

/// Style a run status
pub fn status(status: Status) -> ColoredString {
    let text = status.as_str();
    match status {
        Status::Passing => success(text),
        Status::Failing | Status::Error => error(text).bold(),
        Status::Killed => warning(text).bold(),
        Status::Skipped => text.dimmed(),
        Status::Pending | Status::Running => text.blue(),
    }
}

/// Check if colors should be used
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_preserved() {
        colored::control::set_override(false);
        assert_eq!(status(Status::Passing).to_string(), "success");
        assert_eq!(status(Status::Failing).to_string(), "failure");
        assert_eq!(status(Status::Skipped).to_string(), "skipped");
        colored::control::unset_override();
    }
}
