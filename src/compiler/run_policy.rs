// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Run policy resolution from `when.status` conditions

use crate::engine::RunPolicy;
use crate::manifest::Condition;

const STATUS_FAILING: &str = "failure";
const STATUS_PASSING: &str = "success";

/// Whether the condition selects both passing and failing runs
pub fn is_run_always(status: &Condition) -> bool {
    if status.is_empty() {
        return false;
    }
    status.matches(STATUS_FAILING) && status.matches(STATUS_PASSING)
}

/// Whether the condition selects failing runs
pub fn is_run_on_failure(status: &Condition) -> bool {
    if status.is_empty() {
        return false;
    }
    status.matches(STATUS_FAILING)
}

/// Resolve the run policy of a step from its status condition.
///
/// "always" is checked before "on-failure" since a condition selecting
/// both statuses also selects failures.
pub fn resolve(status: &Condition) -> RunPolicy {
    if is_run_always(status) {
        RunPolicy::Always
    } else if is_run_on_failure(status) {
        RunPolicy::OnFailure
    } else {
        RunPolicy::OnSuccess
    }
}
