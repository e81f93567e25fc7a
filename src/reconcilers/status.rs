// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers shared by every controller.
//!
//! # Condition Format
//!
//! Conditions follow the standard Kubernetes format:
//! - `type`: The aspect of the resource being reported (e.g., "Ready")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp of the last `status` change
//!
//! A status holds at most one condition per type. [`set_condition`] upserts by
//! type and leaves the list untouched when nothing changed, so re-running a
//! converged reconcile produces byte-identical conditions.
//!
//! # Example
//!
//! ```rust
//! use cf_k8s_controllers::reconcilers::status::{set_condition, is_condition_true};
//!
//! let mut conditions = Vec::new();
//! assert!(set_condition(&mut conditions, "Ready", "True", "RoleBindingsCreated", ""));
//! assert!(!set_condition(&mut conditions, "Ready", "True", "RoleBindingsCreated", ""));
//! assert!(is_condition_true(&conditions, "Ready"));
//! ```

use crate::crd::Condition;
use crate::status_reasons::STATUS_TRUE;
use chrono::{SecondsFormat, Utc};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Create a new condition stamped with the current time.
///
/// # Example
///
/// ```rust
/// # use cf_k8s_controllers::reconcilers::status::create_condition;
/// let condition = create_condition("BindingSecretAvailable", "True", "SecretFound", "");
/// assert_eq!(condition.r#type, "BindingSecretAvailable");
/// assert!(condition.last_transition_time.is_some());
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Some(now()),
    }
}

/// Upsert a condition by type.
///
/// - No condition of this type yet: append one stamped with the current time.
/// - Same status, reason and message: nothing happens.
/// - Otherwise the fields are overwritten; `lastTransitionTime` only moves when
///   `status` itself changes.
///
/// # Returns
///
/// `true` if the list was modified.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> bool {
    let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) else {
        conditions.push(create_condition(condition_type, status, reason, message));
        return true;
    };

    if existing.status == status && existing.reason == reason && existing.message == message {
        return false;
    }

    if existing.status != status || existing.last_transition_time.is_none() {
        existing.last_transition_time = Some(now());
    }
    existing.status = status.to_string();
    existing.reason = reason.to_string();
    existing.message = message.to_string();
    true
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Whether the condition of this type exists and is `True`.
#[must_use]
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == STATUS_TRUE)
}

/// Compare two condition lists ignoring `lastTransitionTime` and order.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        find_condition(current, &new_cond.r#type).is_some_and(|curr| {
            curr.status == new_cond.status
                && curr.reason == new_cond.reason
                && curr.message == new_cond.message
        })
    })
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
