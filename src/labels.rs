// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and platform-specific labels
//! to ensure consistency across all resources created by the controllers.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/managed-by` on everything these controllers create
pub const MANAGED_BY_CONTROLLERS: &str = "cf-k8s-controllers";

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_PLATFORM: &str = "cloudfoundry";

// ============================================================================
// Platform-Specific Labels
// ============================================================================

/// Name of the Role that first realized a role binding
pub const ROLE_NAME_LABEL: &str = "cloudfoundry.org/role-name";

/// Role type (e.g. `space_developer`) realized by a role binding
pub const ROLE_TYPE_LABEL: &str = "cloudfoundry.org/role-type";

/// Organization or Space identifier recorded on subnamespace anchors
pub const OWNER_NAME_LABEL: &str = "cloudfoundry.org/owner-name";

/// Labels applied to every role binding realized for a Role.
#[must_use]
pub fn role_binding_labels(role_name: &str, role_type: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROLLERS.to_string()),
        (K8S_PART_OF.to_string(), PART_OF_PLATFORM.to_string()),
        (ROLE_NAME_LABEL.to_string(), role_name.to_string()),
        (ROLE_TYPE_LABEL.to_string(), role_type.to_string()),
    ])
}

/// Labels applied to subnamespace anchors.
#[must_use]
pub fn anchor_labels(owner_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROLLERS.to_string()),
        (K8S_PART_OF.to_string(), PART_OF_PLATFORM.to_string()),
        (OWNER_NAME_LABEL.to_string(), owner_name.to_string()),
    ])
}

/// Whether a label set marks an object as created by these controllers.
#[must_use]
pub fn is_managed(labels: &BTreeMap<String, String>) -> bool {
    labels.get(K8S_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_CONTROLLERS)
}
