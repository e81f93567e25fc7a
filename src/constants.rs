// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the platform controllers.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for Organization, Space and Role CRDs
pub const WORKLOADS_API_GROUP: &str = "workloads.cloudfoundry.org";

/// API group for `ServiceInstance` and `ServiceBinding` CRDs
pub const SERVICES_API_GROUP: &str = "services.cloudfoundry.org";

/// API version shared by all platform CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version for service CRDs (group/version)
pub const SERVICES_API_GROUP_VERSION: &str = "services.cloudfoundry.org/v1alpha1";

/// Kind name for `Organization` resource
pub const KIND_ORGANIZATION: &str = "Organization";

/// Kind name for `Space` resource
pub const KIND_SPACE: &str = "Space";

/// Kind name for `Role` resource
pub const KIND_ROLE: &str = "Role";

/// Kind name for `ServiceInstance` resource
pub const KIND_SERVICE_INSTANCE: &str = "ServiceInstance";

/// Kind name for `ServiceBinding` resource
pub const KIND_SERVICE_BINDING: &str = "ServiceBinding";

/// Kind name for hierarchical namespace anchors
pub const KIND_SUBNAMESPACE_ANCHOR: &str = "SubnamespaceAnchor";

/// RBAC API group used in role references and user subjects
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Role reference kind for platform role bindings
pub const CLUSTER_ROLE_KIND: &str = "ClusterRole";

/// Subject kind for human users
pub const SUBJECT_KIND_USER: &str = "User";

/// Subject kind for service accounts
pub const SUBJECT_KIND_SERVICE_ACCOUNT: &str = "ServiceAccount";

/// Scope kind for organization-wide grants
pub const SCOPE_KIND_ORGANIZATION: &str = "Organization";

/// Scope kind for space grants
pub const SCOPE_KIND_SPACE: &str = "Space";

// ============================================================================
// Hierarchical Namespace Constants
// ============================================================================

/// Annotation HNC places on a subnamespace pointing at its parent
pub const HNC_SUBNAMESPACE_OF_ANNOTATION: &str = "hnc.x-k8s.io/subnamespace-of";

/// Anchor state reported once the subnamespace exists
pub const ANCHOR_STATE_OK: &str = "Ok";

/// Anchor state reported when the subnamespace collides with an existing namespace
pub const ANCHOR_STATE_CONFLICT: &str = "Conflict";

/// Anchor state reported when the parent does not allow subnamespaces
pub const ANCHOR_STATE_FORBIDDEN: &str = "Forbidden";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer guarding cascade deletion of Organization and Space namespaces
pub const SUBNAMESPACE_FINALIZER: &str = "cloudfoundry.org/subnamespace-cleanup";

/// Finalizer guarding revocation of role bindings
pub const ROLE_FINALIZER: &str = "cloudfoundry.org/role-cleanup";

// ============================================================================
// Role Defaults
// ============================================================================

/// Role type that gates Organization/Space readiness
pub const ADMIN_ROLE_TYPE: &str = "admin";

/// Prefix for platform ClusterRoles
pub const CLUSTER_ROLE_PREFIX: &str = "cf-k8s-controllers";

/// Role types known out of the box
pub const DEFAULT_ROLE_TYPES: &[&str] = &[
    "admin",
    "organization_manager",
    "organization_user",
    "organization_auditor",
    "space_developer",
    "space_manager",
    "space_auditor",
];

/// Prefix for generated role binding names
pub const ROLE_BINDING_NAME_PREFIX: &str = "cf";

// ============================================================================
// Controller Defaults
// ============================================================================

/// Default namespace holding Organizations and Roles
pub const DEFAULT_ROOT_NAMESPACE: &str = "cf";

/// Default size of each controller's worker pool
pub const DEFAULT_WORKERS_PER_CONTROLLER: usize = 4;

/// Default per-reconcile deadline
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Initial backoff after the first reconcile failure (100ms)
pub const DEFAULT_BACKOFF_INITIAL_MILLIS: u64 = 100;

/// Backoff ceiling (30 seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 30;

/// Backoff multiplier (exponential growth factor)
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
pub const BACKOFF_RANDOMIZATION_FACTOR: f64 = 0.1;

/// Interval between namespace deletion confirmation polls
pub const DEFAULT_DELETION_POLL_INTERVAL_MILLIS: u64 = 250;

/// Maximum time to wait for a namespace deletion to be observable
pub const DEFAULT_DELETION_TIMEOUT_SECS: u64 = 30;

/// Delay before a watch stream is re-established after it ends
pub const WATCH_RESTART_DELAY_MILLIS: u64 = 1000;

/// Default bind address for the metrics and health server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Interval between readiness polls for admin role bindings
pub const READINESS_POLL_INTERVAL_MILLIS: u64 = 500;
