// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for platform resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status. Messages are free text for humans.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   binding:
//!     name: ""
//!   conditions:
//!     - type: BindingSecretAvailable
//!       status: "False"
//!       reason: SecretNotFound
//!       message: "Binding secret does not exist"
//!       lastTransitionTime: "2025-11-29T23:45:00Z"
//! ```

// ============================================================================
// Condition Status Values
// ============================================================================

/// Condition holds
pub const STATUS_TRUE: &str = "True";

/// Condition does not hold
pub const STATUS_FALSE: &str = "False";

/// Condition could not be determined
pub const STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Condition Types
// ============================================================================

/// Reports whether the secret backing a `ServiceBinding` exists.
pub const CONDITION_BINDING_SECRET_AVAILABLE: &str = "BindingSecretAvailable";

/// Reports whether an Organization/Space subnamespace exists under the right parent.
pub const CONDITION_SUBNAMESPACE_READY: &str = "SubnamespaceReady";

/// Reports whether a Role spec is acceptable.
pub const CONDITION_VALID: &str = "Valid";

/// Reports whether all role bindings for a Role exist.
pub const CONDITION_READY: &str = "Ready";

// ============================================================================
// ServiceBinding Reasons
// ============================================================================

/// The referenced secret exists and was recorded in `status.binding`.
pub const REASON_SECRET_FOUND: &str = "SecretFound";

/// The referenced secret does not exist yet.
pub const REASON_SECRET_NOT_FOUND: &str = "SecretNotFound";

/// Message reported alongside [`REASON_SECRET_NOT_FOUND`].
pub const MESSAGE_SECRET_NOT_FOUND: &str = "Binding secret does not exist";

// ============================================================================
// Subnamespace Reasons
// ============================================================================

/// The anchor exists and the child namespace hangs off the expected parent.
pub const REASON_SUBNAMESPACE_CREATED: &str = "SubnamespaceCreated";

/// The anchor exists but the hierarchy controller has not created the namespace yet.
pub const REASON_SUBNAMESPACE_PENDING: &str = "SubnamespacePending";

/// The namespace exists under a different parent, or the anchor reports a conflict.
pub const REASON_SUBNAMESPACE_CONFLICT: &str = "SubnamespaceConflict";

// ============================================================================
// Role Reasons
// ============================================================================

/// The Role spec passed validation.
pub const REASON_VALID_SPEC: &str = "ValidSpec";

/// Subject kind is not `User`/`ServiceAccount`, or required subject fields are missing.
pub const REASON_INVALID_SUBJECT: &str = "InvalidSubject";

/// Scope kind is not `Organization`/`Space`, or the scope name is empty.
pub const REASON_INVALID_SCOPE: &str = "InvalidScope";

/// Role type has no ClusterRole mapping.
pub const REASON_UNKNOWN_ROLE_TYPE: &str = "UnknownRoleType";

/// Subject or role type changed after the grant was realized.
pub const REASON_IMMUTABLE_FIELD_CHANGED: &str = "ImmutableFieldChanged";

/// Every target namespace holds the role binding.
pub const REASON_ROLE_BINDINGS_CREATED: &str = "RoleBindingsCreated";
