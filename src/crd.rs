// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for the application platform.
//!
//! This module defines the platform resources these controllers reconcile, plus the
//! hierarchical namespace anchor they drive.
//!
//! # Resource Types
//!
//! ## Tenancy
//!
//! - [`Organization`] - Top-level tenant, mapped 1:1 onto a namespace under the root
//! - [`Space`] - Tenant subdivision, mapped onto a namespace under its Organization
//! - [`Role`] - Grant of a platform role to a user or service account
//!
//! ## Services
//!
//! - [`ServiceInstance`] - Provisioned backing service and the secret holding its credentials
//! - [`ServiceBinding`] - An app's binding to a service instance
//!
//! ## Hierarchy
//!
//! - [`SubnamespaceAnchor`] - Hierarchical Namespace Controller anchor (`hnc.x-k8s.io`)
//!
//! # Example: Binding an App to a Service
//!
//! ```rust,no_run
//! use cf_k8s_controllers::crd::{LocalRef, ServiceBindingSpec, ServiceRef};
//!
//! let spec = ServiceBindingSpec {
//!     display_name: None,
//!     service: ServiceRef {
//!         kind: "ServiceInstance".to_string(),
//!         name: "service-instance-guid".to_string(),
//!         api_version: "services.cloudfoundry.org/v1alpha1".to_string(),
//!     },
//!     app_ref: LocalRef { name: "app-guid".to_string() },
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents an observation of a resource's current state.
///
/// At most one condition of each `type` appears in a status. See
/// [`crate::reconcilers::status::set_condition`] for the upsert rules.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `BindingSecretAvailable`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(default)]
    pub reason: String,

    /// Human-readable message indicating details about the transition.
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Status shared by Organization and Space.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `Organization` is the top-level tenant of the platform.
///
/// The resource lives in the root namespace and its name is used verbatim as the
/// name of the namespace created for it.
///
/// # Example
///
/// ```yaml
/// apiVersion: workloads.cloudfoundry.org/v1alpha1
/// kind: Organization
/// metadata:
///   name: org-5f1d6c2e-8a9b
///   namespace: cf
/// spec:
///   displayName: my-org
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workloads.cloudfoundry.org",
    version = "v1alpha1",
    kind = "Organization",
    namespaced,
    shortname = "cforg",
    doc = "Organization is a platform tenant. Each Organization owns a subnamespace of the root namespace named after it."
)]
#[kube(status = "TenantStatus")]
#[kube(printcolumn = r#"{"name":"Display Name","type":"string","jsonPath":".spec.displayName"}"#)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    /// Human-readable name shown by the platform API.
    pub display_name: String,
}

/// `Space` subdivides an Organization.
///
/// The resource lives in its Organization's namespace; that namespace becomes the
/// parent of the namespace created for the Space.
///
/// # Example
///
/// ```yaml
/// apiVersion: workloads.cloudfoundry.org/v1alpha1
/// kind: Space
/// metadata:
///   name: space-2b7c9e10-41fd
///   namespace: org-5f1d6c2e-8a9b
/// spec:
///   displayName: dev
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workloads.cloudfoundry.org",
    version = "v1alpha1",
    kind = "Space",
    namespaced,
    shortname = "cfspace",
    doc = "Space is a subdivision of an Organization. Each Space owns a subnamespace of its Organization's namespace."
)]
#[kube(status = "TenantStatus")]
#[kube(printcolumn = r#"{"name":"Display Name","type":"string","jsonPath":".spec.displayName"}"#)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    /// Human-readable name shown by the platform API.
    pub display_name: String,
}

/// Identity a Role is granted to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleSubject {
    /// `User` or `ServiceAccount`.
    pub kind: String,

    /// User name, or service account name.
    pub name: String,

    /// Namespace of the service account. Required for `ServiceAccount` subjects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Tenant a Role applies to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleScope {
    /// `Organization` or `Space`.
    pub kind: String,

    /// Identifier of the Organization or Space.
    pub name: String,
}

/// `Role` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Name of the role binding realized for this grant, once known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role_binding: String,
}

/// `Role` grants a platform role to a subject within an Organization or Space.
///
/// Roles are immutable once realized: to change the subject or role type, delete the
/// Role and create a new one.
///
/// # Example
///
/// ```yaml
/// apiVersion: workloads.cloudfoundry.org/v1alpha1
/// kind: Role
/// metadata:
///   name: role-3a5e
///   namespace: cf
/// spec:
///   roleType: organization_manager
///   subject:
///     kind: User
///     name: alice
///   scope:
///     kind: Organization
///     name: org-5f1d6c2e-8a9b
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workloads.cloudfoundry.org",
    version = "v1alpha1",
    kind = "Role",
    namespaced,
    shortname = "cfrole",
    doc = "Role grants a platform role to a user or service account within an Organization or Space. Organization grants also apply to every Space of the Organization."
)]
#[kube(status = "RoleStatus")]
#[kube(printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.roleType"}"#)]
#[kube(printcolumn = r#"{"name":"Subject","type":"string","jsonPath":".spec.subject.name"}"#)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Platform role type, e.g. `admin` or `space_developer`.
    pub role_type: String,

    /// Who receives the role.
    pub subject: RoleSubject,

    /// Where the role applies.
    pub scope: RoleScope,
}

/// `ServiceInstance` describes a provisioned backing service.
///
/// # Example
///
/// ```yaml
/// apiVersion: services.cloudfoundry.org/v1alpha1
/// kind: ServiceInstance
/// metadata:
///   name: service-instance-guid
///   namespace: space-2b7c9e10-41fd
/// spec:
///   displayName: my-db
///   secretName: my-db-credentials
///   type: user-provided
///   tags: []
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "services.cloudfoundry.org",
    version = "v1alpha1",
    kind = "ServiceInstance",
    namespaced,
    shortname = "cfsi",
    doc = "ServiceInstance is a provisioned backing service whose credentials are held in a Secret of the same namespace."
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceSpec {
    /// Human-readable name shown by the platform API.
    pub display_name: String,

    /// Name of the Secret expected to hold the credentials.
    pub secret_name: String,

    /// Instance type tag, e.g. `user-provided`.
    #[serde(rename = "type")]
    pub service_type: String,

    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reference to the service a binding points at.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub api_version: String,
}

/// Reference to an object in the same namespace.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
pub struct LocalRef {
    #[serde(default)]
    pub name: String,
}

/// `ServiceBinding` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingStatus {
    /// Secret resolved for this binding. Empty until the secret exists.
    #[serde(default)]
    pub binding: LocalRef,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `ServiceBinding` binds an app to a service instance.
///
/// # Example
///
/// ```yaml
/// apiVersion: services.cloudfoundry.org/v1alpha1
/// kind: ServiceBinding
/// metadata:
///   name: binding-guid
///   namespace: space-2b7c9e10-41fd
/// spec:
///   service:
///     kind: ServiceInstance
///     name: service-instance-guid
///     apiVersion: services.cloudfoundry.org/v1alpha1
///   appRef:
///     name: app-guid
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "services.cloudfoundry.org",
    version = "v1alpha1",
    kind = "ServiceBinding",
    namespaced,
    shortname = "cfsb",
    doc = "ServiceBinding binds an app to a ServiceInstance. The controller resolves the instance's credentials Secret into status.binding."
)]
#[kube(status = "ServiceBindingStatus")]
#[kube(printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.binding.name"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// The service instance to bind.
    pub service: ServiceRef,

    /// The app receiving the binding.
    pub app_ref: LocalRef,
}

/// `SubnamespaceAnchor` status as reported by the Hierarchical Namespace Controller.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct SubnamespaceAnchorStatus {
    /// `Ok`, `Missing`, `Conflict` or `Forbidden`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// `SubnamespaceAnchor` asks the Hierarchical Namespace Controller to create a
/// namespace named after the anchor, as a child of the anchor's namespace.
///
/// Deleting the anchor deletes the subnamespace.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "hnc.x-k8s.io",
    version = "v1alpha2",
    kind = "SubnamespaceAnchor",
    plural = "subnamespaceanchors",
    namespaced
)]
#[kube(status = "SubnamespaceAnchorStatus")]
pub struct SubnamespaceAnchorSpec {}
