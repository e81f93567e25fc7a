// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # cf-k8s-controllers - platform reconciliation on Kubernetes
//!
//! Controllers that turn the platform's tenancy and service resources into
//! cluster primitives and keep them converged.
//!
//! ## Overview
//!
//! - Organizations and Spaces become hierarchical namespaces, provisioned through
//!   subnamespace anchors and torn down child-first
//! - Roles become `RoleBinding`s in every namespace they apply to, including
//!   Spaces created later
//! - `ServiceBinding`s resolve the credentials Secret of their service instance
//!
//! Every controller is level-triggered and idempotent: it reads current state,
//! writes only what differs, and reports the outcome through status conditions.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`engine`] - Work queues, workers, backoff and watch triggers
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`store`] - Resource store trait with Kubernetes and in-memory backends
//! - [`context`] - Shared context passed to reconcilers
//! - [`config`] - Environment-driven configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use cf_k8s_controllers::crd::{RoleScope, RoleSpec, RoleSubject};
//!
//! let grant = RoleSpec {
//!     role_type: "space_developer".to_string(),
//!     subject: RoleSubject {
//!         kind: "User".to_string(),
//!         name: "alice".to_string(),
//!         namespace: None,
//!     },
//!     scope: RoleScope {
//!         kind: "Space".to_string(),
//!         name: "space-2b7c9e10-41fd".to_string(),
//!     },
//! };
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod engine;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod status_reasons;
pub mod store;

#[cfg(test)]
mod status_reasons_tests;
