// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for resource store access and reconciliation.
//!
//! Reconcile failures fall into three classes that the engine routes differently:
//!
//! - **Transient** (network failure, version conflict, dependency not created yet,
//!   deletion not confirmed yet, timeout): requeued with exponential backoff.
//! - **Terminal** (spec cannot be satisfied as written): reported through a status
//!   condition by the reconciler; the engine does not requeue.
//! - **Cancelled**: the controller is shutting down.
//!
//! An expected absence, like a missing binding secret, is not an error at all: it is
//! modelled as a status condition.

use thiserror::Error;

/// Errors returned by a [`crate::store::ResourceStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object does not exist (HTTP 404).
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// `namespace/name` of the missing object
        key: String,
    },

    /// An object with the same name already exists (HTTP 409, reason `AlreadyExists`).
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Kind of the existing object
        kind: String,
        /// `namespace/name` of the existing object
        key: String,
    },

    /// The write carried a stale resource version (HTTP 409, reason `Conflict`).
    #[error("{kind} {key} was modified concurrently")]
    Conflict {
        /// Kind of the contended object
        kind: String,
        /// `namespace/name` of the contended object
        key: String,
    },

    /// The store rejected the object as malformed (HTTP 400/422).
    #[error("invalid {kind} {key}: {message}")]
    Invalid {
        /// Kind of the rejected object
        kind: String,
        /// `namespace/name` of the rejected object
        key: String,
        /// Explanation from the store
        message: String,
    },

    /// The store could not serve the request right now.
    #[error("resource store unavailable: {0}")]
    Unavailable(String),

    /// An object could not be converted between typed and dynamic form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes client error.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    /// Whether the error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Whether the error means the object already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /// Whether the error is an optimistic-concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors returned by a reconciler.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Retry later: a dependency is missing or an operation has not completed yet.
    #[error("{0}")]
    Transient(String),

    /// The resource cannot be satisfied as written; editing its `.spec` is required to make progress.
    #[error("{reason}: {message}")]
    Terminal {
        /// CamelCase reason also written to the resource's conditions
        reason: String,
        /// Human-readable explanation
        message: String,
    },

    /// The reconcile exceeded its deadline.
    #[error("reconcile timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The controller is shutting down.
    #[error("reconcile cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Build a terminal error.
    pub fn terminal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Terminal {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Whether the engine should requeue the key with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Store(StoreError::Invalid { .. }) => false,
            ReconcileError::Store(_) | ReconcileError::Transient(_) | ReconcileError::Timeout(_) => {
                true
            }
            ReconcileError::Terminal { .. } | ReconcileError::Cancelled => false,
        }
    }

    /// Short category used as a metrics label.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            ReconcileError::Store(StoreError::Conflict { .. }) => "conflict",
            ReconcileError::Store(_) => "store_error",
            ReconcileError::Transient(_) => "dependency_wait",
            ReconcileError::Terminal { .. } => "terminal",
            ReconcileError::Timeout(_) => "timeout",
            ReconcileError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
