// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every reconciler receives an `Arc<Context>` that contains:
//! - The resource store all reads and writes go through
//! - The controller configuration (root namespace, role mappings, timeouts)

use crate::config::ControllerConfig;
use crate::store::{ObjectApi, ResourceStore};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Resource store for cluster state
    pub store: Arc<dyn ResourceStore>,

    /// Controller configuration
    pub config: Arc<ControllerConfig>,
}

impl Context {
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, config: ControllerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Typed access to `K` in one namespace.
    #[must_use]
    pub fn namespaced<K>(&self, namespace: &str) -> ObjectApi<K>
    where
        K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
    {
        ObjectApi::namespaced(self.store.clone(), namespace)
    }

    /// Typed access to `K` across all namespaces, or to cluster-scoped `K`.
    #[must_use]
    pub fn all<K>(&self) -> ObjectApi<K>
    where
        K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
    {
        ObjectApi::all(self.store.clone())
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
