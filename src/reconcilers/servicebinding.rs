// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ServiceBinding` reconciliation.
//!
//! Resolves the credentials Secret of the bound `ServiceInstance` into
//! `status.binding.name`. A missing Secret is an expected state rather than an
//! error: the binding reports `BindingSecretAvailable=False` and is re-enqueued by
//! the Secret watch as soon as the Secret shows up.

use crate::context::Context;
use crate::crd::{ServiceBinding, ServiceInstance};
use crate::engine::index::DependencyIndex;
use crate::engine::{Action, Reconciler};
use crate::errors::ReconcileError;
use crate::reconcilers::status::set_condition;
use crate::status_reasons::{
    CONDITION_BINDING_SECRET_AVAILABLE, MESSAGE_SECRET_NOT_FOUND, REASON_SECRET_FOUND,
    REASON_SECRET_NOT_FOUND, STATUS_FALSE, STATUS_TRUE,
};
use crate::store::ObjectKey;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use std::sync::Arc;
use tracing::debug;

/// Reconciler for `ServiceBinding`.
pub struct ServiceBindingReconciler {
    ctx: Arc<Context>,
    secrets: Arc<DependencyIndex>,
    instances: Arc<DependencyIndex>,
}

impl ServiceBindingReconciler {
    /// `secrets` and `instances` are shared with the Secret and `ServiceInstance`
    /// watch mappers.
    #[must_use]
    pub fn new(
        ctx: Arc<Context>,
        secrets: Arc<DependencyIndex>,
        instances: Arc<DependencyIndex>,
    ) -> Self {
        Self {
            ctx,
            secrets,
            instances,
        }
    }
}

#[async_trait]
impl Reconciler for ServiceBindingReconciler {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let namespace = key.namespace.clone().unwrap_or_default();
        let api = self.ctx.namespaced::<ServiceBinding>(&namespace);
        let Some(binding) = api.get(&key.name).await? else {
            self.secrets.forget(key);
            self.instances.forget(key);
            return Ok(Action::AwaitChange);
        };

        let instance_name = &binding.spec.service.name;
        self.instances
            .replace(key, [ObjectKey::namespaced(&namespace, instance_name)]);
        let Some(instance) = self
            .ctx
            .namespaced::<ServiceInstance>(&namespace)
            .get(instance_name)
            .await?
        else {
            self.secrets.forget(key);
            return Err(ReconcileError::Transient(format!(
                "service instance {namespace}/{instance_name} not found"
            )));
        };

        let secret_name = &instance.spec.secret_name;
        self.secrets
            .replace(key, [ObjectKey::namespaced(&namespace, secret_name)]);
        let secret = self
            .ctx
            .namespaced::<Secret>(&namespace)
            .get(secret_name)
            .await?;

        let mut status = binding.status.clone().unwrap_or_default();
        let before = status.clone();
        match secret {
            Some(_) => {
                status.binding.name.clone_from(secret_name);
                set_condition(
                    &mut status.conditions,
                    CONDITION_BINDING_SECRET_AVAILABLE,
                    STATUS_TRUE,
                    REASON_SECRET_FOUND,
                    "",
                );
            }
            None => {
                debug!(
                    "Secret {}/{} for binding {} not found yet",
                    namespace, secret_name, key
                );
                status.binding.name.clear();
                set_condition(
                    &mut status.conditions,
                    CONDITION_BINDING_SECRET_AVAILABLE,
                    STATUS_FALSE,
                    REASON_SECRET_NOT_FOUND,
                    MESSAGE_SECRET_NOT_FOUND,
                );
            }
        }
        status.observed_generation = binding.metadata.generation;

        if status != before {
            let mut updated = binding;
            updated.status = Some(status);
            api.replace_status(&updated).await?;
        }
        Ok(Action::AwaitChange)
    }
}

/// Watch mapper: enqueue the bindings that looked up the changed object.
#[must_use]
pub fn interested_bindings(index: &DependencyIndex, obj: &DynamicObject) -> Vec<ObjectKey> {
    match (&obj.metadata.namespace, &obj.metadata.name) {
        (Some(namespace), Some(name)) => index.dependents_of(&ObjectKey::namespaced(namespace, name)),
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "servicebinding_tests.rs"]
mod servicebinding_tests;
