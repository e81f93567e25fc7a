// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Subnamespace provisioning for Organizations and Spaces.
//!
//! Each Organization and Space owns a namespace named after the resource, created
//! as a child of the namespace the resource lives in:
//!
//! ```text
//! cf                      (root namespace: Organizations, Roles)
//! └── org-5f1d            (Organization namespace: Spaces)
//!     └── space-2b7c      (Space namespace: apps, service instances, bindings)
//! ```
//!
//! The namespace is requested through a `SubnamespaceAnchor` in the parent
//! namespace; the hierarchy controller creates it and reports back through the
//! anchor status and the `hnc.x-k8s.io/subnamespace-of` annotation.
//!
//! Deletion cascades: child anchors are deleted concurrently and recursively, and
//! the parent anchor only goes once every child is confirmed gone.

use crate::constants::{
    ANCHOR_STATE_CONFLICT, ANCHOR_STATE_FORBIDDEN, HNC_SUBNAMESPACE_OF_ANNOTATION,
    KIND_SUBNAMESPACE_ANCHOR, SUBNAMESPACE_FINALIZER,
};
use crate::context::Context;
use crate::crd::{Condition, Organization, Space, SubnamespaceAnchor, TenantStatus};
use crate::engine::{Action, Reconciler};
use crate::errors::ReconcileError;
use crate::labels::anchor_labels;
use crate::metrics;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::status::set_condition;
use crate::status_reasons::{
    CONDITION_SUBNAMESPACE_READY, REASON_SUBNAMESPACE_CONFLICT, REASON_SUBNAMESPACE_CREATED,
    REASON_SUBNAMESPACE_PENDING, STATUS_FALSE, STATUS_TRUE,
};
use crate::store::{is_deleting, ObjectKey};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DynamicObject, ObjectMeta};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A platform resource that owns a subnamespace of the namespace it lives in.
pub trait Tenant:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Whether the parent namespace belongs to an Organization that must exist first.
    const NESTED: bool;

    fn conditions(&self) -> Vec<Condition>;

    fn set_conditions(&mut self, conditions: Vec<Condition>);
}

impl Tenant for Organization {
    const NESTED: bool = false;

    fn conditions(&self) -> Vec<Condition> {
        self.status.clone().unwrap_or_default().conditions
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status = Some(TenantStatus { conditions });
    }
}

impl Tenant for Space {
    const NESTED: bool = true;

    fn conditions(&self) -> Vec<Condition> {
        self.status.clone().unwrap_or_default().conditions
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status = Some(TenantStatus { conditions });
    }
}

/// Outcome of ensuring a subnamespace exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubnamespaceState {
    /// Anchor and namespace exist under the expected parent.
    Ready,
    /// Anchor exists; the namespace has not appeared yet.
    Pending,
}

/// Reconciler for Organizations (`T = Organization`) and Spaces (`T = Space`).
pub struct SubnamespaceReconciler<T> {
    ctx: Arc<Context>,
    _tenant: PhantomData<fn() -> T>,
}

impl<T: Tenant> SubnamespaceReconciler<T> {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            _tenant: PhantomData,
        }
    }

    async fn finalize(&self, tenant: &T, parent: &str) -> Result<Action, ReconcileError> {
        if !has_finalizer(tenant, SUBNAMESPACE_FINALIZER) {
            return Ok(Action::AwaitChange);
        }
        let name = tenant.name_any();
        info!("Deleting subnamespace of {} {}/{}", T::kind(&()), parent, name);
        delete_subnamespace(&self.ctx, parent, &name).await?;
        remove_finalizer(&self.ctx.namespaced::<T>(parent), tenant, SUBNAMESPACE_FINALIZER)
            .await?;
        Ok(Action::AwaitChange)
    }

    /// For a Space: `Ok(false)` when its Organization is being deleted.
    async fn parent_organization_live(&self, parent: &str) -> Result<bool, ReconcileError> {
        if !T::NESTED {
            return Ok(true);
        }
        let root = &self.ctx.config.root_namespace;
        match self.ctx.namespaced::<Organization>(root).get(parent).await? {
            None => Err(ReconcileError::Transient(format!(
                "organization {parent} does not exist yet"
            ))),
            Some(org) if is_deleting(&org) => Ok(false),
            Some(_) => Ok(true),
        }
    }
}

#[async_trait]
impl<T: Tenant> Reconciler for SubnamespaceReconciler<T> {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(parent) = key.namespace.clone() else {
            return Ok(Action::AwaitChange);
        };
        let api = self.ctx.namespaced::<T>(&parent);
        let Some(tenant) = api.get(&key.name).await? else {
            debug!("{} {} no longer exists", T::kind(&()), key);
            return Ok(Action::AwaitChange);
        };

        if is_deleting(&tenant) {
            return self.finalize(&tenant, &parent).await;
        }

        if !self.parent_organization_live(&parent).await? {
            info!(
                "Organization {} is being deleted, not provisioning {} {}",
                parent,
                T::kind(&()),
                key
            );
            return Ok(Action::AwaitChange);
        }

        let mut tenant = ensure_finalizer(&api, &tenant, SUBNAMESPACE_FINALIZER).await?;

        let (result, status, reason, message) =
            match ensure_subnamespace(&self.ctx, &parent, &key.name).await {
                Ok(SubnamespaceState::Ready) => (
                    Ok(()),
                    STATUS_TRUE,
                    REASON_SUBNAMESPACE_CREATED.to_string(),
                    String::new(),
                ),
                Ok(SubnamespaceState::Pending) => (
                    Ok(()),
                    STATUS_FALSE,
                    REASON_SUBNAMESPACE_PENDING.to_string(),
                    format!("waiting for namespace {}", key.name),
                ),
                Err(ReconcileError::Terminal { reason, message }) => (
                    Err(ReconcileError::terminal(reason.clone(), message.clone())),
                    STATUS_FALSE,
                    reason,
                    message,
                ),
                Err(e) => return Err(e),
            };

        let mut conditions = tenant.conditions();
        if set_condition(
            &mut conditions,
            CONDITION_SUBNAMESPACE_READY,
            status,
            &reason,
            &message,
        ) {
            tenant.set_conditions(conditions);
            api.replace_status(&tenant).await?;
        }

        result.map(|()| Action::AwaitChange)
    }
}

fn new_anchor(parent: &str, name: &str) -> SubnamespaceAnchor {
    SubnamespaceAnchor {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(parent.to_string()),
            labels: Some(anchor_labels(name)),
            ..Default::default()
        },
        spec: Default::default(),
        status: None,
    }
}

/// The parent recorded by the hierarchy controller on a namespace.
#[must_use]
pub fn subnamespace_parent(namespace: &Namespace) -> Option<&str> {
    namespace
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(HNC_SUBNAMESPACE_OF_ANNOTATION))
        .map(String::as_str)
}

/// Make sure an anchor named `name` exists in `parent` and that the namespace it
/// produced belongs to `parent`.
///
/// # Errors
///
/// Returns a terminal `SubnamespaceConflict` error if the anchor reports a
/// conflict or the namespace hangs off a different parent. Store failures are
/// returned as transient errors.
pub async fn ensure_subnamespace(
    ctx: &Context,
    parent: &str,
    name: &str,
) -> Result<SubnamespaceState, ReconcileError> {
    let anchors = ctx.namespaced::<SubnamespaceAnchor>(parent);
    let anchor = match anchors.get(name).await? {
        Some(anchor) => anchor,
        None => match anchors.create(&new_anchor(parent, name)).await {
            Ok(anchor) => {
                info!("Created subnamespace anchor {}/{}", parent, name);
                metrics::record_resource_created(KIND_SUBNAMESPACE_ANCHOR);
                anchor
            }
            Err(e) if e.is_already_exists() => {
                anchors.get(name).await?.ok_or_else(|| {
                    ReconcileError::Transient(format!("anchor {parent}/{name} vanished"))
                })?
            }
            Err(e) => return Err(e.into()),
        },
    };

    let anchor_state = anchor.status.as_ref().and_then(|s| s.status.as_deref());
    if matches!(anchor_state, Some(ANCHOR_STATE_CONFLICT | ANCHOR_STATE_FORBIDDEN)) {
        return Err(ReconcileError::terminal(
            REASON_SUBNAMESPACE_CONFLICT,
            format!(
                "anchor {parent}/{name} reports {}",
                anchor_state.unwrap_or_default()
            ),
        ));
    }

    let Some(namespace) = ctx.all::<Namespace>().get(name).await? else {
        return Ok(SubnamespaceState::Pending);
    };
    match subnamespace_parent(&namespace) {
        Some(actual) if actual != parent => Err(ReconcileError::terminal(
            REASON_SUBNAMESPACE_CONFLICT,
            format!("namespace {name} is a subnamespace of {actual}, expected {parent}"),
        )),
        _ => Ok(SubnamespaceState::Ready),
    }
}

/// Delete the subnamespace `name` of `parent` and, first, every subnamespace
/// beneath it.
///
/// Children are deleted concurrently. If any child fails the first error is
/// returned and `name` itself is left in place, so a retry resumes where this
/// attempt stopped.
///
/// # Errors
///
/// Returns the first child failure, a store failure, or a transient error if the
/// namespace is still present after the configured deletion timeout.
pub fn delete_subnamespace<'a>(
    ctx: &'a Context,
    parent: &'a str,
    name: &'a str,
) -> BoxFuture<'a, Result<(), ReconcileError>> {
    async move {
        let children = ctx.namespaced::<SubnamespaceAnchor>(name).list().await?;
        if !children.is_empty() {
            debug!(
                "Deleting {} child subnamespaces of {}",
                children.len(),
                name
            );
            let mut tasks = JoinSet::new();
            for child in children {
                let ctx = ctx.clone();
                let parent = name.to_string();
                let child_name = child.name_any();
                tasks.spawn(async move { delete_subnamespace(&ctx, &parent, &child_name).await });
            }

            let mut first_error = None;
            while let Some(joined) = tasks.join_next().await {
                let result = joined
                    .map_err(|e| ReconcileError::Transient(format!("child deletion task failed: {e}")))
                    .and_then(|r| r);
                if let Err(e) = result {
                    warn!("Failed to delete a subnamespace of {}: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        match ctx.namespaced::<SubnamespaceAnchor>(parent).delete(name).await {
            Ok(()) => {
                info!("Deleted subnamespace anchor {}/{}", parent, name);
                metrics::record_resource_deleted(KIND_SUBNAMESPACE_ANCHOR);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        wait_for_deletion(ctx, parent, name).await
    }
    .boxed()
}

/// Poll until both the anchor and the namespace it produced are gone.
async fn wait_for_deletion(ctx: &Context, parent: &str, name: &str) -> Result<(), ReconcileError> {
    let deadline = Instant::now() + ctx.config.deletion_timeout;
    let anchors = ctx.namespaced::<SubnamespaceAnchor>(parent);
    let namespaces = ctx.all::<Namespace>();

    loop {
        let anchor_gone = anchors.get(name).await?.is_none();
        // A namespace under another parent was never ours to delete
        let namespace_gone = namespaces
            .get(name)
            .await?
            .is_none_or(|ns| subnamespace_parent(&ns) != Some(parent));
        if anchor_gone && namespace_gone {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ReconcileError::Transient(format!(
                "subnamespace {name} still present after {:?}",
                ctx.config.deletion_timeout
            )));
        }
        tokio::time::sleep(ctx.config.deletion_poll_interval).await;
    }
}

/// Whether a subnamespace of `parent` belongs to `T`: Organizations anchor in the
/// root namespace, Spaces anchor anywhere else.
fn owned_by<T: Tenant>(root_namespace: &str, parent: &str) -> bool {
    T::NESTED != (parent == root_namespace)
}

/// Watch mapper: an anchor event re-triggers the tenant it was created for.
#[must_use]
pub fn anchor_owner<T: Tenant>(root_namespace: &str, obj: &DynamicObject) -> Vec<ObjectKey> {
    match (&obj.metadata.namespace, &obj.metadata.name) {
        (Some(parent), Some(name)) if owned_by::<T>(root_namespace, parent) => {
            vec![ObjectKey::namespaced(parent, name)]
        }
        _ => Vec::new(),
    }
}

/// Watch mapper: a namespace event re-triggers the tenant whose anchor produced it.
#[must_use]
pub fn namespace_owner<T: Tenant>(root_namespace: &str, obj: &DynamicObject) -> Vec<ObjectKey> {
    let parent = obj
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(HNC_SUBNAMESPACE_OF_ANNOTATION));
    match (parent, &obj.metadata.name) {
        (Some(parent), Some(name)) if owned_by::<T>(root_namespace, parent) => {
            vec![ObjectKey::namespaced(parent, name)]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "subnamespace_tests.rs"]
mod subnamespace_tests;
