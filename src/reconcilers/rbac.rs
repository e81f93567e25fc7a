// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Role reconciliation: platform Roles realized as namespace `RoleBinding`s.
//!
//! A Role scoped to an Organization is bound in the Organization's namespace and
//! in the namespace of every Space of that Organization. A Role scoped to a Space
//! is bound in the Space's namespace only.
//!
//! ## Binding identity
//!
//! The binding name is derived from (subject kind, subject namespace, subject name,
//! role type), so each namespace holds at most one binding per grant and two
//! workers racing to create it collide on `AlreadyExists` instead of producing a
//! duplicate.
//!
//! ## Propagation
//!
//! Spaces created after the Role are picked up through the Space watch: the
//! reconciler records which Organization each Organization-scoped Role targets,
//! and a Space event enqueues every Role recorded for the Space's Organization.
//!
//! ## Readiness
//!
//! An Organization or Space is usable once its namespace holds a binding to the
//! admin ClusterRole. [`has_admin_binding`] checks that, and
//! [`wait_for_admin_binding`] polls for it.

use crate::constants::{
    CLUSTER_ROLE_KIND, RBAC_API_GROUP, READINESS_POLL_INTERVAL_MILLIS, ROLE_BINDING_NAME_PREFIX,
    ROLE_FINALIZER, SCOPE_KIND_ORGANIZATION, SCOPE_KIND_SPACE, SUBJECT_KIND_SERVICE_ACCOUNT,
    SUBJECT_KIND_USER,
};
use crate::context::Context;
use crate::crd::{Organization, Role, RoleSpec, RoleSubject, Space};
use crate::engine::index::DependencyIndex;
use crate::engine::{Action, Reconciler};
use crate::errors::{ReconcileError, StoreError};
use crate::labels::role_binding_labels;
use crate::metrics;
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::status::set_condition;
use crate::status_reasons::{
    CONDITION_READY, CONDITION_VALID, REASON_IMMUTABLE_FIELD_CHANGED, REASON_INVALID_SCOPE,
    REASON_INVALID_SUBJECT, REASON_ROLE_BINDINGS_CREATED, REASON_UNKNOWN_ROLE_TYPE,
    REASON_VALID_SPEC, STATUS_FALSE, STATUS_TRUE,
};
use crate::store::{is_deleting, ObjectKey};
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::api::{DynamicObject, ObjectMeta};
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const KIND_ROLE_BINDING: &str = "RoleBinding";

/// Deterministic binding name for a grant of `role_type` to `subject`.
#[must_use]
pub fn role_binding_name(subject: &RoleSubject, role_type: &str) -> String {
    let identity = format!(
        "{}/{}/{}/{}",
        subject.kind,
        bound_namespace(subject).unwrap_or_default(),
        subject.name,
        role_type
    );
    format!(
        "{}-{:x}",
        ROLE_BINDING_NAME_PREFIX,
        Sha256::digest(identity.as_bytes())
    )
}

/// The namespace that ends up on the RBAC subject: only ServiceAccounts carry one.
fn bound_namespace(subject: &RoleSubject) -> Option<&str> {
    if subject.kind == SUBJECT_KIND_SERVICE_ACCOUNT {
        subject.namespace.as_deref()
    } else {
        None
    }
}

/// Whether two subjects resolve to the same RBAC subject.
fn same_subject(a: &RoleSubject, b: &RoleSubject) -> bool {
    a.kind == b.kind && a.name == b.name && bound_namespace(a) == bound_namespace(b)
}

/// Check a Role spec against the supported subjects, scopes and role types.
///
/// # Errors
///
/// Returns a terminal error whose reason names the offending field.
pub fn validate_role(ctx: &Context, spec: &RoleSpec) -> Result<(), ReconcileError> {
    let subject = &spec.subject;
    if subject.name.is_empty() {
        return Err(ReconcileError::terminal(
            REASON_INVALID_SUBJECT,
            "subject name must not be empty",
        ));
    }
    match subject.kind.as_str() {
        SUBJECT_KIND_USER => {}
        SUBJECT_KIND_SERVICE_ACCOUNT => {
            if subject.namespace.as_deref().unwrap_or_default().is_empty() {
                return Err(ReconcileError::terminal(
                    REASON_INVALID_SUBJECT,
                    "ServiceAccount subjects require a namespace",
                ));
            }
        }
        other => {
            return Err(ReconcileError::terminal(
                REASON_INVALID_SUBJECT,
                format!("unsupported subject kind {other:?}"),
            ))
        }
    }

    if !matches!(
        spec.scope.kind.as_str(),
        SCOPE_KIND_ORGANIZATION | SCOPE_KIND_SPACE
    ) {
        return Err(ReconcileError::terminal(
            REASON_INVALID_SCOPE,
            format!("unsupported scope kind {:?}", spec.scope.kind),
        ));
    }
    if spec.scope.name.is_empty() {
        return Err(ReconcileError::terminal(
            REASON_INVALID_SCOPE,
            "scope name must not be empty",
        ));
    }

    if ctx.config.cluster_role_for(&spec.role_type).is_none() {
        return Err(ReconcileError::terminal(
            REASON_UNKNOWN_ROLE_TYPE,
            format!("no ClusterRole configured for role type {:?}", spec.role_type),
        ));
    }
    Ok(())
}

fn rbac_subject(subject: &RoleSubject) -> Subject {
    if subject.kind == SUBJECT_KIND_SERVICE_ACCOUNT {
        Subject {
            api_group: Some(String::new()),
            kind: subject.kind.clone(),
            name: subject.name.clone(),
            namespace: bound_namespace(subject).map(str::to_string),
        }
    } else {
        Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: subject.kind.clone(),
            name: subject.name.clone(),
            namespace: None,
        }
    }
}

fn subject_matches(binding_subject: &Subject, subject: &RoleSubject) -> bool {
    binding_subject.kind == subject.kind
        && binding_subject.name == subject.name
        && binding_subject.namespace.as_deref() == bound_namespace(subject)
}

/// Desired binding for a validated Role in `namespace`.
fn desired_binding(role: &Role, cluster_role: &str, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(role_binding_name(&role.spec.subject, &role.spec.role_type)),
            namespace: Some(namespace.to_string()),
            labels: Some(role_binding_labels(&role.name_any(), &role.spec.role_type)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: CLUSTER_ROLE_KIND.to_string(),
            name: cluster_role.to_string(),
        },
        subjects: Some(vec![rbac_subject(&role.spec.subject)]),
    }
}

fn drifted(current: &RoleBinding, desired: &RoleBinding) -> bool {
    current.role_ref != desired.role_ref || current.subjects != desired.subjects
}

/// Create the binding, or bring an existing one back in line.
///
/// Returns `true` when something was written.
async fn ensure_binding(ctx: &Context, desired: &RoleBinding) -> Result<bool, ReconcileError> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();
    let api = ctx.namespaced::<RoleBinding>(&namespace);

    let Some(current) = api.get(&name).await? else {
        return match api.create(desired).await {
            Ok(_) => {
                info!("Created role binding {}/{}", namespace, name);
                metrics::record_resource_created(KIND_ROLE_BINDING);
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                // Another worker won the race; make sure it created what we would have
                match api.get(&name).await? {
                    Some(winner) if !drifted(&winner, desired) => Ok(false),
                    _ => Err(ReconcileError::Transient(format!(
                        "role binding {namespace}/{name} changed while being created"
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        };
    };

    if !drifted(&current, desired) {
        return Ok(false);
    }

    if current.role_ref != desired.role_ref {
        // roleRef cannot be changed in place
        warn!(
            "Role binding {}/{} references {}, recreating",
            namespace, name, current.role_ref.name
        );
        match api.delete(&name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        api.create(desired).await?;
        return Ok(true);
    }

    warn!("Role binding {}/{} subjects drifted, restoring", namespace, name);
    let mut updated = current;
    updated.subjects.clone_from(&desired.subjects);
    api.replace(&updated).await?;
    Ok(true)
}

/// Namespaces a Role's bindings belong in, or `None` when its scope does not
/// exist (yet).
async fn target_namespaces(ctx: &Context, role: &Role) -> Result<Option<Vec<String>>, StoreError> {
    let scope = &role.spec.scope;
    if scope.kind == SCOPE_KIND_ORGANIZATION {
        let root = &ctx.config.root_namespace;
        let Some(org) = ctx.namespaced::<Organization>(root).get(&scope.name).await? else {
            return Ok(None);
        };
        if is_deleting(&org) {
            return Ok(None);
        }
        let mut namespaces = vec![scope.name.clone()];
        namespaces.extend(
            ctx.namespaced::<Space>(&scope.name)
                .list()
                .await?
                .iter()
                .filter(|space| !is_deleting(*space))
                .map(ResourceExt::name_any),
        );
        return Ok(Some(namespaces));
    }

    let space = ctx
        .all::<Space>()
        .list()
        .await?
        .into_iter()
        .find(|space| space.name_any() == scope.name);
    Ok(space
        .filter(|space| !is_deleting(space))
        .map(|space| vec![space.name_any()]))
}

/// Index key an Organization-scoped Role is recorded under.
#[must_use]
pub fn organization_scope_key(root_namespace: &str, organization: &str) -> ObjectKey {
    ObjectKey::namespaced(root_namespace, organization)
}

/// Index key a Space-scoped Role is recorded under.
#[must_use]
pub fn space_scope_key(space: &str) -> ObjectKey {
    ObjectKey::cluster(space)
}

/// Reconciler for `Role`.
pub struct RoleReconciler {
    ctx: Arc<Context>,
    scopes: Arc<DependencyIndex>,
}

impl RoleReconciler {
    /// `scopes` is shared with the Organization and Space watch mappers.
    #[must_use]
    pub fn new(ctx: Arc<Context>, scopes: Arc<DependencyIndex>) -> Self {
        Self { ctx, scopes }
    }

    fn record_scope(&self, key: &ObjectKey, role: &Role) {
        let scope = &role.spec.scope;
        let dependency = if scope.kind == SCOPE_KIND_ORGANIZATION {
            organization_scope_key(&self.ctx.config.root_namespace, &scope.name)
        } else {
            space_scope_key(&scope.name)
        };
        self.scopes.replace(key, [dependency]);
    }

    async fn revoke(&self, key: &ObjectKey, role: &Role) -> Result<Action, ReconcileError> {
        if !has_finalizer(role, ROLE_FINALIZER) {
            self.scopes.forget(key);
            return Ok(Action::AwaitChange);
        }

        let recorded = role
            .status
            .as_ref()
            .map(|s| s.role_binding.clone())
            .unwrap_or_default();
        let binding_name = if recorded.is_empty() {
            role_binding_name(&role.spec.subject, &role.spec.role_type)
        } else {
            recorded
        };

        let keep = self.still_demanded(role).await?;
        let bindings = self.ctx.all::<RoleBinding>().list().await?;
        for binding in bindings.iter().filter(|b| b.name_any() == binding_name) {
            let namespace = binding.namespace().unwrap_or_default();
            if keep.contains(&namespace) {
                debug!(
                    "Keeping role binding {}/{}, still granted by another Role",
                    namespace, binding_name
                );
                continue;
            }
            match self
                .ctx
                .namespaced::<RoleBinding>(&namespace)
                .delete(&binding_name)
                .await
            {
                Ok(()) => {
                    info!("Revoked role binding {}/{}", namespace, binding_name);
                    metrics::record_resource_deleted(KIND_ROLE_BINDING);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let namespace = key.namespace.clone().unwrap_or_default();
        remove_finalizer(&self.ctx.namespaced::<Role>(&namespace), role, ROLE_FINALIZER).await?;
        self.scopes.forget(key);
        Ok(Action::AwaitChange)
    }

    /// Namespaces where another live Role grants the same subject the same role type.
    async fn still_demanded(&self, role: &Role) -> Result<BTreeSet<String>, ReconcileError> {
        let namespace = role.namespace().unwrap_or_default();
        let mut keep = BTreeSet::new();
        for other in self.ctx.namespaced::<Role>(&namespace).list().await? {
            if other.name_any() == role.name_any()
                || is_deleting(&other)
                || !same_subject(&other.spec.subject, &role.spec.subject)
                || other.spec.role_type != role.spec.role_type
            {
                continue;
            }
            if let Some(namespaces) = target_namespaces(&self.ctx, &other).await? {
                keep.extend(namespaces);
            }
        }
        Ok(keep)
    }

    /// Write the Role's conditions (and binding name) if they changed.
    async fn update_status(
        &self,
        role: &Role,
        valid: (&str, &str, &str),
        ready: Option<(&str, &str, &str)>,
        role_binding: Option<String>,
    ) -> Result<(), ReconcileError> {
        let mut status = role.status.clone().unwrap_or_default();
        let mut changed = set_condition(
            &mut status.conditions,
            CONDITION_VALID,
            valid.0,
            valid.1,
            valid.2,
        );
        if let Some((s, reason, message)) = ready {
            changed |= set_condition(&mut status.conditions, CONDITION_READY, s, reason, message);
        }
        if let Some(name) = role_binding {
            if status.role_binding != name {
                status.role_binding = name;
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }

        let mut updated = role.clone();
        updated.status = Some(status);
        let namespace = role.namespace().unwrap_or_default();
        self.ctx
            .namespaced::<Role>(&namespace)
            .replace_status(&updated)
            .await?;
        Ok(())
    }

    async fn reject(&self, role: &Role, err: ReconcileError) -> Result<Action, ReconcileError> {
        if let ReconcileError::Terminal { reason, message } = &err {
            warn!("Role {} rejected: {}", role.name_any(), err);
            self.update_status(
                role,
                (STATUS_FALSE, reason.as_str(), message.as_str()),
                Some((STATUS_FALSE, reason.as_str(), message.as_str())),
                None,
            )
            .await?;
        }
        Err(err)
    }
}

#[async_trait]
impl Reconciler for RoleReconciler {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let namespace = key.namespace.clone().unwrap_or_default();
        let api = self.ctx.namespaced::<Role>(&namespace);
        let Some(role) = api.get(&key.name).await? else {
            self.scopes.forget(key);
            return Ok(Action::AwaitChange);
        };

        if is_deleting(&role) {
            return self.revoke(key, &role).await;
        }

        if let Err(e) = validate_role(&self.ctx, &role.spec) {
            return self.reject(&role, e).await;
        }

        let binding_name = role_binding_name(&role.spec.subject, &role.spec.role_type);
        let recorded = role
            .status
            .as_ref()
            .map(|s| s.role_binding.as_str())
            .unwrap_or_default();
        if !recorded.is_empty() && recorded != binding_name {
            let err = ReconcileError::terminal(
                REASON_IMMUTABLE_FIELD_CHANGED,
                "subject and role type cannot change; delete the Role and create a new one",
            );
            return self.reject(&role, err).await;
        }

        self.record_scope(key, &role);
        let role = ensure_finalizer(&api, &role, ROLE_FINALIZER).await?;

        let Some(namespaces) = target_namespaces(&self.ctx, &role).await? else {
            return Err(ReconcileError::Transient(format!(
                "{} {} does not exist yet",
                role.spec.scope.kind, role.spec.scope.name
            )));
        };

        let cluster_role = self
            .ctx
            .config
            .cluster_role_for(&role.spec.role_type)
            .unwrap_or_default()
            .to_string();
        for namespace in &namespaces {
            ensure_binding(&self.ctx, &desired_binding(&role, &cluster_role, namespace)).await?;
        }

        let message = format!("role binding present in {} namespaces", namespaces.len());
        self.update_status(
            &role,
            (STATUS_TRUE, REASON_VALID_SPEC, ""),
            Some((STATUS_TRUE, REASON_ROLE_BINDINGS_CREATED, &message)),
            Some(binding_name),
        )
        .await?;
        Ok(Action::AwaitChange)
    }
}

/// Watch mapper: a Space event enqueues the Roles scoped to the Space or to its
/// Organization.
#[must_use]
pub fn roles_for_space(
    scopes: &DependencyIndex,
    root_namespace: &str,
    obj: &DynamicObject,
) -> Vec<ObjectKey> {
    let (Some(organization), Some(space)) = (&obj.metadata.namespace, &obj.metadata.name) else {
        return Vec::new();
    };
    let mut keys = scopes.dependents_of(&organization_scope_key(root_namespace, organization));
    keys.extend(scopes.dependents_of(&space_scope_key(space)));
    keys
}

/// Watch mapper: an Organization event enqueues the Roles scoped to it.
#[must_use]
pub fn roles_for_organization(
    scopes: &DependencyIndex,
    root_namespace: &str,
    obj: &DynamicObject,
) -> Vec<ObjectKey> {
    match &obj.metadata.name {
        Some(name) => scopes.dependents_of(&organization_scope_key(root_namespace, name)),
        None => Vec::new(),
    }
}

/// Whether `namespace` holds a binding to the admin ClusterRole, optionally for a
/// specific subject.
///
/// # Errors
///
/// Returns an error if the role bindings cannot be listed.
pub async fn has_admin_binding(
    ctx: &Context,
    namespace: &str,
    subject: Option<&RoleSubject>,
) -> Result<bool, StoreError> {
    let admin_role = ctx.config.admin_cluster_role();
    let bindings = ctx.namespaced::<RoleBinding>(namespace).list().await?;
    Ok(bindings.iter().any(|binding| {
        binding.role_ref.kind == CLUSTER_ROLE_KIND
            && binding.role_ref.name == admin_role
            && subject.is_none_or(|wanted| {
                binding
                    .subjects
                    .iter()
                    .flatten()
                    .any(|s| subject_matches(s, wanted))
            })
    }))
}

/// Poll until [`has_admin_binding`] holds or `timeout` expires.
///
/// # Errors
///
/// Returns a transient error on expiry, or the store error from a failed poll.
pub async fn wait_for_admin_binding(
    ctx: &Context,
    namespace: &str,
    subject: Option<&RoleSubject>,
    timeout: Duration,
) -> Result<(), ReconcileError> {
    let deadline = Instant::now() + timeout;
    loop {
        if has_admin_binding(ctx, namespace, subject).await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ReconcileError::Transient(format!(
                "no admin role binding in {namespace} after {timeout:?}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(READINESS_POLL_INTERVAL_MILLIS)).await;
    }
}

#[cfg(test)]
#[path = "rbac_tests.rs"]
mod rbac_tests;
