// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcilers for the platform resources.
//!
//! Each reconciler drives one primary kind and declares the kinds whose changes
//! should re-trigger it. [`build_registry`] wires all of them into the
//! [`ControllerRegistry`] the engine runs.
//!
//! # Available Reconcilers
//!
//! ## Tenancy
//!
//! - [`SubnamespaceReconciler<Organization>`](subnamespace::SubnamespaceReconciler) -
//!   Organization subnamespace provisioning and cascade deletion
//! - [`SubnamespaceReconciler<Space>`](subnamespace::SubnamespaceReconciler) - the
//!   same for Spaces, under their Organization's namespace
//! - [`RoleReconciler`](rbac::RoleReconciler) - role bindings for platform Roles
//!
//! ## Services
//!
//! - [`ServiceBindingReconciler`](servicebinding::ServiceBindingReconciler) -
//!   resolves a binding's credentials Secret
//!
//! # Example
//!
//! ```rust,no_run
//! use cf_k8s_controllers::config::ControllerConfig;
//! use cf_k8s_controllers::context::Context;
//! use cf_k8s_controllers::engine::Engine;
//! use cf_k8s_controllers::reconcilers::build_registry;
//! use cf_k8s_controllers::store::memory::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let config = ControllerConfig::default();
//! let engine_config = config.engine_config();
//! let store = Arc::new(MemoryStore::with_namespace_hierarchy());
//! let ctx = Arc::new(Context::new(store.clone(), config));
//!
//! let (_tx, rx) = tokio::sync::watch::channel(false);
//! Engine::new(store, build_registry(&ctx), engine_config).run(rx).await;
//! # }
//! ```

pub mod finalizers;
pub mod rbac;
pub mod servicebinding;
pub mod status;
pub mod subnamespace;

pub use rbac::{has_admin_binding, wait_for_admin_binding, RoleReconciler};
pub use servicebinding::ServiceBindingReconciler;
pub use subnamespace::{delete_subnamespace, ensure_subnamespace, SubnamespaceReconciler};

use crate::context::Context;
use crate::crd::{Organization, Role, ServiceBinding, ServiceInstance, Space, SubnamespaceAnchor};
use crate::engine::index::DependencyIndex;
use crate::engine::{ControllerRegistration, ControllerRegistry};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ApiResource;
use std::sync::Arc;

/// Controller name for Organizations
pub const ORGANIZATION_CONTROLLER: &str = "organization";

/// Controller name for Spaces
pub const SPACE_CONTROLLER: &str = "space";

/// Controller name for Roles
pub const ROLE_CONTROLLER: &str = "role";

/// Controller name for `ServiceBindings`
pub const SERVICE_BINDING_CONTROLLER: &str = "servicebinding";

fn tenant_registration<T: subnamespace::Tenant>(
    name: &str,
    ctx: &Arc<Context>,
) -> ControllerRegistration {
    let anchor_root = ctx.config.root_namespace.clone();
    let namespace_root = ctx.config.root_namespace.clone();
    ControllerRegistration::new(
        name,
        ApiResource::erase::<T>(&()),
        Arc::new(SubnamespaceReconciler::<T>::new(ctx.clone())),
    )
    .watches(ApiResource::erase::<SubnamespaceAnchor>(&()), move |obj| {
        subnamespace::anchor_owner::<T>(&anchor_root, obj)
    })
    .watches(ApiResource::erase::<Namespace>(&()), move |obj| {
        subnamespace::namespace_owner::<T>(&namespace_root, obj)
    })
}

fn role_registration(ctx: &Arc<Context>) -> ControllerRegistration {
    let scopes = Arc::new(DependencyIndex::new());
    let space_scopes = scopes.clone();
    let org_scopes = scopes.clone();
    let space_root = ctx.config.root_namespace.clone();
    let org_root = ctx.config.root_namespace.clone();

    ControllerRegistration::new(
        ROLE_CONTROLLER,
        ApiResource::erase::<Role>(&()),
        Arc::new(RoleReconciler::new(ctx.clone(), scopes)),
    )
    .watches(ApiResource::erase::<Space>(&()), move |obj| {
        rbac::roles_for_space(&space_scopes, &space_root, obj)
    })
    .watches(ApiResource::erase::<Organization>(&()), move |obj| {
        rbac::roles_for_organization(&org_scopes, &org_root, obj)
    })
}

fn service_binding_registration(ctx: &Arc<Context>) -> ControllerRegistration {
    let secrets = Arc::new(DependencyIndex::new());
    let instances = Arc::new(DependencyIndex::new());
    let secret_index = secrets.clone();
    let instance_index = instances.clone();

    ControllerRegistration::new(
        SERVICE_BINDING_CONTROLLER,
        ApiResource::erase::<ServiceBinding>(&()),
        Arc::new(ServiceBindingReconciler::new(ctx.clone(), secrets, instances)),
    )
    .watches(ApiResource::erase::<Secret>(&()), move |obj| {
        servicebinding::interested_bindings(&secret_index, obj)
    })
    .watches(ApiResource::erase::<ServiceInstance>(&()), move |obj| {
        servicebinding::interested_bindings(&instance_index, obj)
    })
}

/// Every controller this process runs, with its watch triggers.
#[must_use]
pub fn build_registry(ctx: &Arc<Context>) -> ControllerRegistry {
    ControllerRegistry::new()
        .register(tenant_registration::<Organization>(
            ORGANIZATION_CONTROLLER,
            ctx,
        ))
        .register(tenant_registration::<Space>(SPACE_CONTROLLER, ctx))
        .register(role_registration(ctx))
        .register(service_binding_registration(ctx))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
