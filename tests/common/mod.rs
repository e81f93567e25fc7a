// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use cf_k8s_controllers::config::ControllerConfig;
use cf_k8s_controllers::context::Context;
use cf_k8s_controllers::crd::{
    LocalRef, Organization, OrganizationSpec, Role, RoleScope, RoleSpec, RoleSubject,
    ServiceBinding, ServiceBindingSpec, ServiceInstance, ServiceInstanceSpec, ServiceRef, Space,
    SpaceSpec,
};
use cf_k8s_controllers::engine::Engine;
use cf_k8s_controllers::reconcilers::build_registry;
use cf_k8s_controllers::store::memory::MemoryStore;
use cf_k8s_controllers::store::ResourceStore;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const ROOT: &str = "cf";

/// The full controller set running against an in-memory cluster.
pub struct Harness {
    pub memory: Arc<MemoryStore>,
    pub ctx: Arc<Context>,
    shutdown: watch::Sender<bool>,
    engine: JoinHandle<()>,
}

impl Harness {
    /// Start every controller with short timings.
    pub fn start() -> Self {
        let memory = Arc::new(MemoryStore::with_namespace_hierarchy());
        let store: Arc<dyn ResourceStore> = memory.clone();

        let config = ControllerConfig {
            workers_per_controller: 2,
            backoff_initial: Duration::from_millis(10),
            backoff_max: Duration::from_millis(200),
            deletion_poll_interval: Duration::from_millis(10),
            deletion_timeout: Duration::from_secs(5),
            ..ControllerConfig::default()
        };
        let mut engine_config = config.engine_config();
        engine_config.watch_restart_delay = Duration::from_millis(50);

        let ctx = Arc::new(Context::new(store.clone(), config));
        let engine = Engine::new(store, build_registry(&ctx), engine_config);
        let (shutdown, rx) = watch::channel(false);
        let engine = tokio::spawn(engine.run(rx));

        Self {
            memory,
            ctx,
            shutdown,
            engine,
        }
    }

    /// Signal shutdown and wait for every controller to stop.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        tokio::time::timeout(Duration::from_secs(5), self.engine)
            .await
            .expect("engine did not stop")
            .expect("engine task panicked");
    }

    /// Wait until no write has happened for `window`.
    pub async fn settle(&self, window: Duration) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let before = self.memory.writes();
            sleep(window).await;
            if self.memory.writes() == before {
                return;
            }
            assert!(Instant::now() < deadline, "store never settled");
        }
    }
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(20)).await;
    }
}

pub fn organization(name: &str) -> Organization {
    let mut org = Organization::new(
        name,
        OrganizationSpec {
            display_name: format!("{name}-display"),
        },
    );
    org.metadata.namespace = Some(ROOT.to_string());
    org
}

pub fn space(org: &str, name: &str) -> Space {
    let mut space = Space::new(
        name,
        SpaceSpec {
            display_name: format!("{name}-display"),
        },
    );
    space.metadata.namespace = Some(org.to_string());
    space
}

pub fn user(name: &str) -> RoleSubject {
    RoleSubject {
        kind: "User".to_string(),
        name: name.to_string(),
        namespace: None,
    }
}

pub fn role(name: &str, role_type: &str, subject: RoleSubject, scope_kind: &str, scope: &str) -> Role {
    let mut role = Role::new(
        name,
        RoleSpec {
            role_type: role_type.to_string(),
            subject,
            scope: RoleScope {
                kind: scope_kind.to_string(),
                name: scope.to_string(),
            },
        },
    );
    role.metadata.namespace = Some(ROOT.to_string());
    role
}

pub fn service_instance(namespace: &str, name: &str, secret_name: &str) -> ServiceInstance {
    let mut instance = ServiceInstance::new(
        name,
        ServiceInstanceSpec {
            display_name: format!("{name}-display"),
            secret_name: secret_name.to_string(),
            service_type: "user-provided".to_string(),
            tags: Vec::new(),
        },
    );
    instance.metadata.namespace = Some(namespace.to_string());
    instance
}

pub fn service_binding(namespace: &str, name: &str, instance: &str) -> ServiceBinding {
    let mut binding = ServiceBinding::new(
        name,
        ServiceBindingSpec {
            display_name: None,
            service: ServiceRef {
                kind: "ServiceInstance".to_string(),
                name: instance.to_string(),
                api_version: "services.cloudfoundry.org/v1alpha1".to_string(),
            },
            app_ref: LocalRef {
                name: "app-guid".to_string(),
            },
        },
    );
    binding.metadata.namespace = Some(namespace.to_string());
    binding
}

pub fn secret(namespace: &str, name: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}
