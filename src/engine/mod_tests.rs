// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the engine runtime

#[cfg(test)]
mod tests {
    use crate::engine::{
        Action, ControllerRegistration, ControllerRegistry, Engine, EngineConfig, Reconciler,
    };
    use crate::errors::ReconcileError;
    use crate::store::memory::MemoryStore;
    use crate::store::{ObjectApi, ObjectKey, ResourceStore};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use kube::api::{ApiResource, ObjectMeta};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        FailTransiently(usize),
        FailTerminally,
        Hang,
    }

    struct Recorder {
        behaviour: Behaviour,
        calls: Mutex<HashMap<ObjectKey, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Recorder {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self, key: &ObjectKey) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Reconciler for Recorder {
        async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(key.clone()).or_insert(0);
                *count += 1;
                *count
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.behaviour {
                Behaviour::Succeed => Ok(Action::AwaitChange),
                Behaviour::FailTransiently(n) if call <= n => {
                    Err(ReconcileError::Transient("not yet".to_string()))
                }
                Behaviour::FailTransiently(_) => Ok(Action::AwaitChange),
                Behaviour::FailTerminally => Err(ReconcileError::terminal("Broken", "cannot fix")),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(Action::AwaitChange)
                }
            }
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            workers_per_controller: 4,
            reconcile_timeout: Duration::from_millis(200),
            backoff_initial: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            watch_restart_delay: Duration::from_millis(10),
        }
    }

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn start(
        store: Arc<dyn ResourceStore>,
        registry: ControllerRegistry,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = watch::channel(false);
        let engine = Engine::new(store, registry, fast_config());
        (tx, tokio::spawn(engine.run(rx)))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn secrets_controller(reconciler: Arc<Recorder>) -> ControllerRegistry {
        ControllerRegistry::new().register(ControllerRegistration::new(
            "secrets",
            ApiResource::erase::<Secret>(&()),
            reconciler,
        ))
    }

    #[tokio::test]
    async fn test_existing_and_new_objects_are_reconciled() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        let api = ObjectApi::<Secret>::namespaced(store.clone(), "ns");
        api.create(&secret("before")).await.unwrap();

        let recorder = Recorder::new(Behaviour::Succeed);
        let (stop, handle) = start(store, secrets_controller(recorder.clone()));

        api.create(&secret("after")).await.unwrap();
        let before = ObjectKey::namespaced("ns", "before");
        let after = ObjectKey::namespaced("ns", "after");
        eventually(|| recorder.calls(&before) >= 1 && recorder.calls(&after) >= 1).await;

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        ObjectApi::<Secret>::namespaced(store.clone(), "ns")
            .create(&secret("flaky"))
            .await
            .unwrap();

        let recorder = Recorder::new(Behaviour::FailTransiently(3));
        let (stop, handle) = start(store, secrets_controller(recorder.clone()));

        let key = ObjectKey::namespaced("ns", "flaky");
        eventually(|| recorder.calls(&key) >= 4).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.calls(&key), 4, "success must stop the retries");

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        ObjectApi::<Secret>::namespaced(store.clone(), "ns")
            .create(&secret("broken"))
            .await
            .unwrap();

        let recorder = Recorder::new(Behaviour::FailTerminally);
        let (stop, handle) = start(store, secrets_controller(recorder.clone()));

        let key = ObjectKey::namespaced("ns", "broken");
        eventually(|| recorder.calls(&key) >= 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(recorder.calls(&key), 1);

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeouts_are_retried() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        ObjectApi::<Secret>::namespaced(store.clone(), "ns")
            .create(&secret("slow"))
            .await
            .unwrap();

        let recorder = Recorder::new(Behaviour::Hang);
        let (stop, handle) = start(store, secrets_controller(recorder.clone()));

        let key = ObjectKey::namespaced("ns", "slow");
        eventually(|| recorder.calls(&key) >= 2).await;

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("hung reconcile must not block shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_reconcile_in_flight_per_key() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        let api = ObjectApi::<Secret>::namespaced(store.clone(), "ns");
        let created = api.create(&secret("busy")).await.unwrap();

        let recorder = Recorder::new(Behaviour::Succeed);
        let (stop, handle) = start(store, secrets_controller(recorder.clone()));

        let mut current = created;
        for i in 0..20 {
            current
                .metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert("round".to_string(), i.to_string());
            current = api.replace(&current).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_maps_related_kind() {
        let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
        let recorder = Recorder::new(Behaviour::Succeed);
        let registry = ControllerRegistry::new().register(
            ControllerRegistration::new(
                "secrets",
                ApiResource::erase::<Secret>(&()),
                recorder.clone(),
            )
            .watches(ApiResource::erase::<ConfigMap>(&()), |cm| {
                vec![ObjectKey::namespaced(
                    cm.metadata.namespace.clone().unwrap_or_default(),
                    "from-configmap",
                )]
            }),
        );
        assert_eq!(registry.names(), vec!["secrets"]);
        let (stop, handle) = start(store.clone(), registry);

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        ObjectApi::<ConfigMap>::namespaced(store, "ns")
            .create(&cm)
            .await
            .unwrap();

        let key = ObjectKey::namespaced("ns", "from-configmap");
        eventually(|| recorder.calls(&key) >= 1).await;

        stop.send(true).unwrap();
        handle.await.unwrap();
    }
}
