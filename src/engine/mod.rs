// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcile engine.
//!
//! Every controller is registered explicitly at startup in a [`ControllerRegistry`]:
//! a name, the primary kind it reconciles, its [`Reconciler`], and the watch
//! triggers that map changes of related kinds onto primary keys.
//!
//! For each controller the [`Engine`] runs:
//!
//! - one watch task per watched kind, turning events into queue keys
//! - a fixed pool of workers draining a coalescing [`WorkQueue`]
//!
//! Each reconcile runs under a deadline and is abandoned at its next await point
//! when shutdown is signalled. Errors are routed by
//! [`ReconcileError::is_transient`]: transient errors are requeued with per-key
//! exponential backoff, terminal errors are logged and dropped.

pub mod backoff;
pub mod index;
pub mod queue;

use crate::errors::ReconcileError;
use crate::metrics;
use crate::store::{ObjectKey, ResourceStore};
use async_trait::async_trait;
use backoff::KeyBackoff;
use futures::StreamExt;
use kube::api::{ApiResource, DynamicObject};
use queue::WorkQueue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// What to do with a key after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reconcile again after the given delay.
    Requeue(Duration),
    /// Nothing to do until a watched object changes.
    AwaitChange,
}

/// Drives one kind toward its desired state.
///
/// Implementations must be idempotent: reconciling an already converged key must
/// not write anything.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError>;
}

/// Maps a watched object onto the primary keys to enqueue.
pub type KeyMapper = Arc<dyn Fn(&DynamicObject) -> Vec<ObjectKey> + Send + Sync>;

struct Trigger {
    resource: ApiResource,
    mapper: KeyMapper,
}

/// A controller and everything it watches.
pub struct ControllerRegistration {
    name: String,
    resource: ApiResource,
    reconciler: Arc<dyn Reconciler>,
    triggers: Vec<Trigger>,
}

impl ControllerRegistration {
    /// Register a reconciler for `resource`. Changes of the primary kind enqueue
    /// the changed object's own key.
    pub fn new(
        name: impl Into<String>,
        resource: ApiResource,
        reconciler: Arc<dyn Reconciler>,
    ) -> Self {
        Self {
            name: name.into(),
            resource,
            reconciler,
            triggers: Vec::new(),
        }
    }

    /// Also watch `resource`, enqueuing the keys `mapper` returns for each change.
    #[must_use]
    pub fn watches<F>(mut self, resource: ApiResource, mapper: F) -> Self
    where
        F: Fn(&DynamicObject) -> Vec<ObjectKey> + Send + Sync + 'static,
    {
        self.triggers.push(Trigger {
            resource,
            mapper: Arc::new(mapper),
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kinds this controller watches, primary kind first.
    #[must_use]
    pub fn watched_kinds(&self) -> Vec<&str> {
        std::iter::once(self.resource.kind.as_str())
            .chain(self.triggers.iter().map(|t| t.resource.kind.as_str()))
            .collect()
    }
}

/// Every controller the process runs.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: Vec<ControllerRegistration>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller.
    #[must_use]
    pub fn register(mut self, registration: ControllerRegistration) -> Self {
        self.controllers.push(registration);
        self
    }

    /// Look up a controller by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ControllerRegistration> {
        self.controllers.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.controllers.iter().map(ControllerRegistration::name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers_per_controller: usize,
    pub reconcile_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub watch_restart_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        crate::config::ControllerConfig::default().engine_config()
    }
}

struct ControllerRuntime {
    name: String,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: KeyBackoff,
    timeout: Duration,
}

/// Runs every registered controller until shutdown.
pub struct Engine {
    store: Arc<dyn ResourceStore>,
    registry: ControllerRegistry,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore>,
        registry: ControllerRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run until `shutdown` turns `true`.
    ///
    /// Returns once every watch task and worker has stopped.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        let workers = self.config.workers_per_controller.max(1);

        for registration in self.registry.controllers {
            info!(
                controller = %registration.name,
                watches = ?registration.watched_kinds(),
                workers,
                "Starting controller"
            );
            let runtime = Arc::new(ControllerRuntime {
                name: registration.name.clone(),
                reconciler: registration.reconciler,
                queue: Arc::new(WorkQueue::new()),
                backoff: KeyBackoff::new(self.config.backoff_initial, self.config.backoff_max),
                timeout: self.config.reconcile_timeout,
            });

            let own_key: KeyMapper =
                Arc::new(|obj: &DynamicObject| vec![ObjectKey::from_object(obj)]);
            let watches = std::iter::once(Trigger {
                resource: registration.resource,
                mapper: own_key,
            })
            .chain(registration.triggers);
            for trigger in watches {
                tasks.spawn(watch_loop(
                    self.store.clone(),
                    trigger,
                    runtime.clone(),
                    self.config.watch_restart_delay,
                    shutdown.clone(),
                ));
            }

            for _ in 0..workers {
                tasks.spawn(worker_loop(runtime.clone(), shutdown.clone()));
            }

            let queue = runtime.queue.clone();
            let mut signal = shutdown.clone();
            tasks.spawn(async move {
                wait_for_shutdown(&mut signal).await;
                queue.shut_down();
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Controller task failed: {e}");
            }
        }
        info!("All controllers stopped");
    }
}

/// Resolve once shutdown is signalled. Never resolves if the sender is gone
/// without having signalled.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn watch_loop(
    store: Arc<dyn ResourceStore>,
    trigger: Trigger,
    runtime: Arc<ControllerRuntime>,
    restart_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = trigger.resource.kind.clone();
    loop {
        debug!(controller = %runtime.name, kind = %kind, "Opening watch");
        let mut events = store.watch(&trigger.resource);
        loop {
            tokio::select! {
                () = wait_for_shutdown(&mut shutdown) => return,
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        for key in (trigger.mapper)(event.object()) {
                            runtime.queue.add(key);
                        }
                        metrics::record_queue_depth(&runtime.name, runtime.queue.len());
                    }
                    Some(Err(e)) => {
                        warn!(controller = %runtime.name, kind = %kind, "Watch failed, restarting: {e}");
                        break;
                    }
                    None => {
                        debug!(controller = %runtime.name, kind = %kind, "Watch stream ended, restarting");
                        break;
                    }
                },
            }
        }

        tokio::select! {
            () = wait_for_shutdown(&mut shutdown) => return,
            () = tokio::time::sleep(restart_delay) => {}
        }
    }
}

async fn worker_loop(runtime: Arc<ControllerRuntime>, mut shutdown: watch::Receiver<bool>) {
    while let Some(key) = runtime.queue.get().await {
        let start = Instant::now();
        let result = tokio::select! {
            () = wait_for_shutdown(&mut shutdown) => Err(ReconcileError::Cancelled),
            outcome = tokio::time::timeout(runtime.timeout, runtime.reconciler.reconcile(&key)) => {
                outcome.unwrap_or(Err(ReconcileError::Timeout(runtime.timeout)))
            }
        };
        runtime.queue.done(&key);
        runtime.handle_result(&key, result, start.elapsed());
        metrics::record_queue_depth(&runtime.name, runtime.queue.len());
    }
    debug!(controller = %runtime.name, "Worker stopped");
}

impl ControllerRuntime {
    fn handle_result(
        &self,
        key: &ObjectKey,
        result: Result<Action, ReconcileError>,
        elapsed: Duration,
    ) {
        match result {
            Ok(Action::AwaitChange) => {
                self.backoff.forget(key);
                metrics::record_reconciliation_success(&self.name, elapsed);
                debug!(controller = %self.name, key = %key, "Reconciled");
            }
            Ok(Action::Requeue(delay)) => {
                self.backoff.forget(key);
                metrics::record_reconciliation_success(&self.name, elapsed);
                metrics::record_reconciliation_requeue(&self.name, "scheduled");
                debug!(controller = %self.name, key = %key, ?delay, "Reconciled, requeue scheduled");
                self.queue.add_after(key.clone(), delay);
            }
            Err(ReconcileError::Cancelled) => {
                debug!(controller = %self.name, key = %key, "Reconcile cancelled by shutdown");
            }
            Err(e) if e.is_transient() => {
                let delay = self.backoff.next_delay(key);
                metrics::record_reconciliation_error(&self.name, e.category(), elapsed);
                metrics::record_reconciliation_requeue(&self.name, "backoff");
                warn!(
                    controller = %self.name,
                    key = %key,
                    retry_in = ?delay,
                    "Reconcile failed, will retry: {e}"
                );
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) => {
                self.backoff.forget(key);
                metrics::record_reconciliation_error(&self.name, e.category(), elapsed);
                error!(controller = %self.name, key = %key, "Reconcile failed permanently: {e}");
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
