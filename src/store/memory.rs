// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`ResourceStore`].
//!
//! `MemoryStore` follows the API server semantics the controllers depend on:
//!
//! - Every write bumps a store-wide resource version; a write carrying a stale
//!   `metadata.resourceVersion` fails with `Conflict`
//! - `replace` never touches status and `replace_status` only touches status
//! - A write that changes nothing does not bump the version or emit a watch event
//! - Deleting an object with finalizers only marks it; it disappears once a
//!   `replace` empties its finalizers
//!
//! For tests it also counts writes, keeps an ordered write log and can be told to
//! fail deletions of specific objects.
//!
//! With [`MemoryStore::with_namespace_hierarchy`] the store additionally plays the
//! part of the Hierarchical Namespace Controller: creating a `SubnamespaceAnchor`
//! creates the child `Namespace` (annotated with its parent), deleting the anchor
//! terminates the namespace. A terminating namespace deletes its contents the way
//! `delete` does (objects with finalizers are only marked) and disappears once it
//! is empty.

use super::{ObjectKey, ResourceStore, WatchEvent};
use crate::constants::{
    ANCHOR_STATE_CONFLICT, ANCHOR_STATE_OK, HNC_SUBNAMESPACE_OF_ANNOTATION,
    KIND_SUBNAMESPACE_ANCHOR,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Watch channel capacity; a lagging subscriber gets an error and resubscribes.
const WATCH_CHANNEL_CAPACITY: usize = 4096;

/// Store-level write operation, as recorded in the write log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Replace,
    ReplaceStatus,
    Delete,
}

/// One successful write call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub kind: String,
    pub key: ObjectKey,
}

type EntryKey = (String, Option<String>, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<EntryKey, DynamicObject>,
    resource_version: u64,
    next_uid: u64,
    writes: u64,
    log: Vec<WriteRecord>,
    failing_deletes: HashSet<(String, String)>,
    pending: Vec<(String, WatchEvent)>,
}

/// In-memory resource store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<(String, WatchEvent)>,
    hierarchy: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            hierarchy: false,
        }
    }

    /// Store that also emulates the Hierarchical Namespace Controller.
    #[must_use]
    pub fn with_namespace_hierarchy() -> Self {
        Self {
            hierarchy: true,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful write calls so far.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    /// Successful write calls, oldest first.
    #[must_use]
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.lock().log.clone()
    }

    /// Make every deletion of `kind`/`name` fail with `Unavailable`.
    pub fn fail_deletes_of(&self, kind: &str, name: &str) {
        self.lock()
            .failing_deletes
            .insert((kind.to_string(), name.to_string()));
    }

    /// Stop failing deletions of `kind`/`name`.
    pub fn allow_deletes_of(&self, kind: &str, name: &str) {
        self.lock()
            .failing_deletes
            .remove(&(kind.to_string(), name.to_string()));
    }

    fn flush(&self, inner: &mut Inner) {
        for event in inner.pending.drain(..) {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

fn type_key(resource: &ApiResource) -> String {
    format!("{}/{}", resource.api_version, resource.kind)
}

fn entry_key(resource: &ApiResource, key: &ObjectKey) -> EntryKey {
    (type_key(resource), key.namespace.clone(), key.name.clone())
}

fn now() -> Result<Time, StoreError> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    Ok(serde_json::from_value(json!(stamp))?)
}

fn without_status(data: &Value) -> Value {
    let mut data = data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

fn set_status(data: &mut Value, status: Option<Value>) {
    if let Some(map) = data.as_object_mut() {
        match status {
            Some(status) if !status.is_null() => {
                map.insert("status".to_string(), status);
            }
            _ => {
                map.remove("status");
            }
        }
    }
}

fn check_version(
    stored: &DynamicObject,
    obj: &DynamicObject,
    resource: &ApiResource,
) -> Result<(), StoreError> {
    match &obj.metadata.resource_version {
        Some(version) if Some(version) != stored.metadata.resource_version.as_ref() => {
            Err(StoreError::Conflict {
                kind: resource.kind.clone(),
                key: ObjectKey::from_object(obj).to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn namespace_resource() -> ApiResource {
    ApiResource::erase::<Namespace>(&())
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn record(&mut self, op: WriteOp, resource: &ApiResource, key: ObjectKey) {
        self.writes += 1;
        self.log.push(WriteRecord {
            op,
            kind: resource.kind.clone(),
            key,
        });
    }

    fn store(&mut self, resource: &ApiResource, mut obj: DynamicObject) -> DynamicObject {
        obj.metadata.resource_version = Some(self.next_version());
        let key = ObjectKey::from_object(&obj);
        self.objects.insert(entry_key(resource, &key), obj.clone());
        self.pending
            .push((type_key(resource), WatchEvent::Applied(obj.clone())));
        obj
    }

    fn insert_new(
        &mut self,
        resource: &ApiResource,
        mut obj: DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.next_uid += 1;
        obj.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
        obj.metadata.uid = Some(format!("uid-{}", self.next_uid));
        obj.metadata.generation = Some(1);
        obj.metadata.creation_timestamp = Some(now()?);
        obj.metadata.deletion_timestamp = None;
        Ok(self.store(resource, obj))
    }

    fn remove(
        &mut self,
        hierarchy: bool,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<(), StoreError> {
        if hierarchy && resource.kind == "Namespace" {
            return self.terminate_namespace(&key.name);
        }
        let Some(obj) = self.objects.remove(&entry_key(resource, key)) else {
            return Ok(());
        };
        self.pending
            .push((type_key(resource), WatchEvent::Deleted(obj.clone())));

        if !hierarchy {
            return Ok(());
        }
        if resource.kind == KIND_SUBNAMESPACE_ANCHOR {
            let child = ObjectKey::cluster(key.name.clone());
            let owned = self
                .objects
                .get(&entry_key(&namespace_resource(), &child))
                .is_some_and(|ns| parent_annotation(ns) == key.namespace.as_deref());
            if owned {
                self.remove(hierarchy, &namespace_resource(), &child)?;
            }
        }
        if let Some(namespace) = &key.namespace {
            self.finish_namespace(namespace);
        }
        Ok(())
    }

    /// Put a namespace into `Terminating`: contents without finalizers go at once,
    /// the rest are marked deleting. The namespace itself goes when it is empty.
    fn terminate_namespace(&mut self, name: &str) -> Result<(), StoreError> {
        let ns_resource = namespace_resource();
        let ns_key = ObjectKey::cluster(name);
        let Some(ns) = self.objects.get(&entry_key(&ns_resource, &ns_key)).cloned() else {
            return Ok(());
        };
        if ns.metadata.deletion_timestamp.is_none() {
            let mut marked = ns;
            marked.metadata.deletion_timestamp = Some(now()?);
            self.store(&ns_resource, marked);
        }

        let contents: Vec<EntryKey> = self
            .objects
            .keys()
            .filter(|(_, ns, _)| ns.as_deref() == Some(name))
            .cloned()
            .collect();
        for entry in contents {
            let Some(contained) = self.objects.get(&entry).cloned() else {
                continue;
            };
            let resource = resource_of(&contained);
            let (_, namespace, object_name) = entry;
            let key = ObjectKey {
                namespace,
                name: object_name,
            };
            if !has_finalizers(&contained) {
                self.remove(true, &resource, &key)?;
            } else if contained.metadata.deletion_timestamp.is_none() {
                let mut marked = contained;
                marked.metadata.deletion_timestamp = Some(now()?);
                self.store(&resource, marked);
            }
        }
        self.finish_namespace(name);
        Ok(())
    }

    /// Drop a terminating namespace once nothing is left in it.
    fn finish_namespace(&mut self, name: &str) {
        let entry = entry_key(&namespace_resource(), &ObjectKey::cluster(name));
        let terminating = self
            .objects
            .get(&entry)
            .is_some_and(|ns| ns.metadata.deletion_timestamp.is_some());
        if !terminating || self.objects.keys().any(|(_, ns, _)| ns.as_deref() == Some(name)) {
            return;
        }
        if let Some(ns) = self.objects.remove(&entry) {
            self.pending.push((
                type_key(&namespace_resource()),
                WatchEvent::Deleted(ns),
            ));
        }
    }

    /// Emulate the hierarchy controller reacting to a new anchor.
    fn provision_subnamespace(&mut self, anchor: &mut DynamicObject) -> Result<(), StoreError> {
        let parent = anchor.metadata.namespace.clone().unwrap_or_default();
        let name = anchor.metadata.name.clone().unwrap_or_default();
        let ns_resource = namespace_resource();
        let ns_key = ObjectKey::cluster(name.clone());

        let state = match self.objects.get(&entry_key(&ns_resource, &ns_key)) {
            Some(existing) if parent_annotation(existing) == Some(parent.as_str()) => {
                ANCHOR_STATE_OK
            }
            Some(_) => ANCHOR_STATE_CONFLICT,
            None => {
                let mut ns = DynamicObject::new(&name, &ns_resource);
                ns.metadata.annotations = Some(BTreeMap::from([(
                    HNC_SUBNAMESPACE_OF_ANNOTATION.to_string(),
                    parent,
                )]));
                self.insert_new(&ns_resource, ns)?;
                ANCHOR_STATE_OK
            }
        };
        set_status(&mut anchor.data, Some(json!({ "status": state })));
        Ok(())
    }
}

fn parent_annotation(ns: &DynamicObject) -> Option<&str> {
    ns.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(HNC_SUBNAMESPACE_OF_ANNOTATION))
        .map(String::as_str)
}

fn has_finalizers(obj: &DynamicObject) -> bool {
    obj.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| !f.is_empty())
}

fn resource_of(obj: &DynamicObject) -> ApiResource {
    let types = obj.types.clone().unwrap_or_default();
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), types.api_version.clone()),
    };
    ApiResource {
        group,
        version,
        api_version: types.api_version,
        plural: format!("{}s", types.kind.to_lowercase()),
        kind: types.kind,
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.lock().objects.get(&entry_key(resource, key)).cloned())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let tk = type_key(resource);
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((t, ns, _), _)| {
                *t == tk && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_object(obj);
        let mut inner = self.lock();
        if inner.objects.contains_key(&entry_key(resource, &key)) {
            return Err(StoreError::AlreadyExists {
                kind: resource.kind.clone(),
                key: key.to_string(),
            });
        }
        if key.name.is_empty() {
            return Err(StoreError::Invalid {
                kind: resource.kind.clone(),
                key: key.to_string(),
                message: "metadata.name is required".to_string(),
            });
        }

        let mut obj = obj.clone();
        if self.hierarchy && resource.kind == KIND_SUBNAMESPACE_ANCHOR {
            inner.provision_subnamespace(&mut obj)?;
        }
        let created = inner.insert_new(resource, obj)?;
        inner.record(WriteOp::Create, resource, key);
        debug!(kind = %resource.kind, key = %ObjectKey::from_object(&created), "Stored new object");
        self.flush(&mut inner);
        Ok(created)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_object(obj);
        let mut inner = self.lock();
        let Some(stored) = inner.objects.get(&entry_key(resource, &key)).cloned() else {
            return Err(StoreError::NotFound {
                kind: resource.kind.clone(),
                key: key.to_string(),
            });
        };
        check_version(&stored, obj, resource)?;

        let mut updated = obj.clone();
        updated.types.clone_from(&stored.types);
        updated.metadata.uid.clone_from(&stored.metadata.uid);
        updated
            .metadata
            .creation_timestamp
            .clone_from(&stored.metadata.creation_timestamp);
        updated
            .metadata
            .deletion_timestamp
            .clone_from(&stored.metadata.deletion_timestamp);
        updated.metadata.generation = stored.metadata.generation;
        updated
            .metadata
            .resource_version
            .clone_from(&stored.metadata.resource_version);
        set_status(&mut updated.data, stored.data.get("status").cloned());

        if without_status(&updated.data) != without_status(&stored.data) {
            updated.metadata.generation = Some(stored.metadata.generation.unwrap_or(0) + 1);
        }

        inner.record(WriteOp::Replace, resource, key.clone());

        let finalized = updated.metadata.deletion_timestamp.is_some()
            && updated
                .metadata
                .finalizers
                .as_ref()
                .map_or(true, Vec::is_empty);
        if finalized {
            inner.remove(self.hierarchy, resource, &key)?;
            self.flush(&mut inner);
            return Ok(updated);
        }

        if serde_json::to_value(&updated)? == serde_json::to_value(&stored)? {
            return Ok(stored);
        }
        let replaced = inner.store(resource, updated);
        self.flush(&mut inner);
        Ok(replaced)
    }

    async fn replace_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_object(obj);
        let mut inner = self.lock();
        let Some(stored) = inner.objects.get(&entry_key(resource, &key)).cloned() else {
            return Err(StoreError::NotFound {
                kind: resource.kind.clone(),
                key: key.to_string(),
            });
        };
        check_version(&stored, obj, resource)?;

        let mut updated = stored.clone();
        set_status(&mut updated.data, obj.data.get("status").cloned());
        inner.record(WriteOp::ReplaceStatus, resource, key);

        if updated.data == stored.data {
            return Ok(stored);
        }
        let replaced = inner.store(resource, updated);
        self.flush(&mut inner);
        Ok(replaced)
    }

    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(stored) = inner.objects.get(&entry_key(resource, key)).cloned() else {
            return Err(StoreError::NotFound {
                kind: resource.kind.clone(),
                key: key.to_string(),
            });
        };
        if inner
            .failing_deletes
            .contains(&(resource.kind.clone(), key.name.clone()))
        {
            return Err(StoreError::Unavailable(format!(
                "injected failure deleting {} {key}",
                resource.kind
            )));
        }
        inner.record(WriteOp::Delete, resource, key.clone());

        if !has_finalizers(&stored) {
            inner.remove(self.hierarchy, resource, key)?;
        } else if stored.metadata.deletion_timestamp.is_none() {
            let mut marked = stored;
            marked.metadata.deletion_timestamp = Some(now()?);
            inner.store(resource, marked);
        }
        self.flush(&mut inner);
        Ok(())
    }

    fn watch(&self, resource: &ApiResource) -> BoxStream<'static, Result<WatchEvent, StoreError>> {
        let tk = type_key(resource);
        // Subscribe under the lock so no write lands between snapshot and subscription
        let (snapshot, rx) = {
            let inner = self.lock();
            let snapshot: Vec<DynamicObject> = inner
                .objects
                .iter()
                .filter(|((t, _, _), _)| *t == tk)
                .map(|(_, obj)| obj.clone())
                .collect();
            (snapshot, self.events.subscribe())
        };

        let live = stream::unfold(rx, move |mut rx| {
            let tk = tk.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok((t, event)) if t == tk => return Some((Ok(event), rx)),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            return Some((
                                Err(StoreError::Unavailable(format!(
                                    "watch lagged by {missed} events"
                                ))),
                                rx,
                            ))
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        stream::iter(snapshot.into_iter().map(|obj| Ok(WatchEvent::Applied(obj))))
            .chain(live)
            .boxed()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
