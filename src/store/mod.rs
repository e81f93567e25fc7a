// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource store access.
//!
//! Controllers never talk to a Kubernetes client directly. They go through the
//! [`ResourceStore`] trait, which exposes CRUD with optimistic concurrency and a
//! watch stream per kind. Two implementations ship with the crate:
//!
//! - [`cluster::KubeStore`] - backed by a `kube::Client`
//! - [`memory::MemoryStore`] - in-process, used by the test suite
//!
//! [`ObjectApi`] is a typed façade over any store, shaped like `kube::Api<K>`.

pub mod cluster;
pub mod memory;

use crate::errors::StoreError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identity of an object within one kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of any object carrying metadata.
    pub fn from_object<K: Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A change observed on a watched kind.
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// The object was created or modified (also emitted for the initial listing).
    Applied(DynamicObject),
    /// The object is gone.
    Deleted(DynamicObject),
}

impl WatchEvent {
    /// The object carried by the event.
    #[must_use]
    pub fn object(&self) -> &DynamicObject {
        match self {
            WatchEvent::Applied(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }
}

/// CRUD and watch access to cluster state.
///
/// Writes that carry `metadata.resourceVersion` are conditional: a stale version
/// fails with [`StoreError::Conflict`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one object, `Ok(None)` if it does not exist.
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// List objects of a kind, in one namespace or across all namespaces.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    /// Create an object. Fails with [`StoreError::AlreadyExists`] on a name clash.
    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace an object's metadata and spec. Status is left untouched.
    async fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace an object's status subresource.
    async fn replace_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Request deletion. Objects with finalizers stay visible, marked as deleting,
    /// until their finalizers are removed.
    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError>;

    /// Stream changes of a kind across all namespaces, starting with the current
    /// contents as `Applied` events.
    fn watch(&self, resource: &ApiResource) -> BoxStream<'static, Result<WatchEvent, StoreError>>;
}

/// Typed access to one kind in a [`ResourceStore`].
pub struct ObjectApi<K> {
    store: Arc<dyn ResourceStore>,
    resource: ApiResource,
    namespace: Option<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ObjectApi<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            resource: self.resource.clone(),
            namespace: self.namespace.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> ObjectApi<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Access objects in one namespace.
    pub fn namespaced(store: Arc<dyn ResourceStore>, namespace: &str) -> Self {
        Self {
            store,
            resource: ApiResource::erase::<K>(&()),
            namespace: Some(namespace.to_string()),
            _kind: PhantomData,
        }
    }

    /// Access cluster-scoped objects, or list across all namespaces.
    pub fn all(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            resource: ApiResource::erase::<K>(&()),
            namespace: None,
            _kind: PhantomData,
        }
    }

    /// Type information of the kind.
    #[must_use]
    pub fn resource(&self) -> &ApiResource {
        &self.resource
    }

    fn scoped(&self, obj: &K) -> Result<DynamicObject, StoreError> {
        let mut dynamic = to_dynamic(obj)?;
        if dynamic.metadata.namespace.is_none() {
            dynamic.metadata.namespace.clone_from(&self.namespace);
        }
        Ok(dynamic)
    }

    fn key(&self, name: &str) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: name.to_string(),
        }
    }

    /// Fetch an object by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store call fails or the object cannot be decoded.
    pub async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        match self.store.get(&self.resource, &self.key(name)).await? {
            Some(obj) => Ok(Some(from_dynamic(&self.resource, obj)?)),
            None => Ok(None),
        }
    }

    /// List objects in scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the store call fails or an object cannot be decoded.
    pub async fn list(&self) -> Result<Vec<K>, StoreError> {
        self.store
            .list(&self.resource, self.namespace.as_deref())
            .await?
            .into_iter()
            .map(|obj| from_dynamic(&self.resource, obj))
            .collect()
    }

    /// Create an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object already exists or the store call fails.
    pub async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let created = self.store.create(&self.resource, &self.scoped(obj)?).await?;
        from_dynamic(&self.resource, created)
    }

    /// Replace an object's metadata and spec.
    ///
    /// # Errors
    ///
    /// Returns an error on a stale resource version or a failed store call.
    pub async fn replace(&self, obj: &K) -> Result<K, StoreError> {
        let replaced = self.store.replace(&self.resource, &self.scoped(obj)?).await?;
        from_dynamic(&self.resource, replaced)
    }

    /// Replace an object's status.
    ///
    /// # Errors
    ///
    /// Returns an error on a stale resource version or a failed store call.
    pub async fn replace_status(&self, obj: &K) -> Result<K, StoreError> {
        let replaced = self
            .store
            .replace_status(&self.resource, &self.scoped(obj)?)
            .await?;
        from_dynamic(&self.resource, replaced)
    }

    /// Request deletion of an object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the object does not exist.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.store.delete(&self.resource, &self.key(name)).await
    }
}

/// Convert a typed object into its dynamic form.
///
/// # Errors
///
/// Returns an error if the object does not serialize to a Kubernetes object.
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a dynamic object into a typed one.
///
/// List responses may omit `apiVersion`/`kind` on items; they are filled in from
/// `resource` before decoding.
///
/// # Errors
///
/// Returns an error if the object does not match `K`'s schema.
pub fn from_dynamic<K: DeserializeOwned>(
    resource: &ApiResource,
    mut obj: DynamicObject,
) -> Result<K, StoreError> {
    if obj.types.is_none() {
        obj.types = Some(kube::api::TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Whether an object is marked for deletion.
#[must_use]
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}
