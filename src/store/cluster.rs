// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ResourceStore`] backed by the Kubernetes API server.

use super::{ObjectKey, ResourceStore, WatchEvent};
use crate::errors::StoreError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde_json::json;
use tracing::{debug, warn};

/// Store that reads and writes through a `kube::Client`.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    fn object_api(&self, resource: &ApiResource, obj: &DynamicObject) -> Api<DynamicObject> {
        self.api(resource, obj.metadata.namespace.as_deref())
    }
}

/// Translate a client error into the store taxonomy.
///
/// 404 is `NotFound`; 409 is `AlreadyExists` or `Conflict` depending on the reason;
/// 400/422 is `Invalid`; 429 and 5xx are `Unavailable`.
pub(crate) fn map_kube_error(err: kube::Error, kind: &str, key: &str) -> StoreError {
    if let kube::Error::Api(resp) = &err {
        let (kind, key) = (kind.to_string(), key.to_string());
        match resp.code {
            404 => return StoreError::NotFound { kind, key },
            409 if resp.reason == "AlreadyExists" => {
                return StoreError::AlreadyExists { kind, key }
            }
            409 => return StoreError::Conflict { kind, key },
            400 | 422 => {
                return StoreError::Invalid {
                    kind,
                    key,
                    message: resp.message.clone(),
                }
            }
            429 | 500..=599 => return StoreError::Unavailable(resp.message.clone()),
            _ => {}
        }
    }
    if matches!(err, kube::Error::Service(_)) {
        return StoreError::Unavailable(err.to_string());
    }
    StoreError::Kube(err)
}

fn object_key(obj: &DynamicObject) -> String {
    ObjectKey::from_object(obj).to_string()
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<Option<DynamicObject>, StoreError> {
        self.api(resource, key.namespace.as_deref())
            .get_opt(&key.name)
            .await
            .map_err(|e| map_kube_error(e, &resource.kind, &key.to_string()))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let list = self
            .api(resource, namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, &resource.kind, namespace.unwrap_or("*")))?;
        Ok(list.items)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        debug!(kind = %resource.kind, key = %object_key(obj), "Creating object");
        self.object_api(resource, obj)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error(e, &resource.kind, &object_key(obj)))
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        debug!(kind = %resource.kind, key = %object_key(obj), "Replacing object");
        self.object_api(resource, obj)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error(e, &resource.kind, &object_key(obj)))
    }

    async fn replace_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        // Carrying the resourceVersion makes the merge patch conditional
        let patch = json!({
            "metadata": { "resourceVersion": obj.metadata.resource_version },
            "status": obj.data.get("status").cloned().unwrap_or_default(),
        });
        self.object_api(resource, obj)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(e, &resource.kind, &object_key(obj)))
    }

    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        debug!(kind = %resource.kind, key = %key, "Deleting object");
        self.api(resource, key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, &resource.kind, &key.to_string()))
    }

    fn watch(&self, resource: &ApiResource) -> BoxStream<'static, Result<WatchEvent, StoreError>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
        let kind = resource.kind.clone();
        watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(move |event| {
                let kind = kind.clone();
                async move {
                    match event {
                        Ok(Event::Apply(obj) | Event::InitApply(obj)) => {
                            Some(Ok(WatchEvent::Applied(obj)))
                        }
                        Ok(Event::Delete(obj)) => Some(Ok(WatchEvent::Deleted(obj))),
                        Ok(Event::Init | Event::InitDone) => None,
                        Err(e) => {
                            warn!(kind = %kind, error = %e, "Watch stream error");
                            Some(Err(StoreError::Unavailable(e.to_string())))
                        }
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
