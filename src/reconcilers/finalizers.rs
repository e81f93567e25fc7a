// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management.
//!
//! A finalizer keeps a deleted resource visible until the controller has torn
//! down what it created for it. The pattern every reconciler follows:
//!
//! ```rust,ignore
//! if is_deleting(&space) {
//!     cascade_cleanup(&space).await?;
//!     remove_finalizer(&api, &space, SUBNAMESPACE_FINALIZER).await?;
//!     return Ok(Action::AwaitChange);
//! }
//! let space = ensure_finalizer(&api, &space, SUBNAMESPACE_FINALIZER).await?;
//! // normal reconciliation
//! ```
//!
//! Both helpers write with the object's resource version, so a concurrent update
//! surfaces as a conflict and the key is retried from a fresh read.

use crate::errors::StoreError;
use crate::store::ObjectApi;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

/// Whether `finalizer` is present on the resource.
#[must_use]
pub fn has_finalizer<K: Resource>(resource: &K, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add a finalizer to a resource if not already present.
///
/// # Returns
///
/// The resource as stored after the call.
///
/// # Errors
///
/// Returns an error if the replace fails, including on a version conflict.
pub async fn ensure_finalizer<K>(
    api: &ObjectApi<K>,
    resource: &K,
    finalizer: &str,
) -> Result<K, StoreError>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    if has_finalizer(resource, finalizer) {
        return Ok(resource.clone());
    }

    info!(
        "Adding finalizer {} to {} {}",
        finalizer,
        K::kind(&()),
        resource.name_any()
    );
    let mut updated = resource.clone();
    updated
        .meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    api.replace(&updated).await
}

/// Remove a finalizer from a resource, letting its deletion complete.
///
/// # Errors
///
/// Returns an error if the replace fails. A resource that is already gone is not
/// an error.
pub async fn remove_finalizer<K>(
    api: &ObjectApi<K>,
    resource: &K,
    finalizer: &str,
) -> Result<(), StoreError>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    info!(
        "Removing finalizer {} from {} {}",
        finalizer,
        K::kind(&()),
        resource.name_any()
    );
    let mut updated = resource.clone();
    if let Some(finalizers) = updated.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }
    match api.replace(&updated).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
