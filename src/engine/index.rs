// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse index from dependencies to the objects that depend on them.
//!
//! A reconciler records what it read while reconciling a key ("binding X looked
//! for secret Y"). A watch trigger on the dependency's kind then asks the index
//! which keys to enqueue when Y changes. Dependencies are replaced wholesale on
//! every reconcile, so stale interest disappears on its own.

use crate::store::ObjectKey;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct IndexState {
    /// dependency -> dependents
    dependents: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
    /// dependent -> dependencies
    dependencies: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
}

#[derive(Default)]
pub struct DependencyIndex {
    state: Mutex<IndexState>,
}

impl DependencyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `dependent` now depends on exactly `dependencies`.
    pub fn replace(&self, dependent: &ObjectKey, dependencies: impl IntoIterator<Item = ObjectKey>) {
        let mut state = self.lock();
        unlink(&mut state, dependent);

        let dependencies: BTreeSet<ObjectKey> = dependencies.into_iter().collect();
        if dependencies.is_empty() {
            return;
        }
        for dependency in &dependencies {
            state
                .dependents
                .entry(dependency.clone())
                .or_default()
                .insert(dependent.clone());
        }
        state.dependencies.insert(dependent.clone(), dependencies);
    }

    /// Drop everything recorded for `dependent`.
    pub fn forget(&self, dependent: &ObjectKey) {
        unlink(&mut self.lock(), dependent);
    }

    /// Keys that depend on `dependency`.
    #[must_use]
    pub fn dependents_of(&self, dependency: &ObjectKey) -> Vec<ObjectKey> {
        self.lock()
            .dependents
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of dependents tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().dependencies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unlink(state: &mut IndexState, dependent: &ObjectKey) {
    let Some(previous) = state.dependencies.remove(dependent) else {
        return;
    };
    for dependency in previous {
        if let Some(set) = state.dependents.get_mut(&dependency) {
            set.remove(dependent);
            if set.is_empty() {
                state.dependents.remove(&dependency);
            }
        }
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod index_tests;
