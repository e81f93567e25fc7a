// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Exponential backoff for failed reconciles.
//!
//! Each key that fails transiently gets its own backoff sequence. The sequence
//! grows until it reaches the ceiling and then stays there: a transient key is
//! never dropped. A successful reconcile resets the key.

use crate::constants::{BACKOFF_MULTIPLIER, BACKOFF_RANDOMIZATION_FACTOR};
use crate::store::ObjectKey;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Exponential backoff with randomization (jitter) to prevent thundering herd.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            multiplier,
            randomization_factor,
        }
    }

    /// Get the next backoff interval.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        jittered
    }

    /// Start over from the initial interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = rand::rng().random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Per-key backoff state for one controller.
///
/// # Retry Schedule
///
/// With the default settings (100ms initial, 30s ceiling), retries occur at
/// approximately 100ms, 200ms, 400ms, 800ms, 1.6s, 3.2s, 6.4s, 12.8s, 25.6s and
/// then every 30s for as long as the key keeps failing.
#[derive(Debug)]
pub struct KeyBackoff {
    initial: Duration,
    max: Duration,
    randomization_factor: f64,
    keys: Mutex<HashMap<ObjectKey, ExponentialBackoff>>,
}

impl KeyBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self::with_randomization(initial, max, BACKOFF_RANDOMIZATION_FACTOR)
    }

    /// Backoff with a custom jitter factor; `0.0` gives exact intervals.
    #[must_use]
    pub fn with_randomization(initial: Duration, max: Duration, randomization_factor: f64) -> Self {
        Self {
            initial,
            max,
            randomization_factor,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next retry of `key`, advancing its sequence.
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut keys = self
            .keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        keys.entry(key.clone())
            .or_insert_with(|| {
                ExponentialBackoff::new(
                    self.initial,
                    self.max,
                    BACKOFF_MULTIPLIER,
                    self.randomization_factor,
                )
            })
            .next_backoff()
    }

    /// Reset `key` after a successful reconcile.
    pub fn forget(&self, key: &ObjectKey) {
        self.keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    /// Number of keys currently backing off.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod backoff_tests;
