//! Time-to-live sampling cache.
//!
//! Holds the most recent fetch result per key. A lookup within the TTL
//! window returns the stored value without touching the upstream source;
//! past it, the caller-supplied fetch runs and its result replaces the entry.
//!
//! Each key has its own async lock, held across the upstream call, so
//! concurrent misses on one key collapse into a single fetch: waiters see
//! the freshly stored value once the first caller releases the lock.
//!
//! When a refresh fails and a previous value exists, that value is returned
//! marked [`Origin::Stale`] instead of the error. The entry keeps its
//! stored timestamp, so the next lookup tries upstream again.
//!
//! Callers that were queued on the lock while an attempt ran share that
//! attempt's outcome, failure included, instead of starting their own.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::model::FetchError;

/// Where a looked-up value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Fetched upstream by this lookup.
    Fetched,
    /// Served from the cache within the TTL window.
    Memoized,
    /// The refresh failed; this is the last value that was stored.
    Stale { error: String },
}

/// Result of a cache lookup.
#[derive(Debug)]
pub struct Lookup<V> {
    pub value: Arc<V>,
    /// Time since the value was stored.
    pub age: Duration,
    pub origin: Origin,
}

impl<V> Lookup<V> {
    pub fn is_stale(&self) -> bool {
        matches!(self.origin, Origin::Stale { .. })
    }
}

struct Entry<V> {
    value: Arc<V>,
    stored_at: Instant,
}

struct SlotState<V, E> {
    entry: Option<Entry<V>>,
    /// Error of the most recent attempt, cleared by a success.
    last_error: Option<E>,
}

struct SlotInner<V, E> {
    /// Completed upstream attempts; bumped under the lock.
    attempts: AtomicU64,
    state: tokio::sync::Mutex<SlotState<V, E>>,
}

type Slot<V, E> = Arc<SlotInner<V, E>>;

/// One-entry-per-key cache with TTL expiry and single-flight refresh.
///
/// No capacity bound and no LRU: entries live until replaced or invalidated.
pub struct SamplingCache<K, V, E = FetchError> {
    slots: Mutex<HashMap<K, Slot<V, E>>>,
    upstream_fetches: AtomicU64,
}

impl<K, V, E> Default for SamplingCache<K, V, E>
where
    K: Eq + Hash + Clone,
    E: Clone + std::fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> SamplingCache<K, V, E>
where
    K: Eq + Hash + Clone,
    E: Clone + std::fmt::Display,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            upstream_fetches: AtomicU64::new(0),
        }
    }

    fn slot(&self, key: &K) -> Slot<V, E> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(SlotInner {
                    attempts: AtomicU64::new(0),
                    state: tokio::sync::Mutex::new(SlotState {
                        entry: None,
                        last_error: None,
                    }),
                })
            })
            .clone()
    }

    /// Returns the memoized value for `key` if it is younger than `ttl`,
    /// otherwise runs `fetch`, stores the result and returns it.
    ///
    /// An error from `fetch` is returned only when nothing was stored for
    /// `key` before; otherwise the previous value comes back as stale.
    /// A caller that waited on another caller's attempt gets that attempt's
    /// outcome and `fetch` is not run.
    pub async fn get<F, Fut>(&self, key: &K, ttl: Duration, fetch: F) -> Result<Lookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let seen = slot.attempts.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        if slot.attempts.load(Ordering::Acquire) != seen {
            if let Some(shared) = state.shared_outcome() {
                return shared;
            }
        }

        if let Some(current) = state.entry.as_ref() {
            let age = current.stored_at.elapsed();
            if age < ttl {
                return Ok(Lookup {
                    value: Arc::clone(&current.value),
                    age,
                    origin: Origin::Memoized,
                });
            }
        }

        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
        let result = fetch().await;
        slot.attempts.fetch_add(1, Ordering::Release);

        match result {
            Ok(value) => {
                let value = Arc::new(value);
                state.entry = Some(Entry {
                    value: Arc::clone(&value),
                    stored_at: Instant::now(),
                });
                state.last_error = None;
                Ok(Lookup {
                    value,
                    age: Duration::ZERO,
                    origin: Origin::Fetched,
                })
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                match state.entry.as_ref() {
                    Some(previous) => {
                        tracing::debug!(error = %err, "refresh failed, serving stale entry");
                        Ok(stale_lookup(previous, &err))
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Drops the entry for `key`; the next lookup fetches upstream.
    pub fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(key);
    }

    /// Number of upstream fetches attempted since creation.
    pub fn upstream_fetches(&self) -> u64 {
        self.upstream_fetches.load(Ordering::Relaxed)
    }

    /// Number of keys with a slot, stored or pending.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V, E: Clone + std::fmt::Display> SlotState<V, E> {
    /// Outcome of the attempt that finished last, as seen by a waiter.
    fn shared_outcome(&self) -> Option<Result<Lookup<V>, E>> {
        match (&self.entry, &self.last_error) {
            (Some(entry), None) => Some(Ok(Lookup {
                value: Arc::clone(&entry.value),
                age: entry.stored_at.elapsed(),
                origin: Origin::Memoized,
            })),
            (Some(entry), Some(err)) => Some(Ok(stale_lookup(entry, err))),
            (None, Some(err)) => Some(Err(err.clone())),
            (None, None) => None,
        }
    }
}

fn stale_lookup<V, E: std::fmt::Display>(entry: &Entry<V>, err: &E) -> Lookup<V> {
    Lookup {
        value: Arc::clone(&entry.value),
        age: entry.stored_at.elapsed(),
        origin: Origin::Stale {
            error: err.to_string(),
        },
    }
}
