//! Time-bounded memoization of adapter calls.
//!
//! Errors are cached exactly like successful results, so a failing carrier is
//! asked at most once per key and TTL window. The price is that a transient
//! failure stays visible until the entry expires.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

use crate::model::{AgentId, CarrierId, TrackingNumber};
use crate::ports::FetchOutcome;

/// Validity window used when nothing else is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Namespace of a cache key. Agent and carrier ids never collide because the
/// variant is part of the key.
pub enum Selector {
    /// Lookup through a configured agent.
    Agent(AgentId),
    /// Lookup through an environment carrier.
    Carrier(CarrierId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Key of a cached adapter call.
pub struct CacheKey {
    /// Which credentials were used.
    pub selector: Selector,
    /// Which shipment was asked for.
    pub tracking_number: TrackingNumber,
}

impl CacheKey {
    /// Build a key.
    #[must_use]
    pub fn new(selector: Selector, tracking_number: TrackingNumber) -> Self {
        Self {
            selector,
            tracking_number,
        }
    }
}

/// Storage behind the cache. Implementations decide where entries live; the
/// freshness rule is theirs to apply on `get`.
pub trait ResultCache: Send + Sync {
    /// Fresh value for the key, if any.
    fn get(&self, key: &CacheKey) -> Option<FetchOutcome>;

    /// Store a value for the key.
    fn put(&self, key: CacheKey, value: FetchOutcome);

    /// Validity window of an entry.
    fn ttl(&self) -> Duration;
}

struct CacheEntry {
    value: FetchOutcome,
    inserted_at: Instant,
}

/// In-process cache with lazy expiry.
///
/// Stale entries are ignored on read and swept on the next write. Memory is
/// not otherwise bounded.
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    /// Create an empty cache with the given validity window.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) < self.ttl
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<FetchOutcome> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value.clone())
    }

    fn put(&self, key: CacheKey, value: FetchOutcome) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Cache that never remembers anything.
pub struct DisabledCache;

impl ResultCache for DisabledCache {
    fn get(&self, _key: &CacheKey) -> Option<FetchOutcome> {
        None
    }

    fn put(&self, _key: CacheKey, _value: FetchOutcome) {}

    fn ttl(&self) -> Duration {
        Duration::ZERO
    }
}

type Inflight = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

/// Front of a [`ResultCache`] that serializes concurrent misses per key, so
/// simultaneous requests for the same key issue a single computation.
pub struct CoalescingCache {
    store: Arc<dyn ResultCache>,
    inflight: Inflight,
}

impl CoalescingCache {
    /// Wrap a cache store.
    #[must_use]
    pub fn new(store: Arc<dyn ResultCache>) -> Self {
        Self {
            store,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Validity window of the underlying store.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.store.ttl()
    }

    /// Return the cached outcome for `key`, or run `compute` and cache what it
    /// returns, errors included.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        if let Some(hit) = self.store.get(&key) {
            debug!(tracking_number = %key.tracking_number, selector = ?key.selector, "cache_hit");
            return hit;
        }

        let slot = InflightSlot::claim(&self.inflight, &key);
        let _turn = slot.turn.lock().await;

        if let Some(hit) = self.store.get(&key) {
            debug!(tracking_number = %key.tracking_number, "cache_hit_after_wait");
            return hit;
        }

        debug!(tracking_number = %key.tracking_number, selector = ?key.selector, "cache_miss");
        let fresh = compute().await;
        self.store.put(key, fresh.clone());
        fresh
    }
}

/// Share of a per-key lock. The map entry goes away with its last holder, also
/// when the caller's future is dropped mid-computation.
struct InflightSlot<'map> {
    inflight: &'map Inflight,
    key: CacheKey,
    turn: Arc<AsyncMutex<()>>,
}

impl<'map> InflightSlot<'map> {
    fn claim(inflight: &'map Inflight, key: &CacheKey) -> Self {
        let turn = Arc::clone(inflight.lock().entry(key.clone()).or_default());
        Self {
            inflight,
            key: key.clone(),
            turn,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock();
        // The map and this slot are the only holders left: nobody is waiting.
        let last = inflight
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.turn) && Arc::strong_count(entry) == 2);
        if last {
            inflight.remove(&self.key);
        }
    }
}
