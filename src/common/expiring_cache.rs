//! Time-expiring concurrent collection.
//!
//! Entries are appended in insertion-time order, so the oldest entry is always at the
//! front and an eviction tick only ever pops the expired prefix.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// A value together with the instant it was added
#[derive(Debug, Clone)]
struct CachedEntry<T> {
    inserted_at: Instant,
    value: T,
}

struct CacheInner<T> {
    entries: Mutex<VecDeque<CachedEntry<T>>>,
    ttl: Duration,
    /// Debug name for this cache (used in logging)
    name: String,
}

impl<T> CacheInner<T> {
    // No operation leaves the queue half-updated, so a poisoned lock is still usable
    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<CachedEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, entry: &CachedEntry<T>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) <= self.ttl
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let mut evicted = 0;
        while let Some(front) = entries.front() {
            if self.is_live(front, now) {
                break;
            }
            entries.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            trace!(name = %self.name, evicted, remaining = entries.len(), "Evicted expired entries");
        }
        evicted
    }
}

/// A thread-safe multiset that forgets values older than its time-to-live.
///
/// A background thread runs one eviction tick every `sweep_interval`. Cloning the cache
/// shares the same storage. Dropping the last handle wakes the sweeper, which exits
/// without waiting out the rest of its interval.
pub struct ExpiringCache<T> {
    inner: Arc<CacheInner<T>>,
    /// Never sent on; the sweeper stops when the last clone disconnects it
    _sweep_stop: Arc<Option<SyncSender<()>>>,
}

impl<T> Clone for ExpiringCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _sweep_stop: Arc::clone(&self._sweep_stop),
        }
    }
}

impl<T> fmt::Debug for ExpiringCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .field("len", &self.inner.lock_entries().len())
            .finish()
    }
}

impl<T> ExpiringCache<T>
where
    T: PartialEq + Send + 'static,
{
    /// Create a new cache with the given time-to-live and eviction interval
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self::with_name("unnamed", ttl, sweep_interval)
    }

    /// Create a new cache with a name used in log output
    pub fn with_name(name: impl Into<String>, ttl: Duration, sweep_interval: Duration) -> Self {
        let name = name.into();
        debug!(name = %name, ?ttl, ?sweep_interval, "Creating new ExpiringCache");

        let inner = Arc::new(CacheInner {
            entries: Mutex::new(VecDeque::new()),
            ttl,
            name,
        });
        let sweep_stop =
            spawn_sweeper(Arc::downgrade(&inner), sweep_interval.max(MIN_SWEEP_INTERVAL))
                .map(|(stop, _)| stop);

        Self {
            inner,
            _sweep_stop: Arc::new(sweep_stop),
        }
    }

    /// Append a value stamped with the current instant
    pub fn add(&self, value: T) {
        let mut entries = self.inner.lock_entries();
        // Stamped under the lock so the queue stays ordered by insertion time
        entries.push_back(CachedEntry {
            inserted_at: Instant::now(),
            value,
        });
    }

    /// Check whether an equal value was added less than `ttl` ago
    pub fn contains(&self, value: &T) -> bool {
        let now = Instant::now();
        let entries = self.inner.lock_entries();
        entries
            .iter()
            .rev()
            .take_while(|entry| self.inner.is_live(entry, now))
            .any(|entry| entry.value == *value)
    }

    /// Add the value unless a live equal value is already present.
    ///
    /// Returns `true` when the value was added.
    pub fn insert_if_absent(&self, value: T) -> bool {
        let now = Instant::now();
        let mut entries = self.inner.lock_entries();
        let present = entries
            .iter()
            .rev()
            .take_while(|entry| self.inner.is_live(entry, now))
            .any(|entry| entry.value == value);
        if present {
            return false;
        }
        entries.push_back(CachedEntry {
            inserted_at: Instant::now(),
            value,
        });
        true
    }

    /// Run one eviction tick now, returning how many entries were dropped
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired()
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.inner.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.lock_entries().clear();
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }
}

/// Start the eviction thread. It runs until `stop` is dropped or the cache is gone.
fn spawn_sweeper<T>(
    cache: Weak<CacheInner<T>>,
    interval: Duration,
) -> Option<(SyncSender<()>, thread::JoinHandle<()>)>
where
    T: Send + 'static,
{
    let (stop, stopped) = mpsc::sync_channel::<()>(0);
    let spawned = thread::Builder::new()
        .name("expiring-cache-sweep".to_string())
        .spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => match cache.upgrade() {
                    Some(inner) => {
                        inner.evict_expired();
                    }
                    None => break,
                },
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

    match spawned {
        Ok(handle) => Some((stop, handle)),
        Err(e) => {
            // contains() still ignores expired entries; they just stay in memory longer
            warn!(error = %e, "Failed to spawn cache eviction thread");
            None
        }
    }
}
