//! TTL cache with per-key single-flight loading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;

/// A TTL cache where concurrent misses for one key collapse into a
/// single loader invocation.
///
/// Each key owns an async mutex slot; a loader runs while holding the
/// slot, so every other caller for that key waits and then reads the
/// freshly-cached value instead of loading again. Constructed once and
/// injected — never ambient global state.
pub struct SingleFlight<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    ttl: Duration,
    max_entries: usize,
}

struct Slot<T> {
    cell: Arc<AsyncMutex<Option<Entry<T>>>>,
    created_at: Instant,
}

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Get the cached value for `key`, or run `load` to produce it.
    ///
    /// A loader failure is not cached: the next caller retries.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let cell = self.slot_for(key);

        let mut guard = cell.lock().await;
        if let Some(entry) = guard.as_ref() {
            if entry.inserted_at.elapsed() <= self.ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = load().await?;
        *guard = Some(Entry {
            value: value.clone(),
            inserted_at: Instant::now(),
        });
        Ok(value)
    }

    /// Drop one key.
    pub fn invalidate(&self, key: &str) {
        self.slots.lock().unwrap().remove(key);
    }

    /// Drop every key under a prefix.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.slots
            .lock()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.slots.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_for(&self, key: &str) -> Arc<AsyncMutex<Option<Entry<T>>>> {
        let mut slots = self.slots.lock().unwrap();

        if !slots.contains_key(key) && slots.len() >= self.max_entries {
            // Evict the oldest slot to stay under capacity.
            if let Some(oldest) = slots
                .iter()
                .min_by_key(|(_, s)| s.created_at)
                .map(|(k, _)| k.clone())
            {
                slots.remove(&oldest);
            }
        }

        slots
            .entry(key.to_string())
            .or_insert_with(|| Slot {
                cell: Arc::new(AsyncMutex::new(None)),
                created_at: Instant::now(),
            })
            .cell
            .clone()
    }
}
