//! A content-addressed, single-flight cache for compiled graphs.
//!
//! Keys are the SHA-256 hash of a normalized spec (see
//! [`crate::compiler::hash`]); values are the resulting compiled
//! `Arc<T>` (almost always `Arc<Graph>`). Concurrent callers compiling the
//! same spec for the first time must only pay the compile cost once — the
//! second and subsequent callers join the first call's in-flight compile
//! rather than racing a duplicate one. `tokio::sync::OnceCell` already
//! gives exactly this join semantics (`get_or_try_init` leaves the cell
//! uninitialized on error, so a failed compile can be retried by the next
//! caller), so this module is a thin bookkeeping layer around a map of
//! per-key `OnceCell`s plus hit/miss/join counters, rather than the
//! teacher's richer LRU/LFU/TTL eviction machinery — a compiled-graph
//! cache has no expiry and at most one entry per distinct spec, so that
//! machinery has no work to do here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OnceCell;

/// Tunables for a [`GraphCache`]. `max_entries` bounds memory use for
/// long-lived processes that compile many distinct specs; `None` means
/// unbounded, which is fine for the common case of one process compiling
/// a handful of specs at startup.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub entries: usize,
}

impl CacheMetrics {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A single-flight, content-addressed cache from hash key to compiled
/// value `T`.
pub struct GraphCache<T> {
    config: CacheConfig,
    cells: RwLock<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
    insertion_order: Mutex<Vec<String>>,
    metrics: Mutex<CacheMetrics>,
}

impl<T> GraphCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            cells: RwLock::new(HashMap::new()),
            insertion_order: Mutex::new(Vec::new()),
            metrics: Mutex::new(CacheMetrics::default()),
        }
    }

    /// Return the cached value for `key`, compiling it with `compile` if
    /// absent. If another caller is already compiling the same `key`,
    /// this call awaits that compile instead of starting its own.
    pub async fn get_or_compile<E, F, Fut>(&self, key: &str, compile: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (cell, is_new) = self.cell_for(key);

        if is_new {
            self.record_miss();
        } else if !cell.initialized() {
            self.record_join();
        } else {
            self.record_hit();
        }

        cell.get_or_try_init(|| async { compile().await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    fn cell_for(&self, key: &str) -> (Arc<OnceCell<Arc<T>>>, bool) {
        {
            let cells = self.cells.read().expect("graph cache lock poisoned");
            if let Some(cell) = cells.get(key) {
                return (Arc::clone(cell), false);
            }
        }

        let mut cells = self.cells.write().expect("graph cache lock poisoned");
        if let Some(cell) = cells.get(key) {
            return (Arc::clone(cell), false);
        }
        let cell = Arc::new(OnceCell::new());
        cells.insert(key.to_string(), Arc::clone(&cell));
        self.insertion_order
            .lock()
            .expect("graph cache lock poisoned")
            .push(key.to_string());
        self.evict_if_over_capacity(&mut cells);
        (cell, true)
    }

    fn evict_if_over_capacity(&self, cells: &mut HashMap<String, Arc<OnceCell<Arc<T>>>>) {
        let Some(max) = self.config.max_entries else {
            return;
        };
        let mut order = self
            .insertion_order
            .lock()
            .expect("graph cache lock poisoned");
        while cells.len() > max {
            if order.is_empty() {
                break;
            }
            let oldest = order.remove(0);
            cells.remove(&oldest);
        }
    }

    fn record_hit(&self) {
        let mut m = self.metrics.lock().expect("graph cache lock poisoned");
        m.hits += 1;
    }

    fn record_miss(&self) {
        let mut m = self.metrics.lock().expect("graph cache lock poisoned");
        m.misses += 1;
        m.entries = self.cells.read().expect("graph cache lock poisoned").len();
    }

    fn record_join(&self) {
        let mut m = self.metrics.lock().expect("graph cache lock poisoned");
        m.joins += 1;
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.lock().expect("graph cache lock poisoned").clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells
            .read()
            .expect("graph cache lock poisoned")
            .get(key)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.cells.write().expect("graph cache lock poisoned").clear();
        self.insertion_order
            .lock()
            .expect("graph cache lock poisoned")
            .clear();
    }
}

impl<T> Default for GraphCache<T> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
