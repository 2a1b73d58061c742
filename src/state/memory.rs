//! In-process `StateStore` — per-model fine-grained locking, no external
//! dependency. Rate-limit buckets use the same per-key-mutex shape rather
//! than lock-free atomics since the count and its expiry must update
//! together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{stats_from_records, ModelState, RequestRecord, StateStore, now_ms, trim_window};
use crate::Result;

struct RateLimitBucket {
    count: u64,
    reset_at_ms: u64,
}

/// In-process state store. Cheap to construct, lost on process restart.
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, Arc<Mutex<ModelState>>>>,
    buckets: RwLock<HashMap<String, Arc<Mutex<RateLimitBucket>>>>,
    fallbacks_used: AtomicU64,
    cleanup_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            buckets: RwLock::new(HashMap::new()),
            fallbacks_used: AtomicU64::new(0),
            cleanup_task: StdMutex::new(None),
        }
    }
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the periodic purge of stale request records and expired
    /// rate-limit buckets (default every minute). Idempotent: a later call
    /// replaces and aborts the previous task. Stopped by [`Self::close`].
    pub fn spawn_cleanup(self: &Arc<Self>, window_ms: u64, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else { break };
                store.purge_stale(window_ms);
            }
        });
        if let Some(old) = self.cleanup_task.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    fn purge_stale(&self, window_ms: u64) {
        let now = now_ms();
        let names: Vec<String> = self.states.read().keys().cloned().collect();
        for name in names {
            let slot = self.state_slot(&name);
            let mut guard = slot.lock();
            let before = guard.requests.len();
            trim_window(&mut guard.requests, now, window_ms);
            if guard.requests.len() != before {
                let records: Vec<RequestRecord> = guard.requests.iter().copied().collect();
                guard.stats = stats_from_records(&records);
            }
        }
        self.buckets.write().retain(|_, bucket| {
            let guard = bucket.lock();
            guard.reset_at_ms == 0 || now < guard.reset_at_ms
        });
        debug!("purged stale request records and expired rate-limit buckets");
    }

    fn state_slot(&self, name: &str) -> Arc<Mutex<ModelState>> {
        if let Some(slot) = self.states.read().get(name) {
            return slot.clone();
        }
        self.states
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ModelState::default())))
            .clone()
    }

    fn bucket_slot(&self, key: &str) -> Arc<Mutex<RateLimitBucket>> {
        if let Some(slot) = self.buckets.read().get(key) {
            return slot.clone();
        }
        self.buckets
            .write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitBucket { count: 0, reset_at_ms: 0 })))
            .clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Stops the periodic cleanup task, if one was started via
    /// [`MemoryStateStore::spawn_cleanup`].
    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.cleanup_task.lock().unwrap().take() {
            handle.abort();
        }
        Ok(())
    }

    async fn get_state(&self, name: &str) -> Result<Option<ModelState>> {
        Ok(self.states.read().get(name).map(|slot| slot.lock().clone()))
    }

    /// `state.requests` is whatever snapshot the caller loaded before
    /// calling `record_request` and is discarded here — the stored slot's
    /// deque (already up to date under its own lock) is the source of
    /// truth, exactly as for the TCP/HTTP backends' separate request log.
    async fn set_state(&self, name: &str, mut state: ModelState) -> Result<()> {
        let slot = self.state_slot(name);
        let mut guard = slot.lock();
        state.requests = std::mem::take(&mut guard.requests);
        *guard = state;
        Ok(())
    }

    async fn record_request(&self, name: &str, record: RequestRecord) -> Result<()> {
        let slot = self.state_slot(name);
        slot.lock().requests.push_back(record);
        Ok(())
    }

    async fn get_requests(&self, name: &str, window_start_ms: u64) -> Result<Vec<RequestRecord>> {
        let slot = self.state_slot(name);
        let mut guard = slot.lock();
        trim_window(&mut guard.requests, now_ms(), now_ms().saturating_sub(window_start_ms));
        Ok(guard.requests.iter().copied().collect())
    }

    async fn reset_state(&self, name: &str) -> Result<()> {
        *self.state_slot(name).lock() = ModelState::default();
        Ok(())
    }

    async fn get_model_names(&self) -> Result<Vec<String>> {
        Ok(self.states.read().keys().cloned().collect())
    }

    async fn get_fallbacks_used(&self) -> Result<u64> {
        Ok(self.fallbacks_used.load(Ordering::SeqCst))
    }

    async fn record_fallback_usage(&self) -> Result<()> {
        self.fallbacks_used.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_rate_limit(&self, key: &str, limit: u64, window_secs: u64) -> Result<bool> {
        let bucket = self.bucket_slot(key);
        let mut guard = bucket.lock();
        let now = now_ms();
        if guard.reset_at_ms == 0 || now >= guard.reset_at_ms {
            guard.count = 0;
            guard.reset_at_ms = now + window_secs * 1_000;
        }
        guard.count += 1;
        Ok(guard.count <= limit)
    }
}
