//! Per-model mutable state and the pluggable storage contract.
//!
//! `StateStore` is a capability set (`{get/set state, record/get requests,
//! rate-limit check, names, fallback counter}`); the Circuit Breaker, Rate
//! Limiter, and Router depend only on this trait, never on a concrete
//! backend. Three backends are provided: [`memory`] (in-process,
//! fine-grained-lock style), [`tcp`] (redis-backed), and [`http`].

pub mod http;
pub mod memory;
#[cfg(feature = "state-tcp")]
pub mod tcp;

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Health classification of one upstream model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
    PermanentlyUnavailable,
}

/// One completed request against a model, used for the sliding-window
/// statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp_ms: u64,
    pub latency_ms: u64,
    pub success: bool,
}

/// Aggregates recomputed on every record and cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            success_count: 0,
            error_count: 0,
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            p95_latency_ms: 0.0,
        }
    }
}

/// Mutable per-model health and statistics state, created on first
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub circuit_state: CircuitState,
    /// Set iff `circuit_state == Open`, cleared on transition to `Closed`.
    pub opened_at_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Sliding-window request records. For the TCP/HTTP backends this is
    /// always serialized empty — those backends keep requests in a
    /// separate sorted set and `get_requests` reconstructs the window.
    #[serde(default)]
    pub requests: VecDeque<RequestRecord>,
    #[serde(default)]
    pub stats: Stats,
    pub lifetime_total_requests: u64,
    /// Set iff `circuit_state == PermanentlyUnavailable`.
    pub unavailable_reason: Option<String>,
}

impl Default for ModelState {
    fn default() -> Self {
        Self {
            circuit_state: CircuitState::Closed,
            opened_at_ms: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            requests: VecDeque::new(),
            stats: Stats::default(),
            lifetime_total_requests: 0,
            unavailable_reason: None,
        }
    }
}

/// Discard records with `timestamp_ms < now_ms - window_ms` from the front
/// of an ordered deque, keeping it monotonically trimmed.
pub fn trim_window(requests: &mut VecDeque<RequestRecord>, now_ms: u64, window_ms: u64) {
    let cutoff = now_ms.saturating_sub(window_ms);
    while let Some(front) = requests.front() {
        if front.timestamp_ms < cutoff {
            requests.pop_front();
        } else {
            break;
        }
    }
}

/// Recompute the summary aggregates from an already-windowed record
/// set. Does not itself trim — callers trim via `trim_window` or a
/// backend's `get_requests`.
pub fn stats_from_records(records: &[RequestRecord]) -> Stats {
    let total_requests = records.len() as u64;
    let success_count = records.iter().filter(|r| r.success).count() as u64;
    let error_count = total_requests - success_count;
    let success_rate = if total_requests == 0 {
        1.0
    } else {
        success_count as f64 / total_requests as f64
    };

    let mut successful_latencies: Vec<u64> = records
        .iter()
        .filter(|r| r.success)
        .map(|r| r.latency_ms)
        .collect();
    let avg_latency_ms = if successful_latencies.is_empty() {
        0.0
    } else {
        successful_latencies.iter().sum::<u64>() as f64 / successful_latencies.len() as f64
    };
    successful_latencies.sort_unstable();
    let p95_latency_ms = if successful_latencies.is_empty() {
        0.0
    } else {
        let idx = ((successful_latencies.len() as f64) * 0.95).floor() as usize;
        let idx = idx.min(successful_latencies.len() - 1);
        successful_latencies[idx] as f64
    };

    Stats {
        total_requests,
        success_count,
        error_count,
        success_rate,
        avg_latency_ms,
        p95_latency_ms,
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as u64
}

/// Pluggable state backend contract.
///
/// All operations may fail with `RouterError::StorageError`, which the
/// caller surfaces but does not retry — storage failures are fatal for the
/// current attempt only.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn init(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    async fn get_state(&self, name: &str) -> Result<Option<ModelState>>;
    async fn set_state(&self, name: &str, state: ModelState) -> Result<()>;

    async fn record_request(&self, name: &str, record: RequestRecord) -> Result<()>;
    /// Requests with `timestamp_ms < window_start_ms` are trimmed as a side
    /// effect and never returned again.
    async fn get_requests(&self, name: &str, window_start_ms: u64) -> Result<Vec<RequestRecord>>;

    async fn reset_state(&self, name: &str) -> Result<()>;
    async fn get_model_names(&self) -> Result<Vec<String>>;

    async fn get_fallbacks_used(&self) -> Result<u64>;
    async fn record_fallback_usage(&self) -> Result<()>;

    /// Atomic fixed-window counter check: admits iff the post-increment
    /// count is `<= limit`.
    async fn check_rate_limit(&self, key: &str, limit: u64, window_secs: u64) -> Result<bool>;
}
