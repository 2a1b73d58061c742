//! Per-model four-state circuit breaker.
//!
//! Grounded on `ninelives::circuit_breaker`'s state machine shape (CAS the
//! stale state, recompute on the winner, retry on a lost race) but adapted
//! to read/write through a [`StateStore`] instead of owning its own atomics:
//! the extra `PERMANENTLY_UNAVAILABLE` state and its `unavailable_reason`
//! field must move together with the state tag, and the store is already
//! the single source of truth for `ModelState` across backends.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::state::{CircuitState, ModelState, RequestRecord, StateStore, now_ms, stats_from_records};
use crate::telemetry;
use crate::Result;

/// Tunables for the per-model state machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_period_mins: u64,
    pub success_threshold: u32,
    pub stats_window_size_mins: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_period_mins: 3,
            success_threshold: 2,
            stats_window_size_mins: 10,
        }
    }
}

/// Owns the state-transition policy; the [`StateStore`] owns the data.
pub struct CircuitBreaker {
    store: Arc<dyn StateStore>,
    config: CircuitBreakerConfig,
}

fn state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
        CircuitState::PermanentlyUnavailable => "permanently_unavailable",
    }
}

fn record_transition(name: &str, from: CircuitState, to: CircuitState) {
    metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
        "model" => name.to_owned(),
        "from" => state_label(from),
        "to" => state_label(to),
    )
    .increment(1);
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn StateStore>, config: CircuitBreakerConfig) -> Self {
        Self { store, config }
    }

    fn cooldown_ms(&self) -> u64 {
        self.config.cooldown_period_mins * 60 * 1_000
    }

    fn window_ms(&self) -> u64 {
        self.config.stats_window_size_mins * 60 * 1_000
    }

    async fn load(&self, name: &str) -> Result<ModelState> {
        Ok(self.store.get_state(name).await?.unwrap_or_default())
    }

    async fn refresh_stats(&self, name: &str, state: &mut ModelState) -> Result<()> {
        let window_start = now_ms().saturating_sub(self.window_ms());
        let records = self.store.get_requests(name, window_start).await?;
        state.stats = stats_from_records(&records);
        Ok(())
    }

    /// Record a successful call and advance the state machine.
    pub async fn on_success(&self, name: &str, latency_ms: u64) -> Result<()> {
        let mut state = self.load(name).await?;
        if matches!(state.circuit_state, CircuitState::PermanentlyUnavailable) {
            return Ok(());
        }

        self.store
            .record_request(
                name,
                RequestRecord {
                    timestamp_ms: now_ms(),
                    latency_ms,
                    success: true,
                },
            )
            .await?;
        self.refresh_stats(name, &mut state).await?;
        state.lifetime_total_requests += 1;

        match state.circuit_state {
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                state.consecutive_failures = 0;
                if state.consecutive_successes >= self.config.success_threshold {
                    state.circuit_state = CircuitState::Closed;
                    state.opened_at_ms = None;
                    state.consecutive_successes = 0;
                    record_transition(name, CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::Open | CircuitState::PermanentlyUnavailable => {}
        }

        self.store.set_state(name, state).await
    }

    /// Record a failed call; `error_code == Some(404)` trips
    /// `PERMANENTLY_UNAVAILABLE` unconditionally.
    pub async fn on_failure(
        &self,
        name: &str,
        error_code: Option<u16>,
        latency_ms: Option<u64>,
    ) -> Result<()> {
        let mut state = self.load(name).await?;
        if matches!(state.circuit_state, CircuitState::PermanentlyUnavailable) {
            return Ok(());
        }

        self.store
            .record_request(
                name,
                RequestRecord {
                    timestamp_ms: now_ms(),
                    latency_ms: latency_ms.unwrap_or(0),
                    success: false,
                },
            )
            .await?;
        self.refresh_stats(name, &mut state).await?;
        state.lifetime_total_requests += 1;
        state.consecutive_successes = 0;

        if error_code == Some(404) {
            let from = state.circuit_state;
            state.circuit_state = CircuitState::PermanentlyUnavailable;
            state.unavailable_reason = Some("model not found (HTTP 404)".to_string());
            record_transition(name, from, CircuitState::PermanentlyUnavailable);
            return self.store.set_state(name, state).await;
        }

        state.consecutive_failures += 1;
        match state.circuit_state {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.circuit_state = CircuitState::Open;
                    state.opened_at_ms = Some(now_ms());
                    record_transition(name, CircuitState::Closed, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                state.circuit_state = CircuitState::Open;
                state.opened_at_ms = Some(now_ms());
                record_transition(name, CircuitState::HalfOpen, CircuitState::Open);
            }
            CircuitState::Open | CircuitState::PermanentlyUnavailable => {}
        }

        self.store.set_state(name, state).await
    }

    /// Whether `name` may currently be dispatched to. For `OPEN` models past
    /// cooldown, performs the OPEN -> HALF_OPEN probe transition as a side
    /// effect and returns `true`.
    pub async fn can_request(&self, name: &str) -> Result<bool> {
        let mut state = self.load(name).await?;
        match state.circuit_state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(true),
            CircuitState::PermanentlyUnavailable => Ok(false),
            CircuitState::Open => {
                let opened_at = state.opened_at_ms.unwrap_or(0);
                if now_ms().saturating_sub(opened_at) >= self.cooldown_ms() {
                    state.circuit_state = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    self.store.set_state(name, state).await?;
                    record_transition(name, CircuitState::Open, CircuitState::HalfOpen);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Subset of `models` for which [`Self::can_request`] is true.
    pub async fn filter_available(&self, models: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(models.len());
        for name in models {
            if self.can_request(name).await? {
                out.push(name.clone());
            }
        }
        Ok(out)
    }

    /// Remaining cooldown for an `OPEN` model; zero otherwise.
    pub async fn remaining_cooldown(&self, name: &str) -> Result<Duration> {
        let state = self.load(name).await?;
        if !matches!(state.circuit_state, CircuitState::Open) {
            return Ok(Duration::ZERO);
        }
        let opened_at = state.opened_at_ms.unwrap_or(now_ms());
        let elapsed = now_ms().saturating_sub(opened_at);
        Ok(Duration::from_millis(self.cooldown_ms().saturating_sub(elapsed)))
    }

    /// Clears all health state for `name`, including `unavailable_reason`
    /// (an explicit reset fully resurrects a
    /// permanently-unavailable model).
    pub async fn reset(&self, name: &str) -> Result<()> {
        self.store.reset_state(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::memory::MemoryStateStore;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            Arc::new(MemoryStateStore::new()),
            CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown_period_mins: 0,
                success_threshold: 2,
                stats_window_size_mins: 10,
            },
        )
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = breaker();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        assert!(cb.can_request("m1").await.unwrap());
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        let state = cb.load("m1").await.unwrap();
        assert_eq!(state.circuit_state, CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures_when_closed() {
        let cb = breaker();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        cb.on_success("m1", 10).await.unwrap();
        let state = cb.load("m1").await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.circuit_state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn http_404_trips_permanently_unavailable() {
        let cb = breaker();
        cb.on_failure("m1", Some(404), None).await.unwrap();
        let state = cb.load("m1").await.unwrap();
        assert_eq!(state.circuit_state, CircuitState::PermanentlyUnavailable);
        assert!(state.unavailable_reason.is_some());
        assert!(!cb.can_request("m1").await.unwrap());
    }

    #[tokio::test]
    async fn cooldown_expiry_probes_half_open() {
        let cb = breaker();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        assert_eq!(cb.load("m1").await.unwrap().circuit_state, CircuitState::Open);

        assert!(cb.can_request("m1").await.unwrap());
        assert_eq!(cb.load("m1").await.unwrap().circuit_state, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let cb = breaker();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        cb.can_request("m1").await.unwrap();

        cb.on_success("m1", 5).await.unwrap();
        assert_eq!(cb.load("m1").await.unwrap().circuit_state, CircuitState::HalfOpen);
        cb.on_success("m1", 5).await.unwrap();
        let state = cb.load("m1").await.unwrap();
        assert_eq!(state.circuit_state, CircuitState::Closed);
        assert!(state.opened_at_ms.is_none());
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = breaker();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        cb.on_failure("m1", None, Some(10)).await.unwrap();
        cb.can_request("m1").await.unwrap();

        cb.on_failure("m1", None, Some(10)).await.unwrap();
        assert_eq!(cb.load("m1").await.unwrap().circuit_state, CircuitState::Open);
    }

    #[tokio::test]
    async fn reset_clears_unavailable_reason() {
        let cb = breaker();
        cb.on_failure("m1", Some(404), None).await.unwrap();
        cb.reset("m1").await.unwrap();
        let state = cb.load("m1").await.unwrap();
        assert_eq!(state.circuit_state, CircuitState::Closed);
        assert!(state.unavailable_reason.is_none());
    }

    #[tokio::test]
    async fn filter_available_drops_unavailable_models() {
        let cb = breaker();
        cb.on_failure("m1", Some(404), None).await.unwrap();
        let available = cb
            .filter_available(&["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();
        assert_eq!(available, vec!["m2".to_string()]);
    }
}
