//! Per-model token-bucket rate limiting.
//!
//! A thin policy layer over `StateStore::check_rate_limit`'s atomic
//! fixed-window counter — the limiter itself holds no state, mirroring how
//! [`crate::circuit_breaker::CircuitBreaker`] treats the store as the owner
//! of truth.

use std::sync::Arc;

use serde::Deserialize;

use crate::Result;
use crate::state::StateStore;

/// Requests/minute applied uniformly across all models; `None` disables the
/// limiter entirely: enabled iff that number is set.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default)]
    pub model_requests_per_minute: Option<u64>,
}

pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    /// `true` if `name` may be dispatched to right now. Always `true` when
    /// the limiter is disabled.
    pub async fn check_model(&self, name: &str) -> Result<bool> {
        let Some(limit) = self.config.model_requests_per_minute else {
            return Ok(true);
        };
        self.store
            .check_rate_limit(&format!("model:{name}"), limit, 60)
            .await
    }
}
