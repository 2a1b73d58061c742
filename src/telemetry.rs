//! Telemetry metric name constants.
//!
//! Centralised metric names for routeward operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `routeward_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model` — routing-level model name
//! - `provider` — upstream provider name (e.g. "openrouter", "deepseek")
//! - `status` — outcome: "ok" or "error"
//! - `reason` — circuit-breaker transition cause, cancellation cause

/// Total requests dispatched through the router.
///
/// Labels: `model`, `provider`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "routeward_requests_total";

/// Per-attempt provider call latency, in seconds.
///
/// Labels: `model`, `provider`.
pub const ATTEMPT_DURATION_SECONDS: &str = "routeward_attempt_duration_seconds";

/// Total retry attempts against the same model (not counting the initial
/// attempt).
///
/// Labels: `model`.
pub const RETRIES_TOTAL: &str = "routeward_retries_total";

/// Total model switches within the router's attempt loop.
///
/// Labels: `reason` ("transient_exhausted" | "permanent" | "rate_limited").
pub const MODEL_SWITCHES_TOTAL: &str = "routeward_model_switches_total";

/// Total times the designated fallback model was used.
pub const FALLBACKS_TOTAL: &str = "routeward_fallbacks_total";

/// Total requests denied by the rate limiter.
///
/// Labels: `model`.
pub const RATE_LIMITED_TOTAL: &str = "routeward_rate_limited_total";

/// Total circuit breaker state transitions.
///
/// Labels: `model`, `from`, `to`.
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "routeward_circuit_transitions_total";

/// Total requests that ended in cancellation.
///
/// Labels: `reason` ("client_disconnect" | "shutdown" | "timeout").
pub const CANCELLATIONS_TOTAL: &str = "routeward_cancellations_total";
