//! Router error types.

use std::time::Duration;

/// Errors surfaced by the routing core.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum RouterError {
    /// Malformed body or out-of-range parameters (HTTP 400).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Pre-dispatch limiter denied, or all attempts were denied by the
    /// limiter (HTTP 429).
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Every candidate model failed (HTTP 502). Carries the per-attempt
    /// error list that is also surfaced in `_router.errors`.
    #[error("all models failed after {attempts} attempt(s)")]
    AllModelsFailed {
        attempts: usize,
        errors: Vec<crate::types::AttemptError>,
    },

    /// Selection filters matched nothing (HTTP 400 or 503 depending on cause).
    #[error("no suitable model: {0}")]
    NoSuitableModel(String),

    /// Configuration references an unknown provider (HTTP 500).
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Shutdown or client disconnect aborted the request (HTTP 503).
    #[error("request cancelled: {0}")]
    RequestCancelled(CancelReason),

    /// State backend failure, surfaced rather than retried (HTTP 500).
    #[error("storage error: {0}")]
    StorageError(String),

    /// Configuration file or catalog failed to load or parse.
    #[error("configuration error: {0}")]
    Configuration(String),

    // Provider-adapter-facing variants, used by adapters to report failures
    // before `is_transient` classifies them.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed")]
    AuthenticationFailed,
}

/// Why a request's cancellation signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    #[error("client disconnected")]
    ClientDisconnect,
    #[error("process shutdown")]
    Shutdown,
    #[error("request timeout")]
    Timeout,
}

impl RouterError {
    /// Whether this error is transient and the same model may be retried.
    ///
    /// Network / 429 / 5xx / timeout ⇒ transient; other 4xx and `Cancelled`
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::StorageError(_)
            | Self::ValidationError(_)
            | Self::AllModelsFailed { .. }
            | Self::NoSuitableModel(_)
            | Self::ProviderNotFound(_)
            | Self::RequestCancelled(_)
            | Self::Configuration(_)
            | Self::AuthenticationFailed => false,
        }
    }

    /// For `RateLimited` errors, the duration the provider suggests waiting.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::AllModelsFailed { .. } => 502,
            Self::NoSuitableModel(_) => 400,
            Self::ProviderNotFound(_) => 500,
            Self::RequestCancelled(_) => 503,
            Self::StorageError(_) | Self::Configuration(_) => 500,
            Self::Http(_) | Self::Api { .. } => 502,
            Self::AuthenticationFailed => 401,
        }
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Configuration(format!("JSON error: {err}"))
    }
}

impl From<serde_yaml::Error> for RouterError {
    fn from(err: serde_yaml::Error) -> Self {
        RouterError::Configuration(format!("YAML error: {err}"))
    }
}

impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        RouterError::Http(err.to_string())
    }
}

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_transient() {
        assert!(RouterError::RateLimited { retry_after: None }.is_transient());
    }

    #[test]
    fn server_error_is_transient() {
        assert!(
            RouterError::Api {
                status: 503,
                message: "down".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn client_error_other_than_429_is_not_transient() {
        assert!(
            !RouterError::Api {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn cancelled_is_not_transient() {
        assert!(!RouterError::RequestCancelled(CancelReason::Shutdown).is_transient());
    }

    #[test]
    fn validation_error_maps_to_400() {
        assert_eq!(RouterError::ValidationError("x".into()).status_code(), 400);
    }

    #[test]
    fn all_models_failed_maps_to_502() {
        let err = RouterError::AllModelsFailed {
            attempts: 2,
            errors: Vec::new(),
        };
        assert_eq!(err.status_code(), 502);
    }
}
