//! HTTP-backed `StateStore`, for deployments that front their shared state
//! with a small key/value service rather than redis directly. Same
//! timeout/retry-free posture as the remote catalog client in
//! `registry/fetch.rs`, same "treat non-2xx as `StorageError`" handling.
//!
//! Speaks the same key layout as [`super::tcp`] over a narrow REST surface:
//!   `GET  /v1/state/{name}`             -> `ModelState` JSON or 404
//!   `PUT  /v1/state/{name}`             <- `ModelState` JSON
//!   `POST /v1/state/{name}/requests`    <- `RequestRecord` JSON
//!   `GET  /v1/state/{name}/requests?since={window_start_ms}`
//!   `DELETE /v1/state/{name}`
//!   `GET  /v1/models`                   -> `Vec<String>`
//!   `GET  /v1/fallbacks`                -> `u64`
//!   `POST /v1/fallbacks`
//!   `POST /v1/ratelimit/{key}?limit={limit}&window_secs={window_secs}` -> `bool`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};

use super::{ModelState, RequestRecord, StateStore};
use crate::{Result, RouterError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State store backed by a small HTTP key/value service.
pub struct HttpStateStore {
    client: Client,
    base_url: String,
}

impl HttpStateStore {
    /// `token`, if given, is sent as `Authorization: Bearer {token}` on every
    /// request (the same bearer token convention used by the other backend).
    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RouterError::Configuration(format!("invalid REDIS_TOKEN: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(RouterError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl StateStore for HttpStateStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn get_state(&self, name: &str) -> Result<Option<ModelState>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/state/{name}")))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json().await?))
    }

    async fn set_state(&self, name: &str, state: ModelState) -> Result<()> {
        self.client
            .put(self.url(&format!("/v1/state/{name}")))
            .json(&state)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn record_request(&self, name: &str, record: RequestRecord) -> Result<()> {
        self.client
            .post(self.url(&format!("/v1/state/{name}/requests")))
            .json(&record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_requests(&self, name: &str, window_start_ms: u64) -> Result<Vec<RequestRecord>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/state/{name}/requests")))
            .query(&[("since", window_start_ms)])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn reset_state(&self, name: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/v1/state/{name}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_model_names(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(self.url("/v1/models"))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn get_fallbacks_used(&self) -> Result<u64> {
        let resp = self
            .client
            .get(self.url("/v1/fallbacks"))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn record_fallback_usage(&self) -> Result<()> {
        self.client
            .post(self.url("/v1/fallbacks"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn check_rate_limit(&self, key: &str, limit: u64, window_secs: u64) -> Result<bool> {
        let resp = self
            .client
            .post(self.url(&format!("/v1/ratelimit/{key}")))
            .query(&[("limit", limit), ("window_secs", window_secs)])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}
