//! Redis-backed `StateStore`: a thin async client wrapper with its own key
//! layout, built on `redis`'s `ConnectionManager`.
//!
//! Key layout:
//!   `router:state:{name}`     — JSON-encoded `ModelState` minus `requests`
//!   `router:requests:{name}`  — sorted set, score = timestamp_ms, member = JSON `RequestRecord`
//!   `router:fallbacks_used`   — integer counter
//!   `router:ratelimit:{key}`  — integer counter with TTL = window_secs

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{ModelState, RequestRecord, StateStore, now_ms};
use crate::{Result, RouterError};

fn state_key(name: &str) -> String {
    format!("router:state:{name}")
}

fn requests_key(name: &str) -> String {
    format!("router:requests:{name}")
}

const FALLBACKS_KEY: &str = "router:fallbacks_used";

fn rate_limit_key(key: &str) -> String {
    format!("router:ratelimit:{key}")
}

fn storage_err(err: redis::RedisError) -> RouterError {
    RouterError::StorageError(err.to_string())
}

/// State store backed by a TCP connection to a redis-compatible server.
pub struct TcpStateStore {
    conn: ConnectionManager,
}

impl TcpStateStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(storage_err)?;
        let conn = client.get_connection_manager().await.map_err(storage_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for TcpStateStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn get_state(&self, name: &str) -> Result<Option<ModelState>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(state_key(name)).await.map_err(storage_err)?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_state(&self, name: &str, state: ModelState) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut to_store = state;
        to_store.requests.clear();
        let json = serde_json::to_string(&to_store)?;
        let () = conn.set(state_key(name), json).await.map_err(storage_err)?;
        Ok(())
    }

    async fn record_request(&self, name: &str, record: RequestRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let member = serde_json::to_string(&record)?;
        let () = conn
            .zadd(requests_key(name), member, record.timestamp_ms as f64)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_requests(&self, name: &str, window_start_ms: u64) -> Result<Vec<RequestRecord>> {
        let mut conn = self.conn.clone();
        let key = requests_key(name);
        let _: () = conn
            .zrembyscore(&key, 0, (window_start_ms.saturating_sub(1)) as f64)
            .await
            .map_err(storage_err)?;
        let members: Vec<String> = conn
            .zrangebyscore(&key, window_start_ms as f64, now_ms() as f64)
            .await
            .map_err(storage_err)?;
        members
            .iter()
            .map(|m| serde_json::from_str(m).map_err(RouterError::from))
            .collect()
    }

    async fn reset_state(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(state_key(name)).await.map_err(storage_err)?;
        let () = conn.del(requests_key(name)).await.map_err(storage_err)?;
        Ok(())
    }

    async fn get_model_names(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("router:state:*").await.map_err(storage_err)?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("router:state:").map(str::to_string))
            .collect())
    }

    async fn get_fallbacks_used(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = conn.get(FALLBACKS_KEY).await.map_err(storage_err)?;
        Ok(count.unwrap_or(0))
    }

    async fn record_fallback_usage(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.incr(FALLBACKS_KEY, 1).await.map_err(storage_err)?;
        Ok(())
    }

    async fn check_rate_limit(&self, key: &str, limit: u64, window_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let full_key = rate_limit_key(key);
        let count: u64 = conn.incr(&full_key, 1).await.map_err(storage_err)?;
        if count == 1 {
            let _: () = conn
                .expire(&full_key, window_secs as i64)
                .await
                .map_err(storage_err)?;
        }
        Ok(count <= limit)
    }
}
