//! Thin async Redis wrapper.
//!
//! Every collaborator that touches Redis is handed an `Arc<dyn Client + Send +
//! Sync>`; callers never match on `Option<RedisClient>`. When `REDIS_URL` is
//! unset, the service wires up `NullRedisClient` instead of `RedisClient`, and
//! the rest of the code is none the wiser.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

const REDIS_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum CustomRedisError {
    #[error("not found in redis")]
    NotFound,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("timed out waiting for redis")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for CustomRedisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CustomRedisError::Timeout
    }
}

/// A sorted-set window primitive: prune entries older than `cutoff`, then
/// count what's left. Used for read-only quota checks.
#[async_trait]
pub trait Client {
    async fn get(&self, key: &str) -> Result<Option<String>, CustomRedisError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CustomRedisError>;
    async fn del(&self, key: &str) -> Result<(), CustomRedisError>;

    /// ZREMRANGEBYSCORE(-inf, cutoff) then ZCARD, pipelined. Returns the
    /// count remaining after pruning.
    async fn prune_and_count(&self, key: &str, cutoff: f64) -> Result<u64, CustomRedisError>;

    /// ZADD(score, member) then EXPIRE(ttl_secs), pipelined.
    async fn add_to_window(
        &self,
        key: &str,
        score: f64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<(), CustomRedisError>;

    /// ZREMRANGEBYSCORE(-inf, cutoff), ZCARD, ZADD(now, member), EXPIRE(ttl_secs),
    /// all pipelined in a single round trip. Returns the count observed
    /// *before* the add, so callers can make an admission decision.
    async fn slide_window(
        &self,
        key: &str,
        cutoff: f64,
        now: f64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<u64, CustomRedisError>;

    /// Score of the oldest remaining member, if any (ZRANGE key 0 0 WITHSCORES).
    async fn oldest_score(&self, key: &str) -> Result<Option<f64>, CustomRedisError>;
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(addr: &str) -> Result<Self, CustomRedisError> {
        let client = redis::Client::open(addr)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = timeout(REDIS_TIMEOUT, conn.get(key)).await??;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        timeout(REDIS_TIMEOUT, conn.set_ex::<_, _, ()>(key, value, ttl_secs)).await??;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        timeout(REDIS_TIMEOUT, conn.del::<_, ()>(key)).await??;
        Ok(())
    }

    async fn prune_and_count(&self, key: &str, cutoff: f64) -> Result<u64, CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (_, count): ((), u64) = timeout(
            REDIS_TIMEOUT,
            redis::pipe()
                .atomic()
                .zrembyscore(key, "-inf", cutoff)
                .ignore()
                .zcard(key)
                .query_async(&mut conn),
        )
        .await??;
        Ok(count)
    }

    async fn add_to_window(
        &self,
        key: &str,
        score: f64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<(), CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        timeout(
            REDIS_TIMEOUT,
            redis::pipe()
                .atomic()
                .zadd(key, member, score)
                .ignore()
                .expire(key, ttl_secs as i64)
                .ignore()
                .query_async::<_, ()>(&mut conn),
        )
        .await??;
        Ok(())
    }

    async fn slide_window(
        &self,
        key: &str,
        cutoff: f64,
        now: f64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<u64, CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (_, count, _, _): ((), u64, (), ()) = timeout(
            REDIS_TIMEOUT,
            redis::pipe()
                .atomic()
                .zrembyscore(key, "-inf", cutoff)
                .ignore()
                .zcard(key)
                .zadd(key, member, now)
                .ignore()
                .expire(key, ttl_secs as i64)
                .ignore()
                .query_async(&mut conn),
        )
        .await??;
        Ok(count)
    }

    async fn oldest_score(&self, key: &str) -> Result<Option<f64>, CustomRedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let rows: Vec<(String, f64)> = timeout(
            REDIS_TIMEOUT,
            conn.zrange_withscores(key, 0, 0),
        )
        .await??;
        Ok(rows.into_iter().next().map(|(_, score)| score))
    }
}

/// Always-miss, always-succeed stand-in used when `REDIS_URL` is unset.
/// Every caller that depends on Redis fails open against this client.
#[derive(Clone, Default)]
pub struct NullRedisClient;

#[async_trait]
impl Client for NullRedisClient {
    async fn get(&self, _key: &str) -> Result<Option<String>, CustomRedisError> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), CustomRedisError> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<(), CustomRedisError> {
        Ok(())
    }

    async fn prune_and_count(&self, _key: &str, _cutoff: f64) -> Result<u64, CustomRedisError> {
        Ok(0)
    }

    async fn add_to_window(
        &self,
        _key: &str,
        _score: f64,
        _member: &str,
        _ttl_secs: u64,
    ) -> Result<(), CustomRedisError> {
        Ok(())
    }

    async fn slide_window(
        &self,
        _key: &str,
        _cutoff: f64,
        _now: f64,
        _member: &str,
        _ttl_secs: u64,
    ) -> Result<u64, CustomRedisError> {
        Ok(0)
    }

    async fn oldest_score(&self, _key: &str) -> Result<Option<f64>, CustomRedisError> {
        Ok(None)
    }
}

/// In-memory fake for unit tests, recording calls and replaying canned state
/// for sorted sets. Not meant to model full Redis semantics, just enough for
/// this crate's collaborators.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    strings: Arc<Mutex<std::collections::HashMap<String, String>>>,
    sets: Arc<Mutex<std::collections::HashMap<String, Vec<(String, f64)>>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(self, key: &str, value: &str) -> Self {
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_set_members(self, key: &str, members: Vec<(String, f64)>) -> Self {
        self.sets.lock().unwrap().insert(key.to_string(), members);
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CustomRedisError> {
        self.record(format!("get:{key}"));
        Ok(self.strings.lock().unwrap().get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<(), CustomRedisError> {
        self.record(format!("set_ex:{key}"));
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CustomRedisError> {
        self.record(format!("del:{key}"));
        self.strings.lock().unwrap().remove(key);
        self.sets.lock().unwrap().remove(key);
        Ok(())
    }

    async fn prune_and_count(&self, key: &str, cutoff: f64) -> Result<u64, CustomRedisError> {
        self.record(format!("prune_and_count:{key}"));
        let mut sets = self.sets.lock().unwrap();
        let members = sets.entry(key.to_string()).or_default();
        members.retain(|(_, score)| *score >= cutoff);
        Ok(members.len() as u64)
    }

    async fn add_to_window(
        &self,
        key: &str,
        score: f64,
        member: &str,
        _ttl_secs: u64,
    ) -> Result<(), CustomRedisError> {
        self.record(format!("add_to_window:{key}"));
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push((member.to_string(), score));
        Ok(())
    }

    async fn slide_window(
        &self,
        key: &str,
        cutoff: f64,
        now: f64,
        member: &str,
        _ttl_secs: u64,
    ) -> Result<u64, CustomRedisError> {
        self.record(format!("slide_window:{key}"));
        let mut sets = self.sets.lock().unwrap();
        let members = sets.entry(key.to_string()).or_default();
        members.retain(|(_, score)| *score >= cutoff);
        let count_before = members.len() as u64;
        members.push((member.to_string(), now));
        Ok(count_before)
    }

    async fn oldest_score(&self, key: &str) -> Result<Option<f64>, CustomRedisError> {
        self.record(format!("oldest_score:{key}"));
        let sets = self.sets.lock().unwrap();
        Ok(sets
            .get(key)
            .and_then(|members| members.iter().map(|(_, s)| *s).reduce(f64::min)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_client_fails_open() {
        let client = NullRedisClient;
        assert_eq!(client.get("k").await.unwrap(), None);
        assert_eq!(client.prune_and_count("k", 0.0).await.unwrap(), 0);
        assert_eq!(client.slide_window("k", 0.0, 1.0, "1", 60).await.unwrap(), 0);
        assert_eq!(client.oldest_score("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_slide_window_counts_before_add() {
        let client = MockRedisClient::new();
        let n1 = client.slide_window("k", 0.0, 10.0, "10", 60).await.unwrap();
        assert_eq!(n1, 0);
        let n2 = client.slide_window("k", 0.0, 20.0, "20", 60).await.unwrap();
        assert_eq!(n2, 1);
        assert_eq!(client.prune_and_count("k", 0.0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mock_prune_and_count_evicts_old_entries() {
        let client = MockRedisClient::new()
            .with_set_members("k", vec![("1".into(), 1.0), ("100".into(), 100.0)]);
        assert_eq!(client.prune_and_count("k", 50.0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mock_get_set_roundtrip() {
        let client = MockRedisClient::new();
        assert_eq!(client.get("k").await.unwrap(), None);
        client.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), Some("v".to_string()));
        client.del("k").await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), None);
    }
}
