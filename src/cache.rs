//! Keyed JSON artifact cache with TTL, backed by `redis::Client`.
//!
//! `get`/`put`/`invalidate` never surface Redis errors to the caller: a
//! failure is logged and treated the same as a miss/no-op, since cache
//! availability is never required for the service to keep answering
//! requests (`spec.md` §4.2, §7).

use std::sync::Arc;

use crate::redis::Client as RedisClient;

#[derive(Clone)]
pub struct CacheStore {
    redis: Arc<dyn RedisClient + Send + Sync>,
}

impl CacheStore {
    pub fn new(redis: Arc<dyn RedisClient + Send + Sync>) -> Self {
        Self { redis }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.redis.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, key, "cache get failed, treating as miss");
                None
            }
        }
    }

    pub async fn put(&self, key: &str, value: &str, ttl_seconds: u64) {
        if let Err(e) = self.redis.set_ex(key, value, ttl_seconds).await {
            tracing::warn!(error = %e, key, "cache put failed, dropping write");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.redis.del(key).await {
            tracing::warn!(error = %e, key, "cache invalidate failed");
        }
    }
}

pub fn analysis_cache_key(team_id: i32, gameweek: Option<i32>) -> String {
    match gameweek {
        Some(gw) => format!("fpl_sage:analysis:{team_id}:{gw}"),
        None => format!("fpl_sage:analysis:{team_id}:current"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::MockRedisClient;

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let store = CacheStore::new(Arc::new(MockRedisClient::new()));
        store.put("k", "v", 300).await;
        assert_eq!(store.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let store = CacheStore::new(Arc::new(MockRedisClient::new()));
        assert_eq!(store.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_removes_value() {
        let store = CacheStore::new(Arc::new(MockRedisClient::new()));
        store.put("k", "v", 300).await;
        store.invalidate("k").await;
        assert_eq!(store.get("k").await, None);
    }

    #[test]
    fn test_analysis_cache_key_with_gameweek() {
        assert_eq!(analysis_cache_key(711511, Some(22)), "fpl_sage:analysis:711511:22");
    }

    #[test]
    fn test_analysis_cache_key_without_gameweek() {
        assert_eq!(analysis_cache_key(711511, None), "fpl_sage:analysis:711511:current");
    }
}
