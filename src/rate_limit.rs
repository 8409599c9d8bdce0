//! Sliding-window per-client request quota (`spec.md` §4.3).
//!
//! Backed by a Redis sorted set keyed by client IP. When Redis is absent the
//! limiter always allows and emits no headers — availability over strict
//! enforcement when the coordination state is unreachable.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::redis::Client as RedisClient;

pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_epoch: u64,
    pub retry_after: u64,
    /// None when Redis is absent: no headers should be emitted at all.
    pub headers_active: bool,
}

#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<dyn RedisClient + Send + Sync>,
    capacity: u64,
    window_seconds: u64,
    redis_enabled: bool,
}

impl RateLimiter {
    pub fn new(
        redis: Arc<dyn RedisClient + Send + Sync>,
        capacity: u64,
        window_seconds: u64,
        redis_enabled: bool,
    ) -> Self {
        Self {
            redis,
            capacity,
            window_seconds,
            redis_enabled,
        }
    }

    pub async fn check(&self, client_ip: &str) -> RateLimitDecision {
        if !self.redis_enabled {
            return RateLimitDecision {
                allowed: true,
                limit: self.capacity,
                remaining: self.capacity,
                reset_epoch: 0,
                retry_after: 0,
                headers_active: false,
            };
        }

        let key = rate_key(client_ip);
        let now = now_secs_f64();
        let cutoff = now - self.window_seconds as f64;
        let member = format!("{now:.6}");

        let count_before = match self
            .redis
            .slide_window(&key, cutoff, now, &member, self.window_seconds)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, client_ip, "rate limiter redis call failed, failing open");
                return RateLimitDecision {
                    allowed: true,
                    limit: self.capacity,
                    remaining: self.capacity,
                    reset_epoch: 0,
                    retry_after: 0,
                    headers_active: false,
                };
            }
        };

        let allowed = count_before < self.capacity;
        let remaining = self.capacity.saturating_sub(count_before + 1);

        let oldest = self.redis.oldest_score(&key).await.ok().flatten();
        let reset_epoch = oldest
            .map(|score| (score + self.window_seconds as f64).ceil() as u64)
            .unwrap_or(now as u64 + self.window_seconds);
        let retry_after = reset_epoch.saturating_sub(now as u64).max(1);

        RateLimitDecision {
            allowed,
            limit: self.capacity,
            remaining: if allowed { remaining } else { 0 },
            reset_epoch,
            retry_after,
            headers_active: true,
        }
    }
}

fn rate_key(client_ip: &str) -> String {
    format!("fpl_sage:ratelimit:{client_ip}")
}

fn now_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::{MockRedisClient, NullRedisClient};

    #[tokio::test]
    async fn test_allows_when_under_capacity() {
        let limiter = RateLimiter::new(Arc::new(MockRedisClient::new()), 2, 3600, true);
        let d1 = limiter.check("1.2.3.4").await;
        assert!(d1.allowed);
        let d2 = limiter.check("1.2.3.4").await;
        assert!(d2.allowed);
    }

    #[tokio::test]
    async fn test_rejects_beyond_capacity() {
        let limiter = RateLimiter::new(Arc::new(MockRedisClient::new()), 2, 3600, true);
        limiter.check("1.2.3.4").await;
        limiter.check("1.2.3.4").await;
        let d3 = limiter.check("1.2.3.4").await;
        assert!(!d3.allowed);
        assert_eq!(d3.remaining, 0);
        assert!(d3.retry_after >= 1);
    }

    #[tokio::test]
    async fn test_distinct_ips_tracked_separately() {
        let limiter = RateLimiter::new(Arc::new(MockRedisClient::new()), 1, 3600, true);
        assert!(limiter.check("1.1.1.1").await.allowed);
        assert!(limiter.check("2.2.2.2").await.allowed);
    }

    #[tokio::test]
    async fn test_disabled_without_redis_always_allows() {
        let limiter = RateLimiter::new(Arc::new(NullRedisClient), 1, 3600, false);
        assert!(limiter.check("1.2.3.4").await.allowed);
        let d = limiter.check("1.2.3.4").await;
        assert!(!d.headers_active);
    }
}
