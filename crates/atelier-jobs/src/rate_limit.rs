//! Per-user submission rate limit.
//!
//! A fixed-window counter shared through Redis: one key per user and window,
//! incremented with `INCR` and expired with `EXPIRE` in the same atomic
//! pipeline. Every process sees the same count. When Redis is disabled the
//! limiter lets everything through.

use atelier_config::RateLimitConfig;
use atelier_core::{Interface, UserId};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{redis, Pool};
use serde::Serialize;
use shaku::Component;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure to read or bump a window counter.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Failed to get Redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Failed to increment '{key}': {source}")]
    Counter {
        key: String,
        #[source]
        source: redis::RedisError,
    },
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Seconds until the window resets.
    pub reset_after_secs: u64,
}

impl RateDecision {
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: u64::MAX,
            reset_after_secs: 0,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Interface + Send + Sync {
    /// Counts one request for `user_id` and decides whether it may proceed.
    async fn check(&self, user_id: UserId) -> RateDecision;

    fn is_enabled(&self) -> bool;
}

/// Redis fixed-window limiter.
#[derive(Component)]
#[shaku(interface = RateLimiter)]
pub struct RedisRateLimiter {
    pool: Option<Arc<Pool>>,
    #[shaku(default = 10)]
    max_requests: u64,
    #[shaku(default = 60)]
    window_secs: u64,
    key_prefix: String,
}

impl RedisRateLimiter {
    #[must_use]
    pub fn new(pool: Arc<Pool>, config: &RateLimitConfig, key_prefix: impl Into<String>) -> Self {
        Self {
            pool: config.enabled.then_some(pool),
            max_requests: config.max_requests,
            window_secs: config.window_secs.max(1),
            key_prefix: key_prefix.into(),
        }
    }

    /// A limiter that allows every request.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            pool: None,
            max_requests: 0,
            window_secs: 1,
            key_prefix: String::new(),
        }
    }

    fn window_secs(&self) -> u64 {
        self.window_secs.max(1)
    }

    fn window_key(&self, user_id: UserId, now_secs: u64) -> String {
        let window = now_secs / self.window_secs();
        format!("{}:ratelimit:{}:{}", self.key_prefix, user_id, window)
    }

    fn decide(&self, count: u64, now_secs: u64) -> RateDecision {
        let window = self.window_secs();
        RateDecision {
            allowed: count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_after_secs: window - now_secs % window,
        }
    }

    async fn increment(&self, pool: &Pool, key: &str) -> Result<u64, RateLimitError> {
        let mut conn = pool.get().await?;

        let (count, _): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, i64::try_from(self.window_secs()).unwrap_or(i64::MAX))
            .query_async(&mut conn)
            .await
            .map_err(|source| RateLimitError::Counter {
                key: key.to_string(),
                source,
            })?;

        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, user_id: UserId) -> RateDecision {
        let Some(pool) = &self.pool else {
            return RateDecision::unlimited();
        };

        let now_secs = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let key = self.window_key(user_id, now_secs);

        match self.increment(pool, &key).await {
            Ok(count) => {
                let decision = self.decide(count, now_secs);
                debug!(user_id = %user_id, count, allowed = decision.allowed, "Rate limit check");
                decision
            }
            Err(e) => {
                // Redis outages must not block submissions.
                warn!(user_id = %user_id, error = %e, "Rate limiter unavailable, allowing request");
                RateDecision::unlimited()
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u64, window_secs: u64) -> RedisRateLimiter {
        RedisRateLimiter {
            pool: None,
            max_requests,
            window_secs,
            key_prefix: "atelier".into(),
        }
    }

    #[tokio::test]
    async fn test_disabled_allows_everything() {
        let limiter = RedisRateLimiter::disabled();
        assert!(!limiter.is_enabled());
        for _ in 0..100 {
            assert!(limiter.check(UserId::new()).await.allowed);
        }
    }

    #[test]
    fn test_keys_are_per_user_and_window() {
        let limiter = limiter(10, 60);
        let user = UserId::new();

        assert_eq!(limiter.window_key(user, 120), limiter.window_key(user, 179));
        assert_ne!(limiter.window_key(user, 179), limiter.window_key(user, 180));
        assert_ne!(limiter.window_key(user, 120), limiter.window_key(UserId::new(), 120));
        assert!(limiter.window_key(user, 0).starts_with("atelier:ratelimit:"));
    }

    #[test]
    fn test_decision_at_the_limit() {
        let limiter = limiter(3, 60);

        let third = limiter.decide(3, 130);
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_after_secs, 50);

        let fourth = limiter.decide(4, 130);
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_open() {
        let config = RateLimitConfig {
            enabled: true,
            max_requests: 1,
            ..RateLimitConfig::default()
        };
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:1")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let limiter = RedisRateLimiter::new(Arc::new(pool.clone()), &config, "atelier");
        assert!(limiter.is_enabled());

        let err = limiter.increment(&pool, "atelier:ratelimit:x:0").await.unwrap_err();
        assert!(matches!(err, RateLimitError::Pool(_)));
        assert!(err.to_string().starts_with("Failed to get Redis connection"));

        for _ in 0..3 {
            assert!(limiter.check(UserId::new()).await.allowed);
        }
    }

    #[test]
    fn test_disabled_config_drops_pool() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:6379")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let limiter = RedisRateLimiter::new(Arc::new(pool), &config, "atelier");
        assert!(!limiter.is_enabled());
    }
}
