//! Per-key token bucket rate limiter
//!
//! Buckets are created full on first sight of a key, refilled in proportion
//! to elapsed wall-clock time on every check, and never removed except by
//! [`RateLimiter::reset`].

use crate::core::SharedClock;
use crate::infrastructure::config::RateLimitConfig;
use crate::middleware::logger::Logger;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Key used by the API pipeline for all outgoing calls
pub const GLOBAL_API_KEY: &str = "global_api";

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    /// Epoch millis
    last_refill: u64,
}

pub struct RateLimiter {
    clock: SharedClock,
    logger: Arc<Logger>,
    capacity: f64,
    /// Tokens per second
    refill_rate: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Limiter with 100 tokens refilled at 100 per minute
    pub fn new(clock: SharedClock, logger: Arc<Logger>) -> Self {
        Self::from_config(clock, logger, &RateLimitConfig::default())
    }

    pub fn from_config(clock: SharedClock, logger: Arc<Logger>, config: &RateLimitConfig) -> Self {
        Self::with_rate(clock, logger, config.capacity, config.refill_per_sec())
    }

    pub fn with_rate(clock: SharedClock, logger: Arc<Logger>, capacity: f64, refill_rate: f64) -> Self {
        Self {
            clock,
            logger,
            capacity: capacity.max(0.0),
            refill_rate: refill_rate.max(0.0),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens restored per second
    #[inline]
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Refill the bucket for `key`, then try to take `cost` tokens
    ///
    /// Returns false (and logs a warning) when the bucket holds fewer than
    /// `cost` tokens. The refill timestamp advances either way.
    ///
    /// A negative or non-finite cost is rejected without touching the bucket.
    pub fn check(&self, key: &str, cost: f64) -> bool {
        if !cost.is_finite() || cost < 0.0 {
            self.logger.warn_with(
                format!("Invalid rate limit cost for key: {}", key),
                json!({ "key": key, "cost": cost.to_string() }),
            );
            return false;
        }

        let now = self.clock.now_ms();
        let (allowed, remaining) = {
            let mut buckets = self.buckets.lock();
            let bucket = buckets.entry(key.to_string()).or_insert(TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

            let elapsed_secs = now.saturating_sub(bucket.last_refill) as f64 / 1000.0;
            bucket.tokens = (bucket.tokens + elapsed_secs * self.refill_rate).min(self.capacity);
            bucket.last_refill = now;

            if bucket.tokens >= cost {
                bucket.tokens -= cost;
                (true, bucket.tokens)
            } else {
                (false, bucket.tokens)
            }
        };

        if !allowed {
            self.logger.warn_with(
                format!("Rate limit exceeded for key: {}", key),
                json!({ "key": key, "cost": cost, "tokens": remaining }),
            );
        }
        allowed
    }

    /// `check` with a cost of one token
    #[inline]
    pub fn check_one(&self, key: &str) -> bool {
        self.check(key, 1.0)
    }

    /// Current token count for `key` without refilling
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets.lock().get(key).map(|b| b.tokens)
    }

    /// Forget every bucket
    pub fn reset(&self) {
        self.buckets.lock().clear();
        self.logger.info("Rate limiter reset");
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("buckets", &self.buckets.lock().len())
            .finish()
    }
}
