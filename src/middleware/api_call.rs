//! API call pipeline
//!
//! Wraps an async operation with, in order: rate limiting, cache lookup,
//! execution, logging, cache write and metric recording.
//!
//! The only await point is the operation itself. Nothing here cancels or
//! times out an operation; an abandoned call still runs to completion and
//! its outcome is still recorded.

use crate::middleware::cache::Cache;
use crate::middleware::logger::Logger;
use crate::middleware::monitor::MonitorService;
use crate::middleware::rate_limiter::{RateLimiter, GLOBAL_API_KEY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rejection raised when the global API bucket is empty
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Too many requests. Please try again later.")]
pub struct RateLimited;

/// Per-call pipeline options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiCallOptions {
    /// Serve from and store into the cache under this key
    pub cache_key: Option<String>,
    /// Cache TTL; the cache default applies when unset
    pub ttl: Option<Duration>,
    pub skip_rate_limit: bool,
}

impl ApiCallOptions {
    pub fn cached(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache_key: Some(key.into()),
            ttl: Some(ttl),
            skip_rate_limit: false,
        }
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }
}

/// Composes the middleware components around API operations
#[derive(Debug, Clone)]
pub struct ApiMiddleware {
    cache: Arc<Cache>,
    limiter: Arc<RateLimiter>,
    logger: Arc<Logger>,
    monitor: Arc<MonitorService>,
}

impl ApiMiddleware {
    pub fn new(
        cache: Arc<Cache>,
        limiter: Arc<RateLimiter>,
        logger: Arc<Logger>,
        monitor: Arc<MonitorService>,
    ) -> Self {
        Self {
            cache,
            limiter,
            logger,
            monitor,
        }
    }

    /// Run `operation` for `endpoint` through the pipeline
    ///
    /// Returns `E::from(RateLimited)` without invoking the operation when the
    /// global bucket is empty. Operation errors are returned unchanged and
    /// never cached.
    pub async fn call<T, E, F, Fut>(
        &self,
        endpoint: &str,
        operation: F,
        options: ApiCallOptions,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<RateLimited> + Display,
    {
        let start = Instant::now();

        if !options.skip_rate_limit && !self.limiter.check_one(GLOBAL_API_KEY) {
            self.logger.error_with(
                format!("API rate limit exceeded: {}", endpoint),
                json!({ "endpoint": endpoint }),
            );
            self.monitor.record_request(0.0, true);
            return Err(RateLimited.into());
        }

        if let Some(key) = options.cache_key.as_deref() {
            if let Some(cached) = self.cache.get_as::<T>(key) {
                let duration = elapsed_ms(start);
                self.logger.info_with(
                    format!("Cache hit for {}", endpoint),
                    json!({ "endpoint": endpoint, "cacheKey": key, "duration": duration }),
                );
                self.monitor.record_request(duration, false);
                return Ok(cached);
            }
        }

        match operation().await {
            Ok(result) => {
                let duration = elapsed_ms(start);
                if let Some(key) = options.cache_key.as_deref() {
                    let ttl = options.ttl.unwrap_or_else(|| self.cache.default_ttl());
                    self.cache.set(key, &result, ttl);
                }
                self.logger.info_with(
                    format!("API call succeeded: {}", endpoint),
                    json!({ "endpoint": endpoint, "duration": duration }),
                );
                self.monitor.record_request(duration, false);
                Ok(result)
            }
            Err(err) => {
                let duration = elapsed_ms(start);
                self.logger.error_with(
                    format!("API call failed: {}", endpoint),
                    json!({ "endpoint": endpoint, "duration": duration, "error": err.to_string() }),
                );
                self.monitor.record_request(duration, true);
                Err(err)
            }
        }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn monitor(&self) -> &Arc<MonitorService> {
        &self.monitor
    }
}

#[inline]
fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::logger::LogLevel;
    use crate::test_utils::{manual_services, manual_services_with_rate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq, Error)]
    enum ApiFailure {
        #[error("{0}")]
        Limited(RateLimited),
        #[error("server returned {0}")]
        Status(u16),
    }

    impl From<RateLimited> for ApiFailure {
        fn from(e: RateLimited) -> Self {
            ApiFailure::Limited(e)
        }
    }

    fn counting_op(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<anyhow::Result<Vec<String>>> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(vec!["Solar kites".to_string()]))
        }
    }

    #[tokio::test]
    async fn test_cached_call_skips_operation() {
        let (_, services) = manual_services();
        let api = services.api();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let ideas = api
                .call("GET /ideas", counting_op(&calls), ApiCallOptions::cached("ideas", Duration::from_secs(5)))
                .await
                .unwrap();
            assert_eq!(ideas, vec!["Solar kites".to_string()]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(services.cache.stats().hits, 1);
        assert_eq!(services.monitor.metrics().requests.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_entry_expires() {
        let (clock, services) = manual_services();
        let api = services.api();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = ApiCallOptions::cached("x", Duration::from_secs(5));

        api.call("GET /x", counting_op(&calls), options.clone()).await.unwrap();
        clock.advance(Duration::from_secs(3));
        api.call("GET /x", counting_op(&calls), options.clone()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(3));
        api.call("GET /x", counting_op(&calls), options).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_propagates_unchanged() {
        let (_, services) = manual_services();
        let api = services.api();

        let result: Result<Vec<String>, ApiFailure> = api
            .call(
                "POST /ideas",
                || async { Err(ApiFailure::Status(503)) },
                ApiCallOptions::cached("ideas:new", Duration::from_secs(30)),
            )
            .await;

        assert_eq!(result.unwrap_err(), ApiFailure::Status(503));
        assert_eq!(services.cache.stats().size, 0);

        let metrics = services.monitor.metrics();
        assert_eq!(metrics.errors.len(), 1);

        let entry = &services.logger.logs()[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "API call failed: POST /ideas");
        assert_eq!(entry.context.as_ref().unwrap()["error"], "server returned 503");
    }

    #[tokio::test]
    async fn test_rate_limited_call_never_runs_operation() {
        let (_, services) = manual_services_with_rate(1.0, 0.0);
        let api = services.api();
        let calls = Arc::new(AtomicUsize::new(0));

        api.call("GET /a", counting_op(&calls), ApiCallOptions::default())
            .await
            .unwrap();

        let err = api
            .call("GET /a", counting_op(&calls), ApiCallOptions::default())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<RateLimited>().is_some());
        assert_eq!(err.to_string(), "Too many requests. Please try again later.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let metrics = services.monitor.metrics();
        assert_eq!(metrics.errors.len(), 1);
        assert_eq!(metrics.latency.last().unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_skip_rate_limit() {
        let (_, services) = manual_services_with_rate(0.0, 0.0);
        let api = services.api();

        let value: Result<u32, ApiFailure> = api
            .call("GET /health", || async { Ok(7) }, ApiCallOptions::default().skip_rate_limit())
            .await;
        assert_eq!(value, Ok(7));

        let denied: Result<u32, ApiFailure> = api
            .call("GET /health", || async { Ok(7) }, ApiCallOptions::default())
            .await;
        assert_eq!(denied, Err(ApiFailure::Limited(RateLimited)));
    }

    #[tokio::test]
    async fn test_uncached_call_uses_default_ttl() {
        let (clock, services) = manual_services();
        let api = services.api();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = ApiCallOptions::default().with_cache_key("prompts");

        api.call("GET /prompts", counting_op(&calls), options.clone()).await.unwrap();
        clock.advance(Duration::from_secs(59));
        api.call("GET /prompts", counting_op(&calls), options.clone()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(1));
        api.call("GET /prompts", counting_op(&calls), options).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
