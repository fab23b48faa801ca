//! Client request middleware
//!
//! - Logger: bounded in-app log buffer with subscribers
//! - Cache: JSON TTL cache with hit/miss statistics
//! - RateLimiter: per-key token buckets
//! - MonitorService: request metrics and health sampling
//! - ApiMiddleware: the pipeline composing all of the above

pub mod api_call;
pub mod cache;
pub mod logger;
pub mod monitor;
pub mod rate_limiter;

pub use api_call::{ApiCallOptions, ApiMiddleware, RateLimited};
pub use cache::{Cache, CacheStats};
pub use logger::{LogEntry, LogLevel, Logger};
pub use monitor::{HealthSampler, MetricPoint, MetricsSnapshot, MonitorService, SimulatedHealth, SystemHealth};
pub use rate_limiter::RateLimiter;

use crate::core::SharedClock;
use crate::infrastructure::config::Config;
use std::sync::Arc;

/// Component graph shared by the pipeline and the diagnostics server
///
/// Built once at startup and passed explicitly to whatever needs it.
#[derive(Clone)]
pub struct Services {
    pub clock: SharedClock,
    pub logger: Arc<Logger>,
    pub cache: Arc<Cache>,
    pub limiter: Arc<RateLimiter>,
    pub monitor: Arc<MonitorService>,
}

impl Services {
    pub fn from_config(config: &Config, clock: SharedClock) -> Self {
        Self::with_sampler(config, clock, Arc::new(SimulatedHealth))
    }

    pub fn with_sampler(config: &Config, clock: SharedClock, sampler: Arc<dyn HealthSampler>) -> Self {
        let logger = Arc::new(Logger::with_capacity(clock.clone(), config.logger.max_entries));
        let cache = Arc::new(Cache::with_default_ttl(
            clock.clone(),
            logger.clone(),
            config.cache.default_ttl(),
        ));
        let limiter = Arc::new(RateLimiter::from_config(
            clock.clone(),
            logger.clone(),
            &config.rate_limit,
        ));
        let monitor = Arc::new(MonitorService::with_sampler(
            clock.clone(),
            logger.clone(),
            config.monitor.clone(),
            sampler,
        ));

        Self {
            clock,
            logger,
            cache,
            limiter,
            monitor,
        }
    }

    /// Pipeline over these components
    pub fn api(&self) -> ApiMiddleware {
        ApiMiddleware::new(
            self.cache.clone(),
            self.limiter.clone(),
            self.logger.clone(),
            self.monitor.clone(),
        )
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("logger", &self.logger)
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .field("monitor", &self.monitor)
            .finish()
    }
}
