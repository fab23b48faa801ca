//! Request metrics and system health monitoring
//!
//! Keeps three rolling series (requests, errors, latency) and a simulated
//! CPU/memory reading refreshed by a background sampler. Subscribers are
//! notified after every recorded request and every health sample.

use crate::core::{format_rfc3339, Listeners, RingBuffer, SharedClock, Subscription};
use crate::infrastructure::config::MonitorConfig;
use crate::middleware::logger::Logger;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Single point of a metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// RFC 3339 timestamp
    pub time: String,
    pub value: f64,
}

/// CPU and memory usage in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemHealth {
    pub cpu: f64,
    pub memory: f64,
}

/// Snapshot returned by [`MonitorService::metrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests: Vec<MetricPoint>,
    pub errors: Vec<MetricPoint>,
    pub latency: Vec<MetricPoint>,
    pub system: SystemHealth,
}

/// Source of system health readings
pub trait HealthSampler: Send + Sync {
    fn sample(&self) -> SystemHealth;
}

/// Random readings: cpu 20-50% with a 10% chance of a +40 spike,
/// memory 40-60%
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedHealth;

impl HealthSampler for SimulatedHealth {
    fn sample(&self) -> SystemHealth {
        let mut rng = rand::thread_rng();
        let spike = if rng.gen_bool(0.1) { 40.0 } else { 0.0 };
        SystemHealth {
            cpu: rng.gen_range(20.0..50.0) + spike,
            memory: rng.gen_range(40.0..60.0),
        }
    }
}

struct Series {
    requests: RingBuffer<MetricPoint>,
    errors: RingBuffer<MetricPoint>,
    latency: RingBuffer<MetricPoint>,
}

pub struct MonitorService {
    clock: SharedClock,
    logger: Arc<Logger>,
    config: MonitorConfig,
    sampler: Arc<dyn HealthSampler>,
    series: Mutex<Series>,
    system: Mutex<SystemHealth>,
    listeners: Listeners<()>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorService {
    pub fn new(clock: SharedClock, logger: Arc<Logger>) -> Self {
        Self::with_sampler(clock, logger, MonitorConfig::default(), Arc::new(SimulatedHealth))
    }

    pub fn with_sampler(
        clock: SharedClock,
        logger: Arc<Logger>,
        config: MonitorConfig,
        sampler: Arc<dyn HealthSampler>,
    ) -> Self {
        let points = config.max_points;
        let initial = sampler.sample();
        Self {
            clock,
            logger,
            config,
            sampler,
            series: Mutex::new(Series {
                requests: RingBuffer::new(points),
                errors: RingBuffer::new(points),
                latency: RingBuffer::new(points),
            }),
            system: Mutex::new(initial),
            listeners: Listeners::new(),
            ticker: Mutex::new(None),
        }
    }

    /// Record one completed (or rejected) request
    pub fn record_request(&self, latency_ms: f64, is_error: bool) {
        let time = format_rfc3339(self.clock.now_ms());
        {
            let mut series = self.series.lock();
            series.requests.push(MetricPoint {
                time: time.clone(),
                value: 1.0,
            });
            series.latency.push(MetricPoint {
                time: time.clone(),
                value: latency_ms,
            });
            if is_error {
                series.errors.push(MetricPoint { time, value: 1.0 });
            }
        }

        self.check_alerts(latency_ms);
        self.listeners.notify(&());
    }

    fn check_alerts(&self, latency_ms: f64) {
        if latency_ms > self.config.latency_alert_ms {
            self.logger.error_with(
                format!("High latency detected: {:.0}ms", latency_ms),
                json!({ "latency": latency_ms, "threshold": self.config.latency_alert_ms }),
            );
        }

        let cpu = self.system.lock().cpu;
        if cpu > self.config.cpu_alert_percent {
            self.logger.warn_with(
                format!("High CPU usage: {:.1}%", cpu),
                json!({ "cpu": cpu, "threshold": self.config.cpu_alert_percent }),
            );
        }
    }

    /// Take one health reading and notify subscribers
    pub fn sample_health(&self) {
        let reading = self.sampler.sample();
        *self.system.lock() = reading;
        self.listeners.notify(&());
    }

    pub fn system(&self) -> SystemHealth {
        *self.system.lock()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let series = self.series.lock();
        MetricsSnapshot {
            requests: series.requests.to_vec(),
            errors: series.errors.to_vec(),
            latency: series.latency.to_vec(),
            system: self.system(),
        }
    }

    /// Register a listener invoked after every metric change or health sample
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.subscribe(move |_| listener())
    }

    /// Spawn the periodic health sampler
    ///
    /// Must be called from within a Tokio runtime. Calling it while the
    /// sampler is running is a no-op. The task holds only a weak reference,
    /// so it also ends once the service is dropped.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = self.config.sample_interval();
        let weak: Weak<Self> = Arc::downgrade(self);
        *ticker = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(service) => service.sample_health(),
                    None => break,
                }
            }
        }));

        crate::log_pipeline!(tracing::Level::INFO, "Health sampler started ({:?} interval)", period);
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the health sampler
    pub fn shutdown(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
            crate::log_pipeline!(tracing::Level::INFO, "Health sampler stopped");
        }
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for MonitorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorService")
            .field("system", &self.system())
            .field("running", &self.is_running())
            .finish()
    }
}
