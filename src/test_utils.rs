//! Test utilities for building the component graph on a manual clock

use crate::core::ManualClock;
use crate::infrastructure::config::Config;
use crate::middleware::{HealthSampler, Services, SystemHealth};
use std::sync::Arc;

/// Fixed start time: 2024-01-01T00:00:00Z
pub const TEST_EPOCH_MS: u64 = 1_704_067_200_000;

/// Health sampler returning a calm, constant reading
pub struct QuietHealth;

impl HealthSampler for QuietHealth {
    fn sample(&self) -> SystemHealth {
        SystemHealth {
            cpu: 25.0,
            memory: 45.0,
        }
    }
}

/// Services with default config on a manual clock
pub fn manual_services() -> (Arc<ManualClock>, Services) {
    services_for(&Config::default())
}

/// Services whose client bucket holds `capacity` tokens refilled at
/// `refill_per_sec`
pub fn manual_services_with_rate(capacity: f64, refill_per_sec: f64) -> (Arc<ManualClock>, Services) {
    let mut config = Config::default();
    config.rate_limit.capacity = capacity;
    config.rate_limit.refill_amount = refill_per_sec;
    config.rate_limit.refill_period_secs = 1.0;
    services_for(&config)
}

pub fn services_for(config: &Config) -> (Arc<ManualClock>, Services) {
    let clock = Arc::new(ManualClock::new(TEST_EPOCH_MS));
    let services = Services::with_sampler(config, clock.clone(), Arc::new(QuietHealth));
    (clock, services)
}
