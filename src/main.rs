//! IdeaHub middleware daemon
//!
//! # Architecture
//! - **core**: clock, ring buffer, listener lists
//! - **middleware**: logger, cache, rate limiter, monitor, api_call pipeline
//! - **infrastructure**: config, logging, throttle, diagnostics API

use anyhow::Context;
use ideahub_middleware::core::SystemClock;
use ideahub_middleware::infrastructure::{logging, start_server, ThrottleGuard};
use ideahub_middleware::{Config, Services};
use std::path::Path;
use std::sync::Arc;

/// Main application state
pub struct MiddlewareApp {
    config: Config,
    services: Services,
}

impl MiddlewareApp {
    pub fn new(config: Config) -> Self {
        let services = Services::from_config(&config, Arc::new(SystemClock));
        Self { config, services }
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Starting IdeaHub middleware...");

        self.services.monitor.start();
        self.services.logger.info("Middleware services started");

        let throttle = Arc::new(ThrottleGuard::from_config(
            self.services.clock.clone(),
            &self.config.throttle,
        ));

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        };

        let served = start_server(self.services.clone(), throttle, &self.config.api, shutdown).await;

        self.services.monitor.shutdown();
        tracing::info!("IdeaHub middleware stopped");

        served.context("diagnostics server failed")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guards = logging::init_logging(Path::new("logs")).context("failed to initialize logging")?;

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Falling back to default configuration: {}", e);
            Config::default()
        }
    };

    let app = MiddlewareApp::new(config);
    app.run().await
}
