//! Infrastructure - process edges
//!
//! This module contains code that sits around the middleware:
//! - Configuration management
//! - Logging initialisation
//! - Diagnostics API server and its request throttle

pub mod api;
pub mod config;
pub mod logging;
pub mod throttle;

pub use api::{router, start_server};
pub use throttle::ThrottleGuard;
