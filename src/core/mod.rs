//! Core building blocks shared by the middleware components
//!
//! - Clock: epoch-millisecond time source (system or manual)
//! - RingBuffer: bounded FIFO sequence
//! - Listeners: publish/subscribe list with drop-to-unsubscribe handles

pub mod clock;
pub mod observer;
pub mod ring_buffer;

pub use clock::{duration_ms, format_rfc3339, Clock, ManualClock, SharedClock, SystemClock};
pub use observer::{Listeners, Subscription};
pub use ring_buffer::RingBuffer;
