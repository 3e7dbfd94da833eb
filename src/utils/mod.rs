//! # Utility Modules
//!
//! Supporting utilities shared by the transport workers.
//!
//! ## Components
//! - **Ring Buffer**: SPSC byte hand-off between the receive loop and a pump
//! - **Logging**: tracing subscriber setup
//! - **Metrics**: thread-safe observability counters
//! - **Timeout**: default intervals and an async timeout wrapper

pub mod logging;
pub mod metrics;
pub mod ring_buffer;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
pub use ring_buffer::RingBuffer;
