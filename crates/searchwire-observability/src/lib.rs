//! # searchwire-observability
//!
//! OpenTelemetry metrics and structured logging for searchwire.
//!
//! ## Built-in metrics
//! - `searchwire.attempts`: counter, tagged with kind + outcome
//! - `searchwire.attempt_latency_ms`: histogram, tagged with kind
//! - `searchwire.calls`: counter, tagged with outcome + error kind
//! - `searchwire.call_retries`: histogram
//!
//! ## Structured logging
//! JSON or human-readable logs through `tracing-subscriber`, with levels
//! configurable per component.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::TransportMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
