//! In-memory stores owned by the state actor
//!
//! - [`MetricStore`]: bounded per-target sample history
//! - [`ProcessStore`]: latest process batch per agent target
//!
//! Both are plain synchronous structures. They are never shared directly;
//! the state actor is their only writer.

pub mod metrics;
pub mod processes;

pub use metrics::{FleetUsage, MetricStore, SAMPLE_RETENTION};
pub use processes::ProcessStore;
