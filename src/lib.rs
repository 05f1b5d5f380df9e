pub mod actors;
pub mod alerts;
pub mod broadcast;
pub mod checkers;
pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod monitors;
pub mod registry;
pub mod storage;
pub mod store;
pub mod util;

pub use error::{MonitorError, MonitorResult};
pub use monitor::{Monitor, MonitorBuilder};
