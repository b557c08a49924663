//! Common utilities and types shared across minits

pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod status;
pub mod tracing_middleware;
pub mod utils;

pub use config::{Config, CoordinatorConfig, GroupConfig, NodeConfig, ServerConfig};
pub use error::{Error, Result};
pub use metrics::{MetricsRegistry, Operation};
pub use status::{EndPoint, Status, StatusCode};
pub use utils::{parse_duration, timestamp_now};
