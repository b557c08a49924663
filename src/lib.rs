//! # minits
//!
//! Write-path coordinator for a partitioned, replicated time-series cluster:
//! - Classifies every non-query plan by where it must run
//! - Splits partitioned writes by storage group and time partition
//! - Forwards each piece to its data group, locally or over HTTP
//! - Folds group replies into one status with exact per-row attribution
//! - Propagates membership changes to every data group with bounded retries
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            client plan (POST /plans)
//!                     │
//!            ┌────────▼─────────┐
//!            │   Coordinator    │  classify → split → forward → aggregate
//!            └──┬─────────────┬─┘
//!     local     │             │  POST /internal/groups/:raft_id/execute
//!   ┌───────────▼──┐   ┌──────▼───────┐   ┌──────────────┐
//!   │ Data group 1 │   │ Data group 2 │   │ Data group 3 │
//!   │  (replicas)  │   │  (replicas)  │   │  (replicas)  │
//!   └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! minits-coord serve --id 1 --bind 0.0.0.0:6667 --config ./minits.toml
//!
//! curl -X POST localhost:6667/plans -H 'content-type: application/json' \
//!   -d '{"type":"insert_row","device":"root.sg1.d1","time":1,"measurements":["s1"],"values":[1]}'
//! ```

pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod plan;

// Re-export commonly used types
pub use common::{Config, Error, Result, Status, StatusCode};
pub use coordinator::{Coordinator, CoordinatorServer};
pub use plan::Plan;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
