//! Write-path coordinator
//!
//! The coordinator is responsible for:
//! - Classifying non-query plans by where they must run
//! - Splitting partitioned plans and forwarding the pieces to their groups
//! - Folding group replies into one client status
//! - Propagating membership changes to every data group

pub mod aggregator;
pub mod classifier;
mod engine;
mod forward;
pub mod http;
mod membership;
pub mod server;

pub use classifier::{classify, PlanScope};
pub use engine::{ClusterContext, Coordinator};
pub use server::{standalone_context, CoordinatorServer};
