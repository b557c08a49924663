//! Collaborators the coordinator depends on
//!
//! The coordinator owns no cluster state. Routing, group membership, schema
//! and local execution are reached through these traits so the standalone
//! runtime and tests can plug in their own implementations.

use super::partition::{Node, PartitionGroup, PartitionTable, PlanGroupMap, RaftNode};
use crate::common::{Result, Status};
use crate::plan::{MembershipChangeLog, Plan};
use async_trait::async_trait;
use std::sync::Arc;

/// Maps a plan onto the data groups that own its rows.
pub trait PlanRouter: Send + Sync {
    /// Split `plan` into sub-plans, one per owning group.
    ///
    /// Fails with [`crate::Error::StorageGroupNotSet`] when local metadata is
    /// stale, or [`crate::Error::UnsupportedPlan`] when the plan cannot be
    /// partitioned at all.
    fn split(&self, plan: &Plan) -> Result<PlanGroupMap>;

    /// One sub-record per data group affected by a membership change.
    fn split_membership_change(&self, log: &MembershipChangeLog) -> Result<PlanGroupMap>;
}

/// This node's view of the meta group and of the data groups it serves.
#[async_trait]
pub trait MetaGroupMember: Send + Sync {
    fn this_node(&self) -> &Node;

    /// `None` until the partition table has been received
    fn partition_table(&self) -> Option<Arc<PartitionTable>>;

    fn all_data_groups(&self) -> Vec<PartitionGroup> {
        self.partition_table()
            .map(|table| table.global_groups().to_vec())
            .unwrap_or_default()
    }

    /// Current meta leader, if one is known
    fn leader(&self) -> Option<Node>;

    /// Block until a meta leader is known.
    async fn wait_leader(&self) -> Result<Node>;

    /// Catch up with the meta leader. With `force_consistency_check` a
    /// replica that is too far behind reports
    /// [`crate::Error::ConsistencyFailure`].
    async fn sync_with_leader(&self, force_consistency_check: bool) -> Result<()>;

    async fn forward_to_leader(&self, plan: &Plan, leader: &Node) -> Status;

    /// Apply a global metadata plan through the meta group.
    async fn process_non_partitioned_meta_plan(&self, plan: &Plan) -> Status;

    /// Execute `plan` in the local replica of the group headed by `header`.
    async fn execute_in_local_group(&self, header: &RaftNode, plan: &Plan) -> Status;
}

#[async_trait]
pub trait SchemaProcessor: Send + Sync {
    /// Replace wildcard paths with the concrete series they match.
    ///
    /// Fails with [`crate::Error::PathNotExist`] when nothing matches.
    async fn convert_to_full_paths(&self, plan: &Plan) -> Result<Plan>;

    /// Create the storage groups and series `plan` needs. Already existing
    /// schema is not an error.
    async fn create_schema(&self, plan: &Plan) -> Result<()>;

    async fn belonged_storage_group(&self, path: &str) -> Result<String>;
}

/// Executes node-local plans.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    /// `Err(Error::Query { .. })` carries a client-facing code; any other
    /// error is an internal fault.
    async fn process_non_query(&self, plan: &Plan) -> Result<bool>;
}
