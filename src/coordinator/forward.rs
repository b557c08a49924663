//! Dispatch of routed plans to their partition groups

use super::aggregator::{combine_broadcast, combine_group_statuses, BatchAggregator};
use super::engine::Coordinator;
use crate::cluster::{Node, PartitionGroup, PlanGroupMap, RaftNode};
use crate::common::{Error, Operation, Result, Status, StatusCode};
use crate::plan::{Plan, RowBatch};
use futures_util::future::join_all;
use std::time::Instant;
use tracing::{debug, error, warn};

fn is_timeout(e: &Error) -> bool {
    match e {
        Error::Timeout(_) => true,
        Error::HttpClient(e) => e.is_timeout(),
        _ => false,
    }
}

impl Coordinator {
    /// Forward every sub-plan of `map` and fold the replies into one status
    /// for `plan`.
    pub(super) async fn forward_plan_map(&self, map: &PlanGroupMap, plan: &Plan) -> Status {
        let status = if let Some(parent) = plan.as_row_batch() {
            self.forward_batch(map, parent).await
        } else if let [(sub_plan, group)] = map.iter().collect::<Vec<_>>().as_slice() {
            self.forward_to_single_group(sub_plan, group).await
        } else {
            combine_group_statuses(&self.dispatch_all(map).await)
        };

        // A success that names another endpoint tells the client where to
        // send the next request for the same data.
        let status = if status.is_success() && status.redirect.is_some() {
            status.with_code(StatusCode::NeedRedirection)
        } else {
            status
        };
        debug!(plan = %plan, status = %status, "Executed partitioned plan");
        status
    }

    /// Dispatch every entry concurrently; replies keep the map's order.
    async fn dispatch_all(&self, map: &PlanGroupMap) -> Vec<(RaftNode, Status)> {
        join_all(map.iter().map(|(sub_plan, group)| async move {
            (group.header(), self.forward_to_single_group(sub_plan, group).await)
        }))
        .await
    }

    async fn forward_batch(&self, map: &PlanGroupMap, parent: &dyn RowBatch) -> Status {
        let results = self.dispatch_all(map).await;
        let mut aggregator = BatchAggregator::new(parent);
        for ((sub_plan, _), (header, status)) in map.iter().zip(&results) {
            match sub_plan.as_row_batch() {
                Some(sub) => aggregator.absorb(sub, header, status),
                None => error!(plan = %sub_plan, "Batch was split into a non-batch sub-plan"),
            }
        }
        aggregator.conclude()
    }

    /// Apply `plan` on every group, tolerating the errors that only mean a
    /// group had nothing to do.
    pub(super) async fn broadcast(&self, plan: &Plan, groups: &[PartitionGroup]) -> Status {
        let results = join_all(groups.iter().map(|group| async move {
            (group.header(), self.forward_to_single_group(plan, group).await)
        }))
        .await;
        combine_broadcast(plan, &results)
    }

    /// Execute `plan` in `group`: directly when this node is a member,
    /// otherwise through one of the group's nodes.
    pub async fn forward_to_single_group(&self, plan: &Plan, group: &PartitionGroup) -> Status {
        let start = Instant::now();
        if group.contains(self.ctx.member.this_node()) {
            let status = self
                .ctx
                .member
                .execute_in_local_group(&group.header(), plan)
                .await;
            debug!(plan = %plan, group = %group, status = %status, "Executed in local group");
            self.metrics
                .record(Operation::ExecuteInLocalGroup, start.elapsed(), status.is_ok_or_redirect());
            status
        } else {
            let status = self.forward_to_group(plan, group).await;
            debug!(plan = %plan, group = %group, status = %status, "Forwarded to remote group");
            self.metrics
                .record(Operation::ExecuteInRemoteGroup, start.elapsed(), status.is_ok_or_redirect());
            status
        }
    }

    /// Try the group's members in order until one answers in time. The reply
    /// is stamped with the endpoint of the member that produced it unless it
    /// already names one.
    async fn forward_to_group(&self, plan: &Plan, group: &PartitionGroup) -> Status {
        let header = group.header();
        for node in &group.nodes {
            debug!(plan = %plan, node = %node, "Forwarding plan");
            let status = match self.forward_data_plan(plan, node, &header).await {
                Ok(status) => status,
                Err(e) if is_timeout(&e) => Status::timeout(),
                Err(e) => {
                    warn!(plan = %plan, node = %node, retryable = e.is_retryable(), "Cannot forward plan: {}", e);
                    Status::new(StatusCode::ExecuteStatementError, e.to_string())
                }
            };
            if !status.is_timeout() {
                return status.with_redirect_if_absent(node.client_endpoint());
            }
            warn!(plan = %plan, node = %node, "Forwarding timed out");
        }
        warn!(plan = %plan, group = %group, "Every member of the group timed out");
        Status::timeout()
    }

    async fn forward_data_plan(&self, plan: &Plan, node: &Node, header: &RaftNode) -> Result<Status> {
        let timeout = self.config.write_operation_timeout();
        let elapsed = || Error::Timeout(format!("forwarding {} to {} exceeded {:?}", plan, node, timeout));

        if self.config.use_async_server {
            let client = self.ctx.clients.async_client(node, timeout)?;
            match tokio::time::timeout(timeout, client.execute_non_query(header, plan)).await {
                Ok(result) => result,
                Err(_) => Err(elapsed()),
            }
        } else {
            let client = self.ctx.clients.sync_client(node, timeout)?;
            let owned_header = header.clone();
            let owned_plan = plan.clone();
            let task = tokio::task::spawn_blocking(move || {
                client.execute_non_query(&owned_header, &owned_plan)
            });
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(Error::Internal(format!("forwarding task failed: {}", e))),
                Err(_) => Err(elapsed()),
            }
        }
    }
}
