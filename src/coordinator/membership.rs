//! Membership-change propagation
//!
//! A membership change committed by the meta group has to reach every data
//! group. Each group gets its own task that keeps retrying until the group
//! accepts the log or the write timeout budget runs out.

use super::engine::Coordinator;
use crate::cluster::PartitionGroup;
use crate::common::{Error, Operation, Result};
use crate::plan::{MembershipChangeLog, Plan};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

impl Coordinator {
    /// Deliver `log` to every data group, waiting for all of them.
    ///
    /// Returns `Error::ChangeMembership` naming each group that could not
    /// apply the log in time.
    pub async fn propagate_membership_change_log(&self, log: &MembershipChangeLog) -> Result<()> {
        debug!(log = %log, "Send log to all data groups: start");
        let map = self.ctx.router.split_membership_change(log)?;

        let mut tasks = JoinSet::new();
        for (plan, group) in map {
            let coordinator = self.clone();
            let log = log.clone();
            tasks.spawn(async move { coordinator.forward_change_membership(&log, &plan, &group).await });
        }

        let mut failures = Vec::new();
        let mut aborted = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => failures.push(failure),
                Err(e) => aborted = Some(e),
            }
        }

        if let Some(e) = aborted {
            return Err(Error::ChangeMembership(format!(
                "Can not wait all data groups to apply {}: {}",
                log, e
            )));
        }
        if !failures.is_empty() {
            return Err(Error::ChangeMembership(format!(
                "Apply {} failed with status {:?}",
                log, failures
            )));
        }
        debug!(log = %log, "Send log to all data groups: end");
        Ok(())
    }

    async fn forward_change_membership(
        &self,
        log: &MembershipChangeLog,
        plan: &Plan,
        group: &PartitionGroup,
    ) -> std::result::Result<(), String> {
        let start = Instant::now();
        let budget = self.config.write_operation_timeout();
        let mut retries = 0u32;
        loop {
            debug!(log = %log, group = %group, retries, "Send change membership log to data group");
            let status = self.forward_to_single_group(plan, group).await;
            if status.is_success() {
                self.metrics
                    .record(Operation::ForwardChangeMembership, start.elapsed(), true);
                debug!(log = %log, group = %group, "Data group applied change membership log");
                return Ok(());
            }
            if start.elapsed() > budget {
                self.metrics
                    .record(Operation::ForwardChangeMembership, start.elapsed(), false);
                warn!(log = %log, group = %group, status = %status, retries, "Giving up on change membership log");
                return Err(format!(
                    "Forward change membership log {} to data group {}",
                    log, group
                ));
            }
            tokio::time::sleep(self.config.retry_wait()).await;
            retries += 1;
        }
    }
}
