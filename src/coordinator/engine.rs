//! Non-query plan coordination
//!
//! Entry point for every client write: classify, then execute locally, hand
//! to the meta group, broadcast to every data group, or split and dispatch
//! to the owning groups.

use super::aggregator::BatchAggregator;
use super::classifier::{classify, PlanScope};
use crate::cluster::{ClientFactory, LocalExecutor, MetaGroupMember, PlanGroupMap, PlanRouter, SchemaProcessor};
use crate::common::{CoordinatorConfig, Error, MetricsRegistry, Operation, Result, Status, StatusCode};
use crate::plan::Plan;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Collaborators a coordinator is wired with
#[derive(Clone)]
pub struct ClusterContext {
    pub router: Arc<dyn PlanRouter>,
    pub member: Arc<dyn MetaGroupMember>,
    pub schema: Arc<dyn SchemaProcessor>,
    pub executor: Arc<dyn LocalExecutor>,
    pub clients: Arc<dyn ClientFactory>,
}

/// Coordinator of client non-query requests.
///
/// Holds no per-request state; clones share the same collaborators.
#[derive(Clone)]
pub struct Coordinator {
    pub(super) ctx: ClusterContext,
    pub(super) config: Arc<CoordinatorConfig>,
    pub(super) metrics: Arc<MetricsRegistry>,
}

impl Coordinator {
    pub fn new(ctx: ClusterContext, config: CoordinatorConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            ctx,
            config: Arc::new(config),
            metrics,
        }
    }

    pub fn context(&self) -> &ClusterContext {
        &self.ctx
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Execute a non-query plan wherever its kind says it belongs.
    pub async fn execute_non_query_plan(&self, plan: &Plan) -> Status {
        let start = Instant::now();
        let status = match classify(plan) {
            PlanScope::Local => self.execute_local(plan).await,
            PlanScope::GlobalMeta => self.ctx.member.process_non_partitioned_meta_plan(plan).await,
            PlanScope::GlobalData => self.execute_global_data(plan).await,
            PlanScope::Partitioned => match self.process_partitioned_plan(plan).await {
                Ok(status) => status,
                Err(Error::UnsupportedPlan(message)) => {
                    Status::new(StatusCode::UnsupportedOperation, message)
                }
                Err(e) => e.to_status(),
            },
        };
        self.metrics
            .record(Operation::ExecuteNonQuery, start.elapsed(), status.is_ok_or_redirect());
        self.metrics.record_status(status.code);
        status
    }

    /// Execute a plan that only touches this node.
    pub(super) async fn execute_local(&self, plan: &Plan) -> Status {
        match self.ctx.executor.process_non_query(plan).await {
            Ok(true) => Status::ok(),
            Ok(false) => Status::new(StatusCode::ExecuteStatementError, ""),
            Err(Error::Query { code, message }) => {
                if code == StatusCode::InternalServerError.code() {
                    warn!(plan = %plan, code, "Error while processing non-query: {}", message);
                } else {
                    debug!(plan = %plan, code, "Error while processing non-query: {}", message);
                }
                Status::new(code, message)
            }
            Err(e) => {
                error!(plan = %plan, "Internal error while processing non-query: {}", e);
                Status::internal(e.to_string())
            }
        }
    }

    /// Execute a plan every data group must apply.
    ///
    /// Wildcard deletions are resolved to concrete series first so the data
    /// groups never have to consult metadata that may already be gone.
    pub(super) async fn execute_global_data(&self, plan: &Plan) -> Status {
        let resolved = match plan {
            Plan::DeleteTimeSeries(_) => self.ctx.schema.convert_to_full_paths(plan).await,
            _ => self
                .ctx
                .member
                .sync_with_leader(true)
                .await
                .map(|()| plan.clone()),
        };
        let plan = match resolved {
            Ok(plan) => plan,
            Err(Error::PathNotExist(message)) => {
                return Status::new(StatusCode::TimeseriesNotExist, message);
            }
            Err(Error::ConsistencyFailure(_)) => return self.forward_to_meta_leader(plan).await,
            Err(e) => {
                warn!(plan = %plan, "Cannot prepare global data plan: {}", e);
                return e.to_status();
            }
        };

        if let Err(e) = self.create_schema_if_necessary(&plan).await {
            error!(plan = %plan, "Cannot find storage groups: {}", e);
            return Status::no_storage_group();
        }

        if self.ctx.member.partition_table().is_none() {
            return Status::partition_table_not_ready();
        }
        let groups = self.ctx.member.all_data_groups();
        debug!(kind = ?plan.kind(), plan = %plan, groups = groups.len(), "Forwarding global data plan");
        self.broadcast(&plan, &groups).await
    }

    async fn forward_to_meta_leader(&self, plan: &Plan) -> Status {
        let leader = match self.ctx.member.wait_leader().await {
            Ok(leader) => leader,
            Err(e) => return e.to_status(),
        };
        debug!(plan = %plan, leader = %leader, "Forwarding global data plan to meta leader");
        self.ctx.member.forward_to_leader(plan, &leader).await
    }

    /// A template set on a prefix with no storage group creates the group.
    async fn create_schema_if_necessary(&self, plan: &Plan) -> Result<()> {
        let Plan::SetTemplate(set) = plan else {
            return Ok(());
        };
        match self.ctx.schema.belonged_storage_group(&set.prefix_path).await {
            Err(Error::StorageGroupNotSet(_)) => self.ctx.schema.create_schema(plan).await,
            _ => Ok(()),
        }
    }

    /// Split a partitioned plan and dispatch the pieces to their groups.
    pub async fn process_partitioned_plan(&self, plan: &Plan) -> Result<Status> {
        debug!(kind = ?plan.kind(), plan = %plan, "Received a partitioned plan");
        if let Err(e) = plan.check() {
            warn!(plan = %plan, "Rejecting malformed plan: {}", e);
            return Ok(e.to_status());
        }
        let mut schema_attempts = 0;
        loop {
            if self.ctx.member.partition_table().is_none() {
                debug!("Partition table is not ready");
                return Ok(Status::partition_table_not_ready());
            }

            // Every row already failed an earlier check: nothing to send.
            if let Some(batch) = plan.as_row_batch() {
                if batch.fully_decided() {
                    return Ok(BatchAggregator::new(batch).conclude());
                }
            }

            let map = match self.split_plan(plan).await {
                Ok(map) => map,
                Err(Error::ConsistencyFailure(message)) => {
                    return Ok(Status::new(StatusCode::ConsistencyFailure, message));
                }
                Err(e) => return Err(e),
            };
            if !map.is_empty() {
                debug!(kind = ?plan.kind(), plan = %plan, groups = map.len(), "Routed plan");
                return Ok(self.forward_plan_map(&map, plan).await);
            }

            if plan.is_auto_create_eligible() && self.config.enable_auto_create_schema {
                if schema_attempts >= self.config.max_schema_auto_create_attempts {
                    error!(plan = %plan, attempts = schema_attempts, "Plan still unroutable after creating its schema");
                    return Ok(Status::internal(format!(
                        "{} is still unroutable after {} schema creation attempt(s)",
                        plan, schema_attempts
                    )));
                }
                schema_attempts += 1;
                debug!(plan = %plan, "No associated storage group found, auto-creating");
                match self.ctx.schema.create_schema(plan).await {
                    Ok(()) => continue,
                    Err(e) => error!("Failed to set storage group or create timeseries, because {}", e),
                }
            }

            error!(plan = %plan, "Cannot find storage groups");
            return Ok(Status::no_storage_group());
        }
    }

    /// Ask the router for the plan's groups. Stale local metadata earns one
    /// forced sync with the leader and one more try; if that try fails too
    /// the map comes back empty.
    async fn split_plan(&self, plan: &Plan) -> Result<PlanGroupMap> {
        let map = match self.ctx.router.split(plan) {
            Ok(map) => map,
            Err(Error::StorageGroupNotSet(path)) => {
                debug!(path = %path, "Storage group not set locally, syncing with leader");
                self.ctx.member.sync_with_leader(true).await?;
                match self.ctx.router.split(plan) {
                    Ok(map) => map,
                    Err(e @ Error::UnsupportedPlan(_)) => return Err(e),
                    Err(e) => {
                        debug!(plan = %plan, "Still cannot route after sync: {}", e);
                        PlanGroupMap::new()
                    }
                }
            }
            Err(e) => {
                error!(plan = %plan, "Cannot route plan: {}", e);
                return Err(e);
            }
        };
        debug!(plan = %plan, groups = map.len(), "Split plan");
        Ok(map)
    }
}
