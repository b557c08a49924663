//! In-memory cluster collaborators
//!
//! Used by `minits-coord` when no external consensus layer is wired in:
//! every node is its own meta leader, storage groups and series live in a
//! [`MemorySchema`], and each data group replica is a [`MemoryExecutor`].

use super::member::{LocalExecutor, MetaGroupMember, SchemaProcessor};
use super::partition::{Node, PartitionTable, RaftNode};
use crate::common::utils::{is_wildcard, path_matches, storage_group_of};
use crate::common::{Error, Result, Status, StatusCode};
use crate::plan::{
    InsertRowPlan, InsertTabletPlan, LocalCommand, MembershipChangeLog, Plan, TsDataType,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Storage groups known to this node
#[derive(Debug, Default)]
pub struct StorageGroupRegistry {
    groups: RwLock<BTreeSet<String>>,
}

impl StorageGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the group was already registered
    pub fn register(&self, sg: &str) -> bool {
        self.groups.write().unwrap().insert(sg.to_string())
    }

    pub fn remove(&self, sg: &str) -> bool {
        self.groups.write().unwrap().remove(sg)
    }

    pub fn contains(&self, sg: &str) -> bool {
        self.groups.read().unwrap().contains(sg)
    }

    pub fn list(&self) -> Vec<String> {
        self.groups.read().unwrap().iter().cloned().collect()
    }
}

/// Series catalogue shared by the router and the local replicas
pub struct MemorySchema {
    registry: Arc<StorageGroupRegistry>,
    series: RwLock<BTreeMap<String, TsDataType>>,
    storage_group_level: usize,
}

impl MemorySchema {
    pub fn new(registry: Arc<StorageGroupRegistry>, storage_group_level: usize) -> Self {
        Self {
            registry,
            series: RwLock::new(BTreeMap::new()),
            storage_group_level,
        }
    }

    pub fn registry(&self) -> &Arc<StorageGroupRegistry> {
        &self.registry
    }

    pub fn has_series(&self, path: &str) -> bool {
        self.series.read().unwrap().contains_key(path)
    }

    /// Returns false if the series already existed
    pub fn add_series(&self, path: &str, data_type: TsDataType) -> bool {
        let mut series = self.series.write().unwrap();
        if series.contains_key(path) {
            return false;
        }
        series.insert(path.to_string(), data_type);
        true
    }

    pub fn remove_series(&self, path: &str) -> bool {
        self.series.write().unwrap().remove(path).is_some()
    }

    /// Drop every series under the storage group `sg`
    pub fn remove_storage_group(&self, sg: &str) -> bool {
        let prefix = format!("{}.", sg);
        self.series
            .write()
            .unwrap()
            .retain(|path, _| !path.starts_with(&prefix));
        self.registry.remove(sg)
    }

    pub fn series_count(&self) -> usize {
        self.series.read().unwrap().len()
    }

    fn storage_group(&self, path: &str) -> Result<String> {
        storage_group_of(path, self.storage_group_level)
            .ok_or_else(|| Error::Metadata(format!("illegal path: {}", path)))
    }

    fn ensure_storage_group(&self, path: &str) -> Result<()> {
        let sg = self.storage_group(path)?;
        if self.registry.register(&sg) {
            info!(storage_group = %sg, "Auto-created storage group");
        }
        Ok(())
    }

    fn ensure_series(&self, path: &str, data_type: TsDataType) -> Result<()> {
        self.ensure_storage_group(path)?;
        if self.add_series(path, data_type) {
            debug!(path = %path, ?data_type, "Auto-created series");
        }
        Ok(())
    }

    fn ensure_row(&self, row: &InsertRowPlan) -> Result<()> {
        for (m, v) in row.measurements.iter().zip(&row.values) {
            self.ensure_series(&format!("{}.{}", row.device, m), v.data_type())?;
        }
        Ok(())
    }

    fn ensure_tablet(&self, tablet: &InsertTabletPlan) -> Result<()> {
        for (m, column) in tablet.measurements.iter().zip(&tablet.columns) {
            let data_type = column
                .first()
                .map(|v| v.data_type())
                .unwrap_or(TsDataType::Double);
            self.ensure_series(&format!("{}.{}", tablet.device, m), data_type)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaProcessor for MemorySchema {
    async fn convert_to_full_paths(&self, plan: &Plan) -> Result<Plan> {
        let Plan::DeleteTimeSeries(delete) = plan else {
            return Ok(plan.clone());
        };

        let series = self.series.read().unwrap();
        let mut resolved: Vec<String> = Vec::new();
        for pattern in &delete.paths {
            let matched: Vec<&String> = if is_wildcard(pattern) {
                series
                    .keys()
                    .filter(|path| path_matches(pattern, path))
                    .collect()
            } else {
                series.get_key_value(pattern).map(|(k, _)| k).into_iter().collect()
            };
            for path in matched {
                if !resolved.contains(path) {
                    resolved.push(path.clone());
                }
            }
        }

        if resolved.is_empty() {
            return Err(Error::PathNotExist(delete.paths.join(", ")));
        }
        let mut full = delete.clone();
        full.paths = resolved;
        Ok(Plan::DeleteTimeSeries(full))
    }

    async fn create_schema(&self, plan: &Plan) -> Result<()> {
        match plan {
            Plan::SetTemplate(p) => self.ensure_storage_group(&p.prefix_path),
            Plan::InsertRow(p) => self.ensure_row(p),
            Plan::InsertRows(p) => p.rows.iter().try_for_each(|row| self.ensure_row(row)),
            Plan::InsertTablet(p) => self.ensure_tablet(p),
            Plan::InsertMultiTablets(p) => {
                p.tablets.iter().try_for_each(|t| self.ensure_tablet(t))
            }
            Plan::CreateTimeSeries(p) => self.ensure_storage_group(&p.path),
            Plan::CreateAlignedTimeSeries(p) => self.ensure_storage_group(&p.device),
            Plan::CreateMultiTimeSeries(p) => p
                .paths
                .iter()
                .try_for_each(|path| self.ensure_storage_group(path)),
            other => Err(Error::UnsupportedPlan(format!(
                "cannot create schema for {}",
                other
            ))),
        }
    }

    async fn belonged_storage_group(&self, path: &str) -> Result<String> {
        let sg = self.storage_group(path)?;
        if self.registry.contains(&sg) {
            Ok(sg)
        } else {
            Err(Error::StorageGroupNotSet(path.to_string()))
        }
    }
}

/// One replica of one data group, holding points in memory
pub struct MemoryExecutor {
    schema: Arc<MemorySchema>,
    auto_create_schema: bool,
    points: Mutex<BTreeMap<String, BTreeMap<i64, crate::plan::Value>>>,
    templates: Mutex<BTreeMap<String, String>>,
    applied_logs: Mutex<Vec<MembershipChangeLog>>,
}

impl MemoryExecutor {
    pub fn new(schema: Arc<MemorySchema>, auto_create_schema: bool) -> Self {
        Self {
            schema,
            auto_create_schema,
            points: Mutex::new(BTreeMap::new()),
            templates: Mutex::new(BTreeMap::new()),
            applied_logs: Mutex::new(Vec::new()),
        }
    }

    /// Number of points stored for `path`
    pub fn point_count(&self, path: &str) -> usize {
        self.points
            .lock()
            .unwrap()
            .get(path)
            .map(|p| p.len())
            .unwrap_or(0)
    }

    pub fn applied_logs(&self) -> Vec<MembershipChangeLog> {
        self.applied_logs.lock().unwrap().clone()
    }

    /// Apply a data plan and report its status
    pub fn apply(&self, plan: &Plan) -> Status {
        match plan {
            Plan::InsertRow(row) => self.insert_row(row),
            Plan::InsertRows(p) => {
                batch(p.rows.iter().map(|row| self.insert_row(row)).collect())
            }
            Plan::InsertTablet(t) => self.insert_tablet(t),
            Plan::InsertMultiTablets(p) => {
                batch(p.tablets.iter().map(|t| self.insert_tablet(t)).collect())
            }
            Plan::CreateTimeSeries(p) => self.create_series(&p.path, p.data_type),
            Plan::CreateAlignedTimeSeries(p) => {
                let statuses: Vec<Status> = p
                    .paths()
                    .iter()
                    .zip(&p.data_types)
                    .map(|(path, t)| self.create_series(path, *t))
                    .collect();
                statuses
                    .into_iter()
                    .find(|s| !s.is_success())
                    .unwrap_or_else(Status::ok)
            }
            Plan::CreateMultiTimeSeries(p) => batch(
                p.paths
                    .iter()
                    .zip(&p.data_types)
                    .map(|(path, t)| self.create_series(path, *t))
                    .collect(),
            ),
            Plan::DeleteTimeSeries(p) => self.delete_series(&p.paths),
            Plan::SetTemplate(p) => {
                let mut templates = self.templates.lock().unwrap();
                if let Some(existing) = templates.get(&p.prefix_path) {
                    return Status::new(
                        StatusCode::DuplicatedTemplate,
                        format!("template {} already set on {}", existing, p.prefix_path),
                    );
                }
                templates.insert(p.prefix_path.clone(), p.template.clone());
                Status::ok()
            }
            Plan::Flush(_) => Status::ok(),
            Plan::MembershipChange(log) => {
                self.applied_logs.lock().unwrap().push(log.clone());
                Status::ok()
            }
            other => Status::new(
                StatusCode::UnsupportedOperation,
                format!("{} is not a data plan", other),
            ),
        }
    }

    fn insert_row(&self, row: &InsertRowPlan) -> Status {
        if row.measurements.len() != row.values.len() {
            return Status::new(
                StatusCode::ExecuteStatementError,
                format!(
                    "row of {} at {} has {} measurements but {} values",
                    row.device,
                    row.time,
                    row.measurements.len(),
                    row.values.len()
                ),
            );
        }
        for (m, v) in row.measurements.iter().zip(&row.values) {
            let path = format!("{}.{}", row.device, m);
            if let Err(status) = self.check_series(&path, v.data_type()) {
                return status;
            }
        }
        let mut points = self.points.lock().unwrap();
        for (m, v) in row.measurements.iter().zip(&row.values) {
            points
                .entry(format!("{}.{}", row.device, m))
                .or_default()
                .insert(row.time, v.clone());
        }
        Status::ok()
    }

    /// One status per row; rows missing a value in some column fail.
    fn insert_tablet(&self, tablet: &InsertTabletPlan) -> Status {
        if tablet.columns.len() != tablet.measurements.len() {
            return Status::new(
                StatusCode::ExecuteStatementError,
                format!(
                    "tablet of {} has {} measurements but {} columns",
                    tablet.device,
                    tablet.measurements.len(),
                    tablet.columns.len()
                ),
            );
        }
        for (m, column) in tablet.measurements.iter().zip(&tablet.columns) {
            if let Some(v) = column.first() {
                let path = format!("{}.{}", tablet.device, m);
                if let Err(status) = self.check_series(&path, v.data_type()) {
                    return status;
                }
            }
        }

        let mut points = self.points.lock().unwrap();
        let rows: Vec<Status> = tablet
            .times
            .iter()
            .enumerate()
            .map(|(r, &time)| {
                if tablet.columns.iter().any(|c| c.get(r).is_none()) {
                    return Status::new(
                        StatusCode::ExecuteStatementError,
                        format!("row {} of {} is missing values", r, tablet.device),
                    );
                }
                for (m, column) in tablet.measurements.iter().zip(&tablet.columns) {
                    points
                        .entry(format!("{}.{}", tablet.device, m))
                        .or_default()
                        .insert(time, column[r].clone());
                }
                Status::ok()
            })
            .collect();
        batch(rows)
    }

    fn check_series(&self, path: &str, data_type: TsDataType) -> std::result::Result<(), Status> {
        if self.schema.has_series(path) {
            return Ok(());
        }
        if self.auto_create_schema {
            self.schema.add_series(path, data_type);
            return Ok(());
        }
        Err(Status::new(
            StatusCode::TimeseriesNotExist,
            format!("timeseries {} does not exist", path),
        ))
    }

    fn create_series(&self, path: &str, data_type: TsDataType) -> Status {
        if self.schema.add_series(path, data_type) {
            Status::ok()
        } else {
            Status::new(
                StatusCode::MetadataError,
                format!("path {} already exists", path),
            )
        }
    }

    fn delete_series(&self, paths: &[String]) -> Status {
        let mut points = self.points.lock().unwrap();
        let mut deleted = 0;
        for path in paths {
            let had_points = points.remove(path).is_some();
            let had_series = self.schema.remove_series(path);
            if had_points || had_series {
                deleted += 1;
            }
        }
        if deleted == 0 {
            return Status::new(
                StatusCode::TimeseriesNotExist,
                format!("timeseries {} do not exist", paths.join(", ")),
            );
        }
        Status::ok()
    }
}

/// Success, or a batch failure when any item failed
fn batch(statuses: Vec<Status>) -> Status {
    if statuses.iter().all(Status::is_success) {
        Status::ok()
    } else {
        Status::batch(statuses)
    }
}

#[async_trait]
impl LocalExecutor for MemoryExecutor {
    async fn process_non_query(&self, plan: &Plan) -> Result<bool> {
        let Plan::Local(local) = plan else {
            return Err(Error::UnsupportedPlan(format!("{} is not a local plan", plan)));
        };
        match &local.command {
            LocalCommand::LoadConfiguration => {
                info!("Configuration reload requested");
                Ok(true)
            }
            LocalCommand::ClearCache => {
                debug!("Cache cleared");
                Ok(true)
            }
            LocalCommand::KillQuery { query_id } => Err(Error::Query {
                code: StatusCode::ExecuteStatementError.code(),
                message: format!("no running query with id {}", query_id),
            }),
        }
    }
}

/// A node that is its own meta leader and a replica of its configured groups
pub struct StandaloneMember {
    this_node: Node,
    table: Arc<PartitionTable>,
    schema: Arc<MemorySchema>,
    auto_create_schema: bool,
    replicas: Mutex<HashMap<i32, Arc<MemoryExecutor>>>,
}

impl StandaloneMember {
    pub fn new(
        this_node: Node,
        table: Arc<PartitionTable>,
        schema: Arc<MemorySchema>,
        auto_create_schema: bool,
    ) -> Self {
        Self {
            this_node,
            table,
            schema,
            auto_create_schema,
            replicas: Mutex::new(HashMap::new()),
        }
    }

    /// The local replica of data group `raft_id`
    pub fn replica(&self, raft_id: i32) -> Arc<MemoryExecutor> {
        self.replicas
            .lock()
            .unwrap()
            .entry(raft_id)
            .or_insert_with(|| {
                Arc::new(MemoryExecutor::new(
                    self.schema.clone(),
                    self.auto_create_schema,
                ))
            })
            .clone()
    }
}

#[async_trait]
impl MetaGroupMember for StandaloneMember {
    fn this_node(&self) -> &Node {
        &self.this_node
    }

    fn partition_table(&self) -> Option<Arc<PartitionTable>> {
        if self.table.global_groups().is_empty() {
            None
        } else {
            Some(self.table.clone())
        }
    }

    fn leader(&self) -> Option<Node> {
        Some(self.this_node.clone())
    }

    async fn wait_leader(&self) -> Result<Node> {
        Ok(self.this_node.clone())
    }

    async fn sync_with_leader(&self, _force_consistency_check: bool) -> Result<()> {
        Ok(())
    }

    async fn forward_to_leader(&self, plan: &Plan, leader: &Node) -> Status {
        Status::new(
            StatusCode::UnsupportedOperation,
            format!("cannot forward {} to {}: no remote meta group", plan, leader),
        )
    }

    async fn process_non_partitioned_meta_plan(&self, plan: &Plan) -> Status {
        match plan {
            Plan::SetStorageGroup(p) => {
                let sg = match self.schema.storage_group(&p.path) {
                    Ok(sg) if sg == p.path => sg,
                    _ => {
                        return Status::new(
                            StatusCode::MetadataError,
                            format!("{} is not a valid storage group path", p.path),
                        )
                    }
                };
                if self.schema.registry().register(&sg) {
                    info!(storage_group = %sg, "Storage group set");
                    Status::ok()
                } else {
                    Status::new(
                        StatusCode::MetadataError,
                        format!("storage group {} already exists", sg),
                    )
                }
            }
            Plan::DeleteStorageGroups(p) => {
                let missing: Vec<&String> = p
                    .paths
                    .iter()
                    .filter(|sg| !self.schema.remove_storage_group(sg))
                    .collect();
                if missing.is_empty() {
                    Status::ok()
                } else {
                    Status::new(
                        StatusCode::StorageGroupNotExist,
                        format!("storage groups {:?} do not exist", missing),
                    )
                }
            }
            other => Status::new(
                StatusCode::UnsupportedOperation,
                format!("{} is not a meta plan", other),
            ),
        }
    }

    async fn execute_in_local_group(&self, header: &RaftNode, plan: &Plan) -> Status {
        self.replica(header.raft_id).apply(plan)
    }
}
