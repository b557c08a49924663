//! Hash-based plan router
//!
//! A series lands in the slot `(storage group, time partition)`; each slot is
//! owned by the data group that wins the HRW draw for the slot key. Splitting
//! walks rows in order and opens a new sub-plan the first time a group is
//! seen, so the same table always yields the same map.

use super::member::PlanRouter;
use super::partition::{PartitionGroup, PartitionTable, PlanGroupMap};
use super::standalone::StorageGroupRegistry;
use crate::common::config::CoordinatorConfig;
use crate::common::hash::{hrw_select, partition_key};
use crate::common::utils::{storage_group_of, time_partition};
use crate::common::{Error, Result};
use crate::plan::{
    CreateMultiTimeSeriesPlan, InsertMultiTabletsPlan, InsertRowsPlan, InsertTabletPlan,
    MembershipChangeLog, Plan,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub struct HashPlanRouter {
    table: Arc<PartitionTable>,
    registry: Arc<StorageGroupRegistry>,
    storage_group_level: usize,
    partition_interval_ms: i64,
}

/// Items bucketed per owning group, groups in first-seen order
type Buckets = Vec<(PartitionGroup, Vec<usize>)>;

impl HashPlanRouter {
    pub fn new(
        table: Arc<PartitionTable>,
        registry: Arc<StorageGroupRegistry>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            table,
            registry,
            storage_group_level: config.storage_group_level,
            partition_interval_ms: config.partition_interval_ms,
        }
    }

    /// Registered storage group owning `path`
    fn storage_group(&self, path: &str) -> Result<String> {
        let sg = storage_group_of(path, self.storage_group_level)
            .ok_or_else(|| Error::Metadata(format!("illegal path: {}", path)))?;
        if !self.registry.contains(&sg) {
            return Err(Error::StorageGroupNotSet(path.to_string()));
        }
        Ok(sg)
    }

    /// Group owning `path` at `time`
    fn locate(&self, path: &str, time: i64) -> Result<&PartitionGroup> {
        let sg = self.storage_group(path)?;
        let groups = self.table.global_groups();
        let raft_ids: Vec<i32> = groups.iter().map(|g| g.raft_id).collect();
        let key = partition_key(&sg, time_partition(time, self.partition_interval_ms));
        hrw_select(&key, &raft_ids)
            .map(|i| &groups[i])
            .ok_or_else(|| Error::Metadata("partition table has no data groups".into()))
    }

    fn bucket(
        &self,
        items: impl IntoIterator<Item = (usize, Result<PartitionGroup>)>,
    ) -> Result<Buckets> {
        let mut buckets: Buckets = Vec::new();
        for (item, group) in items {
            let group = group?;
            match buckets.iter_mut().find(|(g, _)| g.raft_id == group.raft_id) {
                Some((_, members)) => members.push(item),
                None => buckets.push((group, vec![item])),
            }
        }
        Ok(buckets)
    }

    fn split_tablet(
        &self,
        tablet: &InsertTabletPlan,
    ) -> Result<Vec<(PartitionGroup, InsertTabletPlan)>> {
        tablet.check_shape()?;
        let buckets = self.bucket(
            tablet
                .times
                .iter()
                .enumerate()
                .map(|(row, &t)| (row, self.locate(&tablet.device, t).cloned())),
        )?;
        if let [(group, _)] = buckets.as_slice() {
            return Ok(vec![(group.clone(), tablet.clone())]);
        }
        Ok(buckets
            .into_iter()
            .map(|(group, rows)| (group, tablet.select_rows(&rows)))
            .collect())
    }

    fn split_multi_tablets(&self, plan: &InsertMultiTabletsPlan) -> Result<PlanGroupMap> {
        let mut per_group: Vec<(PartitionGroup, InsertMultiTabletsPlan)> = Vec::new();
        for (i, tablet) in plan.tablets.iter().enumerate() {
            let slot = plan.parent_index(i);
            if plan.results.contains_key(&slot) {
                continue;
            }
            for (group, part) in self.split_tablet(tablet)? {
                let pos = match per_group.iter().position(|(g, _)| g.raft_id == group.raft_id) {
                    Some(pos) => pos,
                    None => {
                        per_group.push((group, InsertMultiTabletsPlan::new(Vec::new())));
                        per_group.len() - 1
                    }
                };
                let sub = &mut per_group[pos].1;
                sub.tablets.push(part);
                sub.parent_indices.push(slot);
            }
        }
        Ok(per_group
            .into_iter()
            .map(|(group, sub)| (Plan::InsertMultiTablets(sub), group))
            .collect())
    }

    fn split_rows(&self, plan: &InsertRowsPlan) -> Result<PlanGroupMap> {
        let pending = (0..plan.rows.len())
            .filter(|&i| !plan.results.contains_key(&plan.row_index(i)));
        let buckets = self.bucket(pending.map(|i| {
            let row = &plan.rows[i];
            (i, self.locate(&row.device, row.time).cloned())
        }))?;

        Ok(buckets
            .into_iter()
            .map(|(group, items)| {
                let mut sub =
                    InsertRowsPlan::new(items.iter().map(|&i| plan.rows[i].clone()).collect());
                sub.row_indices = items.iter().map(|&i| plan.row_index(i)).collect();
                (Plan::InsertRows(sub), group)
            })
            .collect())
    }

    fn split_create_multi(&self, plan: &CreateMultiTimeSeriesPlan) -> Result<PlanGroupMap> {
        let pending = (0..plan.paths.len())
            .filter(|&i| !plan.results.contains_key(&plan.index(i)));
        let buckets =
            self.bucket(pending.map(|i| (i, self.locate(&plan.paths[i], 0).cloned())))?;

        Ok(buckets
            .into_iter()
            .map(|(group, items)| {
                let mut sub = CreateMultiTimeSeriesPlan::new(
                    items.iter().map(|&i| plan.paths[i].clone()).collect(),
                    items
                        .iter()
                        .filter_map(|&i| plan.data_types.get(i).copied())
                        .collect(),
                );
                sub.indices = items.iter().map(|&i| plan.index(i)).collect();
                (Plan::CreateMultiTimeSeries(sub), group)
            })
            .collect())
    }

    fn to_all_groups(&self, plan: &Plan) -> PlanGroupMap {
        self.table
            .global_groups()
            .iter()
            .map(|group| (plan.clone(), group.clone()))
            .collect()
    }
}

impl PlanRouter for HashPlanRouter {
    fn split(&self, plan: &Plan) -> Result<PlanGroupMap> {
        let map = match plan {
            Plan::InsertRow(p) => {
                let group = self.locate(&p.device, p.time)?.clone();
                std::iter::once((plan.clone(), group)).collect()
            }
            Plan::InsertTablet(p) => self
                .split_tablet(p)?
                .into_iter()
                .map(|(group, part)| (Plan::InsertTablet(part), group))
                .collect(),
            Plan::InsertMultiTablets(p) => self.split_multi_tablets(p)?,
            Plan::InsertRows(p) => self.split_rows(p)?,
            Plan::CreateTimeSeries(p) => {
                let group = self.locate(&p.path, 0)?.clone();
                std::iter::once((plan.clone(), group)).collect()
            }
            Plan::CreateAlignedTimeSeries(p) => {
                let group = self.locate(&p.device, 0)?.clone();
                std::iter::once((plan.clone(), group)).collect()
            }
            Plan::CreateMultiTimeSeries(p) => self.split_create_multi(p)?,
            Plan::MembershipChange(_) => self.to_all_groups(plan),
            other => {
                return Err(Error::UnsupportedPlan(format!(
                    "{} cannot be partitioned",
                    other
                )))
            }
        };
        debug!(plan = %plan, rows = ?rows_per_group(&map), "Split plan");
        Ok(map)
    }

    fn split_membership_change(&self, log: &MembershipChangeLog) -> Result<PlanGroupMap> {
        Ok(self.to_all_groups(&Plan::MembershipChange(log.clone())))
    }
}

/// Rows per raft id
fn rows_per_group(map: &PlanGroupMap) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for (plan, group) in map.iter() {
        let rows = match plan {
            Plan::InsertTablet(t) => t.row_count(),
            Plan::InsertMultiTablets(p) => p.tablets.iter().map(|t| t.row_count()).sum(),
            Plan::InsertRows(p) => p.rows.len(),
            Plan::CreateMultiTimeSeries(p) => p.paths.len(),
            _ => 1,
        };
        *counts.entry(group.raft_id).or_insert(0) += rows;
    }
    counts
}
