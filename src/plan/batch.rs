//! Row-reorderable batches
//!
//! A batch plan reports one status per slot. Once split, each sub-plan holds
//! a subset of the parent's items and knows which parent slot every item
//! came from, so per-group answers can be scattered back in place without
//! the aggregator knowing which concrete plan it is looking at.

use super::insert::{InsertMultiTabletsPlan, InsertRowsPlan};
use super::schema::CreateMultiTimeSeriesPlan;
use crate::common::{Error, Result, Status};
use std::collections::{BTreeMap, BTreeSet};

/// Rows of one item that map into a nested per-row array of its parent slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRows {
    /// Position of each of the item's rows inside the parent slot
    pub positions: Vec<usize>,
    pub max_time: Option<i64>,
}

/// Shape of a parent slot that owns nested rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotShape {
    pub row_count: usize,
    pub max_time: Option<i64>,
}

/// Per-slot view of a batch plan
pub trait RowBatch: Sync {
    /// Number of result slots of this plan when it is the parent
    fn slot_count(&self) -> usize;

    /// Parent slot of each item when this plan is a sub-plan
    fn item_slots(&self) -> Vec<usize>;

    /// Slots already decided before dispatch; they override anything a group
    /// answers later.
    fn prior_results(&self) -> &BTreeMap<usize, Status>;

    /// Whether a group's redirect hint is worth carrying per slot
    fn honors_redirect(&self) -> bool {
        true
    }

    /// Nested rows of item `item`, for batches whose slots are themselves
    /// multi-row.
    fn item_rows(&self, _item: usize) -> Option<ItemRows> {
        None
    }

    fn slot_shape(&self, _slot: usize) -> Option<SlotShape> {
        None
    }

    /// True when every slot was already decided and nothing is left to send.
    fn fully_decided(&self) -> bool {
        let count = self.slot_count();
        count > 0 && (0..count).all(|slot| self.prior_results().contains_key(&slot))
    }

    /// Check the slot bookkeeping of a batch received from a client: every
    /// item and every prior result must name a distinct slot of the batch.
    fn check_slots(&self) -> Result<()> {
        let count = self.slot_count();
        if let Some(slot) = self.prior_results().keys().find(|&&slot| slot >= count) {
            return Err(Error::InvalidPlan(format!(
                "result for slot {} of a batch with {} slots",
                slot, count
            )));
        }
        let mut seen = BTreeSet::new();
        for slot in self.item_slots() {
            if slot >= count {
                return Err(Error::InvalidPlan(format!(
                    "item mapped to slot {} of a batch with {} slots",
                    slot, count
                )));
            }
            if !seen.insert(slot) {
                return Err(Error::InvalidPlan(format!(
                    "slot {} is claimed by more than one item",
                    slot
                )));
            }
        }
        Ok(())
    }
}

impl RowBatch for InsertMultiTabletsPlan {
    fn slot_count(&self) -> usize {
        self.tablets.len()
    }

    fn item_slots(&self) -> Vec<usize> {
        (0..self.tablets.len()).map(|i| self.parent_index(i)).collect()
    }

    fn prior_results(&self) -> &BTreeMap<usize, Status> {
        &self.results
    }

    fn item_rows(&self, item: usize) -> Option<ItemRows> {
        self.tablets.get(item).map(|tablet| ItemRows {
            positions: tablet.positions(),
            max_time: tablet.max_time(),
        })
    }

    fn slot_shape(&self, slot: usize) -> Option<SlotShape> {
        self.tablets.get(slot).map(|tablet| SlotShape {
            row_count: tablet.row_count(),
            max_time: tablet.max_time(),
        })
    }
}

impl RowBatch for InsertRowsPlan {
    fn slot_count(&self) -> usize {
        self.rows.len()
    }

    fn item_slots(&self) -> Vec<usize> {
        (0..self.rows.len()).map(|i| self.row_index(i)).collect()
    }

    fn prior_results(&self) -> &BTreeMap<usize, Status> {
        &self.results
    }
}

impl RowBatch for CreateMultiTimeSeriesPlan {
    fn slot_count(&self) -> usize {
        self.paths.len()
    }

    fn item_slots(&self) -> Vec<usize> {
        (0..self.paths.len()).map(|i| self.index(i)).collect()
    }

    fn prior_results(&self) -> &BTreeMap<usize, Status> {
        &self.results
    }

    fn honors_redirect(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StatusCode;
    use assert_matches::assert_matches;
    use crate::plan::{InsertRowPlan, InsertTabletPlan, TsDataType, Value};

    #[test]
    fn test_multi_tablet_items_map_to_parent_slots() {
        let tablet = InsertTabletPlan::new(
            "root.sg1.d1",
            vec!["s1".into()],
            vec![5, 9, 7],
            vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]],
        );
        let parent = InsertMultiTabletsPlan::new(vec![tablet.clone(), tablet.clone()]);
        assert_eq!(parent.slot_count(), 2);
        assert_eq!(
            parent.slot_shape(1),
            Some(SlotShape {
                row_count: 3,
                max_time: Some(9)
            })
        );

        let mut sub = InsertMultiTabletsPlan::new(vec![tablet.select_rows(&[0, 2])]);
        sub.parent_indices = vec![1];
        assert_eq!(sub.item_slots(), vec![1]);
        assert_eq!(
            sub.item_rows(0),
            Some(ItemRows {
                positions: vec![0, 2],
                max_time: Some(7)
            })
        );
    }

    #[test]
    fn test_fully_decided() {
        let mut plan = InsertRowsPlan::new(vec![
            InsertRowPlan::new("root.sg1.d1", 1, vec![], vec![]),
            InsertRowPlan::new("root.sg1.d2", 1, vec![], vec![]),
        ]);
        assert!(!plan.fully_decided());

        plan.results
            .insert(0, Status::new(StatusCode::NoPermission, "denied"));
        assert!(!plan.fully_decided());
        plan.results
            .insert(1, Status::new(StatusCode::NoPermission, "denied"));
        assert!(plan.fully_decided());
    }

    #[test]
    fn test_results_outside_the_batch_decide_nothing() {
        let mut plan = InsertRowsPlan::new(vec![
            InsertRowPlan::new("root.sg1.d1", 1, vec![], vec![]),
            InsertRowPlan::new("root.sg1.d2", 1, vec![], vec![]),
        ]);
        plan.results
            .insert(0, Status::new(StatusCode::NoPermission, "denied"));
        plan.results
            .insert(7, Status::new(StatusCode::NoPermission, "denied"));
        assert!(!plan.fully_decided());
        assert_matches!(plan.check_slots(), Err(Error::InvalidPlan(_)));
    }

    #[test]
    fn test_check_slots() {
        let mut plan = InsertRowsPlan::new(vec![
            InsertRowPlan::new("root.sg1.d1", 1, vec![], vec![]),
            InsertRowPlan::new("root.sg1.d2", 1, vec![], vec![]),
        ]);
        assert!(plan.check_slots().is_ok());

        plan.row_indices = vec![1, 0];
        assert!(plan.check_slots().is_ok());

        plan.row_indices = vec![1];
        assert_matches!(plan.check_slots(), Err(Error::InvalidPlan(_)));

        plan.row_indices = vec![0, 2];
        assert_matches!(plan.check_slots(), Err(Error::InvalidPlan(_)));

        let mut create = CreateMultiTimeSeriesPlan::new(
            vec!["root.sg1.d1.s1".into()],
            vec![TsDataType::Int64],
        );
        create.indices = vec![3];
        assert_matches!(create.check_slots(), Err(Error::InvalidPlan(_)));
    }

    #[test]
    fn test_create_multi_ignores_redirects() {
        let plan = CreateMultiTimeSeriesPlan::new(
            vec!["root.sg1.d1.s1".into()],
            vec![TsDataType::Int64],
        );
        assert!(!plan.honors_redirect());
        assert_eq!(plan.item_rows(0), None);
    }
}
