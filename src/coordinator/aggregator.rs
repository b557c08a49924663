//! Result aggregation
//!
//! Folds the statuses returned by the contacted groups into the one status
//! the client sees. Non-batch plans only get group-level attribution; batch
//! plans are reconciled slot by slot (and row by row for tablets split across
//! groups) through the [`RowBatch`] capability.

use crate::cluster::RaftNode;
use crate::common::{EndPoint, Status, StatusCode};
use crate::plan::{Plan, RowBatch};
use std::collections::BTreeMap;
use tracing::{debug, error};

pub const MSG_MULTIPLE_ERROR: &str =
    "The following errors occurred when executing the query, please retry or contact the DBA: ";

/// `[code@header:message]`
pub fn group_error_fragment(status: &Status, header: &RaftNode) -> String {
    format!("[{}@{}:{}]", status.code, header, status.message)
}

/// Failure whose message lists every failing group's fragment in order
pub fn multiple_error(fragments: &[String]) -> Status {
    Status::new(
        StatusCode::ExecuteStatementError,
        format!("{}[{}]", MSG_MULTIPLE_ERROR, fragments.join(", ")),
    )
}

/// Code and message only
fn bare(status: &Status) -> Status {
    Status::new(status.code, status.message.clone())
}

fn is_failure(status: &Status) -> bool {
    !status.is_ok_or_redirect()
}

/// Combine per-group answers of a non-batch plan.
///
/// Success only if every group succeeded. The result is redirect-flavoured
/// only when every group answered with a redirect.
pub fn combine_group_statuses(results: &[(RaftNode, Status)]) -> Status {
    let mut fragments = Vec::new();
    let mut all_redirect = true;
    let mut endpoint: Option<EndPoint> = None;

    for (header, status) in results {
        match &status.redirect {
            Some(ep) => endpoint = Some(ep.clone()),
            None => all_redirect = false,
        }
        if is_failure(status) {
            fragments.push(group_error_fragment(status, header));
        }
    }

    if !fragments.is_empty() {
        return multiple_error(&fragments);
    }
    match endpoint {
        Some(ep) if all_redirect => Status::redirect(ep),
        _ => Status::ok(),
    }
}

/// Codes a broadcast of `plan` does not count as a group failure
fn tolerated(plan: &Plan, status: &Status) -> bool {
    match plan {
        Plan::SetTemplate(_) => status.is(StatusCode::DuplicatedTemplate),
        Plan::DeleteTimeSeries(_) => status.is(StatusCode::TimeseriesNotExist),
        _ => false,
    }
}

/// Combine the answers of a plan broadcast to every data group: any
/// non-tolerated failure fails the whole plan.
pub fn combine_broadcast(plan: &Plan, results: &[(RaftNode, Status)]) -> Status {
    let fragments: Vec<String> = results
        .iter()
        .filter(|(_, status)| is_failure(status) && !tolerated(plan, status))
        .map(|(header, status)| group_error_fragment(status, header))
        .collect();

    if fragments.is_empty() {
        Status::ok()
    } else {
        multiple_error(&fragments)
    }
}

/// Scatters per-group answers of a split batch back into the parent's slots.
pub struct BatchAggregator<'a> {
    parent: &'a dyn RowBatch,
    slots: Vec<Status>,
    /// Per-row arrays of slots whose rows were answered piecewise
    nested: BTreeMap<usize, Vec<Status>>,
    fragments: Vec<String>,
}

impl<'a> BatchAggregator<'a> {
    pub fn new(parent: &'a dyn RowBatch) -> Self {
        Self {
            parent,
            slots: vec![Status::ok(); parent.slot_count()],
            nested: BTreeMap::new(),
            fragments: Vec::new(),
        }
    }

    /// Fold in the answer `status` of group `header` for sub-plan `sub`.
    pub fn absorb(&mut self, sub: &dyn RowBatch, header: &RaftNode, status: &Status) {
        if is_failure(status) {
            self.fragments.push(group_error_fragment(status, header));
        }
        let redirect = status
            .redirect
            .clone()
            .filter(|_| self.parent.honors_redirect());

        for (item, slot) in sub.item_slots().into_iter().enumerate() {
            if slot >= self.slots.len() {
                error!(
                    slot,
                    slots = self.slots.len(),
                    header = %header,
                    "Sub-plan slot out of range"
                );
                continue;
            }

            let item_status = if status.is_batch_failure() {
                status
                    .sub_status
                    .as_ref()
                    .and_then(|sub_status| sub_status.get(item))
                    .cloned()
                    .unwrap_or_else(|| bare(status))
            } else {
                bare(status)
            };

            let rows = sub.item_rows(item);
            let shape = self.parent.slot_shape(slot);
            let redirect = match (&rows, &shape) {
                (Some(rows), Some(shape)) => {
                    redirect.clone().filter(|_| rows.max_time == shape.max_time)
                }
                _ => redirect.clone(),
            };

            match (rows, shape) {
                (Some(rows), Some(shape))
                    if rows.positions.len() != shape.row_count
                        || item_status.is_batch_failure() =>
                {
                    self.absorb_rows(slot, &rows.positions, shape.row_count, &item_status);
                    if let Some(ep) = redirect {
                        let current = &mut self.slots[slot];
                        if current.redirect.is_none() {
                            current.redirect = Some(ep);
                        }
                    }
                }
                _ => self.absorb_slot(slot, item_status, redirect),
            }
        }
    }

    fn absorb_slot(&mut self, slot: usize, item_status: Status, redirect: Option<EndPoint>) {
        let current = &mut self.slots[slot];
        if is_failure(&item_status) {
            *current = match redirect {
                Some(ep) => item_status.with_redirect(ep),
                None => item_status,
            };
        } else if let Some(ep) = redirect {
            // A success never replaces a failure already recorded here.
            if !is_failure(current) {
                *current = Status::ok().with_redirect(ep);
            }
        }
    }

    fn absorb_rows(
        &mut self,
        slot: usize,
        positions: &[usize],
        row_count: usize,
        item_status: &Status,
    ) {
        let rows = self
            .nested
            .entry(slot)
            .or_insert_with(|| vec![Status::ok(); row_count]);

        for (k, &pos) in positions.iter().enumerate() {
            if pos >= rows.len() {
                error!(slot, pos, row_count, "Tablet row position out of range");
                continue;
            }
            let row_status = if item_status.is_batch_failure() {
                item_status
                    .sub_status
                    .as_ref()
                    .and_then(|sub_status| sub_status.get(k))
                    .cloned()
                    .unwrap_or_else(|| bare(item_status))
            } else {
                bare(item_status)
            };
            if is_failure(&row_status) {
                rows[pos] = row_status;
            }
        }
    }

    /// Group fragments of every failed group, in absorption order
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn conclude(mut self) -> Status {
        for (slot, rows) in std::mem::take(&mut self.nested) {
            if rows.iter().any(is_failure) {
                let redirect = self.slots[slot].redirect.take();
                let mut status = Status::batch(rows);
                status.redirect = redirect;
                self.slots[slot] = status;
            }
        }

        // Results decided before dispatch always win.
        for (&slot, prior) in self.parent.prior_results() {
            match self.slots.get_mut(slot) {
                Some(current) => *current = prior.clone(),
                None => error!(slot, "Prior result slot out of range"),
            }
        }

        if !self.fragments.is_empty() {
            debug!(fragments = ?self.fragments, "Batch groups reported failures");
        }

        if self.slots.iter().any(is_failure) {
            return Status::batch(self.slots);
        }

        let endpoints: Vec<&EndPoint> = self
            .slots
            .iter()
            .filter_map(|s| s.redirect.as_ref())
            .collect();
        let Some(&first) = endpoints.first() else {
            return Status::ok();
        };
        let common = endpoints
            .iter()
            .all(|ep| *ep == first)
            .then(|| first.clone());

        let mut status = Status::new(StatusCode::NeedRedirection, "");
        status.redirect = common;
        status.sub_status = Some(self.slots);
        status
    }
}
