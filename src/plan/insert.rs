//! Insert plans

use super::Value;
use crate::common::{Error, Result, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn full_paths(device: &str, measurements: &[String]) -> Vec<String> {
    measurements
        .iter()
        .map(|m| format!("{}.{}", device, m))
        .collect()
}

/// One row of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowPlan {
    pub device: String,
    pub time: i64,
    pub measurements: Vec<String>,
    pub values: Vec<Value>,
}

impl InsertRowPlan {
    pub fn new(
        device: impl Into<String>,
        time: i64,
        measurements: Vec<String>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            device: device.into(),
            time,
            measurements,
            values,
        }
    }

    pub fn paths(&self) -> Vec<String> {
        full_paths(&self.device, &self.measurements)
    }
}

/// Column-oriented rows of one device.
///
/// `columns[m][r]` is the value of measurement `m` at `times[r]`. A tablet cut
/// out of a larger one records in `row_positions` where each of its rows sits
/// in the original tablet; an empty list means the rows are the original ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertTabletPlan {
    pub device: String,
    pub measurements: Vec<String>,
    pub times: Vec<i64>,
    pub columns: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_positions: Vec<usize>,
}

impl InsertTabletPlan {
    pub fn new(
        device: impl Into<String>,
        measurements: Vec<String>,
        times: Vec<i64>,
        columns: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            device: device.into(),
            measurements,
            times,
            columns,
            row_positions: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.times.len()
    }

    pub fn paths(&self) -> Vec<String> {
        full_paths(&self.device, &self.measurements)
    }

    pub fn max_time(&self) -> Option<i64> {
        self.times.iter().copied().max()
    }

    /// Position of every row in the original tablet
    pub fn positions(&self) -> Vec<usize> {
        if self.row_positions.is_empty() {
            (0..self.row_count()).collect()
        } else {
            self.row_positions.clone()
        }
    }

    /// Every column and the position list must have one entry per row.
    pub fn check_shape(&self) -> Result<()> {
        let rows = self.row_count();
        if !self.row_positions.is_empty() && self.row_positions.len() != rows {
            return Err(Error::InvalidPlan(format!(
                "tablet of {} has {} rows but {} row positions",
                self.device,
                rows,
                self.row_positions.len()
            )));
        }
        if self.columns.len() != self.measurements.len() {
            return Err(Error::InvalidPlan(format!(
                "tablet of {} has {} measurements but {} columns",
                self.device,
                self.measurements.len(),
                self.columns.len()
            )));
        }
        if let Some((m, column)) = self
            .columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.len() != rows)
        {
            return Err(Error::InvalidPlan(format!(
                "column {} of {} has {} values for {} rows",
                self.measurements[m],
                self.device,
                column.len(),
                rows
            )));
        }
        Ok(())
    }

    /// Cut out `rows` (indices into this tablet) as a new tablet that still
    /// knows its rows' original positions. Indices past the end are skipped.
    pub fn select_rows(&self, rows: &[usize]) -> InsertTabletPlan {
        let positions = self.positions();
        InsertTabletPlan {
            device: self.device.clone(),
            measurements: self.measurements.clone(),
            times: rows.iter().filter_map(|&r| self.times.get(r).copied()).collect(),
            columns: self
                .columns
                .iter()
                .map(|column| {
                    rows.iter()
                        .filter_map(|&r| column.get(r).cloned())
                        .collect()
                })
                .collect(),
            row_positions: rows
                .iter()
                .filter_map(|&r| positions.get(r).copied())
                .collect(),
        }
    }
}

/// Several tablets executed as one batch, one result slot per tablet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertMultiTabletsPlan {
    pub tablets: Vec<InsertTabletPlan>,
    /// Slot of each tablet in the client's original plan (empty: identity)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_indices: Vec<usize>,
    /// Slots already decided before dispatch
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<usize, Status>,
}

impl InsertMultiTabletsPlan {
    pub fn new(tablets: Vec<InsertTabletPlan>) -> Self {
        Self {
            tablets,
            parent_indices: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    pub fn parent_index(&self, i: usize) -> usize {
        self.parent_indices.get(i).copied().unwrap_or(i)
    }
}

/// Independent rows, possibly of different devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowsPlan {
    pub rows: Vec<InsertRowPlan>,
    /// Slot of each row in the client's original plan (empty: identity)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<usize, Status>,
}

impl InsertRowsPlan {
    pub fn new(rows: Vec<InsertRowPlan>) -> Self {
        Self {
            rows,
            row_indices: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    pub fn row_index(&self, i: usize) -> usize {
        self.row_indices.get(i).copied().unwrap_or(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tablet() -> InsertTabletPlan {
        InsertTabletPlan::new(
            "root.sg1.d1",
            vec!["s1".into(), "s2".into()],
            vec![10, 20, 30, 40],
            vec![
                vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
                vec![
                    Value::Bool(true),
                    Value::Bool(false),
                    Value::Bool(true),
                    Value::Bool(false),
                ],
            ],
        )
    }

    #[test]
    fn test_select_rows_tracks_positions() {
        let t = tablet();
        let part = t.select_rows(&[1, 3]);
        assert_eq!(part.times, vec![20, 40]);
        assert_eq!(part.columns[0], vec![Value::Int(2), Value::Int(4)]);
        assert_eq!(part.positions(), vec![1, 3]);
        assert_eq!(part.max_time(), Some(40));

        // Cutting a cut keeps positions relative to the original tablet.
        let again = part.select_rows(&[1]);
        assert_eq!(again.positions(), vec![3]);
    }

    #[test]
    fn test_check_shape() {
        assert!(tablet().check_shape().is_ok());
        assert!(tablet().select_rows(&[0, 2]).check_shape().is_ok());

        let mut short_positions = tablet();
        short_positions.row_positions = vec![0];
        assert_matches!(short_positions.check_shape(), Err(Error::InvalidPlan(_)));

        let mut short_column = tablet();
        short_column.columns[1].pop();
        assert_matches!(short_column.check_shape(), Err(Error::InvalidPlan(_)));

        let mut missing_column = tablet();
        missing_column.columns.pop();
        assert_matches!(missing_column.check_shape(), Err(Error::InvalidPlan(_)));
    }

    #[test]
    fn test_select_rows_skips_unknown_rows() {
        let mut t = tablet();
        t.row_positions = vec![5];
        let part = t.select_rows(&[0, 3, 9]);
        assert_eq!(part.times, vec![10, 40]);
        assert_eq!(part.row_positions, vec![5]);
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            tablet().paths(),
            vec!["root.sg1.d1.s1".to_string(), "root.sg1.d1.s2".to_string()]
        );
    }

    #[test]
    fn test_identity_indices() {
        let plan = InsertMultiTabletsPlan::new(vec![tablet(), tablet()]);
        assert_eq!(plan.parent_index(1), 1);

        let mut rows = InsertRowsPlan::new(vec![]);
        rows.row_indices = vec![4, 7];
        assert_eq!(rows.row_index(1), 7);
    }
}
