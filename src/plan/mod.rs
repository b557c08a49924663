//! Typed mutation plans
//!
//! Plans arrive already compiled. The coordinator only needs their kind,
//! their target paths and, for row-reorderable batches, the row mapping
//! exposed through [`RowBatch`].

pub mod batch;
pub mod insert;
pub mod membership;
pub mod schema;

pub use batch::{ItemRows, RowBatch, SlotShape};
pub use insert::{InsertMultiTabletsPlan, InsertRowPlan, InsertRowsPlan, InsertTabletPlan};
pub use membership::{MembershipChange, MembershipChangeLog};
pub use schema::{
    CreateAlignedTimeSeriesPlan, CreateMultiTimeSeriesPlan, CreateTimeSeriesPlan,
    DeleteStorageGroupsPlan, DeleteTimeSeriesPlan, FlushPlan, SetStorageGroupPlan,
    SetTemplatePlan,
};

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl Value {
    /// Series type inferred when a write creates the series
    pub fn data_type(&self) -> TsDataType {
        match self {
            Value::Bool(_) => TsDataType::Boolean,
            Value::Int(_) => TsDataType::Int64,
            Value::Double(_) => TsDataType::Double,
            Value::Text(_) => TsDataType::Text,
        }
    }
}

/// Declared type of a time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TsDataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

/// Coarse plan kind used for routing decisions and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanKind {
    InsertRow,
    InsertTablet,
    InsertMultiTablet,
    InsertRows,
    CreateTimeSeries,
    CreateMultiTimeSeries,
    DeleteTimeSeries,
    SetTemplate,
    MembershipChangeLog,
    Other,
}

/// Commands that only touch this node's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LocalCommand {
    LoadConfiguration,
    ClearCache,
    KillQuery { query_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPlan {
    #[serde(flatten)]
    pub command: LocalCommand,
}

/// A non-query plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plan {
    InsertRow(InsertRowPlan),
    InsertTablet(InsertTabletPlan),
    InsertMultiTablets(InsertMultiTabletsPlan),
    InsertRows(InsertRowsPlan),
    CreateTimeSeries(CreateTimeSeriesPlan),
    CreateAlignedTimeSeries(CreateAlignedTimeSeriesPlan),
    CreateMultiTimeSeries(CreateMultiTimeSeriesPlan),
    DeleteTimeSeries(DeleteTimeSeriesPlan),
    SetTemplate(SetTemplatePlan),
    SetStorageGroup(SetStorageGroupPlan),
    DeleteStorageGroups(DeleteStorageGroupsPlan),
    Flush(FlushPlan),
    MembershipChange(MembershipChangeLog),
    Local(LocalPlan),
}

impl Plan {
    pub fn kind(&self) -> PlanKind {
        match self {
            Plan::InsertRow(_) => PlanKind::InsertRow,
            Plan::InsertTablet(_) => PlanKind::InsertTablet,
            Plan::InsertMultiTablets(_) => PlanKind::InsertMultiTablet,
            Plan::InsertRows(_) => PlanKind::InsertRows,
            Plan::CreateTimeSeries(_) | Plan::CreateAlignedTimeSeries(_) => {
                PlanKind::CreateTimeSeries
            }
            Plan::CreateMultiTimeSeries(_) => PlanKind::CreateMultiTimeSeries,
            Plan::DeleteTimeSeries(_) => PlanKind::DeleteTimeSeries,
            Plan::SetTemplate(_) => PlanKind::SetTemplate,
            Plan::MembershipChange(_) => PlanKind::MembershipChangeLog,
            Plan::SetStorageGroup(_)
            | Plan::DeleteStorageGroups(_)
            | Plan::Flush(_)
            | Plan::Local(_) => PlanKind::Other,
        }
    }

    /// Target paths in plan order (may be empty)
    pub fn paths(&self) -> Vec<String> {
        match self {
            Plan::InsertRow(p) => p.paths(),
            Plan::InsertTablet(p) => p.paths(),
            Plan::InsertMultiTablets(p) => p.tablets.iter().flat_map(|t| t.paths()).collect(),
            Plan::InsertRows(p) => p.rows.iter().flat_map(|r| r.paths()).collect(),
            Plan::CreateTimeSeries(p) => vec![p.path.clone()],
            Plan::CreateAlignedTimeSeries(p) => p.paths(),
            Plan::CreateMultiTimeSeries(p) => p.paths.clone(),
            Plan::DeleteTimeSeries(p) => p.paths.clone(),
            Plan::SetTemplate(p) => vec![p.prefix_path.clone()],
            Plan::SetStorageGroup(p) => vec![p.path.clone()],
            Plan::DeleteStorageGroups(p) => p.paths.clone(),
            Plan::Flush(p) => p.storage_groups.clone(),
            Plan::MembershipChange(_) | Plan::Local(_) => Vec::new(),
        }
    }

    /// Plans whose missing schema may be created on first use
    pub fn is_auto_create_eligible(&self) -> bool {
        matches!(
            self,
            Plan::InsertRow(_)
                | Plan::InsertTablet(_)
                | Plan::InsertMultiTablets(_)
                | Plan::InsertRows(_)
                | Plan::CreateTimeSeries(_)
                | Plan::CreateAlignedTimeSeries(_)
                | Plan::CreateMultiTimeSeries(_)
        )
    }

    /// Reject plans whose rows, columns or slot bookkeeping disagree, before
    /// any of them is routed.
    pub fn check(&self) -> Result<()> {
        match self {
            Plan::InsertTablet(p) => p.check_shape()?,
            Plan::InsertMultiTablets(p) => {
                for tablet in &p.tablets {
                    tablet.check_shape()?;
                }
            }
            Plan::CreateMultiTimeSeries(p) if p.data_types.len() != p.paths.len() => {
                return Err(Error::InvalidPlan(format!(
                    "{} paths but {} data types",
                    p.paths.len(),
                    p.data_types.len()
                )));
            }
            _ => {}
        }
        match self.as_row_batch() {
            Some(batch) => batch.check_slots(),
            None => Ok(()),
        }
    }

    /// The row-reorderable batch view of this plan, if it is one
    pub fn as_row_batch(&self) -> Option<&dyn RowBatch> {
        match self {
            Plan::InsertMultiTablets(p) => Some(p),
            Plan::InsertRows(p) => Some(p),
            Plan::CreateMultiTimeSeries(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::InsertRow(p) => write!(f, "InsertRow({} @{})", p.device, p.time),
            Plan::InsertTablet(p) => {
                write!(f, "InsertTablet({}, {} rows)", p.device, p.row_count())
            }
            Plan::InsertMultiTablets(p) => {
                write!(f, "InsertMultiTablets({} tablets)", p.tablets.len())
            }
            Plan::InsertRows(p) => write!(f, "InsertRows({} rows)", p.rows.len()),
            Plan::CreateTimeSeries(p) => write!(f, "CreateTimeSeries({})", p.path),
            Plan::CreateAlignedTimeSeries(p) => {
                write!(f, "CreateAlignedTimeSeries({})", p.device)
            }
            Plan::CreateMultiTimeSeries(p) => {
                write!(f, "CreateMultiTimeSeries({} paths)", p.paths.len())
            }
            Plan::DeleteTimeSeries(p) => write!(f, "DeleteTimeSeries({:?})", p.paths),
            Plan::SetTemplate(p) => write!(f, "SetTemplate({} on {})", p.template, p.prefix_path),
            Plan::SetStorageGroup(p) => write!(f, "SetStorageGroup({})", p.path),
            Plan::DeleteStorageGroups(p) => write!(f, "DeleteStorageGroups({:?})", p.paths),
            Plan::Flush(p) => write!(f, "Flush({:?})", p.storage_groups),
            Plan::MembershipChange(log) => write!(f, "{}", log),
            Plan::Local(p) => write!(f, "Local({:?})", p.command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_plan_json_is_tagged() {
        let plan = Plan::CreateTimeSeries(CreateTimeSeriesPlan {
            path: "root.sg1.d1.s1".into(),
            data_type: TsDataType::Double,
        });
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["type"], "create_time_series");
        assert_eq!(json["data_type"], "DOUBLE");

        let decoded: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, plan);
    }

    #[test]
    fn test_local_plan_json() {
        let json = r#"{"type":"local","command":"kill_query","query_id":7}"#;
        let plan: Plan = serde_json::from_str(json).unwrap();
        assert_eq!(
            plan,
            Plan::Local(LocalPlan {
                command: LocalCommand::KillQuery { query_id: 7 }
            })
        );
        assert_eq!(plan.kind(), PlanKind::Other);
        assert!(plan.paths().is_empty());
    }

    #[test]
    fn test_batch_view() {
        let rows = Plan::InsertRows(InsertRowsPlan::new(vec![InsertRowPlan::new(
            "root.sg1.d1",
            1,
            vec!["s1".into()],
            vec![Value::Int(1)],
        )]));
        assert!(rows.as_row_batch().is_some());
        assert!(rows.is_auto_create_eligible());

        let delete = Plan::DeleteTimeSeries(DeleteTimeSeriesPlan {
            paths: vec!["root.sg1.**".into()],
        });
        assert!(delete.as_row_batch().is_none());
        assert!(!delete.is_auto_create_eligible());
    }

    #[test]
    fn test_check() {
        let tablet = InsertTabletPlan::new(
            "root.sg1.d1",
            vec!["s1".into()],
            vec![1, 2],
            vec![vec![Value::Int(1), Value::Int(2)]],
        );
        assert!(Plan::InsertTablet(tablet.clone()).check().is_ok());

        let mut broken = tablet.clone();
        broken.row_positions = vec![0];
        let multi = Plan::InsertMultiTablets(InsertMultiTabletsPlan::new(vec![tablet, broken]));
        assert_matches!(multi.check(), Err(Error::InvalidPlan(_)));

        let create = Plan::CreateMultiTimeSeries(CreateMultiTimeSeriesPlan::new(
            vec!["root.sg1.d1.s1".into(), "root.sg1.d1.s2".into()],
            vec![TsDataType::Int64],
        ));
        assert_matches!(create.check(), Err(Error::InvalidPlan(_)));

        assert!(Plan::Flush(FlushPlan::default()).check().is_ok());
    }
}
