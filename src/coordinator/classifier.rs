//! Plan classification

use crate::plan::Plan;

/// Where a plan has to be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    /// Node-local bookkeeping, never forwarded
    Local,
    /// Applied identically on every metadata replica
    GlobalMeta,
    /// Applied on every data group
    GlobalData,
    /// Only the groups owning the plan's rows
    Partitioned,
}

/// Classify by plan kind alone; partition-table contents play no part.
pub fn classify(plan: &Plan) -> PlanScope {
    match plan {
        Plan::Local(_) => PlanScope::Local,
        Plan::SetStorageGroup(_) | Plan::DeleteStorageGroups(_) => PlanScope::GlobalMeta,
        Plan::DeleteTimeSeries(_) | Plan::SetTemplate(_) | Plan::Flush(_) => {
            PlanScope::GlobalData
        }
        Plan::InsertRow(_)
        | Plan::InsertTablet(_)
        | Plan::InsertMultiTablets(_)
        | Plan::InsertRows(_)
        | Plan::CreateTimeSeries(_)
        | Plan::CreateAlignedTimeSeries(_)
        | Plan::CreateMultiTimeSeries(_)
        | Plan::MembershipChange(_) => PlanScope::Partitioned,
    }
}
