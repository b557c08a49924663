//! Cluster membership-change log records

use crate::cluster::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "node", rename_all = "snake_case")]
pub enum MembershipChange {
    AddNode(Node),
    RemoveNode(Node),
}

/// A committed meta-group log entry that every data group must apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChangeLog {
    pub change: MembershipChange,
    pub term: u64,
    pub index: u64,
}

impl MembershipChangeLog {
    pub fn new(change: MembershipChange, term: u64, index: u64) -> Self {
        Self {
            change,
            term,
            index,
        }
    }

    pub fn node(&self) -> &Node {
        match &self.change {
            MembershipChange::AddNode(node) | MembershipChange::RemoveNode(node) => node,
        }
    }
}

impl fmt::Display for MembershipChangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.change {
            MembershipChange::AddNode(_) => "AddNode",
            MembershipChange::RemoveNode(_) => "RemoveNode",
        };
        write!(
            f,
            "{}({}) [term {}, index {}]",
            action,
            self.node(),
            self.term,
            self.index
        )
    }
}
