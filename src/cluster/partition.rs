//! Cluster topology snapshots

use crate::common::config::{GroupConfig, NodeConfig};
use crate::common::EndPoint;
use crate::plan::Plan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One cluster node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: i32,
    pub internal_ip: String,
    pub data_port: u16,
    pub client_ip: String,
    pub client_port: u16,
}

impl Node {
    /// Endpoint clients should use to reach this node
    pub fn client_endpoint(&self) -> EndPoint {
        EndPoint::new(self.client_ip.clone(), self.client_port)
    }

    /// Base URL of this node's internal data API
    pub fn data_url(&self) -> String {
        format!("http://{}:{}", self.internal_ip, self.data_port)
    }
}

impl From<&NodeConfig> for Node {
    fn from(config: &NodeConfig) -> Self {
        Self {
            id: config.id,
            internal_ip: config.internal_ip.clone(),
            data_port: config.data_port,
            client_ip: config.client_ip.clone(),
            client_port: config.client_port,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}, {}:{})", self.id, self.internal_ip, self.data_port)
    }
}

/// Header identifying a data group: its first node plus the raft id
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaftNode {
    pub node: Node,
    pub raft_id: i32,
}

impl fmt::Display for RaftNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}#{}", self.node.id, self.raft_id)
    }
}

/// Nodes replicating one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionGroup {
    pub raft_id: i32,
    pub nodes: Vec<Node>,
}

impl PartitionGroup {
    pub fn new(raft_id: i32, nodes: Vec<Node>) -> Self {
        Self { raft_id, nodes }
    }

    pub fn header(&self) -> RaftNode {
        RaftNode {
            node: self.nodes.first().cloned().unwrap_or_default(),
            raft_id: self.raft_id,
        }
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.iter().any(|n| n.id == node.id)
    }
}

impl From<&GroupConfig> for PartitionGroup {
    fn from(config: &GroupConfig) -> Self {
        Self::new(config.raft_id, config.members.iter().map(Node::from).collect())
    }
}

impl fmt::Display for PartitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.header())?;
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", node.id)?;
        }
        write!(f, "]")
    }
}

/// Snapshot of the data groups known to this node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    groups: Vec<PartitionGroup>,
}

impl PartitionTable {
    pub fn new(groups: Vec<PartitionGroup>) -> Self {
        Self { groups }
    }

    pub fn from_config(groups: &[GroupConfig]) -> Self {
        Self::new(groups.iter().map(PartitionGroup::from).collect())
    }

    /// Every data group, in raft-id order of configuration
    pub fn global_groups(&self) -> &[PartitionGroup] {
        &self.groups
    }

    pub fn group(&self, raft_id: i32) -> Option<&PartitionGroup> {
        self.groups.iter().find(|g| g.raft_id == raft_id)
    }

    /// Groups in which `node` is a replica
    pub fn groups_of(&self, node: &Node) -> Vec<&PartitionGroup> {
        self.groups.iter().filter(|g| g.contains(node)).collect()
    }
}

/// Sub-plans paired with the group that must execute each one, in dispatch
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanGroupMap {
    entries: Vec<(Plan, PartitionGroup)>,
}

impl PlanGroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, plan: Plan, group: PartitionGroup) {
        self.entries.push((plan, group));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Plan, PartitionGroup)> {
        self.entries.iter()
    }

    pub fn groups(&self) -> impl Iterator<Item = &PartitionGroup> {
        self.entries.iter().map(|(_, g)| g)
    }
}

impl FromIterator<(Plan, PartitionGroup)> for PlanGroupMap {
    fn from_iter<I: IntoIterator<Item = (Plan, PartitionGroup)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PlanGroupMap {
    type Item = (Plan, PartitionGroup);
    type IntoIter = std::vec::IntoIter<(Plan, PartitionGroup)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i32) -> Node {
        Node {
            id,
            internal_ip: format!("10.0.0.{}", id),
            data_port: 40010,
            client_ip: format!("192.168.0.{}", id),
            client_port: 6667,
        }
    }

    #[test]
    fn test_header_is_first_node() {
        let group = PartitionGroup::new(3, vec![node(2), node(5)]);
        let header = group.header();
        assert_eq!(header.node.id, 2);
        assert_eq!(header.raft_id, 3);
        assert_eq!(header.to_string(), "node-2#3");
        assert!(group.contains(&node(5)));
        assert!(!group.contains(&node(1)));
    }

    #[test]
    fn test_client_endpoint() {
        let ep = node(4).client_endpoint();
        assert_eq!(ep.to_string(), "192.168.0.4:6667");
        assert_eq!(node(4).data_url(), "http://10.0.0.4:40010");
    }

    #[test]
    fn test_groups_of() {
        let table = PartitionTable::new(vec![
            PartitionGroup::new(0, vec![node(1), node(2)]),
            PartitionGroup::new(1, vec![node(2), node(3)]),
        ]);
        assert_eq!(table.groups_of(&node(2)).len(), 2);
        assert_eq!(table.groups_of(&node(3)).len(), 1);
        assert!(table.group(1).is_some());
        assert!(table.group(9).is_none());
    }
}
