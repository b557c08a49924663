//! Schema and storage-group plans

use super::TsDataType;
use crate::common::Status;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTimeSeriesPlan {
    pub path: String,
    pub data_type: TsDataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAlignedTimeSeriesPlan {
    pub device: String,
    pub measurements: Vec<String>,
    pub data_types: Vec<TsDataType>,
}

impl CreateAlignedTimeSeriesPlan {
    pub fn paths(&self) -> Vec<String> {
        self.measurements
            .iter()
            .map(|m| format!("{}.{}", self.device, m))
            .collect()
    }
}

/// Many independent series, one result slot per path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMultiTimeSeriesPlan {
    pub paths: Vec<String>,
    pub data_types: Vec<TsDataType>,
    /// Slot of each path in the client's original plan (empty: identity)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<usize, Status>,
}

impl CreateMultiTimeSeriesPlan {
    pub fn new(paths: Vec<String>, data_types: Vec<TsDataType>) -> Self {
        Self {
            paths,
            data_types,
            indices: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    pub fn index(&self, i: usize) -> usize {
        self.indices.get(i).copied().unwrap_or(i)
    }
}

/// Delete series; paths may contain `*` / `**`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTimeSeriesPlan {
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTemplatePlan {
    pub template: String,
    pub prefix_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStorageGroupPlan {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStorageGroupsPlan {
    pub paths: Vec<String>,
}

/// Flush memtables; empty means every storage group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushPlan {
    #[serde(default)]
    pub storage_groups: Vec<String>,
}
