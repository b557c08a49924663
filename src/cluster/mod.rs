//! Cluster topology and the collaborators the coordinator talks to

pub mod member;
pub mod partition;
pub mod router;
pub mod standalone;
pub mod transport;

pub use member::{LocalExecutor, MetaGroupMember, PlanRouter, SchemaProcessor};
pub use partition::{Node, PartitionGroup, PartitionTable, PlanGroupMap, RaftNode};
pub use router::HashPlanRouter;
pub use standalone::{MemoryExecutor, MemorySchema, StandaloneMember, StorageGroupRegistry};
pub use transport::{ClientFactory, DataClient, ExecuteRequest, HttpClientFactory, SyncDataClient};
