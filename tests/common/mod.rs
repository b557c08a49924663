//! Scripted collaborators shared by the coordinator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use minits::cluster::{
    ClientFactory, DataClient, LocalExecutor, MetaGroupMember, Node, PartitionGroup,
    PartitionTable, PlanGroupMap, PlanRouter, RaftNode, SchemaProcessor, SyncDataClient,
};
use minits::common::{CoordinatorConfig, MetricsRegistry};
use minits::coordinator::ClusterContext;
use minits::plan::{MembershipChangeLog, Plan};
use minits::{Coordinator, Error, Result, Status};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn node(id: i32) -> Node {
    Node {
        id,
        internal_ip: format!("10.0.0.{}", id),
        data_port: 40010,
        client_ip: format!("192.168.0.{}", id),
        client_port: 6667,
    }
}

pub fn group(raft_id: i32, ids: &[i32]) -> PartitionGroup {
    PartitionGroup::new(raft_id, ids.iter().map(|&id| node(id)).collect())
}

pub fn fail(code: minits::StatusCode, message: &str) -> Status {
    Status::new(code, message)
}

type SplitFn = dyn Fn(&Plan, usize) -> Result<PlanGroupMap> + Send + Sync;

/// Router whose answer depends on the plan and on how many times it was asked
pub struct ScriptedRouter {
    split: Box<SplitFn>,
    groups: Vec<PartitionGroup>,
    calls: AtomicUsize,
}

impl ScriptedRouter {
    pub fn new(split: impl Fn(&Plan, usize) -> Result<PlanGroupMap> + Send + Sync + 'static) -> Self {
        Self {
            split: Box::new(split),
            groups: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Route every plan unchanged to `map`'s groups
    pub fn fixed(map: Vec<(Plan, PartitionGroup)>) -> Self {
        Self::new(move |_, _| Ok(map.clone().into_iter().collect()))
    }

    /// Groups receiving membership-change logs
    pub fn with_groups(mut self, groups: Vec<PartitionGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlanRouter for ScriptedRouter {
    fn split(&self, plan: &Plan) -> Result<PlanGroupMap> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.split)(plan, call)
    }

    fn split_membership_change(&self, log: &MembershipChangeLog) -> Result<PlanGroupMap> {
        Ok(self
            .groups
            .iter()
            .map(|group| (Plan::MembershipChange(log.clone()), group.clone()))
            .collect())
    }
}

type LocalFn = dyn Fn(&RaftNode, &Plan, usize) -> Status + Send + Sync;

/// Membership layer that records every call it receives
pub struct RecordingMember {
    this_node: Node,
    table: Option<Arc<PartitionTable>>,
    pub sync_results: Mutex<Vec<Result<()>>>,
    pub events: Mutex<Vec<String>>,
    local: Box<LocalFn>,
    local_calls: AtomicUsize,
}

impl RecordingMember {
    pub fn new(this_node: Node, groups: Vec<PartitionGroup>) -> Self {
        Self {
            this_node,
            table: Some(Arc::new(PartitionTable::new(groups))),
            sync_results: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            local: Box::new(|_, _, _| Status::ok()),
            local_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_table(mut self) -> Self {
        self.table = None;
        self
    }

    /// Answer local executions with `local(header, plan, attempt)`
    pub fn with_local(
        mut self,
        local: impl Fn(&RaftNode, &Plan, usize) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.local = Box::new(local);
        self
    }

    /// Results of the next `sync_with_leader` calls, in order; `Ok` after that
    pub fn with_sync_results(self, results: Vec<Result<()>>) -> Self {
        *self.sync_results.lock().unwrap() = results;
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn local_calls(&self) -> usize {
        self.local_calls.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl MetaGroupMember for RecordingMember {
    fn this_node(&self) -> &Node {
        &self.this_node
    }

    fn partition_table(&self) -> Option<Arc<PartitionTable>> {
        self.table.clone()
    }

    fn leader(&self) -> Option<Node> {
        Some(node(100))
    }

    async fn wait_leader(&self) -> Result<Node> {
        Ok(node(100))
    }

    async fn sync_with_leader(&self, force_consistency_check: bool) -> Result<()> {
        self.record(format!("sync({})", force_consistency_check));
        let mut results = self.sync_results.lock().unwrap();
        if results.is_empty() {
            Ok(())
        } else {
            results.remove(0)
        }
    }

    async fn forward_to_leader(&self, plan: &Plan, leader: &Node) -> Status {
        self.record(format!("forward_to_leader({:?}, {})", plan.kind(), leader.id));
        Status::ok()
    }

    async fn process_non_partitioned_meta_plan(&self, plan: &Plan) -> Status {
        self.record(format!("meta({:?})", plan.kind()));
        Status::ok()
    }

    async fn execute_in_local_group(&self, header: &RaftNode, plan: &Plan) -> Status {
        let attempt = self.local_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("local({})", header.raft_id));
        (self.local)(header, plan, attempt)
    }
}

/// Schema processor with canned answers
#[derive(Default)]
pub struct FakeSchema {
    /// Paths a wildcard deletion resolves to; empty means nothing matches
    pub full_paths: Vec<String>,
    pub consistency_failure: bool,
    pub storage_group_missing: bool,
    pub fail_create: bool,
    pub create_calls: AtomicUsize,
}

impl FakeSchema {
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaProcessor for FakeSchema {
    async fn convert_to_full_paths(&self, plan: &Plan) -> Result<Plan> {
        if self.consistency_failure {
            return Err(Error::ConsistencyFailure("stale metadata".into()));
        }
        match plan {
            Plan::DeleteTimeSeries(_) if self.full_paths.is_empty() => {
                Err(Error::PathNotExist(plan.paths().join(",")))
            }
            Plan::DeleteTimeSeries(delete) => {
                let mut delete = delete.clone();
                delete.paths = self.full_paths.clone();
                Ok(Plan::DeleteTimeSeries(delete))
            }
            _ => Ok(plan.clone()),
        }
    }

    async fn create_schema(&self, _plan: &Plan) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(Error::Metadata("cannot create schema".into()));
        }
        Ok(())
    }

    async fn belonged_storage_group(&self, path: &str) -> Result<String> {
        if self.storage_group_missing {
            Err(Error::StorageGroupNotSet(path.to_string()))
        } else {
            Ok("root.sg1".to_string())
        }
    }
}

type ExecFn = dyn Fn(&Plan) -> Result<bool> + Send + Sync;

pub struct FakeExecutor {
    exec: Box<ExecFn>,
}

impl FakeExecutor {
    pub fn new(exec: impl Fn(&Plan) -> Result<bool> + Send + Sync + 'static) -> Self {
        Self {
            exec: Box::new(exec),
        }
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new(|_| Ok(true))
    }
}

#[async_trait]
impl LocalExecutor for FakeExecutor {
    async fn process_non_query(&self, plan: &Plan) -> Result<bool> {
        (self.exec)(plan)
    }
}

type RespondFn = dyn Fn(&Node, &RaftNode, &Plan) -> Result<Status> + Send + Sync;

/// Remote group members answering from a script. Nodes listed in `slow`
/// take that long before answering.
pub struct ScriptedClients {
    respond: Arc<RespondFn>,
    slow: Vec<(i32, Duration)>,
    calls: Arc<Mutex<Vec<(i32, i32)>>>,
}

impl ScriptedClients {
    pub fn new(
        respond: impl Fn(&Node, &RaftNode, &Plan) -> Result<Status> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Arc::new(respond),
            slow: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ok() -> Self {
        Self::new(|_, _, _| Ok(Status::ok()))
    }

    pub fn with_slow(mut self, node_id: i32, delay: Duration) -> Self {
        self.slow.push((node_id, delay));
        self
    }

    /// `(node id, raft id)` of every call, in order
    pub fn calls(&self) -> Vec<(i32, i32)> {
        self.calls.lock().unwrap().clone()
    }

    fn client(&self, node: &Node) -> ScriptedClient {
        ScriptedClient {
            node: node.clone(),
            delay: self
                .slow
                .iter()
                .find(|(id, _)| *id == node.id)
                .map(|(_, delay)| *delay),
            respond: self.respond.clone(),
            calls: self.calls.clone(),
        }
    }
}

impl ClientFactory for ScriptedClients {
    fn async_client(&self, node: &Node, _timeout: Duration) -> Result<Arc<dyn DataClient>> {
        Ok(Arc::new(self.client(node)))
    }

    fn sync_client(&self, node: &Node, _timeout: Duration) -> Result<Arc<dyn SyncDataClient>> {
        Ok(Arc::new(self.client(node)))
    }
}

struct ScriptedClient {
    node: Node,
    delay: Option<Duration>,
    respond: Arc<RespondFn>,
    calls: Arc<Mutex<Vec<(i32, i32)>>>,
}

#[async_trait]
impl DataClient for ScriptedClient {
    async fn execute_non_query(&self, header: &RaftNode, plan: &Plan) -> Result<Status> {
        self.calls.lock().unwrap().push((self.node.id, header.raft_id));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(&self.node, header, plan)
    }
}

impl SyncDataClient for ScriptedClient {
    fn execute_non_query(&self, header: &RaftNode, plan: &Plan) -> Result<Status> {
        self.calls.lock().unwrap().push((self.node.id, header.raft_id));
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        (self.respond)(&self.node, header, plan)
    }
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        write_operation_timeout_ms: 100,
        retry_wait_ms: 10,
        ..Default::default()
    }
}

pub fn coordinator(
    router: Arc<ScriptedRouter>,
    member: Arc<RecordingMember>,
    schema: Arc<FakeSchema>,
    clients: Arc<ScriptedClients>,
    config: CoordinatorConfig,
) -> Coordinator {
    coordinator_with_executor(router, member, schema, clients, Arc::new(FakeExecutor::default()), config)
}

pub fn coordinator_with_executor(
    router: Arc<ScriptedRouter>,
    member: Arc<RecordingMember>,
    schema: Arc<FakeSchema>,
    clients: Arc<ScriptedClients>,
    executor: Arc<FakeExecutor>,
    config: CoordinatorConfig,
) -> Coordinator {
    Coordinator::new(
        ClusterContext {
            router,
            member,
            schema,
            executor,
            clients,
        },
        config,
        Arc::new(MetricsRegistry::new()),
    )
}
