//! Outbound data-plan transport
//!
//! A remote group member exposes `POST /internal/groups/{raft_id}/execute`,
//! taking an [`ExecuteRequest`] and answering with a [`Status`].

use super::partition::{Node, RaftNode};
use crate::common::{Error, Result, Status};
use crate::plan::Plan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Body of an internal execute call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub header: RaftNode,
    pub plan: Plan,
}

#[async_trait]
pub trait DataClient: Send + Sync {
    async fn execute_non_query(&self, header: &RaftNode, plan: &Plan) -> Result<Status>;
}

/// Blocking flavour, driven from a blocking thread.
pub trait SyncDataClient: Send + Sync {
    fn execute_non_query(&self, header: &RaftNode, plan: &Plan) -> Result<Status>;
}

pub trait ClientFactory: Send + Sync {
    fn async_client(&self, node: &Node, timeout: Duration) -> Result<Arc<dyn DataClient>>;

    fn sync_client(&self, node: &Node, timeout: Duration) -> Result<Arc<dyn SyncDataClient>>;
}

fn execute_url(node: &Node, header: &RaftNode) -> String {
    format!("{}/internal/groups/{}/execute", node.data_url(), header.raft_id)
}

fn classify_send_error(node: &Node, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("request to {} timed out", node))
    } else if e.is_connect() {
        Error::Transport(format!("cannot connect to {}: {}", node, e))
    } else {
        Error::HttpClient(e)
    }
}

/// HTTP transport backed by `reqwest`
#[derive(Clone, Default)]
pub struct HttpClientFactory {
    client: reqwest::Client,
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientFactory for HttpClientFactory {
    fn async_client(&self, node: &Node, timeout: Duration) -> Result<Arc<dyn DataClient>> {
        Ok(Arc::new(HttpDataClient {
            client: self.client.clone(),
            node: node.clone(),
            timeout,
        }))
    }

    fn sync_client(&self, node: &Node, timeout: Duration) -> Result<Arc<dyn SyncDataClient>> {
        Ok(Arc::new(HttpSyncDataClient {
            node: node.clone(),
            timeout,
        }))
    }
}

pub struct HttpDataClient {
    client: reqwest::Client,
    node: Node,
    timeout: Duration,
}

#[async_trait]
impl DataClient for HttpDataClient {
    async fn execute_non_query(&self, header: &RaftNode, plan: &Plan) -> Result<Status> {
        let request = ExecuteRequest {
            header: header.clone(),
            plan: plan.clone(),
        };

        let response = self
            .client
            .post(execute_url(&self.node, header))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_send_error(&self.node, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "{} answered {}: {}",
                self.node, status, text
            )));
        }

        Ok(response.json::<Status>().await?)
    }
}

/// Blocking client; a fresh `reqwest::blocking::Client` is built per call so
/// it never outlives the blocking thread that drives it.
pub struct HttpSyncDataClient {
    node: Node,
    timeout: Duration,
}

impl SyncDataClient for HttpSyncDataClient {
    fn execute_non_query(&self, header: &RaftNode, plan: &Plan) -> Result<Status> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let request = ExecuteRequest {
            header: header.clone(),
            plan: plan.clone(),
        };

        let response = client
            .post(execute_url(&self.node, header))
            .json(&request)
            .send()
            .map_err(|e| classify_send_error(&self.node, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(Error::Transport(format!(
                "{} answered {}: {}",
                self.node, status, text
            )));
        }

        Ok(response.json::<Status>()?)
    }
}
