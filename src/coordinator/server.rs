//! Coordinator server

use crate::cluster::{
    HashPlanRouter, HttpClientFactory, MemoryExecutor, MemorySchema, Node, PartitionTable,
    StandaloneMember, StorageGroupRegistry,
};
use crate::common::{Config, MetricsRegistry, Result};
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::{ClusterContext, Coordinator};
use std::sync::Arc;

/// Wire the in-memory collaborators for a node described by `config`.
pub fn standalone_context(config: &Config) -> ClusterContext {
    let settings = &config.coordinator;
    let this_node = Node::from(&config.node);
    let table = Arc::new(PartitionTable::from_config(&config.groups));
    let registry = Arc::new(StorageGroupRegistry::new());
    let schema = Arc::new(MemorySchema::new(
        registry.clone(),
        settings.storage_group_level,
    ));

    ClusterContext {
        router: Arc::new(HashPlanRouter::new(table.clone(), registry, settings)),
        member: Arc::new(StandaloneMember::new(
            this_node,
            table,
            schema.clone(),
            settings.enable_auto_create_schema,
        )),
        schema: schema.clone(),
        executor: Arc::new(MemoryExecutor::new(schema, settings.enable_auto_create_schema)),
        clients: Arc::new(HttpClientFactory::new()),
    }
}

pub struct CoordinatorServer {
    config: Config,
}

impl CoordinatorServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;
        let node = Node::from(&self.config.node);
        tracing::info!("Starting coordinator: {}", node);
        tracing::info!("  HTTP API: {}", self.config.server.bind_addr);
        tracing::info!("  Data groups: {}", self.config.groups.len());
        tracing::info!(
            "  Forwarding: {} client, {}ms timeout",
            if self.config.coordinator.use_async_server { "async" } else { "blocking" },
            self.config.coordinator.write_operation_timeout_ms
        );

        let coordinator = Coordinator::new(
            standalone_context(&self.config),
            self.config.coordinator.clone(),
            Arc::new(MetricsRegistry::new()),
        );
        let router = create_router(CoordState { coordinator }, self.config.server.max_body_bytes);

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_addr).await?;
        tracing::info!("Coordinator ready on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Coordinator stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
