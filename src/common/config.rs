//! Configuration for minits components
//!
//! Values come from an optional TOML file, then `MINITS_`-prefixed environment
//! variables (nested keys separated by `__`), then CLI flags.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// File read when no configuration path is given
pub const DEFAULT_CONFIG_FILE: &str = "minits.toml";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This node
    #[serde(default)]
    pub node: NodeConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Write coordination settings
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Static data groups used by the standalone runtime
    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            server: ServerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            groups: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path` (optional) layered with the environment.
    pub fn from_sources(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("MINITS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Load from a file that must exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::InvalidConfig(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Self::from_sources(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        if self.groups.is_empty() {
            return Err(Error::InvalidConfig("no data groups configured".into()));
        }
        for group in &self.groups {
            if group.members.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "data group {} has no members",
                    group.raft_id
                )));
            }
        }
        Ok(())
    }
}

/// Identity and addresses of one cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: i32,

    /// Address used by peers for internal (data) requests
    #[serde(default = "default_ip")]
    pub internal_ip: String,

    #[serde(default = "default_data_port")]
    pub data_port: u16,

    /// Address handed to clients in redirects
    #[serde(default = "default_ip")]
    pub client_ip: String,

    #[serde(default = "default_client_port")]
    pub client_port: u16,
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_data_port() -> u16 {
    40010
}
fn default_client_port() -> u16 {
    6667
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: 0,
            internal_ip: default_ip(),
            data_port: default_data_port(),
            client_ip: default_ip(),
            client_port: default_client_port(),
        }
    }
}

/// One statically configured data group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub raft_id: i32,
    pub members: Vec<NodeConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Maximum accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], default_data_port()))
}
fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Forward with the async client instead of the blocking one
    #[serde(default = "default_use_async_server")]
    pub use_async_server: bool,

    /// Per-destination RPC timeout, also the elapsed-time budget of each
    /// membership-change sub-record
    #[serde(default = "default_write_operation_timeout")]
    pub write_operation_timeout_ms: u64,

    /// Backoff between membership-change forwarding attempts
    #[serde(default = "default_retry_wait")]
    pub retry_wait_ms: u64,

    /// Create missing storage groups / timeseries on first write
    #[serde(default = "default_enable_auto_create_schema")]
    pub enable_auto_create_schema: bool,

    /// How many times schema auto-creation may re-run the partitioned path
    #[serde(default = "default_max_schema_auto_create_attempts")]
    pub max_schema_auto_create_attempts: u32,

    /// Path level that names a storage group (`root.sg` is level 1)
    #[serde(default = "default_storage_group_level")]
    pub storage_group_level: usize,

    /// Width of one time partition
    #[serde(default = "default_partition_interval")]
    pub partition_interval_ms: i64,
}

fn default_use_async_server() -> bool {
    true
}
fn default_write_operation_timeout() -> u64 {
    10_000
}
fn default_retry_wait() -> u64 {
    10
}
fn default_enable_auto_create_schema() -> bool {
    true
}
fn default_max_schema_auto_create_attempts() -> u32 {
    1
}
fn default_storage_group_level() -> usize {
    1
}
fn default_partition_interval() -> i64 {
    604_800_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            use_async_server: default_use_async_server(),
            write_operation_timeout_ms: default_write_operation_timeout(),
            retry_wait_ms: default_retry_wait(),
            enable_auto_create_schema: default_enable_auto_create_schema(),
            max_schema_auto_create_attempts: default_max_schema_auto_create_attempts(),
            storage_group_level: default_storage_group_level(),
            partition_interval_ms: default_partition_interval(),
        }
    }
}

impl CoordinatorConfig {
    pub fn write_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.write_operation_timeout_ms)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_operation_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "write_operation_timeout_ms must be positive".into(),
            ));
        }
        if self.partition_interval_ms <= 0 {
            return Err(Error::InvalidConfig(
                "partition_interval_ms must be positive".into(),
            ));
        }
        if self.storage_group_level == 0 {
            return Err(Error::InvalidConfig(
                "storage_group_level must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
