//! Coordinator binary

use clap::{Parser, Subcommand};
use minits::common::{config::DEFAULT_CONFIG_FILE, parse_duration};
use minits::{Config, CoordinatorServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minits-coord")]
#[command(about = "minits write-path coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Node ID
        #[arg(long)]
        id: Option<i32>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Configuration file (must exist when given)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Per-destination write timeout, e.g. `500ms` or `10s`
        #[arg(long)]
        write_timeout: Option<String>,

        /// Forward with the blocking client
        #[arg(long)]
        sync_client: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            config,
            write_timeout,
            sync_client,
        } => {
            // File and environment first, CLI flags win
            let mut config = match config {
                Some(path) => Config::from_file(path)?,
                None => Config::from_sources(DEFAULT_CONFIG_FILE)?,
            };
            if let Some(id) = id {
                config.node.id = id;
            }
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if let Some(timeout) = write_timeout {
                config.coordinator.write_operation_timeout_ms = parse_duration(&timeout)?.as_millis() as u64;
            }
            if sync_client {
                config.coordinator.use_async_server = false;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            CoordinatorServer::new(config).serve().await?;
        }
    }

    Ok(())
}
