use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ring_cluster::cli::{Console, run_console};
use ring_cluster::config::{BootstrapConfig, NameServerConfig};
use ring_cluster::membership::types::NodeRef;
use ring_cluster::node::server::{DEFAULT_MAX_CONNECTIONS, NodeServer};
use ring_cluster::node::state::Node;
use ring_cluster::storage::memory::KeyStore;

#[derive(Parser, Debug)]
#[command(name = "ring-node")]
#[command(about = "Ring-partitioned key/value node")]
struct Args {
    #[command(subcommand)]
    role: RoleArgs,

    /// Host to listen on and advertise to peers
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Maximum number of connections served at once
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Run without the interactive console, until Ctrl+C
    #[arg(long, global = true)]
    headless: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum RoleArgs {
    /// Run node 0, the bootstrap coordinator
    Bootstrap {
        /// Config file: id, port, then `<key> <value>` seed lines
        config: PathBuf,
    },
    /// Run a name server that joins through the bootstrap node
    NameServer {
        /// Config file: id, port, then `<bootstrapHost> <bootstrapPort>`
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "debug,ring_cluster=debug"
    } else {
        "info,ring_cluster=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // 1. Node state from config:
    let (node, port) = match &args.role {
        RoleArgs::Bootstrap { config: path } => {
            let config = BootstrapConfig::load(path)
                .with_context(|| format!("Failed to load bootstrap config {}", path.display()))?;
            tracing::info!("Bootstrap node seeded with {} entries", config.seeds.len());
            let store = KeyStore::with_entries(config.seeds);
            (Node::bootstrap(args.host.clone(), config.port, store), config.port)
        }
        RoleArgs::NameServer { config: path } => {
            let config = NameServerConfig::load(path)
                .with_context(|| format!("Failed to load name server config {}", path.display()))?;
            let me = NodeRef::new(config.id, args.host.clone(), config.port);
            (
                Node::name_server(me, config.bootstrap_host, config.bootstrap_port),
                config.port,
            )
        }
    };
    let node = Arc::new(node);

    // 2. Spawn TCP server:
    let server = NodeServer::bind(&args.host, port, args.max_connections)
        .await
        .with_context(|| format!("Failed to listen on {}:{}", args.host, port))?;
    let server_task = server.spawn(node.clone());
    tracing::info!("Node {} ready on {}:{}", node.id(), args.host, port);

    // 3. Console or wait for shutdown:
    if args.headless {
        tracing::info!("Press Ctrl+C to shutdown");
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            result = run_console(Console::new(node.clone())) => result?,
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    tracing::info!("Shutdown signal received");
    server_task.abort();
    Ok(())
}
