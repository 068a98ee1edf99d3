use super::connection::LineStream;
use super::handlers::handle_connection;
use super::state::Node;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// TCP accept loop. Every connection is served on its own task; at most
/// `max_connections` are in flight, further peers wait in the backlog.
pub struct NodeServer {
    listener: TcpListener,
    permits: Arc<Semaphore>,
}

impl NodeServer {
    pub async fn bind(host: &str, port: u16, max_connections: usize) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        tracing::info!("Node server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, node: Arc<Node>) -> Result<()> {
        loop {
            let permit = self.permits.clone().acquire_owned().await?;

            match self.listener.accept().await {
                Ok((stream, remote)) => {
                    let node = node.clone();
                    tokio::spawn(async move {
                        handle_connection(node, LineStream::accepted(stream, remote)).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    pub fn spawn(self, node: Arc<Node>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(node).await {
                tracing::error!("Node server stopped: {}", e);
            }
        })
    }
}
