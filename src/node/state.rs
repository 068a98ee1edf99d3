use crate::coordinator::coordinator::BootstrapCoordinator;
use crate::error::{RingError, RingResult};
use crate::membership::types::{BOOTSTRAP_ID, NodeRef, Range, UNKNOWN_HOST};
use crate::storage::memory::KeyStore;

use serde::Serialize;
use tokio::sync::RwLock;

/// What a node is in the ring.
pub enum Role {
    /// Node 0: hosts the coordinator and is always a member.
    Bootstrap(BootstrapCoordinator),
    /// Any other node: must ENTER through the bootstrap node at `host:port`.
    NameServer { bootstrap_host: String, bootstrap_port: u16 },
}

#[derive(Debug, Clone)]
struct Neighbors {
    predecessor: NodeRef,
    successor: NodeRef,
    joined: bool,
}

/// All state owned by one ring participant, passed explicitly to the server
/// and the console.
pub struct Node {
    me: NodeRef,
    role: Role,
    neighbors: RwLock<Neighbors>,
    pub store: KeyStore,
}

impl Node {
    pub fn bootstrap(host: impl Into<String>, port: u16, store: KeyStore) -> Self {
        let me = NodeRef::new(BOOTSTRAP_ID, host, port);
        let coordinator = BootstrapCoordinator::new(NodeRef::new(BOOTSTRAP_ID, UNKNOWN_HOST, port));
        Self {
            neighbors: RwLock::new(Neighbors {
                predecessor: me.clone(),
                successor: me.clone(),
                joined: true,
            }),
            me,
            role: Role::Bootstrap(coordinator),
            store,
        }
    }

    pub fn name_server(
        me: NodeRef,
        bootstrap_host: impl Into<String>,
        bootstrap_port: u16,
    ) -> Self {
        Self {
            neighbors: RwLock::new(Neighbors {
                predecessor: me.clone(),
                successor: me.clone(),
                joined: false,
            }),
            me,
            role: Role::NameServer {
                bootstrap_host: bootstrap_host.into(),
                bootstrap_port,
            },
            store: KeyStore::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.me.id
    }

    pub fn me(&self) -> &NodeRef {
        &self.me
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn coordinator(&self) -> Option<&BootstrapCoordinator> {
        match &self.role {
            Role::Bootstrap(coordinator) => Some(coordinator),
            Role::NameServer { .. } => None,
        }
    }

    pub fn is_bootstrap(&self) -> bool {
        self.coordinator().is_some()
    }

    pub async fn is_joined(&self) -> bool {
        self.neighbors.read().await.joined
    }

    /// Current (predecessor, successor). On the bootstrap node they are read
    /// from the authoritative ring every time.
    pub async fn neighbors(&self) -> (NodeRef, NodeRef) {
        if let Some(coordinator) = self.coordinator()
            && let Some(descriptor) = coordinator.lookup(BOOTSTRAP_ID).await
        {
            return (descriptor.predecessor, descriptor.successor);
        }
        let neighbors = self.neighbors.read().await;
        (neighbors.predecessor.clone(), neighbors.successor.clone())
    }

    pub async fn predecessor(&self) -> NodeRef {
        self.neighbors().await.0
    }

    pub async fn successor(&self) -> NodeRef {
        self.neighbors().await.1
    }

    /// Range this node answers for, `None` while it is outside the ring.
    pub async fn owned_range(&self) -> Option<Range> {
        if let Some(coordinator) = self.coordinator() {
            return coordinator.range_of(BOOTSTRAP_ID).await.ok();
        }
        let neighbors = self.neighbors.read().await;
        neighbors
            .joined
            .then(|| Range::owned(self.me.id, neighbors.predecessor.id))
    }

    /// Range to hand over to a joiner `requester` that is being spliced in
    /// right before this node.
    pub async fn handover_range(&self, requester: u32) -> RingResult<Range> {
        if let Some(coordinator) = self.coordinator() {
            return coordinator.range_of(requester).await;
        }

        let (predecessor, _) = self.neighbors().await;
        let owned = self
            .owned_range()
            .await
            .ok_or_else(|| {
                RingError::NotJoined(format!("Node {} is not in the ring", self.me.id))
            })?;
        if requester == self.me.id || !owned.contains(requester) {
            return Err(RingError::MalformedRequest(format!(
                "Node {} is not between {} and {}",
                requester, predecessor.id, self.me.id
            )));
        }
        Ok(Range::owned(requester, predecessor.id))
    }

    pub async fn set_predecessor(&self, predecessor: NodeRef) {
        if self.is_bootstrap() {
            tracing::debug!(
                "Predecessor announcement {} ignored, the ring is authoritative",
                predecessor
            );
            return;
        }
        tracing::info!("Predecessor is now {}", predecessor);
        self.neighbors.write().await.predecessor = predecessor;
    }

    pub async fn set_successor(&self, successor: NodeRef) {
        if self.is_bootstrap() {
            tracing::debug!(
                "Successor announcement {} ignored, the ring is authoritative",
                successor
            );
            return;
        }
        tracing::info!("Successor is now {}", successor);
        self.neighbors.write().await.successor = successor;
    }

    pub(crate) async fn mark_joined(&self, predecessor: NodeRef, successor: NodeRef) {
        let mut neighbors = self.neighbors.write().await;
        neighbors.predecessor = predecessor;
        neighbors.successor = successor;
        neighbors.joined = true;
    }

    pub(crate) async fn mark_left(&self) {
        let mut neighbors = self.neighbors.write().await;
        neighbors.predecessor = self.me.clone();
        neighbors.successor = self.me.clone();
        neighbors.joined = false;
    }

    pub async fn status(&self) -> NodeStatus {
        let joined = self.is_joined().await;
        let (predecessor, successor) = self.neighbors().await;
        NodeStatus {
            id: self.me.id,
            host: self.me.host.clone(),
            port: self.me.port,
            role: if self.is_bootstrap() { "bootstrap" } else { "name-server" },
            joined,
            predecessor: joined.then_some(predecessor),
            successor: joined.then_some(successor),
            range: self.owned_range().await,
            entries: self.store.len().await,
        }
    }
}

/// Serializable snapshot of a node for the console.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub id: u32,
    pub host: String,
    pub port: u16,
    pub role: &'static str,
    pub joined: bool,
    pub predecessor: Option<NodeRef>,
    pub successor: Option<NodeRef>,
    pub range: Option<Range>,
    pub entries: usize,
}
