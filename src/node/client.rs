//! Join and leave flows of a name server, plus the console entry points for
//! key operations.
//!
//! ## Join
//! 1. `ENTER` at the bootstrap node, which returns the new neighbors.
//! 2. `SEND_KEYS` to the successor, which hands over the keys now owned here.
//! 3. `UPDATE_SUCCESSOR` to the predecessor.
//!
//! ## Leave
//! 1. `EXIT` at the bootstrap node.
//! 2. `RECEIVE_KEYS` to the successor, carrying every local entry.
//! 3. `UPDATE_SUCCESSOR` to the predecessor, naming the old successor.
//!
//! A failure part way through stops the flow; steps already done are not
//! reverted.

use super::connection::LineStream;
use super::protocol::{Command, Origin, Reply, parse_enter_reply};
use super::router::{KeyRequest, route};
use super::state::{Node, Role};
use crate::error::{RingError, RingResult};
use crate::membership::types::{NodeRef, Range};
use crate::storage::memory::StoreGuard;
use crate::storage::transfer::{decode_entries, encode_entries};

/// Outcome of a successful `enter_ring`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    pub predecessor: NodeRef,
    pub successor: NodeRef,
    pub range: Range,
    pub keys_received: usize,
}

/// Outcome of a successful `exit_ring`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveReport {
    pub successor: NodeRef,
    pub keys_sent: usize,
}

impl Node {
    fn origin(&self) -> Origin {
        Origin::new(self.id(), self.me().port)
    }

    fn bootstrap_address(&self) -> RingResult<(&str, u16)> {
        match self.role() {
            Role::NameServer {
                bootstrap_host,
                bootstrap_port,
            } => Ok((bootstrap_host.as_str(), *bootstrap_port)),
            Role::Bootstrap(_) => Err(RingError::ProtectedId(
                "The bootstrap node is always part of the ring.".to_string(),
            )),
        }
    }

    /// The bootstrap node reports its own address as unknown; replace it
    /// with the address this node dialled.
    fn resolve(&self, node: NodeRef, bootstrap_host: &str) -> NodeRef {
        if node.has_unknown_host() {
            NodeRef::new(node.id, bootstrap_host, node.port)
        } else {
            node
        }
    }

    pub async fn enter_ring(&self) -> RingResult<JoinReport> {
        let (bootstrap_host, bootstrap_port) = self.bootstrap_address()?;
        if self.is_joined().await {
            return Err(RingError::AlreadyJoined(format!(
                "Node {} is already in the ring",
                self.id()
            )));
        }

        let enter = Command::Enter {
            origin: self.origin(),
        };
        tracing::info!("Entering ring through {}:{}", bootstrap_host, bootstrap_port);
        let reply =
            LineStream::request(bootstrap_host, bootstrap_port, &enter.to_string()).await?;
        let (predecessor, successor) = parse_enter_reply(&reply)?;
        let predecessor = self.resolve(predecessor, bootstrap_host);
        let successor = self.resolve(successor, bootstrap_host);

        // Requests for the new range wait on the store until its keys are in.
        let store = self.store.lock().await;
        self.mark_joined(predecessor.clone(), successor.clone()).await;
        tracing::info!("Joined ring: predecessor {}, successor {}", predecessor, successor);

        let keys_received = self.pull_keys(&successor, store).await?;

        let update = Command::UpdateSuccessor {
            origin: self.origin(),
            host: Some(self.me().host.clone()),
        };
        let reply =
            LineStream::request(&predecessor.host, predecessor.port, &update.to_string()).await?;
        Reply::expect(&reply, Reply::NeighborOk)?;

        Ok(JoinReport {
            range: Range::owned(self.id(), predecessor.id),
            predecessor,
            successor,
            keys_received,
        })
    }

    /// Pulls the handover range from `successor`. `store` is released as soon
    /// as the entries are stored, before the acknowledgement goes out.
    async fn pull_keys(&self, successor: &NodeRef, mut store: StoreGuard<'_>) -> RingResult<usize> {
        let mut stream = LineStream::connect(&successor.host, successor.port).await?;
        let request = Command::SendKeys {
            origin: self.origin(),
        };
        stream.send_line(&request.to_string()).await?;

        let payload = stream.read_line().await?;
        if let Ok(Reply::Error(err)) = Reply::parse(&payload) {
            return Err(err);
        }
        let entries = decode_entries(&payload)?;
        let received = store.absorb(entries);
        drop(store);

        stream.send_line(&Reply::ReceivedOk.to_string()).await?;
        Reply::expect(&stream.read_line().await?, Reply::SendOk)?;
        tracing::info!("Received {} keys from successor {}", received, successor.id);
        Ok(received)
    }

    pub async fn exit_ring(&self) -> RingResult<LeaveReport> {
        let (bootstrap_host, bootstrap_port) = self.bootstrap_address()?;
        if !self.is_joined().await {
            return Err(RingError::NotJoined(format!(
                "Node {} is not in the ring",
                self.id()
            )));
        }
        let (predecessor, successor) = self.neighbors().await;

        let exit = Command::Exit {
            origin: self.origin(),
        };
        tracing::info!("Leaving ring through {}:{}", bootstrap_host, bootstrap_port);
        let reply =
            LineStream::request(bootstrap_host, bootstrap_port, &exit.to_string()).await?;
        Reply::expect(&reply, Reply::ExitOk)?;

        let keys_sent = self.push_keys(&predecessor, &successor).await?;

        let update = Command::UpdateSuccessor {
            origin: Origin::new(successor.id, successor.port),
            host: Some(successor.host.clone()),
        };
        let reply =
            LineStream::request(&predecessor.host, predecessor.port, &update.to_string()).await?;
        Reply::expect(&reply, Reply::NeighborOk)?;

        self.mark_left().await;
        tracing::info!("Left ring, {} keys handed to node {}", keys_sent, successor.id);
        Ok(LeaveReport {
            successor,
            keys_sent,
        })
    }

    async fn push_keys(&self, predecessor: &NodeRef, successor: &NodeRef) -> RingResult<usize> {
        let mut stream = LineStream::connect(&successor.host, successor.port).await?;
        let request = Command::ReceiveKeys {
            origin: self.origin(),
            predecessor: predecessor.clone(),
        };
        stream.send_line(&request.to_string()).await?;
        Reply::expect(&stream.read_line().await?, Reply::ReadyToReceive)?;

        let mut store = self.store.lock().await;
        let entries = store.all_entries();
        stream.send_line(&encode_entries(&entries)).await?;
        Reply::expect(&stream.read_line().await?, Reply::ReceivedOk)?;

        Ok(store.remove_keys(entries.iter().map(|(key, _)| *key)))
    }

    pub async fn lookup(&self, key: u32) -> Reply {
        route(self, KeyRequest::Lookup(key), self.origin(), false).await
    }

    pub async fn insert(&self, key: u32, value: impl Into<String>) -> Reply {
        route(self, KeyRequest::Insert(key, value.into()), self.origin(), false).await
    }

    pub async fn delete(&self, key: u32) -> Reply {
        route(self, KeyRequest::Delete(key), self.origin(), false).await
    }
}
