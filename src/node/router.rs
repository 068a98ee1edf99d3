//! Request Routing
//!
//! Decides whether a key is served from the local store or handed to the
//! successor. Forwarding is a plain linear walk around the ring, one hop per
//! node, with the requester identity preserved and the owner's reply
//! relayed back unchanged.

use super::connection::LineStream;
use super::protocol::{Command, Origin, Reply};
use super::state::Node;
use crate::error::RingError;
use crate::storage::memory::{validate_entry, validate_key};

/// A key operation as issued by a client or received from a predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRequest {
    Lookup(u32),
    Insert(u32, String),
    Delete(u32),
}

impl KeyRequest {
    pub fn key(&self) -> u32 {
        match self {
            KeyRequest::Lookup(key) | KeyRequest::Insert(key, _) | KeyRequest::Delete(key) => *key,
        }
    }

    fn into_command(self, origin: Origin) -> Command {
        match self {
            KeyRequest::Lookup(key) => Command::Lookup { origin, key },
            KeyRequest::Insert(key, value) => Command::Insert { origin, key, value },
            KeyRequest::Delete(key) => Command::Delete { origin, key },
        }
    }
}

/// Serves `request` locally when this node owns the key, otherwise forwards it.
///
/// `forwarded` is true when the request arrived from another node. A forwarded
/// request that comes back to its own origin has walked the whole ring without
/// finding an owner and is answered as not found.
pub async fn route(node: &Node, request: KeyRequest, origin: Origin, forwarded: bool) -> Reply {
    let key = request.key();
    let validated = match &request {
        KeyRequest::Insert(key, value) => validate_entry(*key, value),
        _ => validate_key(key),
    };
    if let Err(err) = validated {
        return err.into();
    }

    let Some(range) = node.owned_range().await else {
        return RingError::NotJoined(format!("Node {} is not in the ring", node.id())).into();
    };

    if range.contains(key) {
        tracing::debug!("Key {} is in local range {}", key, range);
        return serve_locally(node, request).await;
    }

    if forwarded && origin.id == node.id() {
        tracing::warn!("Request for key {} travelled the whole ring", key);
        return RingError::NotFound(format!("Key {} has no owner in the ring", key)).into();
    }

    forward(node, request.into_command(origin)).await
}

async fn serve_locally(node: &Node, request: KeyRequest) -> Reply {
    let id = node.id();
    match request {
        KeyRequest::Lookup(key) => match node.store.lookup(key).await {
            Some(value) => Reply::Found { node: id, value },
            None => Reply::NotFound { node: id },
        },
        KeyRequest::Insert(key, value) => match node.store.insert(key, value).await {
            Ok(()) => {
                tracing::info!("Inserted key {}", key);
                Reply::Inserted { node: id }
            }
            Err(RingError::KeyExists(_)) => Reply::Exists { node: id },
            Err(err) => err.into(),
        },
        KeyRequest::Delete(key) => {
            if node.store.delete(key).await {
                tracing::info!("Deleted key {}", key);
                Reply::Deleted { node: id }
            } else {
                Reply::NotFound { node: id }
            }
        }
    }
}

async fn forward(node: &Node, command: Command) -> Reply {
    let successor = node.successor().await;
    tracing::debug!("Forwarding '{}' to successor {}", command, successor);

    let command_line = command.to_string();
    let request = LineStream::request(&successor.host, successor.port, &command_line);
    let line = match request.await {
        Ok(line) => line,
        Err(err) => {
            tracing::warn!("Forwarding to {} failed: {}", successor, err);
            return err.into();
        }
    };

    Reply::parse(&line).unwrap_or_else(Reply::Error)
}
