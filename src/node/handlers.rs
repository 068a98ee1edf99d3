//! Request handlers of the node server.
//!
//! Each accepted connection carries exactly one request line. The handler
//! answers with one reply line, or runs the short fixed exchange of a key
//! transfer, then the connection is closed.

use super::connection::{LineStream, PEER_TIMEOUT};
use super::protocol::{Command, Origin, Reply, format_enter_reply};
use super::router::{KeyRequest, route};
use super::state::Node;
use crate::error::{RingError, RingResult};
use crate::membership::types::NodeRef;
use crate::storage::transfer::{decode_entries, encode_entries};

use std::sync::Arc;

pub async fn handle_connection(node: Arc<Node>, mut stream: LineStream) {
    let remote = stream.remote();

    let line = match stream.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Failed to read request from {}: {}", remote, e);
            return;
        }
    };
    tracing::debug!("Received message from {}: {}", remote, line);

    let command = match Command::parse(&line) {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!("Rejected request from {}: {}", remote, err);
            let _ = stream.send_line(&Reply::Error(err).to_string()).await;
            return;
        }
    };

    if let Err(err) = dispatch(&node, command, &mut stream).await {
        tracing::warn!("Request from {} failed: {}", remote, err);
        let _ = stream.send_line(&Reply::Error(err).to_string()).await;
    }
}

async fn dispatch(node: &Node, command: Command, stream: &mut LineStream) -> RingResult<()> {
    let remote_host = stream.remote().ip().to_string();

    match command {
        Command::Enter { origin } => handle_enter(node, origin, remote_host, stream).await,
        Command::Exit { origin } => handle_exit(node, origin, stream).await,
        Command::SendKeys { origin } => {
            let requester = NodeRef::new(origin.id, remote_host, origin.port);
            handle_send_keys(node, requester, stream).await
        }
        Command::ReceiveKeys {
            origin,
            predecessor,
        } => handle_receive_keys(node, origin, predecessor, stream).await,
        Command::UpdateSuccessor { origin, host } => {
            let successor = NodeRef::new(origin.id, host.unwrap_or(remote_host), origin.port);
            node.set_successor(successor).await;
            stream.send_line(&Reply::NeighborOk.to_string()).await
        }
        Command::Lookup { origin, key } => {
            relay(node, KeyRequest::Lookup(key), origin, stream).await
        }
        Command::Insert { origin, key, value } => {
            relay(node, KeyRequest::Insert(key, value), origin, stream).await
        }
        Command::Delete { origin, key } => {
            relay(node, KeyRequest::Delete(key), origin, stream).await
        }
    }
}

async fn relay(
    node: &Node,
    request: KeyRequest,
    origin: Origin,
    stream: &mut LineStream,
) -> RingResult<()> {
    let reply = route(node, request, origin, true).await;
    stream.send_line(&reply.to_string()).await
}

fn coordinator_only(node: &Node, command: &str) -> RingError {
    RingError::MalformedRequest(format!(
        "{} is only served by the bootstrap node, node {} is a name server",
        command,
        node.id()
    ))
}

async fn handle_enter(
    node: &Node,
    origin: Origin,
    remote_host: String,
    stream: &mut LineStream,
) -> RingResult<()> {
    let coordinator = node
        .coordinator()
        .ok_or_else(|| coordinator_only(node, "ENTER"))?;

    let admission = coordinator
        .handle_enter(NodeRef::new(origin.id, remote_host, origin.port))
        .await?;

    let reply = format_enter_reply(&admission.predecessor, &admission.successor);
    stream.send_line(&reply).await?;
    coordinator.acknowledge(&admission.request_id);
    Ok(())
}

async fn handle_exit(node: &Node, origin: Origin, stream: &mut LineStream) -> RingResult<()> {
    let coordinator = node
        .coordinator()
        .ok_or_else(|| coordinator_only(node, "EXIT"))?;

    let request_id = coordinator.handle_exit(origin.id).await?;
    stream.send_line(&Reply::ExitOk.to_string()).await?;
    coordinator.acknowledge(&request_id);
    Ok(())
}

/// A joiner pulls the part of this node's range that now belongs to it.
///
/// The store stays locked from the snapshot until the joiner confirms, and the
/// entries are deleted only after `RECEIVED_OK`.
async fn handle_send_keys(
    node: &Node,
    requester: NodeRef,
    stream: &mut LineStream,
) -> RingResult<()> {
    let range = node.handover_range(requester.id).await?;
    tracing::info!("Processing SEND_KEYS for node {}, range {}", requester.id, range);

    let mut store = node.store.lock().await;
    let entries = store.range_entries(&range);
    stream.send_line(&encode_entries(&entries)).await?;

    let ack = tokio::time::timeout(PEER_TIMEOUT, stream.read_line())
        .await
        .map_err(|_| {
            RingError::TransferIncomplete(format!(
                "Node {} did not confirm the transfer, keeping {} entries",
                requester.id,
                entries.len()
            ))
        })??;
    Reply::expect(&ack, Reply::ReceivedOk)?;

    let removed = store.remove_keys(entries.iter().map(|(key, _)| *key));
    drop(store);
    tracing::info!("Handed {} entries to node {}", removed, requester.id);

    node.set_predecessor(requester).await;
    stream.send_line(&Reply::SendOk.to_string()).await
}

/// A leaving predecessor pushes its whole store here.
async fn handle_receive_keys(
    node: &Node,
    origin: Origin,
    predecessor: NodeRef,
    stream: &mut LineStream,
) -> RingResult<()> {
    if !node.is_joined().await {
        return Err(RingError::NotJoined(format!(
            "Node {} is not in the ring",
            node.id()
        )));
    }
    tracing::info!("Receiving keys from leaving node {}", origin.id);

    stream.send_line(&Reply::ReadyToReceive.to_string()).await?;
    let payload = stream.read_line().await?;
    let entries = decode_entries(&payload)?;

    let stored = node.store.lock().await.absorb(entries);
    tracing::info!("Stored {} entries from node {}", stored, origin.id);

    node.set_predecessor(predecessor).await;
    stream.send_line(&Reply::ReceivedOk.to_string()).await
}
