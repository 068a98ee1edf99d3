//! End-to-end ring tests: real nodes on ephemeral ports talking the line
//! protocol over TCP.

use ring_cluster::error::RingError;
use ring_cluster::membership::types::{NodeDescriptor, NodeRef, Range, UNKNOWN_HOST};
use ring_cluster::node::connection::LineStream;
use ring_cluster::node::protocol::{Command, Reply, format_enter_reply};
use ring_cluster::node::server::NodeServer;
use ring_cluster::node::state::Node;
use ring_cluster::storage::memory::KeyStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const HOST: &str = "127.0.0.1";

async fn start_bootstrap(seeds: Vec<(u32, &str)>) -> (Arc<Node>, u16) {
    let server = NodeServer::bind(HOST, 0, 16).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let store = KeyStore::with_entries(seeds.into_iter().map(|(k, v)| (k, v.to_string())));
    let node = Arc::new(Node::bootstrap(HOST, port, store));
    server.spawn(node.clone());
    (node, port)
}

async fn start_name_server(id: u32, bootstrap_port: u16) -> Arc<Node> {
    start_stoppable_name_server(id, bootstrap_port).await.0
}

async fn start_stoppable_name_server(
    id: u32,
    bootstrap_port: u16,
) -> (Arc<Node>, JoinHandle<()>) {
    let server = NodeServer::bind(HOST, 0, 16).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let node = Arc::new(Node::name_server(
        NodeRef::new(id, HOST, port),
        HOST,
        bootstrap_port,
    ));
    let handle = server.spawn(node.clone());
    (node, handle)
}

/// Scripted stand-in for node 0: admits any joiner as its only neighbor and
/// answers the transfer handshakes as configured.
#[derive(Clone)]
struct ScriptedBootstrap {
    handover_payload: &'static str,
    handover_delay: Duration,
    confirm_receive: bool,
}

async fn start_scripted_bootstrap(script: ScriptedBootstrap) -> u16 {
    let listener = TcpListener::bind((HOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let me = NodeDescriptor::solitary(NodeRef::new(0, UNKNOWN_HOST, port));

    tokio::spawn(async move {
        while let Ok((socket, remote)) = listener.accept().await {
            let script = script.clone();
            let me = me.clone();
            tokio::spawn(async move {
                let mut stream = LineStream::accepted(socket, remote);
                let Ok(line) = stream.read_line().await else {
                    return;
                };
                let reply = match Command::parse(&line) {
                    Ok(Command::Enter { .. }) => format_enter_reply(&me, &me),
                    Ok(Command::Exit { .. }) => Reply::ExitOk.to_string(),
                    Ok(Command::UpdateSuccessor { .. }) => Reply::NeighborOk.to_string(),
                    Ok(Command::SendKeys { .. }) => {
                        tokio::time::sleep(script.handover_delay).await;
                        let _ = stream.send_line(script.handover_payload).await;
                        let _ = stream.read_line().await;
                        Reply::SendOk.to_string()
                    }
                    Ok(Command::ReceiveKeys { .. }) => {
                        let _ = stream.send_line(&Reply::ReadyToReceive.to_string()).await;
                        let _ = stream.read_line().await;
                        if !script.confirm_receive {
                            return;
                        }
                        Reply::ReceivedOk.to_string()
                    }
                    _ => return,
                };
                let _ = stream.send_line(&reply).await;
            });
        }
    });
    port
}

async fn keys_of(node: &Node) -> Vec<u32> {
    node.store.entries().await.into_iter().map(|(k, _)| k).collect()
}

fn found(node: u32, value: &str) -> Reply {
    Reply::Found {
        node,
        value: value.to_string(),
    }
}

#[tokio::test]
async fn test_first_joiner_forwards_lookup_to_bootstrap() {
    let (bootstrap, port) = start_bootstrap(vec![(5, "x")]).await;
    let node = start_name_server(1, port).await;

    let report = node.enter_ring().await.unwrap();

    assert_eq!(report.predecessor.id, 0);
    assert_eq!(report.successor.id, 0);
    assert_eq!(report.predecessor.port, port);
    assert_eq!(report.range, Range::new(1, 1));
    assert_eq!(report.keys_received, 0);
    assert_eq!(bootstrap.owned_range().await, Some(Range::new(2, 0)));

    assert_eq!(node.lookup(5).await, found(0, "x"));
}

#[tokio::test]
async fn test_join_splits_keys_without_loss_or_duplication() {
    let seeds: Vec<(u32, &str)> = (10..=20).map(|k| (k, "v")).chain([(900, "w")]).collect();
    let (bootstrap, port) = start_bootstrap(seeds).await;

    let far = start_name_server(300, port).await;
    let report = far.enter_ring().await.unwrap();
    assert_eq!(report.keys_received, 11);
    assert_eq!(keys_of(&far).await, (10..=20).collect::<Vec<_>>());
    assert_eq!(keys_of(&bootstrap).await, vec![900]);

    // Node 15 lands between 0 and 300 and takes 1-15 from node 300.
    let near = start_name_server(15, port).await;
    let report = near.enter_ring().await.unwrap();
    assert_eq!(report.predecessor.id, 0);
    assert_eq!(report.successor.id, 300);
    assert_eq!(report.keys_received, 6);

    assert_eq!(keys_of(&near).await, (10..=15).collect::<Vec<_>>());
    assert_eq!(keys_of(&far).await, (16..=20).collect::<Vec<_>>());
    assert_eq!(far.predecessor().await.id, 15);
    assert_eq!(far.owned_range().await, Some(Range::new(16, 300)));
    assert_eq!(bootstrap.successor().await.id, 15);
}

#[tokio::test]
async fn test_key_operations_across_hops() {
    let (bootstrap, port) = start_bootstrap(vec![]).await;
    let far = start_name_server(300, port).await;
    far.enter_ring().await.unwrap();
    let near = start_name_server(15, port).await;
    near.enter_ring().await.unwrap();

    assert_eq!(near.insert(200, "a").await, Reply::Inserted { node: 300 });
    assert_eq!(near.insert(1000, "b").await, Reply::Inserted { node: 0 });
    assert_eq!(near.insert(200, "c").await, Reply::Exists { node: 300 });

    assert_eq!(bootstrap.lookup(200).await, found(300, "a"));
    assert_eq!(far.lookup(1000).await, found(0, "b"));

    assert_eq!(bootstrap.delete(200).await, Reply::Deleted { node: 300 });
    assert_eq!(near.lookup(200).await, Reply::NotFound { node: 300 });
    assert_eq!(near.delete(200).await, Reply::NotFound { node: 300 });
}

#[tokio::test]
async fn test_join_then_leave_restores_ring() {
    let (bootstrap, port) = start_bootstrap(vec![(12, "a"), (250, "b"), (700, "c")]).await;
    let far = start_name_server(300, port).await;
    far.enter_ring().await.unwrap();

    let coordinator = bootstrap.coordinator().unwrap();
    let members_before = coordinator.members().await;
    let ranges_before = coordinator.ranges().await;

    let near = start_name_server(100, port).await;
    near.enter_ring().await.unwrap();
    assert_eq!(keys_of(&near).await, vec![12]);

    let report = near.exit_ring().await.unwrap();
    assert_eq!(report.successor.id, 300);
    assert_eq!(report.keys_sent, 1);
    assert!(!near.is_joined().await);
    assert!(keys_of(&near).await.is_empty());

    assert_eq!(coordinator.members().await, members_before);
    assert_eq!(coordinator.ranges().await, ranges_before);
    assert_eq!(keys_of(&far).await, vec![12, 250]);
    assert_eq!(far.predecessor().await.id, 0);
    assert_eq!(bootstrap.lookup(12).await, found(300, "a"));
}

#[tokio::test]
async fn test_last_name_server_leaving_returns_keys_to_bootstrap() {
    let (bootstrap, port) = start_bootstrap(vec![(40, "a")]).await;
    let node = start_name_server(64, port).await;
    node.enter_ring().await.unwrap();
    assert_eq!(keys_of(&node).await, vec![40]);

    node.exit_ring().await.unwrap();

    assert_eq!(keys_of(&bootstrap).await, vec![40]);
    assert_eq!(bootstrap.owned_range().await, Some(Range::FULL));
    assert_eq!(bootstrap.coordinator().unwrap().members().await.len(), 1);
}

#[tokio::test]
async fn test_exit_of_bootstrap_is_refused_over_the_wire() {
    let (_bootstrap, port) = start_bootstrap(vec![]).await;

    let reply = LineStream::request(HOST, port, &format!("EXIT 0 {}", port))
        .await
        .unwrap();

    assert!(matches!(
        Reply::parse(&reply).unwrap(),
        Reply::Error(RingError::ProtectedId(_))
    ));
}

#[tokio::test]
async fn test_duplicate_enter_is_refused() {
    let (bootstrap, port) = start_bootstrap(vec![]).await;
    let first = start_name_server(7, port).await;
    first.enter_ring().await.unwrap();
    let members = bootstrap.coordinator().unwrap().members().await;

    let second = start_name_server(7, port).await;
    let result = second.enter_ring().await;

    assert!(matches!(result, Err(RingError::DuplicateId(_))));
    assert!(!second.is_joined().await);
    assert_eq!(bootstrap.coordinator().unwrap().members().await, members);
    assert!(matches!(
        first.enter_ring().await,
        Err(RingError::AlreadyJoined(_))
    ));
}

#[tokio::test]
async fn test_unknown_command_gets_error_reply() {
    let (_bootstrap, port) = start_bootstrap(vec![]).await;

    let reply = LineStream::request(HOST, port, "JUMP 1 9000").await.unwrap();

    assert_eq!(reply, "ERROR MALFORMED_REQUEST INVALID COMMAND JUMP");
}

#[tokio::test]
async fn test_joiner_serves_its_range_only_after_the_handover() {
    let port = start_scripted_bootstrap(ScriptedBootstrap {
        handover_payload: "1:x%0AFIN",
        handover_delay: Duration::from_millis(800),
        confirm_receive: true,
    })
    .await;
    let node = Arc::new(Node::name_server(NodeRef::new(1, HOST, 9), HOST, port));

    let joining = tokio::spawn({
        let node = node.clone();
        async move { node.enter_ring().await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(node.is_joined().await);

    // Both wait for the transferred entry instead of answering from an empty store.
    assert_eq!(node.lookup(1).await, found(1, "x"));
    assert_eq!(node.insert(1, "y").await, Reply::Exists { node: 1 });

    let report = joining.await.unwrap().unwrap();
    assert_eq!(report.keys_received, 1);
    assert_eq!(node.lookup(1).await, found(1, "x"));
}

#[tokio::test]
async fn test_unconfirmed_handover_keeps_entries_on_the_sender() {
    let seeds: Vec<(u32, &str)> = (10..=20).map(|k| (k, "v")).collect();
    let (_bootstrap, port) = start_bootstrap(seeds).await;
    let far = start_name_server(300, port).await;
    far.enter_ring().await.unwrap();
    let far_port = far.me().port;

    let mut stream = LineStream::connect(HOST, far_port).await.unwrap();
    stream
        .send_line(&format!("SEND_KEYS 15 {}", far_port + 1))
        .await
        .unwrap();
    let payload = stream.read_line().await.unwrap();
    assert_eq!(payload, "10:v%0A11:v%0A12:v%0A13:v%0A14:v%0A15:v%0AFIN");
    drop(stream);

    assert_eq!(keys_of(&far).await, (10..=20).collect::<Vec<_>>());
    assert_eq!(far.predecessor().await.id, 0);
}

#[tokio::test]
async fn test_truncated_push_is_refused_by_the_receiver() {
    let (_bootstrap, port) = start_bootstrap(vec![]).await;
    let far = start_name_server(300, port).await;
    far.enter_ring().await.unwrap();
    let far_port = far.me().port;

    let mut stream = LineStream::connect(HOST, far_port).await.unwrap();
    stream
        .send_line(&format!("RECEIVE_KEYS 100 9100 0 {} {}", HOST, port))
        .await
        .unwrap();
    assert_eq!(stream.read_line().await.unwrap(), "READY_TO_RECEIVE");
    stream.send_line("50:a%0A60:b%0A").await.unwrap();

    let reply = Reply::parse(&stream.read_line().await.unwrap()).unwrap();
    assert!(matches!(reply, Reply::Error(RingError::TransferIncomplete(_))));
    assert!(keys_of(&far).await.is_empty());
    assert_eq!(far.predecessor().await.id, 0);
}

#[tokio::test]
async fn test_leaver_keeps_entries_when_push_is_not_confirmed() {
    let port = start_scripted_bootstrap(ScriptedBootstrap {
        handover_payload: "FIN",
        handover_delay: Duration::ZERO,
        confirm_receive: false,
    })
    .await;
    let node = Node::name_server(NodeRef::new(500, HOST, 9), HOST, port);
    node.enter_ring().await.unwrap();
    assert_eq!(node.insert(42, "v").await, Reply::Inserted { node: 500 });

    let result = node.exit_ring().await;

    assert!(matches!(result, Err(RingError::PeerUnreachable(_))));
    assert_eq!(keys_of(&node).await, vec![42]);
    assert!(node.is_joined().await);
}

#[tokio::test]
async fn test_dead_successor_reported_back_to_requester() {
    let (bootstrap, port) = start_bootstrap(vec![]).await;
    let (far, far_server) = start_stoppable_name_server(300, port).await;
    far.enter_ring().await.unwrap();
    let near = start_name_server(15, port).await;
    near.enter_ring().await.unwrap();

    far_server.abort();
    let _ = far_server.await;

    // 0 -> 15 -> 300: the hop that fails is not the requester's own.
    let reply = bootstrap.lookup(200).await;
    assert!(matches!(reply, Reply::Error(RingError::PeerUnreachable(_))));
    assert!(matches!(
        near.insert(100, "v").await,
        Reply::Error(RingError::PeerUnreachable(_))
    ));
}
