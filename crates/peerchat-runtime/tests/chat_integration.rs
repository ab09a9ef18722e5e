//! Integration tests for the chat coordinator
//!
//! Drives a full `Chat` over the in-memory transport: registration, fan-out,
//! inbound dispatch, cancellation mid-broadcast and the shutdown drain.

use std::collections::HashSet;

use peerchat_core::testing::{MemoryNetwork, MemoryTransport, RemotePeer};
use peerchat_core::{ChannelConfig, ChatError, PeerId, PeerInfo};
use peerchat_runtime::{Chat, ChatHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Event {
    Msg(String, String),
    In(String),
    Out(String),
}

struct Node {
    network: MemoryNetwork,
    handle: ChatHandle,
    events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ChatError>>,
}

fn peer(byte: u8, name: &str) -> PeerInfo {
    PeerInfo::new(PeerId::new([byte; 32]), name)
}

fn peer_addr(byte: u8, port: u16) -> String {
    format!("{}@127.0.0.1:{}", hex_key(byte), port)
}

fn hex_key(byte: u8) -> String {
    PeerId::new([byte; 32]).to_string()
}

fn spawn_node(
    transport: MemoryTransport,
    network: MemoryNetwork,
    peers: Vec<String>,
    config: ChannelConfig,
) -> Node {
    let (mut chat, handle) = Chat::new(transport, peers, config).unwrap();
    let (tx, events) = mpsc::unbounded_channel();

    let msg_tx = tx.clone();
    let in_tx = tx.clone();
    chat.on_msg(move |peer, text| {
        let _ = msg_tx.send(Event::Msg(peer.name.clone(), text.to_string()));
    })
    .on_peer_in(move |peer| {
        let _ = in_tx.send(Event::In(peer.name.clone()));
    })
    .on_peer_out(move |peer| {
        let _ = tx.send(Event::Out(peer.name.clone()));
    });

    let cancel = CancellationToken::new();
    let task = tokio::spawn(chat.run(cancel.clone()));

    Node {
        network,
        handle,
        events,
        cancel,
        task,
    }
}

fn start_node(peers: Vec<String>, config: ChannelConfig) -> Node {
    let (transport, network) = MemoryTransport::new();
    spawn_node(transport, network, peers, config)
}

async fn next_event(node: &mut Node) -> Event {
    timeout(WAIT, node.events.recv())
        .await
        .expect("timed out waiting for chat event")
        .expect("event channel closed")
}

async fn connect_all(node: &mut Node, peers: &[PeerInfo]) -> Vec<RemotePeer> {
    let mut remotes = Vec::new();
    for info in peers {
        remotes.push(node.network.connect(info.clone()).await);
    }

    let mut joined = HashSet::new();
    for _ in peers {
        match next_event(node).await {
            Event::In(name) => joined.insert(name),
            other => panic!("expected join, got {:?}", other),
        };
    }
    let expected: HashSet<String> = peers.iter().map(|p| p.name.clone()).collect();
    assert_eq!(joined, expected);

    remotes
}

async fn shutdown(node: &mut Node) {
    node.cancel.cancel();
    let result = timeout(WAIT, &mut node.task)
        .await
        .expect("chat did not stop")
        .expect("chat task panicked");
    assert!(result.is_ok());
}

/// Stall `slow` and queue broadcasts until the coordinator blocks delivering to it
///
/// Needs `outbound_buffer_size: 1`. Every peer in `others` must have received
/// "m1" and "m2" before "m3" is sent.
async fn block_broadcast(node: &mut Node, slow: &RemotePeer, others: &mut [RemotePeer]) {
    slow.stall_writes();

    let cancel = CancellationToken::new();
    for text in ["m1", "m2"] {
        node.handle.send(&cancel, text).await.unwrap();
        for remote in others.iter_mut() {
            let received = timeout(WAIT, remote.recv_text()).await.unwrap();
            assert_eq!(received.as_deref(), Some(text));
        }
    }

    node.handle.send(&cancel, "m3").await.unwrap();
    sleep(Duration::from_millis(100)).await;
}

fn drain_events(node: &mut Node) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = node.events.try_recv() {
        events.push(event);
    }
    events
}

// ----------------------------------------------------------------------------
// Startup
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_peer_addresses_are_skipped() {
    let node = start_node(
        vec![
            "not-a-peer".to_string(),
            peer_addr(1, 9001),
            peer_addr(2, 9002),
        ],
        ChannelConfig::default(),
    );

    timeout(WAIT, async {
        while node.network.dialed().len() < 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("static peers were not dialed");

    let dialed: Vec<u16> = node.network.dialed().iter().map(|a| a.port).collect();
    assert_eq!(dialed, vec![9001, 9002]);
}

#[tokio::test]
async fn test_transport_start_failure_is_fatal() {
    let (transport, network) = MemoryTransport::failing();
    let mut node = spawn_node(transport, network, vec![], ChannelConfig::default());

    let result = timeout(WAIT, &mut node.task).await.unwrap().unwrap();
    assert!(matches!(result, Err(ChatError::TransportStart(_))));

    let cancel = CancellationToken::new();
    assert!(matches!(
        node.handle.send(&cancel, "anyone?").await,
        Err(ChatError::Closed)
    ));
}

#[tokio::test]
async fn test_zero_sized_channel_rejected() {
    let (transport, _network) = MemoryTransport::new();
    let config = ChannelConfig {
        event_buffer_size: 0,
        ..ChannelConfig::default()
    };
    assert!(matches!(
        Chat::new(transport, vec![], config),
        Err(ChatError::InvalidConfiguration { .. })
    ));
}

// ----------------------------------------------------------------------------
// Messaging
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_broadcast_fan_out() {
    let mut node = start_node(vec![], ChannelConfig::default());
    let peers = [peer(1, "alice"), peer(2, "bob"), peer(3, "carol")];
    let mut remotes = connect_all(&mut node, &peers).await;

    let cancel = CancellationToken::new();
    node.handle.send(&cancel, "hello").await.unwrap();

    for remote in remotes.iter_mut() {
        let text = timeout(WAIT, remote.recv_text()).await.unwrap();
        assert_eq!(text.as_deref(), Some("hello"));
    }

    // Exactly one delivery each
    sleep(Duration::from_millis(50)).await;
    for remote in remotes.iter_mut() {
        assert_eq!(remote.try_recv_text(), None);
    }

    shutdown(&mut node).await;
}

#[tokio::test]
async fn test_inbound_text_reaches_on_msg() {
    let mut node = start_node(vec![], ChannelConfig::default());
    let remotes = connect_all(&mut node, &[peer(4, "dave")]).await;

    remotes[0].send_text("first");
    remotes[0].send_text("second");

    assert_eq!(
        next_event(&mut node).await,
        Event::Msg("dave".to_string(), "first".to_string())
    );
    assert_eq!(
        next_event(&mut node).await,
        Event::Msg("dave".to_string(), "second".to_string())
    );

    shutdown(&mut node).await;
}

#[tokio::test]
async fn test_malformed_message_keeps_session() {
    let mut node = start_node(vec![], ChannelConfig::default());
    let remotes = connect_all(&mut node, &[peer(5, "eve")]).await;

    remotes[0].send_raw(vec![0x03, 0x00]);
    remotes[0].send_text("after garbage");

    assert_eq!(
        next_event(&mut node).await,
        Event::Msg("eve".to_string(), "after garbage".to_string())
    );

    shutdown(&mut node).await;
    let events = drain_events(&mut node);
    assert_eq!(events, vec![Event::Out("eve".to_string())]);
}

#[tokio::test]
async fn test_send_respects_cancellation() {
    let (transport, _network) = MemoryTransport::new();
    let config = ChannelConfig {
        broadcast_buffer_size: 1,
        ..ChannelConfig::default()
    };
    let (_chat, handle) = Chat::new(transport, vec![], config).unwrap();

    let live = CancellationToken::new();
    handle.send(&live, "buffered").await.unwrap();

    // Nobody reads the broadcast channel; the cancelled send must not hang
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let result = timeout(WAIT, handle.send(&cancelled, "stuck")).await.unwrap();
    assert!(matches!(result, Err(ChatError::Cancelled)));
}

#[tokio::test]
async fn test_close_keeps_inbound_running() {
    let node = start_node(vec![], ChannelConfig::default());
    let Node {
        network,
        handle,
        mut events,
        cancel,
        task,
    } = node;

    let remote = network.connect(peer(6, "frank")).await;
    let joined = timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(joined, Some(Event::In("frank".to_string())));

    handle.close();

    remote.send_text("still listening");
    let received = timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(
        received,
        Some(Event::Msg("frank".to_string(), "still listening".to_string()))
    );

    cancel.cancel();
    let result = timeout(WAIT, task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

// ----------------------------------------------------------------------------
// Membership
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_session_is_dropped() {
    let mut node = start_node(vec![], ChannelConfig::default());
    let mut remotes = connect_all(&mut node, &[peer(7, "grace")]).await;

    let mut duplicate = node.network.connect(peer(7, "grace")).await;
    let outcome = timeout(WAIT, duplicate.outcome()).await.unwrap().unwrap();
    assert!(outcome.is_ok());

    // The first session is unaffected
    let cancel = CancellationToken::new();
    node.handle.send(&cancel, "still you").await.unwrap();
    let text = timeout(WAIT, remotes[0].recv_text()).await.unwrap();
    assert_eq!(text.as_deref(), Some("still you"));

    sleep(Duration::from_millis(50)).await;
    assert!(drain_events(&mut node).is_empty());

    shutdown(&mut node).await;
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let mut node = start_node(vec![], ChannelConfig::default());
    let mut remotes = connect_all(&mut node, &[peer(8, "heidi")]).await;

    remotes[0].disconnect();
    assert_eq!(next_event(&mut node).await, Event::Out("heidi".to_string()));

    let _again = connect_all(&mut node, &[peer(8, "heidi")]).await;

    shutdown(&mut node).await;
    assert_eq!(drain_events(&mut node), vec![Event::Out("heidi".to_string())]);
}

#[tokio::test]
async fn test_last_message_is_reported_before_leave() {
    let config = ChannelConfig {
        outbound_buffer_size: 1,
        ..ChannelConfig::default()
    };
    let mut node = start_node(vec![], config);
    let mut remotes = connect_all(&mut node, &[peer(9, "slow"), peer(13, "leaver")]).await;
    let (slow, others) = remotes.split_first_mut().unwrap();

    block_broadcast(&mut node, slow, others).await;

    // Both the text and the exit are queued while the coordinator is busy
    let leaver = &mut others[0];
    leaver.send_text("bye");
    leaver.disconnect();
    assert!(timeout(WAIT, leaver.outcome()).await.unwrap().unwrap().is_ok());

    slow.resume_writes();
    assert_eq!(
        next_event(&mut node).await,
        Event::Msg("leaver".to_string(), "bye".to_string())
    );
    assert_eq!(next_event(&mut node).await, Event::Out("leaver".to_string()));

    // The stalled writes go through once resumed
    for text in ["m1", "m2", "m3"] {
        let received = timeout(WAIT, slow.recv_text()).await.unwrap();
        assert_eq!(received.as_deref(), Some(text));
    }

    shutdown(&mut node).await;
    assert_eq!(drain_events(&mut node), vec![Event::Out("slow".to_string())]);
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_drain_reports_every_exit_before_returning() {
    let mut node = start_node(vec![], ChannelConfig::default());
    let peers = [peer(10, "ivan"), peer(11, "judy"), peer(12, "mallory")];
    let mut remotes = connect_all(&mut node, &peers).await;

    shutdown(&mut node).await;
    assert!(node.network.is_stopped());

    let left: HashSet<Event> = drain_events(&mut node).into_iter().collect();
    let expected: HashSet<Event> = peers.iter().map(|p| Event::Out(p.name.clone())).collect();
    assert_eq!(left, expected);

    for remote in remotes.iter_mut() {
        assert!(remote.outcome().await.unwrap().is_ok());
    }

    let cancel = CancellationToken::new();
    assert!(matches!(
        node.handle.send(&cancel, "too late").await,
        Err(ChatError::Closed)
    ));
}

#[tokio::test]
async fn test_partial_broadcast_under_cancellation() {
    let config = ChannelConfig {
        outbound_buffer_size: 1,
        ..ChannelConfig::default()
    };
    let mut node = start_node(vec![], config);
    let peers = [peer(20, "slow"), peer(21, "fast-1"), peer(22, "fast-2")];
    let mut remotes = connect_all(&mut node, &peers).await;
    remotes[0].stall_writes();

    let cancel = CancellationToken::new();
    node.handle.send(&cancel, "m1").await.unwrap();
    node.handle.send(&cancel, "m2").await.unwrap();
    for remote in remotes.iter_mut().skip(1) {
        assert_eq!(timeout(WAIT, remote.recv_text()).await.unwrap().as_deref(), Some("m1"));
        assert_eq!(timeout(WAIT, remote.recv_text()).await.unwrap().as_deref(), Some("m2"));
    }

    // The slow peer's queue is full, so this round blocks on it
    node.handle.send(&cancel, "m3").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    shutdown(&mut node).await;

    assert_eq!(remotes[0].try_recv_text(), None);
    for remote in remotes.iter_mut().skip(1) {
        let mut rest = Vec::new();
        while let Some(text) = remote.try_recv_text() {
            rest.push(text);
        }
        assert!(rest.len() <= 1);
        assert!(rest.iter().all(|t| t == "m3"));
    }
}

#[tokio::test]
async fn test_drain_discards_late_inbound_messages() {
    let config = ChannelConfig {
        event_buffer_size: 1,
        outbound_buffer_size: 1,
        ..ChannelConfig::default()
    };
    let mut node = start_node(vec![], config);
    let peers = [peer(23, "slow"), peer(24, "chatty")];
    let mut remotes = connect_all(&mut node, &peers).await;
    let (slow, others) = remotes.split_first_mut().unwrap();

    block_broadcast(&mut node, slow, others).await;

    // More text than the event channel holds; the chatty session blocks forwarding it
    for i in 0..10 {
        others[0].send_text(&format!("burst {}", i));
    }
    sleep(Duration::from_millis(50)).await;

    shutdown(&mut node).await;

    let events = drain_events(&mut node);
    assert!(events.iter().all(|e| !matches!(e, Event::Msg(..))));
    let left: HashSet<Event> = events.into_iter().collect();
    let expected: HashSet<Event> = peers.iter().map(|p| Event::Out(p.name.clone())).collect();
    assert_eq!(left, expected);

    for remote in remotes.iter_mut() {
        let outcome = timeout(WAIT, remote.outcome()).await.unwrap().unwrap();
        assert!(outcome.is_ok());
    }
}

// ----------------------------------------------------------------------------
// End-to-end Scenario
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_three_peer_session() {
    let mut node = start_node(
        vec![
            peer_addr(30, 7001),
            peer_addr(31, 7002),
            "garbage".to_string(),
        ],
        ChannelConfig::default(),
    );
    let a = peer(30, "A");
    let b = peer(31, "B");
    let mut remotes = connect_all(&mut node, &[a.clone(), b.clone()]).await;
    assert_eq!(node.network.dialed().len(), 2);

    let cancel = CancellationToken::new();
    node.handle.send(&cancel, "hello").await.unwrap();
    for remote in remotes.iter_mut() {
        let text = timeout(WAIT, remote.recv_text()).await.unwrap();
        assert_eq!(text.as_deref(), Some("hello"));
    }

    remotes[0].send_text("hi all");
    assert_eq!(
        next_event(&mut node).await,
        Event::Msg("A".to_string(), "hi all".to_string())
    );

    remotes[1].disconnect();
    assert_eq!(next_event(&mut node).await, Event::Out("B".to_string()));

    shutdown(&mut node).await;
    assert_eq!(drain_events(&mut node), vec![Event::Out("A".to_string())]);
}
