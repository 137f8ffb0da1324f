//! Accept / receive-message isolation over real loopback sockets.

use std::sync::Arc;

use affix_stack::affix::{AffixError, AffixRegistry};
use affix_stack::affixes::StatsAffix;
use affix_stack::net::{NetworkApi, Socket, TcpServer, TokioNetwork, UdpServer};

mod common;

use common::{loopback, recv_exact, sends_of, tagged_chain};

#[tokio::test]
async fn each_accept_gets_a_private_chain() {
    let net = Arc::new(TokioNetwork::new());
    let (a, b) = tagged_chain(net.clone());

    let server = a.listen_for_connection(loopback()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let client1 = net.open_connection(addr, None).await.unwrap();
    let (_, conn1) = server.accept_bound().await.unwrap();
    let client2 = net.open_connection(addr, None).await.unwrap();
    let (_, conn2) = server.accept_bound().await.unwrap();

    let owner1 = conn1.owner();
    let owner2 = conn2.owner();
    assert!(!Arc::ptr_eq(owner1, owner2));
    assert!(!Arc::ptr_eq(owner1, &a));
    assert_eq!(owner1.to_string(), a.to_string());
    assert_eq!(owner2.to_string(), a.to_string());

    let below1 = owner1.peek().node().cloned().unwrap();
    let below2 = owner2.peek().node().cloned().unwrap();
    assert!(!Arc::ptr_eq(&below1, &below2));
    assert!(!Arc::ptr_eq(&below1, &b));

    conn1.send(b"x").await.unwrap();
    assert_eq!(recv_exact(client1.as_ref(), 3).await, b"xab");

    // Both levels of the connection ran on the one copy it owns.
    assert_eq!(sends_of(owner1), 1);
    assert_eq!(sends_of(&below1), 1);
    assert_eq!(sends_of(owner2), 0);
    assert_eq!(sends_of(&below2), 0);
    assert_eq!(sends_of(&a), 0);
    assert_eq!(sends_of(&b), 0);

    // Reshaping one connection's chain leaves the others alone.
    owner1.pop().unwrap();
    assert_eq!(owner1.depth(), 1);
    assert_eq!(owner2.depth(), 2);
    assert_eq!(a.depth(), 2);

    conn2.send(b"y").await.unwrap();
    assert_eq!(recv_exact(client2.as_ref(), 3).await, b"yab");
}

#[tokio::test]
async fn operations_run_top_to_bottom() {
    let net = Arc::new(TokioNetwork::new());
    let server = net.listen_for_connection(loopback()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (a, _) = tagged_chain(net.clone());
    let client = a.open_connection(addr, None).await.unwrap();
    let (_, raw) = server.accept().await.unwrap();

    client.send(b"m").await.unwrap();
    assert_eq!(recv_exact(raw.as_ref(), 3).await, b"mab");
    assert!(Arc::ptr_eq(client.owner(), &a));

    assert!(client.close().await.unwrap());
    assert!(recv_exact(raw.as_ref(), 1).await.is_empty());
}

#[tokio::test]
async fn stats_are_per_connection() {
    let net: Arc<dyn NetworkApi> = Arc::new(TokioNetwork::new());
    let registry = AffixRegistry::with_builtin();
    let stack = registry.build("(StatsAffix)", net.clone()).unwrap();
    let top = stack.top().cloned().unwrap();

    let server = top.listen_for_connection(loopback()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let client1 = net.open_connection(addr, None).await.unwrap();
    let (_, conn1) = server.accept_bound().await.unwrap();
    let client2 = net.open_connection(addr, None).await.unwrap();
    let (_, conn2) = server.accept_bound().await.unwrap();

    client1.send(b"12345").await.unwrap();
    assert_eq!(recv_exact(&conn1, 5).await, b"12345");
    client2.send(b"12").await.unwrap();
    assert_eq!(recv_exact(&conn2, 2).await, b"12");

    let stats = |socket: &affix_stack::affix::AffixSocket| {
        socket.owner().downcast_ref::<StatsAffix>().unwrap().snapshot()
    };
    assert_eq!(stats(&conn1).bytes_received, 5);
    assert_eq!(stats(&conn1).connections_accepted, 1);
    assert_eq!(stats(&conn2).bytes_received, 2);
    assert_eq!(stats(&conn2).connections_accepted, 1);

    let listener_stats = top.downcast_ref::<StatsAffix>().unwrap().snapshot();
    assert_eq!(listener_stats.bytes_received, 0);
    assert_eq!(listener_stats.connections_accepted, 0);
}

#[tokio::test]
async fn stacked_stats_count_on_one_copy() {
    let net: Arc<dyn NetworkApi> = Arc::new(TokioNetwork::new());
    let registry = AffixRegistry::with_builtin();
    let stack = registry.build("(StatsAffix)(StatsAffix)", net.clone()).unwrap();
    let top = stack.top().cloned().unwrap();
    let bottom = top.peek().node().cloned().unwrap();

    let server = top.listen_for_connection(loopback()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let client = net.open_connection(addr, None).await.unwrap();
    let (_, conn) = server.accept_bound().await.unwrap();

    client.send(b"abcd").await.unwrap();
    assert_eq!(recv_exact(&conn, 4).await, b"abcd");
    conn.send(b"xy").await.unwrap();
    assert_eq!(recv_exact(client.as_ref(), 2).await, b"xy");

    let below = conn.owner().peek().node().cloned().unwrap();
    for node in [conn.owner(), &below] {
        let stats = node.downcast_ref::<StatsAffix>().unwrap().snapshot();
        assert_eq!(stats.connections_accepted, 1);
        assert_eq!(stats.bytes_received, 4);
        assert_eq!(stats.bytes_sent, 2);
    }
    for node in [&top, &bottom] {
        let stats = node.downcast_ref::<StatsAffix>().unwrap().snapshot();
        assert_eq!(stats.connections_accepted, 0);
        assert_eq!(stats.bytes_received, 0);
    }
}

#[tokio::test]
async fn message_and_reply_use_the_same_copy() {
    let net: Arc<dyn NetworkApi> = Arc::new(TokioNetwork::new());
    let registry = AffixRegistry::with_builtin();
    let stack = registry.build("(StatsAffix)(StatsAffix)", net.clone()).unwrap();
    let top = stack.top().cloned().unwrap();

    let server = top.listen_for_messages(loopback()).await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let client = net.listen_for_messages(loopback()).await.unwrap();
    let client_addr = client.local_addr().unwrap();

    net.send_message(server_addr, Some(client_addr), b"hello").await.unwrap();
    let message = server.recv_bound().await.unwrap();
    message.reply(b"hi").await.unwrap();
    assert_eq!(client.recv_message().await.unwrap().payload, b"hi");

    let below = message.via().peek().node().cloned().unwrap();
    for node in [message.via(), &below] {
        let stats = node.downcast_ref::<StatsAffix>().unwrap().snapshot();
        assert_eq!(stats.messages_received, 1);
        assert_eq!(stats.bytes_received, 5);
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 2);
    }
    let listener_stats = top.downcast_ref::<StatsAffix>().unwrap().snapshot();
    assert_eq!(listener_stats.messages_received, 0);
}

#[tokio::test]
async fn messages_reply_through_their_copy() {
    let net = Arc::new(TokioNetwork::new());
    let (a, _) = tagged_chain(net.clone());

    let server = a.listen_for_messages(loopback()).await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let client = net.listen_for_messages(loopback()).await.unwrap();
    let client_addr = client.local_addr().unwrap();

    net.send_message(server_addr, Some(client_addr), b"one").await.unwrap();
    net.send_message(server_addr, Some(client_addr), b"two").await.unwrap();

    let first = server.recv_bound().await.unwrap();
    let second = server.recv_bound().await.unwrap();
    assert_eq!(first.remote(), client_addr);
    assert!(!Arc::ptr_eq(first.via(), second.via()));
    assert!(!Arc::ptr_eq(first.via(), &a));

    first.reply(first.payload()).await.unwrap();
    let echoed = client.recv_message().await.unwrap();
    assert_eq!(echoed.payload, first.payload());
    assert_eq!(echoed.remote, server_addr);
}

#[tokio::test]
async fn io_errors_pass_through_unchanged() {
    let net = Arc::new(TokioNetwork::new());

    // Grab a free port, then release it so nothing is listening there.
    let addr = {
        let scratch = net.listen_for_connection(loopback()).await.unwrap();
        scratch.local_addr().unwrap()
    };

    let (a, _) = tagged_chain(net);
    let err = a.open_connection(addr, None).await.unwrap_err();
    match err {
        AffixError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_listener_stops_accepting() {
    let net = Arc::new(TokioNetwork::new());
    let (a, _) = tagged_chain(net);
    let server = a.listen_for_connection(loopback()).await.unwrap();

    assert!(server.close().await.unwrap());
    assert!(!server.close().await.unwrap());
    assert!(matches!(server.accept().await, Err(AffixError::SocketClosed)));
}
