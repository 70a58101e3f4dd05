mod common;

use std::time::Duration;

use common::{next_event, setup, ChannelHandler, PeerEvent, RawPeer, WAIT};
use duochat::{Callbacks, ConnectionManager, Message, MessageKind, Role};
use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};

#[rstest]
#[tokio::test]
async fn test_listener_accepts_a_new_peer_after_disconnect(_setup: ()) {
    let (handler, mut events) = ChannelHandler::new();
    let manager = ConnectionManager::listen(0, handler).expect("bind listener");
    assert_eq!(manager.role(), Role::Listener);
    let port = manager.local_addr().unwrap().port();

    let mut first = RawPeer::connect(port).await;
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));
    first.writer.shutdown().await.unwrap();
    drop(first);

    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected));
    assert!(!manager.is_connected());

    let mut second = RawPeer::connect(port).await;
    // exactly one disconnect: the next event is the new connection
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));
    assert!(manager.is_connected());

    let message = Message::new("after reconnect");
    second.send(&message).await;
    match next_event(&mut events).await {
        PeerEvent::Received(received) => assert_eq!(received.identifier(), message.identifier()),
        other => panic!("unexpected event {:?}", other),
    }
    let ack = second.receive().await;
    assert_eq!(ack.kind(), MessageKind::Acknowledge);
    assert_eq!(ack.identifier(), message.identifier());

    let reply = Message::new("from listener");
    manager.send(reply.clone());
    assert_eq!(second.receive().await.identifier(), reply.identifier());
}

#[rstest]
#[tokio::test]
async fn test_second_peer_replaces_the_active_one(_setup: ()) {
    let (handler, mut events) = ChannelHandler::new();
    let manager = ConnectionManager::listen(0, handler).expect("bind listener");
    let port = manager.local_addr().unwrap().port();

    let mut first = RawPeer::connect(port).await;
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));

    let mut second = RawPeer::connect(port).await;
    // replacement is silent: no disconnect between the two connects
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));
    assert!(manager.is_connected());

    let read = timeout(WAIT, first.connection.read_frame())
        .await
        .expect("first peer observes the close");
    assert!(matches!(read, Ok(None)), "unexpected read {:?}", read);

    let message = Message::new("i am the peer now");
    second.send(&message).await;
    match next_event(&mut events).await {
        PeerEvent::Received(received) => assert_eq!(received.identifier(), message.identifier()),
        other => panic!("unexpected event {:?}", other),
    }
    let ack = second.receive().await;
    assert_eq!(ack.kind(), MessageKind::Acknowledge);
    assert_eq!(ack.identifier(), message.identifier());
    assert!(events.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn test_teardown_closes_socket_and_silences_handler(_setup: ()) {
    let (handler, mut events) = ChannelHandler::new();
    let manager = ConnectionManager::listen(0, handler).expect("bind listener");
    let port = manager.local_addr().unwrap().port();

    let mut peer = RawPeer::connect(port).await;
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));

    drop(manager);

    // the handler is released together with the background thread and saw
    // nothing after the drop started
    let remaining = timeout(WAIT, events.recv()).await.expect("handler released");
    assert!(remaining.is_none(), "unexpected event {:?}", remaining);

    let read = timeout(WAIT, peer.connection.read_frame())
        .await
        .expect("peer observes the close");
    assert!(matches!(read, Ok(None) | Err(_)));

    // writing afterwards produces no notification either
    let _ = peer.writer.write_all(b"late").await;
    assert!(events.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn test_connector_reports_disconnect_without_reconnecting(_setup: ()) {
    let (listener_handler, mut listener_events) = ChannelHandler::new();
    let listener = ConnectionManager::listen(0, listener_handler).expect("bind listener");
    let port = listener.local_addr().unwrap().port();

    let (handler, mut events) = ChannelHandler::new();
    let connector = ConnectionManager::connect(port, "127.0.0.1", handler).expect("connector");
    assert_eq!(connector.role(), Role::Connector);
    assert!(connector.local_addr().is_none());
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));
    assert!(matches!(
        next_event(&mut listener_events).await,
        PeerEvent::Connected(_)
    ));

    drop(listener);
    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected));
    assert!(!connector.is_connected());

    // sending with an empty slot is silently dropped
    connector.send(Message::new("nobody home"));
    sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn test_connect_failure_is_reported(_setup: ()) {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let (handler, mut events) = ChannelHandler::new();
    let connector = ConnectionManager::connect(port, "127.0.0.1", handler).expect("connector");

    assert!(matches!(
        next_event(&mut events).await,
        PeerEvent::ConnectFailed(_)
    ));
    sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
    assert!(!connector.is_connected());
}

#[rstest]
#[tokio::test]
async fn test_read_waits_for_the_connection(_setup: ()) {
    // a bare listener that accepts late, so the connector reads before connecting
    let raw_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = raw_listener.local_addr().unwrap().port();

    let (handler, mut events) = ChannelHandler::new();
    let _connector = ConnectionManager::connect(port, "localhost", handler).expect("connector");

    let (mut stream, _) = timeout(WAIT, raw_listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(next_event(&mut events).await, PeerEvent::Connected(_)));

    let message = Message::new("welcome");
    stream
        .write_all(&duochat::MessageCodec::encode(&message))
        .await
        .unwrap();
    match next_event(&mut events).await {
        PeerEvent::Received(received) => assert_eq!(received.text(), "welcome"),
        other => panic!("unexpected event {:?}", other),
    }

    let mut ack = vec![0u8; 18];
    timeout(WAIT, stream.read_exact(&mut ack))
        .await
        .unwrap()
        .unwrap();
    let ack = duochat::MessageCodec::decode(&ack).unwrap();
    assert_eq!(ack.identifier(), message.identifier());
}

#[test]
fn test_port_in_use_fails_synchronously() {
    let first = ConnectionManager::listen(0, Callbacks::new(|_| {}, |_| {}, || {}))
        .expect("bind listener");
    let port = first.local_addr().unwrap().port();

    let second = ConnectionManager::listen(port, Callbacks::new(|_| {}, |_| {}, || {}));
    assert!(second.is_err());
}
