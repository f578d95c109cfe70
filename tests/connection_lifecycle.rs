//! Integration tests driving the full connection lifecycle against an
//! in-process WebSocket server: connect, LISTEN replay, message pushes,
//! heartbeat, and the recovery paths.

mod common;

use common::{test_timeouts, TestServer, WAIT};
use pubsub_link::{
    Connection, Envelope, EnvelopeType, EventHandlers, PubSub, PubSubTimeouts,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[tokio::test]
async fn connect_declares_full_topic_set() {
    let mut server = TestServer::spawn().await;
    let (connect_tx, mut connect_rx) = mpsc::unbounded_channel();

    let conn = Connection::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .event_handlers(EventHandlers::new().on_connect(move |id| {
            let _ = connect_tx.send(id);
        }))
        .build()
        .unwrap();

    // The first topic makes the reconnector dial.
    conn.add_topic("alerts.1").await;
    let mut session = server.next_session().await;

    let listen = session.expect_frame(EnvelopeType::Listen).await;
    assert_eq!(listen.topics().unwrap().topics, vec!["alerts.1"]);

    let id = timeout(WAIT, connect_rx.recv()).await.unwrap().unwrap();
    assert_eq!(id, conn.id());
    assert!(conn.is_connected());

    // Adding while active re-declares the FULL set, not the delta.
    conn.add_topic("alerts.2").await;
    let listen = session.expect_frame(EnvelopeType::Listen).await;
    assert_eq!(
        listen.topics().unwrap().topics,
        vec!["alerts.1", "alerts.2"]
    );

    conn.close().await;
}

#[tokio::test]
async fn message_push_reaches_callback() {
    let mut server = TestServer::spawn().await;
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();

    let conn = Connection::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .event_handlers(EventHandlers::new().on_message(move |_id, envelope| {
            let _ = msg_tx.send(envelope.clone());
        }))
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut session = server.next_session().await;
    session.expect_frame(EnvelopeType::Listen).await;

    let mut push = Envelope::new(EnvelopeType::Message);
    push.data = Some(json!({ "topic": "alerts.1", "message": "payload-1" }));
    session.send(&push);

    let envelope = timeout(WAIT, msg_rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.kind, EnvelopeType::Message);
    let data = envelope.message().unwrap();
    assert_eq!(data.topic, "alerts.1");
    assert_eq!(data.message, "payload-1");

    conn.close().await;
}

#[tokio::test]
async fn remove_topic_unlistens_and_empty_connection_closes() {
    let mut server = TestServer::spawn().await;

    let conn = Connection::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut session = server.next_session().await;
    session.expect_frame(EnvelopeType::Listen).await;

    conn.add_topic("alerts.2").await;
    session.expect_frame(EnvelopeType::Listen).await;

    // Removing one topic withdraws just that topic.
    conn.remove_topic("alerts.1").await;
    let unlisten = session.expect_frame(EnvelopeType::Unlisten).await;
    assert_eq!(unlisten.topics().unwrap().topics, vec!["alerts.1"]);
    assert!(!conn.is_closed());

    // Removing the last topic closes the connection for good.
    conn.remove_topic("alerts.2").await;
    let unlisten = session.expect_frame(EnvelopeType::Unlisten).await;
    assert_eq!(unlisten.topics().unwrap().topics, vec!["alerts.2"]);
    assert!(conn.is_closed());
    session.expect_end().await;
}

#[tokio::test]
async fn heartbeat_ping_pong_round_trip() {
    let mut server = TestServer::spawn().await;
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();

    let conn = Connection::builder(server.url.as_str())
        .timeouts(PubSubTimeouts::for_testing())
        .event_handlers(
            EventHandlers::new()
                .on_ping(move |_id, start| {
                    let _ = ping_tx.send(start);
                })
                .on_pong(move |_id, start, end| {
                    let _ = pong_tx.send((start, end));
                }),
        )
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut session = server.next_session().await;
    session.expect_frame(EnvelopeType::Listen).await;

    // The keepalive interval elapses and the client probes us.
    session.expect_frame(EnvelopeType::Ping).await;
    let ping_sent = timeout(WAIT, ping_rx.recv()).await.unwrap().unwrap();

    session.send(&Envelope::new(EnvelopeType::Pong));
    let (start, end) = timeout(WAIT, pong_rx.recv()).await.unwrap().unwrap();
    assert_eq!(start, ping_sent);
    assert!(end >= start);

    conn.close().await;
}

#[tokio::test]
async fn missed_pong_tears_down_and_redials() {
    let mut server = TestServer::spawn().await;
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();

    let conn = Connection::builder(server.url.as_str())
        .timeouts(PubSubTimeouts::for_testing())
        .event_handlers(EventHandlers::new().on_disconnect(move |_id, reason| {
            let _ = disconnect_tx.send(reason);
        }))
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut first = server.next_session().await;
    first.expect_frame(EnvelopeType::Listen).await;

    // Ignore the client's PINGs; the watchdog declares the session dead.
    timeout(WAIT, disconnect_rx.recv()).await.unwrap().unwrap();

    // The reconnector redials and replays the full topic set.
    let mut second = server.next_session().await;
    let listen = second.expect_frame(EnvelopeType::Listen).await;
    assert_eq!(listen.topics().unwrap().topics, vec!["alerts.1"]);

    conn.close().await;
}

#[tokio::test]
async fn server_reconnect_hint_triggers_redial() {
    let mut server = TestServer::spawn().await;
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();

    let conn = Connection::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .event_handlers(EventHandlers::new().on_disconnect(move |_id, reason| {
            let _ = disconnect_tx.send(reason);
        }))
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut first = server.next_session().await;
    first.expect_frame(EnvelopeType::Listen).await;

    first.send(&Envelope::new(EnvelopeType::Reconnect));
    timeout(WAIT, disconnect_rx.recv()).await.unwrap().unwrap();

    let mut second = server.next_session().await;
    let listen = second.expect_frame(EnvelopeType::Listen).await;
    assert_eq!(listen.topics().unwrap().topics, vec!["alerts.1"]);

    conn.close().await;
}

#[tokio::test]
async fn server_close_triggers_redial() {
    let mut server = TestServer::spawn().await;

    let conn = Connection::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut first = server.next_session().await;
    first.expect_frame(EnvelopeType::Listen).await;

    first.close();

    let mut second = server.next_session().await;
    let listen = second.expect_frame(EnvelopeType::Listen).await;
    assert_eq!(listen.topics().unwrap().topics, vec!["alerts.1"]);

    conn.close().await;
}

#[tokio::test]
async fn response_and_decode_errors_fire_error_callback() {
    let mut server = TestServer::spawn().await;
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();

    let conn = Connection::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .event_handlers(EventHandlers::new().on_error(move |_id, error| {
            let _ = error_tx.send(error);
        }))
        .build()
        .unwrap();

    conn.add_topic("alerts.1").await;
    let mut session = server.next_session().await;
    session.expect_frame(EnvelopeType::Listen).await;

    // A rejected request surfaces through on_error but keeps the session.
    let mut rejection = Envelope::new(EnvelopeType::Response);
    rejection.error = "ERR_BADTOPIC".to_string();
    session.send(&rejection);

    let error = timeout(WAIT, error_rx.recv()).await.unwrap().unwrap();
    assert_eq!(error.message, "ERR_BADTOPIC");
    assert!(!error.recoverable);

    // A malformed frame is reported and reading continues.
    session.send_raw("{this is not an envelope");
    let error = timeout(WAIT, error_rx.recv()).await.unwrap().unwrap();
    assert!(error.message.contains("malformed envelope"));
    assert!(conn.is_connected(), "decode errors must not drop the session");

    conn.close().await;
}

#[tokio::test]
async fn orchestrator_end_to_end() {
    let mut server = TestServer::spawn().await;
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();

    let pubsub = PubSub::builder(server.url.as_str())
        .timeouts(test_timeouts())
        .event_handlers(EventHandlers::new().on_message(move |_id, envelope| {
            let _ = msg_tx.send(envelope.clone());
        }))
        .build()
        .unwrap();

    pubsub.listen("alerts", (1,)).await;
    assert_eq!(pubsub.connection_count().await, 1);

    let mut session = server.next_session().await;
    let listen = session.expect_frame(EnvelopeType::Listen).await;
    assert_eq!(listen.topics().unwrap().topics, vec!["alerts.1"]);

    let mut push = Envelope::new(EnvelopeType::Message);
    push.data = Some(json!({ "topic": "alerts.1", "message": "hello" }));
    session.send(&push);

    let envelope = timeout(WAIT, msg_rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.message().unwrap().message, "hello");

    // Unsubscribing the last topic evicts the emptied connection.
    pubsub.unlisten("alerts", (1,)).await;
    assert_eq!(pubsub.connection_count().await, 0);
    session.expect_end().await;

    pubsub.close().await;
}
