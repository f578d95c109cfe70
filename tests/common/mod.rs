#![allow(dead_code)]
//! In-process WebSocket server for integration tests.
//!
//! Accepts real client connections, decodes their text frames into
//! [`Envelope`]s and lets a test script responses, so the full
//! dial → LISTEN → push → reconnect cycle runs without a remote service.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;

use pubsub_link::{Envelope, EnvelopeType, PubSubTimeouts};

/// Generous bound for every wait; tests normally finish far quicker.
pub const WAIT: Duration = Duration::from_secs(5);

/// Timeouts with fast loop pacing but the heartbeat effectively disabled,
/// for tests that should not see keepalive traffic.
pub fn test_timeouts() -> PubSubTimeouts {
    PubSubTimeouts::builder()
        .connection_timeout(Duration::from_secs(2))
        .keepalive_interval(Duration::from_secs(3600))
        .pong_timeout(Duration::from_secs(3600))
        .retry_delay(Duration::from_millis(25))
        .tick_interval(Duration::from_millis(10))
        .build()
}

enum SessionCmd {
    Send(String),
    Close,
}

/// One accepted client connection.
pub struct ServerSession {
    frames: mpsc::UnboundedReceiver<Envelope>,
    cmd: mpsc::UnboundedSender<SessionCmd>,
}

impl ServerSession {
    /// Send an envelope to the client.
    pub fn send(&self, envelope: &Envelope) {
        let payload = serde_json::to_string(envelope).expect("test envelope serializes");
        let _ = self.cmd.send(SessionCmd::Send(payload));
    }

    /// Send a raw text frame to the client.
    pub fn send_raw(&self, raw: &str) {
        let _ = self.cmd.send(SessionCmd::Send(raw.to_owned()));
    }

    /// Close the server side of the session.
    pub fn close(&self) {
        let _ = self.cmd.send(SessionCmd::Close);
    }

    /// Next decoded frame from the client, `None` once the session ended.
    pub async fn next_frame(&mut self) -> Option<Envelope> {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
    }

    /// Wait for the next frame of the given type, skipping interleaved
    /// keepalive traffic.
    pub async fn expect_frame(&mut self, kind: EnvelopeType) -> Envelope {
        loop {
            match self.next_frame().await {
                Some(envelope) if envelope.kind == kind => return envelope,
                Some(_) => continue,
                None => panic!("session ended while waiting for a {} frame", kind),
            }
        }
    }

    /// Wait for the client to close the session, skipping remaining frames.
    pub async fn expect_end(&mut self) {
        loop {
            if self.next_frame().await.is_none() {
                return;
            }
        }
    }
}

/// Listening test server; each client connection surfaces as a
/// [`ServerSession`].
pub struct TestServer {
    pub url: String,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (mut sink, mut source) = ws.split();
                let (frame_tx, frames) = mpsc::unbounded_channel();
                let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SessionCmd>();

                tokio::spawn(async move {
                    while let Some(cmd) = cmd_rx.recv().await {
                        match cmd {
                            SessionCmd::Send(text) => {
                                if sink.send(Message::Text(text.into())).await.is_err() {
                                    return;
                                }
                            }
                            SessionCmd::Close => {
                                let _ = sink.close().await;
                                return;
                            }
                        }
                    }
                });

                tokio::spawn(async move {
                    while let Some(Ok(message)) = source.next().await {
                        if let Message::Text(text) = message {
                            if let Ok(envelope) = serde_json::from_str::<Envelope>(text.as_str()) {
                                if frame_tx.send(envelope).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    // Dropping frame_tx signals end-of-session to the test.
                });

                if session_tx.send(ServerSession { frames, cmd: cmd_tx }).is_err() {
                    return;
                }
            }
        });

        Self {
            url: format!("ws://{}", addr),
            sessions,
        }
    }

    /// Wait for the next client connection.
    pub async fn next_session(&mut self) -> ServerSession {
        timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("test server accept loop ended")
    }
}
