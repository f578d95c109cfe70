//! Background reader loop.
//!
//! Claims the read half of the active session, receives frames and
//! dispatches decoded envelopes. Transport failures invalidate the session
//! and leave recovery to the reconnector; the loop itself never gives up
//! until the connection is closed.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::connection::websocket::{self, WsSource};
use crate::connection::{ConnectionCore, ConnectionState};
use crate::event_handlers::{ConnectionError, DisconnectReason};
use crate::models::EnvelopeType;

/// Why `read_session` returned.
enum ReadExit {
    /// The connection is closing; the outer loop must exit.
    Shutdown,
    /// The session ended (error, close frame, server reconnect hint); the
    /// outer loop pauses briefly and then waits for the next session.
    SessionEnded,
}

pub(crate) async fn reader_loop(core: Arc<ConnectionCore>) {
    let mut shutdown = core.shutdown_rx();
    loop {
        if core.is_closed() {
            return;
        }

        // Claim the read half when a session is up; otherwise idle one tick.
        let claimed = {
            let mut inner = core.inner.lock().await;
            if inner.state == ConnectionState::Active {
                inner.source.take().map(|source| (source, inner.epoch))
            } else {
                None
            }
        };

        match claimed {
            Some((source, epoch)) => {
                match read_session(&core, &mut shutdown, source, epoch).await {
                    ReadExit::Shutdown => return,
                    ReadExit::SessionEnded => {
                        if !core.wait(&mut shutdown, core.timeouts.retry_delay).await {
                            return;
                        }
                    }
                }
            }
            None => {
                if !core.wait(&mut shutdown, core.timeouts.tick_interval).await {
                    return;
                }
            }
        }
    }
}

/// Receive frames from one session until it ends or the connection closes.
async fn read_session(
    core: &ConnectionCore,
    shutdown: &mut watch::Receiver<bool>,
    mut source: WsSource,
    epoch: u64,
) -> ReadExit {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => return ReadExit::Shutdown,
            frame = source.next() => frame,
            // The watchdog or a failed send may have torn this session down
            // while the link is silently dead and produces no frame to wake
            // us; poll for that so the stale read half gets released.
            _ = tokio::time::sleep(core.timeouts.tick_interval) => {
                let inner = core.inner.lock().await;
                if inner.epoch != epoch || inner.state != ConnectionState::Active {
                    return ReadExit::SessionEnded;
                }
                continue;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if dispatch_text(core, text.as_str(), epoch).await {
                    return ReadExit::SessionEnded;
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                // Transport-level ping; answer on the shared write half.
                let mut inner = core.inner.lock().await;
                if let Some(sink) = inner.sink.as_mut() {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
            }
            Some(Ok(Message::Pong(_))) => {
                log::debug!(
                    "[pubsub-link] [conn {}] transport-level pong received",
                    core.id
                );
            }
            Some(Ok(Message::Binary(data))) => {
                // The protocol is text-only; tolerate and ignore.
                log::debug!(
                    "[pubsub-link] [conn {}] ignoring {}-byte binary frame",
                    core.id,
                    data.len()
                );
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                    None => DisconnectReason::new("server closed the connection"),
                };
                log::info!("[pubsub-link] [conn {}] {}", core.id, reason);
                let mut inner = core.inner.lock().await;
                if core.invalidate_session(&mut inner, epoch).await {
                    drop(inner);
                    core.emit_disconnect(reason);
                }
                return ReadExit::SessionEnded;
            }
            Some(Err(e)) => {
                core.emit_error(ConnectionError::new(format!("read failed: {}", e), true));
                let mut inner = core.inner.lock().await;
                if core.invalidate_session(&mut inner, epoch).await {
                    drop(inner);
                    core.emit_disconnect(DisconnectReason::new(format!("read failed: {}", e)));
                }
                return ReadExit::SessionEnded;
            }
            None => {
                let mut inner = core.inner.lock().await;
                if core.invalidate_session(&mut inner, epoch).await {
                    drop(inner);
                    core.emit_disconnect(DisconnectReason::new("stream ended"));
                }
                return ReadExit::SessionEnded;
            }
        }
    }
}

/// Decode and dispatch one text frame. Returns `true` when the frame ended
/// the session (a server-initiated reconnect hint).
async fn dispatch_text(core: &ConnectionCore, text: &str, epoch: u64) -> bool {
    let envelope = match websocket::parse_envelope(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Malformed frame: report it and keep reading.
            core.emit_error(ConnectionError::new(e.to_string(), true));
            return false;
        }
    };

    match envelope.kind {
        EnvelopeType::Pong => {
            let mut inner = core.inner.lock().await;
            if inner.epoch != epoch {
                // Late PONG from a torn-down session; the new session's
                // heartbeat bookkeeping is none of its business.
                return false;
            }
            let start = inner.ping_start;
            let end = Instant::now();
            inner.ping_start = end;
            inner.awaiting_pong = false;
            drop(inner);
            core.emit_pong(start, end);
            false
        }
        EnvelopeType::Reconnect => {
            core.emit_info(&format!("warning, got {} response", EnvelopeType::Reconnect));
            let mut inner = core.inner.lock().await;
            if core.invalidate_session(&mut inner, epoch).await {
                drop(inner);
                core.emit_disconnect(DisconnectReason::new("server requested a reconnect"));
            }
            true
        }
        EnvelopeType::Response => {
            if envelope.has_error() {
                core.emit_error(ConnectionError::new(envelope.error.clone(), false));
            } else {
                core.emit_info(&format!(
                    "type: {}, data: {:?}",
                    envelope.kind, envelope.data
                ));
            }
            false
        }
        _ => {
            core.emit_message(&envelope);
            false
        }
    }
}
