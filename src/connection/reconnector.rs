//! Background reconnector loop.
//!
//! The single path that establishes sessions, first connect included.
//! Whenever the connection is down and has at least one topic it dials the
//! endpoint, installs the fresh session and re-declares the full topic set
//! with one LISTEN request. Failures are reported and retried forever with
//! a bounded pause; this client is meant to stay connected indefinitely.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use futures_util::StreamExt;

use crate::connection::websocket::{self, WsStream};
use crate::connection::{ConnectionCore, ConnectionState};
use crate::event_handlers::{ConnectionError, DisconnectReason};
use crate::models::Envelope;

pub(crate) async fn reconnector_loop(core: Arc<ConnectionCore>) {
    let mut shutdown = core.shutdown_rx();
    loop {
        if core.is_closed() {
            return;
        }

        // Claim the dial: Disconnected -> Connecting, and only when there
        // are topics to restore. A topic-less connection stays down.
        let should_dial = {
            let mut inner = core.inner.lock().await;
            if inner.state == ConnectionState::Disconnected && !inner.topics.is_empty() {
                inner.state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        };

        if !should_dial {
            if !core.wait(&mut shutdown, core.timeouts.tick_interval).await {
                return;
            }
            continue;
        }

        core.emit_info(&format!("connecting to {}", core.url));
        match websocket::dial(&core.url, core.timeouts.connection_timeout).await {
            Ok(stream) => install_session(&core, stream).await,
            Err(e) => {
                {
                    let mut inner = core.inner.lock().await;
                    if inner.state == ConnectionState::Connecting {
                        inner.state = ConnectionState::Disconnected;
                    }
                }
                log::warn!("[pubsub-link] [conn {}] dial failed: {}", core.id, e);
                core.emit_error(ConnectionError::new(e.to_string(), true));
                if !core.wait(&mut shutdown, core.timeouts.retry_delay).await {
                    return;
                }
            }
        }
    }
}

/// Install a freshly dialed session: split the stream, reset the heartbeat
/// bookkeeping, mark the connection active and re-declare the full topic
/// set.
async fn install_session(core: &ConnectionCore, stream: WsStream) {
    let (sink, source) = stream.split();

    let mut inner = core.inner.lock().await;
    if inner.state != ConnectionState::Connecting {
        // Closed while dialing; discard the fresh socket.
        let mut sink = sink;
        websocket::close_sink(&mut sink).await;
        return;
    }

    inner.sink = Some(sink);
    inner.source = Some(source);
    inner.ping_start = Instant::now();
    inner.awaiting_pong = false;
    inner.epoch += 1;
    inner.state = ConnectionState::Active;
    core.connected.store(true, Ordering::SeqCst);

    log::info!("[pubsub-link] [conn {}] connected to {}", core.id, core.url);
    core.emit_info("connected");
    core.emit_connect();

    // The sole path that restores subscriptions after any disconnection:
    // LISTEN always carries the full current topic set.
    let epoch = inner.epoch;
    let frame = Envelope::listen(inner.topics.iter().cloned().collect());
    let Some(sink) = inner.sink.as_mut() else {
        return;
    };
    if let Err(e) = websocket::send_envelope(sink, &frame).await {
        core.emit_error(ConnectionError::new(e.to_string(), true));
        if core.invalidate_session(&mut inner, epoch).await {
            drop(inner);
            core.emit_disconnect(DisconnectReason::new(format!(
                "failed to restore subscriptions: {}",
                e
            )));
        }
    }
}
