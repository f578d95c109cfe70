//! Keepalive heartbeat: a PING sender and a PONG watchdog.
//!
//! The sender issues a PING envelope once per keepalive interval while a
//! session is active and no PING is outstanding. The watchdog treats a
//! missed PONG as a dead connection: unlike a local send failure there is
//! nothing to retry, the session is torn down and the reconnector rebuilds
//! it.

use std::sync::Arc;
use std::time::Instant;

use crate::connection::websocket;
use crate::connection::{ConnectionCore, ConnectionState};
use crate::event_handlers::{ConnectionError, DisconnectReason};
use crate::models::Envelope;

pub(crate) async fn sender_loop(core: Arc<ConnectionCore>) {
    let mut shutdown = core.shutdown_rx();
    loop {
        if !core.wait(&mut shutdown, core.timeouts.tick_interval).await {
            return;
        }

        let mut inner = core.inner.lock().await;
        if inner.state != ConnectionState::Active || inner.awaiting_pong {
            continue;
        }
        if inner.ping_start.elapsed() < core.timeouts.keepalive_interval {
            continue;
        }

        let epoch = inner.epoch;
        let Some(sink) = inner.sink.as_mut() else {
            continue;
        };
        match websocket::send_envelope(sink, &Envelope::ping()).await {
            Ok(()) => {
                let now = Instant::now();
                inner.ping_start = now;
                inner.awaiting_pong = true;
                drop(inner);
                core.emit_ping(now);
            }
            Err(e) => {
                core.emit_error(ConnectionError::new(e.to_string(), true));
                if core.invalidate_session(&mut inner, epoch).await {
                    drop(inner);
                    core.emit_disconnect(DisconnectReason::new(format!(
                        "keepalive ping failed: {}",
                        e
                    )));
                }
            }
        }
    }
}

pub(crate) async fn watchdog_loop(core: Arc<ConnectionCore>) {
    let mut shutdown = core.shutdown_rx();
    loop {
        if !core.wait(&mut shutdown, core.timeouts.tick_interval).await {
            return;
        }

        let mut inner = core.inner.lock().await;
        if inner.state != ConnectionState::Active || !inner.awaiting_pong {
            continue;
        }
        if inner.ping_start.elapsed() <= core.timeouts.pong_timeout {
            continue;
        }

        let epoch = inner.epoch;
        log::warn!(
            "[pubsub-link] [conn {}] no PONG within {:?}, dropping session",
            core.id,
            core.timeouts.pong_timeout
        );
        core.emit_info(&format!(
            "warning, no PONG response for more than {:?}",
            core.timeouts.pong_timeout
        ));
        if core.invalidate_session(&mut inner, epoch).await {
            drop(inner);
            core.emit_disconnect(DisconnectReason::new(
                "pong timeout, connection presumed dead",
            ));
        }
    }
}
