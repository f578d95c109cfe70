//! Low-level WebSocket helpers: endpoint validation, dialing with a
//! timeout, envelope framing.
//!
//! This is the crate's entire transport boundary; everything above it deals
//! in [`Envelope`]s and never touches the socket types directly.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use url::Url;

use crate::error::{PubSubError, Result};
use crate::models::Envelope;
use crate::timeouts::PubSubTimeouts;

/// A connected WebSocket session.
pub(crate) type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a split session.
pub(crate) type WsSink = SplitSink<WsStream, Message>;

/// Read half of a split session.
pub(crate) type WsSource = SplitStream<WsStream>;

/// Validate a pub/sub endpoint URL. Only `ws` and `wss` schemes are
/// accepted.
pub(crate) fn parse_endpoint(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| PubSubError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(PubSubError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            other, url
        ))),
    }
}

/// Dial the endpoint, bounded by `connection_timeout` (zero means wait
/// indefinitely).
pub(crate) async fn dial(url: &Url, connection_timeout: Duration) -> Result<WsStream> {
    log::debug!("[pubsub-link] dialing {}", url);

    let connect = connect_async(url.as_str());
    let connect_result = if PubSubTimeouts::is_no_timeout(connection_timeout) {
        Ok(connect.await)
    } else {
        tokio::time::timeout(connection_timeout, connect).await
    };

    match connect_result {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(WsError::Http(response))) => {
            let message = match response.status().as_u16() {
                401 => "Unauthorized: endpoint rejected the connection".to_string(),
                403 => "Forbidden: access to the endpoint denied".to_string(),
                code => format!("WebSocket HTTP error: {}", code),
            };
            Err(PubSubError::WebSocketError(message))
        }
        Ok(Err(e)) => Err(PubSubError::WebSocketError(format!(
            "Connection failed: {}",
            e
        ))),
        Err(_) => Err(PubSubError::TimeoutError(format!(
            "Connection timeout ({:?})",
            connection_timeout
        ))),
    }
}

/// Serialize `envelope` and send it as one text frame.
pub(crate) async fn send_envelope(sink: &mut WsSink, envelope: &Envelope) -> Result<()> {
    let payload = serde_json::to_string(envelope).map_err(|e| {
        PubSubError::EncodeError(format!("failed to serialize {} envelope: {}", envelope.kind, e))
    })?;
    sink.send(Message::Text(payload.into())).await.map_err(|e| {
        PubSubError::WebSocketError(format!("failed to send {} envelope: {}", envelope.kind, e))
    })
}

/// Decode one inbound text frame into an envelope.
pub(crate) fn parse_envelope(text: &str) -> Result<Envelope> {
    serde_json::from_str(text)
        .map_err(|e| PubSubError::DecodeError(format!("malformed envelope: {}", e)))
}

/// Best-effort close of the write half; errors are ignored because the
/// session is being discarded either way.
pub(crate) async fn close_sink(sink: &mut WsSink) {
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_accepts_ws_and_wss() {
        assert!(parse_endpoint("ws://127.0.0.1:8080/v1").is_ok());
        assert!(parse_endpoint("wss://pubsub.example.com").is_ok());
    }

    #[test]
    fn test_parse_endpoint_rejects_other_schemes() {
        assert!(matches!(
            parse_endpoint("http://example.com"),
            Err(PubSubError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(PubSubError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_envelope_rejects_garbage() {
        assert!(matches!(
            parse_envelope("{not json"),
            Err(PubSubError::DecodeError(_))
        ));
    }
}
