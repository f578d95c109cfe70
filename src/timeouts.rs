//! Timeout and pacing configuration for the pub/sub client.
//!
//! Centralizes every duration the connection loops depend on: the dial
//! timeout, the keepalive cadence, the pong deadline, and the pacing of the
//! background loops themselves.

use std::time::Duration;

/// Timeout configuration for pub/sub connections.
///
/// The defaults follow the service's connection-management guidance: a PING
/// at least every 15 seconds, and a connection treated as dead when no PONG
/// arrives within 10 seconds of a PING.
///
/// # Examples
///
/// ```rust
/// use pubsub_link::PubSubTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = PubSubTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = PubSubTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .keepalive_interval(Duration::from_secs(30))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PubSubTimeouts {
    /// Timeout for establishing a connection (TCP + TLS + handshake).
    /// Set to 0 to wait indefinitely. Default: 10 seconds.
    pub connection_timeout: Duration,

    /// Minimum interval between keepalive PING envelopes on an idle
    /// connection. Must stay under the server-enforced ceiling.
    /// Default: 15 seconds.
    pub keepalive_interval: Duration,

    /// Maximum time to wait for a PONG after sending a PING. When it
    /// elapses the connection is torn down and re-established.
    /// Default: 10 seconds.
    pub pong_timeout: Duration,

    /// Pause between reconnection attempts, and after a failed read before
    /// the reader re-checks the session. Default: 1 second.
    pub retry_delay: Duration,

    /// Pacing tick of the background loops while they have nothing to do.
    /// Default: 1 second.
    pub tick_interval: Duration,
}

impl Default for PubSubTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl PubSubTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> PubSubTimeoutsBuilder {
        PubSubTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(250),
            tick_interval: Duration::from_millis(250),
        }
    }

    /// Aggressively short timeouts for tests that drive the full
    /// connect/heartbeat/reconnect cycle against a local server.
    pub fn for_testing() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_millis(100),
            pong_timeout: Duration::from_millis(250),
            retry_delay: Duration::from_millis(25),
            tick_interval: Duration::from_millis(10),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for custom [`PubSubTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct PubSubTimeoutsBuilder {
    timeouts: PubSubTimeouts,
}

impl PubSubTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: PubSubTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS + handshake).
    /// Set to 0 to wait indefinitely.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the keepalive PING interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the PONG deadline after a keepalive PING.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    /// Set the pause between reconnection attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.timeouts.retry_delay = delay;
        self
    }

    /// Set the idle pacing tick of the background loops.
    pub fn tick_interval(mut self, tick: Duration) -> Self {
        self.timeouts.tick_interval = tick;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> PubSubTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = PubSubTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(15));
        assert_eq!(timeouts.pong_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_builder() {
        let timeouts = PubSubTimeouts::builder()
            .connection_timeout(Duration::from_secs(60))
            .keepalive_interval(Duration::from_secs(30))
            .pong_timeout(Duration::from_secs(20))
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(30));
        assert_eq!(timeouts.pong_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_for_testing_preset_is_fast() {
        let timeouts = PubSubTimeouts::for_testing();
        assert!(timeouts.keepalive_interval < Duration::from_secs(1));
        assert!(timeouts.tick_interval < Duration::from_millis(100));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(PubSubTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!PubSubTimeouts::is_no_timeout(Duration::from_secs(1)));
        assert!(!PubSubTimeouts::is_no_timeout(Duration::from_secs(3600)));
    }
}
