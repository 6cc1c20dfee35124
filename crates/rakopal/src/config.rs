use crate::consts::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_RESENDS, DEFAULT_MIN_RTO,
    DEFAULT_PING_INTERVAL, DEFAULT_TIMEOUT,
};
use std::time::Duration;

/// Endpoint tuning knobs.
///
/// A server validates incoming connection requests against `password`; a
/// client presents it. The durations default to the protocol's recommended
/// values; tests shrink them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Shared secret checked during the connection handshake. Empty means
    /// no password.
    pub password: String,
    /// Open-connection requests beyond this peer count are ignored.
    pub max_connections: usize,
    /// Inactivity window after which a peer is reaped.
    pub timeout: Duration,
    /// Keepalive ping is sent after this much outbound silence.
    pub ping_interval: Duration,
    /// Floor for the retransmission timeout.
    pub min_rto: Duration,
    /// Unacknowledged retransmissions after which a peer counts as lost.
    pub max_resends: u32,
    /// How long an outbound connect waits for the handshake to finish.
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            password: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: DEFAULT_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            min_rto: DEFAULT_MIN_RTO,
            max_resends: DEFAULT_MAX_RESENDS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
