//! Per-remote connection state.

use crate::config::Config;
use crate::error::{DisconnectReason, Result};
use crate::protocol::{self, ConnectedPing, Reliability};
use crate::reliability::ReliabilityLayer;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Instant;

/// Handshake progression for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Outbound connect sent, no open-connection reply yet. No framed
    /// traffic is exchanged in this state.
    Unconnected,
    /// The open-connection exchange completed but the connection request
    /// has not been validated yet (server side).
    UnverifiedConnected,
    /// Fully established.
    Connected,
    /// Dead; kept only until the owning table reaps it.
    Disconnected,
}

/// What one peer tick produced.
#[derive(Debug, Default)]
pub(crate) struct PeerTick {
    pub datagrams: Vec<Bytes>,
    /// Peer died this tick; the reason is reported to the application.
    pub disconnect: Option<DisconnectReason>,
    /// Peer finished its goodbye and can be removed silently.
    pub remove: bool,
}

#[derive(Debug)]
pub(crate) struct Peer {
    pub address: SocketAddr,
    pub state: ConnectionState,
    pub created_at: Instant,
    pub last_recv: Instant,
    pub last_send: Instant,
    /// Set once a disconnection notification has been queued; the peer is
    /// removed as soon as that send drains.
    pub closing: bool,
    reliability: ReliabilityLayer,
}

impl Peer {
    pub fn new(address: SocketAddr, state: ConnectionState, now: Instant, config: &Config) -> Self {
        Self {
            address,
            state,
            created_at: now,
            last_recv: now,
            last_send: now,
            closing: false,
            reliability: ReliabilityLayer::new(config),
        }
    }

    /// Queues one outbound message on this peer.
    pub fn send(
        &mut self,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<()> {
        self.reliability.send(payload, reliability, channel, now)
    }

    /// Feeds one framed datagram through the reliability layer, returning
    /// the application payloads it released.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Result<Vec<Bytes>> {
        self.last_recv = now;
        self.reliability.handle_datagram(data, now)
    }

    /// Periodic work: timeout reap, keepalive, ACK flush and coalescing.
    pub fn tick(&mut self, now: Instant, timestamp: u32, config: &Config) -> PeerTick {
        let mut result = PeerTick::default();

        if now.saturating_duration_since(self.last_recv) >= config.timeout {
            self.state = ConnectionState::Disconnected;
            result.disconnect = Some(DisconnectReason::Timeout);
            return result;
        }

        if self.state == ConnectionState::Connected
            && !self.closing
            && now.saturating_duration_since(self.last_send) >= config.ping_interval
        {
            let ping = protocol::build_message(
                protocol::ID_CONNECTED_PING,
                &ConnectedPing { ping_time: timestamp },
            );
            // A full send queue means the peer is about to be reaped
            // anyway; the ping is not worth an error path.
            let _ = self.reliability.send(ping, Reliability::Reliable, 0, now);
        }

        let tick = self.reliability.tick(now, timestamp);
        if tick.peer_lost {
            self.state = ConnectionState::Disconnected;
            result.disconnect = Some(DisconnectReason::Timeout);
            return result;
        }
        result.datagrams = tick.datagrams;

        if self.closing && !self.reliability.has_queued_outbound() {
            self.state = ConnectionState::Disconnected;
            result.remove = true;
        }
        result
    }

    pub fn smoothed_rtt(&self) -> Option<std::time::Duration> {
        self.reliability.smoothed_rtt()
    }

    pub fn last_rtt(&self) -> Option<std::time::Duration> {
        self.reliability.last_rtt()
    }

    /// Last clock value the remote stamped on a payload datagram.
    pub fn remote_time(&self) -> Option<u32> {
        self.reliability.remote_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ID_CONNECTED_PING;
    use crate::protocol::packet::Datagram;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(5),
            ..Config::default()
        }
    }

    fn peer(config: &Config, now: Instant) -> Peer {
        Peer::new(
            "127.0.0.1:9999".parse().unwrap(),
            ConnectionState::Connected,
            now,
            config,
        )
    }

    #[test]
    fn silent_peers_time_out_with_reason() {
        let config = config();
        let t0 = Instant::now();
        let mut peer = peer(&config, t0);

        let early = peer.tick(t0 + Duration::from_secs(9), 0, &config);
        assert!(early.disconnect.is_none());

        let late = peer.tick(t0 + Duration::from_secs(10), 0, &config);
        assert_eq!(late.disconnect, Some(DisconnectReason::Timeout));
        assert_eq!(peer.state, ConnectionState::Disconnected);
    }

    #[test]
    fn keepalive_ping_goes_out_after_outbound_silence() {
        let config = config();
        let t0 = Instant::now();
        let mut peer = peer(&config, t0);
        peer.last_recv = t0 + Duration::from_secs(6); // still active inbound

        let tick = peer.tick(t0 + Duration::from_secs(6), 42, &config);
        assert_eq!(tick.datagrams.len(), 1);
        let Ok(Datagram::Payload { packets, .. }) = Datagram::decode(&tick.datagrams[0]) else {
            panic!("expected payload datagram");
        };
        assert_eq!(packets[0].payload[0], ID_CONNECTED_PING);
        assert_eq!(packets[0].reliability, Reliability::Reliable);
    }

    #[test]
    fn closing_peer_is_removed_after_goodbye_drains() {
        let config = config();
        let t0 = Instant::now();
        let mut peer = peer(&config, t0);
        peer.send(
            Bytes::from_static(&[crate::protocol::ID_DISCONNECTION_NOTIFICATION]),
            Reliability::Reliable,
            0,
            t0,
        )
        .unwrap();
        peer.closing = true;

        let tick = peer.tick(t0, 0, &config);
        assert_eq!(tick.datagrams.len(), 1);
        assert!(tick.remove);
    }
}
