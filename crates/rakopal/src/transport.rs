//! The endpoint event loop.
//!
//! One task owns the UDP socket, the peer table and every timer; peers
//! are never touched from anywhere else. The public façades talk to the
//! loop through a command channel and listen on an event channel, so no
//! locking is needed anywhere in the transport.

use crate::config::Config;
use crate::consts::{
    MAX_PAYLOAD_SIZE, OPEN_CONNECTION_RETRY, ORDERING_CHANNELS, PROTOCOL_VERSION, TICK_INTERVAL,
};
use crate::error::{DisconnectReason, RakError, Result};
use crate::peer::{ConnectionState, Peer};
use crate::protocol::offline::OfflineMessage;
use crate::protocol::{
    self, ConnectedPing, ConnectedPong, ConnectionRequest, ConnectionRequestAccepted,
    Reliability, ID_CONNECTED_PING, ID_CONNECTED_PONG, ID_CONNECTION_REQUEST,
    ID_CONNECTION_REQUEST_ACCEPTED, ID_DISCONNECTION_NOTIFICATION, ID_INVALID_PASSWORD,
    ID_USER_PACKET_ENUM,
};
use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use opal_bitstream::{BitStream, FromStream};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// What the transport reports to the application. All variants are
/// produced on the endpoint's loop task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake with this address completed.
    Connected(SocketAddr),
    /// The peer is gone and has been removed from the peer table.
    Disconnected(SocketAddr, DisconnectReason),
    /// A fully ordered, deduplicated application payload.
    Packet(SocketAddr, Bytes),
}

#[derive(Debug)]
pub(crate) enum Command {
    Send {
        address: SocketAddr,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
    },
    Connect {
        address: SocketAddr,
    },
    ClosePeer {
        address: SocketAddr,
    },
    Shutdown,
}

/// Cheap handle that marshals calls onto the endpoint loop.
#[derive(Debug, Clone)]
pub(crate) struct EndpointHandle {
    commands: mpsc::UnboundedSender<Command>,
    local_addr: SocketAddr,
}

impl EndpointHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Validates synchronously, then queues the send. An oversize payload
    /// is rejected here and never reaches the socket.
    pub fn send(
        &self,
        address: SocketAddr,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
    ) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(RakError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if reliability.is_sequenced() {
            return Err(RakError::NotSupported("sequenced sends"));
        }
        if channel >= ORDERING_CHANNELS {
            return Err(RakError::InvalidChannel(channel));
        }
        self.command(Command::Send {
            address,
            payload,
            reliability,
            channel,
        })
    }

    pub fn connect(&self, address: SocketAddr) -> Result<()> {
        self.command(Command::Connect { address })
    }

    pub fn close_peer(&self, address: SocketAddr) -> Result<()> {
        self.command(Command::ClosePeer { address })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| RakError::Closed)
    }
}

/// Binds the socket and spawns the endpoint loop.
pub(crate) async fn bind<A: ToSocketAddrs>(
    addr: A,
    config: Config,
    accept_incoming: bool,
) -> Result<(EndpointHandle, mpsc::UnboundedReceiver<Event>)> {
    let socket = UdpSocket::bind(addr).await?;
    let local_addr = socket.local_addr()?;
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let endpoint = Endpoint {
        socket,
        config,
        accept_incoming,
        peers: HashMap::new(),
        events: event_tx,
        commands: command_rx,
        epoch: Instant::now(),
    };
    tokio::spawn(endpoint.run());
    info!("endpoint bound to {local_addr}");

    Ok((
        EndpointHandle {
            commands: command_tx,
            local_addr,
        },
        event_rx,
    ))
}

struct Endpoint {
    socket: UdpSocket,
    config: Config,
    /// Servers answer open-connection requests; clients drop them.
    accept_incoming: bool,
    peers: HashMap<SocketAddr, Peer>,
    events: mpsc::UnboundedSender<Event>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Zero point of the 32-bit millisecond clock on the wire.
    epoch: Instant,
}

impl Endpoint {
    async fn run(mut self) {
        let mut buf = [0u8; 2048];
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                    Err(e) => error!("failed to receive datagram: {e}"),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                _ = ticker.tick() => self.tick().await,
            }
        }
        self.shutdown().await;
    }

    fn local_time(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    async fn send_raw(&self, data: &[u8], address: SocketAddr) {
        trace!(
            "-> {address} {} bytes: {}",
            data.len(),
            hex::encode(&data[..data.len().min(32)])
        );
        if let Err(e) = self.socket.send_to(data, address).await {
            warn!("send to {address} failed: {e}");
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Send {
                address,
                payload,
                reliability,
                channel,
            } => match self.peers.get_mut(&address) {
                Some(peer) if peer.state != ConnectionState::Disconnected => {
                    if let Err(e) = peer.send(payload, reliability, channel, now) {
                        warn!("[{address}] send failed: {e}");
                    }
                }
                _ => warn!("[{address}] dropping send to unknown peer"),
            },
            Command::Connect { address } => {
                self.peers.insert(
                    address,
                    Peer::new(address, ConnectionState::Unconnected, now, &self.config),
                );
                info!("[{address}] connecting");
                self.send_open_connection_request(address).await;
            }
            Command::ClosePeer { address } => self.close_peer(address, now),
            Command::Shutdown => unreachable!("handled by the loop"),
        }
    }

    async fn send_open_connection_request(&mut self, address: SocketAddr) {
        let request = OfflineMessage::OpenConnectionRequest {
            protocol_version: PROTOCOL_VERSION,
        }
        .encode();
        self.send_raw(&request, address).await;
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.last_send = Instant::now();
        }
    }

    fn close_peer(&mut self, address: SocketAddr, now: Instant) {
        let Some(peer) = self.peers.get_mut(&address) else {
            debug!("[{address}] close for unknown peer ignored");
            return;
        };
        if peer.closing || peer.state == ConnectionState::Disconnected {
            return;
        }
        info!("[{address}] closing");
        let goodbye = Bytes::from_static(&[ID_DISCONNECTION_NOTIFICATION]);
        if let Err(e) = peer.send(goodbye, Reliability::Reliable, 0, now) {
            warn!("[{address}] failed to queue disconnection notification: {e}");
        }
        peer.closing = true;
    }

    async fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) {
        if data.is_empty() {
            return;
        }
        trace!(
            "<- {from} {} bytes: {}",
            data.len(),
            hex::encode(&data[..data.len().min(32)])
        );

        if OfflineMessage::looks_offline(data) {
            self.handle_offline(data, from).await;
            return;
        }

        let now = Instant::now();
        let payloads = match self.peers.get_mut(&from) {
            None => {
                debug!("[{from}] framed datagram from unknown address, ignoring");
                return;
            }
            Some(peer) if peer.state == ConnectionState::Unconnected => {
                debug!("[{from}] framed datagram before handshake completed, ignoring");
                return;
            }
            Some(peer) => match peer.handle_datagram(data, now) {
                Ok(payloads) => payloads,
                Err(e) => {
                    debug!("[{from}] dropping malformed datagram: {e}");
                    return;
                }
            },
        };

        for payload in payloads {
            self.dispatch_message(from, payload, now).await;
        }
    }

    async fn handle_offline(&mut self, data: &[u8], from: SocketAddr) {
        let Some(message) = OfflineMessage::decode(data) else {
            debug!("[{from}] malformed offline message dropped");
            return;
        };
        let now = Instant::now();

        match message {
            OfflineMessage::OpenConnectionRequest { protocol_version } => {
                if !self.accept_incoming {
                    debug!("[{from}] not accepting incoming connections");
                    return;
                }
                if protocol_version != PROTOCOL_VERSION {
                    debug!(
                        "[{from}] protocol version {protocol_version} does not match {PROTOCOL_VERSION}"
                    );
                    return;
                }
                if !matches!(from, SocketAddr::V4(_)) {
                    debug!("[{from}] IPv6 peers are not supported");
                    return;
                }
                match self.peers.get(&from) {
                    Some(peer) if peer.state == ConnectionState::UnverifiedConnected => {
                        debug!("[{from}] duplicate open connection request, re-replying");
                    }
                    Some(_) => {
                        debug!("[{from}] open connection request from known peer ignored");
                        return;
                    }
                    None => {
                        if self.peers.len() >= self.config.max_connections {
                            debug!("[{from}] peer table full, ignoring open connection request");
                            return;
                        }
                        self.peers.insert(
                            from,
                            Peer::new(from, ConnectionState::UnverifiedConnected, now, &self.config),
                        );
                        info!("[{from}] new unverified connection");
                    }
                }
                self.send_raw(&OfflineMessage::OpenConnectionReply.encode(), from)
                    .await;
            }
            OfflineMessage::OpenConnectionReply => {
                let password = Bytes::copy_from_slice(self.config.password.as_bytes());
                let Some(peer) = self.peers.get_mut(&from) else {
                    debug!("[{from}] unsolicited open connection reply ignored");
                    return;
                };
                if peer.state != ConnectionState::Unconnected {
                    return; // duplicate reply
                }
                peer.state = ConnectionState::Connected;
                info!("[{from}] open connection reply received, requesting connection");
                let request = protocol::build_message(
                    ID_CONNECTION_REQUEST,
                    &ConnectionRequest { password },
                );
                if let Err(e) = peer.send(request, Reliability::Reliable, 0, now) {
                    warn!("[{from}] failed to queue connection request: {e}");
                }
            }
        }
    }

    async fn dispatch_message(&mut self, from: SocketAddr, payload: Bytes, now: Instant) {
        let Some(&id) = payload.first() else {
            return;
        };

        if id >= ID_USER_PACKET_ENUM {
            match self.peers.get(&from) {
                Some(peer) if peer.state == ConnectionState::Connected => {
                    self.emit(Event::Packet(from, payload));
                }
                _ => debug!("[{from}] user packet before connection completed, dropping"),
            }
            return;
        }

        match id {
            ID_CONNECTED_PING => {
                let mut stream = BitStream::from_slice(&payload[1..]);
                let Ok(ping) = ConnectedPing::read(&mut stream) else {
                    debug!("[{from}] malformed ping dropped");
                    return;
                };
                let pong = protocol::build_message(
                    ID_CONNECTED_PONG,
                    &ConnectedPong {
                        ping_time: ping.ping_time,
                        pong_time: self.local_time(),
                    },
                );
                if let Some(peer) = self.peers.get_mut(&from) {
                    if let Err(e) = peer.send(pong, Reliability::Unreliable, 0, now) {
                        warn!("[{from}] failed to queue pong: {e}");
                    }
                }
            }
            ID_CONNECTED_PONG => {
                let mut stream = BitStream::from_slice(&payload[1..]);
                if let Ok(pong) = ConnectedPong::read(&mut stream) {
                    let peer = self.peers.get(&from);
                    trace!(
                        "[{from}] pong for probe {}ms at {}ms, srtt {:?}, last rtt {:?}, remote clock {:?}",
                        pong.ping_time,
                        self.local_time(),
                        peer.and_then(Peer::smoothed_rtt),
                        peer.and_then(Peer::last_rtt),
                        peer.and_then(Peer::remote_time)
                    );
                }
            }
            ID_CONNECTION_REQUEST => {
                self.handle_connection_request(from, &payload[1..], now).await;
            }
            ID_CONNECTION_REQUEST_ACCEPTED => {
                if self.accept_incoming {
                    debug!("[{from}] connection accept on a server endpoint dropped");
                    return;
                }
                let mut stream = BitStream::from_slice(&payload[1..]);
                match ConnectionRequestAccepted::read(&mut stream) {
                    Ok(accepted) => {
                        info!(
                            "[{from}] connection accepted, external address {}",
                            accepted.peer_address
                        );
                        self.emit(Event::Connected(from));
                    }
                    Err(e) => debug!("[{from}] malformed connection accept dropped: {e}"),
                }
            }
            ID_DISCONNECTION_NOTIFICATION => {
                let Some(mut peer) = self.peers.remove(&from) else {
                    return;
                };
                info!("[{from}] remote disconnected");
                // Flush the pending acknowledgement so the remote's
                // goodbye stops retransmitting, then forget the peer.
                peer.closing = true;
                let tick = peer.tick(now, self.local_time(), &self.config);
                for datagram in tick.datagrams {
                    self.send_raw(&datagram, from).await;
                }
                if peer.state == ConnectionState::Connected {
                    self.emit(Event::Disconnected(from, DisconnectReason::RemoteDisconnect));
                }
            }
            ID_INVALID_PASSWORD => {
                if self.peers.remove(&from).is_some() {
                    warn!("[{from}] connection refused: invalid password");
                    self.emit(Event::Disconnected(from, DisconnectReason::Refused));
                }
            }
            _ => debug!("[{from}] unknown opcode {id:#04x} dropped"),
        }
    }

    async fn handle_connection_request(&mut self, from: SocketAddr, body: &[u8], now: Instant) {
        let timestamp = self.local_time();
        {
            let Some(peer) = self.peers.get_mut(&from) else {
                return;
            };
            if peer.state != ConnectionState::UnverifiedConnected {
                debug!("[{from}] connection request in state {:?} ignored", peer.state);
                return;
            }
        }

        let mut stream = BitStream::from_slice(body);
        let request = match ConnectionRequest::read(&mut stream) {
            Ok(request) => request,
            Err(e) => {
                debug!("[{from}] malformed connection request dropped: {e}");
                return;
            }
        };

        if request.password.as_ref() == self.config.password.as_bytes() {
            let mut accepted = BitStream::new();
            accepted.write_u8(ID_CONNECTION_REQUEST_ACCEPTED);
            if let Err(e) = protocol::write_address(&mut accepted, &from) {
                warn!("[{from}] cannot echo peer address: {e}");
                return;
            }
            if let Some(peer) = self.peers.get_mut(&from) {
                peer.state = ConnectionState::Connected;
                if let Err(e) = peer.send(accepted.into_bytes(), Reliability::Reliable, 0, now) {
                    warn!("[{from}] failed to queue connection accept: {e}");
                }
            }
            info!("[{from}] connected");
            self.emit(Event::Connected(from));
        } else {
            warn!("[{from}] connection request refused: wrong password");
            if let Some(mut peer) = self.peers.remove(&from) {
                let refusal = Bytes::from_static(&[ID_INVALID_PASSWORD]);
                let _ = peer.send(refusal, Reliability::Unreliable, 0, now);
                let tick = peer.tick(now, timestamp, &self.config);
                for datagram in tick.datagrams {
                    self.send_raw(&datagram, from).await;
                }
            }
        }
    }

    async fn tick(&mut self) {
        let now = Instant::now();
        let timestamp = self.local_time();
        let mut outgoing: Vec<(SocketAddr, Bytes)> = Vec::new();
        let mut remove: Vec<SocketAddr> = Vec::new();

        for (&address, peer) in self.peers.iter_mut() {
            if peer.state == ConnectionState::Unconnected {
                // Outbound handshake still waiting for its reply.
                if now.saturating_duration_since(peer.created_at) >= self.config.connect_timeout {
                    warn!("[{address}] connect timed out");
                    let _ = self
                        .events
                        .send(Event::Disconnected(address, DisconnectReason::Timeout));
                    remove.push(address);
                } else if now.saturating_duration_since(peer.last_send) >= OPEN_CONNECTION_RETRY {
                    outgoing.push((
                        address,
                        OfflineMessage::OpenConnectionRequest {
                            protocol_version: PROTOCOL_VERSION,
                        }
                        .encode(),
                    ));
                    peer.last_send = now;
                }
                continue;
            }

            let was_connected = peer.state == ConnectionState::Connected;
            let result = peer.tick(now, timestamp, &self.config);
            if !result.datagrams.is_empty() {
                peer.last_send = now;
            }
            for datagram in result.datagrams {
                outgoing.push((address, datagram));
            }
            if let Some(reason) = result.disconnect {
                info!("[{address}] disconnected: {reason:?}");
                // Unverified peers that never finished the handshake were
                // never announced, so their death is not announced either.
                if was_connected {
                    let _ = self.events.send(Event::Disconnected(address, reason));
                }
                remove.push(address);
            } else if result.remove {
                remove.push(address);
            }
        }

        for address in remove {
            self.peers.remove(&address);
            debug!("[{address}] peer removed");
        }
        for (address, datagram) in outgoing {
            self.send_raw(&datagram, address).await;
        }
    }

    /// Best-effort goodbye to every live peer before the loop ends.
    async fn shutdown(&mut self) {
        info!("endpoint on {} shutting down", self.socket.local_addr().map(|a| a.to_string()).unwrap_or_default());
        let now = Instant::now();
        let timestamp = self.local_time();
        let goodbye = Bytes::from_static(&[ID_DISCONNECTION_NOTIFICATION]);
        let mut outgoing: Vec<(SocketAddr, Bytes)> = Vec::new();

        for (&address, peer) in self.peers.iter_mut() {
            if matches!(
                peer.state,
                ConnectionState::Connected | ConnectionState::UnverifiedConnected
            ) {
                let _ = peer.send(goodbye.clone(), Reliability::Reliable, 0, now);
                peer.closing = true;
                let tick = peer.tick(now, timestamp, &self.config);
                for datagram in tick.datagrams {
                    outgoing.push((address, datagram));
                }
            }
        }
        for (address, datagram) in outgoing {
            self.send_raw(&datagram, address).await;
        }
        self.peers.clear();
    }
}
