//! Server façade over the endpoint loop.

use crate::config::Config;
use crate::error::Result;
use crate::protocol::Reliability;
use crate::transport::{self, EndpointHandle, Event};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc;

/// A listening endpoint. Accepts handshakes from any number of peers and
/// reports traffic through [`Server::recv`].
///
/// Dropping the server closes the endpoint; every live peer gets a
/// best-effort disconnection notification.
#[derive(Debug)]
pub struct Server {
    handle: EndpointHandle,
    events: mpsc::UnboundedReceiver<Event>,
}

impl Server {
    /// Binds the endpoint and starts its event loop. Peers must present
    /// `config.password` during the handshake.
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self> {
        let (handle, events) = transport::bind(addr, config, true).await?;
        Ok(Self { handle, events })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// Queues one message to a connected peer. Size and channel
    /// validation happens before this returns; an oversize payload never
    /// touches the socket.
    pub fn send(
        &self,
        address: SocketAddr,
        payload: impl Into<Bytes>,
        reliability: Reliability,
        channel: u8,
    ) -> Result<()> {
        self.handle.send(address, payload.into(), reliability, channel)
    }

    /// Sends a disconnection notification to the peer and removes it once
    /// that send drains.
    pub fn close_peer(&self, address: SocketAddr) -> Result<()> {
        self.handle.close_peer(address)
    }

    /// Stops the endpoint; all peers receive a best-effort goodbye.
    pub fn shutdown(&self) -> Result<()> {
        self.handle.shutdown()
    }

    /// Next transport event, or `None` once the endpoint has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}
