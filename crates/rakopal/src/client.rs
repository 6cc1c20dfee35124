//! Client façade over the endpoint loop.

use crate::config::Config;
use crate::error::{RakError, Result};
use crate::protocol::Reliability;
use crate::transport::{self, EndpointHandle, Event};
use bytes::Bytes;
use log::debug;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// An outbound connection to one server.
///
/// `connect` drives the whole handshake: the open-connection exchange,
/// then the reliable connection request carrying `config.password`. It
/// resolves once the server accepts, refuses, or the connect timeout
/// elapses.
#[derive(Debug)]
pub struct Client {
    handle: EndpointHandle,
    events: mpsc::UnboundedReceiver<Event>,
    server_addr: SocketAddr,
}

impl Client {
    pub async fn connect(server_addr: SocketAddr, config: Config) -> Result<Self> {
        let connect_timeout = config.connect_timeout;
        let (handle, mut events) = transport::bind("0.0.0.0:0", config, false).await?;
        handle.connect(server_addr)?;

        let handshake = async {
            loop {
                match events.recv().await {
                    Some(Event::Connected(address)) if address == server_addr => break Ok(()),
                    Some(Event::Disconnected(address, reason)) if address == server_addr => {
                        debug!("[{address}] handshake failed: {reason:?}");
                        break Err(RakError::ConnectFailed(server_addr));
                    }
                    Some(event) => debug!("ignoring {event:?} during handshake"),
                    None => break Err(RakError::Closed),
                }
            }
        };
        match timeout(connect_timeout, handshake).await {
            Ok(Ok(())) => Ok(Self {
                handle,
                events,
                server_addr,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RakError::ConnectFailed(server_addr)),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Queues one message to the server; validation mirrors
    /// [`Server::send`].
    ///
    /// [`Server::send`]: crate::server::Server::send
    pub fn send(
        &self,
        payload: impl Into<Bytes>,
        reliability: Reliability,
        channel: u8,
    ) -> Result<()> {
        self.handle
            .send(self.server_addr, payload.into(), reliability, channel)
    }

    /// Disconnects from the server and stops the endpoint.
    pub fn close(&self) -> Result<()> {
        self.handle.close_peer(self.server_addr)?;
        self.handle.shutdown()
    }

    /// Next transport event, or `None` once the endpoint has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}
