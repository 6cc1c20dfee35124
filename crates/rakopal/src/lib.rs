//! # rakopal
//!
//! A reimplementation of the RakNet 3.25 reliable-UDP transport: the
//! per-peer reliability layer (sequencing, acknowledgement,
//! retransmission, ordering, deduplication) over a bit-level wire format,
//! plus the offline handshake and connection management needed to
//! interoperate as a server or client.
//!
//! One endpoint task owns the socket and all peer state; the [`Server`]
//! and [`Client`] façades marshal calls onto it and surface traffic as
//! [`Event`]s:
//!
//! ```no_run
//! use rakopal::{Config, Event, Reliability, Server};
//!
//! # async fn run() -> rakopal::Result<()> {
//! let mut server = Server::bind("127.0.0.1:1001", Config::default()).await?;
//! while let Some(event) = server.recv().await {
//!     if let Event::Packet(address, payload) = event {
//!         server.send(address, payload, Reliability::ReliableOrdered, 0)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod server;
pub mod transport;

mod reliability;

pub use client::Client;
pub use config::Config;
pub use error::{DisconnectReason, RakError, Result};
pub use peer::ConnectionState;
pub use protocol::Reliability;
pub use server::Server;
pub use transport::Event;
