use opal_bitstream::BitStreamError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced by the transport.
#[derive(Error, Debug)]
pub enum RakError {
    /// An I/O error on the underlying UDP socket; fatal at bind time.
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    /// A datagram could not be parsed at the bit level.
    #[error("bit stream error: {0}")]
    BitStream(#[from] BitStreamError),

    /// A datagram parsed but violated the framing rules.
    #[error("malformed datagram: {0}")]
    MalformedDatagram(&'static str),

    /// The payload does not fit one datagram; oversize messages are
    /// rejected rather than fragmented.
    #[error("payload of {len} bytes exceeds the {max} byte ceiling")]
    PayloadTooLarge { len: usize, max: usize },

    /// The operation belongs to a protocol extension this revision omits.
    #[error("{0} is not supported")]
    NotSupported(&'static str),

    /// Ordering channels are a 5-bit lane index.
    #[error("ordering channel {0} is out of range")]
    InvalidChannel(u8),

    /// No peer is connected at the given address.
    #[error("no connected peer at {0}")]
    NotConnected(SocketAddr),

    /// The outbound connection attempt did not complete.
    #[error("connection attempt to {0} failed")]
    ConnectFailed(SocketAddr),

    /// The endpoint's event loop has shut down.
    #[error("endpoint is closed")]
    Closed,
}

/// Why a peer left, as reported by [`Event::Disconnected`].
///
/// [`Event::Disconnected`]: crate::transport::Event::Disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No traffic for the configured window, or retransmits exhausted.
    Timeout,
    /// The remote sent a disconnection notification.
    RemoteDisconnect,
    /// The remote refused the connection (password mismatch).
    Refused,
}

pub type Result<T> = std::result::Result<T, RakError>;
