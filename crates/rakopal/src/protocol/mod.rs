//! Wire-level protocol definitions: message identifiers, the offline
//! handshake, reliability framing, and the internal transport messages.

use crate::error::{RakError, Result};
use bytes::Bytes;
use opal_bitstream::{BitStream, FromStream, ToStream};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub mod acks;
pub mod offline;
pub mod packet;
pub mod reliability;

pub use packet::{Datagram, EncapsulatedPacket};
pub use reliability::Reliability;

/// The fixed marker that distinguishes offline handshake datagrams from
/// reliability-framed traffic.
pub const OFFLINE_MESSAGE_ID: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

// One-byte message identifiers. Payloads whose first byte is at or above
// ID_USER_PACKET_ENUM belong to the application.
pub const ID_CONNECTED_PING: u8 = 0x00;
pub const ID_CONNECTED_PONG: u8 = 0x03;
pub const ID_OPEN_CONNECTION_REQUEST: u8 = 0x09;
pub const ID_OPEN_CONNECTION_REPLY: u8 = 0x0a;
pub const ID_DISCONNECTION_NOTIFICATION: u8 = 0x13;
pub const ID_INVALID_PASSWORD: u8 = 0x18;
pub const ID_CONNECTION_REQUEST: u8 = 0x1d;
pub const ID_CONNECTION_REQUEST_ACCEPTED: u8 = 0x22;
pub const ID_USER_PACKET_ENUM: u8 = 0x23;

/// Writes an IPv4 socket address: four octets, then the aligned 16-bit LE
/// port. IPv6 peers are not representable in this frame.
pub fn write_address(stream: &mut BitStream, address: &SocketAddr) -> Result<()> {
    let SocketAddr::V4(v4) = address else {
        return Err(RakError::NotSupported("IPv6 address"));
    };
    stream.write_bytes(&v4.ip().octets());
    stream.align_write();
    stream.write_u16(v4.port());
    Ok(())
}

pub fn read_address(stream: &mut BitStream) -> Result<SocketAddr> {
    let octets = stream.read_bytes(4)?;
    stream.align_read();
    let port = stream.read_u16()?;
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// Keepalive probe; the sender's 32-bit millisecond clock.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedPing {
    pub ping_time: u32,
}

impl ToStream for ConnectedPing {
    fn write(&self, stream: &mut BitStream) -> opal_bitstream::Result<()> {
        stream.write_u32(self.ping_time);
        Ok(())
    }
}

impl FromStream for ConnectedPing {
    fn read(stream: &mut BitStream) -> opal_bitstream::Result<Self> {
        Ok(Self {
            ping_time: stream.read_u32()?,
        })
    }
}

/// Answer to [`ConnectedPing`]: the probed time echoed back plus the
/// responder's own clock.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedPong {
    pub ping_time: u32,
    pub pong_time: u32,
}

impl ToStream for ConnectedPong {
    fn write(&self, stream: &mut BitStream) -> opal_bitstream::Result<()> {
        stream.write_u32(self.ping_time);
        stream.write_u32(self.pong_time);
        Ok(())
    }
}

impl FromStream for ConnectedPong {
    fn read(stream: &mut BitStream) -> opal_bitstream::Result<Self> {
        Ok(Self {
            ping_time: stream.read_u32()?,
            pong_time: stream.read_u32()?,
        })
    }
}

/// First reliable message of a new peer; carries the password bytes
/// (everything after the identifier, possibly empty).
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub password: Bytes,
}

impl ToStream for ConnectionRequest {
    fn write(&self, stream: &mut BitStream) -> opal_bitstream::Result<()> {
        stream.write_bytes(&self.password);
        Ok(())
    }
}

impl FromStream for ConnectionRequest {
    fn read(stream: &mut BitStream) -> opal_bitstream::Result<Self> {
        let len = stream.remaining_bits() / 8;
        Ok(Self {
            password: stream.read_bytes(len)?,
        })
    }
}

/// Completes the handshake; echoes the external address the server sees
/// for the client.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRequestAccepted {
    pub peer_address: SocketAddr,
}

impl ConnectionRequestAccepted {
    pub fn write(&self, stream: &mut BitStream) -> Result<()> {
        write_address(stream, &self.peer_address)
    }

    pub fn read(stream: &mut BitStream) -> Result<Self> {
        Ok(Self {
            peer_address: read_address(stream)?,
        })
    }
}

/// Builds a complete internal message payload: identifier byte followed by
/// the body.
pub fn build_message<T: ToStream>(id: u8, body: &T) -> Bytes {
    let mut stream = BitStream::new();
    stream.write_u8(id);
    // Internal message bodies only use whole-byte writes and cannot fail.
    body.write(&mut stream).expect("internal message body");
    stream.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrip() {
        let address: SocketAddr = "192.168.1.42:27015".parse().unwrap();
        let mut stream = BitStream::new();
        write_address(&mut stream, &address).unwrap();
        assert_eq!(read_address(&mut stream).unwrap(), address);
    }

    #[test]
    fn ipv6_addresses_are_rejected() {
        let address: SocketAddr = "[::1]:1001".parse().unwrap();
        let mut stream = BitStream::new();
        assert!(matches!(
            write_address(&mut stream, &address),
            Err(RakError::NotSupported(_))
        ));
    }

    #[test]
    fn connection_request_carries_trailing_password() {
        let payload = build_message(
            ID_CONNECTION_REQUEST,
            &ConnectionRequest {
                password: Bytes::from_static(b"hunter2"),
            },
        );
        assert_eq!(payload[0], ID_CONNECTION_REQUEST);

        let mut stream = BitStream::from_slice(&payload);
        assert_eq!(stream.read_u8().unwrap(), ID_CONNECTION_REQUEST);
        let request = ConnectionRequest::read(&mut stream).unwrap();
        assert_eq!(request.password.as_ref(), b"hunter2");
    }

    #[test]
    fn pong_echoes_ping_time() {
        let payload = build_message(
            ID_CONNECTED_PONG,
            &ConnectedPong {
                ping_time: 1234,
                pong_time: 5678,
            },
        );
        let mut stream = BitStream::from_slice(&payload);
        stream.read_u8().unwrap();
        let pong = ConnectedPong::read(&mut stream).unwrap();
        assert_eq!(pong.ping_time, 1234);
        assert_eq!(pong.pong_time, 5678);
    }
}
