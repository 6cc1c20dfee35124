//! Reliability framing: encapsulated packets and the datagram envelope.
//!
//! A datagram opens with a single `is_ack` bit. ACK datagrams carry only
//! the run-length encoded acknowledgement records (see [`super::acks`]).
//! Payload datagrams carry a `has_time` bit, an optional 32-bit sender
//! clock, and then one or more encapsulated packets, each aligned to the
//! next byte boundary so pre-encoded packet bytes can be copied in
//! verbatim.

use crate::error::{RakError, Result};
use crate::protocol::{acks, Reliability};
use bytes::Bytes;
use opal_bitstream::BitStream;

/// One reliability-framed unit inside a datagram.
///
/// Field presence follows the reliability: ordering channel and index for
/// ordered/sequenced packets, a message number for everything above plain
/// unreliable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulatedPacket {
    pub reliability: Reliability,
    pub message_number: Option<u32>,
    pub order_channel: Option<u8>,
    pub order_index: Option<u32>,
    pub payload: Bytes,
}

impl EncapsulatedPacket {
    /// Encodes the packet header and payload. The stream is expected to
    /// sit at a byte boundary; the internal alignment then matches what
    /// [`EncapsulatedPacket::decode`] reproduces.
    pub fn encode(&self, stream: &mut BitStream) -> Result<()> {
        let length_bits = self.payload.len() * 8;
        if length_bits > u16::MAX as usize {
            return Err(RakError::PayloadTooLarge {
                len: self.payload.len(),
                max: u16::MAX as usize / 8,
            });
        }

        stream.write_bits(self.reliability as u32, 3);
        if self.reliability.carries_ordering() {
            let channel = self
                .order_channel
                .ok_or(RakError::MalformedDatagram("missing ordering channel"))?;
            let index = self
                .order_index
                .ok_or(RakError::MalformedDatagram("missing ordering index"))?;
            stream.write_bits(channel as u32, 5);
            stream.align_write();
            stream.write_u32(index);
        }
        if self.reliability.carries_message_number() {
            let number = self
                .message_number
                .ok_or(RakError::MalformedDatagram("missing message number"))?;
            stream.align_write();
            stream.write_u32(number);
        }
        stream.align_write();
        stream.write_u16(length_bits as u16);
        stream.write_bytes(&self.payload);
        Ok(())
    }

    pub fn decode(stream: &mut BitStream) -> Result<Self> {
        let code = stream.read_bits(3)? as u8;
        let reliability = Reliability::from_bits(code)
            .ok_or(RakError::MalformedDatagram("invalid reliability code"))?;

        let mut order_channel = None;
        let mut order_index = None;
        if reliability.carries_ordering() {
            order_channel = Some(stream.read_bits(5)? as u8);
            stream.align_read();
            order_index = Some(stream.read_u32()?);
        }

        let mut message_number = None;
        if reliability.carries_message_number() {
            stream.align_read();
            message_number = Some(stream.read_u32()?);
        }

        stream.align_read();
        let length_bits = stream.read_u16()? as usize;
        let payload = stream.read_bytes(length_bits.div_ceil(8))?;

        Ok(Self {
            reliability,
            message_number,
            order_channel,
            order_index,
            payload,
        })
    }

    /// Encodes into a standalone buffer, as stored in the send queues.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut stream = BitStream::new();
        self.encode(&mut stream)?;
        Ok(stream.into_bytes())
    }
}

/// A decoded datagram: either an acknowledgement or a batch of
/// encapsulated packets with an optional sender clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    Ack(Vec<(u32, u32)>),
    Payload {
        timestamp: Option<u32>,
        packets: Vec<EncapsulatedPacket>,
    },
}

impl Datagram {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut stream = BitStream::from_slice(data);
        if stream.read_bit()? {
            return Ok(Datagram::Ack(acks::read_ranges(&mut stream)?));
        }

        let timestamp = if stream.read_bit()? {
            Some(stream.read_bits(32)?)
        } else {
            None
        };

        let mut packets = Vec::new();
        loop {
            stream.align_read();
            if stream.remaining_bits() < 8 {
                break;
            }
            packets.push(EncapsulatedPacket::decode(&mut stream)?);
        }

        Ok(Datagram::Payload { timestamp, packets })
    }
}

/// Writes the payload-datagram header: `is_ack` clear, `has_time` set,
/// and the sender's 32-bit millisecond clock.
pub fn write_payload_header(stream: &mut BitStream, timestamp: u32) {
    stream.write_bit(false);
    stream.write_bit(true);
    stream.write_bits(timestamp, 32);
}
