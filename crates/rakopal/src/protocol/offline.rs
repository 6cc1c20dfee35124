//! The pre-connection handshake exchange.
//!
//! Offline datagrams carry no reliability framing: they are the 16-byte
//! offline message marker, one opcode byte, and (for requests) the
//! protocol revision. Anything that does not match exactly is silently
//! dropped by the caller.

use crate::protocol::{
    ID_OPEN_CONNECTION_REPLY, ID_OPEN_CONNECTION_REQUEST, OFFLINE_MESSAGE_ID,
};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineMessage {
    OpenConnectionRequest { protocol_version: u8 },
    OpenConnectionReply,
}

impl OfflineMessage {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(OFFLINE_MESSAGE_ID.len() + 2);
        buf.put_slice(&OFFLINE_MESSAGE_ID);
        match *self {
            OfflineMessage::OpenConnectionRequest { protocol_version } => {
                buf.put_u8(ID_OPEN_CONNECTION_REQUEST);
                buf.put_u8(protocol_version);
            }
            OfflineMessage::OpenConnectionReply => {
                buf.put_u8(ID_OPEN_CONNECTION_REPLY);
            }
        }
        buf.freeze()
    }

    /// Returns `None` for anything that is not a well-formed offline
    /// message.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let rest = data.strip_prefix(OFFLINE_MESSAGE_ID.as_slice())?;
        match *rest {
            [ID_OPEN_CONNECTION_REQUEST, protocol_version] => {
                Some(OfflineMessage::OpenConnectionRequest { protocol_version })
            }
            [ID_OPEN_CONNECTION_REPLY] => Some(OfflineMessage::OpenConnectionReply),
            _ => None,
        }
    }

    /// Whether a datagram even looks offline; used to route duplicate
    /// handshakes from already-known addresses.
    pub fn looks_offline(data: &[u8]) -> bool {
        data.starts_with(&OFFLINE_MESSAGE_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let message = OfflineMessage::OpenConnectionRequest {
            protocol_version: 6,
        };
        let encoded = message.encode();
        assert_eq!(&encoded[..16], &OFFLINE_MESSAGE_ID);
        assert_eq!(OfflineMessage::decode(&encoded), Some(message));
    }

    #[test]
    fn reply_roundtrip() {
        let encoded = OfflineMessage::OpenConnectionReply.encode();
        assert_eq!(
            OfflineMessage::decode(&encoded),
            Some(OfflineMessage::OpenConnectionReply)
        );
    }

    #[test]
    fn malformed_messages_decode_to_none() {
        // Wrong marker.
        let mut bad_magic = OfflineMessage::OpenConnectionReply.encode().to_vec();
        bad_magic[3] ^= 0xFF;
        assert_eq!(OfflineMessage::decode(&bad_magic), None);

        // Truncated request (missing the version byte).
        let request = OfflineMessage::OpenConnectionRequest { protocol_version: 6 }.encode();
        assert_eq!(OfflineMessage::decode(&request[..17]), None);

        // Trailing garbage.
        let mut trailing = OfflineMessage::OpenConnectionReply.encode().to_vec();
        trailing.push(0x00);
        assert_eq!(OfflineMessage::decode(&trailing), None);

        // Unknown opcode.
        let mut unknown = OFFLINE_MESSAGE_ID.to_vec();
        unknown.push(0x7F);
        assert_eq!(OfflineMessage::decode(&unknown), None);

        assert_eq!(OfflineMessage::decode(&[]), None);
    }
}
