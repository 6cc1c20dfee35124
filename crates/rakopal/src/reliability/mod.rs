//! The per-peer reliability layer.
//!
//! One [`ReliabilityLayer`] lives inside every peer. Outbound, it turns
//! `send` calls into framed encapsulated packets, coalesces them into
//! datagrams on each tick and retransmits unacknowledged reliable
//! packets. Inbound, it decodes datagrams, acknowledges and deduplicates
//! reliable packets, and restores per-channel ordering before anything
//! reaches the application.

mod receive;
mod send;

use crate::config::Config;
use crate::error::Result;
use crate::protocol::{acks, Datagram, Reliability};
use bytes::Bytes;
use log::debug;
use std::time::Instant;

pub(crate) use send::Flush;

/// Datagrams produced by one tick, plus whether the peer is now lost.
#[derive(Debug)]
pub(crate) struct Tick {
    /// Zero, one or two datagrams: the ACK-only datagram always comes
    /// before the coalesced payload datagram.
    pub datagrams: Vec<Bytes>,
    pub peer_lost: bool,
}

#[derive(Debug)]
pub(crate) struct ReliabilityLayer {
    send: send::SendReliability,
    recv: receive::ReceiveReliability,
    /// Last remote clock seen on a payload datagram.
    remote_time: Option<u32>,
}

impl ReliabilityLayer {
    pub fn new(config: &Config) -> Self {
        Self {
            send: send::SendReliability::new(config),
            recv: receive::ReceiveReliability::new(),
            remote_time: None,
        }
    }

    /// Queues one message; see [`SendReliability::send`] for the
    /// validation rules.
    ///
    /// [`SendReliability::send`]: send::SendReliability::send
    pub fn send(
        &mut self,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<()> {
        self.send.send(payload, reliability, channel, now)
    }

    /// Decodes one datagram and returns the application payloads it
    /// released, already deduplicated and in channel order.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Result<Vec<Bytes>> {
        match Datagram::decode(data)? {
            Datagram::Ack(ranges) => {
                self.send.handle_acks(&ranges, now);
                Ok(Vec::new())
            }
            Datagram::Payload { timestamp, packets } => {
                if timestamp.is_some() {
                    self.remote_time = timestamp;
                }
                let mut out = Vec::new();
                for packet in packets {
                    if packet.reliability.is_reliable() {
                        let Some(number) = packet.message_number else {
                            debug!("reliable packet without message number, dropping");
                            continue;
                        };
                        if !self.recv.record_reliable(number) {
                            continue;
                        }
                    }

                    if packet.reliability.is_sequenced() {
                        let (Some(channel), Some(index)) =
                            (packet.order_channel, packet.order_index)
                        else {
                            debug!("sequenced packet without ordering info, dropping");
                            continue;
                        };
                        out.extend(self.recv.handle_sequenced(channel, index, packet.payload));
                    } else if packet.reliability.is_ordered() {
                        let (Some(channel), Some(index)) =
                            (packet.order_channel, packet.order_index)
                        else {
                            debug!("ordered packet without ordering info, dropping");
                            continue;
                        };
                        out.extend(self.recv.handle_ordered(channel, index, packet.payload));
                    } else {
                        out.push(packet.payload);
                    }
                }
                Ok(out)
            }
        }
    }

    /// Flushes pending acknowledgements and the coalesced payload
    /// datagram for this tick.
    pub fn tick(&mut self, now: Instant, timestamp: u32) -> Tick {
        let mut datagrams = Vec::with_capacity(2);
        if let Some(numbers) = self.recv.take_acks() {
            datagrams.push(acks::write_ack_datagram(&numbers));
        }
        let Flush { datagram, peer_lost } = self.send.flush(now, timestamp);
        datagrams.extend(datagram);
        Tick {
            datagrams,
            peer_lost,
        }
    }

    /// Whether freshly queued packets still await their first send; used
    /// to delay peer removal until a disconnect notification went out.
    pub fn has_queued_outbound(&self) -> bool {
        self.send.has_queued_outbound()
    }

    pub fn smoothed_rtt(&self) -> Option<std::time::Duration> {
        self.send.smoothed_rtt()
    }

    pub fn last_rtt(&self) -> Option<std::time::Duration> {
        self.send.last_rtt()
    }

    pub fn remote_time(&self) -> Option<u32> {
        self.remote_time
    }
}
