//! Inbound half of the per-peer reliability layer: deduplication,
//! acknowledgement scheduling, and per-channel ordering.

use crate::consts::{ORDERING_CHANNELS, RECEIVE_WINDOW};
use bytes::Bytes;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Sliding record of reliable message numbers already seen: everything
/// below `watermark` is known-delivered, numbers above it sit in `above`
/// until the watermark can advance over them.
#[derive(Debug, Default)]
struct ReceivedSet {
    watermark: u32,
    above: BTreeSet<u32>,
}

impl ReceivedSet {
    /// Records a number. Returns `false` for duplicates and for numbers
    /// outside the receive window.
    fn insert(&mut self, number: u32) -> bool {
        if number < self.watermark || self.above.contains(&number) {
            return false;
        }
        if number.wrapping_sub(self.watermark) > RECEIVE_WINDOW {
            debug!("reliable #{number} outside receive window, ignoring");
            return false;
        }
        self.above.insert(number);
        while self.above.remove(&self.watermark) {
            self.watermark = self.watermark.wrapping_add(1);
        }
        true
    }

    fn contains(&self, number: u32) -> bool {
        number < self.watermark || self.above.contains(&number)
    }
}

#[derive(Debug)]
pub(crate) struct ReceiveReliability {
    received: ReceivedSet,
    /// Message numbers to acknowledge on the next tick.
    acks_pending: BTreeSet<u32>,
    expected_order_index: [u32; ORDERING_CHANNELS as usize],
    /// Ordered payloads that arrived early, keyed by ordering index.
    out_of_order: HashMap<u8, BTreeMap<u32, Bytes>>,
    /// Newest delivered ordering index per channel for sequenced traffic.
    last_sequenced: HashMap<u8, u32>,
}

impl ReceiveReliability {
    pub fn new() -> Self {
        Self {
            received: ReceivedSet::default(),
            acks_pending: BTreeSet::new(),
            expected_order_index: [0; ORDERING_CHANNELS as usize],
            out_of_order: HashMap::new(),
            last_sequenced: HashMap::new(),
        }
    }

    /// Dedup check for a reliable message number. Duplicates are re-acked
    /// (the peer is resending because it never saw our acknowledgement)
    /// but not delivered again.
    pub fn record_reliable(&mut self, number: u32) -> bool {
        if self.received.contains(number) {
            trace!("duplicate reliable #{number}, re-acking");
            self.acks_pending.insert(number);
            return false;
        }
        if !self.received.insert(number) {
            return false;
        }
        self.acks_pending.insert(number);
        true
    }

    /// Runs an ordered payload through the channel's expected index:
    /// deliver-and-drain, stash, or drop stale.
    pub fn handle_ordered(&mut self, channel: u8, index: u32, payload: Bytes) -> Vec<Bytes> {
        let expected = &mut self.expected_order_index[channel as usize];
        let mut out = Vec::new();
        if index == *expected {
            out.push(payload);
            *expected = expected.wrapping_add(1);
            if let Some(buffer) = self.out_of_order.get_mut(&channel) {
                while let Some(next) = buffer.remove(expected) {
                    out.push(next);
                    *expected = expected.wrapping_add(1);
                }
            }
        } else if index > *expected {
            // Early arrival; a duplicate index overwrites harmlessly.
            self.out_of_order
                .entry(channel)
                .or_default()
                .insert(index, payload);
        } else {
            trace!("[ch{channel}] dropping stale ordered #{index}");
        }
        out
    }

    /// Newest-wins delivery for sequenced payloads.
    pub fn handle_sequenced(&mut self, channel: u8, index: u32, payload: Bytes) -> Option<Bytes> {
        match self.last_sequenced.get(&channel) {
            Some(&last) if index <= last => {
                trace!("[ch{channel}] dropping superseded sequenced #{index}");
                None
            }
            _ => {
                self.last_sequenced.insert(channel, index);
                Some(payload)
            }
        }
    }

    /// Drains the numbers to acknowledge on this tick.
    pub fn take_acks(&mut self) -> Option<BTreeSet<u32>> {
        if self.acks_pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.acks_pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(tag: u8) -> Bytes {
        Bytes::copy_from_slice(&[tag])
    }

    #[test]
    fn duplicates_are_dropped_but_reacked() {
        let mut recv = ReceiveReliability::new();
        assert!(recv.record_reliable(0));
        assert!(recv.record_reliable(1));
        recv.take_acks();

        assert!(!recv.record_reliable(0));
        assert!(!recv.record_reliable(1));
        // The duplicate still got scheduled for acknowledgement.
        assert_eq!(recv.take_acks().unwrap().len(), 2);
    }

    #[test]
    fn watermark_advances_over_gaps_once_filled() {
        let mut recv = ReceiveReliability::new();
        assert!(recv.record_reliable(2));
        assert!(recv.record_reliable(0));
        assert!(recv.record_reliable(1));
        assert_eq!(recv.received.watermark, 3);
        assert!(recv.received.above.is_empty());
        assert!(!recv.record_reliable(2));
    }

    #[test]
    fn numbers_far_past_the_window_are_ignored() {
        let mut recv = ReceiveReliability::new();
        assert!(!recv.record_reliable(RECEIVE_WINDOW + 10));
        assert!(recv.take_acks().is_none());
    }

    #[test]
    fn ordered_delivery_drains_consecutive_stash() {
        let mut recv = ReceiveReliability::new();
        assert!(recv.handle_ordered(0, 2, payload(2)).is_empty());
        assert!(recv.handle_ordered(0, 1, payload(1)).is_empty());
        let delivered = recv.handle_ordered(0, 0, payload(0));
        assert_eq!(delivered.len(), 3);
        assert_eq!(delivered[0].as_ref(), &[0]);
        assert_eq!(delivered[1].as_ref(), &[1]);
        assert_eq!(delivered[2].as_ref(), &[2]);
    }

    #[test]
    fn stale_ordered_packets_are_dropped() {
        let mut recv = ReceiveReliability::new();
        assert_eq!(recv.handle_ordered(0, 0, payload(0)).len(), 1);
        assert!(recv.handle_ordered(0, 0, payload(0)).is_empty());
    }

    #[test]
    fn ordering_is_per_channel() {
        let mut recv = ReceiveReliability::new();
        assert!(recv.handle_ordered(1, 1, payload(1)).is_empty());
        // Channel 0 is unaffected by channel 1's gap.
        assert_eq!(recv.handle_ordered(0, 0, payload(0)).len(), 1);
        assert_eq!(recv.handle_ordered(1, 0, payload(0)).len(), 2);
    }

    #[test]
    fn sequenced_is_newest_wins() {
        let mut recv = ReceiveReliability::new();
        assert!(recv.handle_sequenced(0, 0, payload(0)).is_some());
        assert!(recv.handle_sequenced(0, 5, payload(5)).is_some());
        assert!(recv.handle_sequenced(0, 3, payload(3)).is_none());
        assert!(recv.handle_sequenced(0, 5, payload(5)).is_none());
        assert!(recv.handle_sequenced(0, 6, payload(6)).is_some());
    }
}
