//! Run-length encoding of acknowledged message numbers.
//!
//! An ACK datagram is the `is_ack` bit followed by records, each
//! `is_range` (1 bit), `min` (32 bits) and, for ranges, `max` (32 bits).
//! There is no record count: records are read until fewer than 33 bits
//! remain. Records must therefore stay unaligned, so that the byte
//! padding at the tail can never be mistaken for another record.

use crate::error::{RakError, Result};
use bytes::Bytes;
use opal_bitstream::BitStream;
use std::collections::BTreeSet;

/// Groups sorted message numbers into inclusive contiguous ranges.
pub fn to_ranges(numbers: &BTreeSet<u32>) -> Vec<(u32, u32)> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &number in numbers {
        match ranges.last_mut() {
            Some((_, max)) if max.wrapping_add(1) == number => *max = number,
            _ => ranges.push((number, number)),
        }
    }
    ranges
}

/// Encodes a complete ACK datagram for the given message numbers.
pub fn write_ack_datagram(numbers: &BTreeSet<u32>) -> Bytes {
    let mut stream = BitStream::with_capacity(1 + numbers.len() * 9);
    stream.write_bit(true);
    for (min, max) in to_ranges(numbers) {
        stream.write_bit(min != max);
        stream.write_bits(min, 32);
        if min != max {
            stream.write_bits(max, 32);
        }
    }
    stream.into_bytes()
}

/// Reads ACK records; the `is_ack` bit has already been consumed.
pub fn read_ranges(stream: &mut BitStream) -> Result<Vec<(u32, u32)>> {
    let mut ranges = Vec::new();
    while stream.remaining_bits() >= 33 {
        let is_range = stream.read_bit()?;
        let min = stream.read_bits(32)?;
        let max = if is_range { stream.read_bits(32)? } else { min };
        if min > max {
            return Err(RakError::MalformedDatagram("inverted ack range"));
        }
        ranges.push((min, max));
    }
    Ok(ranges)
}
