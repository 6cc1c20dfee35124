//! Bit-granular serialization buffer.
//!
//! RakNet frames fields at bit granularity (a 3-bit reliability here, a
//! 5-bit channel there), so the usual byte-oriented reader/writer split is
//! not enough. [`BitStream`] keeps one mutable buffer with two independent
//! cursors measured in bits: reads never pass the write cursor, writes
//! extend the buffer as needed.
//!
//! Bit order is most-significant-bit first: the first bit written to a
//! fresh stream occupies bit 7 of byte 0. Multi-byte integers are written
//! in little-endian byte order, so a byte-aligned `write_u32` lays the
//! value's LE bytes down verbatim.

use crate::error::{BitStreamError, Result};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Default)]
pub struct BitStream {
    buf: BytesMut,
    /// Read cursor, in bits. Never exceeds `write_pos`.
    read_pos: usize,
    /// Write cursor, in bits. Byte-aligned iff it sits at the buffer end.
    write_pos: usize,
}

macro_rules! int_helpers {
    ($($write:ident / $read:ident => $ty:ty),* $(,)?) => { $(
        /// Writes the value in little-endian byte order, one byte at a
        /// time, advancing the write cursor by exactly the value's width.
        pub fn $write(&mut self, value: $ty) {
            for b in value.to_le_bytes() {
                self.write_bits(b as u32, 8);
            }
        }

        /// Reads a little-endian value of the matching width.
        pub fn $read(&mut self) -> Result<$ty> {
            let mut bytes = [0u8; size_of::<$ty>()];
            self.check_remaining(bytes.len() * 8)?;
            for b in &mut bytes {
                *b = self.read_bits(8)? as u8;
            }
            Ok(<$ty>::from_le_bytes(bytes))
        }
    )* };
}

impl BitStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(bytes),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Wraps received bytes for reading; the write cursor is placed at the
    /// end so `remaining_bits` reflects the whole buffer.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(data),
            read_pos: 0,
            write_pos: data.len() * 8,
        }
    }

    /// Number of bits written so far.
    pub fn len_bits(&self) -> usize {
        self.write_pos
    }

    /// Bits still available to read.
    pub fn remaining_bits(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the stream, freezing the written bytes. Any partial final
    /// byte is padded with zero bits.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    fn check_remaining(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining_bits();
        if remaining < needed {
            return Err(BitStreamError::Underflow { needed, remaining });
        }
        Ok(())
    }

    // --- Bit-level primitives ---

    pub fn write_bit(&mut self, bit: bool) {
        let byte = self.write_pos / 8;
        if byte == self.buf.len() {
            self.buf.resize(byte + 1, 0);
        }
        if bit {
            self.buf[byte] |= 0x80 >> (self.write_pos % 8);
        }
        self.write_pos += 1;
    }

    /// Writes the low `bits` bits of `value`, most significant first.
    /// Advances the write cursor by exactly `bits`.
    pub fn write_bits(&mut self, value: u32, bits: usize) {
        debug_assert!(bits <= 32);
        for shift in (0..bits).rev() {
            self.write_bit(value >> shift & 1 == 1);
        }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        self.check_remaining(1)?;
        let bit = self.buf[self.read_pos / 8] & (0x80 >> (self.read_pos % 8)) != 0;
        self.read_pos += 1;
        Ok(bit)
    }

    /// Reads `bits` bits, most significant first. A failed read leaves the
    /// cursor untouched.
    pub fn read_bits(&mut self, bits: usize) -> Result<u32> {
        debug_assert!(bits <= 32);
        self.check_remaining(bits)?;
        let mut value = 0u32;
        for _ in 0..bits {
            value = value << 1 | self.read_bit()? as u32;
        }
        Ok(value)
    }

    /// Rounds the write cursor up to the next byte boundary. The skipped
    /// bits stay zero.
    pub fn align_write(&mut self) {
        self.write_pos = (self.write_pos + 7) & !7;
        debug_assert_eq!(self.write_pos, self.buf.len() * 8);
    }

    /// Rounds the read cursor up to the next byte boundary.
    pub fn align_read(&mut self) {
        self.read_pos = (self.read_pos + 7) & !7;
    }

    // --- Byte sequences ---

    /// Appends bytes verbatim when the cursor is byte-aligned, bit-shifted
    /// otherwise.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.write_pos % 8 == 0 {
            // An aligned write cursor always sits at the buffer end.
            self.buf.extend_from_slice(data);
            self.write_pos += data.len() * 8;
        } else {
            for &b in data {
                self.write_bits(b as u32, 8);
            }
        }
    }

    /// Reads `len` whole bytes. A failed read leaves the cursor untouched.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.check_remaining(len * 8)?;
        if self.read_pos % 8 == 0 {
            let start = self.read_pos / 8;
            let out = Bytes::copy_from_slice(&self.buf[start..start + len]);
            self.read_pos += len * 8;
            Ok(out)
        } else {
            let mut out = BytesMut::with_capacity(len);
            for _ in 0..len {
                out.put_u8(self.read_bits(8)? as u8);
            }
            Ok(out.freeze())
        }
    }

    // --- Typed helpers ---

    int_helpers! {
        write_u8 / read_u8 => u8,
        write_i8 / read_i8 => i8,
        write_u16 / read_u16 => u16,
        write_i16 / read_i16 => i16,
        write_u32 / read_u32 => u32,
        write_i32 / read_i32 => i32,
        write_u64 / read_u64 => u64,
        write_i64 / read_i64 => i64,
    }

    /// Bools occupy exactly one bit.
    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_bit()
    }

    pub fn write_f32(&mut self, value: f32) {
        for b in value.to_le_bytes() {
            self.write_bits(b as u32, 8);
        }
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_u32()?.to_le_bytes()))
    }

    pub fn write_f64(&mut self, value: f64) {
        for b in value.to_le_bytes() {
            self.write_bits(b as u32, 8);
        }
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_u64()?.to_le_bytes()))
    }

    // RakNet's compressed float encodings are an omitted extension; the
    // entry points exist so callers get a protocol-level error instead of
    // silently wrong framing.

    pub fn write_compressed_f32(&mut self, _value: f32) -> Result<()> {
        Err(BitStreamError::NotSupported("compressed float"))
    }

    pub fn read_compressed_f32(&mut self) -> Result<f32> {
        Err(BitStreamError::NotSupported("compressed float"))
    }

    pub fn write_compressed_f64(&mut self, _value: f64) -> Result<()> {
        Err(BitStreamError::NotSupported("compressed double"))
    }

    pub fn read_compressed_f64(&mut self) -> Result<f64> {
        Err(BitStreamError::NotSupported("compressed double"))
    }

    // --- Strings ---

    /// Writes a UTF-16LE string: aligned 16-bit LE byte-length prefix,
    /// then the code units. The string helpers are the only ones that
    /// align on their own; their prefixes are byte-aligned by definition.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let byte_len = units.len() * 2;
        if byte_len > u16::MAX as usize {
            return Err(BitStreamError::Overflow { len: byte_len });
        }
        self.align_write();
        self.write_u16(byte_len as u16);
        for unit in units {
            self.write_u16(unit);
        }
        Ok(())
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.align_read();
        let byte_len = self.read_u16()? as usize;
        if byte_len % 2 != 0 {
            return Err(BitStreamError::InvalidString(format!(
                "UTF-16 byte length {byte_len} is odd"
            )));
        }
        let mut units = Vec::with_capacity(byte_len / 2);
        for _ in 0..byte_len / 2 {
            units.push(self.read_u16()?);
        }
        String::from_utf16(&units)
            .map_err(|e| BitStreamError::InvalidString(e.to_string()))
    }

    /// Writes an ASCII string: aligned 8-bit length prefix, raw bytes.
    pub fn write_string_ascii(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(BitStreamError::Overflow { len: bytes.len() });
        }
        self.align_write();
        self.write_u8(bytes.len() as u8);
        self.write_bytes(bytes);
        Ok(())
    }

    pub fn read_string_ascii(&mut self) -> Result<String> {
        self.align_read();
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BitStreamError::InvalidString(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn first_bit_is_msb_of_byte_zero() {
        let mut stream = BitStream::new();
        stream.write_bit(true);
        assert_eq!(stream.as_bytes(), &[0x80]);
        assert_eq!(stream.len_bits(), 1);
    }

    #[test]
    fn bits_pack_msb_first() {
        let mut stream = BitStream::new();
        stream.write_bits(0b101, 3);
        stream.write_bits(0b01, 2);
        assert_eq!(stream.as_bytes(), &[0b1010_1000]);
        assert_eq!(stream.len_bits(), 5);

        assert_eq!(stream.read_bits(3).unwrap(), 0b101);
        assert_eq!(stream.read_bits(2).unwrap(), 0b01);
    }

    #[test]
    fn aligned_integers_are_little_endian() {
        let mut stream = BitStream::new();
        stream.write_u32(0x1122_3344);
        assert_eq!(stream.as_bytes(), &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(stream.read_u32().unwrap(), 0x1122_3344);
    }

    #[test]
    fn unaligned_write_advances_exactly_width() {
        let mut stream = BitStream::new();
        stream.write_bit(true);
        stream.write_u16(0xABCD);
        assert_eq!(stream.len_bits(), 17);
        assert!(stream.read_bit().unwrap());
        assert_eq!(stream.read_u16().unwrap(), 0xABCD);
    }

    #[test]
    fn align_pads_with_zero_bits() {
        let mut stream = BitStream::new();
        stream.write_bits(0b11, 2);
        stream.align_write();
        stream.write_u8(0xFF);
        assert_eq!(stream.as_bytes(), &[0b1100_0000, 0xFF]);

        assert_eq!(stream.read_bits(2).unwrap(), 0b11);
        stream.align_read();
        assert_eq!(stream.read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn read_past_end_fails_and_keeps_cursor() {
        let mut stream = BitStream::from_slice(&[0xAA]);
        assert!(matches!(
            stream.read_bits(16),
            Err(BitStreamError::Underflow { needed: 16, remaining: 8 })
        ));
        // The failed read consumed nothing.
        assert_eq!(stream.read_u8().unwrap(), 0xAA);
        assert!(matches!(
            stream.read_bit(),
            Err(BitStreamError::Underflow { needed: 1, remaining: 0 })
        ));
    }

    #[test]
    fn byte_copies_roundtrip_aligned_and_unaligned() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];

        let mut aligned = BitStream::new();
        aligned.write_bytes(&data);
        assert_eq!(aligned.read_bytes(4).unwrap().as_ref(), &data);

        let mut shifted = BitStream::new();
        shifted.write_bit(false);
        shifted.write_bytes(&data);
        shifted.read_bit().unwrap();
        assert_eq!(shifted.read_bytes(4).unwrap().as_ref(), &data);
    }

    #[test]
    fn bool_occupies_one_bit() {
        let mut stream = BitStream::new();
        stream.write_bool(true);
        stream.write_bool(false);
        stream.write_bool(true);
        assert_eq!(stream.len_bits(), 3);
        assert_eq!(stream.as_bytes(), &[0b1010_0000]);
    }

    #[test]
    fn string_roundtrip_utf16_and_ascii() {
        let mut stream = BitStream::new();
        stream.write_string("héllo wörld").unwrap();
        stream.write_string_ascii("plain").unwrap();
        stream.write_string("").unwrap();

        assert_eq!(stream.read_string().unwrap(), "héllo wörld");
        assert_eq!(stream.read_string_ascii().unwrap(), "plain");
        assert_eq!(stream.read_string().unwrap(), "");
    }

    #[test]
    fn compressed_floats_are_not_supported() {
        let mut stream = BitStream::new();
        assert!(matches!(
            stream.write_compressed_f32(1.0),
            Err(BitStreamError::NotSupported(_))
        ));
        assert!(matches!(
            stream.read_compressed_f64(),
            Err(BitStreamError::NotSupported(_))
        ));
    }

    /// Property: any sequence of typed writes reads back identically in
    /// the same order.
    #[test]
    fn randomized_typed_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0x0b17);
        for _ in 0..200 {
            let ops: Vec<u8> = (0..rng.random_range(1..40))
                .map(|_| rng.random_range(0..6))
                .collect();
            let mut stream = BitStream::new();
            let mut expected: Vec<(u8, u64)> = Vec::new();
            for &op in &ops {
                match op {
                    0 => {
                        let v: bool = rng.random();
                        stream.write_bool(v);
                        expected.push((0, v as u64));
                    }
                    1 => {
                        let v: u8 = rng.random();
                        stream.write_u8(v);
                        expected.push((1, v as u64));
                    }
                    2 => {
                        let v: u16 = rng.random();
                        stream.write_u16(v);
                        expected.push((2, v as u64));
                    }
                    3 => {
                        let v: u32 = rng.random();
                        stream.write_u32(v);
                        expected.push((3, v as u64));
                    }
                    4 => {
                        let v: u64 = rng.random();
                        stream.write_u64(v);
                        expected.push((4, v));
                    }
                    _ => {
                        let bits = rng.random_range(1..=32usize);
                        let v = rng.random::<u32>() & (u32::MAX >> (32 - bits));
                        stream.write_bits(v, bits);
                        expected.push((5, (bits as u64) << 32 | v as u64));
                    }
                }
            }
            for (op, value) in expected {
                match op {
                    0 => assert_eq!(stream.read_bool().unwrap() as u64, value),
                    1 => assert_eq!(stream.read_u8().unwrap() as u64, value),
                    2 => assert_eq!(stream.read_u16().unwrap() as u64, value),
                    3 => assert_eq!(stream.read_u32().unwrap() as u64, value),
                    4 => assert_eq!(stream.read_u64().unwrap(), value),
                    _ => {
                        let bits = (value >> 32) as usize;
                        assert_eq!(
                            stream.read_bits(bits).unwrap() as u64,
                            value & 0xFFFF_FFFF
                        );
                    }
                }
            }
            assert_eq!(stream.remaining_bits(), 0);
        }
    }
}
