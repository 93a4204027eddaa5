//! Little-endian byte and bit cursors shared by the built-in formats.
//!
//! Every read is bounds checked and reports truncation as
//! [`ErrorType::InvalidFormat`](crate::ErrorType::InvalidFormat), so a decoder
//! built on [`ByteReader`] and [`BitReader`] cannot read past its input.

use crate::{GvoxError, Voxel};

/// Encoded size of a voxel: three `f32` colour channels and a `u32` id.
pub(crate) const VOXEL_SIZE: usize = 16;

pub(crate) fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_voxel(out: &mut Vec<u8>, voxel: &Voxel) {
    for channel in voxel.color {
        out.extend_from_slice(&channel.to_le_bytes());
    }
    put_u32(out, voxel.id);
}

pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], GvoxError> {
        if len > self.remaining() {
            return Err(GvoxError::invalid_format(format!(
                "unexpected end of payload: needed {len} bytes at offset {}, {} left",
                self.position,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], GvoxError> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn u8(&mut self) -> Result<u8, GvoxError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, GvoxError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, GvoxError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, GvoxError> {
        self.take_array().map(u64::from_le_bytes)
    }

    pub fn f32(&mut self) -> Result<f32, GvoxError> {
        self.take_array().map(f32::from_le_bytes)
    }

    pub fn voxel(&mut self) -> Result<Voxel, GvoxError> {
        let color = [self.f32()?, self.f32()?, self.f32()?];
        let id = self.u32()?;
        Ok(Voxel { color, id })
    }
}

/// Appends fixed-width values LSB-first with no padding between values.
pub(crate) struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    bit_offset: u32,
}

impl<'a> BitWriter<'a> {
    /// Starts writing at the next byte boundary of `out`.
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out, bit_offset: 0 }
    }

    /// Writes the low `bits` bits of `value`. `bits` must be in `1..=32`.
    pub fn write(&mut self, value: u32, bits: u32) {
        debug_assert!((1..=32).contains(&bits));
        let mut value = u64::from(value) & ((1u64 << bits) - 1);
        let mut left = bits;
        while left > 0 {
            if self.bit_offset == 0 {
                self.out.push(0);
            }
            let space = 8 - self.bit_offset;
            let n = space.min(left);
            let last = self.out.len() - 1;
            self.out[last] |= ((value & ((1 << n) - 1)) as u8) << self.bit_offset;
            value >>= n;
            left -= n;
            self.bit_offset = (self.bit_offset + n) % 8;
        }
    }
}

/// Reads values written by [`BitWriter`].
pub(crate) struct BitReader<'a> {
    bytes: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            bit_position: 0,
        }
    }

    pub fn read(&mut self, bits: u32) -> Result<u32, GvoxError> {
        debug_assert!((1..=32).contains(&bits));
        if self.bit_position + bits as usize > self.bytes.len() * 8 {
            return Err(GvoxError::invalid_format("bit stream ended early"));
        }
        let mut value = 0u64;
        let mut filled = 0;
        while filled < bits {
            let byte = self.bytes[self.bit_position / 8];
            let offset = (self.bit_position % 8) as u32;
            let n = (8 - offset).min(bits - filled);
            let chunk = (u64::from(byte) >> offset) & ((1 << n) - 1);
            value |= chunk << filled;
            filled += n;
            self.bit_position += n as usize;
        }
        Ok(value as u32)
    }
}

/// Number of bytes needed to hold `count` values of `bits` bits each.
pub(crate) fn packed_len(count: usize, bits: u32) -> usize {
    (count * bits as usize).div_ceil(8)
}
