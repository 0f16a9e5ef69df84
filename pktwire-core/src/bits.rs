//! Bit-level access to byte buffers
//!
//! Header fields are addressed by a bit offset and a bit count, most
//! significant bit first, independent of byte boundaries. A field read out of
//! a buffer comes back right-aligned: the result is `ceil(bit_count / 8)`
//! bytes long and the unused high-order bits of the first byte are zero, as
//! if the field had been shifted down into the low-order bits.
//!
//! ```text
//! buffer:  |1 0 1|1 0 0 1 1|1 1 0 0 ...     read_bits(buf, 3, 5)
//!                 ^-------^
//! result:  |0 0 0 1 0 0 1 1|
//! ```

use crate::error::{Error, Result};

/// Number of bits in a byte
pub const BITS_PER_BYTE: usize = 8;

/// Number of bytes needed to hold `bit_count` bits
pub fn bytes_for_bits(bit_count: usize) -> usize {
    bit_count.div_ceil(BITS_PER_BYTE)
}

fn check_range(len: usize, bit_offset: usize, bit_count: usize) -> Result<()> {
    let available_bits = len * BITS_PER_BYTE;
    match bit_offset.checked_add(bit_count) {
        Some(end) if end <= available_bits => Ok(()),
        _ => Err(Error::BitRange {
            bit_offset,
            bit_count,
            available_bits,
        }),
    }
}

/// Reads `bit_count` bits starting at `bit_offset` and returns them
/// right-aligned in a `ceil(bit_count / 8)` byte buffer.
///
/// # Examples
///
/// ```
/// use pktwire_core::bits::read_bits;
///
/// // IPv4 version/IHL byte: 0x45
/// let data = [0x45, 0x00];
/// assert_eq!(read_bits(&data, 0, 4).unwrap(), vec![0x04]);
/// assert_eq!(read_bits(&data, 4, 4).unwrap(), vec![0x05]);
/// ```
pub fn read_bits(data: &[u8], bit_offset: usize, bit_count: usize) -> Result<Vec<u8>> {
    check_range(data.len(), bit_offset, bit_count)?;

    let len = bytes_for_bits(bit_count);
    if bit_count == 0 {
        return Ok(Vec::new());
    }

    // Byte-aligned on both ends: plain copy
    if bit_offset % BITS_PER_BYTE == 0 && bit_count % BITS_PER_BYTE == 0 {
        let start = bit_offset / BITS_PER_BYTE;
        return Ok(data[start..start + len].to_vec());
    }

    let end_bit = bit_offset + bit_count;
    let shift = (BITS_PER_BYTE - end_bit % BITS_PER_BYTE) % BITS_PER_BYTE;
    let first = bit_offset / BITS_PER_BYTE;
    let last = (end_bit - 1) / BITS_PER_BYTE;

    let mut out = vec![0u8; len];
    // Walk backwards from the last source byte, assembling one output byte
    // from the low part of `index` and the high part of `index - 1`.
    for j in 0..len {
        let index = last - j;
        if index < first {
            break;
        }
        let mut byte = data[index] >> shift;
        if shift > 0 && index > first {
            byte |= data[index - 1] << (BITS_PER_BYTE - shift);
        }
        out[len - 1 - j] = byte;
    }

    let unused = len * BITS_PER_BYTE - bit_count;
    out[0] &= 0xFF >> unused;
    Ok(out)
}

/// Writes the `bit_count` low-order bits of `input` into `output` starting at
/// `bit_offset`. Bits of `output` outside the target range are preserved.
///
/// `input` may be longer than `ceil(bit_count / 8)` bytes; only its
/// trailing bits are used.
///
/// # Examples
///
/// ```
/// use pktwire_core::bits::write_bits;
///
/// let mut header = [0x40, 0x00];
/// write_bits(&mut header, &[0x05], 4, 4).unwrap();
/// assert_eq!(header, [0x45, 0x00]);
/// ```
pub fn write_bits(
    output: &mut [u8],
    input: &[u8],
    bit_offset: usize,
    bit_count: usize,
) -> Result<()> {
    check_range(output.len(), bit_offset, bit_count)?;

    let input_bits = input.len() * BITS_PER_BYTE;
    if input_bits < bit_count {
        return Err(Error::ShortInput {
            bit_count,
            available_bits: input_bits,
        });
    }
    if bit_count == 0 {
        return Ok(());
    }

    if bit_offset % BITS_PER_BYTE == 0 && bit_count % BITS_PER_BYTE == 0 {
        let start = bit_offset / BITS_PER_BYTE;
        let len = bit_count / BITS_PER_BYTE;
        output[start..start + len].copy_from_slice(&input[input.len() - len..]);
        return Ok(());
    }

    let skip = input_bits - bit_count;
    for i in 0..bit_count {
        let src = skip + i;
        let bit = (input[src / BITS_PER_BYTE] >> (7 - src % BITS_PER_BYTE)) & 1;
        let dst = bit_offset + i;
        let mask = 0x80u8 >> (dst % BITS_PER_BYTE);
        if bit == 1 {
            output[dst / BITS_PER_BYTE] |= mask;
        } else {
            output[dst / BITS_PER_BYTE] &= !mask;
        }
    }
    Ok(())
}

/// Interprets up to the last 8 bytes of `bytes` as a big-endian integer
pub fn to_u64(bytes: &[u8]) -> u64 {
    let start = bytes.len().saturating_sub(8);
    bytes[start..]
        .iter()
        .fold(0u64, |acc, &b| (acc << BITS_PER_BYTE) | u64::from(b))
}

/// Encodes `value` big-endian into exactly `len` bytes, dropping high-order
/// bytes that do not fit
pub fn from_u64(value: u64, len: usize) -> Vec<u8> {
    let be = value.to_be_bytes();
    if len >= be.len() {
        let mut out = vec![0u8; len - be.len()];
        out.extend_from_slice(&be);
        out
    } else {
        be[be.len() - len..].to_vec()
    }
}

/// Mask selecting the `bit_count` low-order bits of a `u64`
pub fn low_mask(bit_count: usize) -> u64 {
    if bit_count >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_count) - 1
    }
}
