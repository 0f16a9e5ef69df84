//! Checksum calculations for network packets
//!
//! This module provides the Internet Checksum (RFC 1071) used by the IPv4
//! and ICMP headers. The checksum is computed over already serialized bytes;
//! the checksum field itself is treated as zero while summing.

use std::ops::Range;

/// Calculates the Internet Checksum as defined in RFC 1071.
///
/// The data is treated as a sequence of big-endian 16-bit words which are
/// summed with end-around carry; the result is the one's complement of the
/// sum. An odd trailing byte is padded with a zero byte.
///
/// # Examples
///
/// ```
/// use pktwire_packet::checksum::internet_checksum;
///
/// assert_eq!(internet_checksum(&[0x00, 0x01, 0xf2, 0x03]), !0xf204);
/// ```
pub fn internet_checksum(data: &[u8]) -> u16 {
    !checksum_accumulate(data, None)
}

/// Calculates the Internet Checksum over `data` with the 16-bit field at
/// `field_offset` treated as zero.
///
/// This is how a header checksum is computed or verified in place: the
/// serialized header still contains the transmitted checksum value, which
/// must not contribute to the sum.
///
/// # Examples
///
/// ```
/// use pktwire_packet::checksum::internet_checksum_excluding;
///
/// // ICMP echo request, checksum at offset 2
/// let icmp = [0x08, 0x00, 0xf7, 0xfd, 0x00, 0x01, 0x00, 0x01];
/// assert_eq!(internet_checksum_excluding(&icmp, 2), 0xf7fd);
/// ```
pub fn internet_checksum_excluding(data: &[u8], field_offset: usize) -> u16 {
    !checksum_accumulate(data, Some(field_offset..field_offset + 2))
}

/// Validates an Internet checksum.
///
/// Summing a block that includes a correct checksum yields 0xFFFF, so its
/// complement is 0.
pub fn validate_checksum(data: &[u8]) -> bool {
    let result = internet_checksum(data);
    result == 0 || result == 0xFFFF
}

/// One's complement sum of `data` folded to 16 bits, with the bytes in
/// `skip` counted as zero.
pub fn checksum_accumulate(data: &[u8], skip: Option<Range<usize>>) -> u16 {
    let byte_at = |index: usize| -> u32 {
        match &skip {
            Some(range) if range.contains(&index) => 0,
            _ => u32::from(data[index]),
        }
    };

    let mut sum: u32 = 0;
    let mut index = 0;
    while index + 1 < data.len() {
        sum += (byte_at(index) << 8) | byte_at(index + 1);
        // Fold early so very long buffers cannot overflow
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        index += 2;
    }

    // Handle odd byte if present
    if index < data.len() {
        sum += byte_at(index) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum as u16
}
