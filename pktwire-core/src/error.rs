//! Error types for pktwire

use thiserror::Error;

/// Result type alias for pktwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pktwire
///
/// Decode and encode failures are deterministic functions of the input bytes
/// and the header schema. A checksum mismatch is not an error: it is recorded
/// on the decoded packet instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bit range lies outside the backing buffer
    #[error(
        "Bit range out of bounds: {bit_count} bits at bit offset {bit_offset} \
         exceed buffer of {available_bits} bits"
    )]
    BitRange {
        bit_offset: usize,
        bit_count: usize,
        available_bits: usize,
    },

    /// Source buffer of a bit write holds fewer bits than requested
    #[error("Source buffer too short: {bit_count} bits requested, {available_bits} available")]
    ShortInput {
        bit_count: usize,
        available_bits: usize,
    },

    /// Caller asked to decode more bits than the buffer holds
    #[error(
        "Truncated {protocol} input: {bit_length} bits at bit offset {bit_offset} \
         requested, buffer holds {available_bits} bits"
    )]
    Truncated {
        protocol: &'static str,
        bit_offset: usize,
        bit_length: usize,
        available_bits: usize,
    },

    /// Not enough bits left for a declared header field
    #[error(
        "Failed to decode {protocol} field '{field}': {bit_width} bits at byte offset \
         {byte_offset} (bit {bit_offset}), only {available_bits} bits available"
    )]
    Decode {
        protocol: &'static str,
        field: &'static str,
        byte_offset: usize,
        bit_offset: usize,
        bit_width: usize,
        available_bits: usize,
    },

    /// Stored field value does not match its declared storage size
    #[error(
        "Failed to encode {protocol} field '{field}': value is {actual} bytes, expected {expected}"
    )]
    FieldWidth {
        protocol: &'static str,
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Post-encode patch-up failed
    #[error("Failed to encode {protocol}: {reason}")]
    Encode {
        protocol: &'static str,
        reason: String,
    },

    /// Invalid parameter error
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl Error {
    /// Create an invalid parameter error
    pub fn invalid_parameter<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an encode error for a protocol
    pub fn encode<S: Into<String>>(protocol: &'static str, reason: S) -> Self {
        Error::Encode {
            protocol,
            reason: reason.into(),
        }
    }

    /// True for failures raised while turning bytes into packets
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Error::BitRange { .. } | Error::Truncated { .. } | Error::Decode { .. }
        )
    }

    /// True for failures raised while turning packets into bytes
    pub fn is_encode(&self) -> bool {
        matches!(
            self,
            Error::ShortInput { .. } | Error::FieldWidth { .. } | Error::Encode { .. }
        )
    }
}
