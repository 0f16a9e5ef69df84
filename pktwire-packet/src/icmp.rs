//! ICMP header
//!
//! Type, code and checksum followed by the echo identifier and sequence
//! number (the "rest of header" word for other message types). The checksum
//! covers the header and the raw payload.

use std::sync::OnceLock;

use bytes::Bytes;
use pktwire_core::Result;
use tracing::warn;

use crate::checksum::internet_checksum_excluding;
use crate::layer::{Layer, Protocol};
use crate::schema::{header_fields, HeaderSchema, SchemaBuilder};

/// Byte offset of the checksum field
const CHECKSUM_OFFSET: usize = 2;

/// ICMP Message Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    SourceQuench = 4,
    Redirect = 5,
    EchoRequest = 8,
    RouterAdvertisement = 9,
    RouterSolicitation = 10,
    TimeExceeded = 11,
    ParameterProblem = 12,
    Timestamp = 13,
    TimestampReply = 14,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            4 => Some(IcmpType::SourceQuench),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::EchoRequest),
            9 => Some(IcmpType::RouterAdvertisement),
            10 => Some(IcmpType::RouterSolicitation),
            11 => Some(IcmpType::TimeExceeded),
            12 => Some(IcmpType::ParameterProblem),
            13 => Some(IcmpType::Timestamp),
            14 => Some(IcmpType::TimestampReply),
            _ => None,
        }
    }
}

header_fields! {
    /// ICMP header fields
    pub enum IcmpField {
        Type => "type",
        Code => "code",
        Checksum => "checksum",
        Identifier => "identifier",
        Sequence => "sequence",
    }
}

/// ICMP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader;

/// ICMP message
pub type Icmp = Layer<IcmpHeader>;

impl Protocol for IcmpHeader {
    type Field = IcmpField;

    const NAME: &'static str = "ICMP";

    fn schema() -> &'static HeaderSchema<IcmpField> {
        static SCHEMA: OnceLock<HeaderSchema<IcmpField>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .number(IcmpField::Type, 8)
                .number(IcmpField::Code, 8)
                .number(IcmpField::Checksum, 16)
                .number(IcmpField::Identifier, 16)
                .number(IcmpField::Sequence, 16)
                .build()
        })
    }

    fn post_decode(layer: &mut Icmp, data: &[u8], start: usize) -> Result<()> {
        let raw_len = layer.raw_payload().map_or(0, |raw| raw.len());
        let end = start + layer.header_len() + raw_len;
        let Some(message) = data.get(start..end) else {
            return Ok(());
        };
        let computed = internet_checksum_excluding(message, CHECKSUM_OFFSET);
        if computed != layer.checksum() {
            warn!(
                protocol = Self::NAME,
                stored = layer.checksum(),
                computed,
                "Checksum mismatch"
            );
            layer.mark_corrupted();
        }
        Ok(())
    }

    fn post_encode(layer: &mut Icmp, output: &mut [u8]) -> Result<()> {
        if layer.has_field(IcmpField::Checksum) {
            let checksum = internet_checksum_excluding(output, CHECKSUM_OFFSET);
            layer.patch_uint(output, IcmpField::Checksum, u64::from(checksum))?;
        }
        Ok(())
    }
}

impl Layer<IcmpHeader> {
    /// Create an echo request (ping) carrying `data`
    pub fn echo_request(identifier: u16, sequence: u16, data: impl Into<Bytes>) -> Self {
        let mut icmp = Self::new();
        icmp.set_icmp_type(IcmpType::EchoRequest as u8)
            .set_identifier(identifier)
            .set_sequence(sequence)
            .set_raw_payload(data);
        icmp
    }

    /// Create an echo reply carrying `data`
    pub fn echo_reply(identifier: u16, sequence: u16, data: impl Into<Bytes>) -> Self {
        let mut icmp = Self::echo_request(identifier, sequence, data);
        icmp.set_icmp_type(IcmpType::EchoReply as u8);
        icmp
    }

    /// Raw message type
    pub fn icmp_type(&self) -> u8 {
        self.uint(IcmpField::Type) as u8
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8) -> &mut Self {
        self.set_uint(IcmpField::Type, u64::from(icmp_type))
    }

    /// Message type, if known
    pub fn message_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type())
    }

    pub fn code(&self) -> u8 {
        self.uint(IcmpField::Code) as u8
    }

    pub fn set_code(&mut self, code: u8) -> &mut Self {
        self.set_uint(IcmpField::Code, u64::from(code))
    }

    /// Checksum; filled in on serialize
    pub fn checksum(&self) -> u16 {
        self.uint(IcmpField::Checksum) as u16
    }

    pub fn set_checksum(&mut self, checksum: u16) -> &mut Self {
        self.set_uint(IcmpField::Checksum, u64::from(checksum))
    }

    pub fn identifier(&self) -> u16 {
        self.uint(IcmpField::Identifier) as u16
    }

    pub fn set_identifier(&mut self, identifier: u16) -> &mut Self {
        self.set_uint(IcmpField::Identifier, u64::from(identifier))
    }

    pub fn sequence(&self) -> u16 {
        self.uint(IcmpField::Sequence) as u16
    }

    pub fn set_sequence(&mut self, sequence: u16) -> &mut Self {
        self.set_uint(IcmpField::Sequence, u64::from(sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_request_checksum() {
        let mut icmp = Icmp::echo_request(0x1234, 7, &b"abcd"[..]);
        let bytes = icmp.serialize().unwrap();

        assert_eq!(
            &bytes[..],
            &[0x08, 0x00, 0x20, 0xfe, 0x12, 0x34, 0x00, 0x07, b'a', b'b', b'c', b'd']
        );
        assert_eq!(icmp.checksum(), 0x20fe);
        assert_eq!(icmp.message_type(), Some(IcmpType::EchoRequest));
    }

    #[test]
    fn test_decode_verifies_over_payload() {
        let mut bytes = Icmp::echo_request(0x1234, 7, &b"abcd"[..])
            .serialize()
            .unwrap()
            .to_vec();

        let mut icmp = Icmp::empty();
        icmp.decode(&bytes, 0, bytes.len() * 8).unwrap();
        assert!(!icmp.is_corrupted());
        assert_eq!(icmp.raw_payload().map(|raw| raw.len()), Some(4));

        // A payload byte is covered by the checksum too
        bytes[11] ^= 0x01;
        icmp.decode(&bytes, 0, bytes.len() * 8).unwrap();
        assert!(icmp.is_corrupted());
    }

    #[test]
    fn test_echo_reply() {
        let icmp = Icmp::echo_reply(1, 2, Bytes::new());
        assert_eq!(icmp.icmp_type(), 0);
        assert_eq!(icmp.identifier(), 1);
        assert_eq!(icmp.sequence(), 2);
        assert!(icmp.raw_payload().map_or(true, |raw| raw.is_empty()));
    }
}
