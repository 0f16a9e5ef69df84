//! IPv4 header
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-------+-------+-----------+---+-------------------------------+
//! |Version|  IHL  |   DSCP    |ECN|          Total Length         |
//! +-------+-------+-----------+---+-----+-------------------------+
//! |         Identification        |Flags|     Fragment Offset     |
//! +---------------+---------------+-----+-------------------------+
//! |      TTL      |    Protocol   |        Header Checksum        |
//! +---------------+---------------+-------------------------------+
//! |                        Source Address                         |
//! +---------------------------------------------------------------+
//! |                      Destination Address                      |
//! +---------------------------------------------------------------+
//! |                    Options (IHL > 5, padded)                  |
//! +---------------------------------------------------------------+
//! ```
//!
//! The options width follows from the decoded IHL. The protocol number
//! selects the payload only for the first fragment; later fragments keep
//! their payload raw. On encode the total length and header checksum are
//! patched into the serialized bytes.

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use pktwire_core::{Error, Result};
use tracing::warn;

use crate::checksum::internet_checksum_excluding;
use crate::dispatch::ip_protocols;
use crate::layer::{Layer, Protocol};
use crate::packet::PacketKind;
use crate::schema::{header_fields, FieldSpec, HeaderSchema, SchemaBuilder};

/// Byte offset of the header checksum
const CHECKSUM_OFFSET: usize = 10;

/// IP Protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    /// ICMP (1)
    ICMP,
    /// IGMP (2)
    IGMP,
    /// TCP (6)
    TCP,
    /// UDP (17)
    UDP,
    /// GRE (47)
    GRE,
    /// ESP (50)
    ESP,
    /// AH (51)
    AH,
    /// OSPF (89)
    OSPF,
    /// Custom protocol number
    Custom(u8),
}

impl IpProtocol {
    pub fn to_u8(self) -> u8 {
        match self {
            IpProtocol::ICMP => 1,
            IpProtocol::IGMP => 2,
            IpProtocol::TCP => 6,
            IpProtocol::UDP => 17,
            IpProtocol::GRE => 47,
            IpProtocol::ESP => 50,
            IpProtocol::AH => 51,
            IpProtocol::OSPF => 89,
            IpProtocol::Custom(val) => val,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => IpProtocol::ICMP,
            2 => IpProtocol::IGMP,
            6 => IpProtocol::TCP,
            17 => IpProtocol::UDP,
            47 => IpProtocol::GRE,
            50 => IpProtocol::ESP,
            51 => IpProtocol::AH,
            89 => IpProtocol::OSPF,
            val => IpProtocol::Custom(val),
        }
    }
}

/// IP Flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpFlags {
    /// Reserved bit (must be 0)
    pub reserved: bool,
    /// Don't Fragment flag
    pub dont_fragment: bool,
    /// More Fragments flag
    pub more_fragments: bool,
}

impl IpFlags {
    /// No flags set
    pub const NONE: IpFlags = IpFlags {
        reserved: false,
        dont_fragment: false,
        more_fragments: false,
    };

    /// Don't Fragment flag set
    pub const DONT_FRAGMENT: IpFlags = IpFlags {
        reserved: false,
        dont_fragment: true,
        more_fragments: false,
    };

    pub fn new() -> Self {
        IpFlags::NONE
    }

    pub fn with_dont_fragment(mut self, df: bool) -> Self {
        self.dont_fragment = df;
        self
    }

    pub fn with_more_fragments(mut self, mf: bool) -> Self {
        self.more_fragments = mf;
        self
    }

    /// Convert to 3-bit value
    pub fn to_u8(self) -> u8 {
        let mut flags = 0u8;
        if self.reserved {
            flags |= 0b100;
        }
        if self.dont_fragment {
            flags |= 0b010;
        }
        if self.more_fragments {
            flags |= 0b001;
        }
        flags
    }

    /// Parse from 3-bit value
    pub fn from_u8(value: u8) -> Self {
        IpFlags {
            reserved: (value & 0b100) != 0,
            dont_fragment: (value & 0b010) != 0,
            more_fragments: (value & 0b001) != 0,
        }
    }
}

header_fields! {
    /// IPv4 header fields
    pub enum Ipv4Field {
        Version => "version",
        HeaderLength => "header_length",
        Dscp => "dscp",
        Ecn => "ecn",
        TotalLength => "total_length",
        Identification => "identification",
        Flags => "flags",
        FragmentOffset => "fragment_offset",
        Ttl => "ttl",
        Protocol => "protocol",
        Checksum => "checksum",
        Source => "source",
        Destination => "destination",
        Options => "options",
    }
}

/// IPv4 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header;

/// IPv4 packet
pub type Ipv4 = Layer<Ipv4Header>;

impl Protocol for Ipv4Header {
    type Field = Ipv4Field;

    const NAME: &'static str = "IPv4";

    fn schema() -> &'static HeaderSchema<Ipv4Field> {
        static SCHEMA: OnceLock<HeaderSchema<Ipv4Field>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .number(Ipv4Field::Version, 4)
                .number(Ipv4Field::HeaderLength, 4)
                .number(Ipv4Field::Dscp, 6)
                .number(Ipv4Field::Ecn, 2)
                .number(Ipv4Field::TotalLength, 16)
                .number(Ipv4Field::Identification, 16)
                .number(Ipv4Field::Flags, 3)
                .number(Ipv4Field::FragmentOffset, 13)
                .number(Ipv4Field::Ttl, 8)
                .number(Ipv4Field::Protocol, 8)
                .number(Ipv4Field::Checksum, 16)
                .bytes(Ipv4Field::Source, 32)
                .bytes(Ipv4Field::Destination, 32)
                .variable(Ipv4Field::Options)
                .build()
        })
    }

    fn defaults(layer: &mut Ipv4) {
        layer.set_version(4).set_header_length(5).set_ttl(64);
    }

    fn field_width(layer: &Ipv4, spec: &FieldSpec<Ipv4Field>) -> usize {
        match spec.id() {
            Ipv4Field::Options => {
                (usize::from(layer.header_length()) * 32).saturating_sub(Ipv4::MIN_HEADER_SIZE * 8)
            }
            _ => spec.bit_width(),
        }
    }

    /// The datagram ends at its total length; anything behind it (Ethernet
    /// padding) becomes the trailer. A total length shorter than the header
    /// cannot be trusted and leaves the payload unbounded.
    fn payload_bits(layer: &Ipv4, available_bits: usize) -> usize {
        let total_len = usize::from(layer.total_length());
        let header_len = layer.header_len();
        if !layer.has_field(Ipv4Field::TotalLength) || total_len < header_len {
            return available_bits;
        }
        ((total_len - header_len) * 8).min(available_bits)
    }

    fn payload_kind(layer: &Ipv4, field: Ipv4Field) -> Option<PacketKind> {
        match field {
            Ipv4Field::Protocol if layer.fragment_offset() == 0 => {
                ip_protocols().lookup(layer.protocol())
            }
            _ => None,
        }
    }

    fn post_decode(layer: &mut Ipv4, data: &[u8], start: usize) -> Result<()> {
        let Some(header) = data.get(start..start + layer.header_len()) else {
            return Ok(());
        };
        let computed = internet_checksum_excluding(header, CHECKSUM_OFFSET);
        if computed != layer.checksum() {
            warn!(
                protocol = Self::NAME,
                stored = layer.checksum(),
                computed,
                "Header checksum mismatch"
            );
            layer.mark_corrupted();
        }
        Ok(())
    }

    fn post_encode(layer: &mut Ipv4, output: &mut [u8]) -> Result<()> {
        if layer.has_field(Ipv4Field::TotalLength) {
            let total_length = u16::try_from(output.len()).map_err(|_| {
                Error::encode(
                    Self::NAME,
                    format!(
                        "total length {} exceeds {} bytes",
                        output.len(),
                        Ipv4::MAX_PACKET_SIZE
                    ),
                )
            })?;
            layer.patch_uint(output, Ipv4Field::TotalLength, u64::from(total_length))?;
        }

        if layer.has_field(Ipv4Field::Checksum) {
            let header_len = layer.header_len();
            let checksum = internet_checksum_excluding(&output[..header_len], CHECKSUM_OFFSET);
            layer.patch_uint(output, Ipv4Field::Checksum, u64::from(checksum))?;
        }
        Ok(())
    }
}

impl Layer<Ipv4Header> {
    /// Minimum IPv4 header size (without options)
    pub const MIN_HEADER_SIZE: usize = 20;

    /// Maximum IPv4 header size (with maximum options)
    pub const MAX_HEADER_SIZE: usize = 60;

    /// Maximum IPv4 packet size
    pub const MAX_PACKET_SIZE: usize = 65535;

    /// Create a header for `source` -> `destination` carrying `protocol`
    pub fn with_addresses(source: Ipv4Addr, destination: Ipv4Addr, protocol: IpProtocol) -> Self {
        let mut ip = Self::new();
        ip.set_source(source)
            .set_destination(destination)
            .set_protocol(protocol.to_u8());
        ip
    }

    pub fn version(&self) -> u8 {
        self.uint(Ipv4Field::Version) as u8
    }

    pub fn set_version(&mut self, version: u8) -> &mut Self {
        self.set_uint(Ipv4Field::Version, u64::from(version))
    }

    /// Internet header length in 32-bit words
    pub fn header_length(&self) -> u8 {
        self.uint(Ipv4Field::HeaderLength) as u8
    }

    /// Set the IHL directly. Prefer [`set_options`](Self::set_options),
    /// which keeps the IHL consistent with the options.
    pub fn set_header_length(&mut self, ihl: u8) -> &mut Self {
        self.set_uint(Ipv4Field::HeaderLength, u64::from(ihl))
    }

    pub fn dscp(&self) -> u8 {
        self.uint(Ipv4Field::Dscp) as u8
    }

    pub fn set_dscp(&mut self, dscp: u8) -> &mut Self {
        self.set_uint(Ipv4Field::Dscp, u64::from(dscp))
    }

    pub fn ecn(&self) -> u8 {
        self.uint(Ipv4Field::Ecn) as u8
    }

    pub fn set_ecn(&mut self, ecn: u8) -> &mut Self {
        self.set_uint(Ipv4Field::Ecn, u64::from(ecn))
    }

    /// Total length in bytes; filled in on serialize
    pub fn total_length(&self) -> u16 {
        self.uint(Ipv4Field::TotalLength) as u16
    }

    pub fn set_total_length(&mut self, length: u16) -> &mut Self {
        self.set_uint(Ipv4Field::TotalLength, u64::from(length))
    }

    pub fn identification(&self) -> u16 {
        self.uint(Ipv4Field::Identification) as u16
    }

    pub fn set_identification(&mut self, id: u16) -> &mut Self {
        self.set_uint(Ipv4Field::Identification, u64::from(id))
    }

    pub fn flags(&self) -> IpFlags {
        IpFlags::from_u8(self.uint(Ipv4Field::Flags) as u8)
    }

    pub fn set_flags(&mut self, flags: IpFlags) -> &mut Self {
        self.set_uint(Ipv4Field::Flags, u64::from(flags.to_u8()))
    }

    /// Fragment offset in 8-byte units
    pub fn fragment_offset(&self) -> u16 {
        self.uint(Ipv4Field::FragmentOffset) as u16
    }

    pub fn set_fragment_offset(&mut self, offset: u16) -> &mut Self {
        self.set_uint(Ipv4Field::FragmentOffset, u64::from(offset))
    }

    pub fn ttl(&self) -> u8 {
        self.uint(Ipv4Field::Ttl) as u8
    }

    pub fn set_ttl(&mut self, ttl: u8) -> &mut Self {
        self.set_uint(Ipv4Field::Ttl, u64::from(ttl))
    }

    /// Raw protocol number
    pub fn protocol(&self) -> u8 {
        self.uint(Ipv4Field::Protocol) as u8
    }

    pub fn set_protocol(&mut self, protocol: u8) -> &mut Self {
        self.set_uint(Ipv4Field::Protocol, u64::from(protocol))
    }

    pub fn protocol_kind(&self) -> IpProtocol {
        IpProtocol::from_u8(self.protocol())
    }

    /// Header checksum; filled in on serialize
    pub fn checksum(&self) -> u16 {
        self.uint(Ipv4Field::Checksum) as u16
    }

    pub fn set_checksum(&mut self, checksum: u16) -> &mut Self {
        self.set_uint(Ipv4Field::Checksum, u64::from(checksum))
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.array::<4>(Ipv4Field::Source))
    }

    pub fn set_source(&mut self, source: Ipv4Addr) -> &mut Self {
        self.set_bytes(Ipv4Field::Source, &source.octets())
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.array::<4>(Ipv4Field::Destination))
    }

    pub fn set_destination(&mut self, destination: Ipv4Addr) -> &mut Self {
        self.set_bytes(Ipv4Field::Destination, &destination.octets())
    }

    /// Options bytes including padding; empty without options
    pub fn options(&self) -> &[u8] {
        self.field(Ipv4Field::Options).unwrap_or(&[])
    }

    /// Set the options, padding them with zeros to a 4-byte boundary and
    /// updating the IHL. Empty options remove the field.
    ///
    /// # Examples
    ///
    /// ```
    /// use pktwire_packet::Ipv4;
    ///
    /// let mut ip = Ipv4::new();
    /// ip.set_options(&[0x01, 0x01, 0x01]).unwrap();
    /// assert_eq!(ip.options(), &[0x01, 0x01, 0x01, 0x00]);
    /// assert_eq!(ip.header_length(), 6);
    /// ```
    pub fn set_options(&mut self, options: &[u8]) -> Result<&mut Self> {
        let max = Self::MAX_HEADER_SIZE - Self::MIN_HEADER_SIZE;
        if options.len() > max {
            return Err(Error::invalid_parameter(
                "options",
                format!("{} bytes of IPv4 options exceed the {max}-byte limit", options.len()),
            ));
        }
        if options.is_empty() {
            self.clear_field(Ipv4Field::Options);
            return Ok(self.set_header_length(5));
        }

        let mut padded = options.to_vec();
        padded.resize(options.len().next_multiple_of(4), 0);
        let words = (Self::MIN_HEADER_SIZE + padded.len()) / 4;
        self.set_bytes(Ipv4Field::Options, &padded);
        Ok(self.set_header_length(words as u8))
    }

    /// Check if this packet is a fragment (MF set or nonzero offset)
    pub fn is_fragment(&self) -> bool {
        self.flags().more_fragments || self.fragment_offset() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known_header() -> Ipv4 {
        Ipv4::with_addresses(
            Ipv4Addr::new(192, 0, 2, 1),
            Ipv4Addr::new(198, 51, 100, 7),
            IpProtocol::TCP,
        )
    }

    #[test]
    fn test_ip_protocol_conversion() {
        assert_eq!(IpProtocol::UDP.to_u8(), 17);
        assert_eq!(IpProtocol::from_u8(1), IpProtocol::ICMP);
        assert_eq!(IpProtocol::from_u8(200), IpProtocol::Custom(200));
    }

    #[test]
    fn test_ip_flags() {
        let flags = IpFlags::new().with_dont_fragment(true);
        assert_eq!(flags.to_u8(), 0b010);
        assert!(IpFlags::from_u8(0b011).more_fragments);
        assert_eq!(IpFlags::default(), IpFlags::NONE);
    }

    #[test]
    fn test_defaults() {
        let ip = Ipv4::new();
        assert_eq!(ip.version(), 4);
        assert_eq!(ip.header_length(), 5);
        assert_eq!(ip.ttl(), 64);
        assert_eq!(ip.header_bits(), 160);
        assert!(ip.options().is_empty());
    }

    #[test]
    fn test_known_checksum() {
        let mut ip = known_header();
        let bytes = ip.serialize().unwrap();

        assert_eq!(
            &bytes[..],
            &[
                0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x06, 0x8e, 0xa8, 0xc0,
                0x00, 0x02, 0x01, 0xc6, 0x33, 0x64, 0x07
            ]
        );
        assert_eq!(ip.checksum(), 0x8ea8);
        assert_eq!(ip.total_length(), 20);
    }

    #[test]
    fn test_serialize_is_idempotent() {
        let mut ip = known_header();
        ip.set_raw_payload(vec![0u8; 12]);
        let first = ip.serialize().unwrap();
        let second = ip.serialize().unwrap();
        assert_eq!(first, second);
        assert_eq!(ip.total_length(), 32);
    }

    #[test]
    fn test_options_padding() {
        let mut ip = Ipv4::with_addresses(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            IpProtocol::UDP,
        );
        ip.set_options(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(ip.header_bits(), 192);

        let bytes = ip.serialize().unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[0], 0x46);
        assert_eq!(&bytes[10..12], &[0x61, 0xd1]);
        assert_eq!(&bytes[20..], &[0x01, 0x02, 0x03, 0x00]);

        let mut parsed = Ipv4::empty();
        parsed.decode(&bytes, 0, bytes.len() * 8).unwrap();
        assert_eq!(parsed.options(), &[0x01, 0x02, 0x03, 0x00]);
        assert!(!parsed.is_corrupted());
        assert_eq!(parsed, ip);
    }

    #[test]
    fn test_options_limits() {
        let mut ip = Ipv4::new();
        let err = ip.set_options(&[0u8; 41]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));

        ip.set_options(&[1u8; 40]).unwrap();
        assert_eq!(ip.header_length(), 15);

        ip.set_options(&[]).unwrap();
        assert_eq!(ip.header_length(), 5);
        assert!(!ip.has_field(Ipv4Field::Options));
    }

    #[test]
    fn test_ihl_mismatch_fails_encode() {
        let mut ip = Ipv4::new();
        ip.set_options(&[1, 2, 3, 4]).unwrap();
        ip.set_header_length(5);

        let err = ip.serialize().unwrap_err();
        assert!(err.is_encode());
        assert!(matches!(err, Error::FieldWidth { field: "options", .. }));
    }

    #[test]
    fn test_checksum_mismatch_marks_corrupted() {
        let mut bytes = known_header().serialize().unwrap().to_vec();
        bytes[8] = 63;

        let mut ip = Ipv4::empty();
        ip.decode(&bytes, 0, bytes.len() * 8).unwrap();
        assert!(ip.is_corrupted());
        assert_eq!(ip.ttl(), 63);
    }

    #[test]
    fn test_fragment_payload_stays_raw() {
        let mut ip = known_header();
        ip.set_fragment_offset(185).set_raw_payload(vec![0u8; 20]);
        let bytes = ip.serialize().unwrap();

        let mut parsed = Ipv4::empty();
        parsed.decode(&bytes, 0, bytes.len() * 8).unwrap();
        assert!(parsed.is_fragment());
        assert!(parsed.payload().is_none());
        assert_eq!(parsed.raw_payload().map(|raw| raw.len()), Some(20));
    }
}
