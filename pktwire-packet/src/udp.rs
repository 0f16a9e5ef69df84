//! UDP header
//!
//! Ports, length and checksum, 8 bytes. Like TCP, the checksum is carried
//! as stored and never computed or verified.

use std::sync::OnceLock;

use crate::layer::{Layer, Protocol};
use crate::schema::{header_fields, HeaderSchema, SchemaBuilder};

header_fields! {
    /// UDP header fields
    pub enum UdpField {
        SourcePort => "source_port",
        DestinationPort => "destination_port",
        Length => "length",
        Checksum => "checksum",
    }
}

/// UDP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader;

/// UDP datagram
pub type Udp = Layer<UdpHeader>;

impl Protocol for UdpHeader {
    type Field = UdpField;

    const NAME: &'static str = "UDP";

    fn schema() -> &'static HeaderSchema<UdpField> {
        static SCHEMA: OnceLock<HeaderSchema<UdpField>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .number(UdpField::SourcePort, 16)
                .number(UdpField::DestinationPort, 16)
                .number(UdpField::Length, 16)
                .number(UdpField::Checksum, 16)
                .build()
        })
    }
}

impl Layer<UdpHeader> {
    /// UDP header size in bytes
    pub const HEADER_LEN: usize = 8;

    /// Create a datagram between two ports
    pub fn with_ports(source_port: u16, destination_port: u16) -> Self {
        let mut udp = Self::new();
        udp.set_source_port(source_port)
            .set_destination_port(destination_port);
        udp
    }

    pub fn source_port(&self) -> u16 {
        self.uint(UdpField::SourcePort) as u16
    }

    pub fn set_source_port(&mut self, port: u16) -> &mut Self {
        self.set_uint(UdpField::SourcePort, u64::from(port))
    }

    pub fn destination_port(&self) -> u16 {
        self.uint(UdpField::DestinationPort) as u16
    }

    pub fn set_destination_port(&mut self, port: u16) -> &mut Self {
        self.set_uint(UdpField::DestinationPort, u64::from(port))
    }

    /// Length of header and data in bytes
    pub fn length(&self) -> u16 {
        self.uint(UdpField::Length) as u16
    }

    pub fn set_length(&mut self, length: u16) -> &mut Self {
        self.set_uint(UdpField::Length, u64::from(length))
    }

    /// Stored checksum; not computed by the codec
    pub fn checksum(&self) -> u16 {
        self.uint(UdpField::Checksum) as u16
    }

    pub fn set_checksum(&mut self, checksum: u16) -> &mut Self {
        self.set_uint(UdpField::Checksum, u64::from(checksum))
    }
}
