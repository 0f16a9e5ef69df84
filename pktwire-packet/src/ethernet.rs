//! Ethernet II header
//!
//! ```text
//! +-------------------+-------------------+------------+
//! | destination (48)  | source (48)       | type (16)  |
//! +-------------------+-------------------+------------+
//! ```
//!
//! The type field selects the payload protocol through
//! [`ether_types`](crate::dispatch::ether_types).

use std::fmt;
use std::sync::OnceLock;

use pktwire_core::MacAddress;

use crate::dispatch::ether_types;
use crate::layer::{Layer, Protocol};
use crate::packet::PacketKind;
use crate::schema::{header_fields, HeaderSchema, SchemaBuilder};

/// Common EtherType values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtherType {
    /// IPv4 (0x0800)
    IPv4,
    /// ARP (0x0806)
    ARP,
    /// VLAN-tagged frame (0x8100)
    VLAN,
    /// IPv6 (0x86DD)
    IPv6,
    /// LLDP (0x88CC)
    LLDP,
    /// Q-in-Q/802.1ad (0x88A8)
    QinQ,
    /// Any other value
    Custom(u16),
}

impl EtherType {
    /// Convert EtherType to u16 value
    pub fn to_u16(self) -> u16 {
        match self {
            EtherType::IPv4 => 0x0800,
            EtherType::ARP => 0x0806,
            EtherType::VLAN => 0x8100,
            EtherType::IPv6 => 0x86DD,
            EtherType::LLDP => 0x88CC,
            EtherType::QinQ => 0x88A8,
            EtherType::Custom(val) => val,
        }
    }

    /// Create EtherType from u16 value
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0800 => EtherType::IPv4,
            0x0806 => EtherType::ARP,
            0x8100 => EtherType::VLAN,
            0x86DD => EtherType::IPv6,
            0x88CC => EtherType::LLDP,
            0x88A8 => EtherType::QinQ,
            val => EtherType::Custom(val),
        }
    }
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        EtherType::from_u16(value)
    }
}

impl From<EtherType> for u16 {
    fn from(value: EtherType) -> Self {
        value.to_u16()
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::IPv4 => write!(f, "IPv4"),
            EtherType::ARP => write!(f, "ARP"),
            EtherType::VLAN => write!(f, "VLAN"),
            EtherType::IPv6 => write!(f, "IPv6"),
            EtherType::LLDP => write!(f, "LLDP"),
            EtherType::QinQ => write!(f, "Q-in-Q"),
            EtherType::Custom(val) => write!(f, "0x{:04X}", val),
        }
    }
}

header_fields! {
    /// Ethernet header fields
    pub enum EthernetField {
        Destination => "destination",
        Source => "source",
        EtherType => "ether_type",
    }
}

/// Ethernet II protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader;

/// Ethernet II frame
pub type Ethernet = Layer<EthernetHeader>;

impl Protocol for EthernetHeader {
    type Field = EthernetField;

    const NAME: &'static str = "Ethernet";

    fn schema() -> &'static HeaderSchema<EthernetField> {
        static SCHEMA: OnceLock<HeaderSchema<EthernetField>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .bytes(EthernetField::Destination, 48)
                .bytes(EthernetField::Source, 48)
                .number(EthernetField::EtherType, 16)
                .build()
        })
    }

    fn payload_kind(layer: &Ethernet, field: EthernetField) -> Option<PacketKind> {
        match field {
            EthernetField::EtherType => ether_types().lookup(layer.ether_type()),
            _ => None,
        }
    }
}

impl Layer<EthernetHeader> {
    /// Header length in bytes
    pub const HEADER_LEN: usize = 14;

    pub fn destination(&self) -> MacAddress {
        MacAddress(self.array(EthernetField::Destination))
    }

    pub fn set_destination(&mut self, mac: MacAddress) -> &mut Self {
        self.set_bytes(EthernetField::Destination, mac.as_bytes())
    }

    pub fn source(&self) -> MacAddress {
        MacAddress(self.array(EthernetField::Source))
    }

    pub fn set_source(&mut self, mac: MacAddress) -> &mut Self {
        self.set_bytes(EthernetField::Source, mac.as_bytes())
    }

    /// Raw type value
    pub fn ether_type(&self) -> u16 {
        self.uint(EthernetField::EtherType) as u16
    }

    pub fn set_ether_type(&mut self, ether_type: u16) -> &mut Self {
        self.set_uint(EthernetField::EtherType, u64::from(ether_type))
    }

    /// Type value as a known EtherType
    pub fn ether_type_kind(&self) -> EtherType {
        EtherType::from_u16(self.ether_type())
    }
}
