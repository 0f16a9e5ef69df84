//! ARP for Ethernet/IPv4
//!
//! The address fields are sized by the hardware and protocol length fields
//! on the wire; this header fixes them at Ethernet (6) and IPv4 (4) widths,
//! 28 bytes in total. ARP carries no checksum and no payload dispatch.

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use pktwire_core::MacAddress;

use crate::layer::{Layer, Protocol};
use crate::schema::{header_fields, HeaderSchema, SchemaBuilder};

/// Hardware types
pub const HTYPE_ETHERNET: u16 = 1;

/// Protocol types
pub const PTYPE_IPV4: u16 = 0x0800;

/// ARP Operation Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOpcode {
    /// ARP Request
    Request = 1,
    /// ARP Reply
    Reply = 2,
    /// RARP Request
    RarpRequest = 3,
    /// RARP Reply
    RarpReply = 4,
}

impl ArpOpcode {
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            1 => Some(Self::Request),
            2 => Some(Self::Reply),
            3 => Some(Self::RarpRequest),
            4 => Some(Self::RarpReply),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

header_fields! {
    /// ARP header fields
    pub enum ArpField {
        HardwareType => "hardware_type",
        ProtocolType => "protocol_type",
        HardwareLength => "hardware_length",
        ProtocolLength => "protocol_length",
        Opcode => "opcode",
        SenderHardware => "sender_hardware",
        SenderProtocol => "sender_protocol",
        TargetHardware => "target_hardware",
        TargetProtocol => "target_protocol",
    }
}

/// ARP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpHeader;

/// ARP packet
pub type Arp = Layer<ArpHeader>;

impl Protocol for ArpHeader {
    type Field = ArpField;

    const NAME: &'static str = "ARP";

    fn schema() -> &'static HeaderSchema<ArpField> {
        static SCHEMA: OnceLock<HeaderSchema<ArpField>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .number(ArpField::HardwareType, 16)
                .number(ArpField::ProtocolType, 16)
                .number(ArpField::HardwareLength, 8)
                .number(ArpField::ProtocolLength, 8)
                .number(ArpField::Opcode, 16)
                .bytes(ArpField::SenderHardware, 48)
                .bytes(ArpField::SenderProtocol, 32)
                .bytes(ArpField::TargetHardware, 48)
                .bytes(ArpField::TargetProtocol, 32)
                .build()
        })
    }

    fn defaults(layer: &mut Arp) {
        layer
            .set_hardware_type(HTYPE_ETHERNET)
            .set_protocol_type(PTYPE_IPV4)
            .set_hardware_length(6)
            .set_protocol_length(4);
    }
}

impl Layer<ArpHeader> {
    /// Header length in bytes
    pub const HEADER_LEN: usize = 28;

    /// Create an ARP request asking who has `target_ip`
    pub fn request(sender_mac: MacAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        let mut arp = Self::new();
        arp.set_opcode(ArpOpcode::Request.to_u16())
            .set_sender_hardware(sender_mac)
            .set_sender_protocol(sender_ip)
            .set_target_protocol(target_ip);
        arp
    }

    /// Create an ARP reply
    pub fn reply(
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    ) -> Self {
        let mut arp = Self::new();
        arp.set_opcode(ArpOpcode::Reply.to_u16())
            .set_sender_hardware(sender_mac)
            .set_sender_protocol(sender_ip)
            .set_target_hardware(target_mac)
            .set_target_protocol(target_ip);
        arp
    }

    /// Create a gratuitous ARP announcing `ip`
    pub fn gratuitous(mac: MacAddress, ip: Ipv4Addr) -> Self {
        Self::request(mac, ip, ip)
    }

    pub fn hardware_type(&self) -> u16 {
        self.uint(ArpField::HardwareType) as u16
    }

    pub fn set_hardware_type(&mut self, value: u16) -> &mut Self {
        self.set_uint(ArpField::HardwareType, u64::from(value))
    }

    pub fn protocol_type(&self) -> u16 {
        self.uint(ArpField::ProtocolType) as u16
    }

    pub fn set_protocol_type(&mut self, value: u16) -> &mut Self {
        self.set_uint(ArpField::ProtocolType, u64::from(value))
    }

    pub fn hardware_length(&self) -> u8 {
        self.uint(ArpField::HardwareLength) as u8
    }

    pub fn set_hardware_length(&mut self, value: u8) -> &mut Self {
        self.set_uint(ArpField::HardwareLength, u64::from(value))
    }

    pub fn protocol_length(&self) -> u8 {
        self.uint(ArpField::ProtocolLength) as u8
    }

    pub fn set_protocol_length(&mut self, value: u8) -> &mut Self {
        self.set_uint(ArpField::ProtocolLength, u64::from(value))
    }

    pub fn opcode(&self) -> u16 {
        self.uint(ArpField::Opcode) as u16
    }

    pub fn set_opcode(&mut self, value: u16) -> &mut Self {
        self.set_uint(ArpField::Opcode, u64::from(value))
    }

    /// Opcode as a known operation
    pub fn operation(&self) -> Option<ArpOpcode> {
        ArpOpcode::from_u16(self.opcode())
    }

    pub fn sender_hardware(&self) -> MacAddress {
        MacAddress(self.array(ArpField::SenderHardware))
    }

    pub fn set_sender_hardware(&mut self, mac: MacAddress) -> &mut Self {
        self.set_bytes(ArpField::SenderHardware, mac.as_bytes())
    }

    pub fn sender_protocol(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.array::<4>(ArpField::SenderProtocol))
    }

    pub fn set_sender_protocol(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.set_bytes(ArpField::SenderProtocol, &ip.octets())
    }

    pub fn target_hardware(&self) -> MacAddress {
        MacAddress(self.array(ArpField::TargetHardware))
    }

    pub fn set_target_hardware(&mut self, mac: MacAddress) -> &mut Self {
        self.set_bytes(ArpField::TargetHardware, mac.as_bytes())
    }

    pub fn target_protocol(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.array::<4>(ArpField::TargetProtocol))
    }

    pub fn set_target_protocol(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.set_bytes(ArpField::TargetProtocol, &ip.octets())
    }

    /// Check if this is a request
    pub fn is_request(&self) -> bool {
        self.operation() == Some(ArpOpcode::Request)
    }

    /// Check if this is a reply
    pub fn is_reply(&self) -> bool {
        self.operation() == Some(ArpOpcode::Reply)
    }

    /// Check if this is gratuitous ARP
    pub fn is_gratuitous(&self) -> bool {
        self.sender_protocol() == self.target_protocol()
    }
}
