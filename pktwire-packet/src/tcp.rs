//! TCP header
//!
//! The fixed 20-byte header. Options are not modelled: a data offset above 5
//! leaves them at the start of the raw payload. The checksum is stored and
//! round-tripped as given but never computed or verified, since it depends
//! on the IP pseudo-header.

use std::fmt;
use std::sync::OnceLock;

use crate::layer::{Layer, Protocol};
use crate::schema::{header_fields, HeaderSchema, SchemaBuilder};

/// TCP control flags, including the NS bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    /// FIN - No more data from sender
    pub fin: bool,
    /// SYN - Synchronize sequence numbers
    pub syn: bool,
    /// RST - Reset the connection
    pub rst: bool,
    /// PSH - Push function
    pub psh: bool,
    /// ACK - Acknowledgment field is significant
    pub ack: bool,
    /// URG - Urgent pointer field is significant
    pub urg: bool,
    /// ECE - ECN-Echo
    pub ece: bool,
    /// CWR - Congestion Window Reduced
    pub cwr: bool,
    /// NS - ECN-nonce concealment protection
    pub ns: bool,
}

impl TcpFlags {
    /// No flags set
    pub const NONE: TcpFlags = TcpFlags::from_u16(0);

    /// SYN flag (connection initiation)
    pub const SYN: TcpFlags = TcpFlags::from_u16(0x002);

    /// SYN+ACK flags (connection acknowledgment)
    pub const SYN_ACK: TcpFlags = TcpFlags::from_u16(0x012);

    /// ACK flag
    pub const ACK: TcpFlags = TcpFlags::from_u16(0x010);

    /// FIN+ACK flags (connection termination)
    pub const FIN_ACK: TcpFlags = TcpFlags::from_u16(0x011);

    /// RST flag (connection reset)
    pub const RST: TcpFlags = TcpFlags::from_u16(0x004);

    /// PSH+ACK flags (push data)
    pub const PSH_ACK: TcpFlags = TcpFlags::from_u16(0x018);

    pub fn new() -> Self {
        TcpFlags::NONE
    }

    /// Convert flags to the 9-bit wire value
    pub const fn to_u16(self) -> u16 {
        (self.fin as u16)
            | (self.syn as u16) << 1
            | (self.rst as u16) << 2
            | (self.psh as u16) << 3
            | (self.ack as u16) << 4
            | (self.urg as u16) << 5
            | (self.ece as u16) << 6
            | (self.cwr as u16) << 7
            | (self.ns as u16) << 8
    }

    /// Parse flags from the 9-bit wire value
    pub const fn from_u16(value: u16) -> Self {
        TcpFlags {
            fin: value & 0x001 != 0,
            syn: value & 0x002 != 0,
            rst: value & 0x004 != 0,
            psh: value & 0x008 != 0,
            ack: value & 0x010 != 0,
            urg: value & 0x020 != 0,
            ece: value & 0x040 != 0,
            cwr: value & 0x080 != 0,
            ns: value & 0x100 != 0,
        }
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.ns, "NS"),
            (self.cwr, "CWR"),
            (self.ece, "ECE"),
            (self.urg, "URG"),
            (self.ack, "ACK"),
            (self.psh, "PSH"),
            (self.rst, "RST"),
            (self.syn, "SYN"),
            (self.fin, "FIN"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}

header_fields! {
    /// TCP header fields
    pub enum TcpField {
        SourcePort => "source_port",
        DestinationPort => "destination_port",
        Sequence => "sequence",
        Acknowledgment => "acknowledgment",
        DataOffset => "data_offset",
        Reserved => "reserved",
        Flags => "flags",
        Window => "window",
        Checksum => "checksum",
        UrgentPointer => "urgent_pointer",
    }
}

/// TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader;

/// TCP segment
pub type Tcp = Layer<TcpHeader>;

impl Protocol for TcpHeader {
    type Field = TcpField;

    const NAME: &'static str = "TCP";

    fn schema() -> &'static HeaderSchema<TcpField> {
        static SCHEMA: OnceLock<HeaderSchema<TcpField>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .number(TcpField::SourcePort, 16)
                .number(TcpField::DestinationPort, 16)
                .number(TcpField::Sequence, 32)
                .number(TcpField::Acknowledgment, 32)
                .number(TcpField::DataOffset, 4)
                .number(TcpField::Reserved, 3)
                .number(TcpField::Flags, 9)
                .number(TcpField::Window, 16)
                .number(TcpField::Checksum, 16)
                .number(TcpField::UrgentPointer, 16)
                .build()
        })
    }

    fn defaults(layer: &mut Tcp) {
        layer.set_data_offset(5);
    }
}

impl Layer<TcpHeader> {
    /// Header length in bytes
    pub const HEADER_LEN: usize = 20;

    /// Create a segment between two ports
    pub fn with_ports(source_port: u16, destination_port: u16) -> Self {
        let mut tcp = Self::new();
        tcp.set_source_port(source_port)
            .set_destination_port(destination_port);
        tcp
    }

    pub fn source_port(&self) -> u16 {
        self.uint(TcpField::SourcePort) as u16
    }

    pub fn set_source_port(&mut self, port: u16) -> &mut Self {
        self.set_uint(TcpField::SourcePort, u64::from(port))
    }

    pub fn destination_port(&self) -> u16 {
        self.uint(TcpField::DestinationPort) as u16
    }

    pub fn set_destination_port(&mut self, port: u16) -> &mut Self {
        self.set_uint(TcpField::DestinationPort, u64::from(port))
    }

    pub fn sequence(&self) -> u32 {
        self.uint(TcpField::Sequence) as u32
    }

    pub fn set_sequence(&mut self, sequence: u32) -> &mut Self {
        self.set_uint(TcpField::Sequence, u64::from(sequence))
    }

    pub fn acknowledgment(&self) -> u32 {
        self.uint(TcpField::Acknowledgment) as u32
    }

    pub fn set_acknowledgment(&mut self, ack: u32) -> &mut Self {
        self.set_uint(TcpField::Acknowledgment, u64::from(ack))
    }

    /// Header length in 32-bit words
    pub fn data_offset(&self) -> u8 {
        self.uint(TcpField::DataOffset) as u8
    }

    pub fn set_data_offset(&mut self, words: u8) -> &mut Self {
        self.set_uint(TcpField::DataOffset, u64::from(words))
    }

    pub fn reserved(&self) -> u8 {
        self.uint(TcpField::Reserved) as u8
    }

    pub fn set_reserved(&mut self, reserved: u8) -> &mut Self {
        self.set_uint(TcpField::Reserved, u64::from(reserved))
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_u16(self.uint(TcpField::Flags) as u16)
    }

    pub fn set_flags(&mut self, flags: TcpFlags) -> &mut Self {
        self.set_uint(TcpField::Flags, u64::from(flags.to_u16()))
    }

    pub fn window(&self) -> u16 {
        self.uint(TcpField::Window) as u16
    }

    pub fn set_window(&mut self, window: u16) -> &mut Self {
        self.set_uint(TcpField::Window, u64::from(window))
    }

    /// Stored checksum; not computed by the codec
    pub fn checksum(&self) -> u16 {
        self.uint(TcpField::Checksum) as u16
    }

    pub fn set_checksum(&mut self, checksum: u16) -> &mut Self {
        self.set_uint(TcpField::Checksum, u64::from(checksum))
    }

    pub fn urgent_pointer(&self) -> u16 {
        self.uint(TcpField::UrgentPointer) as u16
    }

    pub fn set_urgent_pointer(&mut self, pointer: u16) -> &mut Self {
        self.set_uint(TcpField::UrgentPointer, u64::from(pointer))
    }
}
