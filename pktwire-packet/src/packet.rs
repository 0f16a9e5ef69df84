//! Protocol-tagged packets and decode options
//!
//! [`Packet`] is the polymorphic face of the codec: one variant per supported
//! protocol, each wrapping a typed [`Layer`]. [`PacketKind`] is the matching
//! tag; dispatch tables map discriminant values to it, and it constructs the
//! empty packet a payload is decoded into.

use std::fmt;

use bytes::Bytes;
use pktwire_core::bits::BITS_PER_BYTE;
use pktwire_core::Result;

use crate::arp::{Arp, ArpHeader};
use crate::dot1q::{Dot1q, Dot1qHeader};
use crate::ethernet::{Ethernet, EthernetHeader};
use crate::icmp::{Icmp, IcmpHeader};
use crate::ip::{Ipv4, Ipv4Header};
use crate::layer::{Layer, Protocol};
use crate::tcp::{Tcp, TcpHeader};
use crate::udp::{Udp, UdpHeader};

/// Runs `$body` with `$layer` bound to the typed layer inside a packet
macro_rules! with_layer {
    ($packet:expr, $layer:ident => $body:expr) => {
        match $packet {
            Packet::Ethernet($layer) => $body,
            Packet::Dot1q($layer) => $body,
            Packet::Arp($layer) => $body,
            Packet::Ipv4($layer) => $body,
            Packet::Icmp($layer) => $body,
            Packet::Tcp($layer) => $body,
            Packet::Udp($layer) => $body,
        }
    };
}

/// Default maximum payload nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Options controlling a decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Run post-decode checksum verification
    pub verify_checksums: bool,
    /// Maximum number of nested layers; deeper payloads are kept raw
    pub max_depth: usize,
}

impl DecodeOptions {
    /// Create the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable checksum verification
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the maximum nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            verify_checksums: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Protocol of a packet layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketKind {
    /// Ethernet II
    Ethernet,
    /// IEEE 802.1Q VLAN tag
    Dot1q,
    /// ARP
    Arp,
    /// IPv4
    Ipv4,
    /// ICMP
    Icmp,
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl PacketKind {
    /// Every supported kind
    pub const ALL: [PacketKind; 7] = [
        PacketKind::Ethernet,
        PacketKind::Dot1q,
        PacketKind::Arp,
        PacketKind::Ipv4,
        PacketKind::Icmp,
        PacketKind::Tcp,
        PacketKind::Udp,
    ];

    /// Protocol name
    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Ethernet => EthernetHeader::NAME,
            PacketKind::Dot1q => Dot1qHeader::NAME,
            PacketKind::Arp => ArpHeader::NAME,
            PacketKind::Ipv4 => Ipv4Header::NAME,
            PacketKind::Icmp => IcmpHeader::NAME,
            PacketKind::Tcp => TcpHeader::NAME,
            PacketKind::Udp => UdpHeader::NAME,
        }
    }

    /// Parse a kind from its lowercase short name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ethernet" | "eth" => Some(PacketKind::Ethernet),
            "dot1q" | "vlan" | "802.1q" => Some(PacketKind::Dot1q),
            "arp" => Some(PacketKind::Arp),
            "ipv4" | "ip" => Some(PacketKind::Ipv4),
            "icmp" => Some(PacketKind::Icmp),
            "tcp" => Some(PacketKind::Tcp),
            "udp" => Some(PacketKind::Udp),
            _ => None,
        }
    }

    /// An empty packet of this kind, ready to be decoded into
    pub fn empty(self) -> Packet {
        match self {
            PacketKind::Ethernet => Packet::Ethernet(Ethernet::empty()),
            PacketKind::Dot1q => Packet::Dot1q(Dot1q::empty()),
            PacketKind::Arp => Packet::Arp(Arp::empty()),
            PacketKind::Ipv4 => Packet::Ipv4(Ipv4::empty()),
            PacketKind::Icmp => Packet::Icmp(Icmp::empty()),
            PacketKind::Tcp => Packet::Tcp(Tcp::empty()),
            PacketKind::Udp => Packet::Udp(Udp::empty()),
        }
    }

    pub(crate) fn decode_at(
        self,
        data: &[u8],
        bit_offset: usize,
        bit_length: usize,
        options: &DecodeOptions,
        depth: usize,
    ) -> Result<Packet> {
        let mut packet = self.empty();
        with_layer!(&mut packet, layer => {
            layer.decode_at(data, bit_offset, bit_length, options, depth)?
        });
        Ok(packet)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A protocol layer and, through its payload, every layer below it
///
/// Two packets are equal when they are the same protocol and their header
/// fields are equal; payloads are not compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Packet {
    Ethernet(Ethernet),
    Dot1q(Dot1q),
    Arp(Arp),
    Ipv4(Ipv4),
    Icmp(Icmp),
    Tcp(Tcp),
    Udp(Udp),
}

impl Packet {
    /// Decode a whole buffer as `kind`
    ///
    /// # Examples
    ///
    /// ```
    /// use pktwire_packet::{Packet, PacketKind};
    ///
    /// let bytes = [0x30, 0x39, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00];
    /// let packet = Packet::decode(PacketKind::Udp, &bytes).unwrap();
    /// assert_eq!(packet.as_udp().unwrap().destination_port(), 53);
    /// ```
    pub fn decode(kind: PacketKind, data: &[u8]) -> Result<Packet> {
        Self::decode_bits(kind, data, 0, data.len() * BITS_PER_BYTE)
    }

    /// Decode `bit_length` bits of `data` starting at `bit_offset`
    pub fn decode_bits(
        kind: PacketKind,
        data: &[u8],
        bit_offset: usize,
        bit_length: usize,
    ) -> Result<Packet> {
        Self::decode_with(kind, data, bit_offset, bit_length, &DecodeOptions::default())
    }

    /// Decode with explicit options
    pub fn decode_with(
        kind: PacketKind,
        data: &[u8],
        bit_offset: usize,
        bit_length: usize,
        options: &DecodeOptions,
    ) -> Result<Packet> {
        kind.decode_at(data, bit_offset, bit_length, options, 0)
    }

    /// Decode an Ethernet frame
    pub fn decode_frame(data: &[u8]) -> Result<Packet> {
        Self::decode(PacketKind::Ethernet, data)
    }

    /// Display adapter for this layer's header alone, without the payload
    pub fn header(&self) -> HeaderDisplay<'_> {
        HeaderDisplay(self)
    }

    /// Protocol of this layer
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Ethernet(_) => PacketKind::Ethernet,
            Packet::Dot1q(_) => PacketKind::Dot1q,
            Packet::Arp(_) => PacketKind::Arp,
            Packet::Ipv4(_) => PacketKind::Ipv4,
            Packet::Icmp(_) => PacketKind::Icmp,
            Packet::Tcp(_) => PacketKind::Tcp,
            Packet::Udp(_) => PacketKind::Udp,
        }
    }

    /// Protocol name of this layer
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Serialize this layer and everything below it
    pub fn serialize(&mut self) -> Result<Bytes> {
        with_layer!(self, layer => layer.serialize())
    }

    /// Nested payload packet
    pub fn payload(&self) -> Option<&Packet> {
        with_layer!(self, layer => layer.payload())
    }

    /// Mutable nested payload packet
    pub fn payload_mut(&mut self) -> Option<&mut Packet> {
        with_layer!(self, layer => layer.payload_mut())
    }

    /// Replace the payload with a nested packet
    pub fn set_payload(&mut self, payload: impl Into<Packet>) -> &mut Self {
        let payload = payload.into();
        with_layer!(&mut *self, layer => {
            layer.set_payload(payload);
        });
        self
    }

    /// Undecoded payload bytes
    pub fn raw_payload(&self) -> Option<&Bytes> {
        with_layer!(self, layer => layer.raw_payload())
    }

    /// Replace the payload with opaque bytes
    pub fn set_raw_payload(&mut self, raw: impl Into<Bytes>) -> &mut Self {
        let raw = raw.into();
        with_layer!(&mut *self, layer => {
            layer.set_raw_payload(raw);
        });
        self
    }

    /// Bytes behind this layer's payload, such as link padding
    pub fn trailer(&self) -> Option<&Bytes> {
        with_layer!(self, layer => layer.trailer())
    }

    /// True if a verified checksum of this layer did not match on decode
    pub fn is_corrupted(&self) -> bool {
        with_layer!(self, layer => layer.is_corrupted())
    }

    /// True if any layer of the chain is corrupted
    pub fn any_corrupted(&self) -> bool {
        self.layers().any(Packet::is_corrupted)
    }

    /// Header size of this layer in bits
    pub fn header_bits(&self) -> usize {
        with_layer!(self, layer => layer.header_bits())
    }

    /// Iterate over this layer and every nested payload layer
    pub fn layers(&self) -> Layers<'_> {
        Layers { next: Some(self) }
    }

    /// This layer as protocol `P`
    pub fn as_layer<P: PacketLayer>(&self) -> Option<&Layer<P>> {
        P::from_packet(self)
    }

    /// This layer as protocol `P`, mutably
    pub fn as_layer_mut<P: PacketLayer>(&mut self) -> Option<&mut Layer<P>> {
        P::from_packet_mut(self)
    }

    /// First layer of protocol `P` in the chain
    ///
    /// # Examples
    ///
    /// ```
    /// use pktwire_packet::{Ipv4Header, Packet};
    ///
    /// let frame = [
    ///     0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
    ///     0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x06, 0x8e, 0xa8, 0xc0, 0x00,
    ///     0x02, 0x01, 0xc6, 0x33, 0x64, 0x07,
    /// ];
    /// let packet = Packet::decode_frame(&frame).unwrap();
    /// let ip = packet.layer::<Ipv4Header>().unwrap();
    /// assert_eq!(ip.ttl(), 64);
    /// assert!(!ip.is_corrupted());
    /// ```
    pub fn layer<P: PacketLayer>(&self) -> Option<&Layer<P>> {
        self.layers().find_map(P::from_packet)
    }

    /// First layer of protocol `P` in the chain, mutably
    pub fn layer_mut<P: PacketLayer>(&mut self) -> Option<&mut Layer<P>> {
        let mut current = Some(self);
        while let Some(packet) = current {
            if P::from_packet(packet).is_some() {
                return P::from_packet_mut(packet);
            }
            current = packet.payload_mut();
        }
        None
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut last = self;
        for (depth, layer) in self.layers().enumerate() {
            if depth > 0 {
                write!(f, " / ")?;
            }
            write!(f, "{}", layer.header())?;
            last = layer;
        }
        if let Some(raw) = last.raw_payload() {
            write!(f, " / Raw[{} bytes]", raw.len())?;
        }
        Ok(())
    }
}

/// Formats a single layer's header, see [`Packet::header`]
pub struct HeaderDisplay<'a>(&'a Packet);

impl fmt::Display for HeaderDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        with_layer!(self.0, inner => write!(f, "{}", inner))
    }
}

/// Iterator over a payload chain, outermost layer first
pub struct Layers<'a> {
    next: Option<&'a Packet>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a Packet;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.payload();
        Some(current)
    }
}

/// Connects a protocol to its [`Packet`] variant
pub trait PacketLayer: Protocol {
    /// Tag of the protocol
    const KIND: PacketKind;

    /// Borrow the layer if `packet` is this protocol
    fn from_packet(packet: &Packet) -> Option<&Layer<Self>>;

    /// Mutably borrow the layer if `packet` is this protocol
    fn from_packet_mut(packet: &mut Packet) -> Option<&mut Layer<Self>>;
}

macro_rules! impl_packet_layer {
    ($($header:ident => $variant:ident, $as_ref:ident, $as_mut:ident;)+) => {
        $(
            impl PacketLayer for $header {
                const KIND: PacketKind = PacketKind::$variant;

                fn from_packet(packet: &Packet) -> Option<&Layer<Self>> {
                    match packet {
                        Packet::$variant(layer) => Some(layer),
                        _ => None,
                    }
                }

                fn from_packet_mut(packet: &mut Packet) -> Option<&mut Layer<Self>> {
                    match packet {
                        Packet::$variant(layer) => Some(layer),
                        _ => None,
                    }
                }
            }

            impl From<Layer<$header>> for Packet {
                fn from(layer: Layer<$header>) -> Self {
                    Packet::$variant(layer)
                }
            }

            impl Packet {
                #[doc = concat!("This layer as ", stringify!($variant))]
                pub fn $as_ref(&self) -> Option<&Layer<$header>> {
                    <$header as PacketLayer>::from_packet(self)
                }

                #[doc = concat!("This layer as ", stringify!($variant), ", mutably")]
                pub fn $as_mut(&mut self) -> Option<&mut Layer<$header>> {
                    <$header as PacketLayer>::from_packet_mut(self)
                }
            }
        )+
    };
}

impl_packet_layer! {
    EthernetHeader => Ethernet, as_ethernet, as_ethernet_mut;
    Dot1qHeader => Dot1q, as_dot1q, as_dot1q_mut;
    ArpHeader => Arp, as_arp, as_arp_mut;
    Ipv4Header => Ipv4, as_ipv4, as_ipv4_mut;
    IcmpHeader => Icmp, as_icmp, as_icmp_mut;
    TcpHeader => Tcp, as_tcp, as_tcp_mut;
    UdpHeader => Udp, as_udp, as_udp_mut;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(PacketKind::Ethernet.name(), "Ethernet");
        assert_eq!(PacketKind::Dot1q.to_string(), "802.1Q");
        assert_eq!(PacketKind::from_name("IPv4"), Some(PacketKind::Ipv4));
        assert_eq!(PacketKind::from_name("vlan"), Some(PacketKind::Dot1q));
        assert_eq!(PacketKind::from_name("sctp"), None);
    }

    #[test]
    fn test_empty_packet_matches_kind() {
        for kind in PacketKind::ALL {
            let packet = kind.empty();
            assert_eq!(packet.kind(), kind);
            assert_eq!(packet.header_bits(), 0);
            assert!(packet.payload().is_none());
        }
    }

    #[test]
    fn test_decode_options_builder() {
        let options = DecodeOptions::new()
            .with_verify_checksums(false)
            .with_max_depth(3);
        assert!(!options.verify_checksums);
        assert_eq!(options.max_depth, 3);
        assert_eq!(DecodeOptions::default().max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_layer_accessors() {
        let mut packet = Packet::from(Udp::new());
        assert!(packet.as_udp().is_some());
        assert!(packet.as_tcp().is_none());
        assert!(packet.as_layer::<UdpHeader>().is_some());

        packet.set_raw_payload(vec![1u8, 2, 3]);
        assert_eq!(packet.raw_payload().unwrap().len(), 3);
        assert_eq!(packet.to_string(), format!("{} / Raw[3 bytes]", Udp::new()));
    }

    #[test]
    fn test_layer_lookup_walks_chain() {
        let mut ethernet = Ethernet::new();
        ethernet.set_payload(Ipv4::new());
        let mut packet = Packet::from(ethernet);

        packet.layer_mut::<Ipv4Header>().unwrap().set_ttl(7);
        assert_eq!(packet.layer::<Ipv4Header>().unwrap().ttl(), 7);
        assert!(packet.layer::<TcpHeader>().is_none());
        assert_eq!(packet.layers().count(), 2);
    }
}
