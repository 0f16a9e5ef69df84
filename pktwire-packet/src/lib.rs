//! Declarative packet codec for pktwire
//!
//! Every protocol header is described once as a [`HeaderSchema`]: an ordered
//! list of fields with bit widths. One generic engine, [`Layer`], decodes and
//! encodes any header from its schema, so sub-byte fields (IPv4 flags,
//! 802.1Q priority, TCP data offset) need no hand-written shifting. Protocols
//! plug in behaviour the schema cannot express through the [`Protocol`]
//! trait: variable field widths, payload dispatch and checksums.
//!
//! Supported protocols:
//!
//! - **Ethernet II** and **IEEE 802.1Q** (including stacked tags)
//! - **ARP** for Ethernet/IPv4
//! - **IPv4** with options, header checksum and fragment-aware dispatch
//! - **ICMP** with checksum over header and payload
//! - **TCP** and **UDP** (checksums are carried, not computed)
//!
//! # Architecture
//!
//! - [`schema`] - field identifiers and header schemas
//! - [`layer`] - the generic decode/encode engine
//! - [`packet`] - the [`Packet`] enum over all protocols and [`DecodeOptions`]
//! - [`dispatch`] - discriminant-to-protocol tables
//! - [`ethernet`], [`dot1q`], [`arp`], [`ip`], [`icmp`], [`tcp`], [`udp`] - protocols
//! - [`builder`] - fluent construction of whole frames
//! - [`checksum`] - Internet checksum calculation utilities
//!
//! # Quick Start
//!
//! ## Decoding a frame
//!
//! ```rust
//! use pktwire_packet::{Packet, PacketKind};
//!
//! let frame = [
//!     0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x06,
//!     0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
//!     0x0a, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x02,
//! ];
//!
//! let packet = Packet::decode(PacketKind::Ethernet, &frame).unwrap();
//! let arp = packet.payload().and_then(Packet::as_arp).unwrap();
//! assert!(arp.is_request());
//! assert_eq!(arp.target_protocol().to_string(), "10.0.0.2");
//! ```
//!
//! ## Building a TCP SYN packet
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use pktwire_core::MacAddress;
//! use pktwire_packet::{PacketBuilder, TcpFlags};
//!
//! let bytes = PacketBuilder::new()
//!     .ethernet(
//!         MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
//!         MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
//!     )
//!     .ipv4(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
//!     .tcp(54321, 80, 1000, 0, TcpFlags::SYN)
//!     .build_bytes()
//!     .unwrap();
//!
//! assert_eq!(bytes.len(), 54);
//! ```
//!
//! ## Editing fields of a single layer
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use pktwire_packet::{IpProtocol, Ipv4};
//!
//! let mut ip = Ipv4::with_addresses(
//!     Ipv4Addr::new(192, 0, 2, 1),
//!     Ipv4Addr::new(198, 51, 100, 7),
//!     IpProtocol::TCP,
//! );
//! ip.set_ttl(32).set_identification(0x1c46);
//!
//! let bytes = ip.serialize().unwrap();
//! assert_eq!(bytes.len(), 20);
//! assert_eq!(ip.total_length(), 20);
//! ```

pub mod arp;
pub mod builder;
pub mod checksum;
pub mod dispatch;
pub mod dot1q;
pub mod ethernet;
pub mod fields;
pub mod icmp;
pub mod ip;
pub mod layer;
pub mod packet;
pub mod schema;
pub mod tcp;
pub mod udp;

#[cfg(test)]
mod tests;

// Re-export commonly used types for convenience
pub use arp::{Arp, ArpHeader, ArpOpcode};
pub use builder::PacketBuilder;
pub use checksum::{internet_checksum, internet_checksum_excluding, validate_checksum};
pub use dispatch::{ether_types, ip_protocols, DispatchTable};
pub use dot1q::{Dot1q, Dot1qHeader};
pub use ethernet::{EtherType, Ethernet, EthernetHeader};
pub use icmp::{Icmp, IcmpHeader, IcmpType};
pub use ip::{IpFlags, IpProtocol, Ipv4, Ipv4Header};
pub use layer::{Layer, Protocol};
pub use packet::{DecodeOptions, HeaderDisplay, Layers, Packet, PacketKind, PacketLayer};
pub use schema::{FieldId, HeaderSchema, SchemaBuilder};
pub use tcp::{Tcp, TcpFlags, TcpHeader};
pub use udp::{Udp, UdpHeader};

pub use pktwire_core::{Error, MacAddress, Result};
