//! Packet builder for constructing layered packets with a fluent API
//!
//! The builder assembles an Ethernet frame, optional 802.1Q tags, an IPv4 or
//! ARP layer and an optional ICMP/TCP/UDP layer into a [`Packet`] chain.
//! Discriminants (ether types, IP protocol number, UDP length) are derived
//! from the layers that were configured.

use std::net::Ipv4Addr;

use bytes::Bytes;
use pktwire_core::{Error, MacAddress, Result};

use crate::arp::{Arp, ArpOpcode};
use crate::dot1q::{is_valid_vlan_id, Dot1q, DOT1Q_MAX_VLAN, DOT1Q_MIN_VLAN};
use crate::ethernet::{EtherType, Ethernet};
use crate::icmp::{Icmp, IcmpType};
use crate::ip::{IpFlags, IpProtocol, Ipv4};
use crate::packet::{Packet, PacketKind};
use crate::tcp::{Tcp, TcpFlags};
use crate::udp::Udp;

/// Layer 2 frame type
#[derive(Debug, Clone)]
enum Layer2 {
    Ethernet {
        src: MacAddress,
        dst: MacAddress,
        ether_type: Option<u16>,
    },
}

/// 802.1Q tag, outermost first
#[derive(Debug, Clone, Copy)]
struct VlanTag {
    vlan_id: u16,
    priority: u8,
}

/// Layer 3 packet type
#[derive(Debug, Clone)]
enum Layer3 {
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        ttl: u8,
        identification: u16,
        flags: IpFlags,
    },
    Arp {
        opcode: ArpOpcode,
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    },
}

/// Layer 4 segment/datagram type
#[derive(Debug, Clone, Copy)]
enum Layer4 {
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
    },
    Icmp {
        icmp_type: u8,
        code: u8,
        identifier: u16,
        sequence: u16,
    },
}

/// Packet builder with fluent API for constructing layered packets
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use pktwire_core::MacAddress;
/// use pktwire_packet::PacketBuilder;
///
/// let packet = PacketBuilder::new()
///     .ethernet(
///         MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
///         MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
///     )
///     .ipv4(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
///     .udp(12345, 53)
///     .payload(vec![0xde, 0xad, 0xbe, 0xef])
///     .build()
///     .unwrap();
///
/// assert_eq!(packet.to_string().matches(" / ").count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PacketBuilder {
    layer2: Option<Layer2>,
    vlans: Vec<VlanTag>,
    layer3: Option<Layer3>,
    layer4: Option<Layer4>,
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an Ethernet layer. The ether type is derived from the next layer
    /// unless set with [`ether_type`](Self::ether_type).
    pub fn ethernet(mut self, src: MacAddress, dst: MacAddress) -> Self {
        self.layer2 = Some(Layer2::Ethernet {
            src,
            dst,
            ether_type: None,
        });
        self
    }

    /// Override the Ethernet type
    ///
    /// Must be called after `ethernet()`.
    pub fn ether_type(mut self, value: EtherType) -> Self {
        if let Some(Layer2::Ethernet {
            ref mut ether_type, ..
        }) = self.layer2
        {
            *ether_type = Some(value.to_u16());
        }
        self
    }

    /// Add an 802.1Q tag. Repeated calls stack tags, outermost first.
    pub fn vlan(mut self, vlan_id: u16, priority: u8) -> Self {
        self.vlans.push(VlanTag { vlan_id, priority });
        self
    }

    /// Add an IPv4 layer
    pub fn ipv4(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        self.layer3 = Some(Layer3::Ipv4 {
            src,
            dst,
            ttl: 64,
            identification: 0,
            flags: IpFlags::NONE,
        });
        self
    }

    /// Set the TTL for the IPv4 layer
    ///
    /// Must be called after `ipv4()`.
    pub fn ttl(mut self, new_ttl: u8) -> Self {
        if let Some(Layer3::Ipv4 { ref mut ttl, .. }) = self.layer3 {
            *ttl = new_ttl;
        }
        self
    }

    /// Set the identification for the IPv4 layer
    ///
    /// Must be called after `ipv4()`.
    pub fn identification(mut self, id: u16) -> Self {
        if let Some(Layer3::Ipv4 {
            ref mut identification,
            ..
        }) = self.layer3
        {
            *identification = id;
        }
        self
    }

    /// Set the flags for the IPv4 layer
    ///
    /// Must be called after `ipv4()`.
    pub fn ip_flags(mut self, new_flags: IpFlags) -> Self {
        if let Some(Layer3::Ipv4 { ref mut flags, .. }) = self.layer3 {
            *flags = new_flags;
        }
        self
    }

    /// Add an ARP request asking for `target_ip`
    pub fn arp_request(
        mut self,
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_ip: Ipv4Addr,
    ) -> Self {
        self.layer3 = Some(Layer3::Arp {
            opcode: ArpOpcode::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddress::ZERO,
            target_ip,
        });
        self
    }

    /// Add an ARP reply
    pub fn arp_reply(
        mut self,
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    ) -> Self {
        self.layer3 = Some(Layer3::Arp {
            opcode: ArpOpcode::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        });
        self
    }

    /// Add a UDP layer
    pub fn udp(mut self, src_port: u16, dst_port: u16) -> Self {
        self.layer4 = Some(Layer4::Udp { src_port, dst_port });
        self
    }

    /// Add a TCP layer
    pub fn tcp(
        mut self,
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
    ) -> Self {
        self.layer4 = Some(Layer4::Tcp {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            window: 65535,
        });
        self
    }

    /// Set the TCP window size
    ///
    /// Must be called after `tcp()`.
    pub fn window(mut self, new_window: u16) -> Self {
        if let Some(Layer4::Tcp { ref mut window, .. }) = self.layer4 {
            *window = new_window;
        }
        self
    }

    /// Add an ICMP message
    pub fn icmp(mut self, icmp_type: u8, code: u8) -> Self {
        self.layer4 = Some(Layer4::Icmp {
            icmp_type,
            code,
            identifier: 0,
            sequence: 0,
        });
        self
    }

    /// Add an ICMP echo request
    pub fn icmp_echo_request(mut self, identifier: u16, sequence: u16) -> Self {
        self.layer4 = Some(Layer4::Icmp {
            icmp_type: IcmpType::EchoRequest as u8,
            code: 0,
            identifier,
            sequence,
        });
        self
    }

    /// Set the payload data carried by the innermost layer
    pub fn payload(mut self, data: Vec<u8>) -> Self {
        self.payload = data;
        self
    }

    /// Build the packet chain
    ///
    /// # Errors
    ///
    /// Returns an error if the layer configuration is invalid (e.g. a
    /// transport layer without IPv4, or no Ethernet layer), or if a VLAN ID
    /// or UDP length is out of range.
    pub fn build(self) -> Result<Packet> {
        let payload = Bytes::from(self.payload);

        // Layer 4
        let mut inner: Option<Packet> = match self.layer4 {
            None => None,
            Some(layer4) => {
                if !matches!(self.layer3, Some(Layer3::Ipv4 { .. })) {
                    return Err(Error::invalid_parameter(
                        "layer4",
                        "ICMP, TCP and UDP require an IPv4 layer",
                    ));
                }
                Some(build_layer4(layer4, payload.clone())?)
            }
        };

        // Layer 3
        if let Some(layer3) = self.layer3 {
            let mut packet = match layer3 {
                Layer3::Ipv4 {
                    src,
                    dst,
                    ttl,
                    identification,
                    flags,
                } => {
                    let protocol = match inner.as_ref().map(Packet::kind) {
                        Some(PacketKind::Udp) => IpProtocol::UDP,
                        Some(PacketKind::Tcp) => IpProtocol::TCP,
                        Some(PacketKind::Icmp) => IpProtocol::ICMP,
                        _ => IpProtocol::Custom(0), // Raw IP
                    };
                    let mut ip = Ipv4::with_addresses(src, dst, protocol);
                    ip.set_ttl(ttl)
                        .set_identification(identification)
                        .set_flags(flags);
                    Packet::from(ip)
                }
                Layer3::Arp {
                    opcode,
                    sender_mac,
                    sender_ip,
                    target_mac,
                    target_ip,
                } => {
                    let mut arp = Arp::request(sender_mac, sender_ip, target_ip);
                    arp.set_opcode(opcode.to_u16()).set_target_hardware(target_mac);
                    Packet::from(arp)
                }
            };
            attach(&mut packet, inner.take(), &payload);
            inner = Some(packet);
        }

        // 802.1Q tags, innermost first
        for tag in self.vlans.iter().rev() {
            if !is_valid_vlan_id(tag.vlan_id) {
                return Err(Error::invalid_parameter(
                    "vlan_id",
                    format!(
                        "Invalid VLAN ID: {}. Must be between {} and {}",
                        tag.vlan_id, DOT1Q_MIN_VLAN, DOT1Q_MAX_VLAN
                    ),
                ));
            }
            if tag.priority > 7 {
                return Err(Error::invalid_parameter(
                    "priority",
                    format!("Invalid priority: {}. Must be between 0 and 7", tag.priority),
                ));
            }

            let mut dot1q = Dot1q::new();
            dot1q.set_vlan_id(tag.vlan_id).set_priority(tag.priority);
            if let Some(ether_type) = inner.as_ref().and_then(ether_type_of) {
                dot1q.set_ether_type(ether_type);
            }
            let mut packet = Packet::from(dot1q);
            attach(&mut packet, inner.take(), &payload);
            inner = Some(packet);
        }

        // Layer 2
        let Some(Layer2::Ethernet {
            src,
            dst,
            ether_type,
        }) = self.layer2
        else {
            return Err(Error::invalid_parameter("layer2", "an Ethernet layer is required"));
        };

        let ether_type = ether_type
            .or_else(|| inner.as_ref().and_then(ether_type_of))
            .ok_or_else(|| {
                Error::invalid_parameter(
                    "ether_type",
                    "no inner layer to derive the Ethernet type from",
                )
            })?;

        let mut frame = Ethernet::new();
        frame
            .set_source(src)
            .set_destination(dst)
            .set_ether_type(ether_type);
        let mut packet = Packet::from(frame);
        attach(&mut packet, inner, &payload);
        Ok(packet)
    }

    /// Build the packet chain and serialize it
    pub fn build_bytes(self) -> Result<Bytes> {
        self.build()?.serialize()
    }
}

fn build_layer4(layer4: Layer4, payload: Bytes) -> Result<Packet> {
    let mut packet = match layer4 {
        Layer4::Udp { src_port, dst_port } => {
            let length = u16::try_from(Udp::HEADER_LEN + payload.len()).map_err(|_| {
                Error::invalid_parameter(
                    "payload",
                    format!("{} bytes do not fit in a UDP datagram", payload.len()),
                )
            })?;
            let mut udp = Udp::with_ports(src_port, dst_port);
            udp.set_length(length);
            Packet::from(udp)
        }
        Layer4::Tcp {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            window,
        } => {
            let mut tcp = Tcp::with_ports(src_port, dst_port);
            tcp.set_sequence(seq)
                .set_acknowledgment(ack)
                .set_flags(flags)
                .set_window(window);
            Packet::from(tcp)
        }
        Layer4::Icmp {
            icmp_type,
            code,
            identifier,
            sequence,
        } => {
            let mut icmp = Icmp::new();
            icmp.set_icmp_type(icmp_type)
                .set_code(code)
                .set_identifier(identifier)
                .set_sequence(sequence);
            Packet::from(icmp)
        }
    };
    attach(&mut packet, None, &payload);
    Ok(packet)
}

/// Attach the next layer, or the user payload to the innermost layer
fn attach(packet: &mut Packet, inner: Option<Packet>, payload: &Bytes) {
    match inner {
        Some(inner) => {
            packet.set_payload(inner);
        }
        None if !payload.is_empty() => {
            packet.set_raw_payload(payload.clone());
        }
        None => {}
    }
}

/// Ether type announcing `packet`
fn ether_type_of(packet: &Packet) -> Option<u16> {
    let ether_type = match packet.kind() {
        PacketKind::Ipv4 => EtherType::IPv4,
        PacketKind::Arp => EtherType::ARP,
        PacketKind::Dot1q => EtherType::VLAN,
        _ => return None,
    };
    Some(ether_type.to_u16())
}
