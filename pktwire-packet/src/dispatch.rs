//! Payload dispatch tables
//!
//! A discriminant field (Ethernet type, IP protocol number) selects which
//! protocol the bits following a header are decoded as. The mapping is plain
//! data: a table from discriminant value to [`PacketKind`], built once and
//! consulted by the protocols' `payload_kind` hooks. Values without an entry
//! leave the payload raw.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::ethernet::EtherType;
use crate::ip::IpProtocol;
use crate::packet::PacketKind;

/// Mapping from a discriminant value to the protocol of the payload
#[derive(Debug, Clone)]
pub struct DispatchTable<K> {
    name: &'static str,
    entries: BTreeMap<K, PacketKind>,
}

impl<K: Ord + Copy + fmt::Debug> DispatchTable<K> {
    /// Create an empty table
    pub fn new(name: &'static str) -> Self {
        DispatchTable {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// Register `kind` for `key`
    pub fn with(mut self, key: K, kind: PacketKind) -> Self {
        self.entries.insert(key, kind);
        self
    }

    /// Protocol registered for `key`
    pub fn lookup(&self, key: K) -> Option<PacketKind> {
        self.entries.get(&key).copied()
    }

    /// Table name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (K, PacketKind)> + '_ {
        self.entries.iter().map(|(key, kind)| (*key, *kind))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ethernet type values shared by Ethernet and 802.1Q
pub fn ether_types() -> &'static DispatchTable<u16> {
    static TABLE: OnceLock<DispatchTable<u16>> = OnceLock::new();
    TABLE.get_or_init(|| {
        DispatchTable::new("ether-type")
            .with(EtherType::IPv4.to_u16(), PacketKind::Ipv4)
            .with(EtherType::ARP.to_u16(), PacketKind::Arp)
            .with(EtherType::VLAN.to_u16(), PacketKind::Dot1q)
            .with(EtherType::QinQ.to_u16(), PacketKind::Dot1q)
    })
}

/// IP protocol numbers
pub fn ip_protocols() -> &'static DispatchTable<u8> {
    static TABLE: OnceLock<DispatchTable<u8>> = OnceLock::new();
    TABLE.get_or_init(|| {
        DispatchTable::new("ip-protocol")
            .with(IpProtocol::ICMP.to_u8(), PacketKind::Icmp)
            .with(IpProtocol::TCP.to_u8(), PacketKind::Tcp)
            .with(IpProtocol::UDP.to_u8(), PacketKind::Udp)
    })
}
