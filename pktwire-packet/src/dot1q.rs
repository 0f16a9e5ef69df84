//! IEEE 802.1Q VLAN tag
//!
//! The tag follows an Ethernet (or outer 802.1Q) type of 0x8100/0x88A8:
//!
//! ```text
//! | PCP (3 bits) | CFI (1 bit) | VID (12 bits) | inner type (16 bits) |
//! ```
//!
//! The inner type is dispatched exactly like the Ethernet type, so stacked
//! tags (Q-in-Q) decode as nested 802.1Q layers.

use std::sync::OnceLock;

use crate::dispatch::ether_types;
use crate::layer::{Layer, Protocol};
use crate::packet::PacketKind;
use crate::schema::{header_fields, HeaderSchema, SchemaBuilder};

/// Minimum valid VLAN ID
pub const DOT1Q_MIN_VLAN: u16 = 1;

/// Maximum valid VLAN ID
pub const DOT1Q_MAX_VLAN: u16 = 4094;

/// Check whether `vlan_id` is usable on the wire (0 and 4095 are reserved)
pub fn is_valid_vlan_id(vlan_id: u16) -> bool {
    (DOT1Q_MIN_VLAN..=DOT1Q_MAX_VLAN).contains(&vlan_id)
}

header_fields! {
    /// 802.1Q tag fields
    pub enum Dot1qField {
        Priority => "priority",
        Cfi => "cfi",
        VlanId => "vlan_id",
        EtherType => "ether_type",
    }
}

/// IEEE 802.1Q protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dot1qHeader;

/// 802.1Q VLAN tag
pub type Dot1q = Layer<Dot1qHeader>;

impl Protocol for Dot1qHeader {
    type Field = Dot1qField;

    const NAME: &'static str = "802.1Q";

    fn schema() -> &'static HeaderSchema<Dot1qField> {
        static SCHEMA: OnceLock<HeaderSchema<Dot1qField>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new(Self::NAME)
                .number(Dot1qField::Priority, 3)
                .number(Dot1qField::Cfi, 1)
                .number(Dot1qField::VlanId, 12)
                .number(Dot1qField::EtherType, 16)
                .build()
        })
    }

    fn payload_kind(layer: &Dot1q, field: Dot1qField) -> Option<PacketKind> {
        match field {
            Dot1qField::EtherType => ether_types().lookup(layer.ether_type()),
            _ => None,
        }
    }
}

impl Layer<Dot1qHeader> {
    /// Priority code point (0-7)
    pub fn priority(&self) -> u8 {
        self.uint(Dot1qField::Priority) as u8
    }

    pub fn set_priority(&mut self, priority: u8) -> &mut Self {
        self.set_uint(Dot1qField::Priority, u64::from(priority))
    }

    /// Canonical format indicator (drop eligible in 802.1Q-2011)
    pub fn cfi(&self) -> bool {
        self.uint(Dot1qField::Cfi) != 0
    }

    pub fn set_cfi(&mut self, cfi: bool) -> &mut Self {
        self.set_uint(Dot1qField::Cfi, u64::from(cfi))
    }

    pub fn vlan_id(&self) -> u16 {
        self.uint(Dot1qField::VlanId) as u16
    }

    pub fn set_vlan_id(&mut self, vlan_id: u16) -> &mut Self {
        self.set_uint(Dot1qField::VlanId, u64::from(vlan_id))
    }

    /// Type of the encapsulated payload
    pub fn ether_type(&self) -> u16 {
        self.uint(Dot1qField::EtherType) as u16
    }

    pub fn set_ether_type(&mut self, ether_type: u16) -> &mut Self {
        self.set_uint(Dot1qField::EtherType, u64::from(ether_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tci_bit_packing() {
        let mut tag = Dot1q::new();
        tag.set_priority(5).set_cfi(true).set_vlan_id(100).set_ether_type(0x0800);

        let bytes = tag.serialize().unwrap();
        // 101 1 000001100100
        assert_eq!(&bytes[..], &[0xB0, 0x64, 0x08, 0x00]);
    }

    #[test]
    fn test_decode_tci() {
        let mut tag = Dot1q::empty();
        tag.decode(&[0xE0, 0x0A, 0x86, 0xDD], 0, 32).unwrap();

        assert_eq!(tag.priority(), 7);
        assert!(!tag.cfi());
        assert_eq!(tag.vlan_id(), 10);
        assert_eq!(tag.ether_type(), 0x86DD);
        assert!(tag.payload().is_none());
        assert!(tag.raw_payload().is_none());
    }

    #[test]
    fn test_setters_mask_to_width() {
        let mut tag = Dot1q::new();
        tag.set_priority(0xFF).set_vlan_id(0xFFFF);
        assert_eq!(tag.priority(), 7);
        assert_eq!(tag.vlan_id(), 0x0FFF);
    }

    #[test]
    fn test_vlan_id_validation() {
        assert!(!is_valid_vlan_id(0));
        assert!(is_valid_vlan_id(1));
        assert!(is_valid_vlan_id(4094));
        assert!(!is_valid_vlan_id(4095));
    }
}
