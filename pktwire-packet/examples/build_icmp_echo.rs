//! Example: Building an ICMP echo request inside a VLAN
//!
//! Builds Ethernet / 802.1Q / IPv4 / ICMP with the fluent builder, then edits
//! the decoded packet and re-serializes it. Checksums are recomputed on every
//! serialize.

use std::net::Ipv4Addr;

use pktwire_packet::{Dot1qHeader, IcmpHeader, MacAddress, Packet, PacketBuilder};

fn main() {
    tracing_subscriber::fmt::init();

    let bytes = PacketBuilder::new()
        .ethernet(
            MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            MacAddress::BROADCAST,
        )
        .vlan(100, 3)
        .ipv4(Ipv4Addr::new(10, 0, 100, 1), Ipv4Addr::new(10, 0, 100, 254))
        .icmp_echo_request(0x1234, 1)
        .payload(b"abcdefghijklmnop".to_vec())
        .build_bytes()
        .expect("Failed to build ICMP echo request");

    let mut packet = Packet::decode_frame(&bytes).expect("Failed to decode echo request");
    println!("{}", packet);

    let vlan = packet.layer::<Dot1qHeader>().expect("No 802.1Q tag");
    println!("VLAN {} priority {}", vlan.vlan_id(), vlan.priority());

    let icmp = packet.layer_mut::<IcmpHeader>().expect("No ICMP layer");
    println!("checksum before edit: 0x{:04x}", icmp.checksum());
    icmp.set_sequence(2);

    packet.serialize().expect("Failed to serialize");
    let icmp = packet.layer::<IcmpHeader>().expect("No ICMP layer");
    println!("checksum after edit:  0x{:04x}", icmp.checksum());
}
