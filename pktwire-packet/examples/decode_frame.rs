//! Example: Decoding an Ethernet frame
//!
//! Decodes an ICMP echo request and walks the layer chain. Run with
//! `RUST_LOG=trace` to see every field the codec reads.

use pktwire_packet::{IcmpHeader, Ipv4Header, Packet};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let frame = [
        // Ethernet: destination, source, IPv4
        0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
        // IPv4: 10.0.0.1 -> 10.0.0.2, ICMP
        0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x00, 0x40, 0x01, 0x66, 0xdf, 0x0a, 0x00,
        0x00, 0x01, 0x0a, 0x00, 0x00, 0x02,
        // ICMP echo request, id 1, seq 1
        0x08, 0x00, 0xf7, 0xfd, 0x00, 0x01, 0x00, 0x01,
    ];

    let packet = Packet::decode_frame(&frame).expect("Failed to decode frame");

    println!("{}", packet);
    for layer in packet.layers() {
        println!(
            "  {:<8} {:>3} header bits, corrupted: {}",
            layer.name(),
            layer.header_bits(),
            layer.is_corrupted()
        );
    }

    if let Some(ip) = packet.layer::<Ipv4Header>() {
        println!("IPv4 {} -> {} ttl {}", ip.source(), ip.destination(), ip.ttl());
    }
    if let Some(icmp) = packet.layer::<IcmpHeader>() {
        println!(
            "ICMP type {} id {} seq {}",
            icmp.icmp_type(),
            icmp.identifier(),
            icmp.sequence()
        );
    }
}
