//! Example: Building a TCP SYN packet
//!
//! This example demonstrates how to use the pktwire-packet crate to build
//! a TCP SYN frame and decode it back.

use std::net::Ipv4Addr;

use pktwire_packet::{MacAddress, Packet, PacketBuilder, TcpFlags, TcpHeader};

fn main() {
    tracing_subscriber::fmt::init();

    // Network addresses
    let src_mac = MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    let dst_mac = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    let src_ip = Ipv4Addr::new(192, 168, 1, 100);
    let dst_ip = Ipv4Addr::new(192, 168, 1, 1);

    let bytes = PacketBuilder::new()
        .ethernet(src_mac, dst_mac)
        .ipv4(src_ip, dst_ip)
        .ttl(64)
        .tcp(
            54321, // Source port
            80,    // Destination port (HTTP)
            1000,  // Initial sequence number
            0,     // Acknowledgment number (0 for SYN)
            TcpFlags::SYN,
        )
        .window(65535)
        .build_bytes()
        .expect("Failed to build TCP SYN packet");

    println!("TCP SYN packet built successfully!");
    println!("Total size: {} bytes", bytes.len());
    println!("Bytes: {}", hex_dump(&bytes));

    let packet = Packet::decode_frame(&bytes).expect("Failed to decode TCP SYN packet");
    let tcp = packet.layer::<TcpHeader>().expect("No TCP layer");
    println!("Decoded: {}", packet);
    println!("TCP flags: {}", tcp.flags());
    println!("IPv4 checksum valid: {}", !packet.any_corrupted());
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}
