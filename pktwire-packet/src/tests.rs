//! Cross-protocol decode/encode scenarios

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;

use pktwire_core::{write_bits, Error, MacAddress};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arp::ArpHeader;
use crate::builder::PacketBuilder;
use crate::ethernet::{EtherType, Ethernet};
use crate::icmp::{Icmp, IcmpHeader};
use crate::ip::{IpFlags, IpProtocol, Ipv4, Ipv4Field, Ipv4Header};
use crate::packet::{DecodeOptions, Packet, PacketKind};
use crate::tcp::{Tcp, TcpFlags, TcpHeader};
use crate::udp::{Udp, UdpHeader};

/// Ethernet + IPv4 + ICMP echo request, 42 bytes
const PING_FRAME: [u8; 42] = [
    // Ethernet
    0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
    // IPv4
    0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x00, 0x40, 0x01, 0x66, 0xdf, 0x0a, 0x00, 0x00,
    0x01, 0x0a, 0x00, 0x00, 0x02,
    // ICMP
    0x08, 0x00, 0xf7, 0xfd, 0x00, 0x01, 0x00, 0x01,
];

/// IPv4 (id 0x1234, DF) carrying UDP 1000 -> 53 with "ping"
const UDP_DATAGRAM: [u8; 32] = [
    0x45, 0x00, 0x00, 0x20, 0x12, 0x34, 0x40, 0x00, 0x40, 0x11, 0x14, 0x97, 0x0a, 0x00, 0x00,
    0x01, 0x0a, 0x00, 0x00, 0x02, 0x03, 0xe8, 0x00, 0x35, 0x00, 0x0c, 0x00, 0x00, b'p', b'i',
    b'n', b'g',
];

fn mac(last: u8) -> MacAddress {
    MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, last])
}

fn hash_of(packet: &Packet) -> u64 {
    let mut hasher = DefaultHasher::new();
    packet.hash(&mut hasher);
    hasher.finish()
}

/// Decode `bytes`, compare every layer with `original` and re-serialize
fn assert_round_trip(kind: PacketKind, original: &Packet, bytes: &[u8]) {
    let mut decoded = Packet::decode(kind, bytes).unwrap();

    let expected: Vec<&Packet> = original.layers().collect();
    let actual: Vec<&Packet> = decoded.layers().collect();
    assert_eq!(expected.len(), actual.len(), "layer count of {}", decoded);
    for (expected, actual) in expected.iter().zip(actual.iter()) {
        assert_eq!(expected, actual);
        assert!(!actual.is_corrupted(), "{} is corrupted", actual.name());
    }

    assert_eq!(&decoded.serialize().unwrap()[..], bytes);
}

#[test]
fn test_ping_frame_scenario() {
    let mut packet = Packet::decode(PacketKind::Ethernet, &PING_FRAME).unwrap();

    let kinds: Vec<PacketKind> = packet.layers().map(Packet::kind).collect();
    assert_eq!(kinds, vec![PacketKind::Ethernet, PacketKind::Ipv4, PacketKind::Icmp]);
    assert!(!packet.any_corrupted());

    let frame = packet.as_ethernet().unwrap();
    assert_eq!(frame.destination().to_string(), "aa:bb:cc:dd:ee:ff");
    assert_eq!(frame.source().to_string(), "11:22:33:44:55:66");

    let ip = packet.layer::<Ipv4Header>().unwrap();
    assert_eq!(ip.ttl(), 64);
    assert_eq!(ip.protocol_kind(), IpProtocol::ICMP);
    assert_eq!(ip.source(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(ip.destination(), Ipv4Addr::new(10, 0, 0, 2));

    let icmp = packet.layer::<IcmpHeader>().unwrap();
    assert_eq!(icmp.icmp_type(), 8);
    assert_eq!(icmp.code(), 0);
    assert!(icmp.payload().is_none());
    assert!(icmp.raw_payload().is_none());

    assert_eq!(&packet.serialize().unwrap()[..], &PING_FRAME[..]);
}

#[test]
fn test_round_trip_vlan_ipv4_tcp() {
    let mut packet = PacketBuilder::new()
        .ethernet(mac(1), mac(2))
        .vlan(42, 5)
        .ipv4(Ipv4Addr::new(192, 168, 0, 1), Ipv4Addr::new(192, 168, 0, 99))
        .identification(0xbeef)
        .ip_flags(IpFlags::DONT_FRAGMENT)
        .tcp(40000, 443, 0xdeadbeef, 0x01020304, TcpFlags::PSH_ACK)
        .window(512)
        .payload(b"GET / HTTP/1.1\r\n\r\n".to_vec())
        .build()
        .unwrap();
    let bytes = packet.serialize().unwrap();

    assert_round_trip(PacketKind::Ethernet, &packet, &bytes);

    let decoded = Packet::decode(PacketKind::Ethernet, &bytes).unwrap();
    let tcp = decoded.layer::<TcpHeader>().unwrap();
    assert_eq!(tcp.sequence(), 0xdeadbeef);
    assert_eq!(tcp.flags(), TcpFlags::PSH_ACK);
    assert_eq!(&tcp.raw_payload().unwrap()[..], b"GET / HTTP/1.1\r\n\r\n");
}

#[test]
fn test_round_trip_arp() {
    let mut packet = PacketBuilder::new()
        .ethernet(mac(1), MacAddress::BROADCAST)
        .arp_reply(mac(1), Ipv4Addr::new(10, 1, 1, 1), mac(7), Ipv4Addr::new(10, 1, 1, 7))
        .build()
        .unwrap();
    let bytes = packet.serialize().unwrap();
    assert_eq!(bytes.len(), 42);

    assert_round_trip(PacketKind::Ethernet, &packet, &bytes);
    let decoded = Packet::decode(PacketKind::Ethernet, &bytes).unwrap();
    assert!(decoded.layer::<ArpHeader>().unwrap().is_reply());
}

#[test]
fn test_round_trip_ipv4_icmp() {
    let mut ip = Ipv4::with_addresses(
        Ipv4Addr::new(172, 16, 0, 1),
        Ipv4Addr::new(172, 16, 0, 2),
        IpProtocol::ICMP,
    );
    ip.set_payload(Icmp::echo_request(9, 1, vec![0xABu8; 32]));
    let mut packet = Packet::from(ip);
    let bytes = packet.serialize().unwrap();

    assert_round_trip(PacketKind::Ipv4, &packet, &bytes);
}

#[test]
fn test_round_trip_stacked_vlans_udp() {
    let mut packet = PacketBuilder::new()
        .ethernet(mac(1), mac(2))
        .vlan(100, 0)
        .vlan(200, 7)
        .ipv4(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
        .udp(5000, 6000)
        .payload(vec![1, 2, 3, 4, 5])
        .build()
        .unwrap();
    let bytes = packet.serialize().unwrap();

    assert_round_trip(PacketKind::Ethernet, &packet, &bytes);
    assert_eq!(packet.layers().count(), 5);
}

#[test]
fn test_known_ipv4_checksum() {
    let mut packet = Packet::from(Ipv4::with_addresses(
        Ipv4Addr::new(192, 0, 2, 1),
        Ipv4Addr::new(198, 51, 100, 7),
        IpProtocol::TCP,
    ));
    let bytes = packet.serialize().unwrap();
    assert_eq!(&bytes[10..12], &[0x8e, 0xa8]);
    assert_eq!(packet.as_ipv4().unwrap().checksum(), 0x8ea8);
}

#[test]
fn test_single_bit_flip_marks_ipv4_corrupted() {
    for bit in 0..160 {
        let mut data = UDP_DATAGRAM;
        data[bit / 8] ^= 0x80 >> (bit % 8);

        let result = Packet::decode(PacketKind::Ipv4, &data);
        match bit {
            // IHL 13: the options run past the end of the datagram
            4 => assert!(
                matches!(result, Err(Error::Decode { protocol: "IPv4", field: "options", .. })),
                "bit 4: {:?}",
                result
            ),
            // IHL 7: the header decodes, leaving 4 bytes for an 8-byte UDP header
            6 => assert!(
                matches!(result, Err(Error::Decode { protocol: "UDP", .. })),
                "bit 6: {:?}",
                result
            ),
            _ => {
                let packet = result.unwrap();
                assert!(packet.is_corrupted(), "bit {} not detected", bit);
            }
        }
    }

    let clean = Packet::decode(PacketKind::Ipv4, &UDP_DATAGRAM).unwrap();
    assert!(!clean.any_corrupted());
    assert_eq!(clean.layer::<UdpHeader>().unwrap().destination_port(), 53);
}

/// `PING_FRAME` padded to the 60-byte Ethernet minimum with `fill`
fn padded_ping(fill: u8) -> Vec<u8> {
    let mut frame = PING_FRAME.to_vec();
    frame.resize(60, fill);
    frame
}

#[test]
fn test_padded_ping_frame_keeps_trailer() {
    let frame = padded_ping(0);
    let mut packet = Packet::decode(PacketKind::Ethernet, &frame).unwrap();
    assert_eq!(packet.layers().count(), 3);
    assert!(!packet.any_corrupted());

    let ip = packet.layer::<Ipv4Header>().unwrap();
    assert_eq!(ip.total_length(), 28);
    assert_eq!(ip.trailer().map(|trailer| trailer.len()), Some(18));
    let icmp = packet.layer::<IcmpHeader>().unwrap();
    assert!(icmp.raw_payload().is_none());
    assert!(icmp.trailer().is_none());
    assert!(packet.trailer().is_none());

    let bytes = packet.serialize().unwrap();
    assert_eq!(&bytes[..], &frame[..]);
    assert_eq!(&bytes[16..18], &[0x00, 0x1c]);
}

#[test]
fn test_nonzero_padding_is_not_checksummed() {
    let frame = padded_ping(0xAB);
    let mut packet = Packet::decode(PacketKind::Ethernet, &frame).unwrap();
    assert!(!packet.any_corrupted());
    assert_eq!(&packet.serialize().unwrap()[..], &frame[..]);

    // editing the datagram keeps its length and the padding behind it
    packet.layer_mut::<IcmpHeader>().unwrap().set_sequence(2);
    let bytes = packet.serialize().unwrap();
    assert_eq!(bytes.len(), 60);
    assert_eq!(&bytes[16..18], &[0x00, 0x1c]);
    assert_eq!(&bytes[42..], &[0xABu8; 18][..]);

    let reparsed = Packet::decode(PacketKind::Ethernet, &bytes).unwrap();
    assert!(!reparsed.any_corrupted());
    assert_eq!(reparsed.layer::<IcmpHeader>().unwrap().sequence(), 2);
}

#[test]
fn test_fragment_payload_not_dispatched() {
    let mut ip = Packet::decode(PacketKind::Ipv4, &UDP_DATAGRAM).unwrap();
    ip.as_ipv4_mut().unwrap().set_fragment_offset(1);
    let bytes = ip.serialize().unwrap();

    let packet = Packet::decode(PacketKind::Ipv4, &bytes).unwrap();
    assert!(!packet.is_corrupted());
    assert!(packet.payload().is_none());
    assert_eq!(packet.raw_payload().unwrap().len(), 12);
}

#[test]
fn test_options_round_trip_in_frame() {
    let mut ip = Ipv4::with_addresses(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        IpProtocol::UDP,
    );
    ip.set_options(&[0x01, 0x02, 0x03]).unwrap();
    ip.set_payload(Udp::with_ports(7, 7));

    let mut frame = Ethernet::new();
    frame
        .set_source(mac(1))
        .set_destination(mac(2))
        .set_ether_type(EtherType::IPv4.to_u16())
        .set_payload(ip);
    let mut packet = Packet::from(frame);
    let bytes = packet.serialize().unwrap();
    assert_eq!(bytes[14], 0x46);
    assert_eq!(bytes.len(), 14 + 24 + 8);

    let decoded = Packet::decode(PacketKind::Ethernet, &bytes).unwrap();
    let ip = decoded.layer::<Ipv4Header>().unwrap();
    assert_eq!(ip.options(), &[0x01, 0x02, 0x03, 0x00]);
    assert_eq!(ip.header_length(), 6);
    assert_eq!(ip.total_length(), 32);
    assert!(!ip.is_corrupted());
    assert!(decoded.layer::<UdpHeader>().is_some());
}

#[test]
fn test_equality_ignores_payload() {
    let mut with_payload = Udp::with_ports(1, 2);
    with_payload.set_raw_payload(vec![1u8, 2, 3]);
    let mut other_payload = Udp::with_ports(1, 2);
    other_payload.set_raw_payload(vec![9u8]);
    let without_payload = Udp::with_ports(1, 2);

    assert_eq!(with_payload, other_payload);
    assert_eq!(with_payload, without_payload);
    assert_ne!(with_payload, Udp::with_ports(1, 3));
    assert_eq!(
        hash_of(&Packet::from(with_payload)),
        hash_of(&Packet::from(without_payload))
    );
}

#[test]
fn test_absent_field_equals_zero_only() {
    let zeroed = Ipv4::new();
    let mut absent = Ipv4::new();
    absent.clear_field(Ipv4Field::Dscp);
    assert_eq!(zeroed, absent);
    assert_eq!(
        hash_of(&Packet::from(zeroed.clone())),
        hash_of(&Packet::from(absent.clone()))
    );

    // TTL defaults to 64, so dropping it changes the packet
    let mut no_ttl = Ipv4::new();
    no_ttl.clear_field(Ipv4Field::Ttl);
    assert_ne!(zeroed, no_ttl);

    // different protocols never compare equal
    assert_ne!(Packet::from(Udp::new()), Packet::from(Tcp::empty()));
}

#[test]
fn test_truncated_frame_names_field() {
    let err = Packet::decode(PacketKind::Ethernet, &PING_FRAME[..10]).unwrap_err();
    assert!(err.is_decode());
    match err {
        Error::Decode {
            protocol,
            field,
            byte_offset,
            bit_width,
            ..
        } => {
            assert_eq!(protocol, "Ethernet");
            assert_eq!(field, "source");
            assert_eq!(byte_offset, 6);
            assert_eq!(bit_width, 48);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_truncated_payload_propagates() {
    // Ethernet says IPv4 but only 10 bytes follow
    let err = Packet::decode(PacketKind::Ethernet, &PING_FRAME[..24]).unwrap_err();
    assert!(matches!(err, Error::Decode { protocol: "IPv4", .. }));
}

#[test]
fn test_decode_beyond_buffer() {
    let err = Packet::decode_bits(PacketKind::Udp, &[0u8; 8], 8, 64).unwrap_err();
    assert!(matches!(err, Error::Truncated { .. }));
}

#[test]
fn test_decode_at_bit_offset() {
    let mut datagram = Udp::with_ports(0xABCD, 0x1234);
    datagram.set_length(8);
    let bytes = datagram.serialize().unwrap();

    let mut shifted = [0xF0u8; 9];
    write_bits(&mut shifted, &bytes, 4, 64).unwrap();

    let packet = Packet::decode_bits(PacketKind::Udp, &shifted, 4, 64).unwrap();
    let udp = packet.as_udp().unwrap();
    assert_eq!(udp.source_port(), 0xABCD);
    assert_eq!(udp.destination_port(), 0x1234);
    assert_eq!(udp.length(), 8);
    assert!(udp.raw_payload().is_none());
}

#[test]
fn test_checksums_verified_at_unaligned_offset() {
    let datagram = &PING_FRAME[14..];
    let mut shifted = [0x0Fu8; 29];
    write_bits(&mut shifted, datagram, 3, 224).unwrap();

    let packet = Packet::decode_bits(PacketKind::Ipv4, &shifted, 3, 224).unwrap();
    assert_eq!(packet.layers().count(), 2);
    assert!(!packet.any_corrupted());
    assert_eq!(packet.layer::<IcmpHeader>().unwrap().sequence(), 1);

    let mut damaged = datagram.to_vec();
    damaged[8] = 0x41; // TTL
    damaged[27] = 0x02; // ICMP sequence
    write_bits(&mut shifted, &damaged, 3, 224).unwrap();

    let packet = Packet::decode_bits(PacketKind::Ipv4, &shifted, 3, 224).unwrap();
    assert!(packet.is_corrupted());
    assert!(packet.layer::<IcmpHeader>().unwrap().is_corrupted());
}

#[test]
fn test_no_bits_after_discriminant() {
    let packet = Packet::decode(PacketKind::Ethernet, &PING_FRAME[..14]).unwrap();
    assert!(packet.payload().is_none());
    assert!(packet.raw_payload().is_none());
}

#[test]
fn test_max_depth_keeps_payload_raw() {
    let bytes = PacketBuilder::new()
        .ethernet(mac(1), mac(2))
        .vlan(1, 0)
        .vlan(2, 0)
        .vlan(3, 0)
        .ipv4(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
        .build_bytes()
        .unwrap();

    let options = DecodeOptions::new().with_max_depth(2);
    let packet = Packet::decode_with(PacketKind::Ethernet, &bytes, 0, bytes.len() * 8, &options)
        .unwrap();

    let layers: Vec<&Packet> = packet.layers().collect();
    assert_eq!(layers.len(), 2);
    // two remaining tags plus the IPv4 header
    assert_eq!(layers[1].raw_payload().unwrap().len(), 4 + 4 + 20);

    let full = Packet::decode(PacketKind::Ethernet, &bytes).unwrap();
    assert_eq!(full.layers().count(), 5);
}

#[test]
fn test_checksum_verification_can_be_disabled() {
    let mut data = PING_FRAME;
    data[22] = 1; // TTL

    let verified = Packet::decode(PacketKind::Ethernet, &data).unwrap();
    assert!(verified.layer::<Ipv4Header>().unwrap().is_corrupted());
    assert!(verified.any_corrupted());
    assert!(!verified.is_corrupted());

    let options = DecodeOptions::default().with_verify_checksums(false);
    let unverified =
        Packet::decode_with(PacketKind::Ethernet, &data, 0, data.len() * 8, &options).unwrap();
    assert!(!unverified.any_corrupted());
}

#[test]
fn test_clone_is_deep() {
    let original = Packet::decode(PacketKind::Ethernet, &PING_FRAME).unwrap();
    let mut copy = original.clone();

    copy.layer_mut::<Ipv4Header>().unwrap().set_ttl(1);
    copy.layer_mut::<IcmpHeader>().unwrap().set_sequence(99);

    assert_eq!(original.layer::<Ipv4Header>().unwrap().ttl(), 64);
    assert_eq!(original.layer::<IcmpHeader>().unwrap().sequence(), 1);
    // equality looks at the outermost header only
    assert_eq!(original, copy);
    assert_ne!(original.payload(), copy.payload());
}

#[test]
fn test_display_chain() {
    let packet = Packet::decode(PacketKind::Ipv4, &UDP_DATAGRAM).unwrap();
    let text = packet.to_string();

    assert!(text.starts_with("IPv4[version=4, header_length=5,"));
    assert!(text.contains("source=0a000001"));
    assert!(text.contains(" / UDP[source_port=1000, destination_port=53, length=12, checksum=0]"));
    assert!(text.ends_with(" / Raw[4 bytes]"));
}

#[test]
fn test_randomized_round_trips() {
    let mut rng = StdRng::seed_from_u64(0x9e3779b9);

    for _ in 0..200 {
        let mut ip = Ipv4::with_addresses(
            Ipv4Addr::from(rng.gen::<u32>()),
            Ipv4Addr::from(rng.gen::<u32>()),
            IpProtocol::UDP,
        );
        ip.set_dscp(rng.gen_range(0..64))
            .set_ecn(rng.gen_range(0..4))
            .set_identification(rng.gen())
            .set_flags(IpFlags::from_u8(rng.gen_range(0..8) & 0b110))
            .set_ttl(rng.gen());
        let options_len = rng.gen_range(0..=40);
        let options: Vec<u8> = (0..options_len).map(|_| rng.gen()).collect();
        ip.set_options(&options).unwrap();

        let mut udp = Udp::with_ports(rng.gen(), rng.gen());
        let data: Vec<u8> = (0..rng.gen_range(1..64)).map(|_| rng.gen()).collect();
        udp.set_length((Udp::HEADER_LEN + data.len()) as u16)
            .set_checksum(rng.gen())
            .set_raw_payload(data);
        ip.set_payload(udp);

        let mut packet = Packet::from(ip);
        let bytes = packet.serialize().unwrap();
        assert_round_trip(PacketKind::Ipv4, &packet, &bytes);
    }
}

#[test]
fn test_concurrent_decoding_shares_schemas() {
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let mut packet = Packet::decode(PacketKind::Ethernet, &PING_FRAME).unwrap();
                    assert_eq!(&packet.serialize().unwrap()[..], &PING_FRAME[..]);
                }
            });
        }
    });
}
