// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use nrpe_protocol::packet::{Packet, Version};
use nrpe_protocol::{Error, ProtocolError, QUERY_PACKET, RESPONSE_PACKET, STATE_OK, STATE_WARNING};

#[test]
fn round_trip_all_versions() {
    for version in [Version::V2, Version::V3, Version::V4] {
        let mut packet = Packet::build(version, QUERY_PACKET, STATE_OK, b"check_disk!/var!10");
        let bytes = packet.seal();

        let decoded = Packet::decode(&mut bytes.as_slice()).unwrap();
        decoded.verify_crc().unwrap();

        assert_eq!(packet, decoded);
        assert_eq!(decoded.version(), version);
        assert_eq!(decoded.command(), "check_disk!/var!10");
    }
}

#[test]
fn v2_encoding_is_fixed_length() {
    // 10-byte header + 1024-byte buffer + 2-byte trailer
    let mut short = Packet::build(Version::V2, QUERY_PACKET, STATE_OK, b"x");
    assert_eq!(short.seal().len(), 1036);

    // a v2 command never spills past the fixed buffer, whatever its length
    let long_command = vec![b'a'; 4000];
    let mut long = Packet::build(Version::V2, QUERY_PACKET, STATE_OK, &long_command);
    assert_eq!(long.seal().len(), 1036);
    assert_eq!(long.command_buffer().len(), 1023);
}

#[test]
fn v3_buffer_sizing() {
    // short commands are padded up to the 1024-byte floor; the header is
    // 16 bytes (10 common + alignment + buffer length)
    let short = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, b"version");
    assert_eq!(short.capacity(), 1024);
    let bytes = short.encode();
    assert_eq!(bytes.len(), 16 + 1024);

    // the length field matches the bytes that follow it
    let length = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
    assert_eq!(length as usize, bytes.len() - 16);

    // past the floor, the buffer tracks the command
    let long_command = vec![b'b'; 3000];
    let long = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, &long_command);
    assert_eq!(long.capacity(), 3000);
    assert_eq!(long.command_buffer(), long_command.as_slice());

    // and is capped below 64k
    let huge_command = vec![b'c'; 100_000];
    let huge = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, &huge_command);
    assert_eq!(huge.capacity(), 65535);
    assert_eq!(huge.command_buffer().len(), 65534);
}

#[test]
fn crc_law() {
    let mut packet = Packet::build(Version::V4, RESPONSE_PACKET, STATE_WARNING, b"DISK WARNING");
    let bytes = packet.seal();

    let stored = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(stored, packet.crc32());

    let mut zeroed = bytes.clone();
    zeroed[4..8].fill(0);
    let computed = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(&zeroed);
    assert_eq!(computed, stored);
}

#[test]
fn single_bit_tamper_is_detected() {
    let mut packet = Packet::build(Version::V2, QUERY_PACKET, STATE_OK, b"check_users");
    let sealed = packet.seal();

    for position in 0..sealed.len() {
        // flipping bits inside the CRC field itself is covered separately
        if (4..8).contains(&position) {
            continue;
        }
        let mut tampered = sealed.clone();
        tampered[position] ^= 0x01;

        match Packet::decode(&mut tampered.as_slice()) {
            Ok(decoded) => match decoded.verify_crc() {
                Err(Error::Protocol(ProtocolError::CrcMismatch { .. })) => {}
                other => panic!("tamper at byte {position} not caught: {other:?}"),
            },
            // a flipped version byte can make the packet undecodable
            // outright, which is also a rejection
            Err(_) => {}
        }
    }
}

#[test]
fn tampered_crc_field_is_detected() {
    let mut packet = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, b"check_load");
    let mut sealed = packet.seal();
    sealed[5] ^= 0x80;

    let decoded = Packet::decode(&mut sealed.as_slice()).unwrap();
    assert!(matches!(
        decoded.verify_crc(),
        Err(Error::Protocol(ProtocolError::CrcMismatch { .. }))
    ));
}

#[test]
fn unknown_version_is_rejected() {
    let mut packet = Packet::build(Version::V2, QUERY_PACKET, STATE_OK, b"check_users");
    let mut bytes = packet.seal();
    bytes[1] = 5;

    match Packet::decode(&mut bytes.as_slice()) {
        Err(Error::Protocol(ProtocolError::UnsupportedVersion(5))) => {}
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn impossible_v3_length_is_rejected() {
    let mut packet = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, b"check_users");
    let mut bytes = packet.seal();

    bytes[12..16].copy_from_slice(&0u32.to_be_bytes());
    assert!(matches!(
        Packet::decode(&mut bytes.as_slice()),
        Err(Error::Protocol(ProtocolError::MalformedPacket(_)))
    ));

    bytes[12..16].copy_from_slice(&70_000u32.to_be_bytes());
    assert!(matches!(
        Packet::decode(&mut bytes.as_slice()),
        Err(Error::Protocol(ProtocolError::MalformedPacket(_)))
    ));
}

#[test]
fn truncated_packet_is_an_io_error() {
    let mut packet = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, b"check_users");
    let bytes = packet.seal();

    assert!(matches!(
        Packet::decode(&mut &bytes[..bytes.len() / 2]),
        Err(Error::Io(_))
    ));
}

#[test]
fn requested_version_clamp() {
    assert_eq!(Version::from_requested(1), Version::V2);
    assert_eq!(Version::from_requested(2), Version::V2);
    assert_eq!(Version::from_requested(3), Version::V3);
    assert_eq!(Version::from_requested(4), Version::V4);
    assert_eq!(Version::from_requested(0), Version::V4);
    assert_eq!(Version::from_requested(5), Version::V4);
    assert_eq!(Version::from_requested(-1), Version::V4);
}

#[test]
fn trailing_nul_padding_is_stripped() {
    let packet = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, b"check_users");
    assert_eq!(packet.capacity(), 1024);
    assert_eq!(packet.command(), "check_users");

    // interior NULs survive, only the padding is trimmed
    let packet = Packet::build(Version::V4, QUERY_PACKET, STATE_OK, b"a\0b");
    assert_eq!(packet.command_buffer(), b"a\0b");
}
