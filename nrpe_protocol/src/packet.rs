// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The NRPE on-wire packet in its three versions.
//!
//! All integers are big-endian. Version 2 is a fixed 1036-byte layout with a
//! 1024-byte NUL-padded command buffer; versions 3 and 4 share a
//! length-prefixed layout. The whole packet is sealed with CRC-32/IEEE
//! computed over the serialized bytes with the CRC field zeroed.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::{Error, ProtocolError, QUERY_PACKET, STATE_OK};

/// CRC-32/IEEE, the same parameterization as POSIX cksum's historical
/// "crc32" and zlib.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Fixed command buffer size of a v2 packet.
pub const V2_BUFFER_LENGTH: usize = 1024;

/// A v3/v4 command buffer is at least this long; shorter commands are
/// NUL-padded up to it.
pub const V3_MIN_BUFFER_LENGTH: usize = 1024;

/// Largest command buffer a v3/v4 packet may carry.
pub const V3_MAX_BUFFER_LENGTH: usize = 64 * 1024 - 1;

/// Byte offset of the CRC field within an encoded packet.
const CRC_OFFSET: usize = 4;

/// The packet layouts this library understands. Versions 3 and 4 share a
/// layout but are distinct values on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V2,
    V3,
    V4,
}

impl Version {
    /// The value of the version field on the wire.
    pub fn wire(self) -> i16 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }

    fn from_wire(raw: i16) -> Option<Self> {
        match raw {
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            _ => None,
        }
    }

    /// Maps a user-requested version number to a packet layout. Versions 1
    /// and 2 both select the v2 layout; anything outside 1..=4 falls back
    /// to 4.
    pub fn from_requested(requested: i32) -> Self {
        match requested {
            1 | 2 => Self::V2,
            3 => Self::V3,
            _ => Self::V4,
        }
    }
}

/// The fields shared by every packet version. On the wire these are the
/// first 10 bytes; what follows them depends on the version.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PacketHeader {
    version: Version,
    kind: i16,
    crc: u32,
    result_code: i16,
}

/// The version-specific remainder of a packet.
///
/// The reserved trailer (v2) and alignment padding (v3/v4) carry no meaning,
/// but they are inside the sealed bytes: a received value is retained so
/// that CRC verification re-serializes exactly what came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PacketBody {
    /// Fixed 1024-byte command buffer followed by a reserved 16-bit trailer.
    V2 { buffer: Vec<u8>, trailer: i16 },

    /// 16-bit alignment padding, 32-bit buffer length, then that many bytes
    /// of command buffer. Shared by wire versions 3 and 4.
    V3 { alignment: i16, buffer: Vec<u8> },
}

/// One NRPE packet, query or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    body: PacketBody,
}

impl Packet {
    /// Builds an outbound packet. For v3/v4 the command buffer is sized to
    /// exactly 1024 bytes when the command is shorter than that, and to the
    /// command length (capped at 65535) otherwise. A v2 command is truncated
    /// to 1023 bytes so the buffer always ends in a NUL.
    pub fn build(version: Version, kind: i16, result_code: i16, command: &[u8]) -> Packet {
        let body = match version {
            Version::V2 => PacketBody::V2 {
                buffer: vec![0; V2_BUFFER_LENGTH],
                trailer: 0,
            },
            Version::V3 | Version::V4 => {
                let capacity = if command.len() < V3_MIN_BUFFER_LENGTH {
                    V3_MIN_BUFFER_LENGTH
                } else {
                    command.len().min(V3_MAX_BUFFER_LENGTH)
                };
                PacketBody::V3 {
                    alignment: 0,
                    buffer: vec![0; capacity],
                }
            }
        };

        let mut packet = Packet {
            header: PacketHeader {
                version,
                kind,
                crc: 0,
                result_code,
            },
            body,
        };
        packet.set_command(command);
        packet
    }

    /// Builds a query packet carrying the given command line, with the
    /// default result code.
    pub fn query(version: Version, command_line: &str) -> Packet {
        Packet::build(version, QUERY_PACKET, STATE_OK, command_line.as_bytes())
    }

    pub fn version(&self) -> Version {
        self.header.version
    }

    pub fn kind(&self) -> i16 {
        self.header.kind
    }

    pub fn crc32(&self) -> u32 {
        self.header.crc
    }

    pub fn result_code(&self) -> i16 {
        self.header.result_code
    }

    pub fn set_kind(&mut self, kind: i16) {
        self.header.kind = kind;
    }

    pub fn set_result_code(&mut self, result_code: i16) {
        self.header.result_code = result_code;
    }

    /// The command buffer with trailing NUL padding stripped.
    pub fn command_buffer(&self) -> &[u8] {
        let buffer = match &self.body {
            PacketBody::V2 { buffer, .. } => buffer,
            PacketBody::V3 { buffer, .. } => buffer,
        };
        let end = buffer
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        &buffer[..end]
    }

    /// The command buffer as text. NRPE payloads are plain ASCII in
    /// practice; anything else is replaced lossily.
    pub fn command(&self) -> String {
        String::from_utf8_lossy(self.command_buffer()).into_owned()
    }

    /// Number of bytes the command buffer holds, padding included.
    pub fn capacity(&self) -> usize {
        match &self.body {
            PacketBody::V2 { buffer, .. } => buffer.len(),
            PacketBody::V3 { buffer, .. } => buffer.len(),
        }
    }

    /// Overwrites the command buffer with `command`, NUL-padding the rest.
    /// A command longer than the buffer is truncated to capacity − 1 bytes
    /// so the terminator byte survives.
    pub fn set_command(&mut self, command: &[u8]) {
        let buffer = match &mut self.body {
            PacketBody::V2 { buffer, .. } => buffer,
            PacketBody::V3 { buffer, .. } => buffer,
        };
        let len = if command.len() > buffer.len() {
            buffer.len() - 1
        } else {
            command.len()
        };
        buffer.fill(0);
        buffer[..len].copy_from_slice(&command[..len]);
    }

    /// Serializes the packet. Encoding is deterministic: stable field order,
    /// big-endian integers, zero padding. The CRC field is written exactly
    /// as currently stored.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.capacity());
        out.extend_from_slice(&self.header.version.wire().to_be_bytes());
        out.extend_from_slice(&self.header.kind.to_be_bytes());
        out.extend_from_slice(&self.header.crc.to_be_bytes());
        out.extend_from_slice(&self.header.result_code.to_be_bytes());

        match &self.body {
            PacketBody::V2 { buffer, trailer } => {
                out.extend_from_slice(buffer);
                out.extend_from_slice(&trailer.to_be_bytes());
            }
            PacketBody::V3 { alignment, buffer } => {
                out.extend_from_slice(&alignment.to_be_bytes());
                out.extend_from_slice(&(buffer.len() as u32).to_be_bytes());
                out.extend_from_slice(buffer);
            }
        }

        out
    }

    /// Seals the packet: zeroes the CRC field, serializes, computes
    /// CRC-32/IEEE over the result, and patches the four CRC bytes in place.
    /// Returns the sealed bytes ready to be written.
    pub fn seal(&mut self) -> Vec<u8> {
        self.header.crc = 0;
        let mut bytes = self.encode();
        let crc = CRC32.checksum(&bytes);
        self.header.crc = crc;
        bytes[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());
        bytes
    }

    /// Seals the packet and writes it to the stream.
    pub fn send<S: Write>(&mut self, stream: &mut S) -> Result<(), Error> {
        let bytes = self.seal();
        stream.write_all(&bytes)?;
        Ok(())
    }

    /// Reads one packet from the stream. The header is read first; the
    /// meaning of the bytes after the result field depends on the version,
    /// so the body read dispatches on it.
    pub fn decode<S: Read>(stream: &mut S) -> Result<Packet, Error> {
        let raw_version = stream.read_i16::<BigEndian>()?;
        let kind = stream.read_i16::<BigEndian>()?;
        let crc = stream.read_u32::<BigEndian>()?;
        let result_code = stream.read_i16::<BigEndian>()?;

        let version = Version::from_wire(raw_version)
            .ok_or(ProtocolError::UnsupportedVersion(raw_version))?;

        let body = match version {
            Version::V2 => {
                let mut buffer = vec![0; V2_BUFFER_LENGTH];
                stream.read_exact(&mut buffer)?;
                let trailer = stream.read_i16::<BigEndian>()?;
                PacketBody::V2 { buffer, trailer }
            }
            Version::V3 | Version::V4 => {
                let alignment = stream.read_i16::<BigEndian>()?;
                let buffer_length = stream.read_u32::<BigEndian>()?;
                if buffer_length == 0 || buffer_length as usize > V3_MAX_BUFFER_LENGTH {
                    return Err(ProtocolError::MalformedPacket(format!(
                        "impossible buffer length {buffer_length}"
                    ))
                    .into());
                }
                let mut buffer = vec![0; buffer_length as usize];
                stream.read_exact(&mut buffer)?;
                PacketBody::V3 { alignment, buffer }
            }
        };

        Ok(Packet {
            header: PacketHeader {
                version,
                kind,
                crc,
                result_code,
            },
            body,
        })
    }

    /// Recomputes the CRC over this packet's serialization (with the CRC
    /// field zeroed) and compares it with the received value.
    pub fn verify_crc(&self) -> Result<(), Error> {
        let received = self.header.crc;
        let mut bytes = self.encode();
        bytes[CRC_OFFSET..CRC_OFFSET + 4].fill(0);
        let computed = CRC32.checksum(&bytes);
        if computed != received {
            return Err(ProtocolError::CrcMismatch { received, computed }.into());
        }
        Ok(())
    }
}
