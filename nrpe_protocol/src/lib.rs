// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

pub mod client;
pub mod packet;
pub mod pipe;
pub mod transport;

use std::fmt;

/// Version string reported by the `version` command and embedded in the
/// `_NRPE_CHECK` banner. Kept at the historical value so existing monitoring
/// setups keep matching on it.
pub const PROGRAM_VERSION: &str = "0.02";

/// TCP port an NRPE daemon conventionally listens on.
pub const DEFAULT_PORT: u16 = 5666;

/// Packet type field of a query packet.
pub const QUERY_PACKET: i16 = 1;
/// Packet type field of a response packet.
pub const RESPONSE_PACKET: i16 = 2;

/// Nagios plugin result codes.
pub const STATE_OK: i16 = 0;
pub const STATE_WARNING: i16 = 1;
pub const STATE_CRITICAL: i16 = 2;
pub const STATE_UNKNOWN: i16 = 3;

/// Command name a client sends to ask for the daemon's version string.
pub const HELLO_COMMAND: &str = "version";
/// Command name a client sends to probe that the daemon is alive.
pub const EMPTY_COMMAND: &str = "_NRPE_CHECK";

/// Human readable name for a result code, for logging. Codes outside the
/// defined range read as UNKNOWN.
pub fn result_code_name(code: i16) -> &'static str {
    match code {
        STATE_OK => "STATE_OK",
        STATE_WARNING => "STATE_WARNING",
        STATE_CRITICAL => "STATE_CRITICAL",
        _ => "STATE_UNKNOWN",
    }
}

/// The possible errors that can arise from trying to exchange an NRPE query
/// and response.
#[derive(Debug)]
pub enum Error {
    /// Protocol errors are detected while decoding or checking a packet,
    /// before any of its content is acted on.
    Protocol(ProtocolError),

    /// Errors from the TLS layer (context setup or handshake).
    Tls(String),

    /// Errors returned by I/O failures.
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "Protocol error: {e}"),
            Self::Tls(e) => write!(f, "TLS error: {e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::Tls(e.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The version field named a packet layout this library does not know.
    UnsupportedVersion(i16),

    /// The packet could not be decoded (impossible buffer length).
    MalformedPacket(String),

    /// The CRC-32 seal did not match the packet contents.
    CrcMismatch { received: u32, computed: u32 },

    /// The peer sent a packet of the wrong type (e.g. a query where a
    /// response was expected).
    UnexpectedKind(i16),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(v) => write!(f, "unsupported nrpe packet version {v}"),
            Self::MalformedPacket(what) => write!(f, "malformed packet: {what}"),
            Self::CrcMismatch { received, computed } => write!(
                f,
                "CRC mismatch: received {received:#010x}, computed {computed:#010x}"
            ),
            Self::UnexpectedKind(kind) => write!(f, "unexpected packet type {kind}"),
        }
    }
}
