// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::io::{Read, Write};

use log::*;

use crate::packet::{Packet, Version};
use crate::{Error, ProtocolError, RESPONSE_PACKET};

/// Joins a command name and its arguments into the `!`-delimited command
/// line that goes into a query packet's command buffer. A command with no
/// arguments is sent bare.
pub fn build_command_line(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{}!{}", command, args.join("!"))
    }
}

/// Performs one NRPE exchange on the given stream: builds and seals a query
/// for `command` with `args`, writes it, reads back the response, and checks
/// its integrity.
///
/// This blocks the calling thread until the daemon responds. On success it
/// returns the result code and the response's command buffer (the first
/// stdout line of the remote check, or the daemon's version/banner text).
pub fn run_check<S: Read + Write>(
    stream: &mut S,
    version: Version,
    command: &str,
    args: &[String],
) -> Result<(i16, String), Error> {
    let command_line = build_command_line(command, args);
    let mut query = Packet::query(version, &command_line);
    query.send(stream)?;

    let response = Packet::decode(stream)?;
    response.verify_crc()?;

    if response.kind() != RESPONSE_PACKET {
        return Err(ProtocolError::UnexpectedKind(response.kind()).into());
    }

    debug!(
        "got v{} response, result {}",
        response.version().wire(),
        crate::result_code_name(response.result_code())
    );

    Ok((response.result_code(), response.command()))
}
