// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The accept loop and the per-connection state machine.
//!
//! One connection carries exactly one exchange: receive a query, verify
//! its seal, dispatch it, write one response, close. Connections run on
//! their own thread and share nothing but the immutable configuration.

use log::*;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

use nrpe_protocol::packet::Packet;
use nrpe_protocol::transport::Listener;
use nrpe_protocol::{
    result_code_name, Error, EMPTY_COMMAND, HELLO_COMMAND, PROGRAM_VERSION, RESPONSE_PACKET,
    STATE_OK, STATE_UNKNOWN,
};

use crate::command::QueryCommand;
use crate::config::ServerConfig;

/// The banner returned for the `_NRPE_CHECK` probe command.
pub fn banner() -> String {
    format!("NRPED RS v{PROGRAM_VERSION}")
}

/// Binds the configured endpoint and serves until the process dies. Only
/// the bind itself can fail; everything after is logged and survived.
pub fn run(config: ServerConfig) -> Result<(), Error> {
    let address = config.listen_address();
    let listener = Listener::bind(&address, config.transport_mode)?;
    info!("nrped waiting for connections on {address}");

    serve(listener, Arc::new(config))
}

/// The accept loop, split from `run` so tests can bind an ephemeral port
/// themselves.
pub fn serve(listener: Listener, config: Arc<ServerConfig>) -> Result<(), Error> {
    let listener = Arc::new(listener);

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let config = Arc::clone(&config);
                let listener = Arc::clone(&listener);
                thread::spawn(move || serve_connection(&listener, stream, peer, &config));
            }
            Err(e) => warn!("Error accepting connection: {e}"),
        }
    }
}

/// Front half of a connection: source-address authorization and transport
/// setup. The peer address comes from the TCP layer, so a disallowed host
/// is dropped before any bytes (TLS handshake included) are exchanged.
fn serve_connection(
    listener: &Listener,
    stream: TcpStream,
    peer: SocketAddr,
    config: &ServerConfig,
) {
    debug!("new connection from {peer}");

    if !config.is_host_allowed(peer.ip()) {
        warn!("rejecting connection from {}: not in allowed_hosts", peer.ip());
        return;
    }

    if let Err(e) = stream
        .set_read_timeout(Some(config.connection_timeout))
        .and_then(|()| stream.set_write_timeout(Some(config.connection_timeout)))
    {
        warn!("cannot set socket deadlines for {peer}: {e}");
        return;
    }

    let mut stream = match listener.wrap(stream) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("transport setup with {peer} failed: {e}");
            return;
        }
    };

    handle_client(&mut stream, config);
}

/// Back half of a connection: one query in, one response out. Generic over
/// the stream so tests can drive it over an in-process pipe.
///
/// A packet that fails CRC verification gets no response at all; the peer
/// sees the close. That silent drop is what deployed NRPE clients expect.
pub fn handle_client<S: Read + Write>(stream: &mut S, config: &ServerConfig) {
    let query = match Packet::decode(stream) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("error receiving query: {e}");
            return;
        }
    };

    if let Err(e) = query.verify_crc() {
        warn!("dropping query: {e}");
        return;
    }

    let query_command = QueryCommand::parse(&query.command());
    debug!("query: {query_command}");

    let (result_code, output) = dispatch(&query_command, config);
    debug!(
        "responding {} with {} byte(s) of output",
        result_code_name(result_code),
        output.len()
    );

    let mut response = Packet::build(query.version(), RESPONSE_PACKET, result_code, &output);
    if let Err(e) = response.send(stream) {
        warn!("error sending response: {e}");
    }
}

/// Resolves a parsed query to the response's result code and output
/// buffer.
fn dispatch(query: &QueryCommand, config: &ServerConfig) -> (i16, Vec<u8>) {
    if !query.args.is_empty() && !config.allow_args {
        warn!("query for {:?} carries arguments but dont_blame_nrpe is off", query.name);
        return (STATE_UNKNOWN, Vec::new());
    }

    if query.name == HELLO_COMMAND {
        return (STATE_OK, PROGRAM_VERSION.as_bytes().to_vec());
    }

    if query.name == EMPTY_COMMAND {
        return (STATE_OK, banner().into_bytes());
    }

    let Some(template) = config.command(&query.name) else {
        info!("command {:?} is not configured", query.name);
        return (STATE_UNKNOWN, Vec::new());
    };

    template.execute(query, &config.nasty_metachars, config.command_timeout)
}
