// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;

use nrpe_protocol::packet::Version;
use nrpe_protocol::transport::{self, TransportMode};
use nrpe_protocol::{client, DEFAULT_PORT, EMPTY_COMMAND, STATE_UNKNOWN};

/// Sends a check query to a running NRPE daemon and reports its result.
#[derive(Parser)]
#[command(about = "Query a NRPE daemon for the result of a configured check.")]
struct Cli {
    /// The remote host running the NRPE server
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// The remote port on which the NRPE server listens
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Transport type: 0 - plain TCP, 1 - TLS
    #[arg(short, long, default_value_t = 0)]
    transport: u16,

    /// NRPE packet version: 2, 3 or 4; anything else falls back to 4
    #[arg(short, long, default_value_t = 4)]
    nrpe_version: i32,

    /// The check command defined in the daemon's configuration. The default
    /// asks for the daemon's banner.
    #[arg(short, long, default_value = EMPTY_COMMAND)]
    command: String,

    /// Positional arguments forwarded to the command
    args: Vec<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let mode = match TransportMode::from_flag(cli.transport) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{e}");
            return i32::from(STATE_UNKNOWN);
        }
    };

    let version = Version::from_requested(cli.nrpe_version);

    let mut stream = match transport::connect(&cli.host, cli.port, mode) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{e}");
            return i32::from(STATE_UNKNOWN);
        }
    };

    match client::run_check(&mut stream, version, &cli.command, &cli.args) {
        Ok((result_code, output)) => {
            println!("{output}");
            i32::from(result_code)
        }
        Err(e) => {
            eprintln!("{e}");
            i32::from(STATE_UNKNOWN)
        }
    }
}
