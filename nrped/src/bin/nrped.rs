// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use clap::{Parser, ValueEnum};
use log::*;

use std::path::PathBuf;

use nrped::config::ServerConfig;
use nrped::{privdrop, server};

#[derive(Parser)]
#[command(about = "NRPE-compatible check daemon.")]
struct Cli {
    /// Configuration file to use
    #[arg(short, long, default_value = "nrpe.cfg")]
    config: PathBuf,

    /// Operating mode
    #[arg(short, long, value_enum, default_value_t = RunMode::Foreground)]
    mode: RunMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    Foreground,
    Daemon,
    Systemd,
}

fn main() {
    let cli = Cli::parse();

    let config = match ServerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    init_logger(config.debug);

    if cli.mode != RunMode::Foreground {
        // daemonizing is left to the init system these days
        info!("run mode {:?} is not implemented, staying in the foreground", cli.mode);
    }

    info!("listening on {} (transport mode {:?})", config.listen_address(), config.transport_mode);
    info!(
        "arguments {}, nasty chars {:?}",
        if config.allow_args { "allowed" } else { "refused" },
        config.nasty_metachars
    );
    for (name, template) in &config.commands {
        debug!("command {name}: {} {}", template.name, template.args.join(" "));
    }
    for network in &config.allowed_hosts {
        debug!("allowing connections from {network}");
    }

    if let Some(path) = &config.pid_file {
        if let Err(e) = std::fs::write(path, format!("{}\n", std::process::id())) {
            warn!("cannot write pid file {}: {e}", path.display());
        }
    }

    if let Err(e) = privdrop::drop_privileges(&config.nrpe_user, &config.nrpe_group) {
        error!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = server::run(config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn init_logger(debug: bool) {
    // debug=1 in the config raises the default level; RUST_LOG still wins
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}
