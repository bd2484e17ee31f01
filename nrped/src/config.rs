// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The operator's policy: which commands exist, who may connect, and how
//! the daemon listens. Loaded once at startup and immutable afterwards.

use log::*;

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use cidr::{IpCidr, IpInet};

use nrpe_protocol::transport::TransportMode;

use crate::command::CommandTemplate;

/// Characters that invalidate a substituted argument unless the operator
/// overrides the set.
pub const DEFAULT_NASTY_METACHARS: &str = "|`&><'\\[]{};\r\n";

/// A failure to load or interpret the configuration file. Always fatal at
/// startup; never produced after.
#[derive(Debug)]
pub struct ConfigError(String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

/// Parses a `key=value` configuration file into a map. `#` starts a
/// comment; blank lines and lines without a `=` are skipped.
pub fn load_config_map(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("cannot read {}: {e}", path.display())))?;

    let mut map = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(
                "{}:{}: not a key=value line, skipping",
                path.display(),
                lineno + 1
            );
            continue;
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(map)
}

/// The daemon's effective configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host; `*` means all interfaces.
    pub server_address: String,
    pub server_port: u16,
    pub transport_mode: TransportMode,

    /// User and group to drop to when started as root.
    pub nrpe_user: String,
    pub nrpe_group: String,

    pub debug: bool,

    /// Whether queries may carry positional arguments (`dont_blame_nrpe`).
    pub allow_args: bool,
    pub nasty_metachars: String,

    /// Source networks that may connect; everyone else is dropped before
    /// the first read.
    pub allowed_hosts: Vec<IpCidr>,

    pub commands: HashMap<String, CommandTemplate>,

    /// Socket read/write deadline for one exchange.
    pub connection_timeout: Duration,
    /// How long a spawned check may run before it is killed.
    pub command_timeout: Duration,

    pub pid_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<ServerConfig, ConfigError> {
        let map = load_config_map(path)?;
        ServerConfig::from_map(&map)
    }

    /// Applies defaults and interprets the raw key/value map.
    pub fn from_map(map: &HashMap<String, String>) -> Result<ServerConfig, ConfigError> {
        let transport_flag = parse_number(map, "transport_mode", 0u16)?;
        let transport_mode = TransportMode::from_flag(transport_flag)
            .map_err(|_| ConfigError(format!("unknown transport_mode {transport_flag}")))?;

        Ok(ServerConfig {
            server_address: string_or(map, "server_address", "127.0.0.1"),
            server_port: parse_number(map, "server_port", nrpe_protocol::DEFAULT_PORT)?,
            transport_mode,
            nrpe_user: string_or(map, "nrpe_user", "nagios"),
            nrpe_group: string_or(map, "nrpe_group", "nagios"),
            debug: parse_flag(map, "debug")?,
            allow_args: parse_flag(map, "dont_blame_nrpe")?,
            nasty_metachars: string_or(map, "nasty_metachars", DEFAULT_NASTY_METACHARS),
            allowed_hosts: parse_allowed_hosts(&string_or(map, "allowed_hosts", "127.0.0.1")),
            commands: parse_commands(map),
            connection_timeout: Duration::from_secs(parse_number(
                map,
                "connection_timeout",
                300u64,
            )?),
            command_timeout: Duration::from_secs(parse_number(map, "command_timeout", 60u64)?),
            pid_file: map.get("pid_file").map(PathBuf::from),
        })
    }

    /// The `host:port` string to bind, with `*` translated to all
    /// interfaces.
    pub fn listen_address(&self) -> String {
        let host = if self.server_address == "*" {
            "0.0.0.0"
        } else {
            &self.server_address
        };
        format!("{}:{}", host, self.server_port)
    }

    /// Whether any allowed network contains the given source address.
    pub fn is_host_allowed(&self, ip: IpAddr) -> bool {
        self.allowed_hosts.iter().any(|network| network.contains(&ip))
    }

    pub fn command(&self, name: &str) -> Option<&CommandTemplate> {
        self.commands.get(name)
    }
}

fn string_or(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    map.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn parse_number<N: FromStr>(
    map: &HashMap<String, String>,
    key: &str,
    default: N,
) -> Result<N, ConfigError> {
    match map.get(key) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError(format!("{key}: invalid number {value:?}"))),
    }
}

/// Numeric on/off switch: absent or `0` is off, any other number is on.
fn parse_flag(map: &HashMap<String, String>, key: &str) -> Result<bool, ConfigError> {
    Ok(parse_number(map, key, 0i64)? != 0)
}

/// Parses the comma-separated `allowed_hosts` list. A token with a `/` is
/// taken as CIDR; a bare IPv4 address becomes a /32 and a bare IPv6 address
/// a /64. Unparseable tokens are skipped.
fn parse_allowed_hosts(list: &str) -> Vec<IpCidr> {
    let mut networks = Vec::new();

    for token in list.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let with_prefix = if token.contains('/') {
            token.to_string()
        } else if token.contains(':') {
            format!("{token}/64")
        } else {
            format!("{token}/32")
        };

        // parse as host-in-network so entries like ::1/64 keep their host
        // bits through the mask
        match IpInet::from_str(&with_prefix) {
            Ok(inet) => networks.push(inet.network()),
            Err(e) => debug!("skipping allowed_hosts entry {token:?}: {e}"),
        }
    }

    networks
}

/// Collects `command[NAME]=program args…` entries into templates.
fn parse_commands(map: &HashMap<String, String>) -> HashMap<String, CommandTemplate> {
    let mut commands = HashMap::new();

    for (key, value) in map {
        let Some(rest) = key.strip_prefix("command[") else {
            continue;
        };
        let Some(name) = rest.strip_suffix(']') else {
            continue;
        };
        match CommandTemplate::parse(value) {
            Some(template) => {
                commands.insert(name.to_string(), template);
            }
            None => warn!("command[{name}] has an empty command line, skipping"),
        }
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::from_map(&HashMap::new()).unwrap();

        assert_eq!(config.server_address, "127.0.0.1");
        assert_eq!(config.server_port, 5666);
        assert_eq!(config.transport_mode, TransportMode::Plain);
        assert_eq!(config.nrpe_user, "nagios");
        assert_eq!(config.nrpe_group, "nagios");
        assert!(!config.debug);
        assert!(!config.allow_args);
        assert_eq!(config.nasty_metachars, "|`&><'\\[]{};\r\n");
        assert_eq!(config.allowed_hosts.len(), 1);
        assert!(config.is_host_allowed("127.0.0.1".parse().unwrap()));
        assert!(config.commands.is_empty());
        assert_eq!(config.connection_timeout, Duration::from_secs(300));
        assert_eq!(config.command_timeout, Duration::from_secs(60));
        assert!(config.pid_file.is_none());
    }

    #[test]
    fn listen_address_wildcard() {
        let config = ServerConfig::from_map(&map_of(&[
            ("server_address", "*"),
            ("server_port", "15666"),
        ]))
        .unwrap();
        assert_eq!(config.listen_address(), "0.0.0.0:15666");
    }

    #[test]
    fn allowed_hosts_mixed_families() {
        let networks = parse_allowed_hosts("127.0.0.1, ::1, 192.168.10.0/24, not-an-ip");
        assert_eq!(networks.len(), 3);

        let config = ServerConfig::from_map(&map_of(&[(
            "allowed_hosts",
            "127.0.0.1,::1,192.168.10.0/24",
        )]))
        .unwrap();

        assert!(config.is_host_allowed("127.0.0.1".parse().unwrap()));
        assert!(config.is_host_allowed("::1".parse().unwrap()));
        assert!(config.is_host_allowed("192.168.10.42".parse().unwrap()));
        // a /64 entry covers its whole network
        assert!(config.is_host_allowed("::2".parse().unwrap()));

        assert!(!config.is_host_allowed("192.168.0.127".parse().unwrap()));
        assert!(!config.is_host_allowed("10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn command_templates() {
        let config = ServerConfig::from_map(&map_of(&[
            ("command[check_users]", "/usr/lib/plugins/check_users -w 5 -c 10"),
            ("command[check_disk]", "/usr/lib/plugins/check_disk $ARG1$"),
        ]))
        .unwrap();

        let users = config.command("check_users").unwrap();
        assert_eq!(users.name, "/usr/lib/plugins/check_users");
        assert_eq!(users.args, vec!["-w", "5", "-c", "10"]);

        let disk = config.command("check_disk").unwrap();
        assert_eq!(disk.args, vec!["$ARG1$"]);

        assert!(config.command("check_foobar").is_none());
    }

    #[test]
    fn numeric_switches() {
        let config = ServerConfig::from_map(&map_of(&[
            ("debug", "1"),
            ("dont_blame_nrpe", "1"),
            ("transport_mode", "1"),
        ]))
        .unwrap();
        assert!(config.debug);
        assert!(config.allow_args);
        assert_eq!(config.transport_mode, TransportMode::Tls);

        assert!(ServerConfig::from_map(&map_of(&[("debug", "yes")])).is_err());
        assert!(ServerConfig::from_map(&map_of(&[("transport_mode", "7")])).is_err());
        assert!(ServerConfig::from_map(&map_of(&[("server_port", "never")])).is_err());
    }
}
