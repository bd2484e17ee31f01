// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::path::Path;

use nrped::config::ServerConfig;

fn test_config() -> ServerConfig {
    let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/nrpe-test.cfg"));
    ServerConfig::load(path).unwrap()
}

#[test]
fn loads_the_test_file() {
    let config = test_config();

    assert_eq!(config.server_address, "127.0.0.1");
    assert_eq!(config.server_port, 5666);
    assert!(!config.debug);
    assert!(!config.allow_args);

    // keys absent from the file keep their defaults
    assert_eq!(config.nrpe_user, "nagios");
    assert_eq!(config.nasty_metachars, "|`&><'\\[]{};\r\n");
}

#[test]
fn commands_from_the_test_file() {
    let config = test_config();

    assert_eq!(config.commands.len(), 3);
    assert!(config.command("check_iostat").is_some());
    assert!(config.command("check_foobar").is_none());

    let disk = config.command("check_disk").unwrap();
    assert_eq!(disk.name, "/usr/lib/nagios/plugins/check_disk");
    assert_eq!(disk.args, vec!["-w", "$ARG1$", "-c", "$ARG2$"]);
}

#[test]
fn allowed_hosts_from_the_test_file() {
    let config = test_config();

    assert_eq!(config.allowed_hosts.len(), 2);
    assert!(config.is_host_allowed("127.0.0.1".parse().unwrap()));
    assert!(config.is_host_allowed("::1".parse().unwrap()));
    assert!(!config.is_host_allowed("192.168.0.127".parse().unwrap()));
}

#[test]
fn missing_file_is_an_error() {
    assert!(ServerConfig::load(Path::new("/nonexistent/nrpe.cfg")).is_err());
}
