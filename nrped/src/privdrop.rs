// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Dropping root privileges to the configured service user.

use log::*;

use nix::unistd::{setgid, setuid, Group, Uid, User};

use crate::config::ConfigError;

/// When running as root, switches to the named group and user (group
/// first, while we still may). A no-op otherwise. Failures here are fatal:
/// a daemon that was asked to shed root must not keep it.
pub fn drop_privileges(user_name: &str, group_name: &str) -> Result<(), ConfigError> {
    if !Uid::effective().is_root() {
        debug!("not running as root, keeping current privileges");
        return Ok(());
    }

    let group = Group::from_name(group_name)
        .map_err(|e| ConfigError::new(format!("cannot look up group {group_name:?}: {e}")))?
        .ok_or_else(|| ConfigError::new(format!("no such group: {group_name:?}")))?;

    let user = User::from_name(user_name)
        .map_err(|e| ConfigError::new(format!("cannot look up user {user_name:?}: {e}")))?
        .ok_or_else(|| ConfigError::new(format!("no such user: {user_name:?}")))?;

    setgid(group.gid)
        .map_err(|e| ConfigError::new(format!("cannot switch to group {group_name:?}: {e}")))?;
    setuid(user.uid)
        .map_err(|e| ConfigError::new(format!("cannot switch to user {user_name:?}: {e}")))?;

    info!("dropped privileges to {}:{}", user.name, group.name);
    Ok(())
}
