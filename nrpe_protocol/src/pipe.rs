// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! An in-process "pipe", constructed using socketpair(2), that can be used
//! for testing client and server behavior without a real listener.

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

pub struct Endpoint {
    fd: std::os::fd::OwnedFd,
}

/// Returns a connected pair of endpoints. Bytes written to one side are read
/// from the other, in both directions.
///
/// The endpoints are close-on-exec: handler tests spawn check processes
/// while the pipe is open, and a leaked fd would keep the connection alive
/// past the handler's close.
pub fn pipe() -> std::io::Result<(Endpoint, Endpoint)> {
    let (a, b) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::SOCK_CLOEXEC,
    )?;

    Ok((Endpoint { fd: a }, Endpoint { fd: b }))
}

impl std::io::Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(nix::unistd::read(&self.fd, buf)?)
    }
}

impl std::io::Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(nix::unistd::write(&self.fd, buf)?)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
