// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Byte-stream transports: plain TCP and the NRPE-compatible TLS mode.
//!
//! The TLS configuration is intentionally insecure: the deployed NRPE
//! ecosystem runs on ephemeral self-signed certificates and anonymous DH
//! suites, so both peers disable verification and the server installs
//! ephemeral DH parameters in place of a certificate. Do not tighten this
//! without breaking compatibility with stock check_nrpe/nrpe installs.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use openssl::dh::Dh;
use openssl::ssl::{HandshakeError, Ssl, SslContext, SslMethod, SslStream, SslVerifyMode};

use crate::Error;

/// Cipher list historical NRPE peers negotiate with.
pub const COMPAT_CIPHER_LIST: &str = "ALL:!MD5:@STRENGTH:@SECLEVEL=0";

/// Which transport wraps the TCP connection. Matches the `transport_mode`
/// config value and the client's `-t` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Plain,
    Tls,
}

impl TransportMode {
    pub fn from_flag(flag: u16) -> Result<Self, Error> {
        match flag {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Tls),
            _ => Err(Error::Tls(format!("unknown transport mode {flag}"))),
        }
    }
}

/// An established connection in either transport.
pub enum Connection {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf),
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.write(buf),
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }
}

/// Server side of a transport: a TCP listener plus the TLS context to wrap
/// accepted connections with, when TLS mode is on.
pub struct Listener {
    inner: TcpListener,
    tls: Option<SslContext>,
}

impl Listener {
    pub fn bind(addr: &str, mode: TransportMode) -> Result<Listener, Error> {
        let inner = TcpListener::bind(addr)?;
        let tls = match mode {
            TransportMode::Plain => None,
            TransportMode::Tls => Some(server_context()?),
        };
        Ok(Listener { inner, tls })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.inner.local_addr()?)
    }

    /// Accepts one TCP connection. The peer address comes from the TCP
    /// layer, before any TLS handshake, so the source-address check can run
    /// without talking to the peer at all.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), Error> {
        Ok(self.inner.accept()?)
    }

    /// Wraps an accepted connection in the listener's transport, running
    /// the TLS handshake when TLS mode is on.
    pub fn wrap(&self, stream: TcpStream) -> Result<Connection, Error> {
        match &self.tls {
            None => Ok(Connection::Plain(stream)),
            Some(ctx) => {
                let ssl = Ssl::new(ctx)?;
                let tls_stream = ssl.accept(stream).map_err(handshake_error)?;
                Ok(Connection::Tls(tls_stream))
            }
        }
    }
}

/// Dials the given endpoint with the requested transport.
pub fn connect(host: &str, port: u16, mode: TransportMode) -> Result<Connection, Error> {
    let stream = TcpStream::connect((host, port))?;
    match mode {
        TransportMode::Plain => Ok(Connection::Plain(stream)),
        TransportMode::Tls => {
            let ctx = client_context()?;
            let ssl = Ssl::new(&ctx)?;
            let tls_stream = ssl.connect(stream).map_err(handshake_error)?;
            Ok(Connection::Tls(tls_stream))
        }
    }
}

fn server_context() -> Result<SslContext, Error> {
    let mut builder = SslContext::builder(SslMethod::tls())?;
    builder.set_cipher_list(COMPAT_CIPHER_LIST)?;
    builder.set_verify(SslVerifyMode::NONE);
    // anonymous suites need ephemeral DH parameters in place of a certificate
    let dh = Dh::get_2048_256()?;
    builder.set_tmp_dh(&dh)?;
    Ok(builder.build())
}

fn client_context() -> Result<SslContext, Error> {
    let mut builder = SslContext::builder(SslMethod::tls())?;
    builder.set_cipher_list(COMPAT_CIPHER_LIST)?;
    builder.set_verify(SslVerifyMode::NONE);
    Ok(builder.build())
}

fn handshake_error<S>(e: HandshakeError<S>) -> Error {
    match e {
        HandshakeError::SetupFailure(stack) => Error::Tls(stack.to_string()),
        HandshakeError::Failure(mid) => Error::Tls(mid.error().to_string()),
        HandshakeError::WouldBlock(_) => Error::Tls("handshake would block".to_string()),
    }
}
