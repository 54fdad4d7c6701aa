// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot nonblocking HTTP client exchange.
//!
//! Connect, write the prebuilt request, read the reply until framing
//! completes or the peer closes, report one terminal [`ClientEvent`].
//! The event loop owns the poll registration and the deadline; this type
//! owns the socket and the byte-level state machine.

use super::message::{parse_response, ParseStatus, Response};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

/// Reply bodies past this size are treated as an invalid reply.
const MAX_REPLY_SIZE: usize = 64 * 1024;

/// Terminal outcome of an exchange.
#[derive(Debug)]
pub enum ClientEvent {
    /// A complete, parseable HTTP reply (any status code).
    Ok(Response),
    /// Connect/read/write failure before a reply was framed.
    Failed,
    /// The peer sent bytes that do not frame as an HTTP reply.
    InvalidReply,
    /// The deadline elapsed first.
    Timeout,
}

enum Phase {
    Sending,
    Receiving,
}

/// In-flight exchange state.
pub struct ClientExchange {
    stream: TcpStream,
    request: Vec<u8>,
    written: usize,
    reply: Vec<u8>,
    phase: Phase,
    deadline: Instant,
}

impl ClientExchange {
    /// Start a nonblocking connect and register with the poll registry.
    pub fn start(
        registry: &Registry,
        token: Token,
        dst: SocketAddrV4,
        request: Vec<u8>,
        timeout: Duration,
    ) -> io::Result<Self> {
        let mut stream = TcpStream::connect(SocketAddr::V4(dst))?;
        registry.register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self {
            stream,
            request,
            written: 0,
            reply: Vec::new(),
            phase: Phase::Sending,
            deadline: Instant::now() + timeout,
        })
    }

    /// Absolute deadline after which the exchange times out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Drive the exchange on poll readiness.
    ///
    /// Returns `Some(event)` when the exchange reached a terminal state;
    /// the caller must then deregister and drop it.
    pub fn on_ready(&mut self) -> Option<ClientEvent> {
        if let Phase::Sending = self.phase {
            match self.flush_request() {
                Ok(true) => self.phase = Phase::Receiving,
                Ok(false) => return None,
                Err(_) => return Some(ClientEvent::Failed),
            }
        }
        self.drain_reply()
    }

    /// Deregister the socket from the poll registry.
    pub fn deregister(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            log::debug!("[http] deregister failed: {}", e);
        }
    }

    /// Write as much of the request as the socket accepts.
    /// `Ok(true)` once fully sent.
    fn flush_request(&mut self) -> io::Result<bool> {
        while self.written < self.request.len() {
            match self.stream.write(&self.request[self.written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::NotConnected => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Read reply bytes until WouldBlock or EOF; try to frame a response.
    fn drain_reply(&mut self) -> Option<ClientEvent> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Some(match parse_response(&self.reply, true) {
                        ParseStatus::Complete(resp) => ClientEvent::Ok(resp),
                        _ => ClientEvent::InvalidReply,
                    });
                }
                Ok(n) => {
                    self.reply.extend_from_slice(&chunk[..n]);
                    if self.reply.len() > MAX_REPLY_SIZE {
                        return Some(ClientEvent::InvalidReply);
                    }
                    match parse_response(&self.reply, false) {
                        ParseStatus::Complete(resp) => return Some(ClientEvent::Ok(resp)),
                        ParseStatus::Invalid => return Some(ClientEvent::InvalidReply),
                        ParseStatus::Partial => {}
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) if e.kind() == io::ErrorKind::NotConnected => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Some(ClientEvent::Failed),
            }
        }
    }
}
