// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Embedded HTTP server for UPnP event callbacks.
//!
//! Accepts connections on an OS-assigned port, frames one request per
//! connection, lets the owner produce the response bytes, writes them and
//! closes. Connections idle past a short grace period are dropped.

use super::message::{parse_request, ParseStatus, Request};
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

/// Largest NOTIFY body we accept.
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// How long a connection may sit without completing its request/response.
const CONN_GRACE: Duration = Duration::from_secs(30);

/// Listening socket for the event endpoint.
pub struct HttpServer {
    listener: TcpListener,
    port: u16,
}

impl HttpServer {
    /// Bind to `addr:port` (`port` 0 = OS-assigned) and register with the
    /// poll registry.
    pub fn bind(
        registry: &Registry,
        token: Token,
        addr: Ipv4Addr,
        port: u16,
    ) -> io::Result<Self> {
        let mut listener = TcpListener::bind(SocketAddr::V4(SocketAddrV4::new(addr, port)))?;
        registry.register(&mut listener, token, Interest::READABLE)?;
        let port = match listener.local_addr()? {
            SocketAddr::V4(v4) => v4.port(),
            SocketAddr::V6(v6) => v6.port(),
        };
        log::debug!("[http] event server listening on {}:{}", addr, port);
        Ok(Self { listener, port })
    }

    /// The bound port (for the SUBSCRIBE callback URL).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept one pending connection, if any.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        match self.listener.accept() {
            Ok(pair) => Ok(Some(pair)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deregister the listener on shutdown.
    pub fn deregister(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.listener) {
            log::debug!("[http] listener deregister failed: {}", e);
        }
    }
}

/// What a connection needs next from its owner.
#[derive(Debug)]
pub enum ConnProgress {
    /// Waiting for more I/O readiness.
    Pending,
    /// A complete request was framed; answer with [`ServerConn::respond`].
    Request(Request),
    /// Response fully written or the peer went away; drop the connection.
    Closed,
}

enum ConnPhase {
    Reading,
    Writing,
}

/// One accepted event-callback connection.
pub struct ServerConn {
    stream: TcpStream,
    peer: SocketAddr,
    rx: Vec<u8>,
    tx: Vec<u8>,
    written: usize,
    phase: ConnPhase,
    deadline: Instant,
}

impl ServerConn {
    /// Take ownership of an accepted stream and register it readable.
    pub fn register(
        registry: &Registry,
        token: Token,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> io::Result<Self> {
        registry.register(&mut stream, token, Interest::READABLE)?;
        Ok(Self {
            stream,
            peer,
            rx: Vec::new(),
            tx: Vec::new(),
            written: 0,
            phase: ConnPhase::Reading,
            deadline: Instant::now() + CONN_GRACE,
        })
    }

    /// Remote peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Deadline after which the connection is reaped.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Drive the connection on poll readiness.
    pub fn on_ready(&mut self) -> ConnProgress {
        match self.phase {
            ConnPhase::Reading => self.read_request(),
            ConnPhase::Writing => self.write_response(),
        }
    }

    /// Install the response and switch the poll interest to writable.
    pub fn respond(&mut self, registry: &Registry, token: Token, response: Vec<u8>) {
        self.tx = response;
        self.written = 0;
        self.phase = ConnPhase::Writing;
        if let Err(e) = registry.reregister(&mut self.stream, token, Interest::WRITABLE) {
            log::debug!("[http] reregister for write failed: {}", e);
        }
    }

    /// Deregister the socket from the poll registry.
    pub fn deregister(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            log::debug!("[http] conn deregister failed: {}", e);
        }
    }

    fn read_request(&mut self) -> ConnProgress {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return ConnProgress::Closed, // Peer gave up mid-request
                Ok(n) => {
                    self.rx.extend_from_slice(&chunk[..n]);
                    if self.rx.len() > MAX_REQUEST_SIZE {
                        log::debug!("[http] request from {} too large, dropping", self.peer);
                        return ConnProgress::Closed;
                    }
                    match parse_request(&self.rx) {
                        ParseStatus::Complete(req) => return ConnProgress::Request(req),
                        ParseStatus::Invalid => {
                            log::debug!("[http] unparseable request from {}", self.peer);
                            return ConnProgress::Closed;
                        }
                        ParseStatus::Partial => {}
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ConnProgress::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return ConnProgress::Closed,
            }
        }
    }

    fn write_response(&mut self) -> ConnProgress {
        while self.written < self.tx.len() {
            match self.stream.write(&self.tx[self.written..]) {
                Ok(0) => return ConnProgress::Closed,
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ConnProgress::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return ConnProgress::Closed,
            }
        }
        ConnProgress::Closed // Response done, Connection: close semantics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::build_response;
    use mio::{Events, Poll};

    #[test]
    fn test_server_request_response_cycle() {
        const LISTENER: Token = Token(0);
        const CONN: Token = Token(1);

        let mut poll = Poll::new().expect("Should create poll");
        let server = HttpServer::bind(poll.registry(), LISTENER, Ipv4Addr::LOCALHOST, 0)
            .expect("Should bind server");
        let port = server.port();
        assert_ne!(port, 0);

        let client = std::thread::spawn(move || {
            let mut stream =
                std::net::TcpStream::connect(("127.0.0.1", port)).expect("Should connect");
            stream
                .write_all(b"NOTIFY /event/1 HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc")
                .expect("Should send request");
            let mut reply = String::new();
            stream
                .read_to_string(&mut reply)
                .expect("Should read reply");
            reply
        });

        let mut events = Events::with_capacity(8);
        let mut conn: Option<ServerConn> = None;
        let deadline = Instant::now() + Duration::from_secs(5);

        'outer: while Instant::now() < deadline {
            poll.poll(&mut events, Some(Duration::from_millis(50)))
                .expect("poll should succeed");
            for event in events.iter() {
                match event.token() {
                    LISTENER => {
                        if let Some((stream, peer)) =
                            server.accept().expect("Accept should succeed")
                        {
                            conn = Some(
                                ServerConn::register(poll.registry(), CONN, stream, peer)
                                    .expect("Should register conn"),
                            );
                        }
                    }
                    CONN => {
                        let c = conn.as_mut().expect("Conn should exist");
                        match c.on_ready() {
                            ConnProgress::Request(req) => {
                                assert_eq!(req.method, "NOTIFY");
                                assert_eq!(req.body, b"abc");
                                c.respond(poll.registry(), CONN, build_response(200, "OK"));
                            }
                            ConnProgress::Closed => break 'outer,
                            ConnProgress::Pending => {}
                        }
                    }
                    _ => unreachable!(),
                }
            }
        }

        let mut c = conn.expect("Connection should have been accepted");
        c.deregister(poll.registry());
        drop(c);
        let reply = client.join().expect("Client thread should finish");
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
    }
}
