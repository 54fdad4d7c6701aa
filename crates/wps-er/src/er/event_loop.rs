// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-threaded mio event loop.
//!
//! Multiplexes the two SSDP sockets, the embedded event server and its
//! connections, every outbound client exchange, and a waker for commands
//! injected from other threads. The poll timeout is derived from the
//! earliest pending deadline (AP leases, station idle timers, renewals,
//! exchange timeouts), so nothing ever busy-waits.

use super::core::{Action, ErCore, ExchangeId};
use crate::http::client::{ClientEvent, ClientExchange};
use crate::http::server::{ConnProgress, HttpServer, ServerConn};
use crate::ssdp::{self, SsdpOrigin};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Instant;

const TOK_MULTICAST: Token = Token(0);
const TOK_SSDP: Token = Token(1);
const TOK_LISTENER: Token = Token(2);
const TOK_WAKER: Token = Token(3);
/// First token handed to dynamically created connections.
const TOK_DYN_BASE: usize = 16;

enum Conn {
    Client {
        exchange_id: ExchangeId,
        exchange: ClientExchange,
    },
    Server(ServerConn),
}

pub(super) struct EventLoop {
    poll: Poll,
    waker: Arc<Waker>,
    multicast: UdpSocket,
    ssdp: UdpSocket,
    server: HttpServer,
    conns: HashMap<Token, Conn>,
    by_exchange: HashMap<ExchangeId, Token>,
    next_token: usize,
}

impl EventLoop {
    /// Register the preopened UDP sockets, bind the event server, create
    /// the waker.
    pub(super) fn new(
        multicast: std::net::UdpSocket,
        listener: std::net::UdpSocket,
        local_ip: Ipv4Addr,
        http_port: u16,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), TOK_WAKER)?);

        let mut multicast = UdpSocket::from_std(multicast);
        let mut ssdp = UdpSocket::from_std(listener);
        poll.registry()
            .register(&mut multicast, TOK_MULTICAST, Interest::READABLE)?;
        poll.registry()
            .register(&mut ssdp, TOK_SSDP, Interest::READABLE)?;

        let server = HttpServer::bind(poll.registry(), TOK_LISTENER, local_ip, http_port)?;

        Ok(Self {
            poll,
            waker,
            multicast,
            ssdp,
            server,
            conns: HashMap::new(),
            by_exchange: HashMap::new(),
            next_token: TOK_DYN_BASE,
        })
    }

    pub(super) fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    pub(super) fn http_port(&self) -> u16 {
        self.server.port()
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Execute core actions until the queue is dry (completions can queue
    /// follow-up work).
    pub(super) fn run_actions(&mut self, core: &mut ErCore, now: Instant) {
        loop {
            let actions = core.take_actions();
            if actions.is_empty() {
                return;
            }
            for action in actions {
                match action {
                    Action::SendMsearch => self.send_msearch(),
                    Action::StartHttp(call) => {
                        let token = self.alloc_token();
                        match ClientExchange::start(
                            self.poll.registry(),
                            token,
                            call.dst,
                            call.request,
                            call.timeout,
                        ) {
                            Ok(exchange) => {
                                self.by_exchange.insert(call.id, token);
                                self.conns.insert(
                                    token,
                                    Conn::Client {
                                        exchange_id: call.id,
                                        exchange,
                                    },
                                );
                            }
                            Err(e) => {
                                log::debug!("[http] exchange start failed: {}", e);
                                core.handle_http_event(call.id, ClientEvent::Failed, now);
                            }
                        }
                    }
                    Action::AbortHttp(id) => {
                        if let Some(token) = self.by_exchange.remove(&id) {
                            if let Some(Conn::Client { mut exchange, .. }) =
                                self.conns.remove(&token)
                            {
                                exchange.deregister(self.poll.registry());
                            }
                        }
                    }
                }
            }
        }
    }

    fn send_msearch(&self) {
        let dst = SocketAddrV4::new(ssdp::SSDP_MULTICAST_ADDR, ssdp::SSDP_PORT);
        match self
            .multicast
            .send_to(ssdp::MSEARCH.as_bytes(), SocketAddr::V4(dst))
        {
            Ok(_) => log::debug!("[ssdp] M-SEARCH sent to {}", dst),
            Err(e) => log::warn!("[ssdp] M-SEARCH sendto failed: {}", e),
        }
    }

    /// One poll cycle: wait, dispatch readiness, sweep deadlines.
    pub(super) fn poll_once(&mut self, core: &mut ErCore, events: &mut Events) -> io::Result<()> {
        let now = Instant::now();
        let deadline = [core.next_deadline(), self.conn_deadline()]
            .into_iter()
            .flatten()
            .min();
        let timeout = deadline.map(|at| at.saturating_duration_since(now));

        match self.poll.poll(events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        for event in events.iter() {
            match event.token() {
                TOK_MULTICAST => {
                    Self::drain_udp(&self.multicast, SsdpOrigin::MulticastReply, core, now)
                }
                TOK_SSDP => Self::drain_udp(&self.ssdp, SsdpOrigin::Listener, core, now),
                TOK_LISTENER => self.accept_all(),
                TOK_WAKER => {} // Commands drained by the caller
                token => self.drive_conn(token, core, now),
            }
        }

        core.handle_deadlines(now);
        self.sweep_conn_deadlines(core, now);
        Ok(())
    }

    fn drain_udp(socket: &UdpSocket, origin: SsdpOrigin, core: &mut ErCore, now: Instant) {
        let mut buf = [0u8; ssdp::SSDP_MAX_READ];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, SocketAddr::V4(src))) => {
                    core.handle_ssdp(origin, *src.ip(), &buf[..len], now);
                }
                Ok((_, SocketAddr::V6(src))) => {
                    log::debug!("[ssdp] ignoring IPv6 datagram from {}", src);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("[ssdp] recv_from error: {}", e);
                    return;
                }
            }
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.server.accept() {
                Ok(Some((stream, peer))) => {
                    let token = self.alloc_token();
                    match ServerConn::register(self.poll.registry(), token, stream, peer) {
                        Ok(conn) => {
                            self.conns.insert(token, Conn::Server(conn));
                        }
                        Err(e) => log::debug!("[http] failed to register connection: {}", e),
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    log::debug!("[http] accept error: {}", e);
                    return;
                }
            }
        }
    }

    fn drive_conn(&mut self, token: Token, core: &mut ErCore, now: Instant) {
        let Some(conn) = self.conns.get_mut(&token) else {
            return; // Token already retired in this batch
        };
        match conn {
            Conn::Client {
                exchange_id,
                exchange,
            } => {
                if let Some(outcome) = exchange.on_ready() {
                    let id = *exchange_id;
                    exchange.deregister(self.poll.registry());
                    self.conns.remove(&token);
                    self.by_exchange.remove(&id);
                    core.handle_http_event(id, outcome, now);
                }
            }
            Conn::Server(conn) => match conn.on_ready() {
                ConnProgress::Pending => {}
                ConnProgress::Request(req) => {
                    log::debug!(
                        "[http] {} {} from {}",
                        req.method,
                        req.uri,
                        conn.peer()
                    );
                    let response = core.handle_http_request(&req, now);
                    conn.respond(self.poll.registry(), token, response);
                }
                ConnProgress::Closed => {
                    conn.deregister(self.poll.registry());
                    self.conns.remove(&token);
                }
            },
        }
    }

    /// Earliest exchange or server-connection deadline.
    fn conn_deadline(&self) -> Option<Instant> {
        self.conns
            .values()
            .map(|conn| match conn {
                Conn::Client { exchange, .. } => exchange.deadline(),
                Conn::Server(conn) => conn.deadline(),
            })
            .min()
    }

    /// Time out exchanges and reap stale server connections.
    fn sweep_conn_deadlines(&mut self, core: &mut ErCore, now: Instant) {
        let due: Vec<Token> = self
            .conns
            .iter()
            .filter(|(_, conn)| match conn {
                Conn::Client { exchange, .. } => exchange.deadline() <= now,
                Conn::Server(conn) => conn.deadline() <= now,
            })
            .map(|(token, _)| *token)
            .collect();

        for token in due {
            match self.conns.remove(&token) {
                Some(Conn::Client {
                    exchange_id,
                    mut exchange,
                }) => {
                    exchange.deregister(self.poll.registry());
                    self.by_exchange.remove(&exchange_id);
                    core.handle_http_event(exchange_id, ClientEvent::Timeout, now);
                }
                Some(Conn::Server(mut conn)) => {
                    log::debug!("[http] reaping idle connection from {}", conn.peer());
                    conn.deregister(self.poll.registry());
                }
                None => {}
            }
        }
    }

    /// Tear down every registration; sockets close on drop.
    pub(super) fn close(&mut self, core: &mut ErCore, now: Instant) {
        // Core shutdown queues aborts for everything in flight.
        core.shutdown();
        self.run_actions(core, now);

        for (_, conn) in self.conns.drain() {
            match conn {
                Conn::Client { mut exchange, .. } => exchange.deregister(self.poll.registry()),
                Conn::Server(mut conn) => conn.deregister(self.poll.registry()),
            }
        }
        self.by_exchange.clear();

        self.server.deregister(self.poll.registry());
        if let Err(e) = self.poll.registry().deregister(&mut self.multicast) {
            log::debug!("[ssdp] multicast deregister failed: {}", e);
        }
        if let Err(e) = self.poll.registry().deregister(&mut self.ssdp) {
            log::debug!("[ssdp] listener deregister failed: {}", e);
        }
    }
}

/// IPv4 of the named interface (`lo` included, for loopback test rigs).
pub(super) fn interface_ipv4(ifname: &str) -> crate::Result<Ipv4Addr> {
    let netifas = local_ip_address::list_afinet_netifas()
        .map_err(|e| crate::Error::InterfaceLookup(e.to_string()))?;
    netifas
        .into_iter()
        .find_map(|(name, ip)| match ip {
            IpAddr::V4(v4) if name == ifname => Some(v4),
            _ => None,
        })
        .ok_or_else(|| {
            crate::Error::InterfaceLookup(format!("no IPv4 address on '{}'", ifname))
        })
}

/// MAC address of the named interface via SIOCGIFHWADDR.
#[cfg(target_os = "linux")]
pub(super) fn interface_mac(ifname: &str) -> Option<crate::types::MacAddr> {
    use std::os::unix::io::AsRawFd;

    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    if ifname.len() >= req.ifr_name.len() {
        return None;
    }
    for (dst, src) in req.ifr_name.iter_mut().zip(ifname.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    let rc = unsafe { libc::ioctl(socket.as_raw_fd(), libc::SIOCGIFHWADDR, &mut req) };
    if rc != 0 {
        return None;
    }
    let hwaddr = unsafe { req.ifr_ifru.ifru_hwaddr };
    let mut mac = [0u8; 6];
    for (dst, src) in mac.iter_mut().zip(hwaddr.sa_data.iter()) {
        *dst = *src as u8;
    }
    Some(crate::types::MacAddr::from_bytes(mac))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn interface_mac(_ifname: &str) -> Option<crate::types::MacAddr> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_ipv4_loopback() {
        // Interface naming differs per platform; just assert the error
        // path is clean for a bogus name.
        assert!(interface_ipv4("definitely-not-an-interface-0").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_interface_mac_bogus_name() {
        assert!(interface_mac("definitely-not-an-interface-0").is_none());
        assert!(interface_mac(&"x".repeat(64)).is_none());
    }
}
