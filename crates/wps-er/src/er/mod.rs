// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The External Registrar: public API and lifecycle.
//!
//! [`ExternalRegistrar::init`] resolves the bound interface, opens the
//! SSDP sockets, brings up the event server, and queues the first
//! M-SEARCH. [`ExternalRegistrar::run`] then drives everything on the
//! calling thread until a [`ErHandle::shutdown`] arrives. All protocol
//! state lives in [`core::ErCore`]; the I/O lives in the mio event loop.

pub mod core;
mod event_loop;

pub use self::core::{Action, ErCore, ExchangeId, ExchangeKind, ExchangeOwner, HttpCall};

use crate::config::ErConfig;
use crate::registrar::WpsContext;
use crate::types::MacAddr;
use crate::{Error, Result};
use event_loop::EventLoop;
use mio::{Events, Waker};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Commands injected from other threads through [`ErHandle`].
enum Command {
    SetSelectedRegistrar {
        sel_reg: bool,
        dev_passwd_id: u16,
        sel_reg_config_methods: u16,
    },
}

/// Thread-safe control handle for a running registrar.
///
/// Commands are queued and executed on the event-loop thread; the waker
/// interrupts the current poll so they take effect promptly.
#[derive(Clone)]
pub struct ErHandle {
    commands: Arc<Mutex<VecDeque<Command>>>,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ErHandle {
    /// Broadcast the selected-registrar state to every known AP.
    pub fn set_selected_registrar(
        &self,
        sel_reg: bool,
        dev_passwd_id: u16,
        sel_reg_config_methods: u16,
    ) -> Result<()> {
        if let Ok(mut queue) = self.commands.lock() {
            queue.push_back(Command::SetSelectedRegistrar {
                sel_reg,
                dev_passwd_id,
                sel_reg_config_methods,
            });
        }
        self.waker.wake().map_err(Error::Io)
    }

    /// Ask the event loop to stop and tear everything down.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.waker.wake().map_err(Error::Io)
    }
}

/// A running WPS External Registrar instance.
pub struct ExternalRegistrar {
    core: ErCore,
    event_loop: EventLoop,
    commands: Arc<Mutex<VecDeque<Command>>>,
    shutdown: Arc<AtomicBool>,
    local_ip: Ipv4Addr,
    local_mac: Option<MacAddr>,
}

impl ExternalRegistrar {
    /// Bring the registrar up on the configured interface.
    ///
    /// Acquires the interface's IPv4 (and MAC, for diagnostics), opens the
    /// multicast-sender and SSDP listener sockets, binds the event-callback
    /// HTTP server, and queues the initial M-SEARCH. Any failure tears the
    /// partial state down and is fatal; after `init` succeeds nothing is.
    pub fn init(wps: Box<dyn WpsContext>, config: ErConfig) -> Result<Self> {
        config.validate()?;

        let local_ip = match config.bind_addr_override() {
            Some(addr) => addr,
            None => event_loop::interface_ipv4(&config.ifname)?,
        };
        let local_mac = event_loop::interface_mac(&config.ifname);

        let multicast = crate::ssdp::open_multicast_sock(local_ip)
            .map_err(|e| Error::Bind(format!("multicast sender: {}", e)))?;
        let listener = crate::ssdp::open_listener_sock(local_ip)
            .map_err(|e| Error::MulticastJoin(e.to_string()))?;

        let event_loop = EventLoop::new(multicast, listener, local_ip, config.http_port)
            .map_err(|e| Error::HttpServer(e.to_string()))?;

        let mut core = ErCore::new(config, local_ip, wps, Instant::now());
        core.set_http_port(event_loop.http_port());

        log::info!(
            "[er] start (ip={} mac={} http_port={})",
            local_ip,
            local_mac
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            event_loop.http_port()
        );

        Ok(Self {
            commands: Arc::new(Mutex::new(VecDeque::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            core,
            event_loop,
            local_ip,
            local_mac,
        })
    }

    /// Control handle usable from any thread.
    pub fn handle(&self) -> ErHandle {
        ErHandle {
            commands: Arc::clone(&self.commands),
            shutdown: Arc::clone(&self.shutdown),
            waker: self.event_loop.waker(),
        }
    }

    /// The IPv4 the registrar is bound to.
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// MAC of the bound interface, when it could be determined.
    pub fn local_mac(&self) -> Option<MacAddr> {
        self.local_mac
    }

    /// Port of the embedded event-callback server.
    pub fn http_port(&self) -> u16 {
        self.event_loop.http_port()
    }

    /// Broadcast the selected-registrar state immediately (same thread).
    pub fn set_selected_registrar(
        &mut self,
        sel_reg: bool,
        dev_passwd_id: u16,
        sel_reg_config_methods: u16,
    ) {
        self.core
            .set_selected_registrar(sel_reg, dev_passwd_id, sel_reg_config_methods);
    }

    /// Run the event loop until [`ErHandle::shutdown`] is called.
    ///
    /// Consumes the registrar; teardown happens before returning
    /// (stations, then APs, then sockets).
    pub fn run(mut self) -> Result<()> {
        let mut events = Events::with_capacity(64);

        let result = loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break Ok(());
            }
            self.drain_commands();
            self.event_loop
                .run_actions(&mut self.core, Instant::now());
            if let Err(e) = self.event_loop.poll_once(&mut self.core, &mut events) {
                break Err(Error::Io(e));
            }
        };

        self.event_loop.close(&mut self.core, Instant::now());
        log::info!("[er] stopped");
        result
    }

    fn drain_commands(&mut self) {
        loop {
            let command = match self.commands.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => None,
            };
            let Some(command) = command else {
                return;
            };
            match command {
                Command::SetSelectedRegistrar {
                    sel_reg,
                    dev_passwd_id,
                    sel_reg_config_methods,
                } => self.core.set_selected_registrar(
                    sel_reg,
                    dev_passwd_id,
                    sel_reg_config_methods,
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::DeclineAll;
    use std::time::Duration;

    #[test]
    fn test_init_run_shutdown_on_loopback() {
        let mut config = ErConfig::for_interface("");
        config.bind_addr = Some(Ipv4Addr::LOCALHOST);
        config.msearch_interval_secs = 0;

        let er = match ExternalRegistrar::init(Box::new(DeclineAll), config) {
            Ok(er) => er,
            // Port 1900 can be taken on shared CI hosts; that is an
            // environment limit, not a code defect.
            Err(Error::MulticastJoin(_)) | Err(Error::Bind(_)) => return,
            Err(e) => panic!("init failed: {}", e),
        };
        assert_ne!(er.http_port(), 0);
        assert_eq!(er.local_ip(), Ipv4Addr::LOCALHOST);

        let handle = er.handle();
        let thread = std::thread::spawn(move || er.run());
        std::thread::sleep(Duration::from_millis(100));
        handle
            .set_selected_registrar(true, 0x0000, 0x0080)
            .expect("Command send should succeed");
        std::thread::sleep(Duration::from_millis(50));
        handle.shutdown().expect("Shutdown send should succeed");
        thread
            .join()
            .expect("Loop thread should join")
            .expect("Run should exit cleanly");
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let mut config = ErConfig::for_interface("eth0");
        config.reply_queue_depth = 0;
        assert!(ExternalRegistrar::init(Box::new(DeclineAll), config).is_err());
    }
}
