// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # WPS External Registrar
//!
//! A Wi-Fi Protected Setup (WPS) External Registrar: discovers WPS-capable
//! access points on the local network over UPnP/SSDP, subscribes to their
//! WPS event service, and relays the WSC registration protocol between
//! wireless enrollees (proxied by the AP) and an in-process registrar
//! engine.
//!
//! ## Overview
//!
//! The registrar composes five pieces, all driven by one single-threaded
//! event loop:
//!
//! - **SSDP listener** — unsolicited NOTIFY traffic and M-SEARCH replies,
//!   filtered for the Wi-Fi Alliance device/service URN
//! - **AP registry** — the live set of known APs with cache-timeout expiry
//! - **UPnP control client** — description fetch, event subscription, and
//!   the `PutWLANResponse` / `SetSelectedRegistrar` SOAP actions
//! - **Event endpoint** — an embedded HTTP server receiving `WLANEvent`
//!   notifications
//! - **Station sessions** — one WSC exchange per enrollee MAC, fed from
//!   decoded `WLANEvent` payloads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wps_er::{ErConfig, ExternalRegistrar};
//!
//! let config = ErConfig::for_interface("eth0");
//! let engine = Box::new(wps_er::registrar::DeclineAll);
//! let er = ExternalRegistrar::init(engine, config)?;
//!
//! let handle = er.handle();
//! handle.set_selected_registrar(true, 0x0000, 0x0080)?;
//!
//! er.run()?; // Blocks until handle.shutdown()
//! # Ok::<(), wps_er::Error>(())
//! ```
//!
//! The cryptographic WSC state machine is not part of this crate; plug one
//! in through [`registrar::WpsContext`].

pub mod config;
pub mod discovery;
pub mod er;
pub mod http;
pub mod registrar;
pub mod ssdp;
pub mod types;
pub mod upnp;
pub mod wsc;

pub use config::ErConfig;
pub use er::{ErHandle, ExternalRegistrar};
pub use registrar::{WpsContext, WpsProcessResult, WpsRegistrar, WscOpCode};
pub use types::MacAddr;

/// Errors returned by registrar operations.
///
/// Everything here is fatal only during [`ExternalRegistrar::init`]; once
/// the registrar is running, network and peer failures are handled locally
/// (logged, unit of work dropped) and never surface as `Error`.
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration value.
    Config(String),
    /// Could not determine the IP or MAC address of the bound interface.
    InterfaceLookup(String),
    /// Failed to bind a UDP socket.
    Bind(String),
    /// Failed to join the SSDP multicast group.
    MulticastJoin(String),
    /// Failed to bring up the embedded HTTP event server.
    HttpServer(String),
    /// I/O error with underlying cause.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InterfaceLookup(msg) => write!(f, "Interface lookup failed: {}", msg),
            Error::Bind(msg) => write!(f, "Bind failed: {}", msg),
            Error::MulticastJoin(msg) => write!(f, "Multicast join failed: {}", msg),
            Error::HttpServer(msg) => write!(f, "HTTP server failed: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
