// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! External Registrar configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

/// External Registrar configuration.
///
/// All timeouts default to the values used on the wire by WPS ER
/// deployments: 10 s description fetch, 1 s SOAP/GENA exchanges, 1800 s
/// event subscriptions renewed 300 s before expiry, 300 s station idle
/// timeout.
#[derive(Debug, Clone)]
pub struct ErConfig {
    /// Network interface to bind (e.g. "eth0").
    pub ifname: String,

    /// Explicit local IPv4 to bind instead of resolving `ifname`.
    ///
    /// Takes precedence over interface lookup. Also settable through the
    /// `WPS_ER_MULTICAST_IF` environment variable.
    pub bind_addr: Option<Ipv4Addr>,

    /// Port for the embedded event-callback HTTP server (0 = OS-assigned).
    pub http_port: u16,

    /// Interval between periodic M-SEARCH probes in seconds (0 disables;
    /// the initial probe at startup is always sent).
    pub msearch_interval_secs: u64,

    /// Seconds of silence before a station record is dropped.
    pub sta_idle_timeout_secs: u64,

    /// Timeout for the device-description GET (milliseconds).
    pub desc_fetch_timeout_ms: u64,

    /// Timeout for SOAP POST exchanges (milliseconds).
    pub soap_timeout_ms: u64,

    /// Timeout for SUBSCRIBE/UNSUBSCRIBE exchanges (milliseconds).
    pub subscribe_timeout_ms: u64,

    /// Requested GENA subscription lifetime in seconds.
    pub subscribe_period_secs: u64,

    /// Seconds before subscription expiry at which renewal is issued.
    pub renew_margin_secs: u64,

    /// Maximum queued outbound replies per station before drops.
    pub reply_queue_depth: usize,
}

impl ErConfig {
    /// Configuration for a single bound interface with default timers.
    pub fn for_interface(ifname: &str) -> Self {
        Self {
            ifname: ifname.to_string(),
            bind_addr: None,
            http_port: 0,
            msearch_interval_secs: 120,
            sta_idle_timeout_secs: 300,
            desc_fetch_timeout_ms: 10_000,
            soap_timeout_ms: 1_000,
            subscribe_timeout_ms: 1_000,
            subscribe_period_secs: 1_800,
            renew_margin_secs: 300,
            reply_queue_depth: 4,
        }
    }

    /// Effective bind address override: explicit field first, then the
    /// `WPS_ER_MULTICAST_IF` environment variable.
    pub fn bind_addr_override(&self) -> Option<Ipv4Addr> {
        if self.bind_addr.is_some() {
            return self.bind_addr;
        }
        std::env::var("WPS_ER_MULTICAST_IF")
            .ok()
            .and_then(|v| v.parse::<Ipv4Addr>().ok())
    }

    /// Station idle timeout as a `Duration`.
    pub fn sta_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.sta_idle_timeout_secs)
    }

    /// Delay between a successful SUBSCRIBE and its renewal.
    pub fn renew_delay(&self) -> Duration {
        Duration::from_secs(
            self.subscribe_period_secs
                .saturating_sub(self.renew_margin_secs),
        )
    }

    /// Validate configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.ifname.is_empty() && self.bind_addr_override().is_none() {
            return Err(crate::Error::Config(
                "ifname or bind_addr must be set".into(),
            ));
        }
        if self.sta_idle_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "sta_idle_timeout_secs cannot be 0".into(),
            ));
        }
        if self.desc_fetch_timeout_ms == 0 || self.soap_timeout_ms == 0 {
            return Err(crate::Error::Config("HTTP timeouts cannot be 0".into()));
        }
        if self.subscribe_period_secs <= self.renew_margin_secs {
            return Err(crate::Error::Config(
                "subscribe_period_secs must exceed renew_margin_secs".into(),
            ));
        }
        if self.reply_queue_depth == 0 {
            return Err(crate::Error::Config(
                "reply_queue_depth cannot be 0".into(),
            ));
        }
        Ok(())
    }
}
