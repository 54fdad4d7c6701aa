// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WPS External Registrar daemon.
//!
//! Discovers WPS-capable APs on the configured interface, subscribes to
//! their WLAN event service, and logs enrollee activity. Runs as a pure
//! observer: registration attempts are tracked but declined, so it never
//! provisions credentials. Optionally announces selected-registrar state
//! to every discovered AP at startup.
//!
//! # Usage
//!
//! ```bash
//! # Watch WPS activity on eth0
//! wps-erd --ifname eth0
//!
//! # Announce ourselves as selected registrar (push-button, all methods)
//! wps-erd --ifname wlan0 --select-registrar --dev-passwd-id 4
//!
//! # Bind a specific address instead of resolving the interface
//! wps-erd --bind 192.168.1.10
//! ```

use clap::Parser;
use std::net::Ipv4Addr;
use wps_er::registrar::DeclineAll;
use wps_er::{ErConfig, ExternalRegistrar};

/// WPS External Registrar daemon - discover and monitor WPS APs over UPnP
#[derive(Parser, Debug)]
#[command(name = "wps-erd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network interface to bind
    #[arg(short, long, default_value = "eth0")]
    ifname: String,

    /// Bind this IPv4 address instead of resolving the interface
    #[arg(short, long)]
    bind: Option<Ipv4Addr>,

    /// Port for the event-callback HTTP server (0 = OS-assigned)
    #[arg(long, default_value = "0")]
    http_port: u16,

    /// Interval between M-SEARCH probes in seconds (0 disables re-probing)
    #[arg(long, default_value = "120")]
    msearch_interval: u64,

    /// Announce selected-registrar state to every AP at startup
    #[arg(long, default_value = "false")]
    select_registrar: bool,

    /// Device Password ID for the announcement (4 = push-button)
    #[arg(long, default_value = "0")]
    dev_passwd_id: u16,

    /// Config Methods bitmask for the announcement
    #[arg(long, default_value = "0x0080", value_parser = parse_u16_maybe_hex)]
    config_methods: u16,
}

fn parse_u16_maybe_hex(text: &str) -> Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid u16 '{}': {}", text, e))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = ErConfig::for_interface(&args.ifname);
    config.bind_addr = args.bind;
    config.http_port = args.http_port;
    config.msearch_interval_secs = args.msearch_interval;

    let mut er = ExternalRegistrar::init(Box::new(DeclineAll), config)?;
    log::info!(
        "wps-erd up on {} (ifname={}, event port {})",
        er.local_ip(),
        args.ifname,
        er.http_port()
    );

    if args.select_registrar {
        er.set_selected_registrar(true, args.dev_passwd_id, args.config_methods);
        log::info!(
            "announcing selected registrar (dev_passwd_id=0x{:04x} config_methods=0x{:04x})",
            args.dev_passwd_id,
            args.config_methods
        );
    }

    let handle = er.handle();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        let _ = handle.shutdown();
    })?;

    er.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u16_maybe_hex() {
        assert_eq!(parse_u16_maybe_hex("0x0080"), Ok(0x0080));
        assert_eq!(parse_u16_maybe_hex("0X1f"), Ok(0x1f));
        assert_eq!(parse_u16_maybe_hex("128"), Ok(128));
        assert!(parse_u16_maybe_hex("0xzz").is_err());
        assert!(parse_u16_maybe_hex("70000").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["wps-erd"]);
        assert_eq!(args.ifname, "eth0");
        assert_eq!(args.http_port, 0);
        assert_eq!(args.config_methods, 0x0080);
        assert!(!args.select_registrar);
    }
}
