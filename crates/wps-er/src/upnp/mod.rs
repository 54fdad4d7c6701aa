// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UPnP control plane: device descriptions, GENA eventing, SOAP actions.

pub mod description;
pub mod event;
pub mod soap;

pub use description::{parse_device_description, DeviceDescription};
pub use event::extract_wlanevent;

use std::net::{Ipv4Addr, SocketAddrV4};
use url::Url;

/// Split an `http://a.b.c.d[:port]/path` URL into destination address and
/// request path.
///
/// The host must be an IPv4 literal: AP-provided control and event URLs
/// are addresses on the local network, and growing a resolver for the
/// exceptional case is not worth it. Hostname URLs return `None` and the
/// caller drops the work unit.
pub fn parse_http_url(raw: &str) -> Option<(SocketAddrV4, String)> {
    let url = Url::parse(raw).ok()?;
    if url.scheme() != "http" {
        return None;
    }
    let host: Ipv4Addr = url.host_str()?.parse().ok()?;
    let port = url.port().unwrap_or(80);
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    Some((SocketAddrV4::new(host, port), path))
}

/// Resolve a possibly-relative URL reference against a base document URL.
///
/// Unresolvable inputs fall back to the reference text untouched.
pub fn resolve_url(base: &str, reference: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_url_with_port() {
        let (addr, path) = parse_http_url("http://192.0.2.5:8080/ctl").expect("Should parse URL");
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 5), 8080));
        assert_eq!(path, "/ctl");
    }

    #[test]
    fn test_parse_http_url_default_port() {
        let (addr, path) =
            parse_http_url("http://192.0.2.5/desc.xml").expect("Should parse URL");
        assert_eq!(addr.port(), 80);
        assert_eq!(path, "/desc.xml");
    }

    #[test]
    fn test_parse_http_url_keeps_query() {
        let (_, path) =
            parse_http_url("http://192.0.2.5/evt?x=1").expect("Should parse URL");
        assert_eq!(path, "/evt?x=1");
    }

    #[test]
    fn test_parse_http_url_rejects_hostname_and_https() {
        assert!(parse_http_url("http://ap.local/desc.xml").is_none());
        assert!(parse_http_url("https://192.0.2.5/desc.xml").is_none());
        assert!(parse_http_url("not a url").is_none());
    }

    #[test]
    fn test_resolve_url_relative() {
        assert_eq!(
            resolve_url("http://192.0.2.5:80/desc.xml", "/ctl"),
            "http://192.0.2.5/ctl"
        );
        assert_eq!(
            resolve_url("http://192.0.2.5/dev/desc.xml", "evt"),
            "http://192.0.2.5/dev/evt"
        );
    }

    #[test]
    fn test_resolve_url_absolute_reference() {
        assert_eq!(
            resolve_url("http://192.0.2.5/desc.xml", "http://192.0.2.6/ctl"),
            "http://192.0.2.6/ctl"
        );
    }
}
