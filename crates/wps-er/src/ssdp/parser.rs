// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SSDP datagram classification.
//!
//! Datagrams are CRLF-delimited HTTP-style header blocks. Parsing is pure
//! and side-effect free so the filter rules are unit-testable without
//! sockets.

use super::{WFA_DEVICE_URN, WFA_SERVICE_URN};

/// Which socket produced the datagram; decides the accepted start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdpOrigin {
    /// Multicast-sender socket: only `HTTP/1.1 200 OK` M-SEARCH replies.
    MulticastReply,
    /// Port-1900 listener: only `NOTIFY` advertisements.
    Listener,
}

/// Outcome of classifying one WFA-scoped SSDP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpMessage {
    /// Advertisement or reply announcing a live device description.
    Alive { location: String, max_age: u64 },
    /// `NTS: ssdp:byebye` — the device is leaving the network.
    ByeBye,
}

/// Classify a datagram.
///
/// Returns `None` for everything that must be dropped: wrong start line
/// for the origin, no WFA device/service URN in any header, missing
/// `LOCATION`, or a missing/non-positive `max-age`.
pub fn parse_packet(origin: SsdpOrigin, data: &[u8]) -> Option<SsdpMessage> {
    let text = std::str::from_utf8(data).ok()?;

    let mut lines = text.split('\n').map(|l| l.trim_end_matches('\r'));
    let start_line = lines.next()?;
    match origin {
        SsdpOrigin::MulticastReply => {
            if !start_line.starts_with("HTTP/1.1 200 OK") {
                return None;
            }
        }
        SsdpOrigin::Listener => {
            if !start_line.starts_with("NOTIFY ") {
                return None;
            }
        }
    }

    let mut wfa = false;
    let mut byebye = false;
    let mut location: Option<&str> = None;
    let mut max_age: Option<u64> = None;

    for line in lines {
        if line.contains(WFA_DEVICE_URN) || line.contains(WFA_SERVICE_URN) {
            wfa = true;
        }
        if let Some(value) = header_value(line, "LOCATION") {
            location = Some(value);
        } else if let Some(value) = header_value(line, "NTS") {
            if value.contains("ssdp:byebye") {
                byebye = true;
            }
        } else if let Some(value) = header_value(line, "CACHE-CONTROL") {
            if let Some(age) = parse_max_age(value) {
                max_age = Some(age);
            }
        }
    }

    if !wfa {
        return None; // Not a WPS advertisement/reply
    }
    if byebye {
        return Some(SsdpMessage::ByeBye);
    }
    let location = location?.to_string();
    match max_age {
        Some(age) if age >= 1 => Some(SsdpMessage::Alive { location, max_age: age }),
        _ => None, // No usable max-age reported
    }
}

/// Case-insensitive `NAME:` header match; returns the trimmed value.
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    if line.len() <= name.len() || !line.is_char_boundary(name.len()) {
        return None;
    }
    let (head, tail) = line.split_at(name.len());
    if !head.eq_ignore_ascii_case(name) || !tail.starts_with(':') {
        return None;
    }
    Some(tail[1..].trim_start_matches(' '))
}

/// Extract the decimal `N` from a `max-age=N` directive.
fn parse_max_age(value: &str) -> Option<u64> {
    let idx = value.find("max-age=")?;
    let digits: &str = &value[idx + "max-age=".len()..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}
