// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP/1.1 message framing: incremental parse and response build.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Case-insensitive header multimap preserving arrival order.
#[derive(Debug, Default, Clone)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// First value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Content-Length` as a number, if present and well-formed.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.trim().parse().ok()
    }

    /// Append a header (names are matched case-insensitively on read).
    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }
}

/// Parsed inbound request (server side).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Parsed inbound response (client side).
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Result of attempting to frame a message out of a growing buffer.
#[derive(Debug)]
pub enum ParseStatus<T> {
    /// A full message; the connection can be answered/closed.
    Complete(T),
    /// More bytes needed.
    Partial,
    /// The peer is not speaking parseable HTTP.
    Invalid,
}

fn split_head(buf: &[u8]) -> Option<(usize, usize)> {
    // Returns (header block end, body start) around the blank line.
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| (pos, pos + 4))
}

fn parse_headers(block: &str) -> Option<(String, Headers)> {
    let mut lines = block.split("\r\n");
    let start_line = lines.next()?.to_string();
    let mut headers = Headers::default();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        headers.insert(name.trim(), value.trim());
    }
    Some((start_line, headers))
}

/// Incrementally parse a request.
///
/// A request is complete once the header block and `Content-Length` bytes
/// of body have arrived (no `Content-Length` means no body).
pub fn parse_request(buf: &[u8]) -> ParseStatus<Request> {
    let Some((head_end, body_start)) = split_head(buf) else {
        return ParseStatus::Partial;
    };
    let Ok(head) = std::str::from_utf8(&buf[..head_end]) else {
        return ParseStatus::Invalid;
    };
    let Some((start_line, headers)) = parse_headers(head) else {
        return ParseStatus::Invalid;
    };

    let mut parts = start_line.split(' ');
    let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return ParseStatus::Invalid;
    };
    if !version.starts_with("HTTP/") {
        return ParseStatus::Invalid;
    }

    let body_len = headers.content_length().unwrap_or(0);
    if buf.len() - body_start < body_len {
        return ParseStatus::Partial;
    }

    ParseStatus::Complete(Request {
        method: method.to_string(),
        uri: uri.to_string(),
        headers,
        body: buf[body_start..body_start + body_len].to_vec(),
    })
}

/// Incrementally parse a response.
///
/// With a `Content-Length` the response completes as soon as the body has
/// arrived; without one it completes at connection close (`eof`), taking
/// everything after the header block as body.
pub fn parse_response(buf: &[u8], eof: bool) -> ParseStatus<Response> {
    let Some((head_end, body_start)) = split_head(buf) else {
        return if eof { ParseStatus::Invalid } else { ParseStatus::Partial };
    };
    let Ok(head) = std::str::from_utf8(&buf[..head_end]) else {
        return ParseStatus::Invalid;
    };
    let Some((start_line, headers)) = parse_headers(head) else {
        return ParseStatus::Invalid;
    };

    // "HTTP/1.1 200 OK"
    let mut parts = start_line.split(' ');
    let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
        return ParseStatus::Invalid;
    };
    if !version.starts_with("HTTP/") {
        return ParseStatus::Invalid;
    }
    let Ok(status) = code.parse::<u16>() else {
        return ParseStatus::Invalid;
    };

    let body = match headers.content_length() {
        Some(len) => {
            if buf.len() - body_start < len {
                return if eof { ParseStatus::Invalid } else { ParseStatus::Partial };
            }
            buf[body_start..body_start + len].to_vec()
        }
        None => {
            if !eof {
                return ParseStatus::Partial;
            }
            buf[body_start..].to_vec()
        }
    };

    ParseStatus::Complete(Response {
        status,
        headers,
        body,
    })
}

/// Build a bodyless response with the UPnP boilerplate headers every
/// reply carries: `Server`, `Connection: close`, a synthesized `Date`,
/// and `Content-Length: 0`.
pub fn build_response(status: u16, reason: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Server: unspecified, UPnP/1.0, unspecified\r\n\
         Connection: close\r\n\
         Content-Length: 0\r\n\
         Date: {}\r\n\
         \r\n",
        status,
        reason,
        http_date(SystemTime::now())
    )
    .into_bytes()
}

/// Build a plain GET with `Connection: close`.
pub fn build_get(host: &str, port: u16, path: &str) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        path, host, port
    )
    .into_bytes()
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Format a timestamp as an RFC 1123 `Date:` value
/// (e.g. `Sat, 01 Aug 2026 12:00:00 GMT`).
pub fn http_date(t: SystemTime) -> String {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();

    let days = (secs / 86_400) as i64;
    let tod = secs % 86_400;
    let (hour, min, sec) = (tod / 3600, (tod % 3600) / 60, tod % 60);
    // 1970-01-01 was a Thursday
    let weekday = ((days + 4) % 7) as usize;

    // Civil-from-days (Gregorian), era-based
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        DAY_NAMES[weekday],
        day,
        MONTH_NAMES[(month - 1) as usize],
        year,
        hour,
        min,
        sec
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_with_body() {
        let raw = b"NOTIFY /event/1 HTTP/1.1\r\n\
                    Host: 192.0.2.1:8000\r\n\
                    Content-Length: 5\r\n\
                    \r\n\
                    hello";
        match parse_request(raw) {
            ParseStatus::Complete(req) => {
                assert_eq!(req.method, "NOTIFY");
                assert_eq!(req.uri, "/event/1");
                assert_eq!(req.headers.get("host"), Some("192.0.2.1:8000"));
                assert_eq!(req.body, b"hello");
            }
            other => panic!("Expected complete request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_request_partial_body() {
        let raw = b"NOTIFY /event/1 HTTP/1.1\r\nContent-Length: 10\r\n\r\nhel";
        assert!(matches!(parse_request(raw), ParseStatus::Partial));
    }

    #[test]
    fn test_parse_request_partial_headers() {
        let raw = b"NOTIFY /event/1 HTTP/1.1\r\nContent-Le";
        assert!(matches!(parse_request(raw), ParseStatus::Partial));
    }

    #[test]
    fn test_parse_request_no_body() {
        let raw = b"GET /desc.xml HTTP/1.1\r\nHost: x\r\n\r\n";
        match parse_request(raw) {
            ParseStatus::Complete(req) => {
                assert_eq!(req.method, "GET");
                assert!(req.body.is_empty());
            }
            other => panic!("Expected complete request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_request_invalid_start_line() {
        let raw = b"NOT-HTTP\r\n\r\n";
        assert!(matches!(parse_request(raw), ParseStatus::Invalid));
    }

    #[test]
    fn test_parse_response_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody";
        match parse_response(raw, false) {
            ParseStatus::Complete(resp) => {
                assert_eq!(resp.status, 200);
                assert_eq!(resp.body, b"body");
            }
            other => panic!("Expected complete response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_read_to_eof() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\n<root/>";
        assert!(matches!(parse_response(raw, false), ParseStatus::Partial));
        match parse_response(raw, true) {
            ParseStatus::Complete(resp) => assert_eq!(resp.body, b"<root/>"),
            other => panic!("Expected complete response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_truncated_at_eof_invalid() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort";
        assert!(matches!(parse_response(raw, true), ParseStatus::Invalid));
    }

    #[test]
    fn test_parse_response_status_codes() {
        let raw = b"HTTP/1.1 412 Precondition Failed\r\n\r\n";
        match parse_response(raw, true) {
            ParseStatus::Complete(resp) => assert_eq!(resp.status, 412),
            other => panic!("Expected complete response, got {:?}", other),
        }
    }

    #[test]
    fn test_headers_case_insensitive() {
        let raw = b"HTTP/1.1 200 OK\r\nSID: uuid:abcd\r\nCONTENT-LENGTH: 0\r\n\r\n";
        match parse_response(raw, false) {
            ParseStatus::Complete(resp) => {
                assert_eq!(resp.headers.get("sid"), Some("uuid:abcd"));
                assert_eq!(resp.headers.content_length(), Some(0));
            }
            other => panic!("Expected complete response, got {:?}", other),
        }
    }

    #[test]
    fn test_build_response_boilerplate() {
        let raw = build_response(404, "Not Found");
        let text = String::from_utf8(raw).expect("Response should be ASCII");
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.contains("Date: "));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_http_date_epoch() {
        assert_eq!(http_date(UNIX_EPOCH), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_http_date_known_values() {
        // 2009-02-13 23:31:30 UTC
        let t = UNIX_EPOCH + Duration::from_secs(1_234_567_890);
        assert_eq!(http_date(t), "Fri, 13 Feb 2009 23:31:30 GMT");

        // Leap-year day: 2020-02-29 12:00:00 UTC
        let t = UNIX_EPOCH + Duration::from_secs(1_582_977_600);
        assert_eq!(http_date(t), "Sat, 29 Feb 2020 12:00:00 GMT");
    }

    #[test]
    fn test_build_get_format() {
        let raw = build_get("192.0.2.5", 80, "/desc.xml");
        let text = String::from_utf8(raw).expect("Request should be ASCII");
        assert!(text.starts_with("GET /desc.xml HTTP/1.1\r\n"));
        assert!(text.contains("Host: 192.0.2.5:80\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
