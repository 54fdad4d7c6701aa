// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WFAWLANConfig SOAP action and GENA request builders.
//!
//! All builders return complete HTTP/1.1 request bytes ready for a client
//! exchange. SOAP bodies are assembled first so `Content-Length` is exact
//! from the start.

use crate::types::MacAddr;
use base64::{engine::general_purpose, Engine as _};
use std::fmt::Write as _;
use std::net::SocketAddrV4;

/// Service URN for every SOAP action the registrar invokes.
pub const URN_WFAWLANCONFIG: &str = "urn:schemas-wifialliance-org:service:WFAWLANConfig:1";

/// `NewWLANEventType` value for EAP frames relayed via `PutWLANResponse`.
pub const WLANEVENT_TYPE_EAP: u8 = 2;

const SOAP_PREFIX: &str = "<?xml version=\"1.0\"?>\n\
     <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
     s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\n\
     <s:Body>\n";
const SOAP_POSTFIX: &str = "</s:Body>\n</s:Envelope>\n";

/// Assemble one action request: envelope around `<NewMessage>` (the
/// base64 WSC payload) plus action-specific children, then the header
/// block with the final body length.
fn soap_action(
    name: &str,
    path: &str,
    dst: SocketAddrV4,
    msg: &[u8],
    extra_children: &str,
) -> Vec<u8> {
    let encoded = general_purpose::STANDARD.encode(msg);

    let mut body = String::with_capacity(SOAP_PREFIX.len() + encoded.len() + 256);
    body.push_str(SOAP_PREFIX);
    let _ = write!(body, "<u:{} xmlns:u=\"{}\">\n", name, URN_WFAWLANCONFIG);
    let _ = write!(body, "<NewMessage>{}</NewMessage>\n", encoded);
    body.push_str(extra_children);
    let _ = write!(body, "</u:{}>\n", name);
    body.push_str(SOAP_POSTFIX);

    let mut req = String::with_capacity(body.len() + 256);
    let _ = write!(
        req,
        "POST {} HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         Content-Type: text/xml; charset=\"utf-8\"\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         SOAPACTION: \"{}#{}\"\r\n\
         \r\n",
        path,
        dst.ip(),
        dst.port(),
        body.len(),
        URN_WFAWLANCONFIG,
        name
    );
    req.push_str(&body);
    req.into_bytes()
}

/// `PutWLANResponse`: relay a registrar-side WSC message back through the
/// AP to the enrollee identified by `mac`.
pub fn put_wlan_response(path: &str, dst: SocketAddrV4, msg: &[u8], mac: MacAddr) -> Vec<u8> {
    let children = format!(
        "<NewWLANEventType>{}</NewWLANEventType>\n\
         <NewWLANEventMAC>{}</NewWLANEventMAC>\n",
        WLANEVENT_TYPE_EAP, mac
    );
    soap_action("PutWLANResponse", path, dst, msg, &children)
}

/// `SetSelectedRegistrar`: announce this ER's selected-registrar state.
pub fn set_selected_registrar(path: &str, dst: SocketAddrV4, msg: &[u8]) -> Vec<u8> {
    soap_action("SetSelectedRegistrar", path, dst, msg, "")
}

/// Initial GENA SUBSCRIBE: event delivery to
/// `http://<callback_ip>:<callback_port>/event/<ap_id>`.
pub fn subscribe(
    path: &str,
    dst: SocketAddrV4,
    callback: SocketAddrV4,
    ap_id: u32,
    period_secs: u64,
) -> Vec<u8> {
    format!(
        "SUBSCRIBE {} HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         CALLBACK: <http://{}:{}/event/{}>\r\n\
         NT: upnp:event\r\n\
         TIMEOUT: Second-{}\r\n\
         Connection: close\r\n\
         \r\n",
        path,
        dst.ip(),
        dst.port(),
        callback.ip(),
        callback.port(),
        ap_id,
        period_secs
    )
    .into_bytes()
}

/// GENA renewal SUBSCRIBE: carries the SID issued by the AP instead of
/// `CALLBACK`/`NT`.
pub fn resubscribe(path: &str, dst: SocketAddrV4, sid: &str, period_secs: u64) -> Vec<u8> {
    format!(
        "SUBSCRIBE {} HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         SID: {}\r\n\
         TIMEOUT: Second-{}\r\n\
         Connection: close\r\n\
         \r\n",
        path,
        dst.ip(),
        dst.port(),
        sid,
        period_secs
    )
    .into_bytes()
}

/// GENA UNSUBSCRIBE for an AP being dropped.
pub fn unsubscribe(path: &str, dst: SocketAddrV4, sid: &str) -> Vec<u8> {
    format!(
        "UNSUBSCRIBE {} HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         SID: {}\r\n\
         Connection: close\r\n\
         \r\n",
        path,
        dst.ip(),
        dst.port(),
        sid
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn dst() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 5), 80)
    }

    fn split_req(raw: &[u8]) -> (String, String) {
        let text = String::from_utf8(raw.to_vec()).expect("Request should be UTF-8");
        let pos = text.find("\r\n\r\n").expect("Should have header/body split");
        (text[..pos + 4].to_string(), text[pos + 4..].to_string())
    }

    #[test]
    fn test_put_wlan_response_structure() {
        let mac = MacAddr::from_bytes([0x02, 0, 0, 0, 0, 1]);
        let raw = put_wlan_response("/ctl", dst(), b"\x10\x4a\x00\x01\x10", mac);
        let (head, body) = split_req(&raw);

        assert!(head.starts_with("POST /ctl HTTP/1.1\r\n"));
        assert!(head.contains("Host: 192.0.2.5:80\r\n"));
        assert!(head.contains("Content-Type: text/xml; charset=\"utf-8\"\r\n"));
        assert!(head.contains(&format!(
            "SOAPACTION: \"{}#PutWLANResponse\"\r\n",
            URN_WFAWLANCONFIG
        )));

        assert!(body.starts_with("<?xml version=\"1.0\"?>\n"));
        assert!(body.contains("<u:PutWLANResponse xmlns:u=\""));
        assert!(body.contains(&format!(
            "<NewMessage>{}</NewMessage>",
            general_purpose::STANDARD.encode(b"\x10\x4a\x00\x01\x10")
        )));
        assert!(body.contains("<NewWLANEventType>2</NewWLANEventType>"));
        assert!(body.contains("<NewWLANEventMAC>02:00:00:00:00:01</NewWLANEventMAC>"));
        assert!(body.ends_with("</s:Body>\n</s:Envelope>\n"));
    }

    #[test]
    fn test_content_length_is_exact() {
        let raw = set_selected_registrar("/ctl", dst(), b"payload");
        let (head, body) = split_req(&raw);

        let len_line = head
            .lines()
            .find(|l| l.starts_with("Content-Length:"))
            .expect("Should have Content-Length");
        let declared: usize = len_line["Content-Length:".len()..]
            .trim()
            .parse()
            .expect("Length should be numeric");
        assert_eq!(declared, body.len());
    }

    #[test]
    fn test_set_selected_registrar_has_no_event_children() {
        let raw = set_selected_registrar("/ctl", dst(), b"x");
        let (_, body) = split_req(&raw);
        assert!(body.contains("<u:SetSelectedRegistrar"));
        assert!(!body.contains("NewWLANEventType"));
        assert!(!body.contains("NewWLANEventMAC"));
    }

    #[test]
    fn test_subscribe_request() {
        let callback = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 10), 49200);
        let raw = subscribe("/evt", dst(), callback, 7, 1800);
        let text = String::from_utf8(raw).expect("Request should be ASCII");

        assert!(text.starts_with("SUBSCRIBE /evt HTTP/1.1\r\n"));
        assert!(text.contains("HOST: 192.0.2.5:80\r\n"));
        assert!(text.contains("CALLBACK: <http://192.0.2.10:49200/event/7>\r\n"));
        assert!(text.contains("NT: upnp:event\r\n"));
        assert!(text.contains("TIMEOUT: Second-1800\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_resubscribe_uses_sid() {
        let raw = resubscribe("/evt", dst(), "uuid:abcd-1234", 1800);
        let text = String::from_utf8(raw).expect("Request should be ASCII");
        assert!(text.contains("SID: uuid:abcd-1234\r\n"));
        assert!(!text.contains("CALLBACK"));
        assert!(!text.contains("NT:"));
    }

    #[test]
    fn test_unsubscribe_format() {
        let raw = unsubscribe("/evt", dst(), "uuid:abcd-1234");
        let text = String::from_utf8(raw).expect("Request should be ASCII");
        assert!(text.starts_with("UNSUBSCRIBE /evt HTTP/1.1\r\n"));
        assert!(text.contains("SID: uuid:abcd-1234\r\n"));
    }
}
