// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Enrollee station sessions and the WSC engine seam.
//!
//! Each AP proxies `WLANEvent` notifications for the enrollees it hears.
//! This module keeps one [`Station`] record per enrollee MAC, applies the
//! probe-request/EAP attribute trust rules, and defines the trait seam to
//! the cryptographic WSC engine (which is not part of this crate).

use crate::types::MacAddr;
use crate::wsc::{self, Attributes};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// WSC op-codes carried in EAP-WSC and over UPnP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WscOpCode {
    Msg,
    Ack,
    Nack,
    Done,
}

/// Outcome of feeding one message into a registrar instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WpsProcessResult {
    /// The exchange continues; a reply may be waiting in `take_reply`.
    Continue,
    /// Registration completed.
    Done,
    /// The exchange failed; the instance is no longer usable.
    Failure,
}

/// One in-progress WSC registration (the `wps_data` equivalent).
///
/// Created per enrollee when its M1 arrives, dropped on failure, idle
/// timeout, or AP teardown. `Send` so the embedding application may run
/// the event loop on a thread of its choosing.
pub trait WpsRegistrar: Send {
    /// Feed one enrollee message into the state machine.
    fn process_msg(&mut self, op_code: WscOpCode, msg: &[u8]) -> WpsProcessResult;

    /// Take the pending outgoing message, if the last `process_msg`
    /// produced one.
    fn take_reply(&mut self) -> Option<(WscOpCode, Vec<u8>)>;
}

/// Factory seam to the surrounding WPS context.
pub trait WpsContext: Send {
    /// Start a registrar-role session for `peer_addr`.
    ///
    /// `None` means the context refuses the session (no credentials
    /// configured, enrollee not authorized); the ER abandons the station
    /// session without responding.
    fn start_registrar(&mut self, peer_addr: MacAddr) -> Option<Box<dyn WpsRegistrar>>;
}

/// A [`WpsContext`] that declines every session.
///
/// Useful for running the ER as a pure observer: APs are discovered and
/// subscribed, stations are tracked from their probe requests and M1s,
/// but no registration exchange is ever started.
pub struct DeclineAll;

impl WpsContext for DeclineAll {
    fn start_registrar(&mut self, peer_addr: MacAddr) -> Option<Box<dyn WpsRegistrar>> {
        log::debug!("[sta] declining registration attempt from {}", peer_addr);
        None
    }
}

/// Single-slot gate for the one outbound HTTP exchange an owner may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpSlot {
    #[default]
    Idle,
    InFlight {
        exchange: u64,
    },
}

impl HttpSlot {
    pub fn is_idle(&self) -> bool {
        matches!(self, HttpSlot::Idle)
    }
}

/// Per-enrollee session state under one AP.
pub struct Station {
    pub addr: MacAddr,
    pub config_methods: u16,
    pub uuid: [u8; wsc::WPS_UUID_LEN],
    pub pri_dev_type: [u8; wsc::WPS_DEV_TYPE_LEN],
    pub dev_passwd_id: u16,
    /// Set once an EAP (non-probe) message is seen; never cleared. After
    /// that, probe-request data is untrusted and no longer applied.
    pub m1_received: bool,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub dev_name: Option<String>,
    /// Live WSC exchange, if an M1 started one.
    pub registrar: Option<Box<dyn WpsRegistrar>>,
    pub slot: HttpSlot,
    /// Replies waiting for the slot; bounded by the owner.
    pub reply_queue: VecDeque<Vec<u8>>,
    pub expires_at: Instant,
}

impl Station {
    pub fn new(addr: MacAddr, now: Instant, idle_timeout: Duration) -> Self {
        Self {
            addr,
            config_methods: 0,
            uuid: [0; wsc::WPS_UUID_LEN],
            pri_dev_type: [0; wsc::WPS_DEV_TYPE_LEN],
            dev_passwd_id: 0,
            m1_received: false,
            manufacturer: None,
            model_name: None,
            model_number: None,
            serial_number: None,
            dev_name: None,
            registrar: None,
            slot: HttpSlot::Idle,
            reply_queue: VecDeque::new(),
            expires_at: now + idle_timeout,
        }
    }

    /// Apply attributes observed in a WLANEvent and re-arm the idle timer.
    ///
    /// Probe-request data is advisory: once `m1_received` is set, only
    /// EAP-sourced updates may touch the fields.
    pub fn apply_attributes(
        &mut self,
        attrs: &Attributes,
        is_probe: bool,
        now: Instant,
        idle_timeout: Duration,
    ) {
        if !is_probe {
            self.m1_received = true;
        }
        let trusted = !is_probe || !self.m1_received;

        if trusted {
            if let Some(methods) = attrs.config_methods {
                self.config_methods = methods;
            }
            if let Some(uuid) = attrs.uuid_e {
                self.uuid = uuid;
            }
            if let Some(dev_type) = attrs.primary_dev_type {
                self.pri_dev_type = dev_type;
            }
            if let Some(id) = attrs.dev_password_id {
                self.dev_passwd_id = id;
            }
            if let Some(v) = &attrs.manufacturer {
                self.manufacturer = Some(v.clone());
            }
            if let Some(v) = &attrs.model_name {
                self.model_name = Some(v.clone());
            }
            if let Some(v) = &attrs.model_number {
                self.model_number = Some(v.clone());
            }
            if let Some(v) = &attrs.serial_number {
                self.serial_number = Some(v.clone());
            }
            if let Some(v) = &attrs.dev_name {
                self.dev_name = Some(v.clone());
            }
        }

        self.expires_at = now + idle_timeout;
    }
}

/// WLANEvent types defined by the WFAWLANConfig service.
pub const WLANEVENT_PROBE_REQ: u8 = 1;
pub const WLANEVENT_EAP: u8 = 2;

/// Decoded `WLANEvent` binary payload.
///
/// Framing after base64: one type byte, 17 bytes of ASCII MAC, then the
/// WSC TLV stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WlanEvent {
    pub event_type: u8,
    pub mac: MacAddr,
    pub payload: Vec<u8>,
}

/// Parse the binary WLANEvent framing. Short buffers and bad MACs drop.
pub fn parse_wlanevent(data: &[u8]) -> Option<WlanEvent> {
    if data.len() < 1 + 17 {
        log::debug!("[sta] WLANEvent too short ({} bytes)", data.len());
        return None;
    }
    let event_type = data[0];
    let mac_text = std::str::from_utf8(&data[1..18]).ok()?;
    let Some(mac) = MacAddr::parse(mac_text) else {
        log::debug!("[sta] invalid WLANEventMAC '{}'", mac_text);
        return None;
    };
    Some(WlanEvent {
        event_type,
        mac,
        payload: data[18..].to_vec(),
    })
}

/// Map an EAP message's WSC Message Type to the engine op-code.
///
/// Ordinary messages (M1..M8) and messages without a type attribute feed
/// in as `Msg`.
pub fn op_code_for(msg_type: Option<u8>) -> WscOpCode {
    match msg_type {
        Some(wsc::WPS_WSC_ACK) => WscOpCode::Ack,
        Some(wsc::WPS_WSC_NACK) => WscOpCode::Nack,
        Some(wsc::WPS_WSC_DONE) => WscOpCode::Done,
        _ => WscOpCode::Msg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sta(now: Instant) -> Station {
        Station::new(
            MacAddr::from_bytes([2, 0, 0, 0, 0, 1]),
            now,
            Duration::from_secs(300),
        )
    }

    fn probe_attrs(dev_name: &str) -> Attributes {
        Attributes {
            dev_name: Some(dev_name.to_string()),
            config_methods: Some(0x0080),
            ..Attributes::default()
        }
    }

    #[test]
    fn test_probe_applies_before_m1() {
        let now = Instant::now();
        let mut s = sta(now);
        s.apply_attributes(&probe_attrs("Foo"), true, now, Duration::from_secs(300));
        assert_eq!(s.dev_name.as_deref(), Some("Foo"));
        assert_eq!(s.config_methods, 0x0080);
        assert!(!s.m1_received);
    }

    #[test]
    fn test_eap_sets_m1_received_and_applies() {
        let now = Instant::now();
        let mut s = sta(now);
        s.apply_attributes(&probe_attrs("Foo"), false, now, Duration::from_secs(300));
        assert!(s.m1_received);
        assert_eq!(s.dev_name.as_deref(), Some("Foo"));
    }

    #[test]
    fn test_probe_cannot_overwrite_after_m1() {
        let now = Instant::now();
        let mut s = sta(now);
        s.apply_attributes(&probe_attrs("FromEap"), false, now, Duration::from_secs(300));
        s.apply_attributes(&probe_attrs("FromProbe"), true, now, Duration::from_secs(300));
        assert_eq!(s.dev_name.as_deref(), Some("FromEap"));
        assert!(s.m1_received);
    }

    #[test]
    fn test_m1_received_is_monotonic() {
        let now = Instant::now();
        let mut s = sta(now);
        s.apply_attributes(&probe_attrs("a"), false, now, Duration::from_secs(300));
        assert!(s.m1_received);
        s.apply_attributes(&probe_attrs("b"), true, now, Duration::from_secs(300));
        assert!(s.m1_received);
    }

    #[test]
    fn test_apply_rearms_idle_timer() {
        let start = Instant::now();
        let mut s = sta(start);
        let first_deadline = s.expires_at;
        let later = start + Duration::from_secs(100);
        s.apply_attributes(&Attributes::default(), true, later, Duration::from_secs(300));
        assert_eq!(s.expires_at, later + Duration::from_secs(300));
        assert!(s.expires_at > first_deadline);
    }

    #[test]
    fn test_parse_wlanevent_probe() {
        let mut data = vec![WLANEVENT_PROBE_REQ];
        data.extend_from_slice(b"02:00:00:00:00:01");
        data.extend_from_slice(&[0x10, 0x11, 0x00, 0x01, b'F']);

        let event = parse_wlanevent(&data).expect("Should parse WLANEvent");
        assert_eq!(event.event_type, WLANEVENT_PROBE_REQ);
        assert_eq!(event.mac, MacAddr::from_bytes([2, 0, 0, 0, 0, 1]));
        assert_eq!(event.payload, &[0x10, 0x11, 0x00, 0x01, b'F']);
    }

    #[test]
    fn test_parse_wlanevent_empty_payload_ok() {
        let mut data = vec![WLANEVENT_EAP];
        data.extend_from_slice(b"aa:bb:cc:dd:ee:ff");
        let event = parse_wlanevent(&data).expect("18 bytes is the minimum");
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_parse_wlanevent_too_short() {
        assert!(parse_wlanevent(&[]).is_none());
        assert!(parse_wlanevent(&[2]).is_none());
        let mut data = vec![WLANEVENT_EAP];
        data.extend_from_slice(b"aa:bb:cc:dd:ee:f"); // 16 MAC chars
        assert!(parse_wlanevent(&data).is_none());
    }

    #[test]
    fn test_parse_wlanevent_bad_mac() {
        let mut data = vec![WLANEVENT_EAP];
        data.extend_from_slice(b"zz:bb:cc:dd:ee:ff");
        data.push(0);
        assert!(parse_wlanevent(&data).is_none());
    }

    #[test]
    fn test_op_code_mapping() {
        assert_eq!(op_code_for(Some(wsc::WPS_WSC_ACK)), WscOpCode::Ack);
        assert_eq!(op_code_for(Some(wsc::WPS_WSC_NACK)), WscOpCode::Nack);
        assert_eq!(op_code_for(Some(wsc::WPS_WSC_DONE)), WscOpCode::Done);
        assert_eq!(op_code_for(Some(wsc::WPS_M3)), WscOpCode::Msg);
        assert_eq!(op_code_for(None), WscOpCode::Msg);
    }

    #[test]
    fn test_decline_all_refuses() {
        let mut ctx = DeclineAll;
        assert!(ctx
            .start_registrar(MacAddr::from_bytes([2, 0, 0, 0, 0, 1]))
            .is_none());
    }
}
