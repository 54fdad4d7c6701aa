// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol core of the External Registrar.
//!
//! `ErCore` is the single-threaded state machine behind the event loop:
//! it consumes SSDP datagrams, HTTP exchange completions, NOTIFY requests
//! and deadline sweeps, and emits [`Action`]s (M-SEARCH probes, outbound
//! HTTP exchanges, aborts) for the I/O layer to execute. Keeping it free
//! of sockets makes the whole discovery/onboarding/session flow testable
//! by injection.
//!
//! Completion routing uses typed owner handles (`ApId`, `ApId` + MAC)
//! instead of references; a completion whose owner has since been removed
//! is a logged no-op, never a dangling pointer.

use crate::config::ErConfig;
use crate::discovery::{AddOutcome, ApId, ApRegistry};
use crate::http::message::{build_get, build_response, Request, Response};
use crate::http::ClientEvent;
use crate::registrar::{
    op_code_for, parse_wlanevent, HttpSlot, Station, WlanEvent, WpsContext, WpsProcessResult,
    WscOpCode, WLANEVENT_EAP, WLANEVENT_PROBE_REQ,
};
use crate::ssdp::{parse_packet, SsdpMessage, SsdpOrigin};
use crate::types::MacAddr;
use crate::upnp::{extract_wlanevent, parse_device_description, parse_http_url, soap};
use crate::wsc;
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

/// Identifier of one outbound HTTP exchange.
pub type ExchangeId = u64;

/// Who an exchange belongs to; decides slot release and completion
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOwner {
    Ap(ApId),
    Sta(ApId, MacAddr),
    /// Fire-and-forget work that outlives its AP (UNSUBSCRIBE).
    Detached,
}

/// What an exchange is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    DeviceDescription,
    Subscribe,
    Resubscribe,
    Unsubscribe,
    PutWlanResponse,
    SetSelectedRegistrar,
}

/// A fully built outbound HTTP exchange for the I/O layer to run.
#[derive(Debug)]
pub struct HttpCall {
    pub id: ExchangeId,
    pub dst: SocketAddrV4,
    pub request: Vec<u8>,
    pub timeout: Duration,
}

/// Work the core asks the I/O layer to perform.
#[derive(Debug)]
pub enum Action {
    /// Send one M-SEARCH probe on the multicast socket.
    SendMsearch,
    /// Start an outbound HTTP exchange.
    StartHttp(HttpCall),
    /// Abort an in-flight exchange without reporting completion.
    AbortHttp(ExchangeId),
}

/// Deferred renewal retry when the AP slot is busy at renew time.
const RENEW_RETRY: Duration = Duration::from_secs(10);

/// The protocol state machine.
pub struct ErCore {
    config: ErConfig,
    local_ip: Ipv4Addr,
    http_port: u16,
    wps: Box<dyn WpsContext>,
    registry: ApRegistry,
    pending: HashMap<ExchangeId, (ExchangeOwner, ExchangeKind)>,
    next_exchange_id: ExchangeId,
    actions: VecDeque<Action>,
    next_msearch_at: Option<Instant>,
    /// Last announced selected-registrar payload; replayed to APs that
    /// finish onboarding after the announcement.
    sel_reg_msg: Option<Vec<u8>>,
}

impl ErCore {
    /// Create the core and queue the initial M-SEARCH.
    ///
    /// `http_port` is patched in via [`ErCore::set_http_port`] once the
    /// event server is bound.
    pub fn new(config: ErConfig, local_ip: Ipv4Addr, wps: Box<dyn WpsContext>, now: Instant) -> Self {
        let mut actions = VecDeque::new();
        actions.push_back(Action::SendMsearch);
        let next_msearch_at = match config.msearch_interval_secs {
            0 => None,
            secs => Some(now + Duration::from_secs(secs)),
        };
        Self {
            config,
            local_ip,
            http_port: 0,
            wps,
            registry: ApRegistry::new(),
            pending: HashMap::new(),
            next_exchange_id: 0,
            actions,
            next_msearch_at,
            sel_reg_msg: None,
        }
    }

    /// Record the bound event-server port used in SUBSCRIBE callbacks.
    pub fn set_http_port(&mut self, port: u16) {
        self.http_port = port;
    }

    /// Drain queued I/O work.
    pub fn take_actions(&mut self) -> Vec<Action> {
        self.actions.drain(..).collect()
    }

    /// Registry view (tests and status reporting).
    pub fn registry(&self) -> &ApRegistry {
        &self.registry
    }

    /// Earliest core-owned deadline: AP leases, station idle timers,
    /// subscription renewals, periodic M-SEARCH.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.registry.next_deadline(), self.next_msearch_at]
            .into_iter()
            .flatten()
            .min()
    }

    // ==================== SSDP input ====================

    /// Feed one SSDP datagram.
    pub fn handle_ssdp(&mut self, origin: SsdpOrigin, src: Ipv4Addr, data: &[u8], now: Instant) {
        log::debug!("[ssdp] received {} bytes from {}", data.len(), src);
        let Some(msg) = parse_packet(origin, data) else {
            return;
        };
        match msg {
            SsdpMessage::ByeBye => {
                log::debug!("[ssdp] byebye from {}", src);
                self.remove_ap_by_addr(src);
            }
            SsdpMessage::Alive { location, max_age } => {
                log::debug!(
                    "[ssdp] AP discovered: {} (source {} max-age {})",
                    location,
                    src,
                    max_age
                );
                let outcome = self.registry.add(
                    src,
                    &location,
                    Duration::from_secs(max_age),
                    now,
                );
                if let AddOutcome::Added(id) = outcome {
                    self.start_description_fetch(id);
                }
            }
        }
    }

    // ==================== Onboarding sequence ====================

    fn start_description_fetch(&mut self, ap_id: ApId) {
        let Some(ap) = self.registry.get(ap_id) else {
            return;
        };
        let Some((dst, path)) = parse_http_url(&ap.location) else {
            log::debug!("[ap] unusable location URL '{}'", ap.location);
            return;
        };
        let request = build_get(&dst.ip().to_string(), dst.port(), &path);
        let timeout = Duration::from_millis(self.config.desc_fetch_timeout_ms);
        self.submit(
            ExchangeOwner::Ap(ap_id),
            ExchangeKind::DeviceDescription,
            dst,
            request,
            timeout,
        );
    }

    fn start_subscribe(&mut self, ap_id: ApId) {
        let Some(ap) = self.registry.get(ap_id) else {
            return;
        };
        let Some(event_url) = ap.device.event_sub_url.clone() else {
            log::debug!("[ap] {} has no eventSubURL - cannot subscribe", ap_id);
            return;
        };
        if !ap.slot.is_idle() {
            log::debug!("[ap] {} has a pending HTTP request - cannot subscribe", ap_id);
            return;
        }
        let Some((dst, path)) = parse_http_url(&event_url) else {
            log::debug!("[ap] {} unusable eventSubURL '{}'", ap_id, event_url);
            return;
        };
        let callback = SocketAddrV4::new(self.local_ip, self.http_port);
        let request = soap::subscribe(
            &path,
            dst,
            callback,
            ap_id,
            self.config.subscribe_period_secs,
        );
        let timeout = Duration::from_millis(self.config.subscribe_timeout_ms);
        self.submit(
            ExchangeOwner::Ap(ap_id),
            ExchangeKind::Subscribe,
            dst,
            request,
            timeout,
        );
    }

    fn start_resubscribe(&mut self, ap_id: ApId) {
        let Some(ap) = self.registry.get(ap_id) else {
            return;
        };
        let (Some(event_url), Some(sid)) = (ap.device.event_sub_url.clone(), ap.sid.clone())
        else {
            return;
        };
        let Some((dst, path)) = parse_http_url(&event_url) else {
            return;
        };
        let request = soap::resubscribe(&path, dst, &sid, self.config.subscribe_period_secs);
        let timeout = Duration::from_millis(self.config.subscribe_timeout_ms);
        self.submit(
            ExchangeOwner::Ap(ap_id),
            ExchangeKind::Resubscribe,
            dst,
            request,
            timeout,
        );
    }

    // ==================== HTTP completions ====================

    /// Feed the terminal outcome of an outbound exchange.
    pub fn handle_http_event(&mut self, id: ExchangeId, event: ClientEvent, now: Instant) {
        let Some((owner, kind)) = self.pending.remove(&id) else {
            log::debug!("[http] completion for unknown exchange {}", id);
            return;
        };
        match owner {
            ExchangeOwner::Ap(ap_id) => self.on_ap_exchange(ap_id, id, kind, event, now),
            ExchangeOwner::Sta(ap_id, mac) => self.on_sta_exchange(ap_id, mac, id, event, now),
            ExchangeOwner::Detached => match event {
                ClientEvent::Ok(_) => log::debug!("[ap] UNSUBSCRIBE done"),
                _ => log::debug!("[ap] UNSUBSCRIBE failed"),
            },
        }
    }

    fn on_ap_exchange(
        &mut self,
        ap_id: ApId,
        id: ExchangeId,
        kind: ExchangeKind,
        event: ClientEvent,
        now: Instant,
    ) {
        {
            let Some(ap) = self.registry.get_mut(ap_id) else {
                log::debug!("[ap] completion for removed AP {}", ap_id);
                return;
            };
            if ap.slot == (HttpSlot::InFlight { exchange: id }) {
                ap.slot = HttpSlot::Idle;
            }
        }

        match kind {
            ExchangeKind::DeviceDescription => self.on_description_reply(ap_id, event),
            ExchangeKind::Subscribe | ExchangeKind::Resubscribe => {
                self.on_subscribe_reply(ap_id, kind, event, now)
            }
            ExchangeKind::SetSelectedRegistrar => match ok_status(&event) {
                Some(200) => log::debug!("[soap] SetSelectedRegistrar OK (AP {})", ap_id),
                Some(status) => {
                    log::debug!("[soap] SetSelectedRegistrar HTTP {} (AP {})", status, ap_id)
                }
                None => log::debug!("[soap] SetSelectedRegistrar failed (AP {})", ap_id),
            },
            ExchangeKind::Unsubscribe | ExchangeKind::PutWlanResponse => {
                log::debug!("[ap] unexpected exchange kind {:?} for AP {}", kind, ap_id);
            }
        }
    }

    fn on_description_reply(&mut self, ap_id: ApId, event: ClientEvent) {
        let body = match event {
            ClientEvent::Ok(resp) if resp.status == 200 => resp.body,
            _ => {
                log::debug!("[ap] failed to fetch device info for AP {}", ap_id);
                return;
            }
        };
        let Some(ap) = self.registry.get_mut(ap_id) else {
            return;
        };
        let Some(desc) = parse_device_description(&body, &ap.location) else {
            log::debug!("[ap] unparseable device description from AP {}", ap_id);
            return;
        };
        log::debug!(
            "[ap] {} description: friendlyName={:?} manufacturer={:?} modelName={:?}",
            ap_id,
            desc.friendly_name,
            desc.manufacturer,
            desc.model_name
        );
        ap.device = desc;
        self.start_subscribe(ap_id);
    }

    fn on_subscribe_reply(
        &mut self,
        ap_id: ApId,
        kind: ExchangeKind,
        event: ClientEvent,
        now: Instant,
    ) {
        let renew_delay = self.config.renew_delay();
        let mut retry_fresh = false;
        let mut subscribed_ok = false;
        {
            let Some(ap) = self.registry.get_mut(ap_id) else {
                return;
            };
            match event {
                ClientEvent::Ok(resp) if resp.status == 200 => {
                    ap.subscribed = true;
                    if let Some(sid) = resp.headers.get("sid") {
                        ap.sid = Some(sid.to_string());
                    }
                    // Renewal needs a SID to present; without one the
                    // subscription simply lapses after its period.
                    ap.renew_at = ap.sid.as_ref().map(|_| now + renew_delay);
                    subscribed_ok = true;
                    log::debug!("[ap] {} subscribed to events (sid={:?})", ap_id, ap.sid);
                }
                _ => {
                    log::debug!("[ap] {} failed to subscribe to events", ap_id);
                    ap.subscribed = false;
                    ap.sid = None;
                    ap.renew_at = None;
                    // The AP may have discarded the SID (GENA 412); fall
                    // back to a fresh subscription.
                    retry_fresh = kind == ExchangeKind::Resubscribe;
                }
            }
        }
        if retry_fresh {
            self.start_subscribe(ap_id);
        } else if subscribed_ok && kind == ExchangeKind::Subscribe {
            // An AP that came up after the last selected-registrar
            // announcement still needs to hear it.
            if let Some(msg) = self.sel_reg_msg.clone() {
                self.send_sel_reg(ap_id, &msg);
            }
        }
    }

    fn on_sta_exchange(
        &mut self,
        ap_id: ApId,
        mac: MacAddr,
        id: ExchangeId,
        event: ClientEvent,
        now: Instant,
    ) {
        let next = {
            let Some(sta) = self
                .registry
                .get_mut(ap_id)
                .and_then(|ap| ap.stations.get_mut(&mac))
            else {
                log::debug!("[sta] completion for removed station {}", mac);
                return;
            };
            if sta.slot == (HttpSlot::InFlight { exchange: id }) {
                sta.slot = HttpSlot::Idle;
            }
            match ok_status(&event) {
                Some(200) => log::debug!("[soap] PutWLANResponse OK ({})", mac),
                Some(status) => log::debug!("[soap] PutWLANResponse HTTP {} ({})", status, mac),
                None => log::debug!("[soap] PutWLANResponse failed ({})", mac),
            }
            sta.reply_queue.pop_front()
        };
        if let Some(msg) = next {
            self.send_sta_reply(ap_id, mac, msg, now);
        }
    }

    // ==================== Event endpoint ====================

    /// Handle one request received by the embedded HTTP server and return
    /// the response bytes.
    pub fn handle_http_request(&mut self, req: &Request, now: Instant) -> Vec<u8> {
        log::debug!("[http] request '{} {}'", req.method, req.uri);
        if req.method != "NOTIFY" {
            log::debug!("[http] unsupported request type '{}'", req.method);
            return build_response(501, "Unimplemented");
        }
        let ap_id = req
            .uri
            .strip_prefix("/event/")
            .and_then(|rest| rest.parse::<ApId>().ok());
        let Some(ap_id) = ap_id else {
            log::debug!("[http] unknown NOTIFY URI '{}'", req.uri);
            return build_response(404, "Not Found");
        };
        if self.registry.get(ap_id).is_none() {
            log::debug!("[http] event from unknown AP id {}", ap_id);
            return build_response(404, "Not Found");
        }

        match extract_wlanevent(&req.body) {
            Some(event) => self.process_wlanevent(ap_id, &event, now),
            // Reply OK anyway so the AP does not unsubscribe us.
            None => log::debug!("[http] could not extract WLANEvent from notification"),
        }
        build_response(200, "OK")
    }

    fn process_wlanevent(&mut self, ap_id: ApId, data: &[u8], now: Instant) {
        let Some(WlanEvent {
            event_type,
            mac,
            payload,
        }) = parse_wlanevent(data)
        else {
            return;
        };
        match event_type {
            WLANEVENT_PROBE_REQ => self.process_probe_req(ap_id, mac, &payload, now),
            WLANEVENT_EAP => self.process_eap(ap_id, mac, &payload, now),
            other => log::debug!("[sta] unknown WLANEventType {}", other),
        }
    }

    fn process_probe_req(&mut self, ap_id: ApId, mac: MacAddr, payload: &[u8], now: Instant) {
        log::debug!("[sta] WLANEvent probe request from {}", mac);
        let Ok(attrs) = wsc::parse_attributes(payload) else {
            log::debug!("[sta] failed to parse TLVs in WLANEvent message");
            return;
        };
        self.upsert_station(ap_id, mac, &attrs, true, now);
    }

    fn process_eap(&mut self, ap_id: ApId, mac: MacAddr, payload: &[u8], now: Instant) {
        log::debug!("[sta] WLANEvent EAP message from {}", mac);
        let Ok(attrs) = wsc::parse_attributes(payload) else {
            log::debug!("[sta] failed to parse TLVs in WLANEvent message");
            return;
        };
        self.upsert_station(ap_id, mac, &attrs, false, now);

        if attrs.msg_type == Some(wsc::WPS_M1) {
            log::debug!("[sta] M1 from {}, starting registrar", mac);
            let registrar = self.wps.start_registrar(mac);
            let Some(sta) = self
                .registry
                .get_mut(ap_id)
                .and_then(|ap| ap.stations.get_mut(&mac))
            else {
                return;
            };
            sta.registrar = registrar;
            if sta.registrar.is_none() {
                // Engine refused the session; abandon without a response.
                log::debug!("[sta] registrar refused session for {}", mac);
                return;
            }
            self.step_registrar(ap_id, mac, WscOpCode::Msg, payload, now);
        } else {
            let has_registrar = self
                .registry
                .get(ap_id)
                .and_then(|ap| ap.stations.get(&mac))
                .map(|sta| sta.registrar.is_some())
                .unwrap_or(false);
            if has_registrar {
                let op = op_code_for(attrs.msg_type);
                self.step_registrar(ap_id, mac, op, payload, now);
            }
        }
    }

    fn upsert_station(
        &mut self,
        ap_id: ApId,
        mac: MacAddr,
        attrs: &wsc::Attributes,
        is_probe: bool,
        now: Instant,
    ) {
        let idle = self.config.sta_idle_timeout();
        let Some(ap) = self.registry.get_mut(ap_id) else {
            return;
        };
        let sta = ap
            .stations
            .entry(mac)
            .or_insert_with(|| Station::new(mac, now, idle));
        sta.apply_attributes(attrs, is_probe, now, idle);
    }

    // ==================== Registrar stepping ====================

    fn step_registrar(
        &mut self,
        ap_id: ApId,
        mac: MacAddr,
        op: WscOpCode,
        msg: &[u8],
        now: Instant,
    ) {
        let (result, reply) = {
            let Some(sta) = self
                .registry
                .get_mut(ap_id)
                .and_then(|ap| ap.stations.get_mut(&mac))
            else {
                return;
            };
            let Some(registrar) = sta.registrar.as_mut() else {
                return;
            };
            let result = registrar.process_msg(op, msg);
            let reply = match result {
                WpsProcessResult::Continue => registrar.take_reply(),
                _ => None,
            };
            if result == WpsProcessResult::Failure {
                sta.registrar = None;
            }
            (result, reply)
        };

        match result {
            WpsProcessResult::Continue => {
                if let Some((_op, bytes)) = reply {
                    self.send_sta_reply(ap_id, mac, bytes, now);
                }
            }
            WpsProcessResult::Done => {
                log::info!("[sta] registration with {} completed", mac);
            }
            WpsProcessResult::Failure => {
                log::info!("[sta] registration with {} failed", mac);
            }
        }
    }

    /// Ship one registrar reply through `PutWLANResponse`, or queue it
    /// while the station slot is busy.
    fn send_sta_reply(&mut self, ap_id: ApId, mac: MacAddr, msg: Vec<u8>, _now: Instant) {
        let (dst, path) = {
            let Some(ap) = self.registry.get(ap_id) else {
                return;
            };
            let Some(control_url) = ap.device.control_url.as_deref() else {
                log::debug!("[sta] no controlURL for AP {}, dropping reply", ap_id);
                return;
            };
            let Some(parsed) = parse_http_url(control_url) else {
                log::debug!("[sta] unusable controlURL for AP {}", ap_id);
                return;
            };
            parsed
        };

        let queue_depth = self.config.reply_queue_depth;
        let slot_idle = {
            let Some(sta) = self
                .registry
                .get(ap_id)
                .and_then(|ap| ap.stations.get(&mac))
            else {
                return;
            };
            sta.slot.is_idle()
        };
        if !slot_idle {
            let Some(sta) = self
                .registry
                .get_mut(ap_id)
                .and_then(|ap| ap.stations.get_mut(&mac))
            else {
                return;
            };
            if sta.reply_queue.len() < queue_depth {
                sta.reply_queue.push_back(msg);
            } else {
                log::warn!("[sta] reply queue full for {}, dropping message", mac);
            }
            return;
        }

        let request = soap::put_wlan_response(&path, dst, &msg, mac);
        let timeout = Duration::from_millis(self.config.soap_timeout_ms);
        self.submit(
            ExchangeOwner::Sta(ap_id, mac),
            ExchangeKind::PutWlanResponse,
            dst,
            request,
            timeout,
        );
    }

    // ==================== Selected registrar broadcast ====================

    /// Announce the ER's selected-registrar state to every known AP,
    /// best-effort.
    pub fn set_selected_registrar(
        &mut self,
        sel_reg: bool,
        dev_passwd_id: u16,
        sel_reg_config_methods: u16,
    ) {
        let msg = wsc::build_selected_registrar(sel_reg, dev_passwd_id, sel_reg_config_methods);
        log::debug!(
            "[er] SetSelectedRegistrar fanout: sel_reg={} dev_passwd_id=0x{:04x} methods=0x{:04x} to {} AP(s)",
            sel_reg,
            dev_passwd_id,
            sel_reg_config_methods,
            self.registry.len()
        );
        self.sel_reg_msg = Some(msg.clone());
        for ap_id in self.registry.ids() {
            self.send_sel_reg(ap_id, &msg);
        }
    }

    fn send_sel_reg(&mut self, ap_id: ApId, msg: &[u8]) {
        let Some(ap) = self.registry.get(ap_id) else {
            return;
        };
        let Some(control_url) = ap.device.control_url.as_deref() else {
            log::debug!("[soap] no controlURL for AP {}", ap_id);
            return;
        };
        if !ap.slot.is_idle() {
            log::debug!("[soap] AP {} busy, skipping SetSelectedRegistrar", ap_id);
            return;
        }
        let Some((dst, path)) = parse_http_url(control_url) else {
            log::debug!("[soap] unusable controlURL for AP {}", ap_id);
            return;
        };
        let request = soap::set_selected_registrar(&path, dst, msg);
        let timeout = Duration::from_millis(self.config.soap_timeout_ms);
        self.submit(
            ExchangeOwner::Ap(ap_id),
            ExchangeKind::SetSelectedRegistrar,
            dst,
            request,
            timeout,
        );
    }

    // ==================== Deadlines ====================

    /// Sweep every core-owned deadline that has passed.
    pub fn handle_deadlines(&mut self, now: Instant) {
        // Station idle timeouts first: their AP may expire in the same
        // sweep and teardown order is stations before AP.
        for ap_id in self.registry.ids() {
            let expired = self
                .registry
                .get(ap_id)
                .map(|ap| ap.expired_stations(now))
                .unwrap_or_default();
            for mac in expired {
                log::debug!("[sta] entry {} timed out", mac);
                self.remove_station(ap_id, mac);
            }
        }

        for ap_id in self.registry.expired_ids(now) {
            log::debug!("[ap] advertisement timed out for AP {}", ap_id);
            self.remove_ap(ap_id);
        }

        for ap_id in self.registry.ids() {
            let due = self
                .registry
                .get(ap_id)
                .and_then(|ap| ap.renew_at)
                .is_some_and(|at| at <= now);
            if !due {
                continue;
            }
            let renew_now = {
                let Some(ap) = self.registry.get_mut(ap_id) else {
                    continue;
                };
                if ap.slot.is_idle() {
                    ap.renew_at = None;
                    true
                } else {
                    ap.renew_at = Some(now + RENEW_RETRY);
                    false
                }
            };
            if renew_now {
                log::debug!("[ap] {} renewing event subscription", ap_id);
                self.start_resubscribe(ap_id);
            }
        }

        if let Some(at) = self.next_msearch_at {
            if at <= now {
                self.actions.push_back(Action::SendMsearch);
                self.next_msearch_at =
                    Some(now + Duration::from_secs(self.config.msearch_interval_secs));
            }
        }
    }

    // ==================== Teardown ====================

    fn remove_station(&mut self, ap_id: ApId, mac: MacAddr) {
        let Some(sta) = self
            .registry
            .get_mut(ap_id)
            .and_then(|ap| ap.stations.remove(&mac))
        else {
            return;
        };
        self.abort_slot(sta.slot);
        // Dropping the station drops its registrar instance.
    }

    fn remove_ap_by_addr(&mut self, addr: Ipv4Addr) {
        let id = self.registry.by_addr_mut(addr).map(|ap| ap.id);
        if let Some(id) = id {
            self.remove_ap(id);
        }
    }

    fn remove_ap(&mut self, ap_id: ApId) {
        let Some(ap) = self.registry.remove(ap_id) else {
            return;
        };
        for sta in ap.stations.values() {
            self.abort_slot(sta.slot);
        }
        self.abort_slot(ap.slot);

        // Best-effort UNSUBSCRIBE so a live AP stops notifying us.
        if ap.subscribed {
            if let (Some(event_url), Some(sid)) = (ap.device.event_sub_url.as_deref(), ap.sid) {
                if let Some((dst, path)) = parse_http_url(event_url) {
                    let request = soap::unsubscribe(&path, dst, &sid);
                    let timeout = Duration::from_millis(self.config.subscribe_timeout_ms);
                    self.submit(
                        ExchangeOwner::Detached,
                        ExchangeKind::Unsubscribe,
                        dst,
                        request,
                        timeout,
                    );
                }
            }
        }
    }

    fn abort_slot(&mut self, slot: HttpSlot) {
        if let HttpSlot::InFlight { exchange } = slot {
            self.pending.remove(&exchange);
            self.actions.push_back(Action::AbortHttp(exchange));
        }
    }

    /// Full teardown: drop every AP (stations first), abort everything
    /// in flight. The I/O layer closes sockets afterwards.
    pub fn shutdown(&mut self) {
        log::info!(
            "[er] shutting down with {} AP(s) known",
            self.registry.len()
        );
        for ap in self.registry.drain() {
            for sta in ap.stations.values() {
                self.abort_slot(sta.slot);
            }
            self.abort_slot(ap.slot);
        }
        let leftover: Vec<ExchangeId> = self.pending.keys().copied().collect();
        for id in leftover {
            self.pending.remove(&id);
            self.actions.push_back(Action::AbortHttp(id));
        }
        self.next_msearch_at = None;
    }

    fn submit(
        &mut self,
        owner: ExchangeOwner,
        kind: ExchangeKind,
        dst: SocketAddrV4,
        request: Vec<u8>,
        timeout: Duration,
    ) {
        self.next_exchange_id += 1;
        let id = self.next_exchange_id;

        match owner {
            ExchangeOwner::Ap(ap_id) => {
                let Some(ap) = self.registry.get_mut(ap_id) else {
                    return;
                };
                ap.slot = HttpSlot::InFlight { exchange: id };
            }
            ExchangeOwner::Sta(ap_id, mac) => {
                let Some(sta) = self
                    .registry
                    .get_mut(ap_id)
                    .and_then(|ap| ap.stations.get_mut(&mac))
                else {
                    return;
                };
                sta.slot = HttpSlot::InFlight { exchange: id };
            }
            ExchangeOwner::Detached => {}
        }

        self.pending.insert(id, (owner, kind));
        self.actions.push_back(Action::StartHttp(HttpCall {
            id,
            dst,
            request,
            timeout,
        }));
    }
}

/// Status code of a completed exchange, `None` for transport failure.
fn ok_status(event: &ClientEvent) -> Option<u16> {
    match event {
        ClientEvent::Ok(Response { status, .. }) => Some(*status),
        _ => None,
    }
}
