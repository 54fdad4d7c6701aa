// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AP registry: the live set of discovered WPS access points.
//!
//! APs enter on their first WFA-scoped SSDP sighting and leave on
//! `ssdp:byebye`, advertisement timeout, or registrar shutdown. Expiry is
//! lease-style: every matching advertisement re-arms the deadline to its
//! `max-age`.

use crate::registrar::{HttpSlot, Station};
use crate::types::MacAddr;
use crate::upnp::DeviceDescription;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Dense AP identifier, unique for the registrar's lifetime and never
/// reused. Appears in the event-callback URL path (`/event/<id>`).
pub type ApId = u32;

/// One discovered access point.
pub struct Ap {
    pub id: ApId,
    pub addr: Ipv4Addr,
    /// URL of the device-description document, from SSDP `LOCATION`.
    pub location: String,
    /// Metadata and service URLs, populated after the description fetch.
    pub device: DeviceDescription,
    /// True after a successful SUBSCRIBE reply.
    pub subscribed: bool,
    /// Subscription identifier issued by the AP; used for renewal and
    /// UNSUBSCRIBE.
    pub sid: Option<String>,
    /// Gate for the single outbound HTTP exchange this AP may have.
    pub slot: HttpSlot,
    /// Enrollee sessions proxied by this AP, keyed by MAC.
    pub stations: HashMap<MacAddr, Station>,
    /// Advertisement lease deadline.
    pub expires_at: Instant,
    /// When to renew the event subscription, once subscribed.
    pub renew_at: Option<Instant>,
}

impl Ap {
    fn new(id: ApId, addr: Ipv4Addr, location: String, max_age: Duration, now: Instant) -> Self {
        Self {
            id,
            addr,
            location,
            device: DeviceDescription::default(),
            subscribed: false,
            sid: None,
            slot: HttpSlot::Idle,
            stations: HashMap::new(),
            expires_at: now + max_age,
            renew_at: None,
        }
    }

    /// Station MACs whose idle deadline has passed.
    pub fn expired_stations(&self, now: Instant) -> Vec<MacAddr> {
        self.stations
            .iter()
            .filter(|(_, sta)| sta.expires_at <= now)
            .map(|(mac, _)| *mac)
            .collect()
    }
}

/// Whether `add` created a new entry or refreshed an existing lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(ApId),
    Refreshed(ApId),
}

/// Registry of all known APs.
pub struct ApRegistry {
    aps: HashMap<ApId, Ap>,
    next_ap_id: ApId,
}

impl ApRegistry {
    pub fn new() -> Self {
        Self {
            aps: HashMap::new(),
            next_ap_id: 0,
        }
    }

    /// Apply a WFA advertisement: re-arm the lease of a known AP, or
    /// create a fresh entry with the next id.
    pub fn add(
        &mut self,
        addr: Ipv4Addr,
        location: &str,
        max_age: Duration,
        now: Instant,
    ) -> AddOutcome {
        if let Some(ap) = self.aps.values_mut().find(|ap| ap.addr == addr) {
            ap.expires_at = now + max_age;
            return AddOutcome::Refreshed(ap.id);
        }

        self.next_ap_id += 1;
        let id = self.next_ap_id;
        let ap = Ap::new(id, addr, location.to_string(), max_age, now);
        log::info!(
            "[ap] added entry {} for {} ({}) max-age={}s",
            id,
            addr,
            location,
            max_age.as_secs()
        );
        self.aps.insert(id, ap);
        AddOutcome::Added(id)
    }

    pub fn get(&self, id: ApId) -> Option<&Ap> {
        self.aps.get(&id)
    }

    pub fn get_mut(&mut self, id: ApId) -> Option<&mut Ap> {
        self.aps.get_mut(&id)
    }

    pub fn by_addr_mut(&mut self, addr: Ipv4Addr) -> Option<&mut Ap> {
        self.aps.values_mut().find(|ap| ap.addr == addr)
    }

    /// Remove by device address (the byebye path).
    pub fn remove_by_addr(&mut self, addr: Ipv4Addr) -> Option<Ap> {
        let id = self.aps.values().find(|ap| ap.addr == addr)?.id;
        self.remove(id)
    }

    /// Remove by id. Stations go down with their AP; the caller handles
    /// exchange aborts and UNSUBSCRIBE.
    pub fn remove(&mut self, id: ApId) -> Option<Ap> {
        let ap = self.aps.remove(&id)?;
        log::info!(
            "[ap] removing entry {} for {} ({}) with {} station(s)",
            ap.id,
            ap.addr,
            ap.location,
            ap.stations.len()
        );
        Some(ap)
    }

    /// Remove everything (registrar shutdown).
    pub fn drain(&mut self) -> Vec<Ap> {
        let ids: Vec<ApId> = self.aps.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Ids of APs whose advertisement lease has run out.
    pub fn expired_ids(&self, now: Instant) -> Vec<ApId> {
        self.aps
            .values()
            .filter(|ap| ap.expires_at <= now)
            .map(|ap| ap.id)
            .collect()
    }

    pub fn ids(&self) -> Vec<ApId> {
        self.aps.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ap> {
        self.aps.values()
    }

    pub fn len(&self) -> usize {
        self.aps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aps.is_empty()
    }

    /// Earliest deadline across AP leases, subscription renewals, and
    /// station idle timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.aps
            .values()
            .flat_map(|ap| {
                std::iter::once(ap.expires_at)
                    .chain(ap.renew_at)
                    .chain(ap.stations.values().map(|sta| sta.expires_at))
            })
            .min()
    }
}

impl Default for ApRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_AGE: Duration = Duration::from_secs(1800);

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 0, 2, last)
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        let a = reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        let b = reg.add(addr(2), "http://192.0.2.2/d.xml", MAX_AGE, now);
        assert_eq!(a, AddOutcome::Added(1));
        assert_eq!(b, AddOutcome::Added(2));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_ids_never_reused_after_removal() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        reg.remove_by_addr(addr(1)).expect("Should remove AP");
        let outcome = reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        assert_eq!(outcome, AddOutcome::Added(2));
    }

    #[test]
    fn test_readvertisement_refreshes_lease_only() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        let later = now + Duration::from_secs(100);
        let outcome = reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, later);

        assert_eq!(outcome, AddOutcome::Refreshed(1));
        assert_eq!(reg.len(), 1);
        let ap = reg.get(1).expect("AP should exist");
        assert_eq!(ap.expires_at, later + MAX_AGE);
    }

    #[test]
    fn test_discovery_is_idempotent() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        for i in 0..5 {
            let t = now + Duration::from_secs(i);
            reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, t);
        }
        assert_eq!(reg.len(), 1);
        let ap = reg.get(1).expect("AP should exist");
        assert_eq!(ap.expires_at, now + Duration::from_secs(4) + MAX_AGE);
    }

    #[test]
    fn test_expired_ids() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        reg.add(addr(1), "http://192.0.2.1/d.xml", Duration::from_secs(10), now);
        reg.add(addr(2), "http://192.0.2.2/d.xml", Duration::from_secs(100), now);

        let at = now + Duration::from_secs(50);
        assert_eq!(reg.expired_ids(at), vec![1]);

        let at = now + Duration::from_secs(200);
        let mut expired = reg.expired_ids(at);
        expired.sort_unstable();
        assert_eq!(expired, vec![1, 2]);
    }

    #[test]
    fn test_remove_by_addr() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        assert!(reg.remove_by_addr(addr(9)).is_none());
        let ap = reg.remove_by_addr(addr(1)).expect("Should remove AP");
        assert_eq!(ap.id, 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_drain_removes_everything() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        reg.add(addr(2), "http://192.0.2.2/d.xml", MAX_AGE, now);
        let drained = reg.drain();
        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_next_deadline_spans_leases_and_stations() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();

        reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);
        assert_eq!(reg.next_deadline(), Some(now + MAX_AGE));

        let ap = reg.get_mut(1).expect("AP should exist");
        ap.renew_at = Some(now + Duration::from_secs(40));
        let mac = MacAddr::from_bytes([2, 0, 0, 0, 0, 1]);
        ap.stations
            .insert(mac, Station::new(mac, now, Duration::from_secs(20)));

        assert_eq!(reg.next_deadline(), Some(now + Duration::from_secs(20)));
    }

    #[test]
    fn test_expired_stations() {
        let mut reg = ApRegistry::new();
        let now = Instant::now();
        reg.add(addr(1), "http://192.0.2.1/d.xml", MAX_AGE, now);

        let ap = reg.get_mut(1).expect("AP should exist");
        let mac_a = MacAddr::from_bytes([2, 0, 0, 0, 0, 1]);
        let mac_b = MacAddr::from_bytes([2, 0, 0, 0, 0, 2]);
        ap.stations
            .insert(mac_a, Station::new(mac_a, now, Duration::from_secs(10)));
        ap.stations
            .insert(mac_b, Station::new(mac_b, now, Duration::from_secs(100)));

        let expired = ap.expired_stations(now + Duration::from_secs(30));
        assert_eq!(expired, vec![mac_a]);
    }
}
