//! Station correlation gateway.
//!
//! Association and lease events arrive independently and in any order. Each
//! is parked in a pending set keyed by association ID until its counterpart
//! shows up; a matched pair becomes a [`StationRecord`] whose IPv6 address is
//! announced to the mesh with `RCS_ADD`.

use crate::addr::{embed_ipv4, DEFAULT_STATION_PREFIX};
use crate::error::CorrelationError;
use crate::event::{Aid, WifiEvent};
use crate::mac::MacAddress;
use crate::observer::StationObserver;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vaina_wire::{MessageBody, SequenceGenerator, VainaMessage};

/// Default bound on each pending set
pub const DEFAULT_MAX_PENDING: usize = 16;

/// Station correlation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Prefix whose low 32 bits carry the station's IPv4 address
    pub prefix: Ipv6Addr,
    /// Maximum pending associations, and separately pending leases
    pub max_pending: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_STATION_PREFIX,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// A station announced to the mesh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    /// Station MAC address
    pub mac: MacAddress,
    /// Association ID
    pub aid: Aid,
    /// Leased IPv4 address
    pub ipv4: Ipv4Addr,
    /// Mesh IPv6 address derived from `ipv4`
    pub ipv6: Ipv6Addr,
}

#[derive(Debug, Clone, Copy)]
struct Pending<T> {
    value: T,
    arrival: u64,
}

/// Correlates Wi-Fi events into stations and announces them to the mesh
pub struct StationGateway {
    config: StationConfig,
    seqno: SequenceGenerator,
    outbound: mpsc::UnboundedSender<VainaMessage>,
    observers: Vec<Arc<dyn StationObserver>>,
    associations: HashMap<Aid, Pending<MacAddress>>,
    leases: HashMap<Aid, Pending<Ipv4Addr>>,
    unkeyed_leases: Vec<Pending<Ipv4Addr>>,
    connected: BTreeMap<MacAddress, StationRecord>,
    arrivals: u64,
    link_available: bool,
}

impl StationGateway {
    /// Create a gateway sending its VAINA messages to `outbound`
    pub fn new(config: StationConfig, outbound: mpsc::UnboundedSender<VainaMessage>) -> Self {
        Self {
            config,
            seqno: SequenceGenerator::new(),
            outbound,
            observers: Vec::new(),
            associations: HashMap::new(),
            leases: HashMap::new(),
            unkeyed_leases: Vec::new(),
            connected: BTreeMap::new(),
            arrivals: 0,
            link_available: true,
        }
    }

    /// Register an observer for station and link changes
    pub fn add_observer(&mut self, observer: Arc<dyn StationObserver>) {
        self.observers.push(observer);
    }

    /// Settings in use
    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Stations currently announced, ordered by MAC
    pub fn connected(&self) -> impl Iterator<Item = &StationRecord> {
        self.connected.values()
    }

    /// Announced station with this MAC
    pub fn station(&self, mac: &MacAddress) -> Option<&StationRecord> {
        self.connected.get(mac)
    }

    /// Associations waiting for a lease
    pub fn pending_associations(&self) -> usize {
        self.associations.len()
    }

    /// Leases waiting for an association
    pub fn pending_leases(&self) -> usize {
        self.leases.len() + self.unkeyed_leases.len()
    }

    /// Whether the mesh link was last reported available
    pub fn link_available(&self) -> bool {
        self.link_available
    }

    /// Dispatch a Wi-Fi event
    pub fn handle(&mut self, event: WifiEvent) {
        match event {
            WifiEvent::Associated { aid, mac } => {
                self.station_associated(aid, mac);
            }
            WifiEvent::LeaseAssigned { aid, ipv4 } => {
                self.station_ip_assigned(aid, ipv4);
            }
            WifiEvent::Disassociated { mac } => {
                self.station_disassociated(mac);
            }
        }
    }

    /// A station associated; returns the stations this completed
    pub fn station_associated(&mut self, aid: Aid, mac: MacAddress) -> Vec<StationRecord> {
        info!("Station {} associated (aid {})", mac, aid);

        if self.connected.get(&mac).is_some_and(|record| record.aid == aid) {
            debug!("Station {} already connected with aid {}", mac, aid);
            return Vec::new();
        }

        if let Some(pending) = self.associations.get(&aid) {
            if pending.value == mac {
                debug!("Association of {} (aid {}) already pending", mac, aid);
                return Vec::new();
            }
            let e = CorrelationError::DuplicatePairing {
                aid,
                previous: pending.value,
                current: mac,
            };
            warn!("{}, keeping the newer association", e);
        }

        // The AID now belongs to this station; whoever held it left unreported
        let displaced: Vec<MacAddress> = self
            .connected
            .values()
            .filter(|record| record.aid == aid && record.mac != mac)
            .map(|record| record.mac)
            .collect();
        for other in displaced {
            if let Some(stale) = self.connected.remove(&other) {
                warn!("Aid {} reassigned from {} to {}, withdrawing {}", aid, other, mac, stale.ipv6);
                self.on_disconnected(&stale);
            }
        }

        // A newer association ID supersedes any older one for the same station
        self.associations.retain(|_, pending| pending.value != mac);

        if !self.associations.contains_key(&aid) {
            while self.associations.len() >= self.config.max_pending.max(1) {
                let Some(oldest) = oldest_key(&self.associations) else {
                    break;
                };
                if let Some(evicted) = self.associations.remove(&oldest) {
                    warn!(
                        "Pending associations full, evicting {} (aid {})",
                        evicted.value, oldest
                    );
                }
            }
        }

        let arrival = self.next_arrival();
        self.associations.insert(aid, Pending { value: mac, arrival });

        self.correlate()
    }

    /// A lease was assigned; returns the stations this completed
    pub fn station_ip_assigned(&mut self, aid: Option<Aid>, ipv4: Ipv4Addr) -> Vec<StationRecord> {
        match aid {
            Some(aid) => info!("Lease {} assigned (aid {})", ipv4, aid),
            None => info!("Lease {} assigned", ipv4),
        }

        if aid.is_none() {
            if let Some(record) = self.connected.values().find(|record| record.ipv4 == ipv4) {
                debug!("Lease {} renewed for {}", ipv4, record.mac);
                return Vec::new();
            }
        }

        if let Some(aid) = aid {
            if let Some(record) = self.connected.values().find(|record| record.aid == aid).cloned() {
                if record.ipv4 == ipv4 {
                    debug!("Lease {} renewed for {}", ipv4, record.mac);
                    return Vec::new();
                }
                // The station is already paired; only its address changed
                let updated = self.build_record(record.mac, aid, ipv4);
                return self.connect(updated).into_iter().collect();
            }
        }

        if self.lease_pending(ipv4) {
            debug!("Lease {} already pending", ipv4);
        } else {
            self.make_room_for_lease();
            let arrival = self.next_arrival();
            let pending = Pending {
                value: ipv4,
                arrival,
            };
            match aid {
                Some(aid) => {
                    if let Some(replaced) = self.leases.insert(aid, pending) {
                        debug!("Lease {} for aid {} superseded by {}", replaced.value, aid, ipv4);
                    }
                }
                None => self.unkeyed_leases.push(pending),
            }
        }

        self.correlate()
    }

    /// A station left; returns its record if it was announced
    pub fn station_disassociated(&mut self, mac: MacAddress) -> Option<StationRecord> {
        info!("Station {} disassociated", mac);

        let pending_before = self.associations.len();
        self.associations.retain(|_, pending| pending.value != mac);
        if self.associations.len() != pending_before {
            debug!("Dropped pending association of {}", mac);
        }

        let removed = self.connected.remove(&mac);
        match &removed {
            Some(record) => self.on_disconnected(record),
            None => debug!("Station {} was not connected", mac),
        }

        // One fewer candidate may settle a lease without association ID
        if !self.unkeyed_leases.is_empty() {
            self.correlate();
        }

        removed
    }

    /// Re-announce every connected station, returning how many were sent
    pub fn resync(&mut self) -> usize {
        let records: Vec<StationRecord> = self.connected.values().cloned().collect();
        for record in &records {
            self.transmit(MessageBody::RcsAdd { addr: record.ipv6 });
        }
        if !records.is_empty() {
            info!("Re-announced {} stations", records.len());
        }
        records.len()
    }

    /// Record a mesh link state change.
    ///
    /// Observers hear about every transition; when the link comes back all
    /// connected stations are re-announced.
    pub fn link_state_changed(&mut self, available: bool) {
        if available == self.link_available {
            return;
        }
        self.link_available = available;

        if available {
            info!("Mesh link available");
        } else {
            warn!("Mesh link unavailable");
        }
        for observer in &self.observers {
            observer.link_state_changed(available);
        }

        if available {
            self.resync();
        }
    }

    /// Pair pending leases with pending associations
    fn correlate(&mut self) -> Vec<StationRecord> {
        let mut matched: Vec<(u64, Aid)> = self
            .leases
            .iter()
            .filter(|(aid, _)| self.associations.contains_key(*aid))
            .map(|(aid, lease)| (lease.arrival, *aid))
            .collect();
        matched.sort_unstable();

        let mut connected = Vec::new();
        for (_, aid) in matched {
            if let (Some(association), Some(lease)) =
                (self.associations.remove(&aid), self.leases.remove(&aid))
            {
                let record = self.build_record(association.value, aid, lease.value);
                connected.extend(self.connect(record));
            }
        }

        if let Err(e) = self.correlate_unkeyed(&mut connected) {
            warn!("Lease correlation rejected: {}", e);
        }

        connected
    }

    /// Pair a lease without association ID, only when the match is unambiguous
    fn correlate_unkeyed(&mut self, connected: &mut Vec<StationRecord>) -> Result<(), CorrelationError> {
        let Some(lease) = self.unkeyed_leases.first().copied() else {
            return Ok(());
        };
        if self.associations.is_empty() {
            return Ok(());
        }
        if self.associations.len() > 1 || self.unkeyed_leases.len() > 1 {
            return Err(CorrelationError::Ambiguous {
                ipv4: lease.value,
                pending: self.associations.len(),
            });
        }

        self.unkeyed_leases.clear();
        let drained = self.associations.drain().next();
        if let Some((aid, association)) = drained {
            let record = self.build_record(association.value, aid, lease.value);
            connected.extend(self.connect(record));
        }
        Ok(())
    }

    /// Enter a record into the connected set and announce it.
    ///
    /// A different record for the same station, or another station holding
    /// the same address, is withdrawn first.
    fn connect(&mut self, record: StationRecord) -> Option<StationRecord> {
        if let Some(existing) = self.connected.get(&record.mac) {
            if *existing == record {
                debug!("Station {} already announced at {}", record.mac, record.ipv6);
                return None;
            }
        }

        if let Some(stale) = self.connected.remove(&record.mac) {
            info!(
                "Station {} moved from {} to {}",
                record.mac, stale.ipv6, record.ipv6
            );
            self.on_disconnected(&stale);
        }

        let holders: Vec<MacAddress> = self
            .connected
            .values()
            .filter(|other| other.ipv6 == record.ipv6)
            .map(|other| other.mac)
            .collect();
        for mac in holders {
            if let Some(stale) = self.connected.remove(&mac) {
                warn!("Address {} reassigned from {} to {}", record.ipv6, mac, record.mac);
                self.on_disconnected(&stale);
            }
        }

        self.connected.insert(record.mac, record.clone());
        self.on_connected(&record);
        Some(record)
    }

    fn on_connected(&mut self, record: &StationRecord) {
        info!(
            "Station {} connected: {} -> {}",
            record.mac, record.ipv4, record.ipv6
        );
        self.transmit(MessageBody::RcsAdd { addr: record.ipv6 });
        for observer in &self.observers {
            observer.station_connected(record);
        }
    }

    fn on_disconnected(&mut self, record: &StationRecord) {
        info!("Station {} disconnected ({})", record.mac, record.ipv6);
        self.transmit(MessageBody::RcsDel { addr: record.ipv6 });
        for observer in &self.observers {
            observer.station_disconnected(record);
        }
    }

    fn transmit(&mut self, body: MessageBody) -> u8 {
        let message = VainaMessage::new(self.seqno.generate(), body);
        debug!("Queueing {}", message);
        if self.outbound.send(message).is_err() {
            error!("VAINA session gone, {} not sent", message);
        }
        message.seqno
    }

    fn build_record(&self, mac: MacAddress, aid: Aid, ipv4: Ipv4Addr) -> StationRecord {
        StationRecord {
            mac,
            aid,
            ipv4,
            ipv6: embed_ipv4(self.config.prefix, ipv4),
        }
    }

    fn lease_pending(&self, ipv4: Ipv4Addr) -> bool {
        self.leases.values().any(|lease| lease.value == ipv4)
            || self.unkeyed_leases.iter().any(|lease| lease.value == ipv4)
    }

    fn make_room_for_lease(&mut self) {
        while self.pending_leases() >= self.config.max_pending.max(1) {
            let oldest_keyed = oldest_key(&self.leases)
                .and_then(|aid| self.leases.get(&aid).map(|lease| (aid, lease.arrival)));
            let oldest_unkeyed = self.unkeyed_leases.first().map(|lease| lease.arrival);

            let evicted = match (oldest_keyed, oldest_unkeyed) {
                (Some((aid, keyed)), Some(unkeyed)) if keyed < unkeyed => self.leases.remove(&aid),
                (Some((aid, _)), None) => self.leases.remove(&aid),
                (_, Some(_)) => Some(self.unkeyed_leases.remove(0)),
                (None, None) => None,
            };
            match evicted {
                Some(lease) => warn!("Pending leases full, evicting {}", lease.value),
                None => break,
            }
        }
    }

    fn next_arrival(&mut self) -> u64 {
        self.arrivals += 1;
        self.arrivals
    }
}

fn oldest_key<T>(pending: &HashMap<Aid, Pending<T>>) -> Option<Aid> {
    pending
        .iter()
        .min_by_key(|(_, entry)| entry.arrival)
        .map(|(aid, _)| *aid)
}
