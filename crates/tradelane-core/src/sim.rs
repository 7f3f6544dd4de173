//! The canonical state container and the fast FNV state hash.
//!
//! [`SimState`] is the single owner of world data. Every system receives
//! `&mut SimState` and nothing else; no system keeps private memory across
//! ticks. All keyed collections are `BTreeMap`s so iteration is always in
//! ordinal id order.

use std::collections::BTreeMap;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use crate::event::{EventLog, FleetEvent, LogisticsEvent, SecurityEvent};
use crate::fixed::{Fixed64, Ticks, Units};
use crate::fleet::Fleet;
use crate::industry::IndustrySite;
use crate::intel::IntelBook;
use crate::intent::{Intent, IntentEnvelope};
use crate::lane_flow::InFlightTransfer;
use crate::ledger::Inventory;
use crate::logistics::LogisticsReservation;
use crate::market::Market;
use crate::program::ProgramBook;
use crate::rng::SimRng;
use crate::tweaks::TweakConfig;
use crate::world::{Edge, Node, WorldClass};

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub credits: Units,
    pub location_node_id: String,
    pub cargo: Inventory,
    pub selected_destination_node_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub world_id: String,
    pub seed: u64,
    /// Current tick counter. Incremented by 1 at the end of each step.
    pub tick: Ticks,
    pub rng: SimRng,

    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<String, Edge>,
    pub markets: BTreeMap<String, Market>,
    pub world_classes: BTreeMap<String, WorldClass>,
    pub fleets: BTreeMap<String, Fleet>,
    pub industry_sites: BTreeMap<String, IndustrySite>,
    pub programs: ProgramBook,
    pub intel: IntelBook,
    pub reservations: BTreeMap<String, LogisticsReservation>,
    pub in_flight_transfers: Vec<InFlightTransfer>,

    /// Deferred mutation requests. Transient: never part of a save.
    #[serde(skip)]
    pub pending_intents: Vec<IntentEnvelope>,
    pub next_intent_seq: u64,
    pub next_job_seq: u64,
    pub next_reservation_seq: u64,

    pub logistics_events: EventLog<LogisticsEvent>,
    pub security_events: EventLog<SecurityEvent>,
    pub fleet_events: EventLog<FleetEvent>,

    pub player: PlayerState,
    pub tweaks: TweakConfig,
}

impl SimState {
    /// Empty world seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            world_id: String::new(),
            seed,
            tick: 0,
            rng: SimRng::new(seed),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            markets: BTreeMap::new(),
            world_classes: BTreeMap::new(),
            fleets: BTreeMap::new(),
            industry_sites: BTreeMap::new(),
            programs: ProgramBook::default(),
            intel: IntelBook::default(),
            reservations: BTreeMap::new(),
            in_flight_transfers: Vec::new(),
            pending_intents: Vec::new(),
            next_intent_seq: 1,
            next_job_seq: 1,
            next_reservation_seq: 1,
            logistics_events: EventLog::new(),
            security_events: EventLog::new(),
            fleet_events: EventLog::new(),
            player: PlayerState::default(),
            tweaks: TweakConfig::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Market attached to a node.
    pub fn node_market_id(&self, node_id: &str) -> Option<&str> {
        self.nodes.get(node_id)?.market_id.as_deref()
    }

    /// Resolve a location that may be either a node id or a market id to
    /// its market id.
    pub fn resolve_market_id(&self, location: &str) -> Option<String> {
        if let Some(m) = self.node_market_id(location) {
            return Some(m.to_string());
        }
        self.markets.contains_key(location).then(|| location.to_string())
    }

    /// First node (ordinal) hosting a market.
    pub fn market_node_id(&self, market_id: &str) -> Option<&str> {
        self.nodes
            .values()
            .find(|n| n.market_id.as_deref() == Some(market_id))
            .map(|n| n.id.as_str())
    }

    /// Lowest-id lane joining two nodes, in either direction.
    pub fn edge_between(&self, a: &str, b: &str) -> Option<&Edge> {
        if a == b {
            return None;
        }
        self.edges.values().find(|e| e.connects(a, b))
    }

    /// Fee multiplier of the node's world class (1.0 when unclassed).
    pub fn class_fee_multiplier(&self, node_id: &str) -> Fixed64 {
        self.nodes
            .get(node_id)
            .and_then(|n| n.world_class_id.as_deref())
            .and_then(|c| self.world_classes.get(c))
            .map(|c| c.fee_multiplier)
            .unwrap_or(Fixed64::from_num(1))
    }

    /// Sum of open reservation units on `market`/`good`.
    pub fn total_reserved(&self, market_id: &str, good_id: &str) -> Units {
        self.reservations
            .values()
            .filter(|r| r.market_id == market_id && r.good_id == good_id)
            .map(|r| r.remaining)
            .sum()
    }

    // -----------------------------------------------------------------------
    // Intents and ids
    // -----------------------------------------------------------------------

    /// Store a deferred intent. Returns its sequence number.
    pub fn enqueue_intent(&mut self, intent: Intent) -> u64 {
        let seq = self.next_intent_seq;
        self.next_intent_seq += 1;
        self.pending_intents.push(IntentEnvelope {
            seq,
            created_tick: self.tick,
            intent,
        });
        seq
    }

    pub(crate) fn next_job_id(&mut self) -> String {
        let id = format!("J{}", self.next_job_seq);
        self.next_job_seq += 1;
        id
    }

    pub(crate) fn next_reservation_id(&mut self) -> String {
        let id = format!("R{}", self.next_reservation_seq);
        self.next_reservation_seq += 1;
        id
    }

    // -----------------------------------------------------------------------
    // Event log boundary
    // -----------------------------------------------------------------------

    /// Assign sequence numbers to everything emitted this tick.
    pub fn finalize_events(&mut self) {
        self.logistics_events.finalize();
        self.security_events.finalize();
        self.fleet_events.finalize();
    }

    // -----------------------------------------------------------------------
    // Fast hash
    // -----------------------------------------------------------------------

    /// FNV-1a checksum over the ledger-relevant fields. Cheap enough to
    /// compute every tick; the SHA-256 signature remains the oracle.
    pub fn quick_hash(&self) -> u64 {
        let mut h = Fnv1a::default();
        h.write_u64(self.tick);
        h.write_u64(self.rng.state());
        h.write_i64(self.player.credits);
        for (id, market) in &self.markets {
            h.key(id);
            h.inventory(&market.inventory);
        }
        for (id, fleet) in &self.fleets {
            h.key(id);
            h.key(&fleet.current_node_id);
            h.write_i64(fleet.travel_progress.to_bits());
            h.inventory(&fleet.cargo);
        }
        for (id, edge) in &self.edges {
            h.key(id);
            h.write_u32(edge.used_capacity);
            h.write_i64(edge.heat.to_bits());
        }
        for (id, site) in &self.industry_sites {
            h.key(id);
            h.write_i64(site.health_bps);
        }
        for log_seq in [
            self.logistics_events.last_seq(),
            self.security_events.last_seq(),
            self.fleet_events.last_seq(),
        ] {
            h.write_u64(log_seq);
        }
        h.finish()
    }
}

// ---------------------------------------------------------------------------
// FNV-1a
// ---------------------------------------------------------------------------

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Integers are fed little-endian so the result does not
/// depend on the host.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u64);

impl Default for Fnv1a {
    fn default() -> Self {
        Self(FNV_OFFSET_BASIS)
    }
}

impl Fnv1a {
    /// Length-prefixed, so `("ab", "c")` and `("a", "bc")` differ.
    fn key(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write(s.as_bytes());
    }

    fn inventory(&mut self, inv: &Inventory) {
        for (good, qty) in inv {
            self.key(good);
            self.write_i64(*qty);
        }
    }
}

impl Hasher for Fnv1a {
    fn write(&mut self, bytes: &[u8]) {
        self.0 = bytes
            .iter()
            .fold(self.0, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    }

    fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.write(&v.to_le_bytes());
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// FNV-1a 64 of a UTF-8 string, used for seeded rolls.
pub fn fnv1a64(text: &str) -> u64 {
    let mut h = Fnv1a::default();
    h.write(text.as_bytes());
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::NodeKind;

    #[test]
    fn new_state_starts_at_zero() {
        let state = SimState::new(9);
        assert_eq!(state.tick, 0);
        assert_eq!(state.seed, 9);
        assert_eq!(state.next_intent_seq, 1);
    }

    #[test]
    fn keys_do_not_alias() {
        let mut h1 = Fnv1a::default();
        h1.key("ab");
        h1.key("c");
        let mut h2 = Fnv1a::default();
        h2.key("a");
        h2.key("bc");
        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn quick_hash_tracks_ledgers() {
        let mut s = SimState::new(4);
        s.markets.insert("mkt_a".into(), Market::new("mkt_a"));
        let before = s.quick_hash();
        if let Some(m) = s.markets.get_mut("mkt_a") {
            m.inventory.insert("ore".into(), 3);
        }
        assert_ne!(s.quick_hash(), before);
    }

    #[test]
    fn fnv_reference_value() {
        // FNV-1a 64 of the empty string is the offset basis.
        assert_eq!(fnv1a64(""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn resolve_market_accepts_node_or_market_ids() {
        let mut s = SimState::new(1);
        let mut node = Node::new("stn_a", NodeKind::Station, [Fixed64::ZERO; 3]);
        node.market_id = Some("mkt_a".into());
        s.nodes.insert(node.id.clone(), node);
        s.markets.insert("mkt_a".into(), Market::new("mkt_a"));

        assert_eq!(s.resolve_market_id("stn_a").as_deref(), Some("mkt_a"));
        assert_eq!(s.resolve_market_id("mkt_a").as_deref(), Some("mkt_a"));
        assert_eq!(s.resolve_market_id("nope"), None);
        assert_eq!(s.market_node_id("mkt_a"), Some("stn_a"));
    }

    #[test]
    fn enqueue_intent_assigns_increasing_seq() {
        let mut s = SimState::new(1);
        let a = s.enqueue_intent(Intent::Sell {
            market_id: "m".into(),
            good_id: "g".into(),
            quantity: 1,
        });
        let b = s.enqueue_intent(Intent::Sell {
            market_id: "m".into(),
            good_id: "g".into(),
            quantity: 1,
        });
        assert!(b > a);
        assert_eq!(s.pending_intents.len(), 2);
    }
}
