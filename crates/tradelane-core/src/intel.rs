//! The intel book: what the player knows about remote markets, plus the
//! discovery lifecycle (Seen, Scanned, Analyzed) driven by scan, analyze
//! and expedition intents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{FleetEvent, FleetEventType};
use crate::fixed::{Ticks, Units};
use crate::fleet::Controller;
use crate::sim::SimState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntelObservation {
    pub observed_tick: Ticks,
    pub observed_qty: Units,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiscoveryPhase {
    Seen,
    Scanned,
    Analyzed,
}

impl DiscoveryPhase {
    pub fn code(self) -> i64 {
        match self {
            DiscoveryPhase::Seen => 0,
            DiscoveryPhase::Scanned => 1,
            DiscoveryPhase::Analyzed => 2,
        }
    }
}

/// Outcome token for discovery actions. Rejections never mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryReasonCode {
    Ok,
    NotSeen,
    AlreadyAnalyzed,
    OffHub,
    NotScanned,
    SiteNotFound,
    /// The fleet was sent toward the discovery node; nothing else changed.
    Dispatched,
}

impl DiscoveryReasonCode {
    pub fn code(self) -> i64 {
        match self {
            DiscoveryReasonCode::Ok => 0,
            DiscoveryReasonCode::NotSeen => 1,
            DiscoveryReasonCode::AlreadyAnalyzed => 2,
            DiscoveryReasonCode::OffHub => 3,
            DiscoveryReasonCode::NotScanned => 4,
            DiscoveryReasonCode::SiteNotFound => 5,
            DiscoveryReasonCode::Dispatched => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpeditionKind {
    Survey,
    Sample,
    Salvage,
    Analyze,
}

impl ExpeditionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpeditionKind::Survey => "SURVEY",
            ExpeditionKind::Sample => "SAMPLE",
            ExpeditionKind::Salvage => "SALVAGE",
            ExpeditionKind::Analyze => "ANALYZE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub id: String,
    /// Node hosting the discovery. Unplaced discoveries need no travel.
    pub node_id: Option<String>,
    pub phase: DiscoveryPhase,
    /// Completed sample and salvage runs.
    pub exploitation_runs: u32,
    pub last_fleet_id: String,
    pub last_tick: Ticks,
}

impl Discovery {
    pub fn seen(id: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            node_id,
            phase: DiscoveryPhase::Seen,
            exploitation_runs: 0,
            last_fleet_id: String::new(),
            last_tick: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntelBook {
    /// Keyed `market|good`.
    pub observations: BTreeMap<String, IntelObservation>,
    pub discoveries: BTreeMap<String, Discovery>,
}

pub fn observation_key(market_id: &str, good_id: &str) -> String {
    format!("{market_id}|{good_id}")
}

// ---------------------------------------------------------------------------
// Inventory bands and market views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InventoryBand {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl InventoryBand {
    pub fn of(qty: Units) -> Self {
        match qty {
            q if q <= 0 => InventoryBand::VeryLow,
            q if q <= 10 => InventoryBand::Low,
            q if q <= 50 => InventoryBand::Medium,
            q if q <= 200 => InventoryBand::High,
            _ => InventoryBand::VeryHigh,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InventoryBand::VeryLow => "VERY_LOW",
            InventoryBand::Low => "LOW",
            InventoryBand::Medium => "MEDIUM",
            InventoryBand::High => "HIGH",
            InventoryBand::VeryHigh => "VERY_HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketGoodView {
    /// The player stands at this market and sees the exact stock.
    LocalTruth { qty: Units },
    /// Remembered intel. `age_ticks` is `None` when never observed.
    RemoteIntel {
        band: InventoryBand,
        age_ticks: Option<Ticks>,
    },
}

/// What the player currently knows about `good` at `market`.
pub fn market_good_view(state: &SimState, market_id: &str, good_id: &str) -> MarketGoodView {
    let local = state.resolve_market_id(&state.player.location_node_id);
    if local.as_deref() == Some(market_id) {
        let qty = state
            .markets
            .get(market_id)
            .map(|m| m.stock(good_id))
            .unwrap_or(0);
        return MarketGoodView::LocalTruth { qty };
    }
    match state.intel.observations.get(&observation_key(market_id, good_id)) {
        Some(obs) => MarketGoodView::RemoteIntel {
            band: InventoryBand::of(obs.observed_qty),
            age_ticks: Some(state.tick.saturating_sub(obs.observed_tick)),
        },
        None => MarketGoodView::RemoteIntel {
            band: InventoryBand::VeryLow,
            age_ticks: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Banded time
// ---------------------------------------------------------------------------

/// Remaining time until an event, for banding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Ticks(i64),
    Never,
}

/// Stable coarse label for a remaining duration.
pub fn band_ticks(remaining: Remaining, ticks_per_day: i64) -> &'static str {
    let ticks = match remaining {
        Remaining::Never => return "INF",
        Remaining::Ticks(t) => t,
    };
    if ticks < 0 || ticks_per_day <= 0 {
        return "?";
    }
    let per_hour = (ticks_per_day / 24).max(1);
    match ticks {
        0 => "NOW",
        t if t < per_hour => "<1h",
        t if t < 6 * per_hour => "<6h",
        t if t < 24 * per_hour => "<1d",
        t if t < 3 * ticks_per_day => "<3d",
        t if t < 7 * ticks_per_day => "<7d",
        _ => "7d+",
    }
}

// ---------------------------------------------------------------------------
// Observation system
// ---------------------------------------------------------------------------

/// Record the player's local market, one observation per good.
pub fn process(state: &mut SimState) {
    let Some(market_id) = state.resolve_market_id(&state.player.location_node_id) else {
        return;
    };
    let Some(market) = state.markets.get(&market_id) else {
        return;
    };
    let tick = state.tick;
    for (good, qty) in &market.inventory {
        state.intel.observations.insert(
            observation_key(&market_id, good),
            IntelObservation {
                observed_tick: tick,
                observed_qty: *qty,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Discovery lifecycle
// ---------------------------------------------------------------------------

/// Reveal the discoveries seeded on `node_id`. Idempotent; emits one
/// `DiscoverySeen` per newly revealed id, in id order.
pub fn mark_seen_on_arrival(state: &mut SimState, fleet_id: &str, node_id: &str) {
    let Some(node) = state.nodes.get(node_id) else {
        return;
    };
    let mut ids = node.seeded_discovery_ids.clone();
    ids.sort();
    ids.dedup();
    for id in ids {
        if state.intel.discoveries.contains_key(&id) {
            continue;
        }
        state
            .intel
            .discoveries
            .insert(id.clone(), Discovery::seen(id.clone(), Some(node_id.to_string())));
        let mut ev = FleetEvent::new(state.tick, FleetEventType::DiscoverySeen, fleet_id);
        ev.node_id = node_id.to_string();
        ev.discovery_id = id;
        ev.phase_after = DiscoveryPhase::Seen.code();
        state.fleet_events.emit(ev);
    }
}

pub fn scan_reason(state: &SimState, discovery_id: &str) -> DiscoveryReasonCode {
    match state.intel.discoveries.get(discovery_id).map(|d| d.phase) {
        None => DiscoveryReasonCode::NotSeen,
        Some(DiscoveryPhase::Analyzed) => DiscoveryReasonCode::AlreadyAnalyzed,
        Some(DiscoveryPhase::Scanned) => DiscoveryReasonCode::NotSeen,
        Some(DiscoveryPhase::Seen) => DiscoveryReasonCode::Ok,
    }
}

pub fn analyze_reason(state: &SimState, fleet_id: &str, discovery_id: &str) -> DiscoveryReasonCode {
    match state.intel.discoveries.get(discovery_id).map(|d| d.phase) {
        None => return DiscoveryReasonCode::NotSeen,
        Some(DiscoveryPhase::Analyzed) => return DiscoveryReasonCode::AlreadyAnalyzed,
        Some(DiscoveryPhase::Seen) => return DiscoveryReasonCode::NotScanned,
        Some(DiscoveryPhase::Scanned) => {}
    }
    let hub = state.player.location_node_id.as_str();
    match state.fleets.get(fleet_id) {
        Some(f) if !hub.is_empty() && f.is_at_node(hub) => DiscoveryReasonCode::Ok,
        _ => DiscoveryReasonCode::OffHub,
    }
}

/// Seen to Scanned.
pub fn apply_scan(state: &mut SimState, fleet_id: &str, discovery_id: &str) -> DiscoveryReasonCode {
    let rc = scan_reason(state, discovery_id);
    if rc != DiscoveryReasonCode::Ok {
        return rc;
    }
    let tick = state.tick;
    if let Some(d) = state.intel.discoveries.get_mut(discovery_id) {
        d.phase = DiscoveryPhase::Scanned;
        d.last_fleet_id = fleet_id.to_string();
        d.last_tick = tick;
    }
    tracing::debug!(target: "tradelane::intel", discovery = discovery_id, fleet = fleet_id, "intel.discovery_scanned");
    rc
}

/// Scanned to Analyzed, only with the fleet at the player's hub. Always
/// emits a `DiscoveryAnalysisOutcome` event, accepted or not.
pub fn apply_analyze(state: &mut SimState, fleet_id: &str, discovery_id: &str) -> DiscoveryReasonCode {
    let rc = analyze_reason(state, fleet_id, discovery_id);
    let tick = state.tick;
    if rc == DiscoveryReasonCode::Ok {
        if let Some(d) = state.intel.discoveries.get_mut(discovery_id) {
            d.phase = DiscoveryPhase::Analyzed;
            d.last_fleet_id = fleet_id.to_string();
            d.last_tick = tick;
        }
    }
    // The node is reported only once the phase gate has passed.
    let node_id = match rc {
        DiscoveryReasonCode::Ok | DiscoveryReasonCode::OffHub => state
            .fleets
            .get(fleet_id)
            .map(|f| f.current_node_id.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };
    let phase_after = state
        .intel
        .discoveries
        .get(discovery_id)
        .map(|d| d.phase.code())
        .unwrap_or(-1);
    let mut ev = FleetEvent::new(tick, FleetEventType::DiscoveryAnalysisOutcome, fleet_id);
    ev.discovery_id = discovery_id.to_string();
    ev.node_id = node_id;
    ev.reason_code = rc.code();
    ev.phase_after = phase_after;
    state.fleet_events.emit(ev);
    rc
}

/// Run an expedition against a known discovery. A fleet away from the
/// discovery node is dispatched toward it (unless a manual override or a
/// logistics job owns it); at the node the activity applies.
pub fn apply_expedition(
    state: &mut SimState,
    fleet_id: &str,
    discovery_id: &str,
    kind: ExpeditionKind,
) -> DiscoveryReasonCode {
    let Some(discovery) = state.intel.discoveries.get(discovery_id) else {
        return DiscoveryReasonCode::SiteNotFound;
    };
    let Some(fleet) = state.fleets.get(fleet_id) else {
        return DiscoveryReasonCode::SiteNotFound;
    };
    let site_node = discovery.node_id.clone();
    let phase = discovery.phase;

    // Analysis happens at the hub, not the site.
    if kind != ExpeditionKind::Analyze {
        if let Some(node) = site_node {
            if !fleet.is_at_node(&node) {
                if matches!(
                    fleet.controller(),
                    Controller::ManualOverride | Controller::LogisticsJob
                ) {
                    return DiscoveryReasonCode::OffHub;
                }
                if let Some(f) = state.fleets.get_mut(fleet_id) {
                    if f.destination_node_id.as_deref() != Some(node.as_str()) {
                        f.clear_route();
                        f.destination_node_id = Some(node);
                    }
                    f.current_task = format!("Expedition {}", kind.as_str());
                }
                return DiscoveryReasonCode::Dispatched;
            }
        }
    }

    match kind {
        ExpeditionKind::Survey => apply_scan(state, fleet_id, discovery_id),
        ExpeditionKind::Analyze => apply_analyze(state, fleet_id, discovery_id),
        ExpeditionKind::Sample | ExpeditionKind::Salvage => {
            if phase == DiscoveryPhase::Seen {
                return DiscoveryReasonCode::NotScanned;
            }
            let tick = state.tick;
            if let Some(d) = state.intel.discoveries.get_mut(discovery_id) {
                d.exploitation_runs += 1;
                d.last_fleet_id = fleet_id.to_string();
                d.last_tick = tick;
            }
            DiscoveryReasonCode::Ok
        }
    }
}

/// Discoveries in ascending id order.
pub fn discoveries_ascending(state: &SimState) -> Vec<&Discovery> {
    state.intel.discoveries.values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed64;
    use crate::fleet::{Fleet, PLAYER_OWNER};
    use crate::market::Market;
    use crate::world::{Node, NodeKind};

    fn state_with_hub() -> SimState {
        let mut s = SimState::new(10);
        for id in ["hub", "x"] {
            s.nodes
                .insert(id.into(), Node::new(id, NodeKind::Station, [Fixed64::ZERO; 3]));
        }
        s.player.location_node_id = "hub".into();
        s.fleets.insert(
            "f1".into(),
            Fleet::new("f1", PLAYER_OWNER, "hub", Fixed64::from_num(1)),
        );
        s
    }

    fn put(s: &mut SimState, id: &str, phase: DiscoveryPhase) {
        let mut d = Discovery::seen(id, None);
        d.phase = phase;
        s.intel.discoveries.insert(id.into(), d);
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(InventoryBand::of(0), InventoryBand::VeryLow);
        assert_eq!(InventoryBand::of(10), InventoryBand::Low);
        assert_eq!(InventoryBand::of(11), InventoryBand::Medium);
        assert_eq!(InventoryBand::of(200), InventoryBand::High);
        assert_eq!(InventoryBand::of(201).as_str(), "VERY_HIGH");
    }

    #[test]
    fn banded_time_labels() {
        let day = 1440;
        assert_eq!(band_ticks(Remaining::Ticks(0), day), "NOW");
        assert_eq!(band_ticks(Remaining::Ticks(59), day), "<1h");
        assert_eq!(band_ticks(Remaining::Ticks(60), day), "<6h");
        assert_eq!(band_ticks(Remaining::Ticks(1439), day), "<1d");
        assert_eq!(band_ticks(Remaining::Ticks(3 * day - 1), day), "<3d");
        assert_eq!(band_ticks(Remaining::Ticks(6 * day), day), "<7d");
        assert_eq!(band_ticks(Remaining::Ticks(7 * day), day), "7d+");
        assert_eq!(band_ticks(Remaining::Never, day), "INF");
        assert_eq!(band_ticks(Remaining::Ticks(-1), day), "?");
    }

    #[test]
    fn local_market_is_truth_remote_is_banded() {
        let mut s = state_with_hub();
        if let Some(n) = s.nodes.get_mut("hub") {
            n.market_id = Some("m_hub".into());
        }
        let mut m = Market::new("m_hub");
        m.inventory.insert("ore".into(), 7);
        s.markets.insert("m_hub".into(), m);
        s.markets.insert("m_far".into(), Market::new("m_far"));

        process(&mut s);
        assert_eq!(
            market_good_view(&s, "m_hub", "ore"),
            MarketGoodView::LocalTruth { qty: 7 }
        );
        assert_eq!(
            market_good_view(&s, "m_far", "ore"),
            MarketGoodView::RemoteIntel {
                band: InventoryBand::VeryLow,
                age_ticks: None
            }
        );

        // Walk away: the hub becomes remote intel that ages.
        s.player.location_node_id = "x".into();
        s.tick = 30;
        assert_eq!(
            market_good_view(&s, "m_hub", "ore"),
            MarketGoodView::RemoteIntel {
                band: InventoryBand::Low,
                age_ticks: Some(30)
            }
        );
    }

    #[test]
    fn scan_moves_seen_to_scanned_only() {
        let mut s = state_with_hub();
        assert_eq!(scan_reason(&s, "nope"), DiscoveryReasonCode::NotSeen);
        put(&mut s, "d1", DiscoveryPhase::Seen);
        assert_eq!(apply_scan(&mut s, "f1", "d1"), DiscoveryReasonCode::Ok);
        assert_eq!(s.intel.discoveries["d1"].phase, DiscoveryPhase::Scanned);
        assert_eq!(apply_scan(&mut s, "f1", "d1"), DiscoveryReasonCode::NotSeen);
        assert_eq!(s.intel.discoveries["d1"].phase, DiscoveryPhase::Scanned);
    }

    #[test]
    fn analyze_requires_hub_and_emits_outcome() {
        let mut s = state_with_hub();
        put(&mut s, "d1", DiscoveryPhase::Scanned);
        if let Some(f) = s.fleets.get_mut("f1") {
            f.current_node_id = "x".into();
        }
        assert_eq!(apply_analyze(&mut s, "f1", "d1"), DiscoveryReasonCode::OffHub);
        assert_eq!(s.intel.discoveries["d1"].phase, DiscoveryPhase::Scanned);

        if let Some(f) = s.fleets.get_mut("f1") {
            f.current_node_id = "hub".into();
        }
        assert_eq!(apply_analyze(&mut s, "f1", "d1"), DiscoveryReasonCode::Ok);
        s.finalize_events();
        let last = s.fleet_events.events().last().cloned().unwrap_or_default();
        assert_eq!(last.kind, FleetEventType::DiscoveryAnalysisOutcome);
        assert_eq!(last.node_id, "hub");
        assert_eq!(last.phase_after, 2);
        assert_eq!(
            analyze_reason(&s, "f1", "d1"),
            DiscoveryReasonCode::AlreadyAnalyzed
        );
    }

    #[test]
    fn arrival_reveals_seeded_discoveries_once() {
        let mut s = state_with_hub();
        if let Some(n) = s.nodes.get_mut("x") {
            n.seeded_discovery_ids = vec!["d2".into(), "d1".into(), "d1".into()];
        }
        mark_seen_on_arrival(&mut s, "f1", "x");
        mark_seen_on_arrival(&mut s, "f1", "x");
        s.finalize_events();
        let ids: Vec<&str> = s
            .fleet_events
            .events()
            .iter()
            .map(|e| e.discovery_id.as_str())
            .collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert_eq!(discoveries_ascending(&s).len(), 2);
    }

    #[test]
    fn expedition_dispatches_then_surveys_on_site() {
        let mut s = state_with_hub();
        s.intel
            .discoveries
            .insert("d1".into(), Discovery::seen("d1", Some("x".into())));

        let rc = apply_expedition(&mut s, "f1", "d1", ExpeditionKind::Survey);
        assert_eq!(rc, DiscoveryReasonCode::Dispatched);
        assert_eq!(s.fleets["f1"].destination_node_id.as_deref(), Some("x"));

        if let Some(f) = s.fleets.get_mut("f1") {
            f.current_node_id = "x".into();
        }
        let rc = apply_expedition(&mut s, "f1", "d1", ExpeditionKind::Survey);
        assert_eq!(rc, DiscoveryReasonCode::Ok);
        assert_eq!(s.intel.discoveries["d1"].phase, DiscoveryPhase::Scanned);

        let rc = apply_expedition(&mut s, "f1", "d1", ExpeditionKind::Salvage);
        assert_eq!(rc, DiscoveryReasonCode::Ok);
        assert_eq!(s.intel.discoveries["d1"].exploitation_runs, 1);
        assert_eq!(
            apply_expedition(&mut s, "f1", "missing", ExpeditionKind::Sample),
            DiscoveryReasonCode::SiteNotFound
        );
    }
}
