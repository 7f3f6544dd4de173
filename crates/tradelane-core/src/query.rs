//! Read-only query API for collaborators.
//!
//! Every function here is a pure function of `&SimState` and returns owned
//! snapshot types, so rendering and UI code never hold references into the
//! state container.

use serde::{Deserialize, Serialize};

use crate::fixed::{BPS_SCALE, Fixed64, TICKS_PER_DAY, Ticks, Units};
use crate::industry::{IndustrySite, buffer_target, supply_ratio_bps};
use crate::intel::{Remaining, band_ticks};
use crate::ledger::{self, Inventory};
use crate::risk::RiskBand;
use crate::route::edge_risk_score;
use crate::sim::SimState;

// ---------------------------------------------------------------------------
// Galaxy snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub pos: [Fixed64; 3],
    pub market_id: Option<String>,
    pub world_class_id: Option<String>,
    pub trace: Fixed64,
    /// Fleets docked or idle at this node.
    pub fleet_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSnapshot {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub distance: Fixed64,
    pub total_capacity: u32,
    pub used_capacity: u32,
    pub heat: Fixed64,
    pub risk_band: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxySnapshot {
    pub tick: Ticks,
    pub player_location_node_id: String,
    pub selected_destination_node_id: Option<String>,
    pub nodes: Vec<NodeSnapshot>,
    pub lanes: Vec<LaneSnapshot>,
}

pub fn galaxy_snapshot(state: &SimState) -> GalaxySnapshot {
    let nodes = state
        .nodes
        .values()
        .map(|n| NodeSnapshot {
            id: n.id.clone(),
            kind: n.kind.as_str().to_string(),
            name: n.name.clone(),
            pos: n.pos,
            market_id: n.market_id.clone(),
            world_class_id: n.world_class_id.clone(),
            trace: n.trace,
            fleet_count: state.fleets.values().filter(|f| f.is_at_node(&n.id)).count(),
        })
        .collect();
    let lanes = state
        .edges
        .values()
        .map(|e| LaneSnapshot {
            id: e.id.clone(),
            from_node_id: e.from_node_id.clone(),
            to_node_id: e.to_node_id.clone(),
            distance: e.distance,
            total_capacity: e.total_capacity,
            used_capacity: e.used_capacity,
            heat: e.heat,
            risk_band: RiskBand::from_score(edge_risk_score(e)).as_str().to_string(),
        })
        .collect();
    GalaxySnapshot {
        tick: state.tick,
        player_location_node_id: state.player.location_node_id.clone(),
        selected_destination_node_id: state.player.selected_destination_node_id.clone(),
        nodes,
        lanes,
    }
}

// ---------------------------------------------------------------------------
// Fleet explain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExplain {
    pub job_id: String,
    pub good_id: String,
    pub phase: String,
    pub amount: Units,
    pub source_node_id: String,
    pub target_node_id: String,
    pub reservation_id: Option<String>,
    /// Units still held by the job's reservation.
    pub reserved_remaining: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetExplain {
    pub fleet_id: String,
    pub owner_id: String,
    pub state: String,
    /// The derived active controller.
    pub controller: String,
    pub current_node_id: String,
    pub destination_node_id: Option<String>,
    pub final_destination_node_id: Option<String>,
    pub current_edge_id: Option<String>,
    pub remaining_route_edge_ids: Vec<String>,
    pub travel_progress: Fixed64,
    pub current_task: String,
    pub lane_wait: bool,
    pub program_id: Option<String>,
    pub manual_override_node_id: Option<String>,
    pub job: Option<JobExplain>,
    pub cargo: Inventory,
}

pub fn fleet_explain(state: &SimState, fleet_id: &str) -> Option<FleetExplain> {
    let f = state.fleets.get(fleet_id)?;
    let job = f.current_job.as_ref().map(|j| JobExplain {
        job_id: j.id.clone(),
        good_id: j.good_id.clone(),
        phase: j.phase.as_str().to_string(),
        amount: j.amount,
        source_node_id: j.source_node_id.clone(),
        target_node_id: j.target_node_id.clone(),
        reservation_id: j.reservation_id.clone(),
        reserved_remaining: j
            .reservation_id
            .as_deref()
            .and_then(|r| state.reservations.get(r))
            .map(|r| r.remaining)
            .unwrap_or(0),
    });
    Some(FleetExplain {
        fleet_id: f.id.clone(),
        owner_id: f.owner_id.clone(),
        state: f.state.as_str().to_string(),
        controller: f.controller().as_str().to_string(),
        current_node_id: f.current_node_id.clone(),
        destination_node_id: f.destination_node_id.clone(),
        final_destination_node_id: f.final_destination_node_id.clone(),
        current_edge_id: f.current_edge_id.clone(),
        remaining_route_edge_ids: f
            .route_edge_ids
            .iter()
            .skip(f.route_edge_index)
            .cloned()
            .collect(),
        travel_progress: f.travel_progress,
        current_task: f.current_task.clone(),
        lane_wait: f.lane_wait,
        program_id: f.program_id.clone(),
        manual_override_node_id: f.manual_override_node_id.clone(),
        job,
        cargo: f.cargo.clone(),
    })
}

/// Explain every fleet, in fleet id order.
pub fn fleet_explain_all(state: &SimState) -> Vec<FleetExplain> {
    state
        .fleets
        .keys()
        .filter_map(|id| fleet_explain(state, id))
        .collect()
}

// ---------------------------------------------------------------------------
// Sustainment snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SustainmentInput {
    pub good_id: String,
    pub have_units: Units,
    pub per_tick_required: Units,
    pub buffer_target_units: Units,
    /// Ticks of upkeep on hand. `None` means unbounded.
    pub coverage_ticks: Option<i64>,
    pub coverage_band: String,
    /// `(have - target) / max(1, target)` in basis points.
    pub buffer_margin_bps: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SustainmentSite {
    pub site_id: String,
    pub node_id: String,
    pub health_bps: i64,
    pub efficiency_bps: i64,
    /// Supply ratio the site would run at this tick.
    pub eff_bps_now: i64,
    pub degrade_per_day_bps: i64,
    pub worst_buffer_margin_bps: i64,
    pub time_to_starve_ticks: Option<i64>,
    pub starve_band: String,
    pub time_to_failure_ticks: Option<i64>,
    pub fail_band: String,
    pub inputs: Vec<SustainmentInput>,
}

fn band(ticks: Option<i64>) -> String {
    let remaining = match ticks {
        Some(t) => Remaining::Ticks(t),
        None => Remaining::Never,
    };
    band_ticks(remaining, TICKS_PER_DAY as i64).to_string()
}

/// Sustainment for the active sites at `node_id`, in site id order. Empty
/// when the node has no market.
pub fn sustainment_for_node(state: &SimState, node_id: &str) -> Vec<SustainmentSite> {
    let Some(market) = state
        .resolve_market_id(node_id)
        .and_then(|m| state.markets.get(&m))
    else {
        return Vec::new();
    };
    state
        .industry_sites
        .values()
        .filter(|s| s.active && s.node_id == node_id)
        .map(|s| sustainment_for_site(s, &market.inventory))
        .collect()
}

pub fn sustainment_for_site(site: &IndustrySite, market: &Inventory) -> SustainmentSite {
    let mut inputs = Vec::new();
    let mut starve: Option<i64> = None;
    let mut worst_margin: Option<i64> = None;

    for (good, per_tick) in site.inputs.iter().filter(|(_, q)| **q > 0) {
        let have = ledger::get(market, good);
        let target = buffer_target(site, good);
        let coverage = have.max(0) / per_tick;
        let margin = (have - target).saturating_mul(BPS_SCALE) / target.max(1);

        starve = Some(starve.map_or(coverage, |s| s.min(coverage)));
        worst_margin = Some(worst_margin.map_or(margin, |m| m.min(margin)));

        inputs.push(SustainmentInput {
            good_id: good.clone(),
            have_units: have,
            per_tick_required: *per_tick,
            buffer_target_units: target,
            coverage_ticks: Some(coverage),
            coverage_band: band(Some(coverage)),
            buffer_margin_bps: margin,
        });
    }

    let eff_now = supply_ratio_bps(&site.inputs, market);
    let failure = time_to_failure(site, starve, eff_now);

    SustainmentSite {
        site_id: site.id.clone(),
        node_id: site.node_id.clone(),
        health_bps: site.health_bps,
        efficiency_bps: site.efficiency_bps,
        eff_bps_now: eff_now,
        degrade_per_day_bps: site.degrade_per_day_bps,
        worst_buffer_margin_bps: worst_margin.unwrap_or(0),
        time_to_starve_ticks: starve,
        starve_band: band(starve),
        time_to_failure_ticks: failure,
        fail_band: band(failure),
        inputs,
    }
}

/// Closed-form estimate: run fully supplied until the first input starves,
/// then degrade at full deficit. A site already undersupplied degrades at
/// its current deficit from now.
fn time_to_failure(site: &IndustrySite, starve: Option<i64>, eff_now: i64) -> Option<i64> {
    if site.health_bps <= 0 {
        return Some(0);
    }
    let starve = starve?;
    if site.degrade_per_day_bps <= 0 {
        return Some(starve);
    }
    if eff_now < BPS_SCALE {
        return ticks_to_health_zero(site, BPS_SCALE - eff_now);
    }
    let stage2 = ticks_to_health_zero(site, BPS_SCALE)?;
    starve.checked_add(stage2)
}

/// Smallest `n` with `n * degrade * deficit + remainder >= health * day`,
/// matching the industry degradation carry.
fn ticks_to_health_zero(site: &IndustrySite, deficit_bps: i64) -> Option<i64> {
    let per_tick = site.degrade_per_day_bps.checked_mul(deficit_bps)?;
    if per_tick <= 0 {
        return None;
    }
    let day = TICKS_PER_DAY as i64 * BPS_SCALE;
    let needed = site.health_bps.checked_mul(day)? - site.degrade_remainder;
    if needed <= 0 {
        return Some(0);
    }
    Some((needed + per_tick - 1) / per_tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Fleet, PLAYER_OWNER};
    use crate::market::Market;
    use crate::world::{Edge, Node, NodeKind};

    fn state() -> SimState {
        let mut s = SimState::new(1);
        for id in ["a", "b"] {
            let mut n = Node::new(id, NodeKind::Station, [Fixed64::ZERO; 3]);
            n.market_id = Some(format!("m_{id}"));
            s.nodes.insert(id.into(), n);
            s.markets.insert(format!("m_{id}"), Market::new(format!("m_{id}")));
        }
        s.edges
            .insert("l".into(), Edge::new("l", "a", "b", Fixed64::from_num(2), 3));
        s.fleets.insert(
            "f1".into(),
            Fleet::new("f1", PLAYER_OWNER, "a", Fixed64::from_num(1)),
        );
        s.player.location_node_id = "a".into();
        s
    }

    // -----------------------------------------------------------------------
    // Test 1: galaxy snapshot mirrors topology in id order
    // -----------------------------------------------------------------------
    #[test]
    fn galaxy_snapshot_lists_everything() {
        let snap = galaxy_snapshot(&state());
        assert_eq!(snap.nodes.len(), 2);
        assert_eq!(snap.nodes[0].id, "a");
        assert_eq!(snap.nodes[0].fleet_count, 1);
        assert_eq!(snap.nodes[1].fleet_count, 0);
        assert_eq!(snap.lanes[0].risk_band, "MED");
        assert_eq!(snap.player_location_node_id, "a");
    }

    // -----------------------------------------------------------------------
    // Test 2: fleet explain reports the derived controller
    // -----------------------------------------------------------------------
    #[test]
    fn fleet_explain_controller() {
        let mut s = state();
        assert_eq!(fleet_explain(&s, "f1").map(|e| e.controller), Some("None".to_string()));
        if let Some(f) = s.fleets.get_mut("f1") {
            f.manual_override_node_id = Some("b".into());
            f.program_id = Some("P1".into());
        }
        let e = fleet_explain(&s, "f1").unwrap();
        assert_eq!(e.controller, "ManualOverride");
        assert!(e.job.is_none());
        assert!(fleet_explain(&s, "ghost").is_none());
        assert_eq!(fleet_explain_all(&s).len(), 1);
    }

    // -----------------------------------------------------------------------
    // Test 3: sustainment coverage, bands and failure estimate
    // -----------------------------------------------------------------------
    #[test]
    fn sustainment_bands() {
        let mut s = state();
        let mut site = IndustrySite::new("fac", "a")
            .with_input("ore", 10)
            .with_input("fuel", 1)
            .with_output("metal", 5);
        site.degrade_per_day_bps = 500;
        s.industry_sites.insert("fac".into(), site);
        if let Some(m) = s.markets.get_mut("m_a") {
            m.inventory.insert("ore".into(), 100);
            m.inventory.insert("fuel".into(), 5000);
        }

        let report = sustainment_for_node(&s, "a");
        assert_eq!(report.len(), 1);
        let site = &report[0];
        assert_eq!(site.eff_bps_now, BPS_SCALE);
        assert_eq!(site.time_to_starve_ticks, Some(10));
        assert_eq!(site.starve_band, "<1h");
        // 10 ticks of supply, then 10000 bps at 500 per day: 20 days.
        assert_eq!(site.time_to_failure_ticks, Some(10 + 20 * 1440));
        assert_eq!(site.fail_band, "7d+");
        let fuel = &site.inputs[0];
        assert_eq!(fuel.good_id, "fuel");
        assert_eq!(fuel.coverage_ticks, Some(5000));
        assert_eq!(fuel.coverage_band, "<7d");
        assert_eq!(fuel.buffer_target_units, 1440);
        assert!(site.worst_buffer_margin_bps < 0);

        assert!(sustainment_for_node(&s, "nowhere").is_empty());
    }

    #[test]
    fn no_inputs_never_starve() {
        let well = IndustrySite::new("well", "a").with_output("fuel", 5);
        let report = sustainment_for_site(&well, &Inventory::new());
        assert_eq!(report.time_to_starve_ticks, None);
        assert_eq!(report.starve_band, "INF");
        assert_eq!(report.fail_band, "INF");
    }

    #[test]
    fn undersupplied_site_degrades_from_now() {
        let mut site = IndustrySite::new("fac", "a").with_input("ore", 10);
        site.degrade_per_day_bps = 1000;
        let mut m = Inventory::new();
        m.insert("ore".into(), 5);
        let r = sustainment_for_site(&site, &m);
        assert_eq!(r.eff_bps_now, 5000);
        // Half deficit at 1000/day: 20 days to zero.
        assert_eq!(r.time_to_failure_ticks, Some(20 * 1440));
    }
}
