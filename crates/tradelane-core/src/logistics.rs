//! Logistics jobs: reservation-backed pickup/deliver hauls, plus periodic
//! shortage dispatch for idle AI fleets.
//!
//! The job state machine is `Pickup -> Deliver -> (complete | cancel)`. The
//! system only changes job, route and reservation state; the cargo moves
//! through `LoadCargo`/`UnloadCargo` intents that apply at the next tick's
//! intent step.

use serde::{Deserialize, Serialize};

use crate::event::{LogisticsEvent, LogisticsEventType};
use crate::fixed::{Ticks, Units};
use crate::fleet::{AI_OWNER, Controller, JobPhase, LogisticsJob};
use crate::industry;
use crate::intent::Intent;
use crate::route;
use crate::sim::SimState;

/// Shortage scan cadence.
pub const DISPATCH_CADENCE_TICKS: Ticks = 60;
/// Most units a dispatched job will haul.
pub const HAUL_CAP_UNITS: Units = 50;

/// Units held back at a market for one fleet's pickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsReservation {
    pub id: String,
    pub market_id: String,
    pub good_id: String,
    pub fleet_id: String,
    pub remaining: Units,
}

fn job_event(state: &SimState, kind: LogisticsEventType, fleet_id: &str, job: &LogisticsJob) -> LogisticsEvent {
    let mut ev = LogisticsEvent::new(state.tick, kind, fleet_id);
    ev.good_id = job.good_id.clone();
    ev.amount = job.amount;
    ev.source_node_id = job.source_node_id.clone();
    ev.target_node_id = job.target_node_id.clone();
    ev.source_market_id = job.source_market_id.clone();
    ev.target_market_id = job.target_market_id.clone();
    ev
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

/// Draw down a reservation; it disappears once empty.
pub(crate) fn consume_reservation(state: &mut SimState, reservation_id: &str, qty: Units) {
    let Some(r) = state.reservations.get_mut(reservation_id) else {
        return;
    };
    r.remaining = (r.remaining - qty.max(0)).max(0);
    if r.remaining == 0 {
        state.reservations.remove(reservation_id);
    }
}

/// Drop a reservation. Returns the units it still held.
pub fn release_reservation(state: &mut SimState, reservation_id: &str) -> Units {
    state
        .reservations
        .remove(reservation_id)
        .map(|r| r.remaining)
        .unwrap_or(0)
}

/// Stock at `market` not held by any reservation.
pub fn unreserved(state: &SimState, market_id: &str, good_id: &str) -> Units {
    let stock = state
        .markets
        .get(market_id)
        .map(|m| m.stock(good_id))
        .unwrap_or(0);
    (stock - state.total_reserved(market_id, good_id)).max(0)
}

// ---------------------------------------------------------------------------
// Planning and cancellation
// ---------------------------------------------------------------------------

/// Create a haul job for `fleet_id`, reserving up to `amount` at the source.
/// Returns false with no mutation when the request cannot be honoured.
pub fn plan_logistics(
    state: &mut SimState,
    fleet_id: &str,
    source_market_id: &str,
    target_market_id: &str,
    good_id: &str,
    amount: Units,
) -> bool {
    if amount <= 0 || good_id.is_empty() || source_market_id == target_market_id {
        return false;
    }
    let Some(fleet) = state.fleets.get(fleet_id) else {
        return false;
    };
    if fleet.current_job.is_some() || fleet.controller() == Controller::ManualOverride {
        return false;
    }
    if !state.markets.contains_key(source_market_id) || !state.markets.contains_key(target_market_id) {
        return false;
    }
    let (Some(source_node), Some(target_node)) = (
        state.market_node_id(source_market_id).map(str::to_string),
        state.market_node_id(target_market_id).map(str::to_string),
    ) else {
        return false;
    };
    let reserve = amount.min(unreserved(state, source_market_id, good_id));
    if reserve <= 0 {
        return false;
    }
    let Some(pickup) = route::plan(state, &fleet.current_node_id, &source_node, fleet.speed) else {
        return false;
    };
    let Some(deliver) = route::plan(state, &source_node, &target_node, fleet.speed) else {
        return false;
    };

    let job_id = state.next_job_id();
    let reservation_id = state.next_reservation_id();
    state.reservations.insert(
        reservation_id.clone(),
        LogisticsReservation {
            id: reservation_id.clone(),
            market_id: source_market_id.to_string(),
            good_id: good_id.to_string(),
            fleet_id: fleet_id.to_string(),
            remaining: reserve,
        },
    );
    let job = LogisticsJob {
        id: job_id,
        good_id: good_id.to_string(),
        source_node_id: source_node.clone(),
        target_node_id: target_node,
        source_market_id: source_market_id.to_string(),
        target_market_id: target_market_id.to_string(),
        amount: reserve,
        phase: JobPhase::Pickup,
        reservation_id: Some(reservation_id.clone()),
        pickup_leg: pickup.edge_ids,
        deliver_leg: deliver.edge_ids,
    };

    let planned = job_event(state, LogisticsEventType::JobPlanned, fleet_id, &job);
    let mut reserved = job_event(state, LogisticsEventType::ReservationCreated, fleet_id, &job);
    reserved.note = reservation_id;
    state.logistics_events.emit(planned);
    state.logistics_events.emit(reserved);

    if let Some(f) = state.fleets.get_mut(fleet_id) {
        f.current_task = format!("Fetch {} from {}", job.good_id, job.source_node_id);
        if f.destination_node_id.as_deref() != Some(source_node.as_str()) {
            f.clear_route();
            f.destination_node_id = Some(source_node);
        }
        tracing::debug!(
            target: "tradelane::logistics",
            fleet = fleet_id,
            job = %job.id,
            amount = job.amount,
            "logistics.job_planned"
        );
        f.current_job = Some(job);
    }
    true
}

/// Cancel the fleet's job, releasing its reservation. Returns false when
/// there was no job.
pub fn cancel_job(state: &mut SimState, fleet_id: &str, note: &str) -> bool {
    let Some(job) = state.fleets.get_mut(fleet_id).and_then(|f| f.current_job.take()) else {
        return false;
    };
    if let Some(f) = state.fleets.get_mut(fleet_id) {
        f.current_task = "Idle".to_string();
    }
    release_job_reservation(state, fleet_id, &job);
    let mut ev = job_event(state, LogisticsEventType::JobCanceled, fleet_id, &job);
    ev.note = note.to_string();
    state.logistics_events.emit(ev);
    tracing::debug!(target: "tradelane::logistics", fleet = fleet_id, job = %job.id, "logistics.job_canceled");
    true
}

fn release_job_reservation(state: &mut SimState, fleet_id: &str, job: &LogisticsJob) {
    let Some(rid) = job.reservation_id.as_deref() else {
        return;
    };
    let left = release_reservation(state, rid);
    if left > 0 {
        let mut ev = job_event(state, LogisticsEventType::ReservationReleased, fleet_id, job);
        ev.amount = left;
        ev.note = rid.to_string();
        state.logistics_events.emit(ev);
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub fn process(state: &mut SimState) {
    let ids: Vec<String> = state
        .fleets
        .values()
        .filter(|f| f.current_job.is_some())
        .map(|f| f.id.clone())
        .collect();
    for id in ids {
        advance_job(state, &id);
    }

    if state.tick % DISPATCH_CADENCE_TICKS == 0 {
        dispatch_shortages(state);
    }
}

fn advance_job(state: &mut SimState, fleet_id: &str) {
    let Some(fleet) = state.fleets.get(fleet_id) else {
        return;
    };
    let Some(job) = fleet.current_job.clone() else {
        return;
    };

    match job.phase {
        JobPhase::Pickup => {
            if !fleet.is_at_node(&job.source_node_id) {
                if fleet.destination_node_id.is_none() && !fleet.state.is_moving() {
                    if let Some(f) = state.fleets.get_mut(fleet_id) {
                        f.destination_node_id = Some(job.source_node_id.clone());
                    }
                }
                return;
            }
            state.enqueue_intent(Intent::LoadCargo {
                fleet_id: fleet_id.to_string(),
                market_id: job.source_market_id.clone(),
                good_id: job.good_id.clone(),
                quantity: job.amount,
            });
            let issued = job_event(state, LogisticsEventType::PickupIssued, fleet_id, &job);
            let phase = job_event(state, LogisticsEventType::PhaseChangedToDeliver, fleet_id, &job);
            state.logistics_events.emit(issued);
            state.logistics_events.emit(phase);
            if let Some(f) = state.fleets.get_mut(fleet_id) {
                if let Some(j) = f.current_job.as_mut() {
                    j.phase = JobPhase::Deliver;
                }
                f.clear_route();
                f.destination_node_id = Some(job.target_node_id.clone());
                f.current_task = format!("Deliver {} to {}", job.good_id, job.target_node_id);
            }
        }
        JobPhase::Deliver => {
            if !fleet.is_at_node(&job.target_node_id) {
                if fleet.destination_node_id.is_none() && !fleet.state.is_moving() {
                    if let Some(f) = state.fleets.get_mut(fleet_id) {
                        f.destination_node_id = Some(job.target_node_id.clone());
                    }
                }
                return;
            }
            state.enqueue_intent(Intent::UnloadCargo {
                fleet_id: fleet_id.to_string(),
                market_id: job.target_market_id.clone(),
                good_id: job.good_id.clone(),
                quantity: job.amount,
            });
            let issued = job_event(state, LogisticsEventType::DeliveryIssued, fleet_id, &job);
            state.logistics_events.emit(issued);
            release_job_reservation(state, fleet_id, &job);
            let done = job_event(state, LogisticsEventType::JobCompleted, fleet_id, &job);
            state.logistics_events.emit(done);
            if let Some(f) = state.fleets.get_mut(fleet_id) {
                f.current_job = None;
                f.current_task = "Idle".to_string();
            }
            tracing::debug!(target: "tradelane::logistics", fleet = fleet_id, job = %job.id, "logistics.job_completed");
        }
    }
}

/// Units at `market` beyond what reservations and the local sites' buffers
/// claim.
fn surplus(state: &SimState, market_id: &str, good_id: &str) -> Units {
    let local_demand: Units = state
        .industry_sites
        .values()
        .filter(|s| s.active && s.market_id(state).as_deref() == Some(market_id))
        .map(|s| industry::buffer_target(s, good_id))
        .sum();
    unreserved(state, market_id, good_id) - local_demand
}

/// Assign haul jobs to idle AI fleets for sites short of an input.
fn dispatch_shortages(state: &mut SimState) {
    let mut shortages: Vec<(String, String, Units)> = Vec::new();
    for site in state.industry_sites.values().filter(|s| s.active) {
        let Some(market_id) = site.market_id(state) else {
            continue;
        };
        let Some(market) = state.markets.get(&market_id) else {
            continue;
        };
        for good in site.inputs.keys() {
            let target = industry::buffer_target(site, good);
            let incoming: Units = state
                .fleets
                .values()
                .filter_map(|f| f.current_job.as_ref())
                .filter(|j| j.target_market_id == market_id && &j.good_id == good)
                .map(|j| j.amount)
                .sum();
            let need = target - market.stock(good) - incoming;
            if need > 0 {
                shortages.push((market_id.clone(), good.clone(), need));
            }
        }
    }

    for (target_market, good, need) in shortages {
        let Some(target_node) = state.market_node_id(&target_market).map(str::to_string) else {
            continue;
        };
        let hops = route::hop_distances(state, &target_node);
        let Some((source_market, avail)) = state
            .markets
            .keys()
            .filter(|m| **m != target_market)
            .filter_map(|m| {
                let node = state.market_node_id(m)?;
                let d = *hops.get(node)?;
                let s = surplus(state, m, &good);
                (s > 0).then(|| (d, m.clone(), s))
            })
            .min_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)))
            .map(|(_, m, s)| (m, s))
        else {
            continue;
        };
        let Some(source_node) = state.market_node_id(&source_market).map(str::to_string) else {
            continue;
        };

        let from_source = route::hop_distances(state, &source_node);
        let Some(fleet_id) = state
            .fleets
            .values()
            .filter(|f| f.owner_id == AI_OWNER && f.controller() == Controller::None)
            .filter(|f| !f.state.is_moving() && f.destination_node_id.is_none())
            .filter_map(|f| from_source.get(&f.current_node_id).map(|d| (*d, f.id.clone())))
            .min()
            .map(|(_, id)| id)
        else {
            continue;
        };

        let amount = need.min(avail).min(HAUL_CAP_UNITS);
        plan_logistics(state, &fleet_id, &source_market, &target_market, &good, amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed64;
    use crate::fleet::{Fleet, PLAYER_OWNER};
    use crate::intent;
    use crate::market::Market;
    use crate::world::{Edge, Node, NodeKind};

    fn f(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    /// Supplier `s` with 6 ore, two destinations, all one lane from `s`.
    fn reservation_world() -> SimState {
        let mut st = SimState::new(42);
        for (i, id) in ["d1", "d2", "s"].iter().enumerate() {
            let mut n = Node::new(*id, NodeKind::Station, [f(i as f64), f(0.0), f(0.0)]);
            n.market_id = Some(format!("m_{id}"));
            st.nodes.insert(id.to_string(), n);
            st.markets.insert(format!("m_{id}"), Market::new(format!("m_{id}")));
        }
        if let Some(m) = st.markets.get_mut("m_s") {
            m.inventory.insert("ore".into(), 6);
        }
        st.edges.insert("e_s_d1".into(), Edge::new("e_s_d1", "s", "d1", f(1.0), 5));
        st.edges.insert("e_s_d2".into(), Edge::new("e_s_d2", "s", "d2", f(1.0), 5));
        for id in ["f1", "f2", "thief"] {
            st.fleets
                .insert(id.into(), Fleet::new(id, PLAYER_OWNER, "s", f(1.0)));
        }
        st
    }

    fn tick(st: &mut SimState) {
        intent::process(st);
        crate::movement::process(st);
        process(st);
        st.finalize_events();
        st.tick += 1;
    }

    // -----------------------------------------------------------------------
    // Test 1: reservations clamp to what is left, in planning order
    // -----------------------------------------------------------------------
    #[test]
    fn reservations_clamp_in_planning_order() {
        let mut st = reservation_world();
        assert!(plan_logistics(&mut st, "f1", "m_s", "m_d1", "ore", 5));
        assert!(plan_logistics(&mut st, "f2", "m_s", "m_d2", "ore", 5));
        assert_eq!(st.total_reserved("m_s", "ore"), 6);
        assert_eq!(st.fleets["f2"].current_job.as_ref().map(|j| j.amount), Some(1));

        // Nothing left for a third job.
        assert!(!plan_logistics(&mut st, "thief", "m_s", "m_d1", "ore", 1));

        // A non-owner load gets nothing.
        assert_eq!(intent::apply_load_cargo(&mut st, "thief", "m_s", "ore", 6), 0);
    }

    // -----------------------------------------------------------------------
    // Test 2: both jobs run to completion and drain the supplier exactly
    // -----------------------------------------------------------------------
    #[test]
    fn jobs_deliver_reserved_amounts() {
        let mut st = reservation_world();
        assert!(plan_logistics(&mut st, "f1", "m_s", "m_d1", "ore", 5));
        assert!(plan_logistics(&mut st, "f2", "m_s", "m_d2", "ore", 5));
        for _ in 0..12 {
            tick(&mut st);
        }
        assert_eq!(st.markets["m_d1"].stock("ore"), 5);
        assert_eq!(st.markets["m_d2"].stock("ore"), 1);
        assert_eq!(st.markets["m_s"].stock("ore"), 0);
        assert!(st.reservations.is_empty());
        assert!(st.fleets.values().all(|f| f.current_job.is_none()));

        let kinds: Vec<LogisticsEventType> = st
            .logistics_events
            .events()
            .iter()
            .filter(|e| e.fleet_id == "f1")
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                LogisticsEventType::JobPlanned,
                LogisticsEventType::ReservationCreated,
                LogisticsEventType::PickupIssued,
                LogisticsEventType::PhaseChangedToDeliver,
                LogisticsEventType::DeliveryIssued,
                LogisticsEventType::JobCompleted,
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Test 3: invalid plans change nothing
    // -----------------------------------------------------------------------
    #[test]
    fn invalid_plans_are_noops() {
        let mut st = reservation_world();
        let before = st.clone();
        assert!(!plan_logistics(&mut st, "f1", "m_s", "m_s", "ore", 1));
        assert!(!plan_logistics(&mut st, "f1", "m_s", "m_d1", "ore", 0));
        assert!(!plan_logistics(&mut st, "ghost", "m_s", "m_d1", "ore", 1));
        assert!(!plan_logistics(&mut st, "f1", "m_s", "m_nope", "ore", 1));
        assert!(!plan_logistics(&mut st, "f1", "m_d1", "m_d2", "ore", 1));
        if let Some(fl) = st.fleets.get_mut("f1") {
            fl.manual_override_node_id = Some("d1".into());
        }
        assert!(!plan_logistics(&mut st, "f1", "m_s", "m_d1", "ore", 1));
        if let Some(fl) = st.fleets.get_mut("f1") {
            fl.manual_override_node_id = None;
        }
        assert_eq!(st, before);
    }

    #[test]
    fn cancel_releases_reservation() {
        let mut st = reservation_world();
        assert!(plan_logistics(&mut st, "f1", "m_s", "m_d1", "ore", 4));
        assert!(cancel_job(&mut st, "f1", "test"));
        assert!(st.reservations.is_empty());
        assert!(!cancel_job(&mut st, "f1", "test"));
        st.finalize_events();
        let last = st.logistics_events.events().last().map(|e| e.kind);
        assert_eq!(last, Some(LogisticsEventType::JobCanceled));
    }

    #[test]
    fn shortage_dispatch_assigns_idle_ai_fleet() {
        let mut st = reservation_world();
        st.fleets.clear();
        st.fleets
            .insert("ai_1".into(), Fleet::new("ai_1", AI_OWNER, "d2", f(1.0)));
        st.industry_sites.insert(
            "fac".into(),
            industry::IndustrySite::new("fac", "d1")
                .with_input("ore", 1)
                .with_output("metal", 1),
        );
        if let Some(m) = st.markets.get_mut("m_s") {
            m.inventory.insert("ore".into(), 500);
        }

        process(&mut st);
        let job = st.fleets["ai_1"].current_job.clone();
        assert_eq!(job.as_ref().map(|j| j.source_market_id.as_str()), Some("m_s"));
        assert_eq!(job.as_ref().map(|j| j.amount), Some(HAUL_CAP_UNITS));
    }
}
