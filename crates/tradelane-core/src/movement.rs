//! Lane movement: route planning, lane-slot departure, progress and
//! arrival for every fleet, in fleet-id order.

use crate::event::{FleetEvent, FleetEventType};
use crate::fixed::{Fixed64, checked_div_ceil_64};
use crate::fleet::FleetState;
use crate::intel;
use crate::route::{self, DEFAULT_MAX_CANDIDATES};
use crate::sim::SimState;

pub fn process(state: &mut SimState) {
    let ids: Vec<String> = state.fleets.keys().cloned().collect();
    for id in ids {
        step_fleet(state, &id);
    }
}

fn step_fleet(state: &mut SimState, id: &str) {
    let Some(fleet) = state.fleets.get(id) else {
        return;
    };
    let fleet_state = fleet.state;
    match fleet_state {
        FleetState::FractureTraveling => return,
        FleetState::Traveling => {
            advance(state, id);
            return;
        }
        FleetState::Idle | FleetState::Docked => {}
    }

    let Some(dest) = fleet.destination_node_id.clone() else {
        return;
    };
    let stale = fleet.final_destination_node_id.as_deref() != Some(dest.as_str()) || !fleet.has_route();
    if dest == fleet.current_node_id {
        if let Some(f) = state.fleets.get_mut(id) {
            f.clear_route();
            f.state = FleetState::Docked;
        }
        return;
    }
    if stale && !plan_route(state, id, &dest) {
        return;
    }
    depart(state, id);
}

/// Plan from the fleet's node to `dest` and emit `RouteChosen`. An
/// unreachable destination is dropped.
fn plan_route(state: &mut SimState, id: &str, dest: &str) -> bool {
    let Some(fleet) = state.fleets.get(id) else {
        return false;
    };
    let choice = route::plan_choice(state, &fleet.current_node_id, dest, fleet.speed, DEFAULT_MAX_CANDIDATES);
    let tick = state.tick;
    let Some(f) = state.fleets.get_mut(id) else {
        return false;
    };
    let Some(choice) = choice else {
        tracing::debug!(target: "tradelane::movement", fleet = id, dest, "movement.no_route");
        f.clear_route();
        f.current_task = "NoRoute".to_string();
        return false;
    };

    f.route_edge_ids = choice.chosen.edge_ids.clone();
    f.route_edge_index = 0;
    f.final_destination_node_id = Some(dest.to_string());
    f.lane_wait = false;

    let mut ev = FleetEvent::new(tick, FleetEventType::RouteChosen, id);
    ev.node_id = dest.to_string();
    ev.chosen_route_id = choice.chosen.route_id.clone();
    ev.candidate_count = choice.candidate_count() as i64;
    ev.tie_break_reason = choice.tie_break.as_str().to_string();
    ev.risk_score = choice.chosen.risk_score;
    state.fleet_events.emit(ev);
    true
}

/// Take a slot on the next lane of the route, or wait for one.
fn depart(state: &mut SimState, id: &str) {
    let Some(fleet) = state.fleets.get(id) else {
        return;
    };
    let Some(edge_id) = fleet.next_route_edge().map(str::to_string) else {
        return;
    };
    let node_id = fleet.current_node_id.clone();
    let already_waiting = fleet.lane_wait;
    let tick = state.tick;

    let Some(edge) = state.edges.get_mut(&edge_id) else {
        // Lane vanished: replan next tick.
        if let Some(f) = state.fleets.get_mut(id) {
            f.route_edge_ids.clear();
            f.route_edge_index = 0;
        }
        return;
    };

    if !edge.try_reserve() {
        if !already_waiting {
            if let Some(f) = state.fleets.get_mut(id) {
                f.lane_wait = true;
            }
            let mut ev = FleetEvent::new(tick, FleetEventType::LaneCapacityWait, id);
            ev.edge_id = edge_id;
            ev.node_id = node_id;
            state.fleet_events.emit(ev);
        }
        return;
    }
    edge.heat = edge.heat.saturating_add(Fixed64::from_num(1));

    if let Some(f) = state.fleets.get_mut(id) {
        f.state = FleetState::Traveling;
        f.current_edge_id = Some(edge_id.clone());
        f.travel_progress = Fixed64::ZERO;
        f.lane_wait = false;
    }
    let mut ev = FleetEvent::new(tick, FleetEventType::LaneDeparted, id);
    ev.edge_id = edge_id;
    ev.node_id = node_id;
    state.fleet_events.emit(ev);

    advance(state, id);
}

/// Move along the current lane; arrive when progress reaches 1.
fn advance(state: &mut SimState, id: &str) {
    let Some(fleet) = state.fleets.get(id) else {
        return;
    };
    let Some(edge_id) = fleet.current_edge_id.clone() else {
        // Traveling without a lane is not a real state; settle at the node.
        if let Some(f) = state.fleets.get_mut(id) {
            f.state = FleetState::Idle;
        }
        return;
    };
    let (distance, arrival_node) = match state.edges.get(&edge_id) {
        Some(e) => (
            e.distance,
            e.other_end(&fleet.current_node_id).map(str::to_string),
        ),
        None => (Fixed64::ZERO, None),
    };
    let step = checked_div_ceil_64(fleet.speed, distance).unwrap_or(Fixed64::from_num(1));
    let progress = fleet.travel_progress.saturating_add(step);

    if progress < Fixed64::from_num(1) {
        if let Some(f) = state.fleets.get_mut(id) {
            f.travel_progress = progress;
        }
        return;
    }

    if let Some(edge) = state.edges.get_mut(&edge_id) {
        edge.release();
    }
    let tick = state.tick;
    let Some(f) = state.fleets.get_mut(id) else {
        return;
    };
    if let Some(node) = arrival_node {
        f.current_node_id = node;
    }
    f.current_edge_id = None;
    f.travel_progress = Fixed64::ZERO;
    f.route_edge_index += 1;
    let node_id = f.current_node_id.clone();

    if f.has_route() {
        f.state = FleetState::Idle;
    } else if f.destination_node_id.is_none() || f.destination_node_id.as_deref() == Some(node_id.as_str()) {
        f.clear_route();
        f.state = FleetState::Docked;
    } else {
        // Destination changed mid-lane: replan from here next tick.
        f.route_edge_ids.clear();
        f.route_edge_index = 0;
        f.final_destination_node_id = None;
        f.state = FleetState::Idle;
    }

    let mut ev = FleetEvent::new(tick, FleetEventType::LaneArrived, id);
    ev.edge_id = edge_id;
    ev.node_id = node_id.clone();
    state.fleet_events.emit(ev);
    intel::mark_seen_on_arrival(state, id, &node_id);
}
