//! Off-lane ("fracture") travel: straight-line flight to any node that
//! ignores lanes and their capacity, and leaves containment trace behind.

use crate::fixed::{Fixed64, checked_div_ceil_64};
use crate::fleet::FleetState;
use crate::intel;
use crate::sim::SimState;

/// Shortest distance a fracture jump is ever treated as.
pub const MIN_FRACTURE_DISTANCE: f64 = 0.1;
/// Trace added to the destination node on arrival.
pub const ARRIVAL_TRACE: f64 = 0.5;

/// Start a fracture jump. Fails with no mutation when the fleet or target is
/// missing, the fleet is already moving, or the target is where it stands.
pub fn begin(state: &mut SimState, fleet_id: &str, target_node_id: &str) -> bool {
    if !state.nodes.contains_key(target_node_id) {
        return false;
    }
    let Some(fleet) = state.fleets.get_mut(fleet_id) else {
        return false;
    };
    if fleet.state.is_moving() || fleet.current_node_id == target_node_id {
        return false;
    }
    fleet.clear_route();
    fleet.fracture_target_node_id = Some(target_node_id.to_string());
    fleet.state = FleetState::FractureTraveling;
    fleet.travel_progress = Fixed64::ZERO;
    fleet.current_task = format!("Fracture to {target_node_id}");
    tracing::debug!(target: "tradelane::fracture", fleet = fleet_id, dest = target_node_id, "fracture.begin");
    true
}

pub fn process(state: &mut SimState) {
    let ids: Vec<String> = state
        .fleets
        .values()
        .filter(|f| f.state == FleetState::FractureTraveling)
        .map(|f| f.id.clone())
        .collect();
    for id in ids {
        advance(state, &id);
    }
}

fn advance(state: &mut SimState, id: &str) {
    let Some(fleet) = state.fleets.get(id) else {
        return;
    };
    let Some(target) = fleet.fracture_target_node_id.clone() else {
        if let Some(f) = state.fleets.get_mut(id) {
            f.state = FleetState::Idle;
        }
        return;
    };
    let distance = match (
        state.nodes.get(&fleet.current_node_id),
        state.nodes.get(&target),
    ) {
        (Some(a), Some(b)) => a.distance_to(b),
        _ => Fixed64::ZERO,
    }
    .max(Fixed64::from_num(MIN_FRACTURE_DISTANCE));
    let step = checked_div_ceil_64(fleet.speed, distance).unwrap_or(Fixed64::from_num(1));
    let progress = fleet.travel_progress.saturating_add(step);

    let Some(f) = state.fleets.get_mut(id) else {
        return;
    };
    if progress < Fixed64::from_num(1) {
        f.travel_progress = progress;
        return;
    }
    f.current_node_id = target.clone();
    f.fracture_target_node_id = None;
    f.travel_progress = Fixed64::ZERO;
    f.state = FleetState::Docked;
    f.current_task = "Idle".to_string();

    if let Some(node) = state.nodes.get_mut(&target) {
        node.trace = node.trace.saturating_add(Fixed64::from_num(ARRIVAL_TRACE));
    }
    tracing::debug!(target: "tradelane::fracture", fleet = id, node = %target, "fracture.arrived");
    intel::mark_seen_on_arrival(state, id, &target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Fleet, PLAYER_OWNER};
    use crate::world::{Node, NodeKind};

    fn f(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn world() -> SimState {
        let mut s = SimState::new(1);
        s.nodes
            .insert("a".into(), Node::new("a", NodeKind::Star, [f(0.0), f(0.0), f(0.0)]));
        s.nodes
            .insert("b".into(), Node::new("b", NodeKind::Star, [f(3.0), f(4.0), f(0.0)]));
        s.fleets
            .insert("f1".into(), Fleet::new("f1", PLAYER_OWNER, "a", f(1.0)));
        s
    }

    #[test]
    fn jump_takes_euclidean_time_and_leaves_trace() {
        let mut s = world();
        assert!(begin(&mut s, "f1", "b"));
        for _ in 0..4 {
            process(&mut s);
        }
        assert_eq!(s.fleets["f1"].state, FleetState::FractureTraveling);
        process(&mut s);
        assert_eq!(s.fleets["f1"].current_node_id, "b");
        assert_eq!(s.fleets["f1"].state, FleetState::Docked);
        assert_eq!(s.nodes["b"].trace, f(0.5));
    }

    #[test]
    fn invalid_jumps_rejected() {
        let mut s = world();
        assert!(!begin(&mut s, "f1", "a"));
        assert!(!begin(&mut s, "f1", "nowhere"));
        assert!(!begin(&mut s, "ghost", "b"));
        assert!(begin(&mut s, "f1", "b"));
        assert!(!begin(&mut s, "f1", "a"));
    }

    #[test]
    fn coincident_nodes_use_minimum_distance() {
        let mut s = world();
        s.nodes
            .insert("c".into(), Node::new("c", NodeKind::Waypoint, [f(0.0), f(0.0), f(0.0)]));
        assert!(begin(&mut s, "f1", "c"));
        process(&mut s);
        assert_eq!(s.fleets["f1"].current_node_id, "c");
    }
}
