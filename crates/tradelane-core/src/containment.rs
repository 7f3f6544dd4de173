//! Containment decay: fracture trace on nodes fades a little every tick.

use crate::fixed::Fixed64;
use crate::sim::SimState;

pub const TRACE_DECAY_PER_TICK: f64 = 0.05;

pub fn process(state: &mut SimState) {
    let decay = Fixed64::from_num(TRACE_DECAY_PER_TICK);
    for node in state.nodes.values_mut() {
        if node.trace > Fixed64::ZERO {
            node.trace = (node.trace - decay).max(Fixed64::ZERO);
        }
    }
}
