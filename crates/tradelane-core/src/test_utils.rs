//! Shared fixtures for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::fixed::{Fixed64, Units, f64_to_fixed64};
use crate::fleet::{AI_OWNER, Fleet};
use crate::kernel::Kernel;
use crate::ledger;
use crate::sim::SimState;
use crate::world_loader::{self, WorldDefinition};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    f64_to_fixed64(v)
}

// ===========================================================================
// Hand-authored worlds
// ===========================================================================

/// Three stations in a line. A mine at A, a refinery at C that starts
/// short of ore, and B in the middle holding surplus ore.
pub const TRADE_LOOP_WORLD_JSON: &str = r#"{
    "worldId": "trade_loop",
    "markets": [
        { "id": "mkt_a", "inventory": { "fuel": 200, "ore": 40, "metal": 0 } },
        { "id": "mkt_b", "inventory": { "fuel": 50, "ore": 300, "metal": 10 } },
        { "id": "mkt_c", "inventory": { "fuel": 100, "ore": 0, "metal": 5 } }
    ],
    "nodes": [
        { "id": "stn_a", "kind": "Station", "name": "Alpha", "pos": [0, 0, 0], "marketId": "mkt_a", "worldClassId": "CORE" },
        { "id": "stn_b", "kind": "Station", "name": "Beta", "pos": [2, 0, 0], "marketId": "mkt_b", "worldClassId": "FRONTIER" },
        { "id": "stn_c", "kind": "Station", "name": "Gamma", "pos": [4, 0, 0], "marketId": "mkt_c", "worldClassId": "RIM" }
    ],
    "edges": [
        { "id": "lane_ab", "fromNodeId": "stn_a", "toNodeId": "stn_b", "distance": 2.0, "totalCapacity": 2 },
        { "id": "lane_bc", "fromNodeId": "stn_b", "toNodeId": "stn_c", "distance": 2.0, "totalCapacity": 1 }
    ],
    "worldClasses": [
        { "worldClassId": "CORE", "feeMultiplier": 1.0 },
        { "worldClassId": "FRONTIER", "feeMultiplier": 1.1 },
        { "worldClassId": "RIM", "feeMultiplier": 1.2 }
    ],
    "industrySites": [
        { "id": "mine_a", "nodeId": "stn_a", "inputs": { "fuel": 1 }, "outputs": { "ore": 5 } },
        { "id": "fac_c", "nodeId": "stn_c", "inputs": { "ore": 10, "fuel": 1 }, "outputs": { "metal": 5 }, "bufferDays": 2, "degradePerDayBps": 500 }
    ],
    "player": { "credits": 10000, "locationNodeId": "stn_a", "cargo": {} }
}"#;

pub fn trade_loop_definition() -> WorldDefinition {
    WorldDefinition::from_json(TRADE_LOOP_WORLD_JSON).expect("trade loop fixture parses")
}

/// The trade loop world plus one AI hauler docked at B.
pub fn trade_loop_state(seed: u64) -> SimState {
    let mut state = SimState::new(seed);
    world_loader::apply(&mut state, &trade_loop_definition()).expect("trade loop fixture loads");
    let hauler = Fleet::new("ai_hauler", AI_OWNER, "stn_b", fixed(1.0));
    state.fleets.insert(hauler.id.clone(), hauler);
    state
}

// ===========================================================================
// Generated worlds
// ===========================================================================

pub const TEST_STAR_COUNT: usize = 12;
pub const TEST_RADIUS: f64 = 100.0;

pub fn generated_state(seed: u64) -> SimState {
    let mut state = SimState::new(seed);
    crate::worldgen::generate(&mut state, TEST_STAR_COUNT, fixed(TEST_RADIUS))
        .expect("starter galaxy generates");
    state
}

pub fn generated_kernel(seed: u64) -> Kernel {
    let mut kernel = Kernel::new(seed);
    kernel
        .generate_world(TEST_STAR_COUNT, fixed(TEST_RADIUS))
        .expect("starter galaxy generates");
    kernel
}

// ===========================================================================
// Ledger probes
// ===========================================================================

/// Every unit of `good` anywhere: markets, fleet cargo, player cargo and
/// lane transfers.
pub fn total_units(state: &SimState, good: &str) -> Units {
    let markets: Units = state
        .markets
        .values()
        .map(|m| ledger::get(&m.inventory, good))
        .sum();
    let fleets: Units = state.fleets.values().map(|f| f.cargo_units(good)).sum();
    let transfers: Units = state
        .in_flight_transfers
        .iter()
        .filter(|t| t.good_id == good)
        .map(|t| t.quantity)
        .sum();
    markets + fleets + transfers + ledger::get(&state.player.cargo, good)
}

/// First negative quantity found, as `"owner/good=qty"`.
pub fn find_negative_quantity(state: &SimState) -> Option<String> {
    let markets = state
        .markets
        .values()
        .flat_map(|m| m.inventory.iter().map(move |(g, q)| (m.id.as_str(), g, *q)));
    let fleets = state
        .fleets
        .values()
        .flat_map(|f| f.cargo.iter().map(move |(g, q)| (f.id.as_str(), g, *q)));
    let player = state.player.cargo.iter().map(|(g, q)| ("player", g, *q));
    markets
        .chain(fleets)
        .chain(player)
        .find(|(_, _, q)| *q < 0)
        .map(|(owner, g, q)| format!("{owner}/{g}={q}"))
}

/// First lane whose used capacity exceeds its total, by id.
pub fn find_overfull_lane(state: &SimState) -> Option<String> {
    state
        .edges
        .values()
        .find(|e| e.used_capacity > e.total_capacity)
        .map(|e| e.id.clone())
}
