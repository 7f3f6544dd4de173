//! Seeded procedural galaxy generation.
//!
//! Generation draws every random value from the state's [`SimRng`] in a
//! fixed order, builds into a fresh state and commits only when the
//! configured producer and sink minimums hold. A failed generation leaves
//! the caller's state untouched.
//!
//! [`SimRng`]: crate::rng::SimRng

use std::collections::BTreeSet;

use crate::fixed::{Fixed64, Units, f64_to_fixed64, format_fixed};
use crate::fleet::{AI_OWNER, Fleet};
use crate::industry::IndustrySite;
use crate::market::Market;
use crate::route::edge_risk_score;
use crate::sim::SimState;
use crate::world::{Edge, Node, NodeKind, WorldClass};

/// The first stars by generation index form the starter region.
pub const STARTER_REGION_NODE_COUNT: usize = 12;
pub const MIN_STARTER_LANES: usize = 18;
pub const MAX_STAR_COUNT: usize = 4096;
pub const AI_FLEET_SPEED: f64 = 0.8;
pub const PLAYER_START_CREDITS: Units = 10_000;

pub const WORLD_CLASSES_V0: [(&str, f64); 3] = [("CORE", 1.00), ("FRONTIER", 1.10), ("RIM", 1.20)];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldGenError {
    #[error("WORLDGEN_MIN_PRODUCERS_UNSATISFIED good={good} required={required} actual={actual}")]
    MinProducersUnsatisfied {
        good: String,
        required: u32,
        actual: u32,
    },
    #[error("WORLDGEN_MIN_SINKS_UNSATISFIED good={good} required={required} actual={actual}")]
    MinSinksUnsatisfied {
        good: String,
        required: u32,
        actual: u32,
    },
    #[error("WORLDGEN_INVALID_STAR_COUNT count={count} max={max}", max = MAX_STAR_COUNT)]
    InvalidStarCount { count: usize },
    #[error("WORLDGEN_INVALID_RADIUS radius={radius}")]
    InvalidRadius { radius: String },
}

/// Mints `lane_NNNN` ids and suppresses duplicate endpoint pairs.
struct LaneMinter {
    seen: BTreeSet<(String, String)>,
    counter: u32,
    capacity_override: u32,
}

impl LaneMinter {
    fn add(&mut self, state: &mut SimState, a: &Node, b: &Node, capacity: u32) {
        let (u, v) = if a.id <= b.id { (a, b) } else { (b, a) };
        if !self.seen.insert((u.id.clone(), v.id.clone())) {
            return;
        }
        self.counter += 1;
        let id = format!("lane_{:04}", self.counter);
        let capacity = if self.capacity_override > 0 {
            self.capacity_override
        } else {
            capacity
        };
        let edge = Edge::new(id.clone(), u.id.clone(), v.id.clone(), u.distance_to(v), capacity);
        state.edges.insert(id, edge);
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Generate a galaxy of `star_count` stars (floored at the starter region
/// size) scattered within `radius` on the XZ plane.
pub fn generate(state: &mut SimState, star_count: usize, radius: Fixed64) -> Result<(), WorldGenError> {
    if star_count > MAX_STAR_COUNT {
        tracing::warn!(target: "tradelane::worldgen", star_count, "worldgen.invalid_star_count");
        return Err(WorldGenError::InvalidStarCount { count: star_count });
    }
    if radius <= Fixed64::ZERO {
        tracing::warn!(target: "tradelane::worldgen", radius = %radius, "worldgen.invalid_radius");
        return Err(WorldGenError::InvalidRadius {
            radius: format_fixed(radius, 3),
        });
    }
    let star_count = star_count.max(STARTER_REGION_NODE_COUNT);

    let mut next = SimState::new(state.seed);
    next.tick = state.tick;
    next.rng = state.rng.clone();
    next.tweaks = state.tweaks.clone();
    next.world_id = format!("galaxy_{}", state.seed);

    let starter_n = star_count.min(STARTER_REGION_NODE_COUNT);
    let mut nodes = Vec::with_capacity(star_count);

    for i in 0..star_count {
        let x = next.rng.next_signed_unit().saturating_mul(radius);
        let z = next.rng.next_signed_unit().saturating_mul(radius);
        let id = format!("star_{i}");
        let mut node = Node::new(id.clone(), NodeKind::Star, [x, Fixed64::ZERO, z]);
        node.name = format!("System {i}");
        node.market_id = Some(id.clone());

        let mut market = Market::new(id.clone());
        market.inventory.insert("fuel".into(), 500);
        market.inventory.insert("ore".into(), 0);
        market.inventory.insert("metal".into(), 0);

        let starter = i < starter_n;

        if i % 6 == 0 {
            let fuel = market.stock("fuel").max(3000);
            market.inventory.insert("fuel".into(), fuel);
            let well = IndustrySite::new(format!("well_{i}"), id.clone()).with_output("fuel", 5);
            next.industry_sites.insert(well.id.clone(), well);
            node.name.push_str(" (Fuel Well)");
        }

        if i % 2 == 0 {
            if starter {
                market.inventory.insert("fuel".into(), 120);
                market.inventory.insert("ore".into(), 500);
                market.inventory.insert("metal".into(), 10);
            } else {
                market.inventory.insert("ore".into(), 500);
            }
            let mine = IndustrySite::new(format!("mine_{i}"), id.clone())
                .with_input("fuel", 1)
                .with_output("ore", 5);
            next.industry_sites.insert(mine.id.clone(), mine);
            node.name.push_str(" (Mining)");
        } else {
            if starter {
                market.inventory.insert("fuel".into(), 10);
                market.inventory.insert("ore".into(), 0);
                market.inventory.insert("metal".into(), 200);
            }
            let mut refinery = IndustrySite::new(format!("fac_{i}"), id.clone())
                .with_input("ore", 10)
                .with_input("fuel", 1)
                .with_output("metal", 5);
            refinery.buffer_days = 2;
            refinery.degrade_per_day_bps = 500;
            next.industry_sites.insert(refinery.id.clone(), refinery);
            node.name.push_str(" (Refinery)");
        }

        // Every fourth star past the hub hides a discovery.
        if i % 4 == 3 {
            node.seeded_discovery_ids.push(format!("disc_{i:03}"));
        }

        next.markets.insert(id.clone(), market);
        nodes.push(node);
    }

    // Topology: a ring over the starter region, chords until the starter
    // lane minimum is met, then later stars chained to their predecessor.
    let mut lanes = LaneMinter {
        seen: BTreeSet::new(),
        counter: 0,
        capacity_override: next.tweaks.default_lane_capacity_k,
    };
    if starter_n >= 2 {
        for i in 0..starter_n {
            lanes.add(&mut next, &nodes[i], &nodes[(i + 1) % starter_n], 5);
        }
        for (step, capacity) in [(2, 4), (3, 3)] {
            for i in 0..starter_n {
                if lanes.len() >= MIN_STARTER_LANES {
                    break;
                }
                lanes.add(&mut next, &nodes[i], &nodes[(i + step) % starter_n], capacity);
            }
        }
    }
    for i in starter_n..nodes.len() {
        lanes.add(&mut next, &nodes[i - 1], &nodes[i], 5);
    }

    for (id, fee) in WORLD_CLASSES_V0 {
        next.world_classes.insert(
            id.to_string(),
            WorldClass {
                id: id.to_string(),
                fee_multiplier: f64_to_fixed64(fee),
            },
        );
    }

    let speed = f64_to_fixed64(AI_FLEET_SPEED);
    for node in &nodes {
        let fleet = Fleet::new(format!("ai_fleet_{}", node.id), AI_OWNER, node.id.clone(), speed);
        next.fleets.insert(fleet.id.clone(), fleet);
    }

    next.player.location_node_id = nodes.first().map(|n| n.id.clone()).unwrap_or_default();
    next.player.credits = PLAYER_START_CREDITS;

    for node in nodes {
        next.nodes.insert(node.id.clone(), node);
    }
    // Round-robin over ordinal node ids.
    for (i, node) in next.nodes.values_mut().enumerate() {
        node.world_class_id = Some(WORLD_CLASSES_V0[i % WORLD_CLASSES_V0.len()].0.to_string());
    }

    if let Err(err) = check_minimums(&next) {
        tracing::warn!(target: "tradelane::worldgen", error = %err, "worldgen.rejected");
        return Err(err);
    }

    tracing::info!(
        target: "tradelane::worldgen",
        seed = next.seed,
        nodes = next.nodes.len(),
        lanes = next.edges.len(),
        sites = next.industry_sites.len(),
        "worldgen.generated"
    );
    *state = next;
    Ok(())
}

/// Every good any site touches needs the configured number of producing
/// and consuming sites. Producers are checked for all goods before sinks.
fn check_minimums(state: &SimState) -> Result<(), WorldGenError> {
    let goods: BTreeSet<&str> = state
        .industry_sites
        .values()
        .flat_map(|s| s.inputs.keys().chain(s.outputs.keys()))
        .map(String::as_str)
        .collect();

    let min_producers = state.tweaks.worldgen_min_producers_per_good;
    for good in &goods {
        let actual = count_sites(state, |s| s.outputs.get(*good).is_some_and(|q| *q > 0));
        if actual < min_producers {
            return Err(WorldGenError::MinProducersUnsatisfied {
                good: good.to_string(),
                required: min_producers,
                actual,
            });
        }
    }

    let min_sinks = state.tweaks.worldgen_min_sinks_per_good;
    for good in &goods {
        let actual = count_sites(state, |s| s.inputs.get(*good).is_some_and(|q| *q > 0));
        if actual < min_sinks {
            return Err(WorldGenError::MinSinksUnsatisfied {
                good: good.to_string(),
                required: min_sinks,
                actual,
            });
        }
    }
    Ok(())
}

fn count_sites(state: &SimState, pred: impl Fn(&IndustrySite) -> bool) -> u32 {
    state.industry_sites.values().filter(|s| pred(s)).count() as u32
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Diff-friendly topology dump: nodes by id, lanes by (from, to, id) with
/// endpoints in ordinal order.
pub fn topology_dump(state: &SimState) -> String {
    let mut out = format!("nodes_count={}\n", state.nodes.len());
    for node in state.nodes.values() {
        out.push_str(&format!("N|{}|k={}\n", node.id, node.kind.as_str()));
    }

    let mut lanes: Vec<(&str, &str, &Edge)> = state
        .edges
        .values()
        .map(|e| {
            let (u, v) = if e.from_node_id <= e.to_node_id {
                (e.from_node_id.as_str(), e.to_node_id.as_str())
            } else {
                (e.to_node_id.as_str(), e.from_node_id.as_str())
            };
            (u, v, e)
        })
        .collect();
    lanes.sort_by(|a, b| (a.0, a.1, &a.2.id).cmp(&(b.0, b.1, &b.2.id)));

    out.push_str(&format!("lanes_count={}\n", lanes.len()));
    for (u, v, e) in lanes {
        out.push_str(&format!(
            "L|{u}|{v}|id={}|c={}|r={}\n",
            e.id,
            e.total_capacity,
            edge_risk_score(e)
        ));
    }
    out
}

/// Class table followed by the per-node assignment, both in id order.
pub fn world_class_report(state: &SimState) -> String {
    let mut out = String::from("WorldClassId\tfee_multiplier\n");
    for class in state.world_classes.values() {
        out.push_str(&format!("{}\t{}\n", class.id, format_fixed(class.fee_multiplier, 2)));
    }
    out.push_str("NodeId\tWorldClassId\tfee_multiplier\n");
    for node in state.nodes.values() {
        let class = node.world_class_id.as_deref().unwrap_or("");
        out.push_str(&format!(
            "{}\t{}\t{}\n",
            node.id,
            class,
            format_fixed(state.class_fee_multiplier(&node.id), 2)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::hop_distances;

    fn generated(seed: u64, stars: usize) -> SimState {
        let mut s = SimState::new(seed);
        generate(&mut s, stars, Fixed64::from_num(100)).unwrap();
        s
    }

    // -----------------------------------------------------------------------
    // Test 1: same seed, same galaxy
    // -----------------------------------------------------------------------
    #[test]
    fn generation_is_deterministic() {
        let a = generated(42, 20);
        let b = generated(42, 20);
        assert_eq!(a, b);
        assert_eq!(topology_dump(&a), topology_dump(&b));

        let c = generated(43, 20);
        assert_ne!(a.nodes["star_1"].pos, c.nodes["star_1"].pos);
    }

    // -----------------------------------------------------------------------
    // Test 2: starter region floor and lane minimum
    // -----------------------------------------------------------------------
    #[test]
    fn starter_region_shape() {
        let s = generated(1, 3);
        assert_eq!(s.nodes.len(), STARTER_REGION_NODE_COUNT);
        assert_eq!(s.edges.len(), MIN_STARTER_LANES);
        assert_eq!(s.fleets.len(), STARTER_REGION_NODE_COUNT);
        assert_eq!(s.player.location_node_id, "star_0");
        assert!(s.edges.contains_key("lane_0001"));
        assert!(s.edges.values().all(|e| e.from_node_id < e.to_node_id));

        let big = generated(1, 20);
        assert_eq!(big.edges.len(), MIN_STARTER_LANES + 8);
        let hops = hop_distances(&big, "star_0");
        assert_eq!(hops.len(), 20, "galaxy is connected");
    }

    // -----------------------------------------------------------------------
    // Test 3: archetypes alternate by index parity
    // -----------------------------------------------------------------------
    #[test]
    fn archetypes_by_index() {
        let s = generated(5, 14);
        assert!(s.industry_sites.contains_key("well_0"));
        assert!(s.industry_sites.contains_key("mine_0"));
        assert!(s.industry_sites.contains_key("fac_1"));
        assert!(s.industry_sites.contains_key("well_12"));
        assert!(!s.industry_sites.contains_key("well_3"));

        let fac = &s.industry_sites["fac_1"];
        assert_eq!(fac.buffer_days, 2);
        assert_eq!(fac.degrade_per_day_bps, 500);
        assert_eq!(s.markets["star_1"].stock("metal"), 200);
        // Past the starter region mines only seed ore; the well keeps its bootstrap fuel.
        assert_eq!(s.markets["star_12"].stock("fuel"), 3000);
        assert_eq!(s.markets["star_12"].stock("metal"), 0);
        assert_eq!(s.nodes["star_3"].seeded_discovery_ids, vec!["disc_003".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Test 4: world classes round-robin over sorted ids
    // -----------------------------------------------------------------------
    #[test]
    fn world_classes_round_robin() {
        let s = generated(9, 12);
        let classes: Vec<_> = s
            .nodes
            .values()
            .map(|n| n.world_class_id.clone().unwrap_or_default())
            .collect();
        assert_eq!(&classes[..4], &["CORE", "FRONTIER", "RIM", "CORE"]);
        // star_1 sorts second.
        assert_eq!(s.class_fee_multiplier("star_1"), f64_to_fixed64(1.10));
        let report = world_class_report(&s);
        assert!(report.starts_with("WorldClassId\tfee_multiplier\nCORE\t1.00\nFRONTIER\t1.10\nRIM\t1.20\n"));
    }

    // -----------------------------------------------------------------------
    // Test 5: unsatisfiable minimums fail without touching state
    // -----------------------------------------------------------------------
    #[test]
    fn min_producers_fail_fast() {
        let mut s = SimState::new(7);
        s.tweaks.worldgen_min_producers_per_good = 3;
        let before = s.clone();
        let err = generate(&mut s, 12, Fixed64::from_num(100)).unwrap_err();
        assert_eq!(err.to_string(), "WORLDGEN_MIN_PRODUCERS_UNSATISFIED good=fuel required=3 actual=2");
        assert_eq!(s, before);
    }

    #[test]
    fn min_sinks_checked_after_producers() {
        let mut s = SimState::new(7);
        s.tweaks.worldgen_min_sinks_per_good = 1;
        let err = generate(&mut s, 12, Fixed64::from_num(100)).unwrap_err();
        assert_eq!(err.to_string(), "WORLDGEN_MIN_SINKS_UNSATISFIED good=metal required=1 actual=0");
    }

    #[test]
    fn rejects_bad_arguments() {
        let mut s = SimState::new(7);
        assert!(matches!(
            generate(&mut s, MAX_STAR_COUNT + 1, Fixed64::from_num(100)),
            Err(WorldGenError::InvalidStarCount { .. })
        ));
        assert!(matches!(
            generate(&mut s, 12, Fixed64::ZERO),
            Err(WorldGenError::InvalidRadius { .. })
        ));
    }

    #[test]
    fn lane_capacity_override() {
        let mut s = SimState::new(3);
        s.tweaks.default_lane_capacity_k = 9;
        generate(&mut s, 16, Fixed64::from_num(50)).unwrap();
        assert!(s.edges.values().all(|e| e.total_capacity == 9));
    }

    #[test]
    fn topology_dump_format() {
        let s = generated(11, 12);
        let dump = topology_dump(&s);
        assert!(dump.starts_with("nodes_count=12\nN|star_0|k=Star\nN|star_1|k=Star\nN|star_10|k=Star\n"));
        assert!(dump.contains("lanes_count=18\n"));
        assert!(dump.lines().filter(|l| l.starts_with("L|")).count() == 18);
    }
}
