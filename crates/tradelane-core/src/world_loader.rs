//! Hand-authored world definitions.
//!
//! A [`WorldDefinition`] is validated completely while it is built into a
//! fresh state; the caller's state is replaced only when every check
//! passes. Entities are inserted in ordinal id order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Units, f64_to_fixed64};
use crate::fleet::{Fleet, FleetState, PLAYER_OWNER};
use crate::industry::IndustrySite;
use crate::market::Market;
use crate::sim::SimState;
use crate::world::{Edge, Node, NodeKind, WorldClass};
use crate::worldgen::PLAYER_START_CREDITS;

pub const PLAYER_FLEET_ID: &str = "fleet_trader_1";
pub const PLAYER_FLEET_SPEED: f64 = 0.5;

fn default_world_id() -> String {
    "micro_world".to_string()
}

fn default_capacity() -> u32 {
    5
}

fn default_fee() -> f64 {
    1.0
}

fn default_buffer_days() -> i64 {
    1
}

fn default_credits() -> Units {
    PLAYER_START_CREDITS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldDefinition {
    #[serde(default = "default_world_id")]
    pub world_id: String,
    #[serde(default)]
    pub markets: Vec<WorldMarket>,
    #[serde(default)]
    pub nodes: Vec<WorldNode>,
    #[serde(default)]
    pub edges: Vec<WorldEdge>,
    #[serde(default)]
    pub world_classes: Vec<WorldClassDefinition>,
    #[serde(default)]
    pub industry_sites: Vec<WorldIndustrySite>,
    #[serde(default)]
    pub player: Option<WorldPlayerStart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldMarket {
    pub id: String,
    #[serde(default)]
    pub inventory: BTreeMap<String, Units>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldNode {
    pub id: String,
    /// `Star`, `Station` or `Waypoint`, any ASCII case.
    pub kind: String,
    #[serde(default)]
    pub name: String,
    pub pos: Vec<f64>,
    #[serde(default)]
    pub market_id: String,
    #[serde(default)]
    pub world_class_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldEdge {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub distance: f64,
    #[serde(default = "default_capacity")]
    pub total_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldClassDefinition {
    pub world_class_id: String,
    #[serde(default = "default_fee")]
    pub fee_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldIndustrySite {
    pub id: String,
    pub node_id: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Units>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Units>,
    #[serde(default = "default_buffer_days")]
    pub buffer_days: i64,
    #[serde(default)]
    pub degrade_per_day_bps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorldPlayerStart {
    #[serde(default = "default_credits")]
    pub credits: Units,
    #[serde(default)]
    pub location_node_id: String,
    #[serde(default)]
    pub cargo: BTreeMap<String, Units>,
}

impl WorldDefinition {
    pub fn from_json(text: &str) -> Result<Self, WorldLoadError> {
        serde_json::from_str(text).map_err(|e| WorldLoadError::Parse {
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldLoadError {
    #[error("WORLD_PARSE_ERROR {message}")]
    Parse { message: String },
    #[error("WORLD_EMPTY_ID field={field}")]
    EmptyId { field: &'static str },
    #[error("WORLD_DUPLICATE_ID kind={kind} id={id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("WORLD_DANGLING_REF owner={owner} field={field} target={target}")]
    DanglingReference {
        owner: String,
        field: &'static str,
        target: String,
    },
    #[error("WORLD_UNKNOWN_NODE_KIND node={node} kind='{token}' expected=Star|Station|Waypoint")]
    UnknownKind { node: String, token: String },
    #[error("WORLD_MALFORMED_POS node={node} len={len}")]
    MalformedPosition { node: String, len: usize },
    #[error("WORLD_EMPTY_GOOD_ID owner={owner}")]
    EmptyGoodId { owner: String },
    #[error("WORLD_NEGATIVE_QTY owner={owner} good={good} qty={qty}")]
    NegativeQuantity { owner: String, good: String, qty: Units },
    #[error("WORLD_INVALID_NUMBER owner={owner} field={field}")]
    InvalidNumber { owner: String, field: &'static str },
    #[error("WORLD_MISSING_PLAYER_LOCATION")]
    MissingPlayerLocation,
}

fn require_id(id: &str, field: &'static str) -> Result<(), WorldLoadError> {
    if id.trim().is_empty() {
        return Err(WorldLoadError::EmptyId { field });
    }
    Ok(())
}

fn finite(v: f64, owner: &str, field: &'static str) -> Result<Fixed64, WorldLoadError> {
    if !v.is_finite() {
        return Err(WorldLoadError::InvalidNumber {
            owner: owner.to_string(),
            field,
        });
    }
    Ok(f64_to_fixed64(v))
}

fn goods_map(
    src: &BTreeMap<String, Units>,
    owner: &str,
) -> Result<BTreeMap<String, Units>, WorldLoadError> {
    let mut out = BTreeMap::new();
    for (good, qty) in src {
        if good.trim().is_empty() {
            return Err(WorldLoadError::EmptyGoodId {
                owner: owner.to_string(),
            });
        }
        if *qty < 0 {
            return Err(WorldLoadError::NegativeQuantity {
                owner: owner.to_string(),
                good: good.clone(),
                qty: *qty,
            });
        }
        out.insert(good.clone(), *qty);
    }
    Ok(out)
}

fn sorted_by_id<'a, T>(items: &'a [T], id: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let mut v: Vec<&T> = items.iter().collect();
    v.sort_by(|a, b| id(a).cmp(id(b)));
    v
}

/// Replace the world in `state` with `def`. On error nothing changes.
pub fn apply(state: &mut SimState, def: &WorldDefinition) -> Result<(), WorldLoadError> {
    match build(state, def) {
        Ok(next) => {
            tracing::info!(
                target: "tradelane::world_loader",
                world = %next.world_id,
                nodes = next.nodes.len(),
                lanes = next.edges.len(),
                markets = next.markets.len(),
                "world.loaded"
            );
            *state = next;
            Ok(())
        }
        Err(err) => {
            tracing::warn!(target: "tradelane::world_loader", error = %err, "world.rejected");
            Err(err)
        }
    }
}

fn build(state: &SimState, def: &WorldDefinition) -> Result<SimState, WorldLoadError> {
    let mut next = SimState::new(state.seed);
    next.tick = state.tick;
    next.rng = state.rng.clone();
    next.tweaks = state.tweaks.clone();
    next.world_id = def.world_id.clone();

    for c in sorted_by_id(&def.world_classes, |c| c.world_class_id.as_str()) {
        require_id(&c.world_class_id, "WorldClass.worldClassId")?;
        let fee = finite(c.fee_multiplier, &c.world_class_id, "feeMultiplier")?;
        let class = WorldClass {
            id: c.world_class_id.clone(),
            fee_multiplier: fee,
        };
        if next.world_classes.insert(class.id.clone(), class).is_some() {
            return Err(WorldLoadError::DuplicateId {
                kind: "world_class",
                id: c.world_class_id.clone(),
            });
        }
    }

    for m in sorted_by_id(&def.markets, |m| m.id.as_str()) {
        require_id(&m.id, "Market.id")?;
        let mut market = Market::new(m.id.clone());
        market.inventory = goods_map(&m.inventory, &m.id)?;
        if next.markets.insert(m.id.clone(), market).is_some() {
            return Err(WorldLoadError::DuplicateId {
                kind: "market",
                id: m.id.clone(),
            });
        }
    }

    for n in sorted_by_id(&def.nodes, |n| n.id.as_str()) {
        require_id(&n.id, "Node.id")?;
        if next.nodes.contains_key(&n.id) {
            return Err(WorldLoadError::DuplicateId {
                kind: "node",
                id: n.id.clone(),
            });
        }
        let kind = NodeKind::parse(&n.kind).ok_or_else(|| WorldLoadError::UnknownKind {
            node: n.id.clone(),
            token: n.kind.clone(),
        })?;
        let [x, y, z] = n.pos[..] else {
            return Err(WorldLoadError::MalformedPosition {
                node: n.id.clone(),
                len: n.pos.len(),
            });
        };
        let pos = [
            finite(x, &n.id, "pos")?,
            finite(y, &n.id, "pos")?,
            finite(z, &n.id, "pos")?,
        ];
        let mut node = Node::new(n.id.clone(), kind, pos);
        node.name = n.name.clone();
        if !n.market_id.trim().is_empty() {
            if !next.markets.contains_key(&n.market_id) {
                return Err(WorldLoadError::DanglingReference {
                    owner: n.id.clone(),
                    field: "marketId",
                    target: n.market_id.clone(),
                });
            }
            node.market_id = Some(n.market_id.clone());
        }
        if !n.world_class_id.trim().is_empty() {
            if !next.world_classes.contains_key(&n.world_class_id) {
                return Err(WorldLoadError::DanglingReference {
                    owner: n.id.clone(),
                    field: "worldClassId",
                    target: n.world_class_id.clone(),
                });
            }
            node.world_class_id = Some(n.world_class_id.clone());
        }
        next.nodes.insert(node.id.clone(), node);
    }

    for e in sorted_by_id(&def.edges, |e| e.id.as_str()) {
        require_id(&e.id, "Edge.id")?;
        require_id(&e.from_node_id, "Edge.fromNodeId")?;
        require_id(&e.to_node_id, "Edge.toNodeId")?;
        if next.edges.contains_key(&e.id) {
            return Err(WorldLoadError::DuplicateId {
                kind: "edge",
                id: e.id.clone(),
            });
        }
        for (field, target) in [("fromNodeId", &e.from_node_id), ("toNodeId", &e.to_node_id)] {
            if !next.nodes.contains_key(target) {
                return Err(WorldLoadError::DanglingReference {
                    owner: e.id.clone(),
                    field,
                    target: target.clone(),
                });
            }
        }
        let distance = finite(e.distance, &e.id, "distance")?;
        let edge = Edge::new(
            e.id.clone(),
            e.from_node_id.clone(),
            e.to_node_id.clone(),
            distance.max(Fixed64::ZERO),
            e.total_capacity,
        );
        next.edges.insert(edge.id.clone(), edge);
    }

    for s in sorted_by_id(&def.industry_sites, |s| s.id.as_str()) {
        require_id(&s.id, "IndustrySite.id")?;
        if next.industry_sites.contains_key(&s.id) {
            return Err(WorldLoadError::DuplicateId {
                kind: "industry_site",
                id: s.id.clone(),
            });
        }
        if !next.nodes.contains_key(&s.node_id) {
            return Err(WorldLoadError::DanglingReference {
                owner: s.id.clone(),
                field: "nodeId",
                target: s.node_id.clone(),
            });
        }
        let mut site = IndustrySite::new(s.id.clone(), s.node_id.clone());
        site.inputs = goods_map(&s.inputs, &s.id)?;
        site.outputs = goods_map(&s.outputs, &s.id)?;
        site.buffer_days = s.buffer_days.max(0);
        site.degrade_per_day_bps = s.degrade_per_day_bps.max(0);
        next.industry_sites.insert(site.id.clone(), site);
    }

    if let Some(p) = &def.player {
        next.player.credits = p.credits;
        next.player.cargo = goods_map(&p.cargo, "player")?
            .into_iter()
            .filter(|(_, q)| *q > 0)
            .collect();
        if p.location_node_id.trim().is_empty() {
            return Err(WorldLoadError::MissingPlayerLocation);
        }
        if !next.nodes.contains_key(&p.location_node_id) {
            return Err(WorldLoadError::DanglingReference {
                owner: "player".to_string(),
                field: "locationNodeId",
                target: p.location_node_id.clone(),
            });
        }
        next.player.location_node_id = p.location_node_id.clone();

        let mut fleet = Fleet::new(
            PLAYER_FLEET_ID,
            PLAYER_OWNER,
            p.location_node_id.clone(),
            f64_to_fixed64(PLAYER_FLEET_SPEED),
        );
        fleet.state = FleetState::Docked;
        fleet.current_task = "Docked".to_string();
        next.fleets.insert(fleet.id.clone(), fleet);
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MICRO: &str = r#"{
        "worldId": "micro",
        "markets": [
            { "id": "mkt_b", "inventory": { "ore": 20 } },
            { "id": "mkt_a", "inventory": { "fuel": 10, "ore": 0 } }
        ],
        "nodes": [
            { "id": "stn_b", "kind": "station", "name": "B", "pos": [3, 0, 4], "marketId": "mkt_b", "worldClassId": "RIM" },
            { "id": "stn_a", "kind": "Station", "name": "A", "pos": [0, 0, 0], "marketId": "mkt_a" }
        ],
        "edges": [
            { "id": "lane_ab", "fromNodeId": "stn_a", "toNodeId": "stn_b", "distance": 5.0, "totalCapacity": 2 }
        ],
        "worldClasses": [ { "worldClassId": "RIM", "feeMultiplier": 1.2 } ],
        "industrySites": [ { "id": "fac_b", "nodeId": "stn_b", "inputs": { "ore": 1 }, "outputs": { "metal": 1 } } ],
        "player": { "credits": 500, "locationNodeId": "stn_a", "cargo": { "ore": 3 } }
    }"#;

    fn micro() -> WorldDefinition {
        WorldDefinition::from_json(MICRO).unwrap()
    }

    // -----------------------------------------------------------------------
    // Test 1: a valid micro world loads completely
    // -----------------------------------------------------------------------
    #[test]
    fn loads_micro_world() {
        let mut s = SimState::new(1);
        apply(&mut s, &micro()).unwrap();
        assert_eq!(s.world_id, "micro");
        assert_eq!(s.nodes.len(), 2);
        assert_eq!(s.nodes["stn_b"].kind, NodeKind::Station);
        assert_eq!(s.node_market_id("stn_b"), Some("mkt_b"));
        assert_eq!(s.class_fee_multiplier("stn_b"), f64_to_fixed64(1.2));
        assert_eq!(s.edges["lane_ab"].total_capacity, 2);
        assert_eq!(s.markets["mkt_a"].stock("fuel"), 10);
        assert!(s.markets["mkt_a"].inventory.contains_key("ore"));
        assert_eq!(s.industry_sites["fac_b"].inputs["ore"], 1);
        assert_eq!(s.player.credits, 500);
        assert_eq!(s.player.location_node_id, "stn_a");
        let fleet = &s.fleets[PLAYER_FLEET_ID];
        assert_eq!(fleet.state, FleetState::Docked);
        assert_eq!(fleet.current_node_id, "stn_a");
    }

    // -----------------------------------------------------------------------
    // Test 2: structural errors are rejected before any mutation
    // -----------------------------------------------------------------------
    #[test]
    fn duplicate_ids_rejected() {
        let mut def = micro();
        def.nodes.push(def.nodes[0].clone());
        let mut s = SimState::new(1);
        let before = s.clone();
        let err = apply(&mut s, &def).unwrap_err();
        assert_eq!(err.to_string(), "WORLD_DUPLICATE_ID kind=node id=stn_b");
        assert_eq!(s, before);
    }

    #[test]
    fn dangling_references_rejected() {
        let mut def = micro();
        def.edges[0].to_node_id = "stn_x".into();
        let err = apply(&mut SimState::new(1), &def).unwrap_err();
        assert_eq!(err.to_string(), "WORLD_DANGLING_REF owner=lane_ab field=toNodeId target=stn_x");

        let mut def = micro();
        def.nodes[1].market_id = "mkt_zz".into();
        assert!(matches!(
            apply(&mut SimState::new(1), &def),
            Err(WorldLoadError::DanglingReference { field: "marketId", .. })
        ));

        let mut def = micro();
        if let Some(p) = def.player.as_mut() {
            p.location_node_id = "nowhere".into();
        }
        assert!(matches!(
            apply(&mut SimState::new(1), &def),
            Err(WorldLoadError::DanglingReference { field: "locationNodeId", .. })
        ));

        let mut def = micro();
        if let Some(p) = def.player.as_mut() {
            p.location_node_id = " ".into();
        }
        let err = apply(&mut SimState::new(1), &def).unwrap_err();
        assert_eq!(err, WorldLoadError::MissingPlayerLocation);
    }

    #[test]
    fn malformed_kind_and_position_rejected() {
        let mut def = micro();
        def.nodes[0].kind = "planet".into();
        assert!(matches!(
            apply(&mut SimState::new(1), &def),
            Err(WorldLoadError::UnknownKind { .. })
        ));

        let mut def = micro();
        def.nodes[0].pos = vec![1.0, 2.0];
        let err = apply(&mut SimState::new(1), &def).unwrap_err();
        assert_eq!(err.to_string(), "WORLD_MALFORMED_POS node=stn_b len=2");
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let err = WorldDefinition::from_json(r#"{"worldId":"x","planets":[]}"#).unwrap_err();
        assert!(err.to_string().starts_with("WORLD_PARSE_ERROR"));
    }

    // -----------------------------------------------------------------------
    // Test 3: loading is independent of authoring order
    // -----------------------------------------------------------------------
    #[test]
    fn authoring_order_does_not_matter() {
        let a = micro();
        let mut b = micro();
        b.nodes.reverse();
        b.markets.reverse();
        let mut sa = SimState::new(1);
        let mut sb = SimState::new(1);
        apply(&mut sa, &a).unwrap();
        apply(&mut sb, &b).unwrap();
        assert_eq!(sa, sb);
    }
}
