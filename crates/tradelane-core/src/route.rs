//! Deterministic lane-route planning.
//!
//! Candidates are simple paths over bidirectional lanes, explored in
//! lane-id order. Paths are gathered layer by layer (by hop count) with a
//! reachability bound so the search never wanders down branches that
//! cannot reach the destination in the hops left. Ordering among candidates
//! is delegated to a [`RouteScorer`]; both built-in scorers end on the
//! ordinal route id, so the choice is total and stable.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::fixed::{Fixed64, Ticks, ceil_ticks, checked_div_64};
use crate::sim::SimState;
use crate::tweaks::TweakConfig;
use crate::world::Edge;

pub const MAX_ROUTE_HOPS: usize = 8;
pub const DEFAULT_MAX_CANDIDATES: usize = 8;
/// Paths kept per hop layer before ordering.
const MAX_PATHS_PER_LAYER: usize = 64;
const RISK_MICRO_SCALE: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub from_node_id: String,
    pub to_node_id: String,
    /// `node0>node1>...>nodeN`
    pub route_id: String,
    pub node_ids: Vec<String>,
    pub edge_ids: Vec<String>,
    pub hop_count: usize,
    /// Sum of per-lane risk (milli distance units).
    pub risk_score: i64,
    pub total_travel_ticks: Ticks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreakReason {
    Only,
    Hops,
    Risk,
    RouteId,
    Score,
    Stable,
}

impl TieBreakReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TieBreakReason::Only => "ONLY",
            TieBreakReason::Hops => "HOPS",
            TieBreakReason::Risk => "RISK",
            TieBreakReason::RouteId => "ROUTE_ID",
            TieBreakReason::Score => "SCORE",
            TieBreakReason::Stable => "STABLE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteChoice {
    pub chosen: RoutePlan,
    /// All candidates, best first.
    pub candidates: Vec<RoutePlan>,
    pub tie_break: TieBreakReason,
}

impl RouteChoice {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Orders route candidates. Implementations must be total and must end on
/// the route id so that equal plans never depend on discovery order.
pub trait RouteScorer {
    fn compare(&self, a: &RoutePlan, b: &RoutePlan) -> Ordering;
    /// Why `best` beat `runner_up`.
    fn tie_break(&self, best: &RoutePlan, runner_up: &RoutePlan) -> TieBreakReason;
}

/// Fewer hops, then lower risk, then route id.
#[derive(Debug, Clone, Copy, Default)]
pub struct HopsThenRisk;

impl RouteScorer for HopsThenRisk {
    fn compare(&self, a: &RoutePlan, b: &RoutePlan) -> Ordering {
        a.hop_count
            .cmp(&b.hop_count)
            .then(a.risk_score.cmp(&b.risk_score))
            .then_with(|| a.route_id.cmp(&b.route_id))
            .then_with(|| a.edge_ids.cmp(&b.edge_ids))
    }

    fn tie_break(&self, best: &RoutePlan, runner_up: &RoutePlan) -> TieBreakReason {
        if best.hop_count != runner_up.hop_count {
            TieBreakReason::Hops
        } else if best.risk_score != runner_up.risk_score {
            TieBreakReason::Risk
        } else if best.route_id != runner_up.route_id {
            TieBreakReason::RouteId
        } else {
            TieBreakReason::Stable
        }
    }
}

/// `travel_ticks + risk * scalar / tolerance`, then hops, then route id.
/// Knobs are held in micro-units so ordering never compares floats.
#[derive(Debug, Clone, Copy)]
pub struct RiskWeighted {
    pub risk_scalar_micro: i64,
    pub risk_tolerance_micro: i64,
}

impl RiskWeighted {
    pub fn from_tweaks(tweaks: &TweakConfig) -> Self {
        let scalar = to_micro(tweaks.risk_scalar).unwrap_or(RISK_MICRO_SCALE).max(0);
        let tol = to_micro(tweaks.role_risk_tolerance_default)
            .filter(|v| *v > 0)
            .unwrap_or(RISK_MICRO_SCALE);
        Self {
            risk_scalar_micro: scalar,
            risk_tolerance_micro: tol,
        }
    }

    pub fn score(&self, plan: &RoutePlan) -> i64 {
        let travel = plan.total_travel_ticks as i64;
        let risk = plan.risk_score.max(0);
        let scaled = if self.risk_scalar_micro <= 0 {
            0
        } else {
            risk.saturating_mul(self.risk_scalar_micro) / self.risk_tolerance_micro.max(1)
        };
        travel.saturating_add(scaled)
    }
}

fn to_micro(v: f64) -> Option<i64> {
    if !v.is_finite() {
        return None;
    }
    Some((v * RISK_MICRO_SCALE as f64).round() as i64)
}

impl RouteScorer for RiskWeighted {
    fn compare(&self, a: &RoutePlan, b: &RoutePlan) -> Ordering {
        self.score(a)
            .cmp(&self.score(b))
            .then(a.hop_count.cmp(&b.hop_count))
            .then_with(|| a.route_id.cmp(&b.route_id))
            .then_with(|| a.edge_ids.cmp(&b.edge_ids))
    }

    fn tie_break(&self, best: &RoutePlan, runner_up: &RoutePlan) -> TieBreakReason {
        if self.score(best) != self.score(runner_up) {
            TieBreakReason::Score
        } else if best.hop_count != runner_up.hop_count {
            TieBreakReason::Hops
        } else if best.route_id != runner_up.route_id {
            TieBreakReason::RouteId
        } else {
            TieBreakReason::Stable
        }
    }
}

/// The scorer selected by the state's tweaks.
pub fn scorer_for(tweaks: &TweakConfig) -> Box<dyn RouteScorer> {
    if tweaks.uses_risk_scoring() {
        Box::new(RiskWeighted::from_tweaks(tweaks))
    } else {
        Box::new(HopsThenRisk)
    }
}

// ---------------------------------------------------------------------------
// Per-lane metrics
// ---------------------------------------------------------------------------

/// Risk proxy: distance in thousandths, rounded half away from zero.
pub fn edge_risk_score(edge: &Edge) -> i64 {
    let dist = if edge.distance > Fixed64::ZERO {
        edge.distance
    } else {
        Fixed64::from_num(1)
    };
    let milli = dist.saturating_mul(Fixed64::from_num(1000));
    milli.round().to_num::<i64>().max(0)
}

/// Ticks needed to cross a lane: `ceil(distance / speed)`, at least 1.
pub fn edge_travel_ticks(edge: &Edge, speed: Fixed64) -> Ticks {
    let speed = if speed > Fixed64::ZERO {
        speed
    } else {
        Fixed64::from_num(1)
    };
    let dist = if edge.distance > Fixed64::ZERO {
        edge.distance
    } else {
        Fixed64::from_num(1)
    };
    checked_div_64(dist, speed).map(ceil_ticks).unwrap_or(Ticks::MAX)
}

// ---------------------------------------------------------------------------
// Graph helpers
// ---------------------------------------------------------------------------

/// node id -> lanes touching it, ordered by lane id.
pub fn adjacency(state: &SimState) -> BTreeMap<&str, Vec<&Edge>> {
    let mut adj: BTreeMap<&str, Vec<&Edge>> = BTreeMap::new();
    // edges iterate in id order, so each list is already sorted
    for edge in state.edges.values() {
        if !state.nodes.contains_key(&edge.from_node_id) || !state.nodes.contains_key(&edge.to_node_id) {
            continue;
        }
        if edge.from_node_id == edge.to_node_id {
            continue;
        }
        adj.entry(edge.from_node_id.as_str()).or_default().push(edge);
        adj.entry(edge.to_node_id.as_str()).or_default().push(edge);
    }
    adj
}

/// Lane-hop distance from `origin` to every reachable node.
pub fn hop_distances(state: &SimState, origin: &str) -> BTreeMap<String, usize> {
    let adj = adjacency(state);
    let mut dist: BTreeMap<String, usize> = BTreeMap::new();
    if !state.nodes.contains_key(origin) {
        return dist;
    }
    let mut queue = VecDeque::new();
    dist.insert(origin.to_string(), 0);
    queue.push_back(origin);
    while let Some(cur) = queue.pop_front() {
        let d = dist.get(cur).copied().unwrap_or(0);
        for edge in adj.get(cur).map(Vec::as_slice).unwrap_or(&[]) {
            let Some(next) = edge.other_end(cur) else {
                continue;
            };
            if !dist.contains_key(next) {
                dist.insert(next.to_string(), d + 1);
                queue.push_back(next);
            }
        }
    }
    dist
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Best route using the tweak-selected scorer.
pub fn plan(state: &SimState, from: &str, to: &str, speed: Fixed64) -> Option<RoutePlan> {
    plan_choice(state, from, to, speed, DEFAULT_MAX_CANDIDATES).map(|c| c.chosen)
}

pub fn plan_choice(
    state: &SimState,
    from: &str,
    to: &str,
    speed: Fixed64,
    max_candidates: usize,
) -> Option<RouteChoice> {
    let scorer = scorer_for(&state.tweaks);
    plan_choice_with(state, from, to, speed, max_candidates, scorer.as_ref())
}

/// Plan with an explicit scorer. Returns `None` when either node is
/// missing or no path exists within the hop bound.
pub fn plan_choice_with(
    state: &SimState,
    from: &str,
    to: &str,
    speed: Fixed64,
    max_candidates: usize,
    scorer: &dyn RouteScorer,
) -> Option<RouteChoice> {
    if !state.nodes.contains_key(from) || !state.nodes.contains_key(to) {
        return None;
    }
    if from == to {
        let only = RoutePlan {
            from_node_id: from.to_string(),
            to_node_id: to.to_string(),
            route_id: from.to_string(),
            node_ids: vec![from.to_string()],
            edge_ids: Vec::new(),
            hop_count: 0,
            risk_score: 0,
            total_travel_ticks: 0,
        };
        return Some(RouteChoice {
            chosen: only.clone(),
            candidates: vec![only],
            tie_break: TieBreakReason::Only,
        });
    }

    let max_candidates = max_candidates.max(1);
    let max_hops = MAX_ROUTE_HOPS.min(state.nodes.len().max(1));
    let adj = adjacency(state);
    let to_target = hop_distances(state, to);
    let shortest = *to_target.get(from)?;
    if shortest > max_hops {
        return None;
    }

    let mut found: Vec<RoutePlan> = Vec::new();
    for layer in shortest..=max_hops {
        let mut search = LayerSearch {
            adj: &adj,
            to_target: &to_target,
            target: to,
            hops: layer,
            speed,
            nodes: vec![from],
            edges: Vec::new(),
            visited: BTreeSet::from([from]),
            out: Vec::new(),
        };
        search.dfs(from);
        found.extend(search.out);
        if found.len() >= max_candidates {
            break;
        }
    }

    found.sort_by(|a, b| scorer.compare(a, b));
    found.truncate(max_candidates);
    let chosen = found.first()?.clone();
    let tie_break = match found.get(1) {
        None => TieBreakReason::Only,
        Some(runner_up) => scorer.tie_break(&chosen, runner_up),
    };
    Some(RouteChoice {
        chosen,
        candidates: found,
        tie_break,
    })
}

/// Depth-first enumeration of simple paths with exactly `hops` lanes.
struct LayerSearch<'a> {
    adj: &'a BTreeMap<&'a str, Vec<&'a Edge>>,
    to_target: &'a BTreeMap<String, usize>,
    target: &'a str,
    hops: usize,
    speed: Fixed64,
    nodes: Vec<&'a str>,
    edges: Vec<&'a Edge>,
    visited: BTreeSet<&'a str>,
    out: Vec<RoutePlan>,
}

impl<'a> LayerSearch<'a> {
    fn dfs(&mut self, cur: &'a str) {
        if self.out.len() >= MAX_PATHS_PER_LAYER {
            return;
        }
        if self.edges.len() == self.hops {
            if cur == self.target {
                self.emit();
            }
            return;
        }
        if cur == self.target {
            return;
        }
        let remaining = self.hops - self.edges.len();
        let adj = self.adj;
        let Some(lanes) = adj.get(cur) else {
            return;
        };
        for edge in lanes.iter().copied() {
            let Some(next) = edge.other_end(cur) else {
                continue;
            };
            if self.visited.contains(next) {
                continue;
            }
            match self.to_target.get(next) {
                Some(d) if *d < remaining => {}
                _ => continue,
            }
            self.nodes.push(next);
            self.edges.push(edge);
            self.visited.insert(next);
            self.dfs(next);
            self.visited.remove(next);
            self.edges.pop();
            self.nodes.pop();
            if self.out.len() >= MAX_PATHS_PER_LAYER {
                return;
            }
        }
    }

    fn emit(&mut self) {
        let node_ids: Vec<String> = self.nodes.iter().map(|n| n.to_string()).collect();
        let edge_ids: Vec<String> = self.edges.iter().map(|e| e.id.clone()).collect();
        let risk_score = self.edges.iter().map(|e| edge_risk_score(e)).sum();
        let total_travel_ticks = self
            .edges
            .iter()
            .map(|e| edge_travel_ticks(e, self.speed))
            .fold(0u64, |acc, t| acc.saturating_add(t));
        self.out.push(RoutePlan {
            from_node_id: node_ids.first().cloned().unwrap_or_default(),
            to_node_id: self.target.to_string(),
            route_id: node_ids.join(">"),
            hop_count: edge_ids.len(),
            node_ids,
            edge_ids,
            risk_score,
            total_travel_ticks,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Node, NodeKind};

    fn f(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn state_with(nodes: &[&str], lanes: &[(&str, &str, &str, f64)]) -> SimState {
        let mut s = SimState::new(1);
        for (i, id) in nodes.iter().enumerate() {
            s.nodes.insert(
                id.to_string(),
                Node::new(*id, NodeKind::Station, [f(i as f64), f(0.0), f(0.0)]),
            );
        }
        for (id, a, b, d) in lanes {
            s.edges.insert(id.to_string(), Edge::new(*id, *a, *b, f(*d), 5));
        }
        s
    }

    // -----------------------------------------------------------------------
    // Test 1: equal hops, lower risk wins
    // -----------------------------------------------------------------------
    #[test]
    fn lower_risk_route_wins_on_equal_hops() {
        let s = state_with(
            &["A", "B", "C", "D"],
            &[
                ("e_ab", "A", "B", 1.0),
                ("e_bd", "B", "D", 1.0),
                ("e_ac", "A", "C", 2.0),
                ("e_cd", "C", "D", 2.0),
            ],
        );
        let choice = plan_choice(&s, "A", "D", f(1.0), 8).unwrap();
        assert_eq!(choice.chosen.route_id, "A>B>D");
        assert_eq!(choice.tie_break, TieBreakReason::Risk);
        assert_eq!(choice.candidate_count(), 2);
        assert_eq!(choice.chosen.edge_ids, vec!["e_ab", "e_bd"]);
    }

    // -----------------------------------------------------------------------
    // Test 2: full tie falls back to the route id
    // -----------------------------------------------------------------------
    #[test]
    fn full_tie_uses_route_id() {
        let s = state_with(
            &["A", "B", "C", "D"],
            &[
                ("e_ac", "A", "C", 1.0),
                ("e_cd", "C", "D", 1.0),
                ("e_ab", "A", "B", 1.0),
                ("e_bd", "B", "D", 1.0),
            ],
        );
        let choice = plan_choice(&s, "A", "D", f(1.0), 8).unwrap();
        assert_eq!(choice.chosen.route_id, "A>B>D");
        assert_eq!(choice.tie_break, TieBreakReason::RouteId);
        assert_eq!(choice.chosen.total_travel_ticks, 2);
    }

    // -----------------------------------------------------------------------
    // Test 3: fewer hops beats lower risk by default
    // -----------------------------------------------------------------------
    #[test]
    fn fewer_hops_wins_by_default() {
        let s = state_with(
            &["A", "B", "D"],
            &[("e_ad", "A", "D", 5.0), ("e_ab", "A", "B", 1.0), ("e_bd", "B", "D", 1.0)],
        );
        let choice = plan_choice(&s, "A", "D", f(1.0), 8).unwrap();
        assert_eq!(choice.chosen.route_id, "A>D");
        assert_eq!(choice.tie_break, TieBreakReason::Hops);
    }

    // -----------------------------------------------------------------------
    // Test 4: risk weighting switches to score ordering
    // -----------------------------------------------------------------------
    #[test]
    fn risk_weighting_prefers_lower_score() {
        let mut s = state_with(
            &["A", "B", "D"],
            &[("e_ad", "A", "D", 5.0), ("e_ab", "A", "B", 1.0), ("e_bd", "B", "D", 1.0)],
        );
        s.tweaks.risk_scalar = 2.0;
        let choice = plan_choice(&s, "A", "D", f(1.0), 8).unwrap();
        assert_eq!(choice.chosen.route_id, "A>B>D");
        assert_eq!(choice.tie_break, TieBreakReason::Score);
    }

    #[test]
    fn lanes_are_bidirectional() {
        let s = state_with(&["A", "B"], &[("e_ab", "A", "B", 1.0)]);
        let back = plan(&s, "B", "A", f(1.0)).unwrap();
        assert_eq!(back.route_id, "B>A");
    }

    #[test]
    fn self_route_and_unreachable() {
        let s = state_with(&["A", "B", "Z"], &[("e_ab", "A", "B", 1.0)]);
        let own = plan_choice(&s, "A", "A", f(1.0), 8).unwrap();
        assert_eq!(own.tie_break, TieBreakReason::Only);
        assert_eq!(own.chosen.hop_count, 0);
        assert!(plan(&s, "A", "Z", f(1.0)).is_none());
        assert!(plan(&s, "A", "missing", f(1.0)).is_none());
    }

    #[test]
    fn travel_ticks_round_up() {
        let e = Edge::new("e", "a", "b", f(1.0), 1);
        assert_eq!(edge_travel_ticks(&e, f(0.5)), 2);
        assert_eq!(edge_travel_ticks(&e, f(0.3)), 4);
        assert_eq!(edge_travel_ticks(&e, f(5.0)), 1);
        assert_eq!(edge_risk_score(&e), 1000);
    }

    #[test]
    fn custom_scorer_is_pluggable() {
        struct LongestFirst;
        impl RouteScorer for LongestFirst {
            fn compare(&self, a: &RoutePlan, b: &RoutePlan) -> Ordering {
                b.hop_count.cmp(&a.hop_count).then_with(|| a.route_id.cmp(&b.route_id))
            }
            fn tie_break(&self, _: &RoutePlan, _: &RoutePlan) -> TieBreakReason {
                TieBreakReason::Score
            }
        }
        let s = state_with(
            &["A", "B", "D"],
            &[("e_ad", "A", "D", 1.0), ("e_ab", "A", "B", 1.0), ("e_bd", "B", "D", 1.0)],
        );
        let choice = plan_choice_with(&s, "A", "D", f(1.0), 8, &LongestFirst).unwrap();
        assert_eq!(choice.chosen.route_id, "A>B>D");
    }

    #[test]
    fn hop_distances_bfs() {
        let s = state_with(
            &["A", "B", "C"],
            &[("e_ab", "A", "B", 1.0), ("e_bc", "B", "C", 1.0)],
        );
        let d = hop_distances(&s, "A");
        assert_eq!(d.get("C"), Some(&2));
        assert_eq!(d.get("A"), Some(&0));
    }
}
