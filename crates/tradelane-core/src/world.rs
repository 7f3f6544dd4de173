//! Static topology: nodes, lanes and world classes.
//!
//! Topology is fixed after generation or loading. Only the runtime lane
//! fields (`used_capacity`, `heat`) and node trace change during play.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Star,
    Station,
    Waypoint,
}

impl NodeKind {
    /// Parse a kind token, ignoring ASCII case.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "star" => Some(NodeKind::Star),
            "station" => Some(NodeKind::Station),
            "waypoint" => Some(NodeKind::Waypoint),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Star => "Star",
            NodeKind::Station => "Station",
            NodeKind::Waypoint => "Waypoint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub pos: [Fixed64; 3],
    pub market_id: Option<String>,
    pub world_class_id: Option<String>,
    /// Containment trace left by fracture arrivals. Decays every tick.
    pub trace: Fixed64,
    /// Discoveries revealed (phase Seen) when a fleet arrives here.
    #[serde(default)]
    pub seeded_discovery_ids: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, pos: [Fixed64; 3]) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            pos,
            market_id: None,
            world_class_id: None,
            trace: Fixed64::ZERO,
            seeded_discovery_ids: Vec::new(),
        }
    }

    /// Squared Euclidean distance to another node, in fixed point.
    pub fn distance_sq(&self, other: &Node) -> Fixed64 {
        let mut acc = Fixed64::ZERO;
        for axis in 0..3 {
            let d = self.pos[axis] - other.pos[axis];
            acc = acc.saturating_add(d.saturating_mul(d));
        }
        acc
    }

    /// Euclidean distance to another node.
    pub fn distance_to(&self, other: &Node) -> Fixed64 {
        fixed_sqrt(self.distance_sq(other))
    }
}

/// Integer square root on the raw Q32.32 bits. Exact and platform-stable.
pub fn fixed_sqrt(v: Fixed64) -> Fixed64 {
    if v <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }
    // sqrt(bits / 2^32) * 2^32 == sqrt(bits * 2^32)
    let scaled = (v.to_bits() as u128) << 32;
    Fixed64::from_bits(isqrt_u128(scaled) as i64)
}

fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

// ---------------------------------------------------------------------------
// Edge (lane)
// ---------------------------------------------------------------------------

/// A capacity-bounded, bidirectional lane between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub distance: Fixed64,
    pub total_capacity: u32,
    pub used_capacity: u32,
    pub heat: Fixed64,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        distance: Fixed64,
        total_capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            from_node_id: from.into(),
            to_node_id: to.into(),
            distance,
            total_capacity,
            used_capacity: 0,
            heat: Fixed64::ZERO,
        }
    }

    /// True when the lane joins `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from_node_id == a && self.to_node_id == b)
            || (self.from_node_id == b && self.to_node_id == a)
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.from_node_id == node {
            Some(&self.to_node_id)
        } else if self.to_node_id == node {
            Some(&self.from_node_id)
        } else {
            None
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.used_capacity < self.total_capacity
    }

    /// Reserve one slot. Returns false (and changes nothing) when full.
    pub fn try_reserve(&mut self) -> bool {
        if !self.has_free_slot() {
            return false;
        }
        self.used_capacity += 1;
        true
    }

    /// Release one slot, never going below zero.
    pub fn release(&mut self) {
        self.used_capacity = self.used_capacity.saturating_sub(1);
    }
}

// ---------------------------------------------------------------------------
// World class
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldClass {
    pub id: String,
    pub fee_multiplier: Fixed64,
}
