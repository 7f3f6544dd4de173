//! Seeded lane incidents.
//!
//! Every lane carrying traffic rolls `FNV-1a64("{seed}|{tick}|{lane}") %
//! 10000` once per tick. The roll is compared against cumulative band
//! thresholds (loss, then delay, then inspection). Incidents are recorded
//! as security events only; they do not alter cargo or travel.

use crate::event::{SecurityEvent, SecurityEventType};
use crate::fixed::Ticks;
use crate::route::edge_risk_score;
use crate::sim::{SimState, fnv1a64};

pub const ROLL_DENOM: u64 = 10_000;
pub const INSPECTION_TICKS: i64 = 2;
const OUTCOME_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    Low,
    Med,
    High,
}

impl RiskBand {
    pub fn from_score(score: i64) -> Self {
        if score < 1000 {
            RiskBand::Low
        } else if score < 3000 {
            RiskBand::Med
        } else {
            RiskBand::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskBand::Low => "LOW",
            RiskBand::Med => "MED",
            RiskBand::High => "HIGH",
        }
    }

    /// Cumulative `(loss, delay, inspection)` upper bounds on the roll.
    pub fn thresholds(self) -> (u64, u64, u64) {
        match self {
            RiskBand::Low => (10, 60, 90),
            RiskBand::Med => (30, 150, 220),
            RiskBand::High => (80, 300, 420),
        }
    }
}

/// Incident type for a roll, if any.
pub fn classify(roll: u64, band: RiskBand) -> Option<SecurityEventType> {
    let (loss, delay, inspection) = band.thresholds();
    if roll < loss {
        Some(SecurityEventType::Loss)
    } else if roll < delay {
        Some(SecurityEventType::Delay)
    } else if roll < inspection {
        Some(SecurityEventType::Inspection)
    } else {
        None
    }
}

pub fn roll(seed: u64, tick: Ticks, edge_id: &str) -> u64 {
    fnv1a64(&format!("{seed}|{tick}|{edge_id}")) % ROLL_DENOM
}

pub fn process(state: &mut SimState) {
    let tick = state.tick;
    let seed = state.seed;
    let mut incidents = Vec::new();

    for edge in state.edges.values().filter(|e| e.used_capacity > 0) {
        let band = RiskBand::from_score(edge_risk_score(edge));
        let r = roll(seed, tick, &edge.id);
        let Some(kind) = classify(r, band) else {
            continue;
        };
        let outcome = fnv1a64(&format!("{}|{tick}|{}", seed ^ OUTCOME_SALT, edge.id));

        let mut ev = SecurityEvent {
            tick,
            kind,
            edge_id: edge.id.clone(),
            from_node_id: edge.from_node_id.clone(),
            to_node_id: edge.to_node_id.clone(),
            risk_band: band.as_str().to_string(),
            cause_chain: format!("RISK_ROLL:{r}|BAND:{}", band.as_str()),
            note: "INCIDENT_V0".to_string(),
            ..SecurityEvent::default()
        };
        match kind {
            SecurityEventType::Delay => ev.delay_ticks = 1 + (outcome % 3) as i64,
            SecurityEventType::Loss => ev.loss_units = 1 + (outcome % 5) as i64,
            SecurityEventType::Inspection => ev.inspection_ticks = INSPECTION_TICKS,
        }
        incidents.push(ev);
    }

    for ev in incidents {
        tracing::debug!(
            target: "tradelane::risk",
            edge = %ev.edge_id,
            band = %ev.risk_band,
            kind = ?ev.kind,
            "risk.incident"
        );
        state.security_events.emit(ev);
    }
}
