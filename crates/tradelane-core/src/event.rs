//! Append-only, schema-bound event logs.
//!
//! Three logs live in the state container: logistics, security and fleet.
//! Systems emit into a log during a tick; the emitted records stay pending
//! until [`EventLog::finalize`] runs at the tick boundary. Finalization
//! sorts the pending records by their owner id (ordinal) and then by
//! emission order, and assigns sequence numbers from the log's counter.
//! Sequence numbers are therefore strictly increasing across the whole log
//! history. Logs are never truncated.
//!
//! Emission order is internal bookkeeping and never appears in a payload.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::fixed::{Ticks, Units};

/// Schema version stamped on every event and payload.
pub const EVENT_SCHEMA_VERSION: i64 = 1;

// ---------------------------------------------------------------------------
// Sequenced trait + log
// ---------------------------------------------------------------------------

/// A record that can be ordered and numbered at tick end.
pub trait Sequenced {
    /// Ordinal sort key within a tick (fleet id, edge id, ...).
    fn owner_key(&self) -> &str;
    fn emit_order(&self) -> u64;
    fn set_emit_order(&mut self, order: u64);
    fn seq(&self) -> u64;
    fn set_seq(&mut self, seq: u64);
    /// The record as a closed-key JSON object.
    fn to_json(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog<E> {
    /// Finalized records in sequence order.
    events: Vec<E>,
    /// Records emitted this tick, awaiting sequence numbers.
    pending: Vec<E>,
    /// Last sequence number handed out (0 = none yet).
    last_seq: u64,
    next_emit: u64,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            pending: Vec::new(),
            last_seq: 0,
            next_emit: 0,
        }
    }
}

impl<E: Sequenced> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for this tick.
    pub fn emit(&mut self, mut event: E) {
        event.set_emit_order(self.next_emit);
        self.next_emit += 1;
        self.pending.push(event);
    }

    /// Order pending records and assign their sequence numbers.
    /// Returns how many records were finalized.
    pub fn finalize(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let mut batch = std::mem::take(&mut self.pending);
        batch.sort_by(|a, b| {
            a.owner_key()
                .cmp(b.owner_key())
                .then(a.emit_order().cmp(&b.emit_order()))
        });
        let count = batch.len();
        for mut event in batch {
            self.last_seq += 1;
            event.set_seq(self.last_seq);
            self.events.push(event);
        }
        self.next_emit = 0;
        count
    }

    /// Finalized records, oldest first.
    pub fn events(&self) -> &[E] {
        &self.events
    }

    /// Records emitted but not yet finalized.
    pub fn pending(&self) -> &[E] {
        &self.pending
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Finalized records with `seq > after`.
    pub fn since(&self, after: u64) -> impl Iterator<Item = &E> {
        self.events.iter().filter(move |e| e.seq() > after)
    }

    /// Versioned payload `{Version, Tick, Events}` over the finalized log.
    pub fn to_payload(&self, tick: Ticks) -> Value {
        let events: Vec<Value> = self.events.iter().map(Sequenced::to_json).collect();
        json!({
            "Version": EVENT_SCHEMA_VERSION,
            "Tick": tick,
            "Events": events,
        })
    }
}

macro_rules! impl_sequenced {
    ($ty:ty, $owner:ident) => {
        impl Sequenced for $ty {
            fn owner_key(&self) -> &str {
                &self.$owner
            }
            fn emit_order(&self) -> u64 {
                self.emit_order
            }
            fn set_emit_order(&mut self, order: u64) {
                self.emit_order = order;
            }
            fn seq(&self) -> u64 {
                self.seq
            }
            fn set_seq(&mut self, seq: u64) {
                self.seq = seq;
            }
            fn to_json(&self) -> Value {
                self.json()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Logistics events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogisticsEventType {
    #[default]
    JobPlanned,
    PhaseChangedToDeliver,
    JobCompleted,
    JobCanceled,
    ManualOverrideSet,
    PickupIssued,
    DeliveryIssued,
    ReservationCreated,
    ReservationReleased,
}

impl LogisticsEventType {
    pub fn code(self) -> i64 {
        match self {
            LogisticsEventType::JobPlanned => 1,
            LogisticsEventType::PhaseChangedToDeliver => 2,
            LogisticsEventType::JobCompleted => 3,
            LogisticsEventType::JobCanceled => 4,
            LogisticsEventType::ManualOverrideSet => 5,
            LogisticsEventType::PickupIssued => 10,
            LogisticsEventType::DeliveryIssued => 11,
            LogisticsEventType::ReservationCreated => 12,
            LogisticsEventType::ReservationReleased => 13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogisticsEvent {
    pub seq: u64,
    pub tick: Ticks,
    pub kind: LogisticsEventType,
    pub fleet_id: String,
    pub good_id: String,
    pub amount: Units,
    pub source_node_id: String,
    pub target_node_id: String,
    pub source_market_id: String,
    pub target_market_id: String,
    pub note: String,
    pub emit_order: u64,
}

impl LogisticsEvent {
    pub fn new(tick: Ticks, kind: LogisticsEventType, fleet_id: &str) -> Self {
        Self {
            tick,
            kind,
            fleet_id: fleet_id.to_string(),
            ..Self::default()
        }
    }

    fn json(&self) -> Value {
        json!({
            "Version": EVENT_SCHEMA_VERSION,
            "Seq": self.seq,
            "Tick": self.tick,
            "Type": self.kind.code(),
            "FleetId": self.fleet_id,
            "GoodId": self.good_id,
            "Amount": self.amount,
            "SourceNodeId": self.source_node_id,
            "TargetNodeId": self.target_node_id,
            "SourceMarketId": self.source_market_id,
            "TargetMarketId": self.target_market_id,
            "Note": self.note,
        })
    }
}

impl_sequenced!(LogisticsEvent, fleet_id);

// ---------------------------------------------------------------------------
// Security events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityEventType {
    #[default]
    Delay,
    Loss,
    Inspection,
}

impl SecurityEventType {
    pub fn code(self) -> i64 {
        match self {
            SecurityEventType::Delay => 1,
            SecurityEventType::Loss => 2,
            SecurityEventType::Inspection => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub seq: u64,
    pub tick: Ticks,
    pub kind: SecurityEventType,
    pub edge_id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub risk_band: String,
    pub delay_ticks: i64,
    pub loss_units: Units,
    pub inspection_ticks: i64,
    pub cause_chain: String,
    pub note: String,
    pub emit_order: u64,
}

impl SecurityEvent {
    fn json(&self) -> Value {
        json!({
            "Version": EVENT_SCHEMA_VERSION,
            "Seq": self.seq,
            "Tick": self.tick,
            "Type": self.kind.code(),
            "EdgeId": self.edge_id,
            "FromNodeId": self.from_node_id,
            "ToNodeId": self.to_node_id,
            "RiskBand": self.risk_band,
            "DelayTicks": self.delay_ticks,
            "LossUnits": self.loss_units,
            "InspectionTicks": self.inspection_ticks,
            "CauseChain": self.cause_chain,
            "Note": self.note,
        })
    }
}

impl_sequenced!(SecurityEvent, edge_id);

// ---------------------------------------------------------------------------
// Fleet events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FleetEventType {
    #[default]
    RouteChosen,
    LaneDeparted,
    LaneArrived,
    LaneCapacityWait,
    DiscoverySeen,
    DiscoveryAnalysisOutcome,
}

impl FleetEventType {
    pub fn code(self) -> i64 {
        match self {
            FleetEventType::RouteChosen => 1,
            FleetEventType::LaneDeparted => 2,
            FleetEventType::LaneArrived => 3,
            FleetEventType::LaneCapacityWait => 4,
            FleetEventType::DiscoverySeen => 5,
            FleetEventType::DiscoveryAnalysisOutcome => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FleetEvent {
    pub seq: u64,
    pub tick: Ticks,
    pub kind: FleetEventType,
    pub fleet_id: String,
    pub edge_id: String,
    pub node_id: String,
    pub chosen_route_id: String,
    pub candidate_count: i64,
    pub tie_break_reason: String,
    pub risk_score: i64,
    pub discovery_id: String,
    pub reason_code: i64,
    pub phase_after: i64,
    pub note: String,
    pub emit_order: u64,
}

impl FleetEvent {
    pub fn new(tick: Ticks, kind: FleetEventType, fleet_id: &str) -> Self {
        Self {
            tick,
            kind,
            fleet_id: fleet_id.to_string(),
            ..Self::default()
        }
    }

    fn json(&self) -> Value {
        json!({
            "Version": EVENT_SCHEMA_VERSION,
            "Seq": self.seq,
            "Tick": self.tick,
            "Type": self.kind.code(),
            "FleetId": self.fleet_id,
            "EdgeId": self.edge_id,
            "NodeId": self.node_id,
            "ChosenRouteId": self.chosen_route_id,
            "CandidateCount": self.candidate_count,
            "TieBreakReason": self.tie_break_reason,
            "RiskScore": self.risk_score,
            "DiscoveryId": self.discovery_id,
            "ReasonCode": self.reason_code,
            "PhaseAfter": self.phase_after,
            "Note": self.note,
        })
    }
}

impl_sequenced!(FleetEvent, fleet_id);

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn logi(fleet: &str, kind: LogisticsEventType) -> LogisticsEvent {
        LogisticsEvent::new(3, kind, fleet)
    }

    // -----------------------------------------------------------------------
    // Test 1: pending records carry no sequence until finalize
    // -----------------------------------------------------------------------
    #[test]
    fn seq_assigned_at_finalize() {
        let mut log = EventLog::new();
        log.emit(logi("f1", LogisticsEventType::JobPlanned));
        assert_eq!(log.pending().len(), 1);
        assert!(log.is_empty());
        assert_eq!(log.finalize(), 1);
        assert_eq!(log.events()[0].seq, 1);
        assert!(log.pending().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 2: same-tick ordering is fleet id, then emission order
    // -----------------------------------------------------------------------
    #[test]
    fn same_tick_sorted_by_owner_then_emission() {
        let mut log = EventLog::new();
        log.emit(logi("fleet_b", LogisticsEventType::JobPlanned));
        log.emit(logi("fleet_a", LogisticsEventType::JobPlanned));
        log.emit(logi("fleet_b", LogisticsEventType::ReservationCreated));
        log.emit(logi("fleet_a", LogisticsEventType::ReservationCreated));
        log.finalize();

        let order: Vec<(&str, LogisticsEventType, u64)> = log
            .events()
            .iter()
            .map(|e| (e.fleet_id.as_str(), e.kind, e.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                ("fleet_a", LogisticsEventType::JobPlanned, 1),
                ("fleet_a", LogisticsEventType::ReservationCreated, 2),
                ("fleet_b", LogisticsEventType::JobPlanned, 3),
                ("fleet_b", LogisticsEventType::ReservationCreated, 4),
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Test 3: sequence numbers keep increasing across ticks
    // -----------------------------------------------------------------------
    #[test]
    fn seq_strictly_increasing_across_ticks() {
        let mut log = EventLog::new();
        for tick in 0..5 {
            log.emit(LogisticsEvent::new(tick, LogisticsEventType::JobPlanned, "z"));
            log.emit(LogisticsEvent::new(tick, LogisticsEventType::JobPlanned, "a"));
            log.finalize();
        }
        let seqs: Vec<u64> = log.events().iter().map(|e| e.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(log.last_seq(), 10);
        assert_eq!(log.since(8).count(), 2);
    }

    #[test]
    fn payload_has_closed_keys_and_no_emit_order() {
        let mut log = EventLog::new();
        log.emit(FleetEvent::new(0, FleetEventType::LaneDeparted, "f1"));
        log.finalize();
        let payload = log.to_payload(1);
        assert_eq!(payload["Version"], 1);
        let event = &payload["Events"][0];
        assert_eq!(event["Type"], 2);
        assert!(event.get("EmitOrder").is_none());
        assert_eq!(event.as_object().map(|o| o.len()), Some(15));
    }

    #[test]
    fn type_codes_are_stable() {
        assert_eq!(LogisticsEventType::ManualOverrideSet.code(), 5);
        assert_eq!(LogisticsEventType::ReservationReleased.code(), 13);
        assert_eq!(SecurityEventType::Inspection.code(), 3);
        assert_eq!(FleetEventType::LaneCapacityWait.code(), 4);
    }
}
