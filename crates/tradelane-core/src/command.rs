//! Synchronous commands from outside the simulation.
//!
//! A command is validated and applied the moment it is enqueued. Every
//! precondition is checked before the first mutation, so a command either
//! applies completely or is a silent no-op. [`apply`] reports which.

use serde::{Deserialize, Serialize};

use crate::event::{LogisticsEvent, LogisticsEventType};
use crate::fixed::{Ticks, Units};
use crate::fleet::FleetState;
use crate::fracture;
use crate::intel::{self, DiscoveryReasonCode, ExpeditionKind};
use crate::intent;
use crate::lane_flow;
use crate::logistics;
use crate::program::{self, ProgramSpec, ProgramStatus};
use crate::sim::SimState;

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Player buys from a market into player cargo.
    Buy {
        market_id: String,
        good_id: String,
        quantity: Units,
    },
    /// Player sells from player cargo into a market.
    Sell {
        market_id: String,
        good_id: String,
        quantity: Units,
    },
    /// Send a fleet across one adjacent lane.
    Travel { fleet_id: String, target_node_id: String },
    /// Assert (Some) or clear (None) a manual override destination.
    FleetSetDestination {
        fleet_id: String,
        target_node_id: Option<String>,
        note: String,
    },
    FleetJobCancel { fleet_id: String, note: String },
    LoadCargo {
        fleet_id: String,
        market_id: String,
        good_id: String,
        quantity: Units,
    },
    UnloadCargo {
        fleet_id: String,
        market_id: String,
        good_id: String,
        quantity: Units,
    },
    /// Docked fleets become Idle.
    Undock { fleet_id: String },
    PlanLogistics {
        fleet_id: String,
        source_market_id: String,
        target_market_id: String,
        good_id: String,
        amount: Units,
    },
    FractureTravel { fleet_id: String, target_node_id: String },
    CreateProgram { spec: ProgramSpec },
    SetProgramStatus { program_id: String, status: ProgramStatus },
    DiscoveryScan { fleet_id: String, discovery_id: String },
    DiscoveryAnalyze { fleet_id: String, discovery_id: String },
    Expedition {
        fleet_id: String,
        discovery_id: String,
        kind: ExpeditionKind,
    },
    /// Ship market stock from one node to an adjacent one over their lane.
    ShipTransfer {
        transfer_id: String,
        from_node_id: String,
        to_node_id: String,
        good_id: String,
        quantity: Units,
    },
    /// Host reports the player ship docked at a node.
    PlayerDock { node_id: String },
    PlayerSelectDestination { node_id: Option<String> },
}

impl Command {
    /// Stable kind token.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Buy { .. } => "BUY",
            Command::Sell { .. } => "SELL",
            Command::Travel { .. } => "TRAVEL",
            Command::FleetSetDestination { .. } => "FLEET_SET_DESTINATION",
            Command::FleetJobCancel { .. } => "FLEET_JOB_CANCEL",
            Command::LoadCargo { .. } => "LOAD_CARGO",
            Command::UnloadCargo { .. } => "UNLOAD_CARGO",
            Command::Undock { .. } => "UNDOCK",
            Command::PlanLogistics { .. } => "PLAN_LOGISTICS",
            Command::FractureTravel { .. } => "FRACTURE_TRAVEL",
            Command::CreateProgram { .. } => "CREATE_PROGRAM",
            Command::SetProgramStatus { .. } => "SET_PROGRAM_STATUS",
            Command::DiscoveryScan { .. } => "DISCOVERY_SCAN",
            Command::DiscoveryAnalyze { .. } => "DISCOVERY_ANALYZE",
            Command::Expedition { .. } => "EXPEDITION",
            Command::ShipTransfer { .. } => "SHIP_TRANSFER",
            Command::PlayerDock { .. } => "PLAYER_DOCK",
            Command::PlayerSelectDestination { .. } => "PLAYER_SELECT_DESTINATION",
        }
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Apply one command. Returns false when it was a no-op.
pub fn apply(state: &mut SimState, command: &Command) -> bool {
    let applied = match command {
        Command::Buy {
            market_id,
            good_id,
            quantity,
        } => intent::apply_buy(state, market_id, good_id, *quantity),
        Command::Sell {
            market_id,
            good_id,
            quantity,
        } => intent::apply_sell(state, market_id, good_id, *quantity),
        Command::Travel {
            fleet_id,
            target_node_id,
        } => travel(state, fleet_id, target_node_id),
        Command::FleetSetDestination {
            fleet_id,
            target_node_id,
            note,
        } => set_destination(state, fleet_id, target_node_id.as_deref(), note),
        Command::FleetJobCancel { fleet_id, note } => cancel_job(state, fleet_id, note),
        Command::LoadCargo {
            fleet_id,
            market_id,
            good_id,
            quantity,
        } => intent::apply_load_cargo(state, fleet_id, market_id, good_id, *quantity) > 0,
        Command::UnloadCargo {
            fleet_id,
            market_id,
            good_id,
            quantity,
        } => intent::apply_unload_cargo(state, fleet_id, market_id, good_id, *quantity) > 0,
        Command::Undock { fleet_id } => match state.fleets.get_mut(fleet_id) {
            Some(f) if f.state == FleetState::Docked => {
                f.state = FleetState::Idle;
                true
            }
            _ => false,
        },
        Command::PlanLogistics {
            fleet_id,
            source_market_id,
            target_market_id,
            good_id,
            amount,
        } => logistics::plan_logistics(
            state,
            fleet_id,
            source_market_id,
            target_market_id,
            good_id,
            *amount,
        ),
        Command::FractureTravel {
            fleet_id,
            target_node_id,
        } => fracture::begin(state, fleet_id, target_node_id),
        Command::CreateProgram { spec } => {
            program::create_program(state, spec.clone());
            true
        }
        Command::SetProgramStatus { program_id, status } => {
            program::set_status(state, program_id, *status)
        }
        Command::DiscoveryScan {
            fleet_id,
            discovery_id,
        } => intel::apply_scan(state, fleet_id, discovery_id) == DiscoveryReasonCode::Ok,
        Command::DiscoveryAnalyze {
            fleet_id,
            discovery_id,
        } => intel::apply_analyze(state, fleet_id, discovery_id) == DiscoveryReasonCode::Ok,
        Command::Expedition {
            fleet_id,
            discovery_id,
            kind,
        } => matches!(
            intel::apply_expedition(state, fleet_id, discovery_id, *kind),
            DiscoveryReasonCode::Ok | DiscoveryReasonCode::Dispatched
        ),
        Command::ShipTransfer {
            transfer_id,
            from_node_id,
            to_node_id,
            good_id,
            quantity,
        } => lane_flow::try_enqueue_transfer(
            state,
            from_node_id,
            to_node_id,
            good_id,
            *quantity,
            transfer_id,
        ),
        Command::PlayerDock { node_id } => {
            if state.nodes.contains_key(node_id) {
                state.player.location_node_id = node_id.clone();
                true
            } else {
                false
            }
        }
        Command::PlayerSelectDestination { node_id } => match node_id {
            Some(n) if !state.nodes.contains_key(n) => false,
            _ => {
                state.player.selected_destination_node_id = node_id.clone();
                true
            }
        },
    };
    tracing::debug!(target: "tradelane::command", kind = command.kind(), applied, "command.applied");
    applied
}

fn travel(state: &mut SimState, fleet_id: &str, target: &str) -> bool {
    let Some(fleet) = state.fleets.get(fleet_id) else {
        return false;
    };
    if fleet.state.is_moving() || fleet.current_node_id == target {
        return false;
    }
    if state.edge_between(&fleet.current_node_id, target).is_none() {
        return false;
    }
    let Some(f) = state.fleets.get_mut(fleet_id) else {
        return false;
    };
    f.clear_route();
    f.destination_node_id = Some(target.to_string());
    true
}

/// Manual override. Asserting cancels any job and takes routing authority;
/// clearing never resumes a cancelled job.
fn set_destination(state: &mut SimState, fleet_id: &str, target: Option<&str>, note: &str) -> bool {
    let Some(fleet) = state.fleets.get(fleet_id) else {
        return false;
    };

    let Some(target) = target.filter(|t| !t.is_empty()) else {
        let idle = fleet.current_job.is_none() && !fleet.state.is_moving();
        if let Some(f) = state.fleets.get_mut(fleet_id) {
            f.manual_override_node_id = None;
            if idle {
                f.current_task = "Idle".to_string();
            }
        }
        return true;
    };
    if !state.nodes.contains_key(target) {
        return false;
    }

    let cancel_note = if note.is_empty() { "MANUAL_OVERRIDE" } else { note };
    logistics::cancel_job(state, fleet_id, cancel_note);

    let tick = state.tick;
    let Some(f) = state.fleets.get_mut(fleet_id) else {
        return false;
    };
    f.manual_override_node_id = Some(target.to_string());
    f.clear_route();
    f.destination_node_id = Some(target.to_string());
    f.current_task = format!("ManualOverride:{target}");
    let origin = f.current_node_id.clone();

    let mut ev = LogisticsEvent::new(tick, LogisticsEventType::ManualOverrideSet, fleet_id);
    ev.source_node_id = origin;
    ev.target_node_id = target.to_string();
    ev.note = note.to_string();
    state.logistics_events.emit(ev);
    tracing::debug!(target: "tradelane::command", fleet = fleet_id, dest = target, "command.manual_override");
    true
}

/// Cancel a job without touching any manual override or in-progress lane.
fn cancel_job(state: &mut SimState, fleet_id: &str, note: &str) -> bool {
    if !logistics::cancel_job(state, fleet_id, note) {
        return false;
    }
    if let Some(f) = state.fleets.get_mut(fleet_id) {
        f.route_edge_ids.clear();
        f.route_edge_index = 0;
        f.final_destination_node_id = None;
        if f.manual_override_node_id.is_none() {
            f.destination_node_id = None;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Bounded record of applied commands, `(tick, command)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandHistory {
    entries: Vec<(Ticks, Command)>,
    /// 0 = keep nothing.
    max_history: usize,
}

impl CommandHistory {
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_history,
        }
    }

    pub fn record(&mut self, tick: Ticks, command: &Command) {
        if self.max_history == 0 {
            return;
        }
        self.entries.push((tick, command.clone()));
        let excess = self.entries.len().saturating_sub(self.max_history);
        if excess > 0 {
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[(Ticks, Command)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed64;
    use crate::fleet::{AI_OWNER, Controller, Fleet, JobPhase};
    use crate::market::Market;
    use crate::world::{Edge, Node, NodeKind};

    fn world() -> SimState {
        let mut s = SimState::new(11);
        for (i, (node, mkt)) in [("a", "ma"), ("b", "mb"), ("c", "mc")].iter().enumerate() {
            let mut n = Node::new(*node, NodeKind::Station, [Fixed64::from_num(i as i32), Fixed64::ZERO, Fixed64::ZERO]);
            n.market_id = Some(mkt.to_string());
            s.nodes.insert(node.to_string(), n);
            s.markets.insert(mkt.to_string(), Market::new(*mkt));
        }
        s.edges.insert("ab".into(), Edge::new("ab", "a", "b", Fixed64::from_num(1), 2));
        s.edges.insert("bc".into(), Edge::new("bc", "b", "c", Fixed64::from_num(1), 2));
        if let Some(m) = s.markets.get_mut("mb") {
            m.inventory.insert("ore".into(), 20);
        }
        s.fleets.insert("f1".into(), Fleet::new("f1", AI_OWNER, "a", Fixed64::from_num(1)));
        s.player.location_node_id = "a".into();
        s.player.credits = 5_000;
        s
    }

    // -----------------------------------------------------------------------
    // Test 1: manual override cancels the job and releases its reservation
    // -----------------------------------------------------------------------
    #[test]
    fn manual_override_cancels_job() {
        let mut s = world();
        assert!(apply(
            &mut s,
            &Command::PlanLogistics {
                fleet_id: "f1".into(),
                source_market_id: "mb".into(),
                target_market_id: "mc".into(),
                good_id: "ore".into(),
                amount: 5,
            }
        ));
        assert_eq!(s.fleets["f1"].controller(), Controller::LogisticsJob);
        assert_eq!(s.fleets["f1"].current_job.as_ref().map(|j| j.phase), Some(JobPhase::Pickup));

        assert!(apply(
            &mut s,
            &Command::FleetSetDestination {
                fleet_id: "f1".into(),
                target_node_id: Some("c".into()),
                note: String::new(),
            }
        ));
        let f = &s.fleets["f1"];
        assert_eq!(f.controller(), Controller::ManualOverride);
        assert!(f.current_job.is_none());
        assert_eq!(f.destination_node_id.as_deref(), Some("c"));
        assert_eq!(f.current_task, "ManualOverride:c");
        assert!(s.reservations.is_empty());

        s.finalize_events();
        let kinds: Vec<LogisticsEventType> = s.logistics_events.events().iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&LogisticsEventType::JobCanceled));
        assert_eq!(kinds.last(), Some(&LogisticsEventType::ManualOverrideSet));
    }

    // -----------------------------------------------------------------------
    // Test 2: clearing an override does not resume the cancelled job
    // -----------------------------------------------------------------------
    #[test]
    fn clearing_override_does_not_resume() {
        let mut s = world();
        apply(
            &mut s,
            &Command::PlanLogistics {
                fleet_id: "f1".into(),
                source_market_id: "mb".into(),
                target_market_id: "mc".into(),
                good_id: "ore".into(),
                amount: 5,
            },
        );
        apply(
            &mut s,
            &Command::FleetSetDestination {
                fleet_id: "f1".into(),
                target_node_id: Some("b".into()),
                note: "ui".into(),
            },
        );
        assert!(apply(
            &mut s,
            &Command::FleetSetDestination {
                fleet_id: "f1".into(),
                target_node_id: None,
                note: String::new(),
            }
        ));
        assert_eq!(s.fleets["f1"].controller(), Controller::None);
        assert!(s.fleets["f1"].current_job.is_none());
    }

    // -----------------------------------------------------------------------
    // Test 3: invalid commands are silent no-ops
    // -----------------------------------------------------------------------
    #[test]
    fn invalid_commands_do_nothing() {
        let mut s = world();
        let before = s.clone();
        let bad = [
            Command::Buy {
                market_id: "ma".into(),
                good_id: "ore".into(),
                quantity: 1,
            },
            Command::Travel {
                fleet_id: "f1".into(),
                target_node_id: "c".into(),
            },
            Command::FleetSetDestination {
                fleet_id: "f1".into(),
                target_node_id: Some("nowhere".into()),
                note: String::new(),
            },
            Command::FleetJobCancel {
                fleet_id: "f1".into(),
                note: String::new(),
            },
            Command::Undock { fleet_id: "f1".into() },
            Command::SetProgramStatus {
                program_id: "P1".into(),
                status: ProgramStatus::Running,
            },
            Command::PlayerDock { node_id: "zz".into() },
        ];
        for cmd in &bad {
            assert!(!apply(&mut s, cmd), "{} should be a no-op", cmd.kind());
        }
        assert_eq!(s, before);
    }

    #[test]
    fn travel_sets_adjacent_destination() {
        let mut s = world();
        assert!(apply(
            &mut s,
            &Command::Travel {
                fleet_id: "f1".into(),
                target_node_id: "b".into(),
            }
        ));
        assert_eq!(s.fleets["f1"].destination_node_id.as_deref(), Some("b"));
    }

    #[test]
    fn buy_and_sell_round_trip_credits() {
        let mut s = world();
        let buy = Command::Buy {
            market_id: "mb".into(),
            good_id: "ore".into(),
            quantity: 2,
        };
        assert!(apply(&mut s, &buy));
        assert_eq!(s.player.cargo.get("ore"), Some(&2));
        assert!(s.player.credits < 5_000);
        let sell = Command::Sell {
            market_id: "mb".into(),
            good_id: "ore".into(),
            quantity: 2,
        };
        assert!(apply(&mut s, &sell));
        assert!(s.player.cargo.get("ore").is_none());
        assert!(s.player.credits < 5_000, "spread is never free");
    }

    #[test]
    fn history_is_bounded() {
        let mut h = CommandHistory::with_max_history(2);
        for t in 0..5 {
            h.record(t, &Command::Undock { fleet_id: "f".into() });
        }
        assert_eq!(h.len(), 2);
        assert_eq!(h.entries()[0].0, 3);
        let mut off = CommandHistory::default();
        off.record(0, &Command::Undock { fleet_id: "f".into() });
        assert!(off.is_empty());
    }
}
