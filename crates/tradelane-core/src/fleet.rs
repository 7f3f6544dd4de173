//! Fleets, logistics jobs and the authority model that decides who is
//! steering a fleet.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Units};
use crate::ledger::{self, Inventory};

pub const PLAYER_OWNER: &str = "player";
pub const AI_OWNER: &str = "ai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetState {
    Idle,
    Docked,
    Traveling,
    FractureTraveling,
}

impl FleetState {
    pub fn as_str(self) -> &'static str {
        match self {
            FleetState::Idle => "Idle",
            FleetState::Docked => "Docked",
            FleetState::Traveling => "Traveling",
            FleetState::FractureTraveling => "FractureTraveling",
        }
    }

    pub fn is_moving(self) -> bool {
        matches!(self, FleetState::Traveling | FleetState::FractureTraveling)
    }
}

/// Which actor currently steers a fleet. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Controller {
    ManualOverride,
    LogisticsJob,
    Program,
    None,
}

impl Controller {
    pub fn as_str(self) -> &'static str {
        match self {
            Controller::ManualOverride => "ManualOverride",
            Controller::LogisticsJob => "LogisticsJob",
            Controller::Program => "Program",
            Controller::None => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Pickup,
    Deliver,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPhase::Pickup => "Pickup",
            JobPhase::Deliver => "Deliver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticsJob {
    pub id: String,
    pub good_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub source_market_id: String,
    pub target_market_id: String,
    pub amount: Units,
    pub phase: JobPhase,
    pub reservation_id: Option<String>,
    /// Lane ids for the leg to the source, as planned at job creation.
    pub pickup_leg: Vec<String>,
    /// Lane ids for the leg from source to target.
    pub deliver_leg: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    pub id: String,
    pub owner_id: String,
    pub current_node_id: String,
    /// Node the fleet has been asked to reach.
    pub destination_node_id: Option<String>,
    /// Last node of the active route plan.
    pub final_destination_node_id: Option<String>,
    pub current_edge_id: Option<String>,
    pub route_edge_ids: Vec<String>,
    pub route_edge_index: usize,
    pub state: FleetState,
    pub travel_progress: Fixed64,
    /// Distance covered per tick, in lane distance units.
    pub speed: Fixed64,
    pub cargo: Inventory,
    pub current_task: String,
    pub current_job: Option<LogisticsJob>,
    pub program_id: Option<String>,
    pub manual_override_node_id: Option<String>,
    /// Set while the next lane is full; cleared on departure.
    pub lane_wait: bool,
    pub fracture_target_node_id: Option<String>,
}

impl Fleet {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        node: impl Into<String>,
        speed: Fixed64,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner.into(),
            current_node_id: node.into(),
            destination_node_id: None,
            final_destination_node_id: None,
            current_edge_id: None,
            route_edge_ids: Vec::new(),
            route_edge_index: 0,
            state: FleetState::Idle,
            travel_progress: Fixed64::ZERO,
            speed,
            cargo: Inventory::new(),
            current_task: "Idle".to_string(),
            current_job: None,
            program_id: None,
            manual_override_node_id: None,
            lane_wait: false,
            fracture_target_node_id: None,
        }
    }

    /// Authority precedence: ManualOverride > LogisticsJob > Program > None.
    pub fn controller(&self) -> Controller {
        if self.manual_override_node_id.is_some() {
            Controller::ManualOverride
        } else if self.current_job.is_some() {
            Controller::LogisticsJob
        } else if self.program_id.is_some() {
            Controller::Program
        } else {
            Controller::None
        }
    }

    pub fn cargo_units(&self, good: &str) -> Units {
        ledger::get(&self.cargo, good)
    }

    /// True when docked or idle at a node, not on a lane.
    pub fn is_at_node(&self, node: &str) -> bool {
        !self.state.is_moving() && self.current_node_id == node
    }

    pub fn has_route(&self) -> bool {
        self.route_edge_index < self.route_edge_ids.len()
    }

    /// Lane id of the next hop, if a route is active.
    pub fn next_route_edge(&self) -> Option<&str> {
        self.route_edge_ids
            .get(self.route_edge_index)
            .map(String::as_str)
    }

    /// Drop the route plan. A lane currently being traversed is kept so the
    /// hop can finish and release its slot.
    pub fn clear_route(&mut self) {
        self.route_edge_ids.clear();
        self.route_edge_index = 0;
        self.final_destination_node_id = None;
        self.destination_node_id = None;
        self.lane_wait = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> Fleet {
        Fleet::new("f1", PLAYER_OWNER, "a", Fixed64::from_num(1))
    }

    fn job() -> LogisticsJob {
        LogisticsJob {
            id: "J1".into(),
            good_id: "ore".into(),
            source_node_id: "b".into(),
            target_node_id: "c".into(),
            source_market_id: "mb".into(),
            target_market_id: "mc".into(),
            amount: 5,
            phase: JobPhase::Pickup,
            reservation_id: None,
            pickup_leg: Vec::new(),
            deliver_leg: Vec::new(),
        }
    }

    #[test]
    fn controller_precedence() {
        let mut f = fleet();
        assert_eq!(f.controller(), Controller::None);
        f.program_id = Some("P1".into());
        assert_eq!(f.controller(), Controller::Program);
        f.current_job = Some(job());
        assert_eq!(f.controller(), Controller::LogisticsJob);
        f.manual_override_node_id = Some("c".into());
        assert_eq!(f.controller(), Controller::ManualOverride);
    }

    #[test]
    fn route_cursor() {
        let mut f = fleet();
        assert!(!f.has_route());
        f.route_edge_ids = vec!["l1".into(), "l2".into()];
        assert_eq!(f.next_route_edge(), Some("l1"));
        f.route_edge_index = 2;
        assert!(!f.has_route());
        f.clear_route();
        assert_eq!(f.route_edge_index, 0);
    }
}
