//! Cadence-scheduled programs.
//!
//! A program is an autonomous actor that wakes every `cadence_ticks` and
//! asks for work: it enqueues intents, plans a logistics job, or starts a
//! site build. Programs never touch ledgers themselves.
//!
//! Status machine: `Paused -> Running -> Paused | Cancelled`. Cancelled is
//! terminal. A program bound to a fleet pauses itself the first tick it sees
//! that fleet under manual override.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{Ticks, Units};
use crate::fleet::Controller;
use crate::industry::{self, CAP_MODULE_RECIPE_ID};
use crate::intel::ExpeditionKind;
use crate::intent::Intent;
use crate::logistics::{self, HAUL_CAP_UNITS};
use crate::sim::SimState;

pub const DEFAULT_CADENCE_TICKS: i64 = 60;

// ---------------------------------------------------------------------------
// Kinds and status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgramKind {
    AutoBuy,
    AutoSell,
    ConstrCapModule,
    TradeCharter,
    ResourceTap,
    Expedition,
}

impl ProgramKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramKind::AutoBuy => "AUTO_BUY",
            ProgramKind::AutoSell => "AUTO_SELL",
            ProgramKind::ConstrCapModule => "CONSTR_CAP_MODULE_V0",
            ProgramKind::TradeCharter => "TRADE_CHARTER_V0",
            ProgramKind::ResourceTap => "RESOURCE_TAP_V0",
            ProgramKind::Expedition => "EXPEDITION_V0",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "AUTO_BUY" => Some(ProgramKind::AutoBuy),
            "AUTO_SELL" => Some(ProgramKind::AutoSell),
            "CONSTR_CAP_MODULE_V0" => Some(ProgramKind::ConstrCapModule),
            "TRADE_CHARTER_V0" => Some(ProgramKind::TradeCharter),
            "RESOURCE_TAP_V0" => Some(ProgramKind::ResourceTap),
            "EXPEDITION_V0" => Some(ProgramKind::Expedition),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProgramStatus {
    #[default]
    Paused,
    Running,
    Cancelled,
}

impl ProgramStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramStatus::Paused => "Paused",
            ProgramStatus::Running => "Running",
            ProgramStatus::Cancelled => "Cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramInstance {
    pub id: String,
    pub kind: ProgramKind,
    pub status: ProgramStatus,
    pub created_tick: Ticks,
    /// Always at least 1.
    pub cadence_ticks: Ticks,
    pub next_run_tick: Ticks,
    pub last_run_tick: Option<Ticks>,

    /// Destination market for trades and charters.
    pub market_id: String,
    /// Source market for charters and resource taps.
    pub source_market_id: String,
    pub good_id: String,
    pub quantity: Units,

    pub fleet_id: Option<String>,
    pub site_id: Option<String>,
    pub discovery_id: Option<String>,
    pub expedition_kind: Option<ExpeditionKind>,
}

impl ProgramInstance {
    pub fn is_runnable_at(&self, tick: Ticks) -> bool {
        self.status == ProgramStatus::Running && tick >= self.next_run_tick
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBook {
    pub instances: BTreeMap<String, ProgramInstance>,
    pub next_program_seq: u64,
}

impl Default for ProgramBook {
    fn default() -> Self {
        Self {
            instances: BTreeMap::new(),
            next_program_seq: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Everything needed to create a program. Built through the per-kind
/// constructors; unused fields stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSpec {
    pub kind: ProgramKind,
    pub cadence_ticks: i64,
    pub market_id: String,
    pub source_market_id: String,
    pub good_id: String,
    pub quantity: Units,
    pub fleet_id: Option<String>,
    pub site_id: Option<String>,
    pub discovery_id: Option<String>,
    pub expedition_kind: Option<ExpeditionKind>,
}

impl ProgramSpec {
    fn blank(kind: ProgramKind) -> Self {
        Self {
            kind,
            cadence_ticks: DEFAULT_CADENCE_TICKS,
            market_id: String::new(),
            source_market_id: String::new(),
            good_id: String::new(),
            quantity: 0,
            fleet_id: None,
            site_id: None,
            discovery_id: None,
            expedition_kind: None,
        }
    }

    pub fn auto_buy(market_id: &str, good_id: &str, quantity: Units) -> Self {
        Self {
            market_id: market_id.to_string(),
            good_id: good_id.to_string(),
            quantity,
            ..Self::blank(ProgramKind::AutoBuy)
        }
    }

    pub fn auto_sell(market_id: &str, good_id: &str, quantity: Units) -> Self {
        Self {
            market_id: market_id.to_string(),
            good_id: good_id.to_string(),
            quantity,
            ..Self::blank(ProgramKind::AutoSell)
        }
    }

    pub fn construction(site_id: &str) -> Self {
        Self {
            site_id: Some(site_id.to_string()),
            ..Self::blank(ProgramKind::ConstrCapModule)
        }
    }

    pub fn trade_charter(fleet_id: &str, source_market_id: &str, target_market_id: &str, good_id: &str) -> Self {
        Self {
            fleet_id: Some(fleet_id.to_string()),
            source_market_id: source_market_id.to_string(),
            market_id: target_market_id.to_string(),
            good_id: good_id.to_string(),
            quantity: HAUL_CAP_UNITS,
            ..Self::blank(ProgramKind::TradeCharter)
        }
    }

    pub fn resource_tap(fleet_id: &str, source_market_id: &str, good_id: &str, quantity: Units) -> Self {
        Self {
            fleet_id: Some(fleet_id.to_string()),
            source_market_id: source_market_id.to_string(),
            good_id: good_id.to_string(),
            quantity,
            ..Self::blank(ProgramKind::ResourceTap)
        }
    }

    pub fn expedition(fleet_id: &str, discovery_id: &str, kind: ExpeditionKind) -> Self {
        Self {
            fleet_id: Some(fleet_id.to_string()),
            discovery_id: Some(discovery_id.to_string()),
            expedition_kind: Some(kind),
            ..Self::blank(ProgramKind::Expedition)
        }
    }

    pub fn with_cadence(mut self, cadence_ticks: i64) -> Self {
        self.cadence_ticks = cadence_ticks;
        self
    }

    pub fn with_quantity(mut self, quantity: Units) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Add a Paused program and return its id. A bound fleet with no program
/// yet takes this one as its controller.
pub fn create_program(state: &mut SimState, spec: ProgramSpec) -> String {
    let book = &mut state.programs;
    let id = format!("P{}", book.next_program_seq);
    book.next_program_seq += 1;

    let cadence = if spec.cadence_ticks <= 0 { 1 } else { spec.cadence_ticks as Ticks };
    let tick = state.tick;
    if let Some(fleet) = spec
        .fleet_id
        .as_deref()
        .and_then(|f| state.fleets.get_mut(f))
        .filter(|f| f.program_id.is_none())
    {
        fleet.program_id = Some(id.clone());
    }

    tracing::debug!(target: "tradelane::program", program = %id, kind = spec.kind.as_str(), "program.created");
    state.programs.instances.insert(
        id.clone(),
        ProgramInstance {
            id: id.clone(),
            kind: spec.kind,
            status: ProgramStatus::Paused,
            created_tick: tick,
            cadence_ticks: cadence,
            next_run_tick: tick,
            last_run_tick: None,
            market_id: spec.market_id,
            source_market_id: spec.source_market_id,
            good_id: spec.good_id,
            quantity: spec.quantity,
            fleet_id: spec.fleet_id,
            site_id: spec.site_id,
            discovery_id: spec.discovery_id,
            expedition_kind: spec.expedition_kind,
        },
    );
    id
}

/// Change a program's status. Returns false for unknown ids, for any
/// transition out of Cancelled, and for no-change requests.
pub fn set_status(state: &mut SimState, program_id: &str, status: ProgramStatus) -> bool {
    let tick = state.tick;
    let Some(p) = state.programs.instances.get_mut(program_id) else {
        return false;
    };
    if p.status == ProgramStatus::Cancelled || p.status == status {
        return false;
    }
    p.status = status;
    if status == ProgramStatus::Running && p.next_run_tick < tick {
        p.next_run_tick = tick;
    }
    let fleet_id = p.fleet_id.clone();
    if status == ProgramStatus::Cancelled {
        if let Some(f) = fleet_id.as_deref().and_then(|f| state.fleets.get_mut(f)) {
            if f.program_id.as_deref() == Some(program_id) {
                f.program_id = None;
            }
        }
    }
    tracing::debug!(target: "tradelane::program", program = program_id, status = status.as_str(), "program.status");
    true
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Run every due program once, in program id order.
pub fn process(state: &mut SimState) {
    if state.programs.instances.is_empty() {
        return;
    }
    let tick = state.tick;
    pause_overridden(state);
    let due: Vec<String> = state
        .programs
        .instances
        .values()
        .filter(|p| p.is_runnable_at(tick))
        .map(|p| p.id.clone())
        .collect();

    for id in due {
        let Some(program) = state.programs.instances.get(&id).cloned() else {
            continue;
        };

        run_once(state, &program);

        if let Some(p) = state.programs.instances.get_mut(&id) {
            p.last_run_tick = Some(tick);
            p.next_run_tick = tick.saturating_add(p.cadence_ticks.max(1));
        }
    }
}

/// Pause every Running program whose fleet is under manual override,
/// whether or not the program is due this tick. Only an explicit status
/// change resumes it.
fn pause_overridden(state: &mut SimState) {
    let fleets = &state.fleets;
    for p in state.programs.instances.values_mut() {
        if p.status != ProgramStatus::Running {
            continue;
        }
        let overridden = p
            .fleet_id
            .as_deref()
            .and_then(|f| fleets.get(f))
            .is_some_and(|f| f.controller() == Controller::ManualOverride);
        if overridden {
            p.status = ProgramStatus::Paused;
            tracing::debug!(target: "tradelane::program", program = %p.id, "program.paused_by_override");
        }
    }
}

/// Fleet-bound actions only fire while nothing above `Program` holds the
/// fleet.
fn fleet_available(state: &SimState, fleet_id: &str) -> bool {
    state
        .fleets
        .get(fleet_id)
        .is_some_and(|f| matches!(f.controller(), Controller::Program | Controller::None))
}

fn run_once(state: &mut SimState, p: &ProgramInstance) {
    match p.kind {
        ProgramKind::AutoBuy => {
            if p.quantity > 0 && !p.market_id.is_empty() && !p.good_id.is_empty() {
                state.enqueue_intent(Intent::Buy {
                    market_id: p.market_id.clone(),
                    good_id: p.good_id.clone(),
                    quantity: p.quantity,
                });
            }
        }
        ProgramKind::AutoSell => {
            if p.quantity > 0 && !p.market_id.is_empty() && !p.good_id.is_empty() {
                state.enqueue_intent(Intent::Sell {
                    market_id: p.market_id.clone(),
                    good_id: p.good_id.clone(),
                    quantity: p.quantity,
                });
            }
        }
        ProgramKind::ConstrCapModule => {
            if let Some(site) = p.site_id.as_deref() {
                let idle = state
                    .industry_sites
                    .get(site)
                    .is_some_and(|s| s.build.is_none());
                if idle {
                    industry::start_build(state, site, CAP_MODULE_RECIPE_ID);
                }
            }
        }
        ProgramKind::TradeCharter => {
            let Some(fleet_id) = p.fleet_id.as_deref() else {
                return;
            };
            let busy = state
                .fleets
                .get(fleet_id)
                .is_none_or(|f| f.current_job.is_some());
            if !busy {
                logistics::plan_logistics(state, fleet_id, &p.source_market_id, &p.market_id, &p.good_id, p.quantity);
            }
        }
        ProgramKind::ResourceTap => {
            let Some(fleet_id) = p.fleet_id.clone() else {
                return;
            };
            if p.quantity > 0 && !p.good_id.is_empty() && fleet_available(state, &fleet_id) {
                state.enqueue_intent(Intent::LoadCargo {
                    fleet_id,
                    market_id: p.source_market_id.clone(),
                    good_id: p.good_id.clone(),
                    quantity: p.quantity,
                });
            }
        }
        ProgramKind::Expedition => {
            if let (Some(fleet_id), Some(discovery_id), Some(kind)) =
                (p.fleet_id.clone(), p.discovery_id.clone(), p.expedition_kind)
            {
                if !fleet_available(state, &fleet_id) {
                    return;
                }
                state.enqueue_intent(Intent::Expedition {
                    fleet_id,
                    discovery_id,
                    kind,
                });
            }
        }
    }
}
