//! Read-only program payloads: explain snapshot, run quote, exploitation
//! quote and the default doctrine.
//!
//! Each payload is a plain serde struct with a closed [`Shape`] and a
//! validator. Field order in the structs is the emitted key order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fixed::{TICKS_PER_DAY, Ticks, Units};
use crate::ledger;
use crate::program::{ProgramInstance, ProgramKind};
use crate::schema::{FieldKind, SchemaError, Shape, validate_object};
use crate::sim::SimState;

pub const PAYLOAD_VERSION: i64 = 1;

/// Runs per day at or above which an AUTO_BUY quote warns about budget.
pub const BUDGET_WARN_RUNS_PER_DAY: i64 = 100;

pub mod risk_token {
    pub const CADENCE_MAY_OVERRUN_BUDGET: &str = "CADENCE_MAY_OVERRUN_BUDGET";
    pub const FILL_NOT_GUARANTEED: &str = "FILL_NOT_GUARANTEED";
    pub const PRICE_MOVES_WITH_INVENTORY: &str = "PRICE_MOVES_WITH_INVENTORY";
}

pub mod exploitation_risk {
    pub const NO_ROUTING_SERVICE: &str = "NO_ROUTING_SERVICE";
    pub const FRONTIER_ACCESS_REQUIRED: &str = "FRONTIER_ACCESS_REQUIRED";
    pub const LANE_CAPACITY_CONTENDED: &str = "LANE_CAPACITY_CONTENDED";
    pub const SECURITY_EXPOSURE: &str = "SECURITY_EXPOSURE";
}

pub mod mitigation_verb {
    pub const ASSIGN_ROUTING_FLEET: &str = "ASSIGN_ROUTING_FLEET";
    pub const INSURE_SHIPMENT: &str = "INSURE_SHIPMENT";
    pub const ESCORT_CONVOY: &str = "ESCORT_CONVOY";
    pub const DIVERSIFY_SOURCES: &str = "DIVERSIFY_SOURCES";
}

use FieldKind::{Array, Bool, Integer, Object, String as Str};

// ---------------------------------------------------------------------------
// Explain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgramExplain {
    pub version: i64,
    pub tick: Ticks,
    pub programs: Vec<ProgramExplainEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgramExplainEntry {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub cadence_ticks: Ticks,
    pub next_run_tick: Ticks,
    /// -1 before the first run.
    pub last_run_tick: i64,
    pub fleet_id: String,
    pub market_id: String,
    pub good_id: String,
    pub quantity: Units,
}

pub const PROGRAM_EXPLAIN: Shape = Shape {
    name: "ProgramExplain",
    fields: &[("Version", Integer), ("Tick", Integer), ("Programs", Array)],
};

pub const PROGRAM_EXPLAIN_ENTRY: Shape = Shape {
    name: "ProgramExplainEntry",
    fields: &[
        ("Id", Str),
        ("Kind", Str),
        ("Status", Str),
        ("CadenceTicks", Integer),
        ("NextRunTick", Integer),
        ("LastRunTick", Integer),
        ("FleetId", Str),
        ("MarketId", Str),
        ("GoodId", Str),
        ("Quantity", Integer),
    ],
};

fn explain_entry(p: &ProgramInstance) -> ProgramExplainEntry {
    ProgramExplainEntry {
        id: p.id.clone(),
        kind: p.kind.as_str().to_string(),
        status: p.status.as_str().to_string(),
        cadence_ticks: p.cadence_ticks,
        next_run_tick: p.next_run_tick,
        last_run_tick: p.last_run_tick.map(|t| t as i64).unwrap_or(-1),
        fleet_id: p.fleet_id.clone().unwrap_or_default(),
        market_id: p.market_id.clone(),
        good_id: p.good_id.clone(),
        quantity: p.quantity,
    }
}

/// Every program in id order.
pub fn explain(state: &SimState) -> ProgramExplain {
    ProgramExplain {
        version: PAYLOAD_VERSION,
        tick: state.tick,
        programs: state.programs.instances.values().map(explain_entry).collect(),
    }
}

pub fn validate_explain(value: &Value) -> Result<(), SchemaError> {
    validate_object(value, &PROGRAM_EXPLAIN, PROGRAM_EXPLAIN.name)?;
    validate_each(value, "Programs", &PROGRAM_EXPLAIN_ENTRY)
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// Everything a quote reads. Quotes are a pure function of this snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub tick: Ticks,
    pub program_id: String,
    pub kind: ProgramKind,
    pub market_id: String,
    pub good_id: String,
    pub quantity: Units,
    pub cadence_ticks: Ticks,
    /// False when the market id does not resolve; prices and stock stay 0.
    pub market_found: bool,
    pub stock_units: Units,
    pub mid_price: Units,
    pub buy_price: Units,
    pub sell_price: Units,
    pub player_credits: Units,
    pub player_cargo_units: Units,
}

/// Capture the quote inputs for one program. `None` for unknown ids.
pub fn capture_quote_snapshot(state: &SimState, program_id: &str) -> Option<QuoteSnapshot> {
    let p = state.programs.instances.get(program_id)?;
    let market = state.markets.get(&p.market_id);
    Some(QuoteSnapshot {
        tick: state.tick,
        program_id: p.id.clone(),
        kind: p.kind,
        market_id: p.market_id.clone(),
        good_id: p.good_id.clone(),
        quantity: p.quantity,
        cadence_ticks: p.cadence_ticks.max(1),
        market_found: market.is_some(),
        stock_units: market.map(|m| m.stock(&p.good_id)).unwrap_or(0),
        mid_price: market.map(|m| m.mid_price(&p.good_id)).unwrap_or(0),
        buy_price: market.map(|m| m.buy_price(&p.good_id)).unwrap_or(0),
        sell_price: market.map(|m| m.sell_price(&p.good_id)).unwrap_or(0),
        player_credits: state.player.credits,
        player_cargo_units: ledger::get(&state.player.cargo, &p.good_id),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgramQuote {
    pub version: i64,
    pub quote_tick: Ticks,
    pub program_id: String,
    pub kind: String,
    pub market_id: String,
    pub good_id: String,
    pub quantity: Units,
    pub cadence_ticks: Ticks,
    pub unit_price_now: Units,
    /// Buy cost for AUTO_BUY, sale value for AUTO_SELL.
    pub est_cost_or_value_per_run: i64,
    pub est_runs_per_day: i64,
    pub est_daily_cost_or_value: i64,
    pub constraints: QuoteConstraints,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuoteConstraints {
    pub market_exists: bool,
    pub has_enough_credits_now: bool,
    pub has_enough_supply_now: bool,
    pub has_enough_cargo_now: bool,
}

pub const PROGRAM_QUOTE: Shape = Shape {
    name: "ProgramQuote",
    fields: &[
        ("Version", Integer),
        ("QuoteTick", Integer),
        ("ProgramId", Str),
        ("Kind", Str),
        ("MarketId", Str),
        ("GoodId", Str),
        ("Quantity", Integer),
        ("CadenceTicks", Integer),
        ("UnitPriceNow", Integer),
        ("EstCostOrValuePerRun", Integer),
        ("EstRunsPerDay", Integer),
        ("EstDailyCostOrValue", Integer),
        ("Constraints", Object),
        ("Risks", Array),
    ],
};

pub const QUOTE_CONSTRAINTS: Shape = Shape {
    name: "QuoteConstraints",
    fields: &[
        ("MarketExists", Bool),
        ("HasEnoughCreditsNow", Bool),
        ("HasEnoughSupplyNow", Bool),
        ("HasEnoughCargoNow", Bool),
    ],
};

pub fn build_quote(snap: &QuoteSnapshot) -> ProgramQuote {
    let cadence = snap.cadence_ticks.max(1);
    let runs_per_day = (TICKS_PER_DAY / cadence) as i64;

    let unit_price = match snap.kind {
        ProgramKind::AutoBuy => snap.buy_price,
        ProgramKind::AutoSell => snap.sell_price,
        _ => 0,
    };
    let per_run = unit_price.saturating_mul(snap.quantity);
    let per_day = per_run.saturating_mul(runs_per_day);

    let mut constraints = QuoteConstraints {
        market_exists: snap.market_found && !snap.market_id.is_empty() && unit_price > 0,
        ..QuoteConstraints::default()
    };
    match snap.kind {
        ProgramKind::AutoBuy => {
            constraints.has_enough_credits_now = snap.player_credits >= per_run;
            constraints.has_enough_supply_now = snap.stock_units >= snap.quantity;
        }
        ProgramKind::AutoSell => {
            constraints.has_enough_cargo_now = snap.player_cargo_units >= snap.quantity;
        }
        _ => {}
    }

    let mut risks = vec![
        risk_token::PRICE_MOVES_WITH_INVENTORY.to_string(),
        risk_token::FILL_NOT_GUARANTEED.to_string(),
    ];
    if snap.kind == ProgramKind::AutoBuy && runs_per_day >= BUDGET_WARN_RUNS_PER_DAY {
        risks.push(risk_token::CADENCE_MAY_OVERRUN_BUDGET.to_string());
    }
    risks.sort();

    ProgramQuote {
        version: PAYLOAD_VERSION,
        quote_tick: snap.tick,
        program_id: snap.program_id.clone(),
        kind: snap.kind.as_str().to_string(),
        market_id: snap.market_id.clone(),
        good_id: snap.good_id.clone(),
        quantity: snap.quantity,
        cadence_ticks: cadence,
        unit_price_now: unit_price,
        est_cost_or_value_per_run: per_run,
        est_runs_per_day: runs_per_day,
        est_daily_cost_or_value: per_day,
        constraints,
        risks,
    }
}

/// Snapshot and quote in one call.
pub fn quote(state: &SimState, program_id: &str) -> Option<ProgramQuote> {
    capture_quote_snapshot(state, program_id).map(|s| build_quote(&s))
}

pub fn validate_quote(value: &Value) -> Result<(), SchemaError> {
    validate_object(value, &PROGRAM_QUOTE, PROGRAM_QUOTE.name)?;
    if let Some(c) = value.get("Constraints") {
        validate_object(c, &QUOTE_CONSTRAINTS, "ProgramQuote.Constraints")?;
    }
    validate_strings(value, "Risks", PROGRAM_QUOTE.name)
}

// ---------------------------------------------------------------------------
// Exploitation quote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExploitationRisk {
    pub token: String,
    /// 0..=100.
    pub magnitude: i64,
}

/// Caller-supplied estimate for one exploitation scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ExploitationInputs {
    pub quote_tick: Ticks,
    pub program_kind: ProgramKind,
    pub scope_id: String,
    pub upfront_cost: i64,
    pub ongoing_cost_per_day: i64,
    pub time_to_activate_ticks: Ticks,
    pub p10: i64,
    pub p50: i64,
    pub p90: i64,
    pub risks: Vec<ExploitationRisk>,
    pub mitigation_verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExploitationQuote {
    pub version: i64,
    pub quote_tick: Ticks,
    pub program_kind: String,
    pub scope_id: String,
    pub upfront_cost: i64,
    pub ongoing_cost_per_day: i64,
    pub time_to_activate_ticks: Ticks,
    #[serde(rename = "OutcomeP10")]
    pub outcome_p10: i64,
    #[serde(rename = "OutcomeP50")]
    pub outcome_p50: i64,
    #[serde(rename = "OutcomeP90")]
    pub outcome_p90: i64,
    pub risks: Vec<ExploitationRisk>,
    pub mitigation_verbs: Vec<String>,
}

pub const EXPLOITATION_QUOTE: Shape = Shape {
    name: "ExploitationQuote",
    fields: &[
        ("Version", Integer),
        ("QuoteTick", Integer),
        ("ProgramKind", Str),
        ("ScopeId", Str),
        ("UpfrontCost", Integer),
        ("OngoingCostPerDay", Integer),
        ("TimeToActivateTicks", Integer),
        ("OutcomeP10", Integer),
        ("OutcomeP50", Integer),
        ("OutcomeP90", Integer),
        ("Risks", Array),
        ("MitigationVerbs", Array),
    ],
};

pub const EXPLOITATION_RISK: Shape = Shape {
    name: "ExploitationRisk",
    fields: &[("Token", Str), ("Magnitude", Integer)],
};

/// Normalize an estimate into a quote: percentiles ordered, magnitudes
/// clamped to 0..=100, risks sorted by token, verbs sorted and deduped.
pub fn build_exploitation_quote(inputs: ExploitationInputs) -> ExploitationQuote {
    let mut outcomes = [inputs.p10, inputs.p50, inputs.p90];
    outcomes.sort_unstable();

    let mut risks: Vec<ExploitationRisk> = inputs
        .risks
        .into_iter()
        .map(|r| ExploitationRisk {
            token: r.token,
            magnitude: r.magnitude.clamp(0, 100),
        })
        .collect();
    risks.sort();

    let mut verbs = inputs.mitigation_verbs;
    verbs.sort();
    verbs.dedup();

    ExploitationQuote {
        version: PAYLOAD_VERSION,
        quote_tick: inputs.quote_tick,
        program_kind: inputs.program_kind.as_str().to_string(),
        scope_id: inputs.scope_id,
        upfront_cost: inputs.upfront_cost.max(0),
        ongoing_cost_per_day: inputs.ongoing_cost_per_day.max(0),
        time_to_activate_ticks: inputs.time_to_activate_ticks,
        outcome_p10: outcomes[0],
        outcome_p50: outcomes[1],
        outcome_p90: outcomes[2],
        risks,
        mitigation_verbs: verbs,
    }
}

pub fn validate_exploitation_quote(value: &Value) -> Result<(), SchemaError> {
    validate_object(value, &EXPLOITATION_QUOTE, EXPLOITATION_QUOTE.name)?;
    validate_each(value, "Risks", &EXPLOITATION_RISK)?;
    validate_strings(value, "MitigationVerbs", EXPLOITATION_QUOTE.name)
}

// ---------------------------------------------------------------------------
// Doctrine
// ---------------------------------------------------------------------------

/// Program-wide toggles. Two switches, both on by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultDoctrine {
    pub version: i64,
    /// Favour fewer, larger runs.
    pub prefer_conservative_cadence: bool,
    /// Skip emitting intents whose credit or cargo constraints fail.
    pub require_constraints_satisfied: bool,
}

impl Default for DefaultDoctrine {
    fn default() -> Self {
        Self {
            version: PAYLOAD_VERSION,
            prefer_conservative_cadence: true,
            require_constraints_satisfied: true,
        }
    }
}

pub const DEFAULT_DOCTRINE: Shape = Shape {
    name: "DefaultDoctrine",
    fields: &[
        ("Version", Integer),
        ("PreferConservativeCadence", Bool),
        ("RequireConstraintsSatisfied", Bool),
    ],
};

pub fn validate_doctrine(value: &Value) -> Result<(), SchemaError> {
    validate_object(value, &DEFAULT_DOCTRINE, DEFAULT_DOCTRINE.name)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pretty JSON in struct field order. Serialization of these plain structs
/// cannot fail; an empty string is returned if it ever does.
pub fn to_deterministic_json<T: Serialize>(payload: &T) -> String {
    serde_json::to_string_pretty(payload).unwrap_or_default()
}

fn validate_each(value: &Value, key: &str, shape: &Shape) -> Result<(), SchemaError> {
    if let Some(items) = value.get(key).and_then(Value::as_array) {
        for (i, item) in items.iter().enumerate() {
            validate_object(item, shape, &format!("{}[{i}]", shape.name))?;
        }
    }
    Ok(())
}

fn validate_strings(value: &Value, key: &str, path: &str) -> Result<(), SchemaError> {
    let all_strings = value
        .get(key)
        .and_then(Value::as_array)
        .is_none_or(|items| items.iter().all(Value::is_string));
    if all_strings {
        Ok(())
    } else {
        Err(SchemaError::WrongKind {
            path: path.to_string(),
            key: key.to_string(),
            expected: "array of strings",
        })
    }
}
