//! Industry sites: per-tick upkeep recipes with supply-ratio scaling and
//! health degradation, plus staged construction builds.
//!
//! Recipe conversion is a kernel-owned ledger mutation: inputs and outputs
//! move through [`crate::ledger`] directly rather than through intents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{BPS_SCALE, Ticks, TICKS_PER_DAY, Units};
use crate::ledger::{self, Inventory, ZeroKeys};
use crate::sim::SimState;

pub const FULL_HEALTH_BPS: i64 = BPS_SCALE;

/// Staged build currently attached to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
    pub recipe_id: String,
    pub stage_index: usize,
    pub stage_started: bool,
    pub remaining_ticks: Ticks,
    pub completed: bool,
    /// `MISSING_INPUT:{good}:{have}/{need}` while blocked, else empty.
    pub blocker: String,
    /// `SUPPLY:{good}:{missing}` while blocked, else empty.
    pub suggested_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustrySite {
    pub id: String,
    pub node_id: String,
    /// Upkeep consumption, units per tick.
    pub inputs: BTreeMap<String, Units>,
    /// Production at full supply, units per tick.
    pub outputs: BTreeMap<String, Units>,
    /// Days of input the local market should hold.
    pub buffer_days: i64,
    pub efficiency_bps: i64,
    pub health_bps: i64,
    /// Health lost per day at full undersupply.
    pub degrade_per_day_bps: i64,
    pub degrade_remainder: i64,
    /// Supply ratio of the most recent tick.
    pub last_supply_bps: i64,
    pub active: bool,
    pub build: Option<BuildState>,
}

impl IndustrySite {
    pub fn new(id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            buffer_days: 1,
            efficiency_bps: BPS_SCALE,
            health_bps: FULL_HEALTH_BPS,
            degrade_per_day_bps: 0,
            degrade_remainder: 0,
            last_supply_bps: BPS_SCALE,
            active: true,
            build: None,
        }
    }

    pub fn with_input(mut self, good: &str, per_tick: Units) -> Self {
        self.inputs.insert(good.to_string(), per_tick);
        self
    }

    pub fn with_output(mut self, good: &str, per_tick: Units) -> Self {
        self.outputs.insert(good.to_string(), per_tick);
        self
    }

    pub fn market_id(&self, state: &SimState) -> Option<String> {
        state.node_market_id(&self.node_id).map(str::to_string)
    }
}

/// Units of `good` the site's market should hold: `buffer_days` of upkeep.
pub fn buffer_target(site: &IndustrySite, good: &str) -> Units {
    let per_tick = site.inputs.get(good).copied().unwrap_or(0).max(0);
    per_tick
        .saturating_mul(TICKS_PER_DAY as Units)
        .saturating_mul(site.buffer_days.max(0))
}

/// Fraction of upkeep the market can cover, in basis points.
pub fn supply_ratio_bps(inputs: &BTreeMap<String, Units>, market: &Inventory) -> i64 {
    inputs
        .iter()
        .filter(|(_, req)| **req > 0)
        .map(|(good, req)| {
            let have = ledger::get(market, good).max(0);
            (have.saturating_mul(BPS_SCALE) / req).min(BPS_SCALE)
        })
        .min()
        .unwrap_or(BPS_SCALE)
}

// ---------------------------------------------------------------------------
// Construction recipes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStage {
    pub id: &'static str,
    pub inputs: &'static [(&'static str, Units)],
    pub outputs: &'static [(&'static str, Units)],
    pub duration_ticks: Ticks,
}

pub const CAP_MODULE_RECIPE_ID: &str = "CAP_MODULE_V0";

pub const CAP_MODULE_STAGES: &[BuildStage] = &[
    BuildStage {
        id: "stage0_smelt_ore_to_plates",
        inputs: &[("ore", 10)],
        outputs: &[("metal_plate", 5)],
        duration_ticks: 60,
    },
    BuildStage {
        id: "stage1_assemble_cap_module",
        inputs: &[("metal_plate", 5)],
        outputs: &[("cap_module", 1)],
        duration_ticks: 120,
    },
];

pub fn build_stages(recipe_id: &str) -> Option<&'static [BuildStage]> {
    match recipe_id {
        CAP_MODULE_RECIPE_ID => Some(CAP_MODULE_STAGES),
        _ => None,
    }
}

/// Attach a new build to a site. Fails when the recipe is unknown, the site
/// is missing, or an unfinished build is already attached.
pub fn start_build(state: &mut SimState, site_id: &str, recipe_id: &str) -> bool {
    if build_stages(recipe_id).is_none() {
        return false;
    }
    let Some(site) = state.industry_sites.get_mut(site_id) else {
        return false;
    };
    if site.build.as_ref().is_some_and(|b| !b.completed) {
        return false;
    }
    site.build = Some(BuildState {
        recipe_id: recipe_id.to_string(),
        stage_index: 0,
        stage_started: false,
        remaining_ticks: 0,
        completed: false,
        blocker: String::new(),
        suggested_action: String::new(),
    });
    tracing::debug!(target: "tradelane::industry", site = site_id, recipe = recipe_id, "industry.build_started");
    true
}

fn advance_build(build: &mut BuildState, market: &mut Inventory) {
    let Some(stages) = build_stages(&build.recipe_id) else {
        return;
    };
    let Some(stage) = stages.get(build.stage_index) else {
        build.completed = true;
        return;
    };

    if !build.stage_started {
        let short = stage
            .inputs
            .iter()
            .map(|(good, need)| (*good, ledger::get(market, good), *need))
            .filter(|(_, have, need)| have < need)
            .min_by_key(|(good, _, _)| *good);
        if let Some((good, have, need)) = short {
            build.blocker = format!("MISSING_INPUT:{good}:{have}/{need}");
            build.suggested_action = format!("SUPPLY:{good}:{}", need - have);
            return;
        }
        for (good, need) in stage.inputs {
            ledger::try_remove(market, good, *need, ZeroKeys::MARKET);
        }
        build.stage_started = true;
        build.remaining_ticks = stage.duration_ticks;
        build.blocker.clear();
        build.suggested_action.clear();
    }

    build.remaining_ticks = build.remaining_ticks.saturating_sub(1);
    if build.remaining_ticks > 0 {
        return;
    }
    for (good, qty) in stage.outputs {
        ledger::add(market, good, *qty);
    }
    build.stage_index += 1;
    build.stage_started = false;
    if build.stage_index >= stages.len() {
        build.completed = true;
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub fn process(state: &mut SimState) {
    let ids: Vec<String> = state.industry_sites.keys().cloned().collect();
    for id in ids {
        let Some(site) = state.industry_sites.get(&id) else {
            continue;
        };
        if !site.active {
            continue;
        }
        let Some(market_id) = site.market_id(state) else {
            continue;
        };
        let (Some(site), Some(market)) = (
            state.industry_sites.get_mut(&id),
            state.markets.get_mut(&market_id),
        ) else {
            continue;
        };
        run_site(site, &mut market.inventory);
    }
}

/// One tick of upkeep, production, degradation and build progress.
pub fn run_site(site: &mut IndustrySite, market: &mut Inventory) {
    if let Some(build) = site.build.as_mut().filter(|b| !b.completed) {
        advance_build(build, market);
    }

    let ratio = supply_ratio_bps(&site.inputs, market);
    for (good, req) in &site.inputs {
        let take = req.saturating_mul(ratio) / BPS_SCALE;
        if take > 0 {
            ledger::try_remove(market, good, take, ZeroKeys::MARKET);
        }
    }
    for (good, out) in &site.outputs {
        let made = out.saturating_mul(ratio) / BPS_SCALE * site.efficiency_bps / BPS_SCALE
            * site.health_bps
            / BPS_SCALE;
        if made > 0 {
            ledger::add(market, good, made);
        }
    }

    let per_day = TICKS_PER_DAY as i64 * BPS_SCALE;
    let acc = site.degrade_remainder + site.degrade_per_day_bps.max(0) * (BPS_SCALE - ratio);
    let loss = acc / per_day;
    site.degrade_remainder = acc % per_day;
    site.health_bps = (site.health_bps - loss).max(0);
    site.last_supply_bps = ratio;
}
