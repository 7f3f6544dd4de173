//! Deferred mutation requests and the intent application step.
//!
//! Systems decide during the tick and enqueue an [`Intent`]; the intent step
//! applies every due envelope in `(created_tick, seq)` order. The apply
//! functions here are also the bodies of the matching synchronous commands,
//! so both channels share one set of preconditions.

use serde::{Deserialize, Serialize};

use crate::fixed::{Ticks, Units};
use crate::intel::{self, ExpeditionKind};
use crate::lane_flow;
use crate::ledger::{self, ZeroKeys};
use crate::market;
use crate::sim::SimState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
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
    DiscoveryScan {
        fleet_id: String,
        discovery_id: String,
    },
    DiscoveryAnalyze {
        fleet_id: String,
        discovery_id: String,
    },
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
}

impl Intent {
    /// Stable kind token.
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Buy { .. } => "BUY",
            Intent::Sell { .. } => "SELL",
            Intent::LoadCargo { .. } => "LOAD_CARGO",
            Intent::UnloadCargo { .. } => "UNLOAD_CARGO",
            Intent::DiscoveryScan { .. } => "DISCOVERY_SCAN_V0",
            Intent::DiscoveryAnalyze { .. } => "DISCOVERY_ANALYZE_V0",
            Intent::Expedition { .. } => "EXPEDITION_V0",
            Intent::ShipTransfer { .. } => "SHIP_TRANSFER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentEnvelope {
    pub seq: u64,
    pub created_tick: Ticks,
    pub intent: Intent,
}

// ---------------------------------------------------------------------------
// Intent step
// ---------------------------------------------------------------------------

/// Apply every due intent in `(created_tick, seq, kind)` order and drop it.
/// Intents stamped in the future stay queued. Returns the applied count.
pub fn process(state: &mut SimState) -> usize {
    if state.pending_intents.is_empty() {
        return 0;
    }
    let tick = state.tick;
    let (mut due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_intents)
        .into_iter()
        .partition(|env| env.created_tick <= tick);
    state.pending_intents = later;

    due.sort_by(|a, b| {
        a.created_tick
            .cmp(&b.created_tick)
            .then(a.seq.cmp(&b.seq))
            .then_with(|| a.intent.kind().cmp(b.intent.kind()))
    });

    let count = due.len();
    for env in due {
        let applied = apply(state, &env.intent);
        tracing::debug!(
            target: "tradelane::intent",
            seq = env.seq,
            kind = env.intent.kind(),
            applied,
            "intent.applied"
        );
    }
    count
}

/// Apply one intent. Returns false when it was a no-op.
pub fn apply(state: &mut SimState, intent: &Intent) -> bool {
    match intent {
        Intent::Buy {
            market_id,
            good_id,
            quantity,
        } => apply_buy(state, market_id, good_id, *quantity),
        Intent::Sell {
            market_id,
            good_id,
            quantity,
        } => apply_sell(state, market_id, good_id, *quantity),
        Intent::LoadCargo {
            fleet_id,
            market_id,
            good_id,
            quantity,
        } => apply_load_cargo(state, fleet_id, market_id, good_id, *quantity) > 0,
        Intent::UnloadCargo {
            fleet_id,
            market_id,
            good_id,
            quantity,
        } => apply_unload_cargo(state, fleet_id, market_id, good_id, *quantity) > 0,
        Intent::DiscoveryScan {
            fleet_id,
            discovery_id,
        } => intel::apply_scan(state, fleet_id, discovery_id) == intel::DiscoveryReasonCode::Ok,
        Intent::DiscoveryAnalyze {
            fleet_id,
            discovery_id,
        } => {
            intel::apply_analyze(state, fleet_id, discovery_id) == intel::DiscoveryReasonCode::Ok
        }
        Intent::Expedition {
            fleet_id,
            discovery_id,
            kind,
        } => matches!(
            intel::apply_expedition(state, fleet_id, discovery_id, *kind),
            intel::DiscoveryReasonCode::Ok | intel::DiscoveryReasonCode::Dispatched
        ),
        Intent::ShipTransfer {
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
    }
}

// ---------------------------------------------------------------------------
// Player trade
// ---------------------------------------------------------------------------

fn trade_fee_bps(state: &SimState, market_id: &str) -> Units {
    let class = state
        .market_node_id(market_id)
        .map(|node| state.class_fee_multiplier(node))
        .unwrap_or(crate::fixed::Fixed64::from_num(1));
    market::fee_bps(class, state.tweaks.market_fee_multiplier_fixed())
}

/// Player buys `qty` of `good` at the market's ask plus fee. All-or-nothing.
pub fn apply_buy(state: &mut SimState, market_id: &str, good_id: &str, qty: Units) -> bool {
    if qty <= 0 {
        return false;
    }
    let bps = trade_fee_bps(state, market_id);
    let Some(m) = state.markets.get_mut(market_id) else {
        return false;
    };
    if m.stock(good_id) < qty {
        return false;
    }
    let gross = m.buy_price(good_id).saturating_mul(qty);
    let cost = gross.saturating_add(market::fee_on(gross, bps));
    if state.player.credits < cost {
        return false;
    }
    if !ledger::try_transfer(
        &mut m.inventory,
        ZeroKeys::MARKET,
        &mut state.player.cargo,
        good_id,
        qty,
    ) {
        return false;
    }
    state.player.credits -= cost;
    true
}

/// Player sells `qty` of `good` at the market's bid minus fee. All-or-nothing.
pub fn apply_sell(state: &mut SimState, market_id: &str, good_id: &str, qty: Units) -> bool {
    if qty <= 0 {
        return false;
    }
    let bps = trade_fee_bps(state, market_id);
    let Some(m) = state.markets.get_mut(market_id) else {
        return false;
    };
    if ledger::get(&state.player.cargo, good_id) < qty {
        return false;
    }
    let gross = m.sell_price(good_id).saturating_mul(qty);
    let proceeds = (gross - market::fee_on(gross, bps)).max(0);
    if !ledger::try_transfer(
        &mut state.player.cargo,
        ZeroKeys::CARGO,
        &mut m.inventory,
        good_id,
        qty,
    ) {
        return false;
    }
    state.player.credits = state.player.credits.saturating_add(proceeds);
    true
}

// ---------------------------------------------------------------------------
// Fleet cargo
// ---------------------------------------------------------------------------

/// Load up to `qty` from a market into fleet cargo. Other fleets' open
/// reservations are off limits; the fleet's own job reservation may be
/// drawn down and is consumed first. Returns the units moved.
pub fn apply_load_cargo(
    state: &mut SimState,
    fleet_id: &str,
    market_id: &str,
    good_id: &str,
    qty: Units,
) -> Units {
    if qty <= 0 {
        return 0;
    }
    let Some(fleet) = state.fleets.get(fleet_id) else {
        return 0;
    };
    let Some(m) = state.markets.get(market_id) else {
        return 0;
    };
    let on_hand = m.stock(good_id);
    if on_hand <= 0 {
        return 0;
    }

    let own = fleet
        .current_job
        .as_ref()
        .and_then(|job| job.reservation_id.as_deref())
        .and_then(|rid| state.reservations.get(rid))
        .filter(|r| {
            r.market_id == market_id && r.good_id == good_id && r.fleet_id == fleet_id
        })
        .filter(|r| r.remaining > 0)
        .map(|r| (r.id.clone(), r.remaining));

    let unreserved = (on_hand - state.total_reserved(market_id, good_id)).max(0);
    let allowed = unreserved + own.as_ref().map(|(_, rem)| *rem).unwrap_or(0);
    let moved = allowed.min(qty);
    if moved <= 0 {
        return 0;
    }

    let (Some(m), Some(fleet)) = (state.markets.get_mut(market_id), state.fleets.get_mut(fleet_id))
    else {
        return 0;
    };
    if !ledger::try_transfer(
        &mut m.inventory,
        ZeroKeys::MARKET,
        &mut fleet.cargo,
        good_id,
        moved,
    ) {
        return 0;
    }

    if let Some((rid, remaining)) = own {
        crate::logistics::consume_reservation(state, &rid, remaining.min(moved));
    }
    moved
}

/// Unload up to `qty` of fleet cargo into a market. Returns the units moved.
pub fn apply_unload_cargo(
    state: &mut SimState,
    fleet_id: &str,
    market_id: &str,
    good_id: &str,
    qty: Units,
) -> Units {
    if qty <= 0 {
        return 0;
    }
    let (Some(m), Some(fleet)) = (state.markets.get_mut(market_id), state.fleets.get_mut(fleet_id))
    else {
        return 0;
    };
    let moved = fleet.cargo_units(good_id).min(qty);
    if moved <= 0 {
        return 0;
    }
    if !ledger::try_transfer(
        &mut fleet.cargo,
        ZeroKeys::CARGO,
        &mut m.inventory,
        good_id,
        moved,
    ) {
        return 0;
    }
    moved
}
