//! Market-to-market shipments carried along lanes.
//!
//! A transfer debits the source market when enqueued and waits for a lane
//! slot. Lane capacity is shared with fleets: an admitted transfer holds a
//! slot until delivery. Over-subscription defers (the arrive tick slides
//! forward one tick per tick of waiting) and never rejects.

use serde::{Deserialize, Serialize};

use crate::fixed::{Ticks, Units, ceil_ticks};
use crate::ledger::{self, ZeroKeys};
use crate::sim::SimState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InFlightTransfer {
    pub id: String,
    pub edge_id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub to_market_id: String,
    pub good_id: String,
    pub quantity: Units,
    pub depart_tick: Ticks,
    pub arrive_tick: Ticks,
    /// True once the transfer holds a lane slot.
    pub admitted: bool,
}

/// Debit `qty` of `good` from the market at `from_node` and queue it for
/// the lane to `to_node`. Returns false with no mutation when there is no
/// lane, either end lacks a market, the id is taken, or stock is short.
pub fn try_enqueue_transfer(
    state: &mut SimState,
    from_node: &str,
    to_node: &str,
    good_id: &str,
    qty: Units,
    transfer_id: &str,
) -> bool {
    if qty <= 0 || transfer_id.is_empty() {
        return false;
    }
    if state.in_flight_transfers.iter().any(|t| t.id == transfer_id) {
        return false;
    }
    let Some(edge_id) = state.edge_between(from_node, to_node).map(|e| e.id.clone()) else {
        return false;
    };
    let (Some(from_market), Some(to_market)) = (
        state.node_market_id(from_node).map(str::to_string),
        state.node_market_id(to_node).map(str::to_string),
    ) else {
        return false;
    };
    if !state.markets.contains_key(&to_market) {
        return false;
    }
    let Some(src) = state.markets.get_mut(&from_market) else {
        return false;
    };
    if !ledger::try_remove(&mut src.inventory, good_id, qty, ZeroKeys::MARKET) {
        return false;
    }

    let tick = state.tick;
    state.in_flight_transfers.push(InFlightTransfer {
        id: transfer_id.to_string(),
        edge_id,
        from_node_id: from_node.to_string(),
        to_node_id: to_node.to_string(),
        to_market_id: to_market,
        good_id: good_id.to_string(),
        quantity: qty,
        depart_tick: tick,
        arrive_tick: tick,
        admitted: false,
    });
    tracing::debug!(target: "tradelane::lane_flow", transfer = transfer_id, qty, "lane_flow.enqueued");
    true
}

/// Deliver arrived transfers, then admit waiting ones while lanes have room.
pub fn process(state: &mut SimState) {
    if state.in_flight_transfers.is_empty() {
        return;
    }
    let now = state.tick;

    // Deliveries, ordered (arrive, lane, id).
    let mut transfers = std::mem::take(&mut state.in_flight_transfers);
    transfers.sort_by(|a, b| {
        (a.arrive_tick, &a.edge_id, &a.id).cmp(&(b.arrive_tick, &b.edge_id, &b.id))
    });
    let mut remaining = Vec::with_capacity(transfers.len());
    for t in transfers {
        if !(t.admitted && t.arrive_tick <= now) {
            remaining.push(t);
            continue;
        }
        if let Some(m) = state.markets.get_mut(&t.to_market_id) {
            ledger::add(&mut m.inventory, &t.good_id, t.quantity);
        }
        if let Some(edge) = state.edges.get_mut(&t.edge_id) {
            edge.release();
        }
        tracing::debug!(target: "tradelane::lane_flow", transfer = %t.id, "lane_flow.delivered");
    }

    // Admission, ordered (depart, id).
    remaining.sort_by(|a, b| (a.depart_tick, &a.id).cmp(&(b.depart_tick, &b.id)));
    for t in remaining.iter_mut().filter(|t| !t.admitted) {
        let Some(edge) = state.edges.get_mut(&t.edge_id) else {
            t.arrive_tick += 1;
            continue;
        };
        if edge.try_reserve() {
            t.admitted = true;
            t.arrive_tick = now + ceil_ticks(edge.distance);
        } else {
            t.arrive_tick += 1;
        }
    }
    state.in_flight_transfers = remaining;
}
