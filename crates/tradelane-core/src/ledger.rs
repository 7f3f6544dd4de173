//! The single mutation surface for inventories (markets and cargo holds).
//!
//! - good ids are non-empty and quantities strictly positive
//! - counts never go negative; a short removal fails with no mutation
//! - market maps keep zero keys, cargo maps drop them

use std::collections::BTreeMap;

use crate::fixed::Units;

pub type Inventory = BTreeMap<String, Units>;

/// How a map treats keys whose count reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroKeys {
    Keep,
    Drop,
}

impl ZeroKeys {
    pub const MARKET: ZeroKeys = ZeroKeys::Keep;
    pub const CARGO: ZeroKeys = ZeroKeys::Drop;
}

/// Current units of `good` (0 when absent).
pub fn get(inv: &Inventory, good: &str) -> Units {
    inv.get(good).copied().unwrap_or(0)
}

fn valid(good: &str, qty: Units) -> bool {
    !good.trim().is_empty() && qty > 0
}

/// Add units. Returns false for an empty good id, a non-positive quantity,
/// or an overflow.
pub fn add(inv: &mut Inventory, good: &str, qty: Units) -> bool {
    if !valid(good, qty) {
        return false;
    }
    let current = get(inv, good);
    let Some(next) = current.checked_add(qty) else {
        return false;
    };
    inv.insert(good.to_string(), next);
    true
}

/// Remove units. Fails without mutation when stock is short.
pub fn try_remove(inv: &mut Inventory, good: &str, qty: Units, zero: ZeroKeys) -> bool {
    if !valid(good, qty) {
        return false;
    }
    let current = get(inv, good);
    if current < qty {
        return false;
    }
    let next = current - qty;
    if next == 0 && zero == ZeroKeys::Drop {
        inv.remove(good);
    } else {
        inv.insert(good.to_string(), next);
    }
    true
}

/// Move units between two maps. The combined count is unchanged.
pub fn try_transfer(
    from: &mut Inventory,
    from_zero: ZeroKeys,
    to: &mut Inventory,
    good: &str,
    qty: Units,
) -> bool {
    if !valid(good, qty) || get(from, good) < qty {
        return false;
    }
    if get(to, good).checked_add(qty).is_none() {
        return false;
    }
    try_remove(from, good, qty, from_zero) && add(to, good, qty)
}

/// Total units across all goods.
pub fn total(inv: &Inventory) -> Units {
    inv.values().sum()
}
