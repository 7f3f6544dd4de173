//! Markets: per-good inventory, bid/ask pricing and windowed price
//! publication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{BPS_SCALE, Fixed64, Ticks, Units};
use crate::ledger::{self, Inventory};

pub const DEFAULT_IDEAL_STOCK: Units = 50;
pub const DEFAULT_BASE_PRICE: Units = 1000;
pub const DEFAULT_SPREAD: Units = 100;

/// Published prices refresh once every 12 sim hours.
pub const PUBLISH_WINDOW_TICKS: Ticks = 720;

/// Heat shed by every lane each tick.
pub const HEAT_DECAY_PER_TICK: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub inventory: Inventory,
    pub ideal_stock: Units,
    pub base_price: Units,
    pub spread: Units,
    /// Mid prices as of the last publish window.
    pub published_prices: BTreeMap<String, Units>,
    pub last_published_bucket: Option<u64>,
}

impl Market {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inventory: Inventory::new(),
            ideal_stock: DEFAULT_IDEAL_STOCK,
            base_price: DEFAULT_BASE_PRICE,
            spread: DEFAULT_SPREAD,
            published_prices: BTreeMap::new(),
            last_published_bucket: None,
        }
    }

    pub fn stock(&self, good: &str) -> Units {
        ledger::get(&self.inventory, good)
    }

    /// Mid price for `good`.
    ///
    /// Below ideal stock the price climbs `base / (2 * ideal)` credits per
    /// missing unit (at least one). Above it, it falls one credit per extra
    /// unit down to `spread + 1`, so the sell price stays positive. The
    /// curve is strictly decreasing for stock in `0..=strict_stock_limit()`.
    pub fn mid_price(&self, good: &str) -> Units {
        let ideal = self.ideal_stock.max(1);
        let stock = self.stock(good).max(0);
        if stock <= ideal {
            let missing = ideal - stock;
            let premium = (missing.saturating_mul(self.base_price) / (2 * ideal)).max(missing);
            self.base_price.saturating_add(premium)
        } else {
            self.base_price
                .saturating_sub(stock - ideal)
                .max(self.spread + 1)
        }
    }

    /// Largest stock at which one more unit still lowers every price.
    pub fn strict_stock_limit(&self) -> Units {
        let ideal = self.ideal_stock.max(1);
        ideal + (self.base_price - self.spread - 1).max(0)
    }

    pub fn buy_price(&self, good: &str) -> Units {
        self.mid_price(good).saturating_add(self.spread)
    }

    pub fn sell_price(&self, good: &str) -> Units {
        self.mid_price(good) - self.spread
    }

    /// Published mid price, falling back to the live mid when the good has
    /// not been published yet.
    pub fn published_price(&self, good: &str) -> Units {
        self.published_prices
            .get(good)
            .copied()
            .unwrap_or_else(|| self.mid_price(good))
    }

    /// Refresh published prices when `tick` enters a new publish window.
    /// Returns true when a publish happened.
    pub fn publish_prices_if_due(&mut self, tick: Ticks, window: Ticks) -> bool {
        let bucket = tick / window.max(1);
        if self.last_published_bucket == Some(bucket) {
            return false;
        }
        let prices: BTreeMap<String, Units> = self
            .inventory
            .keys()
            .map(|good| (good.clone(), self.mid_price(good)))
            .collect();
        self.published_prices = prices;
        self.last_published_bucket = Some(bucket);
        true
    }
}

/// Transaction fee in basis points for a node's world-class multiplier and
/// the tweak multiplier. Multipliers at or below 1.0 charge nothing.
pub fn fee_bps(class_multiplier: Fixed64, tweak_multiplier: Fixed64) -> Units {
    let combined = class_multiplier.saturating_mul(tweak_multiplier);
    let excess = combined - Fixed64::from_num(1);
    if excess <= Fixed64::ZERO {
        return 0;
    }
    excess
        .saturating_mul(Fixed64::from_num(BPS_SCALE))
        .to_num::<i64>()
}

/// Fee charged on `gross` credits at `bps`.
pub fn fee_on(gross: Units, bps: Units) -> Units {
    gross.saturating_mul(bps) / BPS_SCALE
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Cool lane heat and publish prices on the window cadence.
pub fn process(state: &mut crate::sim::SimState) {
    let decay = Fixed64::from_num(HEAT_DECAY_PER_TICK);
    for edge in state.edges.values_mut() {
        if edge.heat > Fixed64::ZERO {
            edge.heat = (edge.heat - decay).max(Fixed64::ZERO);
        }
    }

    let tick = state.tick;
    let mut published = 0usize;
    for market in state.markets.values_mut() {
        if market.publish_prices_if_due(tick, PUBLISH_WINDOW_TICKS) {
            published += 1;
        }
    }
    if published > 0 {
        tracing::debug!(target: "tradelane::market", tick, markets = published, "market.prices_published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_with(good: &str, qty: Units) -> Market {
        let mut m = Market::new("mkt");
        m.inventory.insert(good.to_string(), qty);
        m
    }

    // -----------------------------------------------------------------------
    // Test 1: scarcity raises the mid price above base
    // -----------------------------------------------------------------------
    #[test]
    fn low_supply_is_above_base() {
        let m = market_with("fuel", 10);
        assert!(m.mid_price("fuel") > DEFAULT_BASE_PRICE);
    }

    // -----------------------------------------------------------------------
    // Test 2: abundance lowers the mid price below base
    // -----------------------------------------------------------------------
    #[test]
    fn high_supply_is_below_base() {
        let m = market_with("fuel", 100);
        assert!(m.mid_price("fuel") < DEFAULT_BASE_PRICE);
    }

    #[test]
    fn zero_supply_is_high() {
        let m = Market::new("mkt");
        assert!(m.mid_price("gold") > DEFAULT_BASE_PRICE);
    }

    // -----------------------------------------------------------------------
    // Test 3: bid/ask ordering
    // -----------------------------------------------------------------------
    #[test]
    fn buy_mid_sell_ordering() {
        let m = market_with("fuel", 50);
        assert!(m.buy_price("fuel") > m.sell_price("fuel"));
        assert!(m.buy_price("fuel") >= m.mid_price("fuel"));
        assert!(m.sell_price("fuel") <= m.mid_price("fuel"));
        assert_eq!(m.mid_price("fuel"), DEFAULT_BASE_PRICE);
    }

    #[test]
    fn scarcer_stock_raises_all_prices() {
        let high = market_with("fuel", 60);
        let low = market_with("fuel", 10);
        assert!(low.mid_price("fuel") > high.mid_price("fuel"));
        assert!(low.buy_price("fuel") > high.buy_price("fuel"));
        assert!(low.sell_price("fuel") > high.sell_price("fuel"));
    }

    // Every extra unit lowers the price well past ideal stock, and the
    // floor only starts after the strict range.
    #[test]
    fn strictly_decreasing_across_range() {
        let limit = Market::new("mkt").strict_stock_limit();
        assert_eq!(limit, 949);
        let mids: Vec<Units> = (0..=limit).map(|q| market_with("ore", q).mid_price("ore")).collect();
        assert!(mids.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(mids[0], 1500);
        assert_eq!(market_with("ore", 300).mid_price("ore"), 750);
        assert_eq!(market_with("ore", limit).sell_price("ore"), 1);
        assert_eq!(market_with("ore", limit + 50).mid_price("ore"), DEFAULT_SPREAD + 1);
    }

    #[test]
    fn sell_price_stays_positive_when_flooded() {
        let m = market_with("fuel", 1_000_000);
        assert!(m.sell_price("fuel") >= 1);
    }

    // -----------------------------------------------------------------------
    // Test 4: publication happens once per window
    // -----------------------------------------------------------------------
    #[test]
    fn publishes_once_per_bucket() {
        let mut m = market_with("fuel", 10);
        assert!(m.publish_prices_if_due(0, PUBLISH_WINDOW_TICKS));
        let first = m.published_price("fuel");
        m.inventory.insert("fuel".into(), 100);
        assert!(!m.publish_prices_if_due(719, PUBLISH_WINDOW_TICKS));
        assert_eq!(m.published_price("fuel"), first);
        assert!(m.publish_prices_if_due(720, PUBLISH_WINDOW_TICKS));
        assert!(m.published_price("fuel") < first);
    }

    #[test]
    fn fee_is_zero_at_unit_multiplier() {
        assert_eq!(fee_bps(Fixed64::from_num(1), Fixed64::from_num(1)), 0);
        assert_eq!(fee_bps(Fixed64::from_num(0.5), Fixed64::from_num(1)), 0);
    }

    #[test]
    fn fee_scales_with_class_multiplier() {
        let bps = fee_bps(Fixed64::from_num(1.2), Fixed64::from_num(1));
        assert!((1999..=2000).contains(&bps), "got {bps}");
        assert_eq!(fee_on(1000, 2000), 200);
    }
}
