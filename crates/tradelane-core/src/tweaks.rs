//! Runtime tuning knobs (tweak config v0).
//!
//! Tweaks are plain data stored in the state container. Their canonical
//! JSON (sorted keys) is hashed so a run can be tied to the exact knob set
//! it used.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fixed::{Fixed64, f64_to_fixed64};

pub const TWEAK_CONFIG_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweakConfig {
    pub version: u32,
    pub worldgen_min_producers_per_good: u32,
    pub worldgen_min_sinks_per_good: u32,
    /// Overrides every generated lane's capacity when non-zero.
    pub default_lane_capacity_k: u32,
    pub market_fee_multiplier: f64,
    pub risk_scalar: f64,
    pub loop_viability_threshold: f64,
    pub role_risk_tolerance_default: f64,
}

impl Default for TweakConfig {
    fn default() -> Self {
        Self {
            version: TWEAK_CONFIG_VERSION,
            worldgen_min_producers_per_good: 1,
            worldgen_min_sinks_per_good: 0,
            default_lane_capacity_k: 0,
            market_fee_multiplier: 1.0,
            risk_scalar: 1.0,
            loop_viability_threshold: 0.0,
            role_risk_tolerance_default: 1.0,
        }
    }
}

impl TweakConfig {
    /// Parse tweak JSON. Missing keys take defaults; invalid JSON or a
    /// version other than 0 yields the full default set.
    pub fn from_json_or_default(text: &str) -> Self {
        match serde_json::from_str::<TweakConfig>(text) {
            Ok(cfg) if cfg.version == TWEAK_CONFIG_VERSION => cfg.sanitized(),
            Ok(cfg) => {
                tracing::warn!(target: "tradelane::tweaks", version = cfg.version, "tweaks.unsupported_version");
                Self::default()
            }
            Err(err) => {
                tracing::warn!(target: "tradelane::tweaks", error = %err, "tweaks.parse_failed");
                Self::default()
            }
        }
    }

    /// Replace non-finite or non-positive multipliers with their defaults.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !self.market_fee_multiplier.is_finite() || self.market_fee_multiplier < 0.0 {
            self.market_fee_multiplier = d.market_fee_multiplier;
        }
        if !self.risk_scalar.is_finite() || self.risk_scalar < 0.0 {
            self.risk_scalar = d.risk_scalar;
        }
        if !self.role_risk_tolerance_default.is_finite() || self.role_risk_tolerance_default <= 0.0 {
            self.role_risk_tolerance_default = d.role_risk_tolerance_default;
        }
        if !self.loop_viability_threshold.is_finite() {
            self.loop_viability_threshold = d.loop_viability_threshold;
        }
        self
    }

    /// Canonical JSON: sorted keys, no whitespace.
    pub fn canonical_json(&self) -> String {
        // serde_json::Value maps are sorted by key.
        serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    /// Uppercase SHA-256 of the canonical JSON.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        hex::encode_upper(hasher.finalize())
    }

    pub fn market_fee_multiplier_fixed(&self) -> Fixed64 {
        f64_to_fixed64(self.market_fee_multiplier)
    }

    /// True when route scoring must weigh risk instead of the default
    /// hop-first ordering.
    pub fn uses_risk_scoring(&self) -> bool {
        self.risk_scalar != 1.0 || self.role_risk_tolerance_default != 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_v0() {
        let t = TweakConfig::default();
        assert_eq!(t.worldgen_min_producers_per_good, 1);
        assert_eq!(t.worldgen_min_sinks_per_good, 0);
        assert_eq!(t.default_lane_capacity_k, 0);
        assert_eq!(t.market_fee_multiplier, 1.0);
        assert!(!t.uses_risk_scoring());
    }

    #[test]
    fn invalid_json_falls_back() {
        assert_eq!(TweakConfig::from_json_or_default("{not json"), TweakConfig::default());
        assert_eq!(
            TweakConfig::from_json_or_default(r#"{"version": 3}"#),
            TweakConfig::default()
        );
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let t = TweakConfig::from_json_or_default(r#"{"version":0,"risk_scalar":2.5}"#);
        assert_eq!(t.risk_scalar, 2.5);
        assert_eq!(t.worldgen_min_producers_per_good, 1);
        assert!(t.uses_risk_scoring());
    }

    #[test]
    fn canonical_json_sorted_and_hash_stable() {
        let t = TweakConfig::default();
        let json = t.canonical_json();
        let first = json.find("default_lane_capacity_k").unwrap();
        let last = json.find("worldgen_min_sinks_per_good").unwrap();
        assert!(first < last);
        assert_eq!(t.hash(), TweakConfig::default().hash());
        assert_eq!(t.hash().len(), 64);
        assert!(t.hash().chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));

        let other = TweakConfig {
            risk_scalar: 2.0,
            ..TweakConfig::default()
        };
        assert_ne!(t.hash(), other.hash());
    }
}
