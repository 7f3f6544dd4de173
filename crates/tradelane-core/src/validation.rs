//! Determinism validation.
//!
//! Runs two kernels built from the same save in lock step and reports the
//! first tick at which their state hashes diverge, plus which state
//! sections differ at the end. The multi-seed check runs one
//! generate-and-compare per seed, in parallel under the `parallel` feature.

use crate::fixed::{Fixed64, Ticks};
use crate::kernel::Kernel;
use crate::serialize::SaveError;
use crate::signature;
use crate::worldgen::WorldGenError;

/// Result of a lock-step run.
#[derive(Debug, Clone)]
pub struct DeterminismResult {
    pub is_deterministic: bool,
    /// First tick whose end-of-step hashes differ.
    pub divergence_tick: Option<Ticks>,
    /// `(tick, hash_a, hash_b)` after each step.
    pub hash_log: Vec<(Ticks, u64, u64)>,
    pub signature_a: String,
    pub signature_b: String,
    /// Top-level state sections whose digests differ at the end.
    pub diverging_sections: Vec<String>,
}

/// Compare two kernels step by step for `ticks` ticks.
pub fn compare_kernels(a: &mut Kernel, b: &mut Kernel, ticks: Ticks) -> DeterminismResult {
    let mut hash_log = Vec::with_capacity(ticks as usize);
    let mut divergence_tick = None;

    for _ in 0..ticks {
        a.step();
        b.step();
        let (ha, hb) = (a.state_hash(), b.state_hash());
        let tick = a.tick();
        hash_log.push((tick, ha, hb));
        if ha != hb && divergence_tick.is_none() {
            tracing::warn!(target: "tradelane::validation", tick, "validation.diverged");
            divergence_tick = Some(tick);
        }
    }

    let signature_a = a.signature();
    let signature_b = b.signature();
    let diverging_sections = signature::diverging_sections(a.state(), b.state());
    DeterminismResult {
        is_deterministic: divergence_tick.is_none() && signature_a == signature_b,
        divergence_tick,
        hash_log,
        signature_a,
        signature_b,
        diverging_sections,
    }
}

/// Load the same save into two kernels and run them side by side.
pub fn validate_save(save: &str, ticks: Ticks) -> Result<DeterminismResult, SaveError> {
    let mut a = Kernel::new(0);
    let mut b = Kernel::new(1);
    a.load_from_string(save)?;
    b.load_from_string(save)?;
    Ok(compare_kernels(&mut a, &mut b, ticks))
}

/// Outcome of one seed in a multi-seed sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub seed: u64,
    pub signature: String,
    pub is_deterministic: bool,
    pub divergence_tick: Option<Ticks>,
}

fn check_seed(
    seed: u64,
    star_count: usize,
    radius: Fixed64,
    ticks: Ticks,
) -> Result<SeedReport, WorldGenError> {
    let mut a = Kernel::new(seed);
    let mut b = Kernel::new(seed);
    a.generate_world(star_count, radius)?;
    b.generate_world(star_count, radius)?;
    let result = compare_kernels(&mut a, &mut b, ticks);
    Ok(SeedReport {
        seed,
        signature: result.signature_a,
        is_deterministic: result.is_deterministic,
        divergence_tick: result.divergence_tick,
    })
}

/// Generate and double-run a galaxy for each seed. Reports come back in
/// the order of `seeds` regardless of scheduling.
pub fn validate_seeds(
    seeds: &[u64],
    star_count: usize,
    radius: Fixed64,
    ticks: Ticks,
) -> Result<Vec<SeedReport>, WorldGenError> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        seeds
            .par_iter()
            .map(|&seed| check_seed(seed, star_count, radius, ticks))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        seeds
            .iter()
            .map(|&seed| check_seed(seed, star_count, radius, ticks))
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
