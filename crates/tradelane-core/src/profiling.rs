//! Per-phase tick timing.
//!
//! The kernel fills a [`TickProfile`] on every step when the `profiling`
//! feature is enabled. Timing is observational only and never feeds back
//! into state.

use std::time::Duration;

/// Per-phase timing from one tick, in pipeline order.
#[derive(Debug, Clone, Default)]
pub struct TickProfile {
    pub phases: Vec<(&'static str, Duration)>,
    pub total: Duration,
    pub tick: u64,
}

impl TickProfile {
    pub fn new(tick: u64) -> Self {
        Self {
            phases: Vec::new(),
            total: Duration::ZERO,
            tick,
        }
    }

    pub fn record(&mut self, phase: &'static str, elapsed: Duration) {
        self.phases.push((phase, elapsed));
    }

    pub fn phase(&self, name: &str) -> Option<Duration> {
        self.phases.iter().find(|(n, _)| *n == name).map(|(_, d)| *d)
    }

    /// The slowest phase. Ties go to the earlier phase.
    pub fn bottleneck_phase(&self) -> Option<(&'static str, Duration)> {
        self.phases
            .iter()
            .copied()
            .reduce(|best, p| if p.1 > best.1 { p } else { best })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottleneck_picks_slowest() {
        let mut p = TickProfile::new(3);
        p.record("movement", Duration::from_micros(5));
        p.record("market", Duration::from_micros(9));
        p.record("intel", Duration::from_micros(9));
        assert_eq!(p.bottleneck_phase(), Some(("market", Duration::from_micros(9))));
        assert_eq!(p.phase("movement"), Some(Duration::from_micros(5)));
        assert_eq!(p.phase("risk"), None);
    }

    #[test]
    fn empty_profile_has_no_bottleneck() {
        assert!(TickProfile::default().bottleneck_phase().is_none());
    }
}
