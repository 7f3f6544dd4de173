//! The simulation kernel: owns the state, runs the pipeline, and is the
//! only mutation surface exposed to collaborators.
//!
//! One [`Kernel::step`] runs every system in the fixed order below, seals
//! the tick's events, and advances the tick counter by exactly one.
//! Commands apply synchronously through [`Kernel::enqueue_command`];
//! intents queue through [`Kernel::enqueue_intent`] and apply at the next
//! intent step.

use crate::command::{self, Command, CommandHistory};
use crate::content::{ContentError, ContentRegistry};
use crate::fixed::{Fixed64, Ticks};
use crate::intent::{self, Intent};
use crate::query::{self, FleetExplain, GalaxySnapshot, SustainmentSite};
use crate::serialize::{self, DeserializeError, SaveError, SerializeError, SnapshotEntry, SnapshotHistory};
use crate::signature;
use crate::sim::SimState;
use crate::tweaks::TweakConfig;
use crate::world_loader::{self, WorldDefinition, WorldLoadError};
use crate::worldgen::{self, WorldGenError};
use crate::{
    containment, fracture, industry, intel, lane_flow, logistics, market, movement, program, risk,
};

/// A pipeline phase.
type Phase = fn(&mut SimState);

fn intent_phase(state: &mut SimState) {
    intent::process(state);
}

/// The system pipeline, in execution order.
pub const PIPELINE: [(&str, Phase); 11] = [
    ("lane_flow", lane_flow::process),
    ("program", program::process),
    ("intent", intent_phase),
    ("movement", movement::process),
    ("fracture", fracture::process),
    ("logistics", logistics::process),
    ("industry", industry::process),
    ("market", market::process),
    ("risk", risk::process),
    ("containment", containment::process),
    ("intel", intel::process),
];

/// Commands kept in the kernel's history by default.
pub const DEFAULT_COMMAND_HISTORY: usize = 256;

#[derive(Debug)]
pub struct Kernel {
    state: SimState,
    content: ContentRegistry,
    history: CommandHistory,
    snapshots: Option<SnapshotHistory>,
    /// Ticks between automatic snapshots. 0 disables them.
    snapshot_interval: Ticks,
    last_state_hash: u64,
    #[cfg(feature = "profiling")]
    last_profile: Option<crate::profiling::TickProfile>,
}

impl Kernel {
    /// An empty world with the embedded default content registry.
    pub fn new(seed: u64) -> Self {
        Self::from_state(SimState::new(seed))
    }

    /// Wrap an existing state. Pending intents in it are kept.
    pub fn from_state(state: SimState) -> Self {
        let content = ContentRegistry::embedded_v0();
        let last_state_hash = state.quick_hash();
        Self {
            state,
            content,
            history: CommandHistory::with_max_history(DEFAULT_COMMAND_HISTORY),
            snapshots: None,
            snapshot_interval: 0,
            last_state_hash,
            #[cfg(feature = "profiling")]
            last_profile: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Read-only view of the state container.
    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn tick(&self) -> Ticks {
        self.state.tick
    }

    pub fn seed(&self) -> u64 {
        self.state.seed
    }

    pub fn content(&self) -> &ContentRegistry {
        &self.content
    }

    pub fn command_history(&self) -> &CommandHistory {
        &self.history
    }

    /// FNV hash computed at the end of the last step.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    /// SHA-256 signature of the whole state.
    pub fn signature(&self) -> String {
        signature::signature(&self.state)
    }

    // -----------------------------------------------------------------------
    // World setup
    // -----------------------------------------------------------------------

    /// Replace the world with a generated galaxy. On error the current
    /// world is untouched.
    pub fn generate_world(&mut self, star_count: usize, radius: Fixed64) -> Result<(), WorldGenError> {
        worldgen::generate(&mut self.state, star_count, radius)?;
        self.last_state_hash = self.state.quick_hash();
        Ok(())
    }

    /// Replace the world with a hand-authored definition. On error the
    /// current world is untouched.
    pub fn load_world(&mut self, def: &WorldDefinition) -> Result<(), WorldLoadError> {
        world_loader::apply(&mut self.state, def)?;
        self.last_state_hash = self.state.quick_hash();
        Ok(())
    }

    /// Swap in a content registry parsed from JSON. On error the current
    /// registry stays.
    pub fn load_content_json(&mut self, json: &str) -> Result<(), ContentError> {
        self.content = crate::content::load_from_json(json)?;
        tracing::info!(
            target: "tradelane::kernel",
            digest = %self.content.digest(),
            goods = self.content.goods.len(),
            recipes = self.content.recipes.len(),
            "kernel.content_loaded"
        );
        Ok(())
    }

    pub fn set_content(&mut self, content: ContentRegistry) {
        self.content = content;
    }

    /// Install tuning knobs. They ride along with the state, so world
    /// generation and loading after this call keep them.
    pub fn set_tweaks(&mut self, tweaks: TweakConfig) {
        tracing::info!(target: "tradelane::kernel", hash = %tweaks.hash(), "kernel.tweaks_set");
        self.state.tweaks = tweaks.sanitized();
        self.last_state_hash = self.state.quick_hash();
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    /// Validate and apply a command now. Returns false, with no mutation,
    /// when any precondition fails.
    pub fn enqueue_command(&mut self, cmd: Command) -> bool {
        let applied = command::apply(&mut self.state, &cmd);
        if applied {
            self.history.record(self.state.tick, &cmd);
        }
        applied
    }

    /// Queue an intent for the next intent step. Returns its sequence number.
    pub fn enqueue_intent(&mut self, intent: Intent) -> u64 {
        self.state.enqueue_intent(intent)
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    pub fn step(&mut self) {
        #[cfg(feature = "profiling")]
        let mut profile = crate::profiling::TickProfile::new(self.state.tick);
        #[cfg(feature = "profiling")]
        let step_start = std::time::Instant::now();

        for (_name, phase) in PIPELINE {
            #[cfg(feature = "profiling")]
            let phase_start = std::time::Instant::now();
            phase(&mut self.state);
            #[cfg(feature = "profiling")]
            profile.record(_name, phase_start.elapsed());
        }

        self.state.finalize_events();
        self.state.tick += 1;
        self.last_state_hash = self.state.quick_hash();

        if self.snapshot_interval > 0 && self.state.tick % self.snapshot_interval == 0 {
            if let Err(e) = self.take_snapshot() {
                tracing::warn!(target: "tradelane::kernel", error = %e, "kernel.snapshot_failed");
            }
        }

        tracing::trace!(target: "tradelane::kernel", tick = self.state.tick, hash = self.last_state_hash, "kernel.step");

        #[cfg(feature = "profiling")]
        {
            profile.total = step_start.elapsed();
            self.last_profile = Some(profile);
        }
    }

    pub fn run(&mut self, ticks: Ticks) {
        for _ in 0..ticks {
            self.step();
        }
    }

    #[cfg(feature = "profiling")]
    pub fn last_tick_profile(&self) -> Option<&crate::profiling::TickProfile> {
        self.last_profile.as_ref()
    }

    // -----------------------------------------------------------------------
    // Save / load
    // -----------------------------------------------------------------------

    pub fn save_to_string(&self) -> Result<String, SaveError> {
        serialize::save_to_string(&self.state)
    }

    /// Replace the state with a saved one. The kernel's own seed is
    /// irrelevant; identity comes from the save.
    pub fn load_from_string(&mut self, text: &str) -> Result<(), SaveError> {
        let state = serialize::load_from_string(text).inspect_err(|e| {
            tracing::warn!(target: "tradelane::kernel", error = %e, "kernel.load_failed");
        })?;
        self.state = state;
        self.last_state_hash = self.state.quick_hash();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Keep up to `capacity` binary snapshots, one every `interval` ticks.
    pub fn enable_snapshots(&mut self, capacity: usize, interval: Ticks) {
        self.snapshots = Some(SnapshotHistory::new(capacity));
        self.snapshot_interval = interval;
    }

    pub fn snapshots(&self) -> Option<&SnapshotHistory> {
        self.snapshots.as_ref()
    }

    pub fn take_snapshot(&mut self) -> Result<(), SerializeError> {
        let data = serialize::snapshot(&self.state)?;
        let tick = self.state.tick;
        self.snapshots
            .get_or_insert_with(|| SnapshotHistory::new(1))
            .push(SnapshotEntry { tick, data });
        Ok(())
    }

    /// Restore the newest snapshot at or before `tick`. Returns the tick
    /// restored, or `None` when no snapshot qualifies.
    pub fn rewind_to(&mut self, tick: Ticks) -> Result<Option<Ticks>, DeserializeError> {
        let Some(entry) = self.snapshots.as_ref().and_then(|s| s.at_or_before(tick)) else {
            return Ok(None);
        };
        let restored = serialize::restore(&entry.data)?;
        let at = restored.tick;
        self.state = restored;
        self.last_state_hash = self.state.quick_hash();
        tracing::debug!(target: "tradelane::kernel", tick = at, "kernel.rewound");
        Ok(Some(at))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn galaxy_snapshot(&self) -> GalaxySnapshot {
        query::galaxy_snapshot(&self.state)
    }

    pub fn fleet_explain(&self, fleet_id: &str) -> Option<FleetExplain> {
        query::fleet_explain(&self.state, fleet_id)
    }

    pub fn sustainment(&self, node_id: &str) -> Vec<SustainmentSite> {
        query::sustainment_for_node(&self.state, node_id)
    }
}
