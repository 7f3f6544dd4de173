//! Input logs for reproducing a run.
//!
//! A [`ReplayLog`] is a bitcode snapshot of the state when recording began
//! plus every input fed to the kernel afterwards, each paired with the
//! state's quick hash right after it applied. [`play`] rebuilds a kernel
//! from the log and reports the first input whose hash disagrees.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::fixed::Ticks;
use crate::intent::Intent;
use crate::kernel::Kernel;
use crate::serialize::{self, DeserializeError, SerializeError};

/// One kernel input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayInput {
    Step,
    Run { ticks: Ticks },
    Command(Command),
    Intent(Intent),
}

impl ReplayInput {
    fn apply(&self, kernel: &mut Kernel) {
        match self {
            Self::Step => kernel.step(),
            Self::Run { ticks } => kernel.run(*ticks),
            // Rejected commands are logged too; they replay as the same no-op.
            Self::Command(cmd) => {
                kernel.enqueue_command(cmd.clone());
            }
            Self::Intent(intent) => {
                kernel.enqueue_intent(intent.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub input: ReplayInput,
    pub hash_after: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    start: Vec<u8>,
    entries: Vec<ReplayEntry>,
}

impl ReplayLog {
    /// Start recording from the kernel's current state.
    pub fn begin(kernel: &Kernel) -> Result<Self, SerializeError> {
        Ok(Self {
            start: serialize::snapshot(kernel.state())?,
            entries: Vec::new(),
        })
    }

    /// Apply `input` to `kernel` and log it.
    pub fn feed(&mut self, kernel: &mut Kernel, input: ReplayInput) {
        input.apply(kernel);
        self.entries.push(ReplayEntry {
            input,
            hash_after: kernel.state().quick_hash(),
        });
    }

    pub fn entries(&self) -> &[ReplayEntry] {
        &self.entries
    }

    /// Mutable access, for tooling that edits a recorded log.
    pub fn entries_mut(&mut self) -> &mut [ReplayEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DeserializeError> {
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))
    }
}

/// Where a playback first disagreed with its recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub entry: usize,
    pub tick: Ticks,
    pub recorded: u64,
    pub replayed: u64,
}

#[derive(Debug)]
pub struct Playback {
    pub kernel: Kernel,
    pub divergence: Option<Divergence>,
}

impl Playback {
    pub fn is_faithful(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Rebuild the recorded run. Every entry is applied even after a
/// divergence, so the returned kernel is always the full playback.
pub fn play(log: &ReplayLog) -> Result<Playback, DeserializeError> {
    let mut kernel = Kernel::from_state(serialize::restore(&log.start)?);
    let mut divergence = None;
    for (entry, recorded) in log.entries.iter().enumerate() {
        recorded.input.apply(&mut kernel);
        let replayed = kernel.state().quick_hash();
        if divergence.is_none() && replayed != recorded.hash_after {
            tracing::warn!(target: "tradelane::replay", entry, tick = kernel.tick(), "replay.diverged");
            divergence = Some(Divergence {
                entry,
                tick: kernel.tick(),
                recorded: recorded.hash_after,
                replayed,
            });
        }
    }
    Ok(Playback { kernel, divergence })
}
