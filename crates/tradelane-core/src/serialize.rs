//! Save/load and binary snapshots.
//!
//! Two formats share one state graph:
//!
//! - the save envelope, JSON `{"Seed": .., "State": ..}`, which is the
//!   portable format and round-trips to an identical signature;
//! - a bitcode snapshot with a versioned header, used for the in-memory
//!   [`SnapshotHistory`] and replay logs.
//!
//! Pending intents are transient and are dropped by both formats.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::fixed::Ticks;
use crate::sim::SimState;

/// First word of every binary snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x7D1A_0001;

/// Binary snapshot layout revision. Saves are unaffected by it.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("save encoding failed: {0}")]
    Encode(String),
    #[error("save text is empty")]
    Empty,
    #[error("save decoding failed: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("not a tradelane snapshot (magic 0x{found:08X})")]
    BadMagic { found: u32 },
    #[error("snapshot layout {found} is not readable by layout {current}", current = FORMAT_VERSION)]
    LayoutMismatch { found: u32 },
    #[error("snapshot decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Save envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SaveEnvelope {
    #[serde(rename = "Seed")]
    seed: u64,
    #[serde(rename = "State")]
    state: SimState,
}

#[derive(Serialize)]
struct SaveEnvelopeRef<'a> {
    #[serde(rename = "Seed")]
    seed: u64,
    #[serde(rename = "State")]
    state: &'a SimState,
}

/// Render the save envelope.
pub fn save_to_string(state: &SimState) -> Result<String, SaveError> {
    let envelope = SaveEnvelopeRef {
        seed: state.seed,
        state,
    };
    serde_json::to_string(&envelope).map_err(|e| SaveError::Encode(e.to_string()))
}

/// Parse a save envelope into a fresh state. The envelope's seed is
/// authoritative; the pending intent queue comes back empty.
pub fn load_from_string(text: &str) -> Result<SimState, SaveError> {
    if text.trim().is_empty() {
        return Err(SaveError::Empty);
    }
    let envelope: SaveEnvelope =
        serde_json::from_str(text).map_err(|e| SaveError::Decode(e.to_string()))?;
    let mut state = envelope.state;
    state.seed = envelope.seed;
    state.pending_intents.clear();
    Ok(state)
}

// ---------------------------------------------------------------------------
// Binary snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub layout: u32,
    pub tick: Ticks,
}

impl SnapshotHeader {
    fn current(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            layout: FORMAT_VERSION,
            tick,
        }
    }

    /// Only the exact current layout is accepted; snapshots are not
    /// migrated, a stale one is simply discarded by its owner.
    pub fn check(self) -> Result<Self, DeserializeError> {
        match self {
            Self { magic, .. } if magic != SNAPSHOT_MAGIC => {
                Err(DeserializeError::BadMagic { found: magic })
            }
            Self { layout, .. } if layout != FORMAT_VERSION => {
                Err(DeserializeError::LayoutMismatch { found: layout })
            }
            ok => Ok(ok),
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    header: SnapshotHeader,
    state: &'a SimState,
}

#[derive(Deserialize)]
struct SnapshotOwned {
    header: SnapshotHeader,
    state: SimState,
}

/// Encode the state as a headed bitcode blob. Pending intents are not
/// serialized, so they never reach the blob.
pub fn snapshot(state: &SimState) -> Result<Vec<u8>, SerializeError> {
    let blob = SnapshotRef {
        header: SnapshotHeader::current(state.tick),
        state,
    };
    bitcode::serialize(&blob).map_err(|e| SerializeError::Encode(e.to_string()))
}

/// Decode a blob from [`snapshot`]. The header is checked before the
/// state is handed back.
pub fn restore(data: &[u8]) -> Result<SimState, DeserializeError> {
    let blob: SnapshotOwned =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    blob.header.check()?;
    Ok(blob.state)
}

/// Decode a blob and return its checked header.
pub fn peek_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let blob: SnapshotOwned =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    blob.header.check()
}

// ---------------------------------------------------------------------------
// Snapshot history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub tick: Ticks,
    pub data: Vec<u8>,
}

/// Bounded, tick-ordered history of snapshots. Pushing past the bound
/// drops the oldest entry.
#[derive(Debug)]
pub struct SnapshotHistory {
    entries: VecDeque<SnapshotEntry>,
    bound: usize,
    evicted: u64,
}

impl SnapshotHistory {
    /// A bound of 0 keeps one entry.
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            entries: VecDeque::with_capacity(bound),
            bound,
            evicted: 0,
        }
    }

    /// Add an entry. An entry at or before the newest tick replaces the
    /// tail from that tick on, which is what a rewind followed by new
    /// steps needs.
    pub fn push(&mut self, entry: SnapshotEntry) {
        while self.entries.back().is_some_and(|e| e.tick >= entry.tick) {
            self.entries.pop_back();
        }
        if self.entries.len() == self.bound {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped for lack of room.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn ticks(&self) -> impl Iterator<Item = Ticks> + '_ {
        self.entries.iter().map(|e| e.tick)
    }

    pub fn latest(&self) -> Option<&SnapshotEntry> {
        self.entries.back()
    }

    /// Newest entry taken at or before `tick`.
    pub fn at_or_before(&self, tick: Ticks) -> Option<&SnapshotEntry> {
        let idx = self.entries.partition_point(|e| e.tick <= tick);
        idx.checked_sub(1).and_then(|i| self.entries.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::signature::signature;
    use crate::test_utils::trade_loop_state;

    // -----------------------------------------------------------------------
    // Test 1: save/load round-trips to the same signature
    // -----------------------------------------------------------------------
    #[test]
    fn save_round_trip_preserves_signature() {
        let state = trade_loop_state(7);
        let text = save_to_string(&state).unwrap();
        assert!(text.starts_with("{\"Seed\":7,\"State\":"));
        let loaded = load_from_string(&text).unwrap();
        assert_eq!(signature(&state), signature(&loaded));
    }

    // -----------------------------------------------------------------------
    // Test 2: pending intents are dropped
    // -----------------------------------------------------------------------
    #[test]
    fn pending_intents_dropped_on_save() {
        let mut state = trade_loop_state(7);
        state.enqueue_intent(Intent::Buy {
            market_id: "mkt_a".into(),
            good_id: "ore".into(),
            quantity: 1,
        });
        let loaded = load_from_string(&save_to_string(&state).unwrap()).unwrap();
        assert!(loaded.pending_intents.is_empty());
        assert_eq!(loaded.next_intent_seq, state.next_intent_seq);
    }

    // -----------------------------------------------------------------------
    // Test 3: envelope seed wins over the state body
    // -----------------------------------------------------------------------
    #[test]
    fn envelope_seed_is_authoritative() {
        let state = trade_loop_state(7);
        let text = save_to_string(&state).unwrap().replacen("\"Seed\":7", "\"Seed\":99", 1);
        let loaded = load_from_string(&text).unwrap();
        assert_eq!(loaded.seed, 99);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(load_from_string("  "), Err(SaveError::Empty)));
        assert!(matches!(load_from_string("{\"Seed\":1}"), Err(SaveError::Decode(_))));
    }

    // -----------------------------------------------------------------------
    // Test 4: binary snapshot round trip and header checks
    // -----------------------------------------------------------------------
    #[test]
    fn binary_snapshot_round_trip() {
        let mut state = trade_loop_state(3);
        state.tick = 12;
        let data = snapshot(&state).unwrap();
        assert_eq!(peek_header(&data).unwrap().tick, 12);
        let back = restore(&data).unwrap();
        assert_eq!(signature(&state), signature(&back));
    }

    #[test]
    fn header_checks() {
        let good = SnapshotHeader::current(5);
        assert_eq!(good.check().unwrap(), good);
        let newer = SnapshotHeader {
            layout: FORMAT_VERSION + 1,
            ..good
        };
        assert!(matches!(
            newer.check(),
            Err(DeserializeError::LayoutMismatch { found }) if found == FORMAT_VERSION + 1
        ));
        let foreign = SnapshotHeader { magic: 0, ..newer };
        assert!(matches!(foreign.check(), Err(DeserializeError::BadMagic { found: 0 })));
        assert!(matches!(restore(&[1, 2, 3]), Err(DeserializeError::Decode(_))));
    }

    // -----------------------------------------------------------------------
    // Test 5: history bound and lookup
    // -----------------------------------------------------------------------
    fn entry(tick: Ticks) -> SnapshotEntry {
        SnapshotEntry {
            tick,
            data: vec![tick as u8],
        }
    }

    #[test]
    fn history_drops_oldest() {
        let mut history = SnapshotHistory::new(3);
        for tick in [10, 20, 30, 40, 50] {
            history.push(entry(tick));
        }
        assert_eq!(history.ticks().collect::<Vec<_>>(), vec![30, 40, 50]);
        assert_eq!(history.evicted(), 2);
        assert_eq!(history.at_or_before(45).map(|e| e.tick), Some(40));
        assert_eq!(history.at_or_before(30).map(|e| e.tick), Some(30));
        assert!(history.at_or_before(29).is_none());
        assert_eq!(history.latest().map(|e| e.tick), Some(50));
    }

    #[test]
    fn history_push_after_rewind_truncates() {
        let mut history = SnapshotHistory::new(0);
        assert_eq!(history.bound(), 1);
        history = SnapshotHistory::new(5);
        for tick in [10, 20, 30] {
            history.push(entry(tick));
        }
        history.push(entry(20));
        assert_eq!(history.ticks().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(history.evicted(), 0);
    }
}
