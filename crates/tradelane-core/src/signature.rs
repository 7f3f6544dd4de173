//! SHA-256 state signature, the determinism oracle.
//!
//! The canonical text is the state graph rendered as compact JSON with every
//! object's keys in ordinal order. All keyed collections in [`SimState`] are
//! `BTreeMap`s and `serde_json::Map` is ordered, so the rendering does not
//! depend on insertion history. Pending intents are not part of the state
//! graph and never contribute.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::sim::SimState;

/// Canonical text of the whole state.
pub fn canonical_text(state: &SimState) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(state)?;
    serde_json::to_string(&value)
}

/// Uppercase hex SHA-256 of [`canonical_text`].
pub fn signature(state: &SimState) -> String {
    match canonical_text(state) {
        Ok(text) => digest_hex(text.as_bytes()),
        Err(e) => {
            tracing::warn!(error = %e, tick = state.tick, "state not serializable for signature");
            digest_hex(format!("UNSERIALIZABLE:{e}").as_bytes())
        }
    }
}

pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(bytes))
}

/// One digest per top-level state field. Two states with equal signatures
/// have equal sections; when signatures differ this names where.
pub fn section_digests(state: &SimState) -> BTreeMap<String, String> {
    let Ok(serde_json::Value::Object(map)) = serde_json::to_value(state) else {
        return BTreeMap::new();
    };
    map.into_iter()
        .map(|(k, v)| (k, digest_hex(v.to_string().as_bytes())))
        .collect()
}

/// Names of the top-level sections whose digests differ.
pub fn diverging_sections(a: &SimState, b: &SimState) -> Vec<String> {
    let da = section_digests(a);
    let db = section_digests(b);
    da.keys()
        .chain(db.keys())
        .filter(|k| da.get(*k) != db.get(*k))
        .cloned()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect()
}
