//! State fingerprints.
//!
//! A fingerprint chains the previous fingerprint with the current stats,
//! story variables and global flags, so two histories share content only
//! when both their state and their ancestry match.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use storyloop_core::error::DomainError;

const PREVIOUS_HASH_KEY: &str = "_ph";
const STAT_PREFIX: &str = "cs_";
const VARIABLE_PREFIX: &str = "sv_";
const FLAGS_KEY: &str = "gf";
/// Variables and flags with this prefix are scratch state and never
/// contribute to a fingerprint.
const TRANSIENT_PREFIX: char = '_';

/// Computes the fingerprint of a narrative state.
///
/// The canonical document is a single JSON object with sorted keys and no
/// whitespace, digested with SHA-256 and hex-encoded (64 lower-case chars).
/// Null-valued and transient variables and transient flags are left out.
///
/// # Errors
///
/// Returns `DomainError::Internal` if the document cannot be serialised.
pub fn compute_state_hash(
    previous_hash: &str,
    core_stats: &BTreeMap<String, i64>,
    story_variables: &BTreeMap<String, Value>,
    global_flags: &BTreeSet<String>,
) -> Result<String, DomainError> {
    let mut document = BTreeMap::new();
    document.insert(
        PREVIOUS_HASH_KEY.to_owned(),
        Value::String(previous_hash.to_owned()),
    );
    for (name, value) in core_stats {
        document.insert(format!("{STAT_PREFIX}{name}"), Value::from(*value));
    }
    for (name, value) in story_variables {
        if value.is_null() || name.starts_with(TRANSIENT_PREFIX) {
            continue;
        }
        document.insert(format!("{VARIABLE_PREFIX}{name}"), canonicalize(value));
    }
    // BTreeSet iterates in ascending order.
    let flags: Vec<Value> = global_flags
        .iter()
        .filter(|flag| !flag.starts_with(TRANSIENT_PREFIX))
        .map(|flag| Value::String(flag.clone()))
        .collect();
    document.insert(FLAGS_KEY.to_owned(), Value::Array(flags));

    let canonical = Value::Object(sorted_object(document));
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| DomainError::Internal(format!("state serialisation failed: {e}")))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Rebuilds `value` with every nested object's keys inserted in ascending
/// order, so serialisation is byte-stable whichever map backs `Map`.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sorted_object(
            map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect(),
        )),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn sorted_object(entries: BTreeMap<String, Value>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key, value);
    }
    map
}
