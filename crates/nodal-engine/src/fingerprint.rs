//! Deterministic content fingerprinting for node evaluations using blake3.
//!
//! A [`Fingerprint`] is derived, never stored: it hashes a node's type name,
//! its parameter values, and its resolved input values. Two nodes with
//! identical (type, params, resolved inputs) produce the same fingerprint and
//! are cache-interchangeable -- which is exactly the contract that makes a
//! cache hit equivalent to a fresh evaluation, provided node definitions are
//! pure functions of those three things.
//!
//! # Determinism
//!
//! - Values are serialized with `serde_json::to_vec` (canonical for our
//!   `Value` type, which contains no unordered maps).
//! - Param and input entries are hashed in sorted key order, so map insertion
//!   order never affects the result.
//! - Length-prefixed framing keeps adjacent fields from aliasing each other.

use std::fmt;

use nodal_core::{Value, ValueMap};
use serde::{Deserialize, Serialize};

/// A blake3 content fingerprint, stored as a portable `[u8; 32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Hashes one named value with length-prefixed framing.
fn hash_entry(hasher: &mut blake3::Hasher, name: &str, value: &Value) {
    let value_bytes =
        serde_json::to_vec(value).expect("Value serialization should never fail");
    hasher.update(&(name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(&(value_bytes.len() as u64).to_le_bytes());
    hasher.update(&value_bytes);
}

/// Hashes a value map in sorted key order.
fn hash_map_sorted(hasher: &mut blake3::Hasher, map: &ValueMap) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    hasher.update(&(keys.len() as u64).to_le_bytes());
    for key in keys {
        hash_entry(hasher, key, &map[key]);
    }
}

/// Computes the cache fingerprint for one node evaluation.
///
/// `inputs` must be the *resolved* input set: literal socket values
/// overridden by upstream outputs, multi-connected sockets already collected
/// into lists. Upstream identity does not participate -- only the values do,
/// so two different nodes producing equal values share cache entries.
pub fn fingerprint_node(type_name: &str, params: &ValueMap, inputs: &ValueMap) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(type_name.len() as u64).to_le_bytes());
    hasher.update(type_name.as_bytes());
    hash_map_sorted(&mut hasher, params);
    hash_map_sorted(&mut hasher, inputs);
    Fingerprint(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> ValueMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn deterministic() {
        let params = map(&[("width", Value::Float(10.0))]);
        let inputs = map(&[("origin", Value::Vector([0.0, 0.0, 0.0]))]);

        let a = fingerprint_node("Solid::Box", &params, &inputs);
        let b = fingerprint_node("Solid::Box", &params, &inputs);
        assert_eq!(a, b, "same content must produce the same fingerprint");
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = map(&[("width", Value::Float(10.0)), ("height", Value::Float(5.0))]);
        let reversed = map(&[("height", Value::Float(5.0)), ("width", Value::Float(10.0))]);

        assert_eq!(
            fingerprint_node("Solid::Box", &forward, &ValueMap::new()),
            fingerprint_node("Solid::Box", &reversed, &ValueMap::new()),
        );
    }

    #[test]
    fn type_name_changes_fingerprint() {
        let params = map(&[("width", Value::Float(10.0))]);
        assert_ne!(
            fingerprint_node("Solid::Box", &params, &ValueMap::new()),
            fingerprint_node("Solid::Sphere", &params, &ValueMap::new()),
        );
    }

    #[test]
    fn param_value_changes_fingerprint() {
        assert_ne!(
            fingerprint_node(
                "Solid::Box",
                &map(&[("width", Value::Float(10.0))]),
                &ValueMap::new()
            ),
            fingerprint_node(
                "Solid::Box",
                &map(&[("width", Value::Float(11.0))]),
                &ValueMap::new()
            ),
        );
    }

    #[test]
    fn input_value_changes_fingerprint() {
        let params = ValueMap::new();
        assert_ne!(
            fingerprint_node("Transform::Move", &params, &map(&[("shape", Value::Int(1))])),
            fingerprint_node("Transform::Move", &params, &map(&[("shape", Value::Int(2))])),
        );
    }

    #[test]
    fn params_and_inputs_do_not_alias() {
        // The same entry as a param vs as an input must hash differently.
        let entry = map(&[("x", Value::Int(1))]);
        assert_ne!(
            fingerprint_node("T", &entry, &ValueMap::new()),
            fingerprint_node("T", &ValueMap::new(), &entry),
        );
    }

    #[test]
    fn hex_display() {
        let fp = fingerprint_node("Solid::Box", &ValueMap::new(), &ValueMap::new());
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
