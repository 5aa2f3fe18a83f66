use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Identity hash of a document, computed over its key fields.
///
/// A `KeyHash` is a BLAKE3 hash of the key field names and values in schema
/// declaration order. Two documents with equal key-field values always produce
/// the same `KeyHash`, regardless of their non-key fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyHash([u8; 32]);

impl KeyHash {
    /// Compute a key hash from `(field, value)` pairs in declaration order.
    pub fn compute<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"atlas-key-v1:");
        for (name, value) in parts {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            value.hash_into(&mut hasher);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a `KeyHash` from a pre-computed hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The first eight bytes as an integer, used for striping.
    pub fn prefix_u64(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(head)
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({})", self.short_hex())
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_is_deterministic() {
        let a = KeyHash::compute([("id", Value::Int(1))]);
        let b = KeyHash::compute([("id", Value::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn field_order_matters() {
        let a = KeyHash::compute([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let b = KeyHash::compute([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_ne!(a, b);
    }

    #[test]
    fn length_prefix_prevents_concatenation_collisions() {
        let a = KeyHash::compute([("a", Value::from("bc")), ("d", Value::from(""))]);
        let b = KeyHash::compute([("a", Value::from("b")), ("d", Value::from("c"))]);
        assert_ne!(a, b);
    }

    #[test]
    fn display_and_debug() {
        let k = KeyHash::compute([("id", Value::Int(9))]);
        assert!(k.to_string().starts_with("key:"));
        assert_eq!(k.to_hex().len(), 64);
        assert!(format!("{k:?}").starts_with("KeyHash("));
    }
}
