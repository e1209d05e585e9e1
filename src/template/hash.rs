//! Spec hashing for change detection.
//!
//! Hashes are computed over the kind and the canonical JSON form of a spec
//! (object keys sorted, associations excluded), so the same content hashes the
//! same whichever encoding it was written in.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::kind::Kind;
use super::spec::ResourceSpec;

/// Hasher for computing spec hashes.
#[derive(Debug, Default)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new spec hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hash of a typed spec.
    #[must_use]
    pub fn hash_spec(&self, spec: &ResourceSpec) -> String {
        self.hash_value(spec.kind(), &spec.without_associations().to_value())
    }

    /// Computes the hash of a spec already in JSON form.
    ///
    /// The value must not carry associations.
    #[must_use]
    pub fn hash_value(&self, kind: Kind, spec: &Value) -> String {
        let mut canonical = String::new();
        write_canonical(spec, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::spec::{Association, BucketSpec, RetentionRule};
    use serde_json::json;

    fn bucket(seconds: i64) -> ResourceSpec {
        ResourceSpec::Bucket(BucketSpec {
            retention_rules: vec![RetentionRule {
                rule_type: String::from("expire"),
                every_seconds: seconds,
            }],
            ..BucketSpec::default()
        })
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = SpecHasher::new();
        assert_eq!(hasher.hash_spec(&bucket(60)), hasher.hash_spec(&bucket(60)));
        assert_ne!(hasher.hash_spec(&bucket(60)), hasher.hash_spec(&bucket(120)));
    }

    #[test]
    fn test_key_order_irrelevant() {
        let hasher = SpecHasher::new();
        let a = json!({"name": "x", "description": "y"});
        let b = json!({"description": "y", "name": "x"});
        assert_eq!(hasher.hash_value(Kind::Label, &a), hasher.hash_value(Kind::Label, &b));
        assert_ne!(hasher.hash_value(Kind::Label, &a), hasher.hash_value(Kind::Bucket, &a));
    }

    #[test]
    fn test_associations_excluded() {
        let hasher = SpecHasher::new();
        let mut labeled = bucket(60);
        labeled.set_associations(vec![Association {
            kind: Kind::Label,
            name: String::from("env"),
            id: None,
        }]);
        assert_eq!(hasher.hash_spec(&labeled), hasher.hash_spec(&bucket(60)));
    }

    #[test]
    fn test_short_hash() {
        let hasher = SpecHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(SpecHasher::hashes_match("abc123", "abc123"));
        assert!(!SpecHasher::hashes_match("abc123", "abc124"));
        assert!(!SpecHasher::hashes_match("abc123", "abc12"));
    }
}
