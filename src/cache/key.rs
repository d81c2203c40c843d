use crate::LogoKitError;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Derives the content-addressed cache key for `(source, options)`.
///
/// The key is the hex SHA-256 of the source length, the source bytes and a
/// canonical JSON rendering of `options` (object keys sorted at every level).
/// Identical inputs always produce the identical 64 character key.
///
/// # Errors
/// `LogoKitError::InvalidOptions` when `options` cannot be serialized.
pub fn derive_key<T: Serialize>(source: &[u8], options: &T) -> Result<String, LogoKitError> {
    let canonical = canonical_json(options)?;
    let mut hasher = Sha256::new();
    // Length prefix keeps the source/options boundary unambiguous.
    hasher.update((source.len() as u64).to_le_bytes());
    hasher.update(source);
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Stable serialization used for key derivation.
pub fn canonical_json<T: Serialize>(options: &T) -> Result<String, LogoKitError> {
    let value = serde_json::to_value(options)
        .map_err(|e| LogoKitError::InvalidOptions(e.to_string()))?;
    serde_json::to_string(&sorted(value)).map_err(|e| LogoKitError::InvalidOptions(e.to_string()))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            let mut out = Map::new();
            for (k, v) in ordered {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}
