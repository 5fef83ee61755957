//! Idempotency Key Derivation

use sha1::{Digest, Sha1};

/// Derive an instance-independent key for a logical operation.
///
/// The key depends only on `operation` and the ordered `parts`, so every
/// replica derives the same key for the same request. Callers normalise the
/// order of `parts` when it is not significant.
pub fn operation_key<I, S>(operation: &str, parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha1::new();
    hasher.update(operation.as_bytes());
    for part in parts {
        // Unit separator keeps ["ab", "c"] and ["a", "bc"] apart
        hasher.update([0x1f]);
        hasher.update(part.as_ref().as_bytes());
    }
    format!("{}:{}", operation, hex::encode(hasher.finalize()))
}
