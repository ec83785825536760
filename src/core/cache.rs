// src/core/cache.rs

use log::trace;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// Truncated blake3 digest of a byte slice, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    truncated(&blake3::hash(bytes))
}

fn truncated(hash: &blake3::Hash) -> String {
    hex::encode(hash.as_bytes().get(..HASH_TRUNCATE_LENGTH).unwrap_or_default())
}

/// Identity of one pipeline evaluation: the pipeline's canonical form plus
/// every input it would read. Two evaluations with the same identity yield
/// the same value, so the second one can be served from cache.
pub fn pipeline_identity<'a>(
    canonical: &str,
    inputs: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(canonical.as_bytes());
    for input in inputs {
        // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart.
        hasher.update(&(input.len() as u64).to_le_bytes());
        hasher.update(input.as_bytes());
    }
    let identity = truncated(&hasher.finalize());
    trace!("Pipeline identity for '{}': {}", canonical, identity);
    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        // Pre-calculated blake3 hash of the bytes "hello world", truncated to 16 bytes.
        assert_eq!(content_hash(b"hello world"), "d74981efa70a0c880b8d8c1985d075db");
    }

    #[test]
    fn test_pipeline_identity_depends_on_inputs() {
        let a = pipeline_identity("/x/ { cat }", ["ab", "c"]);
        let b = pipeline_identity("/x/ { cat }", ["a", "bc"]);
        let c = pipeline_identity("/x/ { cat }", ["ab", "c"]);
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 32);
        assert_ne!(a, pipeline_identity("/x/ { sort }", ["ab", "c"]));
    }
}
