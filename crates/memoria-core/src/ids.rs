//! Collision-resistant id generation.
//!
//! The original implementation truncated a `sha256` digest to 12 hex chars;
//! we keep that shape (sha256 of random bytes, truncated to 96 bits) for
//! experience ids, and plain v4 UUIDs for ephemeral correlation ids where no
//! sha256 flavor is expected downstream.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// A 24-hex-char (96-bit) collision-resistant id, prefixed by `kind`.
pub fn generate_id(kind: &str) -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(kind.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    format!("{kind}_{}", &hex[..24])
}

/// A correlation id for transient request/response matching.
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_has_expected_shape() {
        let id = generate_id("leaf");
        assert!(id.starts_with("leaf_"));
        assert_eq!(id.len(), "leaf_".len() + 24);
    }

    #[test]
    fn generate_id_is_not_constant() {
        let a = generate_id("seed");
        let b = generate_id("seed");
        assert_ne!(a, b);
    }

    #[test]
    fn correlation_id_parses_as_uuid() {
        let id = generate_correlation_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
