//! Redaction token derivation

use sha2::{Digest, Sha256};

/// Prefix carried by every email token
pub const TOKEN_PREFIX: &str = "EMAIL_";

/// Digest prefix lengths tried in order; later entries are only used after a collision
pub const DIGEST_LENGTHS: [usize; 4] = [8, 16, 32, 64];

/// Derive the token for `email` using the first `hex_len` hex characters of
/// `sha256(salt || email)`.
pub fn derive(salt: &str, email: &str, hex_len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(email.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let len = hex_len.min(digest.len());
    format!("{}{}", TOKEN_PREFIX, &digest[..len])
}

/// Whether `s` has the shape of a token (`EMAIL_` followed by lowercase hex)
pub fn looks_like_token(s: &str) -> bool {
    s.strip_prefix(TOKEN_PREFIX).is_some_and(|hex| {
        DIGEST_LENGTHS.contains(&hex.len())
            && hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    })
}
