// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
//! Random opaque identifiers for sessions.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// 32 bytes = 256 bits of entropy
const DEFAULT_TOKEN_BYTES: usize = 32;

/// URL-safe, unpadded base64 of `DEFAULT_TOKEN_BYTES` bytes from the OS RNG.
/// Safe to place in a cookie value without escaping.
pub fn generate_secure_token() -> String {
    generate_secure_token_with_size(DEFAULT_TOKEN_BYTES)
}

pub fn generate_secure_token_with_size(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_cookie_safe() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(generate_secure_token_with_size(12).len(), 16);
    }
}
