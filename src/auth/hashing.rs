use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix carried by every bearer token the principal store issues.
pub const TOKEN_PREFIX: &str = "kls_";

/// Generate a new bearer token: prefix plus 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", TOKEN_PREFIX, hex::encode(bytes))
}

/// Tokens are looked up by digest; the plaintext is never stored.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_prefixed_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with(TOKEN_PREFIX));
        assert_eq!(a.len(), TOKEN_PREFIX.len() + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = token_digest("kls_example");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("kls_example"));
        assert_ne!(digest, token_digest("kls_other"));
    }
}
