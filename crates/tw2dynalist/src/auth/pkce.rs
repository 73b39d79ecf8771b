//! PKCE (RFC 7636) code verifier and challenge.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Only S256 is supported.
pub const CHALLENGE_METHOD: &str = "S256";

/// A code verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier from 32 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_token())
    }

    /// Derive the challenge for a known verifier.
    #[must_use]
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

/// Random value for the OAuth `state` parameter.
#[must_use]
pub fn random_state() -> String {
    random_token()
}

/// 32 bytes from the OS RNG, base64url without padding.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_example() {
        let pkce = PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(
            pkce.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert_eq!(pkce.method(), "S256");
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = PkceChallenge::generate();
        // 32 bytes -> 43 base64url characters, no padding
        assert_eq!(pkce.verifier().len(), 43);
        assert!(!pkce.verifier().contains('='));
        assert!(pkce
            .verifier()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(
            PkceChallenge::from_verifier(pkce.verifier()).challenge(),
            pkce.challenge()
        );
    }

    #[test]
    fn test_states_are_unique() {
        assert_ne!(random_state(), random_state());
    }
}
