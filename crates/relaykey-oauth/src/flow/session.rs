//! Per-attempt PKCE (RFC 7636) secrets and CSRF state.
//!
//! A [`Session`] binds one authorization attempt together: the verifier proves
//! to the token endpoint that the code exchange comes from whoever started the
//! request, and the state token proves to us that the redirect belongs to it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE challenge method sent with every authorization request.
pub const CHALLENGE_METHOD: &str = "S256";

/// Random bytes behind each verifier and state token (256 bits).
const SECRET_BYTES: usize = 32;

/// Secrets for a single authorization attempt.
///
/// Immutable once generated; dropped when the attempt completes or is
/// abandoned.
#[derive(Clone)]
pub struct Session {
    verifier: String,
    challenge: String,
    state: String,
}

impl Session {
    /// Generates a fresh verifier, its S256 challenge, and an independent state.
    ///
    /// The verifier is 43 characters of base64url, within the 43-128 range
    /// required by RFC 7636.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_token();
        let challenge = compute_challenge(&verifier);

        Self {
            verifier,
            challenge,
            state: random_token(),
        }
    }

    /// Replaces the generated state with a caller-managed one.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Returns the verifier sent with the code exchange.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Returns the challenge sent with the authorization request.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Returns the challenge method.
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }

    /// Returns the state token.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Checks a state value echoed by the redirect against this session.
    ///
    /// Compares in constant time.
    #[must_use]
    pub fn state_matches(&self, echoed: &str) -> bool {
        let expected = self.state.as_bytes();
        let echoed = echoed.as_bytes();
        if expected.len() != echoed.len() {
            return false;
        }
        expected
            .iter()
            .zip(echoed)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("challenge", &self.challenge)
            .field("challenge_method", &CHALLENGE_METHOD)
            .finish_non_exhaustive()
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Computes the S256 code challenge for a verifier.
#[must_use]
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
