//! PKCE proof material and the in-memory verifier store
//!
//! The verifier is never persisted: it lives in process memory keyed by
//! the correlation token and dies with the process. A restart between
//! authorize and callback therefore fails the exchange; callers degrade
//! to a "link expired, retry" message.

use crate::core_membership::types::Timestamp;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const VERIFIER_LEN: usize = 64;

/// Generate a random PKCE code verifier (RFC 7636 unreserved charset)
pub fn generate_verifier() -> String {
    use rand::Rng;
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

    let mut rng = rand::rng();
    (0..VERIFIER_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Derive the S256 code challenge for a verifier
pub fn challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// In-memory store of PKCE verifiers keyed by correlation token.
///
/// Entries expire with the token TTL; expiry is enforced lazily on read
/// and eagerly by [`VerifierCache::purge_expired`].
pub struct VerifierCache {
    entries: Mutex<HashMap<String, (String, Timestamp)>>,
    ttl: Duration,
}

impl VerifierCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Remember the verifier for a correlation token
    pub fn insert(&self, state: &str, verifier: String) {
        self.entries
            .lock()
            .unwrap()
            .insert(state.to_string(), (verifier, Timestamp::now()));
    }

    /// Take the verifier for a token, if present and still fresh.
    ///
    /// The entry is removed either way; a verifier is as single-use as
    /// the token it belongs to.
    pub fn take(&self, state: &str) -> Option<String> {
        let (verifier, inserted_at) = self.entries.lock().unwrap().remove(state)?;
        if inserted_at.elapsed_millis(Timestamp::now()) > self.ttl.as_millis() as u64 {
            return None;
        }
        Some(verifier)
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Timestamp::now();
        let ttl_millis = self.ttl.as_millis() as u64;
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, (_, inserted_at)| inserted_at.elapsed_millis(now) <= ttl_millis);
        before - entries.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
