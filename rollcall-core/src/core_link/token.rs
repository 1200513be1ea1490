//! Correlation tokens for the identity-link redirect round trip

use crate::core_membership::types::{CommunityId, MemberId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a correlation token stays valid after issuance
pub const LINK_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// One in-flight identity-link attempt, keyed by its opaque state value.
///
/// Single-use: the store deletes the row the moment it is consumed,
/// whether or not the downstream exchange succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkState {
    /// Cryptographically random value carried as the anti-CSRF `state`
    pub state: String,
    pub member: MemberId,
    pub community: CommunityId,
    pub created_at: Timestamp,
}

impl LinkState {
    /// Whether the token has outlived its window at instant `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.created_at.elapsed_millis(now) > LINK_STATE_TTL.as_millis() as u64
    }
}

/// Generate a fresh correlation token value (32 random bytes, hex)
pub fn generate_state() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
