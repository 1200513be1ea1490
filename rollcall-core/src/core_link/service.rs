//! Identity link orchestration
//!
//! Bridges a verification request to the external identity provider:
//! issues the correlation token and PKCE material, then resolves the
//! provider callback back to the (member, community) pair that started it.

use super::error::LinkError;
use super::pkce::{self, VerifierCache};
use super::provider::{IdentityProvider, ProfileResult};
use super::token::{self, LinkState, LINK_STATE_TTL};
use crate::core_membership::storage::MembershipStore;
use crate::core_membership::types::{CommunityId, MemberId, Timestamp};
use std::sync::Arc;
use tracing::{debug, info};

/// The identity link protocol front
pub struct LinkService {
    store: Arc<MembershipStore>,
    provider: Arc<dyn IdentityProvider>,
    verifiers: VerifierCache,
}

impl LinkService {
    pub fn new(store: Arc<MembershipStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            provider,
            verifiers: VerifierCache::new(LINK_STATE_TTL),
        }
    }

    /// Start an authorization round trip for a (member, community) pair.
    ///
    /// Returns the provider authorization URL to redirect the member to.
    pub fn begin_authorization(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<String, LinkError> {
        let state = token::generate_state();
        let verifier = pkce::generate_verifier();
        let challenge = pkce::challenge_s256(&verifier);

        self.store.insert_link_state(&LinkState {
            state: state.clone(),
            member: member.clone(),
            community: community.clone(),
            created_at: Timestamp::now(),
        })?;
        self.verifiers.insert(&state, verifier);

        debug!(%member, %community, "Issued link state");
        Ok(self.provider.authorize_url(&state, &challenge))
    }

    /// Resolve a provider callback.
    ///
    /// Consumes the correlation token (single-use regardless of outcome),
    /// exchanges the code and fetches the linked profile. Returns the
    /// originating pair together with the profile result; `NotLinked` is a
    /// legitimate outcome the caller must surface distinctly.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(LinkState, ProfileResult), LinkError> {
        let link = self
            .store
            .take_link_state(state)?
            .ok_or(LinkError::InvalidState)?;

        // The verifier entry goes away with the token either way
        let verifier = self.verifiers.take(state);

        if link.is_expired(Timestamp::now()) {
            info!(member = %link.member, "Link state expired before callback");
            return Err(LinkError::ExpiredState);
        }

        let access_token = self
            .provider
            .exchange_code(code, verifier.as_deref())
            .await?;
        let profile = self.provider.fetch_profile(&access_token).await?;

        info!(
            member = %link.member,
            community = %link.community,
            linked = matches!(profile, ProfileResult::Linked(_)),
            "Completed identity exchange"
        );
        Ok((link, profile))
    }

    /// Drop expired in-memory PKCE material; the stored token rows expire
    /// through [`MembershipStore::purge_link_states_before`]
    pub fn purge_expired(&self) -> Result<(), LinkError> {
        let dropped = self.verifiers.purge_expired();
        if dropped > 0 {
            debug!(dropped, "Purged expired PKCE verifiers");
        }
        let cutoff = Timestamp::now().sub_duration(LINK_STATE_TTL);
        self.store.purge_link_states_before(cutoff)?;
        Ok(())
    }
}
