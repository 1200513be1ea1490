//! Join-event handling
//!
//! Anchors the timeout clock the instant a member joins, then sends the
//! best-effort welcome notification carrying the verification link. The
//! record write always happens first so the clock starts at the true join
//! instant even when the notification fails.

use super::lifecycle::{LifecycleError, MembershipLifecycle};
use super::storage::MembershipStore;
use super::types::{CommunityId, MemberId};
use crate::gateway::Gateway;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handles membership-join notifications from the platform
pub struct Onboarding {
    store: Arc<MembershipStore>,
    lifecycle: MembershipLifecycle,
    gateway: Arc<dyn Gateway>,
    /// Public base URL of this service, without a trailing slash
    public_url: String,
}

impl Onboarding {
    pub fn new(
        store: Arc<MembershipStore>,
        lifecycle: MembershipLifecycle,
        gateway: Arc<dyn Gateway>,
        public_url: String,
    ) -> Self {
        Self {
            store,
            lifecycle,
            gateway,
            public_url,
        }
    }

    /// The /auth/start URL a member follows to begin verification
    pub fn verify_url(&self, member: &MemberId, community: &CommunityId) -> String {
        format!(
            "{}/auth/start?community={}&member={}",
            self.public_url, community, member
        )
    }

    /// Process a join event.
    ///
    /// Creates or resets the membership record, then notifies the member
    /// unless verification is disabled for the community. Notification
    /// failures are swallowed; the record write is the transition.
    pub async fn handle_member_join(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<(), LifecycleError> {
        self.lifecycle.record_join(member, community)?;

        let config = self.store.community_config_or_default(community)?;
        if !config.verification_enabled {
            debug!(%member, %community, "Verification disabled, skipping welcome notification");
            return Ok(());
        }

        let community_name = match self.gateway.community_name(community).await {
            Ok(name) => name,
            Err(_) => community.as_str().to_string(),
        };

        let text = format!(
            "Welcome to {}! To gain access you need to link your game account. \
             Open {} to verify. You have {} hours to complete verification \
             before being removed. If you run into trouble, contact a moderator.",
            community_name,
            self.verify_url(member, community),
            config.timeout_hours,
        );

        match self.gateway.send_direct(member, &text).await {
            Ok(()) => info!(%member, %community, "Sent verification notice to new member"),
            Err(e) => {
                warn!(%member, %community, error = %e, "Could not notify new member")
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_membership::community::CommunityConfig;
    use crate::core_membership::record::MembershipStatus;
    use crate::gateway::MockGateway;

    fn setup(verification_enabled: bool) -> (Onboarding, Arc<MockGateway>, Arc<MembershipStore>) {
        let store = Arc::new(MembershipStore::memory().unwrap());
        let gateway = Arc::new(MockGateway::new());

        let mut config = CommunityConfig::defaults(CommunityId::new("c1"));
        config.verification_enabled = verification_enabled;
        config.timeout_hours = 48;
        store.put_community_config(&config).unwrap();

        let onboarding = Onboarding::new(
            store.clone(),
            MembershipLifecycle::new(store.clone()),
            gateway.clone(),
            "https://bot.example".to_string(),
        );
        (onboarding, gateway, store)
    }

    #[tokio::test]
    async fn test_join_creates_record_and_notifies() {
        let (onboarding, gateway, store) = setup(true);
        let member = MemberId::new("m1");
        let community = CommunityId::new("c1");

        onboarding.handle_member_join(&member, &community).await.unwrap();

        let record = store.get_membership(&member, &community).unwrap().unwrap();
        assert_eq!(record.status, MembershipStatus::Pending);

        let directs = gateway.direct_messages();
        assert_eq!(directs.len(), 1);
        assert!(directs[0].1.contains("https://bot.example/auth/start?community=c1&member=m1"));
        assert!(directs[0].1.contains("48 hours"));
    }

    #[tokio::test]
    async fn test_join_with_verification_disabled() {
        let (onboarding, gateway, store) = setup(false);
        let member = MemberId::new("m1");
        let community = CommunityId::new("c1");

        onboarding.handle_member_join(&member, &community).await.unwrap();

        // Record still created so the clock is anchored if the feature is
        // enabled later
        assert!(store.get_membership(&member, &community).unwrap().is_some());
        assert!(gateway.direct_messages().is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_join() {
        let (onboarding, gateway, store) = setup(true);
        let member = MemberId::new("m1");
        let community = CommunityId::new("c1");

        gateway.disable_direct_for(&member);
        onboarding.handle_member_join(&member, &community).await.unwrap();

        assert!(store.get_membership(&member, &community).unwrap().is_some());
    }
}
