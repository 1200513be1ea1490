//! Rally dispatch
//!
//! On an authorized role mention, concurrently relocates every member
//! holding the rally role from their current voice channel into the
//! configured target channel. Relocations are independent; one member's
//! failure never blocks the others, and the aggregate (moved, failed)
//! counts are reported back to the triggering channel.

use crate::authz::{self, Actor, Capability};
use crate::core_membership::storage::MembershipStore;
use crate::core_membership::types::{ChannelId, CommunityId, RoleId};
use crate::gateway::Gateway;
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// A role-mention signal observed on the platform
#[derive(Debug, Clone)]
pub struct RallySignal {
    pub community: CommunityId,
    pub actor: Actor,
    /// Text channel the mention was posted in
    pub origin_channel: ChannelId,
    pub mentioned_roles: Vec<RoleId>,
}

/// What a signal resulted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RallyOutcome {
    /// The signal did not pass the gates; nothing happened and nothing
    /// was reported
    NotTriggered,
    /// Nobody eligible to move; reported without attempting relocation
    NothingToMove,
    /// Relocations dispatched
    Dispatched { moved: usize, failed: usize },
}

#[derive(Debug, Error)]
pub enum RallyError {
    #[error("Storage error: {0}")]
    Storage(#[from] crate::core_membership::storage::StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),
}

/// The rally fan-out dispatcher
pub struct RallyDispatcher {
    store: Arc<MembershipStore>,
    gateway: Arc<dyn Gateway>,
}

impl RallyDispatcher {
    pub fn new(store: Arc<MembershipStore>, gateway: Arc<dyn Gateway>) -> Self {
        Self { store, gateway }
    }

    /// Evaluate a role-mention signal and dispatch the rally if every
    /// gate passes.
    ///
    /// Gate order: feature enabled, rally role and target configured,
    /// rally role actually mentioned, origin channel on the allow-list
    /// (default-deny), actor authorized. An unauthorized signal does
    /// nothing and reports nothing.
    pub async fn handle_signal(&self, signal: RallySignal) -> Result<RallyOutcome, RallyError> {
        let config = self.store.community_config_or_default(&signal.community)?;

        if !config.rally_enabled {
            return Ok(RallyOutcome::NotTriggered);
        }

        let (rally_role, target_channel) = match (&config.rally_role, &config.rally_channel) {
            (Some(role), Some(channel)) => (role.clone(), channel.clone()),
            _ => {
                debug!(community = %signal.community, "Rally not configured");
                return Ok(RallyOutcome::NotTriggered);
            }
        };

        if !signal.mentioned_roles.contains(&rally_role) {
            return Ok(RallyOutcome::NotTriggered);
        }

        // Default-deny: an unlisted origin channel cannot trigger a rally
        if !config.rally_trigger_channels.contains(&signal.origin_channel) {
            debug!(
                community = %signal.community,
                channel = %signal.origin_channel,
                "Rally trigger from unlisted channel ignored"
            );
            return Ok(RallyOutcome::NotTriggered);
        }

        if !authz::is_authorized(&signal.actor, &config, Capability::TriggerRally) {
            info!(
                community = %signal.community,
                actor = %signal.actor.member,
                "Member attempted rally without permission"
            );
            return Ok(RallyOutcome::NotTriggered);
        }

        // Everyone holding the rally role who sits in voice somewhere else
        let presences = self.gateway.presences(&signal.community).await?;
        let eligible: Vec<_> = presences
            .into_iter()
            .filter(|p| {
                p.roles.contains(&rally_role)
                    && p.voice_channel
                        .as_ref()
                        .map(|c| c != &target_channel)
                        .unwrap_or(false)
            })
            .collect();

        if eligible.is_empty() {
            let _ = self
                .gateway
                .send_channel(
                    &signal.community,
                    &signal.origin_channel,
                    "No rally members are currently in voice channels to move.",
                )
                .await;
            return Ok(RallyOutcome::NothingToMove);
        }

        let mut tasks: JoinSet<bool> = JoinSet::new();
        for presence in eligible {
            let gateway = self.gateway.clone();
            let community = signal.community.clone();
            let channel = target_channel.clone();
            tasks.spawn(async move {
                match gateway.move_to_channel(&community, &presence.member, &channel).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(member = %presence.member, error = %e, "Failed to move member");
                        false
                    }
                }
            });
        }

        let mut moved = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => moved += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!(error = %e, "Rally task panicked");
                    failed += 1;
                }
            }
        }

        counter!("rally.dispatches").increment(1);
        counter!("rally.moved").increment(moved as u64);
        counter!("rally.failed").increment(failed as u64);

        info!(
            community = %signal.community,
            triggered_by = %signal.actor.member,
            moved,
            failed,
            "Rally dispatched"
        );

        let summary = if failed > 0 {
            format!("Moved {} member(s) to the rally channel ({} failed).", moved, failed)
        } else {
            format!("Moved {} member(s) to the rally channel.", moved)
        };
        let _ = self
            .gateway
            .send_channel(&signal.community, &signal.origin_channel, &summary)
            .await;

        Ok(RallyOutcome::Dispatched { moved, failed })
    }
}
