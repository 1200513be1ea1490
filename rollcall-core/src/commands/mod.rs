//! Administrative command surface
//!
//! Thin operations behind the platform's command interface. Each one maps
//! directly onto a lifecycle or config read/write; every mutating
//! operation is gated through the central authorization predicate.

use crate::authz::{self, Actor, Capability};
use crate::core_membership::community::CommunityConfig;
use crate::core_membership::lifecycle::{LifecycleError, MembershipLifecycle};
use crate::core_membership::record::MembershipRecord;
use crate::core_membership::storage::{MembershipStore, StatusCounts, StorageError};
use crate::core_membership::types::{ChannelId, CommunityId, MemberId, RoleId};
use crate::gateway::Gateway;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced to the command layer
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("You are not authorized to do that")]
    NotAuthorized,

    #[error("No record found for that member")]
    NotFound,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(LifecycleError),
}

impl From<LifecycleError> for CommandError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound => CommandError::NotFound,
            other => CommandError::Lifecycle(other),
        }
    }
}

/// Administrative operations over one community's config and records
pub struct AdminService {
    store: Arc<MembershipStore>,
    lifecycle: MembershipLifecycle,
    gateway: Arc<dyn Gateway>,
}

impl AdminService {
    pub fn new(
        store: Arc<MembershipStore>,
        lifecycle: MembershipLifecycle,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            gateway,
        }
    }

    fn authorize(
        &self,
        actor: &Actor,
        community: &CommunityId,
        capability: Capability,
    ) -> Result<CommunityConfig, CommandError> {
        let config = self.store.ensure_community_config(community)?;
        if !authz::is_authorized(actor, &config, capability) {
            return Err(CommandError::NotAuthorized);
        }
        Ok(config)
    }

    fn save(&self, config: &CommunityConfig) -> Result<(), CommandError> {
        self.store.put_community_config(config)?;
        Ok(())
    }

    // ===== Verification settings =====

    /// Set the verification window in hours (1-720)
    pub fn set_timeout(
        &self,
        actor: &Actor,
        community: &CommunityId,
        hours: u32,
    ) -> Result<(), CommandError> {
        if !CommunityConfig::valid_timeout_hours(hours) {
            return Err(CommandError::InvalidValue(format!(
                "Timeout must be between 1 and 720 hours, got {}",
                hours
            )));
        }

        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.timeout_hours = hours;
        self.save(&config)?;
        info!(%community, hours, "Verification timeout updated");
        Ok(())
    }

    /// Set the channel receiving audit entries
    pub fn set_log_channel(
        &self,
        actor: &Actor,
        community: &CommunityId,
        channel: ChannelId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.log_channel = Some(channel);
        self.save(&config)
    }

    /// Set the role granted on clean verification
    pub fn set_verified_role(
        &self,
        actor: &Actor,
        community: &CommunityId,
        role: RoleId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.verified_role = Some(role);
        self.save(&config)
    }

    pub fn set_verification_enabled(
        &self,
        actor: &Actor,
        community: &CommunityId,
        enabled: bool,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.verification_enabled = enabled;
        self.save(&config)?;
        info!(%community, enabled, "Verification feature toggled");
        Ok(())
    }

    // ===== Blocklist =====

    /// Add an org tag to the deny-list; duplicates are ignored
    pub fn blocklist_add(
        &self,
        actor: &Actor,
        community: &CommunityId,
        tag: &str,
    ) -> Result<(), CommandError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(CommandError::InvalidValue("Tag must not be empty".to_string()));
        }

        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        if !config
            .blocklist
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tag))
        {
            config.blocklist.push(tag.to_string());
            self.save(&config)?;
        }
        Ok(())
    }

    /// Remove an org tag from the deny-list
    pub fn blocklist_remove(
        &self,
        actor: &Actor,
        community: &CommunityId,
        tag: &str,
    ) -> Result<bool, CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        let before = config.blocklist.len();
        config.blocklist.retain(|t| !t.eq_ignore_ascii_case(tag));
        let removed = config.blocklist.len() < before;
        if removed {
            self.save(&config)?;
        }
        Ok(removed)
    }

    /// Current deny-list
    pub fn blocklist_list(
        &self,
        actor: &Actor,
        community: &CommunityId,
    ) -> Result<Vec<String>, CommandError> {
        let config = self.authorize(actor, community, Capability::AdministerConfig)?;
        Ok(config.blocklist)
    }

    // ===== Rally configuration =====

    pub fn set_rally_role(
        &self,
        actor: &Actor,
        community: &CommunityId,
        role: RoleId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.rally_role = Some(role);
        self.save(&config)
    }

    pub fn set_rally_channel(
        &self,
        actor: &Actor,
        community: &CommunityId,
        channel: ChannelId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.rally_channel = Some(channel);
        self.save(&config)
    }

    pub fn allow_rally_role(
        &self,
        actor: &Actor,
        community: &CommunityId,
        role: RoleId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        if !config.rally_allowed_roles.contains(&role) {
            config.rally_allowed_roles.push(role);
            self.save(&config)?;
        }
        Ok(())
    }

    pub fn deny_rally_role(
        &self,
        actor: &Actor,
        community: &CommunityId,
        role: &RoleId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.rally_allowed_roles.retain(|r| r != role);
        self.save(&config)
    }

    pub fn allow_trigger_channel(
        &self,
        actor: &Actor,
        community: &CommunityId,
        channel: ChannelId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        if !config.rally_trigger_channels.contains(&channel) {
            config.rally_trigger_channels.push(channel);
            self.save(&config)?;
        }
        Ok(())
    }

    pub fn deny_trigger_channel(
        &self,
        actor: &Actor,
        community: &CommunityId,
        channel: &ChannelId,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.rally_trigger_channels.retain(|c| c != channel);
        self.save(&config)
    }

    pub fn set_rally_enabled(
        &self,
        actor: &Actor,
        community: &CommunityId,
        enabled: bool,
    ) -> Result<(), CommandError> {
        let mut config = self.authorize(actor, community, Capability::AdministerConfig)?;
        config.rally_enabled = enabled;
        self.save(&config)
    }

    /// Full rally configuration, for the status command
    pub fn rally_status(
        &self,
        actor: &Actor,
        community: &CommunityId,
    ) -> Result<CommunityConfig, CommandError> {
        self.authorize(actor, community, Capability::AdministerConfig)
    }

    // ===== Records =====

    /// Look up a record by member
    pub fn lookup(
        &self,
        actor: &Actor,
        community: &CommunityId,
        member: &MemberId,
    ) -> Result<Option<MembershipRecord>, CommandError> {
        self.authorize(actor, community, Capability::ModerateMembers)?;
        Ok(self.lifecycle.lookup(member, community)?)
    }

    /// Look up a record by linked game-account handle
    pub fn lookup_by_handle(
        &self,
        actor: &Actor,
        community: &CommunityId,
        handle: &str,
    ) -> Result<Option<MembershipRecord>, CommandError> {
        self.authorize(actor, community, Capability::ModerateMembers)?;
        Ok(self.lifecycle.lookup_by_handle(community, handle)?)
    }

    /// Revoke a member's verification, forcing a fresh link.
    ///
    /// The record drops back to pending with a re-anchored timeout clock;
    /// the verified role is retracted best-effort.
    pub async fn revoke(
        &self,
        actor: &Actor,
        community: &CommunityId,
        member: &MemberId,
    ) -> Result<MembershipRecord, CommandError> {
        let config = self.authorize(actor, community, Capability::ModerateMembers)?;

        let record = self.lifecycle.revoke(member, community)?;

        if let Some(role) = &config.verified_role {
            if let Err(e) = self.gateway.revoke_role(community, member, role).await {
                // The member may have left; the record change stands
                warn!(%member, %community, error = %e, "Could not retract verified role");
            }
        }

        info!(%member, %community, "Verification revoked");
        Ok(record)
    }

    /// Aggregate counts by status
    pub fn stats(
        &self,
        actor: &Actor,
        community: &CommunityId,
    ) -> Result<StatusCounts, CommandError> {
        self.authorize(actor, community, Capability::ModerateMembers)?;
        Ok(self.lifecycle.status_counts(community)?)
    }
}
