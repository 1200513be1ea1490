//! Community platform contract
//!
//! Everything rollcall asks of the messaging platform goes through the
//! [`Gateway`] trait: member removal, role management, notifications,
//! presence queries and voice-channel moves. The HTTP adapter talks to the
//! platform's REST API; tests use the in-memory mock.

use crate::core_membership::types::{ChannelId, CommunityId, MemberId, RoleId};
use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpGateway;
pub use mock::MockGateway;

/// Errors surfaced by platform operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The member is not (or no longer) present on the platform side
    #[error("Member not found")]
    MemberNotFound,

    #[error("Channel not found")]
    ChannelNotFound,

    /// The platform refused the operation (missing permission, recipient
    /// disallows notifications, ...)
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// A member's live voice presence within a community
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPresence {
    pub member: MemberId,
    pub roles: Vec<RoleId>,
    /// Voice channel the member currently sits in, if any
    pub voice_channel: Option<ChannelId>,
}

/// Outbound operations against the community platform
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Human-readable name of a community
    async fn community_name(&self, community: &CommunityId) -> Result<String, GatewayError>;

    /// Remove a member from a community
    async fn remove_member(
        &self,
        community: &CommunityId,
        member: &MemberId,
        reason: &str,
    ) -> Result<(), GatewayError>;

    /// Grant a role to a member
    async fn grant_role(
        &self,
        community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GatewayError>;

    /// Revoke a role from a member
    async fn revoke_role(
        &self,
        community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GatewayError>;

    /// Deliver a direct notification to a member (best-effort; the
    /// recipient may disallow it)
    async fn send_direct(&self, member: &MemberId, text: &str) -> Result<(), GatewayError>;

    /// Post a message to a community channel
    async fn send_channel(
        &self,
        community: &CommunityId,
        channel: &ChannelId,
        text: &str,
    ) -> Result<(), GatewayError>;

    /// Live voice presences of every member in a community
    async fn presences(
        &self,
        community: &CommunityId,
    ) -> Result<Vec<MemberPresence>, GatewayError>;

    /// Move a member into a voice channel
    async fn move_to_channel(
        &self,
        community: &CommunityId,
        member: &MemberId,
        channel: &ChannelId,
    ) -> Result<(), GatewayError>;
}
