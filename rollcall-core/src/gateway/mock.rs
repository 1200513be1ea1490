//! Scriptable in-memory gateway for tests

use super::{Gateway, GatewayError, MemberPresence};
use crate::core_membership::types::{ChannelId, CommunityId, MemberId, RoleId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    names: HashMap<CommunityId, String>,
    presences: HashMap<CommunityId, Vec<MemberPresence>>,

    // Failure scripting
    missing_members: HashSet<MemberId>,
    failing_moves: HashSet<MemberId>,
    direct_disabled: HashSet<MemberId>,
    unavailable: bool,

    // Recorded calls
    removed: Vec<(CommunityId, MemberId)>,
    moved: Vec<(MemberId, ChannelId)>,
    directs: Vec<(MemberId, String)>,
    channel_messages: Vec<(ChannelId, String)>,
    granted: Vec<(MemberId, RoleId)>,
    revoked: Vec<(MemberId, RoleId)>,
}

/// In-memory [`Gateway`] whose failures are scripted per member.
///
/// Every outbound call is recorded so tests can assert on exactly what the
/// platform would have seen.
#[derive(Default)]
pub struct MockGateway {
    inner: Mutex<Inner>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Scripting =====

    pub fn set_community_name(&self, community: &CommunityId, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .names
            .insert(community.clone(), name.to_string());
    }

    pub fn set_presences(&self, community: &CommunityId, presences: Vec<MemberPresence>) {
        self.inner
            .lock()
            .unwrap()
            .presences
            .insert(community.clone(), presences);
    }

    /// Make the member look absent: removal and direct sends report
    /// `MemberNotFound`
    pub fn mark_member_missing(&self, member: &MemberId) {
        self.inner
            .lock()
            .unwrap()
            .missing_members
            .insert(member.clone());
    }

    /// Make voice moves fail for this member
    pub fn fail_move_for(&self, member: &MemberId) {
        self.inner
            .lock()
            .unwrap()
            .failing_moves
            .insert(member.clone());
    }

    /// Make direct notifications fail for this member (recipient opt-out)
    pub fn disable_direct_for(&self, member: &MemberId) {
        self.inner
            .lock()
            .unwrap()
            .direct_disabled
            .insert(member.clone());
    }

    /// Make every operation fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    // ===== Recorded calls =====

    pub fn removed(&self) -> Vec<(CommunityId, MemberId)> {
        self.inner.lock().unwrap().removed.clone()
    }

    pub fn moved(&self) -> Vec<(MemberId, ChannelId)> {
        self.inner.lock().unwrap().moved.clone()
    }

    pub fn direct_messages(&self) -> Vec<(MemberId, String)> {
        self.inner.lock().unwrap().directs.clone()
    }

    pub fn channel_messages(&self) -> Vec<(ChannelId, String)> {
        self.inner.lock().unwrap().channel_messages.clone()
    }

    pub fn granted_roles(&self) -> Vec<(MemberId, RoleId)> {
        self.inner.lock().unwrap().granted.clone()
    }

    pub fn revoked_roles(&self) -> Vec<(MemberId, RoleId)> {
        self.inner.lock().unwrap().revoked.clone()
    }

    fn check_available(inner: &Inner) -> Result<(), GatewayError> {
        if inner.unavailable {
            return Err(GatewayError::Unavailable("scripted outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn community_name(&self, community: &CommunityId) -> Result<String, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        Ok(inner
            .names
            .get(community)
            .cloned()
            .unwrap_or_else(|| community.as_str().to_string()))
    }

    async fn remove_member(
        &self,
        community: &CommunityId,
        member: &MemberId,
        _reason: &str,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        if inner.missing_members.contains(member) {
            return Err(GatewayError::MemberNotFound);
        }
        inner.removed.push((community.clone(), member.clone()));
        Ok(())
    }

    async fn grant_role(
        &self,
        _community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        if inner.missing_members.contains(member) {
            return Err(GatewayError::MemberNotFound);
        }
        inner.granted.push((member.clone(), role.clone()));
        Ok(())
    }

    async fn revoke_role(
        &self,
        _community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        if inner.missing_members.contains(member) {
            return Err(GatewayError::MemberNotFound);
        }
        inner.revoked.push((member.clone(), role.clone()));
        Ok(())
    }

    async fn send_direct(&self, member: &MemberId, text: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        if inner.missing_members.contains(member) {
            return Err(GatewayError::MemberNotFound);
        }
        if inner.direct_disabled.contains(member) {
            return Err(GatewayError::PermissionDenied);
        }
        inner.directs.push((member.clone(), text.to_string()));
        Ok(())
    }

    async fn send_channel(
        &self,
        _community: &CommunityId,
        channel: &ChannelId,
        text: &str,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        inner
            .channel_messages
            .push((channel.clone(), text.to_string()));
        Ok(())
    }

    async fn presences(
        &self,
        community: &CommunityId,
    ) -> Result<Vec<MemberPresence>, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        Ok(inner.presences.get(community).cloned().unwrap_or_default())
    }

    async fn move_to_channel(
        &self,
        _community: &CommunityId,
        member: &MemberId,
        channel: &ChannelId,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&inner)?;
        if inner.failing_moves.contains(member) {
            return Err(GatewayError::PermissionDenied);
        }
        inner.moved.push((member.clone(), channel.clone()));
        Ok(())
    }
}
