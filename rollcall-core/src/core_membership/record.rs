//! Membership record data structures

use super::types::{CommunityId, MemberId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verification status of one member within one community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipStatus {
    /// Joined but not yet verified; subject to the timeout sweep
    Pending,
    /// Game account linked and not on the deny-list
    Verified,
    /// Removed for missing the verification deadline
    Kicked,
    /// Game account linked but an org affiliation matched the deny-list
    Flagged,
}

impl MembershipStatus {
    /// Stable string form used in the database and user-facing summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Verified => "verified",
            MembershipStatus::Kicked => "kicked",
            MembershipStatus::Flagged => "flagged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MembershipStatus::Pending),
            "verified" => Some(MembershipStatus::Verified),
            "kicked" => Some(MembershipStatus::Kicked),
            "flagged" => Some(MembershipStatus::Flagged),
            _ => None,
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One organization affiliation reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAffiliation {
    pub name: String,
    pub tag: String,
    pub rank: String,
}

/// Identity payload resolved from the provider after a successful link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Public handle of the linked game account
    pub handle: String,

    /// Provider-side record identifier
    pub record_id: String,

    /// Organization affiliations, in the order the provider reports them
    pub orgs: Vec<OrgAffiliation>,

    /// Account-creation date as reported by the provider
    pub account_created: String,
}

/// The authoritative verification state of one (member, community) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub member: MemberId,
    pub community: CommunityId,
    pub status: MembershipStatus,

    /// Linked game-account handle (present iff verified or flagged)
    pub handle: Option<String>,

    /// Provider-side record identifier
    pub record_id: Option<String>,

    /// Organization affiliations at verification time
    pub orgs: Option<Vec<OrgAffiliation>>,

    /// Provider-reported account-creation date
    pub account_created: Option<String>,

    /// When the identity link completed
    pub verified_at: Option<Timestamp>,

    /// When the member entered the pending state; anchors the timeout clock
    pub joined_at: Timestamp,

    /// When the member was removed for missing the deadline
    pub kicked_at: Option<Timestamp>,
}

impl MembershipRecord {
    /// Fresh pending record for a member who just joined
    pub fn new_pending(member: MemberId, community: CommunityId, joined_at: Timestamp) -> Self {
        MembershipRecord {
            member,
            community,
            status: MembershipStatus::Pending,
            handle: None,
            record_id: None,
            orgs: None,
            account_created: None,
            verified_at: None,
            joined_at,
            kicked_at: None,
        }
    }

    /// Clear every field populated by a completed identity link
    pub fn clear_identity(&mut self) {
        self.handle = None;
        self.record_id = None;
        self.orgs = None;
        self.account_created = None;
        self.verified_at = None;
    }
}
