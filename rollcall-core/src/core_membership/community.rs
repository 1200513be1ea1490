//! Per-community configuration row

use super::types::{ChannelId, CommunityId, RoleId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default verification window in hours
pub const DEFAULT_TIMEOUT_HOURS: u32 = 72;

/// Bounds accepted for the verification window
pub const MIN_TIMEOUT_HOURS: u32 = 1;
pub const MAX_TIMEOUT_HOURS: u32 = 720;

/// Settings for one community.
///
/// The absence of a stored row is equivalent to `CommunityConfig::defaults`;
/// a row is only written once an administrator touches the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityConfig {
    pub community: CommunityId,

    /// Hours a pending member has to finish verification
    pub timeout_hours: u32,

    /// Org tags that force a flagged outcome (compared case-insensitively)
    pub blocklist: Vec<String>,

    /// Channel receiving verification and removal audit entries
    pub log_channel: Option<ChannelId>,

    /// Role granted when a member verifies cleanly
    pub verified_role: Option<RoleId>,

    /// Role whose mention triggers a rally
    pub rally_role: Option<RoleId>,

    /// Voice channel rallied members are moved into
    pub rally_channel: Option<ChannelId>,

    /// Roles allowed to trigger a rally
    pub rally_allowed_roles: Vec<RoleId>,

    /// Text channels a rally may be triggered from (default-deny)
    pub rally_trigger_channels: Vec<ChannelId>,

    pub verification_enabled: bool,
    pub rally_enabled: bool,
}

impl CommunityConfig {
    /// The configuration an unconfigured community runs with
    pub fn defaults(community: CommunityId) -> Self {
        CommunityConfig {
            community,
            timeout_hours: DEFAULT_TIMEOUT_HOURS,
            blocklist: Vec::new(),
            log_channel: None,
            verified_role: None,
            rally_role: None,
            rally_channel: None,
            rally_allowed_roles: Vec::new(),
            rally_trigger_channels: Vec::new(),
            verification_enabled: false,
            rally_enabled: true,
        }
    }

    /// The verification window as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_hours) * 3600)
    }

    /// Whether `hours` is an acceptable verification window
    pub fn valid_timeout_hours(hours: u32) -> bool {
        (MIN_TIMEOUT_HOURS..=MAX_TIMEOUT_HOURS).contains(&hours)
    }
}
