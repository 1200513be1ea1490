//! Membership verification lifecycle
//!
//! This module owns the authoritative status of every (member, community)
//! pair and the rules that move it between `pending`, `verified`,
//! `flagged` and `kicked`.
//!
//! ## Architecture
//!
//! - **MembershipRecord**: one row per (member, community), never deleted
//! - **CommunityConfig**: per-community settings; missing row = defaults
//! - **MembershipLifecycle**: the only writer of status transitions
//! - **Onboarding**: join events and the welcome notification
//! - **blocklist**: pure deny-list evaluation

pub mod blocklist;
pub mod community;
pub mod lifecycle;
pub mod onboarding;
pub mod record;
pub mod storage;
pub mod types;

pub use community::{CommunityConfig, DEFAULT_TIMEOUT_HOURS};
pub use lifecycle::{LifecycleError, MembershipLifecycle};
pub use onboarding::Onboarding;
pub use record::{ExternalIdentity, MembershipRecord, MembershipStatus, OrgAffiliation};
pub use storage::{MembershipStore, StatusCounts, StorageError};
pub use types::{ChannelId, CommunityId, MemberId, RoleId, Timestamp};
