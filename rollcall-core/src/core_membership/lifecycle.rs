//! Membership lifecycle state machine
//!
//! Owns every transition of a (member, community) pair:
//!
//! - `pending -> verified` / `pending -> flagged` (identity link result)
//! - `pending -> kicked` (timeout sweep)
//! - `verified | flagged | kicked -> pending` (manual revocation)
//! - `kicked -> pending` (rejoin)
//!
//! All writes are read-modify-write against the latest stored row.

use super::record::{ExternalIdentity, MembershipRecord, MembershipStatus};
use super::storage::{MembershipStore, StatusCounts, StorageError};
use super::types::{CommunityId, MemberId, Timestamp};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by lifecycle transitions
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No membership row for the pair
    #[error("No membership record found")]
    NotFound,

    /// The member is already verified; informational, not a failure
    #[error("Member is already verified")]
    AlreadyVerified,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Lifecycle operations over the membership store
#[derive(Clone)]
pub struct MembershipLifecycle {
    store: Arc<MembershipStore>,
}

impl MembershipLifecycle {
    pub fn new(store: Arc<MembershipStore>) -> Self {
        Self { store }
    }

    /// Return the existing record or create a fresh pending one.
    ///
    /// Idempotent; an existing record is returned untouched.
    pub fn ensure_record(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<MembershipRecord, LifecycleError> {
        if let Some(record) = self.store.get_membership(member, community)? {
            return Ok(record);
        }

        let record =
            MembershipRecord::new_pending(member.clone(), community.clone(), Timestamp::now());
        self.store.insert_membership(&record)?;
        Ok(record)
    }

    /// Handle a join event.
    ///
    /// Resets an existing record to pending with a fresh join timestamp
    /// (rejoin after a kick), or creates a new pending record. Must run
    /// before any welcome notification so the timeout clock starts at the
    /// true join instant.
    pub fn record_join(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<MembershipRecord, LifecycleError> {
        let now = Timestamp::now();

        match self.store.get_membership(member, community)? {
            Some(mut record) => {
                record.status = MembershipStatus::Pending;
                record.joined_at = now;
                record.kicked_at = None;
                self.store.update_membership(&record)?;
                Ok(record)
            }
            None => {
                let record =
                    MembershipRecord::new_pending(member.clone(), community.clone(), now);
                self.store.insert_membership(&record)?;
                Ok(record)
            }
        }
    }

    /// Commit the outcome of a completed identity link.
    ///
    /// `blocked` selects flagged over verified. Fails with
    /// `AlreadyVerified` when the record is already verified; callers
    /// surface that informationally rather than as an error.
    pub fn apply_identity_result(
        &self,
        member: &MemberId,
        community: &CommunityId,
        identity: &ExternalIdentity,
        blocked: bool,
    ) -> Result<MembershipRecord, LifecycleError> {
        let mut record = self.ensure_record(member, community)?;

        if record.status == MembershipStatus::Verified {
            return Err(LifecycleError::AlreadyVerified);
        }

        record.status = if blocked {
            MembershipStatus::Flagged
        } else {
            MembershipStatus::Verified
        };
        record.handle = Some(identity.handle.clone());
        record.record_id = Some(identity.record_id.clone());
        record.orgs = Some(identity.orgs.clone());
        record.account_created = Some(identity.account_created.clone());
        record.verified_at = Some(Timestamp::now());

        self.store.update_membership(&record)?;
        Ok(record)
    }

    /// Manually revoke a membership back to pending.
    ///
    /// Clears every identity field and re-anchors the timeout clock. The
    /// caller is responsible for retracting any granted role.
    pub fn revoke(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<MembershipRecord, LifecycleError> {
        let mut record = self
            .store
            .get_membership(member, community)?
            .ok_or(LifecycleError::NotFound)?;

        record.status = MembershipStatus::Pending;
        record.clear_identity();
        record.joined_at = Timestamp::now();
        record.kicked_at = None;

        self.store.update_membership(&record)?;
        Ok(record)
    }

    /// Mark a membership as kicked. Idempotent.
    pub fn mark_kicked(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<MembershipRecord, LifecycleError> {
        let mut record = self
            .store
            .get_membership(member, community)?
            .ok_or(LifecycleError::NotFound)?;

        if record.status == MembershipStatus::Kicked {
            return Ok(record);
        }

        record.status = MembershipStatus::Kicked;
        record.kicked_at = Some(Timestamp::now());

        self.store.update_membership(&record)?;
        Ok(record)
    }

    /// Look up a record by member
    pub fn lookup(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<Option<MembershipRecord>, LifecycleError> {
        Ok(self.store.get_membership(member, community)?)
    }

    /// Look up a record by linked handle
    pub fn lookup_by_handle(
        &self,
        community: &CommunityId,
        handle: &str,
    ) -> Result<Option<MembershipRecord>, LifecycleError> {
        Ok(self.store.find_by_handle(community, handle)?)
    }

    /// Aggregate counts by status for one community
    pub fn status_counts(&self, community: &CommunityId) -> Result<StatusCounts, LifecycleError> {
        Ok(self.store.status_counts(community)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_membership::record::OrgAffiliation;

    fn setup() -> (MembershipLifecycle, MemberId, CommunityId) {
        let store = Arc::new(MembershipStore::memory().unwrap());
        (
            MembershipLifecycle::new(store),
            MemberId::new("m1"),
            CommunityId::new("c1"),
        )
    }

    fn identity(handle: &str) -> ExternalIdentity {
        ExternalIdentity {
            handle: handle.to_string(),
            record_id: "12345".to_string(),
            orgs: vec![OrgAffiliation {
                name: "Galactic Net".to_string(),
                tag: "GNET".to_string(),
                rank: "Member".to_string(),
            }],
            account_created: "2020-06-01".to_string(),
        }
    }

    #[test]
    fn test_ensure_record_is_idempotent() {
        let (lifecycle, member, community) = setup();

        let first = lifecycle.ensure_record(&member, &community).unwrap();
        let second = lifecycle.ensure_record(&member, &community).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, MembershipStatus::Pending);
    }

    #[test]
    fn test_record_join_resets_kicked_record() {
        let (lifecycle, member, community) = setup();

        lifecycle.ensure_record(&member, &community).unwrap();
        lifecycle.mark_kicked(&member, &community).unwrap();

        let rejoined = lifecycle.record_join(&member, &community).unwrap();
        assert_eq!(rejoined.status, MembershipStatus::Pending);
        assert!(rejoined.kicked_at.is_none());
    }

    #[test]
    fn test_apply_identity_result_verified() {
        let (lifecycle, member, community) = setup();
        lifecycle.ensure_record(&member, &community).unwrap();

        let record = lifecycle
            .apply_identity_result(&member, &community, &identity("StarRunner"), false)
            .unwrap();

        assert_eq!(record.status, MembershipStatus::Verified);
        assert_eq!(record.handle.as_deref(), Some("StarRunner"));
        assert!(record.verified_at.is_some());
    }

    #[test]
    fn test_apply_identity_result_flagged() {
        let (lifecycle, member, community) = setup();

        let record = lifecycle
            .apply_identity_result(&member, &community, &identity("StarRunner"), true)
            .unwrap();

        assert_eq!(record.status, MembershipStatus::Flagged);
        // Flagged records still carry the linked identity
        assert_eq!(record.handle.as_deref(), Some("StarRunner"));
    }

    #[test]
    fn test_double_verification_rejected() {
        let (lifecycle, member, community) = setup();

        lifecycle
            .apply_identity_result(&member, &community, &identity("StarRunner"), false)
            .unwrap();

        let result =
            lifecycle.apply_identity_result(&member, &community, &identity("Other"), false);
        assert!(matches!(result, Err(LifecycleError::AlreadyVerified)));

        // A flagged record may be re-linked (moderator asked for a retry)
        let (lifecycle, member, community) = setup();
        lifecycle
            .apply_identity_result(&member, &community, &identity("StarRunner"), true)
            .unwrap();
        let again = lifecycle
            .apply_identity_result(&member, &community, &identity("StarRunner"), false)
            .unwrap();
        assert_eq!(again.status, MembershipStatus::Verified);
    }

    #[test]
    fn test_revoke_clears_identity_and_reanchors_clock() {
        let (lifecycle, member, community) = setup();

        let verified = lifecycle
            .apply_identity_result(&member, &community, &identity("StarRunner"), false)
            .unwrap();

        let revoked = lifecycle.revoke(&member, &community).unwrap();
        assert_eq!(revoked.status, MembershipStatus::Pending);
        assert!(revoked.handle.is_none());
        assert!(revoked.record_id.is_none());
        assert!(revoked.orgs.is_none());
        assert!(revoked.verified_at.is_none());
        assert!(revoked.joined_at >= verified.joined_at);
    }

    #[test]
    fn test_revoke_missing_record() {
        let (lifecycle, member, community) = setup();
        let result = lifecycle.revoke(&member, &community);
        assert!(matches!(result, Err(LifecycleError::NotFound)));
    }

    #[test]
    fn test_revoke_then_reverify_leaves_no_residue() {
        let (lifecycle, member, community) = setup();

        lifecycle
            .apply_identity_result(&member, &community, &identity("FirstHandle"), false)
            .unwrap();
        lifecycle.revoke(&member, &community).unwrap();

        let fresh = ExternalIdentity {
            handle: "SecondHandle".to_string(),
            record_id: "67890".to_string(),
            orgs: vec![],
            account_created: "2021-01-01".to_string(),
        };
        let record = lifecycle
            .apply_identity_result(&member, &community, &fresh, false)
            .unwrap();

        assert_eq!(record.status, MembershipStatus::Verified);
        assert_eq!(record.handle.as_deref(), Some("SecondHandle"));
        assert_eq!(record.record_id.as_deref(), Some("67890"));
        assert_eq!(record.orgs.as_deref(), Some(&[][..]));
        assert_eq!(record.account_created.as_deref(), Some("2021-01-01"));
    }

    #[test]
    fn test_mark_kicked_is_idempotent() {
        let (lifecycle, member, community) = setup();
        lifecycle.ensure_record(&member, &community).unwrap();

        let first = lifecycle.mark_kicked(&member, &community).unwrap();
        let kicked_at = first.kicked_at;
        assert_eq!(first.status, MembershipStatus::Kicked);
        assert!(kicked_at.is_some());

        let second = lifecycle.mark_kicked(&member, &community).unwrap();
        assert_eq!(second.kicked_at, kicked_at);
    }

    #[test]
    fn test_status_counts_via_lifecycle() {
        let (lifecycle, member, community) = setup();
        lifecycle.ensure_record(&member, &community).unwrap();
        lifecycle
            .apply_identity_result(&MemberId::new("m2"), &community, &identity("Other"), false)
            .unwrap();

        let counts = lifecycle.status_counts(&community).unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.verified, 1);
    }

    mod invariants {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Join,
            Verify(bool),
            Revoke,
            Kick,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::Join),
                any::<bool>().prop_map(Op::Verify),
                Just(Op::Revoke),
                Just(Op::Kick),
            ]
        }

        proptest! {
            // status = verified implies handle and verification timestamp
            // are present, no matter the order of operations
            #[test]
            fn verified_records_always_carry_identity(ops in prop::collection::vec(op_strategy(), 1..24)) {
                let store = Arc::new(MembershipStore::memory().unwrap());
                let lifecycle = MembershipLifecycle::new(store.clone());
                let member = MemberId::new("m1");
                let community = CommunityId::new("c1");

                for op in ops {
                    let _ = match op {
                        Op::Join => lifecycle.record_join(&member, &community).map(|_| ()),
                        Op::Verify(blocked) => lifecycle
                            .apply_identity_result(&member, &community, &identity("StarRunner"), blocked)
                            .map(|_| ()),
                        Op::Revoke => lifecycle.revoke(&member, &community).map(|_| ()),
                        Op::Kick => lifecycle.mark_kicked(&member, &community).map(|_| ()),
                    };

                    if let Some(record) = store.get_membership(&member, &community).unwrap() {
                        if record.status == MembershipStatus::Verified {
                            prop_assert!(record.handle.is_some());
                            prop_assert!(record.verified_at.is_some());
                        }
                        if record.status == MembershipStatus::Pending {
                            prop_assert!(record.kicked_at.is_none());
                        }
                    }
                }
            }
        }
    }
}
