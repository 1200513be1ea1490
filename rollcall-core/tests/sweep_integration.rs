//! Timeout sweep against a file-backed store
//!
//! Exercises the full join -> deadline -> kick journey the way the
//! running service does it, including the rejoin path afterwards.

use rollcall_core::core_membership::community::CommunityConfig;
use rollcall_core::core_membership::lifecycle::MembershipLifecycle;
use rollcall_core::core_membership::record::{MembershipRecord, MembershipStatus};
use rollcall_core::core_membership::storage::MembershipStore;
use rollcall_core::core_membership::types::{ChannelId, CommunityId, MemberId, Timestamp};
use rollcall_core::core_sweep::TimeoutSweeper;
use rollcall_core::gateway::MockGateway;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<MembershipStore>,
    gateway: Arc<MockGateway>,
    sweeper: TimeoutSweeper,
    lifecycle: MembershipLifecycle,
    _dir: tempfile::TempDir,
}

fn harness(timeout_hours: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MembershipStore::open(dir.path().join("sweep.db")).unwrap());
    let gateway = Arc::new(MockGateway::new());

    let mut config = CommunityConfig::defaults(CommunityId::new("c1"));
    config.timeout_hours = timeout_hours;
    config.log_channel = Some(ChannelId::new("audit"));
    store.put_community_config(&config).unwrap();

    let lifecycle = MembershipLifecycle::new(store.clone());
    let sweeper = TimeoutSweeper::new(store.clone(), lifecycle.clone(), gateway.clone())
        .with_interval(Duration::from_secs(15 * 60));

    Harness {
        store,
        gateway,
        sweeper,
        lifecycle,
        _dir: dir,
    }
}

fn age_record(store: &MembershipStore, member: &str, by: Duration) {
    let mut record = store
        .get_membership(&MemberId::new(member), &CommunityId::new("c1"))
        .unwrap()
        .unwrap();
    record.joined_at = record.joined_at.sub_duration(by);
    store.update_membership(&record).unwrap();
}

#[tokio::test]
async fn test_join_then_deadline_then_rejoin() {
    let h = harness(1);
    let member = MemberId::new("m1");
    let community = CommunityId::new("c1");

    h.lifecycle.record_join(&member, &community).unwrap();

    // Fresh joiner is untouched
    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.examined, 1);
    assert_eq!(report.kicked, 0);

    // 61 minutes later the deadline has passed
    age_record(&h.store, "m1", Duration::from_secs(61 * 60));
    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.kicked, 1);

    let record = h.store.get_membership(&member, &community).unwrap().unwrap();
    assert_eq!(record.status, MembershipStatus::Kicked);
    assert!(record.kicked_at.is_some());
    assert_eq!(h.gateway.removed().len(), 1);

    // The audit entry names the configured timeout
    let audits = h.gateway.channel_messages();
    assert_eq!(audits.len(), 1);
    assert!(audits[0].1.contains("1 hours"));

    // Rejoin resets the clock and the kicked marker
    h.lifecycle.record_join(&member, &community).unwrap();
    let record = h.store.get_membership(&member, &community).unwrap().unwrap();
    assert_eq!(record.status, MembershipStatus::Pending);
    assert!(record.kicked_at.is_none());

    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.kicked, 0);
}

#[tokio::test]
async fn test_kicked_records_are_not_reswept() {
    let h = harness(1);
    h.lifecycle
        .record_join(&MemberId::new("m1"), &CommunityId::new("c1"))
        .unwrap();
    age_record(&h.store, "m1", Duration::from_secs(2 * 3600));

    let first = h.sweeper.sweep_once().await;
    assert_eq!(first.kicked, 1);

    // Kicked records are no longer pending, so the next sweep sees nothing
    let second = h.sweeper.sweep_once().await;
    assert_eq!(second.examined, 0);
    assert_eq!(h.gateway.removed().len(), 1);
}

#[tokio::test]
async fn test_transient_failure_retried_next_sweep() {
    let h = harness(1);
    h.lifecycle
        .record_join(&MemberId::new("m1"), &CommunityId::new("c1"))
        .unwrap();
    age_record(&h.store, "m1", Duration::from_secs(2 * 3600));

    h.gateway.set_unavailable(true);
    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.kicked, 0);

    // The outage clears; the next sweep finishes the job
    h.gateway.set_unavailable(false);
    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.kicked, 1);

    let record = h
        .store
        .get_membership(&MemberId::new("m1"), &CommunityId::new("c1"))
        .unwrap()
        .unwrap();
    assert_eq!(record.status, MembershipStatus::Kicked);
}

#[tokio::test]
async fn test_verified_member_never_kicked() {
    let h = harness(1);
    let member = MemberId::new("m1");
    let community = CommunityId::new("c1");

    // Insert a long-overdue record, then verify it before the sweep runs
    let record = MembershipRecord::new_pending(
        member.clone(),
        community.clone(),
        Timestamp::now().sub_duration(Duration::from_secs(10 * 3600)),
    );
    h.store.insert_membership(&record).unwrap();

    h.lifecycle
        .apply_identity_result(
            &member,
            &community,
            &rollcall_core::core_membership::record::ExternalIdentity {
                handle: "StarRunner".to_string(),
                record_id: "1".to_string(),
                orgs: vec![],
                account_created: "2020-01-01".to_string(),
            },
            false,
        )
        .unwrap();

    let report = h.sweeper.sweep_once().await;
    assert_eq!(report.examined, 0);
    assert!(h.gateway.removed().is_empty());
}
