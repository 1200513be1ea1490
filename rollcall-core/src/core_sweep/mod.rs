//! Timeout sweep
//!
//! Periodically walks every pending membership, kicks those past their
//! community's deadline and reminds those entering the final hour. Each
//! unit of work is isolated: one community's or one member's failure never
//! aborts the rest of the sweep. Sweeps never overlap; the run loop awaits
//! one sweep before the next tick fires.

use crate::core_membership::community::CommunityConfig;
use crate::core_membership::lifecycle::MembershipLifecycle;
use crate::core_membership::record::MembershipRecord;
use crate::core_membership::storage::MembershipStore;
use crate::core_membership::types::{CommunityId, Timestamp};
use crate::gateway::{Gateway, GatewayError};
use crate::shutdown::ShutdownCoordinator;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Time between sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Delay before the first sweep after startup
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// How far before the deadline the single reminder fires
const REMINDER_LEAD: Duration = Duration::from_secs(60 * 60);

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending memberships looked at
    pub examined: usize,
    /// Members removed (or found already gone) and marked kicked
    pub kicked: usize,
    /// Reminder notifications attempted
    pub reminded: usize,
    /// Units that failed and stay pending for the next sweep
    pub failed: usize,
}

/// What the sweep decided for one membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    /// Deadline passed; remove and mark kicked
    Expire,
    /// Inside the one-shot reminder window
    Remind,
    /// Nothing to do this sweep
    Wait,
}

enum UnitOutcome {
    Kicked,
    Reminded,
    Failed,
}

/// Decide what to do with a membership whose deadline is `remaining_ms`
/// away (negative when already past).
///
/// The reminder window is exactly one sweep interval wide, ending at the
/// one-hour mark. Wider would duplicate reminders across sweeps; narrower
/// could never fire when a sweep is delayed.
fn classify(remaining_ms: i64, sweep_interval: Duration) -> SweepAction {
    if remaining_ms <= 0 {
        return SweepAction::Expire;
    }

    let lead = REMINDER_LEAD.as_millis() as i64;
    let interval = sweep_interval.as_millis() as i64;
    if remaining_ms <= lead && remaining_ms > lead - interval {
        return SweepAction::Remind;
    }

    SweepAction::Wait
}

/// The recurring deadline enforcer
pub struct TimeoutSweeper {
    store: Arc<MembershipStore>,
    lifecycle: MembershipLifecycle,
    gateway: Arc<dyn Gateway>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(
        store: Arc<MembershipStore>,
        lifecycle: MembershipLifecycle,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            gateway,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the sweep interval (tests, staging)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run sweeps until shutdown. One shortly-delayed sweep at startup,
    /// then one per interval; missed ticks are skipped rather than
    /// stacked, so sweeps never overlap.
    pub async fn run(self: Arc<Self>, shutdown: Arc<ShutdownCoordinator>) {
        let mut rx = shutdown.subscribe();

        tokio::select! {
            _ = tokio::time::sleep(STARTUP_DELAY) => {
                self.sweep_once().await;
            }
            _ = rx.recv() => return,
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the startup sweep covered it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep_once().await;
                    if report.examined > 0 {
                        info!(
                            examined = report.examined,
                            kicked = report.kicked,
                            reminded = report.reminded,
                            failed = report.failed,
                            "Timeout sweep finished"
                        );
                    }
                }
                _ = rx.recv() => {
                    info!("Timeout sweeper stopping");
                    return;
                }
            }
        }
    }

    /// Execute one full sweep across every community
    pub async fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let pending = match self.store.list_pending() {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Could not load pending memberships");
                return report;
            }
        };

        if pending.is_empty() {
            return report;
        }

        let mut by_community: HashMap<CommunityId, Vec<MembershipRecord>> = HashMap::new();
        for record in pending {
            by_community
                .entry(record.community.clone())
                .or_default()
                .push(record);
        }

        for (community, records) in by_community {
            report.examined += records.len();

            // One config fetch per community per sweep
            let config = match self.store.community_config_or_default(&community) {
                Ok(config) => config,
                Err(e) => {
                    error!(%community, error = %e, "Could not load community config");
                    report.failed += records.len();
                    continue;
                }
            };

            let community_name = match self.gateway.community_name(&community).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(%community, error = %e, "Community unreachable, skipping sweep for it");
                    report.failed += records.len();
                    continue;
                }
            };

            let timeout_ms = config.timeout().as_millis() as i64;
            let now = Timestamp::now();
            let mut tasks: JoinSet<UnitOutcome> = JoinSet::new();

            for record in records {
                let remaining = timeout_ms - record.joined_at.elapsed_millis(now) as i64;

                match classify(remaining, self.interval) {
                    SweepAction::Expire => {
                        let gateway = self.gateway.clone();
                        let lifecycle = self.lifecycle.clone();
                        let config = config.clone();
                        let name = community_name.clone();
                        tasks.spawn(async move {
                            expire_membership(gateway, lifecycle, record, config, name).await
                        });
                    }
                    SweepAction::Remind => {
                        let gateway = self.gateway.clone();
                        let name = community_name.clone();
                        tasks.spawn(
                            async move { remind_membership(gateway, record, name).await },
                        );
                    }
                    SweepAction::Wait => {}
                }
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(UnitOutcome::Kicked) => report.kicked += 1,
                    Ok(UnitOutcome::Reminded) => report.reminded += 1,
                    Ok(UnitOutcome::Failed) => report.failed += 1,
                    Err(e) => {
                        error!(error = %e, "Sweep task panicked");
                        report.failed += 1;
                    }
                }
            }
        }

        counter!("sweep.examined").increment(report.examined as u64);
        counter!("sweep.kicked").increment(report.kicked as u64);
        counter!("sweep.reminded").increment(report.reminded as u64);
        counter!("sweep.failed").increment(report.failed as u64);
        histogram!("sweep.duration_ms").record(started.elapsed().as_millis() as f64);

        report
    }
}

/// Remove one member past the deadline and mark the record kicked.
///
/// A member the platform no longer knows counts as removed. Any other
/// gateway failure leaves the record pending so the next sweep retries.
async fn expire_membership(
    gateway: Arc<dyn Gateway>,
    lifecycle: MembershipLifecycle,
    record: MembershipRecord,
    config: CommunityConfig,
    community_name: String,
) -> UnitOutcome {
    let member = &record.member;
    let community = &record.community;

    // Best-effort notice; it must land before the removal cuts the channel
    let notice = format!(
        "You have been removed from {} for not completing game-account \
         verification within the required timeframe. You may rejoin and try again.",
        community_name
    );
    let _ = gateway.send_direct(member, &notice).await;

    match gateway
        .remove_member(community, member, "verification timeout")
        .await
    {
        Ok(()) => {}
        Err(GatewayError::MemberNotFound) => {
            // Already gone; absence is equivalent to removal
        }
        Err(e) => {
            warn!(%member, %community, error = %e, "Could not remove member, will retry");
            return UnitOutcome::Failed;
        }
    }

    if let Err(e) = lifecycle.mark_kicked(member, community) {
        error!(%member, %community, error = %e, "Removed member but could not mark record");
        return UnitOutcome::Failed;
    }

    info!(%member, %community, "Kicked member for verification timeout");

    if let Some(log_channel) = &config.log_channel {
        let audit = format!(
            "Kicked: {} did not verify a game account within {} hours.",
            member, config.timeout_hours
        );
        if let Err(e) = gateway.send_channel(community, log_channel, &audit).await {
            warn!(%community, error = %e, "Could not write removal audit entry");
        }
    }

    UnitOutcome::Kicked
}

/// Send the single final-hour reminder. Delivery failures are swallowed.
async fn remind_membership(
    gateway: Arc<dyn Gateway>,
    record: MembershipRecord,
    community_name: String,
) -> UnitOutcome {
    let text = format!(
        "Reminder: you have less than 1 hour left to verify your game \
         account in {} before being removed. Check your earlier message \
         for the verification link.",
        community_name
    );

    if let Err(e) = gateway.send_direct(&record.member, &text).await {
        warn!(member = %record.member, error = %e, "Could not deliver reminder");
    }

    UnitOutcome::Reminded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_membership::record::{MembershipRecord, MembershipStatus};
    use crate::core_membership::types::{ChannelId, MemberId};
    use crate::gateway::MockGateway;

    const MINUTE_MS: u64 = 60 * 1000;

    fn setup(timeout_hours: u32) -> (Arc<MembershipStore>, Arc<MockGateway>, TimeoutSweeper) {
        let store = Arc::new(MembershipStore::memory().unwrap());
        let gateway = Arc::new(MockGateway::new());

        let mut config = CommunityConfig::defaults(CommunityId::new("c1"));
        config.timeout_hours = timeout_hours;
        config.log_channel = Some(ChannelId::new("audit"));
        store.put_community_config(&config).unwrap();

        let sweeper = TimeoutSweeper::new(
            store.clone(),
            MembershipLifecycle::new(store.clone()),
            gateway.clone(),
        )
        .with_interval(Duration::from_secs(15 * 60));

        (store, gateway, sweeper)
    }

    fn insert_pending(store: &MembershipStore, member: &str, joined_minutes_ago: u64) {
        let record = MembershipRecord::new_pending(
            MemberId::new(member),
            CommunityId::new("c1"),
            Timestamp::now().sub_duration(Duration::from_secs(joined_minutes_ago * 60)),
        );
        store.insert_membership(&record).unwrap();
    }

    fn status_of(store: &MembershipStore, member: &str) -> MembershipRecord {
        store
            .get_membership(&MemberId::new(member), &CommunityId::new("c1"))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_classify_windows() {
        let interval = Duration::from_secs(15 * 60);

        assert_eq!(classify(0, interval), SweepAction::Expire);
        assert_eq!(classify(-5_000, interval), SweepAction::Expire);

        // (45, 60] minutes remaining is the reminder window
        assert_eq!(classify(50 * MINUTE_MS as i64, interval), SweepAction::Remind);
        assert_eq!(classify(60 * MINUTE_MS as i64, interval), SweepAction::Remind);
        assert_eq!(classify(45 * MINUTE_MS as i64 + 1, interval), SweepAction::Remind);

        // Outside it, wait
        assert_eq!(classify(45 * MINUTE_MS as i64, interval), SweepAction::Wait);
        assert_eq!(classify(65 * MINUTE_MS as i64, interval), SweepAction::Wait);
        assert_eq!(classify(61 * MINUTE_MS as i64, interval), SweepAction::Wait);
    }

    #[tokio::test]
    async fn test_expired_member_is_kicked() {
        let (store, gateway, sweeper) = setup(1);
        insert_pending(&store, "late", 61);
        insert_pending(&store, "fresh", 5);

        let report = sweeper.sweep_once().await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.kicked, 1);
        assert_eq!(report.failed, 0);

        let late = status_of(&store, "late");
        assert_eq!(late.status, MembershipStatus::Kicked);
        assert!(late.kicked_at.is_some());

        let fresh = status_of(&store, "fresh");
        assert_eq!(fresh.status, MembershipStatus::Pending);

        // Removal went out, audit entry written with the timeout value
        assert_eq!(gateway.removed().len(), 1);
        let audits = gateway.channel_messages();
        assert_eq!(audits.len(), 1);
        assert!(audits[0].1.contains("1 hours"));
    }

    #[tokio::test]
    async fn test_member_already_gone_still_marked_kicked() {
        let (store, gateway, sweeper) = setup(1);
        insert_pending(&store, "ghost", 61);
        gateway.mark_member_missing(&MemberId::new("ghost"));

        let report = sweeper.sweep_once().await;
        assert_eq!(report.kicked, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(status_of(&store, "ghost").status, MembershipStatus::Kicked);
        assert!(gateway.removed().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_outage_leaves_record_pending() {
        let (store, gateway, sweeper) = setup(1);
        insert_pending(&store, "late", 61);
        gateway.set_unavailable(true);

        let report = sweeper.sweep_once().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.kicked, 0);
        assert_eq!(status_of(&store, "late").status, MembershipStatus::Pending);
    }

    #[tokio::test]
    async fn test_reminder_window_fires_once() {
        let (store, gateway, sweeper) = setup(1);
        // 50 minutes remaining: inside (45, 60]
        insert_pending(&store, "soon", 10);
        // 55 minutes elapsed of a 2-hour timeout leaves 65 minutes:
        // outside the window
        let record = MembershipRecord::new_pending(
            MemberId::new("later"),
            CommunityId::new("c2"),
            Timestamp::now().sub_duration(Duration::from_secs(55 * 60)),
        );
        store.insert_membership(&record).unwrap();
        let mut c2 = CommunityConfig::defaults(CommunityId::new("c2"));
        c2.timeout_hours = 2;
        store.put_community_config(&c2).unwrap();

        let report = sweeper.sweep_once().await;
        assert_eq!(report.reminded, 1);

        let directs = gateway.direct_messages();
        assert_eq!(directs.len(), 1);
        assert_eq!(directs[0].0, MemberId::new("soon"));
        assert!(directs[0].1.contains("less than 1 hour"));
    }

    #[tokio::test]
    async fn test_no_duplicate_reminder_next_sweep() {
        let (store, gateway, sweeper) = setup(1);
        insert_pending(&store, "soon", 10);

        sweeper.sweep_once().await;
        assert_eq!(gateway.direct_messages().len(), 1);

        // Simulate the next sweep 15 minutes later by aging the record
        let mut record = status_of(&store, "soon");
        record.joined_at = record.joined_at.sub_duration(Duration::from_secs(15 * 60));
        store.update_membership(&record).unwrap();

        let report = sweeper.sweep_once().await;
        assert_eq!(report.reminded, 0);
        assert_eq!(gateway.direct_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_reminder_delivery_failure_swallowed() {
        let (store, gateway, sweeper) = setup(1);
        insert_pending(&store, "quiet", 10);
        gateway.disable_direct_for(&MemberId::new("quiet"));

        let report = sweeper.sweep_once().await;
        assert_eq!(report.reminded, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_default_timeout_without_config_row() {
        let store = Arc::new(MembershipStore::memory().unwrap());
        let gateway = Arc::new(MockGateway::new());
        let sweeper = TimeoutSweeper::new(
            store.clone(),
            MembershipLifecycle::new(store.clone()),
            gateway.clone(),
        );

        // 73 hours elapsed beats the 72-hour default
        let record = MembershipRecord::new_pending(
            MemberId::new("late"),
            CommunityId::new("unconfigured"),
            Timestamp::now().sub_duration(Duration::from_secs(73 * 3600)),
        );
        store.insert_membership(&record).unwrap();

        let report = sweeper.sweep_once().await;
        assert_eq!(report.kicked, 1);
    }

    #[tokio::test]
    async fn test_one_community_failure_isolated() {
        let (store, gateway, sweeper) = setup(1);
        insert_pending(&store, "late", 61);

        // A second community whose members are fine
        let record = MembershipRecord::new_pending(
            MemberId::new("fine"),
            CommunityId::new("c2"),
            Timestamp::now(),
        );
        store.insert_membership(&record).unwrap();

        let report = sweeper.sweep_once().await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.kicked, 1);
        assert_eq!(gateway.removed().len(), 1);
    }
}
