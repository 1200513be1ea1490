//! SQL-based storage for membership records, community config and link states

use super::super::community::CommunityConfig;
use super::super::record::{MembershipRecord, MembershipStatus, OrgAffiliation};
use super::super::types::{ChannelId, CommunityId, MemberId, RoleId, Timestamp};
use crate::core_link::token::LinkState;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;

/// Errors surfaced by the membership store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Aggregate membership counts for one community
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub verified: u64,
    pub kicked: u64,
    pub flagged: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.verified + self.kicked + self.flagged
    }
}

/// SQL-based store backing the membership lifecycle
#[derive(Clone)]
pub struct MembershipStore {
    pool: Pool<SqliteConnectionManager>,
}

impl MembershipStore {
    /// Create a new store with the given connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StorageError> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open a file-backed store, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Pool(format!("Failed to create data dir: {}", e)))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        });
        let pool = Pool::new(manager).map_err(|e| StorageError::Pool(e.to_string()))?;

        Self::new(pool)
    }

    /// Create a new in-memory store (for testing)
    pub fn memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Pool(e.to_string()))?;

        Self::new(pool)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool.get().map_err(|e| StorageError::Pool(e.to_string()))
    }

    // ===== Membership Operations =====

    /// Insert a new membership record
    pub fn insert_membership(&self, record: &MembershipRecord) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO memberships (member_id, community_id, status, handle, record_id,
                 orgs, account_created, verified_at, joined_at, kicked_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.member.as_str(),
                record.community.as_str(),
                record.status.as_str(),
                &record.handle,
                &record.record_id,
                encode_orgs(&record.orgs)?,
                &record.account_created,
                record.verified_at.map(|t| t.as_millis() as i64),
                record.joined_at.as_millis() as i64,
                record.kicked_at.map(|t| t.as_millis() as i64),
            ],
        )?;

        Ok(())
    }

    /// Overwrite an existing membership record
    pub fn update_membership(&self, record: &MembershipRecord) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let rows = conn.execute(
            "UPDATE memberships SET status = ?, handle = ?, record_id = ?, orgs = ?,
                 account_created = ?, verified_at = ?, joined_at = ?, kicked_at = ?
             WHERE member_id = ? AND community_id = ?",
            params![
                record.status.as_str(),
                &record.handle,
                &record.record_id,
                encode_orgs(&record.orgs)?,
                &record.account_created,
                record.verified_at.map(|t| t.as_millis() as i64),
                record.joined_at.as_millis() as i64,
                record.kicked_at.map(|t| t.as_millis() as i64),
                record.member.as_str(),
                record.community.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(StorageError::Corrupt(format!(
                "No membership row for {}/{}",
                record.member, record.community
            )));
        }

        Ok(())
    }

    /// Get a membership record by (member, community)
    pub fn get_membership(
        &self,
        member: &MemberId,
        community: &CommunityId,
    ) -> Result<Option<MembershipRecord>, StorageError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT member_id, community_id, status, handle, record_id, orgs,
                        account_created, verified_at, joined_at, kicked_at
                 FROM memberships WHERE member_id = ? AND community_id = ?",
                params![member.as_str(), community.as_str()],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    /// Find a membership in a community by linked handle
    pub fn find_by_handle(
        &self,
        community: &CommunityId,
        handle: &str,
    ) -> Result<Option<MembershipRecord>, StorageError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT member_id, community_id, status, handle, record_id, orgs,
                        account_created, verified_at, joined_at, kicked_at
                 FROM memberships WHERE community_id = ? AND handle = ?",
                params![community.as_str(), handle],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    /// All records currently pending, across every community
    pub fn list_pending(&self) -> Result<Vec<MembershipRecord>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT member_id, community_id, status, handle, record_id, orgs,
                    account_created, verified_at, joined_at, kicked_at
             FROM memberships WHERE status = 'pending' ORDER BY joined_at",
        )?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Membership counts by status for one community
    pub fn status_counts(&self, community: &CommunityId) -> Result<StatusCounts, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM memberships WHERE community_id = ? GROUP BY status",
        )?;

        let mut counts = StatusCounts::default();
        let rows = stmt.query_map(params![community.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            match MembershipStatus::from_str(&status) {
                Some(MembershipStatus::Pending) => counts.pending = count,
                Some(MembershipStatus::Verified) => counts.verified = count,
                Some(MembershipStatus::Kicked) => counts.kicked = count,
                Some(MembershipStatus::Flagged) => counts.flagged = count,
                None => return Err(StorageError::Corrupt(format!("Unknown status: {}", status))),
            }
        }

        Ok(counts)
    }

    // ===== Community Config Operations =====

    /// Get the stored configuration for a community, if any
    pub fn get_community_config(
        &self,
        community: &CommunityId,
    ) -> Result<Option<CommunityConfig>, StorageError> {
        let conn = self.conn()?;

        let config = conn
            .query_row(
                "SELECT community_id, timeout_hours, blocklist, log_channel_id,
                        verified_role_id, rally_role_id, rally_channel_id,
                        rally_allowed_roles, rally_trigger_channels,
                        verification_enabled, rally_enabled
                 FROM community_config WHERE community_id = ?",
                params![community.as_str()],
                row_to_config,
            )
            .optional()?;

        Ok(config)
    }

    /// Stored configuration or defaults when no row exists
    pub fn community_config_or_default(
        &self,
        community: &CommunityId,
    ) -> Result<CommunityConfig, StorageError> {
        Ok(self
            .get_community_config(community)?
            .unwrap_or_else(|| CommunityConfig::defaults(community.clone())))
    }

    /// Get the configuration row, creating a defaults row on first access
    pub fn ensure_community_config(
        &self,
        community: &CommunityId,
    ) -> Result<CommunityConfig, StorageError> {
        if let Some(config) = self.get_community_config(community)? {
            return Ok(config);
        }

        let config = CommunityConfig::defaults(community.clone());
        self.put_community_config(&config)?;
        Ok(config)
    }

    /// Write a configuration row (insert or replace)
    pub fn put_community_config(&self, config: &CommunityConfig) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let blocklist = serde_json::to_string(&config.blocklist)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let allowed_roles = serde_json::to_string(
            &config
                .rally_allowed_roles
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>(),
        )
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let trigger_channels = serde_json::to_string(
            &config
                .rally_trigger_channels
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
        )
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO community_config
                 (community_id, timeout_hours, blocklist, log_channel_id, verified_role_id,
                  rally_role_id, rally_channel_id, rally_allowed_roles,
                  rally_trigger_channels, verification_enabled, rally_enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                config.community.as_str(),
                config.timeout_hours,
                blocklist,
                config.log_channel.as_ref().map(|c| c.as_str()),
                config.verified_role.as_ref().map(|r| r.as_str()),
                config.rally_role.as_ref().map(|r| r.as_str()),
                config.rally_channel.as_ref().map(|c| c.as_str()),
                allowed_roles,
                trigger_channels,
                config.verification_enabled as i64,
                config.rally_enabled as i64,
            ],
        )?;

        Ok(())
    }

    // ===== Link State Operations =====

    /// Persist a correlation token for an in-flight link attempt
    pub fn insert_link_state(&self, link: &LinkState) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO link_states (state, member_id, community_id, created_at)
             VALUES (?, ?, ?, ?)",
            params![
                &link.state,
                link.member.as_str(),
                link.community.as_str(),
                link.created_at.as_millis() as i64,
            ],
        )?;

        Ok(())
    }

    /// Consume a correlation token: returns the row and deletes it.
    ///
    /// Deletion happens whether or not the caller's downstream exchange
    /// succeeds, which is what makes the token single-use. Delete-returning
    /// keeps two concurrent callbacks from both winning the row.
    pub fn take_link_state(&self, state: &str) -> Result<Option<LinkState>, StorageError> {
        let conn = self.conn()?;

        let link = conn
            .query_row(
                "DELETE FROM link_states WHERE state = ?
                 RETURNING state, member_id, community_id, created_at",
                params![state],
                |row| {
                    Ok(LinkState {
                        state: row.get(0)?,
                        member: MemberId::new(row.get::<_, String>(1)?),
                        community: CommunityId::new(row.get::<_, String>(2)?),
                        created_at: Timestamp::from_millis(row.get::<_, i64>(3)?.max(0) as u64),
                    })
                },
            )
            .optional()?;

        Ok(link)
    }

    /// Drop correlation tokens issued before the cutoff
    pub fn purge_link_states_before(&self, cutoff: Timestamp) -> Result<usize, StorageError> {
        let conn = self.conn()?;

        let rows = conn.execute(
            "DELETE FROM link_states WHERE created_at < ?",
            params![cutoff.as_millis() as i64],
        )?;

        Ok(rows)
    }
}

fn encode_orgs(orgs: &Option<Vec<OrgAffiliation>>) -> Result<Option<String>, StorageError> {
    orgs.as_ref()
        .map(|o| serde_json::to_string(o).map_err(|e| StorageError::Corrupt(e.to_string())))
        .transpose()
}

fn row_to_record(row: &Row) -> rusqlite::Result<MembershipRecord> {
    let status_str: String = row.get(2)?;
    let status = MembershipStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("Unknown status: {}", status_str).into(),
        )
    })?;

    let orgs: Option<String> = row.get(5)?;
    let orgs = orgs
        .map(|json| {
            serde_json::from_str::<Vec<OrgAffiliation>>(&json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()?;

    Ok(MembershipRecord {
        member: MemberId::new(row.get::<_, String>(0)?),
        community: CommunityId::new(row.get::<_, String>(1)?),
        status,
        handle: row.get(3)?,
        record_id: row.get(4)?,
        orgs,
        account_created: row.get(6)?,
        verified_at: row
            .get::<_, Option<i64>>(7)?
            .map(|t| Timestamp::from_millis(t.max(0) as u64)),
        joined_at: Timestamp::from_millis(row.get::<_, i64>(8)?.max(0) as u64),
        kicked_at: row
            .get::<_, Option<i64>>(9)?
            .map(|t| Timestamp::from_millis(t.max(0) as u64)),
    })
}

fn row_to_config(row: &Row) -> rusqlite::Result<CommunityConfig> {
    let blocklist: String = row.get(2)?;
    let blocklist: Vec<String> = serde_json::from_str(&blocklist).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let allowed_roles: String = row.get(7)?;
    let allowed_roles: Vec<String> = serde_json::from_str(&allowed_roles).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let trigger_channels: String = row.get(8)?;
    let trigger_channels: Vec<String> = serde_json::from_str(&trigger_channels).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CommunityConfig {
        community: CommunityId::new(row.get::<_, String>(0)?),
        timeout_hours: row.get::<_, i64>(1)?.max(0) as u32,
        blocklist,
        log_channel: row.get::<_, Option<String>>(3)?.map(ChannelId::new),
        verified_role: row.get::<_, Option<String>>(4)?.map(RoleId::new),
        rally_role: row.get::<_, Option<String>>(5)?.map(RoleId::new),
        rally_channel: row.get::<_, Option<String>>(6)?.map(ChannelId::new),
        rally_allowed_roles: allowed_roles.into_iter().map(RoleId::new).collect(),
        rally_trigger_channels: trigger_channels.into_iter().map(ChannelId::new).collect(),
        verification_enabled: row.get::<_, i64>(9)? != 0,
        rally_enabled: row.get::<_, i64>(10)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_record(member: &str, community: &str, joined_at: u64) -> MembershipRecord {
        MembershipRecord::new_pending(
            MemberId::new(member),
            CommunityId::new(community),
            Timestamp::from_millis(joined_at),
        )
    }

    #[test]
    fn test_insert_and_get_membership() {
        let store = MembershipStore::memory().unwrap();
        let record = pending_record("m1", "c1", 1_000);

        store.insert_membership(&record).unwrap();
        let loaded = store
            .get_membership(&record.member, &record.community)
            .unwrap()
            .expect("record should exist");

        assert_eq!(loaded, record);
    }

    #[test]
    fn test_get_missing_membership() {
        let store = MembershipStore::memory().unwrap();
        let result = store
            .get_membership(&MemberId::new("nobody"), &CommunityId::new("c1"))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_duplicate_membership_rejected() {
        let store = MembershipStore::memory().unwrap();
        let record = pending_record("m1", "c1", 1_000);

        store.insert_membership(&record).unwrap();
        assert!(store.insert_membership(&record).is_err());
    }

    #[test]
    fn test_update_membership_round_trip() {
        let store = MembershipStore::memory().unwrap();
        let mut record = pending_record("m1", "c1", 1_000);
        store.insert_membership(&record).unwrap();

        record.status = MembershipStatus::Verified;
        record.handle = Some("StarRunner".to_string());
        record.record_id = Some("42".to_string());
        record.orgs = Some(vec![OrgAffiliation {
            name: "Galactic Net".to_string(),
            tag: "GNET".to_string(),
            rank: "Recruit".to_string(),
        }]);
        record.verified_at = Some(Timestamp::from_millis(2_000));
        store.update_membership(&record).unwrap();

        let loaded = store
            .get_membership(&record.member, &record.community)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_list_pending_filters_status() {
        let store = MembershipStore::memory().unwrap();

        let pending = pending_record("m1", "c1", 1_000);
        store.insert_membership(&pending).unwrap();

        let mut verified = pending_record("m2", "c1", 1_000);
        verified.status = MembershipStatus::Verified;
        verified.handle = Some("Other".to_string());
        verified.verified_at = Some(Timestamp::from_millis(2_000));
        store.insert_membership(&verified).unwrap();

        let listed = store.list_pending().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].member, pending.member);
    }

    #[test]
    fn test_find_by_handle() {
        let store = MembershipStore::memory().unwrap();
        let mut record = pending_record("m1", "c1", 1_000);
        record.status = MembershipStatus::Verified;
        record.handle = Some("StarRunner".to_string());
        record.verified_at = Some(Timestamp::from_millis(2_000));
        store.insert_membership(&record).unwrap();

        let found = store
            .find_by_handle(&CommunityId::new("c1"), "StarRunner")
            .unwrap();
        assert_eq!(found.map(|r| r.member), Some(MemberId::new("m1")));

        let missing = store
            .find_by_handle(&CommunityId::new("c1"), "Unknown")
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_status_counts() {
        let store = MembershipStore::memory().unwrap();
        let community = CommunityId::new("c1");

        store.insert_membership(&pending_record("m1", "c1", 1_000)).unwrap();
        store.insert_membership(&pending_record("m2", "c1", 1_000)).unwrap();

        let mut kicked = pending_record("m3", "c1", 1_000);
        kicked.status = MembershipStatus::Kicked;
        kicked.kicked_at = Some(Timestamp::from_millis(9_000));
        store.insert_membership(&kicked).unwrap();

        // Other communities must not leak into the counts
        store.insert_membership(&pending_record("m1", "c2", 1_000)).unwrap();

        let counts = store.status_counts(&community).unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.kicked, 1);
        assert_eq!(counts.verified, 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_community_config_defaults_and_ensure() {
        let store = MembershipStore::memory().unwrap();
        let community = CommunityId::new("c1");

        assert!(store.get_community_config(&community).unwrap().is_none());

        let defaults = store.community_config_or_default(&community).unwrap();
        assert_eq!(defaults.timeout_hours, 72);
        // or_default must not create a row
        assert!(store.get_community_config(&community).unwrap().is_none());

        let ensured = store.ensure_community_config(&community).unwrap();
        assert_eq!(ensured, defaults);
        assert!(store.get_community_config(&community).unwrap().is_some());
    }

    #[test]
    fn test_community_config_round_trip() {
        let store = MembershipStore::memory().unwrap();
        let mut config = CommunityConfig::defaults(CommunityId::new("c1"));
        config.timeout_hours = 24;
        config.blocklist = vec!["GNET".to_string()];
        config.log_channel = Some(ChannelId::new("log-1"));
        config.verified_role = Some(RoleId::new("role-1"));
        config.rally_role = Some(RoleId::new("role-2"));
        config.rally_channel = Some(ChannelId::new("voice-1"));
        config.rally_allowed_roles = vec![RoleId::new("role-3")];
        config.rally_trigger_channels = vec![ChannelId::new("text-1")];
        config.verification_enabled = true;
        config.rally_enabled = false;

        store.put_community_config(&config).unwrap();
        let loaded = store.get_community_config(&config.community).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_link_state_is_single_use() {
        let store = MembershipStore::memory().unwrap();
        let link = LinkState {
            state: "abc123".to_string(),
            member: MemberId::new("m1"),
            community: CommunityId::new("c1"),
            created_at: Timestamp::from_millis(1_000),
        };

        store.insert_link_state(&link).unwrap();

        let taken = store.take_link_state("abc123").unwrap();
        assert_eq!(taken.as_ref().map(|l| l.member.clone()), Some(MemberId::new("m1")));

        // Second take finds nothing
        assert!(store.take_link_state("abc123").unwrap().is_none());
    }

    #[test]
    fn test_purge_link_states() {
        let store = MembershipStore::memory().unwrap();
        for (state, created) in [("old", 1_000u64), ("new", 10_000)] {
            store
                .insert_link_state(&LinkState {
                    state: state.to_string(),
                    member: MemberId::new("m1"),
                    community: CommunityId::new("c1"),
                    created_at: Timestamp::from_millis(created),
                })
                .unwrap();
        }

        let purged = store
            .purge_link_states_before(Timestamp::from_millis(5_000))
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.take_link_state("old").unwrap().is_none());
        assert!(store.take_link_state("new").unwrap().is_some());
    }
}
