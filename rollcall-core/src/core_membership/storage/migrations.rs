//! Database migrations for the membership store
//!
//! Versioned migrations applied atomically and tracked in the
//! schema_version table.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial memberships, community config and link state schema",
        up_sql: r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            -- One row per (member, community) pair
            CREATE TABLE IF NOT EXISTS memberships (
                member_id TEXT NOT NULL,
                community_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK(status IN ('pending', 'verified', 'kicked', 'flagged')),
                handle TEXT,
                record_id TEXT,
                orgs TEXT,                      -- JSON array of affiliations
                account_created TEXT,
                verified_at INTEGER,
                joined_at INTEGER NOT NULL,
                kicked_at INTEGER,
                PRIMARY KEY (member_id, community_id)
            );

            CREATE INDEX IF NOT EXISTS idx_memberships_status ON memberships(status);
            CREATE INDEX IF NOT EXISTS idx_memberships_handle ON memberships(handle);

            -- Per-community settings; a missing row means all-defaults
            CREATE TABLE IF NOT EXISTS community_config (
                community_id TEXT PRIMARY KEY,
                timeout_hours INTEGER NOT NULL DEFAULT 72,
                blocklist TEXT NOT NULL DEFAULT '[]',       -- JSON array of org tags
                log_channel_id TEXT,
                verified_role_id TEXT,
                rally_role_id TEXT,
                rally_channel_id TEXT,
                rally_allowed_roles TEXT NOT NULL DEFAULT '[]',     -- JSON array of role ids
                rally_trigger_channels TEXT NOT NULL DEFAULT '[]',  -- JSON array of channel ids
                verification_enabled INTEGER NOT NULL DEFAULT 0,
                rally_enabled INTEGER NOT NULL DEFAULT 1
            );

            -- In-flight identity-link correlation tokens (single-use, 10 min)
            CREATE TABLE IF NOT EXISTS link_states (
                state TEXT PRIMARY KEY,
                member_id TEXT NOT NULL,
                community_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_link_states_created ON link_states(created_at);
        "#,
    }]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, rusqlite::Error> {
    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), rusqlite::Error> {
    let current_version = get_current_version(pool)?;
    let migrations = get_migrations();

    let pending: Vec<_> = migrations
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    for migration in pending {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.up_sql)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as i64;

        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now],
        )?;

        tx.commit()?;

        tracing::info!(
            version = migration.version,
            "Applied migration: {}",
            migration.description
        );
    }

    Ok(())
}
