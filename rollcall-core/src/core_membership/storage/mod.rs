//! Storage layer for the membership subsystem
//!
//! Provides SQL-based persistence for membership records, per-community
//! configuration and in-flight link states.

pub mod migrations;
pub mod sql_store;

pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::{MembershipStore, StatusCounts, StorageError};
