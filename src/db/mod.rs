//! Database layer (SQLite).

pub mod sqlite;

pub use sqlite::SqliteDb;

/// Table names as constants.
pub mod tables {
    pub const TOKENS: &str = "tokens";
    // Record tables are named per domain, see `Domain::table`.
}
