//! SQLite store for registries, packages, versions and dependencies.
//!
//! Queries live on the `*Repository` unit structs and take a plain
//! `&mut SqliteConnection`; [`connection::Database`] wraps a shared
//! connection for multi-threaded callers.

use chrono::{DateTime, SecondsFormat, Utc};

pub mod connection;
pub mod error;
pub mod migration;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::{Database, DbConnection};
pub use error::{DbError, Result};

/// Formats a timestamp the way every `*_at` column stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
