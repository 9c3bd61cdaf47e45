//! Sync engine for pkgsync.
//!
//! [`sync::SyncEngine`] brings one package up to date from its registry's
//! adapter. [`dispatch::Dispatcher`] picks the names to sync and either runs
//! them inline or hands them to a [`queue::TaskQueue`]; [`queue::WorkerPool`]
//! drains that queue. [`lookup::Lookup`] serves reads and schedules syncs for
//! names the store does not have yet.

pub mod adapters;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod lookup;
pub mod queue;
pub mod repo_metadata;
pub mod sync;

#[cfg(test)]
mod test_utils;

pub use context::SyncContext;
pub use error::{SyncError, SyncResult};
