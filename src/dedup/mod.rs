//! Deduplication tracking for incremental collection.
//!
//! One store contract with two interchangeable backings: in-memory
//! (single-run) and SQLite (survives across process restarts, enabling
//! incremental collection between scheduled runs).

mod memory;
mod sqlite;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;

pub use memory::MemoryDedup;
pub use sqlite::SqliteDedup;

/// Shared handle to a dedup store. May be shared between collectors; the
/// mutex serializes access, which is all the contract guarantees.
pub type SharedDedup = Arc<Mutex<dyn DedupStore + Send>>;

/// Contract for dedup store backings.
///
/// `has_seen(x)` after `mark_seen(x)` is always true within the lifetime of
/// the store; persistent backings extend the guarantee across restarts.
#[async_trait]
pub trait DedupStore {
    /// Whether `ad_id` has been recorded previously.
    async fn has_seen(&mut self, ad_id: &str) -> Result<bool>;

    /// Record `ad_id` as seen.
    async fn mark_seen(&mut self, ad_id: &str) -> Result<()>;

    /// Timestamp of the most recent completed collection run, if any.
    async fn last_collection_time(&mut self) -> Result<Option<DateTime<Utc>>>;

    /// Record the current instant as the latest collection run.
    async fn update_collection_time(&mut self) -> Result<()>;

    /// Commit pending writes. No-op for the in-memory backing.
    async fn save(&mut self) -> Result<()>;

    /// Rebuild in-memory caches from the backing store. No-op in memory
    /// mode.
    async fn load(&mut self) -> Result<()>;

    /// Number of unique ids seen.
    async fn count(&mut self) -> Result<u64>;

    /// Remove all tracked state.
    async fn clear(&mut self) -> Result<()>;
}

/// In-memory tracker handle.
pub fn memory() -> SharedDedup {
    Arc::new(Mutex::new(MemoryDedup::new()))
}

/// SQLite-backed tracker handle at `path`.
pub fn persistent(path: impl AsRef<Path>) -> Result<SharedDedup> {
    Ok(Arc::new(Mutex::new(SqliteDedup::open(path)?)))
}
