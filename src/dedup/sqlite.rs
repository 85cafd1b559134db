//! SQLite-backed dedup tracking for incremental collection across runs.
//!
//! Writes are buffered in memory and committed by `save` (and on drop), so
//! a crash mid-run loses at most the current run's pending marks, never
//! previously committed state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};

use super::DedupStore;
use crate::error::Result;

/// Persistent tracker with an in-memory cache over a SQLite store.
pub struct SqliteDedup {
    conn: Connection,
    path: PathBuf,
    seen: HashSet<String>,
    last_run: Option<DateTime<Utc>>,
    pending_ids: Vec<(String, DateTime<Utc>)>,
    pending_runs: Vec<DateTime<Utc>>,
}

impl SqliteDedup {
    /// Open (creating if necessary) the store at `path` and load its state.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS seen_ads (
                id TEXT PRIMARY KEY,
                first_seen TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS collection_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_at TEXT NOT NULL
            );",
        )?;

        let mut store = Self {
            conn,
            path,
            seen: HashSet::new(),
            last_run: None,
            pending_ids: Vec::new(),
            pending_runs: Vec::new(),
        };
        store.reload()?;
        Ok(store)
    }

    fn reload(&mut self) -> Result<()> {
        self.seen.clear();
        {
            let mut stmt = self.conn.prepare("SELECT id FROM seen_ads")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                self.seen.insert(row?);
            }
        }

        self.last_run = self
            .conn
            .query_row(
                "SELECT run_at FROM collection_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        debug!(
            seen = self.seen.len(),
            path = %self.path.display(),
            "loaded dedup state"
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending_ids.is_empty() && self.pending_runs.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for (ad_id, first_seen) in self.pending_ids.drain(..) {
            tx.execute(
                "INSERT OR IGNORE INTO seen_ads (id, first_seen) VALUES (?1, ?2)",
                (&ad_id, first_seen.to_rfc3339()),
            )?;
        }
        for run_at in self.pending_runs.drain(..) {
            tx.execute(
                "INSERT INTO collection_runs (run_at) VALUES (?1)",
                (run_at.to_rfc3339(),),
            )?;
        }
        tx.commit()?;
        debug!(path = %self.path.display(), "dedup state saved");
        Ok(())
    }
}

#[async_trait]
impl DedupStore for SqliteDedup {
    async fn has_seen(&mut self, ad_id: &str) -> Result<bool> {
        Ok(self.seen.contains(ad_id))
    }

    async fn mark_seen(&mut self, ad_id: &str) -> Result<()> {
        if self.seen.insert(ad_id.to_string()) {
            self.pending_ids.push((ad_id.to_string(), Utc::now()));
        }
        Ok(())
    }

    async fn last_collection_time(&mut self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.last_run)
    }

    async fn update_collection_time(&mut self) -> Result<()> {
        let now = Utc::now();
        self.pending_runs.push(now);
        self.last_run = Some(now);
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        self.flush()
    }

    async fn load(&mut self) -> Result<()> {
        self.reload()
    }

    async fn count(&mut self) -> Result<u64> {
        Ok(self.seen.len() as u64)
    }

    async fn clear(&mut self) -> Result<()> {
        self.pending_ids.clear();
        self.pending_runs.clear();
        self.seen.clear();
        self.last_run = None;
        self.conn.execute("DELETE FROM seen_ads", [])?;
        self.conn.execute("DELETE FROM collection_runs", [])?;
        Ok(())
    }
}

impl Drop for SqliteDedup {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush dedup state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.db");

        {
            let mut store = SqliteDedup::open(&path).unwrap();
            store.mark_seen("a1").await.unwrap();
            store.mark_seen("a2").await.unwrap();
            store.update_collection_time().await.unwrap();
            store.save().await.unwrap();
        }

        let mut store = SqliteDedup::open(&path).unwrap();
        assert!(store.has_seen("a1").await.unwrap());
        assert!(store.has_seen("a2").await.unwrap());
        assert!(!store.has_seen("a3").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.last_collection_time().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn drop_flushes_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.db");

        {
            let mut store = SqliteDedup::open(&path).unwrap();
            store.mark_seen("a1").await.unwrap();
            // No explicit save: Drop must flush.
        }

        let mut store = SqliteDedup::open(&path).unwrap();
        assert!(store.has_seen("a1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_marks_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.db");

        let mut store = SqliteDedup::open(&path).unwrap();
        store.mark_seen("a1").await.unwrap();
        store.mark_seen("a1").await.unwrap();
        store.save().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn last_run_is_maximum_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.db");

        let mut store = SqliteDedup::open(&path).unwrap();
        assert!(store.last_collection_time().await.unwrap().is_none());
        store.update_collection_time().await.unwrap();
        let first = store.last_collection_time().await.unwrap().unwrap();
        store.update_collection_time().await.unwrap();
        let second = store.last_collection_time().await.unwrap().unwrap();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn clear_removes_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.db");

        {
            let mut store = SqliteDedup::open(&path).unwrap();
            store.mark_seen("a1").await.unwrap();
            store.save().await.unwrap();
            store.clear().await.unwrap();
        }

        let mut store = SqliteDedup::open(&path).unwrap();
        assert!(!store.has_seen("a1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
