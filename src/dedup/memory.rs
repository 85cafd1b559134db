//! In-process dedup tracking. Fast, state dies with the process.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DedupStore;
use crate::error::Result;

/// Set-backed tracker for single-run deduplication.
#[derive(Debug, Default)]
pub struct MemoryDedup {
    seen: HashSet<String>,
    last_run: Option<DateTime<Utc>>,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for MemoryDedup {
    async fn has_seen(&mut self, ad_id: &str) -> Result<bool> {
        Ok(self.seen.contains(ad_id))
    }

    async fn mark_seen(&mut self, ad_id: &str) -> Result<()> {
        self.seen.insert(ad_id.to_string());
        Ok(())
    }

    async fn last_collection_time(&mut self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.last_run)
    }

    async fn update_collection_time(&mut self) -> Result<()> {
        self.last_run = Some(Utc::now());
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        Ok(())
    }

    async fn load(&mut self) -> Result<()> {
        Ok(())
    }

    async fn count(&mut self) -> Result<u64> {
        Ok(self.seen.len() as u64)
    }

    async fn clear(&mut self) -> Result<()> {
        self.seen.clear();
        self.last_run = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_then_has_seen() {
        let mut store = MemoryDedup::new();
        assert!(!store.has_seen("a1").await.unwrap());
        store.mark_seen("a1").await.unwrap();
        assert!(store.has_seen("a1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn collection_time_updates() {
        let mut store = MemoryDedup::new();
        assert!(store.last_collection_time().await.unwrap().is_none());
        store.update_collection_time().await.unwrap();
        assert!(store.last_collection_time().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let mut store = MemoryDedup::new();
        store.mark_seen("a1").await.unwrap();
        store.update_collection_time().await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.has_seen("a1").await.unwrap());
        assert!(store.last_collection_time().await.unwrap().is_none());
    }
}
