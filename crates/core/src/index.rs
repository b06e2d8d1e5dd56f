//! Authoritative placement metadata, kept in the hot tier.
//!
//! The `MetadataStore` abstraction stands in for the hot-tier database. The
//! index layers an advisory in-process cache over it: writes go to the store
//! first, reads fall through on miss, and tier probes always win over a stale
//! cache entry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::FsResult;
use crate::inode::now_millis;
use crate::tier::TierKind;

/// Placement record for one path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMetadata {
    pub tier: TierKind,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub last_access_ms: u64,
    pub access_count: u64,
}

impl TierMetadata {
    pub fn new(tier: TierKind, size: u64, content_hash: Option<String>) -> Self {
        TierMetadata { tier, size, content_hash, last_access_ms: now_millis(), access_count: 0 }
    }
}

/// Abstract hot-tier record store.
pub trait MetadataStore: Send + Sync {
    fn get(&self, path: &str) -> FsResult<Option<TierMetadata>>;
    fn set(&self, path: &str, meta: &TierMetadata) -> FsResult<()>;
    fn delete(&self, path: &str) -> FsResult<()>;
    /// Paths currently recorded, used for stats and prefix renames.
    fn keys(&self) -> FsResult<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<HashMap<String, TierMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, path: &str) -> FsResult<Option<TierMetadata>> {
        Ok(self.entries.read().unwrap_or_else(|p| p.into_inner()).get(path).cloned())
    }

    fn set(&self, path: &str, meta: &TierMetadata) -> FsResult<()> {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.to_string(), meta.clone());
        Ok(())
    }

    fn delete(&self, path: &str) -> FsResult<()> {
        self.entries.write().unwrap_or_else(|p| p.into_inner()).remove(path);
        Ok(())
    }

    fn keys(&self) -> FsResult<Vec<String>> {
        Ok(self.entries.read().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect())
    }
}

/// Read-through cache over the authoritative store.
pub struct MetadataIndex {
    store: Arc<dyn MetadataStore>,
    cache: DashMap<String, TierMetadata>,
}

impl MetadataIndex {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        MetadataIndex { store, cache: DashMap::new() }
    }

    pub fn get(&self, path: &str) -> Option<TierMetadata> {
        if let Some(hit) = self.cache.get(path) {
            return Some(hit.clone());
        }
        match self.store.get(path) {
            Ok(Some(meta)) => {
                self.cache.insert(path.to_string(), meta.clone());
                Some(meta)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path, error = %e, "metadata store read failed");
                None
            }
        }
    }

    /// Authoritative store first, then the cache.
    pub fn set(&self, path: &str, meta: TierMetadata) -> FsResult<()> {
        self.store.set(path, &meta)?;
        self.cache.insert(path.to_string(), meta);
        Ok(())
    }

    pub fn delete(&self, path: &str) -> FsResult<()> {
        self.store.delete(path)?;
        self.cache.remove(path);
        Ok(())
    }

    /// Read-modify-write of an existing record. No-op when absent.
    pub fn set_metadata(&self, path: &str, update: impl FnOnce(&mut TierMetadata)) -> FsResult<()> {
        if let Some(mut meta) = self.get(path) {
            update(&mut meta);
            self.set(path, meta)?;
        }
        Ok(())
    }

    /// Move a record to a new path key.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        if let Some(meta) = self.get(old) {
            self.set(new, meta)?;
            self.delete(old)?;
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys().unwrap_or_default()
    }

    /// Drop a cache entry so the next read consults the store.
    pub fn invalidate(&self, path: &str) {
        self.cache.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MetadataIndex {
        MetadataIndex::new(Arc::new(MemoryMetadataStore::new()))
    }

    #[test]
    fn set_get_delete() {
        let idx = index();
        assert!(idx.get("/a").is_none());
        idx.set("/a", TierMetadata::new(TierKind::Hot, 10, None)).unwrap();
        assert_eq!(idx.get("/a").unwrap().size, 10);
        idx.delete("/a").unwrap();
        assert!(idx.get("/a").is_none());
    }

    #[test]
    fn cache_reads_through_to_store() {
        let store = Arc::new(MemoryMetadataStore::new());
        let idx = MetadataIndex::new(store.clone());
        store.set("/a", &TierMetadata::new(TierKind::Warm, 7, None)).unwrap();
        // Not cached yet; read must fall through.
        assert_eq!(idx.get("/a").unwrap().tier, TierKind::Warm);
    }

    #[test]
    fn writes_hit_the_store_first() {
        let store = Arc::new(MemoryMetadataStore::new());
        let idx = MetadataIndex::new(store.clone());
        idx.set("/a", TierMetadata::new(TierKind::Cold, 1, None)).unwrap();
        assert_eq!(store.get("/a").unwrap().unwrap().tier, TierKind::Cold);
    }

    #[test]
    fn rename_moves_the_record() {
        let idx = index();
        idx.set("/old", TierMetadata::new(TierKind::Hot, 3, Some("h".into()))).unwrap();
        idx.rename("/old", "/new").unwrap();
        assert!(idx.get("/old").is_none());
        assert_eq!(idx.get("/new").unwrap().content_hash.as_deref(), Some("h"));
    }

    #[test]
    fn set_metadata_updates_in_place() {
        let idx = index();
        idx.set("/a", TierMetadata::new(TierKind::Hot, 3, None)).unwrap();
        idx.set_metadata("/a", |m| m.access_count += 1).unwrap();
        assert_eq!(idx.get("/a").unwrap().access_count, 1);
        // Absent path: silently nothing.
        idx.set_metadata("/missing", |m| m.access_count += 1).unwrap();
        assert!(idx.get("/missing").is_none());
    }
}
