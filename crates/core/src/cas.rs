//! Content-addressed blob storage.
//!
//! Content is keyed by its lowercase-hex SHA-256 digest. The physical bucket
//! is abstract (`BlobBucket`); the in-memory implementation backs tests and
//! single-node deployments. A blob is written once per hash and physically
//! deleted exactly once, on the refcount's 1→0 transition.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{FsError, FsResult};
use crate::refcount::RefCountStore;

/// An object listed by [`BlobBucket::list`].
#[derive(Debug, Clone)]
pub struct BlobStat {
    pub key: String,
    pub size: u64,
}

/// Abstract blob bucket: write-once keys, immutable values.
pub trait BlobBucket: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> FsResult<()>;
    fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>>;
    fn delete(&self, key: &str) -> FsResult<()>;
    /// Size of the object, or `None` when absent.
    fn head(&self, key: &str) -> FsResult<Option<u64>>;
    fn list(&self, prefix: Option<&str>) -> FsResult<Vec<BlobStat>>;
}

/// In-memory bucket. Concurrent `put` of identical content is safe: identical
/// content hashes to the same key and keys are immutable once written.
#[derive(Default)]
pub struct MemoryBucket {
    objects: DashMap<String, Arc<Vec<u8>>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|e| e.value().len() as u64).sum()
    }
}

impl BlobBucket for MemoryBucket {
    fn put(&self, key: &str, bytes: &[u8]) -> FsResult<()> {
        self.objects.insert(key.to_string(), Arc::new(bytes.to_vec()));
        Ok(())
    }

    fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.objects.get(key).map(|e| e.value().as_ref().clone()))
    }

    fn delete(&self, key: &str) -> FsResult<()> {
        self.objects.remove(key);
        Ok(())
    }

    fn head(&self, key: &str) -> FsResult<Option<u64>> {
        Ok(self.objects.get(key).map(|e| e.value().len() as u64))
    }

    fn list(&self, prefix: Option<&str>) -> FsResult<Vec<BlobStat>> {
        let mut out: Vec<BlobStat> = self
            .objects
            .iter()
            .filter(|e| prefix.is_none_or(|p| e.key().starts_with(p)))
            .map(|e| BlobStat { key: e.key().clone(), size: e.value().len() as u64 })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Deduplicating content store: bucket + refcounts.
pub struct ContentStore {
    bucket: Arc<dyn BlobBucket>,
    refs: Arc<RefCountStore>,
}

impl ContentStore {
    pub fn new(bucket: Arc<dyn BlobBucket>, refs: Arc<RefCountStore>) -> Self {
        ContentStore { bucket, refs }
    }

    pub fn refs(&self) -> &Arc<RefCountStore> {
        &self.refs
    }

    pub fn bucket(&self) -> &Arc<dyn BlobBucket> {
        &self.bucket
    }

    /// Store `bytes`, writing to the bucket only when the hash is new, then
    /// take a reference. Returns `(hash, size)`.
    pub fn put(&self, bytes: &[u8]) -> FsResult<(String, u64)> {
        let hash = hash_bytes(bytes);
        let size = bytes.len() as u64;
        if self.refs.get(&hash) == 0 {
            self.bucket.put(&hash, bytes)?;
        }
        self.refs.set_size(&hash, size);
        self.refs.increment(&hash);
        Ok((hash, size))
    }

    /// Take an additional reference on an existing blob.
    pub fn add_ref(&self, hash: &str) -> FsResult<u64> {
        if self.refs.get(hash) == 0 && self.bucket.head(hash)?.is_none() {
            return Err(FsError::new(
                crate::error::ErrorCode::Enoent,
                format!("unknown content hash: {hash}"),
            ));
        }
        Ok(self.refs.increment(hash))
    }

    /// Drop a reference; the blob is deleted from the bucket iff this release
    /// performed the 1→0 transition.
    pub fn release(&self, hash: &str) -> u64 {
        self.refs.decrement_with_gc(hash, |h| {
            if let Err(e) = self.bucket.delete(h) {
                warn!(hash = h, error = %e, "blob delete failed during GC");
            }
        })
    }

    /// Fetch the full blob for `hash`.
    pub fn read_all(&self, hash: &str) -> FsResult<Vec<u8>> {
        self.bucket.get(hash)?.ok_or_else(|| {
            FsError::new(crate::error::ErrorCode::Enoent, format!("unknown content hash: {hash}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn store() -> ContentStore {
        ContentStore::new(Arc::new(MemoryBucket::new()), Arc::new(RefCountStore::new()))
    }

    #[test]
    fn put_and_read_roundtrip() {
        let cas = store();
        let (hash, size) = cas.put(b"hello").unwrap();
        assert_eq!(size, 5);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash.to_lowercase());
        assert_eq!(cas.read_all(&hash).unwrap(), b"hello");
    }

    #[test]
    fn identical_content_deduplicates() {
        let cas = store();
        let (h1, _) = cas.put(b"same bytes").unwrap();
        let (h2, _) = cas.put(b"same bytes").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(cas.refs().get(&h1), 2);

        let bucket = cas.bucket().list(None).unwrap();
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn release_deletes_on_last_reference() {
        let cas = store();
        let (hash, _) = cas.put(b"x").unwrap();
        cas.add_ref(&hash).unwrap();

        assert_eq!(cas.release(&hash), 1);
        assert!(cas.read_all(&hash).is_ok(), "blob must survive while referenced");

        assert_eq!(cas.release(&hash), 0);
        let err = cas.read_all(&hash).unwrap_err();
        assert_eq!(err.code, ErrorCode::Enoent);
    }

    #[test]
    fn add_ref_unknown_hash_is_enoent() {
        let cas = store();
        let err = cas.add_ref("deadbeef").unwrap_err();
        assert_eq!(err.code, ErrorCode::Enoent);
    }

    #[test]
    fn empty_blob_is_storable() {
        let cas = store();
        let (hash, size) = cas.put(b"").unwrap();
        assert_eq!(size, 0);
        assert!(cas.read_all(&hash).unwrap().is_empty());
    }
}
