//! The virtual filesystem facade.
//!
//! Composes the inode graph (namespace), the content store (dedup), the
//! tiered placement engine (bytes), and the metadata index (placement
//! records). Object bytes are keyed by inode id, which keeps hard links and
//! renames cheap; the index stays path-keyed and self-heals through tier
//! probes. Every mutation emits a change event.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cas::{BlobBucket, ContentStore, MemoryBucket};
use crate::config::EngineConfig;
use crate::error::{ErrorCode, FsError, FsResult};
use crate::events::{ChangeEvent, ChangeKind, EventSink, NullSink};
use crate::graph::{InodeGraph, Resolution, UnlinkOutcome};
use crate::index::{MemoryMetadataStore, MetadataIndex, MetadataStore, TierMetadata};
use crate::inode::{FileStat, FileType, InodeId};
use crate::path::PathValidator;
use crate::refcount::{RefCountMetrics, RefCountStore};
use crate::tier::{TierKind, TieredPlacement};

/// Storage backends for one engine instance.
pub struct StorageBackends {
    pub cas_bucket: Arc<dyn BlobBucket>,
    pub hot: Arc<dyn BlobBucket>,
    pub warm: Option<Arc<dyn BlobBucket>>,
    pub cold: Option<Arc<dyn BlobBucket>>,
    pub metadata: Arc<dyn MetadataStore>,
}

impl StorageBackends {
    pub fn in_memory() -> Self {
        StorageBackends {
            cas_bucket: Arc::new(MemoryBucket::new()),
            hot: Arc::new(MemoryBucket::new()),
            warm: Some(Arc::new(MemoryBucket::new())),
            cold: Some(Arc::new(MemoryBucket::new())),
            metadata: Arc::new(MemoryMetadataStore::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub tier: TierKind,
    pub size: u64,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub data: Vec<u8>,
    pub tier: TierKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExistsResult {
    pub exists: bool,
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
}

/// Engine-wide counters for the `stats` surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub inodes: usize,
    pub index_entries: usize,
    pub deduplicated_bytes: u64,
    pub refcounts: RefCountMetrics,
    pub tiers: Vec<TierStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierStat {
    pub tier: TierKind,
    pub objects: usize,
    pub bytes: u64,
}

pub struct VirtualFs {
    pub(crate) graph: InodeGraph,
    pub(crate) cas: ContentStore,
    pub(crate) placement: TieredPlacement,
    pub(crate) validator: PathValidator,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) config: EngineConfig,
}

impl VirtualFs {
    pub fn new(config: EngineConfig, backends: StorageBackends, events: Arc<dyn EventSink>) -> Self {
        let refs = Arc::new(RefCountStore::new());
        let index = Arc::new(MetadataIndex::new(backends.metadata));
        let cas = ContentStore::new(backends.cas_bucket, refs);
        let placement = TieredPlacement::new(
            backends.hot,
            backends.warm,
            backends.cold,
            config.tiers.clone(),
            config.promotion,
            config.promotion_threshold,
            index,
        );
        let validator = PathValidator::new(config.root.clone());
        let graph = InodeGraph::new(config.symlink_loop_limit);
        VirtualFs { graph, cas, placement, validator, events, config }
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, StorageBackends::in_memory(), Arc::new(NullSink))
    }

    pub fn with_sink(config: EngineConfig, events: Arc<dyn EventSink>) -> Self {
        Self::new(config, StorageBackends::in_memory(), events)
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn refcounts(&self) -> &Arc<RefCountStore> {
        self.cas.refs()
    }

    pub fn index(&self) -> &Arc<MetadataIndex> {
        self.placement.index()
    }

    fn normalize(&self, path: &str) -> FsResult<String> {
        self.validator.normalize(path)
    }

    fn object_key(ino: InodeId) -> String {
        format!("{ino:x}")
    }

    fn emit(&self, event: ChangeEvent) {
        self.events.emit(event);
    }

    // -----------------------------------------------------------------------
    // Content operations
    // -----------------------------------------------------------------------

    /// Create a zero-length regular file when absent; an existing file is
    /// left untouched. The parent directory must exist.
    pub fn create(&self, path: &str, mode: Option<u32>) -> FsResult<bool> {
        let path = self.normalize(path)?;
        match self.graph.resolve(&path, true)? {
            Resolution::Found { ino, .. } => {
                let inode = self.graph.inode(ino).ok_or_else(|| FsError::not_found(&path))?;
                if inode.is_dir() {
                    return Err(FsError::is_dir(&path));
                }
                Ok(false)
            }
            Resolution::Missing { .. } => {
                self.write_file(&path, &[], mode)?;
                Ok(true)
            }
        }
    }

    pub fn write_file(&self, path: &str, bytes: &[u8], mode: Option<u32>) -> FsResult<WriteResult> {
        let path = self.normalize(path)?;
        let (hash, size) = self.cas.put(bytes)?;

        let (ino, old_hash, created) =
            match self.graph.create_or_update_file(&path, mode, &hash, size) {
                Ok(v) => v,
                Err(e) => {
                    // Roll back the reference taken by put().
                    self.cas.release(&hash);
                    return Err(e);
                }
            };

        let tier = self.placement.store(&path, &Self::object_key(ino), bytes, Some(&hash))?;
        if let Some(old) = old_hash {
            self.cas.release(&old);
        }

        let kind = if created { ChangeKind::Create } else { ChangeKind::Modify };
        self.emit(ChangeEvent::new(kind, &path));
        debug!(path, size, tier = tier.as_str(), created, "write");
        Ok(WriteResult { tier, size, created })
    }

    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        Ok(self.read_file_detail(path)?.data)
    }

    /// Read bytes along with the tier that currently holds them.
    pub fn read_file_detail(&self, path: &str) -> FsResult<ReadResult> {
        let path = self.normalize(path)?;
        let (ino, canonical) = match self.graph.resolve(&path, true)? {
            Resolution::Found { ino, canonical } => (ino, canonical),
            Resolution::Missing { .. } => return Err(FsError::not_found(&path)),
        };
        let inode = self.graph.inode(ino).ok_or_else(|| FsError::not_found(&path))?;
        if inode.is_dir() {
            return Err(FsError::is_dir(&path));
        }
        let (data, tier) =
            self.placement
                .read(&canonical, &Self::object_key(ino), inode.content_hash())?;
        self.graph.touch_atime(ino);
        Ok(ReadResult { data, tier })
    }

    pub fn append_file(&self, path: &str, bytes: &[u8]) -> FsResult<WriteResult> {
        let path = self.normalize(path)?;
        let mut combined = match self.read_file_detail(&path) {
            Ok(existing) => existing.data,
            Err(e) if e.code == ErrorCode::Enoent => Vec::new(),
            Err(e) => return Err(e),
        };
        combined.extend_from_slice(bytes);
        self.write_file(&path, &combined, None)
    }

    pub fn truncate(&self, path: &str, length: u64) -> FsResult<()> {
        let path = self.normalize(path)?;
        let mut bytes = self.read_file_detail(&path)?.data;
        bytes.resize(length as usize, 0);
        self.write_file(&path, &bytes, None)?;
        Ok(())
    }

    pub fn copy_file(&self, src: &str, dst: &str) -> FsResult<WriteResult> {
        let src = self.normalize(src)?;
        let dst = self.normalize(dst)?;
        let inode = self.graph.lookup(&src, true)?;
        let Some(hash) = inode.content_hash().map(str::to_string) else {
            return Err(FsError::is_dir(&src));
        };
        let bytes = self.cas.read_all(&hash)?;
        self.cas.add_ref(&hash)?;

        let (ino, old_hash, created) =
            match self.graph.create_or_update_file(&dst, None, &hash, inode.size()) {
                Ok(v) => v,
                Err(e) => {
                    self.cas.release(&hash);
                    return Err(e);
                }
            };
        let tier = self.placement.store(&dst, &Self::object_key(ino), &bytes, Some(&hash))?;
        if let Some(old) = old_hash {
            self.cas.release(&old);
        }

        let kind = if created { ChangeKind::Create } else { ChangeKind::Modify };
        self.emit(ChangeEvent::new(kind, &dst));
        Ok(WriteResult { tier, size: inode.size(), created })
    }

    /// Move the object's bytes to a slower tier. Bytes are preserved exactly.
    pub fn demote(&self, path: &str, target: TierKind) -> FsResult<TierKind> {
        let path = self.normalize(path)?;
        let (ino, canonical) = match self.graph.resolve(&path, true)? {
            Resolution::Found { ino, canonical } => (ino, canonical),
            Resolution::Missing { .. } => return Err(FsError::not_found(&path)),
        };
        // Placement records may sit under the canonical write path; make sure
        // one exists before demoting through an alias.
        if self.placement.index().get(&canonical).is_none() {
            self.read_file_detail(&canonical)?;
        }
        self.placement.demote(&canonical, &Self::object_key(ino), target)
    }

    // -----------------------------------------------------------------------
    // Namespace operations
    // -----------------------------------------------------------------------

    pub fn mkdir(&self, path: &str, recursive: bool, mode: Option<u32>) -> FsResult<()> {
        let path = self.normalize(path)?;
        let created =
            self.graph.mkdir(&path, recursive, mode.unwrap_or(crate::inode::DEFAULT_DIR_MODE))?;
        for dir in created {
            self.emit(ChangeEvent::new(ChangeKind::Create, dir));
        }
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let path = self.normalize(path)?;
        let outcome = self.graph.unlink(&path)?;
        self.cleanup_unlinked(&outcome)?;
        self.emit(ChangeEvent::new(ChangeKind::Delete, &outcome.path));
        Ok(())
    }

    pub fn rmdir(&self, path: &str, recursive: bool) -> FsResult<()> {
        let path = self.normalize(path)?;
        let removed = self.graph.rmdir(&path, recursive)?;
        for entry in &removed {
            if entry.inode_destroyed {
                if let Some(ref hash) = entry.hash {
                    self.cas.release(hash);
                }
                if entry.file_type == FileType::File {
                    self.placement.remove(&entry.path, &Self::object_key(entry.ino))?;
                }
            } else {
                // Another hard link keeps the inode; only this path's
                // placement record goes.
                self.placement.index().delete(&entry.path)?;
            }
            self.emit(ChangeEvent::new(ChangeKind::Delete, &entry.path));
        }
        Ok(())
    }

    /// Unified removal: files unlink, directories require `recursive`.
    pub fn rm(&self, path: &str, recursive: bool, force: bool) -> FsResult<()> {
        let path = self.normalize(path)?;
        let inode = match self.graph.lookup(&path, false) {
            Ok(inode) => inode,
            Err(e) if force && e.code == ErrorCode::Enoent => return Ok(()),
            Err(e) => return Err(e),
        };
        if inode.is_dir() {
            if !recursive {
                return Err(FsError::is_dir(&path));
            }
            self.rmdir(&path, true)
        } else {
            self.unlink(&path)
        }
    }

    pub fn readdir(&self, path: &str) -> FsResult<Vec<(String, FileType)>> {
        let path = self.normalize(path)?;
        self.graph.readdir(&path)
    }

    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old = self.normalize(old)?;
        let new = self.normalize(new)?;
        let outcome = self.graph.rename(&old, &new)?;
        if outcome.moved_paths.is_empty() {
            // Both names already referred to the same inode.
            return Ok(());
        }
        if let Some(ref replaced) = outcome.replaced {
            self.cleanup_unlinked(replaced)?;
        }
        for (from, to) in &outcome.moved_paths {
            self.placement.index().rename(from, to)?;
        }
        self.emit(ChangeEvent::renamed(&old, &new));
        Ok(())
    }

    pub fn link(&self, existing: &str, new: &str) -> FsResult<()> {
        let existing = self.normalize(existing)?;
        let new = self.normalize(new)?;
        let canonical = self.graph.realpath(&existing)?;
        let outcome = self.graph.link(&existing, &new)?;
        // The new name needs its own placement record; bytes are shared via
        // the inode-keyed object.
        let meta = self
            .placement
            .index()
            .get(&canonical)
            .unwrap_or_else(|| {
                TierMetadata::new(
                    self.placement.select_tier(outcome.size),
                    outcome.size,
                    Some(outcome.hash.clone()),
                )
            });
        self.placement.index().set(&new, meta)?;
        self.emit(ChangeEvent::new(ChangeKind::Create, &new));
        Ok(())
    }

    pub fn symlink(&self, target: &str, link_path: &str) -> FsResult<()> {
        let link_path = self.normalize(link_path)?;
        if self.validator.is_symlink_escape(target, &link_path) {
            return Err(FsError::access_denied(
                link_path,
                format!("symlink target escapes the tenant root: {target}"),
            ));
        }
        self.graph.symlink(target, &link_path)?;
        self.emit(ChangeEvent::new(ChangeKind::Create, &link_path));
        Ok(())
    }

    pub fn readlink(&self, path: &str) -> FsResult<String> {
        let path = self.normalize(path)?;
        self.graph.readlink(&path)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = self.normalize(path)?;
        self.graph.chmod(&path, mode)?;
        self.emit(ChangeEvent::new(ChangeKind::Modify, &path));
        Ok(())
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let path = self.normalize(path)?;
        self.graph.chown(&path, uid, gid)?;
        self.emit(ChangeEvent::new(ChangeKind::Modify, &path));
        Ok(())
    }

    pub fn utimes(&self, path: &str, atime: u64, mtime: u64) -> FsResult<()> {
        let path = self.normalize(path)?;
        self.graph.utimes(&path, atime, mtime)?;
        self.emit(ChangeEvent::new(ChangeKind::Modify, &path));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn stat(&self, path: &str) -> FsResult<FileStat> {
        let path = self.normalize(path)?;
        self.graph.stat(&path)
    }

    pub fn lstat(&self, path: &str) -> FsResult<FileStat> {
        let path = self.normalize(path)?;
        self.graph.lstat(&path)
    }

    /// POSIX `access` with default `F_OK` semantics: does the path resolve?
    pub fn access(&self, path: &str) -> FsResult<()> {
        let path = self.normalize(path)?;
        self.graph.lookup(&path, true)?;
        Ok(())
    }

    pub fn realpath(&self, path: &str) -> FsResult<String> {
        let path = self.normalize(path)?;
        self.graph.realpath(&path)
    }

    pub fn exists(
        &self,
        path: &str,
        type_filter: Option<FileType>,
        follow_symlinks: bool,
    ) -> FsResult<ExistsResult> {
        let path = self.normalize(path)?;
        match self.graph.lookup(&path, follow_symlinks) {
            Ok(inode) => {
                let file_type = inode.file_type();
                if type_filter.is_some_and(|t| t != file_type) {
                    Ok(ExistsResult { exists: false, file_type: None })
                } else {
                    Ok(ExistsResult { exists: true, file_type: Some(file_type) })
                }
            }
            Err(e)
                if matches!(
                    e.code,
                    ErrorCode::Enoent | ErrorCode::Enotdir | ErrorCode::Eloop
                ) =>
            {
                Ok(ExistsResult { exists: false, file_type: None })
            }
            Err(e) => Err(e),
        }
    }

    /// Placement record for a path, if any.
    pub fn metadata(&self, path: &str) -> FsResult<Option<TierMetadata>> {
        let path = self.normalize(path)?;
        let canonical = self.graph.realpath(&path)?;
        Ok(self.placement.index().get(&canonical))
    }

    pub fn stats(&self) -> EngineStats {
        let tiers = self
            .placement
            .tier_stats()
            .into_iter()
            .map(|(tier, objects, bytes)| TierStat { tier, objects, bytes })
            .collect();
        EngineStats {
            inodes: self.graph.inode_count(),
            index_entries: self.placement.index().keys().len(),
            deduplicated_bytes: self.cas.refs().deduplicated_bytes(),
            refcounts: self.cas.refs().metrics(),
            tiers,
        }
    }

    fn cleanup_unlinked(&self, outcome: &UnlinkOutcome) -> FsResult<()> {
        if outcome.inode_destroyed {
            if let Some(ref hash) = outcome.hash {
                self.cas.release(hash);
            }
            if outcome.hash.is_some() {
                self.placement.remove(&outcome.path, &Self::object_key(outcome.ino))?;
            }
        } else {
            // Other hard links keep the bytes; only this path's record goes.
            self.placement.index().delete(&outcome.path)?;
        }
        Ok(())
    }
}
