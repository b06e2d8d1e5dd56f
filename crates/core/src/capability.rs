//! The bounded capability surface handed to policy-gated callers.
//!
//! Wraps the engine behind an [`FsScope`] policy. Every path is normalized
//! and checked against the scope's allowed prefixes before it reaches the
//! engine; write and delete permissions gate the mutating subset.

use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::inode::{FileStat, FileType};
use crate::listing::{ListOptions, ListResult, SearchMatch, SearchOptions, TreeOptions, TreeOutput};
use crate::vfs::{ExistsResult, VirtualFs, WriteResult};

/// Policy for one capability handle.
#[derive(Debug, Clone)]
pub struct FsScope {
    pub allow_write: bool,
    pub allow_delete: bool,
    /// When set, only paths under one of these prefixes are reachable.
    pub allowed_paths: Option<Vec<String>>,
}

impl Default for FsScope {
    fn default() -> Self {
        FsScope { allow_write: true, allow_delete: true, allowed_paths: None }
    }
}

impl FsScope {
    pub fn read_only() -> Self {
        FsScope { allow_write: false, allow_delete: false, allowed_paths: None }
    }
}

#[derive(Clone)]
pub struct FsCapability {
    fs: Arc<VirtualFs>,
    scope: FsScope,
}

impl FsCapability {
    pub fn new(fs: Arc<VirtualFs>, scope: FsScope) -> Self {
        FsCapability { fs, scope }
    }

    pub fn scope(&self) -> &FsScope {
        &self.scope
    }

    pub fn engine(&self) -> &Arc<VirtualFs> {
        &self.fs
    }

    fn check_path(&self, path: &str) -> FsResult<String> {
        let normalized = self.fs.validator().normalize(path)?;
        if let Some(ref allowed) = self.scope.allowed_paths {
            let permitted = allowed.iter().any(|prefix| {
                prefix == "/"
                    || normalized == *prefix
                    || normalized
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            });
            if !permitted {
                return Err(FsError::access_denied(normalized, "permission denied"));
            }
        }
        Ok(normalized)
    }

    fn check_write(&self, path: &str) -> FsResult<String> {
        if !self.scope.allow_write {
            return Err(FsError::access_denied(path, "permission denied: writes are not allowed"));
        }
        self.check_path(path)
    }

    fn check_delete(&self, path: &str) -> FsResult<String> {
        if !self.scope.allow_delete {
            return Err(FsError::access_denied(path, "permission denied: deletes are not allowed"));
        }
        self.check_path(path)
    }

    // -- the bounded surface ------------------------------------------------

    pub fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = self.check_path(path)?;
        self.fs.read_file(&path)
    }

    pub fn write(&self, path: &str, bytes: &[u8]) -> FsResult<WriteResult> {
        let path = self.check_write(path)?;
        self.fs.write_file(&path, bytes, None)
    }

    pub fn append(&self, path: &str, bytes: &[u8]) -> FsResult<WriteResult> {
        let path = self.check_write(path)?;
        self.fs.append_file(&path, bytes)
    }

    pub fn delete(&self, path: &str, recursive: bool) -> FsResult<()> {
        let path = self.check_delete(path)?;
        self.fs.rm(&path, recursive, false)
    }

    pub fn move_entry(&self, from: &str, to: &str) -> FsResult<()> {
        let from = self.check_write(from)?;
        let to = self.check_write(to)?;
        self.fs.rename(&from, &to)
    }

    pub fn copy(&self, from: &str, to: &str) -> FsResult<WriteResult> {
        let from = self.check_path(from)?;
        let to = self.check_write(to)?;
        self.fs.copy_file(&from, &to)
    }

    pub fn mkdir(&self, path: &str, recursive: bool) -> FsResult<()> {
        let path = self.check_write(path)?;
        self.fs.mkdir(&path, recursive, None)
    }

    pub fn stat(&self, path: &str) -> FsResult<FileStat> {
        let path = self.check_path(path)?;
        self.fs.stat(&path)
    }

    pub fn list(&self, path: &str, opts: &ListOptions) -> FsResult<ListResult> {
        let path = self.check_path(path)?;
        self.fs.list_dir(&path, opts)
    }

    pub fn tree(&self, path: &str, opts: &TreeOptions) -> FsResult<TreeOutput> {
        let path = self.check_path(path)?;
        self.fs.tree(&path, opts)
    }

    pub fn search(
        &self,
        root: &str,
        pattern: &str,
        opts: &SearchOptions,
    ) -> FsResult<Vec<SearchMatch>> {
        let root = self.check_path(root)?;
        self.fs.search(&root, pattern, opts)
    }

    pub fn exists(
        &self,
        path: &str,
        type_filter: Option<FileType>,
        follow_symlinks: bool,
    ) -> FsResult<ExistsResult> {
        let path = self.check_path(path)?;
        self.fs.exists(&path, type_filter, follow_symlinks)
    }
}
