//! The inode graph: inode table, directory entries, symlink resolution,
//! hard-link accounting, permissions, and timestamps.
//!
//! Every public method acquires the table lock exactly once, so operations on
//! the same inode (and directory-entry mutations on the same parent) are
//! linearizable. Content bytes live elsewhere; the graph tracks only the
//! namespace and each regular file's content hash.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use tracing::trace;

use crate::error::{ErrorCode, FsError, FsResult};
use crate::inode::{
    now_millis, FileStat, FileType, Inode, InodeId, InodeKind, DEFAULT_DIR_MODE,
};
use crate::path::{basename_of, join, parent_of, PathValidator};

pub const ROOT_INO: InodeId = 1;

/// Where path resolution landed.
#[derive(Debug)]
pub enum Resolution {
    Found { ino: InodeId, canonical: String },
    /// Every intermediate exists; only the terminal entry is absent.
    Missing { parent: InodeId, parent_path: String, name: String },
}

/// Outcome of an unlink, carrying what the storage layers must clean up.
#[derive(Debug)]
pub struct UnlinkOutcome {
    pub ino: InodeId,
    /// Canonical path of the removed entry.
    pub path: String,
    /// Content hash held by the inode, if it was a regular file.
    pub hash: Option<String>,
    /// The last link is gone; the inode (and its placement bytes) went with it.
    pub inode_destroyed: bool,
}

/// One entry removed by a recursive directory removal, deepest-first.
#[derive(Debug)]
pub struct RemovedEntry {
    pub path: String,
    pub ino: InodeId,
    pub file_type: FileType,
    pub hash: Option<String>,
    pub inode_destroyed: bool,
}

/// Outcome of a rename.
#[derive(Debug)]
pub struct RenameOutcome {
    pub ino: InodeId,
    pub is_dir: bool,
    /// Inode replaced at the destination, if any.
    pub replaced: Option<UnlinkOutcome>,
    /// `(old, new)` canonical path pairs for the moved subtree, the moved
    /// entry itself first. Used to re-key path-addressed metadata.
    pub moved_paths: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct LinkOutcome {
    pub ino: InodeId,
    pub hash: String,
    pub size: u64,
    pub nlink: u64,
}

struct GraphInner {
    inodes: HashMap<InodeId, Inode>,
    next_ino: InodeId,
    loop_limit: usize,
}

pub struct InodeGraph {
    inner: RwLock<GraphInner>,
}

impl InodeGraph {
    pub fn new(loop_limit: usize) -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(ROOT_INO, Inode::new_directory(ROOT_INO, DEFAULT_DIR_MODE));
        InodeGraph { inner: RwLock::new(GraphInner { inodes, next_ino: ROOT_INO + 1, loop_limit }) }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    // -----------------------------------------------------------------------
    // Lookup surface
    // -----------------------------------------------------------------------

    pub fn resolve(&self, path: &str, follow_terminal: bool) -> FsResult<Resolution> {
        resolve_inner(&self.read(), path, follow_terminal)
    }

    pub fn lookup(&self, path: &str, follow_terminal: bool) -> FsResult<Inode> {
        let inner = self.read();
        match resolve_inner(&inner, path, follow_terminal)? {
            Resolution::Found { ino, .. } => Ok(inner.inodes[&ino].clone()),
            Resolution::Missing { .. } => Err(FsError::not_found(path)),
        }
    }

    pub fn inode(&self, ino: InodeId) -> Option<Inode> {
        self.read().inodes.get(&ino).cloned()
    }

    pub fn inode_count(&self) -> usize {
        self.read().inodes.len()
    }

    /// Canonical path with every symlink resolved.
    pub fn realpath(&self, path: &str) -> FsResult<String> {
        match self.resolve(path, true)? {
            Resolution::Found { canonical, .. } => Ok(canonical),
            Resolution::Missing { .. } => Err(FsError::not_found(path)),
        }
    }

    pub fn stat(&self, path: &str) -> FsResult<FileStat> {
        Ok(self.lookup(path, true)?.stat())
    }

    pub fn lstat(&self, path: &str) -> FsResult<FileStat> {
        Ok(self.lookup(path, false)?.stat())
    }

    pub fn readlink(&self, path: &str) -> FsResult<String> {
        let inode = self.lookup(path, false)?;
        match inode.kind {
            InodeKind::Symlink { target } => Ok(target),
            _ => Err(FsError::with_path(
                ErrorCode::Einval,
                format!("not a symbolic link: {path}"),
                path,
            )),
        }
    }

    /// Sorted directory listing.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<(String, FileType)>> {
        let inner = self.read();
        let ino = match resolve_inner(&inner, path, true)? {
            Resolution::Found { ino, .. } => ino,
            Resolution::Missing { .. } => return Err(FsError::not_found(path)),
        };
        let inode = &inner.inodes[&ino];
        let InodeKind::Directory { ref children } = inode.kind else {
            return Err(FsError::not_dir(path));
        };
        Ok(children
            .iter()
            .map(|(name, child)| (name.clone(), inner.inodes[child].file_type()))
            .collect())
    }

    /// Pre-order walk of the subtree at `path`: `(canonical, depth, inode)`.
    /// The root of the walk itself is not included.
    pub fn walk(&self, path: &str) -> FsResult<Vec<(String, usize, Inode)>> {
        let inner = self.read();
        let (ino, canonical) = match resolve_inner(&inner, path, true)? {
            Resolution::Found { ino, canonical } => (ino, canonical),
            Resolution::Missing { .. } => return Err(FsError::not_found(path)),
        };
        if !inner.inodes[&ino].is_dir() {
            return Err(FsError::not_dir(path));
        }
        let mut out = Vec::new();
        collect_subtree(&inner, ino, &canonical, 1, &mut out);
        Ok(out)
    }

    /// Update atime after a successful content read.
    pub fn touch_atime(&self, ino: InodeId) {
        let mut inner = self.write();
        if let Some(inode) = inner.inodes.get_mut(&ino) {
            inode.atime = now_millis();
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create the file if absent (under an existing parent directory) or
    /// update its content hash/size. Returns `(ino, previous hash, created)`.
    pub fn create_or_update_file(
        &self,
        path: &str,
        mode: Option<u32>,
        hash: &str,
        size: u64,
    ) -> FsResult<(InodeId, Option<String>, bool)> {
        let mut inner = self.write();
        match resolve_inner(&inner, path, true)? {
            Resolution::Found { ino, .. } => {
                let now = now_millis();
                let inode = inner.inodes.get_mut(&ino).expect("resolved inode exists");
                let InodeKind::Regular { content_hash, size: cur_size } = &mut inode.kind else {
                    return Err(FsError::is_dir(path));
                };
                let old = std::mem::replace(content_hash, hash.to_string());
                *cur_size = size;
                inode.mtime = now;
                inode.ctime = now;
                // `mode` applies only at creation, like open(2) with O_CREAT.
                Ok((ino, Some(old), false))
            }
            Resolution::Missing { parent, name, .. } => {
                PathValidator::validate_name(&name)?;
                let ino = inner.alloc_ino();
                let inode = Inode::new_regular(
                    ino,
                    mode.unwrap_or(crate::inode::DEFAULT_FILE_MODE),
                    hash.to_string(),
                    size,
                );
                inner.inodes.insert(ino, inode);
                inner.attach(parent, &name, ino)?;
                trace!(path, ino, "file created");
                Ok((ino, None, true))
            }
        }
    }

    /// `mkdir`, optionally recursive. Returns canonical paths of directories
    /// actually created, shallowest first.
    pub fn mkdir(&self, path: &str, recursive: bool, mode: u32) -> FsResult<Vec<String>> {
        if path == "/" {
            return if recursive { Ok(Vec::new()) } else { Err(FsError::exists("/")) };
        }
        let mut inner = self.write();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut created = Vec::new();
        let mut prefix = String::new();

        for (i, seg) in segments.iter().enumerate() {
            prefix.push('/');
            prefix.push_str(seg);
            let last = i + 1 == segments.len();
            match resolve_inner(&inner, &prefix, true)? {
                Resolution::Found { ino, .. } => {
                    let is_dir = inner.inodes[&ino].is_dir();
                    if last {
                        if !recursive {
                            return Err(FsError::exists(path));
                        }
                        if !is_dir {
                            return Err(FsError::exists(path));
                        }
                        // Recursive mkdir of an existing directory: idempotent.
                    } else if !is_dir {
                        return Err(FsError::not_dir(&prefix));
                    }
                }
                Resolution::Missing { parent, name, .. } => {
                    if !last && !recursive {
                        return Err(FsError::not_found(&prefix));
                    }
                    PathValidator::validate_name(&name)?;
                    let ino = inner.alloc_ino();
                    inner.inodes.insert(ino, Inode::new_directory(ino, mode));
                    inner.attach(parent, &name, ino)?;
                    if let Some(p) = inner.inodes.get_mut(&parent) {
                        p.nlink += 1;
                    }
                    created.push(prefix.clone());
                }
            }
        }
        Ok(created)
    }

    /// Remove a regular file or symlink entry. The terminal symlink is not
    /// followed.
    pub fn unlink(&self, path: &str) -> FsResult<UnlinkOutcome> {
        if path == "/" {
            return Err(FsError::is_dir("/"));
        }
        let mut inner = self.write();
        let (ino, canonical) = match resolve_inner(&inner, path, false)? {
            Resolution::Found { ino, canonical } => (ino, canonical),
            Resolution::Missing { .. } => return Err(FsError::not_found(path)),
        };
        if inner.inodes[&ino].is_dir() {
            return Err(FsError::is_dir(path));
        }
        let parent_path = parent_of(&canonical).to_string();
        let parent = match resolve_inner(&inner, &parent_path, true)? {
            Resolution::Found { ino, .. } => ino,
            Resolution::Missing { .. } => return Err(FsError::not_found(path)),
        };
        let name = basename_of(&canonical).to_string();
        Ok(inner.detach_nondir(parent, &name, ino, &canonical))
    }

    /// Remove a directory. Non-recursive removal of a non-empty directory
    /// fails `ENOTEMPTY`. Recursive removal returns entries deepest-first.
    pub fn rmdir(&self, path: &str, recursive: bool) -> FsResult<Vec<RemovedEntry>> {
        if path == "/" {
            return Err(FsError::invalid("cannot remove the filesystem root"));
        }
        let mut inner = self.write();
        let (ino, canonical) = match resolve_inner(&inner, path, true)? {
            Resolution::Found { ino, canonical } => (ino, canonical),
            Resolution::Missing { .. } => return Err(FsError::not_found(path)),
        };
        let InodeKind::Directory { ref children } = inner.inodes[&ino].kind else {
            return Err(FsError::not_dir(path));
        };
        if !children.is_empty() && !recursive {
            return Err(FsError::not_empty(path));
        }

        let mut subtree = Vec::new();
        collect_subtree(&inner, ino, &canonical, 1, &mut subtree);
        // Deepest first, so children disappear before their parents.
        subtree.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        let mut removed = Vec::new();
        for (child_path, _, child) in subtree {
            let parent_path = parent_of(&child_path).to_string();
            let parent_ino = match resolve_inner(&inner, &parent_path, false)? {
                Resolution::Found { ino, .. } => ino,
                Resolution::Missing { .. } => continue,
            };
            let name = basename_of(&child_path).to_string();
            if child.is_dir() {
                inner.detach_empty_dir(parent_ino, &name, child.ino);
                removed.push(RemovedEntry {
                    path: child_path,
                    ino: child.ino,
                    file_type: FileType::Directory,
                    hash: None,
                    inode_destroyed: true,
                });
            } else {
                let outcome = inner.detach_nondir(parent_ino, &name, child.ino, &child_path);
                removed.push(RemovedEntry {
                    path: child_path,
                    ino: child.ino,
                    file_type: child.file_type(),
                    hash: outcome.hash,
                    inode_destroyed: outcome.inode_destroyed,
                });
            }
        }

        let parent_path = parent_of(&canonical).to_string();
        if let Resolution::Found { ino: parent_ino, .. } =
            resolve_inner(&inner, &parent_path, true)?
        {
            inner.detach_empty_dir(parent_ino, basename_of(&canonical), ino);
        }
        removed.push(RemovedEntry {
            path: canonical,
            ino,
            file_type: FileType::Directory,
            hash: None,
            inode_destroyed: true,
        });
        Ok(removed)
    }

    /// Atomic directory-entry swap. POSIX overwrite rules: file over file and
    /// directory over empty directory succeed; everything else fails.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<RenameOutcome> {
        if old == "/" || new == "/" {
            return Err(FsError::invalid("cannot rename the filesystem root"));
        }
        let mut inner = self.write();

        let (src_ino, src_canonical) = match resolve_inner(&inner, old, false)? {
            Resolution::Found { ino, canonical } => (ino, canonical),
            Resolution::Missing { .. } => return Err(FsError::not_found(old)),
        };
        let src_is_dir = inner.inodes[&src_ino].is_dir();

        let (dst_parent, dst_parent_path, dst_name, dst_existing) =
            match resolve_inner(&inner, new, false)? {
                Resolution::Found { ino, canonical } => {
                    let parent_path = parent_of(&canonical).to_string();
                    let parent = match resolve_inner(&inner, &parent_path, true)? {
                        Resolution::Found { ino, .. } => ino,
                        Resolution::Missing { .. } => return Err(FsError::not_found(new)),
                    };
                    (parent, parent_path, basename_of(&canonical).to_string(), Some(ino))
                }
                Resolution::Missing { parent, parent_path, name } => {
                    (parent, parent_path, name, None)
                }
            };
        PathValidator::validate_name(&dst_name)?;

        let dst_canonical = join(&dst_parent_path, &dst_name);
        if let Some(existing) = dst_existing {
            if existing == src_ino {
                // Renaming a path onto itself is a no-op.
                return Ok(RenameOutcome {
                    ino: src_ino,
                    is_dir: src_is_dir,
                    replaced: None,
                    moved_paths: Vec::new(),
                });
            }
        }
        if src_is_dir
            && (dst_canonical == src_canonical
                || dst_canonical.starts_with(&format!("{src_canonical}/")))
        {
            return Err(FsError::invalid(format!(
                "cannot move {old} into its own subtree {new}"
            )));
        }

        // Overwrite checks.
        let replaced = match dst_existing {
            None => None,
            Some(dst_ino) => {
                let dst_is_dir = inner.inodes[&dst_ino].is_dir();
                match (src_is_dir, dst_is_dir) {
                    (true, false) => return Err(FsError::not_dir(new)),
                    (false, true) => return Err(FsError::is_dir(new)),
                    (true, true) => {
                        let InodeKind::Directory { ref children } = inner.inodes[&dst_ino].kind
                        else {
                            unreachable!()
                        };
                        if !children.is_empty() {
                            return Err(FsError::exists(new));
                        }
                        inner.detach_empty_dir(dst_parent, &dst_name, dst_ino);
                        Some(UnlinkOutcome {
                            ino: dst_ino,
                            path: dst_canonical.clone(),
                            hash: None,
                            inode_destroyed: true,
                        })
                    }
                    (false, false) => {
                        Some(inner.detach_nondir(dst_parent, &dst_name, dst_ino, &dst_canonical))
                    }
                }
            }
        };

        // Collect the subtree before the move so re-key pairs use old paths.
        let mut moved_paths = vec![(src_canonical.clone(), dst_canonical.clone())];
        if src_is_dir {
            let mut subtree = Vec::new();
            collect_subtree(&inner, src_ino, &src_canonical, 1, &mut subtree);
            for (old_path, _, _) in subtree {
                let suffix = &old_path[src_canonical.len()..];
                moved_paths.push((old_path.clone(), format!("{dst_canonical}{suffix}")));
            }
        }

        // Detach from the old parent, attach under the new name.
        let src_parent_path = parent_of(&src_canonical).to_string();
        let src_parent = match resolve_inner(&inner, &src_parent_path, true)? {
            Resolution::Found { ino, .. } => ino,
            Resolution::Missing { .. } => return Err(FsError::not_found(old)),
        };
        let now = now_millis();
        let src_name = basename_of(&src_canonical).to_string();
        if let Some(InodeKind::Directory { children }) =
            inner.inodes.get_mut(&src_parent).map(|p| &mut p.kind)
        {
            children.remove(&src_name);
        }
        if let Some(p) = inner.inodes.get_mut(&src_parent) {
            p.mtime = now;
            p.ctime = now;
            if src_is_dir {
                p.nlink = p.nlink.saturating_sub(1);
            }
        }
        inner.attach(dst_parent, &dst_name, src_ino)?;
        if src_is_dir {
            if let Some(p) = inner.inodes.get_mut(&dst_parent) {
                p.nlink += 1;
            }
        }
        if let Some(inode) = inner.inodes.get_mut(&src_ino) {
            inode.ctime = now;
        }

        Ok(RenameOutcome { ino: src_ino, is_dir: src_is_dir, replaced, moved_paths })
    }

    /// Hard-link `existing` (a regular file) at `new`.
    pub fn link(&self, existing: &str, new: &str) -> FsResult<LinkOutcome> {
        let mut inner = self.write();
        let src_ino = match resolve_inner(&inner, existing, true)? {
            Resolution::Found { ino, .. } => ino,
            Resolution::Missing { .. } => return Err(FsError::not_found(existing)),
        };
        let (hash, size) = match &inner.inodes[&src_ino].kind {
            InodeKind::Regular { content_hash, size } => (content_hash.clone(), *size),
            InodeKind::Directory { .. } => {
                return Err(FsError::with_path(
                    ErrorCode::Eperm,
                    format!("hard links to directories are not permitted: {existing}"),
                    existing,
                ))
            }
            InodeKind::Symlink { .. } => {
                return Err(FsError::with_path(
                    ErrorCode::Eperm,
                    format!("hard links to symbolic links are not permitted: {existing}"),
                    existing,
                ))
            }
        };
        let (parent, name) = match resolve_inner(&inner, new, false)? {
            Resolution::Found { .. } => return Err(FsError::exists(new)),
            Resolution::Missing { parent, name, .. } => (parent, name),
        };
        PathValidator::validate_name(&name)?;
        inner.attach(parent, &name, src_ino)?;
        let now = now_millis();
        let inode = inner.inodes.get_mut(&src_ino).expect("linked inode exists");
        inode.nlink += 1;
        inode.ctime = now;
        Ok(LinkOutcome { ino: src_ino, hash, size, nlink: inode.nlink })
    }

    /// Create a symlink storing `target` verbatim. Target existence is not
    /// checked.
    pub fn symlink(&self, target: &str, link_path: &str) -> FsResult<InodeId> {
        let mut inner = self.write();
        let (parent, name) = match resolve_inner(&inner, link_path, false)? {
            Resolution::Found { .. } => return Err(FsError::exists(link_path)),
            Resolution::Missing { parent, name, .. } => (parent, name),
        };
        PathValidator::validate_name(&name)?;
        let ino = inner.alloc_ino();
        inner.inodes.insert(ino, Inode::new_symlink(ino, target.to_string()));
        inner.attach(parent, &name, ino)?;
        Ok(ino)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.update_inode(path, |inode| inode.mode = mode & 0o777)
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.update_inode(path, |inode| {
            inode.uid = uid;
            inode.gid = gid;
        })
    }

    pub fn utimes(&self, path: &str, atime: u64, mtime: u64) -> FsResult<()> {
        self.update_inode(path, |inode| {
            inode.atime = atime;
            inode.mtime = mtime;
        })
    }

    fn update_inode(&self, path: &str, update: impl FnOnce(&mut Inode)) -> FsResult<()> {
        let mut inner = self.write();
        let ino = match resolve_inner(&inner, path, true)? {
            Resolution::Found { ino, .. } => ino,
            Resolution::Missing { .. } => return Err(FsError::not_found(path)),
        };
        let inode = inner.inodes.get_mut(&ino).expect("resolved inode exists");
        update(inode);
        inode.ctime = now_millis();
        Ok(())
    }
}

impl GraphInner {
    fn alloc_ino(&mut self) -> InodeId {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    /// Add a directory entry, bumping the parent's mtime/ctime.
    fn attach(&mut self, parent: InodeId, name: &str, child: InodeId) -> FsResult<()> {
        let now = now_millis();
        let parent_inode = self
            .inodes
            .get_mut(&parent)
            .ok_or_else(|| FsError::internal("parent inode vanished"))?;
        let InodeKind::Directory { children } = &mut parent_inode.kind else {
            return Err(FsError::not_dir(name));
        };
        if children.contains_key(name) {
            return Err(FsError::exists(name));
        }
        children.insert(name.to_string(), child);
        parent_inode.mtime = now;
        parent_inode.ctime = now;
        Ok(())
    }

    /// Remove a non-directory entry and drop one link.
    fn detach_nondir(
        &mut self,
        parent: InodeId,
        name: &str,
        ino: InodeId,
        path: &str,
    ) -> UnlinkOutcome {
        let now = now_millis();
        if let Some(InodeKind::Directory { children }) =
            self.inodes.get_mut(&parent).map(|p| &mut p.kind)
        {
            children.remove(name);
        }
        if let Some(p) = self.inodes.get_mut(&parent) {
            p.mtime = now;
            p.ctime = now;
        }
        let inode = self.inodes.get_mut(&ino).expect("detached inode exists");
        inode.nlink = inode.nlink.saturating_sub(1);
        inode.ctime = now;
        let hash = inode.content_hash().map(str::to_string);
        let inode_destroyed = inode.nlink == 0;
        if inode_destroyed {
            self.inodes.remove(&ino);
        }
        UnlinkOutcome { ino, path: path.to_string(), hash, inode_destroyed }
    }

    /// Remove an empty directory entry and its inode.
    fn detach_empty_dir(&mut self, parent: InodeId, name: &str, ino: InodeId) {
        let now = now_millis();
        if let Some(InodeKind::Directory { children }) =
            self.inodes.get_mut(&parent).map(|p| &mut p.kind)
        {
            children.remove(name);
        }
        if let Some(p) = self.inodes.get_mut(&parent) {
            p.mtime = now;
            p.ctime = now;
            p.nlink = p.nlink.saturating_sub(1);
        }
        self.inodes.remove(&ino);
    }
}

/// Pre-order subtree collection: `(canonical, depth, inode)`.
fn collect_subtree(
    inner: &GraphInner,
    dir: InodeId,
    dir_path: &str,
    depth: usize,
    out: &mut Vec<(String, usize, Inode)>,
) {
    let Some(inode) = inner.inodes.get(&dir) else { return };
    let InodeKind::Directory { ref children } = inode.kind else { return };
    for (name, child_ino) in children {
        let Some(child) = inner.inodes.get(child_ino) else { continue };
        let child_path = join(dir_path, name);
        out.push((child_path.clone(), depth, child.clone()));
        if child.is_dir() {
            collect_subtree(inner, *child_ino, &child_path, depth + 1, out);
        }
    }
}

/// Walk `path` from the root, following symlinks on intermediate components
/// and, when `follow_terminal`, on the final one. The chain-length bound
/// turns cycles into `ELOOP`.
fn resolve_inner(inner: &GraphInner, path: &str, follow_terminal: bool) -> FsResult<Resolution> {
    debug_assert!(path.starts_with('/'));
    let mut queue: VecDeque<String> =
        path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
    // Canonical stack of (name, ino); the implicit bottom is the root.
    let mut canon: Vec<(String, InodeId)> = Vec::new();
    let mut followed = 0usize;

    while let Some(seg) = queue.pop_front() {
        match seg.as_str() {
            "." => continue,
            ".." => {
                canon.pop();
                continue;
            }
            _ => {}
        }

        let dir_ino = canon.last().map_or(ROOT_INO, |(_, ino)| *ino);
        let dir = inner
            .inodes
            .get(&dir_ino)
            .ok_or_else(|| FsError::internal("dangling directory entry"))?;
        let InodeKind::Directory { ref children } = dir.kind else {
            return Err(FsError::not_dir(path));
        };

        let Some(&child_ino) = children.get(&seg) else {
            if queue.is_empty() {
                let parent_path = canonical_path(&canon);
                return Ok(Resolution::Missing { parent: dir_ino, parent_path, name: seg });
            }
            return Err(FsError::not_found(path));
        };

        let child = &inner.inodes[&child_ino];
        if let InodeKind::Symlink { ref target } = child.kind {
            if !queue.is_empty() || follow_terminal {
                followed += 1;
                if followed > inner.loop_limit {
                    return Err(FsError::symlink_loop(path));
                }
                if target.starts_with('/') {
                    canon.clear();
                }
                for part in target.split('/').filter(|s| !s.is_empty()).rev() {
                    queue.push_front(part.to_string());
                }
                continue;
            }
        }
        canon.push((seg, child_ino));
    }

    let ino = canon.last().map_or(ROOT_INO, |(_, ino)| *ino);
    Ok(Resolution::Found { ino, canonical: canonical_path(&canon) })
}

fn canonical_path(canon: &[(String, InodeId)]) -> String {
    if canon.is_empty() {
        "/".to_string()
    } else {
        let mut out = String::new();
        for (name, _) in canon {
            out.push('/');
            out.push_str(name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> InodeGraph {
        InodeGraph::new(40)
    }

    fn touch(g: &InodeGraph, path: &str) {
        g.create_or_update_file(path, None, "h", 0).unwrap();
    }

    #[test]
    fn create_lookup_roundtrip() {
        let g = graph();
        g.mkdir("/d", false, 0o755).unwrap();
        touch(&g, "/d/f");
        let inode = g.lookup("/d/f", true).unwrap();
        assert!(inode.is_file());
        // Only subdirectories add links to a directory.
        assert_eq!(g.lookup("/d", true).unwrap().nlink, 2);
        g.mkdir("/d/sub", false, 0o755).unwrap();
        assert_eq!(g.lookup("/d", true).unwrap().nlink, 3);
    }

    #[test]
    fn missing_parent_is_enoent() {
        let g = graph();
        let err = g.create_or_update_file("/no/such/f", None, "h", 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::Enoent);
    }

    #[test]
    fn mkdir_non_recursive_semantics() {
        let g = graph();
        g.mkdir("/a", false, 0o755).unwrap();
        assert_eq!(g.mkdir("/a", false, 0o755).unwrap_err().code, ErrorCode::Eexist);
        assert_eq!(g.mkdir("/x/y", false, 0o755).unwrap_err().code, ErrorCode::Enoent);
    }

    #[test]
    fn mkdir_recursive_is_idempotent() {
        let g = graph();
        let created = g.mkdir("/a/b/c", true, 0o755).unwrap();
        assert_eq!(created, vec!["/a", "/a/b", "/a/b/c"]);
        assert!(g.mkdir("/a/b/c", true, 0o755).unwrap().is_empty());

        touch(&g, "/a/file");
        assert_eq!(g.mkdir("/a/file/d", true, 0o755).unwrap_err().code, ErrorCode::Enotdir);
        assert_eq!(g.mkdir("/a/file", true, 0o755).unwrap_err().code, ErrorCode::Eexist);
    }

    #[test]
    fn unlink_decrements_and_destroys() {
        let g = graph();
        touch(&g, "/f");
        let outcome = g.unlink("/f").unwrap();
        assert!(outcome.inode_destroyed);
        assert_eq!(outcome.hash.as_deref(), Some("h"));
        assert_eq!(g.lookup("/f", true).unwrap_err().code, ErrorCode::Enoent);
    }

    #[test]
    fn unlink_directory_is_eisdir() {
        let g = graph();
        g.mkdir("/d", false, 0o755).unwrap();
        assert_eq!(g.unlink("/d").unwrap_err().code, ErrorCode::Eisdir);
    }

    #[test]
    fn hard_link_shares_the_inode() {
        let g = graph();
        touch(&g, "/a");
        let link = g.link("/a", "/b").unwrap();
        assert_eq!(link.nlink, 2);

        let a = g.lookup("/a", true).unwrap();
        let b = g.lookup("/b", true).unwrap();
        assert_eq!(a.ino, b.ino);

        let outcome = g.unlink("/a").unwrap();
        assert!(!outcome.inode_destroyed);
        let outcome = g.unlink("/b").unwrap();
        assert!(outcome.inode_destroyed);
    }

    #[test]
    fn link_of_directory_is_eperm() {
        let g = graph();
        g.mkdir("/d", false, 0o755).unwrap();
        assert_eq!(g.link("/d", "/d2").unwrap_err().code, ErrorCode::Eperm);
    }

    #[test]
    fn rmdir_nonempty_requires_recursive() {
        let g = graph();
        g.mkdir("/d", false, 0o755).unwrap();
        touch(&g, "/d/f");
        assert_eq!(g.rmdir("/d", false).unwrap_err().code, ErrorCode::Enotempty);

        let removed = g.rmdir("/d", true).unwrap();
        let paths: Vec<&str> = removed.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/d/f", "/d"]);
        assert_eq!(g.lookup("/d", true).unwrap_err().code, ErrorCode::Enoent);
    }

    #[test]
    fn rmdir_removes_deepest_first() {
        let g = graph();
        g.mkdir("/d/e/f", true, 0o755).unwrap();
        touch(&g, "/d/e/f/x");
        touch(&g, "/d/y");
        let removed = g.rmdir("/d", true).unwrap();
        let paths: Vec<&str> = removed.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/d/e/f/x", "/d/e/f", "/d/y", "/d/e", "/d"]);
    }

    #[test]
    fn rename_file_and_overwrite_rules() {
        let g = graph();
        touch(&g, "/a");
        let outcome = g.rename("/a", "/b").unwrap();
        assert!(!outcome.is_dir);
        assert!(outcome.replaced.is_none());
        assert_eq!(g.lookup("/a", true).unwrap_err().code, ErrorCode::Enoent);
        assert!(g.lookup("/b", true).is_ok());

        // File over file: permitted, replaced entry reported.
        touch(&g, "/c");
        let outcome = g.rename("/b", "/c").unwrap();
        assert!(outcome.replaced.unwrap().inode_destroyed);

        // File over directory: EISDIR.
        g.mkdir("/d", false, 0o755).unwrap();
        assert_eq!(g.rename("/c", "/d").unwrap_err().code, ErrorCode::Eisdir);
    }

    #[test]
    fn rename_directory_rules() {
        let g = graph();
        g.mkdir("/src", false, 0o755).unwrap();
        touch(&g, "/src/f");
        g.mkdir("/empty", false, 0o755).unwrap();
        g.mkdir("/full", false, 0o755).unwrap();
        touch(&g, "/full/g");

        // Dir over empty dir: allowed.
        let outcome = g.rename("/src", "/empty").unwrap();
        assert_eq!(outcome.moved_paths[0], ("/src".to_string(), "/empty".to_string()));
        assert!(outcome.moved_paths.contains(&("/src/f".to_string(), "/empty/f".to_string())));
        assert!(g.lookup("/empty/f", true).is_ok());

        // Dir over non-empty dir: EEXIST.
        assert_eq!(g.rename("/empty", "/full").unwrap_err().code, ErrorCode::Eexist);

        // Dir over file: ENOTDIR.
        touch(&g, "/plain");
        assert_eq!(g.rename("/empty", "/plain").unwrap_err().code, ErrorCode::Enotdir);

        // Into its own subtree: EINVAL.
        assert_eq!(g.rename("/empty", "/empty/sub").unwrap_err().code, ErrorCode::Einval);
    }

    #[test]
    fn symlink_resolution_and_readlink() {
        let g = graph();
        g.mkdir("/d", false, 0o755).unwrap();
        touch(&g, "/d/f");
        g.symlink("/d", "/link").unwrap();

        assert!(g.lookup("/link/f", true).unwrap().is_file());
        assert_eq!(g.readlink("/link").unwrap(), "/d");
        assert_eq!(g.readlink("/d/f").unwrap_err().code, ErrorCode::Einval);
        assert_eq!(g.realpath("/link/f").unwrap(), "/d/f");
    }

    #[test]
    fn relative_symlink_targets_resolve_against_the_link_dir() {
        let g = graph();
        g.mkdir("/a/b", true, 0o755).unwrap();
        touch(&g, "/a/target");
        g.symlink("../target", "/a/b/rel").unwrap();
        assert_eq!(g.realpath("/a/b/rel").unwrap(), "/a/target");
    }

    #[test]
    fn symlink_cycle_is_eloop_but_lstat_succeeds() {
        let g = graph();
        g.symlink("/l2", "/l1").unwrap();
        g.symlink("/l1", "/l2").unwrap();

        assert_eq!(g.lookup("/l1", true).unwrap_err().code, ErrorCode::Eloop);
        assert_eq!(g.stat("/l1").unwrap_err().code, ErrorCode::Eloop);
        let st = g.lstat("/l1").unwrap();
        assert!(st.is_symbolic_link);
    }

    #[test]
    fn dangling_symlink_lstat_vs_stat() {
        let g = graph();
        g.symlink("/nowhere", "/dangle").unwrap();
        assert_eq!(g.stat("/dangle").unwrap_err().code, ErrorCode::Enoent);
        assert!(g.lstat("/dangle").unwrap().is_symbolic_link);
    }

    #[test]
    fn readdir_is_sorted() {
        let g = graph();
        g.mkdir("/d", false, 0o755).unwrap();
        touch(&g, "/d/zeta");
        touch(&g, "/d/alpha");
        g.mkdir("/d/midl", false, 0o755).unwrap();
        let names: Vec<String> = g.readdir("/d").unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "midl", "zeta"]);
    }

    #[test]
    fn chmod_chown_utimes_touch_ctime() {
        let g = graph();
        touch(&g, "/f");
        g.chmod("/f", 0o600).unwrap();
        let inode = g.lookup("/f", true).unwrap();
        assert_eq!(inode.mode, 0o600);

        g.chown("/f", 42, 43).unwrap();
        let inode = g.lookup("/f", true).unwrap();
        assert_eq!((inode.uid, inode.gid), (42, 43));

        g.utimes("/f", 1000, 2000).unwrap();
        let inode = g.lookup("/f", true).unwrap();
        assert_eq!((inode.atime, inode.mtime), (1000, 2000));
    }

    #[test]
    fn overwrite_reports_previous_hash() {
        let g = graph();
        g.create_or_update_file("/f", None, "h1", 2).unwrap();
        let (_, old, created) = g.create_or_update_file("/f", None, "h2", 3).unwrap();
        assert!(!created);
        assert_eq!(old.as_deref(), Some("h1"));
        let inode = g.lookup("/f", true).unwrap();
        assert_eq!(inode.content_hash(), Some("h2"));
        assert_eq!(inode.size(), 3);
    }
}
