//! Inode representation and stat projection.
//!
//! An inode's kind is a tagged variant; the `is_*` flags surfaced by `stat`
//! are projections of the tag, never stored state.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

pub type InodeId = u64;

pub const MODE_TYPE_FILE: u32 = 0o100000;
pub const MODE_TYPE_DIR: u32 = 0o040000;
pub const MODE_TYPE_SYMLINK: u32 = 0o120000;
pub const MODE_PERM_MASK: u32 = 0o777;

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_SYMLINK_MODE: u32 = 0o777;

const BLOCK_SIZE: u64 = 512;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What an inode is, with the kind-specific payload inline.
#[derive(Debug, Clone)]
pub enum InodeKind {
    Regular { content_hash: String, size: u64 },
    Directory { children: BTreeMap<String, InodeId> },
    Symlink { target: String },
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub ino: InodeId,
    pub kind: InodeKind,
    /// Permission bits only (lower 9); the type marker is added by `stat`.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub birthtime: u64,
}

impl Inode {
    pub fn new_regular(ino: InodeId, mode: u32, content_hash: String, size: u64) -> Self {
        let now = now_millis();
        Inode {
            ino,
            kind: InodeKind::Regular { content_hash, size },
            mode: mode & MODE_PERM_MASK,
            uid: 0,
            gid: 0,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }

    pub fn new_directory(ino: InodeId, mode: u32) -> Self {
        let now = now_millis();
        Inode {
            ino,
            kind: InodeKind::Directory { children: BTreeMap::new() },
            mode: mode & MODE_PERM_MASK,
            uid: 0,
            gid: 0,
            // `.` and `..` are implied.
            nlink: 2,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }

    pub fn new_symlink(ino: InodeId, target: String) -> Self {
        let now = now_millis();
        Inode {
            ino,
            kind: InodeKind::Symlink { target },
            mode: DEFAULT_SYMLINK_MODE,
            uid: 0,
            gid: 0,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, InodeKind::Regular { .. })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, InodeKind::Directory { .. })
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, InodeKind::Symlink { .. })
    }

    pub fn file_type(&self) -> FileType {
        match self.kind {
            InodeKind::Regular { .. } => FileType::File,
            InodeKind::Directory { .. } => FileType::Directory,
            InodeKind::Symlink { .. } => FileType::Symlink,
        }
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            InodeKind::Regular { size, .. } => *size,
            InodeKind::Directory { .. } => 0,
            InodeKind::Symlink { target } => target.len() as u64,
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        match &self.kind {
            InodeKind::Regular { content_hash, .. } => Some(content_hash),
            _ => None,
        }
    }

    pub fn stat(&self) -> FileStat {
        let type_marker = match self.kind {
            InodeKind::Regular { .. } => MODE_TYPE_FILE,
            InodeKind::Directory { .. } => MODE_TYPE_DIR,
            InodeKind::Symlink { .. } => MODE_TYPE_SYMLINK,
        };
        let size = self.size();
        FileStat {
            dev: 1,
            ino: self.ino,
            mode: type_marker | (self.mode & MODE_PERM_MASK),
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            size,
            blksize: 4096,
            blocks: size.div_ceil(BLOCK_SIZE),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            birthtime: self.birthtime,
            is_file: self.is_file(),
            is_directory: self.is_dir(),
            is_symbolic_link: self.is_symlink(),
            is_block_device: false,
            is_character_device: false,
            is_fifo: false,
            is_socket: false,
        }
    }
}

/// Observable kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(FileType::File),
            "directory" => Some(FileType::Directory),
            "symlink" => Some(FileType::Symlink),
            _ => None,
        }
    }
}

impl Serialize for FileType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The composite stat structure surfaced to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub birthtime: u64,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symbolic_link: bool,
    pub is_block_device: bool,
    pub is_character_device: bool,
    pub is_fifo: bool,
    pub is_socket: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_projects_the_kind_tag() {
        let file = Inode::new_regular(2, 0o644, "ab".into(), 1025);
        let st = file.stat();
        assert!(st.is_file && !st.is_directory && !st.is_symbolic_link);
        assert_eq!(st.mode, MODE_TYPE_FILE | 0o644);
        assert_eq!(st.blocks, 3); // ceil(1025 / 512)

        let dir = Inode::new_directory(3, 0o755);
        let st = dir.stat();
        assert!(st.is_directory);
        assert_eq!(st.nlink, 2);
        assert_eq!(st.mode, MODE_TYPE_DIR | 0o755);

        let link = Inode::new_symlink(4, "/target".into());
        let st = link.stat();
        assert!(st.is_symbolic_link);
        assert_eq!(st.size, 7);
    }

    #[test]
    fn mode_is_masked_to_permission_bits() {
        let file = Inode::new_regular(2, 0o40777, "ab".into(), 0);
        assert_eq!(file.mode, 0o777);
    }
}
