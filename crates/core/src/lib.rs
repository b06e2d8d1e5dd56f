//! Strata core — a tiered virtual filesystem engine.
//!
//! The engine keeps a POSIX-shaped namespace (inodes, directory entries,
//! symlinks, hard links, permission bits) over content-addressed storage with
//! reference counting, and places object bytes across hot/warm/cold tiers
//! with an authoritative path-keyed metadata index. Mutations emit change
//! events for the watch layer; a scoped capability surface gates programmatic
//! callers.

pub mod capability;
pub mod cas;
pub mod config;
pub mod error;
pub mod events;
pub mod glob;
pub mod graph;
pub mod index;
pub mod inode;
pub mod listing;
pub mod path;
pub mod refcount;
pub mod tier;
pub mod vfs;

pub use capability::{FsCapability, FsScope};
pub use cas::{BlobBucket, BlobStat, ContentStore, MemoryBucket};
pub use config::{EngineConfig, PromotionPolicy, TierLimits};
pub use error::{ErrorCode, FsError, FsResult};
pub use events::{ChangeEvent, ChangeKind, EventSink, NullSink};
pub use index::{MemoryMetadataStore, MetadataIndex, MetadataStore, TierMetadata};
pub use inode::{FileStat, FileType};
pub use listing::{
    ListOptions, ListResult, ListSort, SearchMatch, SearchOptions, SortOrder, TreeFormat,
    TreeOptions, TreeOutput,
};
pub use path::PathValidator;
pub use refcount::{RefCountEntry, RefCountMetrics, RefCountStore};
pub use tier::{TierKind, TieredPlacement};
pub use vfs::{EngineStats, ExistsResult, ReadResult, StorageBackends, VirtualFs, WriteResult};
