//! # kurafs-vfs
//!
//! The virtual-filesystem core of kurafs. Key components:
//!
//! - [`FilesystemBackend`] - contract every filesystem driver implements
//! - [`Filesystem`] - mount table, path resolution, fd arena, dispatch
//! - [`MountPoint`] - one backend bound to one disk handle and target path
//! - [`MemFs`] - in-memory backend (scratch mounts, testing)
//! - [`Notifier`] - file-change publish/subscribe
//! - [`Storage`] - context object bundling disk manager and filesystem
//!
//! ## Design decisions
//!
//! - **Single lock, wrapper/core split**: every public [`Filesystem`]
//!   operation takes one `parking_lot::Mutex` guarding the backend
//!   registry, mount table, partition-usage set and fd arena. Internal
//!   helpers operate on the already-locked state, so nothing re-acquires.
//! - **Longest-prefix routing**: a lookup path is served by the most
//!   specific mount target that prefixes it on a segment boundary.
//! - **Token-based backend handles**: backends identify open files and
//!   directory iterators by opaque `u64` tokens; the caller-visible fd
//!   namespace (starting at [`FIRST_FILE_DESCRIPTOR`]) is owned here.

pub mod backends;
mod backend;
mod context;
mod cwd;
mod fdtable;
mod filesystem;
mod mount;
mod notifier;
pub mod path;

pub use backend::{DirToken, FileToken, FilesystemBackend};
pub use backends::MemFs;
pub use context::Storage;
pub use cwd::{CwdProvider, ThreadCwd};
pub use fdtable::FIRST_FILE_DESCRIPTOR;
pub use filesystem::{Dir, Filesystem, MountInfo};
pub use mount::{MountFlags, MountPoint};
pub use notifier::{FileEvent, Notifier, SubscriberId};

pub use kurafs_types::{DirEntry, FileAttr, FileType, FsError, FsResult, OpenFlags, StatVfs};
