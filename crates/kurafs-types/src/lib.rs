//! # kurafs-types
//!
//! Shared data model for the kurafs storage stack: the errno-style error
//! type used across every crate, file attributes, directory entries, open
//! flags and filesystem statistics.
//!
//! These types are plain data. Device drivers, the partition layer and the
//! VFS core all speak in terms of them, and higher layers can serialize
//! them for diagnostics or IPC.

mod error;
mod types;

pub use error::{FsError, FsResult};
pub use types::{DirEntry, FileAttr, FileType, OpenFlags, StatVfs};
