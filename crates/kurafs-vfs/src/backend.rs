//! Filesystem backend contract.

use std::io::SeekFrom;
use std::sync::{Arc, Weak};

use kurafs_blkdev::{DiskHandle, DiskManager};
use kurafs_types::{DirEntry, FileAttr, FsResult, OpenFlags, StatVfs};

use crate::mount::{MountFlags, MountPoint};

/// Opaque backend-issued identifier for an open file.
pub type FileToken = u64;

/// Opaque backend-issued identifier for a directory iterator.
pub type DirToken = u64;

/// Contract every pluggable filesystem driver implements.
///
/// Backends are registered with the [`Filesystem`](crate::Filesystem)
/// under a name ("vfat", "littlefs", ...) and dispatched through this
/// trait; the core never inspects a backend's concrete type.
///
/// All paths handed to a backend are relative to the mount root, with no
/// leading `/` (empty string = mount root). Open files and directory
/// iterators are identified by tokens the backend mints; the VFS core owns
/// the caller-visible fd namespace and maps fds to `(mount, token)` pairs.
///
/// Read-only enforcement happens in the core before dispatch; backends do
/// not re-check mount flags.
pub trait FilesystemBackend: Send + Sync {
    /// Called once when the backend is registered, with a weak reference
    /// to the disk manager for drivers that resolve devices lazily. A
    /// failure aborts the registration.
    fn finalize_registration(&self, disks: Weak<DiskManager>) -> FsResult<()> {
        let _ = disks;
        Ok(())
    }

    /// Pre-allocate the mount point that `mount` will initialize. The
    /// default is sufficient for backends that key their per-mount state
    /// by [`MountPoint::id`].
    fn mount_prealloc(
        &self,
        disk: DiskHandle,
        target: &str,
        flags: MountFlags,
    ) -> Arc<MountPoint> {
        Arc::new(MountPoint::new(disk, target, flags))
    }

    /// Mount the filesystem on the pre-allocated mount point. `data` is
    /// backend-specific configuration passed through from the caller. On
    /// failure the core discards the mount point and records nothing.
    fn mount(&self, mount: &Arc<MountPoint>, data: Option<&[u8]>) -> FsResult<()>;

    /// Unmount. On failure the mount stays in the table and the call is
    /// retryable.
    fn umount(&self, mount: &Arc<MountPoint>) -> FsResult<()>;

    /// Number of currently active mounts of this backend. A backend with
    /// active mounts cannot be unregistered.
    fn mount_count(&self) -> u32;

    // File operations.

    /// Open a file, returning a backend token.
    fn open(
        &self,
        mount: &Arc<MountPoint>,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> FsResult<FileToken>;

    /// Read at the current position, returning the number of bytes read.
    fn read(&self, mount: &Arc<MountPoint>, file: FileToken, buf: &mut [u8]) -> FsResult<usize>;

    /// Write at the current position, returning the number of bytes written.
    fn write(&self, mount: &Arc<MountPoint>, file: FileToken, buf: &[u8]) -> FsResult<usize>;

    /// Reposition the file offset, returning the new absolute position.
    fn seek(&self, mount: &Arc<MountPoint>, file: FileToken, pos: SeekFrom) -> FsResult<u64>;

    /// Close an open file and release its token.
    fn close(&self, mount: &Arc<MountPoint>, file: FileToken) -> FsResult<()>;

    /// Attributes of an open file.
    fn fstat(&self, mount: &Arc<MountPoint>, file: FileToken) -> FsResult<FileAttr>;

    /// Attributes by path.
    fn stat(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<FileAttr>;

    // Directory mutation.

    /// Create a directory.
    fn mkdir(&self, mount: &Arc<MountPoint>, path: &str, mode: u32) -> FsResult<()>;

    /// Remove an empty directory.
    fn rmdir(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<()>;

    /// Remove a file.
    fn unlink(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<()>;

    /// Rename within this mount.
    fn rename(&self, mount: &Arc<MountPoint>, from: &str, to: &str) -> FsResult<()>;

    // Directory iteration.

    /// Open a directory iterator, returning a backend token.
    fn diropen(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<DirToken>;

    /// Next entry, or [`FsError::NoData`](kurafs_types::FsError::NoData)
    /// at the end of the stream.
    fn dirnext(&self, mount: &Arc<MountPoint>, dir: DirToken) -> FsResult<DirEntry>;

    /// Rewind an iterator to the first entry.
    fn dirreset(&self, mount: &Arc<MountPoint>, dir: DirToken) -> FsResult<()>;

    /// Close a directory iterator and release its token.
    fn dirclose(&self, mount: &Arc<MountPoint>, dir: DirToken) -> FsResult<()>;

    /// Filesystem statistics for the mount containing `path`.
    fn stat_vfs(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<StatVfs>;
}
