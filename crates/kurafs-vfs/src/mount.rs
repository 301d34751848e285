//! Mount flags and mount points.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bitflags::bitflags;

use kurafs_blkdev::DiskHandle;

bitflags! {
    /// Mount flags accepted by [`Filesystem::mount`](crate::Filesystem::mount).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MountFlags: u32 {
        /// Reject write-class and directory-mutation operations.
        const READ_ONLY = 0x01;
        /// Update the flags of an existing mount instead of mounting.
        const REMOUNT = 0x02;
    }
}

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// One backend instance bound to one disk handle and one target path.
///
/// Created by the backend's `mount_prealloc`, inserted into the mount
/// table only after the backend's `mount` succeeds. The read-only flag is
/// the single piece of mutable state: remount toggles it in place while
/// open file handles stay valid.
pub struct MountPoint {
    id: u64,
    target: String,
    disk: DiskHandle,
    read_only: AtomicBool,
}

impl MountPoint {
    /// Create a mount point bound to `disk` at normalized `target`.
    pub fn new(disk: DiskHandle, target: &str, flags: MountFlags) -> Self {
        Self {
            id: NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed),
            target: target.to_owned(),
            disk,
            read_only: AtomicBool::new(flags.contains(MountFlags::READ_ONLY)),
        }
    }

    /// Unique id, used by backends to key per-mount state.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Normalized target path.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Handle to the underlying device or partition.
    pub fn disk(&self) -> &DiskHandle {
        &self.disk
    }

    /// Current read-only state. Checked on every write-class call, so a
    /// remount takes effect immediately.
    pub fn read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    /// Toggle the read-only state (remount).
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Current flags as a bitmask.
    pub fn flags(&self) -> MountFlags {
        if self.read_only() {
            MountFlags::READ_ONLY
        } else {
            MountFlags::empty()
        }
    }
}

impl std::fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPoint")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("disk", &self.disk.name())
            .field("read_only", &self.read_only())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flag_bits_are_rejected() {
        assert!(MountFlags::from_bits(0x04).is_none());
        assert!(MountFlags::from_bits(0x03).is_some());
    }
}
