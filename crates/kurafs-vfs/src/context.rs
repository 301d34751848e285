//! Top-level storage context tying disks and the VFS together.

use std::sync::Arc;

use kurafs_blkdev::DiskManager;

use crate::filesystem::Filesystem;

/// Owner of the storage stack: one disk manager and one filesystem built
/// over it. This is the object a platform initializes at boot and hands
/// out to everything that does file I/O.
pub struct Storage {
    disks: Arc<DiskManager>,
    vfs: Arc<Filesystem>,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Create an empty storage context with no devices or backends.
    pub fn new() -> Self {
        let disks = Arc::new(DiskManager::new());
        let vfs = Arc::new(Filesystem::new(Arc::clone(&disks)));
        Self { disks, vfs }
    }

    /// The disk manager.
    pub fn disks(&self) -> &Arc<DiskManager> {
        &self.disks
    }

    /// The virtual filesystem.
    pub fn vfs(&self) -> &Arc<Filesystem> {
        &self.vfs
    }
}
