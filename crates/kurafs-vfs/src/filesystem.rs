//! VFS core: backend registry, mount table, path resolution and dispatch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use kurafs_blkdev::DiskManager;
use kurafs_types::{DirEntry, FileAttr, FsError, FsResult, OpenFlags, StatVfs};

use crate::backend::{DirToken, FileToken, FilesystemBackend};
use crate::cwd::{CwdProvider, ThreadCwd};
use crate::fdtable::FdTable;
use crate::mount::{MountFlags, MountPoint};
use crate::notifier::{FileEvent, Notifier};
use crate::path;

/// Partition type byte to filesystem name, for `fs_type = "auto"`.
/// First match wins.
const FS_TYPE_TABLE: &[(u8, &str)] = &[
    (0x0B, "vfat"),
    (0x0C, "vfat"),
    (0x0E, "vfat"),
    (0x83, "ext4"),
    (0x9E, "littlefs"),
];

struct MountEntry {
    point: Arc<MountPoint>,
    backend: Arc<dyn FilesystemBackend>,
    /// Key under which the partition-usage marker was taken.
    device: String,
}

struct OpenFile {
    point: Arc<MountPoint>,
    backend: Arc<dyn FilesystemBackend>,
    token: FileToken,
    /// Absolute path, kept for change notification on close.
    path: String,
}

/// Everything guarded by the single VFS lock.
struct VfsState {
    backends: HashMap<String, Arc<dyn FilesystemBackend>>,
    mounts: BTreeMap<String, MountEntry>,
    used_partitions: HashSet<String>,
    files: FdTable<OpenFile>,
}

/// Description of one active mount.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// Normalized target path.
    pub target: String,
    /// Device or partition name the mount was created from.
    pub device: String,
    /// Current read-only state.
    pub read_only: bool,
}

/// An open directory iterator.
///
/// Obtained from [`Filesystem::diropen`] and returned to
/// [`Filesystem::dirclose`] when done.
pub struct Dir {
    point: Arc<MountPoint>,
    backend: Arc<dyn FilesystemBackend>,
    token: DirToken,
}

/// The virtual filesystem.
///
/// Owns the backend registry, the mount table, the partition-usage set and
/// the file-descriptor arena, all guarded by one mutex. Public operations
/// acquire the lock once and run to completion; they block the calling
/// thread for the duration of any backend I/O and are never cancelled
/// midway.
pub struct Filesystem {
    disks: Arc<DiskManager>,
    notifier: Notifier,
    cwd: Arc<dyn CwdProvider>,
    state: Mutex<VfsState>,
}

impl Filesystem {
    /// Create a filesystem over the given disk manager, resolving relative
    /// paths against the per-thread working directory.
    pub fn new(disks: Arc<DiskManager>) -> Self {
        Self::with_cwd(disks, Arc::new(ThreadCwd))
    }

    /// Create a filesystem with a custom working-directory provider.
    pub fn with_cwd(disks: Arc<DiskManager>, cwd: Arc<dyn CwdProvider>) -> Self {
        Self {
            disks,
            notifier: Notifier::new(),
            cwd,
            state: Mutex::new(VfsState {
                backends: HashMap::new(),
                mounts: BTreeMap::new(),
                used_partitions: HashSet::new(),
                files: FdTable::new(),
            }),
        }
    }

    /// The disk manager this filesystem resolves devices through.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disks
    }

    /// File-change notifier fed by this filesystem.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // ------------------------------------------------------------------
    // Backend registry
    // ------------------------------------------------------------------

    /// Register a filesystem backend under `name`.
    pub fn register_filesystem(
        &self,
        name: &str,
        backend: Arc<dyn FilesystemBackend>,
    ) -> FsResult<()> {
        let mut state = self.state.lock();
        if state.backends.contains_key(name) {
            return Err(FsError::already_exists(name));
        }
        backend.finalize_registration(Arc::downgrade(&self.disks))?;
        state.backends.insert(name.to_owned(), backend);
        info!("registered filesystem backend {name}");
        Ok(())
    }

    /// Unregister a backend. Fails while any of its mounts is active.
    pub fn unregister_filesystem(&self, name: &str) -> FsResult<()> {
        let mut state = self.state.lock();
        match state.backends.get(name) {
            Some(backend) if backend.mount_count() > 0 => Err(FsError::busy(name)),
            Some(_) => {
                state.backends.remove(name);
                Ok(())
            }
            None => Err(FsError::not_found(name)),
        }
    }

    // ------------------------------------------------------------------
    // Mounting
    // ------------------------------------------------------------------

    /// Mount `device` at `target`.
    ///
    /// `fs_type` names a registered backend, or `"auto"` to derive it from
    /// the partition's type byte. `flags` is a [`MountFlags`] bitmask;
    /// with [`MountFlags::REMOUNT`] set the existing mount at `target` has
    /// its read-only state updated in place and `device`/`fs_type` are
    /// ignored. `data` is passed through to the backend untouched.
    pub fn mount(
        &self,
        device: &str,
        target: &str,
        fs_type: &str,
        flags: u32,
        data: Option<&[u8]>,
    ) -> FsResult<()> {
        if target.is_empty() || !target.starts_with('/') || (target.len() < 2 && target != "/") {
            return Err(FsError::invalid_argument(format!("mount target {target:?}")));
        }
        let flags = MountFlags::from_bits(flags)
            .ok_or_else(|| FsError::not_supported(format!("mount flags {flags:#x}")))?;
        let target = path::normalize(target);

        let mut state = self.state.lock();
        if let Some(entry) = state.mounts.get(&target) {
            if flags.contains(MountFlags::REMOUNT) {
                let read_only = flags.contains(MountFlags::READ_ONLY);
                entry.point.set_read_only(read_only);
                info!("remounted {target} read_only={read_only}");
                return Ok(());
            }
            return Err(FsError::busy(target));
        }
        if flags.contains(MountFlags::REMOUNT) {
            // Nothing mounted there to update.
            return Err(FsError::not_found(target));
        }
        if state.used_partitions.contains(device) {
            return Err(FsError::busy(device));
        }

        let resolved = if fs_type == "auto" {
            self.detect_fs_type(device)?
        } else {
            fs_type.to_owned()
        };
        let backend = state
            .backends
            .get(&resolved)
            .cloned()
            .ok_or_else(|| FsError::no_driver(&resolved))?;
        let disk = self
            .disks
            .device_handle(device)
            .ok_or_else(|| FsError::no_such_address(device))?;

        let point = backend.mount_prealloc(disk, &target, flags & MountFlags::READ_ONLY);
        backend.mount(&point, data)?;

        state.used_partitions.insert(device.to_owned());
        state.mounts.insert(
            target.clone(),
            MountEntry {
                point,
                backend,
                device: device.to_owned(),
            },
        );
        info!("mounted {device} ({resolved}) at {target}");
        Ok(())
    }

    /// Unmount the filesystem at `target`.
    pub fn umount(&self, target: &str) -> FsResult<()> {
        let target = path::normalize(target);
        let mut state = self.state.lock();
        let entry = state
            .mounts
            .get(&target)
            .ok_or_else(|| FsError::not_found(&target))?;
        // On failure the entry stays in the table and umount is retryable.
        entry.backend.umount(&entry.point)?;
        if let Some(entry) = state.mounts.remove(&target) {
            state.used_partitions.remove(&entry.device);
        }
        info!("unmounted {target}");
        Ok(())
    }

    /// Active mounts, in target order.
    pub fn mounts(&self) -> Vec<MountInfo> {
        let state = self.state.lock();
        state
            .mounts
            .values()
            .map(|entry| MountInfo {
                target: entry.point.target().to_owned(),
                device: entry.device.clone(),
                read_only: entry.point.read_only(),
            })
            .collect()
    }

    fn detect_fs_type(&self, device: &str) -> FsResult<String> {
        let part = self
            .disks
            .partition_info(device)
            .ok_or_else(|| FsError::no_driver(format!("no partition info for {device}")))?;
        FS_TYPE_TABLE
            .iter()
            .find(|(type_id, _)| *type_id == part.type_id)
            .map(|(_, name)| {
                debug!("detected {name} on {device} (type {:#04x})", part.type_id);
                (*name).to_owned()
            })
            .ok_or_else(|| {
                FsError::no_driver(format!(
                    "no filesystem known for partition type {:#04x}",
                    part.type_id
                ))
            })
    }

    // ------------------------------------------------------------------
    // Path resolution
    // ------------------------------------------------------------------

    fn absolute(&self, p: &str) -> String {
        path::absolute(&self.cwd.current_dir(), p)
    }

    /// Longest-prefix mount lookup. Mount targets are unique, so there is
    /// always a single best match.
    fn resolve<'a>(state: &'a VfsState, abs: &str) -> FsResult<(&'a MountEntry, String)> {
        let mut best: Option<(&'a String, &'a MountEntry)> = None;
        for (target, entry) in &state.mounts {
            if !path::is_mount_prefix(target, abs) {
                continue;
            }
            if best.is_none_or(|(t, _)| target.len() > t.len()) {
                best = Some((target, entry));
            }
        }
        match best {
            Some((target, entry)) => Ok((entry, path::relative_to(target, abs).to_owned())),
            None => Err(FsError::not_found(abs)),
        }
    }

    // ------------------------------------------------------------------
    // File operations
    // ------------------------------------------------------------------

    /// Open a file and allocate a descriptor for it.
    pub fn open(&self, p: &str, flags: OpenFlags, mode: u32) -> FsResult<i32> {
        let abs = self.absolute(p);
        let mut state = self.state.lock();
        let (point, backend, rel) = {
            let (entry, rel) = Self::resolve(&state, &abs)?;
            (Arc::clone(&entry.point), Arc::clone(&entry.backend), rel)
        };
        if flags.is_write_class() && point.read_only() {
            return Err(FsError::ReadOnly);
        }
        let token = backend.open(&point, &rel, flags, mode)?;
        let fd = state.files.add(OpenFile {
            point,
            backend,
            token,
            path: abs.clone(),
        });
        drop(state);
        self.notifier.publish(&abs, FileEvent::Opened);
        Ok(fd)
    }

    /// Read from an open descriptor at its current position.
    pub fn read(&self, fd: i32, buf: &mut [u8]) -> FsResult<usize> {
        let state = self.state.lock();
        let file = state.files.get(fd).ok_or(FsError::BadDescriptor(fd))?;
        file.backend.read(&file.point, file.token, buf)
    }

    /// Write to an open descriptor at its current position.
    ///
    /// Checked against the mount's current read-only state, so a remount
    /// to read-only takes effect for descriptors opened earlier.
    pub fn write(&self, fd: i32, buf: &[u8]) -> FsResult<usize> {
        let state = self.state.lock();
        let file = state.files.get(fd).ok_or(FsError::BadDescriptor(fd))?;
        if file.point.read_only() {
            return Err(FsError::ReadOnly);
        }
        let written = file.backend.write(&file.point, file.token, buf)?;
        let path = file.path.clone();
        drop(state);
        self.notifier.publish(&path, FileEvent::Modified);
        Ok(written)
    }

    /// Reposition an open descriptor, returning the new offset.
    pub fn seek(&self, fd: i32, pos: SeekFrom) -> FsResult<u64> {
        let state = self.state.lock();
        let file = state.files.get(fd).ok_or(FsError::BadDescriptor(fd))?;
        file.backend.seek(&file.point, file.token, pos)
    }

    /// Attributes of an open descriptor.
    pub fn fstat(&self, fd: i32) -> FsResult<FileAttr> {
        let state = self.state.lock();
        let file = state.files.get(fd).ok_or(FsError::BadDescriptor(fd))?;
        file.backend.fstat(&file.point, file.token)
    }

    /// Close a descriptor. The slot is released for reuse even if the
    /// backend reports a close error.
    pub fn close(&self, fd: i32) -> FsResult<()> {
        let mut state = self.state.lock();
        let file = state.files.remove(fd).ok_or(FsError::BadDescriptor(fd))?;
        let result = file.backend.close(&file.point, file.token);
        drop(state);
        self.notifier.publish(&file.path, FileEvent::Closed);
        result
    }

    /// Attributes by path.
    pub fn stat(&self, p: &str) -> FsResult<FileAttr> {
        let abs = self.absolute(p);
        let state = self.state.lock();
        let (entry, rel) = Self::resolve(&state, &abs)?;
        entry.backend.stat(&entry.point, &rel)
    }

    /// Filesystem statistics for the mount containing `p`.
    pub fn stat_vfs(&self, p: &str) -> FsResult<StatVfs> {
        let abs = self.absolute(p);
        let state = self.state.lock();
        let (entry, rel) = Self::resolve(&state, &abs)?;
        entry.backend.stat_vfs(&entry.point, &rel)
    }

    // ------------------------------------------------------------------
    // Directory mutation
    // ------------------------------------------------------------------

    /// Create a directory.
    pub fn mkdir(&self, p: &str, mode: u32) -> FsResult<()> {
        let abs = self.absolute(p);
        let state = self.state.lock();
        let (entry, rel) = Self::resolve(&state, &abs)?;
        if entry.point.read_only() {
            return Err(FsError::ReadOnly);
        }
        entry.backend.mkdir(&entry.point, &rel, mode)?;
        drop(state);
        self.notifier.publish(&abs, FileEvent::Created);
        Ok(())
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, p: &str) -> FsResult<()> {
        let abs = self.absolute(p);
        let state = self.state.lock();
        let (entry, rel) = Self::resolve(&state, &abs)?;
        if entry.point.read_only() {
            return Err(FsError::ReadOnly);
        }
        entry.backend.rmdir(&entry.point, &rel)?;
        drop(state);
        self.notifier.publish(&abs, FileEvent::Removed);
        Ok(())
    }

    /// Remove a file.
    pub fn unlink(&self, p: &str) -> FsResult<()> {
        let abs = self.absolute(p);
        let state = self.state.lock();
        let (entry, rel) = Self::resolve(&state, &abs)?;
        if entry.point.read_only() {
            return Err(FsError::ReadOnly);
        }
        entry.backend.unlink(&entry.point, &rel)?;
        drop(state);
        self.notifier.publish(&abs, FileEvent::Removed);
        Ok(())
    }

    /// Rename within one mount.
    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let abs_from = self.absolute(from);
        let abs_to = self.absolute(to);
        let state = self.state.lock();
        let (from_entry, rel_from) = Self::resolve(&state, &abs_from)?;
        let (to_entry, rel_to) = Self::resolve(&state, &abs_to)?;
        if from_entry.point.id() != to_entry.point.id() {
            return Err(FsError::CrossDevice);
        }
        if from_entry.point.read_only() {
            return Err(FsError::ReadOnly);
        }
        from_entry
            .backend
            .rename(&from_entry.point, &rel_from, &rel_to)?;
        drop(state);
        self.notifier.publish(&abs_to, FileEvent::Renamed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Directory iteration
    // ------------------------------------------------------------------

    /// Open a directory for iteration.
    pub fn diropen(&self, p: &str) -> FsResult<Dir> {
        let abs = self.absolute(p);
        let state = self.state.lock();
        let (entry, rel) = Self::resolve(&state, &abs)?;
        let token = entry.backend.diropen(&entry.point, &rel)?;
        Ok(Dir {
            point: Arc::clone(&entry.point),
            backend: Arc::clone(&entry.backend),
            token,
        })
    }

    /// Next directory entry, or [`FsError::NoData`] at the end.
    pub fn dirnext(&self, dir: &Dir) -> FsResult<DirEntry> {
        let _state = self.state.lock();
        dir.backend.dirnext(&dir.point, dir.token)
    }

    /// Rewind a directory iterator.
    pub fn dirreset(&self, dir: &Dir) -> FsResult<()> {
        let _state = self.state.lock();
        dir.backend.dirreset(&dir.point, dir.token)
    }

    /// Close a directory iterator.
    pub fn dirclose(&self, dir: Dir) -> FsResult<()> {
        let _state = self.state.lock();
        dir.backend.dirclose(&dir.point, dir.token)
    }
}
