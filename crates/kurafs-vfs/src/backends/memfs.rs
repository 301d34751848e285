//! In-memory filesystem backend.
//!
//! Stores file contents in RAM, keyed per mount by [`MountPoint::id`]. The
//! bound disk handle is only consulted for capacity reporting, which makes
//! this backend double as the reference implementation for driver tests.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use kurafs_types::{DirEntry, FileAttr, FileType, FsError, FsResult, OpenFlags, StatVfs};

use crate::backend::{DirToken, FileToken, FilesystemBackend};
use crate::mount::MountPoint;

enum Node {
    File { data: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
}

impl Node {
    fn kind(&self) -> FileType {
        match self {
            Node::File { .. } => FileType::File,
            Node::Dir { .. } => FileType::Directory,
        }
    }

    fn attr(&self) -> FileAttr {
        match self {
            Node::File { data, mode } => FileAttr::file(data.len() as u64, *mode),
            Node::Dir { mode } => FileAttr::directory(*mode),
        }
    }
}

/// One mounted instance: a flat map from mount-relative path to node.
/// The empty key is the mount root.
struct Volume {
    nodes: HashMap<String, Node>,
}

impl Volume {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(String::new(), Node::Dir { mode: 0o755 });
        Self { nodes }
    }

    fn dir_exists(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir { .. }))
    }

    /// Direct children of `dir`, sorted by name.
    fn children(&self, dir: &str) -> Vec<DirEntry> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let mut entries: Vec<DirEntry> = self
            .nodes
            .iter()
            .filter(|(path, _)| !path.is_empty())
            .filter_map(|(path, node)| {
                let rest = path.strip_prefix(&prefix)?;
                if rest.contains('/') {
                    None
                } else {
                    Some(DirEntry::new(rest, node.kind()))
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

struct OpenState {
    volume: u64,
    path: String,
    pos: u64,
    append: bool,
}

struct DirCursor {
    entries: Vec<DirEntry>,
    pos: usize,
}

struct MemState {
    volumes: HashMap<u64, Volume>,
    files: HashMap<FileToken, OpenState>,
    dirs: HashMap<DirToken, DirCursor>,
    next_token: u64,
}

/// RAM-backed [`FilesystemBackend`].
///
/// Mount `data` is ignored. Contents live until the volume is unmounted.
pub struct MemFs {
    state: Mutex<MemState>,
    mounts: AtomicU32,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create a backend with no mounted volumes.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemState {
                volumes: HashMap::new(),
                files: HashMap::new(),
                dirs: HashMap::new(),
                next_token: 1,
            }),
            mounts: AtomicU32::new(0),
        }
    }
}

/// Split a non-root path into parent and leaf name.
fn parent_of(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

impl MemState {
    fn volume(&self, mount: &Arc<MountPoint>) -> FsResult<&Volume> {
        self.volumes
            .get(&mount.id())
            .ok_or_else(|| FsError::not_found(mount.target()))
    }

    fn volume_mut(&mut self, mount: &Arc<MountPoint>) -> FsResult<&mut Volume> {
        self.volumes
            .get_mut(&mount.id())
            .ok_or_else(|| FsError::not_found(mount.target()))
    }

    fn mint_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn open_file(&self, token: FileToken) -> FsResult<&OpenState> {
        self.files
            .get(&token)
            .ok_or(FsError::BadDescriptor(token as i32))
    }
}

impl FilesystemBackend for MemFs {
    fn mount(&self, mount: &Arc<MountPoint>, _data: Option<&[u8]>) -> FsResult<()> {
        let mut state = self.state.lock();
        state.volumes.insert(mount.id(), Volume::new());
        self.mounts.fetch_add(1, Ordering::Relaxed);
        debug!("memfs volume created for {}", mount.target());
        Ok(())
    }

    fn umount(&self, mount: &Arc<MountPoint>) -> FsResult<()> {
        let mut state = self.state.lock();
        if state.volumes.remove(&mount.id()).is_none() {
            return Err(FsError::not_found(mount.target()));
        }
        let id = mount.id();
        state.files.retain(|_, file| file.volume != id);
        self.mounts.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn mount_count(&self) -> u32 {
        self.mounts.load(Ordering::Relaxed)
    }

    fn open(
        &self,
        mount: &Arc<MountPoint>,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> FsResult<FileToken> {
        let mut state = self.state.lock();
        let volume = state.volume_mut(mount)?;
        match volume.nodes.get_mut(path) {
            Some(Node::Dir { .. }) => return Err(FsError::IsADirectory(path.to_owned())),
            Some(Node::File { data, .. }) => {
                if flags.create && flags.exclusive {
                    return Err(FsError::already_exists(path));
                }
                if flags.truncate {
                    data.clear();
                }
            }
            None => {
                if !flags.create {
                    return Err(FsError::not_found(path));
                }
                let (parent, name) = parent_of(path);
                if name.is_empty() {
                    return Err(FsError::invalid_argument(path));
                }
                if !volume.dir_exists(parent) {
                    return Err(FsError::not_found(parent));
                }
                volume.nodes.insert(
                    path.to_owned(),
                    Node::File {
                        data: Vec::new(),
                        mode,
                    },
                );
            }
        }
        let token = state.mint_token();
        state.files.insert(
            token,
            OpenState {
                volume: mount.id(),
                path: path.to_owned(),
                pos: 0,
                append: flags.append,
            },
        );
        Ok(token)
    }

    fn read(&self, mount: &Arc<MountPoint>, file: FileToken, buf: &mut [u8]) -> FsResult<usize> {
        let mut state = self.state.lock();
        let (path, pos) = {
            let open = state.open_file(file)?;
            (open.path.clone(), open.pos)
        };
        let volume = state.volume(mount)?;
        let Some(Node::File { data, .. }) = volume.nodes.get(&path) else {
            return Err(FsError::not_found(&path));
        };
        let start = (pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        if let Some(open) = state.files.get_mut(&file) {
            open.pos = (start + n) as u64;
        }
        Ok(n)
    }

    fn write(&self, mount: &Arc<MountPoint>, file: FileToken, buf: &[u8]) -> FsResult<usize> {
        let mut state = self.state.lock();
        let (path, pos, append) = {
            let open = state.open_file(file)?;
            (open.path.clone(), open.pos, open.append)
        };
        let id = mount.id();
        let volume = state
            .volumes
            .get_mut(&id)
            .ok_or_else(|| FsError::not_found(mount.target()))?;
        let Some(Node::File { data, .. }) = volume.nodes.get_mut(&path) else {
            return Err(FsError::not_found(&path));
        };
        let start = if append { data.len() } else { pos as usize };
        if start > data.len() {
            data.resize(start, 0);
        }
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        if let Some(open) = state.files.get_mut(&file) {
            open.pos = end as u64;
        }
        Ok(buf.len())
    }

    fn seek(&self, mount: &Arc<MountPoint>, file: FileToken, pos: SeekFrom) -> FsResult<u64> {
        let mut state = self.state.lock();
        let (path, current) = {
            let open = state.open_file(file)?;
            (open.path.clone(), open.pos)
        };
        let volume = state.volume(mount)?;
        let Some(Node::File { data, .. }) = volume.nodes.get(&path) else {
            return Err(FsError::not_found(&path));
        };
        let size = data.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => size + offset,
            SeekFrom::Current(offset) => current as i64 + offset,
        };
        if target < 0 {
            return Err(FsError::invalid_argument("seek before start of file"));
        }
        let target = target as u64;
        if let Some(open) = state.files.get_mut(&file) {
            open.pos = target;
        }
        Ok(target)
    }

    fn close(&self, _mount: &Arc<MountPoint>, file: FileToken) -> FsResult<()> {
        let mut state = self.state.lock();
        state
            .files
            .remove(&file)
            .map(|_| ())
            .ok_or(FsError::BadDescriptor(file as i32))
    }

    fn fstat(&self, mount: &Arc<MountPoint>, file: FileToken) -> FsResult<FileAttr> {
        let state = self.state.lock();
        let open = state.open_file(file)?;
        let volume = state.volume(mount)?;
        volume
            .nodes
            .get(&open.path)
            .map(Node::attr)
            .ok_or_else(|| FsError::not_found(&open.path))
    }

    fn stat(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<FileAttr> {
        let state = self.state.lock();
        let volume = state.volume(mount)?;
        volume
            .nodes
            .get(path)
            .map(Node::attr)
            .ok_or_else(|| FsError::not_found(path))
    }

    fn mkdir(&self, mount: &Arc<MountPoint>, path: &str, mode: u32) -> FsResult<()> {
        let mut state = self.state.lock();
        let volume = state.volume_mut(mount)?;
        if volume.nodes.contains_key(path) {
            return Err(FsError::already_exists(path));
        }
        let (parent, name) = parent_of(path);
        if name.is_empty() {
            return Err(FsError::invalid_argument(path));
        }
        match volume.nodes.get(parent) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(FsError::NotADirectory(parent.to_owned())),
            None => return Err(FsError::not_found(parent)),
        }
        volume.nodes.insert(path.to_owned(), Node::Dir { mode });
        Ok(())
    }

    fn rmdir(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<()> {
        let mut state = self.state.lock();
        let volume = state.volume_mut(mount)?;
        if path.is_empty() {
            return Err(FsError::busy(mount.target()));
        }
        match volume.nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(FsError::NotADirectory(path.to_owned())),
            None => return Err(FsError::not_found(path)),
        }
        let prefix = format!("{path}/");
        if volume.nodes.keys().any(|key| key.starts_with(&prefix)) {
            return Err(FsError::DirectoryNotEmpty(path.to_owned()));
        }
        volume.nodes.remove(path);
        Ok(())
    }

    fn unlink(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<()> {
        let mut state = self.state.lock();
        let volume = state.volume_mut(mount)?;
        match volume.nodes.get(path) {
            Some(Node::File { .. }) => {
                volume.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(FsError::IsADirectory(path.to_owned())),
            None => Err(FsError::not_found(path)),
        }
    }

    fn rename(&self, mount: &Arc<MountPoint>, from: &str, to: &str) -> FsResult<()> {
        let mut state = self.state.lock();
        let volume = state.volume_mut(mount)?;
        if !volume.nodes.contains_key(from) {
            return Err(FsError::not_found(from));
        }
        if from.is_empty() || to.is_empty() {
            return Err(FsError::invalid_argument("rename involving mount root"));
        }
        let (to_parent, to_name) = parent_of(to);
        if to_name.is_empty() || !volume.dir_exists(to_parent) {
            return Err(FsError::not_found(to_parent));
        }
        match (volume.nodes.get(from), volume.nodes.get(to)) {
            (Some(Node::File { .. }), Some(Node::Dir { .. })) => {
                return Err(FsError::IsADirectory(to.to_owned()));
            }
            (Some(Node::Dir { .. }), Some(_)) => return Err(FsError::already_exists(to)),
            _ => {}
        }
        if let Some(node) = volume.nodes.remove(from) {
            let is_dir = matches!(node, Node::Dir { .. });
            volume.nodes.insert(to.to_owned(), node);
            if is_dir {
                let prefix = format!("{from}/");
                let moved: Vec<String> = volume
                    .nodes
                    .keys()
                    .filter(|key| key.starts_with(&prefix))
                    .cloned()
                    .collect();
                for old in moved {
                    if let Some(child) = volume.nodes.remove(&old) {
                        let new = format!("{to}/{}", &old[prefix.len()..]);
                        volume.nodes.insert(new, child);
                    }
                }
            }
        }
        Ok(())
    }

    fn diropen(&self, mount: &Arc<MountPoint>, path: &str) -> FsResult<DirToken> {
        let mut state = self.state.lock();
        let volume = state.volume(mount)?;
        match volume.nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(FsError::NotADirectory(path.to_owned())),
            None => return Err(FsError::not_found(path)),
        }
        let entries = volume.children(path);
        let token = state.mint_token();
        state.dirs.insert(token, DirCursor { entries, pos: 0 });
        Ok(token)
    }

    fn dirnext(&self, _mount: &Arc<MountPoint>, dir: DirToken) -> FsResult<DirEntry> {
        let mut state = self.state.lock();
        let cursor = state
            .dirs
            .get_mut(&dir)
            .ok_or(FsError::BadDescriptor(dir as i32))?;
        match cursor.entries.get(cursor.pos) {
            Some(entry) => {
                let entry = entry.clone();
                cursor.pos += 1;
                Ok(entry)
            }
            None => Err(FsError::NoData),
        }
    }

    fn dirreset(&self, _mount: &Arc<MountPoint>, dir: DirToken) -> FsResult<()> {
        let mut state = self.state.lock();
        let cursor = state
            .dirs
            .get_mut(&dir)
            .ok_or(FsError::BadDescriptor(dir as i32))?;
        cursor.pos = 0;
        Ok(())
    }

    fn dirclose(&self, _mount: &Arc<MountPoint>, dir: DirToken) -> FsResult<()> {
        let mut state = self.state.lock();
        state
            .dirs
            .remove(&dir)
            .map(|_| ())
            .ok_or(FsError::BadDescriptor(dir as i32))
    }

    fn stat_vfs(&self, mount: &Arc<MountPoint>, _path: &str) -> FsResult<StatVfs> {
        let state = self.state.lock();
        let volume = state.volume(mount)?;
        let bsize = mount.disk().sector_size() as u32;
        let blocks = mount.disk().sector_count();
        let used: u64 = volume
            .nodes
            .values()
            .map(|node| match node {
                Node::File { data, .. } => (data.len() as u64).div_ceil(u64::from(bsize.max(1))),
                Node::Dir { .. } => 0,
            })
            .sum();
        Ok(StatVfs {
            bsize,
            blocks,
            bfree: blocks.saturating_sub(used),
            files: volume.nodes.len() as u64,
            ffree: 0,
            namemax: 255,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::MountFlags;
    use kurafs_blkdev::{DiskManager, RamDisk};

    fn test_mount() -> (MemFs, Arc<MountPoint>) {
        let dm = DiskManager::new();
        dm.register_device(Arc::new(RamDisk::new(512, 64)), "mem0")
            .unwrap();
        let fs = MemFs::new();
        let point = Arc::new(MountPoint::new(
            dm.device_handle("mem0").unwrap(),
            "/ram",
            MountFlags::empty(),
        ));
        fs.mount(&point, None).unwrap();
        (fs, point)
    }

    #[test]
    fn create_write_read_round_trip() {
        let (fs, mp) = test_mount();
        let f = fs.open(&mp, "a.txt", OpenFlags::create(), 0o644).unwrap();
        assert_eq!(fs.write(&mp, f, b"hello").unwrap(), 5);
        fs.seek(&mp, f, SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(&mp, f, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(fs.fstat(&mp, f).unwrap().size, 5);
        fs.close(&mp, f).unwrap();
    }

    #[test]
    fn open_missing_without_create_fails() {
        let (fs, mp) = test_mount();
        let err = fs.open(&mp, "nope", OpenFlags::read(), 0).unwrap_err();
        assert_eq!(err.errno(), -2);
    }

    #[test]
    fn exclusive_create_fails_on_existing() {
        let (fs, mp) = test_mount();
        let f = fs.open(&mp, "a", OpenFlags::create(), 0o644).unwrap();
        fs.close(&mp, f).unwrap();
        let err = fs
            .open(&mp, "a", OpenFlags::create_exclusive(), 0o644)
            .unwrap_err();
        assert_eq!(err.errno(), -17);
    }

    #[test]
    fn append_writes_at_end() {
        let (fs, mp) = test_mount();
        let f = fs.open(&mp, "log", OpenFlags::create(), 0o644).unwrap();
        fs.write(&mp, f, b"one").unwrap();
        fs.close(&mp, f).unwrap();

        let f = fs.open(&mp, "log", OpenFlags::append(), 0o644).unwrap();
        fs.write(&mp, f, b"two").unwrap();
        fs.seek(&mp, f, SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(&mp, f, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"onetwo");
        fs.close(&mp, f).unwrap();
    }

    #[test]
    fn mkdir_readdir_sorted() {
        let (fs, mp) = test_mount();
        fs.mkdir(&mp, "d", 0o755).unwrap();
        fs.mkdir(&mp, "d/sub", 0o755).unwrap();
        let f = fs.open(&mp, "d/b.txt", OpenFlags::create(), 0o644).unwrap();
        fs.close(&mp, f).unwrap();
        let f = fs.open(&mp, "d/a.txt", OpenFlags::create(), 0o644).unwrap();
        fs.close(&mp, f).unwrap();

        let dir = fs.diropen(&mp, "d").unwrap();
        let names: Vec<String> = std::iter::from_fn(|| fs.dirnext(&mp, dir).ok())
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub"]);
        assert_eq!(fs.dirnext(&mp, dir).unwrap_err().errno(), -61);

        fs.dirreset(&mp, dir).unwrap();
        assert_eq!(fs.dirnext(&mp, dir).unwrap().name, "a.txt");
        fs.dirclose(&mp, dir).unwrap();
    }

    #[test]
    fn rmdir_refuses_non_empty() {
        let (fs, mp) = test_mount();
        fs.mkdir(&mp, "d", 0o755).unwrap();
        let f = fs.open(&mp, "d/x", OpenFlags::create(), 0o644).unwrap();
        fs.close(&mp, f).unwrap();
        assert_eq!(fs.rmdir(&mp, "d").unwrap_err().errno(), -39);
        fs.unlink(&mp, "d/x").unwrap();
        fs.rmdir(&mp, "d").unwrap();
        assert_eq!(fs.stat(&mp, "d").unwrap_err().errno(), -2);
    }

    #[test]
    fn rename_directory_moves_children() {
        let (fs, mp) = test_mount();
        fs.mkdir(&mp, "old", 0o755).unwrap();
        let f = fs
            .open(&mp, "old/data", OpenFlags::create(), 0o644)
            .unwrap();
        fs.close(&mp, f).unwrap();

        fs.rename(&mp, "old", "new").unwrap();
        assert!(fs.stat(&mp, "new/data").unwrap().is_file());
        assert_eq!(fs.stat(&mp, "old/data").unwrap_err().errno(), -2);
    }

    #[test]
    fn umount_drops_the_volume() {
        let (fs, mp) = test_mount();
        assert_eq!(fs.mount_count(), 1);
        fs.umount(&mp).unwrap();
        assert_eq!(fs.mount_count(), 0);
        assert_eq!(fs.stat(&mp, "").unwrap_err().errno(), -2);
    }
}
