//! Core file metadata types.

use serde::{Deserialize, Serialize};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o644).
    pub mode: u32,
}

impl FileAttr {
    /// Attributes for a regular file.
    pub fn file(size: u64, mode: u32) -> Self {
        Self {
            size,
            kind: FileType::File,
            mode,
        }
    }

    /// Attributes for a directory.
    pub fn directory(mode: u32) -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            mode,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Flags accepted by open-class operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access (O_RDONLY).
    pub fn read() -> Self {
        Self::default()
    }

    /// Read-write access (O_RDWR).
    pub fn write() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    /// Read-write, creating the file if absent (O_RDWR | O_CREAT).
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively, failing if the file exists (O_CREAT | O_EXCL).
    pub fn create_exclusive() -> Self {
        Self {
            write: true,
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// Append mode (O_WRONLY | O_APPEND | O_CREAT).
    pub fn append() -> Self {
        Self {
            write: true,
            append: true,
            create: true,
            ..Default::default()
        }
    }

    /// True if the open itself mutates or can mutate the filesystem.
    pub fn is_write_class(&self) -> bool {
        self.write || self.append || self.create || self.truncate
    }
}

/// Filesystem statistics reported by `stat_vfs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatVfs {
    /// Filesystem block size.
    pub bsize: u32,
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Total file nodes.
    pub files: u64,
    /// Free file nodes.
    pub ffree: u64,
    /// Maximum file name length.
    pub namemax: u32,
}

impl Default for StatVfs {
    fn default() -> Self {
        Self {
            bsize: 512,
            blocks: 0,
            bfree: 0,
            files: 0,
            ffree: 0,
            namemax: 255,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_attr_constructors() {
        let file = FileAttr::file(1024, 0o644);
        assert!(file.is_file());
        assert_eq!(file.size, 1024);
        assert_eq!(file.mode, 0o644);

        let dir = FileAttr::directory(0o755);
        assert!(dir.is_dir());
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn open_flags_write_class() {
        assert!(!OpenFlags::read().is_write_class());
        assert!(OpenFlags::write().is_write_class());
        assert!(OpenFlags::create().is_write_class());
        assert!(OpenFlags::append().is_write_class());
    }
}
