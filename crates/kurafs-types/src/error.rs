//! Storage error types.

use std::io;
use thiserror::Error;

/// Error type shared by the block-device layer and the VFS core.
///
/// Every variant maps onto a single POSIX errno value via [`FsError::errno`],
/// so callers that need a C-style surface can flatten any failure into a
/// negative integer return code.
#[derive(Debug, Error)]
pub enum FsError {
    /// Device or address does not exist (bad MBR, missing medium).
    #[error("no such device or address: {0}")]
    NoSuchAddress(String),

    /// File, directory, device or mount target not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource is busy (mount target taken, partition in use, backend mounted).
    #[error("resource busy: {0}")]
    Busy(String),

    /// Name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Mount point is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// No backend registered for the requested filesystem type.
    #[error("no such filesystem driver: {0}")]
    NoDriver(String),

    /// Operation or flag combination is not supported.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Invalid argument (malformed path, bad flags, bad geometry).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Sector range falls outside the device or partition extent.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// File descriptor does not refer to an open file.
    #[error("bad file descriptor: {0}")]
    BadDescriptor(i32),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Rename or link across two different mount points.
    #[error("cross-device link")]
    CrossDevice,

    /// End of directory stream.
    #[error("no more directory entries")]
    NoData,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Busy error.
    pub fn busy(what: impl Into<String>) -> Self {
        Self::Busy(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    /// Create a NotSupported error.
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    /// Create a NoSuchAddress error.
    pub fn no_such_address(what: impl Into<String>) -> Self {
        Self::NoSuchAddress(what.into())
    }

    /// Create a NoDriver error.
    pub fn no_driver(what: impl Into<String>) -> Self {
        Self::NoDriver(what.into())
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(what: impl Into<String>) -> Self {
        Self::OutOfRange(what.into())
    }

    /// The negative errno value for this error.
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::NotFound(_) => 2,            // ENOENT
            Self::Io(_) => 5,                  // EIO
            Self::NoSuchAddress(_) => 6,       // ENXIO
            Self::BadDescriptor(_) => 9,       // EBADF
            Self::PermissionDenied(_) => 13,   // EACCES
            Self::ReadOnly => 13,              // EACCES
            Self::Busy(_) => 16,               // EBUSY
            Self::AlreadyExists(_) => 17,      // EEXIST
            Self::CrossDevice => 18,           // EXDEV
            Self::NoDriver(_) => 19,           // ENODEV
            Self::NotADirectory(_) => 20,      // ENOTDIR
            Self::IsADirectory(_) => 21,       // EISDIR
            Self::InvalidArgument(_) => 22,    // EINVAL
            Self::OutOfRange(_) => 34,         // ERANGE
            Self::DirectoryNotEmpty(_) => 39,  // ENOTEMPTY
            Self::NoData => 61,                // ENODATA
            Self::NotSupported(_) => 95,       // ENOTSUP
        };
        -code
    }
}

/// Result type used across the storage stack.
pub type FsResult<T> = Result<T, FsError>;

/// Flatten a result into a C-style return code: 0 on success, negative
/// errno on failure.
pub fn errno_of<T>(res: &FsResult<T>) -> i32 {
    match res {
        Ok(_) => 0,
        Err(e) => e.errno(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_are_negative_posix_codes() {
        assert_eq!(FsError::not_found("x").errno(), -2);
        assert_eq!(FsError::no_such_address("x").errno(), -6);
        assert_eq!(FsError::busy("x").errno(), -16);
        assert_eq!(FsError::already_exists("x").errno(), -17);
        assert_eq!(FsError::permission_denied("x").errno(), -13);
        assert_eq!(FsError::ReadOnly.errno(), -13);
        assert_eq!(FsError::no_driver("x").errno(), -19);
        assert_eq!(FsError::not_supported("x").errno(), -95);
        assert_eq!(FsError::invalid_argument("x").errno(), -22);
        assert_eq!(FsError::out_of_range("x").errno(), -34);
        assert_eq!(FsError::NoData.errno(), -61);
        assert_eq!(FsError::CrossDevice.errno(), -18);
    }

    #[test]
    fn errno_of_flattens_results() {
        assert_eq!(errno_of(&Ok(())), 0);
        assert_eq!(errno_of::<()>(&Err(FsError::busy("mnt"))), -16);
    }

    #[test]
    fn io_errors_carry_eio() {
        let e: FsError = io::Error::other("sector read failed").into();
        assert_eq!(e.errno(), -5);
    }
}
