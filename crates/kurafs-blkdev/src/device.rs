//! Block device trait and the two host-side implementations.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use kurafs_types::{FsError, FsResult};

/// A raw sector-addressed storage device.
///
/// Geometry is fixed for the lifetime of the device. Reads and writes are
/// whole-sector: `buf` must hold exactly `count * sector_size()` bytes.
/// Implementations are internally synchronized; callers may share a device
/// across threads behind an `Arc`.
pub trait BlockDevice: Send + Sync {
    /// Sector size in bytes.
    fn sector_size(&self) -> usize;

    /// Total number of sectors.
    fn sector_count(&self) -> u64;

    /// Read `count` sectors starting at `lba` into `buf`.
    fn read(&self, buf: &mut [u8], lba: u64, count: usize) -> FsResult<()>;

    /// Write `count` sectors starting at `lba` from `buf`.
    fn write(&self, buf: &[u8], lba: u64, count: usize) -> FsResult<()>;
}

fn check_extent(lba: u64, count: usize, sectors: u64) -> FsResult<()> {
    if lba >= sectors || lba + count as u64 > sectors {
        return Err(FsError::out_of_range(format!(
            "lba {lba} count {count} beyond {sectors} sectors"
        )));
    }
    Ok(())
}

fn check_buffer(buf_len: usize, count: usize, sector_size: usize) -> FsResult<()> {
    if buf_len != count * sector_size {
        return Err(FsError::invalid_argument(format!(
            "buffer length {buf_len} does not match {count} sectors of {sector_size} bytes"
        )));
    }
    Ok(())
}

/// Volatile in-memory block device.
///
/// Backs the partition-scanner tests and serves as a scratch medium on
/// targets with spare RAM.
pub struct RamDisk {
    sectors: Mutex<Vec<u8>>,
    sector_size: usize,
    sector_count: u64,
}

impl RamDisk {
    /// Create a zero-filled RAM disk.
    pub fn new(sector_size: usize, sector_count: u64) -> Self {
        Self {
            sectors: Mutex::new(vec![0u8; sector_size * sector_count as usize]),
            sector_size,
            sector_count,
        }
    }

    /// Create a RAM disk over an existing image.
    ///
    /// The image is padded with zeros up to a whole number of sectors.
    pub fn from_image(mut image: Vec<u8>, sector_size: usize) -> Self {
        let rem = image.len() % sector_size;
        if rem != 0 {
            image.resize(image.len() + sector_size - rem, 0);
        }
        let sector_count = (image.len() / sector_size) as u64;
        Self {
            sectors: Mutex::new(image),
            sector_size,
            sector_count,
        }
    }
}

impl BlockDevice for RamDisk {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read(&self, buf: &mut [u8], lba: u64, count: usize) -> FsResult<()> {
        check_extent(lba, count, self.sector_count)?;
        check_buffer(buf.len(), count, self.sector_size)?;
        let sectors = self.sectors.lock();
        let start = lba as usize * self.sector_size;
        buf.copy_from_slice(&sectors[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, buf: &[u8], lba: u64, count: usize) -> FsResult<()> {
        check_extent(lba, count, self.sector_count)?;
        check_buffer(buf.len(), count, self.sector_size)?;
        let mut sectors = self.sectors.lock();
        let start = lba as usize * self.sector_size;
        sectors[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

/// Block device backed by a host image file.
///
/// This is how the linux build exercises the whole stack against real disk
/// images without hardware. The file length must be a multiple of the
/// sector size.
pub struct ImageDisk {
    file: Mutex<File>,
    sector_size: usize,
    sector_count: u64,
}

impl ImageDisk {
    /// Open an image file with the given sector size.
    pub fn open(path: impl AsRef<Path>, sector_size: usize) -> FsResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if sector_size == 0 || len % sector_size as u64 != 0 {
            return Err(FsError::invalid_argument(format!(
                "image length {len} is not a multiple of sector size {sector_size}"
            )));
        }
        Ok(Self {
            file: Mutex::new(file),
            sector_size,
            sector_count: len / sector_size as u64,
        })
    }
}

impl BlockDevice for ImageDisk {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read(&self, buf: &mut [u8], lba: u64, count: usize) -> FsResult<()> {
        check_extent(lba, count, self.sector_count)?;
        check_buffer(buf.len(), count, self.sector_size)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(lba * self.sector_size as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, buf: &[u8], lba: u64, count: usize) -> FsResult<()> {
        check_extent(lba, count, self.sector_count)?;
        check_buffer(buf.len(), count, self.sector_size)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(lba * self.sector_size as u64))?;
        file.write_all(buf)?;
        Ok(())
    }
}
