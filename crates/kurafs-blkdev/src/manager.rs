//! Disk manager: named device registry and shared disk handles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use kurafs_types::{FsError, FsResult};

use crate::device::BlockDevice;
use crate::parser::partition_search;
use crate::partition::Partition;

struct DiskEntry {
    device: Arc<dyn BlockDevice>,
    partitions: Vec<Partition>,
}

/// Registry of named block devices.
///
/// Registering a device immediately scans its partition tables and
/// publishes every discovered partition as `"{name}part{N}"`. Devices and
/// partitions are then addressable uniformly through [`DiskHandle`]s.
pub struct DiskManager {
    disks: Mutex<HashMap<String, Arc<DiskEntry>>>,
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager {
    /// Create an empty disk manager.
    pub fn new() -> Self {
        Self {
            disks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a device under `name` and scan its partition tables.
    ///
    /// A failed scan is not a failed registration: a device without a valid
    /// MBR is published with zero partitions.
    pub fn register_device(&self, device: Arc<dyn BlockDevice>, name: &str) -> FsResult<()> {
        if name.is_empty() {
            return Err(FsError::invalid_argument("empty device name"));
        }
        let mut disks = self.disks.lock();
        if disks.contains_key(name) {
            return Err(FsError::already_exists(name));
        }
        let mut partitions = match partition_search(device.as_ref()) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("partition scan failed for {name}: {e}");
                Vec::new()
            }
        };
        for (index, part) in partitions.iter_mut().enumerate() {
            part.name = format!("{name}part{index}");
        }
        info!("registered {name} with {} partitions", partitions.len());
        disks.insert(name.to_owned(), Arc::new(DiskEntry { device, partitions }));
        Ok(())
    }

    /// Remove a device and its published partitions.
    ///
    /// Handles already obtained stay valid; they share ownership of the
    /// device until dropped.
    pub fn unregister_device(&self, name: &str) -> FsResult<()> {
        let mut disks = self.disks.lock();
        if disks.remove(name).is_none() {
            return Err(FsError::not_found(name));
        }
        Ok(())
    }

    /// Resolve a device or partition name to a handle.
    pub fn device_handle(&self, name: &str) -> Option<DiskHandle> {
        let disks = self.disks.lock();
        if let Some(entry) = disks.get(name) {
            return Some(DiskHandle(Arc::new(HandleInner {
                name: name.to_owned(),
                device: Arc::clone(&entry.device),
                partition: None,
            })));
        }
        for entry in disks.values() {
            if let Some(part) = entry.partitions.iter().find(|p| p.name == name) {
                return Some(DiskHandle(Arc::new(HandleInner {
                    name: name.to_owned(),
                    device: Arc::clone(&entry.device),
                    partition: Some(part.clone()),
                })));
            }
        }
        None
    }

    /// Partitions discovered on a device, in publication order.
    pub fn partitions(&self, name: &str) -> Vec<Partition> {
        let disks = self.disks.lock();
        disks
            .get(name)
            .map(|entry| entry.partitions.clone())
            .unwrap_or_default()
    }

    /// Metadata for a published partition name. Used by the VFS for
    /// filesystem-type autodetection.
    pub fn partition_info(&self, name: &str) -> Option<Partition> {
        let disks = self.disks.lock();
        disks
            .values()
            .flat_map(|entry| entry.partitions.iter())
            .find(|p| p.name == name)
            .cloned()
    }

    /// Read sectors by device or partition name.
    pub fn read(&self, name: &str, buf: &mut [u8], lba: u64, count: usize) -> FsResult<()> {
        let handle = self
            .device_handle(name)
            .ok_or_else(|| FsError::not_found(name))?;
        handle.read(buf, lba, count)
    }

    /// Write sectors by device or partition name.
    pub fn write(&self, name: &str, buf: &[u8], lba: u64, count: usize) -> FsResult<()> {
        let handle = self
            .device_handle(name)
            .ok_or_else(|| FsError::not_found(name))?;
        handle.write(buf, lba, count)
    }
}

struct HandleInner {
    name: String,
    device: Arc<dyn BlockDevice>,
    partition: Option<Partition>,
}

/// Shared handle to a device or one of its partitions.
///
/// Cloning is cheap; all clones share the underlying device. Partition
/// handles translate sector addresses by the partition's start LBA and
/// bounds-check against the partition extent, so sector 0 of `emmc0part1`
/// is the partition's first sector, not the device's.
#[derive(Clone)]
pub struct DiskHandle(Arc<HandleInner>);

impl DiskHandle {
    /// The name this handle was resolved from.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The partition this handle addresses, if any.
    pub fn partition(&self) -> Option<&Partition> {
        self.0.partition.as_ref()
    }

    /// Sector size of the underlying device.
    pub fn sector_size(&self) -> usize {
        self.0.device.sector_size()
    }

    /// Sector count of the addressed extent: the partition's size for a
    /// partition handle, the whole device otherwise.
    pub fn sector_count(&self) -> u64 {
        match &self.0.partition {
            Some(part) => u64::from(part.num_sectors),
            None => self.0.device.sector_count(),
        }
    }

    fn translate(&self, lba: u64, count: usize) -> FsResult<u64> {
        if lba >= self.sector_count() || lba + count as u64 > self.sector_count() {
            return Err(FsError::out_of_range(format!(
                "lba {lba} count {count} beyond {} sectors of {}",
                self.sector_count(),
                self.0.name
            )));
        }
        let base = self
            .0
            .partition
            .as_ref()
            .map_or(0, |p| u64::from(p.start_sector));
        Ok(base + lba)
    }

    /// Read sectors relative to this handle's extent.
    pub fn read(&self, buf: &mut [u8], lba: u64, count: usize) -> FsResult<()> {
        let abs = self.translate(lba, count)?;
        self.0.device.read(buf, abs, count)
    }

    /// Write sectors relative to this handle's extent.
    pub fn write(&self, buf: &[u8], lba: u64, count: usize) -> FsResult<()> {
        let abs = self.translate(lba, count)?;
        self.0.device.write(buf, abs, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDisk;

    const SECTOR: usize = 512;

    // 64-sector disk with one partition at LBA 8, 16 sectors long.
    fn scratch_disk() -> Arc<RamDisk> {
        let disk = RamDisk::new(SECTOR, 64);
        let mut mbr = vec![0u8; SECTOR];
        mbr[0x1FE] = 0x55;
        mbr[0x1FF] = 0xAA;
        let entry = 0x1BE;
        mbr[entry + 4] = 0x0B;
        mbr[entry + 8..entry + 12].copy_from_slice(&8u32.to_le_bytes());
        mbr[entry + 12..entry + 16].copy_from_slice(&16u32.to_le_bytes());
        disk.write(&mbr, 0, 1).unwrap();
        Arc::new(disk)
    }

    #[test]
    fn register_twice_fails_eexist() {
        let dm = DiskManager::new();
        let disk = scratch_disk();
        dm.register_device(disk.clone(), "emmc0").unwrap();
        let err = dm.register_device(disk, "emmc0").unwrap_err();
        assert_eq!(err.errno(), -17);
    }

    #[test]
    fn unregister_unknown_fails_enoent() {
        let dm = DiskManager::new();
        assert_eq!(dm.unregister_device("emmc124").unwrap_err().errno(), -2);
        assert_eq!(dm.unregister_device("").unwrap_err().errno(), -2);
    }

    #[test]
    fn unregister_invalidates_name() {
        let dm = DiskManager::new();
        dm.register_device(scratch_disk(), "emmc0").unwrap();
        assert!(dm.device_handle("emmc0").is_some());
        dm.unregister_device("emmc0").unwrap();
        assert!(dm.device_handle("emmc0").is_none());
    }

    #[test]
    fn partitions_are_published_by_name() {
        let dm = DiskManager::new();
        dm.register_device(scratch_disk(), "emmc0").unwrap();
        let parts = dm.partitions("emmc0");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "emmc0part0");
        assert!(dm.device_handle("emmc0part0").is_some());
        assert!(dm.partition_info("emmc0part0").is_some());
        assert!(dm.partition_info("emmc0part7").is_none());
    }

    #[test]
    fn partition_handle_translates_offsets() {
        let dm = DiskManager::new();
        dm.register_device(scratch_disk(), "emmc0").unwrap();

        let data = vec![0xCCu8; SECTOR];
        dm.write("emmc0part0", &data, 0, 1).unwrap();

        // Same sector through the whole-disk handle at the absolute LBA.
        let mut out = vec![0u8; SECTOR];
        dm.read("emmc0", &mut out, 8, 1).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn partition_handle_bounds_its_extent() {
        let dm = DiskManager::new();
        dm.register_device(scratch_disk(), "emmc0").unwrap();
        let handle = dm.device_handle("emmc0part0").unwrap();
        assert_eq!(handle.sector_count(), 16);

        let mut buf = vec![0u8; SECTOR];
        assert_eq!(handle.read(&mut buf, 16, 1).unwrap_err().errno(), -34);
        assert_eq!(handle.read(&mut buf, 15, 2).unwrap_err().errno(), -34);
        handle.read(&mut buf, 15, 1).unwrap();
    }

    #[test]
    fn io_by_unknown_name_fails_enoent() {
        let dm = DiskManager::new();
        let mut buf = vec![0u8; SECTOR];
        assert_eq!(dm.read("", &mut buf, 0, 1).unwrap_err().errno(), -2);
        assert_eq!(dm.write("nope", &buf, 0, 1).unwrap_err().errno(), -2);
    }

    #[test]
    fn bad_image_registers_with_zero_partitions() {
        let dm = DiskManager::new();
        let disk = Arc::new(RamDisk::new(SECTOR, 8));
        dm.register_device(disk, "emmc0").unwrap();
        assert!(dm.partitions("emmc0").is_empty());
    }
}
