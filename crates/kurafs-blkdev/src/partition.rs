//! Partition records produced by the MBR/EBR scanner.

use serde::{Deserialize, Serialize};

/// A single partition discovered on a block device.
///
/// Immutable once published by the disk manager. `start_sector` is always
/// absolute on the underlying device, also for logical partitions found
/// inside an extended-partition chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Partition {
    /// Name the disk manager publishes the partition under, e.g. `emmc0part1`.
    pub name: String,
    /// Slot in the MBR primary table (1-4), 0 for logical partitions.
    pub mbr_number: u32,
    /// Physical slot ordinal within its table sector (1-based).
    pub physical_number: u32,
    /// Partition type byte from the table entry.
    pub type_id: u8,
    /// Bootable flag (top bit of the status byte).
    pub bootable: bool,
    /// Boot unit (low 7 bits of the status byte).
    pub boot_unit: u8,
    /// First sector, absolute on the device.
    pub start_sector: u32,
    /// Number of sectors.
    pub num_sectors: u32,
}
