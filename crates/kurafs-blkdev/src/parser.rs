//! MBR/EBR partition-table scanner.
//!
//! Parses the classic Master Boot Record at sector 0 and walks Extended
//! Boot Record chains iteratively. Individual malformed entries are logged
//! and skipped; a missing signature or unreadable sector 0 aborts the scan
//! for the whole device.

use tracing::{debug, warn};

use kurafs_types::{FsError, FsResult};

use crate::device::BlockDevice;
use crate::partition::Partition;

const SIGNATURE_OFFSET: usize = 0x1FE;
const TABLE_OFFSET: usize = 0x1BE;
const ENTRY_SIZE: usize = 16;
const TABLE_ENTRIES: usize = 4;
const MIN_SECTOR_SIZE: usize = 512;

const TYPE_EXT_DOS: u8 = 0x05;
const TYPE_EXT_WIN98: u8 = 0x0F;
const TYPE_EXT_LINUX: u8 = 0x85;

/// Ceiling on EBR sectors visited per chain. A malformed or cyclic chain
/// terminates with whatever partitions were found so far.
const MAX_EBR_ITERATIONS: u32 = 100;

fn read_le32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn has_signature(sector: &[u8]) -> bool {
    sector[SIGNATURE_OFFSET] == 0x55 && sector[SIGNATURE_OFFSET + 1] == 0xAA
}

fn is_extended(type_id: u8) -> bool {
    matches!(type_id, TYPE_EXT_DOS | TYPE_EXT_WIN98 | TYPE_EXT_LINUX)
}

/// One raw 16-byte table entry.
#[derive(Debug, Clone, Copy, Default)]
struct RawEntry {
    bootable: bool,
    boot_unit: u8,
    type_id: u8,
    start_sector: u32,
    num_sectors: u32,
}

fn read_table(sector: &[u8]) -> [RawEntry; TABLE_ENTRIES] {
    let mut entries = [RawEntry::default(); TABLE_ENTRIES];
    let mut offset = TABLE_OFFSET;
    for entry in &mut entries {
        entry.bootable = sector[offset] & 0x80 != 0;
        entry.boot_unit = sector[offset] & 0x7F;
        entry.type_id = sector[offset + 4];
        entry.start_sector = read_le32(sector, offset + 8);
        entry.num_sectors = read_le32(sector, offset + 12);
        offset += ENTRY_SIZE;
    }
    entries
}

/// Scan the device's partition tables.
///
/// Returns the discovered partitions in table order: valid primaries first,
/// then the logical partitions of each extended chain. Partition names are
/// assigned later by the disk manager.
pub fn partition_search(disk: &dyn BlockDevice) -> FsResult<Vec<Partition>> {
    let sector_size = disk.sector_size();
    if sector_size < MIN_SECTOR_SIZE {
        return Err(FsError::no_such_address(format!(
            "sector size {sector_size} below minimum {MIN_SECTOR_SIZE}"
        )));
    }

    let mut mbr = vec![0u8; sector_size];
    disk.read(&mut mbr, 0, 1)?;
    if !has_signature(&mbr) {
        return Err(FsError::no_such_address("no valid partition signature"));
    }

    let entries = read_table(&mbr);
    let mut parts = Vec::new();

    for (slot, entry) in entries.iter().enumerate() {
        let slot = slot as u32 + 1;
        if is_extended(entry.type_id) {
            continue;
        }
        if !check_primary(disk, slot, entry) {
            continue;
        }
        if entry.num_sectors != 0 {
            parts.push(Partition {
                name: String::new(),
                mbr_number: slot,
                physical_number: slot,
                type_id: entry.type_id,
                bootable: entry.bootable,
                boot_unit: entry.boot_unit,
                start_sector: entry.start_sector,
                num_sectors: entry.num_sectors,
            });
        }
    }

    for entry in &entries {
        if is_extended(entry.type_id) {
            parse_extended(disk, entry.start_sector, entry.num_sectors, &mut parts)?;
        }
    }

    Ok(parts)
}

/// Sanity-check one primary entry against the device extent. All math in
/// 64 bits so `sectors * sector_size` cannot wrap.
fn check_primary(disk: &dyn BlockDevice, slot: u32, entry: &RawEntry) -> bool {
    let sector_size = disk.sector_size() as u64;
    let device_size = disk.sector_count() * sector_size;
    let offset = u64::from(entry.start_sector) * sector_size;
    let size = u64::from(entry.num_sectors) * sector_size;
    let next = offset + size;
    if next > device_size || next < offset {
        warn!(
            "partition {slot} looks strange: start_sector {} offset {offset} next {next}",
            entry.start_sector
        );
        return false;
    }
    true
}

/// Walk one extended-partition chain.
///
/// `lba`/`count` give the extended partition's extent from the MBR. The
/// chain is followed iteratively: each EBR sector holds up to one logical
/// partition entry and up to one link to the next EBR. Sector reads are
/// skipped when the wanted sector is already buffered.
fn parse_extended(
    disk: &dyn BlockDevice,
    lba: u32,
    count: u32,
    parts: &mut Vec<Partition>,
) -> FsResult<()> {
    let sector_size = disk.sector_size() as u64;
    let chain_base = u64::from(lba) * sector_size;
    let chain_end = (u64::from(lba) + u64::from(count)) * sector_size;

    let mut current_sector = u64::from(lba);
    let mut extent_size = u64::from(count) * sector_size;
    let mut buffered: Option<u64> = None;
    let mut sector = vec![0u8; disk.sector_size()];
    let mut budget = MAX_EBR_ITERATIONS;

    while budget > 0 {
        budget -= 1;
        if buffered != Some(current_sector) {
            debug!("extended parse: read sector {current_sector}");
            disk.read(&mut sector, current_sector, 1)?;
            buffered = Some(current_sector);
        }
        if !has_signature(&sector) {
            warn!(
                "extended parse: no signature {:02x},{:02x} at sector {current_sector}",
                sector[SIGNATURE_OFFSET],
                sector[SIGNATURE_OFFSET + 1]
            );
            break;
        }

        let entries = read_table(&sector);
        let mut next_extended: Option<RawEntry> = None;

        for (slot, entry) in entries.iter().enumerate() {
            if entry.num_sectors == 0 {
                continue;
            }
            if is_extended(entry.type_id) {
                // Only the first link per EBR sector continues the chain.
                if next_extended.is_none() {
                    next_extended = Some(*entry);
                }
                continue;
            }

            let offset = u64::from(entry.start_sector) * sector_size;
            let size = u64::from(entry.num_sectors) * sector_size;
            let next = current_sector * sector_size + offset;
            if offset + size > extent_size || next < chain_base || next > chain_end {
                warn!(
                    "logical partition {slot} looks strange: current_sector {current_sector} \
                     offset {offset} next {next}"
                );
                continue;
            }

            let absolute_start = u64::from(entry.start_sector) + current_sector;
            if absolute_start > u64::from(u32::MAX) {
                warn!(
                    "logical partition {slot} looks strange: absolute start {absolute_start} \
                     exceeds 32-bit LBA"
                );
                continue;
            }

            parts.push(Partition {
                name: String::new(),
                mbr_number: 0,
                physical_number: slot as u32 + 1,
                type_id: entry.type_id,
                bootable: entry.bootable,
                boot_unit: entry.boot_unit,
                start_sector: absolute_start as u32,
                num_sectors: entry.num_sectors,
            });
        }

        let Some(link) = next_extended else {
            debug!("no more extended partitions");
            break;
        };
        current_sector = u64::from(lba) + u64::from(link.start_sector);
        extent_size = u64::from(link.num_sectors) * sector_size;
    }
    Ok(())
}
