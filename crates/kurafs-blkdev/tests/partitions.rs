//! Partition-scanner tests over synthesized MBR/EBR images.

use std::sync::Arc;

use kurafs_blkdev::{BlockDevice, DiskManager, ImageDisk, RamDisk, partition_search};

const SECTOR: usize = 512;

fn blank_sector() -> Vec<u8> {
    let mut sector = vec![0u8; SECTOR];
    sector[0x1FE] = 0x55;
    sector[0x1FF] = 0xAA;
    sector
}

fn set_entry(sector: &mut [u8], slot: usize, status: u8, type_id: u8, start: u32, count: u32) {
    let offset = 0x1BE + slot * 16;
    sector[offset] = status;
    sector[offset + 4] = type_id;
    sector[offset + 8..offset + 12].copy_from_slice(&start.to_le_bytes());
    sector[offset + 12..offset + 16].copy_from_slice(&count.to_le_bytes());
}

fn disk_with_mbr(mbr: Vec<u8>, sectors: u64) -> RamDisk {
    let disk = RamDisk::new(SECTOR, sectors);
    disk.write(&mbr, 0, 1).unwrap();
    disk
}

#[test]
fn primaries_parse_in_slot_order() {
    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x80, 0x0B, 2, 10);
    set_entry(&mut mbr, 1, 0x00, 0x83, 12, 20);
    set_entry(&mut mbr, 2, 0x00, 0x9E, 32, 16);
    let disk = disk_with_mbr(mbr, 64);

    let parts = partition_search(&disk).unwrap();
    assert_eq!(parts.len(), 3);

    assert_eq!(parts[0].mbr_number, 1);
    assert_eq!(parts[0].physical_number, 1);
    assert_eq!(parts[0].type_id, 0x0B);
    assert!(parts[0].bootable);
    assert_eq!(parts[0].start_sector, 2);
    assert_eq!(parts[0].num_sectors, 10);

    assert_eq!(parts[1].mbr_number, 2);
    assert!(!parts[1].bootable);
    assert_eq!(parts[1].start_sector, 12);
    assert_eq!(parts[1].num_sectors, 20);

    assert_eq!(parts[2].type_id, 0x9E);
    assert_eq!(parts[2].start_sector, 32);
}

#[test]
fn empty_table_yields_no_partitions() {
    let disk = disk_with_mbr(blank_sector(), 16);
    assert!(partition_search(&disk).unwrap().is_empty());
}

#[test]
fn missing_signature_aborts_scan() {
    let disk = RamDisk::new(SECTOR, 16);
    let err = partition_search(&disk).unwrap_err();
    assert_eq!(err.errno(), -6);
}

#[test]
fn small_sector_size_aborts_scan() {
    let disk = RamDisk::new(256, 16);
    let err = partition_search(&disk).unwrap_err();
    assert_eq!(err.errno(), -6);
}

#[test]
fn oversized_entry_is_skipped_not_fatal() {
    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x00, 0x0B, 2, 10);
    // Ends far past the 64-sector device.
    set_entry(&mut mbr, 1, 0x00, 0x83, 12, 0xFFFF_0000);
    let disk = disk_with_mbr(mbr, 64);

    let parts = partition_search(&disk).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].start_sector, 2);
}

#[test]
fn extended_chain_yields_logical_partitions() {
    // Two primaries plus an extended partition at LBA 16 spanning 48
    // sectors, holding a three-EBR chain of logical partitions.
    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x00, 0x0B, 2, 6);
    set_entry(&mut mbr, 1, 0x00, 0x83, 8, 6);
    set_entry(&mut mbr, 2, 0x00, 0x05, 16, 48);
    let disk = disk_with_mbr(mbr, 64);

    // EBR at 16: logical at +1 (4 sectors), link to EBR at base+8.
    let mut ebr = blank_sector();
    set_entry(&mut ebr, 0, 0x00, 0x83, 1, 4);
    set_entry(&mut ebr, 1, 0x00, 0x05, 8, 16);
    disk.write(&ebr, 16, 1).unwrap();

    // EBR at 24: logical at +1 (4 sectors), link to EBR at base+16.
    let mut ebr = blank_sector();
    set_entry(&mut ebr, 0, 0x00, 0x83, 1, 4);
    set_entry(&mut ebr, 1, 0x00, 0x05, 16, 16);
    disk.write(&ebr, 24, 1).unwrap();

    // EBR at 32: last logical, no link.
    let mut ebr = blank_sector();
    set_entry(&mut ebr, 0, 0x00, 0x83, 1, 4);
    disk.write(&ebr, 32, 1).unwrap();

    let parts = partition_search(&disk).unwrap();
    assert_eq!(parts.len(), 5);

    // Primaries keep their MBR slot, logicals are numbered within the EBR.
    assert_eq!(parts[0].mbr_number, 1);
    assert_eq!(parts[1].mbr_number, 2);
    for logical in &parts[2..] {
        assert_eq!(logical.mbr_number, 0);
        assert_eq!(logical.physical_number, 1);
        assert_eq!(logical.num_sectors, 4);
    }

    // Start sectors are absolute on the device.
    assert_eq!(parts[2].start_sector, 17);
    assert_eq!(parts[3].start_sector, 25);
    assert_eq!(parts[4].start_sector, 33);
}

#[test]
fn ebr_without_signature_aborts_chain_only() {
    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x00, 0x0B, 2, 6);
    set_entry(&mut mbr, 1, 0x00, 0x05, 16, 32);
    let disk = disk_with_mbr(mbr, 64);
    // Sector 16 left zeroed: no EBR signature.

    let parts = partition_search(&disk).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].type_id, 0x0B);
}

#[test]
fn cyclic_ebr_chain_terminates() {
    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x00, 0x0B, 2, 6);
    set_entry(&mut mbr, 1, 0x00, 0x05, 16, 32);
    let disk = disk_with_mbr(mbr, 64);

    // EBR that links back to itself.
    let mut ebr = blank_sector();
    set_entry(&mut ebr, 1, 0x00, 0x05, 0, 32);
    disk.write(&ebr, 16, 1).unwrap();

    let parts = partition_search(&disk).unwrap();
    assert_eq!(parts.len(), 1);
}

#[test]
fn logical_partition_past_32_bit_lba_is_skipped() {
    // Sparse 2 TiB image: the extended chain sits just below the 4G-sector
    // mark, so its logical partition's absolute start no longer fits a
    // 32-bit LBA and must be dropped, not wrapped.
    let tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.as_file()
        .set_len(0x1_0002_0000u64 * SECTOR as u64)
        .unwrap();
    let disk = ImageDisk::open(tmp.path(), SECTOR).unwrap();

    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x00, 0x0B, 2, 6);
    set_entry(&mut mbr, 1, 0x00, 0x05, 0xFFFF_0000, 0x2_0000);
    disk.write(&mbr, 0, 1).unwrap();

    let mut ebr = blank_sector();
    set_entry(&mut ebr, 0, 0x00, 0x83, 0x1_F000, 0x800);
    disk.write(&ebr, 0xFFFF_0000, 1).unwrap();

    let parts = partition_search(&disk).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].type_id, 0x0B);
}

#[test]
fn disk_manager_names_partitions_in_order() {
    let mut mbr = blank_sector();
    set_entry(&mut mbr, 0, 0x00, 0x0B, 2, 6);
    set_entry(&mut mbr, 1, 0x00, 0x83, 8, 6);
    set_entry(&mut mbr, 2, 0x00, 0x9E, 16, 8);
    let disk = Arc::new(disk_with_mbr(mbr, 64));

    let dm = DiskManager::new();
    dm.register_device(disk, "emmc0").unwrap();

    let parts = dm.partitions("emmc0");
    assert_eq!(parts.len(), 3);
    let mut prev_start = 0u32;
    for (num, part) in parts.iter().enumerate() {
        assert_eq!(part.name, format!("emmc0part{num}"));
        assert!(part.physical_number > 0);
        assert!(part.start_sector > 0);
        assert!(part.num_sectors > 0);
        assert!(part.start_sector >= prev_start);
        assert!(part.type_id > 0);
        prev_start = part.start_sector + part.num_sectors;
    }
}
