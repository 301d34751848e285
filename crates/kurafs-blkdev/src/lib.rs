//! # kurafs-blkdev
//!
//! The raw-storage layer of kurafs:
//!
//! - [`BlockDevice`] - sector-addressed read/write with fixed geometry
//! - [`partition_search`] - MBR/EBR partition-table scanner
//! - [`DiskManager`] - named device registry that scans partitions on
//!   registration and hands out [`DiskHandle`]s
//!
//! A registered device named `emmc0` with two discovered partitions is
//! addressable as `emmc0` (whole disk), `emmc0part0` and `emmc0part1`.
//! Partition handles translate sector addresses by the partition's start
//! LBA and bounds-check against its extent.

mod device;
mod manager;
mod parser;
mod partition;

pub use device::{BlockDevice, ImageDisk, RamDisk};
pub use manager::{DiskHandle, DiskManager};
pub use parser::partition_search;
pub use partition::Partition;
