/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of SFFS.
 *
 * SFFS is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * SFFS is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * SFFS. If not, see <https://www.gnu.org/licenses/>.
 */

//! The superblock describes the image layout and carries the allocation
//! counters. The in-memory copy owned by the mounted context is authoritative;
//! it is written back at least on unmount and on `statfs`.

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::inode;
use crate::util::ceil_division;
use std::mem::size_of;

/// The offset of the superblock from the beginning of the image.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// The size of the boot area, in bytes. It is never written.
pub const BOOT_SIZE: u64 = 1024;
/// The filesystem's signature.
pub const SFFS_MAGIC: u32 = 0x53FF5346;

/// The default number of bytes of image per inode.
pub const DEFAULT_INODE_RATIO: u32 = 131072;
/// The default maximum number of mounts before a check is advised.
pub const DEFAULT_MAX_MOUNT: u16 = 16;
/// The default cap on the length of a file's inode list. Zero disables the
/// cap.
pub const DEFAULT_MAX_INODE_LIST: u32 = 32;
/// The number of data blocks per group. A group's bits cover exactly one
/// machine word of the data bitmap.
pub const BLOCKS_PER_GROUP: u32 = 64;

/// State: the filesystem is clean.
pub const STATE_CLEAN: u16 = 1;
/// State: the filesystem has errors and requires repair.
pub const STATE_ERROR: u16 = 2;

/// Options for the image initialization.
#[derive(Default)]
pub struct FormatOpts {
    /// The length of the filesystem in bytes. If `None`, the device size is
    /// used.
    pub fs_size: Option<u64>,
    /// The block size in bytes. If `None`, the host's natural block size is
    /// used.
    pub block_size: Option<u32>,
    /// The number of bytes of image per inode.
    pub inode_ratio: Option<u32>,
    /// The cap on inode list lengths, zero meaning no cap.
    pub max_inode_list: Option<u32>,
    /// The number of blocks to preallocate for regular files.
    pub prealloc_blocks: u8,
    /// The number of blocks to preallocate for directories.
    pub prealloc_dir_blocks: u8,
}

/// An on-disk region: a starting block and a length in blocks.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Region {
    /// The absolute index of the region's first block.
    pub start: u32,
    /// The size of the region in blocks.
    pub size: u32,
}

/// The SFFS superblock.
///
/// The structure is written as-is at offset 1024 of the image: packed,
/// little-endian, no implicit padding.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    /// Total number of inode slots.
    pub total_inodes: u32,
    /// Number of free inode slots.
    pub free_inodes: u32,
    /// Number of reserved inode slots at the beginning of the table.
    pub reserved_inodes: u32,
    /// Total number of blocks on the image.
    pub total_blocks: u32,
    /// Number of free data blocks.
    pub free_blocks: u32,
    /// Total number of block groups in the data region.
    pub total_groups: u32,
    /// Number of groups with no block in use.
    pub free_groups: u32,
    /// The size of a block in bytes.
    pub block_size: u32,
    /// The number of data blocks per group.
    pub blocks_per_group: u32,
    /// Low-precision timestamp of the last mount.
    pub mount_time: u16,
    /// Low-precision timestamp of the last superblock write.
    pub write_time: u16,
    /// The number of mounts since creation.
    pub mount_count: u16,
    /// The number of mounts after which a check is advised.
    pub max_mount_count: u16,
    /// The filesystem's state.
    pub state: u16,
    /// The code of the last error detected on the filesystem.
    pub last_error: u16,
    /// The size of an inode record in bytes, without its pointer area.
    pub inode_size: u16,
    /// The size of the data-pointer area following each inode record.
    pub inode_block_size: u16,
    /// The filesystem's signature.
    pub magic: u32,
    /// The cap on inode list lengths, zero meaning no cap.
    pub max_inode_list: u32,
    /// Feature flags. None are defined yet.
    pub features: u32,
    /// The number of blocks to preallocate for regular files.
    pub prealloc_blocks: u8,
    /// The number of blocks to preallocate for directories.
    pub prealloc_dir_blocks: u8,
    /// The data bitmap region.
    pub data_bitmap: Region,
    /// The inode bitmap region.
    pub inode_bitmap: Region,
    /// The inode table region.
    pub inode_table: Region,
    /// The absolute index of the first data block.
    pub first_data_block: u32,
}

impl Superblock {
    /// Reads the superblock from the given device.
    pub fn read(dev: &mut Device) -> Result<Self> {
        dev.read_obj::<Self>(SUPERBLOCK_OFFSET)
    }

    /// Writes the superblock onto the given device, refreshing the write
    /// timestamp.
    pub fn write(&mut self, dev: &mut Device) -> Result<()> {
        self.write_time = crate::util::get_timestamp().as_secs() as u16;
        dev.write_obj(self, SUPERBLOCK_OFFSET)
    }

    /// Tells whether the superblock carries the SFFS signature.
    pub fn is_valid(&self) -> bool {
        self.magic == SFFS_MAGIC
    }

    /// Returns the size of a full inode table slot: the record plus its
    /// pointer area.
    pub fn entry_size(&self) -> u32 {
        self.inode_size as u32 + self.inode_block_size as u32
    }

    /// Returns the number of inode table slots per block.
    pub fn entries_per_block(&self) -> u32 {
        self.block_size / self.entry_size()
    }

    /// Returns the number of data-block pointers in a primary inode record.
    pub fn primary_slots(&self) -> u32 {
        self.inode_block_size as u32 / 4
    }

    /// Returns the number of blocks in the data region.
    pub fn data_blocks(&self) -> u32 {
        self.total_blocks - self.first_data_block
    }

    /// Checks the layout invariant: the head region, the two bitmaps, the
    /// inode table and the data region must partition the device exactly.
    pub fn check_layout(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::Fs);
        }
        let blk_size = self.block_size;
        if blk_size == 0 || !blk_size.is_power_of_two() || self.entry_size() > blk_size {
            return Err(Error::Fs);
        }
        if blk_size > u16::MAX as u32 {
            return Err(Error::Fs);
        }
        if self.blocks_per_group != BLOCKS_PER_GROUP {
            return Err(Error::Fs);
        }
        let data_bitmap = self.data_bitmap;
        let inode_bitmap = self.inode_bitmap;
        let inode_table = self.inode_table;
        let head = data_bitmap.start;
        let contiguous = inode_bitmap.start == data_bitmap.start + data_bitmap.size
            && inode_table.start == inode_bitmap.start + inode_bitmap.size
            && self.first_data_block == inode_table.start + inode_table.size;
        if !contiguous || self.first_data_block >= self.total_blocks {
            return Err(Error::Fs);
        }
        let total = head as u64
            + data_bitmap.size as u64
            + inode_bitmap.size as u64
            + inode_table.size as u64
            + self.data_blocks() as u64;
        if total != self.total_blocks as u64 {
            return Err(Error::Fs);
        }
        Ok(())
    }
}

/// Checks that the given block size is usable: non-zero, a power of two, not
/// exceeding the host page size, and large enough to hold an inode table
/// slot.
fn check_block_size(blk_size: u32) -> Result<()> {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
    if blk_size == 0 || !blk_size.is_power_of_two() || blk_size as u64 > page_size {
        return Err(Error::InvBlk);
    }
    // Directory record lengths are 16-bit and cover whole blocks
    if blk_size > u16::MAX as u32 {
        return Err(Error::InvBlk);
    }
    let entry_size = inode::INODE_SIZE as u32 + inode::DEFAULT_INODE_DATA_SIZE as u32;
    if blk_size < entry_size {
        return Err(Error::InvBlk);
    }
    if !(1024..=4096).contains(&blk_size) {
        log::warn!("block size {blk_size} is outside of the optimal range [1024; 4096]");
    }
    Ok(())
}

/// Computes a fresh superblock for an image of `fs_size` bytes with blocks of
/// `blk_size` bytes.
///
/// The layout is laid from the beginning of the image: boot area and
/// superblock, data bitmap, inode bitmap, inode table, then data. If the
/// computed regions do not partition the device exactly, the function fails
/// with [`Error::Init`].
pub fn init(fs_size: u64, blk_size: u32, opts: &FormatOpts) -> Result<Superblock> {
    check_block_size(blk_size)?;
    let total_blocks = fs_size / blk_size as u64;
    if total_blocks == 0 || total_blocks > u32::MAX as u64 {
        return Err(Error::InvArg);
    }
    let total_blocks = total_blocks as u32;

    let inode_ratio = opts.inode_ratio.unwrap_or(DEFAULT_INODE_RATIO);
    if inode_ratio == 0 {
        return Err(Error::InvArg);
    }
    let entry_size = inode::INODE_SIZE as u32 + inode::DEFAULT_INODE_DATA_SIZE as u32;
    let per_block = blk_size / entry_size;

    // The inode count is rounded up to the capacity of the table blocks
    // holding it
    let wanted_inodes = (fs_size / inode_ratio as u64).max(1) as u32;
    let table_blocks = ceil_division(wanted_inodes as u64, per_block as u64) as u32;
    let total_inodes = table_blocks * per_block;

    let head_blocks =
        ceil_division(BOOT_SIZE + size_of::<Superblock>() as u64, blk_size as u64) as u32;
    let data_bitmap_blocks =
        ceil_division(ceil_division(total_blocks as u64, 8), blk_size as u64) as u32;
    let inode_bitmap_blocks =
        ceil_division(ceil_division(total_inodes as u64, 8), blk_size as u64) as u32;

    let first_data_block = head_blocks + data_bitmap_blocks + inode_bitmap_blocks + table_blocks;
    if first_data_block >= total_blocks {
        return Err(Error::Init);
    }
    let data_blocks = total_blocks - first_data_block;
    let total_groups = data_blocks / BLOCKS_PER_GROUP;

    // Self-consistency: the five regions must partition the device exactly
    let sum = head_blocks as u64
        + data_bitmap_blocks as u64
        + inode_bitmap_blocks as u64
        + table_blocks as u64
        + data_blocks as u64;
    if sum != total_blocks as u64 {
        return Err(Error::Init);
    }

    let now = crate::util::get_timestamp().as_secs() as u16;
    Ok(Superblock {
        total_inodes,
        free_inodes: total_inodes,
        reserved_inodes: 0,
        total_blocks,
        free_blocks: data_blocks,
        total_groups,
        free_groups: total_groups,
        block_size: blk_size,
        blocks_per_group: BLOCKS_PER_GROUP,
        mount_time: 0,
        write_time: now,
        mount_count: 0,
        max_mount_count: DEFAULT_MAX_MOUNT,
        state: STATE_CLEAN,
        last_error: 0,
        inode_size: inode::INODE_SIZE as u16,
        inode_block_size: inode::DEFAULT_INODE_DATA_SIZE,
        magic: SFFS_MAGIC,
        max_inode_list: opts.max_inode_list.unwrap_or(DEFAULT_MAX_INODE_LIST),
        features: 0,
        prealloc_blocks: opts.prealloc_blocks,
        prealloc_dir_blocks: opts.prealloc_dir_blocks,
        data_bitmap: Region {
            start: head_blocks,
            size: data_bitmap_blocks,
        },
        inode_bitmap: Region {
            start: head_blocks + data_bitmap_blocks,
            size: inode_bitmap_blocks,
        },
        inode_table: Region {
            start: head_blocks + data_bitmap_blocks + inode_bitmap_blocks,
            size: table_blocks,
        },
        first_data_block,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layout_50mib() {
        let sb = init(52428800, 4096, &FormatOpts::default()).unwrap();
        let block_size = sb.block_size;
        let total_blocks = sb.total_blocks;
        let total_inodes = sb.total_inodes;
        let magic = sb.magic;
        assert_eq!(block_size, 4096);
        assert_eq!(total_blocks, 12800);
        assert_eq!(total_inodes, 400);
        assert_eq!(magic, SFFS_MAGIC);
        // 16 entries of 256 bytes per 4096-byte block
        assert_eq!(sb.entries_per_block(), 16);
        sb.check_layout().unwrap();
        // The regions partition the device
        let (table_start, table_size) = {
            let table = sb.inode_table;
            (table.start, table.size)
        };
        let (data_bm_start, data_bm_size) = {
            let region = sb.data_bitmap;
            (region.start, region.size)
        };
        let (inode_bm_start, inode_bm_size) = {
            let region = sb.inode_bitmap;
            (region.start, region.size)
        };
        let first_data = sb.first_data_block;
        assert_eq!(table_size, 25);
        assert_eq!(data_bm_start, 1);
        assert_eq!(inode_bm_start, data_bm_start + data_bm_size);
        assert_eq!(table_start, inode_bm_start + inode_bm_size);
        assert_eq!(first_data, table_start + table_size);
        assert_eq!(sb.data_blocks() + first_data, total_blocks);
    }

    #[test]
    fn init_rejects_bad_block_sizes() {
        assert!(matches!(
            init(52428800, 0, &FormatOpts::default()),
            Err(Error::InvBlk)
        ));
        assert!(matches!(
            init(52428800, 3000, &FormatOpts::default()),
            Err(Error::InvBlk)
        ));
        // Too small to hold one inode table slot
        assert!(matches!(
            init(52428800, 128, &FormatOpts::default()),
            Err(Error::InvBlk)
        ));
        assert!(matches!(
            init(52428800, 1 << 20, &FormatOpts::default()),
            Err(Error::InvBlk)
        ));
    }

    #[test]
    fn init_rejects_tiny_images() {
        // A couple of blocks cannot hold the metadata regions
        assert!(matches!(
            init(8192, 4096, &FormatOpts::default()),
            Err(Error::Init)
        ));
    }

    #[test]
    fn superblock_round_trip() {
        let file = tempfile::tempfile().unwrap();
        file.set_len(52428800).unwrap();
        let mut dev = Device::new(file);
        let mut sb = init(52428800, 4096, &FormatOpts::default()).unwrap();
        sb.write(&mut dev).unwrap();
        let read = Superblock::read(&mut dev).unwrap();
        assert_eq!(
            crate::util::reinterpret(&sb),
            crate::util::reinterpret(&read)
        );
    }
}
