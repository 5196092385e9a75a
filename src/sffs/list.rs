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

//! A file's inode list: the singly linked chain of table entries carrying its
//! data-block pointers.
//!
//! The chain is identified by inode numbers, not memory pointers. Operations
//! walk it with a cursor, reading, patching and writing one entry at a time. A
//! supplementary entry keeps only the `{ino, next_entry}` header; every byte
//! past it holds pointers, which makes its pointer count `Q` larger than the
//! primary's `P`.

use crate::bitmap;
use crate::device;
use crate::device::BlockAddr;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::inode;
use crate::inode::InodeRecord;
use crate::superblock::Superblock;
use crate::util::alloc_buf;
use bitflags::bitflags;

/// The size of a supplementary entry's header: its own inode number and the
/// next-entry pointer.
pub const LIST_HEADER_SIZE: usize = 8;

bitflags! {
    /// Flags for the block-index resolver.
    pub struct ResolveFlags: u32 {
        /// Resolve the file's tail slot instead of the given index.
        const LAST = 0b01;
        /// Also fetch the resolved block's contents.
        const READ = 0b10;
    }
}

/// The result of a block-index resolution.
pub struct ResolvedBlock {
    /// The data block id held by the slot.
    pub block_id: u32,
    /// The inode owning the slot.
    pub owner_ino: u32,
    /// The index of the slot inside its owner's pointer area.
    pub slot: u32,
    /// The block's contents, if requested.
    pub data: Option<Vec<u8>>,
}

/// Returns the number of data-block pointers in a supplementary entry.
pub fn supp_slots(sb: &Superblock) -> u32 {
    (sb.entry_size() - LIST_HEADER_SIZE as u32) / 4
}

/// Returns the next-entry pointer of a raw table entry.
pub(crate) fn entry_next(entry: &[u8]) -> u32 {
    u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]])
}

/// Sets the next-entry pointer of a raw table entry.
pub(crate) fn set_entry_next(entry: &mut [u8], next: u32) {
    entry[4..8].copy_from_slice(&next.to_le_bytes());
}

/// Returns the pointer at `slot` of a raw supplementary entry.
pub(crate) fn entry_ptr(entry: &[u8], slot: usize) -> u32 {
    let off = LIST_HEADER_SIZE + slot * 4;
    u32::from_le_bytes([entry[off], entry[off + 1], entry[off + 2], entry[off + 3]])
}

/// Sets the pointer at `slot` of a raw supplementary entry.
pub(crate) fn set_entry_ptr(entry: &mut [u8], slot: usize, val: u32) {
    let off = LIST_HEADER_SIZE + slot * 4;
    entry[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

/// Appends `size` supplementary entries to the file's inode list.
///
/// Slots right after the current tail are preferred when they are free and lie
/// in the same table block; otherwise any free slots found by scanning the
/// inode bitmap are used. The new entries are written as stubs, spliced onto
/// the tail, and the primary is updated and rewritten.
pub fn extend(
    dev: &mut Device,
    sb: &mut Superblock,
    primary: &mut InodeRecord,
    size: u32,
) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    let list_size = primary.node.list_size;
    let max_list = sb.max_inode_list;
    if max_list != 0 && list_size + size > max_list {
        return Err(Error::NoSpc);
    }
    if sb.free_inodes < size {
        return Err(Error::NoSpc);
    }
    let chosen = pick_slots(dev, sb, primary, size)?;
    // Write the stubs, each pointing to its successor
    for (j, &ino) in chosen.iter().enumerate() {
        let next = chosen.get(j + 1).copied().unwrap_or(0);
        let mut entry = alloc_buf(sb.entry_size() as usize)?;
        entry[0..4].copy_from_slice(&ino.to_le_bytes());
        set_entry_next(&mut entry, next);
        inode::write_slot_raw(dev, sb, ino, &entry)?;
    }
    // Splice onto the existing tail
    let first = chosen[0];
    let tail = primary.node.last_entry;
    if tail == primary.node.ino {
        primary.node.next_entry = first;
    } else {
        let mut entry = inode::read_slot_raw(dev, sb, tail)?;
        set_entry_next(&mut entry, first);
        inode::write_slot_raw(dev, sb, tail, &entry)?;
    }
    primary.node.list_size = list_size + size;
    primary.node.last_entry = chosen[chosen.len() - 1];
    inode::write(dev, sb, primary)
}

/// Picks `size` free inode slots for the list extension.
fn pick_slots(
    dev: &mut Device,
    sb: &Superblock,
    primary: &InodeRecord,
    size: u32,
) -> Result<Vec<u32>> {
    let per_block = sb.entries_per_block();
    let last = primary.node.last_entry;
    let inode_bitmap = sb.inode_bitmap;
    // Sequential attempt: the slots right after the tail, in the same table
    // block
    if (last % per_block) + size < per_block && last + size < sb.total_inodes {
        let mut free = true;
        for ino in (last + 1)..=(last + size) {
            if bitmap::check(dev, sb, &inode_bitmap, ino)? {
                free = false;
                break;
            }
        }
        if free {
            return Ok(((last + 1)..=(last + size)).collect());
        }
    }
    // Fallback: linear scan of the inode bitmap
    let mut chosen = Vec::with_capacity(size as usize);
    let blk_size = sb.block_size;
    let mut buf = alloc_buf(blk_size as usize)?;
    for blk in 0..inode_bitmap.size {
        device::read_block(
            dev,
            sb,
            BlockAddr::Absolute(inode_bitmap.start + blk),
            &mut buf,
        )?;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == 0xff {
                continue;
            }
            for j in 0..8 {
                let ino = (blk * blk_size + i as u32) * 8 + j;
                if ino < sb.reserved_inodes || ino >= sb.total_inodes {
                    continue;
                }
                if (*byte >> j) & 0b1 == 0 {
                    chosen.push(ino);
                    if chosen.len() as u32 == size {
                        return Ok(chosen);
                    }
                }
            }
        }
    }
    // The free counter promised enough slots
    Err(Error::Fs)
}

/// Resolves the logical block `n` of the file to its pointer slot.
///
/// With [`ResolveFlags::LAST`], the tail slot is resolved instead of `n`; on an
/// empty file the result is defined but its block id is meaningless. With
/// [`ResolveFlags::READ`], the block's contents are fetched as well.
pub fn resolve(
    dev: &mut Device,
    sb: &Superblock,
    primary: &InodeRecord,
    n: u32,
    flags: ResolveFlags,
) -> Result<ResolvedBlock> {
    let blocks_count = primary.node.blocks_count;
    let n = if flags.contains(ResolveFlags::LAST) {
        blocks_count.saturating_sub(1)
    } else {
        if n >= blocks_count {
            return Err(Error::InvArg);
        }
        n
    };
    let p = sb.primary_slots();
    let (block_id, owner_ino, slot) = if n < p {
        (primary.ptrs[n as usize], primary.node.ino, n)
    } else {
        let q = supp_slots(sb);
        let m = n - p;
        let slot = m % q;
        // Walk the chain to the owning supplementary entry
        let mut cur = primary.node.next_entry;
        for _ in 0..(m / q) {
            if cur == 0 {
                return Err(Error::Fs);
            }
            let entry = inode::read_slot_raw(dev, sb, cur)?;
            cur = entry_next(&entry);
        }
        if cur == 0 {
            return Err(Error::Fs);
        }
        let entry = inode::read_slot_raw(dev, sb, cur)?;
        (entry_ptr(&entry, slot as usize), cur, slot)
    };
    let data = if flags.contains(ResolveFlags::READ) && blocks_count > 0 {
        let mut buf = alloc_buf(sb.block_size as usize)?;
        device::read_block(dev, sb, BlockAddr::Data(block_id), &mut buf)?;
        Some(buf)
    } else {
        None
    };
    Ok(ResolvedBlock {
        block_id,
        owner_ino,
        slot,
        data,
    })
}
