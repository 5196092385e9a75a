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

//! The data-block allocator.
//!
//! Blocks are picked in three steps, stopping as soon as the request is
//! filled:
//! 1. Extending the group holding the file's last block, for locality
//! 2. Taking whole groups whose bitmap word is zero
//! 3. Linear scan of the data bitmap
//!
//! The commit then marks the bitmap bits first (rolling back the ones already
//! set on failure), registers the block ids into the file's pointer slots, and
//! finally updates the counters and rewrites the primary. A failed allocation
//! thus never leaves the persisted inode pointing at unmarked blocks.

use crate::bitmap;
use crate::device;
use crate::device::BlockAddr;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::inode;
use crate::inode::FileType;
use crate::inode::InodeRecord;
use crate::list;
use crate::list::ResolveFlags;
use crate::superblock::STATE_ERROR;
use crate::superblock::Superblock;
use crate::util::alloc_buf;
use crate::util::ceil_division;

/// Allocates `count` data blocks for the file owning `primary` and maps them
/// to its pointer slots.
///
/// Regular files and directories are topped up by the superblock's
/// preallocation counts; the boost is dropped when free space cannot cover it,
/// and the request itself fails with [`Error::NoSpc`] when free space cannot
/// cover `count`. The inode list is grown first when the current pointer
/// capacity is too small.
///
/// Returns the allocated block ids, in file order.
pub fn alloc(
    dev: &mut Device,
    sb: &mut Superblock,
    primary: &mut InodeRecord,
    count: u32,
) -> Result<Vec<u32>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let free_blocks = sb.free_blocks;
    if count > free_blocks {
        return Err(Error::NoSpc);
    }
    let boost = match primary.node.file_type()? {
        FileType::Regular => sb.prealloc_blocks as u32,
        FileType::Directory => sb.prealloc_dir_blocks as u32,
        _ => 0,
    };
    let mut want = count + boost;
    if want > free_blocks {
        want = count;
    }
    // Grow the inode list when the pointer slots cannot hold the new blocks
    let q = list::supp_slots(sb);
    let capacity = sb.primary_slots() + (primary.node.list_size - 1) * q;
    let free_slots = capacity
        .checked_sub(primary.node.blocks_count)
        .ok_or(Error::Fs)?;
    if free_slots < want {
        let deficit = want - free_slots;
        list::extend(dev, sb, primary, ceil_division(deficit as u64, q as u64) as u32)?;
    }
    let (chosen, allocated_grps) = pick_blocks(dev, sb, primary, want)?;
    // Bitmap first: a file must never point at a block whose bit is clear
    let data_bitmap = sb.data_bitmap;
    for (i, &blk) in chosen.iter().enumerate() {
        if let Err(e) = bitmap::set(dev, sb, &data_bitmap, blk) {
            rollback(dev, sb, &chosen[..i]);
            return Err(e);
        }
    }
    // Register the ids into the pointer slots along the chain
    if let Err(e) = register(dev, sb, primary, &chosen) {
        rollback(dev, sb, &chosen);
        return Err(e);
    }
    primary.node.blocks_count += chosen.len() as u32;
    sb.free_blocks -= chosen.len() as u32;
    sb.free_groups -= allocated_grps;
    if let Err(e) = inode::write(dev, sb, primary) {
        primary.node.blocks_count -= chosen.len() as u32;
        sb.free_blocks += chosen.len() as u32;
        sb.free_groups += allocated_grps;
        rollback(dev, sb, &chosen);
        return Err(e);
    }
    Ok(chosen)
}

/// Picks `want` free data blocks, following the three-step policy. Returns the
/// chosen blocks and the number of previously-empty groups that were dipped
/// into by step 2.
fn pick_blocks(
    dev: &mut Device,
    sb: &Superblock,
    primary: &InodeRecord,
    want: u32,
) -> Result<(Vec<u32>, u32)> {
    let bpg = sb.blocks_per_group;
    let data_blocks = sb.data_blocks();
    let mut chosen = Vec::new();
    chosen
        .try_reserve_exact(want as usize)
        .map_err(|_| Error::MemAlloc)?;
    // Step 1: extend the group holding the file's last block, starting right
    // after it. An empty file starts at the beginning of group zero.
    let (group, start) = if primary.node.blocks_count > 0 {
        let last = list::resolve(dev, sb, primary, 0, ResolveFlags::LAST)?.block_id;
        (last / bpg, last % bpg + 1)
    } else {
        (0, 0)
    };
    if group < sb.total_groups {
        let word = bitmap::read_group_word(dev, sb, group)?;
        for off in start..bpg {
            if chosen.len() as u32 == want {
                break;
            }
            let blk = group * bpg + off;
            if (word >> off) & 0b1 == 0 && blk < data_blocks {
                chosen.push(blk);
            }
        }
    }
    // Step 2: whole empty groups
    let mut allocated_grps = 0;
    for grp in 0..sb.total_groups {
        if chosen.len() as u32 == want {
            break;
        }
        let word = bitmap::read_group_word(dev, sb, grp)?;
        if word != 0 || chosen.iter().any(|blk| blk / bpg == grp) {
            continue;
        }
        allocated_grps += 1;
        for off in 0..bpg {
            if chosen.len() as u32 == want {
                break;
            }
            let blk = grp * bpg + off;
            if blk < data_blocks {
                chosen.push(blk);
            }
        }
    }
    // Step 3: linear scan of the data bitmap
    if (chosen.len() as u32) < want {
        let blk_size = sb.block_size;
        let data_bitmap = sb.data_bitmap;
        let mut buf = alloc_buf(blk_size as usize)?;
        'scan: for bm_blk in 0..data_bitmap.size {
            device::read_block(
                dev,
                sb,
                BlockAddr::Absolute(data_bitmap.start + bm_blk),
                &mut buf,
            )?;
            for (i, byte) in buf.iter().enumerate() {
                if *byte == 0xff {
                    continue;
                }
                for j in 0..8 {
                    let blk = (bm_blk * blk_size + i as u32) * 8 + j;
                    if blk >= data_blocks {
                        break 'scan;
                    }
                    if (*byte >> j) & 0b1 == 0 && !chosen.contains(&blk) {
                        chosen.push(blk);
                        if chosen.len() as u32 == want {
                            break 'scan;
                        }
                    }
                }
            }
        }
    }
    if (chosen.len() as u32) < want {
        // The free counter promised enough blocks
        return Err(Error::Fs);
    }
    Ok((chosen, allocated_grps))
}

/// Writes the chosen block ids into the file's pointer slots, starting at the
/// first unused slot: first in the primary's in-memory pointer area, then
/// along the chain, persisting each patched supplementary entry.
fn register(
    dev: &mut Device,
    sb: &mut Superblock,
    primary: &mut InodeRecord,
    chosen: &[u32],
) -> Result<()> {
    let p = sb.primary_slots();
    let q = list::supp_slots(sb);
    let mut n = primary.node.blocks_count;
    let mut idx = 0;
    while idx < chosen.len() && n < p {
        primary.ptrs[n as usize] = chosen[idx];
        idx += 1;
        n += 1;
    }
    if idx == chosen.len() {
        return Ok(());
    }
    // Walk to the entry holding the next free slot
    let m = n - p;
    let mut slot = (m % q) as usize;
    let mut cur = primary.node.next_entry;
    for _ in 0..(m / q) {
        if cur == 0 {
            return Err(Error::Fs);
        }
        let entry = inode::read_slot_raw(dev, sb, cur)?;
        cur = list::entry_next(&entry);
    }
    while idx < chosen.len() {
        if cur == 0 {
            return Err(Error::Fs);
        }
        let mut entry = inode::read_slot_raw(dev, sb, cur)?;
        while idx < chosen.len() && slot < q as usize {
            list::set_entry_ptr(&mut entry, slot, chosen[idx]);
            idx += 1;
            slot += 1;
        }
        inode::write_slot_raw(dev, sb, cur, &entry)?;
        slot = 0;
        cur = list::entry_next(&entry);
    }
    Ok(())
}

/// Clears the bits of `blocks` after a failed commit. If the rollback itself
/// fails, the filesystem is marked errored: it requires repair.
fn rollback(dev: &mut Device, sb: &mut Superblock, blocks: &[u32]) {
    let data_bitmap = sb.data_bitmap;
    for &blk in blocks {
        if let Err(e) = bitmap::clear(dev, sb, &data_bitmap, blk) {
            log::error!("block allocation rollback failed, filesystem requires repair: {e}");
            sb.state = STATE_ERROR;
            sb.last_error = e.code();
            let _ = sb.write(dev);
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::Sffs;
    use crate::inode::TYPE_REGULAR;
    use crate::superblock::FormatOpts;

    fn scratch(opts: FormatOpts) -> (tempfile::NamedTempFile, Sffs) {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(8 << 20).unwrap();
        Sffs::format(file.reopen().unwrap(), &opts).unwrap();
        let fs = Sffs::mount(file.reopen().unwrap(), &Default::default()).unwrap();
        (file, fs)
    }

    fn opts_4k() -> FormatOpts {
        FormatOpts {
            block_size: Some(4096),
            ..Default::default()
        }
    }

    fn new_file(fs: &mut Sffs, ino: u32) -> InodeRecord {
        let rec = inode::create(&fs.sb, ino, TYPE_REGULAR | 0o644, 0).unwrap();
        inode::write(&mut fs.dev, &mut fs.sb, &rec).unwrap();
        rec
    }

    #[test]
    fn allocation_extends_the_last_group() {
        let (_file, mut fs) = scratch(opts_4k());
        let mut rec = new_file(&mut fs, 0);
        let free_before = fs.sb.free_blocks;
        let blocks = alloc(&mut fs.dev, &mut fs.sb, &mut rec, 3).unwrap();
        assert_eq!(blocks, vec![0, 1, 2]);
        let blocks_count = rec.node.blocks_count;
        assert_eq!(blocks_count, 3);
        assert_eq!(&rec.ptrs[..3], &[0, 1, 2]);
        let free_after = fs.sb.free_blocks;
        assert_eq!(free_after, free_before - 3);
        let data_bitmap = fs.sb.data_bitmap;
        for blk in 0..3 {
            assert!(bitmap::check(&mut fs.dev, &fs.sb, &data_bitmap, blk).unwrap());
        }
        // The next allocation keeps extending the same group
        let blocks = alloc(&mut fs.dev, &mut fs.sb, &mut rec, 2).unwrap();
        assert_eq!(blocks, vec![3, 4]);
    }

    #[test]
    fn allocation_crosses_into_a_fresh_group() {
        let (_file, mut fs) = scratch(opts_4k());
        let mut rec = new_file(&mut fs, 0);
        alloc(&mut fs.dev, &mut fs.sb, &mut rec, 3).unwrap();
        let free_groups_before = fs.sb.free_groups;
        // Exhausts the 61 remaining blocks of group 0, then dips into the next
        // empty group
        let blocks = alloc(&mut fs.dev, &mut fs.sb, &mut rec, 64).unwrap();
        assert_eq!(blocks, (3..67).collect::<Vec<_>>());
        let blocks_count = rec.node.blocks_count;
        assert_eq!(blocks_count, 67);
        let free_groups_after = fs.sb.free_groups;
        assert_eq!(free_groups_after, free_groups_before - 1);
        // The request crossed the primary's pointer area, so the list grew
        let list_size = rec.node.list_size;
        assert_eq!(list_size, 2);
        let tail = list::resolve(&mut fs.dev, &fs.sb, &rec, 0, ResolveFlags::LAST).unwrap();
        assert_eq!(tail.block_id, 66);
        let last_entry = rec.node.last_entry;
        assert_eq!(tail.owner_ino, last_entry);
    }

    #[test]
    fn allocation_fails_on_exhaustion() {
        let (_file, mut fs) = scratch(opts_4k());
        let mut rec = new_file(&mut fs, 0);
        let free_blocks = fs.sb.free_blocks;
        assert!(matches!(
            alloc(&mut fs.dev, &mut fs.sb, &mut rec, free_blocks + 1),
            Err(Error::NoSpc)
        ));
        // The failed attempt left no state behind
        let blocks_count = rec.node.blocks_count;
        assert_eq!(blocks_count, 0);
        let free_after = fs.sb.free_blocks;
        assert_eq!(free_after, free_blocks);
    }

    #[test]
    fn preallocation_boosts_regular_files() {
        let (_file, mut fs) = scratch(FormatOpts {
            block_size: Some(4096),
            prealloc_blocks: 4,
            ..Default::default()
        });
        let mut rec = new_file(&mut fs, 0);
        let blocks = alloc(&mut fs.dev, &mut fs.sb, &mut rec, 2).unwrap();
        assert_eq!(blocks.len(), 6);
        let blocks_count = rec.node.blocks_count;
        assert_eq!(blocks_count, 6);
    }

    #[test]
    fn primary_area_boundary() {
        let (_file, mut fs) = scratch(opts_4k());
        let p = fs.sb.primary_slots();
        let mut rec = new_file(&mut fs, 0);
        // Exactly filling the primary pointer area needs no supplementary
        // entry
        alloc(&mut fs.dev, &mut fs.sb, &mut rec, p).unwrap();
        let list_size = rec.node.list_size;
        assert_eq!(list_size, 1);
        // The next block crosses into a supplementary entry
        alloc(&mut fs.dev, &mut fs.sb, &mut rec, 1).unwrap();
        let list_size = rec.node.list_size;
        assert_eq!(list_size, 2);
        let r = list::resolve(&mut fs.dev, &fs.sb, &rec, p, ResolveFlags::empty()).unwrap();
        let last_entry = rec.node.last_entry;
        assert_eq!(r.owner_ino, last_entry);
        assert_eq!(r.slot, 0);
        assert_eq!(r.block_id, p);
    }

    #[test]
    fn pointer_sum_matches_block_count() {
        let (_file, mut fs) = scratch(opts_4k());
        let p = fs.sb.primary_slots();
        let mut rec = new_file(&mut fs, 0);
        // Enough to need two supplementary entries
        let q = list::supp_slots(&fs.sb);
        let count = p + q + 3;
        let blocks = alloc(&mut fs.dev, &mut fs.sb, &mut rec, count).unwrap();
        assert_eq!(blocks.len() as u32, count);
        let list_size = rec.node.list_size;
        assert_eq!(list_size, 3);
        // Every slot along the chain holds the id registered for it
        for (i, &blk) in blocks.iter().enumerate() {
            let r =
                list::resolve(&mut fs.dev, &fs.sb, &rec, i as u32, ResolveFlags::empty()).unwrap();
            assert_eq!(r.block_id, blk);
        }
    }
}
