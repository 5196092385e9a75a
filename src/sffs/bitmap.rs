//! Per-bit operations over the two allocation bitmaps.
//!
//! Bit `k` of a bitmap tells whether resource `k` (a data block or an inode
//! slot) is in use. Setting an already-set bit signals corruption; clearing is
//! unconditional.

use crate::device;
use crate::device::BlockAddr;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::superblock::Region;
use crate::superblock::Superblock;
use crate::util::alloc_buf;

/// Returns the position of `bit` inside the region `region`: the absolute
/// block holding it, the byte offset inside that block and the bit mask.
fn locate(sb: &Superblock, region: &Region, bit: u32) -> Result<(u32, usize, u8)> {
    let blk_size = sb.block_size;
    let byte = bit / 8;
    let blk = byte / blk_size;
    if blk >= region.size {
        return Err(Error::InvArg);
    }
    let region_start = region.start;
    Ok((
        region_start + blk,
        (byte % blk_size) as usize,
        1 << (bit % 8),
    ))
}

/// Tells whether the bit `bit` of the bitmap `region` is set.
pub fn check(dev: &mut Device, sb: &Superblock, region: &Region, bit: u32) -> Result<bool> {
    let (blk, byte_off, mask) = locate(sb, region, bit)?;
    let mut byte = [0u8; 1];
    let off = blk as u64 * sb.block_size as u64 + byte_off as u64;
    dev.read_at(off, &mut byte)?;
    Ok(byte[0] & mask != 0)
}

/// Sets the bit `bit` of the bitmap `region`.
///
/// Setting a bit that is already set is a corruption and fails with
/// [`Error::Fs`].
pub fn set(dev: &mut Device, sb: &Superblock, region: &Region, bit: u32) -> Result<()> {
    let (blk, byte_off, mask) = locate(sb, region, bit)?;
    let mut buf = alloc_buf(sb.block_size as usize)?;
    device::read_block(dev, sb, BlockAddr::Absolute(blk), &mut buf)?;
    if buf[byte_off] & mask != 0 {
        return Err(Error::Fs);
    }
    buf[byte_off] |= mask;
    device::write_block(dev, sb, BlockAddr::Absolute(blk), &buf)
}

/// Clears the bit `bit` of the bitmap `region`, unconditionally.
pub fn clear(dev: &mut Device, sb: &Superblock, region: &Region, bit: u32) -> Result<()> {
    let (blk, byte_off, mask) = locate(sb, region, bit)?;
    let mut buf = alloc_buf(sb.block_size as usize)?;
    device::read_block(dev, sb, BlockAddr::Absolute(blk), &mut buf)?;
    buf[byte_off] &= !mask;
    device::write_block(dev, sb, BlockAddr::Absolute(blk), &buf)
}

/// Reads the word of the data bitmap covering the group `group`.
///
/// A zero word means every block of the group is free.
pub fn read_group_word(dev: &mut Device, sb: &Superblock, group: u32) -> Result<u64> {
    if group >= sb.total_groups {
        return Err(Error::InvArg);
    }
    let data_bitmap = sb.data_bitmap;
    let off = data_bitmap.start as u64 * sb.block_size as u64 + group as u64 * 8;
    let mut word = [0u8; 8];
    dev.read_at(off, &mut word)?;
    Ok(u64::from_le_bytes(word))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::Sffs;
    use crate::superblock::FormatOpts;

    fn scratch() -> (tempfile::NamedTempFile, Sffs) {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(8 << 20).unwrap();
        Sffs::format(
            file.reopen().unwrap(),
            &FormatOpts {
                block_size: Some(4096),
                ..Default::default()
            },
        )
        .unwrap();
        let fs = Sffs::mount(file.reopen().unwrap(), &Default::default()).unwrap();
        (file, fs)
    }

    #[test]
    fn set_check_clear() {
        let (_file, mut fs) = scratch();
        let region = fs.sb.data_bitmap;
        assert!(!check(&mut fs.dev, &fs.sb, &region, 42).unwrap());
        set(&mut fs.dev, &fs.sb, &region, 42).unwrap();
        assert!(check(&mut fs.dev, &fs.sb, &region, 42).unwrap());
        // Double set signals corruption
        assert!(matches!(
            set(&mut fs.dev, &fs.sb, &region, 42),
            Err(Error::Fs)
        ));
        clear(&mut fs.dev, &fs.sb, &region, 42).unwrap();
        assert!(!check(&mut fs.dev, &fs.sb, &region, 42).unwrap());
        // Clear is unconditional
        clear(&mut fs.dev, &fs.sb, &region, 42).unwrap();
    }

    #[test]
    fn group_word() {
        let (_file, mut fs) = scratch();
        let region = fs.sb.data_bitmap;
        assert_eq!(read_group_word(&mut fs.dev, &fs.sb, 1).unwrap(), 0);
        // Group 1 covers bits 64..128
        set(&mut fs.dev, &fs.sb, &region, 64).unwrap();
        set(&mut fs.dev, &fs.sb, &region, 67).unwrap();
        assert_eq!(read_group_word(&mut fs.dev, &fs.sb, 1).unwrap(), 0b1001);
        assert_eq!(read_group_word(&mut fs.dev, &fs.sb, 0).unwrap(), 0);
        let total_groups = fs.sb.total_groups;
        assert!(read_group_word(&mut fs.dev, &fs.sb, total_groups).is_err());
    }
}
