//! The directory engine.
//!
//! A directory block holds a chain of variable-length records
//! `{ino_id, rec_len, file_type, name}`. The sum of `rec_len` over a block
//! always equals the block size and the chain ends with a sentinel: a record
//! with no inode and no type whose `rec_len` covers the remaining bytes.
//! Because the root directory is inode zero, a zero `ino_id` alone does not
//! mark a sentinel; the type field must be zero too.

use crate::balloc;
use crate::device;
use crate::device::BlockAddr;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::inode;
use crate::inode::InodeRecord;
use crate::list;
use crate::list::ResolveFlags;
use crate::superblock::Superblock;
use crate::util::alloc_buf;

/// The size of a directory record's header.
pub const DIRENT_HEADER_SIZE: usize = 8;
/// The maximum size of a directory record, bounding names to
/// `MAX_DIR_ENTRY - 8` bytes.
pub const MAX_DIR_ENTRY: usize = 256;

/// The file-type nibble of directory records for directories.
pub const DIRENT_TYPE_DIR: u16 = (inode::TYPE_DIRECTORY >> 12) & 0xf;
/// The file-type nibble of directory records for regular files.
pub const DIRENT_TYPE_REGULAR: u16 = (inode::TYPE_REGULAR >> 12) & 0xf;

/// A directory record.
pub struct DirEntry {
    /// The inode the record points to.
    pub ino: u32,
    /// The total length of the record on disk.
    pub rec_len: u16,
    /// The file-type nibble of the pointed inode's mode.
    pub file_type: u16,
    /// The entry's name, not NUL-terminated.
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Tells whether the record is a sentinel: free space at the tail of a
    /// directory block.
    pub fn is_sentinel(&self) -> bool {
        self.ino == 0 && self.file_type == 0
    }
}

/// The physical location of a directory record.
pub struct DirEntryLocation {
    /// The inode of the directory holding the record.
    pub dir_ino: u32,
    /// The data block holding the record.
    pub block_id: u32,
    /// The record's byte offset inside the block.
    pub offset: usize,
}

/// Returns the on-disk length of a record carrying `name`.
///
/// Names longer than `MAX_DIR_ENTRY - 8` bytes are rejected.
pub fn entry_len(name: &[u8]) -> Result<usize> {
    if name.is_empty() || name.len() > MAX_DIR_ENTRY - DIRENT_HEADER_SIZE {
        return Err(Error::InvArg);
    }
    Ok(DIRENT_HEADER_SIZE + name.len())
}

/// Parses the record header at `off` in the block `buf`, checking it against
/// the block bounds.
fn parse_header(buf: &[u8], off: usize) -> Result<(u32, usize, u16)> {
    if off + DIRENT_HEADER_SIZE > buf.len() {
        return Err(Error::Fs);
    }
    let ino = u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
    let rec_len = u16::from_le_bytes([buf[off + 4], buf[off + 5]]) as usize;
    let file_type = u16::from_le_bytes([buf[off + 6], buf[off + 7]]);
    if rec_len < DIRENT_HEADER_SIZE || off + rec_len > buf.len() {
        return Err(Error::Fs);
    }
    Ok((ino, rec_len, file_type))
}

/// Writes a record at `off` in the block `buf`.
fn write_record(buf: &mut [u8], off: usize, ino: u32, rec_len: usize, file_type: u16, name: &[u8]) {
    buf[off..off + 4].copy_from_slice(&ino.to_le_bytes());
    buf[off + 4..off + 6].copy_from_slice(&(rec_len as u16).to_le_bytes());
    buf[off + 6..off + 8].copy_from_slice(&file_type.to_le_bytes());
    buf[off + 8..off + 8 + name.len()].copy_from_slice(name);
}

/// Formats a block as a single sentinel covering it entirely.
fn empty_block(sb: &Superblock) -> Result<Vec<u8>> {
    let blk_size = sb.block_size as usize;
    let mut buf = alloc_buf(blk_size)?;
    write_record(&mut buf, 0, 0, blk_size, 0, b"");
    Ok(buf)
}

/// Initializes the directory `child`: allocates its first block and formats it
/// with `.` and `..`.
///
/// `parent` is the inode of the parent directory; `None` makes the directory
/// its own parent, which is the root's case.
pub fn init(
    dev: &mut Device,
    sb: &mut Superblock,
    child: &mut InodeRecord,
    parent: Option<u32>,
) -> Result<()> {
    let blocks = balloc::alloc(dev, sb, child, 1)?;
    let blk_size = sb.block_size as usize;
    let self_ino = child.node.ino;
    let parent_ino = parent.unwrap_or(self_ino);
    for (i, &blk) in blocks.iter().enumerate() {
        let buf = if i == 0 {
            let mut buf = alloc_buf(blk_size)?;
            let dot_len = DIRENT_HEADER_SIZE + 1;
            let dotdot_len = DIRENT_HEADER_SIZE + 2;
            write_record(&mut buf, 0, self_ino, dot_len, DIRENT_TYPE_DIR, b".");
            write_record(&mut buf, dot_len, parent_ino, dotdot_len, DIRENT_TYPE_DIR, b"..");
            let used = dot_len + dotdot_len;
            write_record(&mut buf, used, 0, blk_size - used, 0, b"");
            buf
        } else {
            // Preallocated blocks are formatted as empty
            empty_block(sb)?
        };
        device::write_block(dev, sb, BlockAddr::Data(blk), &buf)?;
    }
    child.node.bytes_rem = sb.block_size;
    inode::write(dev, sb, child)
}

/// Iterates over the records of the directory `dir`, calling `f` with each
/// record and its location. Iteration stops when `f` returns `false`.
///
/// Sentinels are included.
fn foreach_entry<F: FnMut(DirEntry, DirEntryLocation) -> bool>(
    dev: &mut Device,
    sb: &Superblock,
    dir: &InodeRecord,
    mut f: F,
) -> Result<()> {
    let blk_size = sb.block_size as usize;
    let blocks_count = dir.node.blocks_count;
    for i in 0..blocks_count {
        let resolved = list::resolve(dev, sb, dir, i, ResolveFlags::READ)?;
        let buf = resolved.data.ok_or(Error::Fs)?;
        let mut off = 0;
        while off < blk_size {
            let (ino, rec_len, file_type) = parse_header(&buf, off)?;
            let entry = DirEntry {
                ino,
                rec_len: rec_len as u16,
                file_type,
                name: buf[off + DIRENT_HEADER_SIZE..off + rec_len].to_vec(),
            };
            let location = DirEntryLocation {
                dir_ino: dir.node.ino,
                block_id: resolved.block_id,
                offset: off,
            };
            if !f(entry, location) {
                return Ok(());
            }
            off += rec_len;
        }
    }
    Ok(())
}

/// Returns every non-sentinel record of the directory `dir`.
pub fn entries(dev: &mut Device, sb: &Superblock, dir: &InodeRecord) -> Result<Vec<DirEntry>> {
    let mut res = Vec::new();
    foreach_entry(dev, sb, dir, |entry, _| {
        if !entry.is_sentinel() {
            res.push(entry);
        }
        true
    })?;
    Ok(res)
}

/// Looks for the record named `name` in the directory `dir`.
///
/// An absent name is not an error: the function returns `None`.
pub fn lookup(
    dev: &mut Device,
    sb: &Superblock,
    dir: &InodeRecord,
    name: &[u8],
) -> Result<Option<(DirEntry, DirEntryLocation)>> {
    let mut res = None;
    foreach_entry(dev, sb, dir, |entry, location| {
        if !entry.is_sentinel() && entry.name == name {
            res = Some((entry, location));
            false
        } else {
            true
        }
    })?;
    Ok(res)
}

/// Inserts a record `{name, ino, file_type}` into the directory `dir`.
///
/// The blocks are scanned for a sentinel large enough to hold the record while
/// leaving a trailing sentinel of at least the header size behind it. When no
/// block has such a gap, the directory is extended by a fresh block. A
/// duplicate name fails with [`Error::EntExists`].
pub fn insert(
    dev: &mut Device,
    sb: &mut Superblock,
    dir: &mut InodeRecord,
    name: &[u8],
    ino: u32,
    file_type: u16,
) -> Result<()> {
    let rec_len = entry_len(name)?;
    let blk_size = sb.block_size as usize;
    if rec_len + DIRENT_HEADER_SIZE > blk_size {
        return Err(Error::InvArg);
    }
    if lookup(dev, sb, dir, name)?.is_some() {
        return Err(Error::EntExists);
    }
    // Scan for a gap of sufficient size
    let mut gap = None;
    foreach_entry(dev, sb, dir, |entry, location| {
        if entry.is_sentinel() && entry.rec_len as usize >= rec_len + DIRENT_HEADER_SIZE {
            gap = Some((entry.rec_len as usize, location));
            false
        } else {
            true
        }
    })?;
    let (gap_len, location) = match gap {
        Some(gap) => gap,
        None => {
            // Every block reached its sentinel without room: extend
            let blocks = balloc::alloc(dev, sb, dir, 1)?;
            for &blk in &blocks {
                let buf = empty_block(sb)?;
                device::write_block(dev, sb, BlockAddr::Data(blk), &buf)?;
            }
            dir.node.bytes_rem = sb.block_size;
            inode::write(dev, sb, dir)?;
            let location = DirEntryLocation {
                dir_ino: dir.node.ino,
                block_id: blocks[0],
                offset: 0,
            };
            (blk_size, location)
        }
    };
    // Write the record over the gap and re-create the trailing sentinel
    let mut buf = alloc_buf(blk_size)?;
    device::read_block(dev, sb, BlockAddr::Data(location.block_id), &mut buf)?;
    write_record(&mut buf, location.offset, ino, rec_len, file_type, name);
    write_record(
        &mut buf,
        location.offset + rec_len,
        0,
        gap_len - rec_len,
        0,
        b"",
    );
    device::write_block(dev, sb, BlockAddr::Data(location.block_id), &buf)
}
