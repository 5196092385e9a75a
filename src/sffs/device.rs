//! Block-granularity I/O against the backing image file.
//!
//! Blocks are addressed either from the start of the image (absolute) or from
//! the start of the data region (data-relative). Every write is followed by a
//! durable flush of the image handle until a write-back cache is introduced.

use crate::error::Error;
use crate::error::Result;
use crate::superblock::Superblock;
use libc::ioctl;
use std::ffi::c_long;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::mem::size_of;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::fs::MetadataExt;
use std::slice;

/// ioctl macro: Command.
macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

/// ioctl macro: Read command.
macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, size_of::<$c>() as c_long)
    };
}

/// ioctl command: Get size of disk in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// A block's position on the image.
#[derive(Clone, Copy)]
pub enum BlockAddr {
    /// Block index from the beginning of the image.
    Absolute(u32),
    /// Block index from the beginning of the data region.
    Data(u32),
}

impl BlockAddr {
    /// Translates the address into an absolute block index.
    pub fn to_absolute(self, sb: &Superblock) -> u32 {
        match self {
            Self::Absolute(blk) => blk,
            Self::Data(blk) => sb.first_data_block + blk,
        }
    }
}

/// Handle on the backing image, owned by the mounted context.
pub struct Device {
    /// The image file.
    file: File,
}

impl Device {
    /// Creates a device from the given image file.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Reads `buf.len()` bytes at the byte offset `off`.
    pub fn read_at(&mut self, off: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(off))
            .map_err(Error::DevSeek)?;
        self.file.read_exact(buf).map_err(Error::DevRead)
    }

    /// Writes `buf` at the byte offset `off`, then flushes the image handle.
    pub fn write_at(&mut self, off: u64, buf: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(off))
            .map_err(Error::DevSeek)?;
        self.file.write_all(buf).map_err(Error::DevWrite)?;
        self.flush()
    }

    /// Reads an object at the byte offset `off`.
    ///
    /// The object's type must tolerate any byte pattern.
    pub fn read_obj<T>(&mut self, off: u64) -> Result<T> {
        let mut obj: T = unsafe { std::mem::zeroed() };
        let buf = unsafe {
            slice::from_raw_parts_mut(&mut obj as *mut T as *mut u8, size_of::<T>())
        };
        self.read_at(off, buf)?;
        Ok(obj)
    }

    /// Writes the object `obj` at the byte offset `off`.
    pub fn write_obj<T>(&mut self, obj: &T, off: u64) -> Result<()> {
        self.write_at(off, crate::util::reinterpret(obj))
    }

    /// Flushes pending writes down to the host storage.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_data().map_err(Error::DevWrite)
    }

    /// Returns the size of the image in bytes.
    ///
    /// Block devices are queried through `ioctl`, regular files through their
    /// metadata.
    pub fn size(&self) -> Result<u64> {
        let metadata = self.file.metadata().map_err(Error::DevStat)?;
        let file_type = metadata.file_type();
        if file_type.is_block_device() || file_type.is_char_device() {
            let mut size = 0u64;
            let ret = unsafe { ioctl(self.file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
            if ret < 0 {
                return Err(Error::DevStat(std::io::Error::last_os_error()));
            }
            Ok(size)
        } else {
            Ok(metadata.len())
        }
    }

    /// Returns the natural block size for the image: the underlying
    /// filesystem's block size, restricted to powers of two not exceeding the
    /// host page size.
    pub fn block_size_hint(&self) -> Result<u32> {
        let metadata = self.file.metadata().map_err(Error::DevStat)?;
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
        let mut blk_size = metadata.blksize().clamp(512, page_size);
        if !blk_size.is_power_of_two() {
            blk_size = 1 << blk_size.ilog2();
        }
        Ok(blk_size as u32)
    }
}

/// Reads whole blocks starting at `addr` into `buf`.
///
/// `buf`'s length must be a non-zero multiple of the block size.
pub fn read_block(
    dev: &mut Device,
    sb: &Superblock,
    addr: BlockAddr,
    buf: &mut [u8],
) -> Result<()> {
    let blk_size = sb.block_size;
    let blk = check_range(sb, addr, buf.len())?;
    dev.read_at(blk as u64 * blk_size as u64, buf)
}

/// Writes whole blocks starting at `addr` from `buf`.
///
/// Writing to absolute block zero (the boot area) is refused.
pub fn write_block(dev: &mut Device, sb: &Superblock, addr: BlockAddr, buf: &[u8]) -> Result<()> {
    let blk_size = sb.block_size;
    let blk = check_range(sb, addr, buf.len())?;
    if blk == 0 {
        return Err(Error::InvArg);
    }
    dev.write_at(blk as u64 * blk_size as u64, buf)
}

/// Checks the block range against the device bounds, returning the absolute
/// index of the first block.
fn check_range(sb: &Superblock, addr: BlockAddr, len: usize) -> Result<u32> {
    let blk_size = sb.block_size as usize;
    if len == 0 || len % blk_size != 0 {
        return Err(Error::InvArg);
    }
    let blk = addr.to_absolute(sb);
    let count = (len / blk_size) as u32;
    let total = sb.total_blocks;
    if blk.checked_add(count).is_none_or(|end| end > total) {
        return Err(Error::InvArg);
    }
    Ok(blk)
}
