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

//! The mounted filesystem context and the operations exposed to the kernel
//! bridge.
//!
//! A context owns the device handle and the authoritative in-memory
//! superblock. Operations are synchronous and run on the caller's thread; the
//! bridge must serialize calls into a context. The superblock is written back
//! on unmount and on `statfs`.

use crate::balloc;
use crate::device;
use crate::device::BlockAddr;
use crate::device::Device;
use crate::dir;
use crate::error::Error;
use crate::error::Result;
use crate::inode;
use crate::inode::FileType;
use crate::inode::InodeRecord;
use crate::inode::ROOT_INO;
use crate::list;
use crate::list::ResolveFlags;
use crate::superblock;
use crate::superblock::STATE_CLEAN;
use crate::superblock::Superblock;
use crate::util::alloc_buf;
use crate::util::get_timestamp;
use std::cmp::min;
use std::fs::File;

pub use crate::superblock::FormatOpts;

/// Options for mounting an image.
#[derive(Default)]
pub struct MountOpts {
    /// If true, the image is never written.
    pub read_only: bool,
}

/// The attributes of a file.
pub struct FileStat {
    /// The file's inode number.
    pub ino: u32,
    /// Type and permissions.
    pub mode: u16,
    /// The owner's user id.
    pub uid: u16,
    /// The owner's group id.
    pub gid: u16,
    /// The number of hard links.
    pub links_count: u16,
    /// The file's size in bytes.
    pub size: u64,
    /// The number of data blocks mapped to the file.
    pub blocks_count: u32,
    /// Timestamp of the last access.
    pub atime: u32,
    /// Timestamp of the last metadata change.
    pub ctime: u32,
    /// Timestamp of the last content modification.
    pub mtime: u32,
    /// Timestamp of the creation.
    pub crtime: u32,
}

/// A directory listing entry.
pub struct DirEntryInfo {
    /// The entry's name.
    pub name: String,
    /// The inode the entry points to.
    pub ino: u32,
    /// The file-type nibble of the pointed inode's mode.
    pub file_type: u16,
}

/// Usage statistics of a mounted filesystem.
pub struct StatFs {
    /// The size of a block in bytes.
    pub block_size: u32,
    /// Total number of blocks on the image.
    pub total_blocks: u32,
    /// Number of free data blocks.
    pub free_blocks: u32,
    /// Total number of inode slots.
    pub total_inodes: u32,
    /// Number of free inode slots.
    pub free_inodes: u32,
    /// Total number of block groups.
    pub total_groups: u32,
    /// Number of groups with no block in use.
    pub free_groups: u32,
}

/// A mounted SFFS image.
pub struct Sffs {
    /// The backing device.
    pub(crate) dev: Device,
    /// The authoritative copy of the superblock.
    pub(crate) sb: Superblock,
    /// Tells whether the image is mounted read-only.
    readonly: bool,
}

impl Sffs {
    /// Initializes a filesystem on the given image file.
    ///
    /// The layout is computed from the image size (or `opts.fs_size`) and the
    /// host's natural block size (or `opts.block_size`), the allocation
    /// bitmaps are zeroed and the superblock is written. The root directory is
    /// not created; see [`Sffs::create_root`].
    pub fn format(file: File, opts: &FormatOpts) -> Result<()> {
        let mut dev = Device::new(file);
        let fs_size = match opts.fs_size {
            Some(size) => size,
            None => dev.size()?,
        };
        let blk_size = match opts.block_size {
            Some(size) => size,
            None => dev.block_size_hint()?,
        };
        let mut sb = superblock::init(fs_size, blk_size, opts)?;
        // Zero the allocation bitmaps
        let buf = alloc_buf(blk_size as usize)?;
        let data_bitmap = sb.data_bitmap;
        let inode_bitmap = sb.inode_bitmap;
        for region in [data_bitmap, inode_bitmap] {
            for i in 0..region.size {
                device::write_block(&mut dev, &sb, BlockAddr::Absolute(region.start + i), &buf)?;
            }
        }
        sb.write(&mut dev)?;
        let total_blocks = sb.total_blocks;
        let total_inodes = sb.total_inodes;
        log::info!(
            "initialized image: {total_blocks} blocks of {blk_size} bytes, {total_inodes} inodes"
        );
        Ok(())
    }

    /// Mounts the filesystem held by the given image file.
    ///
    /// A bad signature or an inconsistent layout is fatal. Unless mounted
    /// read-only, the mount count and timestamp are refreshed on disk.
    pub fn mount(file: File, opts: &MountOpts) -> Result<Self> {
        let mut dev = Device::new(file);
        let mut sb = Superblock::read(&mut dev)?;
        sb.check_layout()?;
        if dev.size()? < sb.total_blocks as u64 * sb.block_size as u64 {
            return Err(Error::Fs);
        }
        let state = sb.state;
        if state != STATE_CLEAN {
            log::warn!("filesystem is not clean, consider running a check");
        }
        let mount_count = sb.mount_count;
        let max_mount_count = sb.max_mount_count;
        if max_mount_count != 0 && mount_count >= max_mount_count {
            log::warn!("filesystem was mounted {mount_count} times without a check");
        }
        sb.mount_count = mount_count.wrapping_add(1);
        sb.mount_time = get_timestamp().as_secs() as u16;
        if !opts.read_only {
            sb.write(&mut dev)?;
        }
        let total_blocks = sb.total_blocks;
        let free_blocks = sb.free_blocks;
        log::info!("mounted image: {total_blocks} blocks, {free_blocks} free");
        Ok(Self {
            dev,
            sb,
            readonly: opts.read_only,
        })
    }

    /// Unmounts the filesystem, flushing the superblock and the device.
    pub fn unmount(mut self) -> Result<()> {
        if !self.readonly {
            self.sb.write(&mut self.dev)?;
        }
        self.dev.flush()?;
        log::info!("unmounted image");
        Ok(())
    }

    /// Creates the root directory on a freshly initialized image.
    pub fn create_root(&mut self) -> Result<()> {
        self.check_writable()?;
        let inode_bitmap = self.sb.inode_bitmap;
        if crate::bitmap::check(&mut self.dev, &self.sb, &inode_bitmap, ROOT_INO)? {
            return Err(Error::EntExists);
        }
        let ino = inode::alloc(&mut self.dev, &self.sb)?;
        if ino != ROOT_INO {
            return Err(Error::Fs);
        }
        let mut rec = inode::create(&self.sb, ino, inode::TYPE_DIRECTORY | 0o755, 0)?;
        rec.node.links_count = 2;
        inode::write(&mut self.dev, &mut self.sb, &rec)?;
        dir::init(&mut self.dev, &mut self.sb, &mut rec, None)?;
        self.sb.write(&mut self.dev)
    }

    /// Returns the attributes of the file at `path`.
    pub fn getattr(&mut self, path: &str) -> Result<FileStat> {
        let rec = self.resolve(path)?;
        let node = &rec.node;
        Ok(FileStat {
            ino: node.ino,
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            links_count: node.links_count,
            size: node.size(&self.sb),
            blocks_count: node.blocks_count,
            atime: node.atime,
            ctime: node.ctime,
            mtime: node.mtime,
            crtime: node.crtime,
        })
    }

    /// Returns the inode number of the file at `path`.
    pub fn lookup(&mut self, path: &str) -> Result<u32> {
        Ok(self.resolve(path)?.node.ino)
    }

    /// Lists the entries of the directory at `path`, including `.` and `..`.
    pub fn readdir(&mut self, path: &str) -> Result<Vec<DirEntryInfo>> {
        let rec = self.resolve(path)?;
        if rec.node.file_type()? != FileType::Directory {
            return Err(Error::InvArg);
        }
        let entries = dir::entries(&mut self.dev, &self.sb, &rec)?;
        Ok(entries
            .into_iter()
            .map(|entry| DirEntryInfo {
                name: String::from_utf8_lossy(&entry.name).into_owned(),
                ino: entry.ino,
                file_type: entry.file_type,
            })
            .collect())
    }

    /// Creates a directory at `path` with the permissions of `mode`.
    ///
    /// Returns the new directory's inode number.
    pub fn mkdir(&mut self, path: &str, mode: u16) -> Result<u32> {
        self.create_entry(path, inode::TYPE_DIRECTORY | (mode & 0o7777))
    }

    /// Creates a regular file at `path` with the permissions of `mode`.
    ///
    /// Returns the new file's inode number.
    pub fn create(&mut self, path: &str, mode: u16) -> Result<u32> {
        self.create_entry(path, inode::TYPE_REGULAR | (mode & 0o7777))
    }

    /// Reads from the regular file at `path`, starting at the byte offset
    /// `off`. Returns the number of bytes read.
    pub fn read(&mut self, path: &str, off: u64, buf: &mut [u8]) -> Result<usize> {
        let mut rec = self.resolve(path)?;
        if rec.node.file_type()? != FileType::Regular {
            return Err(Error::InvArg);
        }
        let size = rec.node.size(&self.sb);
        if off >= size || buf.is_empty() {
            return Ok(0);
        }
        let blk_size = self.sb.block_size as u64;
        let len = min(buf.len() as u64, size - off) as usize;
        let mut i = 0;
        while i < len {
            let pos = off + i as u64;
            let n = (pos / blk_size) as u32;
            let inner = (pos % blk_size) as usize;
            let resolved = list::resolve(&mut self.dev, &self.sb, &rec, n, ResolveFlags::READ)?;
            let data = resolved.data.ok_or(Error::Fs)?;
            let chunk = min(len - i, blk_size as usize - inner);
            buf[i..i + chunk].copy_from_slice(&data[inner..inner + chunk]);
            i += chunk;
        }
        if !self.readonly {
            rec.node.atime = get_timestamp().as_secs() as u32;
            inode::write(&mut self.dev, &mut self.sb, &rec)?;
        }
        Ok(len)
    }

    /// Writes `data` to the regular file at `path`, starting at the byte
    /// offset `off`. The file is grown as needed; writing past its end is
    /// rejected. Returns the number of bytes written.
    pub fn write(&mut self, path: &str, off: u64, data: &[u8]) -> Result<usize> {
        self.check_writable()?;
        let mut rec = self.resolve(path)?;
        if rec.node.file_type()? != FileType::Regular {
            return Err(Error::InvArg);
        }
        let size = rec.node.size(&self.sb);
        if off > size {
            return Err(Error::InvArg);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let blk_size = self.sb.block_size as u64;
        let end = off + data.len() as u64;
        let needed = end.div_ceil(blk_size) as u32;
        let blocks_count = rec.node.blocks_count;
        if needed > blocks_count {
            let new_blocks =
                balloc::alloc(&mut self.dev, &mut self.sb, &mut rec, needed - blocks_count)?;
            // Fresh blocks are zeroed so any padding reads as zeros
            let zero = alloc_buf(blk_size as usize)?;
            for &blk in &new_blocks {
                device::write_block(&mut self.dev, &self.sb, BlockAddr::Data(blk), &zero)?;
            }
        }
        let mut i = 0;
        while i < data.len() {
            let pos = off + i as u64;
            let n = (pos / blk_size) as u32;
            let inner = (pos % blk_size) as usize;
            let chunk = min(data.len() - i, blk_size as usize - inner);
            // Read-modify-write only when the block is partially covered
            let flags = if chunk == blk_size as usize {
                ResolveFlags::empty()
            } else {
                ResolveFlags::READ
            };
            let resolved = list::resolve(&mut self.dev, &self.sb, &rec, n, flags)?;
            let mut buf = match resolved.data {
                Some(buf) => buf,
                None => alloc_buf(blk_size as usize)?,
            };
            buf[inner..inner + chunk].copy_from_slice(&data[i..i + chunk]);
            device::write_block(
                &mut self.dev,
                &self.sb,
                BlockAddr::Data(resolved.block_id),
                &buf,
            )?;
            i += chunk;
        }
        // Refresh the tail residual from the new content end
        let new_size = size.max(end);
        let mapped = rec.node.blocks_count as u64 * blk_size;
        let slack = mapped - new_size;
        rec.node.bytes_rem = if slack >= blk_size {
            0
        } else {
            (blk_size - slack) as u32
        };
        let now = get_timestamp().as_secs() as u32;
        rec.node.mtime = now;
        rec.node.ctime = now;
        inode::write(&mut self.dev, &mut self.sb, &rec)?;
        Ok(data.len())
    }

    /// Returns usage statistics and flushes the superblock.
    pub fn statfs(&mut self) -> Result<StatFs> {
        if !self.readonly {
            self.sb.write(&mut self.dev)?;
        }
        Ok(StatFs {
            block_size: self.sb.block_size,
            total_blocks: self.sb.total_blocks,
            free_blocks: self.sb.free_blocks,
            total_inodes: self.sb.total_inodes,
            free_inodes: self.sb.free_inodes,
            total_groups: self.sb.total_groups,
            free_groups: self.sb.free_groups,
        })
    }

    /// Fails with [`Error::InvArg`] when the image is mounted read-only.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(Error::InvArg);
        }
        Ok(())
    }

    /// Resolves `path` to its inode record, walking the components from the
    /// root directory.
    fn resolve(&mut self, path: &str) -> Result<InodeRecord> {
        if !path.starts_with('/') {
            return Err(Error::InvArg);
        }
        let mut rec = inode::read(&mut self.dev, &self.sb, ROOT_INO)?;
        for comp in path.split('/').filter(|comp| !comp.is_empty()) {
            if rec.node.file_type()? != FileType::Directory {
                return Err(Error::InvArg);
            }
            let Some((entry, _)) = dir::lookup(&mut self.dev, &self.sb, &rec, comp.as_bytes())?
            else {
                return Err(Error::NoEnt);
            };
            rec = inode::read(&mut self.dev, &self.sb, entry.ino)?;
        }
        Ok(rec)
    }

    /// Splits `path` into its parent path and its last component.
    fn split_parent(path: &str) -> Result<(&str, &str)> {
        if !path.starts_with('/') {
            return Err(Error::InvArg);
        }
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::InvArg);
        }
        // The path starts with a slash, so the split cannot fail
        let (parent, name) = trimmed.rsplit_once('/').ok_or(Error::InvArg)?;
        let parent = if parent.is_empty() { "/" } else { parent };
        Ok((parent, name))
    }

    /// Creates an inode of the given full mode at `path` and links it into its
    /// parent directory. Directories also get their first block, holding `.`
    /// and `..`.
    fn create_entry(&mut self, path: &str, mode: u16) -> Result<u32> {
        self.check_writable()?;
        let (parent_path, name) = Self::split_parent(path)?;
        dir::entry_len(name.as_bytes())?;
        let mut parent = self.resolve(parent_path)?;
        if parent.node.file_type()? != FileType::Directory {
            return Err(Error::InvArg);
        }
        if dir::lookup(&mut self.dev, &self.sb, &parent, name.as_bytes())?.is_some() {
            return Err(Error::EntExists);
        }
        let file_type = FileType::from_mode(mode).ok_or(Error::InvArg)?;
        let ino = inode::alloc(&mut self.dev, &self.sb)?;
        let mut rec = inode::create(&self.sb, ino, mode, 0)?;
        if file_type == FileType::Directory {
            rec.node.links_count = 2;
        }
        inode::write(&mut self.dev, &mut self.sb, &rec)?;
        if file_type == FileType::Directory {
            dir::init(&mut self.dev, &mut self.sb, &mut rec, Some(parent.node.ino))?;
        }
        dir::insert(
            &mut self.dev,
            &mut self.sb,
            &mut parent,
            name.as_bytes(),
            ino,
            (mode >> 12) & 0xf,
        )?;
        let now = get_timestamp().as_secs() as u32;
        parent.node.mtime = now;
        parent.node.ctime = now;
        if file_type == FileType::Directory {
            // The child's `..` links back to the parent
            parent.node.links_count += 1;
        }
        inode::write(&mut self.dev, &mut self.sb, &parent)?;
        Ok(ino)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::superblock::SFFS_MAGIC;

    fn opts_4k() -> FormatOpts {
        FormatOpts {
            block_size: Some(4096),
            ..Default::default()
        }
    }

    fn scratch(size: u64, opts: &FormatOpts) -> (tempfile::NamedTempFile, Sffs) {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(size).unwrap();
        Sffs::format(file.reopen().unwrap(), opts).unwrap();
        let mut fs = Sffs::mount(file.reopen().unwrap(), &Default::default()).unwrap();
        fs.create_root().unwrap();
        (file, fs)
    }

    #[test]
    fn format_writes_magic_and_clean_bitmaps() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(52428800).unwrap();
        Sffs::format(file.reopen().unwrap(), &opts_4k()).unwrap();
        let mut dev = Device::new(file.reopen().unwrap());
        let sb = Superblock::read(&mut dev).unwrap();
        let magic = sb.magic;
        assert_eq!(magic, SFFS_MAGIC);
        sb.check_layout().unwrap();
        // Both bitmaps are entirely zero
        let data_bitmap = sb.data_bitmap;
        let inode_bitmap = sb.inode_bitmap;
        for region in [data_bitmap, inode_bitmap] {
            let mut buf = vec![0u8; sb.block_size as usize];
            for i in 0..region.size {
                device::read_block(&mut dev, &sb, BlockAddr::Absolute(region.start + i), &mut buf)
                    .unwrap();
                assert!(buf.iter().all(|byte| *byte == 0));
            }
        }
    }

    #[test]
    fn mount_rejects_a_bad_magic() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(8 << 20).unwrap();
        Sffs::format(file.reopen().unwrap(), &opts_4k()).unwrap();
        let mut dev = Device::new(file.reopen().unwrap());
        let mut sb = Superblock::read(&mut dev).unwrap();
        sb.magic = 0xdeadbeef;
        sb.write(&mut dev).unwrap();
        assert!(matches!(
            Sffs::mount(file.reopen().unwrap(), &Default::default()),
            Err(Error::Fs)
        ));
    }

    #[test]
    fn root_listing() {
        let (_file, mut fs) = scratch(8 << 20, &opts_4k());
        let entries = fs.readdir("/").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[0].ino, 0);
        assert_eq!(entries[1].name, "..");
        assert_eq!(entries[1].ino, 0);
        let stat = fs.getattr("/").unwrap();
        assert_eq!(stat.ino, 0);
        assert_eq!(stat.mode, inode::TYPE_DIRECTORY | 0o755);
        assert_eq!(stat.links_count, 2);
    }

    #[test]
    fn mkdir_and_walk() {
        let (_file, mut fs) = scratch(8 << 20, &opts_4k());
        let a = fs.mkdir("/a", 0o755).unwrap();
        let b = fs.mkdir("/a/b", 0o700).unwrap();
        assert_eq!(fs.lookup("/a").unwrap(), a);
        assert_eq!(fs.lookup("/a/b").unwrap(), b);
        let names: Vec<_> = fs
            .readdir("/a")
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, [".", "..", "b"]);
        // `..` of `/a` points back to the root
        let entries = fs.readdir("/a").unwrap();
        assert_eq!(entries[1].ino, 0);
        let stat = fs.getattr("/a/b").unwrap();
        assert_eq!(stat.mode, inode::TYPE_DIRECTORY | 0o700);
        // The parent gained a link from the child's `..`
        let stat = fs.getattr("/a").unwrap();
        assert_eq!(stat.links_count, 3);
        assert!(matches!(fs.mkdir("/a/b", 0o755), Err(Error::EntExists)));
        assert!(matches!(fs.mkdir("/c/d", 0o755), Err(Error::NoEnt)));
        assert!(matches!(fs.lookup("/missing"), Err(Error::NoEnt)));
    }

    #[test]
    fn write_and_read_back() {
        let (_file, mut fs) = scratch(8 << 20, &opts_4k());
        fs.create("/data", 0o644).unwrap();
        let stat = fs.getattr("/data").unwrap();
        assert_eq!(stat.mode, inode::TYPE_REGULAR | 0o644);
        assert_eq!(stat.size, 0);
        // Spanning three blocks
        let data: Vec<u8> = (0..10000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(fs.write("/data", 0, &data).unwrap(), data.len());
        let stat = fs.getattr("/data").unwrap();
        assert_eq!(stat.size, 10000);
        assert_eq!(stat.blocks_count, 3);
        let mut buf = vec![0u8; data.len()];
        assert_eq!(fs.read("/data", 0, &mut buf).unwrap(), data.len());
        assert_eq!(buf, data);
        // Appending at the end, overlapping the tail block
        assert_eq!(fs.write("/data", 10000, &data).unwrap(), data.len());
        let stat = fs.getattr("/data").unwrap();
        assert_eq!(stat.size, 20000);
        let mut buf = vec![0u8; 300];
        assert_eq!(fs.read("/data", 9900, &mut buf).unwrap(), 300);
        assert_eq!(&buf[..100], &data[9900..]);
        assert_eq!(&buf[100..], &data[..200]);
        // Reads past the end are empty, writes past the end are rejected
        assert_eq!(fs.read("/data", 20000, &mut buf).unwrap(), 0);
        assert!(matches!(fs.write("/data", 20001, b"x"), Err(Error::InvArg)));
        // Overwriting in the middle does not change the size
        assert_eq!(fs.write("/data", 4000, b"hello").unwrap(), 5);
        let stat = fs.getattr("/data").unwrap();
        assert_eq!(stat.size, 20000);
        let mut buf = vec![0u8; 5];
        fs.read("/data", 4000, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn state_survives_a_remount() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(8 << 20).unwrap();
        Sffs::format(file.reopen().unwrap(), &opts_4k()).unwrap();
        let mut fs = Sffs::mount(file.reopen().unwrap(), &Default::default()).unwrap();
        fs.create_root().unwrap();
        fs.mkdir("/persistent", 0o755).unwrap();
        fs.create("/persistent/file", 0o644).unwrap();
        fs.write("/persistent/file", 0, b"still here").unwrap();
        let free_blocks = fs.statfs().unwrap().free_blocks;
        fs.unmount().unwrap();

        let mut fs = Sffs::mount(file.reopen().unwrap(), &Default::default()).unwrap();
        let mut buf = vec![0u8; 10];
        assert_eq!(fs.read("/persistent/file", 0, &mut buf).unwrap(), 10);
        assert_eq!(&buf, b"still here");
        assert_eq!(fs.statfs().unwrap().free_blocks, free_blocks);
        let mount_count = fs.sb.mount_count;
        assert_eq!(mount_count, 2);
    }

    #[test]
    fn statfs_tracks_allocations() {
        let (_file, mut fs) = scratch(8 << 20, &opts_4k());
        let before = fs.statfs().unwrap();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, &vec![0u8; 8192]).unwrap();
        let after = fs.statfs().unwrap();
        assert_eq!(after.free_blocks, before.free_blocks - 2);
        assert_eq!(after.free_inodes, before.free_inodes - 1);
    }

    #[test]
    fn read_only_mount_rejects_mutations() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(8 << 20).unwrap();
        Sffs::format(file.reopen().unwrap(), &opts_4k()).unwrap();
        let mut fs = Sffs::mount(file.reopen().unwrap(), &Default::default()).unwrap();
        fs.create_root().unwrap();
        fs.unmount().unwrap();
        let mut fs = Sffs::mount(
            file.reopen().unwrap(),
            &MountOpts { read_only: true },
        )
        .unwrap();
        assert!(matches!(fs.mkdir("/a", 0o755), Err(Error::InvArg)));
        assert!(fs.readdir("/").is_ok());
        fs.unmount().unwrap();
    }
}
