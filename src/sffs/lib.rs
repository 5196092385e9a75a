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

//! SFFS stores a POSIX-style hierarchy of files and directories inside a single
//! backing image file.
//!
//! The image is divided into the following regions, in order:
//! - Boot area and superblock: the first 1024 bytes are never written, the
//!   superblock sits right after them
//! - Data bitmap: one bit per data block
//! - Inode bitmap: one bit per inode table slot
//! - Inode table: fixed-size inode entries, one slot per possible inode number
//! - Data: the blocks carrying file and directory contents
//!
//! A file is backed by a singly linked list of inode entries. The head of the
//! list (the primary) carries the whole file metadata and the first data block
//! pointers; supplementary entries only carry more pointers. Growing a file may
//! thus allocate both data blocks and inode slots.

pub mod balloc;
pub mod bitmap;
pub mod device;
pub mod dir;
pub mod error;
pub mod fs;
pub mod inode;
pub mod list;
pub mod superblock;
pub mod util;

pub use error::Error;
pub use error::Result;
pub use fs::FormatOpts;
pub use fs::MountOpts;
pub use fs::Sffs;
