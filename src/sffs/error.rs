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

//! Errors returned by the filesystem core.

use std::io;
use std::result;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = result::Result<T, Error>;

/// An error raised by a core operation.
///
/// Device errors carry the underlying host error. `Fs` means an on-disk
/// invariant was found violated mid-operation; by convention the caller should
/// remount the image read-only when receiving it.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller violated a precondition.
    #[error("invalid argument")]
    InvArg,
    /// The image block size is unsupported.
    #[error("unsupported block size")]
    InvBlk,
    /// The layout self-consistency check failed.
    #[error("inconsistent filesystem layout")]
    Init,
    /// A transient memory allocation failed.
    #[error("out of memory")]
    MemAlloc,
    /// An on-disk invariant is violated.
    #[error("filesystem is corrupted")]
    Fs,
    /// No inode or data block is available.
    #[error("no space left on device")]
    NoSpc,
    /// The host failed to read from the image.
    #[error("device read failed: {0}")]
    DevRead(#[source] io::Error),
    /// The host failed to write to the image.
    #[error("device write failed: {0}")]
    DevWrite(#[source] io::Error),
    /// The host failed to seek on the image.
    #[error("device seek failed: {0}")]
    DevSeek(#[source] io::Error),
    /// The host failed to stat the image.
    #[error("device stat failed: {0}")]
    DevStat(#[source] io::Error),
    /// A lookup found no such entry.
    #[error("no such entry")]
    NoEnt,
    /// A directory entry with the same name already exists.
    #[error("entry already exists")]
    EntExists,
}

impl Error {
    /// Returns the stable code stored in the superblock's last-error field.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvArg => 1,
            Self::InvBlk => 2,
            Self::Init => 3,
            Self::MemAlloc => 4,
            Self::Fs => 5,
            Self::NoSpc => 6,
            Self::DevRead(_) => 7,
            Self::DevWrite(_) => 8,
            Self::DevSeek(_) => 9,
            Self::DevStat(_) => 10,
            Self::NoEnt => 11,
            Self::EntExists => 12,
        }
    }
}
