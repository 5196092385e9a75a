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

//! This module implements utility functions.

use crate::error::Error;
use crate::error::Result;
use std::fmt;
use std::mem::size_of;
use std::slice;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current timestamp since the Unix epoch.
pub fn get_timestamp() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Performs the euclidean division of `n0` by `n1`, rounding up.
pub fn ceil_division(n0: u64, n1: u64) -> u64 {
    n0.div_ceil(n1)
}

/// Allocates a zeroed buffer of `len` bytes, reporting allocation failure
/// instead of aborting.
pub fn alloc_buf(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::MemAlloc)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Reinterprets the given object as a byte slice.
pub fn reinterpret<T>(obj: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(obj as *const T as *const u8, size_of::<T>()) }
}

/// Parses a size argument in the form `<int>[K|M|G]`.
///
/// The function returns `None` if the argument is malformed.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (num, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let num: u64 = num.parse().ok()?;
    let mult: u64 = match unit {
        "" => 1,
        "K" | "k" => 1024,
        "M" | "m" => 1024 * 1024,
        "G" | "g" => 1024 * 1024 * 1024,
        _ => return None,
    };
    num.checked_mul(mult)
}

/// Structure representing a number of bytes.
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut order = if self.0 == 0 { 0 } else { self.0.ilog2() / 10 };
        let suffix = match order {
            0 => "bytes",
            1 => "KiB",
            2 => "MiB",
            3 => "GiB",
            4 => "TiB",
            _ => {
                order = 0;
                "bytes"
            }
        };
        let unit = 1024u64.pow(order);
        write!(fmt, "{} {}", self.0 / unit, suffix)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_sizes() {
        assert_eq!(parse_size("0"), Some(0));
        assert_eq!(parse_size("1024"), Some(1024));
        assert_eq!(parse_size("4K"), Some(4096));
        assert_eq!(parse_size("50M"), Some(50 * 1024 * 1024));
        assert_eq!(parse_size("2G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("12T"), None);
        assert_eq!(parse_size("M"), None);
    }

    #[test]
    fn bytesize() {
        assert_eq!(format!("{}", ByteSize(0)).as_str(), "0 bytes");
        assert_eq!(format!("{}", ByteSize(1023)).as_str(), "1023 bytes");
        assert_eq!(format!("{}", ByteSize(1024)).as_str(), "1 KiB");
        assert_eq!(format!("{}", ByteSize(1024 * 1024)).as_str(), "1 MiB");
        assert_eq!(format!("{}", ByteSize(50 * 1024 * 1024)).as_str(), "50 MiB");
    }
}
