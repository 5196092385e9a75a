//! Main of the SFFS command-line tools.

mod logger;
mod mkfs;
mod mount;

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::process::exit;

/// Writes an error to stderr, then exits.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

fn main() {
    let mut args = env::args_os();
    let bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            error("sffs", "missing binary name");
        });
    match bin.as_str() {
        "mkfs.sffs" | "mkfs" => mkfs::main(args),
        "mount.sffs" | "mount" => mount::main(args),
        // Allow invoking as `sffs <tool>` when the symlinks are not installed
        "sffs" => {
            let Some(tool) = args.next().and_then(|s| s.into_string().ok()) else {
                error("sffs", "missing tool name (expected `mkfs` or `mount`)");
            };
            match tool.as_str() {
                "mkfs" => mkfs::main(args),
                "mount" => mount::main(args),
                _ => error("sffs", "invalid tool name"),
            }
        }
        _ => error("sffs", "invalid binary name"),
    }
}
