//! The `mkfs.sffs` tool creates an SFFS filesystem on a device or image file.

use crate::error;
use sffs::FormatOpts;
use sffs::Sffs;
use sffs::util::parse_size;
use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The length of the filesystem in bytes.
    fs_size: Option<u64>,
    /// The block size in bytes.
    block_size: Option<u32>,
    /// The number of bytes of image per inode.
    inode_ratio: Option<u32>,
    /// The path to the device file on which the filesystem will be created.
    device_path: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some(arg) if arg.starts_with("--fs-size=") => {
                let size = parse_size(&arg["--fs-size=".len()..]).unwrap_or_else(|| {
                    error("mkfs.sffs", format_args!("invalid size `{arg}`"));
                });
                res.fs_size = Some(size);
            }
            Some(arg) if arg.starts_with("--block-size=") => {
                let size = arg["--block-size=".len()..].parse().unwrap_or_else(|_| {
                    error("mkfs.sffs", format_args!("invalid block size `{arg}`"));
                });
                res.block_size = Some(size);
            }
            Some(arg) if arg.starts_with("--inode-ratio=") => {
                let ratio = arg["--inode-ratio=".len()..].parse().unwrap_or_else(|_| {
                    error("mkfs.sffs", format_args!("invalid inode ratio `{arg}`"));
                });
                res.inode_ratio = Some(ratio);
            }
            _ => {
                // TODO handle case when several devices are given
                res.device_path = Some(PathBuf::from(arg));
            }
        }
    }
    res
}

/// Prints the command's usage.
fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" mkfs.sffs [options] <device>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help:\t\tprints usage");
    eprintln!(" --fs-size=<int>[K|M|G]: the filesystem size (defaults to the device size)");
    eprintln!(" --block-size=<int>:\tthe block size in bytes");
    eprintln!(" --inode-ratio=<int>:\tthe number of bytes of image per inode");
    eprintln!(" device:\t\tthe device or image file to format");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_usage();
        return;
    }
    let _ = crate::logger::init(None);
    let device_path = args.device_path.unwrap_or_else(|| {
        error("mkfs.sffs", "specify path to a device");
    });
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&device_path)
        .unwrap_or_else(|e| {
            error("mkfs.sffs", format_args!("{}: {e}", device_path.display()));
        });
    // Grow regular image files to the requested size
    if let Some(fs_size) = args.fs_size {
        let is_file = file
            .metadata()
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if is_file && file.set_len(fs_size).is_err() {
            error(
                "mkfs.sffs",
                format_args!("{}: cannot resize image", device_path.display()),
            );
        }
    }
    let opts = FormatOpts {
        fs_size: args.fs_size,
        block_size: args.block_size,
        inode_ratio: args.inode_ratio,
        ..Default::default()
    };
    let root_handle = file.try_clone().unwrap_or_else(|e| {
        error("mkfs.sffs", format_args!("{}: {e}", device_path.display()));
    });
    Sffs::format(file, &opts).unwrap_or_else(|e| {
        error("mkfs.sffs", format_args!("failed to create filesystem: {e}"));
    });
    // Create the root directory through a short-lived mount
    let result = Sffs::mount(root_handle, &Default::default())
        .and_then(|mut fs| fs.create_root().map(|_| fs))
        .and_then(Sffs::unmount);
    result.unwrap_or_else(|e| {
        error(
            "mkfs.sffs",
            format_args!("failed to create the root directory: {e}"),
        );
    });
}
