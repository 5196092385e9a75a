//! The `mount.sffs` tool opens an SFFS image, checks it and reports its
//! parameters.
//!
//! The kernel bridge is a separate program; this tool only exercises the core
//! the way the bridge would: mount, statfs, a walk of the root directory,
//! unmount.

use crate::error;
use sffs::MountOpts;
use sffs::Sffs;
use sffs::util::ByteSize;
use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The path to the image file.
    fs_image: Option<PathBuf>,
    /// The path to the log file, if any.
    log_file: Option<PathBuf>,
    /// If true, never write to the image.
    read_only: bool,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-r" | "--read-only") => res.read_only = true,
            Some(arg) if arg.starts_with("--fs-image=") => {
                res.fs_image = Some(PathBuf::from(&arg["--fs-image=".len()..]));
            }
            Some(arg) if arg.starts_with("--log-file=") => {
                res.log_file = Some(PathBuf::from(&arg["--log-file=".len()..]));
            }
            _ => {
                res.fs_image = Some(PathBuf::from(arg));
            }
        }
    }
    res
}

/// Prints the command's usage.
fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" mount.sffs [options] --fs-image=<path>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help:\t\tprints usage");
    eprintln!(" -r, --read-only:\tnever write to the image");
    eprintln!(" --fs-image=<path>:\tthe image file to mount");
    eprintln!(" --log-file=<path>:\tappend logs to the given file");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_usage();
        return;
    }
    if let Err(e) = crate::logger::init(args.log_file.as_deref()) {
        error("mount.sffs", format_args!("cannot open log file: {e}"));
    }
    let image_path = args.fs_image.unwrap_or_else(|| {
        error("mount.sffs", "specify path to an image (--fs-image=<path>)");
    });
    let file = OpenOptions::new()
        .read(true)
        .write(!args.read_only)
        .open(&image_path)
        .unwrap_or_else(|e| {
            error("mount.sffs", format_args!("{}: {e}", image_path.display()));
        });
    let mut fs = Sffs::mount(
        file,
        &MountOpts {
            read_only: args.read_only,
        },
    )
    .unwrap_or_else(|e| {
        error("mount.sffs", format_args!("{}: {e}", image_path.display()));
    });
    let stats = fs.statfs().unwrap_or_else(|e| {
        error("mount.sffs", format_args!("statfs failed: {e}"));
    });
    println!("{}:", image_path.display());
    println!(
        " size:\t\t{}",
        ByteSize(stats.total_blocks as u64 * stats.block_size as u64)
    );
    println!(" block size:\t{}", stats.block_size);
    println!(
        " blocks:\t{} ({} free)",
        stats.total_blocks, stats.free_blocks
    );
    println!(
        " inodes:\t{} ({} free)",
        stats.total_inodes, stats.free_inodes
    );
    println!(
        " groups:\t{} ({} free)",
        stats.total_groups, stats.free_groups
    );
    let root = fs.readdir("/").unwrap_or_else(|e| {
        error("mount.sffs", format_args!("cannot read `/`: {e}"));
    });
    println!(" root entries:\t{}", root.len());
    fs.unmount().unwrap_or_else(|e| {
        error("mount.sffs", format_args!("unmount failed: {e}"));
    });
}
