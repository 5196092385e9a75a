//! A minimal logger writing timestamped lines to a file or to stderr.

use log::Level;
use log::LevelFilter;
use log::Log;
use log::Metadata;
use log::Record;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

struct Logger {
    /// The log file. If `None`, lines go to stderr.
    out: Option<Mutex<File>>,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = sffs::util::get_timestamp().as_secs();
        let line = format!("[{now}] {}: {}\n", record.level(), record.args());
        match &self.out {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(line.as_bytes());
                }
            }
            None => {
                let _ = io::stderr().write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

/// Installs the logger. Lines are appended to the file at `path` if given,
/// written to stderr otherwise.
pub fn init(path: Option<&Path>) -> io::Result<()> {
    let out = match path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Mutex::new(file))
        }
        None => None,
    };
    log::set_boxed_logger(Box::new(Logger { out })).map_err(io::Error::other)?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}
