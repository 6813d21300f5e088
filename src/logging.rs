//! Logger bootstrap for the demo binary.
//!
//! The library crate never calls this: it only emits `log` calls and lets
//! whatever embeds it choose a logger. Only `src/bin/metronome.rs` calls
//! [`init_logger`].

use simplelog::*;
use std::fs::OpenOptions;
use std::io::Error;
use std::path::Path;

pub fn init_logger() -> Result<(), Error> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new("phasorsync.log"))?;

    CombinedLogger::init(vec![WriteLogger::new(
        LevelFilter::Debug,
        Config::default(),
        log_file,
    )])
    .map_err(|e| Error::other(e.to_string()))
}
