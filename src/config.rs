//! Demo-binary configuration.
//!
//! A `clap`-derived [`Args`] struct carries command-line defaults; these
//! are layered under file/environment overrides via the `config` crate to
//! produce the [`EngineConfig`] actually handed to the sender/receiver
//! constructors. Neither type is part of the hard core's public contract.

use clap::{Parser, ValueEnum};
use config::{Config as Layered, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Master,
    Slave,
}

#[derive(Debug, Parser)]
#[command(name = "metronome", about = "MIDI Clock sync engine demo")]
pub struct Args {
    /// Whether this instance drives the clock (`master`) or follows an
    /// upstream clock (`slave`).
    #[arg(short, long, value_enum, default_value_t = Mode::Master)]
    pub mode: Mode,

    /// Tempo in BPM, only meaningful in `master` mode.
    #[arg(short, long, default_value_t = 120.0)]
    pub bpm: f64,

    /// MIDI device name to bind to. If omitted and more than one device is
    /// available, an interactive picker is shown.
    #[arg(short, long)]
    pub device: Option<String>,

    /// Scheduler lookahead, in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub lookahead_ms: u64,

    /// Apply-time safety margin, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub safety_margin_ms: u64,

    /// Keep sending `Clock` while the transport is stopped.
    #[arg(long, default_value_t = false)]
    pub send_clock_while_stopped: bool,

    /// Path to an optional layered config file (TOML/YAML/JSON, by
    /// extension), applied over these defaults and under `PHASORSYNC_*`
    /// environment overrides.
    #[arg(long)]
    pub config_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    pub bpm: f64,
    pub lookahead_ms: u64,
    pub safety_margin_ms: u64,
    pub send_clock_while_stopped: bool,
}

impl EngineConfig {
    /// Builds a layered config: CLI-supplied defaults, overridden by an
    /// optional config file, overridden by `PHASORSYNC_*` environment
    /// variables.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut builder = Layered::builder()
            .set_default("bpm", args.bpm)?
            .set_default("lookahead_ms", args.lookahead_ms)?
            .set_default("safety_margin_ms", args.safety_margin_ms)?
            .set_default("send_clock_while_stopped", args.send_clock_while_stopped)?;

        if let Some(path) = &args.config_file {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("PHASORSYNC"));

        builder.build()?.try_deserialize()
    }
}
