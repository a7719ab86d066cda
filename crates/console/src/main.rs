//! avrmon console.
//!
//! Drives a simulated ATmega through the same core the on-device monitor
//! uses: capture and edit registers, dump and poke memory, and jump or call
//! into program memory with the edited register file.
//!
//! Logs go to stderr (`RUST_LOG`, default `warn`); the console owns stdout.

mod command;
mod config;
mod dump;
mod lines;
mod session;

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use avrmon_core::input::MonotonicClock;
use avrmon_core::sim::Machine;
use avrmon_core::Chip;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides};
use crate::lines::StdinLines;
use crate::session::Session;

#[derive(Debug, Parser)]
#[command(name = "avrmon", version, about = "Register and memory inspector for 8-bit AVR parts")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "AVRMON_CONFIG")]
    config: Option<PathBuf>,

    /// Target part (atmega328p, atmega32u4)
    #[arg(long)]
    chip: Option<Chip>,

    /// Bound on every wait for input, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Instructions a jump or call may run before it is reported as runaway
    #[arg(long)]
    step_limit: Option<u64>,

    /// Intel HEX image to load into program memory
    #[arg(long)]
    hex: Option<PathBuf>,
}

fn setup_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let overrides = Overrides {
        chip: cli.chip,
        timeout_ms: cli.timeout_ms,
        step_limit: cli.step_limit,
        hex: cli.hex,
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;
    let map = config.memory_map()?;

    let mut machine = Machine::with_memory_map(config.chip, map).with_step_limit(config.step_limit);
    if let Some(path) = &config.hex {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let image = machine.load_hex(&text).with_context(|| format!("loading {}", path.display()))?;
        println!("loaded {} bytes from {} (end 0x{:04X})", image.bytes, path.display(), image.end);
    }
    info!(chip = %config.chip, timeout_ms = config.timeout_ms, "console ready");
    println!("avrmon on a simulated {}; `help` lists commands", config.chip);

    let input = StdinLines::spawn().context("starting the stdin reader")?;
    let mut session =
        Session::new(machine, input, MonotonicClock::new(), io::stdout().lock(), config.chip, map, config.timeout());
    session.run()
}
