//! edgehop binary entry point.
//!
//! One binary, two modes:
//!
//! - `edgehop CONFIGFILE` runs the master control plane;
//! - no argument with a non-TTY stdin runs subordinate mode — that is how
//!   the master's shell transport starts us on the far end.
//!
//! Exit status: 0 on clean quit, 1 on startup or fatal errors.

// Rust guideline compliant 2026-03

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;

use edgehop::config::Config;
use edgehop::{hub, platform, serve};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Share keyboard, mouse and clipboard with other machines over SSH.
#[derive(Debug, Parser)]
#[command(name = "edgehop", version, about)]
struct Cli {
    /// Configuration file (master mode). Omit to run in subordinate mode
    /// when started by a master over a non-TTY transport.
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.config {
        Some(path) => run_master(&path),
        None => {
            if atty::is(atty::Stream::Stdin) || atty::is(atty::Stream::Stdout) {
                eprintln!("edgehop: no config file given and not started over a transport");
                eprintln!("usage: edgehop CONFIGFILE");
                return ExitCode::FAILURE;
            }
            run_subordinate()
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // stderr works in both modes: env_logger writes there anyway,
            // and in subordinate mode the transport relays it to the master.
            eprintln!("edgehop: fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Master mode: gate and resolve the config, then drive the hub.
fn run_master(path: &Path) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let topology = Config::load(path)?.resolve()?;
    let platform = platform::create(&topology.driver)?;

    // Single-threaded runtime: all hub state lives in one task, and the
    // link reader/writer tasks are pure pipe pumps.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let hub = hub::Hub::new(topology, platform)?;
        hub::run(hub).await
    })
}

/// Subordinate mode: replay frames from stdin on the local display.
fn run_subordinate() -> Result<()> {
    let log_rx = serve::WireLogger::install()?;
    let platform = platform::create("none")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve::run(platform, log_rx))
}
