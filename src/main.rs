//! austere-term
//!
//! A bare byte relay between a serial device and the terminal. Keystrokes go
//! to the device one byte at a time; whatever the device sends comes back to
//! stdout the same way. No line discipline, baud rate or terminal mode is
//! touched: configure the line with `stty` first if it needs it.
//!
//! # Usage
//!
//! ```bash
//! # Relay with /dev/ttyUSB0
//! austere-term
//!
//! # Another device, sleeping instead of poll(2) between idle iterations
//! austere-term /dev/ttyACM0 --idle sleep --idle-interval-ms 20
//!
//! # Settings from a file, exit status 0 on every loop stop
//! austere-term --config relay.toml --compatible-exit
//! ```
//!
//! # Exit status
//!
//! - `0`: stop signal, end of stream, or any loop stop with `--compatible-exit`
//! - `1`: read, write or wait failure while relaying
//! - `255`: startup failure (config, open, non-blocking setup)

#[cfg(not(unix))]
compile_error!("austere-term needs a Unix platform (fcntl/poll)");

mod config;
mod error;
mod relay;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use config::{IdleStrategy, Overrides, RelayConfig};
use error::{StopReason, EXIT_STARTUP_FAILURE};

/// Relay bytes between a serial device and this terminal
#[derive(Parser, Debug)]
#[command(name = "austere-term")]
#[command(author = "Prasanna Gautam")]
#[command(version)]
#[command(about = "Minimal byte relay between a serial device and the terminal")]
struct Cli {
    /// Serial device path (default: /dev/ttyUSB0)
    device: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What to do between iterations that move no bytes
    #[arg(long, value_enum)]
    idle: Option<IdleStrategy>,

    /// Upper bound for one idle wait, in milliseconds
    #[arg(long)]
    idle_interval_ms: Option<u64>,

    /// Exit 0 even when the relay stops on an I/O error
    #[arg(long)]
    compatible_exit: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            device: self.device.clone(),
            idle: self.idle,
            idle_interval_ms: self.idle_interval_ms,
            compatible_exit: self.compatible_exit,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
            EXIT_STARTUP_FAILURE
        }
    };

    std::process::exit(code);
}

/// Load configuration and run one relay session; returns the exit status.
///
/// Everything that fails before the loop starts is an `Err`.
fn run(cli: &Cli) -> Result<i32> {
    let config = RelayConfig::load(cli.config.as_deref())?.with_overrides(cli.overrides());
    log::debug!("configuration: {:?}", config);

    let reason = relay::run_session(&config)?;
    report_stop(&reason);

    Ok(reason.exit_code(config.exit_policy))
}

fn report_stop(reason: &StopReason) {
    match reason {
        StopReason::Interrupted => {}
        StopReason::ZeroWrite { .. } => {
            eprintln!("{} {}", "[STOP]".yellow().bold(), reason);
        }
        _ => {
            eprintln!("{} {}", "[ERROR]".red().bold(), reason);
        }
    }
}
