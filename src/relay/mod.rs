//! Serial device <-> terminal relay
//!
//! This module provides:
//! - Opening the device and preparing non-blocking descriptors
//! - The single-byte relay loop
//! - Idle back-off strategies and stop-signal handling

pub mod idle;
pub mod port;
pub mod pump;
pub mod signal;

pub use pump::Relay;

use log::{debug, info};
use std::os::fd::AsFd;

use crate::config::RelayConfig;
use crate::error::{RelayError, StopReason};
use port::{BlockingWriter, NonBlocking};

/// Open everything the relay needs, run it to completion and clean up.
///
/// Startup failures come back as `Err`; once the loop has run, its stop reason
/// is returned whatever it was.
pub fn run_session(config: &RelayConfig) -> Result<StopReason, RelayError> {
    let device = port::open_device(&config.device)?;
    let _device_nb = NonBlocking::enable(device.as_fd(), "device")?;

    let stdin = port::duplicate_stdin()?;
    let _stdin_nb = NonBlocking::enable(stdin.as_fd(), "stdin")?;
    let stdout = port::duplicate_stdout()?;

    let stop = signal::install()?;

    info!(
        "relaying {} <-> terminal (idle: {:?}, {} ms)",
        config.device.display(),
        config.idle,
        config.idle_interval_ms
    );

    let mut waiter = idle::for_strategy(
        config.idle,
        config.idle_interval(),
        stdin.as_fd(),
        device.as_fd(),
    );

    // On a terminal stdout shares stdin's description, so it is non-blocking too.
    let mut relay = Relay::new(&stdin, &device, BlockingWriter::new(&stdout));
    let reason = relay.run(waiter.as_mut(), stop);
    let stats = relay.stats();

    info!(
        "relay stopped: {} ({} bytes to device, {} bytes to stdout)",
        reason, stats.to_device, stats.to_stdout
    );
    debug!("releasing {}", config.device.display());

    Ok(reason)
}
