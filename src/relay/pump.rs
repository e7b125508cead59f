//! The relay loop
//!
//! Each iteration moves at most one byte from stdin to the device, then at most
//! one byte from the device to stdout. Reads never block; "would block" just
//! means nothing moved this time. The loop ends on the first read error, write
//! error, zero-byte write, wait failure or stop request.

use log::debug;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Endpoint, StopReason};
use crate::relay::idle::{IdleWait, Watch};

/// Bytes relayed in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub to_device: u64,
    pub to_stdout: u64,
}

/// Single-byte relay between stdin, a device and stdout
pub struct Relay<I, D, O> {
    stdin: I,
    device: D,
    stdout: O,
    watch: Watch,
    stats: RelayStats,
}

impl<I, D, O> Relay<I, D, O>
where
    I: Read,
    D: Read + Write,
    O: Write,
{
    pub fn new(stdin: I, device: D, stdout: O) -> Self {
        Self {
            stdin,
            device,
            stdout,
            watch: Watch::BOTH,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Run until a terminal condition and report it.
    ///
    /// `stop` is checked once per iteration, before any I/O.
    pub fn run(&mut self, waiter: &mut dyn IdleWait, stop: &AtomicBool) -> StopReason {
        loop {
            if stop.load(Ordering::SeqCst) {
                return StopReason::Interrupted;
            }

            match self.step() {
                Ok(true) => {}
                Ok(false) => match waiter.wait(self.watch) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(source) => return StopReason::WaitFailed { source },
                },
                Err(reason) => return reason,
            }
        }
    }

    /// One iteration; `Ok(true)` when at least one byte moved
    fn step(&mut self) -> Result<bool, StopReason> {
        let mut moved = false;

        if let Some(byte) = read_byte(&mut self.stdin, Endpoint::Stdin, &mut self.watch.stdin)? {
            write_byte(&mut self.device, Endpoint::Device, byte)?;
            self.stats.to_device += 1;
            moved = true;
        }

        if let Some(byte) = read_byte(&mut self.device, Endpoint::Device, &mut self.watch.device)? {
            write_byte(&mut self.stdout, Endpoint::Stdout, byte)?;
            self.stats.to_stdout += 1;
            moved = true;
        }

        Ok(moved)
    }
}

/// Read at most one byte; `None` when nothing is available right now
fn read_byte<R: Read>(
    src: &mut R,
    endpoint: Endpoint,
    watched: &mut bool,
) -> Result<Option<u8>, StopReason> {
    let mut byte = [0u8; 1];
    match src.read(&mut byte) {
        Ok(1) => {
            // A tty can deliver input again after an end of file (^D).
            if !*watched {
                debug!("{} readable again", endpoint);
                *watched = true;
            }
            Ok(Some(byte[0]))
        }
        Ok(_) => {
            // End of file: keep reading, but stop waiting on it until it yields again.
            if *watched {
                debug!("{} reached end of file", endpoint);
                *watched = false;
            }
            Ok(None)
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(None),
        Err(source) => Err(StopReason::ReadFailed { endpoint, source }),
    }
}

fn write_byte<W: Write>(dst: &mut W, endpoint: Endpoint, byte: u8) -> Result<(), StopReason> {
    loop {
        match dst.write(&[byte]) {
            Ok(0) => return Err(StopReason::ZeroWrite { endpoint }),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(StopReason::WriteFailed { endpoint, source }),
        }
    }

    dst.flush()
        .map_err(|source| StopReason::WriteFailed { endpoint, source })
}
