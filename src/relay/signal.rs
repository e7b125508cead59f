//! SIGINT/SIGTERM handling
//!
//! The handler only raises a flag. The relay loop checks it between
//! iterations so that descriptor flags get restored on the way out.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::RelayError;

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_stop(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install the stop handlers and return the flag they set.
///
/// `SA_RESTART` is left off so a pending `poll` returns `EINTR` right away.
pub fn install() -> Result<&'static AtomicBool, RelayError> {
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        register(signal).map_err(|source| RelayError::Signal {
            signal: name,
            source,
        })?;
    }
    Ok(&STOP_REQUESTED)
}

fn register(signal: libc::c_int) -> io::Result<()> {
    // SAFETY: a zeroed sigaction is a valid "no flags, empty mask" value, and
    // the handler only touches an atomic.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handle_stop as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signal, &action, ptr::null_mut()) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
