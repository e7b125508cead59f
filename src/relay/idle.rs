//! Idle waiting between empty relay iterations
//!
//! The relay loop itself never blocks. When an iteration moves no bytes it
//! hands control to an [`IdleWait`], which decides how long to back off.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::thread;
use std::time::Duration;

use crate::config::IdleStrategy;

/// Which sources are still worth watching for input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub stdin: bool,
    pub device: bool,
}

impl Watch {
    pub const BOTH: Watch = Watch {
        stdin: true,
        device: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.stdin && !self.device
    }
}

/// Back-off strategy used when neither source produced a byte
pub trait IdleWait {
    /// Return once data may be available or the strategy's bound elapses.
    ///
    /// An `Interrupted` error means a signal arrived and is not a failure.
    fn wait(&mut self, watch: Watch) -> io::Result<()>;
}

/// Wait for `POLLIN` on the watched descriptors, bounded by a timeout
pub struct PollWait<'fd> {
    stdin: BorrowedFd<'fd>,
    device: BorrowedFd<'fd>,
    timeout: Duration,
}

impl<'fd> PollWait<'fd> {
    pub fn new(stdin: BorrowedFd<'fd>, device: BorrowedFd<'fd>, timeout: Duration) -> Self {
        Self {
            stdin,
            device,
            timeout,
        }
    }

    fn timeout_ms(&self) -> libc::c_int {
        self.timeout
            .as_millis()
            .try_into()
            .unwrap_or(libc::c_int::MAX)
    }
}

impl IdleWait for PollWait<'_> {
    fn wait(&mut self, watch: Watch) -> io::Result<()> {
        if watch.is_empty() {
            thread::sleep(self.timeout);
            return Ok(());
        }

        let mut fds = Vec::with_capacity(2);
        if watch.stdin {
            fds.push(pollfd(self.stdin));
        }
        if watch.device {
            fds.push(pollfd(self.device));
        }

        // SAFETY: `fds` is a live, correctly sized array of pollfd for the call.
        let ret = unsafe {
            libc::poll(
                fds.as_mut_ptr(),
                fds.len() as libc::nfds_t,
                self.timeout_ms(),
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn pollfd(fd: BorrowedFd<'_>) -> libc::pollfd {
    libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Sleep for a fixed interval
pub struct SleepWait {
    interval: Duration,
}

impl SleepWait {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl IdleWait for SleepWait {
    fn wait(&mut self, _watch: Watch) -> io::Result<()> {
        thread::sleep(self.interval);
        Ok(())
    }
}

/// No back-off at all; the loop polls both sources continuously
pub struct Spin;

impl IdleWait for Spin {
    fn wait(&mut self, _watch: Watch) -> io::Result<()> {
        std::hint::spin_loop();
        Ok(())
    }
}

/// Build the waiter for a configured strategy
pub fn for_strategy<'fd>(
    strategy: IdleStrategy,
    interval: Duration,
    stdin: BorrowedFd<'fd>,
    device: BorrowedFd<'fd>,
) -> Box<dyn IdleWait + 'fd> {
    match strategy {
        IdleStrategy::Poll => Box::new(PollWait::new(stdin, device, interval)),
        IdleStrategy::Sleep => Box::new(SleepWait::new(interval)),
        IdleStrategy::Spin => Box::new(Spin),
    }
}
