//! Device and standard-stream handles
//!
//! Opens the serial device, duplicates stdin/stdout into unbuffered handles and
//! switches descriptors into non-blocking mode for the lifetime of a guard.

use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::Path;

use crate::error::RelayError;

/// Open the serial device for reading and writing.
///
/// No termios settings are touched; the line keeps whatever configuration the
/// system (or a previous `stty`) gave it.
pub fn open_device(path: &Path) -> Result<File, RelayError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| RelayError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("opened {} as fd {}", path.display(), file.as_raw_fd());
    Ok(file)
}

/// Duplicate the process's stdin into an owned, unbuffered handle
pub fn duplicate_stdin() -> Result<File, RelayError> {
    duplicate(io::stdin().as_fd(), "stdin")
}

/// Duplicate the process's stdout into an owned, unbuffered handle
pub fn duplicate_stdout() -> Result<File, RelayError> {
    duplicate(io::stdout().as_fd(), "stdout")
}

fn duplicate(fd: BorrowedFd<'_>, name: &'static str) -> Result<File, RelayError> {
    fd.try_clone_to_owned()
        .map(File::from)
        .map_err(|source| RelayError::Duplicate { name, source })
}

/// Keeps `O_NONBLOCK` set on a descriptor and restores the previous flags on drop.
///
/// Status flags belong to the open file description, so a duplicated stdin
/// shares them with the shell's terminal. Restoring them matters.
pub struct NonBlocking<'fd> {
    fd: BorrowedFd<'fd>,
    name: &'static str,
    saved: libc::c_int,
}

impl<'fd> NonBlocking<'fd> {
    /// Set `O_NONBLOCK` on `fd`; `name` labels diagnostics
    pub fn enable(fd: BorrowedFd<'fd>, name: &'static str) -> Result<Self, RelayError> {
        let saved = get_flags(fd).map_err(|e| RelayError::non_blocking(name, e))?;
        set_flags(fd, saved | libc::O_NONBLOCK).map_err(|e| RelayError::non_blocking(name, e))?;

        debug!("{} (fd {}) switched to non-blocking", name, fd.as_raw_fd());
        Ok(Self { fd, name, saved })
    }
}

impl Drop for NonBlocking<'_> {
    fn drop(&mut self) {
        match set_flags(self.fd, self.saved) {
            Ok(()) => debug!("{} flags restored", self.name),
            Err(e) => warn!("failed to restore flags on {}: {}", self.name, e),
        }
    }
}

/// Writer that behaves as blocking even when its descriptor is non-blocking.
///
/// A `WouldBlock` from the inner writer waits for `POLLOUT` and retries.
pub struct BlockingWriter<W> {
    inner: W,
}

impl<W: Write + AsFd> BlockingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + AsFd> Write for BlockingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.inner.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    wait_writable(self.inner.as_fd())?
                }
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Block until `fd` accepts output; `Interrupted` is passed up to the caller
fn wait_writable(fd: BorrowedFd<'_>) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    // SAFETY: `pfd` is a single live pollfd; a negative timeout waits indefinitely.
    if unsafe { libc::poll(&mut pfd, 1, -1) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn get_flags(fd: BorrowedFd<'_>) -> io::Result<libc::c_int> {
    // SAFETY: the borrow guarantees the descriptor is open; F_GETFL takes no pointer.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

fn set_flags(fd: BorrowedFd<'_>, flags: libc::c_int) -> io::Result<()> {
    // SAFETY: as above; F_SETFL takes an int argument.
    let ret = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use tempfile::{tempdir, NamedTempFile};

    fn is_non_blocking(fd: BorrowedFd<'_>) -> bool {
        get_flags(fd).unwrap() & libc::O_NONBLOCK != 0
    }

    #[test]
    fn test_open_missing_device() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ttyUSB0");

        let err = open_device(&path).unwrap_err();
        match err {
            RelayError::Open { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_device_read_write() {
        let file = NamedTempFile::new().unwrap();
        let mut device = open_device(file.path()).unwrap();

        device.write_all(b"AT\r").unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"AT\r");
    }

    #[test]
    fn test_non_blocking_guard_restores_flags() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(!is_non_blocking(a.as_fd()));

        {
            let _guard = NonBlocking::enable(a.as_fd(), "device").unwrap();
            assert!(is_non_blocking(a.as_fd()));
        }

        assert!(!is_non_blocking(a.as_fd()));
    }

    #[test]
    fn test_non_blocking_read_would_block() {
        let (a, _b) = UnixStream::pair().unwrap();
        let _guard = NonBlocking::enable(a.as_fd(), "device").unwrap();

        let mut byte = [0u8; 1];
        let err = (&a).read(&mut byte).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_duplicate_shares_description() {
        let (a, _b) = UnixStream::pair().unwrap();
        let dup = duplicate(a.as_fd(), "stdin").unwrap();

        let _guard = NonBlocking::enable(dup.as_fd(), "stdin").unwrap();
        assert!(is_non_blocking(a.as_fd()));
    }

    #[test]
    fn test_blocking_writer_passes_through() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let _guard = NonBlocking::enable(a.as_fd(), "stdout").unwrap();

        let mut writer = BlockingWriter::new(&a);
        writer.write_all(b"ok").unwrap();
        writer.flush().unwrap();

        let mut buf = [0u8; 2];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ok");
    }
}
