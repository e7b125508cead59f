//! Error types for relay startup and shutdown
//!
//! Startup failures are [`RelayError`]s and always end the process with a
//! non-zero status. Once the loop runs, the reason it ended is reported as a
//! [`StopReason`], and the configured [`ExitPolicy`] decides the status.
//!
//! Startup errors keep the OS error as their source only, so print them with
//! `{:#}` through anyhow. Stop reasons carry it in their own message.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ExitPolicy;

/// Exit status for any failure before the relay loop starts
pub const EXIT_STARTUP_FAILURE: i32 = 255;

/// Exit status for a failed read, write or wait inside the loop
pub const EXIT_LOOP_FAILURE: i32 = 1;

/// Failures that prevent the relay loop from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The device path could not be opened for read/write.
    #[error("open({})", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `O_NONBLOCK` could not be read or set on a descriptor.
    #[error("nonblock({name})")]
    NonBlocking {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// A standard stream could not be duplicated into an owned handle.
    #[error("dup({name})")]
    Duplicate {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::config::RelayConfig`].
    #[error("invalid config file {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A stop-signal handler could not be installed.
    #[error("sigaction({signal})")]
    Signal {
        signal: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    /// Wrap an I/O error from `fcntl` on the named descriptor
    pub fn non_blocking(name: &'static str, source: io::Error) -> Self {
        Self::NonBlocking { name, source }
    }
}

/// One of the three streams the relay touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Stdin,
    Device,
    Stdout,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Stdin => write!(f, "stdin"),
            Endpoint::Device => write!(f, "device"),
            Endpoint::Stdout => write!(f, "stdout"),
        }
    }
}

/// Why the relay loop stopped
#[derive(Debug, Error)]
pub enum StopReason {
    #[error("read({endpoint}): {source}")]
    ReadFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("write({endpoint}): {source}")]
    WriteFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// The destination accepted zero bytes, which is treated as end of stream.
    #[error("write({endpoint}): no bytes written")]
    ZeroWrite { endpoint: Endpoint },

    #[error("wait: {source}")]
    WaitFailed {
        #[source]
        source: io::Error,
    },

    #[error("stop requested")]
    Interrupted,
}

impl StopReason {
    /// True for stops caused by an I/O failure rather than end of stream or a
    /// stop request.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StopReason::ReadFailed { .. }
                | StopReason::WriteFailed { .. }
                | StopReason::WaitFailed { .. }
        )
    }

    /// Process exit status for this stop under the given policy
    pub fn exit_code(&self, policy: ExitPolicy) -> i32 {
        match policy {
            ExitPolicy::Compatible => 0,
            ExitPolicy::Strict if self.is_failure() => EXIT_LOOP_FAILURE,
            ExitPolicy::Strict => 0,
        }
    }
}
