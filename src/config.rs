//! Relay configuration
//!
//! Built from defaults, then an optional TOML file, then command-line flags.

use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RelayError;

/// Device opened when none is given
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Default bound on a single idle wait
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 100;

/// What the loop does when neither source had a byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdleStrategy {
    /// Wait for readiness with poll(2), bounded by the idle interval
    #[default]
    Poll,
    /// Sleep for the idle interval
    Sleep,
    /// Do not wait at all (busy loop)
    Spin,
}

/// Exit status used when the loop stops on an I/O failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Loop failures exit non-zero
    #[default]
    Strict,
    /// Every loop stop exits 0
    Compatible,
}

/// Complete relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Serial device path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub device: PathBuf,
    /// Idle behaviour between empty iterations
    pub idle: IdleStrategy,
    /// Upper bound for one idle wait, in milliseconds
    pub idle_interval_ms: u64,
    /// Exit status policy for loop failures
    pub exit_policy: ExitPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            idle: IdleStrategy::default(),
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
            exit_policy: ExitPolicy::default(),
        }
    }
}

/// Values given on the command line; `None` leaves the file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device: Option<PathBuf>,
    pub idle: Option<IdleStrategy>,
    pub idle_interval_ms: Option<u64>,
    pub compatible_exit: bool,
}

impl RelayConfig {
    /// Load a configuration file, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse_content(&content, path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse TOML content; `origin` is only used in error messages
    pub fn parse_content(content: &str, origin: &Path) -> Result<Self, RelayError> {
        toml::from_str(content).map_err(|source| RelayError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Apply command-line overrides on top of this configuration
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(device) = overrides.device {
            self.device = device;
        }
        if let Some(idle) = overrides.idle {
            self.idle = idle;
        }
        if let Some(ms) = overrides.idle_interval_ms {
            self.idle_interval_ms = ms;
        }
        if overrides.compatible_exit {
            self.exit_policy = ExitPolicy::Compatible;
        }
        self
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.device, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(config.idle, IdleStrategy::Poll);
        assert_eq!(config.idle_interval(), Duration::from_millis(100));
        assert_eq!(config.exit_policy, ExitPolicy::Strict);
    }

    #[test]
    fn test_parse_partial_config() {
        let content = r#"
device = "/dev/ttyACM0"
idle = "sleep"
"#;
        let config = RelayConfig::parse_content(content, Path::new("test")).unwrap();

        assert_eq!(config.device, PathBuf::from("/dev/ttyACM0"));
        assert_eq!(config.idle, IdleStrategy::Sleep);
        assert_eq!(config.idle_interval_ms, DEFAULT_IDLE_INTERVAL_MS);
        assert_eq!(config.exit_policy, ExitPolicy::Strict);
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = RelayConfig::parse_content("baud = 115200\n", Path::new("relay.toml"))
            .unwrap_err();
        assert!(matches!(err, RelayError::ConfigParse { .. }));
        assert!(err.to_string().contains("relay.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "exit_policy = \"compatible\"").unwrap();
        writeln!(file, "idle_interval_ms = 5").unwrap();

        let config = RelayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.exit_policy, ExitPolicy::Compatible);
        assert_eq!(config.idle_interval_ms, 5);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RelayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, RelayError::ConfigRead { .. }));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let base = RelayConfig::parse_content(
            "device = \"/dev/ttyS1\"\nidle = \"spin\"\n",
            Path::new("test"),
        )
        .unwrap();

        let config = base.clone().with_overrides(Overrides {
            device: Some(PathBuf::from("/dev/ttyUSB3")),
            idle_interval_ms: Some(20),
            compatible_exit: true,
            ..Default::default()
        });

        assert_eq!(config.device, PathBuf::from("/dev/ttyUSB3"));
        assert_eq!(config.idle, IdleStrategy::Spin);
        assert_eq!(config.idle_interval_ms, 20);
        assert_eq!(config.exit_policy, ExitPolicy::Compatible);

        assert_eq!(base.clone().with_overrides(Overrides::default()), base);
    }
}
