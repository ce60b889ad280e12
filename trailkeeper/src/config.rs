//! Configuration for the tracking coordinator.
//!
//! Settings live in an INI file, by default at
//! `~/.config/trailkeeper/config.ini`:
//!
//! ```ini
//! [session]
//! follow_delay_ms = 5000
//! start_timeout_ms = 10000
//! stop_timeout_ms = 5000
//!
//! [logging]
//! level = info
//! directory = /var/log/trailkeeper
//! file_prefix = trailkeeper.log
//! ```
//!
//! Missing files, sections, and keys fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Delay between a session becoming active and the renderer starting to
/// follow live positions.
pub const DEFAULT_FOLLOW_DELAY: Duration = Duration::from_secs(5);

/// Maximum wait for the background service to acknowledge a start.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum wait for the background service to acknowledge a stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default log level filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log file name prefix.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "trailkeeper.log";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A key holds a value of the wrong shape.
    #[error("Invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Tracking session timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay after entering Active before live-position following starts.
    pub follow_delay: Duration,
    /// Start acknowledgment timeout.
    pub start_timeout: Duration,
    /// Stop acknowledgment timeout.
    pub stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            follow_delay: DEFAULT_FOLLOW_DELAY,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Set the follow delay.
    pub fn with_follow_delay(mut self, delay: Duration) -> Self {
        self.follow_delay = delay;
        self
    }

    /// Set the start acknowledgment timeout.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Set the stop acknowledgment timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Directory for rolling log files. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    /// Log file name prefix.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Set the level filter.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Write logs to files in `directory`.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Session timing.
    pub session: SessionConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Loader for the INI configuration file.
pub struct ConfigFile;

impl ConfigFile {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("trailkeeper").join("config.ini"))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<TrackerConfig, ConfigError> {
        if !path.exists() {
            return Ok(TrackerConfig::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Load from the default location, or defaults if there is none.
    pub fn load_default() -> Result<TrackerConfig, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(TrackerConfig::default()),
        }
    }

    /// Parse INI text.
    pub fn parse(contents: &str) -> Result<TrackerConfig, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = TrackerConfig::default();

        if let Some(section) = ini.section(Some("session")) {
            if let Some(value) = section.get("follow_delay_ms") {
                config.session.follow_delay = parse_millis("session", "follow_delay_ms", value)?;
            }
            if let Some(value) = section.get("start_timeout_ms") {
                config.session.start_timeout = parse_millis("session", "start_timeout_ms", value)?;
            }
            if let Some(value) = section.get("stop_timeout_ms") {
                config.session.stop_timeout = parse_millis("session", "stop_timeout_ms", value)?;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(value) = section.get("level") {
                config.logging.level = value.trim().to_string();
            }
            if let Some(value) = section.get("directory") {
                let value = value.trim();
                config.logging.directory = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            if let Some(value) = section.get("file_prefix") {
                config.logging.file_prefix = value.trim().to_string();
            }
        }

        Ok(config)
    }
}

fn parse_millis(section: &str, key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.session.follow_delay, Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let config = ConfigFile::parse(
            "[session]\nfollow_delay_ms = 250\nstop_timeout_ms = 1000\n\n\
             [logging]\nlevel = debug\ndirectory = /tmp/trailkeeper\n",
        )
        .unwrap();

        assert_eq!(config.session.follow_delay, Duration::from_millis(250));
        assert_eq!(config.session.start_timeout, DEFAULT_START_TIMEOUT);
        assert_eq!(config.session.stop_timeout, Duration::from_secs(1));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/tmp/trailkeeper"))
        );
    }

    #[test]
    fn test_invalid_number() {
        let err = ConfigFile::parse("[session]\nfollow_delay_ms = soon\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "follow_delay_ms"
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigFile::load(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[session]\nstart_timeout_ms = 3000").unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.session.start_timeout, Duration::from_secs(3));
    }
}
