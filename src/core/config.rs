//! Configuration module for the hash matcher
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\hashmatch\config.toml
//! - Linux: ~/.config/hashmatch/config.toml
//! - macOS: ~/Library/Application Support/hashmatch/config.toml
//!
//! All paths and column names that used to be hard-wired into the matcher
//! live here and are handed to the components explicitly.

use crate::engine::MatchLineFormat;
use crate::report::ColumnMapping;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory
const APP_NAME: &str = "hashmatch";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file looked up in the working directory before the standard location
const LOCAL_CONFIG_FILE: &str = "./hashmatch.toml";

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Ensure the configuration directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = get_config_dir().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| ConfigError::WriteError(config_dir.clone(), e.to_string()))?;
    }

    Ok(config_dir)
}

/// Initialize the configuration file if it doesn't exist.
///
/// Returns the path to the config file.
pub fn init_config() -> Result<PathBuf, ConfigError> {
    let config_dir = ensure_config_dir()?;
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    if !config_path.exists() {
        fs::write(&config_path, Config::generate_default_config())
            .map_err(|e| ConfigError::WriteError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the periodic reports live and how their columns are named
    pub reports: ReportsConfig,

    /// Reference corpus settings
    pub corpus: CorpusConfig,

    /// Output channel settings
    pub sink: SinkConfig,

    /// Matching and progress settings
    pub matching: MatchingConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Report location and schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Directory containing one sub-directory per generated report
    pub base_path: PathBuf,

    /// Sub-directory of a report that holds the CSV export
    pub csv_subdir: String,

    /// Explicit CSV file to use instead of discovering the latest report
    pub report_file: Option<PathBuf>,

    /// Column holding the observed checksum
    pub checksum_column: String,

    /// Column holding the log source label
    pub source_column: String,

    /// Column holding the observation timestamp
    pub timestamp_column: String,
}

/// Reference corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory containing the reference shard files
    pub directory: PathBuf,

    /// Shard file extension (without the dot)
    pub extension: String,

    /// Leading lines of every shard that are signature/preamble, not data
    pub preamble_lines: usize,

    /// Descend into sub-directories when enumerating shards
    pub recursive: bool,
}

/// Output channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Path of the named pipe the consumer reads from
    pub fifo_path: PathBuf,

    /// Create the named pipe if it does not exist
    pub create_fifo: bool,

    /// Seconds to wait for a reader to attach (0 = wait forever)
    pub open_timeout_secs: u64,

    /// How often to retry attaching while waiting for a reader
    pub poll_interval_ms: u64,
}

/// Matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Emit a progress event every N records
    pub progress_interval: u64,

    /// Leading tag of every match line
    pub match_tag: String,

    /// Field name used for the timestamp in match lines
    pub timestamp_label: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log to file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/store/reporting/reports"),
            csv_subdir: "CSV".to_string(),
            report_file: None,
            checksum_column: "MD5 Hash".to_string(),
            source_column: "Log Source".to_string(),
            timestamp_column: "Horario".to_string(),
        }
    }
}

impl ReportsConfig {
    /// Column mapping handed to the record stream
    pub fn column_mapping(&self) -> ColumnMapping {
        ColumnMapping::new(
            &self.checksum_column,
            &self.source_column,
            &self.timestamp_column,
        )
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/store/VirusShareHashes"),
            extension: "md5".to_string(),
            preamble_lines: 6,
            recursive: false,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            fifo_path: PathBuf::from("/tmp/virusshare_fifo"),
            create_fifo: true,
            open_timeout_secs: 300,
            poll_interval_ms: 50,
        }
    }
}

impl SinkConfig {
    /// Open timeout, `None` meaning wait indefinitely
    pub fn open_timeout(&self) -> Option<Duration> {
        if self.open_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.open_timeout_secs))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            progress_interval: 1000,
            match_tag: "Hash Maliciosa Encontrada".to_string(),
            timestamp_label: "Horario".to_string(),
        }
    }
}

impl MatchingConfig {
    pub fn line_format(&self) -> MatchLineFormat {
        MatchLineFormat {
            tag: self.match_tag.clone(),
            timestamp_label: self.timestamp_label.clone(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./hashmatch.log"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./hashmatch.toml (current directory)
    /// 2. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// Get the path where the config file is (or would be) located.
    pub fn get_active_config_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return local;
        }

        get_config_path().unwrap_or(local)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))?;

        Ok(())
    }

    /// Reject values the matcher cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matching.progress_interval == 0 {
            return Err(ConfigError::Invalid(
                "matching.progress_interval must be greater than 0".to_string(),
            ));
        }
        if self.corpus.extension.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "corpus.extension must not be empty".to_string(),
            ));
        }
        let columns = [
            ("reports.checksum_column", &self.reports.checksum_column),
            ("reports.source_column", &self.reports.source_column),
            ("reports.timestamp_column", &self.reports.timestamp_column),
        ];
        for (key, value) in columns {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path
    FileNotFound(PathBuf),
    /// Failed to read the configuration file
    ReadError(PathBuf, String),
    /// Failed to parse the configuration file (invalid TOML)
    ParseError(PathBuf, String),
    /// Failed to serialize configuration to TOML
    SerializeError(String),
    /// Failed to write configuration file
    WriteError(PathBuf, String),
    /// Could not determine config directory
    ConfigDirNotFound,
    /// A value is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ReadError(path, err) => {
                write!(
                    f,
                    "Failed to read configuration file {}: {}",
                    path.display(),
                    err
                )
            }
            ConfigError::ParseError(path, err) => {
                write!(
                    f,
                    "Failed to parse configuration file {}: {}",
                    path.display(),
                    err
                )
            }
            ConfigError::SerializeError(err) => {
                write!(f, "Failed to serialize configuration: {}", err)
            }
            ConfigError::WriteError(path, err) => {
                write!(
                    f,
                    "Failed to write configuration file {}: {}",
                    path.display(),
                    err
                )
            }
            ConfigError::ConfigDirNotFound => {
                write!(f, "Could not determine configuration directory")
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = Config::default();
        assert_eq!(config.corpus.extension, "md5");
        assert_eq!(config.corpus.preamble_lines, 6);
        assert_eq!(config.reports.checksum_column, "MD5 Hash");
        assert_eq!(config.reports.source_column, "Log Source");
        assert_eq!(config.reports.timestamp_column, "Horario");
        assert_eq!(config.sink.fifo_path, PathBuf::from("/tmp/virusshare_fifo"));
        assert_eq!(config.matching.progress_interval, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.corpus.preamble_lines, 6);
        assert_eq!(config.matching.match_tag, "Hash Maliciosa Encontrada");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [corpus]
            directory = "/data/hashes"
            preamble_lines = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.corpus.directory, PathBuf::from("/data/hashes"));
        assert_eq!(config.corpus.preamble_lines, 0);
        assert_eq!(config.corpus.extension, "md5");
        assert_eq!(config.sink.open_timeout_secs, 300);
    }

    #[test]
    fn test_open_timeout_zero_means_forever() {
        let mut sink = SinkConfig::default();
        assert_eq!(sink.open_timeout(), Some(Duration::from_secs(300)));
        sink.open_timeout_secs = 0;
        assert_eq!(sink.open_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.matching.progress_interval = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_blank_column() {
        let mut config = Config::default();
        config.reports.source_column = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.sink.fifo_path = PathBuf::from("/run/hashmatch.fifo");
        config.reports.report_file = Some(PathBuf::from("/tmp/report.csv"));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sink.fifo_path, PathBuf::from("/run/hashmatch.fifo"));
        assert_eq!(
            loaded.reports.report_file,
            Some(PathBuf::from("/tmp/report.csv"))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
