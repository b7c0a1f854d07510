//! Configuration management for droidbridge.
//!
//! Configuration is layered with figment: serialized defaults, then the TOML
//! file, then `DROIDBRIDGE_` environment variables. Nested keys use a double
//! underscore, e.g. `DROIDBRIDGE_ADB__TIMEOUT_SECS=60`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name used under the platform config and data directories.
const DATA_DIR_NAME: &str = "droidbridge";

/// Default journal database file name.
const DATABASE_FILE_NAME: &str = "journal.db";

/// Default backup directory name under the home directory.
const BACKUP_DIR_NAME: &str = "AndroidBackups";

/// Environment variable prefix.
const ENV_PREFIX: &str = "DROIDBRIDGE_";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How adb is found and invoked.
    pub adb: AdbConfig,
    /// Backup behaviour.
    pub backup: BackupConfig,
    /// Operation journal.
    pub journal: JournalConfig,
    /// Log capture and analysis.
    pub logs: LogsConfig,
    /// Terminal presentation.
    pub ui: UiConfig,
}

/// adb invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Explicit adb executable. Auto-detected when unset.
    pub path: Option<PathBuf>,
    /// Per-command timeout in seconds.
    pub timeout_secs: u64,
    /// Wait for a device before running device commands.
    pub wait_for_device: bool,
    /// Polling attempts (one per second) while waiting for a device.
    pub wait_attempts: u32,
    /// Serial to target when several devices are attached.
    pub serial: Option<String>,
}

/// Backup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Backup directory. Defaults to `~/AndroidBackups`.
    pub location: Option<PathBuf>,
    /// Zip each backup and remove the directory.
    pub compress: bool,
    /// Number of backups kept by `backup prune`. 0 keeps all.
    pub keep_versions: usize,
    /// Age in days after which `backup prune` removes backups. 0 disables.
    pub max_age_days: u32,
    /// Maximum number of user apps whose APKs are copied.
    pub max_apps: usize,
    /// Timeout for `adb backup`, which waits for confirmation on the device.
    pub adb_backup_timeout_secs: u64,
}

/// Operation journal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Record operations and scans.
    pub enabled: bool,
    /// Database file. Defaults to `<data dir>/droidbridge/journal.db`.
    pub database_path: Option<PathBuf>,
    /// Entries kept after each write. 0 keeps all.
    pub max_entries: usize,
}

/// Log capture and analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Default `logs capture` duration in seconds.
    pub capture_secs: u64,
    /// Default `logs monitor` duration in seconds.
    pub monitor_secs: u64,
    /// Security matches above this count rate as medium risk.
    pub medium_risk_threshold: usize,
    /// Security matches above this count rate as high risk.
    pub high_risk_threshold: usize,
    /// Extra security patterns (regex, case-insensitive).
    pub custom_patterns: Vec<String>,
}

/// Terminal presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Colour terminal output.
    pub colors: bool,
    /// Require `--yes` for reboots, pruning and resets.
    pub confirm_destructive: bool,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: 30,
            wait_for_device: false,
            wait_attempts: 30,
            serial: None,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            location: None,
            compress: true,
            keep_versions: 5,
            max_age_days: 0,
            max_apps: 10,
            adb_backup_timeout_secs: 600,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            max_entries: 10_000,
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            capture_secs: 30,
            monitor_secs: 300,
            medium_risk_threshold: 5,
            high_risk_threshold: 20,
            custom_patterns: Vec::new(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            colors: true,
            confirm_destructive: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        debug!("Loading configuration from {}", config_file.display());

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge another TOML file over this configuration.
    ///
    /// Keys absent from the file keep their current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparsable or the merged
    /// configuration is invalid.
    pub fn merged_with_file(&self, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            )));
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(self.clone()))
            .merge(Toml::file(path))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.adb.timeout_secs == 0 {
            return Err(Error::config_validation(
                "adb.timeout_secs must be greater than 0",
            ));
        }

        if self.backup.adb_backup_timeout_secs == 0 {
            return Err(Error::config_validation(
                "backup.adb_backup_timeout_secs must be greater than 0",
            ));
        }

        if self.logs.medium_risk_threshold > self.logs.high_risk_threshold {
            return Err(Error::config_validation(format!(
                "logs.medium_risk_threshold ({}) cannot be greater than logs.high_risk_threshold ({})",
                self.logs.medium_risk_threshold, self.logs.high_risk_threshold
            )));
        }

        for pattern in &self.logs.custom_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(Error::config_validation(format!(
                    "invalid regex pattern: {pattern}"
                )));
            }
        }

        Ok(())
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        debug!("Configuration written to {}", path.display());
        Ok(())
    }

    /// Look up a dotted key such as `backup.keep_versions`.
    ///
    /// Returns `None` for keys that exist but are unset (e.g. `adb.path`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigKey`] when the key is not part of the schema.
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>> {
        let (section, field) = split_key(key)?;
        let table = self.to_table()?;
        let Some(toml::Value::Table(section_table)) = table.get(section) else {
            return Err(unknown_key(key));
        };
        if !Self::schema_has(section, field) {
            return Err(unknown_key(key));
        }
        Ok(section_table.get(field).cloned())
    }

    /// Return a copy with a dotted key set from a TOML-formatted value.
    ///
    /// Values that do not parse as TOML (e.g. bare paths) are taken as
    /// strings. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys, type mismatches or invalid results.
    pub fn with_value(&self, key: &str, raw: &str) -> Result<Self> {
        let (section, field) = split_key(key)?;
        if !Self::schema_has(section, field) {
            return Err(unknown_key(key));
        }

        let mut table = self.to_table()?;
        let Some(toml::Value::Table(section_table)) = table.get_mut(section) else {
            return Err(unknown_key(key));
        };
        section_table.insert(field.to_string(), parse_value(raw));

        let config: Config = toml::Value::Table(table)
            .try_into()
            .map_err(|e| Error::config_validation(format!("{key}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the journal database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.journal
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Resolve the backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.backup.location.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(BACKUP_DIR_NAME)
        })
    }

    /// Per-command adb timeout.
    #[must_use]
    pub fn adb_timeout(&self) -> Duration {
        Duration::from_secs(self.adb.timeout_secs)
    }

    /// Timeout used for `adb backup`.
    #[must_use]
    pub fn adb_backup_timeout(&self) -> Duration {
        Duration::from_secs(self.backup.adb_backup_timeout_secs)
    }

    /// Maximum backup age, if age-based pruning is enabled.
    #[must_use]
    pub fn backup_max_age(&self) -> Option<Duration> {
        if self.backup.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.backup.max_age_days) * 24 * 60 * 60,
            ))
        }
    }

    fn to_table(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self)? {
            toml::Value::Table(table) => Ok(table),
            _ => Err(Error::config_validation(
                "configuration did not serialize to a table",
            )),
        }
    }

    /// Whether `section.field` names a field, including `Option` fields that
    /// serialize to nothing while unset.
    fn schema_has(section: &str, field: &str) -> bool {
        const FIELDS: &[(&str, &[&str])] = &[
            (
                "adb",
                &["path", "timeout_secs", "wait_for_device", "wait_attempts", "serial"],
            ),
            (
                "backup",
                &[
                    "location",
                    "compress",
                    "keep_versions",
                    "max_age_days",
                    "max_apps",
                    "adb_backup_timeout_secs",
                ],
            ),
            ("journal", &["enabled", "database_path", "max_entries"]),
            (
                "logs",
                &[
                    "capture_secs",
                    "monitor_secs",
                    "medium_risk_threshold",
                    "high_risk_threshold",
                    "custom_patterns",
                ],
            ),
            ("ui", &["colors", "confirm_destructive"]),
        ];
        FIELDS
            .iter()
            .any(|(s, fields)| *s == section && fields.contains(&field))
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .filter(|(section, field)| !section.is_empty() && !field.is_empty())
        .ok_or_else(|| unknown_key(key))
}

fn unknown_key(key: &str) -> Error {
    Error::ConfigKey {
        key: key.to_string(),
    }
}

/// Parse a command-line value as a TOML value, falling back to a string.
fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.adb.path.is_none());
        assert_eq!(config.adb.timeout_secs, 30);
        assert!(config.backup.compress);
        assert_eq!(config.backup.keep_versions, 5);
        assert!(config.journal.enabled);
        assert!(config.ui.colors);
        assert!(config.ui.confirm_destructive);
    }

    #[test]
    fn test_default_logs_config() {
        let logs = LogsConfig::default();
        assert_eq!(logs.capture_secs, 30);
        assert_eq!(logs.monitor_secs, 300);
        assert_eq!(logs.medium_risk_threshold, 5);
        assert_eq!(logs.high_risk_threshold, 20);
        assert!(logs.custom_patterns.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.adb.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("adb.timeout_secs"));
    }

    #[test]
    fn test_validate_thresholds_order() {
        let mut config = Config::default();
        config.logs.medium_risk_threshold = 50;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("medium_risk_threshold"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.logs.custom_patterns = vec!["[invalid".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("journal.db"));
    }

    #[test]
    fn test_backup_dir_custom() {
        let mut config = Config::default();
        config.backup.location = Some(PathBuf::from("/srv/backups"));
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/backups"));
    }

    #[test]
    fn test_backup_dir_default() {
        let path = Config::default().backup_dir();
        assert!(path.ends_with("AndroidBackups"));
    }

    #[test]
    fn test_backup_max_age() {
        let mut config = Config::default();
        assert!(config.backup_max_age().is_none());

        config.backup.max_age_days = 2;
        assert_eq!(
            config.backup_max_age(),
            Some(Duration::from_secs(2 * 24 * 60 * 60))
        );
    }

    #[test]
    fn test_timeouts() {
        let config = Config::default();
        assert_eq!(config.adb_timeout(), Duration::from_secs(30));
        assert_eq!(config.adb_backup_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("droidbridge"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.backup, BackupConfig::default());
        assert_eq!(config.logs, LogsConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backup]\nkeep_versions = 2\ncompress = false\n\n[ui]\ncolors = false\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.backup.keep_versions, 2);
        assert!(!config.backup.compress);
        assert!(!config.ui.colors);
        assert_eq!(config.backup.max_apps, 10);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[adb]\ntimeout_secs = 0\n").unwrap();

        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.adb.serial = Some("emulator-5554".to_string());
        config.backup.max_apps = 3;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(Some(path)).unwrap();
        assert_eq!(loaded.adb.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(loaded.backup.max_apps, 3);
    }

    #[test]
    fn test_merged_with_file_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.toml");
        std::fs::write(&path, "[logs]\ncapture_secs = 5\n").unwrap();

        let mut current = Config::default();
        current.backup.keep_versions = 9;
        let merged = current.merged_with_file(&path).unwrap();

        assert_eq!(merged.logs.capture_secs, 5);
        assert_eq!(merged.backup.keep_versions, 9);
    }

    #[test]
    fn test_merged_with_missing_file() {
        let result = Config::default().merged_with_file(Path::new("/nonexistent/import.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_get_known_key() {
        let config = Config::default();
        let value = config.get("backup.keep_versions").unwrap();
        assert_eq!(value, Some(toml::Value::Integer(5)));
    }

    #[test]
    fn test_get_unset_optional_key() {
        let config = Config::default();
        assert_eq!(config.get("adb.path").unwrap(), None);
    }

    #[test]
    fn test_get_unknown_key() {
        let config = Config::default();
        assert!(matches!(
            config.get("adb.nope"),
            Err(Error::ConfigKey { .. })
        ));
        assert!(matches!(config.get("nodot"), Err(Error::ConfigKey { .. })));
    }

    #[test]
    fn test_with_value_typed() {
        let config = Config::default();

        let updated = config.with_value("backup.keep_versions", "12").unwrap();
        assert_eq!(updated.backup.keep_versions, 12);

        let updated = updated.with_value("ui.colors", "false").unwrap();
        assert!(!updated.ui.colors);
        assert_eq!(updated.backup.keep_versions, 12);
    }

    #[test]
    fn test_with_value_bare_string() {
        let config = Config::default();
        let updated = config.with_value("adb.path", "/opt/sdk/adb").unwrap();
        assert_eq!(updated.adb.path, Some(PathBuf::from("/opt/sdk/adb")));
    }

    #[test]
    fn test_with_value_array() {
        let config = Config::default();
        let updated = config
            .with_value("logs.custom_patterns", r#"["keystore", "dm-verity"]"#)
            .unwrap();
        assert_eq!(updated.logs.custom_patterns.len(), 2);
    }

    #[test]
    fn test_with_value_type_mismatch() {
        let config = Config::default();
        assert!(config.with_value("backup.keep_versions", "many").is_err());
    }

    #[test]
    fn test_with_value_validates() {
        let config = Config::default();
        assert!(config.with_value("adb.timeout_secs", "0").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("3"), toml::Value::Integer(3));
        assert_eq!(parse_value("true"), toml::Value::Boolean(true));
        assert_eq!(parse_value("\"x\""), toml::Value::String("x".to_string()));
        assert_eq!(
            parse_value("C:\\sdk\\adb.exe"),
            toml::Value::String("C:\\sdk\\adb.exe".to_string())
        );
    }

    #[test]
    fn test_config_clone() {
        let config = Config::default();
        assert_eq!(config.clone(), config);
    }
}
