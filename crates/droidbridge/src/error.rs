//! Error types for droidbridge.
//!
//! Every fallible operation in the library returns [`Error`]. Variants are
//! grouped by the layer that produced them so the CLI can print a useful
//! message without inspecting the source chain.

use std::path::PathBuf;
use thiserror::Error;

/// Download location for the Android SDK platform tools.
pub const PLATFORM_TOOLS_URL: &str =
    "https://developer.android.com/studio/releases/platform-tools";

/// The main error type for droidbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Journal Errors ===
    /// Failed to open or create the journal database.
    #[error("failed to open journal at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A journal query failed.
    #[error("journal query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run journal migrations.
    #[error("journal migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A dotted configuration key does not exist.
    #[error("unknown configuration key '{key}'")]
    ConfigKey {
        /// The key that was requested.
        key: String,
    },

    /// Failed to write configuration as TOML.
    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // === ADB Errors ===
    /// No working adb executable was found.
    #[error(
        "adb not found (tried: {}). Install Android Platform Tools from {url}",
        join_paths(.searched),
        url = PLATFORM_TOOLS_URL
    )]
    AdbNotFound {
        /// Every candidate that was probed.
        searched: Vec<PathBuf>,
    },

    /// The adb process could not be started.
    #[error("failed to run {program}: {source}")]
    AdbSpawn {
        /// The executable that was launched.
        program: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An adb command exited unsuccessfully.
    #[error("adb {command} failed (exit code {}): {stderr}", display_code(.code))]
    CommandFailed {
        /// The arguments passed to adb.
        command: String,
        /// Process exit code, if any.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    // === Device Errors ===
    /// No device in `device` state is attached.
    #[error("no authorized device connected (check the cable and USB debugging)")]
    NoDevice,

    /// A local file to push does not exist.
    #[error("local file not found: {path}")]
    LocalFileMissing {
        /// The missing path.
        path: PathBuf,
    },

    // === Log Errors ===
    /// There were no log lines to work on.
    #[error("no log entries to process")]
    NoLogs,

    /// A log pattern failed to compile.
    #[error("invalid log pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex error.
        #[source]
        source: regex::Error,
    },

    // === Backup Errors ===
    /// A backup operation failed.
    #[error("backup failed: {message}")]
    Backup {
        /// Description of what went wrong.
        message: String,
    },

    /// The file is not an Android backup.
    #[error("not an Android backup: {message}")]
    InvalidAndroidBackup {
        /// Description of the header problem.
        message: String,
    },

    /// The Android backup uses a feature this tool cannot unpack.
    #[error("unsupported Android backup: {message}")]
    UnsupportedAndroidBackup {
        /// Description of the unsupported feature.
        message: String,
    },

    /// Writing or reading a zip archive failed.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },
}

/// A specialized Result type for droidbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a backup error.
    #[must_use]
    pub fn backup(message: impl Into<String>) -> Self {
        Self::Backup {
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an error for an adb command that exited unsuccessfully.
    #[must_use]
    pub fn command_failed(args: &[&str], code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: args.join(" "),
            code,
            stderr: stderr.into(),
        }
    }

    /// Check if this error means no usable device is attached.
    #[must_use]
    pub fn is_no_device(&self) -> bool {
        matches!(self, Self::NoDevice)
    }

    /// Check if this error means adb itself is unavailable.
    #[must_use]
    pub fn is_adb_missing(&self) -> bool {
        matches!(self, Self::AdbNotFound { .. } | Self::AdbSpawn { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NoDevice;
        assert!(err.to_string().contains("no authorized device"));

        let err = Error::backup("disk full");
        assert_eq!(err.to_string(), "backup failed: disk full");
    }

    #[test]
    fn test_adb_not_found_lists_candidates() {
        let err = Error::AdbNotFound {
            searched: vec![PathBuf::from("adb"), PathBuf::from("/usr/bin/adb")],
        };
        let msg = err.to_string();
        assert!(msg.contains("adb, /usr/bin/adb"));
        assert!(msg.contains("platform-tools"));
        assert!(err.is_adb_missing());
    }

    #[test]
    fn test_command_failed_display() {
        let err = Error::command_failed(&["shell", "ls"], Some(1), "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("adb shell ls"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_command_failed_without_code() {
        let err = Error::command_failed(&["devices"], None, "killed");
        assert!(err.to_string().contains("exit code none"));
    }

    #[test]
    fn test_is_no_device() {
        assert!(Error::NoDevice.is_no_device());
        assert!(!Error::NoLogs.is_no_device());
    }

    #[test]
    fn test_config_key_display() {
        let err = Error::ConfigKey {
            key: "adb.nope".to_string(),
        };
        assert_eq!(err.to_string(), "unknown configuration key 'adb.nope'");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert!(!err.is_adb_missing());
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/journal.db",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_invalid_pattern_display() {
        let source = regex::Regex::new("[broken").unwrap_err();
        let err = Error::InvalidPattern {
            pattern: "[broken".to_string(),
            source,
        };
        assert!(err.to_string().contains("[broken"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::Timeout {
            operation: "adb shell getprop".to_string(),
        };
        assert!(err.to_string().contains("adb shell getprop"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
