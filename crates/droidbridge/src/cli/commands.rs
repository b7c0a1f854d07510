//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::adb::RebootMode;
use crate::backup::BackupSection;
use crate::logs::LogBuffer;

/// Output switch shared by report commands.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct OutputArgs {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Reboot command arguments.
#[derive(Debug, Args)]
pub struct RebootCommand {
    /// Where to boot
    #[arg(value_enum, default_value = "system")]
    pub mode: RebootModeArg,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Push command arguments.
#[derive(Debug, Args)]
pub struct PushCommand {
    /// Local file
    pub local: PathBuf,

    /// Destination on the device
    pub remote: String,
}

/// Pull command arguments.
#[derive(Debug, Args)]
pub struct PullCommand {
    /// Path on the device
    pub remote: String,

    /// Local destination (defaults to the file name in the current directory)
    pub local: Option<PathBuf>,
}

/// Shell command arguments.
#[derive(Debug, Args)]
pub struct ShellCommand {
    /// Command and arguments to run on the device
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Log commands.
#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// Capture a log buffer for a while and save it
    Capture {
        /// Buffer to read
        #[arg(short, long, value_enum, default_value = "main")]
        buffer: LogBufferArg,

        /// Seconds to capture (defaults to logs.capture_secs)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Output file (defaults to android_logs_<timestamp>.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Echo lines while capturing
        #[arg(long)]
        echo: bool,
    },

    /// Analyze a saved log file
    Analyze {
        /// Log file
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Search a saved log file
    Search {
        /// Log file
        file: PathBuf,

        /// Case-insensitive text to look for
        query: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Stream the live log with keyword highlighting
    Monitor {
        /// Seconds to monitor (defaults to logs.monitor_secs)
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Summarize security events, user activity and state changes
    Report {
        /// Log file
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

/// Backup commands.
#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Back up device data into a new folder or zip
    Create {
        /// Sections to include (repeatable)
        #[arg(long = "section", value_enum, conflicts_with = "full")]
        sections: Vec<BackupSectionArg>,

        /// Include every section
        #[arg(long)]
        full: bool,

        /// Keep the backup as a folder even if backup.compress is set
        #[arg(long)]
        no_compress: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run `adb backup` for every package
    Adb,

    /// List backups in the backup location
    List {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Remove old backups created by droidbridge
    Prune {
        /// Backups to keep (defaults to backup.keep_versions)
        #[arg(short, long)]
        keep: Option<usize>,

        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Extract the tar payload of an unencrypted `.ab` file
    Convert {
        /// Android backup file
        file: PathBuf,
    },
}

/// Journal commands.
#[derive(Debug, Subcommand)]
pub enum JournalCommand {
    /// Show recent operations
    List {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only operations on this device
        #[arg(short, long)]
        device: Option<String>,

        /// Show past scans of --device instead of operations
        #[arg(long, requires = "device")]
        scans: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show journal statistics
    Stats {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Remove old journal entries
    Prune {
        /// Keep only this many recent operations
        #[arg(long)]
        keep: Option<usize>,

        /// Remove entries older than this many days
        #[arg(long)]
        older_than_days: Option<u32>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Print one value by dotted key, e.g. `backup.keep_versions`
    Get {
        /// Dotted key
        key: String,
    },

    /// Set one value by dotted key and save
    Set {
        /// Dotted key
        key: String,

        /// TOML value (bare strings are accepted)
        value: String,
    },

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write the current configuration to a file
    Export {
        /// Destination file
        file: PathBuf,
    },

    /// Merge settings from a file and save
    Import {
        /// Source file
        file: PathBuf,
    },
}

/// Log buffer argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogBufferArg {
    /// Main application log
    Main,
    /// Event log
    Events,
    /// System services
    System,
    /// Telephony
    Radio,
    /// Crash dumps
    Crash,
    /// Kernel messages (dmesg)
    #[value(alias = "dmesg")]
    Kernel,
}

impl From<LogBufferArg> for LogBuffer {
    fn from(arg: LogBufferArg) -> Self {
        match arg {
            LogBufferArg::Main => Self::Main,
            LogBufferArg::Events => Self::Events,
            LogBufferArg::System => Self::System,
            LogBufferArg::Radio => Self::Radio,
            LogBufferArg::Crash => Self::Crash,
            LogBufferArg::Kernel => Self::Kernel,
        }
    }
}

/// Reboot target argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RebootModeArg {
    /// Normal boot
    #[value(alias = "normal")]
    System,
    /// Recovery console
    Recovery,
    /// Bootloader
    #[value(alias = "fastboot")]
    Bootloader,
    /// Recovery waiting for sideload
    Sideload,
    /// Samsung download mode
    Download,
}

impl From<RebootModeArg> for RebootMode {
    fn from(arg: RebootModeArg) -> Self {
        match arg {
            RebootModeArg::System => Self::System,
            RebootModeArg::Recovery => Self::Recovery,
            RebootModeArg::Bootloader => Self::Bootloader,
            RebootModeArg::Sideload => Self::Sideload,
            RebootModeArg::Download => Self::Download,
        }
    }
}

/// Backup section argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackupSectionArg {
    /// Contacts
    Contacts,
    /// Call history
    CallLog,
    /// Text messages
    Sms,
    /// Photos and videos
    Media,
    /// Music and recordings
    Audio,
    /// Documents and downloads
    Documents,
    /// User app APKs
    Apps,
    /// Device settings
    Settings,
}

impl From<BackupSectionArg> for BackupSection {
    fn from(arg: BackupSectionArg) -> Self {
        match arg {
            BackupSectionArg::Contacts => Self::Contacts,
            BackupSectionArg::CallLog => Self::CallLog,
            BackupSectionArg::Sms => Self::Sms,
            BackupSectionArg::Media => Self::Media,
            BackupSectionArg::Audio => Self::Audio,
            BackupSectionArg::Documents => Self::Documents,
            BackupSectionArg::Apps => Self::Apps,
            BackupSectionArg::Settings => Self::Settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_buffer_arg_conversion() {
        assert_eq!(LogBuffer::from(LogBufferArg::Main), LogBuffer::Main);
        assert_eq!(LogBuffer::from(LogBufferArg::Radio), LogBuffer::Radio);
        assert_eq!(LogBuffer::from(LogBufferArg::Kernel), LogBuffer::Kernel);
    }

    #[test]
    fn test_reboot_mode_arg_conversion() {
        assert_eq!(RebootMode::from(RebootModeArg::System), RebootMode::System);
        assert_eq!(
            RebootMode::from(RebootModeArg::Bootloader),
            RebootMode::Bootloader
        );
        assert_eq!(
            RebootMode::from(RebootModeArg::Download),
            RebootMode::Download
        );
    }

    #[test]
    fn test_backup_section_arg_covers_all() {
        let converted: Vec<BackupSection> = BackupSectionArg::value_variants()
            .iter()
            .map(|arg| BackupSection::from(*arg))
            .collect();
        assert_eq!(converted, BackupSection::ALL.to_vec());
    }

    #[test]
    fn test_value_aliases() {
        assert_eq!(
            LogBufferArg::from_str("dmesg", true).unwrap(),
            LogBufferArg::Kernel
        );
        assert_eq!(
            RebootModeArg::from_str("fastboot", true).unwrap(),
            RebootModeArg::Bootloader
        );
        assert_eq!(
            BackupSectionArg::from_str("call-log", true).unwrap(),
            BackupSectionArg::CallLog
        );
    }

    #[test]
    fn test_output_args_default() {
        assert!(!OutputArgs::default().json);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Set {
            key: "ui.colors".to_string(),
            value: "false".to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("ui.colors"));
    }
}
