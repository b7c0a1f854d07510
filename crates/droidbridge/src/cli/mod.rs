//! Command-line interface for droidbridge.
//!
//! This module provides the CLI structure for the `droidbridge` binary.
//! Handlers live in `main.rs`.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BackupCommand, BackupSectionArg, ConfigCommand, JournalCommand, LogBufferArg, LogsCommand,
    OutputArgs, PullCommand, PushCommand, RebootCommand, RebootModeArg, ShellCommand,
};

/// droidbridge - Manage Android devices over ADB
///
/// Inventory attached devices, capture and analyze logs, and back up
/// contacts, messages, media and apps to your computer.
#[derive(Debug, Parser)]
#[command(name = "droidbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Target device serial (overrides adb.serial)
    #[arg(short, long, global = true, value_name = "SERIAL")]
    pub serial: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List attached devices
    Devices(OutputArgs),

    /// Show basic properties of the target device
    Info(OutputArgs),

    /// Inventory every authorized device
    Scan(OutputArgs),

    /// Reboot the target device
    Reboot(RebootCommand),

    /// Copy a file to the device
    Push(PushCommand),

    /// Copy a file from the device
    Pull(PullCommand),

    /// Run a shell command on the device
    Shell(ShellCommand),

    /// Capture, search and analyze device logs
    #[command(subcommand)]
    Logs(LogsCommand),

    /// Create, list and prune backups
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Inspect the operation journal
    #[command(subcommand)]
    Journal(JournalCommand),

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

impl Command {
    /// Journal name of the operation, `None` for read-only local commands.
    #[must_use]
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Devices(_) => Some("devices"),
            Self::Info(_) => Some("info"),
            Self::Scan(_) => Some("scan"),
            Self::Reboot(_) => Some("reboot"),
            Self::Push(_) => Some("push"),
            Self::Pull(_) => Some("pull"),
            Self::Shell(_) => Some("shell"),
            Self::Logs(LogsCommand::Capture { .. }) => Some("logs.capture"),
            Self::Logs(LogsCommand::Monitor { .. }) => Some("logs.monitor"),
            Self::Backup(BackupCommand::Create { .. }) => Some("backup.create"),
            Self::Backup(BackupCommand::Adb) => Some("backup.adb"),
            Self::Backup(BackupCommand::Prune { dry_run: false, .. }) => Some("backup.prune"),
            Self::Logs(_) | Self::Backup(_) | Self::Journal(_) | Self::Config(_) => None,
        }
    }
}
