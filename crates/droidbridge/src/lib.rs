//! `droidbridge` - Android device management over ADB
//!
//! This library drives the `adb` executable to inventory attached devices,
//! capture and analyze their logs, back up user data to the local machine
//! and keep an audit journal of what was done.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod adb;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod journal;
pub mod logging;
pub mod logs;
pub mod scanner;

pub use adb::{Adb, AdbClient, AdbExecutor, CommandOutput, DeviceEntry, DeviceState, RebootMode};
pub use backup::{BackupManifest, BackupOutcome, BackupSection, BackupTool};
pub use config::Config;
pub use error::{Error, Result};
pub use journal::{Journal, JournalStats, OperationRecord, Outcome};
pub use logging::init_logging;
pub use logs::{LogAnalyzer, LogBuffer, LogCapture};
pub use scanner::{DeviceReport, DeviceScanner, ScanReport};
