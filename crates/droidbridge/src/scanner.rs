//! Device inventory.
//!
//! [`DeviceScanner`] walks every authorized device and collects build
//! properties, lock screen type, USB debugging and root state, `/data`
//! usage and battery status into a serializable [`ScanReport`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adb::{Adb, DeviceEntry, DeviceState};
use crate::error::Result;

/// Labelled properties shown by `droidbridge info`.
const INFO_PROPERTIES: &[(&str, &str)] = &[
    ("Model", "ro.product.model"),
    ("Android Version", "ro.build.version.release"),
    ("Security Patch", "ro.build.version.security_patch"),
    ("Manufacturer", "ro.product.manufacturer"),
    ("Serial Number", "ro.serialno"),
    ("Bootloader", "ro.bootloader"),
    ("Hardware", "ro.hardware"),
];

/// Screen lock type inferred from `dumpsys trust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Pattern lock.
    #[serde(rename = "pattern")]
    Pattern,
    /// PIN or password.
    #[serde(rename = "pin/password")]
    PinOrPassword,
    /// Secure keyguard of an unrecognized kind.
    #[serde(rename = "secure")]
    Secure,
    /// Swipe only.
    #[serde(rename = "swipe")]
    Swipe,
    /// Could not be determined.
    #[serde(rename = "unknown")]
    Unknown,
}

impl LockStatus {
    /// Whether a credential is required to unlock.
    #[must_use]
    pub fn is_locked(self) -> bool {
        !matches!(self, Self::Swipe | Self::Unknown)
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pattern => "pattern",
            Self::PinOrPassword => "pin/password",
            Self::Secure => "secure",
            Self::Swipe => "swipe",
            Self::Unknown => "unknown",
        })
    }
}

/// Infer the lock type from `dumpsys trust` output.
#[must_use]
pub fn parse_lock_status(dumpsys: &str) -> LockStatus {
    if dumpsys.contains("TrustAgentService") && dumpsys.contains("FLAG_KEYGUARD_SECURE") {
        let lower = dumpsys.to_ascii_lowercase();
        if dumpsys.contains("LockPatternUtils.Pattern") {
            return LockStatus::Pattern;
        }
        if lower.contains("pin") || lower.contains("password") {
            return LockStatus::PinOrPassword;
        }
        return LockStatus::Secure;
    }
    if dumpsys.contains("FLAG_KEYGUARD") && !dumpsys.contains("SECURE") {
        return LockStatus::Swipe;
    }
    LockStatus::Unknown
}

/// Usage of the `/data` partition as reported by `df`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Partition size.
    pub total: String,
    /// Space used.
    pub used: String,
    /// Space available.
    pub available: String,
    /// Usage percentage, e.g. `42%`.
    pub usage_percent: String,
}

/// Parse `df /data`; needs a data row with at least five columns.
#[must_use]
pub fn parse_df(output: &str) -> Option<StorageInfo> {
    let row = output.trim().lines().nth(1)?;
    let cols: Vec<&str> = row.split_whitespace().collect();
    if cols.len() < 5 {
        return None;
    }
    Some(StorageInfo {
        total: cols[1].to_string(),
        used: cols[2].to_string(),
        available: cols[3].to_string(),
        usage_percent: cols[4].to_string(),
    })
}

/// Parse `dumpsys battery` into `key: value` pairs.
///
/// Keys are lowercased with spaces replaced by underscores.
#[must_use]
pub fn parse_battery(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            (
                key.trim().to_lowercase().replace(' ', "_"),
                value.trim().to_string(),
            )
        })
        .collect()
}

/// Build properties read through `getprop`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    /// `ro.product.model`
    pub model: Option<String>,
    /// `ro.product.brand`
    pub brand: Option<String>,
    /// `ro.product.manufacturer`
    pub manufacturer: Option<String>,
    /// `ro.product.device`
    pub device: Option<String>,
    /// `ro.build.version.release`
    pub android_version: Option<String>,
    /// `ro.build.version.sdk`
    pub api_level: Option<String>,
    /// `ro.build.version.security_patch`
    pub security_patch: Option<String>,
    /// `ro.build.id`
    pub build_id: Option<String>,
    /// `ro.build.type`
    pub build_type: Option<String>,
}

impl DeviceProperties {
    /// Read every property from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be run.
    pub async fn fetch(adb: &Adb) -> Result<Self> {
        Ok(Self {
            model: adb.getprop("ro.product.model").await?,
            brand: adb.getprop("ro.product.brand").await?,
            manufacturer: adb.getprop("ro.product.manufacturer").await?,
            device: adb.getprop("ro.product.device").await?,
            android_version: adb.getprop("ro.build.version.release").await?,
            api_level: adb.getprop("ro.build.version.sdk").await?,
            security_patch: adb.getprop("ro.build.version.security_patch").await?,
            build_id: adb.getprop("ro.build.id").await?,
            build_type: adb.getprop("ro.build.type").await?,
        })
    }
}

/// Everything collected about one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Device serial.
    pub serial: String,
    /// When the device was scanned.
    pub scanned_at: DateTime<Utc>,
    /// Build properties.
    pub properties: DeviceProperties,
    /// Lock screen type.
    pub lock_status: LockStatus,
    /// `settings get global adb_enabled` is 1.
    pub usb_debugging: bool,
    /// `su` is usable from the shell.
    pub rooted: bool,
    /// `/data` usage, when `df` could be parsed.
    pub storage: Option<StorageInfo>,
    /// `dumpsys battery` fields.
    pub battery: BTreeMap<String, String>,
}

/// Aggregate counts over a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Devices with a credential lock.
    pub locked_devices: usize,
    /// Devices with swipe or unknown lock.
    pub unlocked_devices: usize,
    /// Devices where `su` works.
    pub rooted_devices: usize,
    /// Devices with USB debugging enabled.
    pub debugging_enabled: usize,
    /// Device count per Android version.
    pub android_versions: BTreeMap<String, usize>,
    /// Device count per manufacturer.
    pub manufacturers: BTreeMap<String, usize>,
}

impl ScanSummary {
    /// Summarize a set of device reports.
    #[must_use]
    pub fn from_reports(reports: &[DeviceReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            if report.lock_status.is_locked() {
                summary.locked_devices += 1;
            } else {
                summary.unlocked_devices += 1;
            }
            if report.rooted {
                summary.rooted_devices += 1;
            }
            if report.usb_debugging {
                summary.debugging_enabled += 1;
            }
            let version = report
                .properties
                .android_version
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            *summary.android_versions.entry(version).or_default() += 1;
            let manufacturer = report
                .properties
                .manufacturer
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            *summary.manufacturers.entry(manufacturer).or_default() += 1;
        }
        summary
    }
}

/// Result of scanning every attached device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// When the scan started.
    pub scanned_at: DateTime<Utc>,
    /// Number of devices scanned.
    pub total_devices: usize,
    /// Per-device reports.
    pub devices: Vec<DeviceReport>,
    /// Attached devices that were not in `device` state.
    pub skipped: Vec<DeviceEntry>,
    /// Aggregate counts.
    pub summary: ScanSummary,
}

/// Scans attached devices.
#[derive(Debug, Clone)]
pub struct DeviceScanner {
    adb: Adb,
}

impl DeviceScanner {
    /// Create a scanner over the given adb handle.
    #[must_use]
    pub fn new(adb: Adb) -> Self {
        Self { adb }
    }

    /// Scan every authorized device.
    ///
    /// When the handle targets a serial, only that device is scanned.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be run.
    pub async fn scan(&self) -> Result<ScanReport> {
        let scanned_at = Utc::now();
        let mut devices = Vec::new();
        let mut skipped = Vec::new();

        for entry in self.adb.devices().await? {
            if self.adb.serial().is_some_and(|s| s != entry.serial) {
                continue;
            }
            if entry.state != DeviceState::Device {
                warn!(serial = %entry.serial, state = %entry.state, "Skipping device");
                skipped.push(entry);
                continue;
            }
            devices.push(self.scan_device(&entry.serial).await?);
        }

        info!(count = devices.len(), "Scan complete");
        let summary = ScanSummary::from_reports(&devices);
        Ok(ScanReport {
            scanned_at,
            total_devices: devices.len(),
            devices,
            skipped,
            summary,
        })
    }

    /// Collect the report for one device.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be run.
    pub async fn scan_device(&self, serial: &str) -> Result<DeviceReport> {
        debug!(serial, "Scanning device");
        let adb = self.adb.with_serial(serial);

        let properties = DeviceProperties::fetch(&adb).await?;

        let trust = adb.shell(&["dumpsys", "trust"]).await?;
        let lock_status = if trust.is_success() {
            parse_lock_status(&trust.stdout)
        } else {
            LockStatus::Unknown
        };

        let adb_enabled = adb.shell(&["settings", "get", "global", "adb_enabled"]).await?;
        let usb_debugging = adb_enabled.is_success() && adb_enabled.text() == "1";

        let rooted = adb.is_rooted().await?;

        let df = adb.shell(&["df", "/data"]).await?;
        let storage = if df.is_success() {
            parse_df(&df.stdout)
        } else {
            None
        };

        let battery = adb.shell(&["dumpsys", "battery"]).await?;
        let battery = if battery.is_success() {
            parse_battery(&battery.stdout)
        } else {
            BTreeMap::new()
        };

        Ok(DeviceReport {
            serial: serial.to_string(),
            scanned_at: Utc::now(),
            properties,
            lock_status,
            usb_debugging,
            rooted,
            storage,
            battery,
        })
    }

    /// Labelled property table for the targeted device.
    ///
    /// Properties the device does not report are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be run.
    pub async fn device_info(&self) -> Result<Vec<(&'static str, String)>> {
        let mut info = Vec::with_capacity(INFO_PROPERTIES.len());
        for (label, prop) in INFO_PROPERTIES {
            if let Some(value) = self.adb.getprop(prop).await? {
                info.push((*label, value));
            }
        }
        Ok(info)
    }
}
