//! Device listing and reboot targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Connection state reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Connected and authorized.
    Device,
    /// Connected but not responding.
    Offline,
    /// Waiting for the user to accept the RSA key prompt.
    Unauthorized,
    /// Booted into recovery.
    Recovery,
    /// Waiting for `adb sideload`.
    Sideload,
    /// Booted into the bootloader.
    Bootloader,
    /// The host lacks USB permissions for the device.
    NoPermissions,
    /// Any other state string.
    Unknown(String),
}

impl DeviceState {
    fn parse(state: &str) -> Self {
        match state {
            "device" => Self::Device,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            "recovery" => Self::Recovery,
            "sideload" => Self::Sideload,
            "bootloader" => Self::Bootloader,
            "no" | "no permissions" => Self::NoPermissions,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Offline => write!(f, "offline"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Recovery => write!(f, "recovery"),
            Self::Sideload => write!(f, "sideload"),
            Self::Bootloader => write!(f, "bootloader"),
            Self::NoPermissions => write!(f, "no permissions"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// One line of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device serial number.
    pub serial: String,
    /// Connection state.
    pub state: DeviceState,
    /// `model:` attribute.
    pub model: Option<String>,
    /// `product:` attribute.
    pub product: Option<String>,
    /// `device:` attribute.
    pub device: Option<String>,
    /// `transport_id:` attribute.
    pub transport_id: Option<String>,
}

/// Parse the output of `adb devices` or `adb devices -l`.
///
/// The header line and daemon startup notices are skipped.
#[must_use]
pub fn parse_device_list(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<DeviceEntry> {
    let mut tokens = line.split_whitespace();
    let serial = tokens.next()?.to_string();
    let state = DeviceState::parse(tokens.next()?);

    let mut entry = DeviceEntry {
        serial,
        state,
        model: None,
        product: None,
        device: None,
        transport_id: None,
    };

    for token in tokens {
        match token.split_once(':') {
            Some(("model", v)) => entry.model = Some(v.to_string()),
            Some(("product", v)) => entry.product = Some(v.to_string()),
            Some(("device", v)) => entry.device = Some(v.to_string()),
            Some(("transport_id", v)) => entry.transport_id = Some(v.to_string()),
            // usb:, and the free text after "no permissions"
            _ => {}
        }
    }

    Some(entry)
}

/// Where to reboot a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootMode {
    /// Normal boot.
    #[default]
    System,
    /// Recovery console.
    Recovery,
    /// Bootloader (fastboot).
    Bootloader,
    /// Recovery waiting for `adb sideload`.
    Sideload,
    /// Samsung download mode.
    Download,
}

impl RebootMode {
    /// The argument passed to `adb reboot`, if any.
    #[must_use]
    pub fn target(self) -> Option<&'static str> {
        match self {
            Self::System => None,
            Self::Recovery => Some("recovery"),
            Self::Bootloader => Some("bootloader"),
            Self::Sideload => Some("sideload"),
            Self::Download => Some("download"),
        }
    }
}

impl fmt::Display for RebootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target().unwrap_or("system"))
    }
}

impl FromStr for RebootMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" | "normal" => Ok(Self::System),
            "recovery" => Ok(Self::Recovery),
            "bootloader" | "fastboot" => Ok(Self::Bootloader),
            "sideload" => Ok(Self::Sideload),
            "download" => Ok(Self::Download),
            other => Err(format!(
                "unknown reboot mode '{other}' (expected system, recovery, bootloader, fastboot, sideload or download)"
            )),
        }
    }
}
