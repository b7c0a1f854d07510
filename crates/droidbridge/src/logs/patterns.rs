//! Built-in log classification patterns.
//!
//! Each pattern belongs to a [`LogCategory`]. All patterns match
//! case-insensitively.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category a log line can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// Security-relevant events.
    Security,
    /// Authentication and credential changes.
    Authentication,
    /// Errors and crashes.
    Errors,
    /// Network connectivity.
    Network,
}

impl LogCategory {
    /// All categories in classification order.
    pub const ALL: [Self; 4] = [
        Self::Security,
        Self::Authentication,
        Self::Errors,
        Self::Network,
    ];
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Security => write!(f, "security"),
            Self::Authentication => write!(f, "authentication"),
            Self::Errors => write!(f, "errors"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A compiled log pattern.
#[derive(Debug, Clone)]
pub struct LogPattern {
    /// Category the pattern classifies into.
    pub category: LogCategory,

    /// What a match means.
    pub description: String,

    regex: Regex,
}

impl LogPattern {
    /// Compile a case-insensitive pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the regex does not compile.
    pub fn new(category: LogCategory, description: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){pattern}")).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            category,
            description: description.into(),
            regex,
        })
    }

    /// The source pattern without the case-insensitivity flag.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str().trim_start_matches("(?i)")
    }

    /// Check if the line matches this pattern.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

const BUILTIN: &[(LogCategory, &str, &str)] = &[
    // Security
    (
        LogCategory::Security,
        "Failed authentication attempts",
        r"(FAILED|invalid|wrong|incorrect).*(password|pin|pattern)",
    ),
    (
        LogCategory::Security,
        "Failed biometric authentication",
        r"Biometric.*(FAILED|REJECTED)",
    ),
    (
        LogCategory::Security,
        "FRP related events",
        r"FRP.*(lock|protection|verify)",
    ),
    (
        LogCategory::Security,
        "Root access attempts",
        r"(root|su|magisk|superuser)",
    ),
    (
        LogCategory::Security,
        "ADB activities",
        r"(adb|debugging).*(enabled|connected)",
    ),
    (
        LogCategory::Security,
        "Permission violations",
        r"(permission denied|security exception)",
    ),
    (
        LogCategory::Security,
        "Lock screen activities",
        r"(lock screen|keyguard).*(unlock|bypass)",
    ),
    (
        LogCategory::Security,
        "Factory reset attempts",
        r"(factory.*reset|wipe.*data)",
    ),
    (
        LogCategory::Security,
        "Bootloader activities",
        r"(bootloader|fastboot).*(unlock|lock)",
    ),
    // Authentication
    (
        LogCategory::Authentication,
        "Authentication results",
        r"(authenticat|auth).*(success|failed)",
    ),
    (
        LogCategory::Authentication,
        "Credential changes",
        r"(password|pin|pattern).*(set|change|remove)",
    ),
    (
        LogCategory::Authentication,
        "Smart Lock activities",
        r"TrustAgentService",
    ),
    (
        LogCategory::Authentication,
        "Biometric services",
        r"FaceService|FingerprintService",
    ),
    // Errors
    (LogCategory::Errors, "Critical errors", r"ERROR|CRITICAL|FATAL"),
    (
        LogCategory::Errors,
        "Java exceptions",
        r"Exception|RuntimeException",
    ),
    (
        LogCategory::Errors,
        "App not responding",
        r"ANR.*(Application Not Responding)",
    ),
    (LogCategory::Errors, "Boot failures", r"boot.*(fail|error)"),
    // Network
    (
        LogCategory::Network,
        "Network connections",
        r"(wifi|bluetooth).*(connect|disconnect)",
    ),
    (
        LogCategory::Network,
        "Network addressing",
        r"(ip address|mac address)",
    ),
    (
        LogCategory::Network,
        "VPN/Proxy activities",
        r"(vpn|proxy).*(connect|disconnect)",
    ),
];

/// Patterns whose hits are called out as notable findings.
pub const NOTABLE_PATTERNS: &[&str] = &[
    r"FAILED.*password",
    r"root.*access",
    r"factory.*reset",
    r"bootloader.*unlock",
    r"FRP.*lock",
];

/// Get all built-in patterns.
#[must_use]
pub fn builtin_patterns() -> Vec<LogPattern> {
    BUILTIN
        .iter()
        .filter_map(|(category, description, pattern)| {
            LogPattern::new(*category, *description, pattern).ok()
        })
        .collect()
}

/// Compile user-supplied security patterns.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] for the first pattern that fails.
pub fn custom_security_patterns(patterns: &[String]) -> Result<Vec<LogPattern>> {
    patterns
        .iter()
        .map(|p| LogPattern::new(LogCategory::Security, "Custom pattern", p))
        .collect()
}
