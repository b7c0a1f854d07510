//! Log classification, search and event reports.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::patterns::{builtin_patterns, custom_security_patterns, LogCategory, LogPattern, NOTABLE_PATTERNS};
use crate::config::LogsConfig;
use crate::error::{Error, Result};

const TIMELINE_ENTRY_CHARS: usize = 100;
const SECURITY_ENTRY_CHARS: usize = 200;
const NOTABLE_ENTRY_CHARS: usize = 150;
const CONTEXT_LINES: usize = 2;
const BUSY_TIMELINE: usize = 100;

static TIMESTAMPS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})",
        r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})",
        r"(\d{2}/\d{2} \d{2}:\d{2}:\d{2})",
    ])
});

static NOTABLE: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&NOTABLE_PATTERNS.iter().map(|p| format!("(?i){p}")).collect::<Vec<_>>()));

static USER_ACTIVITY: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    labelled(&[
        (r"screen_(on|off)", "Screen state"),
        (r"user_(present|absent)", "User presence"),
        (r"keyguard_(shown|hidden)", "Lock screen"),
        (r"app_launch", "App launches"),
        (r"notification", "Notifications"),
    ])
});

static SECURITY_EVENTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    labelled(&[
        (r"authentication.*(success|fail)", "Authentication"),
        (r"password.*(set|change)", "Password change"),
        (r"factory_reset", "Factory reset"),
        (r"bootloader.*(unlock|lock)", "Bootloader"),
        (r"encryption.*(start|complete)", "Encryption"),
    ])
});

static STATE_CHANGES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    labelled(&[
        (r"battery.*(level|charging)", "Battery"),
        (r"wifi.*(enable|disable|connect)", "WiFi"),
        (r"bluetooth.*(on|off)", "Bluetooth"),
        (r"airplane.*mode", "Airplane mode"),
        (r"roaming.*(on|off)", "Roaming"),
    ])
});

fn compile<S: AsRef<str>>(patterns: &[S]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p.as_ref()).ok())
        .collect()
}

fn labelled(table: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .filter_map(|(p, label)| Regex::new(&format!("(?i){p}")).ok().map(|r| (r, *label)))
        .collect()
}

fn first_label<'a>(table: &'a [(Regex, &'static str)], line: &str) -> Option<&'a str> {
    table
        .iter()
        .find(|(regex, _)| regex.is_match(line))
        .map(|(_, label)| *label)
}

/// Keep at most `max` characters.
fn clip(line: &str, max: usize) -> String {
    line.chars().take(max).collect()
}

/// Extract the first recognized timestamp from a log line.
///
/// Recognizes `MM-DD HH:MM:SS.mmm`, `YYYY-MM-DD HH:MM:SS` and
/// `MM/DD HH:MM:SS`.
#[must_use]
pub fn extract_timestamp(line: &str) -> Option<&str> {
    TIMESTAMPS
        .iter()
        .find_map(|re| re.captures(line).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

/// Overall risk derived from the number of security matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// At or below the medium threshold.
    Low,
    /// Above the medium threshold.
    Medium,
    /// Above the high threshold.
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A line classified into a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMatch {
    /// 1-based line number.
    pub line: usize,
    /// The full log line.
    pub entry: String,
    /// The pattern that matched.
    pub pattern: String,
    /// What the pattern means.
    pub description: String,
}

/// A timestamped line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Timestamp as it appears in the line.
    pub time: String,
    /// The line, shortened.
    pub entry: String,
}

/// A security match, shortened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIssue {
    /// Description of the matching pattern.
    pub issue: String,
    /// The line, shortened.
    pub entry: String,
    /// 1-based line number.
    pub line: usize,
}

/// A match that also hits one of the notable patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotableFinding {
    /// The notable pattern.
    pub pattern: String,
    /// The line, shortened.
    pub entry: String,
    /// 1-based line number.
    pub line: usize,
}

/// Counts and conclusions of an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Matches across all categories.
    pub total_matches: usize,
    /// Matches per category.
    pub by_category: BTreeMap<LogCategory, usize>,
    /// Risk from the security match count.
    pub risk_level: RiskLevel,
    /// Notable findings.
    pub notable_findings: Vec<NotableFinding>,
}

/// Result of [`LogAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// When the analysis ran.
    pub analyzed_at: DateTime<Utc>,
    /// Number of input lines.
    pub total_entries: usize,
    /// Matches per category.
    pub categories: BTreeMap<LogCategory, Vec<CategoryMatch>>,
    /// Timestamped lines.
    pub timeline: Vec<TimelineEntry>,
    /// Security matches.
    pub security_issues: Vec<SecurityIssue>,
    /// Totals and risk.
    pub summary: AnalysisSummary,
}

/// A search hit with surrounding lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// 1-based line number.
    pub line: usize,
    /// The matching line.
    pub entry: String,
    /// Up to two lines either side, the hit marked with `> `.
    pub context: String,
}

/// A boot, shutdown, crash or ANR event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Timestamp as it appears in the line.
    pub timestamp: String,
    /// The line, shortened.
    pub event: String,
}

/// A labelled line from one of the event tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledLine {
    /// Which kind of event this is.
    pub kind: String,
    /// The line, shortened.
    pub line: String,
}

/// Counts in an [`EventReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Timeline events.
    pub total_timeline_events: usize,
    /// User activities.
    pub total_user_activities: usize,
    /// Security events.
    pub total_security_events: usize,
    /// Device state changes.
    pub total_state_changes: usize,
}

/// Chronology of device events extracted from a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReport {
    /// When the report was built.
    pub analyzed_at: DateTime<Utc>,
    /// Counts.
    pub summary: EventSummary,
    /// Boot, shutdown, crash and ANR lines.
    pub timeline: Vec<TimelineEvent>,
    /// Screen, presence, keyguard, launch and notification lines.
    pub user_activities: Vec<LabelledLine>,
    /// Authentication, credential, reset, bootloader and encryption lines.
    pub security_events: Vec<LabelledLine>,
    /// Battery, radio and mode changes.
    pub state_changes: Vec<LabelledLine>,
    /// Conclusions.
    pub findings: Vec<String>,
}

/// Classifies log lines against the built-in and configured patterns.
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    patterns: Vec<LogPattern>,
    medium_threshold: usize,
    high_threshold: usize,
}

impl Default for LogAnalyzer {
    fn default() -> Self {
        Self {
            patterns: builtin_patterns(),
            medium_threshold: 5,
            high_threshold: 20,
        }
    }
}

impl LogAnalyzer {
    /// Create an analyzer with the built-in patterns and default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer using configured thresholds and extra patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if a custom pattern is invalid.
    pub fn from_config(config: &LogsConfig) -> Result<Self> {
        let mut patterns = builtin_patterns();
        patterns.extend(custom_security_patterns(&config.custom_patterns)?);
        Ok(Self {
            patterns,
            medium_threshold: config.medium_risk_threshold,
            high_threshold: config.high_risk_threshold,
        })
    }

    /// Classify every line.
    ///
    /// A line counts at most once per category, under the first pattern
    /// that matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLogs`] if `lines` is empty.
    pub fn analyze<S: AsRef<str>>(&self, lines: &[S]) -> Result<Analysis> {
        if lines.is_empty() {
            return Err(Error::NoLogs);
        }

        let mut categories: BTreeMap<LogCategory, Vec<CategoryMatch>> = BTreeMap::new();
        let mut timeline = Vec::new();
        let mut security_issues = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            let number = index + 1;

            if let Some(time) = extract_timestamp(line) {
                let entry = if line.chars().count() > TIMELINE_ENTRY_CHARS {
                    format!("{}...", clip(line, TIMELINE_ENTRY_CHARS))
                } else {
                    line.to_string()
                };
                timeline.push(TimelineEntry {
                    time: time.to_string(),
                    entry,
                });
            }

            for category in LogCategory::ALL {
                let Some(pattern) = self
                    .patterns
                    .iter()
                    .filter(|p| p.category == category)
                    .find(|p| p.matches(line))
                else {
                    continue;
                };

                if category == LogCategory::Security {
                    security_issues.push(SecurityIssue {
                        issue: pattern.description.clone(),
                        entry: clip(line, SECURITY_ENTRY_CHARS),
                        line: number,
                    });
                }
                categories.entry(category).or_default().push(CategoryMatch {
                    line: number,
                    entry: line.to_string(),
                    pattern: pattern.pattern().to_string(),
                    description: pattern.description.clone(),
                });
            }
        }

        let summary = self.summarize(&categories);
        debug!(
            lines = lines.len(),
            matches = summary.total_matches,
            risk = %summary.risk_level,
            "Analyzed logs"
        );

        Ok(Analysis {
            analyzed_at: Utc::now(),
            total_entries: lines.len(),
            categories,
            timeline,
            security_issues,
            summary,
        })
    }

    fn summarize(&self, categories: &BTreeMap<LogCategory, Vec<CategoryMatch>>) -> AnalysisSummary {
        let by_category: BTreeMap<LogCategory, usize> =
            categories.iter().map(|(c, m)| (*c, m.len())).collect();
        let total_matches = by_category.values().sum();

        let security = by_category.get(&LogCategory::Security).copied().unwrap_or(0);
        let risk_level = if security > self.high_threshold {
            RiskLevel::High
        } else if security > self.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let notable_findings = categories
            .values()
            .flatten()
            .filter_map(|m| {
                NOTABLE
                    .iter()
                    .position(|re| re.is_match(&m.entry))
                    .map(|i| NotableFinding {
                        pattern: NOTABLE_PATTERNS[i].to_string(),
                        entry: clip(&m.entry, NOTABLE_ENTRY_CHARS),
                        line: m.line,
                    })
            })
            .collect();

        AnalysisSummary {
            total_matches,
            by_category,
            risk_level,
            notable_findings,
        }
    }
}

/// Find lines containing every whitespace-separated term of `query`.
///
/// Matching ignores case. An empty query matches nothing.
#[must_use]
pub fn search<S: AsRef<str>>(lines: &[S], query: &str) -> Vec<SearchHit> {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return Vec::new();
    }

    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let lower = line.as_ref().to_lowercase();
            terms.iter().all(|t| lower.contains(t.as_str()))
        })
        .map(|(index, line)| SearchHit {
            line: index + 1,
            entry: line.as_ref().to_string(),
            context: context(lines, index),
        })
        .collect()
}

fn context<S: AsRef<str>>(lines: &[S], index: usize) -> String {
    let start = index.saturating_sub(CONTEXT_LINES);
    let end = (index + CONTEXT_LINES + 1).min(lines.len());
    (start..end)
        .map(|i| {
            let marker = if i == index { "> " } else { "  " };
            format!("{marker}{}", lines[i].as_ref())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build a chronology of boot, user, security and state events.
///
/// # Errors
///
/// Returns [`Error::NoLogs`] if `lines` is empty.
pub fn event_report<S: AsRef<str>>(lines: &[S]) -> Result<EventReport> {
    if lines.is_empty() {
        return Err(Error::NoLogs);
    }

    let mut timeline = Vec::new();
    let mut user_activities = Vec::new();
    let mut security_events = Vec::new();
    let mut state_changes = Vec::new();

    for line in lines {
        let line = line.as_ref();

        if let Some(timestamp) = extract_timestamp(line) {
            if ["boot", "shutdown", "crash", "ANR"]
                .iter()
                .any(|k| line.contains(k))
            {
                timeline.push(TimelineEvent {
                    timestamp: timestamp.to_string(),
                    event: clip(line, 100),
                });
            }
        }
        if let Some(kind) = first_label(&USER_ACTIVITY, line) {
            user_activities.push(LabelledLine {
                kind: kind.to_string(),
                line: clip(line, 150),
            });
        }
        if let Some(kind) = first_label(&SECURITY_EVENTS, line) {
            security_events.push(LabelledLine {
                kind: kind.to_string(),
                line: clip(line, 200),
            });
        }
        if let Some(kind) = first_label(&STATE_CHANGES, line) {
            state_changes.push(LabelledLine {
                kind: kind.to_string(),
                line: clip(line, 150),
            });
        }
    }

    let mut findings = Vec::new();
    if !security_events.is_empty() {
        findings.push("Security events detected in logs".to_string());
    }
    if timeline.len() > BUSY_TIMELINE {
        findings.push("High number of system events".to_string());
    }
    if security_events
        .iter()
        .any(|e| e.line.to_lowercase().contains("factory_reset"))
    {
        findings.push("Factory reset activity detected".to_string());
    }

    Ok(EventReport {
        analyzed_at: Utc::now(),
        summary: EventSummary {
            total_timeline_events: timeline.len(),
            total_user_activities: user_activities.len(),
            total_security_events: security_events.len(),
            total_state_changes: state_changes.len(),
        },
        timeline,
        user_activities,
        security_events,
        state_changes,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn test_extract_timestamp_formats() {
        assert_eq!(
            extract_timestamp("01-15 12:30:45.123 I/ActivityManager: start"),
            Some("01-15 12:30:45.123")
        );
        assert_eq!(
            extract_timestamp("2024-01-15 12:30:45 kernel: boot"),
            Some("2024-01-15 12:30:45")
        );
        assert_eq!(extract_timestamp("01/15 12:30:45 x"), Some("01/15 12:30:45"));
        assert_eq!(extract_timestamp("no time here"), None);
    }

    #[test]
    fn test_analyze_empty_is_error() {
        let empty: Vec<String> = Vec::new();
        assert!(matches!(LogAnalyzer::new().analyze(&empty), Err(Error::NoLogs)));
    }

    #[test]
    fn test_analyze_one_match_per_category() {
        // Matches two security patterns but is counted once.
        let logs = lines("01-15 12:30:45.123 E/Keyguard: wrong password, root shell denied");
        let analysis = LogAnalyzer::new().analyze(&logs).unwrap();

        let security = &analysis.categories[&LogCategory::Security];
        assert_eq!(security.len(), 1);
        assert_eq!(security[0].description, "Failed authentication attempts");
        assert_eq!(security[0].line, 1);
        assert_eq!(analysis.security_issues.len(), 1);
        assert_eq!(analysis.timeline.len(), 1);
        assert_eq!(analysis.timeline[0].time, "01-15 12:30:45.123");
    }

    #[test]
    fn test_analyze_multiple_categories() {
        let logs = lines(
            "E/AndroidRuntime: FATAL EXCEPTION: main\n\
             I/WifiService: wifi connected to home\n\
             \n\
             D/Auth: authentication success",
        );
        let analysis = LogAnalyzer::new().analyze(&logs).unwrap();

        assert_eq!(analysis.total_entries, 4);
        assert_eq!(analysis.summary.by_category.get(&LogCategory::Errors), Some(&1));
        assert_eq!(analysis.summary.by_category.get(&LogCategory::Network), Some(&1));
        assert_eq!(
            analysis.summary.by_category.get(&LogCategory::Authentication),
            Some(&1)
        );
        assert_eq!(analysis.categories[&LogCategory::Network][0].line, 2);
        assert_eq!(analysis.summary.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_timeline_truncation() {
        let long = format!("01-15 12:30:45.123 I/Tag: {}", "x".repeat(200));
        let analysis = LogAnalyzer::new().analyze(&[long]).unwrap();
        let entry = &analysis.timeline[0].entry;
        assert!(entry.ends_with("..."));
        assert_eq!(entry.chars().count(), TIMELINE_ENTRY_CHARS + 3);
    }

    #[test]
    fn test_risk_levels() {
        let analyzer = LogAnalyzer::new();
        let six: Vec<String> = (0..6).map(|i| format!("permission denied {i}")).collect();
        assert_eq!(
            analyzer.analyze(&six).unwrap().summary.risk_level,
            RiskLevel::Medium
        );

        let five: Vec<String> = (0..5).map(|i| format!("permission denied {i}")).collect();
        assert_eq!(
            analyzer.analyze(&five).unwrap().summary.risk_level,
            RiskLevel::Low
        );

        let many: Vec<String> = (0..21).map(|i| format!("permission denied {i}")).collect();
        assert_eq!(
            analyzer.analyze(&many).unwrap().summary.risk_level,
            RiskLevel::High
        );
    }

    #[test]
    fn test_configured_thresholds_and_patterns() {
        let config = LogsConfig {
            medium_risk_threshold: 0,
            high_risk_threshold: 1,
            custom_patterns: vec!["usb.*attached".to_string()],
            ..LogsConfig::default()
        };
        let analyzer = LogAnalyzer::from_config(&config).unwrap();
        let analysis = analyzer.analyze(&lines("UsbHost: device attached")).unwrap();

        assert_eq!(analysis.security_issues[0].issue, "Custom pattern");
        assert_eq!(analysis.summary.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_notable_findings() {
        let logs = lines("Keyguard: FAILED password attempt 3");
        let analysis = LogAnalyzer::new().analyze(&logs).unwrap();

        let findings = &analysis.summary.notable_findings;
        assert!(!findings.is_empty());
        assert_eq!(findings[0].pattern, "FAILED.*password");
        assert_eq!(findings[0].line, 1);
    }

    #[test]
    fn test_search_all_terms_with_context() {
        let logs = lines("a\nb\nUSB connected fine\nc\nd\ne");
        let hits = search(&logs, "usb CONNECTED");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 3);
        assert_eq!(hits[0].context, "  a\n  b\n> USB connected fine\n  c\n  d");
    }

    #[test]
    fn test_search_context_at_edges() {
        let logs = lines("match here\nnext");
        let hits = search(&logs, "match");
        assert_eq!(hits[0].context, "> match here\n  next");
    }

    #[test]
    fn test_search_partial_terms_miss() {
        let logs = lines("usb attached");
        assert!(search(&logs, "usb connected").is_empty());
        assert!(search(&logs, "   ").is_empty());
    }

    #[test]
    fn test_event_report() {
        let logs = lines(
            "01-15 08:00:00.000 I/boot: boot completed\n\
             I/PowerManager: screen_on\n\
             I/RecoverySystem: factory_reset requested\n\
             I/BatteryService: battery level 50",
        );
        let report = event_report(&logs).unwrap();

        assert_eq!(report.summary.total_timeline_events, 1);
        assert_eq!(report.user_activities[0].kind, "Screen state");
        assert_eq!(report.security_events[0].kind, "Factory reset");
        assert_eq!(report.state_changes[0].kind, "Battery");
        assert_eq!(
            report.findings,
            vec![
                "Security events detected in logs".to_string(),
                "Factory reset activity detected".to_string()
            ]
        );
    }

    #[test]
    fn test_event_report_busy_timeline() {
        let logs: Vec<String> = (0..101)
            .map(|i| format!("01-15 08:00:{:02}.000 crash {i}", i % 60))
            .collect();
        let report = event_report(&logs).unwrap();
        assert_eq!(report.findings, vec!["High number of system events".to_string()]);
    }

    #[test]
    fn test_clip_is_char_safe() {
        assert_eq!(clip("héllo", 2), "hé");
    }
}
