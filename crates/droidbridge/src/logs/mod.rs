//! Device log capture and analysis.
//!
//! Logs are streamed from `logcat` or `dmesg` through [`LogCapture`], kept
//! as plain lines, and classified by [`LogAnalyzer`] into security,
//! authentication, error and network matches.

mod analyzer;
mod capture;
mod patterns;

pub use analyzer::{
    event_report, extract_timestamp, search, Analysis, AnalysisSummary, CategoryMatch,
    EventReport, EventSummary, LabelledLine, LogAnalyzer, NotableFinding, RiskLevel, SearchHit,
    SecurityIssue, TimelineEntry, TimelineEvent,
};
pub use capture::{
    default_log_filename, highlight, pump, read_log_file, save_logs, LogBuffer, LogCapture,
};
pub use patterns::{builtin_patterns, custom_security_patterns, LogCategory, LogPattern};
