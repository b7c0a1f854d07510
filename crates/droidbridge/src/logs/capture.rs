//! Streaming logcat and kernel logs from a device, and log files on disk.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Local, Utc};
use colored::{Color, Colorize};
use regex::Regex;
use tracing::{debug, info};

use crate::adb::{Adb, LineStream};
use crate::error::{Error, Result};

const SAVED_HEADER: &str = "Android Logs - ";

static HIGHLIGHT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(ERROR|FAILED|SUCCESS|authenticat|password|root|FATAL)").ok()
});

static SAVED_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*\d+: (.*)$").ok());

/// Log source on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogBuffer {
    /// Main application log.
    #[default]
    Main,
    /// Binary event log, rendered as text.
    Events,
    /// System services.
    System,
    /// Telephony.
    Radio,
    /// Crash dumps.
    Crash,
    /// Kernel ring buffer via `dmesg`.
    Kernel,
}

impl LogBuffer {
    /// The adb arguments that stream this buffer.
    #[must_use]
    pub fn args(self) -> Vec<&'static str> {
        match self {
            Self::Main => vec!["logcat", "-v", "time"],
            Self::Kernel => vec!["shell", "dmesg"],
            other => vec!["logcat", "-b", other.name(), "-v", "time"],
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Events => "events",
            Self::System => "system",
            Self::Radio => "radio",
            Self::Crash => "crash",
            Self::Kernel => "kernel",
        }
    }
}

impl fmt::Display for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogBuffer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "events" => Ok(Self::Events),
            "system" => Ok(Self::System),
            "radio" => Ok(Self::Radio),
            "crash" => Ok(Self::Crash),
            "kernel" | "dmesg" => Ok(Self::Kernel),
            other => Err(format!("unknown log buffer '{other}'")),
        }
    }
}

/// Read lines until `duration` elapses, the stream ends or Ctrl-C.
///
/// `on_line` sees every line as it arrives. Lines are kept only when
/// `keep` is set; the returned count covers every line.
///
/// # Errors
///
/// Returns an error if reading the stream fails.
pub async fn pump<F>(
    stream: &mut LineStream,
    duration: Duration,
    keep: bool,
    mut on_line: F,
) -> Result<(usize, Vec<String>)>
where
    F: FnMut(&str),
{
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    let mut count = 0;
    let mut kept = Vec::new();
    loop {
        tokio::select! {
            () = &mut deadline => {
                debug!("Capture duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Capture interrupted");
                break;
            }
            line = stream.next_line() => {
                let Some(line) = line? else {
                    debug!("Log stream ended");
                    break;
                };
                let line = line.trim_end();
                count += 1;
                on_line(line);
                if keep {
                    kept.push(line.to_string());
                }
            }
        }
    }
    stream.stop().await;
    Ok((count, kept))
}

/// Captures and monitors device logs.
#[derive(Debug, Clone)]
pub struct LogCapture {
    adb: Adb,
}

impl LogCapture {
    /// Create a capture over the given adb handle.
    #[must_use]
    pub fn new(adb: Adb) -> Self {
        Self { adb }
    }

    /// Collect lines from `buffer` for up to `duration`.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started or the stream fails.
    pub async fn capture<F>(&self, buffer: LogBuffer, duration: Duration, on_line: F) -> Result<Vec<String>>
    where
        F: FnMut(&str),
    {
        info!(%buffer, secs = duration.as_secs(), "Capturing logs");
        let mut stream = self.adb.stream(&buffer.args()).await?;
        let (_, lines) = pump(&mut stream, duration, true, on_line).await?;
        info!(count = lines.len(), "Captured log entries");
        Ok(lines)
    }

    /// Follow the main log for up to `duration` without keeping lines.
    ///
    /// Returns the number of lines seen.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started or the stream fails.
    pub async fn monitor<F>(&self, duration: Duration, on_line: F) -> Result<usize>
    where
        F: FnMut(&str),
    {
        let mut stream = self.adb.stream(&LogBuffer::Main.args()).await?;
        let (count, _) = pump(&mut stream, duration, false, on_line).await?;
        Ok(count)
    }
}

fn keyword_color(keyword: &str) -> Color {
    match keyword.to_ascii_lowercase().as_str() {
        "error" | "failed" => Color::Red,
        "success" => Color::Green,
        "authenticat" => Color::Yellow,
        "password" => Color::Cyan,
        "root" => Color::Magenta,
        _ => Color::Blue,
    }
}

/// Colour notable keywords in a log line.
///
/// Matching ignores case; the original spelling is kept.
#[must_use]
pub fn highlight(line: &str, colors: bool) -> String {
    let Some(regex) = HIGHLIGHT.as_ref().filter(|_| colors) else {
        return line.to_string();
    };
    regex
        .replace_all(line, |caps: &regex::Captures<'_>| {
            caps[0].color(keyword_color(&caps[0])).to_string()
        })
        .into_owned()
}

/// Default file name for saved logs.
#[must_use]
pub fn default_log_filename() -> String {
    format!("android_logs_{}.txt", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Write lines with a header and right-aligned line numbers.
///
/// # Errors
///
/// Returns [`Error::NoLogs`] if `lines` is empty, or an I/O error.
pub fn save_logs<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    use std::fmt::Write as _;

    if lines.is_empty() {
        return Err(Error::NoLogs);
    }

    let mut out = format!("{SAVED_HEADER}{}\n{}\n\n", Utc::now().to_rfc3339(), "=".repeat(80));
    for (i, line) in lines.iter().enumerate() {
        let _ = writeln!(out, "{:6}: {}", i + 1, line.as_ref());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, out)?;
    debug!(path = %path.display(), count = lines.len(), "Saved logs");
    Ok(())
}

/// Read a log file written by [`save_logs`] or a plain log.
///
/// Saved files lose their header and line numbers. Invalid UTF-8 is
/// replaced.
///
/// # Errors
///
/// Returns [`Error::NoLogs`] if the file has no lines, or an I/O error.
pub fn read_log_file(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let mut lines = text.lines();

    let saved = text.starts_with(SAVED_HEADER);
    let lines: Vec<String> = if saved {
        lines.next();
        lines.next();
        lines
            .skip_while(|l| l.is_empty())
            .map(|l| {
                SAVED_LINE
                    .as_ref()
                    .and_then(|re| re.captures(l))
                    .and_then(|c| c.get(1))
                    .map_or_else(|| l.to_string(), |m| m.as_str().to_string())
            })
            .collect()
    } else {
        lines.map(String::from).collect()
    };

    if lines.is_empty() {
        return Err(Error::NoLogs);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adb::fake::FakeAdb;
    use crate::adb::AdbExecutor;

    #[test]
    fn test_buffer_args() {
        assert_eq!(LogBuffer::Main.args(), vec!["logcat", "-v", "time"]);
        assert_eq!(
            LogBuffer::Radio.args(),
            vec!["logcat", "-b", "radio", "-v", "time"]
        );
        assert_eq!(LogBuffer::Kernel.args(), vec!["shell", "dmesg"]);
    }

    #[test]
    fn test_buffer_parse() {
        assert_eq!("EVENTS".parse::<LogBuffer>(), Ok(LogBuffer::Events));
        assert_eq!("dmesg".parse::<LogBuffer>(), Ok(LogBuffer::Kernel));
        assert!("bogus".parse::<LogBuffer>().is_err());
    }

    #[tokio::test]
    async fn test_capture_until_end_of_stream() {
        let fake = Arc::new(FakeAdb::new());
        fake.on(&["logcat", "-b", "system"], "line one\r\nline two\n");

        let capture = LogCapture::new(Adb::new(Arc::clone(&fake) as Arc<dyn AdbExecutor>));
        let mut seen = 0;
        let lines = capture
            .capture(LogBuffer::System, Duration::from_secs(5), |_| seen += 1)
            .await
            .unwrap();

        assert_eq!(lines, vec!["line one", "line two"]);
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_monitor_counts_without_keeping() {
        let fake = Arc::new(FakeAdb::new());
        fake.on(&["logcat"], "a\nb\nc\n");

        let capture = LogCapture::new(Adb::new(Arc::clone(&fake) as Arc<dyn AdbExecutor>));
        let count = capture
            .monitor(Duration::from_secs(5), |_| {})
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_pump_stops_at_deadline() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut stream = LineStream::from_reader(tokio::io::BufReader::new(reader));

        let (count, lines) = pump(&mut stream, Duration::from_millis(20), true, |_| {})
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_highlight_disabled() {
        assert_eq!(highlight("ERROR: root denied", false), "ERROR: root denied");
    }

    #[test]
    fn test_highlight_keeps_text() {
        colored::control::set_override(true);
        let out = highlight("auth FAILED for root", true);
        assert!(out.contains("FAILED"));
        assert!(out.contains("root"));
        assert!(out.contains('\u{1b}'));
    }

    #[test]
    fn test_keyword_colors() {
        assert_eq!(keyword_color("Error"), Color::Red);
        assert_eq!(keyword_color("success"), Color::Green);
        assert_eq!(keyword_color("FATAL"), Color::Blue);
    }

    #[test]
    fn test_default_log_filename() {
        let name = default_log_filename();
        assert!(name.starts_with("android_logs_"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.txt");
        let lines = vec!["first: entry", "  indented"];

        save_logs(&path, &lines).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Android Logs - "));
        assert!(text.contains(&"=".repeat(80)));
        assert!(text.contains("     1: first: entry"));

        assert_eq!(read_log_file(&path).unwrap(), vec!["first: entry", "  indented"]);
    }

    #[test]
    fn test_read_plain_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.log");
        std::fs::write(&path, "01-15 12:00:00.000 I/x: hi\nsecond\n").unwrap();

        assert_eq!(read_log_file(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_logs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        let none: Vec<String> = Vec::new();

        assert!(matches!(save_logs(&path, &none), Err(Error::NoLogs)));

        std::fs::write(&path, "").unwrap();
        assert!(matches!(read_log_file(&path), Err(Error::NoLogs)));
    }
}
