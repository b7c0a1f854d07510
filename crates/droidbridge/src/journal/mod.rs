//! Operation journal.
//!
//! This module provides `SQLite`-based persistent storage for an audit trail
//! of device operations and the history of device scan reports.

pub mod migrations;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::scanner::DeviceReport;

/// Result of a journalled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The operation completed.
    Success,
    /// The operation failed.
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(Error::DatabaseMigration {
                message: format!("unknown outcome '{other}'"),
            }),
        }
    }
}

/// One entry in the operation audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Row id, `None` until stored.
    pub id: Option<i64>,
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Target device, if the operation had one.
    pub serial: Option<String>,
    /// Operation name, e.g. `backup.create`.
    pub operation: String,
    /// Whether it succeeded.
    pub outcome: Outcome,
    /// Free-form detail such as a path or error message.
    pub detail: Option<String>,
}

impl OperationRecord {
    /// A successful operation timestamped now.
    #[must_use]
    pub fn success(operation: impl Into<String>, serial: Option<&str>) -> Self {
        Self::new(operation, serial, Outcome::Success)
    }

    /// A failed operation timestamped now.
    #[must_use]
    pub fn failure(operation: impl Into<String>, serial: Option<&str>) -> Self {
        Self::new(operation, serial, Outcome::Failure)
    }

    fn new(operation: impl Into<String>, serial: Option<&str>, outcome: Outcome) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            serial: serial.map(str::to_string),
            operation: operation.into(),
            outcome,
            detail: None,
        }
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A stored device scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Row id.
    pub id: i64,
    /// When the scan was recorded.
    pub timestamp: DateTime<Utc>,
    /// The full report.
    pub report: DeviceReport,
}

/// Persistent audit trail of operations and scans.
#[derive(Debug)]
pub struct Journal {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Journal {
    /// Open or create a journal database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening journal at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Journal opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory journal for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an operation, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record(&self, record: &OperationRecord) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO operations (timestamp, serial, operation, outcome, detail)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                record.timestamp.to_rfc3339(),
                record.serial,
                record.operation,
                record.outcome.to_string(),
                record.detail,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, operation = %record.operation, outcome = %record.outcome, "Recorded operation");
        Ok(id)
    }

    /// The most recent operations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<OperationRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, timestamp, serial, operation, outcome, detail
            FROM operations ORDER BY timestamp DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map([limit_i64], Self::row_to_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// The most recent operations on one device, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn for_device(&self, serial: &str, limit: usize) -> Result<Vec<OperationRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, timestamp, serial, operation, outcome, detail
            FROM operations WHERE serial = ?1
            ORDER BY timestamp DESC, id DESC LIMIT ?2
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![serial, limit_i64], Self::row_to_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Store a device scan report, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized or stored.
    pub fn record_scan(&self, report: &DeviceReport) -> Result<i64> {
        let json = serde_json::to_string(report)?;
        self.conn.execute(
            r"
            INSERT INTO scans (timestamp, serial, model, android_version, report)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                report.scanned_at.to_rfc3339(),
                report.serial,
                report.properties.model,
                report.properties.android_version,
                json,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, serial = %report.serial, "Recorded scan");
        Ok(id)
    }

    /// Past scans of one device, newest first.
    ///
    /// Rows whose stored report no longer parses are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn scans_for(&self, serial: &str, limit: usize) -> Result<Vec<ScanRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, timestamp, report
            FROM scans WHERE serial = ?1
            ORDER BY timestamp DESC, id DESC LIMIT ?2
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![serial, limit_i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let scans = rows
            .into_iter()
            .filter_map(|(id, timestamp, json)| match serde_json::from_str(&json) {
                Ok(report) => Some(ScanRecord {
                    id,
                    timestamp: parse_timestamp(&timestamp),
                    report,
                }),
                Err(e) => {
                    warn!(id, "Skipping unreadable scan report: {}", e);
                    None
                }
            })
            .collect();

        Ok(scans)
    }

    /// Count stored operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove operations and scans older than `max_age`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();

        let operations = self
            .conn
            .execute("DELETE FROM operations WHERE timestamp < ?1", [&cutoff])?;
        let scans = self
            .conn
            .execute("DELETE FROM scans WHERE timestamp < ?1", [&cutoff])?;

        let affected = operations + scans;
        if affected > 0 {
            info!("Pruned {} old journal entries", affected);
        }
        Ok(affected)
    }

    /// Keep only the most recent `keep_count` operations.
    ///
    /// Returns the number of operations deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep_count).unwrap_or(i64::MAX);
        let affected = self.conn.execute(
            r"
            DELETE FROM operations WHERE id NOT IN (
                SELECT id FROM operations ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            info!("Pruned {} operations to keep {} recent", affected, keep_count);
        }
        Ok(affected)
    }

    /// Get journal statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<JournalStats> {
        let total_operations = self.count()?;
        let failed_operations: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM operations WHERE outcome = 'failure'",
            [],
            |row| row.get(0),
        )?;
        let total_scans: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))?;
        let devices: i64 = self.conn.query_row(
            r"
            SELECT COUNT(DISTINCT serial) FROM (
                SELECT serial FROM operations WHERE serial IS NOT NULL
                UNION SELECT serial FROM scans
            )
            ",
            [],
            |row| row.get(0),
        )?;

        let oldest: Option<String> = self
            .conn
            .query_row(
                "SELECT timestamp FROM operations ORDER BY timestamp ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT timestamp FROM operations ORDER BY timestamp DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(JournalStats {
            total_operations,
            failed_operations,
            total_scans,
            devices,
            oldest_operation: oldest.as_deref().map(parse_timestamp),
            newest_operation: newest.as_deref().map(parse_timestamp),
            db_size_bytes,
        })
    }

    fn row_to_operation(row: &rusqlite::Row) -> rusqlite::Result<OperationRecord> {
        let id: i64 = row.get(0)?;
        let timestamp: String = row.get(1)?;
        let outcome: String = row.get(4)?;

        let outcome = outcome.parse().unwrap_or_else(|_| {
            warn!("Unknown outcome: {}, defaulting to failure", outcome);
            Outcome::Failure
        });

        Ok(OperationRecord {
            id: Some(id),
            timestamp: parse_timestamp(&timestamp),
            serial: row.get(2)?,
            operation: row.get(3)?,
            outcome,
            detail: row.get(5)?,
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// Statistics about the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalStats {
    /// Operations stored.
    pub total_operations: i64,
    /// Operations that failed.
    pub failed_operations: i64,
    /// Scan reports stored.
    pub total_scans: i64,
    /// Distinct device serials seen.
    pub devices: i64,
    /// Timestamp of the oldest operation.
    pub oldest_operation: Option<DateTime<Utc>>,
    /// Timestamp of the newest operation.
    pub newest_operation: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::scanner::{DeviceProperties, LockStatus};

    fn create_test_journal() -> Journal {
        Journal::open_in_memory().expect("failed to create test journal")
    }

    fn report(serial: &str, model: &str) -> DeviceReport {
        DeviceReport {
            serial: serial.to_string(),
            scanned_at: Utc::now(),
            properties: DeviceProperties {
                model: Some(model.to_string()),
                android_version: Some("14".to_string()),
                ..DeviceProperties::default()
            },
            lock_status: LockStatus::Swipe,
            usb_debugging: true,
            rooted: false,
            storage: None,
            battery: BTreeMap::new(),
        }
    }

    #[test]
    fn test_record_and_recent() {
        let journal = create_test_journal();
        journal
            .record(&OperationRecord::success("devices", None))
            .unwrap();
        journal
            .record(
                &OperationRecord::failure("backup.create", Some("ABC123"))
                    .with_detail("no space left"),
            )
            .unwrap();

        let recent = journal.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, "backup.create");
        assert_eq!(recent[0].outcome, Outcome::Failure);
        assert_eq!(recent[0].detail.as_deref(), Some("no space left"));
        assert_eq!(recent[1].serial, None);
        assert!(recent.iter().all(|r| r.id.is_some()));
    }

    #[test]
    fn test_recent_with_zero_limit() {
        let journal = create_test_journal();
        journal.record(&OperationRecord::success("info", None)).unwrap();
        assert!(journal.recent(0).unwrap().is_empty());
    }

    #[test]
    fn test_for_device() {
        let journal = create_test_journal();
        journal
            .record(&OperationRecord::success("reboot", Some("AAA")))
            .unwrap();
        journal
            .record(&OperationRecord::success("pull", Some("BBB")))
            .unwrap();
        journal
            .record(&OperationRecord::success("push", Some("AAA")))
            .unwrap();

        let aaa = journal.for_device("AAA", 10).unwrap();
        assert_eq!(aaa.len(), 2);
        assert_eq!(aaa[0].operation, "push");
        assert!(journal.for_device("CCC", 10).unwrap().is_empty());
    }

    #[test]
    fn test_record_scan_and_history() {
        let journal = create_test_journal();
        journal.record_scan(&report("AAA", "Pixel 7")).unwrap();
        journal.record_scan(&report("AAA", "Pixel 7")).unwrap();
        journal.record_scan(&report("BBB", "Galaxy S21")).unwrap();

        let scans = journal.scans_for("AAA", 10).unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].report.properties.model.as_deref(), Some("Pixel 7"));
        assert!(scans[0].id > scans[1].id);
        assert_eq!(journal.scans_for("AAA", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_scans_for_skips_corrupt_rows() {
        let journal = create_test_journal();
        journal.record_scan(&report("AAA", "Pixel 7")).unwrap();
        journal
            .conn
            .execute(
                "INSERT INTO scans (timestamp, serial, report) VALUES (?1, 'AAA', 'not json')",
                [Utc::now().to_rfc3339()],
            )
            .unwrap();

        assert_eq!(journal.scans_for("AAA", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_prune_keep_recent() {
        let journal = create_test_journal();
        for i in 0..10 {
            journal
                .record(&OperationRecord::success(format!("op{i}"), None))
                .unwrap();
        }

        assert_eq!(journal.prune_keep_recent(4).unwrap(), 6);
        assert_eq!(journal.count().unwrap(), 4);
        assert_eq!(journal.recent(1).unwrap()[0].operation, "op9");
        assert_eq!(journal.prune_keep_recent(10).unwrap(), 0);
    }

    #[test]
    fn test_prune_older_than() {
        let journal = create_test_journal();
        let mut old = OperationRecord::success("scan", Some("AAA"));
        old.timestamp = Utc::now() - Duration::days(40);
        journal.record(&old).unwrap();
        journal.record(&OperationRecord::success("scan", Some("AAA"))).unwrap();

        let mut old_scan = report("AAA", "Pixel 7");
        old_scan.scanned_at = Utc::now() - Duration::days(40);
        journal.record_scan(&old_scan).unwrap();

        assert_eq!(journal.prune_older_than(Duration::days(30)).unwrap(), 2);
        assert_eq!(journal.count().unwrap(), 1);
        assert!(journal.scans_for("AAA", 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats_empty() {
        let stats = create_test_journal().stats().unwrap();
        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.devices, 0);
        assert!(stats.oldest_operation.is_none());
        assert!(stats.newest_operation.is_none());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_stats_with_data() {
        let journal = create_test_journal();
        journal
            .record(&OperationRecord::success("reboot", Some("AAA")))
            .unwrap();
        journal
            .record(&OperationRecord::failure("pull", Some("BBB")))
            .unwrap();
        journal.record(&OperationRecord::success("devices", None)).unwrap();
        journal.record_scan(&report("CCC", "Pixel 8")).unwrap();

        let stats = journal.stats().unwrap();
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.failed_operations, 1);
        assert_eq!(stats.total_scans, 1);
        assert_eq!(stats.devices, 3);
        assert!(stats.oldest_operation <= stats.newest_operation);
    }

    #[test]
    fn test_outcome_round_trip_and_unknown() {
        assert_eq!("success".parse::<Outcome>().unwrap(), Outcome::Success);
        assert!("maybe".parse::<Outcome>().is_err());

        let journal = create_test_journal();
        journal
            .conn
            .execute(
                "INSERT INTO operations (timestamp, operation, outcome) VALUES (?1, 'x', 'maybe')",
                [Utc::now().to_rfc3339()],
            )
            .unwrap();
        assert_eq!(journal.recent(1).unwrap()[0].outcome, Outcome::Failure);
    }

    #[test]
    fn test_open_file_based_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/journal.db");

        let journal = Journal::open(&db_path).unwrap();
        journal.record(&OperationRecord::success("info", None)).unwrap();
        assert_eq!(journal.path(), db_path);
        assert!(db_path.exists());
        assert!(journal.stats().unwrap().db_size_bytes > 0);
        drop(journal);

        let reopened = Journal::open(&db_path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn test_path_in_memory() {
        assert_eq!(create_test_journal().path().to_string_lossy(), ":memory:");
    }
}
