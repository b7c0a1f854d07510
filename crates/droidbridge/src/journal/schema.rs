//! `SQLite` schema definitions for the operation journal.

/// SQL statement to create the operations table.
pub const CREATE_OPERATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    serial TEXT,
    operation TEXT NOT NULL,
    outcome TEXT NOT NULL,
    detail TEXT
)
";

/// SQL statement to index operations by time.
pub const CREATE_OPERATIONS_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_operations_timestamp ON operations(timestamp DESC)
";

/// SQL statement to index operations by device.
pub const CREATE_OPERATIONS_SERIAL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_operations_serial ON operations(serial)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the device scan history table (schema v2).
pub const CREATE_SCANS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    serial TEXT NOT NULL,
    model TEXT,
    android_version TEXT,
    report TEXT NOT NULL
)
";

/// SQL statement to index scans by device and time (schema v2).
pub const CREATE_SCANS_SERIAL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_scans_serial ON scans(serial, timestamp DESC)
";

/// Base schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_OPERATIONS_TABLE,
    CREATE_OPERATIONS_TIMESTAMP_INDEX,
    CREATE_OPERATIONS_SERIAL_INDEX,
    CREATE_METADATA_TABLE,
];
