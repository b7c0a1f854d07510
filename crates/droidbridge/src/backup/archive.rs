//! Backup folders on disk: zipping, listing, sizing and pruning.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::{Error, Result};

/// Name prefixes of backups created by droidbridge.
const OWNED_PREFIXES: &[&str] = &["full_backup_", "selective_backup_", "adb_backup_"];

/// Extensions of backup files shown by [`list_backups`].
const BACKUP_EXTENSIONS: &[&str] = &["zip", "ab", "tar"];

/// Format a byte count as `"{:.2} {unit}"`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

/// Every regular file below `dir`, depth first, in name order.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            files.extend(walk_files(&path)?);
        } else if file_type.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Total size of the files below `dir`.
///
/// # Errors
///
/// Returns an error if the tree cannot be read.
pub fn dir_size(dir: &Path) -> Result<u64> {
    walk_files(dir)?
        .iter()
        .map(|f| -> Result<u64> { Ok(std::fs::metadata(f)?.len()) })
        .sum()
}

/// Zip `dir` next to itself as `<dir>.zip` and remove the directory.
///
/// Entries are stored under the folder name, so the archive unpacks into a
/// directory of the same name.
///
/// # Errors
///
/// Returns an error if the archive cannot be written or the directory
/// cannot be removed.
pub fn compress_dir(dir: &Path) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::backup(format!("cannot compress {}", dir.display())))?;
    let zip_path = dir.with_file_name(format!("{name}.zip"));

    let mut zip = ZipWriter::new(File::create(&zip_path)?);
    let options = SimpleFileOptions::default();

    for file in walk_files(dir)? {
        let relative = file
            .strip_prefix(dir)
            .map_err(|_| Error::backup(format!("{} escaped {}", file.display(), dir.display())))?;
        let entry = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(format!("{name}/{entry}"), options)?;
        zip.write_all(&std::fs::read(&file)?)?;
    }
    zip.finish()?;

    std::fs::remove_dir_all(dir)?;
    info!(archive = %zip_path.display(), "Compressed backup");
    Ok(zip_path)
}

/// A backup found in the backup location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// File or directory name.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Whether this is an unpacked backup directory.
    pub is_dir: bool,
    /// Size in bytes (recursive for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl BackupEntry {
    /// Whether droidbridge created this backup.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        OWNED_PREFIXES.iter().any(|p| self.name.starts_with(p))
    }
}

/// Backups under `root`, newest first.
///
/// Includes every directory and every `.zip`, `.ab` or `.tar` file. A
/// missing `root` yields an empty list.
///
/// # Errors
///
/// Returns an error if `root` exists but cannot be read.
pub fn list_backups(root: &Path) -> Result<Vec<BackupEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        let is_dir = meta.is_dir();
        let is_backup_file = meta.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| BACKUP_EXTENSIONS.contains(&e));
        if !is_dir && !is_backup_file {
            continue;
        }

        let size = if is_dir { dir_size(&path)? } else { meta.len() };
        backups.push(BackupEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            is_dir,
            size,
            modified: DateTime::<Utc>::from(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
        });
    }

    backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(backups)
}

/// Remove droidbridge backups beyond the newest `keep`, or older than
/// `max_age`.
///
/// Backups not created by droidbridge are never touched. With `dry_run`
/// nothing is deleted. Returns the backups selected for removal.
///
/// # Errors
///
/// Returns an error if a backup cannot be removed.
pub fn prune(
    root: &Path,
    keep: usize,
    max_age: Option<Duration>,
    dry_run: bool,
) -> Result<Vec<BackupEntry>> {
    let now = Utc::now();
    let owned: Vec<BackupEntry> = list_backups(root)?
        .into_iter()
        .filter(BackupEntry::is_owned)
        .collect();

    let doomed: Vec<BackupEntry> = owned
        .into_iter()
        .enumerate()
        .filter(|(rank, entry)| {
            let too_many = *rank >= keep;
            let too_old = max_age.is_some_and(|age| {
                chrono::Duration::from_std(age).is_ok_and(|age| now - entry.modified > age)
            });
            too_many || too_old
        })
        .map(|(_, entry)| entry)
        .collect();

    if !dry_run {
        for entry in &doomed {
            if entry.is_dir {
                std::fs::remove_dir_all(&entry.path)?;
            } else {
                std::fs::remove_file(&entry.path)?;
            }
            debug!(path = %entry.path.display(), "Removed backup");
        }
    }
    Ok(doomed)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn touch(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0.00 B");
        assert_eq!(human_size(1023), "1023.00 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(human_size(2 * 1024 * 1024 * 1024 * 1024), "2.00 TB");
    }

    #[test]
    fn test_walk_and_size() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), "12345");
        touch(&dir.path().join("sub/b.txt"), "123");

        let files = walk_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(dir_size(dir.path()).unwrap(), 8);
    }

    #[test]
    fn test_compress_dir_prefixes_entries() {
        let root = tempfile::tempdir().unwrap();
        let backup = root.path().join("full_backup_20240101_120000");
        touch(&backup.join("sms/sms.txt"), "hello");
        touch(&backup.join("backup_info.json"), "{}");

        let zip_path = compress_dir(&backup).unwrap();
        assert!(!backup.exists());
        assert_eq!(
            zip_path.file_name().unwrap(),
            "full_backup_20240101_120000.zip"
        );

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "full_backup_20240101_120000/backup_info.json",
                "full_backup_20240101_120000/sms/sms.txt"
            ]
        );

        let mut contents = String::new();
        archive
            .by_name("full_backup_20240101_120000/sms/sms.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn test_list_backups_filters() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("full_backup_1/x.txt"), "abc");
        touch(&root.path().join("adb_backup_1.ab"), "ANDROID BACKUP");
        touch(&root.path().join("notes.md"), "ignored");

        let backups = list_backups(root.path()).unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().all(BackupEntry::is_owned));

        let dir = backups.iter().find(|b| b.is_dir).unwrap();
        assert_eq!(dir.size, 3);
    }

    #[test]
    fn test_list_missing_root() {
        assert!(list_backups(Path::new("/nonexistent/backups")).unwrap().is_empty());
    }

    #[test]
    fn test_prune_keeps_newest_and_foreign() {
        let root = tempfile::tempdir().unwrap();
        for name in [
            "selective_backup_20240101_000000.zip",
            "selective_backup_20240102_000000.zip",
            "selective_backup_20240103_000000.zip",
            "family_photos.zip",
        ] {
            touch(&root.path().join(name), "x");
        }

        let doomed = prune(root.path(), 1, None, true).unwrap();
        assert_eq!(doomed.len(), 2);
        assert!(doomed.iter().all(BackupEntry::is_owned));
        assert_eq!(list_backups(root.path()).unwrap().len(), 4);

        prune(root.path(), 1, None, false).unwrap();
        let left = list_backups(root.path()).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().any(|b| b.name == "family_photos.zip"));
    }

    #[test]
    fn test_prune_by_age() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("full_backup_a.zip"), "x");

        let kept = prune(root.path(), 10, Some(Duration::from_secs(3600)), true).unwrap();
        assert!(kept.is_empty());

        std::thread::sleep(Duration::from_millis(20));
        let doomed = prune(root.path(), 10, Some(Duration::from_millis(1)), false).unwrap();
        assert_eq!(doomed.len(), 1);
        assert!(list_backups(root.path()).unwrap().is_empty());
    }
}
