//! Device backups.
//!
//! A backup is a timestamped folder under the backup location holding one
//! subfolder per [`BackupSection`] and a `backup_info.json` manifest with
//! the size and BLAKE3 hash of every file. The folder can be zipped in
//! place. `adb backup` archives are handled by the [`ab`] module.

pub mod ab;
mod archive;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adb::Adb;
use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::scanner::DeviceScanner;

pub use archive::{
    compress_dir, dir_size, human_size, list_backups, prune, walk_files, BackupEntry,
};

/// Manifest file name inside every backup folder.
pub const MANIFEST_FILE: &str = "backup_info.json";

const MEDIA_DIRS: &[&str] = &["/sdcard/DCIM", "/sdcard/Pictures", "/sdcard/Movies"];
const MEDIA_TYPES: &[&str] = &["jpg", "jpeg", "png", "gif", "heic", "mp4", "mov", "3gp"];
const AUDIO_DIRS: &[&str] = &["/sdcard/Music", "/sdcard/Recordings"];
const AUDIO_TYPES: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "wav", "flac", "amr"];
const DOCUMENT_DIRS: &[&str] = &["/sdcard/Documents", "/sdcard/Download"];
const SETTINGS_NAMESPACES: &[&str] = &["global", "system", "secure"];

/// A category of device data to back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupSection {
    /// Contact names and numbers.
    Contacts,
    /// Call history.
    CallLog,
    /// Text messages.
    Sms,
    /// Photos and videos.
    Media,
    /// Music and recordings.
    Audio,
    /// Documents and downloads.
    Documents,
    /// APKs of user-installed apps.
    Apps,
    /// Global, system and secure settings.
    Settings,
}

impl BackupSection {
    /// Every section, in backup order.
    pub const ALL: [Self; 8] = [
        Self::Contacts,
        Self::CallLog,
        Self::Sms,
        Self::Media,
        Self::Audio,
        Self::Documents,
        Self::Apps,
        Self::Settings,
    ];

    /// Folder name inside the backup.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::CallLog => "call_log",
            Self::Sms => "sms",
            Self::Media => "media",
            Self::Audio => "audio",
            Self::Documents => "documents",
            Self::Apps => "apps",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for BackupSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for BackupSection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|section| section.dir_name() == wanted)
            .ok_or_else(|| format!("unknown backup section '{s}'"))
    }
}

/// Whether every section or a chosen subset was backed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Every section.
    Full,
    /// A chosen subset.
    Selective,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Selective => write!(f, "selective"),
        }
    }
}

/// Outcome of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOutcome {
    /// The section.
    pub section: BackupSection,
    /// Files written by the section.
    pub files: usize,
    /// Why the section failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SectionOutcome {
    /// Whether the section completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A file recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the backup folder, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// BLAKE3 hash of the contents.
    pub blake3: String,
}

/// Contents of `backup_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Full or selective.
    pub kind: BackupKind,
    /// When the backup started.
    pub created_at: DateTime<Utc>,
    /// Serial of the backed-up device, if targeted.
    pub serial: Option<String>,
    /// Labelled device properties.
    pub device: BTreeMap<String, String>,
    /// Per-section outcomes.
    pub sections: Vec<SectionOutcome>,
    /// Every file in the backup except the manifest.
    pub files: Vec<ManifestFile>,
}

impl BackupManifest {
    /// Total size of the recorded files.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Read the manifest of a backup folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or malformed.
    pub fn load(backup_dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(backup_dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// A finished backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOutcome {
    /// The backup folder, or the zip when compressed.
    pub path: PathBuf,
    /// Whether `path` is a zip archive.
    pub compressed: bool,
    /// What was written.
    pub manifest: BackupManifest,
}

/// Map a device path below `base` to a safe relative local path.
///
/// Returns `None` when the remote path is outside `base` or would escape
/// the destination through `..` or an absolute component.
#[must_use]
pub fn safe_relative(remote: &str, base: &str) -> Option<PathBuf> {
    let rest = remote.strip_prefix(base)?.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let relative = Path::new(rest);
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| relative.to_path_buf())
}

/// Shell command listing regular files below `dir` with one of `types`.
///
/// Passed to `adb shell` as a single argument so the device shell sees
/// the parentheses and globs unexpanded.
fn find_command(dir: &str, types: &[&str]) -> String {
    let mut cmd = format!("find '{dir}' -type f");
    if !types.is_empty() {
        let names = types
            .iter()
            .map(|t| format!("-iname '*.{t}'"))
            .collect::<Vec<_>>()
            .join(" -o ");
        cmd.push_str(&format!(" \\( {names} \\)"));
    }
    cmd.push_str(" 2>/dev/null");
    cmd
}

fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(path)?)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Creates backups of a connected device.
#[derive(Debug, Clone)]
pub struct BackupTool {
    adb: Adb,
    root: PathBuf,
    compress: bool,
    max_apps: usize,
}

impl BackupTool {
    /// Create a tool writing under `root`, compressing, with up to ten apps.
    #[must_use]
    pub fn new(adb: Adb, root: impl Into<PathBuf>) -> Self {
        Self {
            adb,
            root: root.into(),
            compress: true,
            max_apps: 10,
        }
    }

    /// Create a tool from the backup configuration.
    #[must_use]
    pub fn from_config(adb: Adb, root: impl Into<PathBuf>, config: &BackupConfig) -> Self {
        Self::new(adb, root)
            .with_compress(config.compress)
            .with_max_apps(config.max_apps)
    }

    /// Whether to zip the finished backup folder.
    #[must_use]
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Maximum number of user apps whose APKs are pulled.
    #[must_use]
    pub fn with_max_apps(mut self, max_apps: usize) -> Self {
        self.max_apps = max_apps;
        self
    }

    /// The backup location.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| Error::DirectoryCreate {
            path: self.root.clone(),
            source,
        })
    }

    /// Back up `sections` into a new timestamped folder.
    ///
    /// A failing section is recorded in the manifest and the remaining
    /// sections still run. `on_section` is called after each section.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup folder, manifest or archive cannot be
    /// written.
    pub async fn create<F>(
        &self,
        kind: BackupKind,
        sections: &[BackupSection],
        mut on_section: F,
    ) -> Result<BackupOutcome>
    where
        F: FnMut(&SectionOutcome),
    {
        if sections.is_empty() {
            return Err(Error::backup("no sections selected"));
        }

        self.ensure_root()?;
        let created_at = Utc::now();
        let name = format!("{kind}_backup_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let dir = self.root.join(&name);
        std::fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
        info!(path = %dir.display(), %kind, "Creating backup");

        let device = match DeviceScanner::new(self.adb.clone()).device_info().await {
            Ok(info) => info.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            Err(e) => {
                warn!(error = %e, "Could not read device properties");
                BTreeMap::new()
            }
        };

        let mut outcomes = Vec::with_capacity(sections.len());
        for &section in sections {
            let target = dir.join(section.dir_name());
            let outcome = match self.backup_section(section, &target).await {
                Ok(files) => SectionOutcome {
                    section,
                    files,
                    error: None,
                },
                Err(e) => {
                    warn!(%section, error = %e, "Section failed");
                    SectionOutcome {
                        section,
                        files: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            on_section(&outcome);
            outcomes.push(outcome);
        }

        let mut files = Vec::new();
        for path in walk_files(&dir)? {
            let relative = path
                .strip_prefix(&dir)
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .map_err(|_| Error::backup(format!("{} is outside the backup", path.display())))?;
            files.push(ManifestFile {
                path: relative,
                size: std::fs::metadata(&path)?.len(),
                blake3: hash_file(&path)?,
            });
        }

        let manifest = BackupManifest {
            kind,
            created_at,
            serial: self.adb.serial().map(String::from),
            device,
            sections: outcomes,
            files,
        };
        std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

        let (path, compressed) = if self.compress {
            (compress_dir(&dir)?, true)
        } else {
            (dir, false)
        };
        info!(
            path = %path.display(),
            size = %human_size(manifest.total_size()),
            "Backup complete"
        );

        Ok(BackupOutcome {
            path,
            compressed,
            manifest,
        })
    }

    async fn backup_section(&self, section: BackupSection, target: &Path) -> Result<usize> {
        std::fs::create_dir_all(target).map_err(|source| Error::DirectoryCreate {
            path: target.to_path_buf(),
            source,
        })?;

        match section {
            BackupSection::Contacts => {
                self.query(
                    "content://contacts/phones",
                    Some("display_name:number"),
                    &target.join("contacts.txt"),
                )
                .await
            }
            BackupSection::CallLog => {
                self.query("content://call_log/calls", None, &target.join("call_log.txt"))
                    .await
            }
            BackupSection::Sms => {
                self.query(
                    "content://sms",
                    Some("_id:address:date:body"),
                    &target.join("sms.txt"),
                )
                .await
            }
            BackupSection::Media => self.pull_tree(MEDIA_DIRS, MEDIA_TYPES, target).await,
            BackupSection::Audio => self.pull_tree(AUDIO_DIRS, AUDIO_TYPES, target).await,
            BackupSection::Documents => self.pull_tree(DOCUMENT_DIRS, &[], target).await,
            BackupSection::Apps => self.pull_apks(target).await,
            BackupSection::Settings => self.dump_settings(target).await,
        }
    }

    /// Save a content provider query to `file`.
    async fn query(&self, uri: &str, projection: Option<&str>, file: &Path) -> Result<usize> {
        let mut args = vec!["shell", "content", "query", "--uri", uri];
        if let Some(projection) = projection {
            args.extend(["--projection", projection]);
        }
        let output = self.adb.run_checked(&args).await?;
        if output.is_empty() || output.starts_with("No result found") {
            debug!(uri, "Content provider returned no rows");
            return Ok(0);
        }
        std::fs::write(file, output)?;
        Ok(1)
    }

    /// Pull every matching file below the shared-storage folders.
    async fn pull_tree(&self, dirs: &[&str], types: &[&str], target: &Path) -> Result<usize> {
        let mut pulled = 0;
        for dir in dirs {
            let command = find_command(dir, types);
            let output = self.adb.shell(&[command.as_str()]).await?;
            if !output.is_success() && output.text().is_empty() {
                debug!(dir, "Folder not present on device");
                continue;
            }

            for remote in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let Some(relative) = safe_relative(remote, "/sdcard") else {
                    warn!(remote, "Skipping unsafe path");
                    continue;
                };
                let local = target.join(relative);
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                match self.adb.pull(remote, &local).await {
                    Ok(()) => pulled += 1,
                    Err(e) => warn!(remote, error = %e, "Pull failed"),
                }
            }
        }
        Ok(pulled)
    }

    /// Pull the base APKs of up to `max_apps` user-installed packages.
    async fn pull_apks(&self, target: &Path) -> Result<usize> {
        let output = self.adb.run_checked(&["shell", "pm", "list", "packages", "-3"]).await?;
        let packages: Vec<&str> = output
            .lines()
            .filter_map(|l| l.trim().strip_prefix("package:"))
            .filter(|p| !p.is_empty())
            .collect();
        if packages.len() > self.max_apps {
            info!(
                total = packages.len(),
                limit = self.max_apps,
                "Limiting app backup"
            );
        }

        let mut pulled = 0;
        for package in packages.into_iter().take(self.max_apps) {
            if !package
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
            {
                warn!(package, "Skipping unexpected package name");
                continue;
            }
            let paths = self.adb.run_checked(&["shell", "pm", "path", package]).await?;
            let Some(apk) = paths
                .lines()
                .filter_map(|l| l.trim().strip_prefix("package:"))
                .next()
            else {
                continue;
            };
            match self.adb.pull(apk, &target.join(format!("{package}.apk"))).await {
                Ok(()) => pulled += 1,
                Err(e) => warn!(package, error = %e, "APK pull failed"),
            }
        }
        Ok(pulled)
    }

    async fn dump_settings(&self, target: &Path) -> Result<usize> {
        let mut written = 0;
        for namespace in SETTINGS_NAMESPACES {
            let output = self.adb.run_checked(&["shell", "settings", "list", namespace]).await?;
            std::fs::write(target.join(format!("{namespace}_settings.txt")), output)?;
            written += 1;
        }
        Ok(written)
    }

    /// Run `adb backup` into a new `adb_backup_<timestamp>.ab`.
    ///
    /// The user must confirm the backup on the device screen. Use a handle
    /// with a long timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if adb fails or writes no file.
    pub async fn adb_backup(&self) -> Result<PathBuf> {
        self.ensure_root()?;
        let file = self
            .root
            .join(format!("adb_backup_{}.ab", Local::now().format("%Y%m%d_%H%M%S")));
        let target = file.to_string_lossy();

        info!(file = %file.display(), "Starting adb backup; confirm on the device");
        self.adb
            .run_checked(&["backup", "-apk", "-shared", "-all", "-system", "-f", &target])
            .await?;

        if !file.exists() {
            return Err(Error::backup("adb backup produced no file (was it confirmed on the device?)"));
        }
        Ok(file)
    }
}
