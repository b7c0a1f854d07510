//! Finding a working adb executable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, trace};

use super::{AdbClient, AdbExecutor};
use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Candidate adb locations in probe order.
///
/// `configured` comes first, then the SDK environment variables, the
/// bare name resolved through `PATH`, common system directories, and the
/// default per-platform SDK installs.
#[must_use]
pub fn candidate_paths(configured: Option<&Path>) -> Vec<PathBuf> {
    let exe = if cfg!(windows) { "adb.exe" } else { "adb" };
    let mut candidates = Vec::new();

    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }

    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Some(root) = std::env::var_os(var) {
            candidates.push(PathBuf::from(root).join("platform-tools").join(exe));
        }
    }

    candidates.push(PathBuf::from(exe));

    if cfg!(unix) {
        candidates.push(PathBuf::from("/usr/bin/adb"));
        candidates.push(PathBuf::from("/usr/local/bin/adb"));
    }

    if let Some(home) = dirs::home_dir() {
        let sdk = if cfg!(target_os = "macos") {
            home.join("Library/Android/sdk")
        } else if cfg!(windows) {
            home.join("AppData/Local/Android/Sdk")
        } else {
            home.join("Android/Sdk")
        };
        candidates.push(sdk.join("platform-tools").join(exe));
    }

    candidates.dedup();
    candidates
}

/// Whether `program --version` runs and exits successfully.
pub async fn probe(program: &Path) -> bool {
    let client = AdbClient::new(program, PROBE_TIMEOUT);
    match client.execute(&["--version"]).await {
        Ok(output) => output.is_success(),
        Err(e) => {
            trace!(program = %program.display(), error = %e, "adb candidate rejected");
            false
        }
    }
}

/// Return the first candidate that answers `--version`.
///
/// # Errors
///
/// Returns [`Error::AdbNotFound`] listing every candidate tried.
pub async fn locate(configured: Option<&Path>) -> Result<PathBuf> {
    let candidates = candidate_paths(configured);
    for candidate in &candidates {
        if probe(candidate).await {
            debug!(path = %candidate.display(), "Found adb");
            return Ok(candidate.clone());
        }
    }
    Err(Error::AdbNotFound {
        searched: candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_path_first() {
        let configured = PathBuf::from("/opt/sdk/platform-tools/adb");
        let candidates = candidate_paths(Some(&configured));
        assert_eq!(candidates[0], configured);
    }

    #[test]
    fn test_bare_name_is_candidate() {
        let candidates = candidate_paths(None);
        let exe = if cfg!(windows) { "adb.exe" } else { "adb" };
        assert!(candidates.contains(&PathBuf::from(exe)));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        assert!(!probe(Path::new("/nonexistent/dir/adb")).await);
    }

    #[tokio::test]
    async fn test_locate_reports_candidates() {
        // Only meaningful on hosts without adb installed.
        if let Err(err) = locate(Some(Path::new("/nonexistent/dir/adb"))).await {
            assert!(err.is_adb_missing());
            assert!(err.to_string().contains("/nonexistent/dir/adb"));
        }
    }
}
