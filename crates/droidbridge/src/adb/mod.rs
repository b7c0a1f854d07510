//! Bridge to the `adb` executable.
//!
//! [`AdbExecutor`] is the seam between droidbridge and the outside world:
//! [`AdbClient`] runs the real binary, tests substitute a scripted executor.
//! [`Adb`] layers device operations (properties, reboot, file transfer) on
//! top of any executor and optionally pins commands to one serial.

mod device;
mod locate;

#[cfg(test)]
pub(crate) mod fake;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

use crate::error::{Error, Result};

pub use device::{parse_device_list, DeviceEntry, DeviceState, RebootMode};
pub use locate::{candidate_paths, locate, probe};

/// Captured result of one adb invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful invocation with the given stdout.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation with the given stderr.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with code 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout without surrounding whitespace.
    #[must_use]
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }
}

/// Line-by-line stdout of a long-running adb command such as `logcat`.
///
/// The process, if any, is killed when the stream is dropped.
pub struct LineStream {
    lines: Lines<Box<dyn AsyncBufRead + Send + Unpin>>,
    child: Option<Child>,
}

impl LineStream {
    /// Stream lines from any reader.
    #[must_use]
    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: reader.lines(),
            child: None,
        }
    }

    /// The next line, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }

    /// Stop the underlying process.
    pub async fn stop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill().await {
                trace!(error = %e, "adb stream already exited");
            }
        }
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("pid", &self.child.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

/// Runs adb with a list of arguments.
#[async_trait::async_trait]
pub trait AdbExecutor: Send + Sync + std::fmt::Debug {
    /// Run adb with `args` and capture its output.
    ///
    /// A non-zero exit is reported through [`CommandOutput::status`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started or times out.
    async fn execute(&self, args: &[&str]) -> Result<CommandOutput>;

    /// Start adb with `args` and stream its stdout without a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    async fn stream(&self, args: &[&str]) -> Result<LineStream>;
}

/// Executes the real adb binary.
#[derive(Debug, Clone)]
pub struct AdbClient {
    program: PathBuf,
    timeout: Duration,
}

impl AdbClient {
    /// Create a client for the given executable and per-command timeout.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// The adb executable this client runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The per-command timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl AdbExecutor for AdbClient {
    async fn execute(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!(program = %self.program.display(), ?args, "Running adb");

        let mut command = Command::new(&self.program);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("adb {}", args.join(" ")),
            })?
            .map_err(|source| Error::AdbSpawn {
                program: self.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(status = ?result.status, stdout = %result.stdout, stderr = %result.stderr, "adb finished");
        Ok(result)
    }

    async fn stream(&self, args: &[&str]) -> Result<LineStream> {
        debug!(program = %self.program.display(), ?args, "Streaming adb");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::AdbSpawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "adb stdout not captured")
        })?;

        let mut stream = LineStream::from_reader(BufReader::new(stdout));
        stream.child = Some(child);
        Ok(stream)
    }
}

/// High-level device operations over an [`AdbExecutor`].
#[derive(Debug, Clone)]
pub struct Adb {
    executor: Arc<dyn AdbExecutor>,
    serial: Option<String>,
}

impl Adb {
    /// Wrap an executor without targeting a specific device.
    #[must_use]
    pub fn new(executor: Arc<dyn AdbExecutor>) -> Self {
        Self {
            executor,
            serial: None,
        }
    }

    /// A handle whose commands go to `serial` (`adb -s <serial> ...`).
    #[must_use]
    pub fn with_serial(&self, serial: impl Into<String>) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            serial: Some(serial.into()),
        }
    }

    /// The targeted serial, if any.
    #[must_use]
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Run adb against the targeted device.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started or times out.
    pub async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.executor.execute(&self.targeted(args)).await
    }

    /// Stream the output of a long-running command on the targeted device.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started.
    pub async fn stream(&self, args: &[&str]) -> Result<LineStream> {
        self.executor.stream(&self.targeted(args)).await
    }

    fn targeted<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full.extend_from_slice(&["-s", serial.as_str()]);
        }
        full.extend_from_slice(args);
        full
    }

    /// Run adb and require a zero exit code, returning trimmed stdout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a non-zero exit.
    pub async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if output.is_success() {
            Ok(output.text().to_string())
        } else {
            Err(Error::command_failed(args, output.status, output.stderr.trim()))
        }
    }

    /// Run a shell command on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started or times out.
    pub async fn shell(&self, command: &[&str]) -> Result<CommandOutput> {
        let mut args = Vec::with_capacity(command.len() + 1);
        args.push("shell");
        args.extend_from_slice(command);
        self.run(&args).await
    }

    /// The adb version banner.
    ///
    /// # Errors
    ///
    /// Returns an error if `adb version` fails.
    pub async fn version(&self) -> Result<String> {
        let output = self.executor.execute(&["version"]).await?;
        if !output.is_success() {
            return Err(Error::command_failed(&["version"], output.status, output.stderr.trim()));
        }
        Ok(output.text().lines().next().unwrap_or_default().to_string())
    }

    /// List attached devices, regardless of the targeted serial.
    ///
    /// # Errors
    ///
    /// Returns an error if `adb devices -l` fails.
    pub async fn devices(&self) -> Result<Vec<DeviceEntry>> {
        let args = ["devices", "-l"];
        let output = self.executor.execute(&args).await?;
        if !output.is_success() {
            return Err(Error::command_failed(&args, output.status, output.stderr.trim()));
        }
        Ok(parse_device_list(&output.stdout))
    }

    /// Poll `adb devices` until a usable device appears.
    ///
    /// When a serial is targeted, that device must be the one in `device`
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoDevice`] once `attempts` polls have failed.
    pub async fn wait_for_device(&self, attempts: u32, interval: Duration) -> Result<DeviceEntry> {
        for attempt in 1..=attempts {
            let ready = self.devices().await?.into_iter().find(|d| {
                d.state == DeviceState::Device
                    && self.serial.as_deref().is_none_or(|s| s == d.serial)
            });
            if let Some(device) = ready {
                debug!(serial = %device.serial, attempt, "Device ready");
                return Ok(device);
            }
            trace!(attempt, "No device yet");
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(Error::NoDevice)
    }

    /// Read a system property, `None` when empty or unreadable.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started or times out.
    pub async fn getprop(&self, name: &str) -> Result<Option<String>> {
        let output = self.shell(&["getprop", name]).await?;
        if !output.is_success() || output.text().is_empty() {
            return Ok(None);
        }
        Ok(Some(output.text().to_string()))
    }

    /// Reboot the device into the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if adb refuses the reboot.
    pub async fn reboot(&self, mode: RebootMode) -> Result<()> {
        let mut args = vec!["reboot"];
        if let Some(target) = mode.target() {
            args.push(target);
        }
        self.run_checked(&args).await?;
        debug!(%mode, "Reboot requested");
        Ok(())
    }

    /// Whether the shell can obtain root through `su`.
    ///
    /// # Errors
    ///
    /// Returns an error if adb cannot be started or times out.
    pub async fn is_rooted(&self) -> Result<bool> {
        let output = self.shell(&["su", "-c", "'echo root_check'"]).await?;
        if output.is_success() && output.stdout.contains("root_check") {
            return Ok(true);
        }
        let output = self.shell(&["which", "su"]).await?;
        Ok(output.is_success() && output.stdout.contains("/su"))
    }

    /// Copy a local file to the device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocalFileMissing`] if `local` does not exist, or
    /// [`Error::CommandFailed`] if the transfer fails.
    pub async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        if !local.exists() {
            return Err(Error::LocalFileMissing {
                path: local.to_path_buf(),
            });
        }
        let local = local.to_string_lossy();
        self.run_checked(&["push", &local, remote]).await?;
        debug!(%local, remote, "Pushed file");
        Ok(())
    }

    /// Copy a file or directory from the device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the transfer fails.
    pub async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let local = local.to_string_lossy();
        self.run_checked(&["pull", remote, &local]).await?;
        trace!(remote, %local, "Pulled file");
        Ok(())
    }
}
