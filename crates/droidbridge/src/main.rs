//! `droidbridge` - CLI for Android device management
//!
//! This binary provides the command-line interface over the droidbridge
//! library: device inventory, logs, backups, the operation journal and
//! configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, warn};

use droidbridge::adb::{self, Adb, AdbClient, DeviceState};
use droidbridge::backup::{self, ab, BackupKind, BackupSection, BackupTool};
use droidbridge::cli::{
    BackupCommand, Cli, Command, ConfigCommand, JournalCommand, LogsCommand, PullCommand,
    PushCommand, RebootCommand, ShellCommand,
};
use droidbridge::logs::{self, LogAnalyzer, LogCapture};
use droidbridge::scanner::DeviceScanner;
use droidbridge::{init_logging, Config, Journal, OperationRecord};

/// Detail stored with a journalled operation.
type Detail = Option<String>;

/// Settings shared by every handler.
#[derive(Debug)]
struct App {
    config: Config,
    config_path: PathBuf,
    serial: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
    let config = match Config::load_from(Some(config_path.clone())) {
        Ok(config) => config,
        Err(e) if tolerates_bad_config(&cli.command) => {
            warn!("Ignoring unreadable configuration: {e}");
            Config::default()
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("loading configuration from {}", config_path.display()))
        }
    };

    colored::control::set_override(config.ui.colors);

    let app = App {
        serial: cli.serial.clone().or_else(|| config.adb.serial.clone()),
        config,
        config_path,
    };

    let operation = cli.command.operation();
    let result = run(&app, cli.command).await;
    if let Some(operation) = operation {
        record_operation(&app, operation, &result);
    }
    result.map(|_| ())
}

/// Config commands that must work even when the file is broken.
fn tolerates_bad_config(command: &Command) -> bool {
    matches!(
        command,
        Command::Config(
            ConfigCommand::Path | ConfigCommand::Reset { .. } | ConfigCommand::Validate { .. }
        )
    )
}

async fn run(app: &App, command: Command) -> Result<Detail> {
    match command {
        Command::Devices(output) => handle_devices(app, output.json).await,
        Command::Info(output) => handle_info(app, output.json).await,
        Command::Scan(output) => handle_scan(app, output.json).await,
        Command::Reboot(cmd) => handle_reboot(app, cmd).await,
        Command::Push(cmd) => handle_push(app, cmd).await,
        Command::Pull(cmd) => handle_pull(app, cmd).await,
        Command::Shell(cmd) => handle_shell(app, cmd).await,
        Command::Logs(cmd) => handle_logs(app, cmd).await,
        Command::Backup(cmd) => handle_backup(app, cmd).await,
        Command::Journal(cmd) => handle_journal(app, cmd).map(|()| None),
        Command::Config(cmd) => handle_config(app, cmd).map(|()| None),
    }
}

// === Plumbing ===

/// Build an adb handle with the given per-command timeout.
async fn connect(app: &App, timeout: Duration) -> Result<Adb> {
    let program = adb::locate(app.config.adb.path.as_deref()).await?;
    debug!("Using adb at {}", program.display());
    let adb = Adb::new(Arc::new(AdbClient::new(program, timeout)));
    Ok(match &app.serial {
        Some(serial) => adb.with_serial(serial.as_str()),
        None => adb,
    })
}

/// Connect and make sure a usable device is attached.
async fn connect_device(app: &App, timeout: Duration) -> Result<Adb> {
    let adb = connect(app, timeout).await?;
    let attempts = if app.config.adb.wait_for_device {
        eprintln!("Waiting for device...");
        app.config.adb.wait_attempts.max(1)
    } else {
        1
    };
    adb.wait_for_device(attempts, Duration::from_secs(1)).await?;
    Ok(adb)
}

fn confirm(app: &App, yes: bool, action: &str) -> Result<()> {
    if app.config.ui.confirm_destructive && !yes {
        bail!("{action} needs confirmation: re-run with --yes");
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(title.len()));
}

fn open_journal(config: &Config) -> Option<Journal> {
    if !config.journal.enabled {
        return None;
    }
    match Journal::open(config.database_path()) {
        Ok(journal) => Some(journal),
        Err(e) => {
            warn!("Journal unavailable: {e}");
            None
        }
    }
}

fn record_operation(app: &App, operation: &str, result: &Result<Detail>) {
    let Some(journal) = open_journal(&app.config) else {
        return;
    };
    let serial = app.serial.as_deref();
    let record = match result {
        Ok(Some(detail)) => OperationRecord::success(operation, serial).with_detail(detail.clone()),
        Ok(None) => OperationRecord::success(operation, serial),
        Err(e) => OperationRecord::failure(operation, serial).with_detail(format!("{e:#}")),
    };
    if let Err(e) = journal.record(&record) {
        warn!("Failed to record {operation} in the journal: {e}");
    }
    let max_entries = app.config.journal.max_entries;
    if max_entries > 0 {
        if let Err(e) = journal.prune_keep_recent(max_entries) {
            warn!("Failed to prune the journal: {e}");
        }
    }
}

// === Device commands ===

async fn handle_devices(app: &App, json: bool) -> Result<Detail> {
    let adb = connect(app, app.config.adb_timeout()).await?;
    let devices = adb.devices().await?;

    if json {
        print_json(&devices)?;
        return Ok(None);
    }
    if devices.is_empty() {
        println!("No devices attached.");
        return Ok(None);
    }

    println!("{:<24} {:<16} {}", "SERIAL".bold(), "STATE".bold(), "MODEL".bold());
    for device in &devices {
        let state = device.state.to_string();
        let state = match device.state {
            DeviceState::Device => state.green(),
            DeviceState::Unauthorized | DeviceState::Offline => state.yellow(),
            _ => state.red(),
        };
        println!(
            "{:<24} {:<16} {}",
            device.serial,
            state,
            device.model.as_deref().unwrap_or("-")
        );
    }
    Ok(Some(format!("{} device(s)", devices.len())))
}

async fn handle_info(app: &App, json: bool) -> Result<Detail> {
    let adb = connect_device(app, app.config.adb_timeout()).await?;
    let info = DeviceScanner::new(adb).device_info().await?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = info
            .iter()
            .map(|(label, value)| ((*label).to_string(), value.clone().into()))
            .collect();
        print_json(&map)?;
    } else {
        heading("Device Information");
        for (label, value) in &info {
            println!("{:<16} {}", format!("{label}:"), value);
        }
    }
    Ok(None)
}

async fn handle_scan(app: &App, json: bool) -> Result<Detail> {
    let adb = connect(app, app.config.adb_timeout()).await?;
    let report = DeviceScanner::new(adb).scan().await?;

    if let Some(journal) = open_journal(&app.config) {
        for device in &report.devices {
            if let Err(e) = journal.record_scan(device) {
                warn!(serial = %device.serial, "Failed to record scan: {e}");
            }
        }
    }

    if json {
        print_json(&report)?;
        return Ok(Some(format!("{} device(s)", report.total_devices)));
    }

    heading("Device Scan");
    for device in &report.devices {
        let props = &device.properties;
        println!();
        println!("{}", device.serial.bold());
        println!("  Model:          {}", props.model.as_deref().unwrap_or("-"));
        println!(
            "  Manufacturer:   {}",
            props.manufacturer.as_deref().unwrap_or("-")
        );
        println!(
            "  Android:        {} (API {})",
            props.android_version.as_deref().unwrap_or("-"),
            props.api_level.as_deref().unwrap_or("-")
        );
        println!(
            "  Security patch: {}",
            props.security_patch.as_deref().unwrap_or("-")
        );
        println!("  Lock screen:    {}", device.lock_status);
        println!("  USB debugging:  {}", yes_no(device.usb_debugging));
        println!(
            "  Rooted:         {}",
            if device.rooted { "yes".red() } else { "no".green() }
        );
        if let Some(storage) = &device.storage {
            println!(
                "  /data:          {} of {} used ({})",
                storage.used, storage.total, storage.usage_percent
            );
        }
        if let Some(level) = device.battery.get("level") {
            println!("  Battery:        {level}%");
        }
    }
    for skipped in &report.skipped {
        println!();
        println!("{} skipped ({})", skipped.serial, skipped.state.to_string().yellow());
    }

    let summary = &report.summary;
    println!();
    println!(
        "{} device(s): {} locked, {} unlocked, {} rooted, {} with USB debugging",
        report.total_devices,
        summary.locked_devices,
        summary.unlocked_devices,
        summary.rooted_devices,
        summary.debugging_enabled
    );
    Ok(Some(format!("{} device(s)", report.total_devices)))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

async fn handle_reboot(app: &App, cmd: RebootCommand) -> Result<Detail> {
    let mode = cmd.mode.into();
    confirm(app, cmd.yes, &format!("Rebooting into {mode}"))?;
    let adb = connect_device(app, app.config.adb_timeout()).await?;
    adb.reboot(mode).await?;
    println!("Rebooting into {mode}.");
    Ok(Some(mode.to_string()))
}

async fn handle_push(app: &App, cmd: PushCommand) -> Result<Detail> {
    let adb = connect_device(app, app.config.adb_timeout()).await?;
    adb.push(&cmd.local, &cmd.remote).await?;
    println!("{} -> {}", cmd.local.display(), cmd.remote);
    Ok(Some(cmd.remote))
}

async fn handle_pull(app: &App, cmd: PullCommand) -> Result<Detail> {
    let local = cmd.local.unwrap_or_else(|| {
        Path::new(&cmd.remote)
            .file_name()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    });
    let adb = connect_device(app, app.config.adb_timeout()).await?;
    adb.pull(&cmd.remote, &local).await?;
    println!("{} -> {}", cmd.remote, local.display());
    Ok(Some(cmd.remote))
}

async fn handle_shell(app: &App, cmd: ShellCommand) -> Result<Detail> {
    let adb = connect_device(app, app.config.adb_timeout()).await?;
    let args: Vec<&str> = cmd.command.iter().map(String::as_str).collect();
    let output = adb.shell(&args).await?;

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    if !output.is_success() {
        bail!(
            "shell command exited with {}",
            output
                .status
                .map_or_else(|| "no status".to_string(), |c| c.to_string())
        );
    }
    Ok(Some(cmd.command.join(" ")))
}

// === Logs ===

async fn handle_logs(app: &App, cmd: LogsCommand) -> Result<Detail> {
    match cmd {
        LogsCommand::Capture {
            buffer,
            duration,
            output,
            echo,
        } => {
            let secs = duration.unwrap_or(app.config.logs.capture_secs);
            let adb = connect_device(app, app.config.adb_timeout()).await?;
            let buffer = buffer.into();

            eprintln!("Capturing {buffer} log for {secs}s (Ctrl-C to stop)...");
            let lines = LogCapture::new(adb)
                .capture(buffer, Duration::from_secs(secs), |line| {
                    if echo {
                        println!("{line}");
                    }
                })
                .await?;
            if lines.is_empty() {
                bail!(droidbridge::Error::NoLogs);
            }

            let path = output.unwrap_or_else(|| PathBuf::from(logs::default_log_filename()));
            logs::save_logs(&path, &lines)
                .with_context(|| format!("saving logs to {}", path.display()))?;
            println!("Captured {} log entries to {}", lines.len(), path.display());
            Ok(Some(path.display().to_string()))
        }
        LogsCommand::Analyze { file, output } => {
            let lines = read_logs(&file)?;
            let analysis = LogAnalyzer::from_config(&app.config.logs)?.analyze(&lines)?;
            if output.json {
                return print_json(&analysis).map(|()| None);
            }

            heading("Log Analysis");
            println!("Entries analyzed: {}", analysis.total_entries);
            println!("Total matches:    {}", analysis.summary.total_matches);
            for (category, count) in &analysis.summary.by_category {
                println!("  {category:<16} {count}");
            }
            let risk = analysis.summary.risk_level.to_string();
            let risk = match analysis.summary.risk_level {
                logs::RiskLevel::High => risk.red().bold(),
                logs::RiskLevel::Medium => risk.yellow(),
                logs::RiskLevel::Low => risk.green(),
            };
            println!("Risk level:       {risk}");

            if !analysis.security_issues.is_empty() {
                println!();
                println!("{}", "Security issues".bold());
                for issue in analysis.security_issues.iter().take(20) {
                    println!("  {:>6}: [{}] {}", issue.line, issue.issue, issue.entry);
                }
            }
            if !analysis.summary.notable_findings.is_empty() {
                println!();
                println!("{}", "Notable findings".bold());
                for finding in &analysis.summary.notable_findings {
                    println!("  {:>6}: [{}] {}", finding.line, finding.pattern, finding.entry);
                }
            }
            Ok(None)
        }
        LogsCommand::Search {
            file,
            query,
            output,
        } => {
            let lines = read_logs(&file)?;
            let hits = logs::search(&lines, &query);
            if output.json {
                return print_json(&hits).map(|()| None);
            }
            if hits.is_empty() {
                println!("No matches for '{query}'.");
                return Ok(None);
            }
            for hit in &hits {
                println!("{}", format!("--- line {}", hit.line).dimmed());
                println!("{}", hit.context);
            }
            println!();
            println!("{} match(es)", hits.len());
            Ok(None)
        }
        LogsCommand::Monitor { duration } => {
            let secs = duration.unwrap_or(app.config.logs.monitor_secs);
            let colors = app.config.ui.colors;
            let adb = connect_device(app, app.config.adb_timeout()).await?;

            eprintln!("Monitoring log for {secs}s (Ctrl-C to stop)...");
            let count = LogCapture::new(adb)
                .monitor(Duration::from_secs(secs), |line| {
                    println!("{}", logs::highlight(line, colors));
                })
                .await?;
            eprintln!("Monitored {count} log entries");
            Ok(Some(format!("{count} entries")))
        }
        LogsCommand::Report { file, output } => {
            let lines = read_logs(&file)?;
            let report = logs::event_report(&lines)?;
            if output.json {
                return print_json(&report).map(|()| None);
            }

            heading("Event Report");
            let summary = &report.summary;
            println!("Timeline events:  {}", summary.total_timeline_events);
            println!("User activities:  {}", summary.total_user_activities);
            println!("Security events:  {}", summary.total_security_events);
            println!("State changes:    {}", summary.total_state_changes);

            if !report.timeline.is_empty() {
                println!();
                println!("{}", "Timeline".bold());
                for event in &report.timeline {
                    println!("  {:<20} {}", event.timestamp, event.event);
                }
            }
            for (title, events) in [
                ("Security events", &report.security_events),
                ("User activity", &report.user_activities),
                ("State changes", &report.state_changes),
            ] {
                if events.is_empty() {
                    continue;
                }
                println!();
                println!("{}", title.bold());
                for event in events.iter().take(20) {
                    println!("  [{}] {}", event.kind, event.line);
                }
            }
            if !report.findings.is_empty() {
                println!();
                println!("{}", "Findings".bold());
                for finding in &report.findings {
                    println!("  - {finding}");
                }
            }
            Ok(None)
        }
    }
}

fn read_logs(file: &Path) -> Result<Vec<String>> {
    logs::read_log_file(file).with_context(|| format!("reading {}", file.display()))
}

// === Backups ===

async fn handle_backup(app: &App, cmd: BackupCommand) -> Result<Detail> {
    let root = app.config.backup_dir();
    match cmd {
        BackupCommand::Create {
            sections,
            full,
            no_compress,
            output,
        } => {
            let (kind, sections): (BackupKind, Vec<BackupSection>) = if full {
                (BackupKind::Full, BackupSection::ALL.to_vec())
            } else if sections.is_empty() {
                bail!("choose --full or at least one --section");
            } else {
                let mut sections: Vec<BackupSection> =
                    sections.into_iter().map(Into::into).collect();
                sections.sort();
                sections.dedup();
                (BackupKind::Selective, sections)
            };

            let adb = connect_device(app, app.config.adb_timeout()).await?;
            let tool = BackupTool::from_config(adb, &root, &app.config.backup)
                .with_compress(app.config.backup.compress && !no_compress);

            let outcome = tool
                .create(kind, &sections, |section| {
                    if output.json {
                        return;
                    }
                    match &section.error {
                        None => println!(
                            "  {} {:<10} {} file(s)",
                            "✓".green(),
                            section.section,
                            section.files
                        ),
                        Some(e) => println!("  {} {:<10} {}", "✗".red(), section.section, e),
                    }
                })
                .await?;

            if output.json {
                print_json(&outcome)?;
            } else {
                let failed = outcome
                    .manifest
                    .sections
                    .iter()
                    .filter(|s| !s.succeeded())
                    .count();
                println!();
                println!(
                    "Backup written to {} ({} files, {})",
                    outcome.path.display(),
                    outcome.manifest.files.len(),
                    backup::human_size(outcome.manifest.total_size())
                );
                if failed > 0 {
                    println!("{}", format!("{failed} section(s) failed").yellow());
                }
            }
            Ok(Some(outcome.path.display().to_string()))
        }
        BackupCommand::Adb => {
            let adb = connect_device(app, app.config.adb_backup_timeout()).await?;
            eprintln!("Confirm the backup on the device screen...");
            let file = BackupTool::from_config(adb, &root, &app.config.backup)
                .adb_backup()
                .await?;
            println!("Android backup written to {}", file.display());
            Ok(Some(file.display().to_string()))
        }
        BackupCommand::List { output } => {
            let backups = backup::list_backups(&root)?;
            if output.json {
                print_json(&backups)?;
                return Ok(None);
            }
            if backups.is_empty() {
                println!("No backups in {}", root.display());
                return Ok(None);
            }
            println!("{:<44} {:>12}  {}", "NAME".bold(), "SIZE".bold(), "MODIFIED".bold());
            for entry in &backups {
                println!(
                    "{:<44} {:>12}  {}",
                    entry.name,
                    backup::human_size(entry.size),
                    entry.modified.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(None)
        }
        BackupCommand::Prune { keep, dry_run, yes } => {
            if !dry_run {
                confirm(app, yes, "Pruning backups")?;
            }
            let keep = match keep.unwrap_or(app.config.backup.keep_versions) {
                0 => usize::MAX,
                n => n,
            };
            let doomed = backup::prune(&root, keep, app.config.backup_max_age(), dry_run)?;
            let verb = if dry_run { "Would remove" } else { "Removed" };
            for entry in &doomed {
                println!("{verb} {}", entry.name);
            }
            println!("{verb} {} backup(s)", doomed.len());
            Ok(Some(format!("{} removed", doomed.len())))
        }
        BackupCommand::Convert { file } => {
            let tar = ab::convert_to_tar(&file)
                .with_context(|| format!("converting {}", file.display()))?;
            println!("Extracted {}", tar.display());
            Ok(None)
        }
    }
}

// === Journal ===

fn handle_journal(app: &App, cmd: JournalCommand) -> Result<()> {
    let path = app.config.database_path();
    let journal =
        Journal::open(&path).with_context(|| format!("opening journal {}", path.display()))?;

    match cmd {
        JournalCommand::List {
            limit,
            device,
            scans,
            output,
        } => {
            if scans {
                let serial = device.unwrap_or_default();
                let scans = journal.scans_for(&serial, limit)?;
                if output.json {
                    return print_json(&scans);
                }
                for scan in &scans {
                    let props = &scan.report.properties;
                    println!(
                        "{}  {}  Android {}  patch {}  lock {}",
                        scan.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        props.model.as_deref().unwrap_or("-"),
                        props.android_version.as_deref().unwrap_or("-"),
                        props.security_patch.as_deref().unwrap_or("-"),
                        scan.report.lock_status
                    );
                }
                return Ok(());
            }

            let records = match &device {
                Some(serial) => journal.for_device(serial, limit)?,
                None => journal.recent(limit)?,
            };
            if output.json {
                return print_json(&records);
            }
            if records.is_empty() {
                println!("The journal is empty.");
                return Ok(());
            }
            for record in &records {
                let outcome = record.outcome.to_string();
                let outcome = match record.outcome {
                    droidbridge::Outcome::Success => outcome.green(),
                    droidbridge::Outcome::Failure => outcome.red(),
                };
                println!(
                    "{}  {:<14} {:<8} {:<20} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.operation,
                    outcome,
                    record.serial.as_deref().unwrap_or("-"),
                    record.detail.as_deref().unwrap_or("")
                );
            }
        }
        JournalCommand::Stats { output } => {
            let stats = journal.stats()?;
            if output.json {
                return print_json(&stats);
            }
            heading("Journal");
            println!("Database:    {}", journal.path().display());
            println!("Operations:  {}", stats.total_operations);
            println!("Failures:    {}", stats.failed_operations);
            println!("Scans:       {}", stats.total_scans);
            println!("Devices:     {}", stats.devices);
            if let (Some(oldest), Some(newest)) = (stats.oldest_operation, stats.newest_operation)
            {
                println!(
                    "Range:       {} to {}",
                    oldest.format("%Y-%m-%d %H:%M"),
                    newest.format("%Y-%m-%d %H:%M")
                );
            }
            println!("Size:        {}", backup::human_size(stats.db_size_bytes));
        }
        JournalCommand::Prune {
            keep,
            older_than_days,
            yes,
        } => {
            if keep.is_none() && older_than_days.is_none() {
                bail!("choose --keep and/or --older-than-days");
            }
            confirm(app, yes, "Pruning the journal")?;

            let mut removed = 0;
            if let Some(days) = older_than_days {
                removed += journal.prune_older_than(chrono::Duration::days(i64::from(days)))?;
            }
            if let Some(keep) = keep {
                removed += journal.prune_keep_recent(keep)?;
            }
            println!("Removed {removed} journal entries");
        }
    }
    Ok(())
}

// === Configuration ===

fn handle_config(app: &App, cmd: ConfigCommand) -> Result<()> {
    let config = &app.config;
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                print_json(config)?;
            } else {
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
        ConfigCommand::Path => {
            println!("{}", app.config_path.display());
        }
        ConfigCommand::Get { key } => match config.get(&key)? {
            Some(value) => println!("{value}"),
            None => println!("(unset)"),
        },
        ConfigCommand::Set { key, value } => {
            let updated = config.with_value(&key, &value)?;
            updated.save_to(&app.config_path)?;
            println!("Set {key} in {}", app.config_path.display());
        }
        ConfigCommand::Reset { yes } => {
            confirm(app, yes, "Resetting the configuration")?;
            Config::default().save_to(&app.config_path)?;
            println!("Configuration reset to defaults.");
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(|| app.config_path.clone());
            Config::load_from(Some(path.clone()))
                .with_context(|| format!("validating {}", path.display()))?;
            println!("Configuration is valid: {}", path.display());
        }
        ConfigCommand::Export { file } => {
            config.save_to(&file)?;
            println!("Configuration exported to {}", file.display());
        }
        ConfigCommand::Import { file } => {
            let merged = config
                .merged_with_file(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            merged.save_to(&app.config_path)?;
            println!(
                "Imported {} into {}",
                file.display(),
                app.config_path.display()
            );
        }
    }
    Ok(())
}
