use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::config::AppConfig;
use crate::core::models::{SourceSpec, TransferOutcome, TransferResult};
use crate::core::transfer_engine::{MirrorExit, MirrorRequest, TransferEngine};
use crate::error::{BackupError, UnknownTargetError};
use crate::report::RunLog;

/// Runs the resolved targets one after another through a transfer engine.
pub struct BackupRunner<'a> {
    config: &'a AppConfig,
    engine: &'a dyn TransferEngine,
    dry_run: bool,
}

impl<'a> BackupRunner<'a> {
    pub fn new(config: &'a AppConfig, engine: &'a dyn TransferEngine) -> Self {
        Self {
            config,
            engine,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn destination_for(&self, spec: &SourceSpec) -> PathBuf {
        self.config.destination_base.join(&spec.name)
    }

    /// Fail unless the destination has the configured minimum free space.
    pub fn check_space(&self) -> Result<u64, BackupError> {
        let required = self.config.min_free_bytes();
        let (path, available) = available_space(&self.config.destination_base)?;
        debug!(path = %path.display(), available, required, "Free space");

        if available < required {
            return Err(BackupError::InsufficientSpace {
                path,
                available_bytes: available,
                required_bytes: required,
            });
        }
        Ok(available)
    }

    /// Back up `targets` in order.
    ///
    /// Only the pre-flight space check aborts the run. A missing source, a
    /// failing transfer or an engine error is recorded and the next target
    /// proceeds. After `cancel` fires no further target is started.
    pub async fn run(
        &self,
        targets: &[SourceSpec],
        log: &RunLog,
        cancel: &CancellationToken,
    ) -> Result<BackupReport, BackupError> {
        if !targets.is_empty() {
            let available = self.check_space()?;
            log.info(format!(
                "Destination {} has {} free",
                self.config.destination_base.display(),
                format_bytes(available)
            ));
        }

        let mut results = Vec::with_capacity(targets.len());

        for spec in targets {
            let destination = self.destination_for(spec);

            if cancel.is_cancelled() {
                log.warning(format!("Skipping {}: run interrupted", spec.name));
                results.push(TransferResult::new(
                    spec,
                    destination,
                    None,
                    TransferOutcome::Interrupted,
                ));
                continue;
            }

            let result = self
                .transfer_one(spec, destination, log, cancel)
                .instrument(info_span!("target", name = %spec.name))
                .await;
            results.push(result);
        }

        Ok(BackupReport::new(results))
    }

    async fn transfer_one(
        &self,
        spec: &SourceSpec,
        destination: PathBuf,
        log: &RunLog,
        cancel: &CancellationToken,
    ) -> TransferResult {
        if !spec.path.exists() {
            log.warning(format!(
                "Source for {} missing: {} (skipping)",
                spec.name,
                spec.path.display()
            ));
            return TransferResult::new(spec, destination, None, TransferOutcome::SourceMissing);
        }

        if !self.dry_run {
            if let Err(e) = std::fs::create_dir_all(&destination) {
                let msg = format!("Failed to create {}: {}", destination.display(), e);
                log.error(format!("Backup of {} failed: {}", spec.name, msg));
                return TransferResult::new(
                    spec,
                    destination,
                    None,
                    TransferOutcome::EngineError(msg),
                );
            }
        }

        log.info(format!(
            "Backing up {}: {} -> {}{}",
            spec.name,
            spec.path.display(),
            destination.display(),
            if self.dry_run { " (dry run)" } else { "" }
        ));

        let req = MirrorRequest {
            name: spec.name.clone(),
            source: spec.path.clone(),
            destination: destination.clone(),
            excludes: self.config.exclude_patterns.clone(),
            dry_run: self.dry_run,
        };

        match self.engine.mirror(&req, log, cancel).await {
            Ok(MirrorExit::Exited(0)) => {
                log.success(format!("Backup of {} completed", spec.name));
                TransferResult::new(spec, destination, Some(0), TransferOutcome::Completed)
            }
            Ok(MirrorExit::Exited(code)) => {
                log.error(format!("Backup of {} failed (exit code {})", spec.name, code));
                TransferResult::new(spec, destination, Some(code), TransferOutcome::Failed(code))
            }
            Ok(MirrorExit::Interrupted) => {
                log.error(format!("Backup of {} interrupted", spec.name));
                TransferResult::new(spec, destination, None, TransferOutcome::Interrupted)
            }
            Err(e) => {
                log.error(format!("Backup of {} failed: {:#}", spec.name, e));
                TransferResult::new(
                    spec,
                    destination,
                    None,
                    TransferOutcome::EngineError(format!("{:#}", e)),
                )
            }
        }
    }
}

/// Aggregated outcome of a backup run.
#[derive(Debug, Default)]
pub struct BackupReport {
    pub results: Vec<TransferResult>,
    pub unknown: Vec<UnknownTargetError>,
}

impl BackupReport {
    pub fn new(results: Vec<TransferResult>) -> Self {
        Self {
            results,
            unknown: Vec::new(),
        }
    }

    pub fn with_unknown(mut self, unknown: Vec<UnknownTargetError>) -> Self {
        self.unknown = unknown;
        self
    }

    pub fn failed(&self) -> impl Iterator<Item = &TransferResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }

    /// Nothing failed, nothing was unknown, and at least one target ran.
    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.unknown.is_empty() && self.failed().next().is_none()
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() { 0 } else { 1 }
    }

    pub fn summary(&self) -> String {
        let total = self.results.len() + self.unknown.len();
        if self.all_succeeded() {
            return format!("All {} target(s) backed up successfully", total);
        }
        if total == 0 {
            return "No targets were backed up".to_string();
        }

        let failed: Vec<String> = self
            .failed()
            .map(|r| format!("{} ({})", r.name, r.outcome.describe()))
            .chain(self.unknown.iter().map(|u| format!("{} (unknown target)", u.name)))
            .collect();
        let ok = self.results.iter().filter(|r| r.succeeded()).count();

        format!(
            "Backup finished with failures, {} of {} succeeded. Failed: {}",
            ok,
            total,
            failed.join(", ")
        )
    }

    /// Write the final summary line at SUCCESS or ERROR level.
    pub fn log_summary(&self, log: &RunLog) {
        if self.all_succeeded() {
            log.success(self.summary());
        } else {
            log.error(self.summary());
        }
    }
}

/// Free bytes on the filesystem holding `path`, or its nearest existing ancestor.
pub fn available_space(path: &Path) -> Result<(PathBuf, u64), BackupError> {
    let existing = path
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let stat = nix::sys::statvfs::statvfs(&existing).map_err(|source| BackupError::SpaceCheck {
        path: existing.clone(),
        source,
    })?;

    let available = (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64);
    Ok((existing, available))
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
