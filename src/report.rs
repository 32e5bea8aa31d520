//! Leveled run log shared by the console and a per-run log file.
//!
//! Every entry is rendered once as `[YYYY-mm-dd HH:MM:SS] [LEVEL] message`.
//! The console gets the same text with the level colored; the log file gets
//! it verbatim. File writes are unbuffered: each line reaches the OS in a
//! single `write_all` before the call returns.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
    Success,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        }
    }

    fn colored(&self) -> ColoredString {
        let tag = format!("[{}]", self.as_str());
        match self {
            Self::Info => tag.blue(),
            Self::Warning => tag.yellow(),
            Self::Error => tag.red().bold(),
            Self::Success => tag.green(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    fn stamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.stamp(), self.level.as_str(), self.message)
    }
}

pub struct RunLog {
    file: Option<File>,
    path: Option<PathBuf>,
    console: bool,
}

impl RunLog {
    /// Open `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.log` for appending.
    pub fn create(dir: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let name = format!("{}_{}.log", prefix, Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        debug!(path = %path.display(), "Opened run log");

        Ok(Self {
            file: Some(file),
            path: Some(path),
            console: true,
        })
    }

    /// Console output only; used when no log file can be opened.
    pub fn console_only() -> Self {
        Self {
            file: None,
            path: None,
            console: true,
        }
    }

    /// Stop mirroring entries to the console.
    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&self, level: Level, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);
        let line = entry.to_string();

        if self.console {
            let console_line = format!("[{}] {} {}", entry.stamp(), level.colored(), entry.message);
            match level {
                Level::Warning | Level::Error => eprintln!("{}", console_line),
                Level::Info | Level::Success => println!("{}", console_line),
            }
        }
        self.write_line(&line);

        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.log(Level::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> LogEntry {
        self.log(Level::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.log(Level::Error, message)
    }

    pub fn success(&self, message: impl Into<String>) -> LogEntry {
        self.log(Level::Success, message)
    }

    /// Raw output of an external command. Goes to the log file only.
    pub fn output(&self, line: &str) {
        self.write_line(line);
    }

    fn write_line(&self, line: &str) {
        let Some(mut file) = self.file.as_ref() else {
            return;
        };

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        if let Err(e) = file.write_all(buf.as_bytes()) {
            warn!(error = %e, "Failed to write run log");
        }
    }

    /// Delete `<prefix>_*.log` files in `dir` older than `retention_days`.
    ///
    /// A retention of zero keeps everything. Returns the number removed.
    pub fn prune(dir: &Path, prefix: &str, retention_days: u32) -> Result<usize> {
        if retention_days == 0 || !dir.exists() {
            return Ok(0);
        }

        let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
        let now = SystemTime::now();
        let name_prefix = format!("{}_", prefix);
        let mut removed = 0;

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read log directory {}", dir.display()))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&name_prefix) || !name.ends_with(".log") {
                continue;
            }

            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let expired = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);

            if expired {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => {
                        debug!(file = %name, "Pruned expired log");
                        removed += 1;
                    }
                    Err(e) => warn!(file = %name, error = %e, "Failed to prune log"),
                }
            }
        }

        Ok(removed)
    }
}
