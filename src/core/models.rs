use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named folder to back up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    SourceMissing,
    Failed(i32),
    Interrupted,
    EngineError(String),
}

impl TransferOutcome {
    pub fn describe(&self) -> String {
        match self {
            Self::Completed => "completed".to_string(),
            Self::SourceMissing => "source missing".to_string(),
            Self::Failed(code) => format!("exit code {}", code),
            Self::Interrupted => "interrupted".to_string(),
            Self::EngineError(msg) => msg.clone(),
        }
    }
}

/// Terminal record of one target's transfer.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub name: String,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub exit_code: Option<i32>,
    pub outcome: TransferOutcome,
    pub timestamp: DateTime<Local>,
}

impl TransferResult {
    pub fn new(
        spec: &SourceSpec,
        dest_path: PathBuf,
        exit_code: Option<i32>,
        outcome: TransferOutcome,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            source_path: spec.path.clone(),
            dest_path,
            exit_code,
            outcome,
            timestamp: Local::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == TransferOutcome::Completed
    }
}

/// The device a tool last detected or connected successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSessionState {
    pub identifier: String,
    /// Card/device handle or audio sink name, when known.
    pub control_handle: Option<String>,
    pub last_detected_at: DateTime<Local>,
}

impl DeviceSessionState {
    pub fn new(identifier: impl Into<String>, control_handle: Option<String>) -> Self {
        Self {
            identifier: identifier.into(),
            control_handle,
            last_detected_at: Local::now(),
        }
    }
}
