use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::report::RunLog;

pub mod rsync;
pub mod simulated;

pub use rsync::RsyncEngine;
pub use simulated::SimulatedEngine;

/// One source mirrored into one destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRequest {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub excludes: Vec<String>,
    pub dry_run: bool,
}

/// How the mirroring process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorExit {
    Exited(i32),
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEngineType {
    #[default]
    Rsync,
    Simulated,
}

/// Copies a source tree so the destination matches it exactly.
///
/// Engines append their own output to the run log and stop early once
/// `cancel` fires, reporting `MirrorExit::Interrupted`.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn mirror(
        &self,
        req: &MirrorRequest,
        log: &RunLog,
        cancel: &CancellationToken,
    ) -> Result<MirrorExit>;
}

pub fn create_engine(engine_type: TransferEngineType) -> Box<dyn TransferEngine> {
    match engine_type {
        TransferEngineType::Rsync => Box::new(RsyncEngine),
        TransferEngineType::Simulated => Box::new(SimulatedEngine::default()),
    }
}
