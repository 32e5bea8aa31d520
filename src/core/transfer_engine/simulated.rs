use crate::core::transfer_engine::{MirrorExit, MirrorRequest, TransferEngine};
use crate::report::RunLog;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

/// Engine that copies nothing and exits with scripted codes per target.
#[derive(Default)]
pub struct SimulatedEngine {
    pub exit_codes: HashMap<String, i32>,
    pub delay: Duration,
    /// Fire the cancellation token once this target finishes.
    pub cancel_after: Option<String>,
    requests: Mutex<Vec<MirrorRequest>>,
}

impl SimulatedEngine {
    pub fn with_exit_code(mut self, name: &str, code: i32) -> Self {
        self.exit_codes.insert(name.to_string(), code);
        self
    }

    pub fn cancel_after(mut self, name: &str) -> Self {
        self.cancel_after = Some(name.to_string());
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<MirrorRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransferEngine for SimulatedEngine {
    async fn mirror(
        &self,
        req: &MirrorRequest,
        log: &RunLog,
        cancel: &CancellationToken,
    ) -> Result<MirrorExit> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        if cancel.is_cancelled() {
            return Ok(MirrorExit::Interrupted);
        }

        log.output(&format!(
            "(simulated) {}/ -> {}",
            req.source.display(),
            req.destination.display()
        ));
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if self.cancel_after.as_deref() == Some(req.name.as_str()) {
            cancel.cancel();
        }

        let code = self.exit_codes.get(&req.name).copied().unwrap_or(0);
        Ok(MirrorExit::Exited(code))
    }
}
