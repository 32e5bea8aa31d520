use crate::adapters::{CommandRunner, SystemRunner};
use crate::config::AppConfig;
use crate::report::RunLog;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a tool invocation needs, built once in `main`.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub runner: Arc<dyn CommandRunner>,
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            runner: Arc::new(SystemRunner),
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel `self.cancel` on the first Ctrl+C.
    ///
    /// The child processes receive the terminal's SIGINT as well; the tools
    /// wait for them to finish writing before exiting.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    /// Prune expired logs for `tool`, then open its run log.
    ///
    /// Falls back to console-only output when the log directory is unusable.
    pub fn open_run_log(&self, tool: &str) -> RunLog {
        let dir = &self.config.log_directory;
        if let Err(e) = RunLog::prune(dir, tool, self.config.log_retention_days) {
            tracing::warn!(error = %e, "Failed to prune old logs");
        }

        match RunLog::create(dir, tool) {
            Ok(log) => log,
            Err(e) => {
                let log = RunLog::console_only();
                log.warning(format!("Logging to console only: {:#}", e));
                log
            }
        }
    }
}
