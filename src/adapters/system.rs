use crate::adapters::{CommandOutput, CommandRunner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a child that already got the terminal's SIGINT may take to exit
/// before it is sent another one.
pub(crate) const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// Runs commands on the host through `tokio::process`.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program, ?args, "Running command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(program, code = ?result.code, "Command finished");
        Ok(result)
    }
}

/// Whether a finished child stopped because of Ctrl+C.
///
/// Ctrl+C reaches the whole process group, so the child can exit before the
/// listener cancels `cancel`. A failed exit therefore waits up to
/// [`INTERRUPT_GRACE`] for the token before counting as a plain failure.
pub(crate) async fn exit_was_interrupt(status: &ExitStatus, cancel: &CancellationToken) -> bool {
    use nix::sys::signal::Signal;

    if status.signal() == Some(Signal::SIGINT as i32) {
        return true;
    }
    if status.success() {
        return false;
    }
    cancel.is_cancelled()
        || tokio::time::timeout(INTERRUPT_GRACE, cancel.cancelled())
            .await
            .is_ok()
}

/// Forward SIGINT to a running child so it can finish its output cleanly.
pub(crate) fn interrupt_child(child: &tokio::process::Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        debug!(pid, error = %e, "Failed to forward SIGINT");
    }
}
