use crate::adapters::{INTERRUPT_GRACE, exit_was_interrupt, interrupt_child};
use crate::core::transfer_engine::{MirrorExit, MirrorRequest, TransferEngine};
use crate::report::RunLog;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

pub struct RsyncEngine;

/// Archive mode, delete files gone from the source, skip excluded patterns.
pub fn rsync_args(req: &MirrorRequest) -> Vec<String> {
    let mut args = vec![
        "-a".to_string(),
        "--human-readable".to_string(),
        "--delete".to_string(),
        "--itemize-changes".to_string(),
    ];
    if req.dry_run {
        args.push("--dry-run".to_string());
    }
    for pattern in &req.excludes {
        args.push(format!("--exclude={}", pattern));
    }
    // trailing slash to copy contents
    args.push(format!("{}/", req.source.display()));
    args.push(req.destination.display().to_string());
    args
}

#[async_trait]
impl TransferEngine for RsyncEngine {
    async fn mirror(
        &self,
        req: &MirrorRequest,
        log: &RunLog,
        cancel: &CancellationToken,
    ) -> Result<MirrorExit> {
        let span = info_span!("rsync", target = %req.name);

        async {
            let args = rsync_args(req);
            debug!(?args, "Spawning rsync");

            let mut child = Command::new("rsync")
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .context("Failed to spawn rsync process")?;

            let stdout = child.stdout.take().context("Failed to get rsync stdout")?;
            let stderr = child.stderr.take().context("Failed to get rsync stderr")?;
            let mut out_lines = BufReader::new(stdout).lines();
            let mut err_lines = BufReader::new(stderr).lines();

            let mut out_done = false;
            let mut err_done = false;
            let mut stop_at: Option<Instant> = None;
            let mut signalled = false;

            while !(out_done && err_done) {
                let forward_at = stop_at.filter(|_| !signalled);
                tokio::select! {
                    line = out_lines.next_line(), if !out_done => match line {
                        Ok(Some(line)) => log.output(&line),
                        _ => out_done = true,
                    },
                    line = err_lines.next_line(), if !err_done => match line {
                        Ok(Some(line)) => log.output(&line),
                        _ => err_done = true,
                    },
                    _ = cancel.cancelled(), if stop_at.is_none() => {
                        debug!("Interrupt requested, waiting for rsync to stop");
                        stop_at = Some(Instant::now() + INTERRUPT_GRACE);
                    }
                    _ = sleep_until(forward_at.unwrap_or_else(Instant::now)),
                        if forward_at.is_some() =>
                    {
                        debug!("rsync still running, forwarding SIGINT");
                        signalled = true;
                        interrupt_child(&child);
                    }
                }
            }

            let status = child.wait().await.context("Failed to wait for rsync")?;
            debug!(%status, "rsync exited");

            if exit_was_interrupt(&status, cancel).await {
                return Ok(MirrorExit::Interrupted);
            }
            match status.code() {
                Some(code) => Ok(MirrorExit::Exited(code)),
                None => Ok(MirrorExit::Interrupted),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(dry_run: bool) -> MirrorRequest {
        MirrorRequest {
            name: "home".to_string(),
            source: PathBuf::from("/home/pi"),
            destination: PathBuf::from("/mnt/backup/home"),
            excludes: vec!["*.tmp".to_string(), ".cache/".to_string()],
            dry_run,
        }
    }

    #[test]
    fn args_mirror_contents_with_excludes() {
        let args = rsync_args(&request(false));
        assert_eq!(
            args,
            vec![
                "-a",
                "--human-readable",
                "--delete",
                "--itemize-changes",
                "--exclude=*.tmp",
                "--exclude=.cache/",
                "/home/pi/",
                "/mnt/backup/home",
            ]
        );
    }

    #[test]
    fn dry_run_flag_is_passed() {
        let args = rsync_args(&request(true));
        assert!(args.contains(&"--dry-run".to_string()));
    }
}
