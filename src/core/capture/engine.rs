use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::{INTERRUPT_GRACE, exit_was_interrupt, interrupt_child};
use crate::core::capture::duration::RecordDuration;
use crate::core::capture::preset::AudioFormat;
use crate::core::capture::wav::pcm_header;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// ALSA PCM name, e.g. `plughw:CARD=Device,DEV=0`.
    pub handle: String,
    pub format: AudioFormat,
    /// Record until cancelled when `None`.
    pub duration: Option<RecordDuration>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    Completed,
    Interrupted,
    Failed(String),
}

/// Streams audio from a capture device into a WAV file.
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    async fn capture(
        &self,
        req: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<CaptureExit>;
}

/// Records with ALSA's `arecord`.
pub struct ArecordEngine {
    program: PathBuf,
}

impl ArecordEngine {
    pub fn new() -> Self {
        Self::with_program("arecord")
    }

    /// Use another executable with the `arecord` command line.
    pub fn with_program(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl Default for ArecordEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub fn arecord_args(req: &CaptureRequest) -> Vec<String> {
    let mut args = vec![
        "-q".to_string(),
        "-D".to_string(),
        req.handle.clone(),
        "-t".to_string(),
        "wav".to_string(),
        "-f".to_string(),
        req.format.sample_format.as_arecord().to_string(),
        "-r".to_string(),
        req.format.sample_rate.to_string(),
        "-c".to_string(),
        req.format.channels.to_string(),
    ];
    if let Some(duration) = req.duration {
        args.push("-d".to_string());
        args.push(duration.as_secs().to_string());
    }
    args.push(req.output.display().to_string());
    args
}

#[async_trait]
impl CaptureEngine for ArecordEngine {
    async fn capture(
        &self,
        req: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<CaptureExit> {
        let args = arecord_args(req);
        debug!(?args, "Spawning arecord");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        let mut stderr = child.stderr.take().context("Failed to get arecord stderr")?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let status = match finished {
            Some(status) => status,
            // The terminal's SIGINT usually got there first.
            None => match tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    // arecord finalizes the WAV header on SIGINT
                    interrupt_child(&child);
                    child.wait().await
                }
            },
        }
        .context("Failed to wait for arecord")?;

        let stderr = stderr_task.await.unwrap_or_default();
        let interrupted = exit_was_interrupt(&status, cancel).await;
        debug!(%status, interrupted, "arecord exited");

        if interrupted || status.code().is_none() {
            return Ok(CaptureExit::Interrupted);
        }
        if status.success() {
            Ok(CaptureExit::Completed)
        } else {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| format!("arecord exited with {}", status));
            Ok(CaptureExit::Failed(reason))
        }
    }
}

/// Writes silence instead of recording. Used by tests.
pub struct SimulatedCapture {
    /// Seconds of audio written per capture when no duration is given.
    pub default_secs: u64,
    /// Write only a header and report failure.
    pub fail_with: Option<String>,
    /// Fire the token and report an interrupt after writing.
    pub interrupt: bool,
    requests: Mutex<Vec<CaptureRequest>>,
}

impl Default for SimulatedCapture {
    fn default() -> Self {
        Self {
            default_secs: 1,
            fail_with: None,
            interrupt: false,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl SimulatedCapture {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn interrupted() -> Self {
        Self {
            interrupt: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CaptureEngine for SimulatedCapture {
    async fn capture(
        &self,
        req: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<CaptureExit> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let fmt = req.format;
        if let Some(reason) = &self.fail_with {
            let header = pcm_header(fmt.sample_rate, fmt.channels, fmt.sample_format.bits(), 0);
            std::fs::write(&req.output, header)?;
            return Ok(CaptureExit::Failed(reason.clone()));
        }

        let secs = req.duration.map(|d| d.as_secs()).unwrap_or(self.default_secs);
        let data_len = (fmt.bytes_per_second() * secs) as u32;
        let mut bytes =
            pcm_header(fmt.sample_rate, fmt.channels, fmt.sample_format.bits(), data_len);
        bytes.resize(bytes.len() + data_len as usize, 0);
        std::fs::write(&req.output, bytes)?;

        if self.interrupt {
            cancel.cancel();
            return Ok(CaptureExit::Interrupted);
        }
        Ok(CaptureExit::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::preset::QualityPreset;

    #[test]
    fn arecord_args_for_timed_capture() {
        let req = CaptureRequest {
            handle: "plughw:CARD=Device,DEV=0".to_string(),
            format: QualityPreset::Voice.format(),
            duration: Some(RecordDuration::from_secs(30)),
            output: PathBuf::from("/tmp/out.wav"),
        };
        assert_eq!(
            arecord_args(&req),
            vec![
                "-q",
                "-D",
                "plughw:CARD=Device,DEV=0",
                "-t",
                "wav",
                "-f",
                "S16_LE",
                "-r",
                "22050",
                "-c",
                "1",
                "-d",
                "30",
                "/tmp/out.wav",
            ]
        );
    }

    #[test]
    fn arecord_args_without_duration_record_until_stopped() {
        let req = CaptureRequest {
            handle: "default".to_string(),
            format: QualityPreset::Phone.format(),
            duration: None,
            output: PathBuf::from("out.wav"),
        };
        let args = arecord_args(&req);
        assert!(!args.contains(&"-d".to_string()));
        assert!(args.contains(&"U8".to_string()));
    }
}
