//! USB microphone detection and recording.

pub mod duration;
pub mod engine;
pub mod preset;
pub mod wav;

use chrono::{DateTime, Local};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapters::CommandRunner;
use crate::config::CaptureConfig;
use crate::core::models::DeviceSessionState;
use crate::core::state::StateStore;
use crate::error::DeviceError;
use crate::report::RunLog;

pub use duration::RecordDuration;
pub use engine::{ArecordEngine, CaptureEngine, CaptureExit, CaptureRequest, SimulatedCapture};
pub use preset::{AudioFormat, QualityPreset, SampleFormat};
pub use wav::WavInfo;

/// Card names of the Pi's built-in audio, never a microphone.
const ONBOARD_CARDS: [&str; 3] = ["bcm2835", "vc4-hdmi", "hdmi"];

static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^card (\d+): (\S+) \[(.*?)\], device (\d+): (.*?)(?: \[(.*?)\])?\s*$")
        .expect("static regex")
});

/// One capture-capable PCM from `arecord -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub card: u32,
    pub device: u32,
    pub card_id: String,
    pub card_name: String,
    pub device_name: String,
}

impl CaptureDevice {
    /// Addressed by card id so the handle survives card renumbering.
    pub fn handle(&self) -> String {
        format!("plughw:CARD={},DEV={}", self.card_id, self.device)
    }

    fn is_onboard(&self) -> bool {
        let id = self.card_id.to_lowercase();
        let name = self.card_name.to_lowercase();
        ONBOARD_CARDS.iter().any(|o| id.contains(o) || name.contains(o))
    }

    fn matches_hint(&self, hints: &[String]) -> bool {
        let haystack =
            format!("{} {} {}", self.card_id, self.card_name, self.device_name).to_lowercase();
        hints
            .iter()
            .filter(|h| !h.trim().is_empty())
            .any(|h| haystack.contains(&h.to_lowercase()))
    }
}

impl std::fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "card {} device {}: {} [{}] ({})",
            self.card,
            self.device,
            self.card_name,
            self.device_name,
            self.handle()
        )
    }
}

/// Parse the hardware listing printed by `arecord -l`.
pub fn parse_arecord_list(text: &str) -> Vec<CaptureDevice> {
    text.lines()
        .filter_map(|line| {
            let caps = CARD_RE.captures(line.trim_end())?;
            Some(CaptureDevice {
                card: caps.get(1)?.as_str().parse().ok()?,
                card_id: caps.get(2)?.as_str().to_string(),
                card_name: caps.get(3)?.as_str().to_string(),
                device: caps.get(4)?.as_str().parse().ok()?,
                device_name: caps
                    .get(6)
                    .or_else(|| caps.get(5))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Candidates for an external microphone, in listing order.
///
/// Devices matching a vendor hint win; otherwise any card that is not the
/// board's own audio.
pub fn candidates(devices: &[CaptureDevice], hints: &[String]) -> Vec<CaptureDevice> {
    let hinted: Vec<CaptureDevice> = devices
        .iter()
        .filter(|d| !d.is_onboard() && d.matches_hint(hints))
        .cloned()
        .collect();
    if !hinted.is_empty() {
        return hinted;
    }
    devices.iter().filter(|d| !d.is_onboard()).cloned().collect()
}

/// Options for one recording.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub name: Option<String>,
    pub duration: Option<RecordDuration>,
    pub preset: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub device: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub path: PathBuf,
    pub preset: QualityPreset,
    pub info: WavInfo,
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct RecordingFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Local>,
}

/// Configured microphone and whether it is currently plugged in.
#[derive(Debug, Clone)]
pub struct MicStatus {
    pub state: Option<DeviceSessionState>,
    pub present: Option<CaptureDevice>,
    pub devices: Vec<CaptureDevice>,
}

/// Removes an output file that holds no audio when dropped.
///
/// Covers every exit path of a recording: success, failure, early return
/// through `?` and interruption.
pub struct OutputGuard {
    path: PathBuf,
}

impl OutputGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return;
        };
        let has_audio = wav::read_info(&self.path)
            .map(|info| info.data_len > 0)
            .unwrap_or(meta.len() > wav::CANONICAL_HEADER_LEN);

        if !has_audio {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "Removed empty recording"),
                Err(e) => {
                    let path = self.path.display();
                    warn!(path = %path, error = %e, "Failed to remove empty recording")
                }
            }
        }
    }
}

pub struct MicManager<'a> {
    runner: &'a dyn CommandRunner,
    engine: &'a dyn CaptureEngine,
    config: &'a CaptureConfig,
    store: StateStore,
}

impl<'a> MicManager<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        engine: &'a dyn CaptureEngine,
        config: &'a CaptureConfig,
        store: StateStore,
    ) -> Self {
        Self {
            runner,
            engine,
            config,
            store,
        }
    }

    pub async fn list_devices(&self) -> Result<Vec<CaptureDevice>, DeviceError> {
        let output = self.runner.run("arecord", &["-l"]).await?;
        if !output.success() {
            return Err(DeviceError::CommandFailed {
                command: "arecord -l".to_string(),
                reason: output.reason(),
            });
        }
        let devices = parse_arecord_list(&output.stdout);
        debug!(count = devices.len(), "Capture devices listed");
        Ok(devices)
    }

    /// Find the external microphone, prove it records, and remember it.
    pub async fn detect(&self, log: &RunLog) -> Result<DeviceSessionState, DeviceError> {
        let devices = self.list_devices().await?;
        let candidates = candidates(&devices, &self.config.vendor_hints);

        let Some(chosen) = candidates.first().cloned() else {
            return Err(DeviceError::NoCaptureDevice);
        };

        if candidates.len() > 1 {
            log.warning(format!(
                "{} capture devices found, using the first. Pass --device to choose another:",
                candidates.len()
            ));
            for device in &candidates {
                log.warning(format!("  {}", device));
            }
        }

        log.info(format!("Testing {}", chosen));
        self.test_capture(&chosen).await?;

        let state = DeviceSessionState::new(chosen.card_id.clone(), Some(chosen.handle()));
        self.store.save(&state)?;
        log.success(format!("Microphone configured: {} ({})", chosen.card_name, chosen.handle()));

        Ok(state)
    }

    async fn test_capture(&self, device: &CaptureDevice) -> Result<(), DeviceError> {
        let dir = self
            .store
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir).map_err(|e| DeviceError::RecordingFailed(e.to_string()))?;

        let path = dir.join(format!("mic-test-{}.wav", std::process::id()));
        let req = CaptureRequest {
            handle: device.handle(),
            format: QualityPreset::Voice.format(),
            duration: Some(RecordDuration::from_secs(self.config.test_seconds.max(1))),
            output: path.clone(),
        };

        let result = self.engine.capture(&req, &CancellationToken::new()).await;
        let info = wav::read_info(&path);
        let _ = std::fs::remove_file(&path);

        match result? {
            CaptureExit::Completed => {}
            CaptureExit::Interrupted => {
                return Err(DeviceError::RecordingFailed("test capture interrupted".to_string()));
            }
            CaptureExit::Failed(reason) => {
                return Err(DeviceError::RecordingFailed(format!(
                    "test capture failed: {}",
                    reason
                )));
            }
        }

        match info {
            Ok(info) if info.data_len > 0 => Ok(()),
            _ => Err(DeviceError::RecordingFailed(format!(
                "test capture on {} produced no audio",
                device.handle()
            ))),
        }
    }

    /// Device handle for a recording: explicit, remembered, or freshly detected.
    async fn resolve_handle(
        &self,
        explicit: Option<&str>,
        log: &RunLog,
    ) -> Result<String, DeviceError> {
        if let Some(handle) = explicit {
            return Ok(handle.to_string());
        }
        if let Some(handle) = self.store.load()?.and_then(|s| s.control_handle) {
            return Ok(handle);
        }
        log.info("No microphone configured yet, detecting");
        let state = self.detect(log).await?;
        state.control_handle.ok_or(DeviceError::NoCaptureDevice)
    }

    pub async fn record(
        &self,
        opts: &RecordOptions,
        log: &RunLog,
        cancel: &CancellationToken,
    ) -> Result<Recording, DeviceError> {
        let preset_name = opts.preset.as_deref().unwrap_or(&self.config.default_preset);
        let (preset, known) = QualityPreset::resolve(preset_name);
        if !known {
            log.warning(format!(
                "Unknown quality preset '{}', using '{}'",
                preset_name, preset
            ));
        }

        let handle = self.resolve_handle(opts.device.as_deref(), log).await?;

        let dir = opts.output_dir.clone().unwrap_or_else(|| self.config.output_dir.clone());
        std::fs::create_dir_all(&dir).map_err(|e| {
            DeviceError::RecordingFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(output_file_name(opts.name.as_deref()));
        if path.exists() {
            return Err(DeviceError::RecordingFailed(format!(
                "{} already exists",
                path.display()
            )));
        }

        let format = preset.format();
        log.info(format!(
            "Recording from {} to {} ({}, {}, {})",
            handle,
            path.display(),
            preset,
            format,
            opts.duration
                .map(|d| d.to_string())
                .unwrap_or_else(|| "until Ctrl+C".to_string())
        ));

        let guard = OutputGuard::new(&path);
        let req = CaptureRequest {
            handle,
            format,
            duration: opts.duration,
            output: path.clone(),
        };

        let exit = self
            .engine
            .capture(&req, cancel)
            .await
            .map_err(|e| DeviceError::RecordingFailed(format!("{:#}", e)))?;

        let info = wav::read_info(guard.path()).ok().filter(|i| i.data_len > 0);

        match (exit, info) {
            (CaptureExit::Completed, Some(info)) => {
                log.success(format!(
                    "Saved {} ({:.1}s)",
                    path.display(),
                    info.duration_secs()
                ));
                Ok(Recording {
                    path,
                    preset,
                    info,
                    interrupted: false,
                })
            }
            (CaptureExit::Interrupted, Some(info)) => {
                log.warning(format!(
                    "Recording interrupted, kept {:.1}s in {}",
                    info.duration_secs(),
                    path.display()
                ));
                Ok(Recording {
                    path,
                    preset,
                    info,
                    interrupted: true,
                })
            }
            (CaptureExit::Failed(reason), _) => Err(DeviceError::RecordingFailed(reason)),
            (_, None) => Err(DeviceError::RecordingFailed("no audio was captured".to_string())),
        }
    }

    pub async fn status(&self) -> Result<MicStatus, DeviceError> {
        let state = self.store.load()?;
        let devices = self.list_devices().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not list capture devices");
            Vec::new()
        });
        let present = state
            .as_ref()
            .and_then(|s| devices.iter().find(|d| d.card_id == s.identifier).cloned());

        Ok(MicStatus {
            state,
            present,
            devices,
        })
    }

    pub fn reset(&self) -> Result<bool, DeviceError> {
        self.store.reset()
    }
}

/// `<name>.wav`, or a timestamped default name.
pub fn output_file_name(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) if n.to_lowercase().ends_with(".wav") => n.to_string(),
        Some(n) => format!("{}.wav", n),
        None => format!("recording_{}.wav", Local::now().format("%Y%m%d_%H%M%S")),
    }
}

/// WAV files in `dir`, newest first.
pub fn recordings(dir: &Path) -> std::io::Result<Vec<RecordingFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_wav = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if !is_wav {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        files.push(RecordingFile {
            path,
            size: meta.len(),
            modified: meta.modified().map(DateTime::<Local>::from).unwrap_or_else(|_| Local::now()),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}
