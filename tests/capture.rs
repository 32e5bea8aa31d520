use pitools::adapters::{CommandOutput, ScriptedRunner};
use pitools::config::CaptureConfig;
use pitools::core::capture::{
    MicManager, QualityPreset, RecordDuration, RecordOptions, SimulatedCapture, recordings, wav,
};
use pitools::core::{DeviceSessionState, StateStore};
use pitools::error::DeviceError;
use pitools::report::RunLog;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

const TWO_MICS: &str = "\
**** List of CAPTURE Hardware Devices ****
card 0: vc4hdmi [vc4-hdmi], device 0: MAI PCM i2s-hifi-0 [MAI PCM i2s-hifi-0]
card 1: Device [USB PnP Sound Device], device 0: USB Audio [USB Audio]
card 2: Yeti [Yeti Stereo Microphone], device 0: USB Audio [USB Audio]
";

const ONE_MIC: &str = "card 1: Device [USB PnP Sound Device], device 0: USB Audio [USB Audio]\n";

struct Fixture {
    dir: TempDir,
    runner: ScriptedRunner,
    config: CaptureConfig,
    log: RunLog,
}

impl Fixture {
    fn new(listing: &str) -> Self {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.on("arecord -l", CommandOutput::ok(listing));
        let config = CaptureConfig {
            output_dir: dir.path().join("recordings"),
            test_seconds: 1,
            ..CaptureConfig::default()
        };
        let log = RunLog::create(&dir.path().join("logs"), "mic")
            .unwrap()
            .without_console();
        Self {
            dir,
            runner,
            config,
            log,
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.dir.path().join("state").join("mic.toml"))
    }

    fn manager<'a>(&'a self, engine: &'a SimulatedCapture) -> MicManager<'a> {
        MicManager::new(&self.runner, engine, &self.config, self.store())
    }

    fn log_text(&self) -> String {
        std::fs::read_to_string(self.log.path().unwrap()).unwrap()
    }

    fn options(&self, name: &str) -> RecordOptions {
        RecordOptions {
            name: Some(name.to_string()),
            duration: Some(RecordDuration::from_secs(2)),
            ..Default::default()
        }
    }
}

#[tokio::test]
async fn detect_warns_on_multiple_candidates_and_persists_first() {
    let fx = Fixture::new(TWO_MICS);
    let engine = SimulatedCapture::default();
    let state = fx.manager(&engine).detect(&fx.log).await.unwrap();

    assert_eq!(state.identifier, "Device");
    assert_eq!(state.control_handle.as_deref(), Some("plughw:CARD=Device,DEV=0"));

    let text = fx.log_text();
    assert!(text.contains("[WARNING] 2 capture devices found"));
    assert!(text.contains("--device"));
    assert!(text.contains("Yeti"));

    let saved = fx.store().load().unwrap().unwrap();
    assert_eq!(saved.identifier, "Device");

    // The test capture file does not linger.
    let leftovers: Vec<_> = std::fs::read_dir(fx.dir.path().join("state"))
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".wav"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn detect_single_candidate_has_no_warning() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::default();
    fx.manager(&engine).detect(&fx.log).await.unwrap();
    assert!(!fx.log_text().contains("[WARNING]"));
}

#[tokio::test]
async fn detect_without_external_device_fails() {
    let fx = Fixture::new("card 0: Headphones [bcm2835 Headphones], device 0: bcm2835 Headphones [bcm2835 Headphones]\n");
    let engine = SimulatedCapture::default();
    let err = fx.manager(&engine).detect(&fx.log).await.unwrap_err();
    assert!(matches!(err, DeviceError::NoCaptureDevice));
    assert!(fx.store().load().unwrap().is_none());
}

#[tokio::test]
async fn detect_rejects_silent_test_capture() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::failing("device busy");
    let err = fx.manager(&engine).detect(&fx.log).await.unwrap_err();
    assert!(matches!(err, DeviceError::RecordingFailed(_)));
    assert!(fx.store().load().unwrap().is_none());
}

#[tokio::test]
async fn record_uses_remembered_device_and_preset() {
    let fx = Fixture::new(TWO_MICS);
    fx.store()
        .save(&DeviceSessionState::new("Yeti", Some("plughw:CARD=Yeti,DEV=0".to_string())))
        .unwrap();

    let engine = SimulatedCapture::default();
    let opts = RecordOptions {
        preset: Some("voice".to_string()),
        ..fx.options("memo")
    };
    let recording = fx
        .manager(&engine)
        .record(&opts, &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(recording.path, fx.config.output_dir.join("memo.wav"));
    assert_eq!(recording.preset, QualityPreset::Voice);
    assert!(!recording.interrupted);
    assert_eq!(recording.info.sample_rate, 22050);
    assert_eq!(recording.info.channels, 1);
    assert!((recording.info.duration_secs() - 2.0).abs() < 0.01);

    let req = &engine.requests()[0];
    assert_eq!(req.handle, "plughw:CARD=Yeti,DEV=0");
    // No detection was needed.
    assert!(!fx.runner.was_called("arecord -l"));
}

#[tokio::test]
async fn record_detects_when_nothing_is_configured() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::default();
    fx.manager(&engine)
        .record(&fx.options("first"), &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    assert!(fx.runner.was_called("arecord -l"));
    assert!(fx.store().load().unwrap().is_some());
    // Test capture, then the real one.
    assert_eq!(engine.requests().len(), 2);
}

#[tokio::test]
async fn unknown_preset_falls_back_with_warning() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::default();
    let opts = RecordOptions {
        preset: Some("studio".to_string()),
        device: Some("plughw:CARD=Device,DEV=0".to_string()),
        ..fx.options("take")
    };
    let recording = fx
        .manager(&engine)
        .record(&opts, &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(recording.preset, QualityPreset::Cd);
    assert!(fx.log_text().contains("[WARNING] Unknown quality preset 'studio'"));
}

#[tokio::test]
async fn failed_recording_removes_partial_file() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::failing("audio open error: Device or resource busy");
    let opts = RecordOptions {
        device: Some("plughw:CARD=Device,DEV=0".to_string()),
        ..fx.options("broken")
    };
    let err = fx
        .manager(&engine)
        .record(&opts, &fx.log, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DeviceError::RecordingFailed(reason) => assert!(reason.contains("busy")),
        other => panic!("expected RecordingFailed, got {other:?}"),
    }
    assert!(!fx.config.output_dir.join("broken.wav").exists());
}

#[tokio::test]
async fn interrupted_recording_keeps_captured_audio() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::interrupted();
    let cancel = CancellationToken::new();
    let opts = RecordOptions {
        device: Some("plughw:CARD=Device,DEV=0".to_string()),
        ..fx.options("partial")
    };
    let recording = fx
        .manager(&engine)
        .record(&opts, &fx.log, &cancel)
        .await
        .unwrap();

    assert!(recording.interrupted);
    assert!(cancel.is_cancelled());
    assert!(recording.path.exists());
    assert!(fx.log_text().contains("[WARNING] Recording interrupted"));
}

#[tokio::test]
async fn existing_file_is_not_overwritten() {
    let fx = Fixture::new(ONE_MIC);
    std::fs::create_dir_all(&fx.config.output_dir).unwrap();
    let path = fx.config.output_dir.join("keep.wav");
    std::fs::write(&path, b"precious").unwrap();

    let engine = SimulatedCapture::default();
    let opts = RecordOptions {
        device: Some("plughw:CARD=Device,DEV=0".to_string()),
        ..fx.options("keep")
    };
    let err = fx
        .manager(&engine)
        .record(&opts, &fx.log, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DeviceError::RecordingFailed(_)));
    assert_eq!(std::fs::read(&path).unwrap(), b"precious");
    assert!(engine.requests().is_empty());
}

#[tokio::test]
async fn recordings_are_listed_and_readable() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::default();
    let manager = fx.manager(&engine);
    let device = Some("plughw:CARD=Device,DEV=0".to_string());

    for name in ["one", "two"] {
        let opts = RecordOptions {
            device: device.clone(),
            ..fx.options(name)
        };
        manager
            .record(&opts, &fx.log, &CancellationToken::new())
            .await
            .unwrap();
    }
    std::fs::write(fx.config.output_dir.join("notes.txt"), "skip").unwrap();

    let files = recordings(&fx.config.output_dir).unwrap();
    assert_eq!(files.len(), 2);
    for file in &files {
        let info = wav::read_info(&file.path).unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.file_len, file.size);
    }
}

#[tokio::test]
async fn status_reports_presence() {
    let fx = Fixture::new(ONE_MIC);
    let engine = SimulatedCapture::default();
    let manager = fx.manager(&engine);

    assert!(manager.status().await.unwrap().state.is_none());

    manager.detect(&fx.log).await.unwrap();
    let status = manager.status().await.unwrap();
    assert!(status.state.is_some());
    assert_eq!(status.present.map(|d| d.card_id), Some("Device".to_string()));

    assert!(manager.reset().unwrap());
    assert!(manager.status().await.unwrap().state.is_none());
}
