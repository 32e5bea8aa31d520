use clap::{Parser, Subcommand};
use pitools::cli::{fatal, parse_args};
use pitools::config::AppConfig;
use pitools::context::AppContext;
use pitools::core::backup::format_bytes;
use pitools::core::capture::{
    ArecordEngine, MicManager, QualityPreset, RecordDuration, RecordOptions, recordings, wav,
};
use pitools::core::state::StateStore;
use pitools::error::DeviceError;
use pitools::logging::{self, LogConfig};
use pitools::report::RunLog;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pi-mic", version)]
#[command(about = "Detect a USB microphone and record WAV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Output file name, without directory (default: recording_<timestamp>.wav)
    #[arg(short = 'f', long = "file", value_name = "NAME", global = true)]
    name: Option<String>,

    /// Stop after this long: 90, 30s, 5m, 2h (default: until Ctrl+C)
    #[arg(short, long, value_name = "DURATION", global = true)]
    duration: Option<RecordDuration>,

    /// Quality preset: cd, dat, phone, voice
    #[arg(short = 'q', long = "quality", value_name = "PRESET", global = true)]
    preset: Option<String>,

    /// Directory for recordings
    #[arg(short, long = "output", value_name = "DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Capture device handle, e.g. plughw:CARD=Device,DEV=0
    #[arg(long, value_name = "HANDLE", global = true)]
    device: Option<String>,

    /// Configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, hide = true, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Record from the microphone (default)
    Record,
    /// Find the microphone, run a short test capture and remember it
    Detect,
    /// Show the configured microphone and whether it is plugged in
    Status,
    /// List recordings, newest first
    List,
    /// List capture hardware
    Devices,
    /// Show the format and duration of a WAV file
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Forget the configured microphone
    Reset,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli: Cli = match parse_args() {
        Ok(cli) => cli,
        Err(code) => return code,
    };

    logging::init(LogConfig {
        json: cli.log_json,
        verbose: cli.verbose,
    });

    let config = match AppConfig::load(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => return fatal(e),
    };

    let ctx = AppContext::new(config);
    ctx.cancel_on_ctrl_c();

    let command = cli.command.clone().unwrap_or(Command::Record);

    // Read-only commands do not need a run log.
    match &command {
        Command::Info { file } => return show_info(file),
        Command::List => return list_recordings(&ctx, &cli),
        _ => {}
    }

    let log = ctx.open_run_log("mic");
    let engine = ArecordEngine::new();
    let store = StateStore::new(ctx.config.mic_state_path());
    let manager = MicManager::new(ctx.runner.as_ref(), &engine, &ctx.config.capture, store);

    match run(&command, &cli, &ctx, &manager, &log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: &Command,
    cli: &Cli,
    ctx: &AppContext,
    manager: &MicManager<'_>,
    log: &RunLog,
) -> Result<(), DeviceError> {
    match command {
        Command::Record => {
            let opts = RecordOptions {
                name: cli.name.clone(),
                duration: cli.duration,
                preset: cli.preset.clone(),
                output_dir: cli.output_dir.clone(),
                device: cli.device.clone(),
            };
            let recording = manager.record(&opts, log, &ctx.cancel).await?;
            println!("{}", recording.path.display());
            println!("{}", recording.info);
        }
        Command::Detect => {
            manager.detect(log).await?;
        }
        Command::Status => {
            let status = manager.status().await?;
            match &status.state {
                Some(state) => {
                    println!(
                        "Configured: {} ({})",
                        state.identifier,
                        state.control_handle.as_deref().unwrap_or("-")
                    );
                    println!(
                        "Detected:   {}",
                        state.last_detected_at.format("%Y-%m-%d %H:%M:%S")
                    );
                    match &status.present {
                        Some(device) => println!("Present:    yes, {}", device),
                        None => println!("Present:    no"),
                    }
                }
                None => println!("Configured: - (run `pi-mic detect`)"),
            }
            println!("Presets:    {}", preset_list());
        }
        Command::Devices => {
            let devices = manager.list_devices().await?;
            if devices.is_empty() {
                log.warning("No capture devices found");
            }
            for device in &devices {
                println!("  {}", device);
            }
        }
        Command::Reset => {
            if manager.reset()? {
                log.success("Configured microphone forgotten");
            } else {
                log.info("No microphone was configured");
            }
        }
        Command::List | Command::Info { .. } => {}
    }
    Ok(())
}

fn preset_list() -> String {
    QualityPreset::ALL
        .iter()
        .map(|p| format!("{} ({})", p, p.format()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn show_info(file: &std::path::Path) -> ExitCode {
    match wav::read_info(file) {
        Ok(info) => {
            println!("File:        {}", file.display());
            println!("{}", info);
            ExitCode::SUCCESS
        }
        Err(e) => fatal(e),
    }
}

fn list_recordings(ctx: &AppContext, cli: &Cli) -> ExitCode {
    let dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| ctx.config.capture.output_dir.clone());

    let files = match recordings(&dir) {
        Ok(files) => files,
        Err(e) => return fatal(format!("Cannot read {}: {}", dir.display(), e)),
    };

    if files.is_empty() {
        println!("No recordings in {}", dir.display());
        return ExitCode::SUCCESS;
    }
    for file in &files {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "{}  {:>10}  {}",
            file.modified.format("%Y-%m-%d %H:%M"),
            format_bytes(file.size),
            name
        );
    }
    ExitCode::SUCCESS
}
