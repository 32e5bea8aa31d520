use clap::{ArgGroup, Parser};
use pitools::cli::{fatal, parse_args};
use pitools::config::AppConfig;
use pitools::context::AppContext;
use pitools::core::bluetooth::{DeviceReport, Overview, SpeakerManager};
use pitools::core::state::StateStore;
use pitools::error::DeviceError;
use pitools::logging::{self, LogConfig};
use pitools::report::RunLog;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pi-speaker", version)]
#[command(about = "Pair, connect and route audio to a Bluetooth speaker", long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["setup", "scan", "connect", "disconnect", "status", "reset"]),
))]
struct Cli {
    /// Power on the controller and register a pairing agent
    #[arg(long)]
    setup: bool,

    /// Discover nearby devices
    #[arg(long)]
    scan: bool,

    /// Pair, trust and connect a device, then make it the default output
    #[arg(long, value_name = "ID")]
    connect: Option<String>,

    /// Disconnect a device
    #[arg(long, value_name = "ID")]
    disconnect: Option<String>,

    /// Show one device, or every known device when ID is omitted
    #[arg(long, value_name = "ID", num_args = 0..=1)]
    status: Option<Option<String>>,

    /// Forget the configured speaker
    #[arg(long)]
    reset: bool,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    config_file: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, hide = true)]
    log_json: bool,
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
    let log = ctx.open_run_log("speaker");

    let store = StateStore::new(ctx.config.speaker_state_path());
    let manager = SpeakerManager::new(ctx.runner.as_ref(), &ctx.config.bluetooth, store);

    let result = tokio::select! {
        result = dispatch(&cli, &manager, &log) => result,
        _ = ctx.cancel.cancelled() => {
            log.warning("Interrupted");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(
    cli: &Cli,
    manager: &SpeakerManager<'_>,
    log: &RunLog,
) -> Result<(), DeviceError> {
    if cli.setup {
        return manager.setup(log).await;
    }

    if cli.scan {
        let found = manager.scan(log).await?;
        if found.is_empty() {
            log.warning("No devices found");
        } else {
            log.success(format!("{} device(s) found", found.len()));
            for device in &found {
                println!("  {}  {}", device.identifier, device.name);
            }
        }
        return Ok(());
    }

    if let Some(id) = &cli.connect {
        manager.connect(id, log).await?;
        return Ok(());
    }

    if let Some(id) = &cli.disconnect {
        return manager.disconnect(id, log).await;
    }

    if let Some(target) = &cli.status {
        match target {
            Some(id) => print_device(&manager.device_status(id).await?),
            None => print_overview(&manager.overview().await?),
        }
        return Ok(());
    }

    if cli.reset {
        if manager.reset()? {
            log.success("Configured speaker forgotten");
        } else {
            log.info("No speaker was configured");
        }
    }

    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn print_device(report: &DeviceReport) {
    let info = &report.info;
    println!("Device:    {}", report.identifier);
    println!("Name:      {}", info.name.as_deref().unwrap_or("-"));
    println!("Status:    {}", info.link_status());
    println!("Paired:    {}", yes_no(info.paired));
    println!("Trusted:   {}", yes_no(info.trusted));
    println!("Connected: {}", yes_no(info.connected));
    println!("Sink:      {}", report.sink.as_deref().unwrap_or("-"));
}

fn print_overview(overview: &Overview) {
    if overview.devices.is_empty() {
        println!("No known devices");
    } else {
        println!("Known devices:");
        for (device, status) in &overview.devices {
            println!("  {:<10} {}  {}", status.to_string(), device.identifier, device.name);
        }
    }

    println!();
    println!(
        "Default sink: {}",
        overview.default_sink.as_deref().unwrap_or("-")
    );
    match &overview.configured {
        Some(state) => println!(
            "Configured:   {} (since {})",
            state.identifier,
            state.last_detected_at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Configured:   -"),
    }
}
