use clap::{CommandFactory, Parser};
use pitools::cli::{fatal, parse_args};
use pitools::config::AppConfig;
use pitools::context::AppContext;
use pitools::core::backup::{BackupRunner, available_space, format_bytes};
use pitools::core::targets::resolve_many;
use pitools::core::transfer_engine::{TransferEngineType, create_engine};
use pitools::logging::{self, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pi-backup", version)]
#[command(about = "Mirror configured folders to the backup disk with rsync", long_about = None)]
#[command(after_help = "Targets: `all` or any configured source name (see --list).")]
struct Cli {
    /// Sources to back up
    #[arg(value_name = "TARGET")]
    targets: Vec<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    config: bool,

    /// List configured sources and exit
    #[arg(long)]
    list: bool,

    /// Show what would change without copying
    #[arg(long)]
    dry_run: bool,

    /// Run without rsync; every transfer succeeds and copies nothing
    #[arg(long, hide = true)]
    simulation: bool,

    /// Configuration file (default: $PITOOLS_CONFIG or ~/.config/pitools/config.toml)
    #[arg(long, value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Debug output of the commands being run
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

    if cli.config {
        return match toml::to_string_pretty(&config) {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => fatal(e),
        };
    }

    if cli.list {
        print_sources(&config);
        return ExitCode::SUCCESS;
    }

    if cli.targets.is_empty() {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    }

    let ctx = AppContext::new(config);
    ctx.cancel_on_ctrl_c();
    run_backup(&ctx, &cli).await
}

async fn run_backup(ctx: &AppContext, cli: &Cli) -> ExitCode {
    let log = ctx.open_run_log("backup");
    log.info(format!("Backup started: {}", cli.targets.join(" ")));

    let resolution = resolve_many(&ctx.config.sources, &cli.targets);
    for unknown in &resolution.unknown {
        log.error(unknown.to_string());
    }
    if resolution.targets.is_empty() && resolution.unknown.is_empty() {
        log.error("No sources configured");
        return ExitCode::FAILURE;
    }

    let engine_type = if cli.simulation {
        TransferEngineType::Simulated
    } else {
        TransferEngineType::Rsync
    };
    let engine = create_engine(engine_type);
    let runner = BackupRunner::new(&ctx.config, engine.as_ref()).dry_run(cli.dry_run);

    let report = match runner.run(&resolution.targets, &log, &ctx.cancel).await {
        Ok(report) => report.with_unknown(resolution.unknown),
        Err(e) => {
            log.error(format!("Backup aborted: {}", e));
            return ExitCode::FAILURE;
        }
    };

    report.log_summary(&log);
    if let Some(path) = log.path() {
        log.info(format!("Log file: {}", path.display()));
    }

    if report.exit_code() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_sources(config: &AppConfig) {
    println!("Destination: {}", config.destination_base.display());
    if let Ok((_, free)) = available_space(&config.destination_base) {
        println!("Free space:  {}", format_bytes(free));
    }
    println!();
    println!("Targets:");
    for source in &config.sources {
        let marker = if source.path.exists() { "" } else { "  (missing)" };
        println!("  {:<12} {}{}", source.name, source.path.display(), marker);
    }
    println!("  {:<12} every target above", "all");
}
