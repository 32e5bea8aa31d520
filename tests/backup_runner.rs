use pitools::config::AppConfig;
use pitools::core::transfer_engine::SimulatedEngine;
use pitools::core::{BackupRunner, SourceSpec, TransferOutcome, resolve_many};
use pitools::error::BackupError;
use pitools::report::RunLog;
use std::path::Path;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

struct Fixture {
    _root: TempDir,
    config: AppConfig,
    log: RunLog,
}

/// Sources `home`, `etc` and `www` under a temp dir; `www` only when `with_www`.
fn fixture(with_www: bool) -> Fixture {
    let root = tempdir().unwrap();
    let base = root.path();

    for name in ["home", "etc"] {
        std::fs::create_dir_all(base.join("src").join(name)).unwrap();
    }
    if with_www {
        std::fs::create_dir_all(base.join("src/www")).unwrap();
    }

    let config = AppConfig {
        destination_base: base.join("backup"),
        log_directory: base.join("logs"),
        min_free_space_gb: 0,
        sources: ["home", "etc", "www"]
            .iter()
            .map(|n| SourceSpec::new(*n, base.join("src").join(n)))
            .collect(),
        ..AppConfig::default()
    };
    let log = RunLog::create(&config.log_directory, "backup")
        .unwrap()
        .without_console();

    Fixture {
        _root: root,
        config,
        log,
    }
}

fn log_text(log: &RunLog) -> String {
    std::fs::read_to_string(log.path().unwrap()).unwrap()
}

fn line_with<'a>(text: &'a str, level: &str, name: &str) -> Option<&'a str> {
    text.lines()
        .find(|l| l.contains(&format!("[{}]", level)) && l.contains(name))
}

#[tokio::test]
async fn failing_target_does_not_stop_the_batch() {
    let fx = fixture(true);
    let engine = SimulatedEngine::default().with_exit_code("home", 23);
    let runner = BackupRunner::new(&fx.config, &engine);

    let res = resolve_many(&fx.config.sources, &["all"]);
    let report = runner
        .run(&res.targets, &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].outcome, TransferOutcome::Failed(23));
    assert_eq!(report.results[0].exit_code, Some(23));
    assert!(report.results[1].succeeded());
    assert!(report.results[2].succeeded());
    assert_eq!(report.exit_code(), 1);
    assert!(report.summary().contains("home"));

    let text = log_text(&fx.log);
    assert!(line_with(&text, "ERROR", "home").is_some());
    assert!(line_with(&text, "SUCCESS", "etc").is_some());
    assert!(line_with(&text, "SUCCESS", "www").is_some());
}

#[tokio::test]
async fn all_succeeding_exits_zero_and_creates_destinations() {
    let fx = fixture(true);
    let engine = SimulatedEngine::default();
    let runner = BackupRunner::new(&fx.config, &engine);

    let res = resolve_many(&fx.config.sources, &["etc", "home"]);
    let report = runner
        .run(&res.targets, &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.exit_code(), 0);
    assert!(fx.config.destination_base.join("home").is_dir());
    assert!(fx.config.destination_base.join("etc").is_dir());
    assert!(!fx.config.destination_base.join("www").exists());

    let names: Vec<String> = engine.requests().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["home", "etc"]);
}

#[tokio::test]
async fn missing_source_is_warned_and_counted_as_failure() {
    let fx = fixture(false);
    let engine = SimulatedEngine::default();
    let runner = BackupRunner::new(&fx.config, &engine);

    let report = runner
        .run(&fx.config.sources, &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    let www = &report.results[2];
    assert_eq!(www.outcome, TransferOutcome::SourceMissing);
    assert!(!www.succeeded());
    assert_eq!(report.exit_code(), 1);
    // The engine never saw the missing source.
    assert_eq!(engine.requests().len(), 2);

    let text = log_text(&fx.log);
    assert!(line_with(&text, "WARNING", "www").is_some());
}

#[tokio::test]
async fn excludes_and_dry_run_reach_the_engine() {
    let mut fx = fixture(true);
    fx.config.exclude_patterns = vec!["*.cache".to_string(), "node_modules".to_string()];
    let engine = SimulatedEngine::default();
    let runner = BackupRunner::new(&fx.config, &engine).dry_run(true);

    runner
        .run(&fx.config.sources[..1], &fx.log, &CancellationToken::new())
        .await
        .unwrap();

    let req = &engine.requests()[0];
    assert!(req.dry_run);
    assert_eq!(req.excludes, fx.config.exclude_patterns);
    assert_eq!(req.destination, fx.config.destination_base.join("home"));
    // Dry runs leave the destination untouched.
    assert!(!Path::new(&req.destination).exists());
}

#[tokio::test]
async fn insufficient_space_aborts_before_any_transfer() {
    let mut fx = fixture(true);
    fx.config.min_free_space_gb = u64::MAX;
    let engine = SimulatedEngine::default();
    let runner = BackupRunner::new(&fx.config, &engine);

    let err = runner
        .run(&fx.config.sources, &fx.log, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::InsufficientSpace { .. }));
    assert!(engine.requests().is_empty());
}

#[tokio::test]
async fn cancellation_skips_remaining_targets() {
    let fx = fixture(true);
    let engine = SimulatedEngine::default().cancel_after("home");
    let runner = BackupRunner::new(&fx.config, &engine);
    let cancel = CancellationToken::new();

    let report = runner
        .run(&fx.config.sources, &fx.log, &cancel)
        .await
        .unwrap();

    assert!(cancel.is_cancelled());
    assert!(report.results[0].succeeded());
    assert_eq!(report.results[1].outcome, TransferOutcome::Interrupted);
    assert_eq!(report.results[2].outcome, TransferOutcome::Interrupted);
    assert_eq!(engine.requests().len(), 1);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn unknown_targets_fail_the_report_but_valid_ones_run() {
    let fx = fixture(true);
    let engine = SimulatedEngine::default();
    let runner = BackupRunner::new(&fx.config, &engine);

    let res = resolve_many(&fx.config.sources, &["photos", "etc"]);
    let report = runner
        .run(&res.targets, &fx.log, &CancellationToken::new())
        .await
        .unwrap()
        .with_unknown(res.unknown);

    assert_eq!(report.results.len(), 1);
    assert!(report.results[0].succeeded());
    assert_eq!(report.exit_code(), 1);
    assert!(report.summary().contains("photos"));
}
