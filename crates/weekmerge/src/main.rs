// crates/weekmerge/src/main.rs

use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::{error, info, info_span, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weekmerge_core::config::{resolve_config_path, RunConfig};
use weekmerge_core::jobs::{all_jobs, job_for, IngestionJob, JobContext, RunReport};
use weekmerge_core::notify::{notifier_from_config, Notification, Notifier};
use weekmerge_extracts::DatasetKind;

/// Weekly ingestion of wholesale forecasting extracts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path of the TOML run configuration; falls back to WEEKMERGE_CONFIG, then config/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print a table of the finished runs
    #[arg(long, global = true)]
    summary: bool,

    /// Print the run reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Correct backorder week keys and rewrite the backorder file.
    Backorder,
    /// Append the OTIF extract to the accumulating store.
    Otif,
    /// Rebuild weekly charged quantities for both releases.
    Charged,
    /// Stack the current and past sales & shipping extracts.
    Sales,
    /// Stack the current and past stock extracts.
    Stock,
    /// Run every job in order, stopping at the first failure.
    All,
}

impl Command {
    fn jobs(self) -> Vec<&'static dyn IngestionJob> {
        let kind = match self {
            Command::All => return all_jobs().to_vec(),
            Command::Backorder => DatasetKind::Backorder,
            Command::Otif => DatasetKind::Otif,
            Command::Charged => DatasetKind::Charged,
            Command::Sales => DatasetKind::Sales,
            Command::Stock => DatasetKind::Stock,
        };
        job_for(kind).into_iter().collect()
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.clone());
    let config = match RunConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(None);
            error!(error = %err, "could not load configuration");
            return ExitCode::FAILURE;
        }
    };

    match open_log_file(&config) {
        Ok(log) => {
            let path = log.as_ref().map(|(path, _)| path.clone());
            init_tracing(log.map(|(_, file)| file));
            if let Some(path) = path {
                info!(path = %path.display(), "writing log file");
            }
        }
        Err(err) => {
            init_tracing(None);
            warn!(error = %format!("{err:#}"), "log file unavailable; logging to stdout only");
        }
    }
    info!(config = %config_path.display(), release = %config.release, "configuration loaded");

    match run(&cli, &config) {
        Ok(reports) => {
            if cli.summary {
                print_summary(&reports);
            }
            if cli.json {
                match serde_json::to_string_pretty(&reports) {
                    Ok(json) => println!("{json}"),
                    Err(err) => warn!(error = %err, "could not render run reports"),
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_file: Option<File>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .with(file_layer)
        .init();
}

/// One log file per invocation, `<log_dir>/<YYYYMMDD_HHMMSS>_log_file.log`.
fn open_log_file(config: &RunConfig) -> Result<Option<(PathBuf, File)>> {
    let Some(dir) = &config.log_dir else {
        return Ok(None);
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join(format!("{}_log_file.log", Local::now().format("%Y%m%d_%H%M%S")));
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    Ok(Some((path, file)))
}

fn run(cli: &Cli, config: &RunConfig) -> Result<Vec<RunReport>> {
    let notifier = notifier_from_config(&config.notifications);
    let mut reports = Vec::new();
    for job in cli.command.jobs() {
        let ctx = JobContext::new(config.clone());
        reports.push(run_job(job, &ctx, notifier.as_ref())?);
    }
    Ok(reports)
}

fn run_job(job: &dyn IngestionJob, ctx: &JobContext, notifier: &dyn Notifier) -> Result<RunReport> {
    let kind = job.dataset();
    let span = info_span!(
        "job",
        dataset = %kind,
        code = job.code_identifier(),
        run_id = %ctx.run_id
    );
    let _guard = span.enter();
    info!("{} job started", kind.display_name());

    match job.run(ctx) {
        Ok(report) => {
            info!(
                outcome = %report.outcome,
                rows_read = report.rows_read,
                rows_written = report.rows_written,
                key_adjustments = report.key_adjustments,
                unreconciled_rows = report.unreconciled_rows,
                "{} job finished",
                kind.display_name()
            );
            let notification =
                Notification::success(&ctx.config.notifications, kind, report.summary());
            deliver(notifier, &notification);
            Ok(report)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "{} job failed", kind.display_name());
            let notification = Notification::failure(&ctx.config.notifications, kind, &err);
            deliver(notifier, &notification);
            Err(err.context(format!("{} job failed", kind.display_name())))
        }
    }
}

// A notification that cannot be delivered never changes the run's result.
fn deliver(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(err) = notifier.send(notification) {
        warn!(error = %err, subject = %notification.subject, "notification not delivered");
    }
}

fn print_summary(reports: &[RunReport]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Dataset",
        "Outcome",
        "Rows read",
        "Rows written",
        "Keys corrected",
        "Unreconciled",
        "Output",
    ]);
    for report in reports {
        table.add_row(vec![
            report.dataset.display_name().to_string(),
            report.outcome.to_string(),
            report.rows_read.to_string(),
            report.rows_written.to_string(),
            report.key_adjustments.to_string(),
            report.unreconciled_rows.to_string(),
            report.output.display().to_string(),
        ]);
    }
    println!("{table}");
}
