use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;
use weekmerge_extracts::{read_extract, DatasetKind, DelimitedFormat, Extract, ExtractSchema};

use crate::config::{PathLayout, RunConfig};
use crate::error::MissingInput;
use crate::frames::concat_aligned;
use crate::history::HistoryArchive;
use crate::merge::{consume_source, MergeOutcome};
use crate::storage::{DelimitedStore, StorageAdapter};

pub mod backorder;
pub mod charged;
pub mod otif;
pub mod sales;
pub mod stock;

/// Everything a job needs for one run. Paths come from `config`, never from
/// process globals, so tests can point a job at a temporary tree.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub config: RunConfig,
    pub layout: PathLayout,
    pub run_id: Uuid,
    pub now: NaiveDateTime,
}

impl JobContext {
    pub fn new(config: RunConfig) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            run_id: Uuid::new_v4(),
            now: Local::now().naive_local(),
        }
    }

    /// Pins the run clock, which names history snapshots.
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn history(&self, kind: DatasetKind) -> HistoryArchive {
        HistoryArchive::new(self.layout.history_dir(kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A derived output was rewritten from this run's batch.
    Replaced,
    Created,
    Appended { new_rows: usize },
    UpToDate,
}

impl From<MergeOutcome> for RunOutcome {
    fn from(outcome: MergeOutcome) -> Self {
        match outcome {
            MergeOutcome::Created { .. } => RunOutcome::Created,
            MergeOutcome::Appended { new_rows, .. } => RunOutcome::Appended { new_rows },
            MergeOutcome::UpToDate => RunOutcome::UpToDate,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Replaced => f.write_str("replaced"),
            RunOutcome::Created => f.write_str("created"),
            RunOutcome::Appended { new_rows } => write!(f, "appended {new_rows} rows"),
            RunOutcome::UpToDate => f.write_str("up to date"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dataset: DatasetKind,
    pub rows_read: usize,
    pub rows_written: usize,
    pub outcome: RunOutcome,
    pub key_adjustments: usize,
    pub unreconciled_rows: usize,
    pub snapshot: Option<PathBuf>,
    pub output: PathBuf,
    pub source_fingerprint: Option<String>,
}

impl RunReport {
    /// Plain text rendering used as the body of success notifications.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "{} data has been processed successfully ({}).",
                self.dataset.display_name(),
                self.outcome
            ),
            format!("Rows read: {}", self.rows_read),
            format!("Rows written: {}", self.rows_written),
            format!("Output: {}", self.output.display()),
        ];
        if self.key_adjustments > 0 {
            lines.push(format!("Week keys corrected: {}", self.key_adjustments));
        }
        if self.unreconciled_rows > 0 {
            lines.push(format!(
                "Rows without master data entry: {}",
                self.unreconciled_rows
            ));
        }
        if let Some(snapshot) = &self.snapshot {
            lines.push(format!("History snapshot: {}", snapshot.display()));
        }
        lines.push(format!("Run id: {}", self.run_id));
        lines.join("\n")
    }
}

pub trait IngestionJob: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn dataset(&self) -> DatasetKind;
    fn run(&self, ctx: &JobContext) -> Result<RunReport>;
}

static JOBS: Lazy<Vec<&'static dyn IngestionJob>> = Lazy::new(|| {
    vec![
        &backorder::BackorderJob as &dyn IngestionJob,
        &otif::OtifJob as &dyn IngestionJob,
        &charged::ChargedJob as &dyn IngestionJob,
        &sales::SalesJob as &dyn IngestionJob,
        &stock::StockJob as &dyn IngestionJob,
    ]
});

pub fn all_jobs() -> &'static [&'static dyn IngestionJob] {
    JOBS.as_slice()
}

pub fn job_for(kind: DatasetKind) -> Option<&'static dyn IngestionJob> {
    all_jobs().iter().copied().find(|job| job.dataset() == kind)
}

/// Reads the batch extract of this run. An absent file is classified
/// against the history archive.
pub(crate) fn read_batch(
    ctx: &JobContext,
    kind: DatasetKind,
    path: &Path,
    schema: &ExtractSchema,
) -> Result<Extract> {
    match read_extract(path, schema) {
        Ok(extract) => {
            info!(
                path = %path.display(),
                rows = extract.dataframe.height(),
                fingerprint = %extract.fingerprint,
                "loaded {} extract",
                schema.name
            );
            Ok(extract)
        }
        Err(err) if err.is_not_found() => {
            let missing = classify_missing(ctx, kind, path, schema.file_name)?;
            error!(path = %missing.path().display(), "{missing}");
            Err(missing.into())
        }
        Err(err) => Err(err).with_context(|| format!("failed to load {}", path.display())),
    }
}

/// Reads a prior-period extract that someone has to download by hand.
pub(crate) fn read_reference(path: &Path, schema: &ExtractSchema) -> Result<Extract> {
    match read_extract(path, schema) {
        Ok(extract) => {
            info!(
                path = %path.display(),
                rows = extract.dataframe.height(),
                "loaded {} extract",
                schema.name
            );
            Ok(extract)
        }
        Err(err) if err.is_not_found() => {
            let missing = MissingInput::ManualDownloadRequired {
                path: path.to_path_buf(),
            };
            error!(path = %missing.path().display(), "{missing}");
            Err(missing.into())
        }
        Err(err) => Err(err).with_context(|| format!("failed to load {}", path.display())),
    }
}

fn classify_missing(
    ctx: &JobContext,
    kind: DatasetKind,
    path: &Path,
    file_name: &str,
) -> Result<MissingInput> {
    let latest = ctx
        .history(kind)
        .latest_snapshot_of(file_name)
        .context("failed to search history snapshots")?;

    Ok(match latest {
        Some(last_snapshot) => MissingInput::AlreadyProcessed {
            path: path.to_path_buf(),
            last_snapshot,
        },
        None => MissingInput::NeverProduced {
            path: path.to_path_buf(),
            owner: ctx.config.owner_for(kind).to_string(),
        },
    })
}

/// Shared flow of the current/past extract pairs: the prior-period extract
/// is prepared by `prepare_past`, stacked under the current one and written
/// to `output_file`; only the current extract is archived and consumed.
pub(crate) fn replace_with_current_and_past<F>(
    ctx: &JobContext,
    kind: DatasetKind,
    current_schema: &'static ExtractSchema,
    past_schema: &'static ExtractSchema,
    output_file: &str,
    prepare_past: F,
) -> Result<RunReport>
where
    F: FnOnce(&DataFrame) -> Result<DataFrame>,
{
    let current_path = ctx.layout.current_dir(kind).join(current_schema.file_name);
    let current = read_batch(ctx, kind, &current_path, current_schema)?;

    let past_path = ctx.layout.past_dir(kind).join(past_schema.file_name);
    let past = read_reference(&past_path, past_schema)?;
    let past_frame = prepare_past(&past.dataframe)?;

    let combined = concat_aligned(&current.dataframe, &past_frame)
        .with_context(|| format!("failed to combine {} extracts", kind.display_name()))?;
    info!(
        current = current.dataframe.height(),
        past = past_frame.height(),
        total = combined.height(),
        "combined current and past extracts"
    );

    let snapshot = ctx
        .history(kind)
        .snapshot(
            &current.dataframe,
            current_schema.file_name,
            DelimitedFormat::from(current_schema),
            ctx.now,
        )
        .with_context(|| format!("failed to write {} history snapshot", kind.display_name()))?;

    let output = DelimitedStore::new(
        ctx.layout.dataset_dir(kind).join(output_file),
        b';',
        current_schema.columns,
    );
    output
        .save(&combined)
        .with_context(|| format!("failed to write {}", output.location().display()))?;
    info!(path = %output.location().display(), rows = combined.height(), "saved {} data", kind.as_str());

    consume_source(&current_path)?;

    Ok(RunReport {
        run_id: ctx.run_id,
        dataset: kind,
        rows_read: current.dataframe.height() + past.dataframe.height(),
        rows_written: combined.height(),
        outcome: RunOutcome::Replaced,
        key_adjustments: 0,
        unreconciled_rows: 0,
        snapshot: Some(snapshot),
        output: output.location().to_path_buf(),
        source_fingerprint: Some(current.fingerprint),
    })
}
