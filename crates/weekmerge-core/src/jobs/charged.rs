use std::fs;

use anyhow::{Context, Result};
use tracing::info;
use weekmerge_extracts::schema::CHARGED_EXPORT;
use weekmerge_extracts::DatasetKind;

use super::{IngestionJob, JobContext, RunOutcome, RunReport};
use crate::reconcile::{CompositeKeySource, MasterKeyReconciler, MasterTable};
use crate::release_alignment::align_prior_release;
use crate::source::{hyphenate_release, render_release_query, DelimitedExportSource, QuerySource};
use crate::storage::{DelimitedStore, StorageAdapter};
use crate::weekly_delta::compute_weekly_deltas;

pub const CLUSTER_COLUMN: &str = "ClusterKey";
pub const WEEK_KEY_COLUMN: &str = "UpdateYearWeekKey";
pub const CUMULATIVE_COLUMN: &str = "TotalChargedQuantity";
pub const DELTA_COLUMN: &str = "WeeklyChargedQuantity";
pub const IDENTIFIER_COLUMN: &str = "UPC";
pub const OUTPUT_FILE: &str = "charged.csv";

/// Rebuilds the weekly charged quantities of the current and prior-year
/// releases.
pub struct ChargedJob;

impl ChargedJob {
    /// Runs against an explicit query source.
    pub fn run_with_source(&self, ctx: &JobContext, source: &dyn QuerySource) -> Result<RunReport> {
        let kind = self.dataset();
        let config = &ctx.config;

        let query_path = config.charged_query_path();
        let template = fs::read_to_string(&query_path)
            .with_context(|| format!("failed to read query template {}", query_path.display()))?;
        let query = render_release_query(&template, &config.release, &config.release_ly);
        info!(release = %config.release, release_ly = %config.release_ly, "executing charged query");

        let charged = source.fetch(&query).context("charged query failed")?;
        let rows_read = charged.height();

        let master_path = config.master_data_path();
        let master = MasterTable::load(&master_path)
            .with_context(|| format!("failed to load master data {}", master_path.display()))?;
        let reconciler = MasterKeyReconciler::new(
            &master,
            CompositeKeySource::Prebuilt {
                model: "model",
                grid: "grid",
            },
            IDENTIFIER_COLUMN,
        );
        let reconciliation = reconciler
            .reconcile(&charged)
            .context("failed to reconcile charged rows with master data")?;
        info!(
            matched = reconciliation.matched.height(),
            unreconciled = reconciliation.unreconciled.height(),
            "charged rows reconciled"
        );

        let prior_cluster = hyphenate_release(&config.release_ly);
        let alignment = align_prior_release(
            &reconciliation.matched,
            CLUSTER_COLUMN,
            WEEK_KEY_COLUMN,
            &prior_cluster,
        )
        .context("failed to align prior release week keys")?;

        let weekly = compute_weekly_deltas(
            &alignment.dataframe,
            IDENTIFIER_COLUMN,
            WEEK_KEY_COLUMN,
            CUMULATIVE_COLUMN,
            DELTA_COLUMN,
        )
        .context("failed to compute weekly charged quantities")?;

        let output = DelimitedStore::new(
            ctx.layout.dataset_dir(kind).join(OUTPUT_FILE),
            b';',
            CHARGED_EXPORT.columns,
        );
        output
            .save(&weekly)
            .with_context(|| format!("failed to write {}", output.location().display()))?;
        info!(path = %output.location().display(), rows = weekly.height(), "saved charged data");

        Ok(RunReport {
            run_id: ctx.run_id,
            dataset: kind,
            rows_read,
            rows_written: weekly.height(),
            outcome: RunOutcome::Replaced,
            key_adjustments: alignment.shifted_rows,
            unreconciled_rows: reconciliation.unreconciled.height(),
            snapshot: None,
            output: output.location().to_path_buf(),
            source_fingerprint: None,
        })
    }
}

impl IngestionJob for ChargedJob {
    fn code_identifier(&self) -> &'static str {
        "charged_v1"
    }

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Charged
    }

    fn run(&self, ctx: &JobContext) -> Result<RunReport> {
        let source = DelimitedExportSource::new(ctx.config.charged_export_path(), &CHARGED_EXPORT);
        self.run_with_source(ctx, &source)
    }
}
