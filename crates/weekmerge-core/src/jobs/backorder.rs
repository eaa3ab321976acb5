use anyhow::{Context, Result};
use tracing::info;
use weekmerge_extracts::schema::BACKORDER;
use weekmerge_extracts::{DatasetKind, DelimitedFormat};

use super::{read_batch, IngestionJob, JobContext, RunOutcome, RunReport};
use crate::key_correction::{correct_week_keys, normalize_trailing_counts};
use crate::merge::consume_source;
use crate::storage::{DelimitedStore, StorageAdapter};

pub const WEEK_KEY_COLUMN: &str = "Year Week";
pub const LOAD_DATE_COLUMN: &str = "Pipeline - DtLoad";
pub const OUTPUT_FILE: &str = "backorder.csv";

/// Corrects ambiguous week keys of the backorder extract and replaces the
/// derived backorder file.
pub struct BackorderJob;

impl IngestionJob for BackorderJob {
    fn code_identifier(&self) -> &'static str {
        "backorder_v1"
    }

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Backorder
    }

    fn run(&self, ctx: &JobContext) -> Result<RunReport> {
        let kind = self.dataset();
        let source = ctx.layout.input_dir(kind).join(BACKORDER.file_name);
        let extract = read_batch(ctx, kind, &source, &BACKORDER)?;
        let rows_read = extract.dataframe.height();

        let correction = correct_week_keys(&extract.dataframe, WEEK_KEY_COLUMN, LOAD_DATE_COLUMN)
            .context("failed to correct backorder week keys")?;
        let key_adjustments = correction.adjusted_rows();
        info!(
            ambiguous_keys = correction.adjustments.len(),
            adjusted_rows = key_adjustments,
            "backorder week keys checked"
        );

        let corrected = normalize_trailing_counts(&correction.dataframe, BACKORDER.trailing_count_columns)
            .context("failed to normalise backorder counts")?;

        let snapshot = ctx
            .history(kind)
            .snapshot(
                &corrected,
                BACKORDER.file_name,
                DelimitedFormat::from(&BACKORDER),
                ctx.now,
            )
            .context("failed to write backorder history snapshot")?;

        let output = DelimitedStore::new(
            ctx.layout.dataset_dir(kind).join(OUTPUT_FILE),
            b',',
            BACKORDER.columns,
        );
        output
            .save(&corrected)
            .with_context(|| format!("failed to write {}", output.location().display()))?;
        info!(path = %output.location().display(), rows = corrected.height(), "saved backorder data");

        consume_source(&source)?;

        Ok(RunReport {
            run_id: ctx.run_id,
            dataset: kind,
            rows_read,
            rows_written: corrected.height(),
            outcome: RunOutcome::Replaced,
            key_adjustments,
            unreconciled_rows: 0,
            snapshot: Some(snapshot),
            output: output.location().to_path_buf(),
            source_fingerprint: Some(extract.fingerprint),
        })
    }
}
