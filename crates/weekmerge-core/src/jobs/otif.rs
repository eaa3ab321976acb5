use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;
use weekmerge_extracts::schema::OTIF_RECLASS;
use weekmerge_extracts::{ColumnSpec, DatasetKind, DelimitedFormat};

use super::{read_batch, IngestionJob, JobContext, RunReport};
use crate::merge::IncrementalAppendMerger;
use crate::reconcile::{CompositeKeySource, MasterKeyReconciler, MasterTable};
use crate::storage::open_store;
use crate::temporal::{ShippingPeriod, TemporalKeyError};

pub const RELEASE_COLUMN: &str = "Release";
pub const STORE_STEM: &str = "otif";
pub const STORE_SEPARATOR: u8 = b';';
pub const IDENTIFIER_COLUMN: &str = "UPC";

/// Extract column and the name it carries in the store, in store order.
pub const COLUMN_RENAMES: [(&str, &str); 13] = [
    ("Style", "model"),
    ("Grid", "grid"),
    ("Yyear", "year"),
    ("Mmonth", "month"),
    ("Wweek", "week"),
    ("Qquarter", "quarter"),
    ("BusinessUnit", "business_unit"),
    ("OrderSpecification", "order_specification"),
    ("OrderType", "order_type"),
    ("KeyAccount", "key_account"),
    ("Region", "region"),
    ("OTIF Num Shipped Qty Net", "shipped_qty_net"),
    ("OTIF Den ToBeShpped Qty Net", "to_be_shipped_qty_net"),
];

pub const STORE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::text("model"),
    ColumnSpec::text("grid"),
    ColumnSpec::text("year"),
    ColumnSpec::text("month"),
    ColumnSpec::text("week"),
    ColumnSpec::text("quarter"),
    ColumnSpec::text("business_unit"),
    ColumnSpec::text("order_specification"),
    ColumnSpec::text("order_type"),
    ColumnSpec::text("key_account"),
    ColumnSpec::text("region"),
    ColumnSpec::float("shipped_qty_net"),
    ColumnSpec::float("to_be_shipped_qty_net"),
    ColumnSpec::integer("otif_year"),
    ColumnSpec::integer("otif_month"),
    ColumnSpec::text("otif_quarter"),
    ColumnSpec::integer("otif_week"),
    ColumnSpec::text("UPC").optional(),
];

/// Keeps the rows of `release`.
pub fn filter_release(batch: &DataFrame, release: &str) -> PolarsResult<DataFrame> {
    let releases = batch.column(RELEASE_COLUMN)?.cast(&DataType::String)?;
    let mask: Vec<bool> = releases
        .str()?
        .into_iter()
        .map(|value| value == Some(release))
        .collect();
    let mask = Series::new("release_match".into(), mask);
    batch.filter(mask.bool()?)
}

/// Renames and selects the store columns, then adds the shipping period
/// (`otif_year`, `otif_month`, `otif_quarter`, `otif_week`): the calendar of
/// the week after the order week.
pub fn clean_batch(batch: &DataFrame) -> Result<DataFrame, TemporalKeyError> {
    let mut columns = Vec::with_capacity(COLUMN_RENAMES.len() + 4);
    for (from, to) in COLUMN_RENAMES {
        let mut column = batch.column(from)?.clone();
        column.rename(to.into());
        columns.push(column);
    }
    let mut cleaned = DataFrame::new(columns)?;

    let years = cleaned.column("year")?.cast(&DataType::String)?;
    let weeks = cleaned.column("week")?.cast(&DataType::String)?;

    let height = cleaned.height();
    let mut otif_year = Vec::with_capacity(height);
    let mut otif_month = Vec::with_capacity(height);
    let mut otif_quarter = Vec::with_capacity(height);
    let mut otif_week = Vec::with_capacity(height);
    for (row, (year, week)) in years.str()?.into_iter().zip(weeks.str()?.into_iter()).enumerate() {
        let period = shipping_period(year, week, row)?;
        otif_year.push(i64::from(period.year));
        otif_month.push(i64::from(period.month));
        otif_quarter.push(period.quarter_label());
        otif_week.push(i64::from(period.week));
    }

    cleaned.with_column(Series::new("otif_year".into(), otif_year))?;
    cleaned.with_column(Series::new("otif_month".into(), otif_month))?;
    cleaned.with_column(Series::new("otif_quarter".into(), otif_quarter))?;
    cleaned.with_column(Series::new("otif_week".into(), otif_week))?;
    Ok(cleaned)
}

fn shipping_period(
    year: Option<&str>,
    week: Option<&str>,
    row: usize,
) -> Result<ShippingPeriod, TemporalKeyError> {
    let year = year.ok_or_else(|| TemporalKeyError::MissingValue {
        column: "year".to_string(),
        row,
    })?;
    let week = week.ok_or_else(|| TemporalKeyError::MissingValue {
        column: "week".to_string(),
        row,
    })?;
    let year_number: i32 = year
        .trim()
        .parse()
        .map_err(|_| TemporalKeyError::InvalidYear(year.to_string()))?;
    let week_number: u32 = week
        .trim()
        .parse()
        .map_err(|_| TemporalKeyError::InvalidKey(format!("{year}{week}")))?;
    ShippingPeriod::following(year_number, week_number)
}

/// Appends the weekly on-time-in-full extract to the accumulating OTIF store.
pub struct OtifJob;

impl IngestionJob for OtifJob {
    fn code_identifier(&self) -> &'static str {
        "otif_append_v1"
    }

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Otif
    }

    fn run(&self, ctx: &JobContext) -> Result<RunReport> {
        let kind = self.dataset();
        let source = ctx.layout.actual_dir(kind).join(OTIF_RECLASS.file_name);
        let extract = read_batch(ctx, kind, &source, &OTIF_RECLASS)?;
        let rows_read = extract.dataframe.height();

        let batch = if ctx.config.otif.filter_release {
            let filtered = filter_release(&extract.dataframe, &ctx.config.release)
                .context("failed to filter OTIF extract by release")?;
            info!(
                release = %ctx.config.release,
                rows = filtered.height(),
                "filtered OTIF extract by release"
            );
            filtered
        } else {
            extract.dataframe.clone()
        };

        let snapshot = ctx
            .history(kind)
            .snapshot(
                &batch,
                OTIF_RECLASS.file_name,
                DelimitedFormat::from(&OTIF_RECLASS),
                ctx.now,
            )
            .context("failed to write OTIF history snapshot")?;

        let cleaned = clean_batch(&batch).context("failed to clean OTIF extract")?;
        info!(rows = cleaned.height(), "OTIF extract cleaned");

        let store = open_store(
            ctx.config.otif.store_format,
            &ctx.layout.dataset_dir(kind),
            STORE_STEM,
            STORE_SEPARATOR,
            STORE_COLUMNS,
        );

        let merge = if store.exists() {
            let master_path = ctx.config.master_data_path();
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
            IncrementalAppendMerger::new(store.as_ref())
                .with_reconciler(&reconciler)
                .merge_and_consume(&cleaned, &source)
        } else {
            IncrementalAppendMerger::new(store.as_ref()).merge_and_consume(&cleaned, &source)
        }
        .with_context(|| format!("failed to merge into {}", store.location().display()))?;

        Ok(RunReport {
            run_id: ctx.run_id,
            dataset: kind,
            rows_read,
            rows_written: merge.rows_written,
            outcome: merge.outcome.into(),
            key_adjustments: 0,
            unreconciled_rows: merge.unreconciled_rows,
            snapshot: Some(snapshot),
            output: store.location().to_path_buf(),
            source_fingerprint: Some(extract.fingerprint),
        })
    }
}
