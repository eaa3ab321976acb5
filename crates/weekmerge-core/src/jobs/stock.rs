use anyhow::{Context, Result};
use weekmerge_extracts::schema::{STOCK_CURRENT, STOCK_PAST};
use weekmerge_extracts::DatasetKind;

use super::{replace_with_current_and_past, IngestionJob, JobContext, RunReport};
use crate::release_alignment::shift_prior_year;

pub const WEEK_KEY_COLUMN: &str = "Year Week";
pub const YEAR_COLUMN: &str = "Year";
pub const OUTPUT_FILE: &str = "stocks.csv";

/// Stacks the current stock extract with last year's, moved onto this
/// year's weeks.
pub struct StockJob;

impl IngestionJob for StockJob {
    fn code_identifier(&self) -> &'static str {
        "stock_v1"
    }

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Stock
    }

    fn run(&self, ctx: &JobContext) -> Result<RunReport> {
        replace_with_current_and_past(
            ctx,
            self.dataset(),
            &STOCK_CURRENT,
            &STOCK_PAST,
            OUTPUT_FILE,
            |past| {
                shift_prior_year(past, WEEK_KEY_COLUMN, Some(YEAR_COLUMN))
                    .context("failed to align the past stock extract")
            },
        )
    }
}
