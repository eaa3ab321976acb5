use anyhow::Result;
use weekmerge_extracts::schema::{SALES_CURRENT, SALES_PAST};
use weekmerge_extracts::DatasetKind;

use super::{replace_with_current_and_past, IngestionJob, JobContext, RunReport};

pub const OUTPUT_FILE: &str = "sales_&_shippings.csv";

/// Stacks the current and prior-year sales & shipping extracts.
pub struct SalesJob;

impl IngestionJob for SalesJob {
    fn code_identifier(&self) -> &'static str {
        "sales_v1"
    }

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Sales
    }

    fn run(&self, ctx: &JobContext) -> Result<RunReport> {
        replace_with_current_and_past(
            ctx,
            self.dataset(),
            &SALES_CURRENT,
            &SALES_PAST,
            OUTPUT_FILE,
            |past| Ok(past.clone()),
        )
    }
}
