use std::path::PathBuf;

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use tracing::{debug, info};
use weekmerge_extracts::{read_extract, ExtractSchema};

/// Placeholder in query templates that receives the release pair.
pub const RELEASE_PLACEHOLDER: &str = ":release";

/// Release names are stored with hyphens where configuration uses spaces.
pub fn hyphenate_release(release: &str) -> String {
    release.replace(' ', "-")
}

// What a non-breaking space pasted into a query file turns into after being
// decoded as Windows-1252 twice.
const DOUBLE_DECODED_NBSP: &str = "\u{c3}\u{201a}";

/// Replaces `:release` with `('<release>', '<release_ly>')` and turns mangled
/// non-breaking spaces back into plain spaces.
pub fn render_release_query(template: &str, release: &str, release_ly: &str) -> String {
    template
        .replace(
            RELEASE_PLACEHOLDER,
            &format!(
                "('{}', '{}')",
                hyphenate_release(release),
                hyphenate_release(release_ly)
            ),
        )
        .replace(DOUBLE_DECODED_NBSP, " ")
}

/// Executes a rendered query against the relational source.
pub trait QuerySource {
    fn fetch(&self, query: &str) -> Result<DataFrame>;
}

/// Serves the result set of a query that was exported to a delimited file
/// ahead of the run.
#[derive(Debug, Clone)]
pub struct DelimitedExportSource {
    path: PathBuf,
    schema: &'static ExtractSchema,
}

impl DelimitedExportSource {
    pub fn new(path: impl Into<PathBuf>, schema: &'static ExtractSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }
}

impl QuerySource for DelimitedExportSource {
    fn fetch(&self, query: &str) -> Result<DataFrame> {
        debug!(query, "query served from export");
        let extract = read_extract(&self.path, self.schema)
            .with_context(|| format!("failed to read query export {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            rows = extract.dataframe.height(),
            fingerprint = %extract.fingerprint,
            "loaded query export"
        );
        Ok(extract.dataframe)
    }
}
