use std::fs;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::frames::{anti_join_rows, concat_aligned};
use crate::reconcile::MasterKeyReconciler;
use crate::storage::StorageAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The store did not exist and now holds exactly the batch.
    Created { rows: usize },
    /// New rows were appended and the whole store rewritten.
    Appended { new_rows: usize, total_rows: usize },
    /// Every batch row was already stored; nothing was written.
    UpToDate,
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    pub rows_written: usize,
    pub unreconciled_rows: usize,
}

/// Deduplicating append of incoming batches onto an accumulating store.
pub struct IncrementalAppendMerger<'a> {
    store: &'a dyn StorageAdapter,
    reconciler: Option<&'a MasterKeyReconciler<'a>>,
}

impl<'a> IncrementalAppendMerger<'a> {
    pub fn new(store: &'a dyn StorageAdapter) -> Self {
        Self {
            store,
            reconciler: None,
        }
    }

    /// Rebuilds the canonical identifier over the whole store on every append.
    pub fn with_reconciler(mut self, reconciler: &'a MasterKeyReconciler<'a>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn merge(&self, batch: &DataFrame) -> Result<MergeReport> {
        let location = self.store.location().display().to_string();

        if !self.store.exists() {
            self.store.save(batch)?;
            info!(store = %location, rows = batch.height(), "created store from batch");
            return Ok(MergeReport {
                outcome: MergeOutcome::Created {
                    rows: batch.height(),
                },
                rows_written: batch.height(),
                unreconciled_rows: 0,
            });
        }

        let existing = self.store.load()?;
        info!(store = %location, rows = existing.height(), "loaded existing store");

        let new_rows = anti_join_rows(batch, &existing)?;
        if new_rows.height() == 0 {
            info!(store = %location, "no new rows to append; store is up to date");
            return Ok(MergeReport {
                outcome: MergeOutcome::UpToDate,
                rows_written: 0,
                unreconciled_rows: 0,
            });
        }

        let mut updated = concat_aligned(&existing, &new_rows)?;
        let mut unreconciled_rows = 0;
        if let Some(reconciler) = self.reconciler {
            let reconciliation = reconciler.reconcile(&updated)?;
            unreconciled_rows = reconciliation.unreconciled.height();
            updated = reconciliation.matched;
        }

        self.store.save(&updated)?;
        info!(
            store = %location,
            new_rows = new_rows.height(),
            total_rows = updated.height(),
            "appended new rows to store"
        );

        Ok(MergeReport {
            outcome: MergeOutcome::Appended {
                new_rows: new_rows.height(),
                total_rows: updated.height(),
            },
            rows_written: updated.height(),
            unreconciled_rows,
        })
    }

    /// Merges `batch` and only then deletes `source`. A failed merge leaves
    /// the source in place.
    pub fn merge_and_consume(&self, batch: &DataFrame, source: &Path) -> Result<MergeReport> {
        let report = self.merge(batch)?;
        consume_source(source)?;
        Ok(report)
    }
}

/// Deletes a batch file whose content has been durably written elsewhere.
pub fn consume_source(source: &Path) -> Result<()> {
    fs::remove_file(source).map_err(|err| PipelineError::Io {
        path: source.to_path_buf(),
        source: err,
    })?;
    info!(path = %source.display(), "consumed source extract");
    Ok(())
}
