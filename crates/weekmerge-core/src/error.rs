// crates/weekmerge-core/src/error.rs

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::reconcile::ReconcileError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Master data reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// An expected batch file is absent. Always fatal for the run; jobs raise it
/// through `anyhow` so callers can downcast to it.
#[derive(Error, Debug)]
pub enum MissingInput {
    #[error(
        "File '{}' not found in {}. It may have already been processed and archived as {}.",
        file_name(path),
        parent_dir(path),
        last_snapshot.display()
    )]
    AlreadyProcessed { path: PathBuf, last_snapshot: PathBuf },

    #[error(
        "File '{}' not found in {}. Something went wrong during file creation. Refer to {owner}.",
        file_name(path),
        parent_dir(path)
    )]
    NeverProduced { path: PathBuf, owner: String },

    #[error(
        "File '{}' not found in {}. You have to download it from Business Object first.",
        file_name(path),
        parent_dir(path)
    )]
    ManualDownloadRequired { path: PathBuf },
}

impl MissingInput {
    pub fn path(&self) -> &Path {
        match self {
            MissingInput::AlreadyProcessed { path, .. }
            | MissingInput::NeverProduced { path, .. }
            | MissingInput::ManualDownloadRequired { path } => path,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_dir(path: &Path) -> String {
    path.parent()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default()
}
