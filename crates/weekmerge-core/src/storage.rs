use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use weekmerge_extracts::{apply_column_types, read_typed, ColumnSpec, DelimitedFormat, ExtractError, NumberFormat};

use crate::frames::column_names;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read store: {0}")]
    Extract(#[from] ExtractError),
    #[error(
        "staged write of {} did not verify: expected {expected_rows} rows / {expected_columns:?}, found {actual_rows} rows / {actual_columns:?}",
        path.display()
    )]
    Verification {
        path: PathBuf,
        expected_rows: usize,
        actual_rows: usize,
        expected_columns: Vec<String>,
        actual_columns: Vec<String>,
    },
    #[error("store path {} has no file name", .0.display())]
    InvalidPath(PathBuf),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A persisted dataset that can be loaded whole and replaced whole.
pub trait StorageAdapter {
    fn location(&self) -> &Path;

    fn exists(&self) -> bool {
        self.location().is_file()
    }

    fn load(&self) -> Result<DataFrame, StorageError>;

    /// Replaces the stored dataset with `df`. Either the previous content or
    /// the complete new content is on disk afterwards, never a partial file.
    fn save(&self, df: &DataFrame) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    #[default]
    Csv,
    Parquet,
}

impl StoreFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StoreFormat::Csv => "csv",
            StoreFormat::Parquet => "parquet",
        }
    }
}

/// Opens the store `<dir>/<stem>.<ext>` in the requested format.
pub fn open_store(
    format: StoreFormat,
    dir: &Path,
    stem: &str,
    separator: u8,
    columns: &'static [ColumnSpec],
) -> Box<dyn StorageAdapter> {
    let path = dir.join(format!("{stem}.{}", format.extension()));
    match format {
        StoreFormat::Csv => Box::new(DelimitedStore::new(path, separator, columns)),
        StoreFormat::Parquet => Box::new(ParquetStore::new(path, columns)),
    }
}

/// Delimited text store. Declared columns get their type back on load; any
/// other column stays text.
#[derive(Debug, Clone)]
pub struct DelimitedStore {
    path: PathBuf,
    separator: u8,
    columns: &'static [ColumnSpec],
}

impl DelimitedStore {
    pub fn new(path: impl Into<PathBuf>, separator: u8, columns: &'static [ColumnSpec]) -> Self {
        Self {
            path: path.into(),
            separator,
            columns,
        }
    }

    fn write_to(&self, target: &Path, df: &DataFrame) -> Result<(), StorageError> {
        let mut file = File::create(target).map_err(|err| StorageError::io(target, err))?;
        let mut frame = df.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(self.separator)
            .finish(&mut frame)?;
        file.sync_all().map_err(|err| StorageError::io(target, err))?;
        Ok(())
    }

    fn read_from(&self, source: &Path) -> Result<DataFrame, StorageError> {
        Ok(read_typed(
            source,
            DelimitedFormat::new(self.separator),
            self.columns,
        )?)
    }
}

impl StorageAdapter for DelimitedStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<DataFrame, StorageError> {
        self.read_from(&self.path)
    }

    fn save(&self, df: &DataFrame) -> Result<(), StorageError> {
        commit_staged(
            &self.path,
            df,
            |staging| self.write_to(staging, df),
            |staging| self.read_from(staging),
        )
    }
}

/// Columnar store. Declared text columns are cast back to text on load so
/// zero padded keys survive whatever type the file was written with.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    path: PathBuf,
    columns: &'static [ColumnSpec],
}

impl ParquetStore {
    pub fn new(path: impl Into<PathBuf>, columns: &'static [ColumnSpec]) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    fn write_to(&self, target: &Path, df: &DataFrame) -> Result<(), StorageError> {
        let mut file = File::create(target).map_err(|err| StorageError::io(target, err))?;
        let mut frame = df.clone();
        ParquetWriter::new(&mut file).finish(&mut frame)?;
        file.sync_all().map_err(|err| StorageError::io(target, err))?;
        Ok(())
    }

    fn read_from(&self, source: &Path) -> Result<DataFrame, StorageError> {
        let file = File::open(source).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::Extract(ExtractError::NotFound {
                    path: source.to_path_buf(),
                })
            } else {
                StorageError::io(source, err)
            }
        })?;
        let df = ParquetReader::new(file).finish()?;
        Ok(apply_column_types(df, self.columns, NumberFormat::PLAIN)?)
    }
}

impl StorageAdapter for ParquetStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<DataFrame, StorageError> {
        self.read_from(&self.path)
    }

    fn save(&self, df: &DataFrame) -> Result<(), StorageError> {
        commit_staged(
            &self.path,
            df,
            |staging| self.write_to(staging, df),
            |staging| self.read_from(staging),
        )
    }
}

/// Writes into a hidden sibling of `target`, reads it back and checks its
/// shape, then renames it over `target`. The staging file is removed when any
/// step fails.
fn commit_staged<W, R>(
    target: &Path,
    df: &DataFrame,
    write: W,
    read: R,
) -> Result<(), StorageError>
where
    W: FnOnce(&Path) -> Result<(), StorageError>,
    R: FnOnce(&Path) -> Result<DataFrame, StorageError>,
{
    let file_name = target
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(target.to_path_buf()))?;
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| StorageError::io(&parent, err))?;

    let staging = parent.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let result = write(&staging)
        .and_then(|_| read(&staging))
        .and_then(|written| verify_staged(&staging, df, &written))
        .and_then(|_| fs::rename(&staging, target).map_err(|err| StorageError::io(target, err)));

    match result {
        Ok(()) => {
            debug!(path = %target.display(), rows = df.height(), "store replaced");
            Ok(())
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&staging) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %staging.display(), error = %cleanup, "could not remove staging file");
                }
            }
            Err(err)
        }
    }
}

fn verify_staged(staging: &Path, expected: &DataFrame, written: &DataFrame) -> Result<(), StorageError> {
    let expected_columns = column_names(expected);
    let actual_columns = column_names(written);
    if expected.height() == written.height() && expected_columns == actual_columns {
        return Ok(());
    }
    Err(StorageError::Verification {
        path: staging.to_path_buf(),
        expected_rows: expected.height(),
        actual_rows: written.height(),
        expected_columns,
        actual_columns,
    })
}
