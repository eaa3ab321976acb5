use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};
use weekmerge_extracts::{
    apply_column_types, read_typed, ColumnSpec, DelimitedFormat, ExtractError, NumberFormat,
};

/// Width of the colour fragment inside a composite key.
pub const COLOR_WIDTH: usize = 6;

pub const MASTER_MODEL: &str = "Model";
pub const MASTER_SIZE: &str = "Size";
pub const MASTER_COLOR: &str = "Color";
pub const MASTER_IDENTIFIER: &str = "UPC";

const MASTER_COLUMNS: [ColumnSpec; 4] = [
    ColumnSpec::text(MASTER_MODEL),
    ColumnSpec::text(MASTER_SIZE),
    ColumnSpec::text(MASTER_COLOR),
    ColumnSpec::text(MASTER_IDENTIFIER),
];

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read master data: {0}")]
    Extract(#[from] ExtractError),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read workbook {}: {source}", path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("workbook {} has no worksheet", .0.display())]
    NoWorksheet(PathBuf),
    #[error("{table} has no column '{column}'")]
    MissingColumn { table: &'static str, column: String },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// `model ++ colour padded with spaces and cut to six characters ++ size`.
pub fn composite_key(model: &str, color: &str, size: &str) -> String {
    let mut key = String::with_capacity(model.len() + COLOR_WIDTH + size.len());
    key.push_str(model);
    let fragment: String = color
        .chars()
        .chain(std::iter::repeat(' '))
        .take(COLOR_WIDTH)
        .collect();
    key.push_str(&fragment);
    key.push_str(size);
    key
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterEntry {
    pub model: String,
    pub size: String,
    pub color: String,
    pub identifier: String,
}

impl MasterEntry {
    pub fn composite_key(&self) -> String {
        composite_key(&self.model, &self.color, &self.size)
    }
}

/// Master reference indexed by composite key.
#[derive(Debug, Clone, Default)]
pub struct MasterTable {
    identifiers: HashMap<String, String>,
    duplicate_keys: usize,
}

impl MasterTable {
    /// Reads `Model`, `Size`, `Color` and `UPC` as text from the first sheet
    /// of a workbook (`.xlsx`, `.xlsm`, `.xls`), a `.parquet` file, a `.csv`
    /// (comma) or a `.txt`/`.tsv` (tab) file.
    pub fn load(path: &Path) -> Result<Self, ReconcileError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let df = match extension.as_str() {
            "xlsx" | "xlsm" | "xls" => read_workbook(path)?,
            "parquet" => {
                let file = File::open(path).map_err(|source| open_error(path, source))?;
                let df = ParquetReader::new(file).finish()?;
                apply_column_types(df, &MASTER_COLUMNS, NumberFormat::PLAIN)?
            }
            "txt" | "tsv" => read_typed(path, DelimitedFormat::new(b'\t'), &MASTER_COLUMNS)?,
            _ => read_typed(path, DelimitedFormat::new(b','), &MASTER_COLUMNS)?,
        };

        let table = Self::from_dataframe(&df)?;
        if table.is_empty() {
            warn!(path = %path.display(), "master data holds no usable entries");
        }
        info!(
            path = %path.display(),
            entries = table.len(),
            duplicate_keys = table.duplicate_keys(),
            "master data loaded"
        );
        Ok(table)
    }

    pub fn from_dataframe(df: &DataFrame) -> Result<Self, ReconcileError> {
        let text_column = |name: &str| -> Result<Column, ReconcileError> {
            let column = df.column(name).map_err(|_| ReconcileError::MissingColumn {
                table: "master data",
                column: name.to_string(),
            })?;
            Ok(column.cast(&DataType::String)?)
        };
        let models = text_column(MASTER_MODEL)?;
        let sizes = text_column(MASTER_SIZE)?;
        let colors = text_column(MASTER_COLOR)?;
        let identifiers = text_column(MASTER_IDENTIFIER)?;

        let mut entries = Vec::with_capacity(df.height());
        let rows = models
            .str()?
            .into_iter()
            .zip(sizes.str()?.into_iter())
            .zip(colors.str()?.into_iter())
            .zip(identifiers.str()?.into_iter());
        for (((model, size), color), identifier) in rows {
            // rows missing any part cannot produce a key
            if let (Some(model), Some(size), Some(color), Some(identifier)) =
                (model, size, color, identifier)
            {
                entries.push(MasterEntry {
                    model: model.to_string(),
                    size: size.to_string(),
                    color: color.to_string(),
                    identifier: identifier.to_string(),
                });
            }
        }

        Ok(Self::from_entries(entries))
    }

    /// Builds the index. When a composite key repeats, the first entry wins.
    pub fn from_entries(entries: impl IntoIterator<Item = MasterEntry>) -> Self {
        let mut identifiers = HashMap::new();
        let mut duplicate_keys = 0;
        for entry in entries {
            let key = entry.composite_key();
            if identifiers.contains_key(&key) {
                duplicate_keys += 1;
                continue;
            }
            identifiers.insert(key, entry.identifier);
        }

        if duplicate_keys > 0 {
            warn!(duplicate_keys, "master data repeats composite keys; keeping the first entry of each");
        }

        Self {
            identifiers,
            duplicate_keys,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn duplicate_keys(&self) -> usize {
        self.duplicate_keys
    }
}

fn open_error(path: &Path, source: std::io::Error) -> ReconcileError {
    if source.kind() == std::io::ErrorKind::NotFound {
        ReconcileError::Extract(ExtractError::NotFound {
            path: path.to_path_buf(),
        })
    } else {
        ReconcileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// Workbook cells are rendered as text. The header row is the first row of
// the first worksheet.
fn read_workbook(path: &Path) -> Result<DataFrame, ReconcileError> {
    let bytes = fs::read(path).map_err(|source| open_error(path, source))?;
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|source| ReconcileError::Workbook {
            path: path.to_path_buf(),
            source,
        })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReconcileError::NoWorksheet(path.to_path_buf()))?
        .map_err(|source| ReconcileError::Workbook {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|cell| cell_text(cell).unwrap_or_default()).collect())
        .unwrap_or_default();
    let positions = MASTER_COLUMNS
        .iter()
        .map(|spec| {
            header
                .iter()
                .position(|name| name.trim() == spec.name)
                .ok_or_else(|| ReconcileError::MissingColumn {
                    table: "master data",
                    column: spec.name.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); positions.len()];
    for row in rows {
        for (column, &position) in values.iter_mut().zip(&positions) {
            column.push(row.get(position).and_then(cell_text));
        }
    }

    let columns = MASTER_COLUMNS
        .iter()
        .zip(values)
        .map(|(spec, values)| Column::new(spec.name.into(), values))
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(text) if text.trim().is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Where a batch keeps the parts of its composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKeySource<'a> {
    Components {
        model: &'a str,
        color: &'a str,
        size: &'a str,
    },
    /// `grid` already holds the padded colour followed by the size.
    Prebuilt { model: &'a str, grid: &'a str },
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Rows that found a master entry, with the identifier column rebuilt.
    pub matched: DataFrame,
    /// Rows without a master entry, as they came in.
    pub unreconciled: DataFrame,
}

pub struct MasterKeyReconciler<'a> {
    master: &'a MasterTable,
    source: CompositeKeySource<'a>,
    identifier_column: &'a str,
}

impl<'a> MasterKeyReconciler<'a> {
    pub fn new(
        master: &'a MasterTable,
        source: CompositeKeySource<'a>,
        identifier_column: &'a str,
    ) -> Self {
        Self {
            master,
            source,
            identifier_column,
        }
    }

    /// Inner join of `batch` with the master table on the composite key.
    ///
    /// Any identifier column already present is dropped and rebuilt from the
    /// master table as the last column of `matched`. Rows keep their order.
    pub fn reconcile(&self, batch: &DataFrame) -> Result<Reconciliation, ReconcileError> {
        let keys = self.batch_keys(batch)?;

        let mut mask = Vec::with_capacity(keys.len());
        let mut identifiers = Vec::new();
        for key in &keys {
            match key.as_deref().and_then(|key| self.master.lookup(key)) {
                Some(identifier) => {
                    mask.push(true);
                    identifiers.push(identifier.to_string());
                }
                None => mask.push(false),
            }
        }

        let keep = Series::new("matched".into(), mask.clone());
        let unmatched = Series::new(
            "unmatched".into(),
            mask.iter().map(|hit| !hit).collect::<Vec<bool>>(),
        );

        let without_identifier = if batch
            .get_column_names()
            .iter()
            .any(|name| name.as_str() == self.identifier_column)
        {
            batch.drop(self.identifier_column)?
        } else {
            batch.clone()
        };

        let mut matched = without_identifier.filter(keep.bool()?)?;
        matched.with_column(Series::new(self.identifier_column.into(), identifiers))?;
        let unreconciled = batch.filter(unmatched.bool()?)?;

        if unreconciled.height() > 0 {
            warn!(
                unreconciled = unreconciled.height(),
                matched = matched.height(),
                "rows without a master data entry were dropped"
            );
        }

        Ok(Reconciliation {
            matched,
            unreconciled,
        })
    }

    fn batch_keys(&self, batch: &DataFrame) -> Result<Vec<Option<String>>, ReconcileError> {
        let text_column = |name: &str| -> Result<Column, ReconcileError> {
            let column = batch.column(name).map_err(|_| ReconcileError::MissingColumn {
                table: "batch",
                column: name.to_string(),
            })?;
            Ok(column.cast(&DataType::String)?)
        };

        match self.source {
            CompositeKeySource::Components { model, color, size } => {
                let models = text_column(model)?;
                let colors = text_column(color)?;
                let sizes = text_column(size)?;
                let keys = models
                    .str()?
                    .into_iter()
                    .zip(colors.str()?.into_iter())
                    .zip(sizes.str()?.into_iter())
                    .map(|((model, color), size)| match (model, color, size) {
                        (Some(model), Some(color), Some(size)) => {
                            Some(composite_key(model, color, size))
                        }
                        _ => None,
                    })
                    .collect();
                Ok(keys)
            }
            CompositeKeySource::Prebuilt { model, grid } => {
                let models = text_column(model)?;
                let grids = text_column(grid)?;
                let keys = models
                    .str()?
                    .into_iter()
                    .zip(grids.str()?.into_iter())
                    .map(|(model, grid)| match (model, grid) {
                        (Some(model), Some(grid)) => Some(format!("{model}{grid}")),
                        _ => None,
                    })
                    .collect();
                Ok(keys)
            }
        }
    }
}
