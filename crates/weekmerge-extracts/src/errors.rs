use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extract file {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{extract} header could not be read: {source}")]
    Csv {
        extract: String,
        #[source]
        source: csv::Error,
    },

    #[error("{extract} file did not contain a header row")]
    Empty { extract: String },

    #[error("{extract} is missing declared columns: {columns:?}")]
    MissingColumns {
        extract: String,
        columns: Vec<String>,
    },

    #[error("column '{column}' holds a value that is not a valid {expected}: {message}")]
    InvalidValue {
        column: String,
        expected: &'static str,
        message: String,
    },

    #[error("text holds characters that {encoding} cannot represent")]
    Unencodable { encoding: &'static str },

    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

impl ExtractError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExtractError::NotFound { .. })
    }
}
