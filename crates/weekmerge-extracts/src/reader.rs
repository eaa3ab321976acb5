use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::encoding::decode_to_utf8;
use crate::errors::ExtractError;
use crate::schema::{ColumnSpec, ExtractSchema, NumberFormat, TextEncoding};
use crate::typing::apply_column_types;

/// Separator, encoding and number conventions of a delimited text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedFormat {
    pub separator: u8,
    pub encoding: TextEncoding,
    pub number_format: NumberFormat,
}

impl DelimitedFormat {
    pub fn new(separator: u8) -> Self {
        Self {
            separator,
            encoding: TextEncoding::Utf8,
            number_format: NumberFormat::PLAIN,
        }
    }
}

impl From<&ExtractSchema> for DelimitedFormat {
    fn from(schema: &ExtractSchema) -> Self {
        Self {
            separator: schema.separator,
            encoding: schema.encoding,
            number_format: schema.number_format,
        }
    }
}

/// One extract loaded from disk, with a fingerprint of its raw bytes.
#[derive(Debug, Clone)]
pub struct Extract {
    pub path: PathBuf,
    pub dataframe: DataFrame,
    pub fingerprint: String,
}

pub fn read_extract(path: &Path, schema: &ExtractSchema) -> Result<Extract, ExtractError> {
    let raw_bytes = read_bytes(path)?;
    let fingerprint = blake3::hash(&raw_bytes).to_hex().to_string();
    let bytes = decode_to_utf8(raw_bytes, schema.encoding);

    let header = read_header(&bytes, schema.separator, schema.name)?;
    let missing: Vec<String> = schema
        .required_columns()
        .filter(|name| !header.iter().any(|column| column == name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ExtractError::MissingColumns {
            extract: schema.name.to_string(),
            columns: missing,
        });
    }

    let raw = read_text_frame(bytes, schema.separator)?;
    let dataframe = apply_column_types(raw, schema.columns, schema.number_format)?;

    Ok(Extract {
        path: path.to_path_buf(),
        dataframe,
        fingerprint,
    })
}

/// Reads any delimited file as text and applies the declared column types.
pub fn read_typed(
    path: &Path,
    format: DelimitedFormat,
    columns: &[ColumnSpec],
) -> Result<DataFrame, ExtractError> {
    let bytes = decode_to_utf8(read_bytes(path)?, format.encoding);
    let raw = read_text_frame(bytes, format.separator)?;
    apply_column_types(raw, columns, format.number_format)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExtractError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ExtractError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn read_header(bytes: &[u8], separator: u8, extract: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut record = csv::ByteRecord::new();
    let has_row = reader
        .read_byte_record(&mut record)
        .map_err(|source| ExtractError::Csv {
            extract: extract.to_string(),
            source,
        })?;
    if !has_row {
        return Err(ExtractError::Empty {
            extract: extract.to_string(),
        });
    }

    Ok(record
        .iter()
        .map(|field| {
            String::from_utf8_lossy(field)
                .trim_start_matches('\u{feff}')
                .to_string()
        })
        .collect())
}

// Every column comes back as String; typing happens afterwards so identifiers
// such as week codes keep their leading zeros. `bytes` is already UTF-8.
fn read_text_frame(bytes: Vec<u8>, separator: u8) -> Result<DataFrame, ExtractError> {
    let parse_options = CsvParseOptions::default()
        .with_separator(separator)
        .with_encoding(CsvEncoding::Utf8);

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(parse_options)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    Ok(df)
}
