use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use polars::prelude::*;
use thiserror::Error;
use tracing::info;
use weekmerge_extracts::{encode_text, DelimitedFormat, ExtractError};

pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history snapshot {} already exists", .0.display())]
    Collision(PathBuf),
    #[error("invalid snapshot pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("snapshot could not be encoded: {0}")]
    Encode(#[from] ExtractError),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Directory of immutable, timestamped copies of consumed batches.
#[derive(Debug, Clone)]
pub struct HistoryArchive {
    dir: PathBuf,
}

impl HistoryArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, file_name: &str, at: NaiveDateTime) -> PathBuf {
        self.dir
            .join(format!("{}_{file_name}", at.format(SNAPSHOT_TIMESTAMP_FORMAT)))
    }

    /// Writes `df` as `<YYYYMMDD_HHMMSS>_<file_name>` with the separator and
    /// text encoding of the extract it came from. An existing snapshot is
    /// never overwritten.
    pub fn snapshot(
        &self,
        df: &DataFrame,
        file_name: &str,
        format: DelimitedFormat,
        at: NaiveDateTime,
    ) -> Result<PathBuf, HistoryError> {
        let mut frame = df.clone();
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer)
            .include_header(true)
            .with_separator(format.separator)
            .finish(&mut frame)?;
        let text = String::from_utf8_lossy(&buffer);
        let bytes = encode_text(&text, format.encoding)?;

        fs::create_dir_all(&self.dir).map_err(|source| HistoryError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.snapshot_path(file_name, at);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    HistoryError::Collision(path.clone())
                } else {
                    HistoryError::Io {
                        path: path.clone(),
                        source,
                    }
                }
            })?;

        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|source| HistoryError::Io {
                path: path.clone(),
                source,
            })?;

        info!(
            path = %path.display(),
            rows = df.height(),
            encoding = format.encoding.label(),
            "history snapshot written"
        );
        Ok(path)
    }

    /// Newest snapshot taken of `file_name`, if any.
    pub fn latest_snapshot_of(&self, file_name: &str) -> Result<Option<PathBuf>, HistoryError> {
        let pattern = format!(
            "{}/*_{}",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            glob::Pattern::escape(file_name)
        );

        let suffix = format!("_{file_name}");
        let mut latest: Option<(String, PathBuf)> = None;
        for entry in glob::glob(&pattern)?.flatten() {
            let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Some(stamp) = name.strip_suffix(&suffix) else {
                continue;
            };
            if NaiveDateTime::parse_from_str(stamp, SNAPSHOT_TIMESTAMP_FORMAT).is_err() {
                continue;
            }
            if latest.as_ref().map_or(true, |(best, _)| stamp > best.as_str()) {
                latest = Some((stamp.to_string(), entry));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}
