use polars::prelude::*;
use tracing::info;

use crate::temporal::{TemporalKey, TemporalKeyError};

#[derive(Debug, Clone)]
pub struct AlignmentResult {
    pub dataframe: DataFrame,
    pub shifted_rows: usize,
}

/// Moves the week keys of the prior-year release one year forward so both
/// releases share a timeline. Rows of any other cluster keep their week, but
/// every key comes back zero padded to six digits.
pub fn align_prior_release(
    batch: &DataFrame,
    cluster_column: &str,
    key_column: &str,
    prior_cluster: &str,
) -> Result<AlignmentResult, TemporalKeyError> {
    let clusters = batch.column(cluster_column)?.cast(&DataType::String)?;
    let clusters = clusters.str()?;
    let keys = batch.column(key_column)?.cast(&DataType::String)?;
    let keys = keys.str()?;

    let mut shifted_rows = 0;
    let mut aligned = Vec::with_capacity(batch.height());
    for (row, (cluster, key)) in clusters.into_iter().zip(keys.into_iter()).enumerate() {
        let key = key.ok_or_else(|| TemporalKeyError::MissingValue {
            column: key_column.to_string(),
            row,
        })?;
        let key = TemporalKey::parse_unpadded(key)?;
        if cluster == Some(prior_cluster) {
            shifted_rows += 1;
            aligned.push(key.shifted_one_year()?.as_str().to_string());
        } else {
            aligned.push(key.as_str().to_string());
        }
    }

    info!(prior_cluster, shifted_rows, "aligned prior release week keys");

    let mut dataframe = batch.clone();
    dataframe.with_column(Series::new(key_column.into(), aligned))?;
    Ok(AlignmentResult {
        dataframe,
        shifted_rows,
    })
}

/// Shifts an extract that belongs entirely to the prior year: the week key
/// gains 100 and, when present, the year column gains one (padded to four
/// digits).
pub fn shift_prior_year(
    batch: &DataFrame,
    key_column: &str,
    year_column: Option<&str>,
) -> Result<DataFrame, TemporalKeyError> {
    let keys = batch.column(key_column)?.cast(&DataType::String)?;
    let shifted_keys = keys
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.ok_or_else(|| TemporalKeyError::MissingValue {
                column: key_column.to_string(),
                row,
            })?;
            Ok(TemporalKey::parse_unpadded(value)?
                .shifted_one_year()?
                .as_str()
                .to_string())
        })
        .collect::<Result<Vec<String>, TemporalKeyError>>()?;

    let mut dataframe = batch.clone();
    dataframe.with_column(Series::new(key_column.into(), shifted_keys))?;

    if let Some(year_column) = year_column {
        let years = dataframe.column(year_column)?.cast(&DataType::String)?;
        let shifted_years = years
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let value = value.ok_or_else(|| TemporalKeyError::MissingValue {
                    column: year_column.to_string(),
                    row,
                })?;
                shift_year(value)
            })
            .collect::<Result<Vec<String>, TemporalKeyError>>()?;
        dataframe.with_column(Series::new(year_column.into(), shifted_years))?;
    }

    info!(rows = dataframe.height(), "shifted prior year extract");
    Ok(dataframe)
}

fn shift_year(value: &str) -> Result<String, TemporalKeyError> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    let year: i32 = trimmed
        .parse()
        .map_err(|_| TemporalKeyError::InvalidYear(value.to_string()))?;
    let next = year + 1;
    if !(0..=9999).contains(&next) {
        return Err(TemporalKeyError::YearOutOfRange(next));
    }
    Ok(format!("{next:04}"))
}
