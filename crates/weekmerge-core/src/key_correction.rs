use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use tracing::info;

use crate::temporal::{self, parse_load_date, TemporalKey, TemporalKeyError};

#[derive(Debug, Clone)]
pub struct KeyCorrectionResult {
    pub dataframe: DataFrame,
    pub adjustments: Vec<KeyAdjustment>,
}

/// One ambiguous week key and the rows moved off it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAdjustment {
    pub original: TemporalKey,
    pub corrected: TemporalKey,
    pub oldest_load_date: NaiveDate,
    pub rows: usize,
}

impl KeyCorrectionResult {
    pub fn adjusted_rows(&self) -> usize {
        self.adjustments.iter().map(|adjustment| adjustment.rows).sum()
    }
}

/// Repairs week keys that were loaded on more than one physical date.
///
/// For every key seen with several distinct load dates, the rows carrying the
/// oldest load date are moved to the ISO week of that date minus seven days;
/// rows with later load dates keep the key. The load date column is returned
/// as a `Date` column. A batch without ambiguous keys passes through with
/// identical keys, so applying the correction twice is a no-op.
pub fn correct_week_keys(
    batch: &DataFrame,
    key_column: &str,
    load_date_column: &str,
) -> Result<KeyCorrectionResult, TemporalKeyError> {
    let keys = read_keys(batch, key_column)?;
    let load_dates = read_load_dates(batch, load_date_column)?;

    let mut dates_per_key: BTreeMap<&TemporalKey, BTreeSet<NaiveDate>> = BTreeMap::new();
    for (key, date) in keys.iter().zip(load_dates.iter()) {
        dates_per_key.entry(key).or_default().insert(*date);
    }

    let mut corrections: BTreeMap<TemporalKey, (NaiveDate, TemporalKey)> = BTreeMap::new();
    for (key, dates) in &dates_per_key {
        if dates.len() < 2 {
            continue;
        }
        if let Some(oldest) = dates.first() {
            let corrected = TemporalKey::from_date(*oldest - Duration::days(7))?;
            corrections.insert((*key).clone(), (*oldest, corrected));
        }
    }

    let mut adjusted_counts: BTreeMap<&TemporalKey, usize> = BTreeMap::new();
    let mut corrected_keys = Vec::with_capacity(keys.len());
    for (key, date) in keys.iter().zip(load_dates.iter()) {
        match corrections.get(key) {
            Some((oldest, corrected)) if oldest == date => {
                *adjusted_counts.entry(key).or_insert(0) += 1;
                corrected_keys.push(corrected.as_str().to_string());
            }
            _ => corrected_keys.push(key.as_str().to_string()),
        }
    }

    let adjustments: Vec<KeyAdjustment> = corrections
        .iter()
        .map(|(original, (oldest, corrected))| KeyAdjustment {
            original: original.clone(),
            corrected: corrected.clone(),
            oldest_load_date: *oldest,
            rows: adjusted_counts.get(original).copied().unwrap_or(0),
        })
        .collect();

    for adjustment in &adjustments {
        info!(
            original = %adjustment.original,
            corrected = %adjustment.corrected,
            oldest_load_date = %adjustment.oldest_load_date,
            rows = adjustment.rows,
            "corrected ambiguous week key"
        );
    }

    let mut dataframe = batch.clone();
    dataframe.with_column(Series::new(key_column.into(), corrected_keys))?;
    let date_series = Series::new(
        load_date_column.into(),
        load_dates
            .iter()
            .map(|date| temporal::days_since_epoch(*date))
            .collect::<Vec<_>>(),
    )
    .cast(&DataType::Date)?;
    dataframe.with_column(date_series)?;

    Ok(KeyCorrectionResult {
        dataframe,
        adjustments,
    })
}

/// Casts the numeric columns among the last `count` columns to 64-bit
/// integers. Values are truncated towards zero; nulls stay null. Text columns
/// in that window keep their text so codes keep their leading zeros.
pub fn normalize_trailing_counts(
    batch: &DataFrame,
    count: usize,
) -> Result<DataFrame, TemporalKeyError> {
    let names: Vec<PlSmallStr> = batch.get_column_names_owned();
    let start = names.len().saturating_sub(count);

    let mut dataframe = batch.clone();
    for name in &names[start..] {
        let column = dataframe.column(name.as_str())?;
        if !(column.dtype().is_float() || column.dtype().is_integer()) {
            continue;
        }
        let integers = column.strict_cast(&DataType::Int64)?;
        dataframe.with_column(integers)?;
    }
    Ok(dataframe)
}

fn read_keys(batch: &DataFrame, column: &str) -> Result<Vec<TemporalKey>, TemporalKeyError> {
    let values = batch.column(column)?.cast(&DataType::String)?;
    let values = values.str()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(text) => TemporalKey::parse(text),
            None => Err(TemporalKeyError::MissingValue {
                column: column.to_string(),
                row,
            }),
        })
        .collect()
}

fn read_load_dates(batch: &DataFrame, column: &str) -> Result<Vec<NaiveDate>, TemporalKeyError> {
    let source = batch.column(column)?;
    let missing = |row: usize| TemporalKeyError::MissingValue {
        column: column.to_string(),
        row,
    };

    if source.dtype() == &DataType::Date {
        let days = source.cast(&DataType::Int32)?;
        return days
            .i32()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| value.map(temporal::date_from_epoch_days).ok_or_else(|| missing(row)))
            .collect();
    }

    let text = source.cast(&DataType::String)?;
    text.str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(raw) => parse_load_date(raw),
            None => Err(missing(row)),
        })
        .collect()
}
