use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemporalKeyError {
    #[error("week key '{0}' is not a six digit YYYYWW value")]
    InvalidKey(String),
    #[error("week key {0} no longer fits in six digits")]
    KeyOverflow(u32),
    #[error("year '{0}' is not a number")]
    InvalidYear(String),
    #[error("year {0} cannot be encoded in four digits")]
    YearOutOfRange(i32),
    #[error("year {year} has no ISO week {week}")]
    InvalidIsoWeek { year: i32, week: u32 },
    #[error("load date '{0}' is not a recognised date")]
    InvalidDate(String),
    #[error("column '{column}' is empty at row {row}")]
    MissingValue { column: String, row: usize },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// A calendar week encoded as `YYYYWW`: four digit ISO year followed by the
/// zero padded ISO week. Always exactly six ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemporalKey(String);

impl TemporalKey {
    pub fn parse(value: &str) -> Result<Self, TemporalKeyError> {
        let trimmed = value.trim();
        if trimmed.len() == 6 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(TemporalKeyError::InvalidKey(value.to_string()))
        }
    }

    /// Accepts keys whose leading zeros were lost to a numeric round trip
    /// (`2405` becomes `002405`).
    pub fn parse_unpadded(value: &str) -> Result<Self, TemporalKeyError> {
        let trimmed = value.trim();
        let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if trimmed.is_empty() || trimmed.len() > 6 || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(TemporalKeyError::InvalidKey(value.to_string()));
        }
        Ok(Self(format!("{trimmed:0>6}")))
    }

    pub fn from_number(value: u32) -> Result<Self, TemporalKeyError> {
        if value > 999_999 {
            return Err(TemporalKeyError::KeyOverflow(value));
        }
        Ok(Self(format!("{value:06}")))
    }

    /// ISO year and week of `date`.
    pub fn from_date(date: NaiveDate) -> Result<Self, TemporalKeyError> {
        let iso = date.iso_week();
        if !(0..=9999).contains(&iso.year()) {
            return Err(TemporalKeyError::YearOutOfRange(iso.year()));
        }
        Ok(Self(format!("{:04}{:02}", iso.year(), iso.week())))
    }

    /// Numeric `+100`, i.e. the same week one year later. Week 53 is not
    /// rolled over: `202453` becomes `202553` whether or not that week exists.
    pub fn shifted_one_year(&self) -> Result<Self, TemporalKeyError> {
        Self::from_number(self.as_number() + 100)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_number(&self) -> u32 {
        // six ASCII digits always fit
        self.0.bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    }

    pub fn year(&self) -> u32 {
        self.as_number() / 100
    }

    pub fn week(&self) -> u32 {
        self.as_number() % 100
    }
}

impl FromStr for TemporalKey {
    type Err = TemporalKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TemporalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const DAY_FIRST_FORMATS: [&str; 3] = ["%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"];
const DAY_FIRST_DATETIME_FORMATS: [&str; 3] =
    ["%d/%m/%Y %H:%M:%S", "%d.%m.%Y %H:%M:%S", "%d-%m-%Y %H:%M:%S"];

/// Parses a physical load date. Extract dates are day first; ISO dates are
/// accepted as well since corrected batches carry them.
pub fn parse_load_date(value: &str) -> Result<NaiveDate, TemporalKeyError> {
    let trimmed = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    for format in DAY_FIRST_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    for format in DAY_FIRST_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime.date());
        }
    }

    Err(TemporalKeyError::InvalidDate(value.to_string()))
}

pub fn iso_week_monday(year: i32, week: u32) -> Result<NaiveDate, TemporalKeyError> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
        .ok_or(TemporalKeyError::InvalidIsoWeek { year, week })
}

/// Calendar attributes of the week in which goods of a given order week ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPeriod {
    pub year: i32,
    pub month: u32,
    pub quarter: u32,
    pub week: u32,
}

impl ShippingPeriod {
    /// The period one week after the Monday of ISO `year`/`week`. Year and
    /// week follow the ISO calendar, month and quarter the Gregorian one.
    pub fn following(year: i32, week: u32) -> Result<Self, TemporalKeyError> {
        let shipped = iso_week_monday(year, week)? + Duration::days(7);
        let iso = shipped.iso_week();
        Ok(Self {
            year: iso.year(),
            month: shipped.month(),
            quarter: (shipped.month() - 1) / 3 + 1,
            week: iso.week(),
        })
    }

    pub fn quarter_label(&self) -> String {
        format!("Q{}", self.quarter)
    }
}

pub(crate) fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}

pub(crate) fn date_from_epoch_days(days: i32) -> NaiveDate {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    epoch + Duration::days(i64::from(days))
}
