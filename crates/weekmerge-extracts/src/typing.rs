use polars::prelude::*;

use crate::errors::ExtractError;
use crate::schema::{ColumnSpec, ColumnType, NumberFormat};

/// Casts every declared column that is present in `df` to its declared type.
///
/// Text columns are kept verbatim, numeric columns are cleaned according to
/// `format` and cast strictly: a value that does not parse is an error rather
/// than a silent null. Declared columns absent from `df` are skipped.
pub fn apply_column_types(
    mut df: DataFrame,
    columns: &[ColumnSpec],
    format: NumberFormat,
) -> Result<DataFrame, ExtractError> {
    for spec in columns {
        if !has_column(&df, spec.name) {
            continue;
        }

        let typed = match spec.kind {
            ColumnType::Text => df.column(spec.name)?.cast(&DataType::String)?,
            ColumnType::Float => cast_numeric(&df, spec, format, DataType::Float64)?,
            ColumnType::Integer => cast_numeric(&df, spec, format, DataType::Int64)?,
        };
        df.with_column(typed)?;
    }

    Ok(df)
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|column| column.as_str() == name)
}

fn cast_numeric(
    df: &DataFrame,
    spec: &ColumnSpec,
    format: NumberFormat,
    target: DataType,
) -> Result<Column, ExtractError> {
    let column = df.column(spec.name)?;
    let source = if column.dtype() == &DataType::String {
        normalize_numeric_text(column.str()?, format)
            .with_name(spec.name.into())
            .into_series()
    } else {
        column.as_materialized_series().clone()
    };

    source
        .strict_cast(&target)
        .map(Column::from)
        .map_err(|err| ExtractError::InvalidValue {
            column: spec.name.to_string(),
            expected: spec.kind.describe(),
            message: err.to_string(),
        })
}

fn normalize_numeric_text(values: &StringChunked, format: NumberFormat) -> StringChunked {
    values
        .into_iter()
        .map(|value| {
            value.and_then(|text| {
                let mut cleaned: String = text
                    .trim()
                    .chars()
                    .filter(|c| Some(*c) != format.thousands)
                    .collect();
                if format.decimal_comma {
                    cleaned = cleaned.replace(',', ".");
                }
                if cleaned.is_empty() {
                    None
                } else {
                    Some(cleaned)
                }
            })
        })
        .collect()
}
