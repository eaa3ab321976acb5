use std::collections::HashSet;

use polars::prelude::*;

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Columns of `left` that also exist in `right`, in `left`'s order.
pub fn shared_columns(left: &DataFrame, right: &DataFrame) -> Vec<String> {
    let right_names: HashSet<String> = column_names(right).into_iter().collect();
    column_names(left)
        .into_iter()
        .filter(|name| right_names.contains(name))
        .collect()
}

/// Stacks `bottom` under `top`, matching columns by name.
///
/// The result has `top`'s columns first followed by any column only `bottom`
/// has; cells a frame does not provide are null. Shared columns take `top`'s
/// type.
pub fn concat_aligned(top: &DataFrame, bottom: &DataFrame) -> PolarsResult<DataFrame> {
    let mut names = column_names(top);
    for name in column_names(bottom) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let mut upper_columns = Vec::with_capacity(names.len());
    let mut lower_columns = Vec::with_capacity(names.len());
    for name in &names {
        let upper = top.column(name).ok().cloned();
        let lower = bottom.column(name).ok().cloned();
        let dtype = upper
            .as_ref()
            .or(lower.as_ref())
            .map(|column| column.dtype().clone())
            .unwrap_or(DataType::String);

        upper_columns.push(match upper {
            Some(column) => column,
            None => Column::full_null(name.as_str().into(), top.height(), &dtype),
        });
        lower_columns.push(match lower {
            Some(column) if column.dtype() == &dtype => column,
            Some(column) => column.cast(&dtype)?,
            None => Column::full_null(name.as_str().into(), bottom.height(), &dtype),
        });
    }

    let mut stacked = DataFrame::new(upper_columns)?;
    stacked.vstack_mut(&DataFrame::new(lower_columns)?)?;
    Ok(stacked)
}

/// Rows of `batch` with no full-row match in `existing`, compared on the
/// columns both frames share. Duplicates inside `batch` are kept; nulls
/// compare equal to nulls.
pub fn anti_join_rows(batch: &DataFrame, existing: &DataFrame) -> PolarsResult<DataFrame> {
    let shared = shared_columns(batch, existing);
    if shared.is_empty() {
        return Err(PolarsError::ComputeError(
            "batch and store have no columns in common".into(),
        ));
    }

    let batch_keys = row_keys(batch, batch, &shared)?;
    let existing_keys: HashSet<Vec<Option<String>>> =
        row_keys(existing, batch, &shared)?.into_iter().collect();

    let mask: Vec<bool> = batch_keys
        .iter()
        .map(|key| !existing_keys.contains(key))
        .collect();
    let mask = Series::new("new_row".into(), mask);
    batch.filter(mask.bool()?)
}

/// Renders every row of `df` over `columns` as text, after casting each
/// column to the type it has in `reference`, so equal values compare equal
/// regardless of how either side was loaded.
fn row_keys(
    df: &DataFrame,
    reference: &DataFrame,
    columns: &[String],
) -> PolarsResult<Vec<Vec<Option<String>>>> {
    let mut rendered: Vec<StringChunked> = Vec::with_capacity(columns.len());
    for name in columns {
        let target = reference.column(name)?.dtype().clone();
        let column = df.column(name)?.cast(&target)?.cast(&DataType::String)?;
        rendered.push(column.str()?.clone());
    }

    let keys = (0..df.height())
        .map(|row| {
            rendered
                .iter()
                .map(|values| values.get(row).map(str::to_string))
                .collect()
        })
        .collect();
    Ok(keys)
}
