use polars::prelude::*;

use weekmerge_core::weekly_delta::compute_weekly_deltas;

fn deltas(df: &DataFrame) -> Vec<f64> {
    df.column("WeeklyChargedQuantity")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .map(|value| value.unwrap())
        .collect()
}

#[test]
fn cumulative_quantities_become_weekly_deltas() -> PolarsResult<()> {
    let batch = df![
        "UPC" => &["X", "Y", "X", "X", "X", "Y"],
        "UpdateYearWeekKey" => &["202403", "202401", "202401", "202402", "202404", "202402"],
        "TotalChargedQuantity" => &[25.0, 5.0, 10.0, 10.0, 20.0, 3.0],
    ]?;

    let weekly = compute_weekly_deltas(
        &batch,
        "UPC",
        "UpdateYearWeekKey",
        "TotalChargedQuantity",
        "WeeklyChargedQuantity",
    )?;

    let entities: Vec<&str> = weekly.column("UPC")?.str()?.into_no_null_iter().collect();
    let weeks: Vec<&str> = weekly
        .column("UpdateYearWeekKey")?
        .str()?
        .into_no_null_iter()
        .collect();
    assert_eq!(entities, vec!["X", "X", "X", "X", "Y", "Y"]);
    assert_eq!(weeks, vec!["202401", "202402", "202403", "202404", "202401", "202402"]);
    // negative deltas stay as they are
    assert_eq!(deltas(&weekly), vec![0.0, 0.0, 15.0, -5.0, 0.0, -2.0]);

    let names = weekly.get_column_names();
    assert_eq!(names.last().map(|name| name.as_str()), Some("WeeklyChargedQuantity"));
    Ok(())
}

#[test]
fn single_row_entity_gets_zero() -> PolarsResult<()> {
    let batch = df![
        "UPC" => &["Z"],
        "UpdateYearWeekKey" => &["202401"],
        "TotalChargedQuantity" => &[7.0],
    ]?;

    let weekly = compute_weekly_deltas(
        &batch,
        "UPC",
        "UpdateYearWeekKey",
        "TotalChargedQuantity",
        "WeeklyChargedQuantity",
    )?;
    assert_eq!(deltas(&weekly), vec![0.0]);
    Ok(())
}

#[test]
fn missing_cumulative_value_yields_zero() -> PolarsResult<()> {
    let batch = df![
        "UPC" => &["X", "X", "X"],
        "UpdateYearWeekKey" => &["202401", "202402", "202403"],
        "TotalChargedQuantity" => &[Some(4.0), None, Some(9.0)],
    ]?;

    let weekly = compute_weekly_deltas(
        &batch,
        "UPC",
        "UpdateYearWeekKey",
        "TotalChargedQuantity",
        "WeeklyChargedQuantity",
    )?;
    assert_eq!(deltas(&weekly), vec![0.0, 0.0, 0.0]);
    Ok(())
}
