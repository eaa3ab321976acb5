use polars::prelude::*;

use weekmerge_core::release_alignment::{align_prior_release, shift_prior_year};
use weekmerge_core::temporal::TemporalKeyError;

fn strings(df: &DataFrame, column: &str) -> Vec<String> {
    df.column(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect()
}

#[test]
fn prior_release_keys_move_one_year_forward() {
    let batch = df![
        "ClusterKey" => &["SS-2025", "SS-2024", "SS-2024", "SS-2025"],
        "UpdateYearWeekKey" => &["202405", "2405", "202453", "2405"],
        "TotalChargedQuantity" => &[1.0, 2.0, 3.0, 4.0],
    ]
    .unwrap();

    let result = align_prior_release(&batch, "ClusterKey", "UpdateYearWeekKey", "SS-2024").unwrap();

    assert_eq!(result.shifted_rows, 2);
    assert_eq!(
        strings(&result.dataframe, "UpdateYearWeekKey"),
        vec!["202405", "002505", "202553", "002405"]
    );
    assert_eq!(
        strings(&result.dataframe, "ClusterKey"),
        strings(&batch, "ClusterKey")
    );
}

#[test]
fn alignment_without_prior_rows_only_pads() {
    let batch = df![
        "ClusterKey" => &["SS-2025"],
        "UpdateYearWeekKey" => &["202405"],
    ]
    .unwrap();

    let result = align_prior_release(&batch, "ClusterKey", "UpdateYearWeekKey", "SS-2024").unwrap();
    assert_eq!(result.shifted_rows, 0);
    assert!(result.dataframe.equals(&batch));
}

#[test]
fn prior_year_extract_shifts_key_and_year() {
    let past = df![
        "UPC" => &["0805289602057", "0805289602064"],
        "Year" => &["2023", "999"],
        "Year Week" => &["202352", "2405"],
    ]
    .unwrap();

    let shifted = shift_prior_year(&past, "Year Week", Some("Year")).unwrap();
    assert_eq!(strings(&shifted, "Year"), vec!["2024", "1000"]);
    assert_eq!(strings(&shifted, "Year Week"), vec!["202452", "002505"]);
    assert_eq!(strings(&shifted, "UPC"), strings(&past, "UPC"));
}

#[test]
fn missing_or_malformed_keys_are_rejected() {
    let missing = df![
        "Year Week" => &[Some("202352"), None],
    ]
    .unwrap();
    assert!(matches!(
        shift_prior_year(&missing, "Year Week", None),
        Err(TemporalKeyError::MissingValue { row: 1, .. })
    ));

    let bad_year = df![
        "Year" => &["twenty"],
        "Year Week" => &["202352"],
    ]
    .unwrap();
    assert!(matches!(
        shift_prior_year(&bad_year, "Year Week", Some("Year")),
        Err(TemporalKeyError::InvalidYear(_))
    ));
}
