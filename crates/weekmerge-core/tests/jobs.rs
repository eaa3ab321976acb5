use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

use weekmerge_core::config::RunConfig;
use weekmerge_core::jobs::charged::ChargedJob;
use weekmerge_core::jobs::{all_jobs, job_for, JobContext, RunOutcome};
use weekmerge_core::source::QuerySource;
use weekmerge_core::MissingInput;
use weekmerge_extracts::{read_typed, ColumnSpec, DatasetKind, DelimitedFormat};

const BACKORDER_EXTRACT: &str = "Year Week\tUPC Code\tPipeline - DtLoad\tPipeline - PurchaseFromSuppliers\tPipeline - Unsatisfied Demand\tPipeline - WIP\tTotalDemand\tProductive BO\tLogistic BO\tDatestSubsidiaryCode\tDirect Shipment BO\tECom - RetailModel\tTo Be Shipped BO
202405\t0805289602057\t29/01/2024\t1.250\t3\t0\t1.253\t2\t1\t0100\t0\t0\t4
202405\t0805289602057\t05/02/2024\t1.300\t5\t2\t1.307\t0\t0\t0100\t1\t0\t6
202406\t0805289602064\t12/02/2024\t10\t0\t0\t10\t0\t0\t0200\t0\t0\t0
";

const OTIF_HEADER: &str = "Release;Style;Grid;Yyear;Mmonth;Wweek;Qquarter;BusinessUnit;OrderSpecification;OrderType;KeyAccount;Region;SubCode;OTIF Num Shipped Qty Net;OTIF Den ToBeShpped Qty Net";
const OTIF_RED: &str = "SS 2025;ABC123;RED   42;2024;01;05;Q1;Optical;01;ZOR;0042;EMEA;007;10;12";
const OTIF_BLUE: &str = "SS 2025;ABC123;BLUE  42;2024;01;05;Q1;Optical;01;ZOR;0042;EMEA;007;3.5;4";
const OTIF_OTHER_RELEASE: &str = "FW 2024;XYZ999;BLACK 50;2024;01;05;Q1;Sun;02;ZOR;0051;APAC;008;1;1";
const OTIF_BLUE_NEXT_WEEK: &str = "SS 2025;ABC123;BLUE  42;2024;02;06;Q1;Optical;01;ZOR;0042;EMEA;007;2;2";
const OTIF_UNKNOWN_MODEL: &str = "SS 2025;QQQ000;GREEN 50;2024;02;06;Q1;Sun;01;ZOR;0042;EMEA;007;1;1";

const MASTER_DATA: &str = "Model,Size,Color,UPC\nABC123,42,RED,0805289602057\nABC123,42,BLUE,0805289602064\n";

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 2, day)
        .unwrap()
        .and_hms_opt(hour, 30, 0)
        .unwrap()
}

fn master_csv(root: &Path) -> PathBuf {
    root.join("master_data").join("master_data.csv")
}

fn config(root: &Path, extra: &str) -> RunConfig {
    let contents = format!(
        "data_root = '{}'\nrelease = \"SS 2025\"\nrelease_ly = \"SS 2024\"\nowner = \"Demand Planning\"\nmaster_data = '{}'\n{extra}",
        root.display(),
        master_csv(root).display()
    );
    RunConfig::from_toml_str(&contents, Path::new("test.toml")).unwrap()
}

fn context(root: &Path, now: NaiveDateTime) -> JobContext {
    JobContext::new(config(root, "")).at(now)
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn text_column(df: &DataFrame, name: &str) -> Vec<String> {
    df.column(name)
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect()
}

fn read_output(path: &Path, separator: u8) -> DataFrame {
    read_typed(path, DelimitedFormat::new(separator), &[]).unwrap()
}

fn missing_input(err: &anyhow::Error) -> &MissingInput {
    err.downcast_ref::<MissingInput>()
        .expect("error should be a missing input")
}

#[test]
fn registry_lists_every_job_once() {
    let jobs = all_jobs();
    assert_eq!(jobs.len(), DatasetKind::ALL.len());
    for kind in DatasetKind::ALL {
        let job = job_for(kind).expect("job registered");
        assert_eq!(job.dataset(), kind);
    }
    assert_eq!(
        job_for(DatasetKind::Otif).unwrap().code_identifier(),
        "otif_append_v1"
    );
}

#[test]
fn backorder_run_corrects_keys_and_consumes_the_extract() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), at(12, 10));
    let source = ctx.layout.input_dir(DatasetKind::Backorder).join("backorder.txt");
    write(&source, BACKORDER_EXTRACT);

    let report = job_for(DatasetKind::Backorder).unwrap().run(&ctx).unwrap();

    assert_eq!(report.outcome, RunOutcome::Replaced);
    assert_eq!(report.rows_read, 3);
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.key_adjustments, 1);
    assert!(!source.exists());
    assert_eq!(
        report.snapshot.as_deref(),
        Some(
            ctx.layout
                .history_dir(DatasetKind::Backorder)
                .join("20240212_103000_backorder.txt")
                .as_path()
        )
    );

    let output = read_output(&report.output, b',');
    assert_eq!(
        text_column(&output, "Year Week"),
        vec!["202404", "202405", "202406"]
    );
    assert_eq!(
        text_column(&output, "DatestSubsidiaryCode"),
        vec!["0100", "0100", "0200"]
    );
    assert_eq!(
        text_column(&output, "Pipeline - PurchaseFromSuppliers"),
        vec!["1250", "1300", "10"]
    );
    assert!(report.summary().contains("Week keys corrected: 1"));
}

#[test]
fn rerun_after_consumption_points_at_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let job = job_for(DatasetKind::Backorder).unwrap();
    let first = context(dir.path(), at(12, 10));
    write(
        &first.layout.input_dir(DatasetKind::Backorder).join("backorder.txt"),
        BACKORDER_EXTRACT,
    );
    let report = job.run(&first).unwrap();

    let err = job.run(&context(dir.path(), at(12, 11))).unwrap_err();
    match missing_input(&err) {
        MissingInput::AlreadyProcessed { last_snapshot, .. } => {
            assert_eq!(Some(last_snapshot), report.snapshot.as_ref());
        }
        other => panic!("unexpected classification: {other}"),
    }
    assert!(err.to_string().contains("may have already been processed"));
}

#[test]
fn extract_never_delivered_names_the_owner() {
    let dir = tempfile::tempdir().unwrap();
    let err = job_for(DatasetKind::Backorder)
        .unwrap()
        .run(&context(dir.path(), at(12, 10)))
        .unwrap_err();

    assert!(matches!(
        missing_input(&err),
        MissingInput::NeverProduced { owner, .. } if owner == "Demand Planning"
    ));
    assert!(err.to_string().ends_with("Refer to Demand Planning."));
}

#[test]
fn otif_store_is_created_then_appended() {
    let dir = tempfile::tempdir().unwrap();
    let job = job_for(DatasetKind::Otif).unwrap();
    write(&master_csv(dir.path()), MASTER_DATA);

    let first = context(dir.path(), at(12, 9));
    let source = first.layout.actual_dir(DatasetKind::Otif).join("00_OTIF_Reclass.txt");
    write(
        &source,
        &[OTIF_HEADER, OTIF_RED, OTIF_BLUE, OTIF_OTHER_RELEASE].join("\n"),
    );

    let created = job.run(&first).unwrap();
    assert_eq!(created.outcome, RunOutcome::Created);
    assert_eq!(created.rows_read, 3);
    assert_eq!(created.rows_written, 2);
    assert!(!source.exists());
    assert_eq!(
        created.output,
        dir.path().join("otif").join("otif.csv")
    );

    let store = read_output(&created.output, b';');
    assert_eq!(text_column(&store, "key_account"), vec!["0042", "0042"]);
    assert_eq!(text_column(&store, "week"), vec!["05", "05"]);
    assert_eq!(text_column(&store, "otif_week"), vec!["6", "6"]);
    assert_eq!(text_column(&store, "otif_month"), vec!["2", "2"]);
    assert_eq!(text_column(&store, "otif_quarter"), vec!["Q1", "Q1"]);
    assert!(store.column("UPC").is_err());

    // the same rows again change nothing
    let before = fs::read(&created.output).unwrap();
    write(&source, &[OTIF_HEADER, OTIF_RED, OTIF_BLUE].join("\n"));
    let unchanged = job.run(&context(dir.path(), at(12, 10))).unwrap();
    assert_eq!(unchanged.outcome, RunOutcome::UpToDate);
    assert_eq!(fs::read(&created.output).unwrap(), before);
    assert!(!source.exists());

    write(
        &source,
        &[OTIF_HEADER, OTIF_RED, OTIF_BLUE_NEXT_WEEK, OTIF_UNKNOWN_MODEL].join("\n"),
    );
    let appended = job.run(&context(dir.path(), at(12, 11))).unwrap();
    assert_eq!(appended.outcome, RunOutcome::Appended { new_rows: 2 });
    assert_eq!(appended.rows_written, 3);
    assert_eq!(appended.unreconciled_rows, 1);

    let store = read_output(&appended.output, b';');
    assert_eq!(
        text_column(&store, "UPC"),
        vec!["0805289602057", "0805289602064", "0805289602064"]
    );
    assert_eq!(text_column(&store, "otif_week"), vec!["6", "6", "7"]);

    let snapshots = fs::read_dir(first.layout.history_dir(DatasetKind::Otif))
        .unwrap()
        .count();
    assert_eq!(snapshots, 3);
}

#[test]
fn sales_run_stacks_current_over_past() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), at(12, 10));
    let current = ctx
        .layout
        .current_dir(DatasetKind::Sales)
        .join("sales_&_shipping_current.txt");
    let past = ctx
        .layout
        .past_dir(DatasetKind::Sales)
        .join("sales_&_shipping_past.txt");
    write(&current, "UPC\tDatest WHS\tQty\n0805289602057\t0010\t12\n0805289602064\t0020\t7\n");
    write(&past, "UPC\tDatest WHS\tQty\n0805289602057\t0010\t4\n");

    let report = job_for(DatasetKind::Sales).unwrap().run(&ctx).unwrap();

    assert_eq!(report.outcome, RunOutcome::Replaced);
    assert_eq!(report.rows_read, 3);
    assert_eq!(report.rows_written, 3);
    assert!(!current.exists());
    assert!(past.exists());

    let output = read_output(&report.output, b';');
    assert_eq!(
        report.output,
        dir.path().join("sales").join("sales_&_shippings.csv")
    );
    assert_eq!(text_column(&output, "Datest WHS"), vec!["0010", "0020", "0010"]);
    assert_eq!(text_column(&output, "Qty"), vec!["12", "7", "4"]);
}

#[test]
fn sales_without_past_extract_asks_for_a_download() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), at(12, 10));
    let current = ctx
        .layout
        .current_dir(DatasetKind::Sales)
        .join("sales_&_shipping_current.txt");
    write(&current, "UPC\tDatest WHS\tQty\n0805289602057\t0010\t12\n");

    let err = job_for(DatasetKind::Sales).unwrap().run(&ctx).unwrap_err();

    assert!(matches!(
        missing_input(&err),
        MissingInput::ManualDownloadRequired { .. }
    ));
    assert!(err
        .to_string()
        .ends_with("You have to download it from Business Object first."));
    assert!(current.exists());
}

#[test]
fn stock_run_moves_last_year_onto_this_year() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), at(12, 10));
    let header = "UPC\tDatest WHS\tStock Category (6 digit) Code\tYear\tYear Week\tQty";
    write(
        &ctx.layout.current_dir(DatasetKind::Stock).join("stock_current.txt"),
        &format!("{header}\n0805289602057\t0010\t000001\t2024\t202405\t12\n"),
    );
    write(
        &ctx.layout.past_dir(DatasetKind::Stock).join("stock_past.txt"),
        &format!("{header}\n0805289602057\t0010\t000001\t2023\t202352\t9\n"),
    );

    let report = job_for(DatasetKind::Stock).unwrap().run(&ctx).unwrap();
    assert_eq!(report.rows_written, 2);

    let output = read_output(&report.output, b';');
    assert_eq!(report.output, dir.path().join("stock").join("stocks.csv"));
    assert_eq!(text_column(&output, "Year"), vec!["2024", "2024"]);
    assert_eq!(text_column(&output, "Year Week"), vec!["202405", "202452"]);
    assert_eq!(
        text_column(&output, "Stock Category (6 digit) Code"),
        vec!["000001", "000001"]
    );
}

const CHARGED_EXPORT: &str = "model;grid;ClusterKey;UpdateYearWeekKey;TotalChargedQuantity
ABC123;RED   42;SS-2025;202403;25
ABC123;RED   42;SS-2025;202401;10
ABC123;RED   42;SS-2025;202402;10
ABC123;RED   42;SS-2025;202404;20
ABC123;BLUE  42;SS-2024;2405;5
XYZ999;BLACK 50;SS-2025;202401;3
";

fn charged_context(root: &Path) -> JobContext {
    let query = root.join("query").join("charged_v1.sql");
    write(
        &query,
        "SELECT * FROM charged WHERE ClusterKey IN :release",
    );
    write(&master_csv(root), MASTER_DATA);
    let extra = format!("[charged]\nquery_path = '{}'\n", query.display());
    JobContext::new(config(root, &extra)).at(at(12, 10))
}

#[test]
fn charged_run_aligns_releases_and_derives_weekly_quantities() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = charged_context(dir.path());
    write(
        &ctx.layout
            .input_dir(DatasetKind::Charged)
            .join("charged_export.txt"),
        CHARGED_EXPORT,
    );

    let report = job_for(DatasetKind::Charged).unwrap().run(&ctx).unwrap();

    assert_eq!(report.outcome, RunOutcome::Replaced);
    assert_eq!(report.rows_read, 6);
    assert_eq!(report.rows_written, 5);
    assert_eq!(report.key_adjustments, 1);
    assert_eq!(report.unreconciled_rows, 1);

    let output = read_typed(
        &report.output,
        DelimitedFormat::new(b';'),
        &[ColumnSpec::float("WeeklyChargedQuantity")],
    )
    .unwrap();
    assert_eq!(
        text_column(&output, "UPC"),
        vec![
            "0805289602057",
            "0805289602057",
            "0805289602057",
            "0805289602057",
            "0805289602064"
        ]
    );
    assert_eq!(
        text_column(&output, "UpdateYearWeekKey"),
        vec!["202401", "202402", "202403", "202404", "002505"]
    );
    let weekly: Vec<f64> = output
        .column("WeeklyChargedQuantity")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(weekly, vec![0.0, 0.0, 15.0, -5.0, 0.0]);
}

struct RecordingSource {
    queries: RefCell<Vec<String>>,
}

impl QuerySource for RecordingSource {
    fn fetch(&self, query: &str) -> anyhow::Result<DataFrame> {
        self.queries.borrow_mut().push(query.to_string());
        Ok(df![
            "model" => &["ABC123"],
            "grid" => &["RED   42"],
            "ClusterKey" => &["SS-2025"],
            "UpdateYearWeekKey" => &["202405"],
            "TotalChargedQuantity" => &[4.0],
        ]?)
    }
}

#[test]
fn charged_query_receives_both_releases() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = charged_context(dir.path());
    let source = RecordingSource {
        queries: RefCell::new(Vec::new()),
    };

    let report = ChargedJob.run_with_source(&ctx, &source).unwrap();

    assert_eq!(report.rows_written, 1);
    assert_eq!(
        source.queries.borrow().as_slice(),
        ["SELECT * FROM charged WHERE ClusterKey IN ('SS-2025', 'SS-2024')".to_string()]
    );
}

#[test]
fn failed_run_keeps_the_batch_file() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), at(12, 10));
    let source = ctx.layout.input_dir(DatasetKind::Backorder).join("backorder.txt");
    write(
        &source,
        &BACKORDER_EXTRACT.replace("29/01/2024", "2024/13/45"),
    );

    assert!(job_for(DatasetKind::Backorder).unwrap().run(&ctx).is_err());
    assert!(source.exists());
    assert!(!ctx
        .layout
        .dataset_dir(DatasetKind::Backorder)
        .join("backorder.csv")
        .exists());
}
