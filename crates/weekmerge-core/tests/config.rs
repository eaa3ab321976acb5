use std::fs;
use std::path::{Path, PathBuf};

use weekmerge_core::config::{resolve_config_path, ConfigError, RunConfig, CONFIG_ENV_VAR};
use weekmerge_core::storage::StoreFormat;
use weekmerge_extracts::DatasetKind;

const FULL: &str = r#"
data_root = "/srv/forecast/data"
release = "SS 2025"
release_ly = "SS 2024"
master_data = "/srv/forecast/master_data.parquet"
log_dir = "/srv/forecast/logs"
owner = "Demand Planning"

[notifications]
sender = "pipeline@example.com"
recipients = ["planner@example.com"]
cc = ["lead@example.com"]
outbox_dir = "/srv/forecast/outbox"

[otif]
store_format = "parquet"
filter_release = false
owner = "Wholesale Forecasting"

[charged]
query_path = "/srv/forecast/query/charged_v1.sql"
"#;

#[test]
fn full_config_is_parsed() {
    let config = RunConfig::from_toml_str(FULL, Path::new("config.toml")).unwrap();

    assert_eq!(config.data_root, PathBuf::from("/srv/forecast/data"));
    assert_eq!(config.release, "SS 2025");
    assert_eq!(config.release_ly, "SS 2024");
    assert_eq!(
        config.master_data_path(),
        PathBuf::from("/srv/forecast/master_data.parquet")
    );
    assert_eq!(config.notifications.recipients, vec!["planner@example.com"]);
    assert!(config.notifications.bcc.is_empty());
    assert_eq!(config.otif.store_format, StoreFormat::Parquet);
    assert!(!config.otif.filter_release);
    assert_eq!(config.owner_for(DatasetKind::Otif), "Wholesale Forecasting");
    assert_eq!(config.owner_for(DatasetKind::Backorder), "Demand Planning");
    assert_eq!(
        config.charged_query_path(),
        PathBuf::from("/srv/forecast/query/charged_v1.sql")
    );
}

#[test]
fn minimal_config_takes_defaults() {
    let config = RunConfig::from_toml_str(
        "data_root = \"data\"\nrelease = \"SS 2025\"\nrelease_ly = \"SS 2024\"\n",
        Path::new("config.toml"),
    )
    .unwrap();

    assert_eq!(config.owner, "Wholesale Forecasting");
    assert_eq!(config.otif.store_format, StoreFormat::Csv);
    assert!(config.otif.filter_release);
    assert!(config.notifications.outbox_dir.is_none());
    assert_eq!(
        config.master_data_path(),
        Path::new("data").join("master_data").join("master_data.xlsx")
    );
    assert_eq!(
        config.charged_export_path(),
        Path::new("data")
            .join("charged")
            .join("input")
            .join("charged_export.txt")
    );
}

#[test]
fn layout_follows_the_dataset_tree() {
    let config = RunConfig::from_toml_str(
        "data_root = \"data\"\nrelease = \"SS 2025\"\nrelease_ly = \"SS 2024\"\n",
        Path::new("config.toml"),
    )
    .unwrap();
    let layout = config.layout();
    let stock = Path::new("data").join("stock");

    assert_eq!(layout.dataset_dir(DatasetKind::Stock), stock);
    assert_eq!(layout.input_dir(DatasetKind::Stock), stock.join("input"));
    assert_eq!(
        layout.current_dir(DatasetKind::Stock),
        stock.join("input").join("current")
    );
    assert_eq!(
        layout.past_dir(DatasetKind::Stock),
        stock.join("input").join("past")
    );
    assert_eq!(layout.actual_dir(DatasetKind::Stock), stock.join("actual"));
    assert_eq!(layout.history_dir(DatasetKind::Stock), stock.join("history"));
}

#[test]
fn invalid_or_missing_config_is_reported() {
    let missing_release = RunConfig::from_toml_str("data_root = \"data\"\n", Path::new("bad.toml"));
    assert!(matches!(missing_release, Err(ConfigError::Parse { .. })));

    let dir = tempfile::tempdir().unwrap();
    let absent = RunConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(absent, Err(ConfigError::Read { .. })));

    let path = dir.path().join("config.toml");
    fs::write(&path, FULL).unwrap();
    assert_eq!(RunConfig::load(&path).unwrap().release, "SS 2025");
}

#[test]
fn explicit_config_path_wins() {
    let explicit = PathBuf::from("elsewhere/config.toml");
    assert_eq!(resolve_config_path(Some(explicit.clone())), explicit);
}

#[test]
fn environment_supplies_the_config_path_when_no_flag_is_given() {
    std::env::set_var(CONFIG_ENV_VAR, "from-env/config.toml");
    let resolved = resolve_config_path(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, PathBuf::from("from-env/config.toml"));
    assert_eq!(
        resolve_config_path(Some(PathBuf::from("flag.toml"))),
        PathBuf::from("flag.toml")
    );
}
