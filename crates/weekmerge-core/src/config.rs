use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use weekmerge_extracts::DatasetKind;

use crate::storage::StoreFormat;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const CONFIG_ENV_VAR: &str = "WEEKMERGE_CONFIG";

const DEFAULT_OWNER: &str = "Wholesale Forecasting";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub data_root: PathBuf,
    pub release: String,
    pub release_ly: String,
    #[serde(default)]
    pub master_data: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Team to contact when an extract was never produced.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub otif: OtifConfig,
    #[serde(default)]
    pub charged: ChargedConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtifConfig {
    #[serde(default)]
    pub store_format: StoreFormat,
    #[serde(default = "default_true")]
    pub filter_release: bool,
    #[serde(default)]
    pub owner: Option<String>,
}

impl Default for OtifConfig {
    fn default() -> Self {
        Self {
            store_format: StoreFormat::default(),
            filter_release: true,
            owner: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargedConfig {
    #[serde(default)]
    pub query_path: Option<PathBuf>,
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn layout(&self) -> PathLayout {
        PathLayout::new(&self.data_root)
    }

    pub fn master_data_path(&self) -> PathBuf {
        self.master_data
            .clone()
            .unwrap_or_else(|| self.layout().master_data())
    }

    pub fn owner_for(&self, kind: DatasetKind) -> &str {
        match (kind, &self.otif.owner) {
            (DatasetKind::Otif, Some(owner)) => owner,
            _ => &self.owner,
        }
    }

    pub fn charged_query_path(&self) -> PathBuf {
        self.charged
            .query_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("query").join("charged_v1.sql"))
    }

    pub fn charged_export_path(&self) -> PathBuf {
        self.charged.export_path.clone().unwrap_or_else(|| {
            self.layout()
                .input_dir(DatasetKind::Charged)
                .join(weekmerge_extracts::schema::CHARGED_EXPORT.file_name)
        })
    }
}

/// `--config` wins, then `WEEKMERGE_CONFIG`, then `config/config.toml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Directory layout under the data root, one tree per dataset:
/// `<root>/<dataset>/{input,input/current,input/past,actual,history}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    root: PathBuf,
}

impl PathLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dataset_dir(&self, kind: DatasetKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    pub fn input_dir(&self, kind: DatasetKind) -> PathBuf {
        self.dataset_dir(kind).join("input")
    }

    pub fn current_dir(&self, kind: DatasetKind) -> PathBuf {
        self.input_dir(kind).join("current")
    }

    pub fn past_dir(&self, kind: DatasetKind) -> PathBuf {
        self.input_dir(kind).join("past")
    }

    pub fn actual_dir(&self, kind: DatasetKind) -> PathBuf {
        self.dataset_dir(kind).join("actual")
    }

    pub fn history_dir(&self, kind: DatasetKind) -> PathBuf {
        self.dataset_dir(kind).join("history")
    }

    pub fn master_data(&self) -> PathBuf {
        self.root.join("master_data").join("master_data.xlsx")
    }
}
