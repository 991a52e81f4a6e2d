use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::processing::clean::CleaningRules;

pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";
const METRICS_SNAPSHOT_FILE: &str = "run_metrics.prom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sqlite,
    Ndjson,
}

impl std::str::FromStr for SourceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(SourceKind::Sqlite),
            "ndjson" => Ok(SourceKind::Ndjson),
            other => Err(PipelineError::Config(format!("unknown source kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// SQLite database file, or directory of NDJSON table files
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Sqlite,
            path: PathBuf::from("data/source/adventureworks.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_root: PathBuf,
    /// Keep a timestamped copy next to each `_latest` artifact
    pub retain_history: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            retain_history: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub identity_key: String,
    pub last_modified_field: String,
    pub active_only: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        let rules = CleaningRules::default();
        Self {
            identity_key: rules.identity_key,
            last_modified_field: rules.last_modified_field,
            active_only: rules.active_only,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_rows: usize,
    /// Per-field overrides of the silver null-ratio thresholds
    pub null_thresholds: BTreeMap<String, f64>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_rows: 1,
            null_thresholds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub file_name: String,
    /// Used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            file_name: "pipeline.log".to_string(),
            default_filter: "employee_etl=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub cleaning: CleaningConfig,
    pub quality: QualityConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load `.env`, then the TOML file (explicit path, else `pipeline.toml` if
    /// present, else defaults), then apply `ETL_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `ETL_SOURCE_KIND`, `ETL_SOURCE_PATH`, `ETL_DATA_ROOT` and `ETL_LOG_DIR`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("ETL_SOURCE_KIND") {
            self.source.kind = kind.parse()?;
        }
        if let Some(path) = lookup("ETL_SOURCE_PATH") {
            self.source.path = PathBuf::from(path);
        }
        if let Some(root) = lookup("ETL_DATA_ROOT") {
            self.storage.data_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("ETL_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, threshold) in &self.quality.null_thresholds {
            if !(0.0..=1.0).contains(threshold) {
                return Err(PipelineError::Config(format!(
                    "null threshold for '{}' must be within [0, 1], got {}",
                    field, threshold
                )));
            }
        }
        if self.cleaning.identity_key.trim().is_empty() {
            return Err(PipelineError::Config("cleaning.identity_key is empty".to_string()));
        }
        Ok(())
    }

    /// Cleaning rules with the configured key, filters and gate overrides
    pub fn cleaning_rules(&self) -> CleaningRules {
        let mut rules = CleaningRules {
            identity_key: self.cleaning.identity_key.clone(),
            last_modified_field: self.cleaning.last_modified_field.clone(),
            active_only: self.cleaning.active_only,
            ..CleaningRules::default()
        };
        rules.ruleset = rules
            .ruleset
            .with_min_rows(self.quality.min_rows)
            .with_duplicate_key([rules.identity_key.clone()]);
        for (field, threshold) in &self.quality.null_thresholds {
            rules.ruleset = rules.ruleset.with_null_threshold(field, *threshold);
        }
        rules
    }

    pub fn metrics_snapshot_path(&self) -> PathBuf {
        self.storage.data_root.join(METRICS_SNAPSHOT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fields;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.source.kind, SourceKind::Sqlite);
        assert_eq!(config.storage.data_root, PathBuf::from("data"));
        assert_eq!(config.cleaning.identity_key, fields::EMPLOYEE_KEY);
        assert_eq!(config.logging.file_name, "pipeline.log");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [source]
            kind = "ndjson"
            path = "fixtures/source"

            [cleaning]
            active_only = true

            [quality]
            min_rows = 10
            null_thresholds = { DepartmentName = 0.2 }
            "#,
        )
        .unwrap();
        assert_eq!(config.source.kind, SourceKind::Ndjson);
        assert!(config.cleaning.active_only);

        let rules = config.cleaning_rules();
        assert!(rules.active_only);
        assert_eq!(rules.ruleset.min_rows, 10);
        assert_eq!(rules.ruleset.null_thresholds[fields::DEPARTMENT_NAME], 0.2);
        // untouched thresholds keep their defaults
        assert_eq!(rules.ruleset.null_thresholds[fields::EMPLOYEE_KEY], 0.0);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                "ETL_SOURCE_KIND" => Some("NDJSON".to_string()),
                "ETL_DATA_ROOT" => Some("/tmp/etl".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.source.kind, SourceKind::Ndjson);
        assert_eq!(config.metrics_snapshot_path(), PathBuf::from("/tmp/etl/run_metrics.prom"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = Config::from_toml("[quality]\nnull_thresholds = { Age = 1.5 }").unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
