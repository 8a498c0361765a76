//! Pipeline settings loaded from an optional TOML file.
//!
//! Every field has a default, so an absent file or an empty table yields
//! the deployed behaviour. Example:
//!
//! ```toml
//! [api]
//! base_url = "https://api.open-meteo.com"
//!
//! [fetch]
//! pool_size = 4
//!
//! [retry]
//! max_retries = 3
//! initial_delay_secs = 120
//! max_delay_secs = 900
//!
//! [variables]
//! OPEN_METEO_CITIES = '[{"name": "Oslo", "lat": 59.91, "lon": 10.75}]'
//! RAW_BASE_PATH = "data/raw/open_meteo"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::store::{EnvStore, LayeredStore, MapStore};

/// Environment variable naming the settings file when `--config` is not
/// given.
pub const CONFIG_PATH_ENV: &str = "WEATHER_INGEST_CONFIG";

/// All tunables of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub api: ApiSettings,
    pub availability: AvailabilitySettings,
    pub fetch: FetchSettings,
    pub retry: RetrySettings,
    pub warehouse: WarehouseSettings,
    pub signal: SignalSettings,
    /// Key-value configuration entries (`OPEN_METEO_CITIES`,
    /// `RAW_BASE_PATH`). Environment variables of the same name take
    /// precedence.
    pub variables: BTreeMap<String, String>,
}

/// Weather API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Scheme and host; `/v1/forecast` is appended.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiSettings {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Availability gate polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilitySettings {
    pub poke_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for AvailabilitySettings {
    fn default() -> Self {
        Self {
            poke_interval_secs: 30,
            timeout_secs: 5 * 60,
        }
    }
}

impl AvailabilitySettings {
    #[must_use]
    pub const fn poke_interval(&self) -> Duration {
        Duration::from_secs(self.poke_interval_secs)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fetch stage concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Maximum number of API calls in flight across all runs sharing the
    /// pool.
    pub pool_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self { pool_size: 4 }
    }
}

/// Retry policy applied to each fetch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_delay_secs: u64,
    /// Upper bound on any single delay.
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_secs: 2 * 60,
            max_delay_secs: 15 * 60,
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

/// Warehouse location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// `DuckDB` database file.
    pub path: PathBuf,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/warehouse.duckdb"),
        }
    }
}

/// Completion signal destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    /// JSON-lines event log that downstream consumers watch.
    pub events_path: PathBuf,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            events_path: PathBuf::from("data/signals/open_meteo_raw_loaded.jsonl"),
        }
    }
}

impl PipelineSettings {
    /// Parses settings from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Settings`] if the TOML is malformed or a
    /// field has the wrong type, and [`ConfigError::InvalidSetting`] if
    /// a value is out of range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(toml_str).map_err(|e| ConfigError::Settings {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from `path`, falling back to the file named by
    /// [`CONFIG_PATH_ENV`], and finally to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let Some(path) = path else {
            log::debug!("No settings file given, using defaults");
            return Ok(Self::default());
        };

        log::info!("Loading pipeline settings from {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Builds the key-value store runs resolve their roster from:
    /// environment variables first, then the `[variables]` table.
    #[must_use]
    pub fn variable_store(&self) -> LayeredStore {
        LayeredStore::new()
            .layer(EnvStore)
            .layer(MapStore::from(self.variables.clone()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.pool_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "fetch.pool_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.availability.poke_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "availability.poke_interval_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_delay_secs < self.retry.initial_delay_secs {
            return Err(ConfigError::InvalidSetting {
                name: "retry.max_delay_secs".to_string(),
                message: "must not be less than retry.initial_delay_secs".to_string(),
            });
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "api.base_url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigStore as _;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = PipelineSettings::from_toml_str("").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.retry.initial_delay(), Duration::from_secs(120));
        assert_eq!(settings.retry.max_delay(), Duration::from_secs(900));
        assert_eq!(settings.availability.poke_interval(), Duration::from_secs(30));
        assert_eq!(settings.availability.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let settings = PipelineSettings::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost:8080"

            [fetch]
            pool_size = 2

            [variables]
            RAW_BASE_PATH = "/tmp/raw"
            "#,
        )
        .unwrap();

        assert_eq!(settings.api.base_url, "http://localhost:8080");
        assert_eq!(settings.api.request_timeout_secs, 30);
        assert_eq!(settings.fetch.pool_size, 2);
        assert_eq!(settings.retry, RetrySettings::default());
        assert_eq!(
            settings.variables.get("RAW_BASE_PATH").map(String::as_str),
            Some("/tmp/raw")
        );
    }

    #[test]
    fn variable_store_reads_the_variables_table() {
        let settings = PipelineSettings::from_toml_str(
            "[variables]\nWEATHER_INGEST_TEST_ONLY_KEY = \"from-file\"",
        )
        .unwrap();

        let store = settings.variable_store();
        assert_eq!(
            store.get("WEATHER_INGEST_TEST_ONLY_KEY").as_deref(),
            Some("from-file")
        );
        assert_eq!(store.get("WEATHER_INGEST_TEST_ONLY_MISSING"), None);
    }

    #[test]
    fn rejects_zero_pool_size() {
        let err = PipelineSettings::from_toml_str("[fetch]\npool_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { ref name, .. } if name == "fetch.pool_size"));
    }

    #[test]
    fn rejects_inverted_retry_bounds() {
        let err = PipelineSettings::from_toml_str(
            "[retry]\ninitial_delay_secs = 60\nmax_delay_secs = 10",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = PipelineSettings::from_toml_str("[fetch]\npool_size = \"four\"").unwrap_err();
        assert!(matches!(err, ConfigError::Settings { .. }));
    }

    #[test]
    fn loads_settings_file_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[warehouse]\npath = \"/data/wh.duckdb\"\n").unwrap();

        let settings = PipelineSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.warehouse.path, PathBuf::from("/data/wh.duckdb"));
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = PipelineSettings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
