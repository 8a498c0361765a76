#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration for the weather ingestion pipeline.
//!
//! Two concerns live here:
//!
//! - [`PipelineSettings`]: endpoint, pool size, retry policy and storage
//!   locations, read from an optional TOML file.
//! - [`resolve`]: the per-run lookup of the city roster and raw-storage
//!   base path from a key-value [`ConfigStore`].

pub mod settings;
pub mod store;

use std::collections::BTreeSet;
use std::path::PathBuf;

use weather_ingest_models::CityConfig;

pub use settings::PipelineSettings;
pub use store::{ConfigStore, EnvStore, LayeredStore, MapStore};

/// Key holding the city roster as a JSON array of `{name, lat, lon}`.
pub const CITIES_KEY: &str = "OPEN_METEO_CITIES";

/// Key holding the raw-storage base path.
pub const RAW_BASE_KEY: &str = "RAW_BASE_PATH";

/// Raw-storage base path used when [`RAW_BASE_KEY`] is unset.
pub const DEFAULT_RAW_BASE: &str = "data/raw/open_meteo";

/// Errors that can occur while loading settings or resolving the roster.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required key is absent from the configuration store.
    #[error("Missing configuration key: {key}")]
    MissingKey {
        /// Name of the missing key.
        key: String,
    },

    /// The roster value is not a JSON array of `{name, lat, lon}`.
    #[error("Malformed city roster: {message}")]
    MalformedRoster {
        /// Description of what went wrong.
        message: String,
    },

    /// The roster parsed but contains no cities.
    #[error("City roster is empty")]
    EmptyRoster,

    /// Two roster entries share a name, or names that map to the same
    /// partition file (`"New York"` and `"New_York"`).
    #[error("Duplicate city in roster: {name}")]
    DuplicateCity {
        /// The repeated name.
        name: String,
    },

    /// A roster entry has an empty name, a name that is not a single path
    /// component, or out-of-range coordinates.
    #[error("Invalid city {name:?}: {message}")]
    InvalidCity {
        /// Name of the offending entry.
        name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The raw-storage base path is set but blank.
    #[error("Raw storage base path must not be empty")]
    EmptyRawBase,

    /// The settings file could not be read.
    #[error("Failed to read settings file {}: {source}", .path.display())]
    Read {
        /// Path of the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`PipelineSettings`].
    #[error("Invalid settings: {message}")]
    Settings {
        /// Parser message.
        message: String,
    },

    /// A setting has a value outside its allowed range.
    #[error("Invalid setting {name}: {message}")]
    InvalidSetting {
        /// Dotted name of the setting.
        name: String,
        /// Description of what went wrong.
        message: String,
    },
}

/// Configuration resolved once at the start of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Cities to ingest, in roster order.
    pub cities: Vec<CityConfig>,
    /// Root of the raw partitioned file store.
    pub raw_base: PathBuf,
}

/// Resolves the city roster and raw-storage base path from `store`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the roster is missing, is not a JSON array
/// of cities, is empty, repeats a city name, or contains an invalid
/// entry, or if the base path is set but blank.
pub fn resolve(store: &dyn ConfigStore) -> Result<ResolvedConfig, ConfigError> {
    let roster = store.get(CITIES_KEY).ok_or_else(|| ConfigError::MissingKey {
        key: CITIES_KEY.to_string(),
    })?;
    let cities = parse_roster(&roster)?;

    let raw_base = match store.get(RAW_BASE_KEY) {
        Some(value) if value.trim().is_empty() => return Err(ConfigError::EmptyRawBase),
        Some(value) => PathBuf::from(value.trim()),
        None => PathBuf::from(DEFAULT_RAW_BASE),
    };

    log::debug!(
        "Resolved {} cities, raw base {}",
        cities.len(),
        raw_base.display()
    );

    Ok(ResolvedConfig { cities, raw_base })
}

/// Parses and validates a JSON city roster.
///
/// # Errors
///
/// Returns [`ConfigError`] if the document is malformed or fails
/// validation.
pub fn parse_roster(json: &str) -> Result<Vec<CityConfig>, ConfigError> {
    let cities: Vec<CityConfig> =
        serde_json::from_str(json).map_err(|e| ConfigError::MalformedRoster {
            message: e.to_string(),
        })?;

    if cities.is_empty() {
        return Err(ConfigError::EmptyRoster);
    }

    let mut seen = BTreeSet::new();
    for city in &cities {
        validate_city(city)?;
        if !seen.insert(city.partition_name()) {
            return Err(ConfigError::DuplicateCity {
                name: city.name.clone(),
            });
        }
    }

    Ok(cities)
}

fn validate_city(city: &CityConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidCity {
        name: city.name.clone(),
        message: message.to_string(),
    };

    if city.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if city.name.contains(['/', '\\', '\0']) || matches!(city.name.trim(), "." | "..") {
        return Err(invalid("name must be usable as a file name"));
    }
    if !(-90.0..=90.0).contains(&city.lat) {
        return Err(invalid("latitude must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&city.lon) {
        return Err(invalid("longitude must be within [-180, 180]"));
    }

    Ok(())
}
