#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record types passed between the stages of a daily ingestion run.
//!
//! Every stage takes its input by value and hands a concrete record to
//! the next one: the planner emits [`FetchRequest`]s, the fetcher turns
//! them into [`FetchResult`]s, the raw writer produces [`RawRecord`]s and
//! the warehouse stores them as [`WarehouseRow`]s keyed by
//! `(logical_date, city_name)`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Fixed logical name of the dataset announced on a successful load.
pub const RAW_LOADED_DATASET: &str = "dataset://open-meteo/raw_loaded";

/// Format used for logical dates in partition paths, keys, and the CLI.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Error returned when a string is not a valid `YYYY-MM-DD` date.
#[derive(Debug, thiserror::Error)]
#[error("Invalid logical date {value:?}: expected YYYY-MM-DD")]
pub struct InvalidDateError {
    /// The rejected input.
    pub value: String,
}

/// The calendar day a run represents.
///
/// Distinct from the wall-clock time of execution: a backfill replays
/// past dates, and every partition path and idempotency key derives from
/// this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalDate(NaiveDate);

impl LogicalDate {
    /// Wraps a calendar date.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns the underlying calendar date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Returns the following day, or `None` at the end of the calendar.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }

    /// Returns the previous day, or `None` at the start of the calendar.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub_days(Days::new(1)).map(Self)
    }
}

impl FromStr for LogicalDate {
    type Err = InvalidDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|_| InvalidDateError {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for LogicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

/// One entry of the city roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    /// Display name, also the city half of the warehouse key.
    pub name: String,
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lon: f64,
}

impl CityConfig {
    /// Creates a roster entry.
    #[must_use]
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    /// Returns the name as used in partition file names (`New York` →
    /// `New_York`).
    #[must_use]
    pub fn partition_name(&self) -> String {
        self.name.replace(' ', "_")
    }
}

/// A single city's fetch for one logical date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// City to fetch.
    pub city: CityConfig,
    /// Day the fetch is stamped with.
    pub logical_date: LogicalDate,
}

/// A [`FetchRequest`] together with the payload returned by the API.
///
/// The payload is opaque: it is stored verbatim, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// The request that produced this payload.
    pub request: FetchRequest,
    /// Raw JSON document returned by the weather API.
    pub payload: serde_json::Value,
}

/// A payload that has been written to the raw file store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub logical_date: LogicalDate,
    pub city_name: String,
    pub lat: f64,
    pub lon: f64,
    pub payload: serde_json::Value,
    /// Where the authoritative raw copy lives.
    pub raw_path: PathBuf,
}

/// A row of the warehouse table, keyed by `(logical_date, city_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRow {
    pub logical_date: LogicalDate,
    pub city_name: String,
    pub lat: f64,
    pub lon: f64,
    pub payload: serde_json::Value,
    /// Refreshed on every insert or update of the row.
    pub ingested_at: Option<NaiveDateTime>,
}

/// Outcome of the data-quality check for one logical date.
///
/// The check is existence-based: any row for the date passes, whether or
/// not every configured city is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub logical_date: LogicalDate,
    /// Rows found in the warehouse for the date after the load committed.
    pub row_count: u64,
}

impl QualityVerdict {
    /// Returns `true` if at least one row exists for the date.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.row_count > 0
    }
}

/// Event announcing that a logical date's raw data is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    /// Logical dataset name subscribers key on.
    pub dataset: String,
    pub logical_date: LogicalDate,
    pub rows_loaded: u64,
}

impl CompletionSignal {
    /// Creates a signal for [`RAW_LOADED_DATASET`].
    #[must_use]
    pub fn raw_loaded(logical_date: LogicalDate, rows_loaded: u64) -> Self {
        Self {
            dataset: RAW_LOADED_DATASET.to_string(),
            logical_date,
            rows_loaded,
        }
    }
}

/// Lifecycle of a run once its quality verdict is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Load finished, verdict not yet acted on.
    Pending,
    /// Completion signal emitted.
    Published,
    /// Partition moved to quarantine.
    Quarantined,
}

impl RunState {
    /// Returns `true` for states a run can never leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Quarantined)
    }
}
