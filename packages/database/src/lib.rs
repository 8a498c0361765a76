#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Relational warehouse for raw weather payloads.
//!
//! Rows live in `raw.open_meteo_current`, keyed by
//! `(load_date, city_name)`. Loads are idempotent: a repeated key
//! replaces the coordinates and payload and refreshes `ingested_at`.
//! The [`Warehouse`] trait is what the pipeline depends on;
//! [`warehouse::DuckDbWarehouse`] is the `DuckDB` implementation.

pub mod warehouse;

use weather_ingest_models::{LogicalDate, RawRecord, WarehouseRow};

pub use warehouse::DuckDbWarehouse;

/// Errors that can occur during warehouse operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload could not be encoded or decoded.
    #[error("Payload JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value could not be converted back into a model type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A previous holder of the connection panicked.
    #[error("Warehouse connection lock poisoned")]
    Poisoned,
}

/// Storage the pipeline loads into and checks against.
pub trait Warehouse: Send + Sync {
    /// Inserts or updates every record in a single transaction keyed by
    /// `(logical_date, city_name)`. Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the batch fails; nothing is committed then.
    fn upsert_batch(&self, records: &[RawRecord]) -> Result<u64, DbError>;

    /// Returns the number of rows stored for `date`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn count_for_date(&self, date: LogicalDate) -> Result<u64, DbError>;

    /// Returns the rows stored for `date`, ordered by city name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    fn rows_for_date(&self, date: LogicalDate) -> Result<Vec<WarehouseRow>, DbError>;
}
