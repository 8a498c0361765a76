//! `DuckDB` warehouse.
//!
//! One database file holds the `raw.open_meteo_current` table. The
//! connection sits behind a mutex so a single [`DuckDbWarehouse`] can be
//! shared by concurrent runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use duckdb::Connection;
use weather_ingest_models::{LogicalDate, RawRecord, WarehouseRow};

use crate::{DbError, Warehouse};

/// Fully qualified warehouse table.
pub const TABLE: &str = "raw.open_meteo_current";

/// Columns bound per row in the upsert statement.
const PARAMS_PER_ROW: usize = 6;

/// Text form `ingested_at` is bound in.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// [`Warehouse`] backed by a `DuckDB` database.
pub struct DuckDbWarehouse {
    conn: Mutex<Connection>,
}

impl DuckDbWarehouse {
    /// Opens (or creates) the database at `path` and ensures the schema
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the directory, connection, or schema cannot
    /// be created.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        log::debug!("Opening warehouse {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema cannot be created.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS raw;

        CREATE TABLE IF NOT EXISTS raw.open_meteo_current (
            load_date DATE NOT NULL,
            city_name VARCHAR NOT NULL,
            lat DOUBLE NOT NULL,
            lon DOUBLE NOT NULL,
            payload VARCHAR NOT NULL,
            ingested_at TIMESTAMP NOT NULL,
            PRIMARY KEY (load_date, city_name)
        );",
    )?;

    Ok(())
}

/// Keeps the last record of each `(logical_date, city_name)` key, in
/// first-seen order. `DuckDB` rejects an `ON CONFLICT` insert that
/// touches the same key twice.
fn dedupe(records: &[RawRecord]) -> Vec<&RawRecord> {
    let mut last_seen: BTreeMap<(LogicalDate, &str), usize> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        last_seen.insert((record.logical_date, record.city_name.as_str()), i);
    }

    records
        .iter()
        .enumerate()
        .filter(|(i, r)| last_seen.get(&(r.logical_date, r.city_name.as_str())) == Some(i))
        .map(|(_, r)| r)
        .collect()
}

fn upsert_sql(rows: usize) -> String {
    let mut sql = format!(
        "INSERT INTO {TABLE} (load_date, city_name, lat, lon, payload, ingested_at) VALUES "
    );

    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str("(CAST(? AS DATE), ?, ?, ?, ?, CAST(? AS TIMESTAMP))");
    }

    sql.push_str(
        " ON CONFLICT (load_date, city_name) DO UPDATE SET
            lat = EXCLUDED.lat,
            lon = EXCLUDED.lon,
            payload = EXCLUDED.payload,
            ingested_at = EXCLUDED.ingested_at",
    );

    sql
}

impl Warehouse for DuckDbWarehouse {
    fn upsert_batch(&self, records: &[RawRecord]) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let deduped = dedupe(records);
        if deduped.len() < records.len() {
            log::info!(
                "Deduplicated upsert batch: {} -> {} rows",
                records.len(),
                deduped.len()
            );
        }

        let payloads = deduped
            .iter()
            .map(|r| serde_json::to_string(&r.payload))
            .collect::<Result<Vec<_>, _>>()?;

        let ingested_at = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let affected = {
            let mut stmt = tx.prepare(&upsert_sql(deduped.len()))?;
            let mut idx = 1usize;

            for (record, payload) in deduped.iter().zip(&payloads) {
                stmt.raw_bind_parameter(idx, record.logical_date.to_string())?;
                stmt.raw_bind_parameter(idx + 1, &record.city_name)?;
                stmt.raw_bind_parameter(idx + 2, record.lat)?;
                stmt.raw_bind_parameter(idx + 3, record.lon)?;
                stmt.raw_bind_parameter(idx + 4, payload)?;
                stmt.raw_bind_parameter(idx + 5, &ingested_at)?;
                idx += PARAMS_PER_ROW;
            }

            stmt.raw_execute()?
        };

        tx.commit()?;

        let affected = u64::try_from(affected).unwrap_or(0);
        log::info!("Upserted {affected} rows into {TABLE}");
        Ok(affected)
    }

    fn count_for_date(&self, date: LogicalDate) -> Result<u64, DbError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT COUNT(*) FROM {TABLE} WHERE load_date = CAST(? AS DATE)"))?;
        let count: i64 = stmt.query_row([date.to_string()], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn rows_for_date(&self, date: LogicalDate) -> Result<Vec<WarehouseRow>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT CAST(load_date AS VARCHAR), city_name, lat, lon, payload,
                    CAST(ingested_at AS VARCHAR)
             FROM {TABLE}
             WHERE load_date = CAST(? AS DATE)
             ORDER BY city_name"
        ))?;

        let raw_rows = stmt.query_map([date.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut rows = Vec::new();
        for raw in raw_rows {
            let (load_date, city_name, lat, lon, payload, ingested_at) = raw?;
            rows.push(WarehouseRow {
                logical_date: load_date.parse().map_err(|e| DbError::Conversion {
                    message: format!("load_date: {e}"),
                })?,
                city_name,
                lat,
                lon,
                payload: serde_json::from_str(&payload)?,
                ingested_at: ingested_at.as_deref().and_then(parse_timestamp),
            });
        }

        Ok(rows)
    }
}

/// Parses `DuckDB`'s text form of a `TIMESTAMP`, with or without
/// fractional seconds.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| log::warn!("Failed to parse timestamp: {s:?}"))
        .ok()
}
