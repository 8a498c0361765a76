//! Post-load data quality check.
//!
//! The check reads back what the warehouse committed for the date rather
//! than trusting the upsert's reported count. It is existence-based: one
//! row passes even if other cities are missing.

use weather_ingest_database::{DbError, Warehouse};
use weather_ingest_models::{LogicalDate, QualityVerdict};

/// Counts the committed rows for `logical_date`.
///
/// # Errors
///
/// Returns [`DbError`] if the count query fails.
pub fn check_quality(
    warehouse: &dyn Warehouse,
    logical_date: LogicalDate,
) -> Result<QualityVerdict, DbError> {
    let row_count = warehouse.count_for_date(logical_date)?;
    let verdict = QualityVerdict {
        logical_date,
        row_count,
    };

    if verdict.passed() {
        log::info!("Quality check passed for {logical_date}: {row_count} rows");
    } else {
        log::warn!("Quality check failed for {logical_date}: no rows loaded");
    }

    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;
    use weather_ingest_database::DuckDbWarehouse;
    use weather_ingest_models::RawRecord;

    use super::*;

    fn record(city: &str) -> RawRecord {
        RawRecord {
            logical_date: "2025-01-01".parse().unwrap(),
            city_name: city.to_string(),
            lat: 1.0,
            lon: 1.0,
            payload: json!({}),
            raw_path: PathBuf::from("unused"),
        }
    }

    #[test]
    fn no_rows_fails() {
        let wh = DuckDbWarehouse::open_in_memory().unwrap();
        let verdict = check_quality(&wh, "2025-01-01".parse().unwrap()).unwrap();
        assert_eq!(verdict.row_count, 0);
        assert!(!verdict.passed());
    }

    #[test]
    fn a_single_row_passes_regardless_of_roster_size() {
        let wh = DuckDbWarehouse::open_in_memory().unwrap();
        wh.upsert_batch(&[record("CityA")]).unwrap();

        let verdict = check_quality(&wh, "2025-01-01".parse().unwrap()).unwrap();
        assert_eq!(verdict.row_count, 1);
        assert!(verdict.passed());
    }

    #[test]
    fn rows_for_other_dates_do_not_count() {
        let wh = DuckDbWarehouse::open_in_memory().unwrap();
        wh.upsert_batch(&[record("CityA")]).unwrap();

        let verdict = check_quality(&wh, "2025-01-02".parse().unwrap()).unwrap();
        assert!(!verdict.passed());
    }
}
