//! Canonical paths inside the raw file store.
//!
//! ```text
//! {raw_base}/load_date=2025-01-01/city=New_York.json
//! {raw_base}/quarantine/load_date=2025-01-01/city=New_York.json
//! ```

use std::path::{Path, PathBuf};

use weather_ingest_models::{CityConfig, LogicalDate};

/// Name of the quarantine area under the raw base.
pub const QUARANTINE_DIR: &str = "quarantine";

/// Returns the partition directory name for `date` (`load_date=YYYY-MM-DD`).
#[must_use]
pub fn partition_name(date: LogicalDate) -> String {
    format!("load_date={date}")
}

/// Returns the active partition directory for `date`.
#[must_use]
pub fn partition_dir(raw_base: &Path, date: LogicalDate) -> PathBuf {
    raw_base.join(partition_name(date))
}

/// Returns the raw file for `city` on `date`.
#[must_use]
pub fn raw_file_path(raw_base: &Path, date: LogicalDate, city: &CityConfig) -> PathBuf {
    partition_dir(raw_base, date).join(format!("city={}.json", city.partition_name()))
}

/// Returns the quarantine directory for `date`.
#[must_use]
pub fn quarantine_dir(raw_base: &Path, date: LogicalDate) -> PathBuf {
    raw_base.join(QUARANTINE_DIR).join(partition_name(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> LogicalDate {
        "2025-01-01".parse().unwrap()
    }

    #[test]
    fn builds_partitioned_file_path() {
        let path = raw_file_path(
            Path::new("/data/raw"),
            date(),
            &CityConfig::new("New York", 40.7, -74.0),
        );
        assert_eq!(
            path,
            PathBuf::from("/data/raw/load_date=2025-01-01/city=New_York.json")
        );
    }

    #[test]
    fn quarantine_keeps_the_date() {
        assert_eq!(
            quarantine_dir(Path::new("/data/raw"), date()),
            PathBuf::from("/data/raw/quarantine/load_date=2025-01-01")
        );
    }
}
