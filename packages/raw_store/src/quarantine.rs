//! Moves a failed date's partition out of the active raw area.

use std::path::{Path, PathBuf};

use weather_ingest_models::LogicalDate;

use crate::StorageError;
use crate::paths::{partition_dir, quarantine_dir};

/// What [`quarantine_partition`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineOutcome {
    /// The partition was renamed into the quarantine area.
    Moved {
        from: PathBuf,
        to: PathBuf,
    },
    /// No partition existed for the date.
    NothingToMove {
        /// The directory that was looked for.
        expected: PathBuf,
    },
}

/// Renames `{raw_base}/load_date={date}` to
/// `{raw_base}/quarantine/load_date={date}`.
///
/// An older quarantined copy of the same date is replaced. A missing
/// partition is not an error.
///
/// # Errors
///
/// Returns [`StorageError::Quarantine`] if the partition exists but
/// cannot be moved.
pub async fn quarantine_partition(
    raw_base: &Path,
    date: LogicalDate,
) -> Result<QuarantineOutcome, StorageError> {
    let from = partition_dir(raw_base, date);
    let to = quarantine_dir(raw_base, date);

    let move_error = |source| StorageError::Quarantine {
        from: from.clone(),
        to: to.clone(),
        source,
    };

    if !tokio::fs::try_exists(&from).await.map_err(move_error)? {
        log::warn!(
            "No raw partition for {date} at {}, nothing to quarantine",
            from.display()
        );
        return Ok(QuarantineOutcome::NothingToMove { expected: from });
    }

    if tokio::fs::try_exists(&to).await.map_err(move_error)? {
        log::warn!("Replacing earlier quarantined partition {}", to.display());
        tokio::fs::remove_dir_all(&to).await.map_err(move_error)?;
    }

    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(move_error)?;
    }
    tokio::fs::rename(&from, &to).await.map_err(move_error)?;

    log::warn!("Quarantined {} -> {}", from.display(), to.display());
    Ok(QuarantineOutcome::Moved { from, to })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn date() -> LogicalDate {
        "2025-01-01".parse().unwrap()
    }

    fn seed_partition(base: &Path, contents: &str) -> PathBuf {
        let dir = partition_dir(base, date());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("city=CityA.json"), contents).unwrap();
        dir
    }

    #[tokio::test]
    async fn moves_partition_under_quarantine() {
        let base = TempDir::new().unwrap();
        let active = seed_partition(base.path(), "{}");

        let outcome = quarantine_partition(base.path(), date()).await.unwrap();

        let expected = base
            .path()
            .join("quarantine")
            .join("load_date=2025-01-01");
        assert_eq!(
            outcome,
            QuarantineOutcome::Moved {
                from: active.clone(),
                to: expected.clone(),
            }
        );
        assert!(!active.exists());
        assert!(expected.join("city=CityA.json").exists());
    }

    #[tokio::test]
    async fn missing_partition_is_a_no_op() {
        let base = TempDir::new().unwrap();

        let outcome = quarantine_partition(base.path(), date()).await.unwrap();

        assert!(matches!(outcome, QuarantineOutcome::NothingToMove { .. }));
        assert!(!base.path().join("quarantine").exists());
    }

    #[tokio::test]
    async fn replaces_older_quarantined_copy() {
        let base = TempDir::new().unwrap();
        seed_partition(base.path(), r#"{"run": 1}"#);
        quarantine_partition(base.path(), date()).await.unwrap();

        seed_partition(base.path(), r#"{"run": 2}"#);
        quarantine_partition(base.path(), date()).await.unwrap();

        let quarantined = quarantine_dir(base.path(), date()).join("city=CityA.json");
        assert_eq!(std::fs::read_to_string(quarantined).unwrap(), r#"{"run": 2}"#);
    }

    #[tokio::test]
    async fn other_dates_are_untouched() {
        let base = TempDir::new().unwrap();
        seed_partition(base.path(), "{}");
        let other = partition_dir(base.path(), "2024-12-31".parse().unwrap());
        std::fs::create_dir_all(&other).unwrap();

        quarantine_partition(base.path(), date()).await.unwrap();

        assert!(other.exists());
    }
}
