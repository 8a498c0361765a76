//! Raw partition writer.

use std::path::{Path, PathBuf};

use weather_ingest_models::{FetchResult, RawRecord};

use crate::StorageError;
use crate::paths::raw_file_path;

/// Writes `result`'s payload to its partition file and returns the
/// resulting [`RawRecord`].
///
/// The file is written whole: the document goes to a sibling temporary
/// file that is then renamed over the target, so a re-run replaces the
/// previous payload and readers never see a partial file. Missing
/// directories are created.
///
/// # Errors
///
/// Returns [`StorageError`] if the payload cannot be serialized or the
/// file cannot be written.
pub async fn write_raw(raw_base: &Path, result: FetchResult) -> Result<RawRecord, StorageError> {
    let FetchResult { request, payload } = result;
    let path = raw_file_path(raw_base, request.logical_date, &request.city);

    let bytes = serde_json::to_vec(&payload).map_err(|source| StorageError::Serialize {
        city: request.city.name.clone(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StorageError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let tmp = temp_path(&path);
    if let Err(source) = tokio::fs::write(&tmp, &bytes).await {
        discard(&tmp).await;
        return Err(StorageError::Write { path: tmp, source });
    }
    if let Err(source) = tokio::fs::rename(&tmp, &path).await {
        discard(&tmp).await;
        return Err(StorageError::Write { path, source });
    }

    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());

    Ok(RawRecord {
        logical_date: request.logical_date,
        city_name: request.city.name,
        lat: request.city.lat,
        lon: request.city.lon,
        payload,
        raw_path: path,
    })
}

/// Removes a temporary file left by a failed write. The write error is
/// what gets reported, so a failed removal is only logged.
async fn discard(tmp: &Path) {
    match tokio::fs::remove_file(tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {e}", tmp.display()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use weather_ingest_models::{CityConfig, FetchRequest, LogicalDate};

    use super::*;

    fn fetched(city: &str, lat: f64, payload: serde_json::Value) -> FetchResult {
        FetchResult {
            request: FetchRequest {
                city: CityConfig::new(city, lat, 1.0),
                logical_date: "2025-01-01".parse::<LogicalDate>().unwrap(),
            },
            payload,
        }
    }

    #[tokio::test]
    async fn writes_payload_to_partition_path() {
        let dir = TempDir::new().unwrap();
        let payload = json!({"current_weather": {"temperature": 4.2}});

        let record = write_raw(dir.path(), fetched("City A", 1.0, payload.clone()))
            .await
            .unwrap();

        assert_eq!(
            record.raw_path,
            dir.path().join("load_date=2025-01-01").join("city=City_A.json")
        );
        assert_eq!(record.city_name, "City A");
        assert_eq!(record.payload, payload);

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&record.raw_path).unwrap()).unwrap();
        assert_eq!(on_disk, payload);
    }

    #[tokio::test]
    async fn rewriting_replaces_the_file() {
        let dir = TempDir::new().unwrap();

        write_raw(dir.path(), fetched("CityA", 1.0, json!({"run": 1, "padding": "x".repeat(64)})))
            .await
            .unwrap();
        let record = write_raw(dir.path(), fetched("CityA", 1.5, json!({"run": 2})))
            .await
            .unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&record.raw_path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"run": 2}));
        assert!((record.lat - 1.5).abs() < f64::EPSILON);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("load_date=2025-01-01"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("city=CityA.json")]);
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let partition = dir.path().join("load_date=2025-01-01");
        std::fs::create_dir_all(partition.join("city=CityA.json")).unwrap();

        let err = write_raw(dir.path(), fetched("CityA", 1.0, json!({})))
            .await
            .unwrap_err();

        match err {
            StorageError::Write { path, .. } => {
                assert_eq!(path, partition.join("city=CityA.json"));
            }
            other => panic!("expected a write error, got {other}"),
        }
        assert!(!partition.join("city=CityA.json.tmp").exists());
    }

    #[tokio::test]
    async fn unwritable_base_is_a_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = write_raw(&blocker, fetched("CityA", 1.0, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }
}
