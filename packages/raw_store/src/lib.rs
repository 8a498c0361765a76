#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw file store for fetched weather payloads.
//!
//! Each payload lands in one file per `(logical_date, city)` under a
//! per-date partition directory. A date that fails its quality check has
//! its whole partition moved under `quarantine/` for manual inspection.

pub mod paths;
pub mod quarantine;
pub mod writer;

use std::path::PathBuf;

pub use quarantine::{QuarantineOutcome, quarantine_partition};
pub use writer::write_raw;

/// Errors that can occur in the raw file store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A payload could not be serialized.
    #[error("Failed to serialize payload for {city}: {source}")]
    Serialize {
        /// City the payload belongs to.
        city: String,
        /// Underlying serializer error.
        source: serde_json::Error,
    },

    /// A raw file or directory could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A partition could not be moved into quarantine.
    #[error("Failed to quarantine {} to {}: {source}", .from.display(), .to.display())]
    Quarantine {
        /// Active partition directory.
        from: PathBuf,
        /// Quarantine destination.
        to: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
