//! Completion signals for downstream consumers.
//!
//! A successful run announces `dataset://open-meteo/raw_loaded` for its
//! logical date through a [`SignalSink`]. [`JsonlSink`] appends to an
//! event log other processes can tail, [`BroadcastSink`] serves
//! subscribers in the same process, and [`FanoutSink`] sends to several
//! sinks at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::broadcast;
use weather_ingest_models::{CompletionSignal, LogicalDate};

/// Errors that can occur while emitting a completion signal.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The signal could not be encoded.
    #[error("Failed to encode signal: {0}")]
    Json(#[from] serde_json::Error),

    /// The event log could not be written.
    #[error("Failed to append to {}: {source}", .path.display())]
    Io {
        /// Event log path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Destination for completion signals.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Delivers `signal`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] if the signal could not be recorded.
    async fn emit(&self, signal: &CompletionSignal) -> Result<(), SignalError>;
}

/// Appends one JSON document per line to an event log.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SignalSink for JsonlSink {
    async fn emit(&self, signal: &CompletionSignal) -> Result<(), SignalError> {
        let mut line = serde_json::to_vec(signal)?;
        line.push(b'\n');

        let io_error = |source| SignalError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        file.write_all(&line).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;

        Ok(())
    }
}

/// Delivers signals to in-process subscribers.
///
/// Having no subscriber at emit time is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<CompletionSignal>,
}

impl BroadcastSink {
    /// Creates a sink whose subscribers may lag by up to `capacity`
    /// signals.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionSignal> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl SignalSink for BroadcastSink {
    async fn emit(&self, signal: &CompletionSignal) -> Result<(), SignalError> {
        match self.tx.send(signal.clone()) {
            Ok(receivers) => log::debug!("Broadcast {} to {receivers} subscriber(s)", signal.dataset),
            Err(_) => log::debug!("No subscribers for {}", signal.dataset),
        }
        Ok(())
    }
}

/// Emits to every inner sink in order, stopping at the first failure.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SignalSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl SignalSink for FanoutSink {
    async fn emit(&self, signal: &CompletionSignal) -> Result<(), SignalError> {
        for sink in &self.sinks {
            sink.emit(signal).await?;
        }
        Ok(())
    }
}

/// Emits the raw-loaded signal for `logical_date` and returns the run
/// summary.
///
/// # Errors
///
/// Returns [`SignalError`] if the sink rejects the signal.
pub async fn publish(
    sink: &dyn SignalSink,
    logical_date: LogicalDate,
    rows_loaded: u64,
) -> Result<String, SignalError> {
    let signal = CompletionSignal::raw_loaded(logical_date, rows_loaded);
    sink.emit(&signal).await?;

    log::info!(
        "Published {} for {logical_date} ({rows_loaded} rows)",
        signal.dataset
    );
    Ok(format!("Loaded {rows_loaded} city payloads"))
}
