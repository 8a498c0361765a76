//! Key-value stores the run configuration is resolved from.
//!
//! The roster and raw-storage base path live in an external key-value
//! source. [`EnvStore`] reads process environment variables, [`MapStore`]
//! holds values in memory (the `[variables]` table of the settings file
//! is loaded into one), and [`LayeredStore`] consults several stores in
//! priority order.

use std::collections::BTreeMap;

/// A read-only key-value configuration source.
pub trait ConfigStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads values from process environment variables of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvStore;

impl ConfigStore for EnvStore {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MapStore {
    values: BTreeMap<String, String>,
}

impl MapStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Sets `key` to `value`, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets `key` to `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl From<BTreeMap<String, String>> for MapStore {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

impl ConfigStore for MapStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Consults each layer in order and returns the first value found.
#[derive(Default)]
pub struct LayeredStore {
    layers: Vec<Box<dyn ConfigStore>>,
}

impl LayeredStore {
    /// Creates a store with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer with lower priority than every existing one.
    #[must_use]
    pub fn layer(mut self, store: impl ConfigStore + 'static) -> Self {
        self.layers.push(Box::new(store));
        self
    }
}

impl ConfigStore for LayeredStore {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}
