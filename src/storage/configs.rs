//! Configuration collection storage
//!
//! Persists the configuration collection and the current index as one JSON
//! document.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::configs::ConfigurationCollection;
use crate::storage::{get_data_dir, StorageError};

/// Key-value style store for the serialized collection
pub trait ConfigStore: Send + Sync {
    /// Load the stored collection, `None` when nothing was saved yet
    fn load(&self) -> Result<Option<ConfigurationCollection>, StorageError>;
    fn save(&self, collection: &ConfigurationCollection) -> Result<(), StorageError>;
}

/// Load the collection, falling back to the default on any failure
pub fn load_collection(store: &dyn ConfigStore) -> ConfigurationCollection {
    match store.load() {
        Ok(Some(collection)) => {
            tracing::debug!("Loaded {} configs", collection.len());
            collection
        }
        Ok(None) => {
            tracing::info!("No saved configs, using defaults");
            ConfigurationCollection::default()
        }
        Err(e) => {
            tracing::warn!("Failed to load configs, using defaults: {}", e);
            ConfigurationCollection::default()
        }
    }
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `configs.json` in the platform data directory
    pub fn default_location() -> Result<Self, StorageError> {
        Ok(Self::new(get_data_dir()?.join("configs.json")))
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<ConfigurationCollection>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let collection = serde_json::from_str(&json)?;
        Ok(Some(collection))
    }

    fn save(&self, collection: &ConfigurationCollection) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(collection)?;
        fs::write(&self.path, json)?;

        tracing::debug!("Saved configs to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store holding the serialized document
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON last written, if any
    pub fn document(&self) -> Option<String> {
        self.document
            .lock()
            .map(|doc| doc.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<ConfigurationCollection>, StorageError> {
        match self.document() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, collection: &ConfigurationCollection) -> Result<(), StorageError> {
        let json = serde_json::to_string(collection)?;
        let mut doc = self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *doc = Some(json);
        Ok(())
    }
}
