//! Configuration collection
//!
//! Ordered list of named configurations plus the index of the one the backend
//! runs with. The list is never empty.

use serde::{Deserialize, Serialize};

use crate::configs::ConfigError;
use crate::types::config::ModelConfig;

/// Ordered, never-empty collection of configurations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CollectionDocument")]
pub struct ConfigurationCollection {
    #[serde(rename = "modelConfigs")]
    configs: Vec<ModelConfig>,
    #[serde(rename = "currentModelConfigIndex")]
    current_index: usize,
}

/// Stored document as read from disk, before repair
#[derive(Deserialize)]
struct CollectionDocument {
    #[serde(rename = "modelConfigs", default)]
    configs: Vec<ModelConfig>,
    #[serde(rename = "currentModelConfigIndex", default)]
    current_index: usize,
}

impl From<CollectionDocument> for ConfigurationCollection {
    fn from(document: CollectionDocument) -> Self {
        Self::from_parts(document.configs, document.current_index)
    }
}

impl Default for ConfigurationCollection {
    fn default() -> Self {
        Self {
            configs: vec![ModelConfig::default()],
            current_index: 0,
        }
    }
}

impl ConfigurationCollection {
    /// Build a collection from loaded parts, repairing anything that would break
    /// the invariants (empty list, index past the end).
    pub fn from_parts(configs: Vec<ModelConfig>, current_index: usize) -> Self {
        let mut collection = Self {
            configs,
            current_index,
        };
        collection.repair();
        collection
    }

    fn repair(&mut self) {
        if self.configs.is_empty() {
            tracing::warn!("Configuration collection is empty, restoring default");
            self.configs.push(ModelConfig::default());
        }
        if self.current_index >= self.configs.len() {
            tracing::warn!(
                "Current config index {} out of range, clamping to {}",
                self.current_index,
                self.configs.len() - 1
            );
            self.current_index = self.configs.len() - 1;
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.configs.iter()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &ModelConfig {
        &self.configs[self.current_index]
    }

    fn check(&self, index: usize) -> Result<(), ConfigError> {
        if index < self.configs.len() {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                index,
                len: self.configs.len(),
            })
        }
    }

    pub fn set_current_index(&mut self, index: usize) -> Result<(), ConfigError> {
        self.check(index)?;
        self.current_index = index;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&ModelConfig, ConfigError> {
        self.check(index)?;
        Ok(&self.configs[index])
    }

    /// Overwrite the entry at `index`
    pub fn replace(&mut self, index: usize, config: ModelConfig) -> Result<(), ConfigError> {
        self.check(index)?;
        self.configs[index] = config;
        Ok(())
    }

    /// Append a copy of the default template and return its index.
    ///
    /// The name gets a numeric suffix; names are not required to be unique.
    pub fn create(&mut self) -> usize {
        let mut config = ModelConfig::default();
        config.name = format!("{} {}", config.name, self.configs.len() + 1);
        self.configs.push(config);
        let index = self.configs.len() - 1;
        tracing::debug!("Created config {} at index {}", self.configs[index].name, index);
        index
    }

    /// Remove the entry at `index`. Removing the last entry resets the collection.
    pub fn delete(&mut self, index: usize) -> Result<(), ConfigError> {
        self.check(index)?;

        if self.configs.len() == 1 {
            tracing::info!("Deleting the only config, resetting to default");
            self.reset_all();
            return Ok(());
        }

        let removed = self.configs.remove(index);
        tracing::debug!("Deleted config {} at index {}", removed.name, index);

        if index < self.current_index {
            self.current_index -= 1;
        }
        if self.current_index >= self.configs.len() {
            self.current_index = self.configs.len() - 1;
        }
        Ok(())
    }

    /// Replace everything with a single default configuration
    pub fn reset_all(&mut self) {
        *self = Self::default();
    }
}
