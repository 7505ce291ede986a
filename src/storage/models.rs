//! Model catalog
//!
//! Lookup of locally known models, used to decide which tokenizer a model
//! needs and whether it can be run.

use std::fs;
use std::path::Path;

use crate::storage::StorageError;
use crate::types::model::ModelSource;

/// Source of model metadata
pub trait ModelCatalog: Send + Sync {
    fn find_model_source(&self, name: &str) -> Option<ModelSource>;
    /// All known models in display order
    fn sources(&self) -> Vec<ModelSource>;
}

/// Ordered in-memory list of model sources
#[derive(Debug, Clone, Default)]
pub struct ModelSourceList {
    sources: Vec<ModelSource>,
}

impl ModelSourceList {
    pub fn new(sources: Vec<ModelSource>) -> Self {
        Self { sources }
    }

    /// Read a JSON array of model sources
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let json = fs::read_to_string(path)?;
        let sources: Vec<ModelSource> = serde_json::from_str(&json)?;
        tracing::debug!("Loaded {} model sources from {}", sources.len(), path.display());
        Ok(Self::new(sources))
    }
}

impl ModelCatalog for ModelSourceList {
    fn find_model_source(&self, name: &str) -> Option<ModelSource> {
        self.sources.iter().find(|s| s.name == name).cloned()
    }

    fn sources(&self) -> Vec<ModelSource> {
        self.sources.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name() {
        let catalog = ModelSourceList::new(vec![
            ModelSource::new("foo", true).with_tokenizer("vocab.txt"),
            ModelSource::new("bar", false),
        ]);

        let foo = catalog.find_model_source("foo").unwrap();
        assert_eq!(foo.custom_tokenizer.as_deref(), Some("vocab.txt"));
        assert!(!catalog.find_model_source("bar").unwrap().is_complete);
        assert!(catalog.find_model_source("baz").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(
            &path,
            r#"[{"name": "foo", "isComplete": true, "customTokenizer": "vocab.txt"},
                {"name": "bar"}]"#,
        )
        .unwrap();

        let catalog = ModelSourceList::load(&path).unwrap();
        assert_eq!(catalog.sources().len(), 2);
        assert!(catalog.find_model_source("foo").unwrap().is_complete);
        assert!(!catalog.find_model_source("bar").unwrap().is_complete);
    }
}
