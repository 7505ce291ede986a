//! Model types
//!
//! Catalog entries describing models the backend can load.

use serde::{Deserialize, Serialize};

/// A model known to the local catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSource {
    /// File name of the model, matched against `ModelParameters::model_name`
    pub name: String,
    /// True once the model is fully downloaded and can be run
    #[serde(default)]
    pub is_complete: bool,
    /// Tokenizer that must be used with this model, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_tokenizer: Option<String>,
}

impl ModelSource {
    pub fn new(name: impl Into<String>, is_complete: bool) -> Self {
        Self {
            name: name.into(),
            is_complete,
            custom_tokenizer: None,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Into<String>) -> Self {
        self.custom_tokenizer = Some(tokenizer.into());
        self
    }
}
