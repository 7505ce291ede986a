//! Model configuration manager
//!
//! Device rules, strategy derivation, the configuration collection and the
//! edit session that commits drafts to storage and the running backend.

pub mod collection;
pub mod rules;
pub mod session;
pub mod strategy;

pub use collection::ConfigurationCollection;
pub use rules::{ConversionKind, FieldSet, ModelField};
pub use session::{ConfigSession, SaveOutcome};
pub use strategy::derive_strategy;

use crate::storage::StorageError;
use crate::types::config::DeviceKind;
use thiserror::Error;

/// Configuration manager errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Index {index} out of range (collection has {len} configs)")]
    OutOfRange { index: usize, len: usize },
    #[error("{field} = {value} is not valid for device {device}")]
    InvalidFieldCombination {
        device: DeviceKind,
        field: ModelField,
        value: String,
    },
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
