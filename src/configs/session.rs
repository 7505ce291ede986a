//! Edit session
//!
//! Holds the selected configuration and a draft copy of it. Every field edit
//! goes through a merge on the draft; nothing reaches the collection until
//! `save`, which persists first and then pushes the live parameters to the
//! backend.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backend::{BackendSync, LiveParameters};
use crate::configs::rules::{self, ConversionKind, FieldSet, ModelField};
use crate::configs::{derive_strategy, ConfigError, ConfigurationCollection};
use crate::notify::{Notification, Notifier};
use crate::storage::configs::ConfigStore;
use crate::storage::models::ModelCatalog;
use crate::types::config::{
    ApiParametersPatch, ModelConfig, ModelParametersPatch, PrecisionKind,
};

/// Result of [`ConfigSession::save`]
#[derive(Debug)]
pub struct SaveOutcome {
    /// Whether the collection reached the store
    pub persisted: bool,
    /// The background push, `None` when no tokio runtime was available
    pub push: Option<JoinHandle<Result<(), ConfigError>>>,
}

/// Single-operator edit session over a configuration collection
pub struct ConfigSession {
    collection: ConfigurationCollection,
    store: Arc<dyn ConfigStore>,
    catalog: Arc<dyn ModelCatalog>,
    backend: Arc<dyn BackendSync>,
    notifier: Arc<dyn Notifier>,
    selected_index: usize,
    draft: ModelConfig,
}

impl ConfigSession {
    /// Start a session on the collection's current configuration
    pub fn new(
        collection: ConfigurationCollection,
        store: Arc<dyn ConfigStore>,
        catalog: Arc<dyn ModelCatalog>,
        backend: Arc<dyn BackendSync>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let selected_index = collection.current_index();
        let draft = collection.current().clone();
        tracing::info!("Config session started on {} ({})", selected_index, draft.name);
        Self {
            collection,
            store,
            catalog,
            backend,
            notifier,
            selected_index,
            draft,
        }
    }

    pub fn collection(&self) -> &ConfigurationCollection {
        &self.collection
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn draft(&self) -> &ModelConfig {
        &self.draft
    }

    /// True when the draft differs from the stored configuration
    pub fn has_unsaved_changes(&self) -> bool {
        self.collection
            .get(self.selected_index)
            .map(|stored| stored != &self.draft)
            .unwrap_or(true)
    }

    fn persist(&self) -> bool {
        match self.store.save(&self.collection) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to persist configs: {}", e);
                self.notifier
                    .notify(Notification::error(format!("Failed to save configs: {}", e)));
                false
            }
        }
    }

    /// Select `index`, replacing the draft. Unsaved edits are lost.
    pub fn select(&mut self, index: usize) -> Result<(), ConfigError> {
        self.collection.set_current_index(index)?;
        self.selected_index = index;
        self.discard_draft()?;
        // Failures are already reported to the operator by persist().
        let _persisted = self.persist();
        tracing::debug!("Selected config {} ({})", index, self.draft.name);
        Ok(())
    }

    /// Throw away every unsaved edit and reload the draft from the collection
    pub fn discard_draft(&mut self) -> Result<(), ConfigError> {
        self.draft = self.collection.get(self.selected_index)?.clone();
        Ok(())
    }

    pub fn edit_name(&mut self, name: impl Into<String>) {
        self.draft.name = name.into();
    }

    pub fn edit_enable_web_ui(&mut self, enabled: bool) {
        self.draft.enable_web_ui = enabled;
    }

    /// Merge `patch` into the draft's API parameters; values are clamped to range
    pub fn edit_api_param(&mut self, patch: &ApiParametersPatch) {
        patch.apply_to(&mut self.draft.api_parameters);
    }

    /// Merge `patch` into the draft's model parameters.
    ///
    /// A new model name pulls in the catalog's tokenizer for that model, or
    /// turns the custom tokenizer off while keeping its path. Tokenizer fields
    /// set explicitly in the same patch take precedence. A patch that sets a
    /// precision the (resulting) device does not allow is rejected whole.
    pub fn edit_model_param(&mut self, patch: &ModelParametersPatch) -> Result<(), ConfigError> {
        let mut next = self.draft.model_parameters.clone();

        if let Some(name) = &patch.model_name {
            match self
                .catalog
                .find_model_source(name)
                .and_then(|source| source.custom_tokenizer)
            {
                Some(tokenizer) => {
                    next.use_custom_tokenizer = true;
                    next.custom_tokenizer = tokenizer;
                }
                None => next.use_custom_tokenizer = false,
            }
        }

        patch.apply_to(&mut next);

        if patch.precision.is_some() {
            rules::validate_model_parameters(&next)?;
        } else if patch.device.is_some() {
            if let Err(e) = rules::validate_model_parameters(&next) {
                tracing::warn!("Device change leaves draft invalid: {}", e);
            }
        }

        self.draft.model_parameters = next;
        Ok(())
    }

    /// Append a default configuration and select it
    pub fn create_config(&mut self) -> Result<usize, ConfigError> {
        let index = self.collection.create();
        self.select(index)?;
        Ok(index)
    }

    /// Delete the selected configuration and select its neighbour
    pub fn delete_selected(&mut self) -> Result<(), ConfigError> {
        self.collection.delete(self.selected_index)?;
        let next = self.selected_index.min(self.collection.len() - 1);
        self.select(next)
    }

    /// Replace every configuration with the built-in default.
    ///
    /// Irreversible; callers are expected to have confirmed with the operator.
    pub fn reset_all(&mut self) -> Result<(), ConfigError> {
        tracing::info!("Resetting all configs to defaults");
        self.collection.reset_all();
        self.select(0)
    }

    /// Commit the draft, persist it, then push the live parameters.
    ///
    /// The push runs in the background; its failure is reported to the
    /// operator and never undoes the persisted write.
    pub fn save(&mut self) -> Result<SaveOutcome, ConfigError> {
        self.collection
            .replace(self.selected_index, self.draft.clone())?;

        if let Err(e) = rules::validate_model_parameters(&self.draft.model_parameters) {
            tracing::warn!("Saving config {} with {}", self.draft.name, e);
        }

        let persisted = self.persist();
        if persisted {
            tracing::info!("Saved config {} ({})", self.selected_index, self.draft.name);
            self.notifier.notify(Notification::success("Config saved"));
        }

        let push = self.push_live_parameters();
        Ok(SaveOutcome { persisted, push })
    }

    fn push_live_parameters(&self) -> Option<JoinHandle<Result<(), ConfigError>>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No async runtime, skipping backend update");
                self.notifier.notify(Notification::error(
                    "Backend not updated: no async runtime",
                ));
                return None;
            }
        };

        let backend = Arc::clone(&self.backend);
        let notifier = Arc::clone(&self.notifier);
        let port = self.draft.api_parameters.api_port;
        let params = LiveParameters::from(&self.draft.api_parameters);

        Some(runtime.spawn(async move {
            match backend.push_live_parameters(port, &params).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!("Failed to update backend on port {}: {}", port, e);
                    notifier.notify(Notification::error(format!(
                        "Failed to update backend config: {}",
                        e
                    )));
                    Err(ConfigError::BackendUnreachable(e.to_string()))
                }
            }
        }))
    }

    pub fn visible_fields(&self) -> FieldSet {
        rules::fields_visible(self.draft.model_parameters.device)
    }

    pub fn precision_options(&self) -> &'static [PrecisionKind] {
        rules::allowed_precisions(self.draft.model_parameters.device)
    }

    /// Strategy shown next to the layer slider, only for devices that show it
    pub fn current_strategy(&self) -> Option<String> {
        if self.visible_fields().contains(ModelField::CurrentStrategy) {
            derive_strategy(&self.draft.model_parameters)
        } else {
            None
        }
    }

    /// Check the draft against the rule table without changing it
    pub fn validate_draft(&self) -> Result<(), ConfigError> {
        rules::validate_model_parameters(&self.draft.model_parameters)
    }

    /// API docs of the backend the draft's port points at
    pub fn api_docs_url(&self) -> String {
        format!(
            "{}/docs",
            self.backend.server_root(self.draft.api_parameters.api_port)
        )
    }

    pub fn conversion_kind(&self) -> ConversionKind {
        rules::conversion_for(self.draft.model_parameters.device)
    }

    /// Model names offered for the draft: runnable catalog entries, preceded by
    /// the draft's own model when it is not one of them
    pub fn model_options(&self) -> Vec<String> {
        let sources = self.catalog.sources();
        let current = &self.draft.model_parameters.model_name;

        let mut options = Vec::new();
        if !sources.iter().any(|s| &s.name == current && s.is_complete) {
            options.push(current.clone());
        }
        options.extend(
            sources
                .into_iter()
                .filter(|s| s.is_complete)
                .map(|s| s.name),
        );
        options
    }

    /// Whether the stored configuration at `index` names a downloaded model
    pub fn is_runnable(&self, index: usize) -> Result<bool, ConfigError> {
        let config = self.collection.get(index)?;
        Ok(self
            .catalog
            .find_model_source(&config.model_parameters.model_name)
            .map(|source| source.is_complete)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, HttpBackend};
    use crate::notify::{NotificationLevel, RecordingNotifier};
    use crate::storage::configs::MemoryStore;
    use crate::storage::models::ModelSourceList;
    use crate::storage::StorageError;
    use crate::types::config::{DeviceKind, DEFAULT_CONFIG_NAME};
    use crate::types::model::ModelSource;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBackend {
        pushes: Mutex<Vec<(u16, LiveParameters)>>,
    }

    #[async_trait]
    impl BackendSync for RecordingBackend {
        async fn push_live_parameters(
            &self,
            port: u16,
            params: &LiveParameters,
        ) -> Result<(), BackendError> {
            self.pushes.lock().unwrap().push((port, params.clone()));
            Ok(())
        }
    }

    struct DownBackend;

    #[async_trait]
    impl BackendSync for DownBackend {
        async fn push_live_parameters(
            &self,
            _port: u16,
            _params: &LiveParameters,
        ) -> Result<(), BackendError> {
            Err(BackendError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    struct BrokenStore;

    impl ConfigStore for BrokenStore {
        fn load(&self) -> Result<Option<ConfigurationCollection>, StorageError> {
            Ok(None)
        }

        fn save(&self, _collection: &ConfigurationCollection) -> Result<(), StorageError> {
            Err(StorageError::NoDataDir)
        }
    }

    struct Harness {
        session: ConfigSession,
        store: Arc<MemoryStore>,
        backend: Arc<RecordingBackend>,
        notifier: Arc<RecordingNotifier>,
    }

    fn catalog() -> ModelSourceList {
        ModelSourceList::new(vec![
            ModelSource::new("foo", true).with_tokenizer("vocab.txt"),
            ModelSource::new("bar", true),
            ModelSource::new("partial", false),
        ])
    }

    fn harness(collection: ConfigurationCollection) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(RecordingBackend::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let session = ConfigSession::new(
            collection,
            store.clone(),
            Arc::new(catalog()),
            backend.clone(),
            notifier.clone(),
        );
        Harness {
            session,
            store,
            backend,
            notifier,
        }
    }

    fn two_configs() -> ConfigurationCollection {
        let mut collection = ConfigurationCollection::default();
        collection.create();
        collection
    }

    #[test]
    fn test_starts_on_current_config() {
        let mut collection = two_configs();
        collection.set_current_index(1).unwrap();
        let h = harness(collection);

        assert_eq!(h.session.selected_index(), 1);
        assert_eq!(h.session.draft(), h.session.collection().get(1).unwrap());
        assert!(!h.session.has_unsaved_changes());
    }

    #[test]
    fn test_select_discards_unsaved_edits() {
        let mut h = harness(two_configs());
        h.session.edit_name("edited");
        assert!(h.session.has_unsaved_changes());

        h.session.select(1).unwrap();
        h.session.select(0).unwrap();

        assert_eq!(h.session.draft().name, DEFAULT_CONFIG_NAME);
        assert_eq!(h.session.collection().get(0).unwrap().name, DEFAULT_CONFIG_NAME);
        assert_eq!(h.session.collection().current_index(), 0);
    }

    #[test]
    fn test_discard_draft() {
        let mut h = harness(ConfigurationCollection::default());
        h.session.edit_api_param(&ApiParametersPatch {
            temperature: Some(0.2),
            ..Default::default()
        });
        h.session.discard_draft().unwrap();
        assert!(!h.session.has_unsaved_changes());
    }

    #[test]
    fn test_select_out_of_range() {
        let mut h = harness(ConfigurationCollection::default());
        assert!(matches!(
            h.session.select(5),
            Err(ConfigError::OutOfRange { index: 5, len: 1 })
        ));
        assert_eq!(h.session.selected_index(), 0);
    }

    #[test]
    fn test_select_persists_current_index() {
        let mut h = harness(two_configs());
        h.session.select(1).unwrap();

        let stored = h.store.load().unwrap().unwrap();
        assert_eq!(stored.current_index(), 1);
    }

    #[test]
    fn test_create_then_select_yields_template() {
        let mut h = harness(ConfigurationCollection::default());
        let index = h.session.create_config().unwrap();

        assert_eq!(index, 1);
        assert_eq!(h.session.selected_index(), 1);

        let template = ModelConfig::default();
        let draft = h.session.draft();
        assert_eq!(draft.api_parameters, template.api_parameters);
        assert_eq!(draft.model_parameters, template.model_parameters);
        assert_eq!(draft.enable_web_ui, template.enable_web_ui);
        assert_eq!(h.store.load().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_selected_moves_to_neighbour() {
        let mut collection = two_configs();
        collection.create();
        let mut h = harness(collection);

        h.session.select(2).unwrap();
        h.session.delete_selected().unwrap();
        assert_eq!(h.session.collection().len(), 2);
        assert_eq!(h.session.selected_index(), 1);

        h.session.select(0).unwrap();
        h.session.delete_selected().unwrap();
        assert_eq!(h.session.selected_index(), 0);

        h.session.delete_selected().unwrap();
        assert_eq!(h.session.collection().len(), 1);
        assert_eq!(h.session.draft(), &ModelConfig::default());
    }

    #[test]
    fn test_reset_all() {
        let mut h = harness(two_configs());
        h.session.select(1).unwrap();
        h.session.edit_name("dirty");
        h.session.reset_all().unwrap();

        assert_eq!(h.session.selected_index(), 0);
        assert_eq!(h.session.collection(), &ConfigurationCollection::default());
        assert_eq!(h.session.draft(), &ModelConfig::default());
        assert_eq!(
            h.store.load().unwrap(),
            Some(ConfigurationCollection::default())
        );
    }

    #[test]
    fn test_model_name_with_tokenizer_overwrites_manual_value() {
        let mut h = harness(ConfigurationCollection::default());
        h.session
            .edit_model_param(&ModelParametersPatch {
                custom_tokenizer: Some("manual.txt".to_string()),
                ..Default::default()
            })
            .unwrap();

        h.session
            .edit_model_param(&ModelParametersPatch {
                model_name: Some("foo".to_string()),
                ..Default::default()
            })
            .unwrap();

        let params = &h.session.draft().model_parameters;
        assert_eq!(params.model_name, "foo");
        assert!(params.use_custom_tokenizer);
        assert_eq!(params.custom_tokenizer, "vocab.txt");
    }

    #[test]
    fn test_model_name_without_tokenizer_keeps_path() {
        let mut h = harness(ConfigurationCollection::default());
        h.session
            .edit_model_param(&ModelParametersPatch {
                use_custom_tokenizer: Some(true),
                custom_tokenizer: Some("manual.txt".to_string()),
                ..Default::default()
            })
            .unwrap();

        h.session
            .edit_model_param(&ModelParametersPatch {
                model_name: Some("bar".to_string()),
                ..Default::default()
            })
            .unwrap();

        let params = &h.session.draft().model_parameters;
        assert!(!params.use_custom_tokenizer);
        assert_eq!(params.custom_tokenizer, "manual.txt");

        h.session
            .edit_model_param(&ModelParametersPatch {
                model_name: Some("unknown".to_string()),
                use_custom_tokenizer: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(h.session.draft().model_parameters.use_custom_tokenizer);
    }

    #[test]
    fn test_invalid_precision_is_rejected() {
        let mut h = harness(ConfigurationCollection::default());
        let before = h.session.draft().clone();

        let result = h.session.edit_model_param(&ModelParametersPatch {
            precision: Some(PrecisionKind::Q5_1),
            stored_layers: Some(3),
            ..Default::default()
        });

        assert!(matches!(
            result,
            Err(ConfigError::InvalidFieldCombination {
                field: ModelField::Precision,
                ..
            })
        ));
        assert_eq!(h.session.draft(), &before);
    }

    #[test]
    fn test_device_and_precision_together() {
        let mut h = harness(ConfigurationCollection::default());
        h.session
            .edit_model_param(&ModelParametersPatch {
                device: Some(DeviceKind::CpuGgml),
                precision: Some(PrecisionKind::Q5_1),
                ..Default::default()
            })
            .unwrap();

        assert!(h.session.validate_draft().is_ok());
        assert_eq!(h.session.conversion_kind(), ConversionKind::Ggml);
        assert_eq!(h.session.precision_options(), &[PrecisionKind::Q5_1]);
    }

    #[test]
    fn test_device_change_keeps_precision() {
        let mut h = harness(ConfigurationCollection::default());
        h.session
            .edit_model_param(&ModelParametersPatch {
                device: Some(DeviceKind::Cpu),
                ..Default::default()
            })
            .unwrap();

        let params = &h.session.draft().model_parameters;
        assert_eq!(params.device, DeviceKind::Cpu);
        assert_eq!(params.precision, PrecisionKind::Fp16);
        assert!(h.session.validate_draft().is_err());
        assert!(!h.session.visible_fields().contains(ModelField::StoredLayers));
        assert!(h.session.current_strategy().is_none());
    }

    #[test]
    fn test_current_strategy_for_cuda() {
        let mut h = harness(ConfigurationCollection::default());
        h.session
            .edit_model_param(&ModelParametersPatch {
                stored_layers: Some(20),
                max_stored_layers: Some(32),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            h.session.current_strategy().as_deref(),
            Some("cuda fp16 *20 -> cpu fp16 *12")
        );
    }

    #[test]
    fn test_api_edits_are_clamped() {
        let mut h = harness(ConfigurationCollection::default());
        h.session.edit_api_param(&ApiParametersPatch {
            temperature: Some(9.0),
            api_port: Some(9000),
            ..Default::default()
        });

        let api = &h.session.draft().api_parameters;
        assert_eq!(api.temperature, 2.0);
        assert_eq!(api.api_port, 9000);
        assert_eq!(h.session.api_docs_url(), "http://127.0.0.1:9000/docs");
    }

    #[test]
    fn test_docs_url_follows_backend_host() {
        let backend = HttpBackend::new("10.0.0.7", Duration::from_secs(1)).unwrap();
        let session = ConfigSession::new(
            ConfigurationCollection::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(catalog()),
            Arc::new(backend),
            Arc::new(RecordingNotifier::new()),
        );
        assert_eq!(session.api_docs_url(), "http://10.0.0.7:8000/docs");
    }

    #[test]
    fn test_model_options_and_runnable() {
        let mut h = harness(ConfigurationCollection::default());
        assert_eq!(
            h.session.model_options(),
            vec![
                ModelConfig::default().model_parameters.model_name,
                "foo".to_string(),
                "bar".to_string()
            ]
        );
        assert!(!h.session.is_runnable(0).unwrap());

        h.session
            .edit_model_param(&ModelParametersPatch {
                model_name: Some("foo".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(h.session.model_options(), vec!["foo", "bar"]);
        h.session.save().unwrap();
        assert!(h.session.is_runnable(0).unwrap());
        assert!(h.session.is_runnable(1).is_err());
    }

    #[test]
    fn test_save_without_runtime_still_persists() {
        let mut h = harness(ConfigurationCollection::default());
        h.session.edit_name("renamed");

        let outcome = h.session.save().unwrap();
        assert!(outcome.persisted);
        assert!(outcome.push.is_none());
        assert_eq!(h.session.collection().get(0).unwrap().name, "renamed");
        assert_eq!(h.store.load().unwrap().unwrap().current().name, "renamed");
        assert!(!h.session.has_unsaved_changes());

        let levels: Vec<_> = h.notifier.drain().into_iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NotificationLevel::Success, NotificationLevel::Error]);
    }

    #[tokio::test]
    async fn test_save_pushes_hot_reloadable_subset() {
        let mut h = harness(ConfigurationCollection::default());
        h.session.edit_api_param(&ApiParametersPatch {
            api_port: Some(9001),
            temperature: Some(0.5),
            max_response_token: Some(2000),
            ..Default::default()
        });
        h.session
            .edit_model_param(&ModelParametersPatch {
                stored_layers: Some(10),
                ..Default::default()
            })
            .unwrap();

        let outcome = h.session.save().unwrap();
        assert!(outcome.persisted);
        outcome.push.unwrap().await.unwrap().unwrap();

        let saved = h.session.collection().get(0).unwrap();
        assert_eq!(saved.api_parameters.api_port, 9001);
        assert_eq!(saved.model_parameters.stored_layers, 10);

        let pushes = h.backend.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        let (port, live) = &pushes[0];
        assert_eq!(*port, 9001);
        assert_eq!(live, &LiveParameters::from(&saved.api_parameters));
        assert_eq!(live.max_tokens, 2000);

        let notes = h.notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_persisted_write() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let mut session = ConfigSession::new(
            ConfigurationCollection::default(),
            store.clone(),
            Arc::new(catalog()),
            Arc::new(DownBackend),
            notifier.clone(),
        );
        session.edit_name("kept");

        let outcome = session.save().unwrap();
        assert!(outcome.persisted);
        let pushed = outcome.push.unwrap().await.unwrap();
        assert!(matches!(pushed, Err(ConfigError::BackendUnreachable(_))));

        assert_eq!(session.collection().current().name, "kept");
        assert_eq!(store.load().unwrap().unwrap().current().name, "kept");

        let levels: Vec<_> = notifier.drain().into_iter().map(|n| n.level).collect();
        assert_eq!(
            levels,
            vec![NotificationLevel::Success, NotificationLevel::Error]
        );
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_push() {
        let backend = Arc::new(RecordingBackend::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let mut session = ConfigSession::new(
            ConfigurationCollection::default(),
            Arc::new(BrokenStore),
            Arc::new(catalog()),
            backend.clone(),
            notifier.clone(),
        );

        let outcome = session.save().unwrap();
        assert!(!outcome.persisted);
        outcome.push.unwrap().await.unwrap().unwrap();
        assert_eq!(backend.pushes.lock().unwrap().len(), 1);

        let notes = notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
    }
}
