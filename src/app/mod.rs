pub mod errors;
pub mod factory;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::dedup::{
    CacheStats, DedupDecision, DedupService, EmbeddingMode, PreferenceError, PreferencesProvider,
    SignatureCache, StoredPreferences, TabScope,
};
use crate::semantic::{SearchResult, SemanticSearchService};
use crate::storage::StorageManager;

pub use errors::AppError;
pub use factory::{AppFactory, AppPaths};

/// Effective preferences as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PreferencesView {
    /// Mode whose dedup threshold applies to the next check
    pub embedding_mode: EmbeddingMode,
    /// `false` when the stored value could not be read and offline is assumed
    pub valid: bool,
}

/// Everything a daemon or one-shot CLI call needs, wired together.
pub struct App {
    config: Config,
    dedup: DedupService,
    semantic: Arc<SemanticSearchService>,
    preferences: Arc<StoredPreferences>,
}

impl App {
    /// `dedup_preferences` pins the mode used by checks, stores and searches;
    /// `preferences` and `set_embedding_mode` still go to the store.
    pub fn new(
        config: Config,
        store: Arc<dyn StorageManager>,
        preferences: Arc<StoredPreferences>,
        semantic: Arc<SemanticSearchService>,
        dedup_preferences: Option<Arc<dyn PreferencesProvider>>,
    ) -> Self {
        let dedup = DedupService::new(
            SignatureCache::new(store),
            semantic.clone(),
            dedup_preferences
                .unwrap_or_else(|| preferences.clone() as Arc<dyn PreferencesProvider>),
            config.dedup_settings(),
        );

        Self {
            config,
            dedup,
            semantic,
            preferences,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mode the next check, store or search runs in.
    pub fn active_mode(&self) -> EmbeddingMode {
        self.dedup.embedding_mode()
    }

    /// Load the embedder and stored vectors of the active mode ahead of the
    /// first request.
    pub fn warm_up(&self) -> Result<(), AppError> {
        Ok(self.semantic.initialize(self.active_mode())?)
    }

    pub fn should_process_content(&self, text: &str, scope: &TabScope, source_url: &str) -> bool {
        self.dedup.should_process_content(text, scope, source_url)
    }

    pub fn explain(&self, text: &str, scope: &TabScope, source_url: &str) -> DedupDecision {
        self.dedup.explain(text, scope, source_url)
    }

    pub fn cache_stats(&self) -> Result<CacheStats, AppError> {
        Ok(self.dedup.get_cache_stats()?)
    }

    pub fn clear_cache(&self) -> Result<(), AppError> {
        Ok(self.dedup.clear_cache()?)
    }

    /// Record processed content so later batches can be compared against it.
    pub fn store_content(
        &self,
        id: &str,
        scope: &TabScope,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), AppError> {
        if id.trim().is_empty() {
            return Err(AppError::InvalidInput("content id is empty".to_string()));
        }
        Ok(self
            .semantic
            .add_content(self.active_mode(), id, scope, text, metadata)?)
    }

    pub fn remove_content(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.semantic.remove_content(self.active_mode(), id)?)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, AppError> {
        if limit == 0 {
            return Err(AppError::InvalidInput("limit must be greater than 0".to_string()));
        }
        Ok(self.semantic.search(self.active_mode(), query, limit)?)
    }

    pub fn preferences(&self) -> Result<PreferencesView, AppError> {
        let (embedding_mode, valid) = match self.preferences.embedding_mode() {
            Ok(mode) => (mode, true),
            Err(PreferenceError::Invalid(err)) => {
                log::warn!("{err}, reporting offline mode");
                (EmbeddingMode::Offline, false)
            }
            Err(err) => return Err(err.into()),
        };

        Ok(PreferencesView {
            embedding_mode,
            valid,
        })
    }

    pub fn set_embedding_mode(&self, mode: EmbeddingMode) -> Result<(), AppError> {
        self.preferences.set_embedding_mode(mode)?;
        log::info!("embedding mode set to {mode}");
        Ok(())
    }
}
