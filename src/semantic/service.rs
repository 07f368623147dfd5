//! Semantic search service over captured content.
//!
//! Provides a high-level interface for similarity operations:
//! - Lazy-loads the embedding backend and vector index of each mode
//! - Stores embeddings of processed content per tab scope
//! - Answers dedup similarity queries (`SimilarityOracle`) and relevance searches
//! - Thread-safe with interior mutability for lazy initialization

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::SemanticSearchConfig;
use crate::dedup::{EmbeddingMode, OracleError, SimilarityMatch, SimilarityOracle, TabScope};
use crate::semantic::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::semantic::index::{IndexError, SearchResult, VectorIndex};
use crate::semantic::preprocess::preprocess_content;
use crate::semantic::remote::RemoteEmbedder;
use crate::semantic::storage::{VectorStorage, VectorStorageError, MAX_STRING_LEN};

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Semantic search is disabled")]
    Disabled,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Content is empty")]
    EmptyContent,

    #[error("{field} is {len} bytes, at most {max} allowed", max = MAX_STRING_LEN)]
    TooLong { field: &'static str, len: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lazy-loaded semantic search components for one embedding mode.
struct SemanticState {
    embedder: Box<dyn Embedder>,
    index: VectorIndex,
    storage: VectorStorage,
}

/// Each embedding mode has its own embedder, index and `vectors-<mode>.bin`.
/// Scores from one model are never compared against vectors of the other.
pub struct SemanticSearchService {
    config: SemanticSearchConfig,
    base_path: PathBuf,
    /// Embedders handed in at construction, consumed by the first init of their mode
    preset_embedders: Mutex<HashMap<EmbeddingMode, Box<dyn Embedder>>>,
    /// Initialized on first use of each mode
    states: Mutex<HashMap<EmbeddingMode, SemanticState>>,
}

impl SemanticSearchService {
    /// Create a service that builds the embedder of a mode on its first use.
    ///
    /// # Arguments
    /// * `config` - Semantic search configuration
    /// * `base_path` - Base directory for data files (vectors-<mode>.bin, models/)
    pub fn new(config: SemanticSearchConfig, base_path: PathBuf) -> Self {
        Self {
            config,
            base_path,
            preset_embedders: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Use an already constructed embedder for `mode` instead of the
    /// local model or the remote endpoint.
    pub fn with_embedder(self, mode: EmbeddingMode, embedder: Box<dyn Embedder>) -> Self {
        if let Ok(mut presets) = self.preset_embedders.lock() {
            presets.insert(mode, embedder);
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Relevance threshold for `search`; unrelated to dedup thresholds.
    pub fn search_threshold(&self, mode: EmbeddingMode) -> f32 {
        self.config.search_thresholds.threshold(mode)
    }

    /// Number of entries indexed for `mode`, 0 if not yet initialized.
    pub fn indexed_count(&self, mode: EmbeddingMode) -> usize {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(&mode).map(|s| s.index.len()))
            .unwrap_or(0)
    }

    pub fn is_initialized(&self, mode: EmbeddingMode) -> bool {
        self.states
            .lock()
            .ok()
            .map(|states| states.contains_key(&mode))
            .unwrap_or(false)
    }

    /// Force initialization of `mode`.
    ///
    /// Normally initialization happens lazily on first use.
    pub fn initialize(&self, mode: EmbeddingMode) -> Result<(), SemanticSearchError> {
        self.with_state(mode, |_| Ok(()))
    }

    /// Embed processed content and persist it under `scope` in the index of `mode`.
    ///
    /// The index is left untouched when the entry cannot be saved.
    pub fn add_content(
        &self,
        mode: EmbeddingMode,
        id: &str,
        scope: &TabScope,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), SemanticSearchError> {
        check_field_len("content id", id)?;
        check_field_len("scope", scope)?;
        let content = preprocess_content(text).ok_or(SemanticSearchError::EmptyContent)?;

        self.with_state(mode, |state| {
            let embedding = state.embedder.embed(&content)?;
            let previous = state.index.get(id).cloned();
            state.index.insert(id, scope.clone(), metadata, embedding)?;

            if let Err(err) = state.storage.save(&state.index, &state.embedder.model_id_hash()) {
                match previous {
                    Some(entry) => state.index.insert_entry(id.to_string(), entry)?,
                    None => {
                        state.index.remove(id);
                    }
                }
                return Err(err.into());
            }

            log::debug!("stored content id={id} scope={scope} mode={mode}");
            Ok(())
        })
    }

    /// Remove stored content from the index of `mode`; `false` when the ID was unknown.
    pub fn remove_content(&self, mode: EmbeddingMode, id: &str) -> Result<bool, SemanticSearchError> {
        self.with_state(mode, |state| {
            let Some(entry) = state.index.remove(id) else {
                return Ok(false);
            };
            if let Err(err) = state.storage.save(&state.index, &state.embedder.model_id_hash()) {
                state.index.insert_entry(id.to_string(), entry)?;
                return Err(err.into());
            }
            Ok(true)
        })
    }

    /// Relevance search across every scope, filtered by the search threshold of `mode`.
    pub fn search(
        &self,
        mode: EmbeddingMode,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SemanticSearchError> {
        let Some(query) = preprocess_content(query) else {
            return Ok(vec![]);
        };
        let threshold = self.search_threshold(mode);

        self.with_state(mode, |state| {
            let query_embedding = state.embedder.embed(&query)?;
            Ok(state.index.search(&query_embedding, None, threshold, limit)?)
        })
    }

    /// Nearest stored content within `scope`, scores clamped to [0, 1].
    pub fn similar_in_scope(
        &self,
        mode: EmbeddingMode,
        text: &str,
        scope: &TabScope,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>, SemanticSearchError> {
        let Some(content) = preprocess_content(text) else {
            return Ok(vec![]);
        };

        self.with_state(mode, |state| {
            if state.index.scope_len(scope) == 0 {
                return Ok(vec![]);
            }
            let embedding = state.embedder.embed(&content)?;
            let results = state.index.search(&embedding, Some(scope), 0.0, limit)?;

            Ok(results
                .into_iter()
                .map(|r| SimilarityMatch {
                    id: r.id,
                    score: r.score.clamp(0.0, 1.0),
                    metadata: r.metadata,
                })
                .collect())
        })
    }

    fn with_state<R>(
        &self,
        mode: EmbeddingMode,
        f: impl FnOnce(&mut SemanticState) -> Result<R, SemanticSearchError>,
    ) -> Result<R, SemanticSearchError> {
        if !self.config.enabled {
            return Err(SemanticSearchError::Disabled);
        }

        let mut states = self
            .states
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        let state = match states.entry(mode) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.do_init(mode)?),
        };
        f(state)
    }

    fn do_init(&self, mode: EmbeddingMode) -> Result<SemanticState, SemanticSearchError> {
        let preset = self
            .preset_embedders
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?
            .remove(&mode);

        let embedder: Box<dyn Embedder> = match (preset, mode) {
            (Some(embedder), _) => embedder,
            (None, EmbeddingMode::Offline) => {
                log::info!("Initializing semantic search with local model '{}'", self.config.model);
                Box::new(EmbeddingModel::new(&self.config.model, self.base_path.clone())?)
            }
            (None, EmbeddingMode::Online) => {
                log::info!(
                    "Initializing semantic search with remote model '{}'",
                    self.config.remote.model
                );
                Box::new(RemoteEmbedder::new(&self.config.remote)?)
            }
        };

        let model_id = embedder.model_id_hash();
        let dimensions = embedder.dimensions();

        let storage = VectorStorage::new(self.base_path.join(format!("vectors-{mode}.bin")));

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(idx) => {
                    log::info!("Loaded {} vectors from {}", idx.len(), storage.path().display());
                    idx
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Model changed, creating fresh {mode} index");
                    VectorIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!("Storage version {} unsupported, creating fresh index", file_ver);
                    VectorIndex::new(dimensions)
                }
                Err(e) => {
                    log::error!("Failed to load vectors: {}", e);
                    return Err(e.into());
                }
            }
        } else {
            log::info!("No existing {mode} index, starting fresh");
            VectorIndex::new(dimensions)
        };

        Ok(SemanticState {
            embedder,
            index,
            storage,
        })
    }
}

/// Ids and scopes are stored with a u16 length prefix.
fn check_field_len(field: &'static str, value: &str) -> Result<(), SemanticSearchError> {
    if value.len() > MAX_STRING_LEN {
        return Err(SemanticSearchError::TooLong {
            field,
            len: value.len(),
        });
    }
    Ok(())
}

impl SimilarityOracle for SemanticSearchService {
    fn find_similar(
        &self,
        text: &str,
        scope: &TabScope,
        limit: usize,
        mode: EmbeddingMode,
    ) -> Result<Vec<SimilarityMatch>, OracleError> {
        self.similar_in_scope(mode, text, scope, limit)
            .map_err(|e| OracleError::Unavailable(e.to_string()))
    }
}
