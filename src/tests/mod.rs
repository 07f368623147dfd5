//! Shared test doubles and cross-module tests.

mod app;
mod dedup;

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::app::App;
use crate::config::Config;
use crate::dedup::{
    EmbeddingMode, OracleError, SimilarityMatch, SimilarityOracle, StoredPreferences, TabScope,
};
use crate::semantic::{Embedder, EmbeddingError, SemanticSearchService};
use crate::storage::{BackendLocal, StorageManager};

/// Bag-of-words embedder: each lowercase word bumps one CRC32 bucket.
///
/// Texts sharing words get positive cosine similarity, disjoint texts get 0.
pub struct KeywordEmbedder {
    dimensions: usize,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-test"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = crc32fast::hash(word.to_lowercase().as_bytes()) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

/// In-memory `StorageManager` that can be switched into failure modes.
#[derive(Default)]
pub struct BackendMemory {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
}

impl BackendMemory {
    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn insert(&self, ident: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(ident.to_string(), data.to_vec());
    }
}

impl StorageManager for BackendMemory {
    fn write(&self, ident: &str, data: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "quota exceeded"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(ident, data);
        Ok(())
    }

    fn read(&self, ident: &str) -> io::Result<Vec<u8>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "store offline"));
        }
        self.files
            .lock()
            .unwrap()
            .get(ident)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, ident.to_string()))
    }

    fn exists(&self, ident: &str) -> bool {
        self.files.lock().unwrap().contains_key(ident)
    }

    fn delete(&self, ident: &str) -> io::Result<()> {
        self.files.lock().unwrap().remove(ident);
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

/// Oracle returning scripted scores, counting calls and recording the mode asked for.
#[derive(Default)]
pub struct MockOracle {
    scores: Mutex<Vec<f32>>,
    modes: Mutex<Vec<EmbeddingMode>>,
    pub calls: AtomicUsize,
}

impl MockOracle {
    pub fn with_scores(scores: &[f32]) -> Self {
        let oracle = Self::default();
        oracle.set_scores(scores);
        oracle
    }

    pub fn set_scores(&self, scores: &[f32]) {
        *self.scores.lock().unwrap() = scores.to_vec();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Mode of the most recent call.
    pub fn last_mode(&self) -> Option<EmbeddingMode> {
        self.modes.lock().unwrap().last().copied()
    }
}

impl SimilarityOracle for MockOracle {
    fn find_similar(
        &self,
        _text: &str,
        _scope: &TabScope,
        limit: usize,
        mode: EmbeddingMode,
    ) -> Result<Vec<SimilarityMatch>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().unwrap().push(mode);
        let mut scores = self.scores.lock().unwrap().clone();
        scores.sort_by(|a, b| b.total_cmp(a));
        Ok(scores
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, score)| SimilarityMatch::new(format!("stored-{i}"), score))
            .collect())
    }
}

/// Oracle that is always unavailable.
#[derive(Default)]
pub struct FailingOracle {
    pub calls: AtomicUsize,
}

impl SimilarityOracle for FailingOracle {
    fn find_similar(
        &self,
        _text: &str,
        _scope: &TabScope,
        _limit: usize,
        _mode: EmbeddingMode,
    ) -> Result<Vec<SimilarityMatch>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::Unavailable("model not loaded".to_string()))
    }
}

/// Creates an isolated App backed by a temp directory, with the keyword
/// embedder standing in for both modes.
pub fn create_app() -> (App, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let config = Config::load_with(tmp.path()).expect("failed to load config");

    let store: Arc<dyn StorageManager> =
        Arc::new(BackendLocal::new(tmp.path().join("store")).expect("failed to create store"));
    let preferences = Arc::new(StoredPreferences::new(store.clone(), EmbeddingMode::Offline));
    let semantic = Arc::new(
        SemanticSearchService::new(config.semantic_search.clone(), tmp.path().to_path_buf())
            .with_embedder(EmbeddingMode::Offline, Box::new(KeywordEmbedder::default()))
            .with_embedder(EmbeddingMode::Online, Box::new(KeywordEmbedder::default())),
    );

    (App::new(config, store, preferences, semantic, None), tmp)
}
