//! Similarity infrastructure for captured content.
//!
//! This module provides local and remote embeddings plus an in-memory
//! vector index, and backs the dedup similarity oracle.
//!
//! # Architecture
//!
//! - `embeddings`: `Embedder` trait and the fastembed-backed local model
//! - `remote`: OpenAI-compatible embedding endpoint for online mode
//! - `index`: In-memory vector index with scoped cosine similarity search
//! - `storage`: Binary file I/O for vectors-<mode>.bin persistence
//! - `preprocess`: Text preprocessing for embedding input
//! - `service`: High-level service, implements `SimilarityOracle`

pub mod embeddings;
mod index;
mod preprocess;
mod remote;
mod service;
mod storage;

use serde::{Deserialize, Serialize};

use crate::dedup::EmbeddingMode;

pub use embeddings::{Embedder, EmbeddingError};
pub use index::SearchResult;
pub use remote::RemoteEmbeddingConfig;
pub use service::{SemanticSearchError, SemanticSearchService};

/// Default local embedding model for offline mode
pub const DEFAULT_MODEL: &str = "bge-small-en-v1.5";

/// Default relevance threshold for searches with API embeddings
pub const DEFAULT_ONLINE_SEARCH_THRESHOLD: f32 = 0.5;

/// Default relevance threshold for searches with the local model
pub const DEFAULT_OFFLINE_SEARCH_THRESHOLD: f32 = 0.35;

/// Minimum relevance for retrieval results, per embedding mode.
///
/// Deliberately a separate type from `dedup::DedupThresholds`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchThresholds {
    #[serde(default = "default_online")]
    pub online: f32,
    #[serde(default = "default_offline")]
    pub offline: f32,
}

impl Default for SearchThresholds {
    fn default() -> Self {
        Self {
            online: DEFAULT_ONLINE_SEARCH_THRESHOLD,
            offline: DEFAULT_OFFLINE_SEARCH_THRESHOLD,
        }
    }
}

fn default_online() -> f32 {
    DEFAULT_ONLINE_SEARCH_THRESHOLD
}

fn default_offline() -> f32 {
    DEFAULT_OFFLINE_SEARCH_THRESHOLD
}

impl SearchThresholds {
    pub fn threshold(&self, mode: EmbeddingMode) -> f32 {
        match mode {
            EmbeddingMode::Online => self.online,
            EmbeddingMode::Offline => self.offline,
        }
    }
}
