//! In-memory vector index with cosine similarity search.
//!
//! Stores embeddings of processed content, each tagged with the tab scope it
//! was captured in, and answers scoped nearest-neighbour queries.

use std::collections::HashMap;

use crate::dedup::TabScope;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Tab or session the content was captured in
    pub scope: TabScope,
    /// Insertion sequence, breaks score ties
    pub seq: u64,
    /// Free-form attributes returned with matches (url, title, ...)
    pub metadata: HashMap<String, String>,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// In-memory vector index for semantic search.
///
/// Stores embeddings keyed by content ID, supporting:
/// - Insert/update/remove operations
/// - Cosine similarity search with scope and threshold filtering
pub struct VectorIndex {
    entries: HashMap<String, VectorEntry>,
    dimensions: usize,
    next_seq: u64,
}

/// Search result from the vector index.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    /// Content ID
    pub id: String,
    /// Cosine similarity score
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
            next_seq: 0,
        }
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or update an entry in the index.
    ///
    /// Updating an existing ID keeps its original insertion sequence.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        scope: TabScope,
        metadata: HashMap<String, String>,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        let id = id.into();
        let seq = match self.entries.get(&id) {
            Some(existing) => existing.seq,
            None => self.next_seq,
        };
        self.insert_entry(
            id,
            VectorEntry {
                scope,
                seq,
                metadata,
                embedding,
            },
        )
    }

    /// Insert an entry with a known sequence, as read back from storage.
    pub(crate) fn insert_entry(&mut self, id: String, entry: VectorEntry) -> Result<(), IndexError> {
        if entry.embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: entry.embedding.len(),
            });
        }

        if Self::l2_norm(&entry.embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.next_seq = self.next_seq.max(entry.seq + 1);
        self.entries.insert(id, entry);

        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<VectorEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&VectorEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of entries captured in `scope`.
    pub fn scope_len(&self, scope: &TabScope) -> usize {
        self.entries.values().filter(|e| &e.scope == scope).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VectorEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Search for similar vectors using cosine similarity.
    ///
    /// # Arguments
    /// * `query` - The query embedding vector
    /// * `scope` - Only consider entries captured in this scope (all when `None`)
    /// * `threshold` - Minimum similarity score
    /// * `limit` - Maximum number of results to return
    ///
    /// # Returns
    /// Results sorted by similarity score (highest first), ties in insertion order.
    pub fn search(
        &self,
        query: &[f32],
        scope: Option<&TabScope>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = Self::l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut scored: Vec<(u64, SearchResult)> = self
            .entries
            .iter()
            .filter(|(_, entry)| scope.map(|s| &entry.scope == s).unwrap_or(true))
            .filter_map(|(id, entry)| {
                let score = Self::cosine_similarity(query, &entry.embedding, query_norm);
                if score >= threshold {
                    Some((
                        entry.seq,
                        SearchResult {
                            id: id.clone(),
                            score,
                            metadata: entry.metadata.clone(),
                        },
                    ))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(seq_a.cmp(seq_b))
        });
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(_, result)| result).collect())
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine similarity with a precomputed query norm.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}
