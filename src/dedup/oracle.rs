use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::dedup::policy::EmbeddingMode;

/// Default number of neighbours requested per dedup check.
pub const DEFAULT_MATCH_LIMIT: usize = 4;

/// Tab or session boundary within which stored content is compared.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabScope(String);

impl TabScope {
    pub fn new(scope: impl Into<String>) -> Self {
        TabScope(scope.into())
    }
}

impl Display for TabScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for TabScope {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for TabScope {
    fn from(scope: &str) -> Self {
        TabScope(scope.to_string())
    }
}

impl From<u64> for TabScope {
    fn from(tab_id: u64) -> Self {
        TabScope(tab_id.to_string())
    }
}

/// Previously stored content that resembles the batch under test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub id: String,
    /// Similarity in [0, 1], higher is closer.
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SimilarityMatch {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("similarity oracle unavailable: {0}")]
    Unavailable(String),
}

/// Nearest-neighbour lookup over stored content.
///
/// Implementations return matches sorted by descending score, at most
/// `limit` of them, and an empty vector when nothing is stored in `scope`.
/// Calls are expensive (inference plus a vector scan).
///
/// `mode` selects the embedding model that produces the scores, so the
/// caller can apply the threshold tuned for that same model.
pub trait SimilarityOracle: Send + Sync {
    fn find_similar(
        &self,
        text: &str,
        scope: &TabScope,
        limit: usize,
        mode: EmbeddingMode,
    ) -> Result<Vec<SimilarityMatch>, OracleError>;
}
