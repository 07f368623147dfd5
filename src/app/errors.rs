use crate::dedup::{CacheError, PreferenceError};
use crate::semantic::SemanticSearchError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("signature cache: {0}")]
    Cache(#[from] CacheError),

    #[error("semantic search: {0}")]
    Semantic(#[from] SemanticSearchError),

    #[error("preferences: {0}")]
    Preference(#[from] PreferenceError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
