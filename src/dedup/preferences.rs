//! User preferences consumed by the dedup check.
//!
//! Preferences are read on every check because the user may switch modes
//! between two page extractions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dedup::policy::EmbeddingMode;
use crate::storage::{self, StorageManager};

/// Store identifier of the preferences document.
pub const PREFERENCES_DOCUMENT: &str = "preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("invalid preference: {0}")]
    Invalid(String),

    #[error("preferences unavailable: {0}")]
    Io(#[from] std::io::Error),
}

pub trait PreferencesProvider: Send + Sync {
    fn embedding_mode(&self) -> Result<EmbeddingMode, PreferenceError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// Raw value so a bad entry is reported instead of failing the whole document.
    #[serde(default)]
    pub embedding_mode: Option<String>,
}

/// Preferences persisted next to the signature cache.
pub struct StoredPreferences {
    store: Arc<dyn StorageManager>,
    default_mode: EmbeddingMode,
}

impl StoredPreferences {
    pub fn new(store: Arc<dyn StorageManager>, default_mode: EmbeddingMode) -> Self {
        Self {
            store,
            default_mode,
        }
    }

    pub fn set_embedding_mode(&self, mode: EmbeddingMode) -> Result<(), PreferenceError> {
        let mut prefs = self.load().unwrap_or_default();
        prefs.embedding_mode = Some(mode.to_string());
        storage::write_json(self.store.as_ref(), PREFERENCES_DOCUMENT, &prefs)?;
        log::info!("embedding mode set to {mode}");
        Ok(())
    }

    fn load(&self) -> Result<Preferences, PreferenceError> {
        match storage::read_json::<Preferences>(self.store.as_ref(), PREFERENCES_DOCUMENT) {
            Ok(prefs) => Ok(prefs.unwrap_or_default()),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                Err(PreferenceError::Invalid(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl PreferencesProvider for StoredPreferences {
    fn embedding_mode(&self) -> Result<EmbeddingMode, PreferenceError> {
        match self.load()?.embedding_mode {
            None => Ok(self.default_mode),
            Some(raw) => raw
                .parse::<EmbeddingMode>()
                .map_err(|e| PreferenceError::Invalid(e.to_string())),
        }
    }
}

/// A mode that never changes; used for one-shot CLI overrides.
pub struct FixedPreferences(pub EmbeddingMode);

impl PreferencesProvider for FixedPreferences {
    fn embedding_mode(&self) -> Result<EmbeddingMode, PreferenceError> {
        Ok(self.0)
    }
}
