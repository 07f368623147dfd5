use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use homedir::my_home;

use crate::app::App;
use crate::config::Config;
use crate::dedup::{EmbeddingMode, FixedPreferences, PreferencesProvider, StoredPreferences};
use crate::semantic::SemanticSearchService;
use crate::storage::{BackendLocal, StorageManager};

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Build the application from files under `paths`.
    ///
    /// `mode_override` pins the embedding mode for this process instead of
    /// reading the stored preference on every call.
    pub fn create_app(paths: &AppPaths, mode_override: Option<EmbeddingMode>) -> Result<App> {
        let config = Config::load_with(&paths.base_path)?;

        let store: Arc<dyn StorageManager> = Arc::new(
            BackendLocal::new(&paths.store_path).context("Failed to open document store")?,
        );
        let preferences = Arc::new(StoredPreferences::new(
            store.clone(),
            config.dedup.default_mode,
        ));

        let semantic = Arc::new(SemanticSearchService::new(
            config.semantic_search.clone(),
            paths.base_path.clone(),
        ));

        let dedup_preferences: Option<Arc<dyn PreferencesProvider>> =
            mode_override.map(|mode| Arc::new(FixedPreferences(mode)) as Arc<dyn PreferencesProvider>);

        Ok(App::new(config, store, preferences, semantic, dedup_preferences))
    }

    /// Get application paths, creating the base directory
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths::new(base_path))
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("URMIND_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/urmind"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    /// JSON documents: signature cache and preferences
    pub store_path: PathBuf,
}

impl AppPaths {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            store_path: base_path.join("store"),
            base_path,
        }
    }
}
