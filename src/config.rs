use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::dedup::{DedupSettings, DedupThresholds, EmbeddingMode, DEFAULT_MATCH_LIMIT};
use crate::dedup::signature::SIGNATURE_PREFIX_CHARS;
use crate::semantic::{RemoteEmbeddingConfig, SearchThresholds, DEFAULT_MODEL};
use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Configuration of the dedup decision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Similarity at which content counts as duplicate, per embedding mode
    #[serde(default)]
    pub thresholds: DedupThresholds,

    /// Neighbours requested from the similarity oracle
    #[serde(default = "default_match_limit")]
    pub match_limit: usize,

    /// Normalized characters hashed into a signature
    #[serde(default = "default_signature_prefix_chars")]
    pub signature_prefix_chars: usize,

    /// Embedding mode used until the user picks one
    #[serde(default)]
    pub default_mode: EmbeddingMode,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            thresholds: DedupThresholds::default(),
            match_limit: DEFAULT_MATCH_LIMIT,
            signature_prefix_chars: SIGNATURE_PREFIX_CHARS,
            default_mode: EmbeddingMode::default(),
        }
    }
}

fn default_match_limit() -> usize {
    DEFAULT_MATCH_LIMIT
}

fn default_signature_prefix_chars() -> usize {
    SIGNATURE_PREFIX_CHARS
}

/// Configuration for semantic search functionality
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Enable or disable similarity lookups. When disabled every dedup
    /// check lets content through.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Local model name for offline mode (e.g., "bge-small-en-v1.5")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Remote endpoint for online mode
    #[serde(default)]
    pub remote: RemoteEmbeddingConfig,

    /// Relevance thresholds for search results
    #[serde(default)]
    pub search_thresholds: SearchThresholds,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_string(),
            remote: RemoteEmbeddingConfig::default(),
            search_thresholds: SearchThresholds::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_semantic_model() -> String {
    DEFAULT_MODEL.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let dedup = &self.dedup;
        for (name, value) in [
            ("dedup.thresholds.online", dedup.thresholds.online),
            ("dedup.thresholds.offline", dedup.thresholds.offline),
            (
                "semantic_search.search_thresholds.online",
                self.semantic_search.search_thresholds.online,
            ),
            (
                "semantic_search.search_thresholds.offline",
                self.semantic_search.search_thresholds.offline,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be between 0.0 and 1.0, got {value}");
            }
        }

        if dedup.match_limit == 0 {
            bail!("dedup.match_limit must be greater than 0");
        }

        if dedup.signature_prefix_chars == 0 {
            bail!("dedup.signature_prefix_chars must be greater than 0");
        }

        if self.semantic_search.remote.timeout_secs == 0 {
            bail!("semantic_search.remote.timeout_secs must be greater than 0");
        }

        if self.daemon.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!(
                "daemon.listen_addr must be a socket address, got '{}'",
                self.daemon.listen_addr
            );
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults when missing.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let store = BackendLocal::new(base_path)
            .with_context(|| format!("cannot create {}", base_path.display()))?;

        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn dedup_settings(&self) -> DedupSettings {
        DedupSettings {
            thresholds: self.dedup.thresholds,
            match_limit: self.dedup.match_limit,
            signature_prefix_chars: self.dedup.signature_prefix_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.dedup.thresholds, DedupThresholds::default());
        assert_eq!(config.dedup.match_limit, DEFAULT_MATCH_LIMIT);
        assert_eq!(config.daemon.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(config.semantic_search.enabled);
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_config_is_filled_in() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "dedup:\n  thresholds:\n    online: 0.9\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.dedup.thresholds.online, 0.9);
        assert_eq!(config.dedup.thresholds.offline, 0.6);
        assert_eq!(config.semantic_search.model, DEFAULT_MODEL);

        // upgraded file now carries every section
        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("semantic_search"));
        assert!(saved.contains("listen_addr"));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "dedup:\n  thresholds:\n    offline: 1.5\n",
        )
        .unwrap();

        let err = Config::load_with(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("dedup.thresholds.offline"));
    }

    #[test]
    fn test_zero_match_limit_rejected() {
        let config = Config {
            dedup: DedupConfig {
                match_limit: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let config = Config {
            daemon: DaemonConfig {
                listen_addr: "not an address".to_string(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dedup_settings_follow_config() {
        let config = Config {
            dedup: DedupConfig {
                match_limit: 8,
                signature_prefix_chars: 100,
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = config.dedup_settings();
        assert_eq!(settings.match_limit, 8);
        assert_eq!(settings.signature_prefix_chars, 100);
    }
}
