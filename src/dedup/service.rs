//! Dedup orchestrator: decides whether freshly extracted content is worth
//! summarizing and storing.
//!
//! Flow for one batch:
//! - signature and `url_hash:signature` cache key
//! - negative-cache lookup (hit means skip)
//! - embedding mode, read once for the query and the threshold
//! - similarity query scoped to the tab
//! - on skip, record the top score so the next identical batch is free
//!
//! Every failure is resolved through `policy::recovery_for` and the check
//! never returns an error to its caller.

use std::sync::Arc;

use serde::Serialize;

use crate::dedup::cache::{CacheError, CacheStats, SignatureCache};
use crate::dedup::oracle::{SimilarityOracle, TabScope, DEFAULT_MATCH_LIMIT};
use crate::dedup::policy::{
    self, recovery_for, DedupThresholds, EmbeddingMode, Failure, Recovery,
};
use crate::dedup::preferences::PreferencesProvider;
use crate::dedup::signature::{self, CacheKey, SIGNATURE_PREFIX_CHARS};

/// Tunables of the orchestrator.
#[derive(Clone, Debug)]
pub struct DedupSettings {
    pub thresholds: DedupThresholds,
    pub match_limit: usize,
    pub signature_prefix_chars: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            thresholds: DedupThresholds::default(),
            match_limit: DEFAULT_MATCH_LIMIT,
            signature_prefix_chars: SIGNATURE_PREFIX_CHARS,
        }
    }
}

/// Why a verdict was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    CacheHit,
    NoMatches,
    BelowThreshold,
    AboveThreshold,
    OracleUnavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DedupDecision {
    /// `true` means process the content.
    pub verdict: bool,
    pub key: CacheKey,
    pub reason: DecisionReason,
    /// Best similarity seen, when the oracle was consulted.
    pub top_score: Option<f32>,
    /// Mode whose threshold was applied, when the policy ran.
    pub mode: Option<EmbeddingMode>,
}

pub struct DedupService {
    cache: SignatureCache,
    oracle: Arc<dyn SimilarityOracle>,
    preferences: Arc<dyn PreferencesProvider>,
    settings: DedupSettings,
}

impl DedupService {
    pub fn new(
        cache: SignatureCache,
        oracle: Arc<dyn SimilarityOracle>,
        preferences: Arc<dyn PreferencesProvider>,
        settings: DedupSettings,
    ) -> Self {
        Self {
            cache,
            oracle,
            preferences,
            settings,
        }
    }

    pub fn settings(&self) -> &DedupSettings {
        &self.settings
    }

    /// `true` when the batch is novel enough to summarize and store.
    pub fn should_process_content(&self, batch: &str, scope: &TabScope, source_url: &str) -> bool {
        self.explain(batch, scope, source_url).verdict
    }

    /// Same as `should_process_content` but reports how the verdict was reached.
    pub fn explain(&self, batch: &str, scope: &TabScope, source_url: &str) -> DedupDecision {
        let signature =
            signature::generate_signature_with(batch, self.settings.signature_prefix_chars);
        let key = signature::cache_key(source_url, &signature);

        match self.cache.has(&key) {
            Ok(true) => {
                log::debug!("dedup key={key} outcome=cache_hit");
                return DedupDecision {
                    verdict: false,
                    key,
                    reason: DecisionReason::CacheHit,
                    top_score: None,
                    mode: None,
                };
            }
            Ok(false) => {}
            Err(err) => self.recover(Failure::StoreRead, &key, &err),
        }

        // one read serves both the oracle and the threshold
        let mode = self.embedding_mode();

        let matches = match self
            .oracle
            .find_similar(batch, scope, self.settings.match_limit, mode)
        {
            Ok(matches) => matches,
            Err(err) => {
                let verdict = recovery_for(Failure::Oracle) == Recovery::ProcessContent;
                log::warn!("dedup key={key} scope={scope} oracle failed, verdict={verdict}: {err}");
                return DedupDecision {
                    verdict,
                    key,
                    reason: DecisionReason::OracleUnavailable,
                    top_score: None,
                    mode: None,
                };
            }
        };

        let verdict = policy::should_process(&matches, mode, &self.settings.thresholds);
        let top_score = matches.first().map(|top| top.score);

        if !verdict {
            if let Err(err) = self.cache.put(&key, policy::top_score_or_zero(&matches)) {
                self.recover(Failure::StoreWrite, &key, &err);
            }
        }

        let reason = match (top_score, verdict) {
            (None, _) => DecisionReason::NoMatches,
            (Some(_), true) => DecisionReason::BelowThreshold,
            (Some(_), false) => DecisionReason::AboveThreshold,
        };

        log::debug!(
            "dedup key={key} scope={scope} mode={mode} top_score={top_score:?} verdict={verdict}"
        );

        DedupDecision {
            verdict,
            key,
            reason,
            top_score,
            mode: Some(mode),
        }
    }

    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache.clear()?;
        log::info!("signature cache cleared");
        Ok(())
    }

    pub fn get_cache_stats(&self) -> Result<CacheStats, CacheError> {
        self.cache.stats()
    }

    /// Current embedding mode; an unusable preference means offline.
    pub fn embedding_mode(&self) -> EmbeddingMode {
        match self.preferences.embedding_mode() {
            Ok(mode) => mode,
            Err(err) => match recovery_for(Failure::Preference) {
                Recovery::UseOfflineMode => {
                    log::warn!("embedding mode preference unusable, using offline: {err}");
                    EmbeddingMode::Offline
                }
                _ => EmbeddingMode::default(),
            },
        }
    }

    /// Store failures are logged; the check carries on either way.
    fn recover(&self, failure: Failure, key: &CacheKey, err: &CacheError) {
        match recovery_for(failure) {
            Recovery::TreatAsMiss => {
                log::warn!("dedup key={key} cache read failed, treating as miss: {err}")
            }
            Recovery::LogAndContinue => {
                log::warn!("dedup key={key} cache write failed: {err}")
            }
            other => log::error!("dedup key={key} unexpected recovery {other:?}: {err}"),
        }
    }
}
