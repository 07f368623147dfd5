//! Decision policy for dedup checks and the recovery table for failures.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dedup::oracle::SimilarityMatch;

/// Dedup threshold for the API embedding model.
pub const DEFAULT_ONLINE_DEDUP_THRESHOLD: f32 = 0.85;
/// Dedup threshold for the smaller on-device model.
pub const DEFAULT_OFFLINE_DEDUP_THRESHOLD: f32 = 0.6;

/// Which embedding backend the user selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Online,
    #[default]
    Offline,
}

impl Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingMode::Online => write!(f, "online"),
            EmbeddingMode::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown embedding mode '{0}', expected 'online' or 'offline'")]
pub struct UnknownMode(pub String);

impl FromStr for EmbeddingMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(EmbeddingMode::Online),
            "offline" => Ok(EmbeddingMode::Offline),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// Similarity at or above which new content counts as a duplicate.
///
/// Not to be confused with the search relevance thresholds in
/// `crate::semantic::SearchThresholds`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DedupThresholds {
    #[serde(default = "default_online")]
    pub online: f32,
    #[serde(default = "default_offline")]
    pub offline: f32,
}

impl Default for DedupThresholds {
    fn default() -> Self {
        Self {
            online: DEFAULT_ONLINE_DEDUP_THRESHOLD,
            offline: DEFAULT_OFFLINE_DEDUP_THRESHOLD,
        }
    }
}

fn default_online() -> f32 {
    DEFAULT_ONLINE_DEDUP_THRESHOLD
}

fn default_offline() -> f32 {
    DEFAULT_OFFLINE_DEDUP_THRESHOLD
}

impl DedupThresholds {
    pub fn threshold(&self, mode: EmbeddingMode) -> f32 {
        match mode {
            EmbeddingMode::Online => self.online,
            EmbeddingMode::Offline => self.offline,
        }
    }
}

/// `true` when the content should be summarized and stored.
///
/// Only the best match counts; the comparison is inclusive. A NaN score
/// lets the content through.
pub fn should_process(
    matches: &[SimilarityMatch],
    mode: EmbeddingMode,
    thresholds: &DedupThresholds,
) -> bool {
    match matches.first() {
        None => true,
        Some(top) => top.score.is_nan() || top.score < thresholds.threshold(mode),
    }
}

pub fn top_score_or_zero(matches: &[SimilarityMatch]) -> f32 {
    matches.first().map(|top| top.score).unwrap_or(0.0)
}

/// Things that can go wrong during a dedup check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    StoreRead,
    StoreWrite,
    Oracle,
    Preference,
}

/// What the orchestrator does about a `Failure`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Continue as if the signature was never recorded.
    TreatAsMiss,
    /// Log and keep the verdict already reached.
    LogAndContinue,
    /// Stop checking and let the content through.
    ProcessContent,
    /// Use the offline threshold.
    UseOfflineMode,
}

/// Every failure resolves toward keeping user content.
pub fn recovery_for(failure: Failure) -> Recovery {
    match failure {
        Failure::StoreRead => Recovery::TreatAsMiss,
        Failure::StoreWrite => Recovery::LogAndContinue,
        Failure::Oracle => Recovery::ProcessContent,
        Failure::Preference => Recovery::UseOfflineMode,
    }
}
