//! Semantic deduplication of captured page content.
//!
//! Decides, per extracted text batch, whether it is novel enough to be
//! summarized and stored or whether it repeats something already captured.
//!
//! # Architecture
//!
//! - `signature`: normalized prefix hashing and per-page cache keys
//! - `cache`: persistent negative cache of rejected signatures
//! - `oracle`: similarity lookup contract and match types
//! - `policy`: threshold decision and failure recovery table
//! - `preferences`: embedding mode preference provider
//! - `service`: orchestrator tying the pieces together

pub mod cache;
pub mod oracle;
pub mod policy;
pub mod preferences;
pub mod service;
pub mod signature;

pub use cache::{CacheEntry, CacheError, CacheStats, SignatureCache};
pub use oracle::{OracleError, SimilarityMatch, SimilarityOracle, TabScope, DEFAULT_MATCH_LIMIT};
pub use policy::{should_process, DedupThresholds, EmbeddingMode};
pub use preferences::{FixedPreferences, PreferenceError, PreferencesProvider, StoredPreferences};
pub use service::{DecisionReason, DedupDecision, DedupService, DedupSettings};
pub use signature::{cache_key, generate_signature, CacheKey, ContentSignature};
