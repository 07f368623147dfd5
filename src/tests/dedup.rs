use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::dedup::signature::{cache_key, generate_signature, normalize};
use crate::dedup::{
    should_process, DecisionReason, DedupService, DedupSettings, DedupThresholds, EmbeddingMode,
    FixedPreferences, PreferencesProvider, SignatureCache, SimilarityMatch, SimilarityOracle,
    StoredPreferences, TabScope,
};
use crate::tests::{BackendMemory, FailingOracle, MockOracle};

const BATCH: &str = "Breaking News: Company X raises $10M";
const NEAR_DUPLICATE: &str = "breaking   news:\n company x RAISES $10m";
const URL: &str = "https://a.com";

fn dedup(
    oracle: Arc<dyn SimilarityOracle>,
    store: Arc<BackendMemory>,
    preferences: Arc<dyn PreferencesProvider>,
) -> DedupService {
    DedupService::new(
        SignatureCache::new(store),
        oracle,
        preferences,
        DedupSettings::default(),
    )
}

fn offline() -> Arc<dyn PreferencesProvider> {
    Arc::new(FixedPreferences(EmbeddingMode::Offline))
}

fn tab() -> TabScope {
    TabScope::from(1u64)
}

#[test]
fn test_signature_ignores_case_and_whitespace() {
    assert_eq!(generate_signature(BATCH), generate_signature(BATCH));
    assert_eq!(generate_signature(BATCH), generate_signature(NEAR_DUPLICATE));
    assert_eq!(
        generate_signature(&normalize(BATCH)),
        generate_signature(&normalize(NEAR_DUPLICATE))
    );
}

#[test]
fn test_cache_short_circuits_oracle() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.9]));
    let service = dedup(oracle.clone(), Arc::default(), offline());

    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 1);

    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 1);

    let decision = service.explain(BATCH, &tab(), URL);
    assert_eq!(decision.reason, DecisionReason::CacheHit);
    assert_eq!(oracle.calls(), 1);
}

#[test]
fn test_threshold_boundary_is_inclusive() {
    let thresholds = DedupThresholds::default();
    for mode in [EmbeddingMode::Online, EmbeddingMode::Offline] {
        let t = thresholds.threshold(mode);
        assert!(!should_process(&[SimilarityMatch::new("c1", t)], mode, &thresholds));
        assert!(should_process(
            &[SimilarityMatch::new("c1", t - 1e-4)],
            mode,
            &thresholds
        ));
    }
}

#[test]
fn test_no_matches_means_process() {
    let oracle = Arc::new(MockOracle::default());
    let store = Arc::new(BackendMemory::default());
    let service = dedup(oracle.clone(), store.clone(), offline());

    let decision = service.explain(BATCH, &tab(), URL);
    assert!(decision.verdict);
    assert_eq!(decision.reason, DecisionReason::NoMatches);
    assert_eq!(decision.top_score, None);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_oracle_failure_fails_open() {
    let oracle = Arc::new(FailingOracle::default());
    let store = Arc::new(BackendMemory::default());
    let service = dedup(oracle.clone(), store.clone(), offline());

    let decision = service.explain(BATCH, &tab(), URL);
    assert!(decision.verdict);
    assert_eq!(decision.reason, DecisionReason::OracleUnavailable);
    assert!(service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_same_text_on_two_pages_is_independent() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.9]));
    let service = dedup(oracle.clone(), Arc::default(), offline());

    let sig = generate_signature(BATCH);
    assert_ne!(cache_key("https://a.com", &sig), cache_key("https://b.com", &sig));

    assert!(!service.should_process_content(BATCH, &tab(), "https://a.com"));
    oracle.set_scores(&[0.1]);
    assert!(service.should_process_content(BATCH, &tab(), "https://b.com"));
    assert_eq!(oracle.calls(), 2);
    assert_eq!(service.get_cache_stats().unwrap().size, 1);
}

#[test]
fn test_below_threshold_then_near_duplicate() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.42]));
    let store = Arc::new(BackendMemory::default());
    let service = dedup(oracle.clone(), store.clone(), offline());

    // below the offline threshold: process, nothing cached
    let first = service.explain(BATCH, &tab(), URL);
    assert!(first.verdict);
    assert_eq!(first.reason, DecisionReason::BelowThreshold);
    assert_eq!(first.mode, Some(EmbeddingMode::Offline));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(service.get_cache_stats().unwrap().size, 0);

    // the first batch has since been stored, so its near duplicate scores high
    oracle.set_scores(&[0.75]);
    assert!(!service.should_process_content(NEAR_DUPLICATE, &tab(), URL));
    assert_eq!(oracle.calls(), 2);

    // same signature again: cache hit, oracle untouched
    let third = service.explain(BATCH, &tab(), URL);
    assert!(!third.verdict);
    assert_eq!(third.reason, DecisionReason::CacheHit);
    assert_eq!(oracle.calls(), 2);
}

#[test]
fn test_above_threshold_writes_entry() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.75]));
    let store = Arc::new(BackendMemory::default());
    let cache = SignatureCache::new(store.clone());
    let service = dedup(oracle.clone(), store.clone(), offline());

    let before = service.get_cache_stats().unwrap().size;
    let decision = service.explain(BATCH, &tab(), URL);

    assert!(!decision.verdict);
    assert_eq!(decision.reason, DecisionReason::AboveThreshold);
    assert_eq!(decision.top_score, Some(0.75));
    assert_eq!(service.get_cache_stats().unwrap().size, before + 1);

    let entry = cache.entry(&decision.key).unwrap().unwrap();
    assert_eq!(entry.score, 0.75);
    assert_eq!(entry.key, cache_key(URL, &generate_signature(BATCH)));
}

#[test]
fn test_unreadable_store_is_a_miss() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.9]));
    let store = Arc::new(BackendMemory::default().failing_reads());
    let service = dedup(oracle.clone(), store, offline());

    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 2);
}

#[test]
fn test_unwritable_store_keeps_verdict() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.9]));
    let store = Arc::new(BackendMemory::default().failing_writes());
    let service = dedup(oracle.clone(), store, offline());

    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 2);
    assert_eq!(service.get_cache_stats().unwrap().size, 0);
}

#[test]
fn test_invalid_preference_uses_offline_threshold() {
    let store = Arc::new(BackendMemory::default());
    store.insert(
        crate::dedup::preferences::PREFERENCES_DOCUMENT,
        br#"{"embedding_mode":"sideways"}"#,
    );
    let preferences = Arc::new(StoredPreferences::new(store.clone(), EmbeddingMode::Online));
    // 0.7 passes the online threshold but not the offline one
    let oracle = Arc::new(MockOracle::with_scores(&[0.7]));
    let service = dedup(oracle, store, preferences);

    let decision = service.explain(BATCH, &tab(), URL);
    assert_eq!(decision.mode, Some(EmbeddingMode::Offline));
    assert!(!decision.verdict);
}

#[test]
fn test_mode_change_applies_to_next_check() {
    let store = Arc::new(BackendMemory::default());
    let preferences = Arc::new(StoredPreferences::new(store.clone(), EmbeddingMode::Offline));
    let oracle = Arc::new(MockOracle::with_scores(&[0.7]));
    let service = dedup(oracle.clone(), store, preferences.clone());

    preferences.set_embedding_mode(EmbeddingMode::Online).unwrap();
    assert!(service.should_process_content(BATCH, &tab(), URL));

    preferences.set_embedding_mode(EmbeddingMode::Offline).unwrap();
    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 2);
}

#[test]
fn test_oracle_and_threshold_use_same_mode() {
    let store = Arc::new(BackendMemory::default());
    let preferences = Arc::new(StoredPreferences::new(store.clone(), EmbeddingMode::Offline));
    let oracle = Arc::new(MockOracle::with_scores(&[0.1]));
    let service = dedup(oracle.clone(), store, preferences.clone());

    let decision = service.explain(BATCH, &tab(), URL);
    assert_eq!(decision.mode, Some(EmbeddingMode::Offline));
    assert_eq!(oracle.last_mode(), decision.mode);

    preferences.set_embedding_mode(EmbeddingMode::Online).unwrap();
    let decision = service.explain(BATCH, &tab(), URL);
    assert_eq!(decision.mode, Some(EmbeddingMode::Online));
    assert_eq!(oracle.last_mode(), decision.mode);
}

#[test]
fn test_nan_score_processes_without_caching() {
    let oracle = Arc::new(MockOracle::with_scores(&[f32::NAN]));
    let store = Arc::new(BackendMemory::default());
    let service = dedup(oracle.clone(), store.clone(), offline());

    let decision = service.explain(BATCH, &tab(), URL);
    assert!(decision.verdict);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert!(service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 2);
}

#[test]
fn test_clear_cache_forces_new_lookup() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.9]));
    let service = dedup(oracle.clone(), Arc::default(), offline());

    assert!(!service.should_process_content(BATCH, &tab(), URL));
    service.clear_cache().unwrap();
    assert_eq!(service.get_cache_stats().unwrap().size, 0);

    assert!(!service.should_process_content(BATCH, &tab(), URL));
    assert_eq!(oracle.calls(), 2);
}

#[test]
fn test_concurrent_checks_are_total() {
    let oracle = Arc::new(MockOracle::with_scores(&[0.9]));
    let service = Arc::new(dedup(oracle.clone(), Arc::default(), offline()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            std::thread::spawn(move || {
                service.should_process_content(&format!("batch {}", i % 2), &tab(), URL)
            })
        })
        .collect();

    for handle in handles {
        assert!(!handle.join().unwrap());
    }
    assert_eq!(service.get_cache_stats().unwrap().size, 2);
    assert!(oracle.calls() >= 2);
}
