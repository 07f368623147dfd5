use std::collections::HashMap;

use crate::app::AppError;
use crate::dedup::{DecisionReason, EmbeddingMode, TabScope};
use crate::semantic::SemanticSearchError;
use crate::tests::create_app;

const STORED: &str = "Startup company raises funding in new series round";
const URL: &str = "https://news.example/funding";

#[test]
fn test_stored_content_blocks_repeat_in_same_tab() {
    let (app, _tmp) = create_app();
    let tab = TabScope::from(1u64);

    assert!(app.should_process_content(STORED, &tab, URL));
    app.store_content("c1", &tab, STORED, HashMap::new()).unwrap();

    let decision = app.explain(STORED, &tab, URL);
    assert!(!decision.verdict);
    assert_eq!(decision.reason, DecisionReason::AboveThreshold);

    assert_eq!(app.explain(STORED, &tab, URL).reason, DecisionReason::CacheHit);
    assert_eq!(app.cache_stats().unwrap().size, 1);
}

#[test]
fn test_other_tab_is_not_compared() {
    let (app, _tmp) = create_app();
    app.store_content("c1", &TabScope::from(1u64), STORED, HashMap::new())
        .unwrap();

    let decision = app.explain(STORED, &TabScope::from(2u64), URL);
    assert!(decision.verdict);
    assert_eq!(decision.reason, DecisionReason::NoMatches);
}

#[test]
fn test_unrelated_content_is_processed() {
    let (app, _tmp) = create_app();
    let tab = TabScope::from(1u64);
    app.store_content("c1", &tab, STORED, HashMap::new()).unwrap();

    assert!(app.should_process_content("sunny weather forecast", &tab, URL));
    assert_eq!(app.cache_stats().unwrap().size, 0);
}

#[test]
fn test_search_and_remove() {
    let (app, _tmp) = create_app();
    let mut metadata = HashMap::new();
    metadata.insert("url".to_string(), URL.to_string());
    app.store_content("c1", &TabScope::from(1u64), STORED, metadata)
        .unwrap();
    app.store_content("c2", &TabScope::from(2u64), "cloudy weather report", HashMap::new())
        .unwrap();

    let results = app.search("company funding", 10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "c1");
    assert_eq!(results[0].metadata.get("url").map(String::as_str), Some(URL));

    assert!(app.remove_content("c1").unwrap());
    assert!(app.search("company funding", 10).unwrap().is_empty());
}

#[test]
fn test_invalid_inputs() {
    let (app, _tmp) = create_app();
    let tab = TabScope::from(1u64);

    assert!(matches!(
        app.store_content(" ", &tab, STORED, HashMap::new()),
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        app.store_content("c1", &tab, "   ", HashMap::new()),
        Err(AppError::Semantic(SemanticSearchError::EmptyContent))
    ));
    assert!(matches!(app.search("company", 0), Err(AppError::InvalidInput(_))));
}

#[test]
fn test_preferences_roundtrip() {
    let (app, _tmp) = create_app();

    let prefs = app.preferences().unwrap();
    assert_eq!(prefs.embedding_mode, EmbeddingMode::Offline);
    assert!(prefs.valid);

    app.set_embedding_mode(EmbeddingMode::Online).unwrap();
    let prefs = app.preferences().unwrap();
    assert_eq!(prefs.embedding_mode, EmbeddingMode::Online);
    assert_eq!(app.active_mode(), EmbeddingMode::Online);
}

#[test]
fn test_mode_switch_checks_against_that_modes_index() {
    let (app, _tmp) = create_app();
    let tab = TabScope::from(1u64);
    app.store_content("c1", &tab, STORED, HashMap::new()).unwrap();

    // offline vectors are never scored under the online threshold
    app.set_embedding_mode(EmbeddingMode::Online).unwrap();
    let decision = app.explain(STORED, &tab, URL);
    assert!(decision.verdict);
    assert_eq!(decision.reason, DecisionReason::NoMatches);
    assert_eq!(decision.mode, Some(EmbeddingMode::Online));

    app.store_content("c1", &tab, STORED, HashMap::new()).unwrap();
    let decision = app.explain(STORED, &tab, URL);
    assert!(!decision.verdict);
    assert_eq!(decision.mode, Some(EmbeddingMode::Online));
}

#[test]
fn test_oversized_id_is_rejected_and_store_keeps_working() {
    let (app, tmp) = create_app();
    let tab = TabScope::from(1u64);

    let long_id = "x".repeat(70_000);
    assert!(matches!(
        app.store_content(&long_id, &tab, STORED, HashMap::new()),
        Err(AppError::Semantic(SemanticSearchError::TooLong { .. }))
    ));

    app.store_content("c1", &tab, STORED, HashMap::new()).unwrap();
    assert!(!app.should_process_content(STORED, &tab, URL));
    assert!(tmp.path().join("vectors-offline.bin").exists());
}

#[test]
fn test_invalid_stored_preference_reported() {
    let (app, tmp) = create_app();
    std::fs::write(
        tmp.path().join("store").join("preferences.json"),
        "{not json",
    )
    .unwrap();

    let prefs = app.preferences().unwrap();
    assert_eq!(prefs.embedding_mode, EmbeddingMode::Offline);
    assert!(!prefs.valid);
}

#[test]
fn test_clear_cache() {
    let (app, _tmp) = create_app();
    let tab = TabScope::from(1u64);
    app.store_content("c1", &tab, STORED, HashMap::new()).unwrap();
    assert!(!app.should_process_content(STORED, &tab, URL));

    app.clear_cache().unwrap();
    assert_eq!(app.cache_stats().unwrap().size, 0);
}
