mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use intent_engine::config::ResolverConfig;
use intent_engine::intent::types::MacroDefinition;
use intent_engine::semantic::{ApplicableSet, CandidateClassifier, CandidateKind, EmbeddingCache};
use intent_engine::semantic::cache::CacheState;
use intent_engine::semantic::classifier::{keyword_match, KEYWORD_SCORE};
use intent_engine::services::encoder::UnavailableEncoder;
use tokio_util::sync::CancellationToken;

const DEFINITIONS: &str = r#"{
    "intents": {
        "CLOSE_TAB_CHROME": { "canonical": "close the tab", "contexts": ["chrome.exe"], "keywords": ["close tab"] },
        "CLOSE_WINDOW": { "canonical": "close the window", "keywords": ["close"] },
        "STOP_ACTION": { "keywords": ["close"] },
        "DELETE_FILES": { "canonical": "delete my files", "is_high_risk": true }
    },
    "macros": {
        "morning routine": { "steps": [ { "action": "OPEN_URL", "param": "https://news.example" } ], "canonical": "start my day" }
    }
}"#;

fn encoder() -> TableEncoder {
    TableEncoder::new()
        .with("close the tab", axis(0))
        .with("close the window", axis(1))
        .with("delete my files", axis(2))
        .with("start my day", axis(3))
        .with("dismiss the current page", scoring(&[0.95, 0.2]))
        .with("get the day going", scoring(&[0.0, 0.1, 0.0, 0.9]))
        .with("erase my documents", scoring(&[0.0, 0.0, 0.9]))
}

fn classifier() -> CandidateClassifier {
    CandidateClassifier::new(Arc::new(encoder()), Arc::new(EmbeddingCache::new()), Duration::from_secs(1))
}

#[tokio::test]
async fn test_restricted_intent_never_offered_outside_its_context() {
    let defs = definitions(DEFINITIONS);
    let config = ResolverConfig::default();
    let classifier = classifier();
    let never = CancellationToken::new();
    let snapshot = classifier.snapshot(&defs).await;

    let applicable = ApplicableSet::compute(&defs, Some("notepad.exe"), &config);
    let ranked = classifier.semantic("dismiss the current page", &applicable, &snapshot, 3, &never).await;
    assert!(
        ranked.iter().all(|c| c.name != "CLOSE_TAB_CHROME"),
        "Closest vector must still be gated out: {:?}",
        ranked
    );

    let applicable = ApplicableSet::compute(&defs, Some("Chrome.exe"), &config);
    let ranked = classifier.semantic("dismiss the current page", &applicable, &snapshot, 3, &never).await;
    assert_eq!(ranked[0].name, "CLOSE_TAB_CHROME");
}

#[tokio::test]
async fn test_no_context_means_global_intents_only() {
    let defs = definitions(DEFINITIONS);
    let applicable = ApplicableSet::compute(&defs, None, &ResolverConfig::default());

    assert!(!applicable.contains("CLOSE_TAB_CHROME", CandidateKind::Intent));
    assert!(applicable.contains("CLOSE_WINDOW", CandidateKind::Intent));
    assert!(applicable.contains("morning routine", CandidateKind::Macro));
}

#[test]
fn test_priority_intents_win_keyword_ties() {
    let defs = definitions(DEFINITIONS);
    let applicable = ApplicableSet::compute(&defs, None, &ResolverConfig::default());

    // Both CLOSE_WINDOW and STOP_ACTION list "close"; STOP_ACTION is a priority intent.
    let hit = keyword_match("close", &applicable).expect("keyword should match");
    assert_eq!(hit.name, "STOP_ACTION");
    assert_eq!(hit.score, KEYWORD_SCORE);
}

#[test]
fn test_context_intents_checked_before_global_ones() {
    let defs = definitions(DEFINITIONS);
    let config = ResolverConfig { priority_intents: Vec::new(), ..ResolverConfig::default() };
    let applicable = ApplicableSet::compute(&defs, Some("chrome.exe"), &config);

    let names: Vec<&str> = applicable.intents().map(|(n, _)| n).collect();
    assert_eq!(names[0], "CLOSE_TAB_CHROME");
}

#[test]
fn test_keywords_match_whole_words_only() {
    let defs = definitions(DEFINITIONS);
    let applicable = ApplicableSet::compute(&defs, None, &ResolverConfig::default());

    assert!(keyword_match("the door is closed", &applicable).is_none());
}

#[tokio::test]
async fn test_paranoid_mode_drops_high_risk_candidates() {
    let defs = definitions(DEFINITIONS);
    let classifier = classifier();
    let never = CancellationToken::new();
    let snapshot = classifier.snapshot(&defs).await;

    let relaxed = ApplicableSet::compute(&defs, None, &ResolverConfig::default());
    let ranked = classifier.semantic("erase my documents", &relaxed, &snapshot, 3, &never).await;
    assert_eq!(ranked[0].name, "DELETE_FILES");

    let config = ResolverConfig { paranoid_mode: true, ..ResolverConfig::default() };
    let strict = ApplicableSet::compute(&defs, None, &config);
    let ranked = classifier.semantic("erase my documents", &strict, &snapshot, 3, &never).await;
    assert!(ranked.iter().all(|c| c.name != "DELETE_FILES"));
}

#[tokio::test]
async fn test_macros_compete_with_intents_semantically() {
    let defs = definitions(DEFINITIONS);
    let classifier = classifier();
    let applicable = ApplicableSet::compute(&defs, None, &ResolverConfig::default());
    let snapshot = classifier.snapshot(&defs).await;

    let ranked = classifier
        .semantic("get the day going", &applicable, &snapshot, 2, &CancellationToken::new())
        .await;

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].name, "morning routine");
    assert_eq!(ranked[0].kind, CandidateKind::Macro);
    assert!(ranked[0].score > ranked[1].score);
}

#[tokio::test]
async fn test_cache_marks_itself_unavailable_on_encoder_failure() {
    let defs = definitions(DEFINITIONS);
    let cache = EmbeddingCache::new();

    let snapshot = cache.ensure_current(&defs, &UnavailableEncoder, Duration::from_secs(1)).await;

    assert_eq!(snapshot.state, CacheState::Unavailable);
    assert!(snapshot.entries().is_empty());
}

#[tokio::test]
async fn test_readers_keep_their_snapshot_across_rebuild() {
    let mut defs = definitions(DEFINITIONS);
    defs.version = 1;
    let cache = EmbeddingCache::new();
    let table = encoder().with("wind down", axis(4));

    let before = cache.ensure_current(&defs, &table, Duration::from_secs(1)).await;
    let held = cache.snapshot();

    defs.version = 2;
    defs.macros.insert(
        "evening".to_string(),
        MacroDefinition { canonical: "wind down".to_string(), ..MacroDefinition::default() },
    );
    let after = cache.ensure_current(&defs, &table, Duration::from_secs(1)).await;

    assert_eq!(held.definitions_version, 1);
    assert_eq!(held.entries().len(), before.entries().len());
    assert_eq!(after.definitions_version, 2);
    assert_eq!(after.entries().len(), before.entries().len() + 1);
    assert!(held.phrases().all(|p| p != "wind down"));
}

#[tokio::test]
async fn test_classify_short_circuits_on_keyword() {
    let defs = definitions(DEFINITIONS);
    let classifier = classifier();
    let config = ResolverConfig::default();

    let ranked = classifier
        .classify("close tab please", Some("chrome.exe"), &defs, &config, &CancellationToken::new())
        .await;

    assert_eq!(ranked.len(), 1, "A keyword hit is the only candidate: {:?}", ranked);
    assert_eq!(ranked[0].score, KEYWORD_SCORE);
    assert!(!classifier.cache().snapshot().is_ready(), "Keyword hits never touch the encoder");
}

#[tokio::test]
async fn test_classify_gates_by_context() {
    let defs = definitions(DEFINITIONS);
    let classifier = classifier();
    let config = ResolverConfig::default();
    let never = CancellationToken::new();

    // 1. Outside chrome the tab intent cannot appear, however close its vector
    let ranked = classifier
        .classify("dismiss the current page", Some("notepad.exe"), &defs, &config, &never)
        .await;
    assert!(!ranked.is_empty());
    assert!(ranked.iter().all(|c| c.name != "CLOSE_TAB_CHROME"), "Gated intent leaked: {:?}", ranked);

    // 2. Inside chrome it wins
    let ranked = classifier
        .classify("dismiss the current page", Some("chrome.exe"), &defs, &config, &never)
        .await;
    assert_eq!(ranked[0].name, "CLOSE_TAB_CHROME");
}
