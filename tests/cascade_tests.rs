mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use intent_engine::config::ResolverConfig;
use intent_engine::intent::types::{DefinitionSet, EntityKey, IntentDefinition};
use intent_engine::kernel::result::ConfidenceTier;
use tokio_util::sync::CancellationToken;

const DEFINITIONS: &str = r#"{
    "intents": {
        "VOLUME_UP": { "canonical": "increase the volume" },
        "VOLUME_DOWN": { "canonical": "decrease the volume" },
        "PLAY_MUSIC": { "keywords": ["play"], "triggers": ["play"], "canonical": "play some music" },
        "TAKE_SCREENSHOT": { "canonical": "capture the screen" },
        "GET_SYSTEM_STATS": { "keywords": ["system stats"] }
    },
    "macros": {
        "focus mode": [ { "action": "OPEN_APP", "param": "notion" } ]
    },
    "sites": {
        "leetcode": "https://leetcode.com",
        "youtube": "https://youtube.com"
    }
}"#;

fn table() -> TableEncoder {
    TableEncoder::new()
        .with("increase the volume", axis(0))
        .with("decrease the volume", axis(1))
        .with("play some music", axis(2))
        .with("capture the screen", axis(3))
        .with("pump up the sound", scoring(&[0.92, 0.1]))
        .with("adjust the sound", scoring(&[0.6, 0.55]))
        .with("snap my display", scoring(&[0.0, 0.0, 0.0, 0.5]))
        .with("ponder the universe deeply", scoring(&[0.3, 0.05]))
}

fn semantic_harness() -> (Harness, Arc<TableEncoder>) {
    let encoder = Arc::new(table());
    let shared = encoder.clone();
    let h = harness(definitions(DEFINITIONS), ResolverConfig::default(), move |d| d.with_encoder(shared));
    (h, encoder)
}

#[tokio::test]
async fn test_macro_name_matches_without_encoder() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    let result = h.resolver.process("  Focus   MODE ", None).await;

    assert_eq!(tag(&result), Some("[FOCUS_MODE]"));
    assert_eq!(result.entities, None);
    assert_eq!(result.prompt, None);
    assert!(h.resolver.remembered().is_none(), "Macros never write memory");
}

#[tokio::test]
async fn test_keyword_match_extracts_trigger_entity() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    let result = h.resolver.process("play some jazz", None).await;

    assert_eq!(tag(&result), Some("[PLAY_MUSIC]"));
    assert_eq!(entity(&result, EntityKey::Entity), Some("some jazz"));
    let remembered = h.resolver.remembered().expect("entities should be remembered");
    assert_eq!(remembered.intent.as_str(), "[PLAY_MUSIC]");
}

#[tokio::test]
async fn test_keyword_without_trigger_text_has_no_entities() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    let result = h.resolver.process("show me system stats", None).await;

    assert_eq!(tag(&result), Some("[GET_SYSTEM_STATS]"));
    assert_eq!(result.entities, None);
}

#[tokio::test]
async fn test_open_downloads_is_local_item() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| {
        d.with_lexicon(lexicon(&[], &["downloads"]))
    });

    let result = h.resolver.process("open downloads", None).await;

    assert_eq!(tag(&result), Some("[OPEN_LOCAL_ITEM]"));
    assert_eq!(entity(&result, EntityKey::Entity), Some("downloads"));
    assert_eq!(result.prompt, None);
}

#[tokio::test]
async fn test_search_on_known_site_navigates() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    let result = h.resolver.process("search for two sum on leetcode", None).await;

    assert_eq!(tag(&result), Some("[SEARCH_AND_NAVIGATE]"));
    assert_eq!(entity(&result, EntityKey::Entity), Some("two sum on leetcode"));
    assert_eq!(result.prompt, None);
}

#[tokio::test]
async fn test_search_without_site_is_plain_web_search() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    let result = h.resolver.process("look up the borrow checker", None).await;

    assert_eq!(tag(&result), Some("[SEARCH_WEB]"));
    assert_eq!(entity(&result, EntityKey::Entity), Some("the borrow checker"));
}

#[tokio::test]
async fn test_high_confidence_dispatches() {
    let (mut h, _) = semantic_harness();

    let result = h.resolver.process("pump up the sound", None).await;

    assert_eq!(tag(&result), Some("[VOLUME_UP]"));
    assert_eq!(h.resolver.telemetry.last().map(|r| r.tier), Some(ConfidenceTier::HighConfidence));
}

#[tokio::test]
async fn test_close_scores_ask_instead_of_dispatching() {
    let (mut h, _) = semantic_harness();

    let result = h.resolver.process("adjust the sound", None).await;

    assert_eq!(result.intent, None);
    assert_eq!(result.entities, None);
    assert_eq!(result.prompt.as_deref(), Some("Did you mean volume up, or volume down?"));
    assert_eq!(h.resolver.session().state_name(), Some("AWAITING_AMBIGUITY_RESOLUTION"));
}

#[tokio::test]
async fn test_clear_but_modest_lead_dispatches_low_confidence() {
    let (mut h, _) = semantic_harness();

    let result = h.resolver.process("snap my display", None).await;

    assert_eq!(tag(&result), Some("[TAKE_SCREENSHOT]"));
    assert_eq!(h.resolver.telemetry.last().map(|r| r.tier), Some(ConfidenceTier::LowConfidence));
}

#[tokio::test]
async fn test_below_minimum_abstains_with_query() {
    let (mut h, _) = semantic_harness();

    let result = h.resolver.process("ponder the universe deeply", None).await;

    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));
    assert_eq!(entity(&result, EntityKey::Query), Some("ponder the universe deeply"));
    assert!(h.resolver.remembered().is_none(), "Fallback tags never write memory");
}

#[tokio::test]
async fn test_encoder_unavailable_falls_back_to_dynamic_task() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);
    let text = "summarize yesterday's meeting notes for the team";

    let result = h.resolver.process(text, None).await;

    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));
    assert_eq!(entity(&result, EntityKey::Query), Some(text));
    assert_eq!(result.prompt, None);
    assert!(!h.resolver.cache().is_ready());
}

#[tokio::test]
async fn test_code_requests_go_to_write_code() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);
    let text = "write a script that renames my photos";

    let result = h.resolver.process(text, None).await;

    assert_eq!(tag(&result), Some("[WRITE_CODE]"));
    assert_eq!(entity(&result, EntityKey::Query), Some(text));
}

#[tokio::test]
async fn test_follow_up_reuses_entities_within_ttl() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| {
        d.with_lexicon(lexicon(&[], &["downloads"]))
    });

    h.resolver.process("open downloads", None).await;
    h.clock.advance(Duration::from_secs(10));
    let result = h.resolver.process("open it again", None).await;

    assert_eq!(tag(&result), Some("[OPEN_LOCAL_ITEM]"));
    assert_eq!(entity(&result, EntityKey::Entity), Some("downloads"));
    assert_eq!(h.resolver.telemetry.last().map(|r| r.tier), Some(ConfidenceTier::FollowUp));
}

#[tokio::test]
async fn test_follow_up_after_memory_ttl_is_not_reused() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| {
        d.with_lexicon(lexicon(&[], &["downloads"]))
    });

    h.resolver.process("open downloads", None).await;
    h.clock.advance(Duration::from_secs(31));
    let result = h.resolver.process("open it again", None).await;

    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));
    assert!(h.resolver.remembered().is_none());
}

#[tokio::test]
async fn test_keyword_follow_up_does_not_store_the_cue_as_entity() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    h.resolver.process("play some jazz", None).await;
    let result = h.resolver.process("play it again", None).await;

    assert_eq!(tag(&result), Some("[PLAY_MUSIC]"));
    assert_eq!(entity(&result, EntityKey::Entity), Some("some jazz"));
}

#[tokio::test]
async fn test_slow_encoder_degrades_to_abstention() {
    let encoder = Arc::new(SlowEncoder {
        inner: table(),
        delay: Duration::from_millis(500),
    });
    let config = ResolverConfig { encoder_timeout_ms: 50, ..ResolverConfig::default() };
    let mut h = harness(definitions(DEFINITIONS), config, move |d| d.with_encoder(encoder));

    let result = h.resolver.process("pump up the sound", None).await;

    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));
    assert!(h.resolver.cache().is_ready(), "Only the query timed out; the cache stays usable");
}

#[tokio::test]
async fn test_cancelled_call_skips_semantic_tier() {
    let (mut h, _) = semantic_harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h.resolver.process_with_cancel("pump up the sound", None, &cancel).await;
    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));

    // The next call is unaffected.
    let result = h.resolver.process("pump up the sound", None).await;
    assert_eq!(tag(&result), Some("[VOLUME_UP]"));
}

#[tokio::test]
async fn test_definition_change_rebuilds_cache_once() {
    let encoder = Arc::new(
        table()
            .with("silence the audio", axis(6))
            .with("hush everything", scoring(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.95])),
    );
    let shared = encoder.clone();
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), move |d| d.with_encoder(shared));

    // 1. First semantic lookup builds the cache lazily
    assert_eq!(tag(&h.resolver.process("pump up the sound", None).await), Some("[VOLUME_UP]"));
    assert_eq!(encoder.batches(), 1);

    // 2. A new intent arrives through the store
    h.store.upsert_intent(
        "MUTE",
        IntentDefinition { canonical: "silence the audio".to_string(), ..IntentDefinition::default() },
    );
    let result = h.resolver.process("hush everything", None).await;
    assert_eq!(tag(&result), Some("[MUTE]"));
    assert_eq!(encoder.batches(), 2);

    // 3. No further change, no further rebuild
    h.resolver.process("pump up the sound", None).await;
    assert_eq!(encoder.batches(), 2);
}

#[tokio::test]
async fn test_empty_definitions_still_abstain() {
    let mut h = harness(DefinitionSet::default(), ResolverConfig::default(), |d| d.with_encoder(Arc::new(table())));

    let result = h.resolver.process("ponder the universe deeply", None).await;

    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));
    assert!(h.resolver.cache().is_ready(), "An empty phrase set is a valid, empty cache");
}

#[tokio::test]
async fn test_blank_input_resolves_to_nothing() {
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), |d| d);

    let result = h.resolver.process("   ", None).await;

    assert_eq!(result, Default::default());
}

const RISKY: &str = r#"{
    "intents": {
        "DELETE_FILES": { "keywords": ["wipe"], "is_high_risk": true },
        "OPEN_LOCAL_ITEM": { "is_high_risk": true },
        "WRITE_CODE": { "is_high_risk": true }
    },
    "macros": {
        "deploy": { "steps": [ { "action": "TYPE_TEXT", "param": "make deploy" } ], "is_high_risk": true }
    }
}"#;

#[tokio::test]
async fn test_paranoid_mode_suppresses_every_high_risk_path() {
    let config = ResolverConfig { paranoid_mode: true, ..ResolverConfig::default() };
    let mut h = harness(definitions(RISKY), config, |d| d.with_lexicon(lexicon(&[], &["downloads"])));

    // 1. Macro by name
    let result = h.resolver.process("deploy", None).await;
    assert_ne!(tag(&result), Some("[DEPLOY]"));

    // 2. Keyword
    let result = h.resolver.process("wipe everything", None).await;
    assert_ne!(tag(&result), Some("[DELETE_FILES]"));

    // 3. Local-item heuristic
    let result = h.resolver.process("open downloads", None).await;
    assert_ne!(tag(&result), Some("[OPEN_LOCAL_ITEM]"));

    // 4. Code fallback degrades to the general planner
    let result = h.resolver.process("write a script that renames my photos", None).await;
    assert_eq!(tag(&result), Some("[EXECUTE_DYNAMIC_TASK]"));
}

#[tokio::test]
async fn test_same_risky_definitions_dispatch_when_relaxed() {
    let mut h = harness(definitions(RISKY), ResolverConfig::default(), |d| d);

    assert_eq!(tag(&h.resolver.process("deploy", None).await), Some("[DEPLOY]"));
    assert_eq!(tag(&h.resolver.process("wipe everything", None).await), Some("[DELETE_FILES]"));
}

#[tokio::test]
async fn test_slow_cache_build_is_retried_on_next_call() {
    let encoder = Arc::new(StallOnceEncoder::new(table(), Duration::from_millis(300)));
    let shared = encoder.clone();
    let config = ResolverConfig { encoder_timeout_ms: 50, ..ResolverConfig::default() };
    let mut h = harness(definitions(DEFINITIONS), config, move |d| d.with_encoder(shared));

    // 1. The first build times out; this call alone loses the semantic tier
    let first = h.resolver.process("pump up the sound", None).await;
    assert_eq!(tag(&first), Some("[EXECUTE_DYNAMIC_TASK]"));
    assert!(!h.resolver.cache().is_ready());

    // 2. The next call builds again and matches
    let second = h.resolver.process("pump up the sound", None).await;
    assert_eq!(tag(&second), Some("[VOLUME_UP]"), "A timed-out build must not disable the cache");
    assert_eq!(encoder.attempts(), 2);

    // 3. Once ready, no further builds
    h.resolver.process("pump up the sound", None).await;
    assert_eq!(encoder.attempts(), 2);
}

#[tokio::test]
async fn test_unavailable_encoder_is_not_retried() {
    let encoder = Arc::new(TableEncoder::new());
    let shared = encoder.clone();
    let mut h = harness(definitions(DEFINITIONS), ResolverConfig::default(), move |d| d.with_encoder(shared));

    h.resolver.process("pump up the sound", None).await;
    h.resolver.process("pump up the sound", None).await;

    assert_eq!(encoder.batches(), 1, "An unavailable encoder stays off until definitions change");
}
