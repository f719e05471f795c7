use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use intent_engine::config::ResolverConfig;
use intent_engine::intent::store::{DefinitionStore, JsonDefinitionStore};
use intent_engine::kernel::resolver::{Collaborators, Resolver};
use intent_engine::outputs::{ActionTable, Route};
use intent_engine::services::encoder::HttpEncoder;
use intent_engine::services::lexicon::{Lexicon, SharedLexicon};
use intent_engine::services::recognizer::HttpRecognizer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

fn list_env(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn load_config() -> ResolverConfig {
    let Ok(path) = std::env::var("INTENT_CONFIG") else {
        return ResolverConfig::default();
    };
    match ResolverConfig::from_json_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Could not load config from {}: {}. Using defaults.", path, e);
            ResolverConfig::default()
        }
    }
}

/// `chrome.exe> close tab` sets the foreground app. The prefix must be a
/// single token, so "is 5 > 3" stays an utterance.
fn split_context(line: &str) -> (Option<&str>, &str) {
    match line.split_once("> ") {
        Some((ctx, rest)) if !ctx.is_empty() && !ctx.contains(char::is_whitespace) => (Some(ctx), rest.trim()),
        _ => (None, line),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    // 2. Collaborators
    let definitions_path = std::env::args().nth(1).unwrap_or_else(|| "definitions.json".to_string());
    let store = Arc::new(JsonDefinitionStore::open(&definitions_path));
    let lexicon = Arc::new(SharedLexicon::new(Lexicon::new(list_env("LEXICON_APPS"), list_env("LEXICON_FOLDERS"))));

    let mut deps = Collaborators::new(store.clone()).with_lexicon(lexicon);
    if let Ok(url) = std::env::var("ENCODER_URL") {
        deps = deps.with_encoder(Arc::new(HttpEncoder::new(url, SERVICE_TIMEOUT)));
    }
    if let Ok(url) = std::env::var("NER_URL") {
        deps = deps.with_recognizer(Arc::new(HttpRecognizer::new(url, SERVICE_TIMEOUT)));
    }

    let config = load_config();
    let mut resolver = Resolver::new(config, deps);
    let ready = resolver.warm_up().await;
    tracing::info!(definitions = %definitions_path, semantic = ready, "Intent engine ready");

    // 3. Input loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a command. Prefix with 'app.exe> ' to set the foreground app, ':reload' to reread definitions.");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":reload" {
            let changed = store.reload();
            println!("reload: {}", if changed { "definitions updated" } else { "no changes" });
            continue;
        }

        let (context, text) = split_context(line);

        let result = resolver.process(text, context).await;
        let actions = ActionTable::builtin().with_definitions(&store.definitions());
        match actions.route(&result) {
            Ok(Route::Idle) => {}
            Ok(Route::Speak(prompt)) => println!("< {}", prompt),
            Ok(route) => {
                println!("> {:?}", route);
                if let Some(prompt) = &result.prompt {
                    println!("< {}", prompt);
                }
            }
            Err(e) => tracing::warn!("Could not dispatch {:?}: {}", result.intent, e),
        }
    }

    let snapshot = resolver.telemetry.snapshot();
    tracing::info!(
        total = snapshot.total,
        abstention_rate = snapshot.abstention_rate,
        accuracy = snapshot.accuracy,
        "Session summary"
    );
    Ok(())
}
