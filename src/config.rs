use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Tuning for the resolver cascade. Every field has a default, so a config
/// file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Top candidate at or above this dispatches outright.
    pub high_confidence: f32,
    /// Top two candidates closer than this trigger a clarification question.
    pub ambiguity_margin: f32,
    /// Below this the resolver abstains.
    pub min_confidence: f32,
    pub top_k: usize,
    pub memory_ttl_ms: u64,
    pub conversation_ttl_ms: u64,
    pub encoder_timeout_ms: u64,
    /// Suppresses every high-risk intent on every path.
    pub paranoid_mode: bool,
    /// Intents checked before all others in the keyword pass.
    pub priority_intents: Vec<String>,
    pub code_generation_keywords: Vec<String>,
    pub follow_up_cues: Vec<String>,
    /// Longest utterance an unmatched cue may still turn into a follow-up.
    pub follow_up_max_words: usize,
    pub cancel_phrases: Vec<String>,
    pub heuristics: HeuristicsConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            high_confidence: 0.70,
            ambiguity_margin: 0.15,
            min_confidence: 0.40,
            top_k: 3,
            memory_ttl_ms: 30_000,
            conversation_ttl_ms: 60_000,
            encoder_timeout_ms: 1_500,
            paranoid_mode: false,
            priority_intents: strings(&[
                "GET_SYSTEM_STATS",
                "STOP_ACTION",
                "OPEN_PROJECT_FOLDER",
                "ANALYZE_SCREEN",
            ]),
            code_generation_keywords: strings(&[
                "write code",
                "write a script",
                "write a program",
                "write a function",
                "generate code",
                "code for",
                "script that",
                "program that",
                "function that",
            ]),
            follow_up_cues: strings(&[
                "it",
                "that",
                "this",
                "again",
                "the same",
                "the first one",
                "the second one",
                "the last one",
            ]),
            follow_up_max_words: 4,
            cancel_phrases: strings(&["cancel", "never mind", "nevermind", "forget it", "stop"]),
            heuristics: HeuristicsConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.min_confidence) || !in_unit(self.high_confidence) {
            return Err(ConfigError::Thresholds("confidences must lie in 0.0..=1.0".into()));
        }
        if self.min_confidence > self.high_confidence {
            return Err(ConfigError::Thresholds(format!(
                "min_confidence {} exceeds high_confidence {}",
                self.min_confidence, self.high_confidence
            )));
        }
        if !in_unit(self.ambiguity_margin) {
            return Err(ConfigError::Thresholds("ambiguity_margin must lie in 0.0..=1.0".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Thresholds("top_k must be at least 1".into()));
        }
        Ok(())
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_millis(self.memory_ttl_ms)
    }

    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_millis(self.conversation_ttl_ms)
    }

    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_millis(self.encoder_timeout_ms)
    }
}

/// Word lists driving the local-item and web-navigation checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    pub folder_nouns: Vec<String>,
    /// Leading verbs stripped before looking for a local item.
    pub local_verbs: Vec<String>,
    pub navigation_verbs: Vec<String>,
    /// Words too common to count as a lexicon match on their own.
    pub stop_words: Vec<String>,
    pub domain_suffixes: Vec<String>,
    /// Shortest word that may substring-match a lexicon entry.
    pub min_word_len: usize,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            folder_nouns: strings(&[
                "folder",
                "directory",
                "downloads",
                "documents",
                "desktop",
                "pictures",
                "music",
                "videos",
            ]),
            local_verbs: strings(&["open", "launch", "start", "run", "show", "go to"]),
            navigation_verbs: strings(&[
                "open",
                "go to",
                "search for",
                "search",
                "find",
                "look up",
                "google",
                "show me",
            ]),
            stop_words: strings(&[
                "the", "a", "an", "my", "me", "to", "for", "on", "in", "of", "and", "please",
                "up", "it", "that", "this", "app", "file", "some", "with", "new",
            ]),
            domain_suffixes: strings(&["com", "org", "net", "io", "dev", "ai", "edu", "gov", "co", "app", "in", "uk"]),
            min_word_len: 4,
        }
    }
}
