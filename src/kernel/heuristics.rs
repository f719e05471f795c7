//! Local-item vs web-navigation routing.
//!
//! "open downloads" and "open youtube" have the same shape. The local check
//! runs first and claims anything that names a folder or a known app; only
//! then may the web check claim the utterance.

use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::HeuristicsConfig;
use crate::intent::types::{OPEN_LOCAL_ITEM, SEARCH_AND_NAVIGATE, SEARCH_WEB};
use crate::kernel::extractor::{extract, MatchMode};
use crate::kernel::text::{contains_phrase, normalize, starts_with_phrase, words};
use crate::services::lexicon::Lexicon;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicHit {
    pub intent: &'static str,
    pub entity: String,
}

pub struct Heuristics {
    config: HeuristicsConfig,
    local_verbs: Vec<String>,
    navigation_verbs: Vec<String>,
    domain: Option<Regex>,
    on_site: Option<Regex>,
}

fn longest_first(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = items.iter().map(|s| normalize(s)).filter(|s| !s.is_empty()).collect();
    out.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    out
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Heuristic pattern rejected, check disabled: {}", e);
            None
        }
    }
}

impl Heuristics {
    pub fn new(config: &HeuristicsConfig) -> Self {
        let suffixes: Vec<String> = config.domain_suffixes.iter().map(|s| regex::escape(&normalize(s))).collect();
        let domain = if suffixes.is_empty() {
            None
        } else {
            compile(&format!(r"\b[a-z0-9][a-z0-9-]*(\.[a-z0-9-]+)*\.({})\b", suffixes.join("|")))
        };
        Self {
            local_verbs: longest_first(&config.local_verbs),
            navigation_verbs: longest_first(&config.navigation_verbs),
            domain,
            on_site: compile(r"^(.+?)\s+on\s+(.+)$"),
            config: config.clone(),
        }
    }

    /// Runs the local check, then the web check.
    pub fn route(&self, text: &str, lexicon: &Lexicon, sites: &BTreeMap<String, String>) -> Option<HeuristicHit> {
        let hit = self
            .local_item(text, lexicon)
            .or_else(|| self.web_navigation(text, sites));
        if let Some(h) = &hit {
            debug!(intent = h.intent, entity = %h.entity, "Heuristic match");
        }
        hit
    }

    fn strip_verb<'v>(normalized: &'v str, verbs: &[String]) -> Option<&'v str> {
        verbs
            .iter()
            .find(|v| starts_with_phrase(normalized, v))
            .map(|v| normalized[v.len()..].trim_start())
    }

    fn is_stop_word(&self, word: &str) -> bool {
        self.config.stop_words.iter().any(|s| s == word)
    }

    /// Claims utterances naming a folder or a lexicon entry.
    ///
    /// Only considered when the utterance opens with a local verb or consists
    /// of nothing but the item itself, so "search for music theory" and
    /// "delete the temp folder" are left alone.
    pub fn local_item(&self, text: &str, lexicon: &Lexicon) -> Option<HeuristicHit> {
        let normalized = normalize(text);
        let (remainder, bare) = match Self::strip_verb(&normalized, &self.local_verbs) {
            Some(rest) => (rest, false),
            None => (normalized.as_str(), true),
        };
        if remainder.is_empty() {
            return None;
        }

        let entity = self
            .lexicon_match(remainder, lexicon)
            .or_else(|| self.folder_noun_match(remainder, bare))?;
        if bare && normalize(&entity) != self.without_stop_words(remainder) {
            return None;
        }
        Some(HeuristicHit { intent: OPEN_LOCAL_ITEM, entity })
    }

    fn without_stop_words(&self, text: &str) -> String {
        words(text)
            .into_iter()
            .filter(|w| !self.is_stop_word(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn lexicon_match(&self, remainder: &str, lexicon: &Lexicon) -> Option<String> {
        // Whole entries first, longest wins ("visual studio code" over "code").
        let mut phrase_hits: Vec<&str> = lexicon.entries().filter(|e| !e.is_empty() && contains_phrase(remainder, e)).collect();
        phrase_hits.sort_by(|a, b| b.len().cmp(&a.len()));
        if let Some(best) = phrase_hits.first() {
            return Some(best.to_string());
        }

        let min = self.config.min_word_len;
        for word in words(remainder) {
            if word.len() < min || self.is_stop_word(word) {
                continue;
            }
            if let Some(entry) = lexicon
                .entries()
                .find(|e| e.len() >= min && (e.contains(word) || word.contains(*e)))
            {
                return Some(entry.to_string());
            }
        }
        None
    }

    fn folder_noun_match(&self, remainder: &str, bare: bool) -> Option<String> {
        let noun = self
            .config
            .folder_nouns
            .iter()
            .map(|n| normalize(n))
            .find(|n| contains_phrase(remainder, n))?;
        // A generic noun ("folder") points at whatever precedes it, which
        // without a local verb could just as well be some other action.
        if matches!(noun.as_str(), "folder" | "directory") {
            if bare {
                return None;
            }
            let described = self.without_stop_words(remainder);
            return (!described.is_empty()).then_some(described);
        }
        Some(noun)
    }

    /// Claims navigation verbs, domains, aliases, and "<query> on <site>".
    pub fn web_navigation(&self, text: &str, sites: &BTreeMap<String, String>) -> Option<HeuristicHit> {
        let normalized = normalize(text);
        let site_keys: Vec<String> = sites.keys().map(|k| normalize(k)).filter(|k| !k.is_empty()).collect();

        let query = extract(text, &self.navigation_verbs, MatchMode::Prefix);
        let has_verb = Self::strip_verb(&normalized, &self.navigation_verbs).is_some();
        if has_verb && query.is_none() {
            // A bare "open" or "search" carries nothing to look for.
            return None;
        }

        let mentions_domain = self.domain.as_ref().map_or(false, |re| re.is_match(&normalized));
        let starts_with_alias = site_keys.iter().any(|k| starts_with_phrase(&normalized, k));
        let mentions_site = site_keys.iter().any(|k| contains_phrase(&normalized, k));
        let on_known_site = self
            .on_site
            .as_ref()
            .and_then(|re| re.captures(&normalized))
            .and_then(|caps| caps.get(2))
            .map_or(false, |site| site_keys.iter().any(|k| k == site.as_str().trim()));

        let site_signal = mentions_domain || starts_with_alias || mentions_site || on_known_site;
        if !has_verb && !site_signal {
            return None;
        }

        let entity = query.unwrap_or_else(|| text.trim().to_string());
        let intent = if site_signal { SEARCH_AND_NAVIGATE } else { SEARCH_WEB };
        Some(HeuristicHit { intent, entity })
    }
}
