use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::intent::types::{DefinitionSet, IntentDefinition};
use crate::kernel::text::{contains_phrase, normalize};
use crate::semantic::cache::{cosine_similarity, CacheSnapshot, CandidateKind, EmbeddingCache};
use crate::services::encoder::{bounded, Encoder};

/// Score given to an exact keyword hit.
pub const KEYWORD_SCORE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub kind: CandidateKind,
    pub score: f32,
}

/// Intents eligible for one call, after context gating and risk filtering.
///
/// Order is: priority system intents, then intents restricted to the current
/// context, then global intents.
pub struct ApplicableSet<'a> {
    intents: Vec<(&'a str, &'a IntentDefinition)>,
    macros: HashSet<&'a str>,
}

impl<'a> ApplicableSet<'a> {
    pub fn compute(defs: &'a DefinitionSet, context: Option<&str>, config: &ResolverConfig) -> Self {
        let allowed = |name: &str| !(config.paranoid_mode && defs.is_high_risk(name));

        let mut restricted = Vec::new();
        let mut global = Vec::new();
        for (name, intent) in &defs.intents {
            if !allowed(name) {
                continue;
            }
            if intent.is_global() {
                global.push((name.as_str(), intent));
            } else if context.map_or(false, |ctx| intent.allows_context(ctx)) {
                restricted.push((name.as_str(), intent));
            }
        }

        let mut ordered: Vec<(&str, &IntentDefinition)> = Vec::new();
        for wanted in &config.priority_intents {
            if let Some(pos) = restricted.iter().position(|(n, _)| n == wanted) {
                ordered.push(restricted.remove(pos));
            } else if let Some(pos) = global.iter().position(|(n, _)| n == wanted) {
                ordered.push(global.remove(pos));
            }
        }
        ordered.extend(restricted);
        ordered.extend(global);

        let macros = defs
            .macros
            .keys()
            .filter(|name| allowed(name))
            .map(String::as_str)
            .collect();

        Self { intents: ordered, macros }
    }

    pub fn contains(&self, name: &str, kind: CandidateKind) -> bool {
        match kind {
            CandidateKind::Intent => self.intents.iter().any(|(n, _)| *n == name),
            CandidateKind::Macro => self.macros.contains(name),
        }
    }

    pub fn intents(&self) -> impl Iterator<Item = (&'a str, &'a IntentDefinition)> + '_ {
        self.intents.iter().copied()
    }
}

/// Ranks intents for free text: exact keywords first, then embedding similarity.
pub struct CandidateClassifier {
    encoder: Arc<dyn Encoder>,
    cache: Arc<EmbeddingCache>,
    timeout: Duration,
}

impl CandidateClassifier {
    pub fn new(encoder: Arc<dyn Encoder>, cache: Arc<EmbeddingCache>, timeout: Duration) -> Self {
        Self { encoder, cache, timeout }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Cache snapshot for `defs`, built on first use.
    pub async fn snapshot(&self, defs: &DefinitionSet) -> Arc<CacheSnapshot> {
        self.cache.ensure_current(defs, self.encoder.as_ref(), self.timeout).await
    }

    /// Rebuilds for `defs` regardless of the cached version.
    pub async fn rebuild(&self, defs: &DefinitionSet) -> Arc<CacheSnapshot> {
        self.cache.rebuild(defs, self.encoder.as_ref(), self.timeout).await
    }

    /// Full ranking: the keyword pass, and the semantic pass if that found nothing.
    pub async fn classify(
        &self,
        text: &str,
        context: Option<&str>,
        defs: &DefinitionSet,
        config: &ResolverConfig,
        cancel: &CancellationToken,
    ) -> Vec<Candidate> {
        let applicable = ApplicableSet::compute(defs, context, config);
        if let Some(hit) = keyword_match(&normalize(text), &applicable) {
            return vec![hit];
        }
        let snapshot = self.snapshot(defs).await;
        self.semantic(text, &applicable, &snapshot, config.top_k, cancel).await
    }

    /// Nearest canonical phrases among applicable intents, best first.
    pub async fn semantic(
        &self,
        text: &str,
        applicable: &ApplicableSet<'_>,
        snapshot: &CacheSnapshot,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Vec<Candidate> {
        if !snapshot.is_ready() || snapshot.entries().is_empty() {
            return Vec::new();
        }

        let query = match bounded(self.encoder.encode(text), self.timeout, cancel).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Query encoding failed, skipping semantic tier for this call: {}", e);
                return Vec::new();
            }
        };

        let mut scored: Vec<Candidate> = snapshot
            .entries()
            .iter()
            .filter(|e| applicable.contains(&e.name, e.kind))
            .map(|e| Candidate {
                name: e.name.clone(),
                kind: e.kind,
                score: cosine_similarity(&query, &e.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        scored.truncate(top_k);
        debug!(?scored, "Semantic candidates");
        scored
    }
}

/// First applicable intent with a keyword present as a whole word.
pub fn keyword_match(normalized: &str, applicable: &ApplicableSet<'_>) -> Option<Candidate> {
    for (name, intent) in applicable.intents() {
        for keyword in &intent.keywords {
            let keyword = normalize(keyword);
            if contains_phrase(normalized, &keyword) {
                debug!(intent = name, keyword = %keyword, "Keyword match");
                return Some(Candidate {
                    name: name.to_string(),
                    kind: CandidateKind::Intent,
                    score: KEYWORD_SCORE,
                });
            }
        }
    }
    None
}
