//! Precomputed canonical-phrase embeddings.
//!
//! A rebuild produces a fresh [`CacheSnapshot`] and swaps it in under a short
//! write lock. Readers clone the `Arc` once per call and keep using that
//! snapshot even if a rebuild lands mid-call.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EncoderError;
use crate::intent::types::DefinitionSet;
use crate::services::encoder::{bounded, Encoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandidateKind {
    Intent,
    Macro,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub name: String,
    pub kind: CandidateKind,
    pub phrase: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never built.
    Unbuilt,
    Ready,
    /// No encoder is configured or reachable. Stays this way until the
    /// definitions change again.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub definitions_version: u64,
    pub state: CacheState,
    entries: Vec<CacheEntry>,
}

impl CacheSnapshot {
    fn unbuilt() -> Self {
        Self {
            definitions_version: 0,
            state: CacheState::Unbuilt,
            entries: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == CacheState::Ready
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.phrase.as_str())
    }
}

/// Every non-empty canonical phrase, intents first, in name order.
pub fn canonical_phrases(defs: &DefinitionSet) -> Vec<(String, CandidateKind, String)> {
    let intents = defs
        .intents
        .iter()
        .filter(|(_, i)| !i.canonical.trim().is_empty())
        .map(|(name, i)| (name.clone(), CandidateKind::Intent, i.canonical.trim().to_string()));
    let macros = defs
        .macros
        .iter()
        .filter(|(_, m)| !m.canonical.trim().is_empty())
        .map(|(name, m)| (name.clone(), CandidateKind::Macro, m.canonical.trim().to_string()));
    intents.chain(macros).collect()
}

pub struct EmbeddingCache {
    current: RwLock<Arc<CacheSnapshot>>,
    rebuilding: tokio::sync::Mutex<()>,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheSnapshot::unbuilt())),
            rebuilding: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_ready()
    }

    /// Returns a snapshot matching `defs.version`, rebuilding first if needed.
    pub async fn ensure_current(
        &self,
        defs: &DefinitionSet,
        encoder: &dyn Encoder,
        timeout: Duration,
    ) -> Arc<CacheSnapshot> {
        let snapshot = self.snapshot();
        if snapshot.state != CacheState::Unbuilt && snapshot.definitions_version == defs.version {
            return snapshot;
        }
        self.rebuild(defs, encoder, timeout).await
    }

    /// Encodes every canonical phrase in one batch and swaps in the result.
    ///
    /// A timeout or transport failure is not stored: the caller gets a
    /// not-ready snapshot and the next `ensure_current` tries again.
    pub async fn rebuild(
        &self,
        defs: &DefinitionSet,
        encoder: &dyn Encoder,
        timeout: Duration,
    ) -> Arc<CacheSnapshot> {
        let _guard = self.rebuilding.lock().await;

        // Another caller may have finished the same rebuild while we waited.
        let existing = self.snapshot();
        if existing.state != CacheState::Unbuilt && existing.definitions_version == defs.version {
            return existing;
        }

        let canon = canonical_phrases(defs);
        let phrases: Vec<String> = canon.iter().map(|(_, _, p)| p.clone()).collect();

        let next = if phrases.is_empty() {
            CacheSnapshot {
                definitions_version: defs.version,
                state: CacheState::Ready,
                entries: Vec::new(),
            }
        } else {
            let never = CancellationToken::new();
            match bounded(encoder.encode_batch(&phrases), timeout, &never).await {
                Ok(vectors) if vectors.len() == phrases.len() => CacheSnapshot {
                    definitions_version: defs.version,
                    state: CacheState::Ready,
                    entries: canon
                        .into_iter()
                        .zip(vectors)
                        .map(|((name, kind, phrase), vector)| CacheEntry { name, kind, phrase, vector })
                        .collect(),
                },
                Ok(vectors) => {
                    warn!(expected = phrases.len(), got = vectors.len(), "Encoder returned wrong vector count; semantic tier disabled");
                    Self::unavailable(defs.version)
                }
                Err(EncoderError::Unavailable(reason)) => {
                    warn!("Encoder unavailable: {}. Semantic tier disabled.", reason);
                    Self::unavailable(defs.version)
                }
                Err(e) => {
                    warn!("Embedding cache rebuild failed: {}. Will retry on the next call.", e);
                    return Arc::new(CacheSnapshot {
                        definitions_version: defs.version,
                        ..CacheSnapshot::unbuilt()
                    });
                }
            }
        };

        info!(
            version = defs.version,
            intents = defs.intents.len(),
            canonicals = next.entries.len(),
            ready = next.is_ready(),
            "Embedding cache rebuilt"
        );

        let next = Arc::new(next);
        *self.current.write() = next.clone();
        next
    }

    fn unavailable(version: u64) -> CacheSnapshot {
        CacheSnapshot {
            definitions_version: version,
            state: CacheState::Unavailable,
            entries: Vec::new(),
        }
    }
}

/// Cosine similarity. Vectors of different length or zero norm score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
