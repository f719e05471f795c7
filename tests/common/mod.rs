#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use intent_engine::config::ResolverConfig;
use intent_engine::error::{EncoderError, RecognizerError};
use intent_engine::intent::store::{parse_definitions, MemoryDefinitionStore};
use intent_engine::intent::types::{DefinitionSet, EntityKey};
use intent_engine::kernel::resolver::{Collaborators, Resolver};
use intent_engine::kernel::result::ResolutionResult;
use intent_engine::kernel::text::normalize;
use intent_engine::kernel::time::ManualClock;
use intent_engine::services::encoder::Encoder;
use intent_engine::services::lexicon::{Lexicon, SharedLexicon};
use intent_engine::services::recognizer::{EntityRecognizer, LabeledSpans};

pub const DIM: usize = 8;

/// Unit vector along axis `i`.
pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

/// A unit vector whose cosine with `axis(i)` is `scores[i]`. The last axis
/// absorbs the remainder, so `scores` must leave it unused.
pub fn scoring(scores: &[f32]) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    let mut used = 0.0;
    for (i, s) in scores.iter().enumerate() {
        v[i] = *s;
        used += s * s;
    }
    v[DIM - 1] = (1.0 - used).max(0.0).sqrt();
    v
}

/// Encoder backed by a phrase -> vector table. Unknown phrases fail.
#[derive(Default)]
pub struct TableEncoder {
    table: HashMap<String, Vec<f32>>,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl TableEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, phrase: &str, vector: Vec<f32>) -> Self {
        self.table.insert(normalize(phrase), vector);
        self
    }

    pub fn batches(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        self.table
            .get(&normalize(text))
            .cloned()
            .ok_or_else(|| EncoderError::Unavailable(format!("no vector for '{}'", text)))
    }
}

#[async_trait]
impl Encoder for TableEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(text)
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| self.lookup(t)).collect()
    }
}

/// Answers batch requests but stalls on single queries.
pub struct SlowEncoder {
    pub inner: TableEncoder,
    pub delay: Duration,
}

#[async_trait]
impl Encoder for SlowEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        tokio::time::sleep(self.delay).await;
        self.inner.encode(text).await
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        self.inner.encode_batch(texts).await
    }
}

/// Stalls on its first batch request only; every later call is immediate.
pub struct StallOnceEncoder {
    pub inner: TableEncoder,
    pub stall: Duration,
    pub attempts: AtomicUsize,
}

impl StallOnceEncoder {
    pub fn new(inner: TableEncoder, stall: Duration) -> Self {
        Self { inner, stall, attempts: AtomicUsize::new(0) }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for StallOnceEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        self.inner.encode(text).await
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.encode_batch(texts).await
    }
}

/// Returns canned spans per utterance; anything else yields no spans.
#[derive(Default)]
pub struct ScriptedRecognizer {
    script: HashMap<String, LabeledSpans>,
    pub calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, label: &str, span: &str) -> Self {
        self.script
            .entry(text.to_string())
            .or_default()
            .entry(label.to_string())
            .or_default()
            .push(span.to_string());
        self
    }
}

#[async_trait]
impl EntityRecognizer for ScriptedRecognizer {
    async fn extract_entities(&self, text: &str) -> Result<LabeledSpans, RecognizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.get(text).cloned().unwrap_or_default())
    }
}

pub fn definitions(json: &str) -> DefinitionSet {
    parse_definitions(json).expect("test definitions must parse")
}

pub fn lexicon(apps: &[&str], folders: &[&str]) -> Arc<SharedLexicon> {
    Arc::new(SharedLexicon::new(Lexicon::new(apps.iter(), folders.iter())))
}

pub struct Harness {
    pub resolver: Resolver,
    pub store: Arc<MemoryDefinitionStore>,
    pub clock: ManualClock,
}

pub fn harness(defs: DefinitionSet, config: ResolverConfig, customize: impl FnOnce(Collaborators) -> Collaborators) -> Harness {
    let store = Arc::new(MemoryDefinitionStore::new(defs));
    let clock = ManualClock::new();
    let deps = customize(Collaborators::new(store.clone()).with_clock(Arc::new(clock.clone())));
    Harness {
        resolver: Resolver::new(config, deps),
        store,
        clock,
    }
}

pub fn tag(result: &ResolutionResult) -> Option<&str> {
    result.intent.as_ref().map(|t| t.as_str())
}

pub fn entity(result: &ResolutionResult, key: EntityKey) -> Option<&str> {
    result.entities.as_ref().and_then(|e| e.get(&key)).map(String::as_str)
}
