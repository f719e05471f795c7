use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::conversation::{ConversationMachine, ConversationSession, Turn};
use super::extractor::extract_any;
use super::heuristics::Heuristics;
use super::result::{ConfidenceTier, ResolutionResult};
use super::short_term::{FollowUpCues, Remembered, ShortTermMemory};
use super::telemetry::TelemetryRecorder;
use super::text::{contains_phrase, normalize, words};
use super::time::{Clock, SystemClock, Timestamp};

use crate::config::ResolverConfig;
use crate::intent::store::DefinitionStore;
use crate::intent::types::{
    single_entity, DefinitionSet, Entities, EntityKey, IntentTag, EXECUTE_DYNAMIC_TASK, WRITE_CODE,
};
use crate::semantic::cache::{CacheSnapshot, CandidateKind, EmbeddingCache};
use crate::semantic::classifier::{keyword_match, ApplicableSet, Candidate, CandidateClassifier};
use crate::services::encoder::{Encoder, UnavailableEncoder};
use crate::services::lexicon::{LexiconProvider, SharedLexicon};
use crate::services::recognizer::{EntityRecognizer, NullRecognizer};

/// Said instead of dispatching when paranoid mode blocks the only way forward.
const SUPPRESSED_PROMPT: &str = "Sorry, that action is disabled while paranoid mode is on.";

/// Words that may surround a follow-up cue without adding meaning.
const FOLLOW_UP_FILLER: [&str; 6] = ["do", "one", "more", "once", "time", "same"];

/// Everything the resolver talks to but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DefinitionStore>,
    pub encoder: Arc<dyn Encoder>,
    pub recognizer: Arc<dyn EntityRecognizer>,
    pub lexicon: Arc<dyn LexiconProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// No encoder, no recognizer, an empty lexicon and the system clock.
    pub fn new(store: Arc<dyn DefinitionStore>) -> Self {
        Self {
            store,
            encoder: Arc::new(UnavailableEncoder),
            recognizer: Arc::new(NullRecognizer),
            lexicon: Arc::new(SharedLexicon::default()),
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_lexicon(mut self, lexicon: Arc<dyn LexiconProvider>) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

enum Decision {
    Dispatch(Candidate, ConfidenceTier),
    Clarify,
    Abstain,
}

/// Turns one utterance at a time into a [`ResolutionResult`].
///
/// One resolver serves one conversation. Several resolvers may share an
/// [`EmbeddingCache`] through [`Resolver::with_cache`].
pub struct Resolver {
    config: ResolverConfig,
    deps: Collaborators,
    classifier: CandidateClassifier,
    heuristics: Heuristics,
    cues: FollowUpCues,
    filler: Vec<String>,
    memory: ShortTermMemory,
    conversation: ConversationMachine,
    changes: watch::Receiver<u64>,
    /// Snapshot from a rebuild triggered by this call's change signal.
    rebuilt: Option<Arc<CacheSnapshot>>,
    pub telemetry: TelemetryRecorder,
}

impl Resolver {
    pub fn new(config: ResolverConfig, deps: Collaborators) -> Self {
        Self::with_cache(config, deps, Arc::new(EmbeddingCache::new()))
    }

    pub fn with_cache(config: ResolverConfig, deps: Collaborators, cache: Arc<EmbeddingCache>) -> Self {
        let classifier = CandidateClassifier::new(deps.encoder.clone(), cache, config.encoder_timeout());
        let heuristics = Heuristics::new(&config.heuristics);
        let cues = FollowUpCues::new(&config.follow_up_cues);

        let mut filler: Vec<String> = config.heuristics.stop_words.iter().map(|w| normalize(w)).collect();
        for verb in config.heuristics.local_verbs.iter().chain(&config.heuristics.navigation_verbs) {
            filler.extend(words(&normalize(verb)).into_iter().map(str::to_string));
        }
        filler.extend(FOLLOW_UP_FILLER.iter().map(|w| w.to_string()));
        filler.sort();
        filler.dedup();

        let changes = deps.store.subscribe();
        Self {
            memory: ShortTermMemory::new(config.memory_ttl()),
            conversation: ConversationMachine::new(config.conversation_ttl(), &config.cancel_phrases),
            classifier,
            heuristics,
            cues,
            filler,
            changes,
            rebuilt: None,
            deps,
            config,
            telemetry: TelemetryRecorder::new(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn session(&self) -> &ConversationSession {
        self.conversation.session()
    }

    pub fn remembered(&self) -> Option<&Remembered> {
        self.memory.peek()
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        self.classifier.cache()
    }

    /// Builds the embedding cache now instead of on the first semantic lookup.
    pub async fn warm_up(&self) -> bool {
        let defs = self.deps.store.definitions();
        self.classifier.snapshot(&defs).await.is_ready()
    }

    /// Id of the most recent resolution, for [`Resolver::correct`].
    pub fn last_record_id(&self) -> Option<Uuid> {
        self.telemetry.last().map(|r| r.id)
    }

    pub fn correct(&mut self, id: Uuid, intent: &str, entity: Option<&str>) -> bool {
        self.telemetry.correct(id, intent, entity)
    }

    pub async fn process(&mut self, text: &str, context: Option<&str>) -> ResolutionResult {
        self.process_with_cancel(text, context, &CancellationToken::new()).await
    }

    /// Resolves one utterance. Never fails: collaborator errors degrade to a
    /// lower tier, and the worst outcome is an abstention tag.
    pub async fn process_with_cancel(
        &mut self,
        text: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        let now = self.deps.clock.now();
        let defs = self.refresh_definitions().await;
        self.conversation.expire_if_stale(now);

        let utterance = text.trim();
        let (result, tier) = if utterance.is_empty() {
            (ResolutionResult::default(), ConfidenceTier::Empty)
        } else if self.conversation.is_active() {
            // === 1. CONVERSATION ===
            self.continue_dialogue(utterance, context, &defs, now, cancel).await
        } else {
            self.cascade(utterance, context, &defs, now, cancel).await
        };

        debug!(
            ?tier,
            intent = ?result.intent.as_ref().map(IntentTag::as_str),
            prompt = ?result.prompt,
            "Utterance resolved"
        );
        self.rebuilt = None;
        self.telemetry.record(utterance, &result, tier, now);
        result
    }

    async fn refresh_definitions(&mut self) -> Arc<DefinitionSet> {
        let changed = self.changes.has_changed().unwrap_or(false);
        if changed {
            let _ = self.changes.borrow_and_update();
        }
        let defs = self.deps.store.definitions();
        if changed {
            info!(version = defs.version, "Definitions changed, rebuilding embedding cache");
            self.rebuilt = Some(self.classifier.rebuild(&defs).await);
        }
        defs
    }

    async fn continue_dialogue(
        &mut self,
        text: &str,
        context: Option<&str>,
        defs: &DefinitionSet,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> (ResolutionResult, ConfidenceTier) {
        let recognizer = self.deps.recognizer.clone();
        match self.conversation.handle(text, defs, recognizer.as_ref(), now).await {
            Turn::Ask(prompt) => (ResolutionResult::ask(prompt), ConfidenceTier::DialoguePrompt),
            Turn::Cancelled(prompt) => (ResolutionResult::ask(prompt), ConfidenceTier::DialogueCancelled),
            Turn::Chosen { candidate, original_text } => {
                if !self.permits(defs, &candidate.name) {
                    return (ResolutionResult::ask(SUPPRESSED_PROMPT), ConfidenceTier::DialogueCancelled);
                }
                self.dispatch_candidate(candidate, &original_text, defs, now, ConfidenceTier::AmbiguityResolved)
            }
            Turn::Complete { intent, entities, confirmation } => {
                if !self.permits(defs, &intent) {
                    return (ResolutionResult::ask(SUPPRESSED_PROMPT), ConfidenceTier::DialogueCancelled);
                }
                let tag = IntentTag::for_name(&intent);
                info!(intent = %tag, "Dialogue complete");
                self.memory.remember(tag.clone(), entities.clone(), now);
                (
                    ResolutionResult::dispatch(tag, Some(entities)).with_prompt(confirmation),
                    ConfidenceTier::DialogueComplete,
                )
            }
            Turn::Abandoned => self.cascade(text, context, defs, now, cancel).await,
        }
    }

    async fn cascade(
        &mut self,
        text: &str,
        context: Option<&str>,
        defs: &DefinitionSet,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> (ResolutionResult, ConfidenceTier) {
        // === 2. MACRO ===
        if let Some(name) = defs.macro_named(text) {
            if self.permits(defs, name) {
                debug!(name, "Macro name match");
                return (ResolutionResult::dispatch(IntentTag::for_name(name), None), ConfidenceTier::Macro);
            }
        }

        let applicable = ApplicableSet::compute(defs, context, &self.config);

        // === 3. KEYWORD ===
        if let Some(hit) = keyword_match(&normalize(text), &applicable) {
            return self.dispatch_intent(&hit.name, text, defs, now, ConfidenceTier::Keyword);
        }

        // === 4. FOLLOW-UP & HEURISTICS ===
        if self.cues.only_cues(text, &self.filler) {
            // "do it again" names nothing; never let it reach the web check.
            if let Some(previous) = self.memory.recall(now).cloned() {
                if self.permits(defs, previous.intent.name()) {
                    debug!(intent = %previous.intent, "Referential follow-up");
                    return (
                        ResolutionResult::dispatch(previous.intent, Some(previous.entities)),
                        ConfidenceTier::FollowUp,
                    );
                }
            }
        } else {
            let lexicon = self.deps.lexicon.lexicon();
            if let Some(hit) = self.heuristics.route(text, &lexicon, &defs.sites) {
                if self.permits(defs, hit.intent) {
                    let entities = single_entity(EntityKey::Entity, hit.entity);
                    return self.finish(IntentTag::for_name(hit.intent), Some(entities), text, now, ConfidenceTier::Heuristic);
                }
            }
        }

        // === 5. CLASSIFY ===
        // A rebuild already attempted this call is not retried until the next one.
        let snapshot = match self.rebuilt.take() {
            Some(snapshot) => snapshot,
            None => self.classifier.snapshot(defs).await,
        };
        let candidates = self
            .classifier
            .semantic(text, &applicable, &snapshot, self.config.top_k, cancel)
            .await;

        // === 6. POLICY ===
        match self.decide(&candidates) {
            Decision::Dispatch(candidate, tier) => self.dispatch_candidate(candidate, text, defs, now, tier),
            Decision::Clarify => {
                info!(
                    first = %candidates[0].name,
                    second = %candidates[1].name,
                    "Ambiguous command, asking for clarification"
                );
                let prompt = self
                    .conversation
                    .begin_ambiguity(text, candidates.into_iter().take(2).collect(), now);
                (ResolutionResult::ask(prompt), ConfidenceTier::Ambiguous)
            }
            // === 7. ABSTAIN ===
            Decision::Abstain => self.abstain(text, defs, now),
        }
    }

    fn decide(&self, candidates: &[Candidate]) -> Decision {
        let Some(top) = candidates.first() else {
            return Decision::Abstain;
        };
        if top.score >= self.config.high_confidence {
            return Decision::Dispatch(top.clone(), ConfidenceTier::HighConfidence);
        }
        if let Some(second) = candidates.get(1) {
            if top.score - second.score < self.config.ambiguity_margin {
                return Decision::Clarify;
            }
        }
        if top.score >= self.config.min_confidence {
            return Decision::Dispatch(top.clone(), ConfidenceTier::LowConfidence);
        }
        debug!(top = %top.name, score = top.score, "Below minimum confidence");
        Decision::Abstain
    }

    fn permits(&self, defs: &DefinitionSet, name: &str) -> bool {
        let allowed = !(self.config.paranoid_mode && defs.is_high_risk(name));
        if !allowed {
            debug!(name, "High-risk intent suppressed");
        }
        allowed
    }

    fn dispatch_candidate(
        &mut self,
        candidate: Candidate,
        text: &str,
        defs: &DefinitionSet,
        now: Timestamp,
        tier: ConfidenceTier,
    ) -> (ResolutionResult, ConfidenceTier) {
        match candidate.kind {
            CandidateKind::Macro => (ResolutionResult::dispatch(IntentTag::for_name(&candidate.name), None), tier),
            CandidateKind::Intent => self.dispatch_intent(&candidate.name, text, defs, now, tier),
        }
    }

    /// Common handling once an intent is chosen: enter its dialogue, or pull
    /// its parameter out with the trigger phrases.
    fn dispatch_intent(
        &mut self,
        name: &str,
        text: &str,
        defs: &DefinitionSet,
        now: Timestamp,
        tier: ConfidenceTier,
    ) -> (ResolutionResult, ConfidenceTier) {
        let Some(intent) = defs.intents.get(name) else {
            return self.abstain(text, defs, now);
        };

        if intent.starts_conversation {
            if let Some(prompt) = self.conversation.begin_flow(defs, name, intent, now) {
                return (ResolutionResult::ask(prompt), ConfidenceTier::DialoguePrompt);
            }
        }

        // "play it again" must not store "it again" as a song title.
        let entities = extract_any(text, &intent.triggers)
            .filter(|e| !self.cues.only_cues(e, &self.filler))
            .map(|e| single_entity(EntityKey::Entity, e));
        self.finish(IntentTag::for_name(name), entities, text, now, tier)
    }

    fn finish(
        &mut self,
        tag: IntentTag,
        entities: Option<Entities>,
        text: &str,
        now: Timestamp,
        tier: ConfidenceTier,
    ) -> (ResolutionResult, ConfidenceTier) {
        if let Some(entities) = entities {
            if !tag.is_fallback() {
                self.memory.remember(tag.clone(), entities.clone(), now);
            }
            return (ResolutionResult::dispatch(tag, Some(entities)), tier);
        }

        if self.cues.mentions(text) {
            if let Some(previous) = self.memory.recall(now) {
                debug!(intent = %tag, from = %previous.intent, "Reusing remembered entities");
                let entities = previous.entities.clone();
                return (ResolutionResult::dispatch(tag, Some(entities)), ConfidenceTier::FollowUp);
            }
        }
        (ResolutionResult::dispatch(tag, None), tier)
    }

    fn abstain(&mut self, text: &str, defs: &DefinitionSet, now: Timestamp) -> (ResolutionResult, ConfidenceTier) {
        let normalized = normalize(text);

        // Nothing matched, but a short "that one again" still points somewhere.
        if self.cues.mentions(text) && words(&normalized).len() <= self.config.follow_up_max_words {
            if let Some(previous) = self.memory.recall(now).cloned() {
                if self.permits(defs, previous.intent.name()) {
                    debug!(intent = %previous.intent, "Inconclusive match resolved from memory");
                    return (
                        ResolutionResult::dispatch(previous.intent, Some(previous.entities)),
                        ConfidenceTier::FollowUp,
                    );
                }
            }
        }

        let wants_code = self
            .config
            .code_generation_keywords
            .iter()
            .any(|k| contains_phrase(&normalized, &normalize(k)));
        let fallback = if wants_code && self.permits(defs, WRITE_CODE) {
            WRITE_CODE
        } else {
            EXECUTE_DYNAMIC_TASK
        };
        if !self.permits(defs, fallback) {
            return (ResolutionResult::ask(SUPPRESSED_PROMPT), ConfidenceTier::Abstained);
        }

        info!(fallback, "No confident match, handing off to planner");
        (
            ResolutionResult::dispatch(IntentTag::for_name(fallback), Some(single_entity(EntityKey::Query, text))),
            ConfidenceTier::Abstained,
        )
    }
}
