//! Multi-turn dialogue: ambiguity resolution and slot filling.
//!
//! Sessions expire lazily. `expire_if_stale` is called at the start of every
//! utterance; nothing runs in the background.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::intent::types::{
    DefinitionSet, DialogueFlow, Entities, IntentDefinition, SlotKind, AWAITING_AMBIGUITY_RESOLUTION,
};
use crate::kernel::text::{contains_phrase, find_phrase, humanize, normalize, strip_separators, words};
use crate::kernel::time::Timestamp;
use crate::semantic::Candidate;
use crate::services::recognizer::EntityRecognizer;

/// Labels that satisfy a temporal slot.
const TEMPORAL_LABELS: [&str; 2] = ["DATE", "TIME"];

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    AwaitingAmbiguity {
        original_text: String,
        candidates: Vec<Candidate>,
    },
    AwaitingSlot {
        state: String,
        collected: Entities,
    },
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub state: SessionState,
    pub last_interaction: Timestamp,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            last_interaction: Timestamp::default(),
        }
    }
}

impl ConversationSession {
    pub fn state_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::AwaitingAmbiguity { .. } => Some(AWAITING_AMBIGUITY_RESOLUTION),
            SessionState::AwaitingSlot { state, .. } => Some(state.as_str()),
        }
    }
}

/// Outcome of feeding one utterance to an active dialogue.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Still waiting; say this.
    Ask(String),
    /// The user picked one of the ambiguous candidates.
    Chosen { candidate: Candidate, original_text: String },
    /// Every slot is filled.
    Complete {
        intent: String,
        entities: Entities,
        confirmation: Option<String>,
    },
    Cancelled(String),
    /// The dialogue can no longer continue (its flow disappeared). Treat the
    /// utterance as fresh input.
    Abandoned,
}

pub struct ConversationMachine {
    session: ConversationSession,
    ttl: Duration,
    cancel_phrases: Vec<String>,
}

impl ConversationMachine {
    pub fn new(ttl: Duration, cancel_phrases: &[String]) -> Self {
        Self {
            session: ConversationSession::default(),
            ttl,
            cancel_phrases: cancel_phrases.iter().map(|p| normalize(p)).collect(),
        }
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.session.state != SessionState::Idle
    }

    pub fn reset(&mut self) {
        self.session.state = SessionState::Idle;
    }

    /// Drops a dialogue that has been idle longer than the TTL.
    pub fn expire_if_stale(&mut self, now: Timestamp) -> bool {
        if self.is_active() && now.elapsed_since(self.session.last_interaction) > self.ttl {
            info!(state = ?self.session.state_name(), "Conversation timed out and has been reset.");
            self.reset();
            return true;
        }
        false
    }

    pub fn begin_ambiguity(&mut self, original_text: &str, candidates: Vec<Candidate>, now: Timestamp) -> String {
        let prompt = clarification(&candidates);
        self.session = ConversationSession {
            state: SessionState::AwaitingAmbiguity {
                original_text: original_text.to_string(),
                candidates,
            },
            last_interaction: now,
        };
        prompt
    }

    /// Enters the first slot of the intent's flow. `None` if the intent names
    /// a state no flow declares.
    pub fn begin_flow(
        &mut self,
        defs: &DefinitionSet,
        name: &str,
        intent: &IntentDefinition,
        now: Timestamp,
    ) -> Option<String> {
        let entry = intent.conversation_state.as_deref()?;
        let Some((flow, index)) = defs.flow_for_state(entry) else {
            warn!(intent = name, state = entry, "No dialogue declares this state; dispatching directly");
            return None;
        };
        let slot = &flow.slots[index];
        let prompt = intent
            .initial_prompt
            .clone()
            .or_else(|| slot.prompt.clone())
            .unwrap_or_else(|| format!("What's the {}?", slot.key));
        self.session = ConversationSession {
            state: SessionState::AwaitingSlot {
                state: slot.state.clone(),
                collected: Entities::new(),
            },
            last_interaction: now,
        };
        debug!(intent = name, state = %slot.state, "Dialogue started");
        Some(prompt)
    }

    pub async fn handle(
        &mut self,
        text: &str,
        defs: &DefinitionSet,
        recognizer: &dyn EntityRecognizer,
        now: Timestamp,
    ) -> Turn {
        self.session.last_interaction = now;

        if self.is_cancel(text) {
            info!(state = ?self.session.state_name(), "Dialogue cancelled by user");
            self.reset();
            return Turn::Cancelled("Okay, I've cancelled that.".to_string());
        }

        match std::mem::replace(&mut self.session.state, SessionState::Idle) {
            SessionState::Idle => Turn::Abandoned,
            SessionState::AwaitingAmbiguity { original_text, candidates } => {
                match pick_candidate(text, &candidates) {
                    Some(candidate) => {
                        debug!(chosen = %candidate.name, "Ambiguity resolved");
                        Turn::Chosen { candidate, original_text }
                    }
                    None => {
                        let prompt = format!("Sorry, I didn't catch that. {}", clarification(&candidates));
                        self.session.state = SessionState::AwaitingAmbiguity { original_text, candidates };
                        Turn::Ask(prompt)
                    }
                }
            }
            SessionState::AwaitingSlot { state, collected } => {
                let Some((flow, index)) = defs.flow_for_state(&state) else {
                    warn!(state = %state, "Dialogue flow vanished; abandoning");
                    return Turn::Abandoned;
                };
                self.fill_slot(text, flow, index, collected, recognizer).await
            }
        }
    }

    async fn fill_slot(
        &mut self,
        text: &str,
        flow: &DialogueFlow,
        index: usize,
        mut collected: Entities,
        recognizer: &dyn EntityRecognizer,
    ) -> Turn {
        let slot = &flow.slots[index];
        let value = strip_separators(text);
        let slot_prompt = slot.prompt.clone().unwrap_or_else(|| format!("What's the {}?", slot.key));

        let rejected = value.is_empty() || (slot.kind == SlotKind::Temporal && !has_temporal(value, recognizer).await);
        if rejected {
            self.session.state = SessionState::AwaitingSlot {
                state: slot.state.clone(),
                collected,
            };
            return Turn::Ask(format!("Sorry, I didn't catch that. {}", slot_prompt));
        }

        collected.insert(slot.key, value.to_string());

        match flow.slots.get(index + 1) {
            Some(next) => {
                let prompt = next.prompt.clone().unwrap_or_else(|| format!("What's the {}?", next.key));
                self.session.state = SessionState::AwaitingSlot {
                    state: next.state.clone(),
                    collected,
                };
                Turn::Ask(prompt)
            }
            None => {
                let confirmation = flow.confirm(&collected);
                Turn::Complete {
                    intent: flow.intent.clone(),
                    entities: collected,
                    confirmation,
                }
            }
        }
    }

    fn is_cancel(&self, text: &str) -> bool {
        let spoken = words(&normalize(text)).join(" ");
        self.cancel_phrases.iter().any(|p| *p == spoken)
    }
}

/// A recognizer that answers without any DATE/TIME span rejects the value.
/// One that cannot answer at all leaves the raw text accepted.
async fn has_temporal(value: &str, recognizer: &dyn EntityRecognizer) -> bool {
    match recognizer.extract_entities(value).await {
        Ok(spans) => TEMPORAL_LABELS
            .iter()
            .any(|label| spans.get(*label).map_or(false, |v| !v.is_empty())),
        Err(e) => {
            debug!("Recognizer unavailable, accepting raw slot value: {}", e);
            true
        }
    }
}

fn clarification(candidates: &[Candidate]) -> String {
    match candidates {
        [first, second, ..] => format!("Did you mean {}, or {}?", humanize(&first.name), humanize(&second.name)),
        [only] => format!("Did you mean {}?", humanize(&only.name)),
        [] => "Could you rephrase that?".to_string(),
    }
}

const ORDINALS: [&[&str]; 3] = [
    &["first", "1", "1st", "one", "former"],
    &["second", "2", "2nd", "two", "latter"],
    &["third", "3", "3rd", "three"],
];

fn pick_candidate(text: &str, candidates: &[Candidate]) -> Option<Candidate> {
    let spoken = normalize(text);

    // Names first so "the second one" can't shadow a literal "volume up".
    let by_name = candidates
        .iter()
        .filter(|c| contains_phrase(&spoken, &humanize(&c.name)))
        .max_by_key(|c| c.name.len());
    if let Some(c) = by_name {
        return Some(c.clone());
    }

    // Earliest ordinal wins: in "the second one" the trailing "one" is a pronoun.
    ORDINALS
        .iter()
        .enumerate()
        .filter_map(|(index, forms)| forms.iter().filter_map(|f| find_phrase(&spoken, f)).min().map(|at| (at, index)))
        .min()
        .and_then(|(_, index)| candidates.get(index).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::CandidateKind;

    fn cand(name: &str, score: f32) -> Candidate {
        Candidate { name: name.to_string(), kind: CandidateKind::Intent, score }
    }

    #[test]
    fn ordinals_pick_by_position() {
        let c = vec![cand("VOLUME_UP", 0.6), cand("VOLUME_DOWN", 0.55)];
        assert_eq!(pick_candidate("the second one", &c).unwrap().name, "VOLUME_DOWN");
        assert_eq!(pick_candidate("first", &c).unwrap().name, "VOLUME_UP");
        assert_eq!(pick_candidate("number two", &c).unwrap().name, "VOLUME_DOWN");
        assert!(pick_candidate("the third one", &c).is_none());
    }

    #[test]
    fn names_beat_ordinals() {
        let c = vec![cand("VOLUME_UP", 0.6), cand("VOLUME_DOWN", 0.55)];
        assert_eq!(pick_candidate("volume down", &c).unwrap().name, "VOLUME_DOWN");
        assert!(pick_candidate("banana", &c).is_none());
    }

    #[test]
    fn clarification_names_both_candidates() {
        let c = vec![cand("NEXT_TRACK", 0.6), cand("NEXT_DESKTOP", 0.55)];
        assert_eq!(clarification(&c), "Did you mean next track, or next desktop?");
    }
}
