use std::time::Duration;
use tracing::debug;

use crate::intent::types::{Entities, IntentTag};
use crate::kernel::text::{contains_phrase, find_phrase, normalize, words};
use crate::kernel::time::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct Remembered {
    pub intent: IntentTag,
    pub entities: Entities,
    pub at: Timestamp,
}

/// The last resolution that carried entities, readable for `ttl` after it was written.
#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    slot: Option<Remembered>,
    ttl: Duration,
}

impl ShortTermMemory {
    pub fn new(ttl: Duration) -> Self {
        Self { slot: None, ttl }
    }

    pub fn remember(&mut self, intent: IntentTag, entities: Entities, now: Timestamp) {
        debug!(intent = %intent, "Short-term memory updated");
        self.slot = Some(Remembered { intent, entities, at: now });
    }

    /// The stored resolution if still fresh. A stale one is dropped here.
    pub fn recall(&mut self, now: Timestamp) -> Option<&Remembered> {
        let expired = self
            .slot
            .as_ref()
            .map_or(false, |r| now.elapsed_since(r.at) > self.ttl);
        if expired {
            debug!("Short-term memory expired");
            self.slot = None;
        }
        self.slot.as_ref()
    }

    pub fn peek(&self) -> Option<&Remembered> {
        self.slot.as_ref()
    }
}

/// Detects utterances that point back at the previous command.
#[derive(Debug, Clone)]
pub struct FollowUpCues {
    cues: Vec<String>,
}

impl FollowUpCues {
    pub fn new(cues: &[String]) -> Self {
        Self {
            cues: cues.iter().map(|c| normalize(c)).filter(|c| !c.is_empty()).collect(),
        }
    }

    pub fn mentions(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.cues.iter().any(|c| contains_phrase(&normalized, c))
    }

    /// `true` when nothing but cues and filler remain, e.g. "it again".
    pub fn only_cues(&self, text: &str, filler: &[String]) -> bool {
        let mut rest = normalize(text);
        if rest.is_empty() {
            return false;
        }
        let mut by_length: Vec<&String> = self.cues.iter().collect();
        by_length.sort_by(|a, b| b.len().cmp(&a.len()));
        let mut found = false;
        for cue in by_length {
            while let Some(at) = find_phrase(&rest, cue) {
                rest.replace_range(at..at + cue.len(), " ");
                found = true;
            }
        }
        found
            && words(&rest)
                .iter()
                .all(|w| filler.iter().any(|f| f.as_str() == *w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_expires_lazily() {
        let mut memory = ShortTermMemory::new(Duration::from_secs(30));
        let entities = crate::intent::types::single_entity(crate::intent::types::EntityKey::Entity, "downloads");
        memory.remember(IntentTag::for_name("OPEN_LOCAL_ITEM"), entities, Timestamp::from_millis(0));

        assert!(memory.recall(Timestamp::from_millis(30_000)).is_some());
        assert!(memory.recall(Timestamp::from_millis(30_001)).is_none());
        assert!(memory.peek().is_none());
    }

    #[test]
    fn only_cues_ignores_filler() {
        let cues = FollowUpCues::new(&["it".to_string(), "again".to_string()]);
        let filler = vec!["do".to_string(), "please".to_string()];
        assert!(cues.only_cues("do it again please", &filler));
        assert!(!cues.only_cues("do it with spotify", &filler));
        assert!(!cues.only_cues("please", &filler));
    }
}
