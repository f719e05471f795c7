use serde::{Deserialize, Serialize};

use crate::intent::types::{Entities, IntentTag};

/// What the resolver decided for one utterance.
///
/// A dispatch sets `intent`; a clarification sets only `prompt`. A finished
/// dialogue sets both, the prompt being a confirmation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub intent: Option<IntentTag>,
    pub entities: Option<Entities>,
    pub prompt: Option<String>,
}

impl ResolutionResult {
    pub fn dispatch(intent: IntentTag, entities: Option<Entities>) -> Self {
        Self {
            intent: Some(intent),
            entities,
            prompt: None,
        }
    }

    pub fn ask(prompt: impl Into<String>) -> Self {
        Self {
            intent: None,
            entities: None,
            prompt: Some(prompt.into()),
        }
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }
}

/// Which stage of the cascade produced a result. Reported to telemetry only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Macro,
    Keyword,
    Heuristic,
    FollowUp,
    HighConfidence,
    LowConfidence,
    Ambiguous,
    AmbiguityResolved,
    DialoguePrompt,
    DialogueComplete,
    DialogueCancelled,
    Abstained,
    Empty,
}
