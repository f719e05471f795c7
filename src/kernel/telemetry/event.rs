use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::types::{Entities, IntentTag};
use crate::kernel::result::ConfidenceTier;
use crate::kernel::time::Timestamp;

/// One resolved utterance as the caller saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub id: Uuid,
    pub at: Timestamp,
    pub text: String,
    pub intent: Option<IntentTag>,
    pub entities: Option<Entities>,
    pub tier: ConfidenceTier,
    pub correction: Option<Correction>,
}

/// What the user said the resolver should have chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub intent: String,
    pub entity: Option<String>,
}
