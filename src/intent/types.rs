use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::kernel::text::normalize;

pub const OPEN_LOCAL_ITEM: &str = "OPEN_LOCAL_ITEM";
pub const SEARCH_AND_NAVIGATE: &str = "SEARCH_AND_NAVIGATE";
pub const SEARCH_WEB: &str = "SEARCH_WEB";
pub const WRITE_CODE: &str = "WRITE_CODE";
pub const EXECUTE_DYNAMIC_TASK: &str = "EXECUTE_DYNAMIC_TASK";
pub const CREATE_SCHEDULED_REMINDER: &str = "CREATE_SCHEDULED_REMINDER";
pub const SEND_WHATSAPP_MESSAGE: &str = "SEND_WHATSAPP_MESSAGE";

/// Dialogue state entered when two candidates are too close to call.
pub const AWAITING_AMBIGUITY_RESOLUTION: &str = "AWAITING_AMBIGUITY_RESOLUTION";

/// Dispatchable identifier in its bracketed wire form, e.g. `[OPEN_LOCAL_ITEM]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentTag(String);

impl IntentTag {
    /// `"start work"` and `"START_WORK"` both become `[START_WORK]`.
    pub fn for_name(name: &str) -> Self {
        let upper = normalize(name).to_uppercase().replace(' ', "_");
        Self(format!("[{}]", upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare name without brackets.
    pub fn name(&self) -> &str {
        self.0.trim_start_matches('[').trim_end_matches(']')
    }

    /// The two abstention tags handed to the task planner.
    pub fn is_fallback(&self) -> bool {
        matches!(self.name(), WRITE_CODE | EXECUTE_DYNAMIC_TASK)
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for IntentTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for IntentTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Closed set of parameter names an intent may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    Entity,
    Query,
    Recipient,
    Message,
    Content,
    Time,
}

impl EntityKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKey::Entity => "entity",
            EntityKey::Query => "query",
            EntityKey::Recipient => "recipient",
            EntityKey::Message => "message",
            EntityKey::Content => "content",
            EntityKey::Time => "time",
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Entities = BTreeMap<EntityKey, String>;

pub fn single_entity(key: EntityKey, value: impl Into<String>) -> Entities {
    let mut entities = Entities::new();
    entities.insert(key, value.into());
    entities
}

/// A built-in intent as configured in the definitions file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentDefinition {
    pub keywords: Vec<String>,
    pub triggers: Vec<String>,
    pub canonical: String,
    /// Foreground process names this intent is limited to. Empty means global.
    pub contexts: Vec<String>,
    pub is_high_risk: bool,
    pub starts_conversation: bool,
    pub initial_prompt: Option<String>,
    pub conversation_state: Option<String>,
}

impl IntentDefinition {
    pub fn is_global(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn allows_context(&self, context: &str) -> bool {
        self.contexts.iter().any(|c| c.eq_ignore_ascii_case(context))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacroAction {
    OpenApp,
    OpenUrl,
    PressKey,
    TypeText,
    Wait,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroStep {
    pub action: MacroAction,
    pub param: String,
}

/// A user-authored step sequence, addressed by saying its name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMacro")]
pub struct MacroDefinition {
    pub steps: Vec<MacroStep>,
    pub canonical: String,
    pub is_high_risk: bool,
}

/// Macros are written either as a bare step list or as a full object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMacro {
    Steps(Vec<MacroStep>),
    Full {
        steps: Vec<MacroStep>,
        #[serde(default)]
        canonical: String,
        #[serde(default)]
        is_high_risk: bool,
    },
}

impl From<RawMacro> for MacroDefinition {
    fn from(raw: RawMacro) -> Self {
        match raw {
            RawMacro::Steps(steps) => Self { steps, ..Self::default() },
            RawMacro::Full { steps, canonical, is_high_risk } => Self { steps, canonical, is_high_risk },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    #[default]
    Text,
    /// Validated by the entity recognizer for a DATE or TIME span.
    Temporal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Dialogue state name while this slot is being asked for.
    pub state: String,
    pub key: EntityKey,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub kind: SlotKind,
}

/// A slot-filling dialogue: ask for each slot in order, then dispatch `intent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueFlow {
    pub slots: Vec<SlotSpec>,
    pub intent: String,
    /// `{content}`-style placeholders are filled from the collected slots.
    #[serde(default)]
    pub confirmation: Option<String>,
}

impl DialogueFlow {
    pub fn entry_state(&self) -> Option<&str> {
        self.slots.first().map(|s| s.state.as_str())
    }

    pub fn slot_index(&self, state: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.state == state)
    }

    pub fn confirm(&self, entities: &Entities) -> Option<String> {
        let template = self.confirmation.as_ref()?;
        let mut out = template.clone();
        for (key, value) in entities {
            out = out.replace(&format!("{{{}}}", key.as_str()), value);
        }
        Some(out)
    }
}

pub fn builtin_dialogues() -> BTreeMap<String, DialogueFlow> {
    let mut flows = BTreeMap::new();
    flows.insert(
        "reminder".to_string(),
        DialogueFlow {
            slots: vec![
                SlotSpec {
                    state: "AWAITING_REMINDER_CONTENT".to_string(),
                    key: EntityKey::Content,
                    prompt: Some("What should I remind you about?".to_string()),
                    kind: SlotKind::Text,
                },
                SlotSpec {
                    state: "AWAITING_REMINDER_TIME".to_string(),
                    key: EntityKey::Time,
                    prompt: Some("Got it. When should I remind you?".to_string()),
                    kind: SlotKind::Temporal,
                },
            ],
            intent: CREATE_SCHEDULED_REMINDER.to_string(),
            confirmation: Some("Okay, I'll remind you to {content} {time}.".to_string()),
        },
    );
    flows.insert(
        "message".to_string(),
        DialogueFlow {
            slots: vec![
                SlotSpec {
                    state: "AWAITING_MESSAGE_RECIPIENT".to_string(),
                    key: EntityKey::Recipient,
                    prompt: Some("Who should I send it to?".to_string()),
                    kind: SlotKind::Text,
                },
                SlotSpec {
                    state: "AWAITING_MESSAGE_BODY".to_string(),
                    key: EntityKey::Message,
                    prompt: Some("What should the message say?".to_string()),
                    kind: SlotKind::Text,
                },
            ],
            intent: SEND_WHATSAPP_MESSAGE.to_string(),
            confirmation: Some("Sending \"{message}\" to {recipient}.".to_string()),
        },
    );
    flows
}

/// Everything the resolver reads from the definition store, as one immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionSet {
    #[serde(skip)]
    pub version: u64,
    pub intents: BTreeMap<String, IntentDefinition>,
    pub macros: BTreeMap<String, MacroDefinition>,
    /// Alias -> URL.
    pub sites: BTreeMap<String, String>,
    pub dialogues: BTreeMap<String, DialogueFlow>,
}

impl Default for DefinitionSet {
    fn default() -> Self {
        Self {
            version: 0,
            intents: BTreeMap::new(),
            macros: BTreeMap::new(),
            sites: BTreeMap::new(),
            dialogues: builtin_dialogues(),
        }
    }
}

impl DefinitionSet {
    /// Name of the macro whose normalized name equals the normalized text.
    pub fn macro_named(&self, text: &str) -> Option<&str> {
        let wanted = normalize(text);
        if wanted.is_empty() {
            return None;
        }
        self.macros
            .keys()
            .find(|name| normalize(name) == wanted)
            .map(String::as_str)
    }

    /// The flow containing `state` and the index of that slot.
    pub fn flow_for_state(&self, state: &str) -> Option<(&DialogueFlow, usize)> {
        self.dialogues
            .values()
            .find_map(|flow| flow.slot_index(state).map(|i| (flow, i)))
    }

    /// Whether a name refers to something flagged high-risk.
    pub fn is_high_risk(&self, name: &str) -> bool {
        self.intents.get(name).map_or(false, |i| i.is_high_risk)
            || self.macros.get(name).map_or(false, |m| m.is_high_risk)
    }
}
