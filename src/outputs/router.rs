//! Turns a resolution into something an executor can run.
//!
//! Each handler declares the input it takes as data. Entities are checked
//! here, at the dispatch boundary, and nowhere earlier.

use std::collections::HashMap;
use tracing::debug;

use crate::error::DispatchError;
use crate::intent::types::{DefinitionSet, Entities, EntityKey, IntentTag, MacroStep};
use crate::kernel::result::ResolutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerShape {
    NoArgs,
    Entities,
    /// Shared handlers that branch on which intent invoked them.
    EntitiesAndIntent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub shape: HandlerShape,
    pub required: Vec<EntityKey>,
    /// Set for macros; replayed in order instead of calling a handler.
    pub steps: Option<Vec<MacroStep>>,
}

impl ActionSpec {
    pub fn no_args() -> Self {
        Self { shape: HandlerShape::NoArgs, required: Vec::new(), steps: None }
    }

    pub fn entities(required: &[EntityKey]) -> Self {
        Self { shape: HandlerShape::Entities, required: required.to_vec(), steps: None }
    }

    pub fn entities_and_intent() -> Self {
        Self { shape: HandlerShape::EntitiesAndIntent, required: Vec::new(), steps: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionInput {
    None,
    Entities(Entities),
    EntitiesAndIntent { entities: Entities, intent: IntentTag },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Macro { name: String, steps: Vec<MacroStep> },
    Action { intent: IntentTag, input: ActionInput, confirmation: Option<String> },
    /// Fallback tags go to the task planner with the raw request.
    Planner { intent: IntentTag, query: String },
    Speak(String),
    Idle,
}

const NO_ARGS: [&str; 25] = [
    "ANALYZE_SCREEN",
    "GET_SYSTEM_STATS",
    "NEXT_DESKTOP",
    "PREVIOUS_DESKTOP",
    "MEDIA_PLAY_PAUSE",
    "NEXT_TRACK",
    "PREVIOUS_TRACK",
    "MUTE_TOGGLE",
    "VOLUME_UP",
    "VOLUME_DOWN",
    "CONFIRM_ACTION",
    "SCROLL_UP",
    "SCROLL_DOWN",
    "CLOSE_TAB",
    "CLOSE_WINDOW",
    "SHOW_PROJECT_STATUS",
    "OPEN_LAST_RECEIVED_FILE",
    "MAXIMIZE_WINDOW",
    "MINIMIZE_WINDOW",
    "SNAP_WINDOW_LEFT",
    "SNAP_WINDOW_RIGHT",
    "STOP_ACTION",
    "FEEDBACK_POSITIVE",
    "FEEDBACK_NEGATIVE_CONCISE",
    "FEEDBACK_NEGATIVE_DETAILED",
];

const HANDOFFS: [&str; 4] = ["BROWSER_HANDOFF", "DOCUMENT_HANDOFF", "SPOTIFY_HANDOFF", "HEADSET_HANDOFF"];

#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    specs: HashMap<String, ActionSpec>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers every deployment ships with.
    pub fn builtin() -> Self {
        use EntityKey::*;

        let mut table = Self::new();
        for name in NO_ARGS {
            table.register(name, ActionSpec::no_args());
        }
        for name in HANDOFFS {
            table.register(name, ActionSpec::entities_and_intent());
        }
        table
            .register("OPEN_LOCAL_ITEM", ActionSpec::entities(&[Entity]))
            .register("SEARCH_AND_NAVIGATE", ActionSpec::entities(&[Entity]))
            .register("SEARCH_WEB", ActionSpec::entities(&[Entity]))
            .register("OPEN_WEBSITE", ActionSpec::entities(&[Entity]))
            .register("OPEN_PROJECT_FOLDER", ActionSpec::entities(&[]))
            .register("QUERY_MEMORY", ActionSpec::entities(&[]))
            .register("CREATE_SCHEDULED_REMINDER", ActionSpec::entities(&[Content, Time]))
            .register("SEND_WHATSAPP_MESSAGE", ActionSpec::entities(&[Recipient, Message]));
        table
    }

    /// Adds the user's macros and any defined intent without a handler of its own.
    pub fn with_definitions(mut self, defs: &DefinitionSet) -> Self {
        for (name, def) in &defs.macros {
            self.register(
                name,
                ActionSpec {
                    steps: Some(def.steps.clone()),
                    ..ActionSpec::no_args()
                },
            );
        }
        for name in defs.intents.keys() {
            if self.spec(name).is_none() {
                self.register(name, ActionSpec::entities(&[]));
            }
        }
        self
    }

    /// Keys are tag names, so "focus mode" and "FOCUS_MODE" are one action.
    pub fn register(&mut self, name: &str, spec: ActionSpec) -> &mut Self {
        self.specs.insert(IntentTag::for_name(name).name().to_string(), spec);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ActionSpec> {
        self.specs.get(IntentTag::for_name(name).name())
    }

    pub fn route(&self, result: &ResolutionResult) -> Result<Route, DispatchError> {
        let Some(intent) = &result.intent else {
            return Ok(match &result.prompt {
                Some(prompt) => Route::Speak(prompt.clone()),
                None => Route::Idle,
            });
        };

        if intent.is_fallback() {
            let query = result
                .entities
                .as_ref()
                .and_then(|e| e.get(&EntityKey::Query))
                .ok_or_else(|| DispatchError::MissingEntity {
                    intent: intent.name().to_string(),
                    key: EntityKey::Query,
                })?;
            return Ok(Route::Planner { intent: intent.clone(), query: query.clone() });
        }

        let spec = self
            .spec(intent.name())
            .ok_or_else(|| DispatchError::UnknownAction(intent.name().to_string()))?;

        if let Some(steps) = &spec.steps {
            return Ok(Route::Macro { name: intent.name().to_string(), steps: steps.clone() });
        }

        let entities = result.entities.clone().unwrap_or_default();
        if let Some(missing) = spec.required.iter().find(|k| !entities.contains_key(*k)) {
            return Err(DispatchError::MissingEntity {
                intent: intent.name().to_string(),
                key: *missing,
            });
        }

        let input = match spec.shape {
            HandlerShape::NoArgs => {
                if !entities.is_empty() {
                    debug!(intent = %intent, "Dropping entities for a no-args handler");
                }
                ActionInput::None
            }
            HandlerShape::Entities => ActionInput::Entities(entities),
            HandlerShape::EntitiesAndIntent => ActionInput::EntitiesAndIntent { entities, intent: intent.clone() },
        };

        Ok(Route::Action {
            intent: intent.clone(),
            input,
            confirmation: result.prompt.clone(),
        })
    }
}
