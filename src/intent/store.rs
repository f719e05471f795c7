use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::intent::types::{
    builtin_dialogues, DefinitionSet, DialogueFlow, IntentDefinition, MacroDefinition,
};

/// Read-only view over the live definitions plus a change signal.
///
/// Implementations never fail outward: a broken backing store yields an empty
/// (but valid) set.
pub trait DefinitionStore: Send + Sync {
    fn definitions(&self) -> Arc<DefinitionSet>;

    /// Receives the new version number whenever the definitions change.
    fn subscribe(&self) -> watch::Receiver<u64>;

    fn get_intents(&self) -> BTreeMap<String, IntentDefinition> {
        self.definitions().intents.clone()
    }

    fn get_macros(&self) -> BTreeMap<String, MacroDefinition> {
        self.definitions().macros.clone()
    }

    fn get_sites(&self) -> BTreeMap<String, String> {
        self.definitions().sites.clone()
    }
}

/// Shared publish step: stamp a version, swap the snapshot, notify.
struct Published {
    current: RwLock<Arc<DefinitionSet>>,
    notify: watch::Sender<u64>,
}

impl Published {
    fn new(mut set: DefinitionSet) -> Self {
        set.version = 1;
        let (notify, _) = watch::channel(1);
        Self {
            current: RwLock::new(Arc::new(set)),
            notify,
        }
    }

    fn publish(&self, mut set: DefinitionSet) -> u64 {
        let mut guard = self.current.write();
        let version = guard.version + 1;
        set.version = version;
        *guard = Arc::new(set);
        drop(guard);
        self.notify.send_replace(version);
        version
    }

    fn snapshot(&self) -> Arc<DefinitionSet> {
        self.current.read().clone()
    }
}

/// Definitions held in memory and edited programmatically.
pub struct MemoryDefinitionStore {
    inner: Published,
}

impl MemoryDefinitionStore {
    pub fn new(set: DefinitionSet) -> Self {
        Self { inner: Published::new(set) }
    }

    pub fn replace(&self, set: DefinitionSet) -> u64 {
        self.inner.publish(set)
    }

    pub fn upsert_intent(&self, name: &str, intent: IntentDefinition) -> u64 {
        let mut set = (*self.inner.snapshot()).clone();
        set.intents.insert(name.to_string(), intent);
        self.inner.publish(set)
    }

    pub fn remove_intent(&self, name: &str) -> u64 {
        let mut set = (*self.inner.snapshot()).clone();
        set.intents.remove(name);
        self.inner.publish(set)
    }
}

impl Default for MemoryDefinitionStore {
    fn default() -> Self {
        Self::new(DefinitionSet::default())
    }
}

impl DefinitionStore for MemoryDefinitionStore {
    fn definitions(&self) -> Arc<DefinitionSet> {
        self.inner.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.notify.subscribe()
    }
}

/// Definitions read from a JSON file in the assistant's settings layout.
pub struct JsonDefinitionStore {
    path: PathBuf,
    inner: Published,
}

impl JsonDefinitionStore {
    /// Loads immediately. A missing or unreadable file gives an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let set = load_or_empty(&path);
        Self {
            path,
            inner: Published::new(set),
        }
    }

    /// Re-reads the file. Subscribers are only notified when the content changed.
    pub fn reload(&self) -> bool {
        let fresh = load_or_empty(&self.path);
        let current = self.inner.snapshot();
        let unchanged = fresh.intents == current.intents
            && fresh.macros == current.macros
            && fresh.sites == current.sites
            && fresh.dialogues == current.dialogues;
        if unchanged {
            return false;
        }
        let version = self.inner.publish(fresh);
        info!(version, path = %self.path.display(), "Definitions changed on disk");
        true
    }
}

impl DefinitionStore for JsonDefinitionStore {
    fn definitions(&self) -> Arc<DefinitionSet> {
        self.inner.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.notify.subscribe()
    }
}

fn load_or_empty(path: &PathBuf) -> DefinitionSet {
    match load_definitions(path) {
        Ok(set) => {
            info!(
                intents = set.intents.len(),
                macros = set.macros.len(),
                sites = set.sites.len(),
                "Loaded definitions from {}",
                path.display()
            );
            set
        }
        Err(e) => {
            warn!("{}. Continuing with an empty definition set.", e);
            DefinitionSet::default()
        }
    }
}

/// Parses the file, dropping individual entries that fail validation.
pub fn load_definitions(path: &PathBuf) -> Result<DefinitionSet, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.clone(),
        source,
    })?;
    parse_definitions(&content)
}

pub fn parse_definitions(content: &str) -> Result<DefinitionSet, StoreError> {
    let root: Value = serde_json::from_str(content)?;
    let mut set = DefinitionSet {
        intents: entries(&root, "intents"),
        macros: entries(&root, "macros"),
        sites: entries(&root, "sites"),
        dialogues: builtin_dialogues(),
        ..DefinitionSet::default()
    };
    let custom: BTreeMap<String, DialogueFlow> = entries(&root, "dialogues");
    set.dialogues.extend(custom);
    Ok(set)
}

fn entries<T: serde::de::DeserializeOwned>(root: &Value, section: &str) -> BTreeMap<String, T> {
    let mut out = BTreeMap::new();
    let Some(map) = root.get(section).and_then(Value::as_object) else {
        return out;
    };
    for (name, raw) in map {
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(value) => {
                out.insert(name.clone(), value);
            }
            Err(e) => warn!(section, name = %name, "Skipping malformed definition: {}", e),
        }
    }
    out
}
