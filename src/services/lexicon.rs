use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::kernel::text::normalize;

/// Known application and folder names, stored normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    pub apps: BTreeSet<String>,
    pub folders: BTreeSet<String>,
}

impl Lexicon {
    pub fn new<A, F>(apps: A, folders: F) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            apps: apps.into_iter().map(|a| normalize(a.as_ref())).collect(),
            folders: folders.into_iter().map(|f| normalize(f.as_ref())).collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.folders.iter().chain(self.apps.iter()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.folders.is_empty()
    }
}

pub trait LexiconProvider: Send + Sync {
    fn lexicon(&self) -> Arc<Lexicon>;
}

/// A lexicon that an indexer can refresh in place.
#[derive(Debug, Default)]
pub struct SharedLexicon {
    current: RwLock<Arc<Lexicon>>,
}

impl SharedLexicon {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            current: RwLock::new(Arc::new(lexicon)),
        }
    }

    pub fn replace(&self, lexicon: Lexicon) {
        *self.current.write() = Arc::new(lexicon);
    }
}

impl LexiconProvider for SharedLexicon {
    fn lexicon(&self) -> Arc<Lexicon> {
        self.current.read().clone()
    }
}
