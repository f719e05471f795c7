//! Collaborators the resolver consumes but does not own.

pub mod encoder;
pub mod lexicon;
pub mod recognizer;

pub use encoder::{Encoder, HttpEncoder, UnavailableEncoder};
pub use lexicon::{Lexicon, LexiconProvider, SharedLexicon};
pub use recognizer::{EntityRecognizer, HttpRecognizer, LabeledSpans, NullRecognizer};
