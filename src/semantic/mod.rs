pub mod cache;
pub mod classifier;

pub use cache::{CacheSnapshot, CacheState, CandidateKind, EmbeddingCache};
pub use classifier::{ApplicableSet, Candidate, CandidateClassifier};
