//! Resolution telemetry and correction feedback.
//!
//! # SAFETY INVARIANT
//! Telemetry is a write-only side channel. The cascade never reads it back;
//! no decision may depend on what was recorded.
//!
//! # PRIVACY INVARIANT
//! Records hold the utterance text so corrections can be reviewed. They live
//! only in this process's ring buffer and are never serialized by the crate
//! itself. Embeddings and similarity scores are never recorded.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{Correction, ResolutionRecord};
pub use metrics::{compute_snapshot, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
