use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::{Correction, ResolutionRecord};
use super::metrics::{compute_snapshot, TelemetrySnapshot};
use crate::kernel::result::{ConfidenceTier, ResolutionResult};
use crate::kernel::time::Timestamp;

const MAX_RECORDS: usize = 10_000;

#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<ResolutionRecord>,
    capacity: usize,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECORDS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(MAX_RECORDS)),
            capacity,
        }
    }

    pub fn record(&mut self, text: &str, result: &ResolutionResult, tier: ConfidenceTier, at: Timestamp) -> Uuid {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        let id = Uuid::new_v4();
        self.buffer.push_back(ResolutionRecord {
            id,
            at,
            text: text.to_string(),
            intent: result.intent.clone(),
            entities: result.entities.clone(),
            tier,
            correction: None,
        });
        id
    }

    /// Marks a past resolution as wrong. Returns `false` if the record has
    /// already rotated out of the buffer.
    pub fn correct(&mut self, id: Uuid, intent: &str, entity: Option<&str>) -> bool {
        match self.buffer.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                debug!(%id, corrected_to = intent, "Resolution corrected");
                record.correction = Some(Correction {
                    intent: intent.to_string(),
                    entity: entity.map(str::to_string),
                });
                true
            }
            None => {
                warn!(%id, "Correction for unknown or expired record ignored");
                false
            }
        }
    }

    pub fn last(&self) -> Option<&ResolutionRecord> {
        self.buffer.back()
    }

    pub fn records(&self) -> impl Iterator<Item = &ResolutionRecord> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.buffer)
    }
}
