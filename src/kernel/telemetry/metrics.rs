use std::collections::{BTreeMap, VecDeque};

use super::event::ResolutionRecord;
use crate::kernel::result::ConfidenceTier;

/// How many corrected-to intents the snapshot lists.
const TOP_CORRECTIONS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub total: u64,
    pub per_tier: BTreeMap<ConfidenceTier, u64>,
    pub abstained: u64,
    /// Fraction of resolutions that fell through to a fallback tag.
    pub abstention_rate: f64,
    pub corrected: u64,
    /// Percentage of resolutions nobody corrected. 100 when nothing is recorded.
    pub accuracy: f64,
    /// Intents users most often corrected to, most frequent first.
    pub top_corrections: Vec<(String, u64)>,
}

pub fn compute_snapshot(records: &VecDeque<ResolutionRecord>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    let mut corrected_to: BTreeMap<&str, u64> = BTreeMap::new();

    for record in records {
        snap.total += 1;
        *snap.per_tier.entry(record.tier).or_insert(0) += 1;
        if record.tier == ConfidenceTier::Abstained {
            snap.abstained += 1;
        }
        if let Some(correction) = &record.correction {
            snap.corrected += 1;
            *corrected_to.entry(correction.intent.as_str()).or_insert(0) += 1;
        }
    }

    if snap.total > 0 {
        snap.abstention_rate = snap.abstained as f64 / snap.total as f64;
        snap.accuracy = (snap.total - snap.corrected) as f64 / snap.total as f64 * 100.0;
    } else {
        snap.accuracy = 100.0;
    }

    let mut ranked: Vec<(String, u64)> = corrected_to
        .into_iter()
        .map(|(intent, count)| (intent.to_string(), count))
        .collect();
    // Stable sort keeps name order among equal counts.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_CORRECTIONS);
    snap.top_corrections = ranked;

    snap
}
