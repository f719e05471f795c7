use crate::kernel::text::{find_phrase, starts_with_phrase, strip_separators};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Trigger must open the utterance.
    Prefix,
    /// Trigger may appear anywhere; the entity is whatever follows it.
    Substring,
}

/// Pulls the parameter out of an utterance by stripping its trigger phrase.
///
/// The longest matching trigger wins so that "open" never pre-empts
/// "open project folder".
pub fn extract(text: &str, triggers: &[String], mode: MatchMode) -> Option<String> {
    let (lower, boundaries) = lowered(text);
    let mut best: Option<(usize, usize)> = None; // (start, trigger_len)

    for trigger in triggers {
        let (trigger, _) = lowered(trigger.trim());
        if trigger.is_empty() {
            continue;
        }
        let start = match mode {
            MatchMode::Prefix => starts_with_phrase(&lower, &trigger).then_some(0),
            MatchMode::Substring => find_phrase(&lower, &trigger),
        };
        if let Some(start) = start {
            if best.map_or(true, |(_, len)| trigger.len() > len) {
                best = Some((start, trigger.len()));
            }
        }
    }

    let (start, len) = best?;
    let end = start + len;
    // First original char boundary at or after the end of the trigger.
    let at = boundaries.partition_point(|(low, _)| *low < end);
    let cut = boundaries.get(at).map_or(text.len(), |(_, orig)| *orig);
    let remainder = strip_separators(&text[cut..]);
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.to_string())
    }
}

/// Lower-cases char by char, recording where each original char starts in
/// both strings so a match in the lowered text maps back to a valid slice.
fn lowered(text: &str) -> (String, Vec<(usize, usize)>) {
    let mut lower = String::with_capacity(text.len());
    let mut boundaries = Vec::with_capacity(text.len() + 1);
    for (orig, c) in text.char_indices() {
        boundaries.push((lower.len(), orig));
        lower.extend(c.to_lowercase());
    }
    boundaries.push((lower.len(), text.len()));
    (lower, boundaries)
}

/// Prefix first, then the looser substring match.
pub fn extract_any(text: &str, triggers: &[String]) -> Option<String> {
    extract(text, triggers, MatchMode::Prefix).or_else(|| extract(text, triggers, MatchMode::Substring))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn longest_trigger_wins() {
        let t = triggers(&["open", "open project folder"]);
        assert_eq!(extract("Open project folder Nexus", &t, MatchMode::Prefix).as_deref(), Some("Nexus"));
    }

    #[test]
    fn keeps_original_casing_and_strips_separators() {
        let t = triggers(&["send a message to"]);
        assert_eq!(extract("Send a message to: Priya!", &t, MatchMode::Prefix).as_deref(), Some("Priya"));
    }

    #[test]
    fn offsets_survive_case_folding_that_changes_length() {
        // 'İ' lower-cases to two chars (3 bytes), 'ẞ' to one shorter char.
        let t = triggers(&["open"]);
        assert_eq!(extract("Open İstanbul ẞtraße", &t, MatchMode::Prefix).as_deref(), Some("İstanbul ẞtraße"));

        let t = triggers(&["i\u{307}stanbul"]);
        assert_eq!(extract("İstanbul Ωmega notes", &t, MatchMode::Substring).as_deref(), Some("Ωmega notes"));
    }

    #[test]
    fn nothing_left_is_none() {
        let t = triggers(&["play"]);
        assert_eq!(extract("play", &t, MatchMode::Prefix), None);
    }

    #[test]
    fn substring_mode_finds_inner_trigger() {
        let t = triggers(&["play"]);
        assert_eq!(extract("could you play lo-fi beats", &t, MatchMode::Prefix), None);
        assert_eq!(
            extract("could you play lo-fi beats", &t, MatchMode::Substring).as_deref(),
            Some("lo-fi beats")
        );
    }
}
