//! Small text utilities shared by the cascade stages.
//!
//! Everything here operates on lower-cased, whitespace-normalized text. Callers
//! normalize once with [`normalize`] and pass the result around.

/// Lower-case, turn underscores into spaces and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split normalized text into words, dropping surrounding punctuation.
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(trim_punctuation)
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn trim_punctuation(s: &str) -> &str {
    s.trim_matches(|c: char| !c.is_alphanumeric())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\''
}

/// Byte offset of the first occurrence of `needle` in `haystack` that sits on
/// word boundaries at both ends.
pub fn find_phrase(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(needle) {
        let start = from + rel;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return Some(start);
        }
        // Advance by one char to keep slicing on a boundary.
        from = start + haystack[start..].chars().next().map_or(1, |c| c.len_utf8());
    }
    None
}

/// Whole-word containment.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    find_phrase(haystack, needle).is_some()
}

/// `true` when `text` starts with `prefix` followed by a word boundary.
pub fn starts_with_phrase(text: &str, prefix: &str) -> bool {
    text.starts_with(prefix)
        && text[prefix.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c))
}

/// Strips separators a speaker leaves between a trigger and its argument.
pub fn strip_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | ';' | '.' | '!' | '?' | '"'))
}

/// "VOLUME_UP" -> "volume up"
pub fn humanize(name: &str) -> String {
    normalize(name)
}
