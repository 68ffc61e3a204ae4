//! Spoken-summary extraction.
//!
//! Model output is usually several paragraphs; narration only speaks a
//! short line per model. [`spoken_summary`] picks that line using an
//! ordered fallback:
//!
//! 1. the text after the last "Summary:" label, first sentence only;
//! 2. otherwise the final sentence of the text;
//! 3. otherwise a centered window of [`MAX_SPOKEN_WORDS`] words;
//! 4. otherwise every word, when there are fewer than that.
//!
//! Every candidate is capped at [`MAX_SPOKEN_WORDS`] words.

/// Upper bound on the words spoken per result.
pub const MAX_SPOKEN_WORDS: usize = 10;

const SUMMARY_MARKER: &str = "summary";
const SENTENCE_END: [char; 3] = ['.', '!', '?'];

/// True when the text denotes an error and should not be spoken.
pub fn is_error_text(text: &str) -> bool {
    text.to_lowercase().contains("error")
}

/// Derive the short line to speak for `text`, or `None` if it has no words.
pub fn spoken_summary(text: &str) -> Option<String> {
    after_marker(text)
        .or_else(|| final_sentence(text))
        .or_else(|| centered_window(text))
        .or_else(|| all_words(text))
}

fn after_marker(text: &str) -> Option<String> {
    let rest = text[label_end(text)?..].trim_start_matches(|c: char| c == '*' || c.is_whitespace());
    let sentence = rest
        .split(|c: char| SENTENCE_END.contains(&c) || c == '\n')
        .next()
        .unwrap_or_default();
    cap_words(sentence)
}

/// Byte offset just past the last "summary" label in `text`.
///
/// A label is the word at the start of a line or sentence, optionally
/// wrapped in `*` or `#`, followed by `:` or `-`. The word inside prose
/// ("here is a summary of", "in summary,") is not a label.
fn label_end(text: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let is_decoration = |c: char| c == '*' || c == '#' || c == ' ' || c == '\t';

    lower
        .match_indices(SUMMARY_MARKER)
        .filter_map(|(at, _)| {
            let before = lower[..at].trim_end_matches(is_decoration);
            let opens_sentence =
                before.is_empty() || before.ends_with(|c: char| c == '\n' || SENTENCE_END.contains(&c));
            if !opens_sentence {
                return None;
            }
            let word_end = at + SUMMARY_MARKER.len();
            let after = lower[word_end..].trim_start_matches(is_decoration);
            let separator = after.chars().next().filter(|c| *c == ':' || *c == '-')?;
            Some(lower.len() - after.len() + separator.len_utf8())
        })
        .last()
}

/// A sentence holding nothing but a summary label, such as a trailing
/// "Summary:" the model never filled in.
fn is_bare_label(sentence: &str) -> bool {
    label_end(sentence).is_some_and(|end| {
        sentence[end..]
            .trim_matches(|c: char| c == '*' || c == ':' || c == '-' || c.is_whitespace())
            .is_empty()
    })
}

/// Last sentence of the text, terminated or not. Text without any
/// sentence terminator has no sentences.
fn final_sentence(text: &str) -> Option<String> {
    if !text.contains(SENTENCE_END) {
        return None;
    }
    text.split(SENTENCE_END)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_bare_label(s))
        .last()
        .and_then(cap_words)
}

fn centered_window(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < MAX_SPOKEN_WORDS {
        return None;
    }
    let start = (words.len() - MAX_SPOKEN_WORDS) / 2;
    Some(words[start..start + MAX_SPOKEN_WORDS].join(" "))
}

fn all_words(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn cap_words(fragment: &str) -> Option<String> {
    let words: Vec<&str> = fragment.split_whitespace().take(MAX_SPOKEN_WORDS).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
