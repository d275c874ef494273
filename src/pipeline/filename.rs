//! Filename normalisation: turn a free-text title into a document name.
//!
//! [`to_filename`] is what ends up on the device; it is total and idempotent.
//! [`shorten`] is for log lines and progress output only — its result may
//! still contain characters the device rejects, so run it through
//! [`to_filename`] before using it as a name.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Extension appended to every generated filename.
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// Name used when a title has nothing left after sanitising.
pub const UNTITLED: &str = "Untitled";

/// Default word budget for [`shorten`].
pub const DEFAULT_SHORT_WORDS: usize = 6;

/// Articles, prepositions and conjunctions dropped by [`shorten`].
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "of", "for", "and", "or", "but", "in", "on", "at", "to", "from", "by",
        "with", "via", "using", "through",
    ]
    .into_iter()
    .collect()
});

/// Everything but word characters, whitespace and hyphens.
static RE_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());

/// Build a filesystem-safe filename from a title.
///
/// Keeps alphanumerics, spaces, hyphens and underscores; collapses space runs;
/// trims; appends `.pdf`. A title with nothing left becomes `Untitled.pdf`.
///
/// ```
/// use papershelf::pipeline::filename::to_filename;
/// assert_eq!(to_filename("  Attention: Is All   You Need?! "), "Attention Is All You Need.pdf");
/// ```
pub fn to_filename(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let stem = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let stem = if stem.is_empty() { UNTITLED } else { stem.as_str() };
    format!("{stem}.{DOCUMENT_EXTENSION}")
}

/// Drop a trailing `.pdf` (any case) from a name, if present.
pub fn strip_extension(name: &str) -> &str {
    let suffix_len = DOCUMENT_EXTENSION.len() + 1;
    if name.len() > suffix_len {
        let split = name.len() - suffix_len;
        if let (Some(stem), Some(ext)) = (name.get(..split), name.get(split..)) {
            if ext.eq_ignore_ascii_case(&format!(".{DOCUMENT_EXTENSION}")) {
                return stem;
            }
        }
    }
    name
}

/// Shorten a title to its key words for display.
///
/// Punctuation is stripped from each word and stop words are skipped; the
/// first `max_words` survivors are kept in order. When fewer than three
/// survive, raw words (cleaned, duplicates skipped) are added back until four
/// are kept or the title runs out. The result never exceeds `max_words` words.
pub fn shorten(title: &str, max_words: usize) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();
    let mut kept: Vec<String> = Vec::new();

    if max_words == 0 {
        return String::new();
    }

    for word in &words {
        let clean = clean_word(word);
        if !clean.is_empty() && !STOP_WORDS.contains(clean.to_lowercase().as_str()) {
            kept.push(clean);
            if kept.len() >= max_words {
                break;
            }
        }
    }

    let refill_to = 4.min(max_words);
    if kept.len() < 3 && words.len() > kept.len() {
        for word in &words {
            if kept.len() >= refill_to {
                break;
            }
            let clean = clean_word(word);
            if !clean.is_empty() && !kept.contains(&clean) {
                kept.push(clean);
            }
        }
    }

    kept.join(" ")
}

fn clean_word(word: &str) -> String {
    RE_PUNCTUATION.replace_all(word, "").into_owned()
}
