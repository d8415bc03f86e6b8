//! Text folding shared by alias keys, entity keys, theme aliases and both
//! search indices. Alias and entity keys are produced by `alias_key` on both
//! the registering and the looking-up side, so storage and lookup agree.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics, fold `ё` to `е` and collapse whitespace.
///
/// `й` is kept as-is: it is a letter of its own, not `и` with a mark.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'ё' | 'Ё' => folded.push('е'),
            'й' | 'Й' => folded.push('й'),
            _ => folded.extend(c.nfkd().filter(|m| !is_combining_mark(*m))),
        }
    }
    folded.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize` plus trailing sentence punctuation removed, so "часы работы?"
/// and "часы работы" hit the same alias.
pub fn normalize_query(text: &str) -> String {
    normalize(text)
        .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.' | '…' | ',' | ';' | ':'))
        .trim_end()
        .to_string()
}

/// Key form of alias, heading and entity names. Matches what
/// `normalize_query` makes of a query, so `## Больно ли?` is found by
/// "больно ли" and by "Больно ли?".
pub fn alias_key(text: &str) -> String {
    normalize_query(text)
}

/// URL-ish identifier: normalized text with every run of characters outside
/// `[a-z0-9а-я]` collapsed into a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in normalize(text).chars() {
        if c.is_ascii_alphanumeric() || ('а'..='я').contains(&c) {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Drops hyphens, dashes and whitespace: "all-on-4" and "all on 4" both
/// become "allon4".
pub fn strip_separators(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '-' | '–' | '—') && !c.is_whitespace())
        .collect()
}
