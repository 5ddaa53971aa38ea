use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Trailing qualifiers that do not denote a different game.
pub const EDITION_SUFFIXES: [&str; 4] = ["early access", "demo", "beta", "alpha"];

/// Placeholder substituted for every standalone digit run when building a skeleton.
pub const NUMBER_PLACEHOLDER: &str = "#";

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\b").expect("static regex"))
}

/// Lowercase and trim a raw title. Punctuation is left alone.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Remove one trailing edition qualifier ("early access", "demo", "beta", "alpha").
///
/// The input is normalized first. A suffix only counts when it sits on a word
/// boundary, so "Tetris Alphabeta" is untouched. Separator characters left
/// dangling by the removal ("Foo - Demo") are trimmed too.
pub fn strip_edition_suffix(s: &str) -> String {
    let norm = normalize(s);
    for suffix in EDITION_SUFFIXES {
        let Some(head) = norm.strip_suffix(suffix) else {
            continue;
        };
        if head.is_empty() {
            // the whole title is the qualifier
            return norm;
        }
        if head.chars().last().is_some_and(|c| c.is_alphanumeric()) {
            continue;
        }
        return head
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '(' | '[' | ','))
            .to_string();
    }
    norm
}

/// Standalone digit runs in order of appearance ("Dark Souls 3" -> ["3"]).
pub fn extract_numbers(s: &str) -> Vec<String> {
    number_re()
        .find_iter(s)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Same values with the same multiplicities, order ignored.
pub fn same_multiset(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for n in a {
        *counts.entry(n.as_str()).or_default() += 1;
    }
    for n in b {
        *counts.entry(n.as_str()).or_default() -= 1;
    }
    counts.values().all(|c| *c == 0)
}

/// Title with each standalone digit run replaced by [`NUMBER_PLACEHOLDER`].
pub fn skeleton(s: &str) -> String {
    number_re().replace_all(s, NUMBER_PLACEHOLDER).into_owned()
}

/// Positional overlap score in `[0, 1]`.
///
/// Aligns the shorter string against the start of the longer one, counts the
/// index-wise equal characters and divides by the longer length. This is not an
/// edit distance: a single insertion near the front shifts everything after it
/// and collapses the score. The matcher thresholds assume exactly this metric.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if longer.is_empty() {
        return 1.0;
    }
    let equal = shorter
        .iter()
        .zip(longer.iter())
        .filter(|(x, y)| x == y)
        .count();
    equal as f64 / longer.len() as f64
}

/// A raw title pre-processed for the matching rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTitle {
    raw: String,
    normalized: String,
    stripped: String,
    numbers: Vec<String>,
}

impl NormalizedTitle {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        let stripped = strip_edition_suffix(&normalized);
        let numbers = extract_numbers(&stripped);
        Self {
            raw: raw.to_string(),
            normalized,
            stripped,
            numbers,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased, trimmed form.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Normalized form with any edition suffix removed.
    pub fn stripped(&self) -> &str {
        &self.stripped
    }

    /// Number tokens of the stripped form.
    pub fn numbers(&self) -> &[String] {
        &self.numbers
    }

    pub fn has_numbers(&self) -> bool {
        !self.numbers.is_empty()
    }

    pub fn has_colon(&self) -> bool {
        self.stripped.contains(':')
    }

    pub fn skeleton(&self) -> String {
        skeleton(&self.stripped)
    }

    /// Split once on the first colon into trimmed (prefix, subtitle).
    pub fn split_subtitle(&self) -> Option<(&str, &str)> {
        self.stripped
            .split_once(':')
            .map(|(prefix, subtitle)| (prefix.trim(), subtitle.trim()))
    }
}
