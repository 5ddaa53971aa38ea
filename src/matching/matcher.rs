use std::fmt;

use serde::Serialize;

use crate::normalization::title::{same_multiset, similarity, NormalizedTitle};

/// Subtitles must score strictly above this to be considered the same.
pub const SUBTITLE_SIMILARITY: f64 = 0.8;

/// Whole titles without numbers or colons must score strictly above this.
pub const FUZZY_SIMILARITY: f64 = 0.9;

/// Which rule produced a verdict. Rules are evaluated in declaration order and
/// the first one that decides wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Normalized strings are equal.
    Exact,
    /// Equal once edition suffixes are stripped.
    EditionSuffix,
    /// Only one side carries sequel numbers.
    NumberPresence,
    /// Both sides carry numbers but not the same ones.
    NumberMismatch,
    /// Same numbers in the same structural positions.
    NumberSkeleton,
    /// Only one side has a subtitle.
    ColonPresence,
    /// Text before the first colon differs.
    SubtitlePrefix,
    /// Identical subtitles under an identical prefix.
    SubtitleExact,
    /// Subtitles differ and at least one is numbered.
    SubtitleNumbered,
    /// Subtitles compared by positional similarity.
    SubtitleSimilarity,
    /// Whole-title positional similarity.
    Fuzzy,
    /// No rule decided.
    NoMatch,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchRule::Exact => "exact",
            MatchRule::EditionSuffix => "edition_suffix",
            MatchRule::NumberPresence => "number_presence",
            MatchRule::NumberMismatch => "number_mismatch",
            MatchRule::NumberSkeleton => "number_skeleton",
            MatchRule::ColonPresence => "colon_presence",
            MatchRule::SubtitlePrefix => "subtitle_prefix",
            MatchRule::SubtitleExact => "subtitle_exact",
            MatchRule::SubtitleNumbered => "subtitle_numbered",
            MatchRule::SubtitleSimilarity => "subtitle_similarity",
            MatchRule::Fuzzy => "fuzzy",
            MatchRule::NoMatch => "no_match",
        };
        f.write_str(s)
    }
}

/// Outcome of one matching attempt. `matched_id` is only filled in by the
/// catalog scanner, which knows the row identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchVerdict {
    pub matched_title: Option<String>,
    pub matched_id: Option<i64>,
    pub found: bool,
    pub rule: MatchRule,
}

impl MatchVerdict {
    fn hit(catalog_title: &str, rule: MatchRule) -> Self {
        Self {
            matched_title: Some(catalog_title.to_string()),
            matched_id: None,
            found: true,
            rule,
        }
    }

    fn miss(rule: MatchRule) -> Self {
        Self {
            matched_title: None,
            matched_id: None,
            found: false,
            rule,
        }
    }

    /// Verdict for a search that never produced a hit.
    pub fn not_found() -> Self {
        Self::miss(MatchRule::NoMatch)
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.matched_id = Some(id);
        self
    }
}

/// Decide whether `candidate_title` names the same game as `catalog_title`.
///
/// Pure and deterministic. Structural signals (numbers, subtitles) are checked
/// before character similarity, and a structural mismatch is final.
pub fn match_titles(catalog_title: &str, candidate_title: &str) -> MatchVerdict {
    let catalog = NormalizedTitle::new(catalog_title);
    let candidate = NormalizedTitle::new(candidate_title);
    match decide(&catalog, &candidate) {
        (true, rule) => MatchVerdict::hit(catalog_title, rule),
        (false, rule) => MatchVerdict::miss(rule),
    }
}

/// Same as [`match_titles`] with the catalog side already normalized.
pub fn match_normalized(catalog: &NormalizedTitle, candidate: &NormalizedTitle) -> MatchVerdict {
    match decide(catalog, candidate) {
        (true, rule) => MatchVerdict::hit(catalog.raw(), rule),
        (false, rule) => MatchVerdict::miss(rule),
    }
}

fn decide(a: &NormalizedTitle, b: &NormalizedTitle) -> (bool, MatchRule) {
    if a.normalized() == b.normalized() {
        return (true, MatchRule::Exact);
    }
    if a.stripped() == b.stripped() {
        return (true, MatchRule::EditionSuffix);
    }

    if let Some(decision) = sequel_rule(a, b) {
        return decision;
    }
    if let Some(decision) = subtitle_rule(a, b) {
        return decision;
    }

    if !a.has_numbers() && !b.has_numbers() && !a.has_colon() && !b.has_colon() {
        return (
            similarity(a.stripped(), b.stripped()) > FUZZY_SIMILARITY,
            MatchRule::Fuzzy,
        );
    }
    (false, MatchRule::NoMatch)
}

fn sequel_rule(a: &NormalizedTitle, b: &NormalizedTitle) -> Option<(bool, MatchRule)> {
    match (a.has_numbers(), b.has_numbers()) {
        (false, false) => None,
        (true, false) | (false, true) => Some((false, MatchRule::NumberPresence)),
        (true, true) => {
            if !same_multiset(a.numbers(), b.numbers()) {
                Some((false, MatchRule::NumberMismatch))
            } else if a.skeleton() == b.skeleton() {
                Some((true, MatchRule::NumberSkeleton))
            } else {
                None
            }
        }
    }
}

fn subtitle_rule(a: &NormalizedTitle, b: &NormalizedTitle) -> Option<(bool, MatchRule)> {
    let (sub_a, sub_b) = match (a.split_subtitle(), b.split_subtitle()) {
        (None, None) => return None,
        (Some(_), None) | (None, Some(_)) => return Some((false, MatchRule::ColonPresence)),
        (Some((prefix_a, sub_a)), Some((prefix_b, sub_b))) => {
            if prefix_a != prefix_b {
                return Some((false, MatchRule::SubtitlePrefix));
            }
            (sub_a, sub_b)
        }
    };
    if sub_a == sub_b {
        return Some((true, MatchRule::SubtitleExact));
    }
    let numbered = |s: &str| s.chars().any(|c| c.is_ascii_digit());
    if numbered(sub_a) || numbered(sub_b) {
        return Some((false, MatchRule::SubtitleNumbered));
    }
    Some((
        similarity(sub_a, sub_b) > SUBTITLE_SIMILARITY,
        MatchRule::SubtitleSimilarity,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_match(a: &str, b: &str, rule: MatchRule) {
        let v = match_titles(a, b);
        assert!(v.found, "{a:?} vs {b:?} should match, got {v:?}");
        assert_eq!(v.rule, rule, "{a:?} vs {b:?}");
        assert_eq!(v.matched_title.as_deref(), Some(a));
    }

    fn assert_no_match(a: &str, b: &str, rule: MatchRule) {
        let v = match_titles(a, b);
        assert!(!v.found, "{a:?} vs {b:?} should not match, got {v:?}");
        assert_eq!(v.rule, rule, "{a:?} vs {b:?}");
        assert!(v.matched_title.is_none());
    }

    #[test]
    fn every_title_matches_itself() {
        for s in [
            "",
            "Portal",
            "Portal 2",
            "Tomb Raider: Legend",
            "Foo: Part 2",
            "Game Name Early Access",
            "  Hollow Knight  ",
            "2 Fast 2 Furious: 3",
        ] {
            assert_match(s, s, MatchRule::Exact);
        }
    }

    #[test]
    fn case_and_whitespace_are_exact() {
        assert_match("Hades", "  HADES ", MatchRule::Exact);
    }

    #[test]
    fn edition_suffix_is_ignored() {
        assert_match("Game Name", "Game Name Early Access", MatchRule::EditionSuffix);
        assert_match("Valheim Demo", "Valheim", MatchRule::EditionSuffix);
        assert_match("Portal 2", "Portal 2 Beta", MatchRule::EditionSuffix);
    }

    #[test]
    fn different_sequel_numbers_never_match() {
        assert_no_match("Dark Souls 2", "Dark Souls 3", MatchRule::NumberMismatch);
        assert_no_match("Foo: Part 2", "Foo: Part 3", MatchRule::NumberMismatch);
    }

    #[test]
    fn numbered_title_never_matches_unnumbered() {
        assert_no_match("Portal", "Portal 2", MatchRule::NumberPresence);
        assert_no_match("Portal 2", "Portal", MatchRule::NumberPresence);
    }

    #[test]
    fn same_numbers_same_structure_match() {
        assert_match("Portal 2", "Portal 2 Early Access", MatchRule::EditionSuffix);
        // skeletons only agree when the same numbers are permuted
        assert_match("Versus 1 vs 2", "Versus 2 vs 1", MatchRule::NumberSkeleton);
    }

    #[test]
    fn roman_numerals_are_not_numbers() {
        // known boundary: "vii" carries no digit run, "7" does
        assert_no_match("Final Fantasy VII", "Final Fantasy 7", MatchRule::NumberPresence);
    }

    #[test]
    fn subtitles_compare_prefix_then_subtitle() {
        assert_match("Tomb Raider: Legend", "Tomb Raider: Legend", MatchRule::Exact);
        assert_match("Tomb Raider:Legend", "Tomb Raider: Legend", MatchRule::SubtitleExact);
        assert_no_match(
            "Tomb Raider: Legend",
            "Tomb Raider: Anniversary",
            MatchRule::SubtitleSimilarity,
        );
        assert_no_match("Tomb Raider: Legend", "Tomb Rider: Legend", MatchRule::SubtitlePrefix);
    }

    #[test]
    fn close_subtitles_match() {
        assert_match(
            "Mass Effect: Andromeda",
            "Mass Effect: Andromedaa",
            MatchRule::SubtitleSimilarity,
        );
        // 4/5 is not strictly above the threshold
        assert_no_match("Halo: Reach", "Halo: Reech", MatchRule::SubtitleSimilarity);
    }

    #[test]
    fn numbered_subtitles_must_be_identical() {
        assert_no_match(
            "Saga: Chapter 2 Rising",
            "Saga: Chapter 2 Risen",
            MatchRule::SubtitleNumbered,
        );
    }

    #[test]
    fn colon_on_one_side_only_rejects() {
        assert_no_match("Doom: Eternal", "Doom Eternal", MatchRule::ColonPresence);
    }

    #[test]
    fn fuzzy_fallback_needs_high_similarity() {
        assert_match("Hollow Knight", "Hollow Knight!", MatchRule::Fuzzy);
        assert_no_match("Celeste", "Celesta", MatchRule::Fuzzy);
        assert_no_match("Stardew Valley", "Stardew Valey", MatchRule::Fuzzy);
    }

    #[test]
    fn same_numbers_different_skeleton_without_colon_is_no_match() {
        assert_no_match("2 Worlds", "Worlds 2", MatchRule::NoMatch);
        assert_no_match("Dark Souls 3", "Dark-Souls 3", MatchRule::NoMatch);
    }

    #[test]
    fn verdict_carries_catalog_title() {
        let v = match_titles("Portal 2", "portal 2");
        assert_eq!(v.matched_title.as_deref(), Some("Portal 2"));
        assert_eq!(v.matched_id, None);
        assert_eq!(v.with_id(620).matched_id, Some(620));
    }
}
