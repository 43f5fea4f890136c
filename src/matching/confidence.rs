// src/matching/confidence.rs - Multi-factor confidence calculus
use std::cmp::Ordering;

use strsim::levenshtein;

use crate::matching::normalize::{is_potential_abbreviation, looks_like_abbreviation, normalize};
use crate::matching::rewrite::ticker_expansions;
use crate::models::{CandidateEntity, MatchContext, MatchType, ScoredCandidate};

const SEARCH_WEIGHT_WITH_AI: f64 = 0.3;
const SIMILARITY_WEIGHT_WITH_AI: f64 = 0.2;
const AI_WEIGHT: f64 = 0.4;
const CONTEXT_WEIGHT_WITH_AI: f64 = 0.1;

const SEARCH_WEIGHT: f64 = 0.5;
const SIMILARITY_WEIGHT: f64 = 0.4;
const CONTEXT_WEIGHT: f64 = 0.1;

const VARIATION_THRESHOLD: f64 = 0.9;
/// Tolerance for threshold comparisons on differences of confidences.
const SCORE_EPSILON: f64 = 1e-9;
const SEMANTIC_THRESHOLD: f64 = 0.7;

/// Similarity credited to a recognised abbreviation of the canonical name.
const ABBREVIATION_SIMILARITY: f64 = 0.9;
/// Discount applied to similarity measured through a typo correction.
pub const CORRECTED_SIMILARITY_DISCOUNT: f64 = 0.95;

const COUNTRY_EXACT: f64 = 1.0;
const STATE_EXACT: f64 = 0.8;
const COUNTRY_CONTAINS: f64 = 0.5;
const STATE_CONTAINS: f64 = 0.4;
const INDUSTRY_EXACT: f64 = 1.0;
const INDUSTRY_CONTAINS: f64 = 0.6;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceFactors {
    pub search_score: Option<f64>,
    pub string_similarity: Option<f64>,
    pub ai_score: Option<f64>,
    pub context_score: Option<f64>,
}

/// Weighted average of the factors that are present, clamped to [0, 1].
///
/// The AI score, when present, carries the largest weight; without it the
/// remaining weights are redistributed. No factors at all scores 0.
pub fn score(factors: &ConfidenceFactors) -> f64 {
    let weighted = if factors.ai_score.is_some() {
        [
            (factors.search_score, SEARCH_WEIGHT_WITH_AI),
            (factors.string_similarity, SIMILARITY_WEIGHT_WITH_AI),
            (factors.ai_score, AI_WEIGHT),
            (factors.context_score, CONTEXT_WEIGHT_WITH_AI),
        ]
    } else {
        [
            (factors.search_score, SEARCH_WEIGHT),
            (factors.string_similarity, SIMILARITY_WEIGHT),
            (None, 0.0),
            (factors.context_score, CONTEXT_WEIGHT),
        ]
    };

    let (sum, weights) = weighted
        .iter()
        .filter_map(|(value, weight)| value.map(|v| (v.clamp(0.0, 1.0) * weight, *weight)))
        .fold((0.0, 0.0), |(s, w), (v, wt)| (s + v, w + wt));

    if weights <= 0.0 {
        return 0.0;
    }
    (sum / weights).clamp(0.0, 1.0)
}

/// `1 - levenshtein / max_len`, 1.0 for two empty strings.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Best similarity of `query` against any name of `entity`, on normalized forms.
pub fn name_similarity(query: &str, entity: &CandidateEntity) -> f64 {
    let query = normalize(query);
    entity
        .names()
        .map(|name| string_similarity(&query, &normalize(name)))
        .fold(0.0, f64::max)
}

/// Whether `raw` reads as an abbreviation of this entity: initials of the
/// canonical name, an alias spelled the same way, or a known ticker.
pub fn is_abbreviation_match(raw: &str, entity: &CandidateEntity) -> bool {
    let raw = raw.trim();
    if !looks_like_abbreviation(raw) {
        return false;
    }
    if is_potential_abbreviation(raw, &entity.canonical_name) {
        return true;
    }
    if entity.aliases.iter().any(|alias| alias.trim().eq_ignore_ascii_case(raw)) {
        return true;
    }
    let canonical = normalize(&entity.canonical_name);
    ticker_expansions(raw).iter().any(|expansion| {
        let expansion = normalize(expansion);
        !expansion.is_empty() && canonical.starts_with(&expansion)
    })
}

fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn determine_match_type(
    candidate_name: &str,
    matched_name: &str,
    confidence: f64,
    is_abbreviation: bool,
) -> MatchType {
    if squash(candidate_name) == squash(matched_name) {
        MatchType::Exact
    } else if is_abbreviation {
        MatchType::Abbreviation
    } else if confidence >= VARIATION_THRESHOLD {
        MatchType::Variation
    } else if confidence >= SEMANTIC_THRESHOLD {
        MatchType::Semantic
    } else {
        MatchType::Fuzzy
    }
}

/// True when at least two candidates exist and the top two are within
/// `threshold` of each other. Expects confidences sorted descending.
pub fn has_ambiguous_matches(sorted_confidences: &[f64], threshold: f64) -> bool {
    match sorted_confidences {
        [top, second, ..] => top - second <= threshold + SCORE_EPSILON,
        _ => false,
    }
}

fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

fn lowered(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn region_score(region: &str, entity: &CandidateEntity) -> f64 {
    let country = lowered(&entity.country).unwrap_or_default();
    let state = lowered(&entity.state).unwrap_or_default();

    if !country.is_empty() && country == region {
        COUNTRY_EXACT
    } else if !state.is_empty() && state == region {
        STATE_EXACT
    } else if contains_either(&country, region) {
        COUNTRY_CONTAINS
    } else if contains_either(&state, region) {
        STATE_CONTAINS
    } else {
        0.0
    }
}

fn industry_score(industry: &str, entity: &CandidateEntity) -> f64 {
    let candidate = lowered(&entity.industry).unwrap_or_default();
    if !candidate.is_empty() && candidate == industry {
        INDUSTRY_EXACT
    } else if contains_either(&candidate, industry) {
        INDUSTRY_CONTAINS
    } else {
        0.0
    }
}

/// Agreement between caller context and the candidate, averaged over the
/// scorable factors the caller supplied (region, industry). `None` when
/// nothing scorable was supplied.
pub fn context_score(context: Option<&MatchContext>, entity: &CandidateEntity) -> Option<f64> {
    let context = context?;
    let mut factors = Vec::with_capacity(2);
    if let Some(region) = lowered(&context.region) {
        factors.push(region_score(&region, entity));
    }
    if let Some(industry) = lowered(&context.industry) {
        factors.push(industry_score(&industry, entity));
    }
    if factors.is_empty() {
        None
    } else {
        Some(factors.iter().sum::<f64>() / factors.len() as f64)
    }
}

/// Descending confidence, then search score, then canonical name.
pub fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.final_confidence
        .total_cmp(&a.final_confidence)
        .then_with(|| b.search_score.total_cmp(&a.search_score))
        .then_with(|| a.entity.canonical_name.cmp(&b.entity.canonical_name))
}

pub fn rank_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(compare_candidates);
}

/// Scores candidates for one request.
pub struct CandidateScorer<'a> {
    raw_name: &'a str,
    context: Option<&'a MatchContext>,
    correction: Option<String>,
}

impl<'a> CandidateScorer<'a> {
    pub fn new(raw_name: &'a str, context: Option<&'a MatchContext>) -> Self {
        Self {
            raw_name,
            context,
            correction: None,
        }
    }

    /// Also measures similarity through a typo correction of the input.
    pub fn with_correction(mut self, corrected: Option<String>) -> Self {
        self.correction = corrected;
        self
    }

    fn similarity(&self, entity: &CandidateEntity, is_abbreviation: bool) -> f64 {
        let mut similarity = name_similarity(self.raw_name, entity);
        if let Some(corrected) = &self.correction {
            similarity = similarity.max(name_similarity(corrected, entity) * CORRECTED_SIMILARITY_DISCOUNT);
        }
        if is_abbreviation {
            similarity = similarity.max(ABBREVIATION_SIMILARITY);
        }
        similarity
    }

    pub fn score(&self, entity: CandidateEntity, search_score: f64) -> ScoredCandidate {
        let is_abbreviation = is_abbreviation_match(self.raw_name, &entity);
        let search_score = search_score.clamp(0.0, 1.0);
        let similarity = self.similarity(&entity, is_abbreviation);
        let context = context_score(self.context, &entity);

        let final_confidence = score(&ConfidenceFactors {
            search_score: Some(search_score),
            string_similarity: Some(similarity),
            ai_score: None,
            context_score: context,
        });
        let match_type =
            determine_match_type(&entity.canonical_name, self.raw_name, final_confidence, is_abbreviation);

        ScoredCandidate {
            entity,
            search_score,
            string_similarity: similarity,
            context_score: context.unwrap_or(0.0),
            ai_score: None,
            final_confidence,
            match_type,
        }
    }

    /// Folds an AI judgment into an already-scored candidate.
    pub fn apply_ai_score(&self, candidate: &mut ScoredCandidate, ai_score: f64) {
        let ai_score = ai_score.clamp(0.0, 1.0);
        let context = context_score(self.context, &candidate.entity);
        candidate.ai_score = Some(ai_score);
        candidate.final_confidence = score(&ConfidenceFactors {
            search_score: Some(candidate.search_score),
            string_similarity: Some(candidate.string_similarity),
            ai_score: Some(ai_score),
            context_score: context,
        });
        candidate.match_type = determine_match_type(
            &candidate.entity.canonical_name,
            self.raw_name,
            candidate.final_confidence,
            is_abbreviation_match(self.raw_name, &candidate.entity),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factors(search: f64, sim: f64, ai: Option<f64>, ctx: Option<f64>) -> ConfidenceFactors {
        ConfidenceFactors {
            search_score: Some(search),
            string_similarity: Some(sim),
            ai_score: ai,
            context_score: ctx,
        }
    }

    #[test]
    fn test_score_weighted_average_of_equal_factors() {
        for c in [0.0, 0.25, 0.5, 0.83, 1.0] {
            assert!((score(&factors(c, c, Some(c), Some(c))) - c).abs() < 1e-9);
            assert!((score(&factors(c, c, None, Some(c))) - c).abs() < 1e-9);
            assert!((score(&factors(c, c, None, None)) - c).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_bounds_and_weights() {
        let grid = [0.0, 0.1, 0.5, 0.9, 1.0, 1.7, -0.4];
        for &a in &grid {
            for &b in &grid {
                for ai in [None, Some(a), Some(b)] {
                    let s = score(&factors(a, b, ai, Some(b)));
                    assert!((0.0..=1.0).contains(&s), "{} out of range", s);
                }
            }
        }

        // 0.3 * 1.0 + 0.2 * 0.5 + 0.4 * 0.0 + 0.1 * 1.0 = 0.5
        assert!((score(&factors(1.0, 0.5, Some(0.0), Some(1.0))) - 0.5).abs() < 1e-9);
        // (0.5 * 1.0 + 0.4 * 0.5) / 0.9
        assert!((score(&factors(1.0, 0.5, None, None)) - 0.7 / 0.9).abs() < 1e-9);
        assert_eq!(score(&ConfidenceFactors::default()), 0.0);
    }

    #[test]
    fn test_string_similarity() {
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("apple", "apple"), 1.0);
        assert!((string_similarity("aple", "apple") - 0.8).abs() < 1e-9);
        assert_eq!(string_similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_determine_match_type_is_monotone() {
        assert_eq!(determine_match_type("Apple Inc.", "  apple   inc. ", 0.97, false), MatchType::Exact);
        assert_eq!(determine_match_type("Apple Inc.", "Apple", 0.92, false), MatchType::Variation);
        assert_eq!(determine_match_type("Apple Inc.", "Aple", 0.75, false), MatchType::Semantic);
        assert_eq!(determine_match_type("Apple Inc.", "Apl", 0.4, false), MatchType::Fuzzy);
        assert_eq!(
            determine_match_type("International Business Machines", "IBM", 0.99, true),
            MatchType::Abbreviation
        );
    }

    #[test]
    fn test_has_ambiguous_matches() {
        assert!(!has_ambiguous_matches(&[], 0.15));
        assert!(!has_ambiguous_matches(&[0.8], 0.15));
        assert!(has_ambiguous_matches(&[0.8, 0.7], 0.15));
        assert!(has_ambiguous_matches(&[0.8, 0.65], 0.15));
        assert!(!has_ambiguous_matches(&[0.8, 0.5, 0.49], 0.15));
    }

    #[test]
    fn test_ambiguity_gap_at_threshold_is_inclusive() {
        // 0.8 - 0.65 is 0.15000000000000002 in f64
        assert!(0.8 - 0.65 > 0.15);
        assert!(has_ambiguous_matches(&[0.8, 0.65], 0.15));
        assert!(has_ambiguous_matches(&[0.95, 0.8], 0.15));
        assert!(!has_ambiguous_matches(&[0.8, 0.6499], 0.15));
    }

    #[test]
    fn test_context_score() {
        let entity = CandidateEntity::new("1", "Acme Widgets")
            .with_industry("Industrial Manufacturing")
            .with_location(Some("United States"), Some("Ohio"));

        let ctx = |industry: Option<&str>, region: Option<&str>| MatchContext {
            industry: industry.map(String::from),
            region: region.map(String::from),
            size: None,
        };

        assert_eq!(context_score(None, &entity), None);
        assert_eq!(context_score(Some(&ctx(None, None)), &entity), None);
        assert_eq!(context_score(Some(&ctx(None, Some("united states"))), &entity), Some(1.0));
        assert_eq!(context_score(Some(&ctx(None, Some("Ohio"))), &entity), Some(0.8));
        assert_eq!(context_score(Some(&ctx(None, Some("States"))), &entity), Some(0.5));
        assert_eq!(context_score(Some(&ctx(None, Some("Ohio Valley"))), &entity), Some(0.4));
        assert_eq!(context_score(Some(&ctx(None, Some("Peru"))), &entity), Some(0.0));
        assert_eq!(context_score(Some(&ctx(Some("manufacturing"), None)), &entity), Some(0.6));
        assert_eq!(
            context_score(Some(&ctx(Some("Industrial Manufacturing"), Some("Peru"))), &entity),
            Some(0.5)
        );
    }

    #[test]
    fn test_abbreviation_detection() {
        let ibm = CandidateEntity::new("ibm", "International Business Machines Corporation");
        assert!(is_abbreviation_match("IBM", &ibm));
        assert!(!is_abbreviation_match("Ibm", &ibm));

        let bofa = CandidateEntity::new("bac", "Bank of America Corporation").with_aliases(["BAC"]);
        assert!(is_abbreviation_match("BAC", &bofa));

        let alphabet = CandidateEntity::new("goog", "Alphabet Inc.");
        assert!(is_abbreviation_match("GOOGL", &alphabet));
    }

    #[test]
    fn test_scorer_credits_typo_correction_below_identity() {
        let apple = CandidateEntity::new("aapl", "Apple Inc.");
        let plain = CandidateScorer::new("Aple", None).score(apple.clone(), 1.0);
        let corrected = CandidateScorer::new("Aple", None)
            .with_correction(Some("Apple".to_string()))
            .score(apple, 1.0);

        assert!((plain.string_similarity - 0.8).abs() < 1e-9);
        assert!((corrected.string_similarity - 0.95).abs() < 1e-9);
        assert!(corrected.final_confidence >= 0.95);
        assert_eq!(corrected.match_type, MatchType::Variation);
    }

    #[test]
    fn test_apply_ai_score_and_ranking() {
        let scorer = CandidateScorer::new("Acme", None);
        let mut a = scorer.score(CandidateEntity::new("a", "Acme Widgets"), 0.8);
        let mut b = scorer.score(CandidateEntity::new("b", "Acme Tools"), 0.8);
        scorer.apply_ai_score(&mut a, 0.95);
        scorer.apply_ai_score(&mut b, 0.05);
        assert_eq!(a.ai_score, Some(0.95));

        let mut ranked = vec![b.clone(), a.clone()];
        rank_candidates(&mut ranked);
        assert_eq!(ranked[0].entity.id, "a");

        // equal confidence and search score fall back to canonical name
        let c = scorer.score(CandidateEntity::new("c", "Zeta"), 0.5);
        let mut d = c.clone();
        d.entity.canonical_name = "Alpha".to_string();
        let mut tied = vec![c, d];
        rank_candidates(&mut tied);
        assert_eq!(tied[0].entity.canonical_name, "Alpha");
    }
}
