// src/matching/typo.rs - Typo detection and typo variation generation
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::matching::normalize::{looks_like_abbreviation, normalize};
use crate::matching::phonetic::{adjacent_keys, key_distance, metaphone, soundex};
use crate::matching::rules::{first_rewrite, RewriteRule};

const PATTERN_CONFIDENCE: f64 = 0.9;
const PHONETIC_TYPO_THRESHOLD: f64 = 0.8;
const KEYBOARD_TYPO_THRESHOLD: f64 = 0.7;

const SOUNDEX_MATCH_WEIGHT: f64 = 0.5;
const METAPHONE_MATCH_WEIGHT: f64 = 0.5;
const METAPHONE_PREFIX_BONUS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypoMethod {
    Pattern,
    Phonetic,
    Keyboard,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypoDetection {
    pub is_likely_typo: bool,
    pub confidence: f64,
    pub suggested_correction: Option<String>,
    pub method: TypoMethod,
}

impl TypoDetection {
    fn none() -> Self {
        Self {
            is_likely_typo: false,
            confidence: 0.0,
            suggested_correction: None,
            method: TypoMethod::None,
        }
    }
}

/// Frequently seen misspellings of organization names and name words.
static KNOWN_MISSPELLINGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("mircosoft", "Microsoft"),
        ("microsft", "Microsoft"),
        ("micosoft", "Microsoft"),
        ("gogle", "Google"),
        ("googel", "Google"),
        ("amazn", "Amazon"),
        ("amazom", "Amazon"),
        ("facebok", "Facebook"),
        ("wallmart", "Walmart"),
        ("walmat", "Walmart"),
        ("starbuks", "Starbucks"),
        ("verison", "Verizon"),
        ("nvidea", "Nvidia"),
        ("aple", "Apple"),
        ("compnay", "Company"),
        ("comapny", "Company"),
        ("corportation", "Corporation"),
        ("corpration", "Corporation"),
        ("internation", "International"),
        ("interational", "International"),
        ("tecnologies", "Technologies"),
        ("technolgies", "Technologies"),
        ("servics", "Services"),
        ("managment", "Management"),
        ("assocation", "Association"),
        ("goverment", "Government"),
        ("univeristy", "University"),
    ]
    .into_iter()
    .collect()
});

fn collapse_tripled_letters(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut run_char = None;
    let mut run_len = 0;
    for c in input.chars() {
        if Some(c.to_ascii_lowercase()) == run_char && c.is_alphabetic() {
            run_len += 1;
        } else {
            run_char = Some(c.to_ascii_lowercase());
            run_len = 1;
        }
        if run_len <= 2 {
            out.push(c);
        }
    }
    Some(out)
}

/// Replaces whole-word known misspellings; `None` when nothing matched.
pub fn correct_known_misspellings(input: &str) -> Option<String> {
    let mut changed = false;
    let words: Vec<String> = input
        .split_whitespace()
        .map(|word| {
            let core = word.trim_matches(|c: char| !c.is_alphanumeric());
            match KNOWN_MISSPELLINGS.get(core.to_lowercase().as_str()) {
                Some(fixed) => {
                    changed = true;
                    word.replacen(core, fixed, 1)
                }
                None => word.to_string(),
            }
        })
        .collect();
    if changed {
        Some(words.join(" "))
    } else {
        None
    }
}

/// Regex-based and table-based corrections, evaluated in order.
static TYPO_RULES: Lazy<Vec<RewriteRule>> = Lazy::new(|| {
    vec![
        RewriteRule::transform("tripled_letters", collapse_tripled_letters),
        RewriteRule::transform("known_misspelling", correct_known_misspellings),
        RewriteRule::regex("missing_space", r"([a-z]{3,})([A-Z][a-z]{3,})", "$1 $2"),
    ]
});

fn letters_only(s: &str) -> String {
    normalize(s).chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Combined Soundex/Metaphone similarity in [0, 1].
pub fn phonetic_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (letters_only(a), letters_only(b));
    let (sa, sb) = (soundex(&a), soundex(&b));
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;
    if sa == sb {
        score += SOUNDEX_MATCH_WEIGHT;
    }

    let (ma, mb) = (metaphone(&a), metaphone(&b));
    if !ma.is_empty() && ma == mb {
        score += METAPHONE_MATCH_WEIGHT;
    } else {
        let (short, long) = if ma.len() <= mb.len() { (&ma, &mb) } else { (&mb, &ma) };
        if short.len() >= 2 && long.starts_with(short.as_str()) {
            score += METAPHONE_PREFIX_BONUS;
        }
    }

    f64::min(score, 1.0)
}

/// Keyboard-adjacency similarity for equal-length strings, 0.0 otherwise.
///
/// Each differing position scores 0.9, 0.6 or 0.2 for key distance 1, 2 or
/// more; the total is divided by the number of differing positions.
pub fn keyboard_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut mismatches = 0usize;
    let mut total = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        if x == y {
            continue;
        }
        mismatches += 1;
        total += match key_distance(*x, *y) {
            Some(1) => 0.9,
            Some(2) => 0.6,
            _ => 0.2,
        };
    }

    if mismatches == 0 {
        0.0
    } else {
        total / mismatches as f64
    }
}

/// Decides whether `input` is a misspelling, optionally of one of `candidates`.
///
/// Abbreviation-looking inputs and inputs that already name a candidate are
/// never corrected. Pattern rules win with a fixed confidence; otherwise the best candidate by phonetic or keyboard
/// similarity is reported when it clears its threshold.
pub fn detect_typo<S: AsRef<str>>(input: &str, candidates: &[S]) -> TypoDetection {
    let trimmed = input.trim();
    if trimmed.is_empty() || looks_like_abbreviation(trimmed) {
        return TypoDetection::none();
    }

    let normalized_input = normalize(trimmed);
    if candidates
        .iter()
        .any(|candidate| normalize(candidate.as_ref()) == normalized_input)
    {
        return TypoDetection::none();
    }

    if let Some((_label, corrected)) = first_rewrite(&TYPO_RULES, trimmed) {
        return TypoDetection {
            is_likely_typo: true,
            confidence: PATTERN_CONFIDENCE,
            suggested_correction: Some(corrected),
            method: TypoMethod::Pattern,
        };
    }

    let mut best: Option<(f64, TypoMethod, &str)> = None;

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let phonetic = phonetic_similarity(trimmed, candidate);
        let keyboard = keyboard_similarity(trimmed, candidate);

        let scored = match (phonetic > PHONETIC_TYPO_THRESHOLD, keyboard > KEYBOARD_TYPO_THRESHOLD) {
            (true, true) if keyboard > phonetic => Some((keyboard, TypoMethod::Keyboard)),
            (true, _) => Some((phonetic, TypoMethod::Phonetic)),
            (false, true) => Some((keyboard, TypoMethod::Keyboard)),
            (false, false) => None,
        };

        if let Some((score, method)) = scored {
            if best.map_or(true, |(b, _, _)| score > b) {
                best = Some((score, method, candidate));
            }
        }
    }

    match best {
        Some((score, method, candidate)) => TypoDetection {
            is_likely_typo: true,
            confidence: score,
            suggested_correction: Some(candidate.to_string()),
            method,
        },
        None => TypoDetection::none(),
    }
}

fn with_case_of(template: char, c: char) -> char {
    if template.is_uppercase() {
        c.to_ascii_uppercase()
    } else {
        c
    }
}

/// Plausible misspellings of `name`: adjacent-key substitutions,
/// transpositions, deletions (not for abbreviations), duplications and a
/// two-word swap. The input itself is never included.
pub fn generate_typo_variations(name: &str) -> BTreeSet<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut variations = BTreeSet::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            continue;
        }
        for adj in adjacent_keys(c) {
            let mut v = chars.clone();
            v[i] = with_case_of(c, adj);
            variations.insert(v.into_iter().collect::<String>());
        }
    }

    for i in 0..chars.len().saturating_sub(1) {
        if chars[i] != chars[i + 1] {
            let mut v = chars.clone();
            v.swap(i, i + 1);
            variations.insert(v.into_iter().collect::<String>());
        }
    }

    if !looks_like_abbreviation(name) && chars.len() > 1 {
        for i in 0..chars.len() {
            let mut v = chars.clone();
            v.remove(i);
            variations.insert(v.into_iter().collect::<String>());
        }
    }

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            let mut v = chars.clone();
            v.insert(i, c);
            variations.insert(v.into_iter().collect::<String>());
        }
    }

    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() == 2 {
        variations.insert(format!("{} {}", words[1], words[0]));
    }

    variations.remove(name);
    variations.retain(|v| !v.trim().is_empty());
    variations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_typo_known_misspelling() {
        let detection = detect_typo("Mircosoft", &["Microsoft"]);
        assert!(detection.is_likely_typo);
        assert_eq!(detection.method, TypoMethod::Pattern);
        assert_eq!(detection.suggested_correction.as_deref(), Some("Microsoft"));
        assert!((detection.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_rules() {
        let tripled = detect_typo("Hellloo Foods", &[] as &[&str]);
        assert_eq!(tripled.suggested_correction.as_deref(), Some("Helloo Foods"));

        let spacing = detect_typo("GoldmanSachs", &[] as &[&str]);
        assert_eq!(spacing.suggested_correction.as_deref(), Some("Goldman Sachs"));
    }

    #[test]
    fn test_camel_case_name_of_a_candidate_is_not_a_typo() {
        let detection = detect_typo("BlackRock", &["BlackRock", "Black Rock Coffee Bar"]);
        assert!(!detection.is_likely_typo);
        assert!(detection.suggested_correction.is_none());

        let detection = detect_typo("WordPress", &["WordPress Inc."]);
        assert!(!detection.is_likely_typo);
    }

    #[test]
    fn test_abbreviations_are_never_typos() {
        let detection = detect_typo("IBM", &["IBN", "IBM Corp", "International Business Machines"]);
        assert!(!detection.is_likely_typo);
        assert_eq!(detection.method, TypoMethod::None);
        assert_eq!(detection.confidence, 0.0);
    }

    #[test]
    fn test_phonetic_typo() {
        let detection = detect_typo("Appel", &["Apple Inc.", "Maple Leaf Foods"]);
        assert!(detection.is_likely_typo);
        assert_eq!(detection.method, TypoMethod::Phonetic);
        assert_eq!(detection.suggested_correction.as_deref(), Some("Apple Inc."));
    }

    #[test]
    fn test_keyboard_typo() {
        let detection = detect_typo("Mivrosoft", &["Microsoft", "Macrosoft"]);
        assert!(detection.is_likely_typo);
        assert_eq!(detection.method, TypoMethod::Keyboard);
        assert_eq!(detection.suggested_correction.as_deref(), Some("Microsoft"));
        assert!((detection.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_no_typo_for_unrelated_names() {
        let detection = detect_typo("Zebra Logistics", &["Apple Inc.", "Microsoft"]);
        assert!(!detection.is_likely_typo);
        assert!(detection.suggested_correction.is_none());
    }

    #[test]
    fn test_keyboard_similarity_requires_equal_length() {
        assert_eq!(keyboard_similarity("acme", "acmes"), 0.0);
        assert_eq!(keyboard_similarity("acme", "acme"), 0.0);
        assert!((keyboard_similarity("acme", "acne") - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_phonetic_similarity_bounds() {
        assert_eq!(phonetic_similarity("Apple", "Aple"), 1.0);
        assert!(phonetic_similarity("Apple", "Zebra") < 0.5);
        assert_eq!(phonetic_similarity("", "Apple"), 0.0);
    }

    #[test]
    fn test_generate_typo_variations() {
        let variations = generate_typo_variations("Acme Corp");
        assert!(variations.contains("Corp Acme"));
        assert!(variations.contains("Amce Corp"));
        assert!(variations.contains("Acm Corp"));
        assert!(variations.contains("Accme Corp"));
        assert!(variations.contains("Xcme Corp") || variations.contains("Scme Corp"));
        assert!(!variations.contains("Acme Corp"));
    }

    #[test]
    fn test_typo_variations_skip_deletions_for_abbreviations() {
        let variations = generate_typo_variations("IBM");
        assert!(!variations.contains("IB"));
        assert!(!variations.contains("BM"));
        assert!(variations.contains("BIM"));
        assert!(variations.contains("IIBM"));
    }
}
