// src/matching/rewrite.rs - Alternate query strings for candidate search
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::matching::normalize::{extract_abbreviation, is_legal_suffix, normalize};
use crate::matching::rules::{all_rewrites, RewriteRule};
use crate::matching::typo::correct_known_misspellings;

const MIN_VARIATION_LEN: usize = 3;
pub const DEFAULT_VARIATION_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationType {
    Abbreviation,
    Punctuation,
    Spelling,
    WordOrder,
    Normalized,
}

/// Ticker symbols and well-known short forms mapped to organization names.
static TICKER_ALIASES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let table: [(&'static str, &'static [&'static str]); 30] = [
        ("IBM", &["International Business Machines"]),
        ("GE", &["General Electric"]),
        ("GM", &["General Motors"]),
        ("J&J", &["Johnson & Johnson"]),
        ("JNJ", &["Johnson & Johnson"]),
        ("P&G", &["Procter & Gamble"]),
        ("PG", &["Procter & Gamble"]),
        ("HP", &["Hewlett-Packard", "HP Inc"]),
        ("HPQ", &["HP Inc"]),
        ("AT&T", &["American Telephone and Telegraph"]),
        ("ATT", &["AT&T"]),
        ("BOFA", &["Bank of America"]),
        ("BAC", &["Bank of America"]),
        ("JPM", &["JPMorgan Chase"]),
        ("MSFT", &["Microsoft"]),
        ("AAPL", &["Apple"]),
        ("GOOGL", &["Alphabet", "Google"]),
        ("GOOG", &["Alphabet", "Google"]),
        ("AMZN", &["Amazon"]),
        ("META", &["Meta Platforms", "Facebook"]),
        ("3M", &["Minnesota Mining and Manufacturing"]),
        ("UPS", &["United Parcel Service"]),
        ("KFC", &["Kentucky Fried Chicken"]),
        ("BMW", &["Bayerische Motoren Werke"]),
        ("HSBC", &["Hongkong and Shanghai Banking Corporation"]),
        ("UBS", &["Union Bank of Switzerland"]),
        ("NVDA", &["Nvidia"]),
        ("TSLA", &["Tesla"]),
        ("WMT", &["Walmart"]),
        ("KO", &["Coca-Cola"]),
    ];
    table.into_iter().collect()
});

/// Known expansions of a ticker or short form, matched case-insensitively.
pub fn ticker_expansions(token: &str) -> &'static [&'static str] {
    TICKER_ALIASES
        .get(token.trim().to_uppercase().as_str())
        .copied()
        .unwrap_or(&[])
}

/// Full word <-> conventional abbreviation.
const WORD_ABBREVIATIONS: [(&str, &str); 20] = [
    ("corporation", "corp"),
    ("incorporated", "inc"),
    ("company", "co"),
    ("limited", "ltd"),
    ("international", "intl"),
    ("association", "assn"),
    ("brothers", "bros"),
    ("manufacturing", "mfg"),
    ("technology", "tech"),
    ("department", "dept"),
    ("university", "univ"),
    ("national", "natl"),
    ("services", "svcs"),
    ("management", "mgmt"),
    ("systems", "sys"),
    ("laboratories", "labs"),
    ("industries", "inds"),
    ("holdings", "hldgs"),
    ("group", "grp"),
    ("american", "amer"),
];

/// American / British spelling pairs.
const SPELLING_PAIRS: [(&str, &str); 14] = [
    ("center", "centre"),
    ("color", "colour"),
    ("defense", "defence"),
    ("labor", "labour"),
    ("program", "programme"),
    ("catalog", "catalogue"),
    ("theater", "theatre"),
    ("fiber", "fibre"),
    ("honor", "honour"),
    ("favorite", "favourite"),
    ("license", "licence"),
    ("jewelry", "jewellery"),
    ("aluminum", "aluminium"),
    ("analyze", "analyse"),
];

const PUNCTUATION_REPLACEMENTS: [(char, &[&str]); 6] = [
    ('&', &[" and ", " "]),
    ('+', &[" plus ", " and "]),
    ('-', &[" ", ""]),
    ('.', &["", " "]),
    (',', &["", " "]),
    ('\'', &[""]),
];

const DROPPABLE_MIDDLE_WORDS: [&str; 5] = ["of", "for", "and", "&", "the"];

static DOTTED_ACRONYM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z]\.){1,}[A-Za-z]\.?$").unwrap_or_else(|e| panic!("{}", e)));

static SUFFIX_SPELLING_RULES: Lazy<Vec<RewriteRule>> = Lazy::new(|| {
    vec![
        RewriteRule::regex("ization_to_isation", r"ization", "isation"),
        RewriteRule::regex("isation_to_ization", r"isation", "ization"),
        RewriteRule::regex("Ization_to_Isation", r"Ization", "Isation"),
        RewriteRule::regex("Isation_to_Ization", r"Isation", "Ization"),
    ]
});

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applies the casing pattern of `template` to `replacement`.
fn match_case(template: &str, replacement: &str) -> String {
    let letters: Vec<char> = template.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        replacement.to_uppercase()
    } else if letters.first().map_or(false, |c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_lowercase()
    }
}

/// Replaces whole words found in `pairs` (looking up by `from`) with their
/// counterpart; `None` when no word changed.
fn replace_words<'a, F>(name: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut changed = false;
    let words: Vec<String> = name
        .split_whitespace()
        .map(|word| {
            let core = word.trim_matches(|c: char| !c.is_alphanumeric());
            match lookup(&core.to_lowercase()) {
                Some(replacement) if !core.is_empty() => {
                    changed = true;
                    word.replacen(core, &match_case(core, replacement), 1)
                }
                _ => word.to_string(),
            }
        })
        .collect();
    if changed {
        Some(words.join(" "))
    } else {
        None
    }
}

pub fn punctuation_variants(name: &str) -> Vec<String> {
    let trimmed = name.trim();
    let mut out = Vec::new();

    if DOTTED_ACRONYM.is_match(trimmed) {
        let letters: Vec<String> = trimmed
            .chars()
            .filter(|c| c.is_alphabetic())
            .map(|c| c.to_string())
            .collect();
        out.push(letters.concat());
        out.push(letters.join(" "));
    }

    for (symbol, replacements) in PUNCTUATION_REPLACEMENTS.iter() {
        if !trimmed.contains(*symbol) {
            continue;
        }
        for replacement in replacements.iter() {
            out.push(trimmed.replace(*symbol, replacement));
        }
    }

    // "X & Y" -> "X&Y"
    if trimmed.contains(" & ") {
        out.push(trimmed.replace(" & ", "&"));
    }
    if let Some(with_ampersand) = replace_words(trimmed, |w| (w == "and").then_some("&")) {
        out.push(with_ampersand);
    }

    let apostrophes = ['\'', '\u{2019}'];
    if trimmed.contains(apostrophes) {
        out.push(trimmed.replace(apostrophes, ""));
        out.push(trimmed.replace("'s", "").replace("\u{2019}s", ""));
    } else if let Some(possessive) = add_possessive(trimmed) {
        out.push(possessive);
    }

    out
}

/// "Macys Department Store" -> "Macy's Department Store"
fn add_possessive(name: &str) -> Option<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let idx = words.iter().position(|w| {
        w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") && w.chars().all(|c| c.is_alphabetic())
    })?;
    let mut owned: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    let stem = &words[idx][..words[idx].len() - 1];
    owned[idx] = format!("{}'s", stem);
    Some(owned.join(" "))
}

pub fn abbreviation_variants(name: &str) -> Vec<String> {
    let trimmed = name.trim();
    let mut out = Vec::new();

    out.extend(ticker_expansions(trimmed).iter().map(|a| a.to_string()));

    let contracted = replace_words(trimmed, |w| {
        WORD_ABBREVIATIONS.iter().find(|(full, _)| *full == w).map(|(_, abbr)| *abbr)
    });
    let expanded = replace_words(trimmed, |w| {
        WORD_ABBREVIATIONS.iter().find(|(_, abbr)| *abbr == w).map(|(full, _)| *full)
    });
    out.extend(expanded);
    out.extend(contracted);

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if (2..=5).contains(&words.len()) {
        let acronym = extract_abbreviation(trimmed);
        if acronym.len() >= 2 {
            out.push(acronym);
        }
    }

    let significant: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| *w != "&" && !w.eq_ignore_ascii_case("and"))
        .collect();
    let joined_by_ampersand = words.len() == 3 && (words[1] == "&" || words[1].eq_ignore_ascii_case("and"));
    if joined_by_ampersand && significant.len() == 2 {
        let initials: Vec<String> = significant
            .iter()
            .filter_map(|w| w.chars().next())
            .map(|c| c.to_uppercase().to_string())
            .collect();
        out.push(initials.join("&"));
    }

    out
}

pub fn word_order_variants(name: &str) -> Vec<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let mut out = Vec::new();

    match words.len() {
        2 => out.push(format!("{} {}", words[1], words[0])),
        3 => {
            out.push(format!("{} {} {}", words[1], words[2], words[0]));
            out.push(format!("{} {} {}", words[2], words[0], words[1]));
            if DROPPABLE_MIDDLE_WORDS.contains(&words[1].to_lowercase().as_str()) {
                out.push(format!("{} {}", words[0], words[2]));
            }
        }
        _ => {}
    }

    if words.len() > 1 && words.last().map_or(false, |w| is_legal_suffix(w)) {
        out.push(words[..words.len() - 1].join(" ").trim_end_matches(',').to_string());
    } else if !words.is_empty() {
        out.push(format!("{} Inc", words.join(" ")));
    }

    out
}

pub fn spelling_variants(name: &str) -> Vec<String> {
    let trimmed = name.trim();
    let mut out = Vec::new();

    if let Some(british) = replace_words(trimmed, |w| {
        SPELLING_PAIRS.iter().find(|(us, _)| *us == w).map(|(_, uk)| *uk)
    }) {
        out.push(british);
    }
    if let Some(american) = replace_words(trimmed, |w| {
        SPELLING_PAIRS.iter().find(|(_, uk)| *uk == w).map(|(us, _)| *us)
    }) {
        out.push(american);
    }

    out.extend(all_rewrites(&SUFFIX_SPELLING_RULES, trimmed).into_iter().map(|(_, v)| v));
    out.extend(correct_known_misspellings(trimmed));

    out
}

/// Ordered, de-duplicated (case-insensitively) set of variations.
struct VariationSet {
    original_key: String,
    entries: IndexMap<String, (String, VariationType)>,
}

impl VariationSet {
    fn new(original: &str) -> Self {
        Self {
            original_key: collapse_ws(original).to_lowercase(),
            entries: IndexMap::new(),
        }
    }

    fn extend(&mut self, variants: Vec<String>, kind: VariationType) {
        for variant in variants {
            let cleaned = collapse_ws(&variant);
            if cleaned.chars().count() < MIN_VARIATION_LEN {
                continue;
            }
            let key = cleaned.to_lowercase();
            if key == self.original_key {
                continue;
            }
            self.entries.entry(key).or_insert((cleaned, kind));
        }
    }
}

fn build_variations(name: &str) -> VariationSet {
    let mut set = VariationSet::new(name);
    set.extend(abbreviation_variants(name), VariationType::Abbreviation);
    set.extend(punctuation_variants(name), VariationType::Punctuation);
    set.extend(spelling_variants(name), VariationType::Spelling);
    set.extend(word_order_variants(name), VariationType::WordOrder);
    set
}

/// Alternate search strings for `name`, most promising first.
///
/// Deterministic; never contains the input itself or strings shorter than
/// three characters; at most `limit` entries.
pub fn generate_query_variations(name: &str, limit: usize) -> Vec<String> {
    build_variations(name)
        .entries
        .into_values()
        .map(|(variant, _)| variant)
        .take(limit)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRewrite {
    pub variations: Vec<String>,
    pub primary_variation: Option<String>,
    pub variation_types: IndexMap<String, VariationType>,
}

/// Variations plus the single rewrite most likely to find the entity.
///
/// Short inputs prefer an abbreviation expansion, otherwise the normalized
/// form when it differs from the input, otherwise the first punctuation
/// variant.
pub fn rewrite_query(name: &str) -> QueryRewrite {
    let set = build_variations(name);
    let trimmed = name.trim();

    let mut variation_types = IndexMap::new();
    let mut variations = Vec::new();
    for (variant, kind) in set.entries.into_values().take(DEFAULT_VARIATION_LIMIT) {
        variation_types.insert(variant.clone(), kind);
        variations.push(variant);
    }

    let expansion = if trimmed.chars().count() <= 5 {
        variation_types
            .iter()
            .find(|(v, kind)| **kind == VariationType::Abbreviation && v.len() > trimmed.len())
            .map(|(v, _)| v.clone())
    } else {
        None
    };
    let normalized = normalize(trimmed);
    let normalized_differs = !normalized.is_empty()
        && normalized.chars().count() >= MIN_VARIATION_LEN
        && normalized != collapse_ws(trimmed).to_lowercase();

    let primary_variation = if expansion.is_some() {
        expansion
    } else if normalized_differs {
        variation_types.entry(normalized.clone()).or_insert(VariationType::Normalized);
        Some(normalized)
    } else {
        variation_types
            .iter()
            .find(|(_, kind)| **kind == VariationType::Punctuation)
            .map(|(v, _)| v.clone())
    };

    QueryRewrite {
        variations,
        primary_variation,
        variation_types,
    }
}
