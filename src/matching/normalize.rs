// src/matching/normalize.rs - Canonical form of organization names

/// Trailing legal or organizational designators stripped from names.
pub const LEGAL_SUFFIXES: [&str; 20] = [
    "inc", "incorporated", "corp", "corporation", "co", "company", "ltd", "limited", "llc", "llp",
    "lp", "plc", "gmbh", "ag", "nv", "bv", "pty", "group", "holdings", "technologies",
];

const LEADING_ARTICLES: [&str; 3] = ["the", "a", "an"];

/// Words that never contribute an initial to an abbreviation.
pub const ABBREVIATION_STOPWORDS: [&str; 11] =
    ["of", "and", "the", "for", "a", "an", "in", "on", "at", "de", "&"];

const STRIPPED_CHARS: [char; 9] = ['"', '\'', '`', '.', ',', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}'];

/// Canonicalizes a raw organization name.
///
/// Lowercases, drops quotes, periods and commas, spells out `&`, `+` and `@`
/// (keeping `&` inside short single-case tokens such as `J&J` or `AT&T`),
/// collapses whitespace, then strips leading articles and trailing legal
/// suffixes while at least one word remains. The function is total and
/// idempotent.
pub fn normalize(raw: &str) -> String {
    let mut expanded = String::with_capacity(raw.len() + 8);

    for token in raw.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
        if cleaned.is_empty() {
            continue;
        }
        let keep_ampersand = is_short_ampersand_token(&cleaned);
        for ch in cleaned.chars() {
            match ch {
                '&' if !keep_ampersand => expanded.push_str(" and "),
                '+' => expanded.push_str(" plus "),
                '@' => expanded.push_str(" at "),
                c => expanded.extend(c.to_lowercase()),
            }
        }
        expanded.push(' ');
    }

    let mut words: Vec<&str> = expanded.split_whitespace().collect();

    while words.len() > 1 && LEADING_ARTICLES.contains(&words[0]) {
        words.remove(0);
    }
    while words.len() > 1 && words.last().map_or(false, |w| is_legal_suffix(w)) {
        words.pop();
    }

    words.join(" ")
}

pub fn is_legal_suffix(word: &str) -> bool {
    let lowered = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    LEGAL_SUFFIXES.contains(&lowered.as_str())
}

/// `J&J`, `AT&T`, `p&g`: one ampersand between letters, at most five
/// characters, single-case.
fn is_short_ampersand_token(token: &str) -> bool {
    if token.chars().count() > 5 || token.matches('&').count() != 1 {
        return false;
    }
    if token.starts_with('&') || token.ends_with('&') {
        return false;
    }
    let letters: Vec<char> = token.chars().filter(|c| *c != '&').collect();
    if !letters.iter().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    letters.iter().all(|c| c.is_ascii_uppercase()) || letters.iter().all(|c| c.is_ascii_lowercase())
}

fn split_words(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| c.is_whitespace() || c == '-' || c == '/')
        .filter(|w| !w.is_empty())
}

fn first_alnum_upper(word: &str) -> Option<char> {
    word.chars()
        .find(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
}

/// Uppercase initials of the significant words of `name`.
///
/// Stopwords and legal suffixes contribute nothing, so
/// `"International Business Machines Corp."` yields `"IBM"`.
pub fn extract_abbreviation(name: &str) -> String {
    split_words(name)
        .filter(|w| {
            let lowered = w.to_lowercase();
            !ABBREVIATION_STOPWORDS.contains(&lowered.as_str()) && !is_legal_suffix(w)
        })
        .filter_map(first_alnum_upper)
        .collect()
}

/// Initials of every word, stopwords included ("Bank of America" -> "BOA").
fn all_word_initials(name: &str) -> String {
    split_words(name)
        .filter(|w| !is_legal_suffix(w))
        .filter_map(first_alnum_upper)
        .collect()
}

/// Initials of the words on both sides of ampersands and "and".
fn ampersand_initials(name: &str) -> String {
    split_words(name)
        .flat_map(|w| w.split('&'))
        .filter(|w| !w.is_empty() && !w.eq_ignore_ascii_case("and") && !is_legal_suffix(w))
        .filter_map(first_alnum_upper)
        .collect()
}

/// Whether `abbr` plausibly abbreviates `full_name`.
///
/// Checks, in order: ampersand abbreviations (`J&J`) against word initials,
/// exact initials, then the abbreviation letters as an ordered subsequence of
/// the full name's letters starting at its first letter.
pub fn is_potential_abbreviation(abbr: &str, full_name: &str) -> bool {
    let abbr_letters: String = abbr
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if abbr_letters.chars().count() < 2 || full_name.trim().is_empty() {
        return false;
    }

    if abbr.contains('&') && ampersand_initials(full_name) == abbr_letters {
        return true;
    }

    if extract_abbreviation(full_name) == abbr_letters || all_word_initials(full_name) == abbr_letters {
        return true;
    }

    let full_letters: Vec<char> = full_name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if full_letters.len() <= abbr_letters.len() {
        return false;
    }

    let mut abbr_iter = abbr_letters.chars();
    let first = match abbr_iter.next() {
        Some(c) => c,
        None => return false,
    };
    if full_letters.first() != Some(&first) {
        return false;
    }

    let mut rest = full_letters[1..].iter();
    abbr_iter.all(|wanted| rest.any(|c| *c == wanted))
}

/// 2-5 uppercase ASCII letters, optionally split by one `&` (`IBM`, `J&J`).
pub fn looks_like_abbreviation(input: &str) -> bool {
    let trimmed = input.trim();
    let letters: Vec<char> = trimmed.chars().filter(|c| *c != '&').collect();
    let ampersands = trimmed.chars().filter(|c| *c == '&').count();
    (2..=5).contains(&letters.len())
        && ampersands <= 1
        && letters.iter().all(|c| c.is_ascii_uppercase())
}
