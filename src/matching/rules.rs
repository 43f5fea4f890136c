// src/matching/rules.rs
//! Table-driven string rewrite rules.
//!
//! Rule data lives in static tables next to the component that owns it; this
//! module only knows how to evaluate a rule against an input.

use regex::Regex;

pub enum Rewrite {
    Regex {
        pattern: Regex,
        replacement: &'static str,
    },
    Transform(fn(&str) -> Option<String>),
}

pub struct RewriteRule {
    pub label: &'static str,
    pub rewrite: Rewrite,
}

impl RewriteRule {
    /// Builds a regex rule. Patterns come from static tables, so a bad one is
    /// a programming error.
    pub fn regex(label: &'static str, pattern: &str, replacement: &'static str) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid rule pattern for '{}': {}", label, e));
        Self {
            label,
            rewrite: Rewrite::Regex { pattern, replacement },
        }
    }

    pub fn transform(label: &'static str, f: fn(&str) -> Option<String>) -> Self {
        Self {
            label,
            rewrite: Rewrite::Transform(f),
        }
    }

    /// Returns the rewritten string only when the rule changed the input.
    pub fn apply(&self, input: &str) -> Option<String> {
        let output = match &self.rewrite {
            Rewrite::Regex { pattern, replacement } => {
                if !pattern.is_match(input) {
                    return None;
                }
                pattern.replace_all(input, *replacement).into_owned()
            }
            Rewrite::Transform(f) => f(input)?,
        };
        if output != input {
            Some(output)
        } else {
            None
        }
    }
}

/// First rule that fires, with its label.
pub fn first_rewrite(rules: &[RewriteRule], input: &str) -> Option<(&'static str, String)> {
    rules
        .iter()
        .find_map(|rule| rule.apply(input).map(|out| (rule.label, out)))
}

/// Every rule that fires, each applied independently to the input.
pub fn all_rewrites(rules: &[RewriteRule], input: &str) -> Vec<(&'static str, String)> {
    rules
        .iter()
        .filter_map(|rule| rule.apply(input).map(|out| (rule.label, out)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(input: &str) -> Option<String> {
        Some(input.to_uppercase())
    }

    #[test]
    fn test_rule_reports_only_changes() {
        let rule = RewriteRule::regex("centre", r"(?i)centre", "center");
        assert_eq!(rule.apply("Lincoln Centre"), Some("Lincoln center".to_string()));
        assert_eq!(rule.apply("Lincoln Park"), None);

        let upper = RewriteRule::transform("upper", shout);
        assert_eq!(upper.apply("ACME"), None);
        assert_eq!(upper.apply("acme"), Some("ACME".to_string()));
    }

    #[test]
    fn test_first_and_all_rewrites() {
        let rules = vec![
            RewriteRule::regex("colour", r"colour", "color"),
            RewriteRule::regex("centre", r"centre", "center"),
        ];
        assert_eq!(
            first_rewrite(&rules, "colour centre"),
            Some(("colour", "color centre".to_string()))
        );
        assert_eq!(all_rewrites(&rules, "colour centre").len(), 2);
        assert!(first_rewrite(&rules, "plain").is_none());
    }
}
