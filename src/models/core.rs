// src/models/core.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A canonical organization record owned by the candidate source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntity {
    pub id: String,
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl CandidateEntity {
    pub fn new(id: impl Into<String>, canonical_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canonical_name: canonical_name.into(),
            aliases: BTreeSet::new(),
            domain: None,
            industry: None,
            country: None,
            state: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_location(mut self, country: Option<&str>, state: Option<&str>) -> Self {
        self.country = country.map(str::to_string);
        self.state = state.map(str::to_string);
        self
    }

    /// Canonical name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Optional caller-supplied hints used for context scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl MatchContext {
    pub fn is_empty(&self) -> bool {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().map_or(true, |s| s.trim().is_empty())
        }
        blank(&self.industry) && blank(&self.region) && blank(&self.size)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub debug: bool,
    pub skip_cache: bool,
    /// Overrides the disambiguator's default model for this request.
    pub model: Option<String>,
}

/// A single resolution request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub raw_name: String,
    pub context: Option<MatchContext>,
    pub options: QueryOptions,
}

impl MatchQuery {
    pub fn new(raw_name: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            context: None,
            options: QueryOptions::default(),
        }
    }

    pub fn with_context(mut self, context: MatchContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Context that actually carries at least one non-blank field.
    pub fn effective_context(&self) -> Option<&MatchContext> {
        self.context.as_ref().filter(|c| !c.is_empty())
    }
}
