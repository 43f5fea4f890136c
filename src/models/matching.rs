// src/models/matching.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::core::CandidateEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Abbreviation,
    Variation,
    Semantic,
    Fuzzy,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Abbreviation => "abbreviation",
            MatchType::Variation => "variation",
            MatchType::Semantic => "semantic",
            MatchType::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate with every scoring signal computed for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub entity: CandidateEntity,
    pub search_score: f64,
    pub string_similarity: f64,
    pub context_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_score: Option<f64>,
    pub final_confidence: f64,
    pub match_type: MatchType,
}

/// Final answer for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Match(ScoredCandidate),
    /// Ordered by confidence, descending.
    PotentialMatches(Vec<ScoredCandidate>),
    NoMatch,
}

impl MatchResult {
    /// Classifies candidates already sorted by `final_confidence` descending.
    ///
    /// `Match` requires the top confidence to reach `high`; `PotentialMatches`
    /// covers `[low, high)` and keeps every candidate at or above `floor`.
    pub fn classify(ranked: Vec<ScoredCandidate>, high: f64, low: f64, floor: f64) -> Self {
        let top = match ranked.first() {
            Some(top) => top.final_confidence,
            None => return MatchResult::NoMatch,
        };

        if top >= high {
            ranked
                .into_iter()
                .next()
                .map(MatchResult::Match)
                .unwrap_or(MatchResult::NoMatch)
        } else if top >= low {
            let kept: Vec<ScoredCandidate> = ranked
                .into_iter()
                .filter(|c| c.final_confidence >= floor)
                .collect();
            if kept.is_empty() {
                MatchResult::NoMatch
            } else {
                MatchResult::PotentialMatches(kept)
            }
        } else {
            MatchResult::NoMatch
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            MatchResult::Match(_) => "match",
            MatchResult::PotentialMatches(_) => "potential_matches",
            MatchResult::NoMatch => "no_match",
        }
    }

    pub fn top_confidence(&self) -> Option<f64> {
        match self {
            MatchResult::Match(c) => Some(c.final_confidence),
            MatchResult::PotentialMatches(list) => list.first().map(|c| c.final_confidence),
            MatchResult::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    CandidateSearch,
    AiDisambiguation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Ok,
    Error,
    TimedOut,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTiming {
    pub kind: CallKind,
    pub label: String,
    pub latency_ms: u64,
    pub outcome: CallOutcome,
}

/// Request-scoped diagnostics, only built when debug mode is requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTrace {
    pub candidate_source_calls: usize,
    pub ai_calls: usize,
    pub token_usage: TokenUsage,
    pub calls: Vec<CallTiming>,
    pub queries_tried: Vec<String>,
    pub normalized_name: String,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typo_correction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typo_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<String>,
    pub total_ms: u64,
}

impl DebugTrace {
    pub fn record_call(&mut self, kind: CallKind, label: &str, latency_ms: u64, outcome: CallOutcome) {
        match kind {
            CallKind::CandidateSearch => self.candidate_source_calls += 1,
            CallKind::AiDisambiguation => self.ai_calls += 1,
        }
        self.calls.push(CallTiming {
            kind,
            label: label.to_string(),
            latency_ms,
            outcome,
        });
    }
}

/// What the orchestrator hands back for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub result: MatchResult,
    pub debug: Option<DebugTrace>,
    pub from_cache: bool,
}
