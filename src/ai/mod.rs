// src/ai/mod.rs
//! AI disambiguation behind a typed contract. Providers never surface their
//! own response shapes or errors to the matching pipeline.

pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{CandidateEntity, MatchContext, TokenUsage};

pub use ollama::{OllamaConfig, OllamaDisambiguator};

#[derive(Debug, Clone, PartialEq)]
pub struct DisambiguationRequest {
    pub name: String,
    pub candidates: Vec<CandidateEntity>,
    pub context: Option<MatchContext>,
    /// Per-request model override.
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiJudgment {
    pub confidence: f64,
    /// Always one of the request's candidate ids when present.
    pub chosen_entity_id: Option<String>,
    pub suggested_query: Option<String>,
    pub reasoning: Option<String>,
    pub token_usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisambiguationOutcome {
    Success(AiJudgment),
    Failure { reason: String },
}

impl DisambiguationOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        DisambiguationOutcome::Failure {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Disambiguator: Send + Sync {
    fn name(&self) -> &str;

    async fn disambiguate(&self, request: &DisambiguationRequest) -> DisambiguationOutcome;

    async fn health_check(&self) -> Result<()>;
}

pub type SharedDisambiguator = Arc<dyn Disambiguator>;
