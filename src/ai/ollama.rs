// src/ai/ollama.rs - Ollama-backed disambiguation with structured output
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::ai::{AiJudgment, DisambiguationOutcome, DisambiguationRequest, Disambiguator};
use crate::models::{CandidateEntity, TokenUsage};

/// OLLAMA API request structure with JSON schema
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    format: serde_json::Value,
    stream: bool,
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// The answer shape the model is constrained to.
#[derive(Debug, Deserialize)]
struct AiAnswer {
    confidence: f64,
    #[serde(default)]
    chosen_entity_id: Option<String>,
    #[serde(default)]
    suggested_query: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            max_retries: 2,
            retry_backoff_ms: 250,
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct OllamaDisambiguator {
    client: Client,
    config: OllamaConfig,
}

impl OllamaDisambiguator {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build Ollama HTTP client")?;
        Ok(Self { client, config })
    }

    /// The first attempt plus `max_retries` retries.
    fn total_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn attempt(&self, request: &OllamaRequest) -> Result<(AiAnswer, TokenUsage)> {
        let response = self
            .client
            .post(self.endpoint("api/generate"))
            .json(request)
            .send()
            .await
            .context("Failed to send request to OLLAMA")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("OLLAMA returned status: {}", response.status()));
        }

        let body: OllamaResponse = response.json().await.context("Failed to parse OLLAMA response")?;
        debug!("Raw AI response: {}", body.response);

        let usage = TokenUsage::new(
            body.prompt_eval_count.unwrap_or(0),
            body.eval_count.unwrap_or(0),
        );
        let answer = parse_ai_response(&body.response)?;
        Ok((answer, usage))
    }
}

#[async_trait]
impl Disambiguator for OllamaDisambiguator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn disambiguate(&self, request: &DisambiguationRequest) -> DisambiguationOutcome {
        let ollama_request = OllamaRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            prompt: build_prompt(request),
            format: answer_schema(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: 0.1,
                top_p: 0.9,
                repeat_penalty: 1.1,
            }),
        };

        let attempts = self.total_attempts();
        let mut usage = TokenUsage::default();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            match self.attempt(&ollama_request).await {
                Ok((answer, attempt_usage)) => {
                    usage.add(&attempt_usage);
                    return DisambiguationOutcome::Success(into_judgment(answer, &request.candidates, usage));
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    if attempt < attempts {
                        debug!("AI disambiguation attempt {} failed, retrying: {}", attempt, last_error);
                        tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms * attempt as u64)).await;
                    }
                }
            }
        }

        warn!("⚠️ AI disambiguation failed after {} attempts: {}", attempts, last_error);
        DisambiguationOutcome::failure(last_error)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("api/tags"))
            .send()
            .await
            .context("Failed to reach OLLAMA")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("OLLAMA returned status: {}", response.status()));
        }
        Ok(())
    }
}

fn answer_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "confidence": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0,
                "description": "Confidence that the chosen candidate is the organization named"
            },
            "chosen_entity_id": {
                "type": ["string", "null"],
                "description": "id of the matching candidate, or null if none match"
            },
            "suggested_query": {
                "type": ["string", "null"],
                "description": "A corrected organization name to search for when no candidate matches"
            },
            "reasoning": {
                "type": "string",
                "description": "Short explanation of the decision"
            }
        },
        "required": ["confidence", "chosen_entity_id", "reasoning"]
    })
}

fn describe_candidate(out: &mut String, entity: &CandidateEntity) {
    let _ = write!(out, "- id: {} | name: {}", entity.id, entity.canonical_name);
    if !entity.aliases.is_empty() {
        let aliases: Vec<&str> = entity.aliases.iter().map(String::as_str).collect();
        let _ = write!(out, " | aliases: {}", aliases.join(", "));
    }
    if let Some(industry) = &entity.industry {
        let _ = write!(out, " | industry: {}", industry);
    }
    let location: Vec<&str> = [entity.state.as_deref(), entity.country.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !location.is_empty() {
        let _ = write!(out, " | location: {}", location.join(", "));
    }
    out.push('\n');
}

/// Prompt with explicit JSON instructions.
fn build_prompt(request: &DisambiguationRequest) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(
        "You resolve free-text organization names to records in a reference database.\n\
         Decide which candidate, if any, is the organization the user typed. Consider typos, \
         abbreviations, tickers, former names and parent/subsidiary relationships.\n\n",
    );
    let _ = writeln!(prompt, "Input name: \"{}\"", request.name);

    if let Some(context) = &request.context {
        if let Some(industry) = &context.industry {
            let _ = writeln!(prompt, "Industry hint: {}", industry);
        }
        if let Some(region) = &context.region {
            let _ = writeln!(prompt, "Region hint: {}", region);
        }
        if let Some(size) = &context.size {
            let _ = writeln!(prompt, "Size hint: {}", size);
        }
    }

    prompt.push_str("\nCandidates:\n");
    for candidate in &request.candidates {
        describe_candidate(&mut prompt, candidate);
    }

    prompt.push_str(
        "\nRespond with JSON only: {\"confidence\": number 0-1, \"chosen_entity_id\": string or null, \
         \"suggested_query\": string or null, \"reasoning\": string}.\n\
         Use chosen_entity_id null and a suggested_query when no candidate is right but you know \
         the correct name.",
    );
    prompt
}

fn into_judgment(answer: AiAnswer, candidates: &[CandidateEntity], token_usage: TokenUsage) -> AiJudgment {
    let chosen_entity_id = answer.chosen_entity_id.filter(|id| {
        let known = candidates.iter().any(|c| &c.id == id);
        if !known {
            warn!("AI chose unknown candidate id '{}', ignoring", id);
        }
        known
    });
    let suggested_query = answer
        .suggested_query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    AiJudgment {
        confidence: if answer.confidence.is_finite() {
            answer.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
        chosen_entity_id,
        suggested_query,
        reasoning: answer.reasoning,
        token_usage,
    }
}

/// Parse AI response with multiple fallback strategies
fn parse_ai_response(response: &str) -> Result<AiAnswer> {
    match serde_json::from_str::<AiAnswer>(response) {
        Ok(answer) => return Ok(answer),
        Err(e) => debug!("Direct JSON parsing failed: {}", e),
    }

    if let Some(json_str) = extract_json_from_text(response) {
        match serde_json::from_str::<AiAnswer>(&json_str) {
            Ok(answer) => return Ok(answer),
            Err(e) => debug!("JSON extraction parsing failed: {}", e),
        }
    }

    let cleaned = clean_json_response(response);
    serde_json::from_str::<AiAnswer>(&cleaned).context("AI response is not valid judgment JSON")
}

/// Extract JSON object from text that might have extra content
fn extract_json_from_text(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Clean common JSON formatting issues
fn clean_json_response(response: &str) -> String {
    response
        .trim()
        .replace("```json", "")
        .replace("```", "")
        .replace(",\n}", "\n}")
        .replace(",}", "}")
        .replace(",\n]", "\n]")
        .replace(",]", "]")
        .trim()
        .to_string()
}
