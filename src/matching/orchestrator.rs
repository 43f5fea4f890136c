// src/matching/orchestrator.rs - Per-request matching state machine and batch fan-out
use futures::future::join_all;
use indexmap::IndexMap;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use uuid::Uuid;

use crate::ai::{DisambiguationOutcome, DisambiguationRequest, SharedDisambiguator};
use crate::cache::SharedMatchCache;
use crate::errors::MatchError;
use crate::matching::confidence::{
    context_score, determine_match_type, has_ambiguous_matches, is_abbreviation_match, name_similarity,
    rank_candidates, CandidateScorer,
};
use crate::matching::escalation::{evaluate, EscalationDecision, GateInput};
use crate::matching::normalize::normalize;
use crate::matching::rewrite::generate_query_variations;
use crate::matching::typo::detect_typo;
use crate::models::{
    CallKind, CallOutcome, DebugTrace, MatchOutcome, MatchQuery, MatchResult, ScoredCandidate,
};
use crate::sources::{merge_hits, SearchHit, SharedCandidateSource};
use crate::utils::config::{MatcherConfig, MAX_NAME_LENGTH};
use crate::utils::logging::RequestLogger;

enum SearchAttempt {
    Hits(Vec<SearchHit>),
    Failed(anyhow::Error),
    TimedOut,
    Skipped,
}

async fn timed_search(source: &SharedCandidateSource, query: &str, budget: Duration) -> (SearchAttempt, u64) {
    if budget.is_zero() {
        return (SearchAttempt::Skipped, 0);
    }
    let start = Instant::now();
    let attempt = match timeout(budget, source.search(query)).await {
        Ok(Ok(hits)) => SearchAttempt::Hits(hits),
        Ok(Err(e)) => SearchAttempt::Failed(e),
        Err(_) => SearchAttempt::TimedOut,
    };
    (attempt, start.elapsed().as_millis() as u64)
}

/// Request id of entry `index` of batch `batch_id`.
pub fn batch_entry_id(batch_id: &str, index: usize) -> String {
    format!("{}-{}", batch_id, index)
}

/// Sequences normalizer, cache, candidate source, scorer, escalation gate
/// and disambiguator for each request.
#[derive(Clone)]
pub struct MatchingService {
    config: Arc<MatcherConfig>,
    source: SharedCandidateSource,
    disambiguator: Option<SharedDisambiguator>,
    cache: SharedMatchCache,
}

impl MatchingService {
    pub fn new(
        config: MatcherConfig,
        source: SharedCandidateSource,
        disambiguator: Option<SharedDisambiguator>,
        cache: SharedMatchCache,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            disambiguator,
            cache,
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn source(&self) -> &SharedCandidateSource {
        &self.source
    }

    pub fn disambiguator(&self) -> Option<&SharedDisambiguator> {
        self.disambiguator.as_ref()
    }

    pub fn cache(&self) -> &SharedMatchCache {
        &self.cache
    }

    pub async fn match_one(&self, query: &MatchQuery) -> Result<MatchOutcome, MatchError> {
        self.match_one_with_id(query, &Uuid::new_v4().to_string()).await
    }

    pub async fn match_one_with_id(&self, query: &MatchQuery, request_id: &str) -> Result<MatchOutcome, MatchError> {
        let deadline = Instant::now() + self.config.request_deadline;
        self.match_one_until(query, request_id, deadline).await
    }

    /// Matches one query, giving up on outstanding external calls at
    /// `deadline` and answering from whatever completed.
    pub async fn match_one_until(
        &self,
        query: &MatchQuery,
        request_id: &str,
        deadline: Instant,
    ) -> Result<MatchOutcome, MatchError> {
        RequestRun::new(self, query, request_id, deadline).run().await
    }

    /// Matches every query concurrently (bounded by `batch_concurrency`).
    /// Results come back in input order; one failure never affects the others.
    pub async fn match_batch(&self, queries: &[MatchQuery]) -> Vec<Result<MatchOutcome, MatchError>> {
        self.match_batch_with_id(queries, &Uuid::new_v4().to_string()).await
    }

    /// Like `match_batch`, with entry ids derived from `batch_id`.
    pub async fn match_batch_with_id(
        &self,
        queries: &[MatchQuery],
        batch_id: &str,
    ) -> Vec<Result<MatchOutcome, MatchError>> {
        let short_id: String = batch_id.chars().take(8).collect();
        let semaphore = Arc::new(Semaphore::new(self.config.batch_concurrency.max(1)));
        info!(
            "📦 Batch {} started: {} queries, concurrency {}",
            short_id,
            queries.len(),
            self.config.batch_concurrency
        );

        let tasks: Vec<JoinHandle<Result<MatchOutcome, MatchError>>> = queries
            .iter()
            .enumerate()
            .map(|(index, query)| {
                let service = self.clone();
                let query = query.clone();
                let semaphore = semaphore.clone();
                let request_id = batch_entry_id(batch_id, index);
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return Err(MatchError::Internal(format!("batch semaphore closed: {}", e))),
                    };
                    let result = service.match_one_with_id(&query, &request_id).await;
                    if let Err(e) = &result {
                        warn!("⚠️ Batch entry {} ('{}') failed: {}", index, query.raw_name, e);
                    }
                    result
                })
            })
            .collect();

        let results: Vec<Result<MatchOutcome, MatchError>> = join_all(tasks)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| {
                joined.unwrap_or_else(|e| {
                    warn!("⚠️ Batch entry {} task aborted: {}", index, e);
                    Err(MatchError::Internal(format!("batch task failed: {}", e)))
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "📦 Batch {} complete: {} ok, {} failed",
            short_id,
            results.len() - failed,
            failed
        );
        results
    }
}

/// Mutable state of one request.
struct RequestRun<'a> {
    service: &'a MatchingService,
    query: &'a MatchQuery,
    logger: RequestLogger,
    deadline: Instant,
    trace: DebugTrace,
    searches_succeeded: usize,
    search_errors: Vec<String>,
}

impl<'a> RequestRun<'a> {
    fn new(service: &'a MatchingService, query: &'a MatchQuery, request_id: &str, deadline: Instant) -> Self {
        Self {
            service,
            query,
            logger: RequestLogger::new(request_id),
            deadline,
            trace: DebugTrace::default(),
            searches_succeeded: 0,
            search_errors: Vec::new(),
        }
    }

    fn config(&self) -> &MatcherConfig {
        &self.service.config
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn validate(&self) -> Result<(), MatchError> {
        let raw = self.query.raw_name.trim();
        if raw.is_empty() {
            return Err(MatchError::validation("companyName must not be empty"));
        }
        if raw.chars().count() > MAX_NAME_LENGTH {
            return Err(MatchError::validation(format!(
                "companyName must be at most {} characters",
                MAX_NAME_LENGTH
            )));
        }
        Ok(())
    }

    fn record_search(&mut self, query: &str, attempt: SearchAttempt, latency_ms: u64) -> Vec<SearchHit> {
        self.trace.queries_tried.push(query.to_string());
        let (outcome, hits) = match attempt {
            SearchAttempt::Hits(hits) => {
                self.searches_succeeded += 1;
                (CallOutcome::Ok, hits)
            }
            SearchAttempt::Failed(e) => {
                self.search_errors.push(format!("{:#}", e));
                (CallOutcome::Error, Vec::new())
            }
            SearchAttempt::TimedOut => (CallOutcome::TimedOut, Vec::new()),
            SearchAttempt::Skipped => (CallOutcome::Skipped, Vec::new()),
        };
        self.logger.log_search(query, hits.len(), latency_ms, outcome);
        self.trace
            .record_call(CallKind::CandidateSearch, query, latency_ms, outcome);
        hits
    }

    async fn search(&mut self, query: &str) -> Vec<SearchHit> {
        let budget = self.config().search_timeout.min(self.remaining());
        let (attempt, latency_ms) = timed_search(&self.service.source, query, budget).await;
        self.record_search(query, attempt, latency_ms)
    }

    /// Searches all `queries` concurrently.
    async fn search_all(&mut self, queries: &[String]) -> Vec<SearchHit> {
        let budget = self.config().search_timeout.min(self.remaining());
        let source = &self.service.source;
        let attempts = join_all(queries.iter().map(|q| timed_search(source, q, budget))).await;

        let mut hits = Vec::new();
        for (query, (attempt, latency_ms)) in queries.iter().zip(attempts) {
            hits.extend(self.record_search(query, attempt, latency_ms));
        }
        hits
    }

    fn already_tried(&self, query: &str) -> bool {
        self.trace
            .queries_tried
            .iter()
            .any(|q| q.eq_ignore_ascii_case(query.trim()))
    }

    fn cached_match(&self, normalized: &str) -> Option<ScoredCandidate> {
        let config = self.config();
        let hit = self.service.cache.lookup(normalized)?;
        if hit.confidence < config.cache_accept_threshold {
            return None;
        }
        let boosted = (hit.confidence + config.cache_score_boost).min(1.0);
        if boosted < config.high_threshold {
            return None;
        }

        let raw = self.query.raw_name.trim();
        let entity = hit.entity;
        Some(ScoredCandidate {
            search_score: hit.confidence,
            string_similarity: name_similarity(raw, &entity),
            context_score: context_score(self.query.effective_context(), &entity).unwrap_or(0.0),
            ai_score: None,
            final_confidence: boosted,
            match_type: determine_match_type(&entity.canonical_name, raw, boosted, is_abbreviation_match(raw, &entity)),
            entity,
        })
    }

    fn finish(mut self, result: MatchResult, from_cache: bool) -> MatchOutcome {
        self.trace.cache_hit = from_cache;
        self.trace.total_ms = self.logger.elapsed_ms();
        self.logger.log_complete(result.status(), result.top_confidence());
        MatchOutcome {
            result,
            debug: self.query.options.debug.then_some(self.trace),
            from_cache,
        }
    }

    async fn run(mut self) -> Result<MatchOutcome, MatchError> {
        self.validate()?;
        let raw = self.query.raw_name.trim().to_string();
        let normalized = normalize(&raw);
        if normalized.is_empty() {
            return Err(MatchError::validation("companyName has no searchable characters"));
        }
        self.trace.normalized_name = normalized.clone();
        self.logger.log_start(&raw, &normalized, self.query.options.skip_cache);

        // Cache
        if !self.query.options.skip_cache {
            if let Some(cached) = self.cached_match(&normalized) {
                self.logger.log_cache_hit(&cached.entity.id, cached.final_confidence);
                return Ok(self.finish(MatchResult::Match(cached), true));
            }
        }

        // Search with the original name
        self.logger.log_phase("search", Some(raw.as_str()));
        let mut merged: IndexMap<String, SearchHit> = IndexMap::new();
        let hits = self.search(&raw).await;
        merge_hits(&mut merged, hits);

        // Typo-assisted search, only when nothing already matches the name exactly
        let exact_hit = merged
            .values()
            .any(|hit| hit.entity.names().any(|name| normalize(name) == normalized));
        let mut correction = None;
        if !exact_hit {
            let names: Vec<String> = merged
                .values()
                .flat_map(|hit| hit.entity.names().map(str::to_string).collect::<Vec<_>>())
                .collect();
            let detection = detect_typo(&raw, &names);
            if let Some(corrected) = detection.suggested_correction.clone().filter(|_| detection.is_likely_typo) {
                if normalize(&corrected) != normalized {
                    self.logger.log_typo(&detection);
                    self.trace.typo_correction = Some(corrected.clone());
                    self.trace.typo_confidence = Some(detection.confidence);
                    let hits = self.search(&corrected).await;
                    merge_hits(&mut merged, hits);
                    correction = Some(corrected);
                }
            }
        }

        // Rewritten queries when the name itself found nothing usable
        let floor = self.config().search_score_floor;
        if merged.values().all(|hit| hit.relevance < floor) {
            let variations: Vec<String> = generate_query_variations(&raw, self.config().max_query_variations)
                .into_iter()
                .filter(|v| !self.already_tried(v))
                .collect();
            if !variations.is_empty() {
                self.logger.log_rewrites(&variations);
                let hits = self.search_all(&variations).await;
                merge_hits(&mut merged, hits);
            }
        }

        if self.searches_succeeded == 0 && !self.search_errors.is_empty() {
            return Err(MatchError::CandidateSourceUnavailable(self.search_errors.join("; ")));
        }

        // Score
        self.logger.log_phase("score", Some(format!("{} candidates", merged.len()).as_str()));
        let query = self.query;
        let context = query.effective_context();
        let scorer = CandidateScorer::new(&raw, context).with_correction(correction);
        let mut scored: Vec<ScoredCandidate> = merged
            .into_values()
            .map(|hit| scorer.score(hit.entity, hit.relevance))
            .collect();
        rank_candidates(&mut scored);

        // Gate and disambiguate
        self.escalate(&scorer, &mut scored, &normalized).await;

        // Classify and remember
        let config = self.config();
        let result = MatchResult::classify(
            scored,
            config.high_threshold,
            config.low_threshold,
            config.potential_match_floor,
        );
        if let MatchResult::Match(best) = &result {
            if best.final_confidence >= config.cache_write_threshold {
                self.service
                    .cache
                    .record(&normalized, best.entity.clone(), best.final_confidence);
            }
        }

        Ok(self.finish(result, false))
    }

    async fn escalate(&mut self, scorer: &CandidateScorer<'_>, scored: &mut Vec<ScoredCandidate>, normalized: &str) {
        let has_user_context = self.query.effective_context().is_some();
        let max_rounds = self.config().max_ai_rounds;
        let mut researched = false;
        let mut round = 0;

        while round < max_rounds {
            let top = match scored.first() {
                Some(top) => top.final_confidence,
                None => break,
            };
            let confidences: Vec<f64> = scored.iter().map(|c| c.final_confidence).collect();
            let input = GateInput {
                top_confidence: top,
                has_ambiguity: has_ambiguous_matches(&confidences, self.config().ambiguity_threshold),
                has_user_context,
            };
            let (decision, reason) = evaluate(&input, &self.config().gate_thresholds());
            self.logger.log_escalation(decision, reason, top);
            self.trace.escalation = Some(format!("{:?}: {}", decision, reason).to_lowercase());

            if decision == EscalationDecision::Skip {
                break;
            }
            let ai = match &self.service.disambiguator {
                Some(ai) => ai.clone(),
                None => break,
            };
            let budget = self.config().ai_timeout.min(self.remaining());
            if budget.is_zero() {
                self.trace
                    .record_call(CallKind::AiDisambiguation, "disambiguate", 0, CallOutcome::Skipped);
                break;
            }

            round += 1;
            let sent = scored.len().min(self.config().max_ai_candidates);
            let request = DisambiguationRequest {
                name: self.query.raw_name.trim().to_string(),
                candidates: scored[..sent].iter().map(|c| c.entity.clone()).collect(),
                context: self.query.effective_context().cloned(),
                model: self.query.options.model.clone(),
            };

            let start = Instant::now();
            let outcome = timeout(budget, ai.disambiguate(&request)).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            let judgment = match outcome {
                Ok(DisambiguationOutcome::Success(judgment)) => {
                    self.trace
                        .record_call(CallKind::AiDisambiguation, ai.name(), latency_ms, CallOutcome::Ok);
                    judgment
                }
                Ok(DisambiguationOutcome::Failure { reason }) => {
                    self.trace
                        .record_call(CallKind::AiDisambiguation, ai.name(), latency_ms, CallOutcome::Error);
                    self.logger.log_ai_failure(round, &reason);
                    break;
                }
                Err(_) => {
                    self.trace
                        .record_call(CallKind::AiDisambiguation, ai.name(), latency_ms, CallOutcome::TimedOut);
                    self.logger.log_ai_failure(round, "timed out");
                    break;
                }
            };

            self.trace.token_usage.add(&judgment.token_usage);
            self.logger.log_ai_success(
                round,
                judgment.chosen_entity_id.as_deref(),
                judgment.confidence,
                judgment.token_usage.total,
            );

            for candidate in scored.iter_mut().take(sent) {
                let ai_score = match &judgment.chosen_entity_id {
                    Some(id) if *id == candidate.entity.id => judgment.confidence,
                    _ => 1.0 - judgment.confidence,
                };
                scorer.apply_ai_score(candidate, ai_score);
            }
            rank_candidates(scored);

            // One extra search round on an AI-suggested name
            let suggestion = judgment
                .suggested_query
                .filter(|q| !researched && normalize(q) != normalized && !self.already_tried(q));
            match suggestion {
                Some(suggested) => {
                    researched = true;
                    let hits = self.search(&suggested).await;
                    for hit in hits {
                        if scored.iter().all(|c| c.entity.id != hit.entity.id) {
                            scored.push(scorer.score(hit.entity, hit.relevance));
                        }
                    }
                    rank_candidates(scored);
                }
                None => break,
            }
        }
    }
}
