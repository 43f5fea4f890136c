// src/utils/logging.rs - Request-scoped logging helpers for the matching pipeline
use log::{debug, info, warn};
use std::time::Instant;

use crate::matching::escalation::{EscalationDecision, EscalationReason};
use crate::matching::typo::TypoDetection;
use crate::models::CallOutcome;

/// Prefixes every line with a short request id and the elapsed time.
#[derive(Clone)]
pub struct RequestLogger {
    request_id: String,
    start_time: Instant,
}

impl RequestLogger {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.chars().take(8).collect(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn tag(&self) -> String {
        format!("[{}] [+{}ms]", self.request_id, self.elapsed_ms())
    }

    pub fn log_start(&self, raw_name: &str, normalized: &str, skip_cache: bool) {
        info!(
            "{} 🚀 Matching '{}' (normalized '{}'){}",
            self.tag(),
            raw_name,
            normalized,
            if skip_cache { " [cache bypassed]" } else { "" }
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        match details {
            Some(details) => debug!("{} 🔄 Phase: {} - {}", self.tag(), phase, details),
            None => debug!("{} 🔄 Phase: {}", self.tag(), phase),
        }
    }

    pub fn log_cache_hit(&self, entity_id: &str, confidence: f64) {
        info!(
            "{} 💾 Cache hit -> {} (confidence {:.3})",
            self.tag(),
            entity_id,
            confidence
        );
    }

    pub fn log_search(&self, query: &str, hits: usize, latency_ms: u64, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Ok => debug!(
                "{} 🔍 search '{}' -> {} hits in {}ms",
                self.tag(),
                query,
                hits,
                latency_ms
            ),
            CallOutcome::TimedOut => warn!(
                "{} ⏰ search '{}' timed out after {}ms, continuing with what we have",
                self.tag(),
                query,
                latency_ms
            ),
            CallOutcome::Error => warn!("{} ❌ search '{}' failed after {}ms", self.tag(), query, latency_ms),
            CallOutcome::Skipped => debug!("{} ⏭️  search '{}' skipped (deadline)", self.tag(), query),
        }
    }

    pub fn log_typo(&self, detection: &TypoDetection) {
        if let Some(correction) = &detection.suggested_correction {
            info!(
                "{} ✏️  Likely typo ({:?}, {:.2}) -> '{}'",
                self.tag(),
                detection.method,
                detection.confidence,
                correction
            );
        }
    }

    pub fn log_rewrites(&self, variations: &[String]) {
        debug!("{} 🔀 Trying {} query variations: {:?}", self.tag(), variations.len(), variations);
    }

    pub fn log_escalation(&self, decision: EscalationDecision, reason: EscalationReason, top: f64) {
        info!(
            "{} 🤖 Escalation {:?} ({}, top confidence {:.3})",
            self.tag(),
            decision,
            reason,
            top
        );
    }

    pub fn log_ai_success(&self, round: usize, chosen: Option<&str>, confidence: f64, tokens: u64) {
        info!(
            "{} 🤖 AI round {} chose {} (confidence {:.3}, {} tokens)",
            self.tag(),
            round,
            chosen.unwrap_or("nothing"),
            confidence,
            tokens
        );
    }

    pub fn log_ai_failure(&self, round: usize, reason: &str) {
        warn!(
            "{} ⚠️ AI round {} failed, keeping deterministic scores: {}",
            self.tag(),
            round,
            reason
        );
    }

    pub fn log_complete(&self, status: &str, top_confidence: Option<f64>) {
        match top_confidence {
            Some(confidence) => info!(
                "{} ✅ {} (confidence {:.3}) in {}ms",
                self.tag(),
                status,
                confidence,
                self.elapsed_ms()
            ),
            None => info!("{} ✅ {} in {}ms", self.tag(), status, self.elapsed_ms()),
        }
    }
}
