// src/utils/config.rs - Environment-driven configuration
use log::{info, warn};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::ai::OllamaConfig;
use crate::matching::escalation::GateThresholds;

const DEFAULT_HIGH_THRESHOLD: f64 = 0.95;
const DEFAULT_LOW_THRESHOLD: f64 = 0.3;
const DEFAULT_AI_MIN_THRESHOLD: f64 = 0.7;
const DEFAULT_AI_MIN_THRESHOLD_WITH_CONTEXT: f64 = 0.6;
const DEFAULT_AI_MAX_THRESHOLD: f64 = 0.95;
const DEFAULT_AMBIGUITY_THRESHOLD: f64 = 0.15;
const DEFAULT_CACHE_THRESHOLD: f64 = 0.95;
const DEFAULT_CACHE_SCORE_BOOST: f64 = 0.05;
const DEFAULT_CACHE_MAX_ENTRIES_PER_KEY: usize = 5;
const DEFAULT_SEARCH_SCORE_FLOOR: f64 = 0.7;
const DEFAULT_POTENTIAL_MATCH_FLOOR: f64 = 0.3;
const DEFAULT_MAX_QUERY_VARIATIONS: usize = 5;
const DEFAULT_MAX_AI_CANDIDATES: usize = 5;
const DEFAULT_MAX_AI_ROUNDS: usize = 2;
const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 1000;
const DEFAULT_AI_TIMEOUT_MS: u64 = 2000;
const DEFAULT_REQUEST_DEADLINE_MS: u64 = 5000;
const DEFAULT_BATCH_MAX_SIZE: usize = 100;
const MIN_BATCH_CONCURRENCY: usize = 4;
pub const MAX_NAME_LENGTH: usize = 500;

/// Reads `key` through `lookup`, falling back to `default` (with a warning)
/// when the value does not parse.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("⚠️ Invalid value '{}' for {}, using default {}", raw, key, default);
                default
            }
        },
        _ => default,
    }
}

fn unit_interval_or<F>(lookup: &F, key: &str, default: f64) -> f64
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default);
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        warn!("⚠️ {}={} is outside [0, 1], using default {}", key, value, default);
        default
    }
}

fn string_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_string<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Thresholds, limits and timeouts of the matching pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub ai_min_threshold: f64,
    pub ai_min_threshold_with_context: f64,
    pub ai_max_threshold: f64,
    pub ambiguity_threshold: f64,
    pub cache_accept_threshold: f64,
    pub cache_write_threshold: f64,
    pub cache_score_boost: f64,
    pub cache_max_entries_per_key: usize,
    /// Below this search score the original query is considered a miss and
    /// rewritten queries are tried.
    pub search_score_floor: f64,
    /// Minimum confidence for a candidate to be listed in potential matches.
    pub potential_match_floor: f64,
    pub max_query_variations: usize,
    pub max_ai_candidates: usize,
    pub max_ai_rounds: usize,
    pub search_timeout: Duration,
    pub ai_timeout: Duration,
    pub request_deadline: Duration,
    pub batch_concurrency: usize,
    pub batch_max_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            ai_min_threshold: DEFAULT_AI_MIN_THRESHOLD,
            ai_min_threshold_with_context: DEFAULT_AI_MIN_THRESHOLD_WITH_CONTEXT,
            ai_max_threshold: DEFAULT_AI_MAX_THRESHOLD,
            ambiguity_threshold: DEFAULT_AMBIGUITY_THRESHOLD,
            cache_accept_threshold: DEFAULT_CACHE_THRESHOLD,
            cache_write_threshold: DEFAULT_CACHE_THRESHOLD,
            cache_score_boost: DEFAULT_CACHE_SCORE_BOOST,
            cache_max_entries_per_key: DEFAULT_CACHE_MAX_ENTRIES_PER_KEY,
            search_score_floor: DEFAULT_SEARCH_SCORE_FLOOR,
            potential_match_floor: DEFAULT_POTENTIAL_MATCH_FLOOR,
            max_query_variations: DEFAULT_MAX_QUERY_VARIATIONS,
            max_ai_candidates: DEFAULT_MAX_AI_CANDIDATES,
            max_ai_rounds: DEFAULT_MAX_AI_ROUNDS,
            search_timeout: Duration::from_millis(DEFAULT_SEARCH_TIMEOUT_MS),
            ai_timeout: Duration::from_millis(DEFAULT_AI_TIMEOUT_MS),
            request_deadline: Duration::from_millis(DEFAULT_REQUEST_DEADLINE_MS),
            batch_concurrency: num_cpus::get().max(MIN_BATCH_CONCURRENCY),
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
        }
    }
}

impl MatcherConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let config = Self {
            high_threshold: unit_interval_or(&lookup, "MATCH_HIGH_THRESHOLD", d.high_threshold),
            low_threshold: unit_interval_or(&lookup, "MATCH_LOW_THRESHOLD", d.low_threshold),
            ai_min_threshold: unit_interval_or(&lookup, "AI_MIN_THRESHOLD", d.ai_min_threshold),
            ai_min_threshold_with_context: unit_interval_or(
                &lookup,
                "AI_MIN_THRESHOLD_WITH_CONTEXT",
                d.ai_min_threshold_with_context,
            ),
            ai_max_threshold: unit_interval_or(&lookup, "AI_MAX_THRESHOLD", d.ai_max_threshold),
            ambiguity_threshold: unit_interval_or(&lookup, "AMBIGUITY_THRESHOLD", d.ambiguity_threshold),
            cache_accept_threshold: unit_interval_or(&lookup, "CACHE_ACCEPT_THRESHOLD", d.cache_accept_threshold),
            cache_write_threshold: unit_interval_or(&lookup, "CACHE_WRITE_THRESHOLD", d.cache_write_threshold),
            cache_score_boost: unit_interval_or(&lookup, "CACHE_SCORE_BOOST", d.cache_score_boost),
            cache_max_entries_per_key: parse_or(&lookup, "CACHE_MAX_ENTRIES_PER_KEY", d.cache_max_entries_per_key)
                .max(1),
            search_score_floor: unit_interval_or(&lookup, "SEARCH_SCORE_FLOOR", d.search_score_floor),
            potential_match_floor: unit_interval_or(&lookup, "POTENTIAL_MATCH_FLOOR", d.potential_match_floor),
            max_query_variations: parse_or(&lookup, "MAX_QUERY_VARIATIONS", d.max_query_variations),
            max_ai_candidates: parse_or(&lookup, "MAX_AI_CANDIDATES", d.max_ai_candidates).max(1),
            max_ai_rounds: parse_or(&lookup, "MAX_AI_ROUNDS", d.max_ai_rounds),
            search_timeout: Duration::from_millis(parse_or(&lookup, "SEARCH_TIMEOUT_MS", DEFAULT_SEARCH_TIMEOUT_MS)),
            ai_timeout: Duration::from_millis(parse_or(&lookup, "AI_TIMEOUT_MS", DEFAULT_AI_TIMEOUT_MS)),
            request_deadline: Duration::from_millis(parse_or(
                &lookup,
                "REQUEST_DEADLINE_MS",
                DEFAULT_REQUEST_DEADLINE_MS,
            )),
            batch_concurrency: parse_or(&lookup, "BATCH_CONCURRENCY", d.batch_concurrency).max(1),
            batch_max_size: parse_or(&lookup, "BATCH_MAX_SIZE", d.batch_max_size).max(1),
        };
        config.validated()
    }

    /// Resets the threshold ladder to defaults when it is inconsistent.
    pub fn validated(mut self) -> Self {
        let ladder_ok = self.low_threshold <= self.ai_min_threshold_with_context
            && self.ai_min_threshold_with_context <= self.ai_min_threshold
            && self.ai_min_threshold <= self.ai_max_threshold
            && self.low_threshold < self.high_threshold
            && self.high_threshold > 0.0;

        if !ladder_ok {
            warn!(
                "⚠️ Inconsistent thresholds (low={}, aiMinContext={}, aiMin={}, aiMax={}, high={}), using defaults",
                self.low_threshold,
                self.ai_min_threshold_with_context,
                self.ai_min_threshold,
                self.ai_max_threshold,
                self.high_threshold
            );
            let d = Self::default();
            self.high_threshold = d.high_threshold;
            self.low_threshold = d.low_threshold;
            self.ai_min_threshold = d.ai_min_threshold;
            self.ai_min_threshold_with_context = d.ai_min_threshold_with_context;
            self.ai_max_threshold = d.ai_max_threshold;
        }
        self
    }

    pub fn gate_thresholds(&self) -> GateThresholds {
        GateThresholds {
            low: self.low_threshold,
            ai_min: self.ai_min_threshold,
            ai_min_with_context: self.ai_min_threshold_with_context,
            ai_max: self.ai_max_threshold,
        }
    }

    pub fn log_config(&self) {
        info!("🎯 Matching thresholds");
        info!(
            "   match >= {:.2}, potential >= {:.2}, listing floor {:.2}, ambiguity <= {:.2}",
            self.high_threshold, self.low_threshold, self.potential_match_floor, self.ambiguity_threshold
        );
        info!(
            "   AI band [{:.2} ({:.2} with context), {:.2}), up to {} candidates, {} rounds",
            self.ai_min_threshold,
            self.ai_min_threshold_with_context,
            self.ai_max_threshold,
            self.max_ai_candidates,
            self.max_ai_rounds
        );
        info!(
            "💾 Cache: accept >= {:.2}, write >= {:.2}, boost +{:.2}, {} entries per key",
            self.cache_accept_threshold,
            self.cache_write_threshold,
            self.cache_score_boost,
            self.cache_max_entries_per_key
        );
        info!(
            "⏱️  Timeouts: search {}ms, AI {}ms, request {}ms",
            self.search_timeout.as_millis(),
            self.ai_timeout.as_millis(),
            self.request_deadline.as_millis()
        );
        info!(
            "⚙️  Rewrites: {} variations below search floor {:.2}; batch: {} concurrent, max {}",
            self.max_query_variations, self.search_score_floor, self.batch_concurrency, self.batch_max_size
        );
    }
}

/// Service wiring: network, auth, collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_keys: Vec<String>,
    pub rate_limit_per_minute: u32,
    /// Key rate limits on the first `x-forwarded-for` hop. Only safe behind
    /// a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub candidate_source_url: Option<String>,
    pub candidate_source_api_key: Option<String>,
    pub catalog_path: Option<String>,
    pub ai_enabled: bool,
    pub ollama_url: String,
    pub ollama_model: String,
    pub ai_max_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let ollama = OllamaConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_keys: Vec::new(),
            rate_limit_per_minute: 0,
            trust_forwarded_for: false,
            candidate_source_url: None,
            candidate_source_api_key: None,
            catalog_path: None,
            ai_enabled: false,
            ollama_url: ollama.url,
            ollama_model: ollama.model,
            ai_max_retries: ollama.max_retries,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            host: string_or(&lookup, "RESOLVER_HOST", &d.host),
            port: parse_or(&lookup, "RESOLVER_PORT", d.port),
            api_keys: lookup("API_KEYS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rate_limit_per_minute: parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", d.rate_limit_per_minute),
            trust_forwarded_for: parse_or(&lookup, "TRUST_FORWARDED_FOR", d.trust_forwarded_for),
            candidate_source_url: optional_string(&lookup, "CANDIDATE_SOURCE_URL"),
            candidate_source_api_key: optional_string(&lookup, "CANDIDATE_SOURCE_API_KEY"),
            catalog_path: optional_string(&lookup, "CATALOG_PATH"),
            ai_enabled: parse_or(&lookup, "AI_ENABLED", d.ai_enabled),
            ollama_url: string_or(&lookup, "OLLAMA_URL", &d.ollama_url),
            ollama_model: string_or(&lookup, "OLLAMA_MODEL", &d.ollama_model),
            ai_max_retries: parse_or(&lookup, "AI_MAX_RETRIES", d.ai_max_retries),
        }
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn ollama_config(&self, request_timeout: Duration) -> OllamaConfig {
        OllamaConfig {
            url: self.ollama_url.clone(),
            model: self.ollama_model.clone(),
            max_retries: self.ai_max_retries,
            request_timeout,
            ..OllamaConfig::default()
        }
    }

    pub fn log_config(&self) {
        info!("🌐 Listening on {}:{}", self.host, self.port);
        if self.auth_enabled() {
            info!("🔐 API key auth ENABLED ({} keys)", self.api_keys.len());
        } else {
            info!("🔓 API key auth DISABLED");
        }
        if self.rate_limit_per_minute > 0 {
            info!("🚦 Rate limit: {} requests/minute per client", self.rate_limit_per_minute);
            if self.trust_forwarded_for {
                info!("🚦 Clients identified by x-forwarded-for");
            }
        } else {
            info!("🚦 Rate limiting DISABLED");
        }
        match (&self.candidate_source_url, &self.catalog_path) {
            (Some(url), _) => info!("🔍 Candidate source: HTTP {}", url),
            (None, Some(path)) => info!("🔍 Candidate source: catalog file {}", path),
            (None, None) => warn!("⚠️ No candidate source configured, using an empty catalog"),
        }
        if self.ai_enabled {
            info!("🤖 AI disambiguation ENABLED ({} at {})", self.ollama_model, self.ollama_url);
        } else {
            info!("🤖 AI disambiguation DISABLED");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MatcherConfig::from_lookup(lookup(&[]));
        assert_eq!(config.high_threshold, 0.95);
        assert_eq!(config.low_threshold, 0.3);
        assert_eq!(config.ai_min_threshold, 0.7);
        assert_eq!(config.ai_min_threshold_with_context, 0.6);
        assert_eq!(config.ai_max_threshold, 0.95);
        assert_eq!(config.cache_max_entries_per_key, 5);
        assert_eq!(config.ai_timeout, Duration::from_millis(2000));
        assert!(config.batch_concurrency >= 4);
        assert_eq!(config.batch_max_size, 100);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = MatcherConfig::from_lookup(lookup(&[
            ("MATCH_HIGH_THRESHOLD", "0.9"),
            ("MAX_QUERY_VARIATIONS", "8"),
            ("CACHE_SCORE_BOOST", "abc"),
            ("AMBIGUITY_THRESHOLD", "1.5"),
            ("SEARCH_TIMEOUT_MS", "250"),
        ]));
        assert_eq!(config.high_threshold, 0.9);
        assert_eq!(config.max_query_variations, 8);
        assert_eq!(config.cache_score_boost, 0.05);
        assert_eq!(config.ambiguity_threshold, 0.15);
        assert_eq!(config.search_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_inconsistent_ladder_falls_back() {
        let config = MatcherConfig::from_lookup(lookup(&[
            ("AI_MIN_THRESHOLD", "0.2"),
            ("MATCH_LOW_THRESHOLD", "0.5"),
        ]));
        assert_eq!(config.ai_min_threshold, 0.7);
        assert_eq!(config.low_threshold, 0.3);
        assert_eq!(config.gate_thresholds(), GateThresholds::default());
    }

    #[test]
    fn test_server_config() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("RESOLVER_PORT", "9000"),
            ("API_KEYS", "alpha, beta,,"),
            ("AI_ENABLED", "true"),
            ("CATALOG_PATH", "catalog.json"),
            ("TRUST_FORWARDED_FOR", "true"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.api_keys, vec!["alpha".to_string(), "beta".to_string()]);
        assert!(config.auth_enabled());
        assert!(config.ai_enabled);
        assert_eq!(config.catalog_path.as_deref(), Some("catalog.json"));
        assert!(config.candidate_source_url.is_none());
        assert!(config.trust_forwarded_for);

        let defaults = ServerConfig::from_lookup(lookup(&[("RESOLVER_PORT", "http")]));
        assert_eq!(defaults.port, 8080);
        assert!(!defaults.auth_enabled());
        assert!(!defaults.trust_forwarded_for);
    }
}
