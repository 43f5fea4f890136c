// src/utils/progress_config.rs - Progress reporting for the offline resolution tool
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;

use crate::cache::ExactMatchCache;
use crate::utils::config::parse_or;
use crate::utils::get_memory_usage;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} names {msg}";

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressConfig {
    pub enabled: bool,
    pub refresh_rate_ms: u64,
    /// Append host memory to the bar message.
    pub show_memory: bool,
    /// Append cache key count and hit rate to the bar message.
    pub show_cache_stats: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_rate_ms: 100,
            show_memory: true,
            show_cache_stats: true,
        }
    }
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            enabled: parse_or(&lookup, "PROGRESS_ENABLED", d.enabled),
            refresh_rate_ms: parse_or(&lookup, "PROGRESS_REFRESH_RATE_MS", d.refresh_rate_ms),
            show_memory: parse_or(&lookup, "PROGRESS_SHOW_MEMORY", d.show_memory),
            show_cache_stats: parse_or(&lookup, "PROGRESS_SHOW_CACHE_STATS", d.show_cache_stats),
        }
    }

    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        self.enabled.then(MultiProgress::new)
    }

    pub fn create_bar(&self, multi: &MultiProgress, len: u64, message: &str) -> ProgressBar {
        let pb = multi.add(ProgressBar::new(len));
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(self.refresh_rate_ms.max(10)));
        pb.set_message(message.to_string());
        pb
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }

    pub fn should_show_cache_stats(&self) -> bool {
        self.enabled && self.show_cache_stats
    }

    /// `(Memory: 412 MB, Cache: 80 keys, 25% hits)`, or `None` when nothing
    /// is configured to show.
    pub async fn status_suffix(&self, cache: &ExactMatchCache) -> Option<String> {
        let mut parts = Vec::new();
        if self.should_show_memory() {
            parts.push(format!("Memory: {} MB", get_memory_usage().await));
        }
        if self.should_show_cache_stats() {
            let stats = cache.stats();
            parts.push(format!("Cache: {} keys, {:.0}% hits", stats.keys, stats.hit_rate * 100.0));
        }
        (!parts.is_empty()).then(|| format!("({})", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateEntity;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_config() {
        let config = ProgressConfig::from_lookup(lookup(&[
            ("PROGRESS_ENABLED", "false"),
            ("PROGRESS_REFRESH_RATE_MS", "50"),
            ("PROGRESS_SHOW_CACHE_STATS", "nope"),
        ]));
        assert!(!config.enabled);
        assert_eq!(config.refresh_rate_ms, 50);
        assert!(config.show_memory);
        assert!(config.show_cache_stats);
        assert!(config.create_multi_progress().is_none());
        assert!(!config.should_show_memory());
    }

    #[tokio::test]
    async fn test_status_suffix() {
        let cache = ExactMatchCache::new(5);
        cache.record("acme", CandidateEntity::new("acme", "Acme Inc"), 0.97);
        cache.lookup("acme");
        cache.lookup("globex");

        let config = ProgressConfig {
            show_memory: false,
            ..ProgressConfig::default()
        };
        assert_eq!(
            config.status_suffix(&cache).await.as_deref(),
            Some("(Cache: 1 keys, 50% hits)")
        );

        let quiet = ProgressConfig {
            enabled: false,
            ..ProgressConfig::default()
        };
        assert_eq!(quiet.status_suffix(&cache).await, None);
    }
}
