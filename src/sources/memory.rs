// src/sources/memory.rs - Catalog-backed candidate source
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::path::Path;
use strsim::jaro_winkler;

use crate::matching::normalize::normalize;
use crate::models::CandidateEntity;
use crate::sources::{CandidateSource, SearchHit};

pub const DEFAULT_MIN_RELEVANCE: f64 = 0.75;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

struct IndexedEntity {
    entity: CandidateEntity,
    normalized_names: Vec<String>,
}

/// Scores a query against every catalog entry: exact normalized equality on
/// any name is 1.0, otherwise the best Jaro-Winkler over normalized names.
pub struct InMemoryCandidateSource {
    entries: Vec<IndexedEntity>,
    min_relevance: f64,
    limit: usize,
}

impl InMemoryCandidateSource {
    pub fn new(entities: Vec<CandidateEntity>) -> Self {
        let entries = entities
            .into_iter()
            .map(|entity| {
                let normalized_names = entity
                    .names()
                    .map(normalize)
                    .filter(|n| !n.is_empty())
                    .collect();
                IndexedEntity {
                    entity,
                    normalized_names,
                }
            })
            .collect();

        Self {
            entries,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_min_relevance(mut self, min_relevance: f64) -> Self {
        self.min_relevance = min_relevance.clamp(0.0, 1.0);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Parses a JSON array of entities.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entities: Vec<CandidateEntity> =
            serde_json::from_str(json).context("Failed to parse candidate catalog JSON")?;
        Ok(Self::new(entities))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read candidate catalog {}", path.display()))?;
        let source = Self::from_json_str(&raw)
            .with_context(|| format!("Invalid candidate catalog {}", path.display()))?;
        info!(
            "📚 Loaded {} catalog entities from {}",
            source.len(),
            path.display()
        );
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn relevance(query: &str, names: &[String]) -> f64 {
        if names.iter().any(|n| n == query) {
            return 1.0;
        }
        names
            .iter()
            .map(|n| jaro_winkler(query, n))
            .fold(0.0, f64::max)
    }
}

#[async_trait]
impl CandidateSource for InMemoryCandidateSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|indexed| {
                let relevance = Self::relevance(&normalized, &indexed.normalized_names);
                (relevance >= self.min_relevance).then(|| SearchHit {
                    entity: indexed.entity.clone(),
                    relevance,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.entity.canonical_name.cmp(&b.entity.canonical_name))
        });
        hits.truncate(self.limit);

        debug!("memory search '{}' -> {} hits", query, hits.len());
        Ok(hits)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
