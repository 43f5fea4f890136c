// src/sources/mod.rs
//! Candidate sources: anything that can turn a query string into ranked
//! candidate entities.

pub mod http;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::CandidateEntity;

pub use http::HttpCandidateSource;
pub use memory::InMemoryCandidateSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity: CandidateEntity,
    pub relevance: f64,
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked hits for `query`; an empty list is a valid answer.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    async fn health_check(&self) -> Result<()>;
}

pub type SharedCandidateSource = Arc<dyn CandidateSource>;

/// Merges hits by entity id, keeping the highest relevance per entity and
/// first-seen order otherwise.
pub fn merge_hits(merged: &mut IndexMap<String, SearchHit>, hits: Vec<SearchHit>) {
    for hit in hits {
        match merged.get_mut(&hit.entity.id) {
            Some(existing) if hit.relevance > existing.relevance => *existing = hit,
            Some(_) => {}
            None => {
                merged.insert(hit.entity.id.clone(), hit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, relevance: f64) -> SearchHit {
        SearchHit {
            entity: CandidateEntity::new(id, id.to_uppercase()),
            relevance,
        }
    }

    #[test]
    fn test_merge_keeps_max_relevance() {
        let mut merged = IndexMap::new();
        merge_hits(&mut merged, vec![hit("a", 0.4), hit("b", 0.9)]);
        merge_hits(&mut merged, vec![hit("a", 0.8), hit("b", 0.1), hit("c", 0.5)]);

        let ids: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged["a"].relevance, 0.8);
        assert_eq!(merged["b"].relevance, 0.9);
    }
}
